// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Label files: one label per line, optionally prefixed by its class index
//! (`"17 goldfish"`). Lines without an index are numbered by position.

use std::path::Path;

use anyhow::{Context, Result};
use framelens::Labels;

pub fn load_labels(path: &Path) -> Result<Labels> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read label file {}", path.display()))?;
    let labels = parse_labels(&contents);
    tracing::info!("Loaded {} labels from {}", labels.len(), path.display());
    Ok(labels)
}

pub fn parse_labels(contents: &str) -> Labels {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(position, line)| parse_line(line).unwrap_or((position, line.trim())))
        .collect()
}

fn parse_line(line: &str) -> Option<(usize, &str)> {
    let line = line.trim_start();
    let digits = line.find(|c: char| !c.is_ascii_digit())?;
    if digits == 0 {
        return None;
    }
    let index = line[..digits].parse().ok()?;
    let name = line[digits..].trim();
    (!name.is_empty()).then_some((index, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_labels() {
        let labels = parse_labels("0 background\n1  tench\n 2 goldfish\n");
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.name(1), "tench");
        assert_eq!(labels.name(2), "goldfish");
    }

    #[test]
    fn test_plain_labels_numbered_by_position() {
        let labels = parse_labels("background\ntench\ngoldfish\n");
        assert_eq!(labels.name(0), "background");
        assert_eq!(labels.name(2), "goldfish");
    }

    #[test]
    fn test_sparse_indices_and_fallback() {
        let labels = parse_labels("5 cat\n9 dog\n");
        assert_eq!(labels.name(9), "dog");
        assert_eq!(labels.name(6), "6");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "0 cat\n1 dog\n").unwrap();
        assert_eq!(load_labels(&path).unwrap().name(0), "cat");
        assert!(load_labels(&dir.path().join("missing.txt")).is_err());
    }
}
