// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pipeline descriptions stored as YAML or JSON.
//!
//! ```yaml
//! bindings:
//!   device: /dev/video0
//! fragments:
//!   - - stage: { kind: v4l2, role: source, options: { device: "${device}" } }
//!     - stage: { kind: tee, role: filter, name: t }
//!   - - ref: t
//!     - queue: { max_buffered: 1, overflow: drop_oldest }
//!     - stage: { kind: fake, role: sink }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::assembler::Assembler;
use super::fragment::Fragment;
use super::graph::Graph;
use super::stage::Value;
use crate::core::error::{Result, StreamError};
use crate::core::layout::Layout;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineFile {
    /// Extra placeholder bindings. These override layout bindings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<String, Value>,
    pub fragments: Vec<Fragment>,
}

impl PipelineFile {
    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            Some("json") => Self::from_json(&contents),
            _ => Err(StreamError::Configuration(format!(
                "Unsupported pipeline file extension: {}",
                path.display()
            ))),
        }
    }

    /// Elements are single-key maps (`- stage: {...}`), not YAML tags.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::with::singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_str(
            contents,
        ))
        .map_err(|e| StreamError::Configuration(format!("Invalid pipeline YAML: {}", e)))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| StreamError::Configuration(format!("Invalid pipeline JSON: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String> {
        let mut out = Vec::new();
        let mut serializer = serde_yaml::Serializer::new(&mut out);
        serde_yaml::with::singleton_map_recursive::serialize(self, &mut serializer)
            .map_err(|e| StreamError::Configuration(format!("Failed to serialize pipeline: {}", e)))?;
        String::from_utf8(out)
            .map_err(|e| StreamError::Configuration(format!("Failed to serialize pipeline: {}", e)))
    }

    /// Assemble with the layout's bindings (if any) and this file's bindings.
    pub fn assemble(&self, layout: Option<&Layout>) -> Result<Graph> {
        let mut assembler = Assembler::new();
        if let Some(layout) = layout {
            assembler = assembler.with_layout(layout)?;
        }
        for (key, value) in &self.bindings {
            assembler = assembler.bind(key.clone(), value.clone());
        }
        Ok(assembler.assemble(&self.fragments)?)
    }
}
