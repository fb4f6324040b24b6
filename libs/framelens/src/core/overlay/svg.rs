// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Minimal SVG element tree, serialized in one pass.

use std::fmt::{self, Write};

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Escape text content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Child {
    Element(SvgElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SvgElement {
    tag: &'static str,
    attributes: Vec<(&'static str, String)>,
    children: Vec<Child>,
}

impl SvgElement {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Root `<svg>` element with the namespace declared.
    pub fn root() -> Self {
        Self::new("svg").attr("xmlns", SVG_NAMESPACE)
    }

    pub fn attr(mut self, name: &'static str, value: impl fmt::Display) -> Self {
        self.attributes.push((name, value.to_string()));
        self
    }

    pub fn child(mut self, child: SvgElement) -> Self {
        self.children.push(Child::Element(child));
        self
    }

    pub fn push(&mut self, child: SvgElement) {
        self.children.push(Child::Element(child));
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Child::Text(text.into()));
        self
    }

    fn write_to(&self, out: &mut String) -> fmt::Result {
        write!(out, "<{}", self.tag)?;
        for (name, value) in &self.attributes {
            write!(out, " {}=\"{}\"", name, escape(value))?;
        }
        if self.children.is_empty() {
            return out.write_str("/>");
        }
        out.write_char('>')?;
        for child in &self.children {
            match child {
                Child::Element(element) => element.write_to(out)?,
                Child::Text(text) => out.write_str(&escape(text))?,
            }
        }
        write!(out, "</{}>", self.tag)
    }
}

impl fmt::Display for SvgElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_to(&mut out)?;
        f.write_str(&out)
    }
}
