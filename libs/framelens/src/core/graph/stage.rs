// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Configuration value for a stage option or a caps constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Rational such as a frame rate (`30/1`).
    Fraction(i32, i32),
}

impl Value {
    /// Name inside a `${name}` placeholder, if this value is one.
    pub fn placeholder(&self) -> Option<&str> {
        match self {
            Value::Str(s) => s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_fraction(&self) -> Option<(i32, i32)> {
        match self {
            Value::Fraction(n, d) => Some((*n, *d)),
            _ => None,
        }
    }

    fn parse_fraction(s: &str) -> Option<(i32, i32)> {
        let (n, d) = s.split_once('/')?;
        let n = n.parse().ok()?;
        let d = d.parse().ok()?;
        Some((n, d))
    }
}

impl fmt::Display for Value {
    /// gst-launch property syntax; strings are quoted when they would not
    /// survive the launch tokenizer.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Fraction(n, d) => write!(f, "{}/{}", n, d),
            Value::Str(s) => {
                let plain = !s.is_empty()
                    && s.chars().all(|c| {
                        c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | ':' | '+')
                    });
                if plain {
                    write!(f, "{}", s)
                } else {
                    write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
                }
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<(i32, i32)> for Value {
    fn from((n, d): (i32, i32)) -> Self {
        Value::Fraction(n, d)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => RawValue::Bool(*b).serialize(serializer),
            Value::Int(v) => RawValue::Int(*v).serialize(serializer),
            Value::Float(v) => RawValue::Float(*v).serialize(serializer),
            Value::Str(s) => RawValue::Str(s.clone()).serialize(serializer),
            Value::Fraction(n, d) => RawValue::Str(format!("{}/{}", n, d)).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match RawValue::deserialize(deserializer)? {
            RawValue::Bool(b) => Value::Bool(b),
            RawValue::Int(v) => Value::Int(v),
            RawValue::Float(v) => Value::Float(v),
            RawValue::Str(s) => match Value::parse_fraction(&s) {
                Some((n, d)) => Value::Fraction(n, d),
                None => Value::Str(s),
            },
        })
    }
}

/// Ordered option map; ordering keeps rendered descriptions stable.
pub type Options = BTreeMap<String, Value>;

/// Where a stage sits in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// Produces data; takes no input.
    Source,
    /// Consumes and produces data.
    Filter,
    /// Terminates a chain.
    Sink,
}

/// One processing element of the pipeline.
///
/// `kind` is the short element kind (`v4l2`, `videoconvert`, `glimage`); the
/// engine element name is derived from it together with the role, see
/// [`Stage::factory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub kind: String,
    pub role: StageRole,
    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Stage {
    pub const TEE: &'static str = "tee";

    fn new(kind: impl Into<String>, role: StageRole) -> Self {
        Self {
            kind: kind.into(),
            role,
            options: Options::new(),
            name: None,
        }
    }

    /// Capture or generator stage (`v4l2` → `v4l2src`).
    pub fn source(kind: impl Into<String>) -> Self {
        Self::new(kind, StageRole::Source)
    }

    /// Transforming stage, named exactly as the engine element.
    pub fn filter(kind: impl Into<String>) -> Self {
        Self::new(kind, StageRole::Filter)
    }

    /// Terminal stage (`glimage` → `glimagesink`).
    pub fn sink(kind: impl Into<String>) -> Self {
        Self::new(kind, StageRole::Sink)
    }

    /// Branch point. Later fragments attach to it through a reference to `name`.
    pub fn tee(name: impl Into<String>) -> Self {
        Self::filter(Self::TEE).named(name)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn is_tee(&self) -> bool {
        self.role == StageRole::Filter && self.kind == Self::TEE
    }

    /// Engine element name.
    pub fn factory(&self) -> String {
        match self.role {
            StageRole::Source => format!("{}src", self.kind),
            StageRole::Filter => self.kind.clone(),
            StageRole::Sink => format!("{}sink", self.kind),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.factory())?;
        for (key, value) in &self.options {
            write!(f, " {}={}", key.replace('_', "-"), value)?;
        }
        Ok(())
    }
}
