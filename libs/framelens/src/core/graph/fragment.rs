// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Composable pipeline description.
//!
//! A pipeline is an ordered list of [`Fragment`]s. Each fragment is a chain of
//! [`Element`]s linked in order; a chain may embed another chain, which is
//! spliced in place. Fragments meet at named stages: a [`Element::Ref`] at the
//! start of a chain takes a new output from the named stage, at the end it
//! feeds the named stage, in the middle it passes through it.

use serde::{Deserialize, Serialize};

use super::caps::CapabilityFilter;
use super::queue::QueueSpec;
use super::stage::Stage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Stage(Stage),
    Caps(CapabilityFilter),
    Queue(QueueSpec),
    /// Reference to a stage declared (with a name) anywhere in the pipeline.
    Ref(String),
    /// Nested sub-chain.
    Chain(Vec<Element>),
}

impl Element {
    pub fn reference(name: impl Into<String>) -> Self {
        Element::Ref(name.into())
    }

    /// Visit the leaf elements of this element in chain order.
    pub(crate) fn flatten_into<'a>(&'a self, out: &mut Vec<&'a Element>) {
        match self {
            Element::Chain(children) => {
                for child in children {
                    child.flatten_into(out);
                }
            }
            leaf => out.push(leaf),
        }
    }
}

impl From<Stage> for Element {
    fn from(stage: Stage) -> Self {
        Element::Stage(stage)
    }
}

impl From<CapabilityFilter> for Element {
    fn from(caps: CapabilityFilter) -> Self {
        Element::Caps(caps)
    }
}

impl From<QueueSpec> for Element {
    fn from(queue: QueueSpec) -> Self {
        Element::Queue(queue)
    }
}

impl From<Vec<Element>> for Element {
    fn from(chain: Vec<Element>) -> Self {
        Element::Chain(chain)
    }
}

/// One chain of a pipeline description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fragment(Vec<Element>);

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one element (or a nested chain) to the end of the fragment.
    pub fn then(mut self, element: impl Into<Element>) -> Self {
        self.0.push(element.into());
        self
    }

    /// Append a named reference.
    pub fn to_ref(self, name: impl Into<String>) -> Self {
        self.then(Element::reference(name))
    }

    /// Fragment that starts from the named stage.
    pub fn from_ref(name: impl Into<String>) -> Self {
        Self::new().to_ref(name)
    }

    pub fn elements(&self) -> &[Element] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.leaves().is_empty()
    }

    /// Every stage of the fragment, nested chains included.
    pub fn stages_mut(&mut self) -> Vec<&mut Stage> {
        let mut out = Vec::new();
        collect_stages_mut(&mut self.0, &mut out);
        out
    }

    /// Leaf elements with nested chains spliced in.
    pub fn leaves(&self) -> Vec<&Element> {
        let mut out = Vec::with_capacity(self.0.len());
        for element in &self.0 {
            element.flatten_into(&mut out);
        }
        out
    }
}

fn collect_stages_mut<'a>(elements: &'a mut [Element], out: &mut Vec<&'a mut Stage>) {
    for element in elements {
        match element {
            Element::Stage(stage) => out.push(stage),
            Element::Chain(children) => collect_stages_mut(children, out),
            _ => {}
        }
    }
}

impl From<Vec<Element>> for Fragment {
    fn from(elements: Vec<Element>) -> Self {
        Self(elements)
    }
}

impl FromIterator<Element> for Fragment {
    fn from_iter<T: IntoIterator<Item = Element>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
