// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod render;
pub mod svg;

pub use render::{
    render_overlay, InferenceTiming, LineKind, OverlayDocument, OverlayLine, TextAnchor,
};
