// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stock steps.
//!
//! Small numeric steps used by the demo binary and the engine tests. Every one
//! works on `f64` slots.

pub mod arithmetic;
pub mod source;

#[cfg(test)]
pub mod stub;

pub use arithmetic::*;
pub use source::*;
