// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Extension points for code outside the engine.
//!
//! * [`Step`] - a computation unit driven by triggers
//! * [`Triggerable`] - anything a trigger can notify besides steps and triggers

pub mod step;
pub mod triggerable;

pub use step::{ComputeContext, Step};
pub use triggerable::Triggerable;
