// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::data::DataType;

/// Failure raised from inside a step's `compute`.
///
/// The trigger that dispatched the step catches it, invalidates the step's
/// outputs and records the fault; it never stops the trigger.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    #[error("input '{slot}' has no valid data")]
    MissingInput { slot: String },

    #[error("no slot named '{slot}'")]
    UnknownSlot { slot: String },

    #[error("slot '{slot}' holds {found}, expected {expected}")]
    TypeMismatch {
        slot: String,
        expected: DataType,
        found: DataType,
    },

    #[error("{0}")]
    Failed(String),

    #[error("compute panicked: {0}")]
    Panicked(String),
}

impl ComputeError {
    pub fn failed(message: impl Into<String>) -> Self {
        ComputeError::Failed(message.into())
    }
}
