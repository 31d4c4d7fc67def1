// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structural errors raised synchronously by graph mutation calls.
//!
//! Every mutation that fails with one of these errors is rejected as a whole:
//! no slot, connection table or listener list is left half-updated.

use thiserror::Error;

use crate::data::{DataType, SlotRole};
use crate::engine::StepState;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// A slot or element name is already taken in its namespace.
    #[error("the name '{name}' is already in use")]
    DuplicateName { name: String },

    #[error("no element named '{name}'")]
    UnknownElement { name: String },

    #[error("no {role:?} slot named '{slot}'")]
    UnknownSlot { role: SlotRole, slot: String },

    #[error("cannot connect '{from}' ({from_type}) to '{to}' ({to_type}): incompatible data types")]
    TypeMismatch {
        from: String,
        to: String,
        from_type: DataType,
        to_type: DataType,
    },

    /// Inputs accept a single incoming connection.
    #[error("'{to}' already has an incoming connection")]
    AlreadyConnected { to: String },

    #[error("connecting '{from}' to '{to}' loops a connectable back onto itself without a trigger boundary")]
    SelfLoop { from: String, to: String },

    #[error("invalid connection from '{from}' to '{to}': {reason}")]
    InvalidConnection {
        from: String,
        to: String,
        reason: String,
    },

    #[error("slot '{slot}' is still connected")]
    SlotInUse { slot: String },

    #[error("connecting trigger '{from}' to '{to}' would create a trigger cycle")]
    TriggerCycle { from: String, to: String },

    #[error("'{name}' is not a trigger")]
    NotATrigger { name: String },

    #[error("'{name}' cannot be driven by a trigger")]
    NotTriggerable { name: String },

    #[error("'{name}' is busy: {reason}")]
    ElementBusy { name: String, reason: String },

    #[error("cannot {operation} step '{step}' while it is {state:?}")]
    InvalidLifecycle {
        step: String,
        operation: &'static str,
        state: StepState,
    },

    #[error("group '{name}' cannot be nested inside itself")]
    RecursiveNesting { name: String },

    #[error("invalid slot path '{path}'")]
    InvalidPath { path: String },
}

impl GraphError {
    /// Replaces slot-local names with the fully qualified paths the caller used.
    pub(crate) fn with_paths(self, source: &str, target: &str) -> Self {
        match self {
            GraphError::TypeMismatch {
                from_type, to_type, ..
            } => GraphError::TypeMismatch {
                from: source.to_string(),
                to: target.to_string(),
                from_type,
                to_type,
            },
            GraphError::AlreadyConnected { .. } => GraphError::AlreadyConnected {
                to: target.to_string(),
            },
            GraphError::SelfLoop { .. } => GraphError::SelfLoop {
                from: source.to_string(),
                to: target.to_string(),
            },
            GraphError::InvalidConnection { reason, .. } => GraphError::InvalidConnection {
                from: source.to_string(),
                to: target.to_string(),
                reason,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_paths_rewrites_connection_errors() {
        let err = GraphError::AlreadyConnected {
            to: "input".to_string(),
        }
        .with_paths("a.value", "b.input");

        assert_eq!(
            err,
            GraphError::AlreadyConnected {
                to: "b.input".to_string()
            }
        );
        assert_eq!(err.to_string(), "'b.input' already has an incoming connection");
    }

    #[test]
    fn test_with_paths_leaves_other_errors_alone() {
        let err = GraphError::UnknownElement {
            name: "ghost".to_string(),
        };
        assert_eq!(err.clone().with_paths("a.x", "b.y"), err);
    }
}
