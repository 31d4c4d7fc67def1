// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;
use thiserror::Error;

use crate::engine::ConsistencyIssue;

/// Lifecycle errors of looped triggers. None of them leaves the engine in a
/// state that prevents retrying the operation.
#[derive(Error, Debug, Clone)]
pub enum TriggerError {
    #[error("trigger '{trigger}' is already running")]
    AlreadyRunning { trigger: String },

    #[error("trigger '{trigger}' has not finished stopping yet")]
    StillStopping { trigger: String },

    #[error("trigger '{trigger}' did not stop within {timeout:?}; stop may be retried")]
    StopTimeout { trigger: String, timeout: Duration },

    #[error("refusing to start trigger '{trigger}': {} consistency error(s)", .issues.len())]
    Inconsistent {
        trigger: String,
        issues: Vec<ConsistencyIssue>,
    },

    #[error("failed to spawn the thread of trigger '{trigger}': {reason}")]
    Spawn { trigger: String, reason: String },
}
