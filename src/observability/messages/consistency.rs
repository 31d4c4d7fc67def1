// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for consistency checks.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// A consistency check finished.
///
/// # Log Level
/// `debug!` when clean, `warn!` when errors were found
pub struct ConsistencyChecked<'a> {
    /// Trigger or group the check covered.
    pub scope: &'a str,
    pub errors: usize,
    pub warnings: usize,
}

impl Display for ConsistencyChecked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Consistency check of '{}': {} errors, {} warnings",
            self.scope, self.errors, self.warnings
        )
    }
}

impl StructuredLog for ConsistencyChecked<'_> {
    fn log(&self) {
        if self.errors > 0 {
            tracing::warn!(scope = self.scope, errors = self.errors, warnings = self.warnings, "{}", self);
        } else {
            tracing::debug!(scope = self.scope, errors = self.errors, warnings = self.warnings, "{}", self);
        }
    }
}

/// # Log Level
/// `warn!`
pub struct CycleDetected<'a> {
    pub cycle: &'a [String],
}

impl Display for CycleDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Synchronous cycle detected: {}", self.cycle.join(" -> "))
    }
}

impl StructuredLog for CycleDetected<'_> {
    fn log(&self) {
        tracing::warn!(cycle = ?self.cycle, "{}", self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_detected_display() {
        let cycle = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let msg = CycleDetected { cycle: &cycle };
        assert_eq!(msg.to_string(), "Synchronous cycle detected: a -> b -> a");
    }
}
