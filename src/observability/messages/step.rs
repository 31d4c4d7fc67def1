// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for step lifecycle and compute events.

use crate::errors::ComputeError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A step's compute returned an error or panicked.
///
/// # Log Level
/// `warn!` - The step's outputs are invalid until it computes again
pub struct StepFaulted<'a> {
    pub step: &'a str,
    pub trigger: &'a str,
    pub error: &'a ComputeError,
}

impl Display for StepFaulted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Step '{}' faulted during pulse of '{}': {}",
            self.step, self.trigger, self.error
        )
    }
}

impl StructuredLog for StepFaulted<'_> {
    fn log(&self) {
        tracing::warn!(
            step = self.step,
            trigger = self.trigger,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("step_fault", span_name = name, step = self.step)
    }
}

/// A step was reached while a mandatory input had no valid data.
///
/// # Log Level
/// `debug!` - Expected while upstream steps warm up
pub struct StepInputsInvalid<'a> {
    pub step: &'a str,
}

impl Display for StepInputsInvalid<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Step '{}' skipped: a mandatory input has no valid data",
            self.step
        )
    }
}

impl StructuredLog for StepInputsInvalid<'_> {
    fn log(&self) {
        tracing::debug!(step = self.step, "{}", self);
    }
}

/// # Log Level
/// `debug!`
pub struct StepStarted<'a> {
    pub step: &'a str,
}

impl Display for StepStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Step '{}' started", self.step)
    }
}

impl StructuredLog for StepStarted<'_> {
    fn log(&self) {
        tracing::debug!(step = self.step, "{}", self);
    }
}

/// # Log Level
/// `debug!`
pub struct StepStopped<'a> {
    pub step: &'a str,
}

impl Display for StepStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Step '{}' stopped", self.step)
    }
}

impl StructuredLog for StepStopped<'_> {
    fn log(&self) {
        tracing::debug!(step = self.step, "{}", self);
    }
}

/// # Log Level
/// `info!`
pub struct StepReset<'a> {
    pub step: &'a str,
}

impl Display for StepReset<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Step '{}' reset", self.step)
    }
}

impl StructuredLog for StepReset<'_> {
    fn log(&self) {
        tracing::info!(step = self.step, "{}", self);
    }
}
