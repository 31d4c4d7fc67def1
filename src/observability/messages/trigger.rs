// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for trigger lifecycle and pulse events.
//!
//! This module contains message types for logging events related to:
//! * Looped trigger start, stop and stop timeouts
//! * Catch-up clamping and refused starts
//! * Completed pulses and panicking custom listeners

use crate::engine::{LoopMode, PulseReport};
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A looped trigger's thread started.
///
/// # Log Level
/// `info!` - Important operational event
pub struct LoopStarted<'a> {
    pub trigger: &'a str,
    pub mode: LoopMode,
    pub step_size: Duration,
}

impl Display for LoopStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Looped trigger '{}' started: mode={:?}, step_size={:?}",
            self.trigger, self.mode, self.step_size
        )
    }
}

impl StructuredLog for LoopStarted<'_> {
    fn log(&self) {
        tracing::info!(
            trigger = self.trigger,
            mode = ?self.mode,
            step_size_us = self.step_size.as_micros() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "looped_trigger",
            span_name = name,
            trigger = self.trigger,
            mode = ?self.mode,
        )
    }
}

/// A looped trigger's thread exited.
///
/// # Log Level
/// `info!` - Important operational event
pub struct LoopStopped<'a> {
    pub trigger: &'a str,
    pub pulses: u64,
}

impl Display for LoopStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Looped trigger '{}' stopped after {} pulses",
            self.trigger, self.pulses
        )
    }
}

impl StructuredLog for LoopStopped<'_> {
    fn log(&self) {
        tracing::info!(trigger = self.trigger, pulses = self.pulses, "{}", self);
    }
}

/// A stop request timed out; the thread is still finishing a pulse.
///
/// # Log Level
/// `warn!` - Recoverable; the stop may be retried
pub struct StopTimedOut<'a> {
    pub trigger: &'a str,
    pub timeout: Duration,
}

impl Display for StopTimedOut<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Looped trigger '{}' did not stop within {:?}",
            self.trigger, self.timeout
        )
    }
}

impl StructuredLog for StopTimedOut<'_> {
    fn log(&self) {
        tracing::warn!(
            trigger = self.trigger,
            timeout_ms = self.timeout.as_millis() as u64,
            "{}", self
        );
    }
}

/// Catch-up pulses were dropped because the loop fell too far behind.
///
/// # Log Level
/// `warn!` - Simulated time no longer tracks wall-clock time
pub struct CatchUpClamped<'a> {
    pub trigger: &'a str,
    pub dropped: u64,
    pub max_catch_up_steps: u32,
}

impl Display for CatchUpClamped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Looped trigger '{}' fell behind: dropped {} pulses (max {} per iteration)",
            self.trigger, self.dropped, self.max_catch_up_steps
        )
    }
}

impl StructuredLog for CatchUpClamped<'_> {
    fn log(&self) {
        tracing::warn!(
            trigger = self.trigger,
            dropped = self.dropped,
            max_catch_up_steps = self.max_catch_up_steps,
            "{}", self
        );
    }
}

/// A start was refused because the reachable subgraph has consistency errors.
///
/// # Log Level
/// `error!` - The trigger stays stopped
pub struct StartRefused<'a> {
    pub trigger: &'a str,
    pub errors: usize,
}

impl Display for StartRefused<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Refusing to start looped trigger '{}': {} consistency errors",
            self.trigger, self.errors
        )
    }
}

impl StructuredLog for StartRefused<'_> {
    fn log(&self) {
        tracing::error!(trigger = self.trigger, errors = self.errors, "{}", self);
    }
}

/// A pulse finished.
///
/// # Log Level
/// `trace!` - Emitted for every pulse
pub struct PulseCompleted<'a> {
    pub trigger: &'a str,
    pub report: &'a PulseReport,
}

impl Display for PulseCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pulse of '{}' completed in {:?}: {} computed, {} skipped, {} faulted",
            self.trigger,
            self.report.duration,
            self.report.computed,
            self.report.skipped,
            self.report.faulted
        )
    }
}

impl StructuredLog for PulseCompleted<'_> {
    fn log(&self) {
        tracing::trace!(
            trigger = self.trigger,
            computed = self.report.computed,
            skipped = self.report.skipped,
            faulted = self.report.faulted,
            duration_us = self.report.duration.as_micros() as u64,
            "{}", self
        );
    }
}

/// A custom listener panicked inside `on_trigger`.
///
/// # Log Level
/// `error!` - The pulse continued without it
pub struct ListenerPanicked<'a> {
    pub trigger: &'a str,
    pub listener: &'a str,
    pub message: &'a str,
}

impl Display for ListenerPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Listener '{}' of trigger '{}' panicked: {}",
            self.listener, self.trigger, self.message
        )
    }
}

impl StructuredLog for ListenerPanicked<'_> {
    fn log(&self) {
        tracing::error!(
            trigger = self.trigger,
            listener = self.listener,
            panic = self.message,
            "{}", self
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_up_clamped_display() {
        let msg = CatchUpClamped {
            trigger: "clock",
            dropped: 8,
            max_catch_up_steps: 4,
        };
        assert_eq!(
            msg.to_string(),
            "Looped trigger 'clock' fell behind: dropped 8 pulses (max 4 per iteration)"
        );
    }

    #[test]
    fn test_stop_timed_out_display() {
        let msg = StopTimedOut {
            trigger: "clock",
            timeout: Duration::from_millis(20),
        };
        assert_eq!(msg.to_string(), "Looped trigger 'clock' did not stop within 20ms");
    }
}
