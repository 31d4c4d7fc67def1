// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! # Organization
//!
//! * `trigger` - looped trigger lifecycle, catch-up and pulse events
//! * `step` - step lifecycle, skipped computes and faults
//! * `graph` - elements and connections added or removed
//! * `consistency` - check summaries and detected cycles
//!
//! # Usage Pattern
//!
//! ```rust
//! use trigger_graph::observability::messages::StructuredLog;
//! use trigger_graph::observability::messages::trigger::StopTimedOut;
//! use std::time::Duration;
//!
//! let msg = StopTimedOut {
//!     trigger: "clock",
//!     timeout: Duration::from_millis(100),
//! };
//!
//! msg.log();
//! tracing::warn!("{}", msg);
//! ```

use std::fmt::Display;
use tracing::Span;

pub mod consistency;
pub mod graph;
pub mod step;
pub mod trigger;

/// A log message that knows its level and structured fields.
pub trait StructuredLog: Display {
    /// Emits the message as a `tracing` event at the message's level.
    fn log(&self);

    /// A span carrying the message's fields.
    fn span(&self, name: &str) -> Span {
        tracing::info_span!("event", span_name = name, message = %self)
    }
}
