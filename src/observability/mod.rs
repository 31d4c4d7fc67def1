// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Every diagnostic the engine emits is a message struct that implements
//! `Display` and [`messages::StructuredLog`]. Keeping the wording in one place
//! keeps the log output consistent and the engine code free of format strings.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::trigger` - looped trigger lifecycle and pulse events
//! * `messages::step` - step lifecycle and compute faults
//! * `messages::graph` - structural edits of groups
//! * `messages::consistency` - consistency check results
//!
//! # Usage
//!
//! ```rust
//! use trigger_graph::observability::messages::StructuredLog;
//! use trigger_graph::observability::messages::step::StepStarted;
//!
//! StepStarted { step: "counter" }.log();
//! ```

pub mod messages;
