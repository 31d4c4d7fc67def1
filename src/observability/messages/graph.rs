// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for structural edits of groups and schedule anomalies.

use crate::data::ConnectionKind;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// # Log Level
/// `debug!` - Structural edit
pub struct ElementAdded<'a> {
    pub group: &'a str,
    pub name: &'a str,
    pub kind: &'a str,
}

impl Display for ElementAdded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Added {} '{}' to group '{}'", self.kind, self.name, self.group)
    }
}

impl StructuredLog for ElementAdded<'_> {
    fn log(&self) {
        tracing::debug!(group = self.group, name = self.name, kind = self.kind, "{}", self);
    }
}

/// # Log Level
/// `debug!` - Structural edit
pub struct ElementRemoved<'a> {
    pub group: &'a str,
    pub name: &'a str,
    /// Data and trigger connections dropped with the element.
    pub connections: usize,
}

impl Display for ElementRemoved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Removed '{}' from group '{}' with {} connections",
            self.name, self.group, self.connections
        )
    }
}

impl StructuredLog for ElementRemoved<'_> {
    fn log(&self) {
        tracing::debug!(
            group = self.group,
            name = self.name,
            connections = self.connections,
            "{}", self
        );
    }
}

/// # Log Level
/// `debug!` - Structural edit
pub struct SlotsConnected<'a> {
    pub group: &'a str,
    pub source: &'a str,
    pub target: &'a str,
    pub kind: ConnectionKind,
}

impl Display for SlotsConnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let arrow = match self.kind {
            ConnectionKind::Synchronous => "->",
            ConnectionKind::Delayed => "~>",
        };
        write!(f, "Connected {} {} {} in group '{}'", self.source, arrow, self.target, self.group)
    }
}

impl StructuredLog for SlotsConnected<'_> {
    fn log(&self) {
        tracing::debug!(
            group = self.group,
            source = self.source,
            target = self.target,
            kind = ?self.kind,
            "{}", self
        );
    }
}

/// # Log Level
/// `debug!` - Structural edit
pub struct SlotsDisconnected<'a> {
    pub group: &'a str,
    pub source: &'a str,
    pub target: &'a str,
}

impl Display for SlotsDisconnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Disconnected {} -> {} in group '{}'", self.source, self.target, self.group)
    }
}

impl StructuredLog for SlotsDisconnected<'_> {
    fn log(&self) {
        tracing::debug!(group = self.group, source = self.source, target = self.target, "{}", self);
    }
}

/// # Log Level
/// `debug!` - Structural edit
pub struct TriggerConnected<'a> {
    pub group: &'a str,
    pub trigger: &'a str,
    pub listener: &'a str,
}

impl Display for TriggerConnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Trigger '{}' now drives '{}' in group '{}'",
            self.trigger, self.listener, self.group
        )
    }
}

impl StructuredLog for TriggerConnected<'_> {
    fn log(&self) {
        tracing::debug!(group = self.group, trigger = self.trigger, listener = self.listener, "{}", self);
    }
}

/// # Log Level
/// `debug!` - Structural edit
pub struct TriggerDisconnected<'a> {
    pub group: &'a str,
    pub trigger: &'a str,
    pub listener: &'a str,
}

impl Display for TriggerDisconnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Trigger '{}' no longer drives '{}' in group '{}'",
            self.trigger, self.listener, self.group
        )
    }
}

impl StructuredLog for TriggerDisconnected<'_> {
    fn log(&self) {
        tracing::debug!(group = self.group, trigger = self.trigger, listener = self.listener, "{}", self);
    }
}

/// Steps of a pulse could not be ordered because of a synchronous cycle; they
/// run in discovery order.
///
/// # Log Level
/// `warn!` - The consistency checker reports the same cycle as an error
pub struct ScheduleCycle<'a> {
    pub trigger: &'a str,
    pub steps: &'a [String],
}

impl Display for ScheduleCycle<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pulse of '{}' contains a synchronous cycle through [{}]; running in discovery order",
            self.trigger,
            self.steps.join(", ")
        )
    }
}

impl StructuredLog for ScheduleCycle<'_> {
    fn log(&self) {
        tracing::warn!(trigger = self.trigger, steps = ?self.steps, "{}", self);
    }
}
