// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The execution engine.
//!
//! * [`StepNode`] wraps a [`Step`](crate::traits::Step) with its slots and lifecycle
//! * [`Trigger`] runs pulses over its listeners; [`LoopedTrigger`] fires one
//!   from its own thread and [`MultiTrigger`] joins several triggers
//! * [`Group`] holds elements and owns the connection topology
//! * [`ConsistencyChecker`] reports what would keep a pulse from producing valid data

pub mod connectable;
pub mod consistency;
pub mod element;
pub mod group;
pub mod looped_trigger;
pub mod multi_trigger;
pub(crate) mod schedule;
pub mod step_node;
pub mod trigger;

pub use connectable::Connectable;
pub use consistency::{ConsistencyChecker, ConsistencyIssue, IssueKind, Severity};
pub use element::{Element, ElementId};
pub use group::{
    ElementSnapshot, GraphEvent, Group, GroupSnapshot, SlotConnection, SlotSnapshot,
    TriggerConnection,
};
pub use looped_trigger::{LoopMode, LoopSettings, LoopState, LoopTimer, LoopedTrigger, TickPlan};
pub use multi_trigger::MultiTrigger;
pub use step_node::{StepFault, StepNode, StepOutcome, StepState, StepStats};
pub use trigger::{PulseReport, Trigger, TriggerContext, TriggerStats};
