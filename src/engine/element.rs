// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::{Group, LoopedTrigger, MultiTrigger, StepNode, Trigger};

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a step, trigger or group.
///
/// Names can change when an element is added to a group; ids never do, so the
/// scheduler and the listener lists key on them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementId(u64);

impl ElementId {
    pub(crate) fn next() -> Self {
        ElementId(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything a [`Group`] can hold under a name.
#[derive(Clone)]
pub enum Element {
    Step(Arc<StepNode>),
    Trigger(Arc<Trigger>),
    LoopedTrigger(Arc<LoopedTrigger>),
    MultiTrigger(Arc<MultiTrigger>),
    Group(Arc<Group>),
}

impl Element {
    pub fn id(&self) -> ElementId {
        match self {
            Element::Step(step) => step.id(),
            Element::Trigger(trigger) => trigger.id(),
            Element::LoopedTrigger(looped) => looped.id(),
            Element::MultiTrigger(multi) => multi.id(),
            Element::Group(group) => group.id(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Element::Step(step) => step.name(),
            Element::Trigger(trigger) => trigger.name(),
            Element::LoopedTrigger(looped) => looped.name(),
            Element::MultiTrigger(multi) => multi.name(),
            Element::Group(group) => group.name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Element::Step(_) => "step",
            Element::Trigger(_) => "trigger",
            Element::LoopedTrigger(_) => "looped_trigger",
            Element::MultiTrigger(_) => "multi_trigger",
            Element::Group(_) => "group",
        }
    }

    pub(crate) fn set_name(&self, name: &str) {
        match self {
            Element::Step(step) => step.set_name(name),
            Element::Trigger(trigger) => trigger.set_name(name),
            Element::LoopedTrigger(looped) => looped.trigger().set_name(name),
            Element::MultiTrigger(multi) => multi.trigger().set_name(name),
            Element::Group(group) => group.set_name(name),
        }
    }

    /// The trigger that fires when this element is used as a trigger source.
    pub(crate) fn as_trigger_source(&self) -> Option<Arc<Trigger>> {
        match self {
            Element::Step(step) => Some(step.finished_trigger().clone()),
            Element::Trigger(trigger) => Some(trigger.clone()),
            Element::LoopedTrigger(looped) => Some(looped.trigger().clone()),
            Element::MultiTrigger(multi) => Some(multi.trigger().clone()),
            Element::Group(_) => None,
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("id", &self.id())
            .finish()
    }
}

impl From<Arc<StepNode>> for Element {
    fn from(step: Arc<StepNode>) -> Self {
        Element::Step(step)
    }
}

impl From<Arc<Trigger>> for Element {
    fn from(trigger: Arc<Trigger>) -> Self {
        Element::Trigger(trigger)
    }
}

impl From<Arc<LoopedTrigger>> for Element {
    fn from(looped: Arc<LoopedTrigger>) -> Self {
        Element::LoopedTrigger(looped)
    }
}

impl From<Arc<MultiTrigger>> for Element {
    fn from(multi: Arc<MultiTrigger>) -> Self {
        Element::MultiTrigger(multi)
    }
}

impl From<Arc<Group>> for Element {
    fn from(group: Arc<Group>) -> Self {
        Element::Group(group)
    }
}
