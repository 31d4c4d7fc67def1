// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Groups: named containers of steps, triggers and nested groups.
//!
//! A group owns the connection topology of its elements. Slots are addressed
//! by path:
//!
//! * `element.slot` - a slot of a direct element; for a nested group the slot
//!   is one of its connectors
//! * `slot` - one of this group's own connectors. Inside the group an input
//!   connector is a data source and an output connector a data target.
//!
//! Every structural mutation takes the topology lock exclusively. Nested groups
//! share the lock of the outermost group, and looped triggers hold it shared
//! while their pulses run, so an edit never interleaves with a pulse.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::{EngineConfig, DEFAULT_EVENT_CAPACITY};
use crate::data::{
    connect, disconnect, ConnectionKind, DataSlot, DataType, SlotOwner, SlotRole, SlotSpec, Validity,
};
use crate::engine::{
    ConsistencyChecker, ConsistencyIssue, Connectable, Element, ElementId, LoopMode, LoopState,
    LoopedTrigger, PulseReport, StepFault, StepNode, StepState, StepStats, Trigger, TriggerStats,
};
use crate::errors::{GraphError, TriggerError};
use crate::observability::messages::graph::{
    ElementAdded, ElementRemoved, SlotsConnected, SlotsDisconnected, TriggerConnected,
    TriggerDisconnected,
};
use crate::observability::messages::StructuredLog;
use crate::traits::Triggerable;

/// Structural change or runtime fault published to subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    ElementAdded {
        group: String,
        name: String,
        kind: String,
    },
    ElementRemoved {
        group: String,
        name: String,
    },
    ConnectorAdded {
        group: String,
        name: String,
        role: SlotRole,
    },
    ConnectorRemoved {
        group: String,
        name: String,
        role: SlotRole,
    },
    SlotsConnected {
        group: String,
        source: String,
        target: String,
        kind: ConnectionKind,
    },
    SlotsDisconnected {
        group: String,
        source: String,
        target: String,
    },
    TriggerConnected {
        group: String,
        trigger: String,
        listener: String,
    },
    TriggerDisconnected {
        group: String,
        trigger: String,
        listener: String,
    },
    TriggerStarted {
        trigger: String,
    },
    TriggerStopped {
        trigger: String,
    },
    StepFaulted {
        step: String,
        message: String,
    },
}

/// A data connection as recorded in the group's connection table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlotConnection {
    pub source: String,
    pub target: String,
    pub kind: ConnectionKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TriggerConnection {
    pub trigger: String,
    pub listener: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SlotSnapshot {
    pub name: String,
    pub role: SlotRole,
    pub data_type: String,
    pub optional: bool,
    pub validity: Validity,
    pub version: u64,
}

impl SlotSnapshot {
    fn of(slot: &DataSlot) -> Self {
        Self {
            name: slot.name().to_string(),
            role: slot.role(),
            data_type: slot.data_type().to_string(),
            optional: slot.is_optional(),
            validity: slot.validity(),
            version: slot.version(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementSnapshot {
    Step {
        name: String,
        type_name: String,
        state: StepState,
        slots: Vec<SlotSnapshot>,
        stats: StepStats,
    },
    Trigger {
        name: String,
        listeners: usize,
        stats: TriggerStats,
    },
    LoopedTrigger {
        name: String,
        state: LoopState,
        mode: LoopMode,
        step_size: Duration,
        simulated_time: Duration,
        stats: TriggerStats,
    },
    MultiTrigger {
        name: String,
        incoming: usize,
    },
    Group(GroupSnapshot),
}

/// Serializable view of a group for an external persistence or editor layer.
#[derive(Clone, Debug, Serialize)]
pub struct GroupSnapshot {
    pub name: String,
    pub connectors: Vec<SlotSnapshot>,
    pub elements: Vec<ElementSnapshot>,
    pub connections: Vec<SlotConnection>,
    pub trigger_connections: Vec<TriggerConnection>,
}

#[derive(Default)]
struct GroupInner {
    elements: Vec<(String, Element)>,
    connections: Vec<SlotConnection>,
    trigger_connections: Vec<TriggerConnection>,
}

impl GroupInner {
    fn find(&self, name: &str) -> Result<Element, GraphError> {
        self.elements
            .iter()
            .find(|(element_name, _)| element_name == name)
            .map(|(_, element)| element.clone())
            .ok_or_else(|| GraphError::UnknownElement {
                name: name.to_string(),
            })
    }
}

pub struct Group {
    id: ElementId,
    name: RwLock<String>,
    connectors: Connectable,
    topology: RwLock<Arc<RwLock<()>>>,
    events: RwLock<broadcast::Sender<GraphEvent>>,
    inner: RwLock<GroupInner>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_event_capacity(name, DEFAULT_EVENT_CAPACITY)
    }

    pub fn from_config(name: impl Into<String>, config: &EngineConfig) -> Arc<Self> {
        Self::with_event_capacity(name, config.events.capacity)
    }

    pub fn with_event_capacity(name: impl Into<String>, capacity: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(capacity.max(1));
        let id = ElementId::next();
        let name = name.into();
        Arc::new_cyclic(|weak: &Weak<Group>| Group {
            id,
            name: RwLock::new(name),
            connectors: Connectable::new(id, SlotOwner::Group(weak.clone())),
            topology: RwLock::new(Arc::new(RwLock::new(()))),
            events: RwLock::new(events),
            inner: RwLock::new(GroupInner::default()),
        })
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.write() = name.to_string();
    }

    /// This group's own input and output connectors.
    pub fn connectors(&self) -> &Connectable {
        &self.connectors
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.events.read().subscribe()
    }

    fn publish(&self, event: GraphEvent) {
        // Sending fails only when nobody subscribed.
        let _ = self.events.read().send(event);
    }

    fn topology(&self) -> Arc<RwLock<()>> {
        self.topology.read().clone()
    }

    /// Hands the outermost group's topology lock and event channel down the tree.
    pub(crate) fn adopt(&self, topology: Arc<RwLock<()>>, events: broadcast::Sender<GraphEvent>) {
        *self.topology.write() = topology.clone();
        *self.events.write() = events.clone();
        for (_, element) in &self.inner.read().elements {
            adopt_element(element, &topology, &events);
        }
    }

    fn contains_group(&self, id: ElementId) -> bool {
        self.inner.read().elements.iter().any(|(_, element)| match element {
            Element::Group(group) => group.id == id || group.contains_group(id),
            _ => false,
        })
    }

    pub(crate) fn has_running_triggers(&self) -> bool {
        self.all_looped_triggers()
            .iter()
            .any(|looped| looped.is_running())
    }

    /// Adds `element` under `name`, renaming it to match.
    pub fn add(&self, name: &str, element: impl Into<Element>) -> Result<(), GraphError> {
        let element = element.into();
        if name.is_empty() || name.contains('.') {
            return Err(GraphError::InvalidPath {
                path: name.to_string(),
            });
        }
        if let Element::Group(group) = &element {
            if group.id == self.id || group.contains_group(self.id) {
                return Err(GraphError::RecursiveNesting { name: group.name() });
            }
        }

        let topology = self.topology();
        let _exclusive = topology.write();
        let mut inner = self.inner.write();
        if inner.elements.iter().any(|(existing, _)| existing == name) {
            return Err(GraphError::DuplicateName {
                name: name.to_string(),
            });
        }

        element.set_name(name);
        adopt_element(&element, &topology, &self.events.read().clone());
        inner.elements.push((name.to_string(), element.clone()));
        drop(inner);

        ElementAdded {
            group: &self.name(),
            name,
            kind: element.kind(),
        }
        .log();
        self.publish(GraphEvent::ElementAdded {
            group: self.name(),
            name: name.to_string(),
            kind: element.kind().to_string(),
        });
        Ok(())
    }

    /// Removes an element after dropping every data and trigger connection that
    /// touches it. A running looped trigger cannot be removed.
    pub fn remove(&self, name: &str) -> Result<Element, GraphError> {
        let topology = self.topology();
        let _exclusive = topology.write();
        let mut inner = self.inner.write();

        let index = inner
            .elements
            .iter()
            .position(|(existing, _)| existing == name)
            .ok_or_else(|| GraphError::UnknownElement {
                name: name.to_string(),
            })?;
        let element = inner.elements[index].1.clone();
        match &element {
            Element::LoopedTrigger(looped) if looped.is_running() => {
                return Err(GraphError::ElementBusy {
                    name: name.to_string(),
                    reason: "looped trigger is running".to_string(),
                })
            }
            Element::Group(group) if group.has_running_triggers() => {
                return Err(GraphError::ElementBusy {
                    name: name.to_string(),
                    reason: "a nested looped trigger is running".to_string(),
                })
            }
            _ => {}
        }

        let (touching, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.connections)
            .into_iter()
            .partition(|c| path_element(&c.source) == Some(name) || path_element(&c.target) == Some(name));
        let mut removed_connections = touching.len();
        for connection in &touching {
            if let (Ok(source), Ok(target)) = (
                self.resolve_source(&inner, &connection.source),
                self.resolve_target(&inner, &connection.target),
            ) {
                disconnect(&source, &target);
            }
        }
        inner.connections = kept;
        removed_connections += sweep_outer_links(&element);

        let (touching, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.trigger_connections)
            .into_iter()
            .partition(|c| c.trigger == name || c.listener == name);
        inner.trigger_connections = kept;
        removed_connections += touching.len();

        let id = element.id();
        for (_, other) in &inner.elements {
            if let Some(source) = other.as_trigger_source() {
                source.remove_listener(id);
            }
        }
        if let Some(source) = element.as_trigger_source() {
            for listener in source.listener_ids() {
                source.remove_listener(listener);
            }
        }
        inner.elements.remove(index);
        drop(inner);

        if let Element::Group(group) = &element {
            let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
            group.adopt(Arc::new(RwLock::new(())), events);
        }
        if let Element::LoopedTrigger(looped) = &element {
            looped.set_topology(Arc::new(RwLock::new(())));
        }

        ElementRemoved {
            group: &self.name(),
            name,
            connections: removed_connections,
        }
        .log();
        self.publish(GraphEvent::ElementRemoved {
            group: self.name(),
            name: name.to_string(),
        });
        Ok(element)
    }

    pub fn add_input_connector(&self, name: &str, data_type: DataType) -> Result<Arc<DataSlot>, GraphError> {
        self.add_connector(SlotSpec::new(name, SlotRole::Input, data_type))
    }

    pub fn add_output_connector(&self, name: &str, data_type: DataType) -> Result<Arc<DataSlot>, GraphError> {
        self.add_connector(SlotSpec::new(name, SlotRole::Output, data_type))
    }

    fn add_connector(&self, spec: SlotSpec) -> Result<Arc<DataSlot>, GraphError> {
        let topology = self.topology();
        let _exclusive = topology.write();
        let role = spec.role;
        let slot = self.connectors.add_connector(spec)?;
        self.publish(GraphEvent::ConnectorAdded {
            group: self.name(),
            name: slot.name().to_string(),
            role,
        });
        Ok(slot)
    }

    /// Removes a connector no connection references any more.
    pub fn remove_connector(&self, role: SlotRole, name: &str) -> Result<(), GraphError> {
        let topology = self.topology();
        let _exclusive = topology.write();
        self.connectors.remove_slot(role, name)?;
        self.publish(GraphEvent::ConnectorRemoved {
            group: self.name(),
            name: name.to_string(),
            role,
        });
        Ok(())
    }

    /// Connects the slot at `source` to the slot at `target`.
    pub fn connect_slots(&self, source: &str, target: &str) -> Result<(), GraphError> {
        self.connect_with(source, target, ConnectionKind::Synchronous)
    }

    /// Connects across a pulse boundary: the target step reads the value the
    /// source held when its pulse started, and no activation flows along the
    /// connection. Delayed connections may close loops.
    pub fn connect_slots_delayed(&self, source: &str, target: &str) -> Result<(), GraphError> {
        self.connect_with(source, target, ConnectionKind::Delayed)
    }

    fn connect_with(&self, source: &str, target: &str, kind: ConnectionKind) -> Result<(), GraphError> {
        let topology = self.topology();
        let _exclusive = topology.write();
        let mut inner = self.inner.write();

        let from = self.resolve_source(&inner, source)?;
        let to = self.resolve_target(&inner, target)?;
        connect(&from, &to, kind).map_err(|err| err.with_paths(source, target))?;
        inner.connections.push(SlotConnection {
            source: source.to_string(),
            target: target.to_string(),
            kind,
        });
        drop(inner);

        SlotsConnected {
            group: &self.name(),
            source,
            target,
            kind,
        }
        .log();
        self.publish(GraphEvent::SlotsConnected {
            group: self.name(),
            source: source.to_string(),
            target: target.to_string(),
            kind,
        });
        Ok(())
    }

    /// Removes a data connection. Returns whether one existed; repeating the
    /// call is a no-op.
    pub fn disconnect_slots(&self, source: &str, target: &str) -> Result<bool, GraphError> {
        let topology = self.topology();
        let _exclusive = topology.write();
        let mut inner = self.inner.write();

        let from = self.resolve_source(&inner, source)?;
        let to = self.resolve_target(&inner, target)?;
        let linked = disconnect(&from, &to);
        let before = inner.connections.len();
        inner
            .connections
            .retain(|c| !(c.source == source && c.target == target));
        let removed = linked || inner.connections.len() != before;
        drop(inner);

        if removed {
            SlotsDisconnected {
                group: &self.name(),
                source,
                target,
            }
            .log();
            self.publish(GraphEvent::SlotsDisconnected {
                group: self.name(),
                source: source.to_string(),
                target: target.to_string(),
            });
        }
        Ok(removed)
    }

    /// Makes `listener` fire whenever `trigger` fires.
    ///
    /// `trigger` may name a trigger, looped trigger, multi trigger or step (its
    /// finished trigger). `listener` may name a step, trigger or multi trigger.
    pub fn connect_trigger(&self, trigger: &str, listener: &str) -> Result<(), GraphError> {
        let topology = self.topology();
        let _exclusive = topology.write();
        let mut inner = self.inner.write();

        let source = inner
            .find(trigger)?
            .as_trigger_source()
            .ok_or_else(|| GraphError::NotATrigger {
                name: trigger.to_string(),
            })?;
        match inner.find(listener)? {
            Element::Step(step) => source.add_step(&step)?,
            Element::Trigger(chained) => source.add_trigger(&chained)?,
            Element::MultiTrigger(multi) => {
                let multi: Arc<dyn Triggerable> = multi;
                source.add_triggerable(&multi)?
            }
            Element::LoopedTrigger(_) | Element::Group(_) => {
                return Err(GraphError::NotTriggerable {
                    name: listener.to_string(),
                })
            }
        }
        inner.trigger_connections.push(TriggerConnection {
            trigger: trigger.to_string(),
            listener: listener.to_string(),
        });
        drop(inner);

        TriggerConnected {
            group: &self.name(),
            trigger,
            listener,
        }
        .log();
        self.publish(GraphEvent::TriggerConnected {
            group: self.name(),
            trigger: trigger.to_string(),
            listener: listener.to_string(),
        });
        Ok(())
    }

    pub fn disconnect_trigger(&self, trigger: &str, listener: &str) -> Result<bool, GraphError> {
        let topology = self.topology();
        let _exclusive = topology.write();
        let mut inner = self.inner.write();

        let source = inner
            .find(trigger)?
            .as_trigger_source()
            .ok_or_else(|| GraphError::NotATrigger {
                name: trigger.to_string(),
            })?;
        let listener_id = inner.find(listener)?.id();
        let removed = source.remove_listener(listener_id);
        inner
            .trigger_connections
            .retain(|c| !(c.trigger == trigger && c.listener == listener));
        drop(inner);

        if removed {
            TriggerDisconnected {
                group: &self.name(),
                trigger,
                listener,
            }
            .log();
            self.publish(GraphEvent::TriggerDisconnected {
                group: self.name(),
                trigger: trigger.to_string(),
                listener: listener.to_string(),
            });
        }
        Ok(removed)
    }

    fn resolve_source(&self, inner: &GroupInner, path: &str) -> Result<Arc<DataSlot>, GraphError> {
        match split_path(path)? {
            (None, slot) => self.connectors.slot(SlotRole::Input, slot),
            (Some(element), slot) => match inner.find(element)? {
                Element::Step(step) => step
                    .slots()
                    .find(slot, &[SlotRole::Output, SlotRole::Buffer])
                    .ok_or_else(|| GraphError::UnknownSlot {
                        role: SlotRole::Output,
                        slot: path.to_string(),
                    }),
                Element::Group(group) => group.connectors.slot(SlotRole::Output, slot),
                _ => Err(GraphError::InvalidPath {
                    path: path.to_string(),
                }),
            },
        }
    }

    fn resolve_target(&self, inner: &GroupInner, path: &str) -> Result<Arc<DataSlot>, GraphError> {
        match split_path(path)? {
            (None, slot) => self.connectors.slot(SlotRole::Output, slot),
            (Some(element), slot) => match inner.find(element)? {
                Element::Step(step) => step.slots().slot(SlotRole::Input, slot),
                Element::Group(group) => group.connectors.slot(SlotRole::Input, slot),
                _ => Err(GraphError::InvalidPath {
                    path: path.to_string(),
                }),
            },
        }
    }

    /// Looks a slot up by path, in any role.
    pub fn slot(&self, path: &str) -> Result<Arc<DataSlot>, GraphError> {
        let all_roles = [SlotRole::Output, SlotRole::Buffer, SlotRole::Input];
        let unknown = || GraphError::UnknownSlot {
            role: SlotRole::Output,
            slot: path.to_string(),
        };
        let inner = self.inner.read();
        match split_path(path)? {
            (None, slot) => self.connectors.find(slot, &all_roles).ok_or_else(unknown),
            (Some(element), slot) => match inner.find(element)? {
                Element::Step(step) => step.slots().find(slot, &all_roles).ok_or_else(unknown),
                Element::Group(group) => group.connectors.find(slot, &all_roles).ok_or_else(unknown),
                _ => Err(GraphError::InvalidPath {
                    path: path.to_string(),
                }),
            },
        }
    }

    pub fn element(&self, name: &str) -> Option<Element> {
        self.inner.read().find(name).ok()
    }

    pub fn step(&self, name: &str) -> Option<Arc<StepNode>> {
        match self.element(name)? {
            Element::Step(step) => Some(step),
            _ => None,
        }
    }

    pub fn element_names(&self) -> Vec<String> {
        self.inner
            .read()
            .elements
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn connections(&self) -> Vec<SlotConnection> {
        self.inner.read().connections.clone()
    }

    pub fn trigger_connections(&self) -> Vec<TriggerConnection> {
        self.inner.read().trigger_connections.clone()
    }

    /// Steps of this group and all nested groups.
    pub fn all_steps(&self) -> Vec<Arc<StepNode>> {
        let mut steps = Vec::new();
        for (_, element) in &self.inner.read().elements {
            match element {
                Element::Step(step) => steps.push(step.clone()),
                Element::Group(group) => steps.extend(group.all_steps()),
                _ => {}
            }
        }
        steps
    }

    pub fn all_looped_triggers(&self) -> Vec<Arc<LoopedTrigger>> {
        let mut looped = Vec::new();
        for (_, element) in &self.inner.read().elements {
            match element {
                Element::LoopedTrigger(trigger) => looped.push(trigger.clone()),
                Element::Group(group) => looped.extend(group.all_looped_triggers()),
                _ => {}
            }
        }
        looped
    }

    /// Triggers that can start a pulse: plain, looped and multi triggers,
    /// including those of nested groups.
    pub(crate) fn all_trigger_sources(&self) -> Vec<Arc<Trigger>> {
        let mut triggers = Vec::new();
        for (_, element) in &self.inner.read().elements {
            match element {
                Element::Step(_) => {}
                Element::Group(group) => triggers.extend(group.all_trigger_sources()),
                other => triggers.extend(other.as_trigger_source()),
            }
        }
        triggers
    }

    pub fn check_consistency(&self) -> Vec<ConsistencyIssue> {
        ConsistencyChecker::check_group(self)
    }

    /// Starts every stopped looped trigger in this group and its nested groups.
    ///
    /// Nothing is started if any of them reaches a step with consistency
    /// errors. If a start fails, the triggers started by this call are stopped
    /// again.
    pub fn start_all_triggers(&self) -> Result<(), TriggerError> {
        let looped: Vec<_> = self
            .all_looped_triggers()
            .into_iter()
            .filter(|trigger| !trigger.is_running())
            .collect();

        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        for trigger in &looped {
            for issue in ConsistencyChecker::check_trigger(trigger.trigger()) {
                if issue.is_error() && seen.insert((issue.element.clone(), issue.kind.clone())) {
                    issues.push(issue);
                }
            }
        }
        if !issues.is_empty() {
            return Err(TriggerError::Inconsistent {
                trigger: self.name(),
                issues,
            });
        }

        let mut started: Vec<Arc<LoopedTrigger>> = Vec::new();
        for trigger in looped {
            if let Err(err) = trigger.start() {
                for running in &started {
                    // Best effort; the original error is the one reported.
                    let _ = running.stop_default();
                }
                return Err(err);
            }
            self.publish(GraphEvent::TriggerStarted {
                trigger: trigger.name(),
            });
            started.push(trigger);
        }
        Ok(())
    }

    /// Stops every running looped trigger, waiting up to `timeout` for each.
    /// Returns the first failure after trying all of them.
    pub fn stop_all_triggers(&self, timeout: Duration) -> Result<(), TriggerError> {
        let mut first_error = None;
        for trigger in self.all_looped_triggers() {
            if !trigger.is_running() {
                continue;
            }
            match trigger.stop(timeout) {
                Ok(()) => self.publish(GraphEvent::TriggerStopped {
                    trigger: trigger.name(),
                }),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Fires one pulse on every looped trigger that is not running.
    ///
    /// Without an explicit step the smallest configured step size is used for
    /// all of them.
    pub fn step_triggers(&self, step: Option<Duration>) -> Result<Vec<PulseReport>, TriggerError> {
        let looped: Vec<_> = self
            .all_looped_triggers()
            .into_iter()
            .filter(|trigger| !trigger.is_running())
            .collect();
        let Some(step) = step.or_else(|| looped.iter().map(|t| t.settings().step_size).min()) else {
            return Ok(Vec::new());
        };
        looped.iter().map(|trigger| trigger.step(step)).collect()
    }

    /// Resets every started or stopped step. Returns how many were reset.
    pub fn reset(&self) -> usize {
        self.all_steps()
            .iter()
            .filter(|step| step.state() != StepState::Constructed)
            .filter(|step| step.reset().is_ok())
            .count()
    }

    /// Recorded faults of every step, oldest first per step.
    pub fn faults(&self) -> Vec<StepFault> {
        self.all_steps()
            .iter()
            .flat_map(|step| step.faults())
            .collect()
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        let inner = self.inner.read();
        GroupSnapshot {
            name: self.name(),
            connectors: self
                .connectors
                .slots()
                .iter()
                .map(|slot| SlotSnapshot::of(slot))
                .collect(),
            elements: inner
                .elements
                .iter()
                .map(|(_, element)| snapshot_element(element))
                .collect(),
            connections: inner.connections.clone(),
            trigger_connections: inner.trigger_connections.clone(),
        }
    }
}

/// Stops the group's own looped triggers. Nested groups stop theirs when they
/// are dropped in turn.
impl Drop for Group {
    fn drop(&mut self) {
        for (_, element) in &self.inner.get_mut().elements {
            if let Element::LoopedTrigger(looped) = element {
                if looped.state() != LoopState::Stopped {
                    // A timeout is logged by the trigger.
                    let _ = looped.stop_default();
                }
            }
        }
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("elements", &self.element_names())
            .finish()
    }
}

fn adopt_element(
    element: &Element,
    topology: &Arc<RwLock<()>>,
    events: &broadcast::Sender<GraphEvent>,
) {
    match element {
        Element::Step(step) => step.set_events(events.clone()),
        Element::LoopedTrigger(looped) => looped.set_topology(topology.clone()),
        Element::Group(group) => group.adopt(topology.clone(), events.clone()),
        Element::Trigger(_) | Element::MultiTrigger(_) => {}
    }
}

/// Drops the links of an element's slots that lead out of it. A nested group's
/// internal wiring behind its connectors is left alone.
fn sweep_outer_links(element: &Element) -> usize {
    let mut removed = 0;
    match element {
        Element::Step(step) => {
            for slot in step.slots().slots() {
                if let Some(source) = slot.source() {
                    removed += disconnect(&source, &slot) as usize;
                }
                for (target, _) in slot.targets() {
                    removed += disconnect(&slot, &target) as usize;
                }
            }
        }
        Element::Group(group) => {
            for connector in group.connectors.inputs() {
                if let Some(source) = connector.source() {
                    removed += disconnect(&source, &connector) as usize;
                }
            }
            for connector in group.connectors.outputs() {
                for (target, _) in connector.targets() {
                    if target.owner_id() != group.id {
                        removed += disconnect(&connector, &target) as usize;
                    }
                }
            }
        }
        _ => {}
    }
    removed
}

fn split_path(path: &str) -> Result<(Option<&str>, &str), GraphError> {
    let invalid = || GraphError::InvalidPath {
        path: path.to_string(),
    };
    match path.split_once('.') {
        Some((element, slot)) => {
            if element.is_empty() || slot.is_empty() || slot.contains('.') {
                return Err(invalid());
            }
            Ok((Some(element), slot))
        }
        None if path.is_empty() => Err(invalid()),
        None => Ok((None, path)),
    }
}

fn path_element(path: &str) -> Option<&str> {
    path.split_once('.').map(|(element, _)| element)
}

fn snapshot_element(element: &Element) -> ElementSnapshot {
    match element {
        Element::Step(step) => ElementSnapshot::Step {
            name: step.name(),
            type_name: step.type_name().to_string(),
            state: step.state(),
            slots: step.slots().slots().iter().map(|slot| SlotSnapshot::of(slot)).collect(),
            stats: step.stats(),
        },
        Element::Trigger(trigger) => ElementSnapshot::Trigger {
            name: trigger.name(),
            listeners: trigger.listener_ids().len(),
            stats: trigger.stats(),
        },
        Element::LoopedTrigger(looped) => {
            let settings = looped.settings();
            ElementSnapshot::LoopedTrigger {
                name: looped.name(),
                state: looped.state(),
                mode: settings.mode,
                step_size: settings.step_size,
                simulated_time: looped.simulated_time(),
                stats: looped.trigger().stats(),
            }
        }
        Element::MultiTrigger(multi) => ElementSnapshot::MultiTrigger {
            name: multi.name(),
            incoming: multi.incoming().len(),
        },
        Element::Group(group) => ElementSnapshot::Group(group.snapshot()),
    }
}
