// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::RwLock;
use serde::Serialize;
use std::any::Any;
use std::sync::{Arc, Weak};

use crate::data::{ConnectionKind, Data, DataType};
use crate::engine::{ElementId, Group, StepNode};

/// Forwarding chains longer than this are treated as dangling.
const MAX_FORWARDING_DEPTH: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRole {
    Input,
    Output,
    Buffer,
}

impl SlotRole {
    /// Outputs and buffers hold their own data; inputs only link to a producer.
    pub fn is_owned(&self) -> bool {
        matches!(self, SlotRole::Output | SlotRole::Buffer)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    Valid,
    Invalid,
    /// Nothing has been computed into the slot yet.
    #[default]
    Unknown,
}

/// Declaration of a slot, as returned by [`Step::slots`](crate::traits::Step::slots).
#[derive(Clone, Debug)]
pub struct SlotSpec {
    pub name: String,
    pub role: SlotRole,
    pub data_type: DataType,
    pub optional: bool,
    pub initial: Option<Data>,
}

impl SlotSpec {
    pub fn new(name: impl Into<String>, role: SlotRole, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            role,
            data_type,
            optional: false,
            initial: None,
        }
    }

    pub fn input<T: Any>(name: impl Into<String>) -> Self {
        Self::new(name, SlotRole::Input, DataType::of::<T>())
    }

    pub fn optional_input<T: Any>(name: impl Into<String>) -> Self {
        Self::input::<T>(name).optional()
    }

    pub fn output<T: Any>(name: impl Into<String>) -> Self {
        Self::new(name, SlotRole::Output, DataType::of::<T>())
    }

    pub fn buffer<T: Any>(name: impl Into<String>) -> Self {
        Self::new(name, SlotRole::Buffer, DataType::of::<T>())
    }

    /// A slot accepting or producing any data type.
    pub fn untyped(name: impl Into<String>, role: SlotRole) -> Self {
        Self::new(name, role, DataType::Any)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Data an owned slot holds from construction on and returns to on reset.
    pub fn with_initial<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.initial = Some(Data::new(value));
        self
    }
}

/// Element a slot belongs to. Held weakly so slots never keep their owner alive.
#[derive(Clone)]
pub(crate) enum SlotOwner {
    Step(Weak<StepNode>),
    Group(Weak<Group>),
}

#[derive(Clone)]
pub(crate) struct SlotLink {
    pub(crate) slot: Weak<DataSlot>,
    pub(crate) kind: ConnectionKind,
}

#[derive(Default)]
struct SlotState {
    data: Option<Data>,
    validity: Validity,
    version: u64,
    source: Option<SlotLink>,
    targets: Vec<SlotLink>,
    latched: (Option<Data>, Validity),
}

/// A named, typed port of a step or group.
///
/// Owned slots (step outputs and buffers) hold their `Data` exclusively and are
/// written only by their step's trigger thread. Inputs and group connectors
/// hold a non-owning link to the slot they read from; reading them resolves the
/// link chain down to the owning slot. All state sits behind one read/write
/// lock, so readers on any thread see either the previous or the new value.
pub struct DataSlot {
    name: String,
    role: SlotRole,
    data_type: DataType,
    optional: bool,
    connector: bool,
    owner_id: ElementId,
    owner: SlotOwner,
    initial: Option<Data>,
    state: RwLock<SlotState>,
}

impl DataSlot {
    pub(crate) fn new(spec: SlotSpec, owner_id: ElementId, owner: SlotOwner, connector: bool) -> Self {
        let initial = spec.initial.filter(|_| spec.role.is_owned() && !connector);
        let mut state = SlotState::default();
        if let Some(initial) = &initial {
            state.version = 1;
            state.data = Some(initial.clone().with_version(1));
            state.validity = Validity::Valid;
        }

        Self {
            name: spec.name,
            role: spec.role,
            data_type: spec.data_type,
            optional: spec.optional,
            connector,
            owner_id,
            owner,
            initial,
            state: RwLock::new(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> SlotRole {
        self.role
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Group connectors forward data across a group boundary and own nothing.
    pub fn is_connector(&self) -> bool {
        self.connector
    }

    pub fn is_owned(&self) -> bool {
        self.role.is_owned() && !self.connector
    }

    pub fn owner_id(&self) -> ElementId {
        self.owner_id
    }

    pub(crate) fn owner(&self) -> &SlotOwner {
        &self.owner
    }

    pub(crate) fn owner_step(&self) -> Option<Arc<StepNode>> {
        match &self.owner {
            SlotOwner::Step(step) => step.upgrade(),
            SlotOwner::Group(_) => None,
        }
    }

    pub fn data(&self) -> Option<Data> {
        self.snapshot().0
    }

    pub fn validity(&self) -> Validity {
        self.snapshot().1
    }

    /// Change version of the data this slot currently resolves to.
    pub fn version(&self) -> u64 {
        self.data().map(|d| d.version()).unwrap_or(0)
    }

    /// Data and validity read under a single lock acquisition of the owning slot.
    pub fn snapshot(&self) -> (Option<Data>, Validity) {
        self.snapshot_at(0)
    }

    fn snapshot_at(&self, depth: usize) -> (Option<Data>, Validity) {
        let state = self.state.read();
        if self.is_owned() {
            return (state.data.clone(), state.validity);
        }

        let link = match &state.source {
            Some(link) => link.clone(),
            None => return (None, Validity::Invalid),
        };
        if link.kind == ConnectionKind::Delayed {
            return state.latched.clone();
        }
        drop(state);

        if depth >= MAX_FORWARDING_DEPTH {
            return (None, Validity::Invalid);
        }
        link.slot
            .upgrade()
            .map(|source| source.snapshot_at(depth + 1))
            .unwrap_or((None, Validity::Invalid))
    }

    pub fn source(&self) -> Option<Arc<DataSlot>> {
        self.state.read().source.as_ref().and_then(|link| link.slot.upgrade())
    }

    pub fn source_kind(&self) -> Option<ConnectionKind> {
        self.state.read().source.as_ref().map(|link| link.kind)
    }

    pub fn targets(&self) -> Vec<(Arc<DataSlot>, ConnectionKind)> {
        self.state
            .read()
            .targets
            .iter()
            .filter_map(|link| link.slot.upgrade().map(|slot| (slot, link.kind)))
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        let state = self.state.read();
        state.source.as_ref().is_some_and(|link| link.slot.strong_count() > 0)
            || state.targets.iter().any(|link| link.slot.strong_count() > 0)
    }

    /// The owned slot whose data this slot forwards, following connector chains.
    pub fn producer(&self) -> Option<Arc<DataSlot>> {
        let mut current = self.source()?;
        for _ in 0..MAX_FORWARDING_DEPTH {
            if current.is_owned() {
                return Some(current);
            }
            current = current.source()?;
        }
        None
    }

    pub(crate) fn write(&self, data: Data) {
        let mut state = self.state.write();
        state.version += 1;
        let version = state.version;
        state.data = Some(data.with_version(version));
        state.validity = Validity::Valid;
    }

    pub(crate) fn set_validity(&self, validity: Validity) {
        self.state.write().validity = validity;
    }

    /// Drops the held data, or restores the initial value if the slot has one.
    /// The change version keeps counting from where it was.
    pub(crate) fn clear(&self) {
        let mut state = self.state.write();
        state.latched = (None, Validity::Unknown);
        match &self.initial {
            Some(initial) => {
                state.version += 1;
                let version = state.version;
                state.data = Some(initial.clone().with_version(version));
                state.validity = Validity::Valid;
            }
            None => {
                state.data = None;
                state.validity = Validity::Unknown;
            }
        }
    }

    /// Captures the producer's current value for a delayed input.
    pub(crate) fn latch(&self) {
        let link = match self.state.read().source.clone() {
            Some(link) if link.kind == ConnectionKind::Delayed => link,
            _ => return,
        };
        let value = link
            .slot
            .upgrade()
            .map(|source| source.snapshot())
            .unwrap_or((None, Validity::Invalid));
        self.state.write().latched = value;
    }

    /// Sets the incoming link unless a live one already exists.
    pub(crate) fn try_attach_source(&self, link: SlotLink) -> bool {
        let mut state = self.state.write();
        if state.source.as_ref().is_some_and(|existing| existing.slot.strong_count() > 0) {
            return false;
        }
        state.source = Some(link);
        state.latched = (None, Validity::Unknown);
        true
    }

    pub(crate) fn has_live_source(&self) -> bool {
        self.state
            .read()
            .source
            .as_ref()
            .is_some_and(|link| link.slot.strong_count() > 0)
    }

    pub(crate) fn detach_source(&self) {
        let mut state = self.state.write();
        state.source = None;
        state.latched = (None, Validity::Unknown);
    }

    pub(crate) fn add_target(&self, link: SlotLink) {
        let mut state = self.state.write();
        state.targets.retain(|existing| existing.slot.strong_count() > 0);
        state.targets.push(link);
    }

    pub(crate) fn remove_target(&self, target: &Arc<DataSlot>) -> bool {
        let mut state = self.state.write();
        let before = state.targets.len();
        let target = Arc::downgrade(target);
        state
            .targets
            .retain(|link| !link.slot.ptr_eq(&target) && link.slot.strong_count() > 0);
        state.targets.len() != before
    }
}

impl std::fmt::Debug for DataSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSlot")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("data_type", &self.data_type.name())
            .field("optional", &self.optional)
            .field("connector", &self.connector)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(spec: SlotSpec) -> Arc<DataSlot> {
        Arc::new(DataSlot::new(spec, ElementId::next(), SlotOwner::Step(Weak::new()), false))
    }

    #[test]
    fn test_new_output_is_unknown_and_empty() {
        let out = slot(SlotSpec::output::<f64>("value"));
        assert_eq!(out.validity(), Validity::Unknown);
        assert!(out.data().is_none());
        assert_eq!(out.version(), 0);
    }

    #[test]
    fn test_initial_data_is_valid() {
        let out = slot(SlotSpec::output::<f64>("value").with_initial(3.0_f64));
        assert_eq!(out.validity(), Validity::Valid);
        assert_eq!(out.data().unwrap().downcast_ref::<f64>(), Some(&3.0));
        assert_eq!(out.version(), 1);
    }

    #[test]
    fn test_write_bumps_version_and_validates() {
        let out = slot(SlotSpec::output::<f64>("value"));
        out.write(Data::new(1.0_f64));
        out.write(Data::new(2.0_f64));
        assert_eq!(out.validity(), Validity::Valid);
        assert_eq!(out.version(), 2);
        assert_eq!(out.data().unwrap().downcast_ref::<f64>(), Some(&2.0));
    }

    #[test]
    fn test_clear_keeps_version_counter() {
        let out = slot(SlotSpec::output::<f64>("value"));
        out.write(Data::new(1.0_f64));
        out.clear();
        assert!(out.data().is_none());
        assert_eq!(out.validity(), Validity::Unknown);
        out.write(Data::new(5.0_f64));
        assert_eq!(out.version(), 2);
    }

    #[test]
    fn test_clear_restores_initial_value() {
        let buffer = slot(SlotSpec::buffer::<f64>("sum").with_initial(0.0_f64));
        buffer.write(Data::new(7.0_f64));
        buffer.clear();
        assert_eq!(buffer.validity(), Validity::Valid);
        assert_eq!(buffer.data().unwrap().downcast_ref::<f64>(), Some(&0.0));
        assert_eq!(buffer.version(), 3);
    }

    #[test]
    fn test_unconnected_input_is_invalid() {
        let input = slot(SlotSpec::input::<f64>("input"));
        let (data, validity) = input.snapshot();
        assert!(data.is_none());
        assert_eq!(validity, Validity::Invalid);
        assert!(!input.is_connected());
    }
}
