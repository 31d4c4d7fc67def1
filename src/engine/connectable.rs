// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use crate::data::{DataSlot, SlotOwner, SlotRole, SlotSpec, Validity};
use crate::engine::ElementId;
use crate::errors::GraphError;

/// The slot set of a step or the connector set of a group.
///
/// Slot names are unique per role, so a step may declare both an input and an
/// output called `value`. Slots are kept in declaration order.
pub struct Connectable {
    owner_id: ElementId,
    owner: SlotOwner,
    slots: RwLock<Vec<Arc<DataSlot>>>,
}

impl Connectable {
    pub(crate) fn new(owner_id: ElementId, owner: SlotOwner) -> Self {
        Self {
            owner_id,
            owner,
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Builds the slot set from declarations already checked by [`Connectable::validate_specs`].
    pub(crate) fn with_slots(owner_id: ElementId, owner: SlotOwner, specs: Vec<SlotSpec>) -> Self {
        let slots = specs
            .into_iter()
            .map(|spec| Arc::new(DataSlot::new(spec, owner_id, owner.clone(), false)))
            .collect();
        Self {
            owner_id,
            owner,
            slots: RwLock::new(slots),
        }
    }

    pub(crate) fn validate_specs(specs: &[SlotSpec]) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for spec in specs {
            if !seen.insert((spec.role, spec.name.as_str())) {
                return Err(GraphError::DuplicateName {
                    name: spec.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn owner_id(&self) -> ElementId {
        self.owner_id
    }

    pub fn add_slot(&self, spec: SlotSpec) -> Result<Arc<DataSlot>, GraphError> {
        self.insert(spec, false)
    }

    pub(crate) fn add_connector(&self, spec: SlotSpec) -> Result<Arc<DataSlot>, GraphError> {
        self.insert(spec, true)
    }

    fn insert(&self, spec: SlotSpec, connector: bool) -> Result<Arc<DataSlot>, GraphError> {
        let mut slots = self.slots.write();
        if slots
            .iter()
            .any(|slot| slot.role() == spec.role && slot.name() == spec.name)
        {
            return Err(GraphError::DuplicateName { name: spec.name });
        }
        let slot = Arc::new(DataSlot::new(
            spec,
            self.owner_id,
            self.owner.clone(),
            connector,
        ));
        slots.push(slot.clone());
        Ok(slot)
    }

    /// Removes a slot that no connection references any more.
    pub fn remove_slot(&self, role: SlotRole, name: &str) -> Result<(), GraphError> {
        let mut slots = self.slots.write();
        let index = slots
            .iter()
            .position(|slot| slot.role() == role && slot.name() == name)
            .ok_or_else(|| GraphError::UnknownSlot {
                role,
                slot: name.to_string(),
            })?;
        if slots[index].is_connected() {
            return Err(GraphError::SlotInUse {
                slot: name.to_string(),
            });
        }
        slots.remove(index);
        Ok(())
    }

    pub fn slot(&self, role: SlotRole, name: &str) -> Result<Arc<DataSlot>, GraphError> {
        self.slots
            .read()
            .iter()
            .find(|slot| slot.role() == role && slot.name() == name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownSlot {
                role,
                slot: name.to_string(),
            })
    }

    /// First slot with the given name, trying roles in the order given.
    pub fn find(&self, name: &str, roles: &[SlotRole]) -> Option<Arc<DataSlot>> {
        roles
            .iter()
            .find_map(|role| self.slot(*role, name).ok())
    }

    pub fn slots(&self) -> Vec<Arc<DataSlot>> {
        self.slots.read().clone()
    }

    pub fn inputs(&self) -> Vec<Arc<DataSlot>> {
        self.with_role(SlotRole::Input)
    }

    pub fn outputs(&self) -> Vec<Arc<DataSlot>> {
        self.with_role(SlotRole::Output)
    }

    pub fn buffers(&self) -> Vec<Arc<DataSlot>> {
        self.with_role(SlotRole::Buffer)
    }

    fn with_role(&self, role: SlotRole) -> Vec<Arc<DataSlot>> {
        self.slots
            .read()
            .iter()
            .filter(|slot| slot.role() == role)
            .cloned()
            .collect()
    }

    /// Slots that hold their own data: outputs and buffers.
    pub(crate) fn owned(&self) -> Vec<Arc<DataSlot>> {
        self.slots
            .read()
            .iter()
            .filter(|slot| slot.is_owned())
            .cloned()
            .collect()
    }

    pub fn mandatory_inputs_valid(&self) -> bool {
        self.slots
            .read()
            .iter()
            .filter(|slot| slot.role() == SlotRole::Input && !slot.is_optional())
            .all(|slot| slot.validity() == Validity::Valid)
    }

    pub(crate) fn invalidate_outputs(&self) {
        for slot in self.outputs() {
            slot.set_validity(Validity::Invalid);
        }
    }

    pub(crate) fn clear_owned(&self) {
        for slot in self.owned() {
            slot.clear();
        }
    }

    pub(crate) fn latch_inputs(&self) {
        for slot in self.inputs() {
            slot.latch();
        }
    }
}

impl std::fmt::Debug for Connectable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connectable")
            .field("owner_id", &self.owner_id)
            .field("slots", &self.slots.read().len())
            .finish()
    }
}
