// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::Any;
use std::time::Duration;

use crate::data::{Data, DataType, SlotRole, SlotSpec, Validity};
use crate::engine::{Connectable, TriggerContext};
use crate::errors::ComputeError;

/// A computation unit.
///
/// The engine wraps each step in a [`StepNode`](crate::engine::StepNode) that
/// owns the slots declared by [`Step::slots`] and calls [`Step::compute`] when a
/// trigger pulse reaches it. `compute` runs on the firing trigger's thread and
/// should not block: a blocking step stalls every step on the same trigger.
///
/// `compute` is only called when every non-optional input holds valid data.
/// Returning an error (or panicking) invalidates the step's outputs and records
/// a fault; the trigger keeps running.
pub trait Step: Send {
    /// Short type label used in snapshots and log output.
    fn type_name(&self) -> &'static str;

    fn slots(&self) -> Vec<SlotSpec>;

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError>;

    /// Called when the first looped trigger reaching the step starts.
    fn on_start(&mut self) {}

    /// Called when the last looped trigger reaching the step stops.
    fn on_stop(&mut self) {}

    /// Drops transient state. Owned slots are cleared by the engine afterwards.
    fn reset(&mut self) {}
}

/// View of a step's slots and the current pulse handed to [`Step::compute`].
pub struct ComputeContext<'a> {
    step: &'a str,
    slots: &'a Connectable,
    trigger: &'a TriggerContext,
}

impl<'a> ComputeContext<'a> {
    pub(crate) fn new(step: &'a str, slots: &'a Connectable, trigger: &'a TriggerContext) -> Self {
        Self {
            step,
            slots,
            trigger,
        }
    }

    pub fn step_name(&self) -> &str {
        self.step
    }

    /// Duration of the pulse being computed.
    pub fn step_size(&self) -> Duration {
        self.trigger.step_size
    }

    /// Simulated time of the firing trigger, including this pulse.
    pub fn time(&self) -> Duration {
        self.trigger.simulated_time
    }

    pub fn trigger_name(&self) -> &str {
        &self.trigger.source
    }

    /// Data of an input or buffer. Fails when the slot holds no valid data.
    pub fn input(&self, name: &str) -> Result<Data, ComputeError> {
        let slot = self
            .slots
            .find(name, &[SlotRole::Input, SlotRole::Buffer])
            .ok_or_else(|| ComputeError::UnknownSlot {
                slot: name.to_string(),
            })?;
        match slot.snapshot() {
            (Some(data), Validity::Valid) => Ok(data),
            _ => Err(ComputeError::MissingInput {
                slot: name.to_string(),
            }),
        }
    }

    pub fn read<T: Any + Clone>(&self, name: &str) -> Result<T, ComputeError> {
        let data = self.input(name)?;
        data.downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ComputeError::TypeMismatch {
                slot: name.to_string(),
                expected: DataType::of::<T>(),
                found: data.data_type(),
            })
    }

    /// Like [`ComputeContext::read`], but an input without valid data reads as `None`.
    pub fn read_optional<T: Any + Clone>(&self, name: &str) -> Result<Option<T>, ComputeError> {
        match self.read::<T>(name) {
            Ok(value) => Ok(Some(value)),
            Err(ComputeError::MissingInput { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Publishes a new value on an output or buffer, bumping its change version.
    pub fn write<T: Any + Send + Sync>(&mut self, name: &str, value: T) -> Result<(), ComputeError> {
        self.write_data(name, Data::new(value))
    }

    pub fn write_data(&mut self, name: &str, data: Data) -> Result<(), ComputeError> {
        let slot = self
            .slots
            .find(name, &[SlotRole::Output, SlotRole::Buffer])
            .ok_or_else(|| ComputeError::UnknownSlot {
                slot: name.to_string(),
            })?;
        if !data.data_type().is_compatible_with(&slot.data_type()) {
            return Err(ComputeError::TypeMismatch {
                slot: name.to_string(),
                expected: slot.data_type(),
                found: data.data_type(),
            });
        }
        slot.write(data);
        Ok(())
    }
}
