// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Test doubles for engine tests.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::data::SlotSpec;
use crate::engine::{ElementId, TriggerContext};
use crate::errors::ComputeError;
use crate::traits::{ComputeContext, Step, Triggerable};

/// A step that always fails with the given message.
pub struct FailingStep {
    message: String,
}

impl FailingStep {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Step for FailingStep {
    fn type_name(&self) -> &'static str {
        "failing"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::output::<f64>("out")]
    }

    fn compute(&mut self, _ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        Err(ComputeError::failed(self.message.clone()))
    }
}

/// A step whose compute panics.
pub struct PanickingStep;

impl Step for PanickingStep {
    fn type_name(&self) -> &'static str {
        "panicking"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::output::<f64>("out")]
    }

    fn compute(&mut self, _ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        panic!("simulated step panic")
    }
}

pub type ComputeLog = Arc<Mutex<Vec<String>>>;

enum Shape {
    Empty,
    Source,
    Relay,
    Join,
}

/// A step that appends its name to a shared log when it computes.
pub struct RecordingStep {
    name: String,
    log: ComputeLog,
    shape: Shape,
}

impl RecordingStep {
    pub fn log() -> ComputeLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn with_shape(name: &str, log: &ComputeLog, shape: Shape) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
            shape,
        }
    }

    /// No slots.
    pub fn new(name: &str, log: &ComputeLog) -> Self {
        Self::with_shape(name, log, Shape::Empty)
    }

    /// Output `out`.
    pub fn source(name: &str, log: &ComputeLog) -> Self {
        Self::with_shape(name, log, Shape::Source)
    }

    /// Input `in`, output `out`.
    pub fn relay(name: &str, log: &ComputeLog) -> Self {
        Self::with_shape(name, log, Shape::Relay)
    }

    /// Inputs `a` and `b`, output `out`.
    pub fn join(name: &str, log: &ComputeLog) -> Self {
        Self::with_shape(name, log, Shape::Join)
    }
}

impl Step for RecordingStep {
    fn type_name(&self) -> &'static str {
        "recording"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        match self.shape {
            Shape::Empty => Vec::new(),
            Shape::Source => vec![SlotSpec::output::<f64>("out")],
            Shape::Relay => vec![
                SlotSpec::input::<f64>("in"),
                SlotSpec::output::<f64>("out"),
            ],
            Shape::Join => vec![
                SlotSpec::input::<f64>("a"),
                SlotSpec::input::<f64>("b"),
                SlotSpec::output::<f64>("out"),
            ],
        }
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        self.log.lock().push(self.name.clone());
        match self.shape {
            Shape::Empty => Ok(()),
            Shape::Source => ctx.write("out", 1.0_f64),
            Shape::Relay => {
                let value: f64 = ctx.read("in")?;
                ctx.write("out", value)
            }
            Shape::Join => {
                let a: f64 = ctx.read("a")?;
                let b: f64 = ctx.read("b")?;
                ctx.write("out", a + b)
            }
        }
    }
}

type Gate = Arc<(Mutex<bool>, Condvar)>;

/// A step whose compute blocks until the paired [`BlockingRelease`] is released.
pub struct BlockingStep {
    gate: Gate,
}

pub struct BlockingRelease {
    gate: Gate,
}

impl BlockingStep {
    pub fn new() -> (Self, BlockingRelease) {
        let gate: Gate = Arc::new((Mutex::new(false), Condvar::new()));
        (
            Self {
                gate: Arc::clone(&gate),
            },
            BlockingRelease { gate },
        )
    }
}

impl BlockingRelease {
    pub fn release(&self) {
        let (released, changed) = &*self.gate;
        *released.lock() = true;
        changed.notify_all();
    }
}

impl Step for BlockingStep {
    fn type_name(&self) -> &'static str {
        "blocking"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        Vec::new()
    }

    fn compute(&mut self, _ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let (released, changed) = &*self.gate;
        let mut released = released.lock();
        while !*released {
            changed.wait(&mut released);
        }
        Ok(())
    }
}

/// A custom listener counting pulses and tracking connect notifications.
pub struct RecordingListener {
    id: ElementId,
    name: String,
    pulses: AtomicUsize,
    connected: Mutex<Vec<ElementId>>,
}

impl RecordingListener {
    pub fn new(name: &str) -> Self {
        Self {
            id: ElementId::next(),
            name: name.to_string(),
            pulses: AtomicUsize::new(0),
            connected: Mutex::new(Vec::new()),
        }
    }

    pub fn pulses(&self) -> usize {
        self.pulses.load(Ordering::SeqCst)
    }

    pub fn connected(&self) -> Vec<ElementId> {
        self.connected.lock().clone()
    }
}

impl Triggerable for RecordingListener {
    fn id(&self) -> ElementId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn on_trigger(&self, _ctx: &TriggerContext, _sender: ElementId) -> bool {
        self.pulses.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn on_connected(&self, trigger: ElementId) {
        self.connected.lock().push(trigger);
    }

    fn on_disconnected(&self, trigger: ElementId) {
        self.connected.lock().retain(|id| *id != trigger);
    }
}
