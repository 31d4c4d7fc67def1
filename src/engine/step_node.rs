// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::broadcast;

use crate::config::DEFAULT_FAULT_HISTORY;
use crate::data::SlotOwner;
use crate::engine::{Connectable, ElementId, GraphEvent, Trigger, TriggerContext};
use crate::errors::{ComputeError, GraphError};
use crate::observability::messages::step::{
    StepFaulted, StepInputsInvalid, StepReset, StepStarted, StepStopped,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{ComputeContext, Step};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    #[default]
    Constructed,
    Started,
    Stopped,
}

/// What happened when a pulse reached a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Computed,
    /// A mandatory input had no valid data; outputs were invalidated.
    Skipped,
    Faulted,
}

/// A recorded computation failure.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepFault {
    pub step: String,
    pub message: String,
    pub timestamp: SystemTime,
    pub simulated_time: Duration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StepStats {
    pub computes: u64,
    pub skips: u64,
    pub faults: u64,
    pub last_compute_duration: Duration,
    /// Latest simulated time at which the step computed. Never decreases.
    pub last_compute_time: Duration,
}

/// A [`Step`] together with its slots, lifecycle and bookkeeping.
///
/// Every node owns a "finished" [`Trigger`] that is fired right after the node
/// in each pulse, so further steps and triggers can be chained behind it.
pub struct StepNode {
    id: ElementId,
    name: RwLock<String>,
    type_name: &'static str,
    slots: Connectable,
    step: Mutex<Box<dyn Step>>,
    lifecycle: Mutex<Lifecycle>,
    busy: AtomicBool,
    finished: Arc<Trigger>,
    faults: Mutex<VecDeque<StepFault>>,
    fault_capacity: usize,
    stats: Mutex<StepStats>,
    events: RwLock<Option<broadcast::Sender<GraphEvent>>>,
}

#[derive(Default)]
struct Lifecycle {
    state: StepState,
    /// Number of running looped triggers that started this step.
    starts: usize,
}

impl StepNode {
    pub fn new(name: impl Into<String>, step: impl Step + 'static) -> Result<Arc<Self>, GraphError> {
        Self::with_fault_history(name, step, DEFAULT_FAULT_HISTORY)
    }

    pub fn with_fault_history(
        name: impl Into<String>,
        step: impl Step + 'static,
        fault_capacity: usize,
    ) -> Result<Arc<Self>, GraphError> {
        Self::from_boxed(name.into(), Box::new(step), fault_capacity)
    }

    pub fn from_boxed(
        name: String,
        step: Box<dyn Step>,
        fault_capacity: usize,
    ) -> Result<Arc<Self>, GraphError> {
        let specs = step.slots();
        Connectable::validate_specs(&specs)?;
        let id = ElementId::next();
        let type_name = step.type_name();
        let finished = Trigger::new(finished_name(&name));

        Ok(Arc::new_cyclic(|weak: &Weak<StepNode>| StepNode {
            id,
            name: RwLock::new(name),
            type_name,
            slots: Connectable::with_slots(id, SlotOwner::Step(weak.clone()), specs),
            step: Mutex::new(step),
            lifecycle: Mutex::new(Lifecycle::default()),
            busy: AtomicBool::new(false),
            finished,
            faults: Mutex::new(VecDeque::new()),
            fault_capacity: fault_capacity.max(1),
            stats: Mutex::new(StepStats::default()),
            events: RwLock::new(None),
        }))
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.write() = name.to_string();
        self.finished.set_name(&finished_name(name));
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn slots(&self) -> &Connectable {
        &self.slots
    }

    /// Fired after this step in every pulse that reaches it.
    pub fn finished_trigger(&self) -> &Arc<Trigger> {
        &self.finished
    }

    pub fn state(&self) -> StepState {
        self.lifecycle.lock().state
    }

    /// Whether `compute` is running right now.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StepStats {
        *self.stats.lock()
    }

    pub fn faults(&self) -> Vec<StepFault> {
        self.faults.lock().iter().cloned().collect()
    }

    pub(crate) fn set_events(&self, events: broadcast::Sender<GraphEvent>) {
        *self.events.write() = Some(events);
    }

    pub(crate) fn start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.starts += 1;
        if lifecycle.state != StepState::Started {
            self.step.lock().on_start();
            lifecycle.state = StepState::Started;
            StepStarted { step: &self.name() }.log();
        }
    }

    pub(crate) fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.starts = lifecycle.starts.saturating_sub(1);
        if lifecycle.starts == 0 && lifecycle.state == StepState::Started {
            self.step.lock().on_stop();
            lifecycle.state = StepState::Stopped;
            StepStopped { step: &self.name() }.log();
        }
    }

    /// Returns a started or stopped step to its just-started condition: the
    /// step drops its transient state and owned slots are cleared.
    pub fn reset(&self) -> Result<(), GraphError> {
        let lifecycle = self.lifecycle.lock();
        if lifecycle.state == StepState::Constructed {
            return Err(GraphError::InvalidLifecycle {
                step: self.name(),
                operation: "reset",
                state: lifecycle.state,
            });
        }
        self.step.lock().reset();
        self.slots.clear_owned();
        StepReset { step: &self.name() }.log();
        Ok(())
    }

    /// Runs one compute for the pulse described by `ctx`.
    ///
    /// Errors and panics raised by the step are caught here; they never reach
    /// the trigger that dispatched the step.
    pub(crate) fn execute(&self, ctx: &TriggerContext) -> StepOutcome {
        let name = self.name();
        if !self.slots.mandatory_inputs_valid() {
            self.slots.invalidate_outputs();
            self.stats.lock().skips += 1;
            StepInputsInvalid { step: &name }.log();
            return StepOutcome::Skipped;
        }

        self.busy.store(true, Ordering::Release);
        let started = Instant::now();
        let result = {
            let mut step = self.step.lock();
            let mut compute_ctx = ComputeContext::new(&name, &self.slots, ctx);
            panic::catch_unwind(AssertUnwindSafe(|| step.compute(&mut compute_ctx)))
                .unwrap_or_else(|payload| Err(ComputeError::Panicked(panic_message(payload.as_ref()))))
        };
        let elapsed = started.elapsed();
        self.busy.store(false, Ordering::Release);

        {
            let mut stats = self.stats.lock();
            stats.computes += 1;
            stats.last_compute_duration = elapsed;
            stats.last_compute_time = stats.last_compute_time.max(ctx.simulated_time);
            if result.is_err() {
                stats.faults += 1;
            }
        }

        match result {
            Ok(()) => StepOutcome::Computed,
            Err(err) => {
                self.slots.invalidate_outputs();
                self.record_fault(&name, &err, ctx);
                StepOutcome::Faulted
            }
        }
    }

    fn record_fault(&self, name: &str, err: &ComputeError, ctx: &TriggerContext) {
        StepFaulted {
            step: name,
            trigger: &ctx.source,
            error: err,
        }
        .log();

        let fault = StepFault {
            step: name.to_string(),
            message: err.to_string(),
            timestamp: SystemTime::now(),
            simulated_time: ctx.simulated_time,
        };
        {
            let mut faults = self.faults.lock();
            if faults.len() == self.fault_capacity {
                faults.pop_front();
            }
            faults.push_back(fault.clone());
        }

        if let Some(events) = self.events.read().as_ref() {
            // No subscribers is fine.
            let _ = events.send(GraphEvent::StepFaulted {
                step: fault.step,
                message: fault.message,
            });
        }
    }

    /// Captures the previous-pulse value of every delayed input.
    pub(crate) fn latch_inputs(&self) {
        self.slots.latch_inputs();
    }
}

impl std::fmt::Debug for StepNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepNode")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("type_name", &self.type_name)
            .field("state", &self.state())
            .finish()
    }
}

fn finished_name(step: &str) -> String {
    format!("{}.finished", step)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{connect, ConnectionKind, Validity};
    use crate::steps::stub::{FailingStep, PanickingStep};
    use crate::steps::{ConstantStep, CounterStep, GainStep};

    fn ctx(time_ms: u64) -> TriggerContext {
        TriggerContext {
            step_size: Duration::from_millis(10),
            simulated_time: Duration::from_millis(time_ms),
            source: "test".to_string(),
        }
    }

    #[test]
    fn test_compute_writes_outputs() {
        let counter = StepNode::new("counter", CounterStep::new()).unwrap();

        assert_eq!(counter.execute(&ctx(10)), StepOutcome::Computed);
        assert_eq!(counter.execute(&ctx(20)), StepOutcome::Computed);

        let out = counter.slots().outputs().remove(0);
        assert_eq!(out.validity(), Validity::Valid);
        assert_eq!(out.data().unwrap().downcast_ref::<f64>(), Some(&2.0));
        assert_eq!(out.version(), 2);
        assert_eq!(counter.stats().computes, 2);
        assert_eq!(counter.stats().last_compute_time, Duration::from_millis(20));
    }

    #[test]
    fn test_unconnected_input_skips_and_invalidates() {
        let gain = StepNode::new("gain", GainStep::new(2.0)).unwrap();

        assert_eq!(gain.execute(&ctx(10)), StepOutcome::Skipped);

        let out = gain.slots().outputs().remove(0);
        assert_eq!(out.validity(), Validity::Invalid);
        assert_eq!(gain.stats().computes, 0);
        assert!(gain.faults().is_empty());
    }

    #[test]
    fn test_error_is_recorded_as_fault() {
        let failing = StepNode::new("failing", FailingStep::new("boom")).unwrap();

        assert_eq!(failing.execute(&ctx(10)), StepOutcome::Faulted);

        let faults = failing.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].step, "failing");
        assert_eq!(faults[0].message, "boom");
        assert_eq!(failing.slots().outputs()[0].validity(), Validity::Invalid);
    }

    #[test]
    fn test_panic_is_caught() {
        let panicking = StepNode::new("panicking", PanickingStep).unwrap();

        assert_eq!(panicking.execute(&ctx(10)), StepOutcome::Faulted);
        assert!(panicking.faults()[0].message.contains("compute panicked"));
        assert!(!panicking.is_busy());

        // The node stays usable after a panic.
        assert_eq!(panicking.execute(&ctx(20)), StepOutcome::Faulted);
        assert_eq!(panicking.faults().len(), 2);
    }

    #[test]
    fn test_fault_history_is_bounded() {
        let failing = StepNode::with_fault_history("failing", FailingStep::new("boom"), 2).unwrap();
        for i in 0..5 {
            failing.execute(&ctx(i));
        }
        let faults = failing.faults();
        assert_eq!(faults.len(), 2);
        assert_eq!(faults[1].simulated_time, Duration::from_millis(4));
    }

    #[test]
    fn test_reset_requires_start() {
        let counter = StepNode::new("counter", CounterStep::new()).unwrap();
        let err = counter.reset().unwrap_err();
        assert!(matches!(
            err,
            GraphError::InvalidLifecycle {
                state: StepState::Constructed,
                ..
            }
        ));

        counter.start();
        counter.execute(&ctx(10));
        counter.execute(&ctx(20));
        counter.reset().unwrap();

        let out = counter.slots().outputs().remove(0);
        assert!(out.data().is_none());
        assert_eq!(out.validity(), Validity::Unknown);

        counter.execute(&ctx(30));
        assert_eq!(out.data().unwrap().downcast_ref::<f64>(), Some(&1.0));
    }

    #[test]
    fn test_start_and_stop_are_reference_counted() {
        let counter = StepNode::new("counter", CounterStep::new()).unwrap();
        counter.start();
        counter.start();
        counter.stop();
        assert_eq!(counter.state(), StepState::Started);
        counter.stop();
        assert_eq!(counter.state(), StepState::Stopped);
        assert!(counter.reset().is_ok());
    }

    #[test]
    fn test_chained_steps_read_upstream_data() {
        let constant = StepNode::new("constant", ConstantStep::new(3.0)).unwrap();
        let gain = StepNode::new("gain", GainStep::new(2.0)).unwrap();
        let out = constant.slots().outputs().remove(0);
        let input = gain.slots().inputs().remove(0);
        connect(&out, &input, ConnectionKind::Synchronous).unwrap();

        constant.execute(&ctx(10));
        gain.execute(&ctx(10));

        let result = gain.slots().outputs()[0].data().unwrap();
        assert_eq!(result.downcast_ref::<f64>(), Some(&6.0));
    }

    #[test]
    fn test_rename_updates_finished_trigger() {
        let counter = StepNode::new("counter", CounterStep::new()).unwrap();
        counter.set_name("ticks");
        assert_eq!(counter.name(), "ticks");
        assert_eq!(counter.finished_trigger().name(), "ticks.finished");
    }
}
