// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::engine::schedule;
use crate::engine::{ElementId, StepNode};
use crate::errors::GraphError;
use crate::traits::Triggerable;

/// Information handed to every listener of a pulse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerContext {
    /// Duration the pulse advances simulated time by.
    pub step_size: Duration,
    /// Simulated time of the firing trigger after this pulse.
    pub simulated_time: Duration,
    /// Name of the trigger that started the pulse.
    pub source: String,
}

impl TriggerContext {
    pub fn new(source: impl Into<String>, step_size: Duration, simulated_time: Duration) -> Self {
        Self {
            step_size,
            simulated_time,
            source: source.into(),
        }
    }
}

/// Counts of what one pulse did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PulseReport {
    pub computed: usize,
    pub skipped: usize,
    pub faulted: usize,
    pub notified: usize,
    pub duration: Duration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TriggerStats {
    pub pulses: u64,
    pub last_pulse: Duration,
    pub mean_pulse: Duration,
    pub max_pulse: Duration,
    #[serde(skip)]
    total: Duration,
}

impl TriggerStats {
    fn record(&mut self, duration: Duration) {
        self.pulses += 1;
        self.total += duration;
        self.last_pulse = duration;
        self.max_pulse = self.max_pulse.max(duration);
        self.mean_pulse = self.total / self.pulses.min(u32::MAX as u64) as u32;
    }
}

#[derive(Clone)]
pub(crate) enum ListenerTarget {
    Step(Weak<StepNode>),
    Trigger(Weak<Trigger>),
    Custom(Weak<dyn Triggerable>),
}

#[derive(Clone)]
pub(crate) struct Listener {
    pub(crate) id: ElementId,
    pub(crate) target: ListenerTarget,
}

impl Listener {
    fn is_alive(&self) -> bool {
        match &self.target {
            ListenerTarget::Step(step) => step.strong_count() > 0,
            ListenerTarget::Trigger(trigger) => trigger.strong_count() > 0,
            ListenerTarget::Custom(custom) => custom.strong_count() > 0,
        }
    }
}

/// A pulse source with an ordered list of weakly held listeners.
///
/// Firing a trigger runs one pulse: every step, trigger and custom listener
/// reachable from it is visited at most once, in registration order, with
/// synchronous data producers ordered before their consumers.
pub struct Trigger {
    id: ElementId,
    name: RwLock<String>,
    listeners: RwLock<Vec<Listener>>,
    stats: Mutex<TriggerStats>,
}

impl Trigger {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: ElementId::next(),
            name: RwLock::new(name.into()),
            listeners: RwLock::new(Vec::new()),
            stats: Mutex::new(TriggerStats::default()),
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

    pub fn add_step(&self, step: &Arc<StepNode>) -> Result<(), GraphError> {
        self.push(Listener {
            id: step.id(),
            target: ListenerTarget::Step(Arc::downgrade(step)),
        }, step.name())
    }

    /// Chains `trigger` behind this one. Trigger edges, including the ones
    /// running through steps' finished triggers, must stay acyclic.
    pub fn add_trigger(&self, trigger: &Arc<Trigger>) -> Result<(), GraphError> {
        if trigger.id == self.id || trigger.reaches(self.id) {
            return Err(GraphError::TriggerCycle {
                from: self.name(),
                to: trigger.name(),
            });
        }
        self.push(Listener {
            id: trigger.id,
            target: ListenerTarget::Trigger(Arc::downgrade(trigger)),
        }, trigger.name())
    }

    pub fn add_triggerable(&self, listener: &Arc<dyn Triggerable>) -> Result<(), GraphError> {
        if let Some(downstream) = listener.downstream_trigger() {
            if downstream.id == self.id || downstream.reaches(self.id) {
                return Err(GraphError::TriggerCycle {
                    from: self.name(),
                    to: listener.name(),
                });
            }
        }
        self.push(Listener {
            id: listener.id(),
            target: ListenerTarget::Custom(Arc::downgrade(listener)),
        }, listener.name())?;
        listener.on_connected(self.id);
        Ok(())
    }

    fn push(&self, listener: Listener, name: String) -> Result<(), GraphError> {
        let mut listeners = self.listeners.write();
        listeners.retain(Listener::is_alive);
        if listeners.iter().any(|existing| existing.id == listener.id) {
            return Err(GraphError::AlreadyConnected { to: name });
        }
        listeners.push(listener);
        Ok(())
    }

    /// Unregisters a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ElementId) -> bool {
        let removed = {
            let mut listeners = self.listeners.write();
            let position = listeners.iter().position(|listener| listener.id == id);
            position.map(|index| listeners.remove(index))
        };
        match removed {
            Some(listener) => {
                if let ListenerTarget::Custom(custom) = &listener.target {
                    if let Some(custom) = custom.upgrade() {
                        custom.on_disconnected(self.id);
                    }
                }
                true
            }
            None => false,
        }
    }

    pub fn is_listener(&self, id: ElementId) -> bool {
        self.listeners
            .read()
            .iter()
            .any(|listener| listener.id == id && listener.is_alive())
    }

    pub fn listener_ids(&self) -> Vec<ElementId> {
        self.listeners()
            .into_iter()
            .map(|listener| listener.id)
            .collect()
    }

    pub(crate) fn listeners(&self) -> Vec<Listener> {
        self.listeners
            .read()
            .iter()
            .filter(|listener| listener.is_alive())
            .cloned()
            .collect()
    }

    /// Whether firing this trigger can reach the trigger `target`.
    fn reaches(&self, target: ElementId) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![self.listeners()];
        while let Some(listeners) = pending.pop() {
            for listener in listeners {
                if !visited.insert(listener.id) {
                    continue;
                }
                match &listener.target {
                    ListenerTarget::Trigger(trigger) => {
                        if let Some(trigger) = trigger.upgrade() {
                            if trigger.id == target {
                                return true;
                            }
                            pending.push(trigger.listeners());
                        }
                    }
                    ListenerTarget::Step(step) => {
                        if let Some(step) = step.upgrade() {
                            let finished = step.finished_trigger();
                            if finished.id == target {
                                return true;
                            }
                            pending.push(finished.listeners());
                        }
                    }
                    ListenerTarget::Custom(custom) => {
                        if let Some(downstream) = custom.upgrade().and_then(|c| c.downstream_trigger()) {
                            if downstream.id == target {
                                return true;
                            }
                            pending.push(downstream.listeners());
                        }
                    }
                }
            }
        }
        false
    }

    /// Runs one pulse on the calling thread.
    pub fn trigger(self: &Arc<Self>, ctx: &TriggerContext) -> PulseReport {
        let report = schedule::run_pulse(self, ctx);
        self.record_pulse(report.duration);
        report
    }

    pub(crate) fn record_pulse(&self, duration: Duration) {
        self.stats.lock().record(duration);
    }

    pub fn stats(&self) -> TriggerStats {
        *self.stats.lock()
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::stub::{RecordingListener, RecordingStep};
    use crate::steps::CounterStep;

    fn ctx() -> TriggerContext {
        TriggerContext::new("test", Duration::from_millis(10), Duration::from_millis(10))
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let log = RecordingStep::log();
        let trigger = Trigger::new("tick");
        let first = StepNode::new("first", RecordingStep::new("first", &log)).unwrap();
        let second = StepNode::new("second", RecordingStep::new("second", &log)).unwrap();
        trigger.add_step(&second).unwrap();
        trigger.add_step(&first).unwrap();

        let report = trigger.trigger(&ctx());

        assert_eq!(*log.lock(), vec!["second", "first"]);
        assert_eq!(report.computed, 2);
        assert_eq!(trigger.stats().pulses, 1);
    }

    #[test]
    fn test_duplicate_listener_is_rejected() {
        let trigger = Trigger::new("tick");
        let step = StepNode::new("counter", CounterStep::new()).unwrap();
        trigger.add_step(&step).unwrap();
        assert!(matches!(
            trigger.add_step(&step),
            Err(GraphError::AlreadyConnected { .. })
        ));
    }

    #[test]
    fn test_step_reachable_twice_runs_once() {
        let log = RecordingStep::log();
        let root = Trigger::new("root");
        let chained = Trigger::new("chained");
        let step = StepNode::new("step", RecordingStep::new("step", &log)).unwrap();
        root.add_step(&step).unwrap();
        root.add_trigger(&chained).unwrap();
        chained.add_step(&step).unwrap();

        root.trigger(&ctx());

        assert_eq!(*log.lock(), vec!["step"]);
    }

    #[test]
    fn test_trigger_cycle_is_rejected() {
        let a = Trigger::new("a");
        let b = Trigger::new("b");
        a.add_trigger(&b).unwrap();

        let err = b.add_trigger(&a).unwrap_err();
        assert!(matches!(err, GraphError::TriggerCycle { .. }));
        assert!(matches!(a.add_trigger(&a), Err(GraphError::TriggerCycle { .. })));
    }

    #[test]
    fn test_cycle_through_finished_trigger_is_rejected() {
        let tick = Trigger::new("tick");
        let step = StepNode::new("counter", CounterStep::new()).unwrap();
        tick.add_step(&step).unwrap();

        let err = step.finished_trigger().add_trigger(&tick).unwrap_err();
        assert!(matches!(err, GraphError::TriggerCycle { .. }));
    }

    #[test]
    fn test_dropped_listener_is_skipped() {
        let trigger = Trigger::new("tick");
        let step = StepNode::new("counter", CounterStep::new()).unwrap();
        trigger.add_step(&step).unwrap();
        drop(step);

        assert!(trigger.listener_ids().is_empty());
        assert_eq!(trigger.trigger(&ctx()).computed, 0);
    }

    #[test]
    fn test_custom_listener_is_notified() {
        let trigger = Trigger::new("tick");
        let listener = Arc::new(RecordingListener::new("probe"));
        let as_dyn: Arc<dyn Triggerable> = listener.clone();
        trigger.add_triggerable(&as_dyn).unwrap();

        trigger.trigger(&ctx());
        trigger.trigger(&ctx());
        assert_eq!(listener.pulses(), 2);
        assert_eq!(listener.connected(), vec![trigger.id()]);

        assert!(trigger.remove_listener(listener.id()));
        assert!(!trigger.remove_listener(listener.id()));
        assert!(listener.connected().is_empty());
    }
}
