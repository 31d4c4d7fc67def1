// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::{
    LoopedTriggerConfig, DEFAULT_MAX_CATCH_UP_STEPS, DEFAULT_STEP_SIZE_MS, DEFAULT_STOP_TIMEOUT_MS,
};
use crate::engine::schedule;
use crate::engine::{ConsistencyChecker, ElementId, PulseReport, Severity, StepNode, Trigger, TriggerContext};
use crate::errors::TriggerError;
use crate::observability::messages::trigger::{
    CatchUpClamped, LoopStarted, LoopStopped, StartRefused, StopTimedOut,
};
use crate::observability::messages::StructuredLog;

/// How a running [`LoopedTrigger`] turns wall-clock time into pulses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// One pulse of the fixed step size per iteration, however long the
    /// iteration took.
    Fixed,
    /// Fixed step size; iterations that fall behind fire catch-up pulses.
    #[default]
    FixedAdaptive,
    /// One pulse per iteration whose step is the measured elapsed time.
    RealTime,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Stopped,
    Running,
    Stopping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LoopSettings {
    pub mode: LoopMode,
    pub step_size: Duration,
    pub max_catch_up_steps: u32,
    pub stop_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            mode: LoopMode::default(),
            step_size: Duration::from_millis(DEFAULT_STEP_SIZE_MS),
            max_catch_up_steps: DEFAULT_MAX_CATCH_UP_STEPS,
            stop_timeout: Duration::from_millis(DEFAULT_STOP_TIMEOUT_MS),
        }
    }
}

impl From<&LoopedTriggerConfig> for LoopSettings {
    fn from(config: &LoopedTriggerConfig) -> Self {
        Self {
            mode: config.mode,
            step_size: Duration::from_millis(config.step_size_ms),
            max_catch_up_steps: config.max_catch_up_steps,
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
        }
    }
}

/// What one loop iteration should do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickPlan {
    pub pulses: u32,
    /// Step size passed to each pulse.
    pub step: Duration,
    /// Idle time before the next iteration.
    pub sleep: Duration,
    /// Catch-up pulses dropped by the clamp.
    pub dropped: u64,
}

/// Catch-up bookkeeping of a looped trigger.
///
/// In `FixedAdaptive` mode measured time accumulates as debt. Each iteration
/// fires `floor(debt / step)` pulses of `step`, keeps the remainder and sleeps
/// `step - remainder`. Pulses beyond `max_catch_up_steps` are dropped together
/// with their debt.
#[derive(Clone, Debug)]
pub struct LoopTimer {
    mode: LoopMode,
    step: Duration,
    max_catch_up_steps: u32,
    debt: Duration,
}

impl LoopTimer {
    pub fn new(settings: &LoopSettings) -> Self {
        Self {
            mode: settings.mode,
            step: settings.step_size,
            max_catch_up_steps: settings.max_catch_up_steps.max(1),
            debt: Duration::ZERO,
        }
    }

    /// Picks up changed settings without losing accumulated debt.
    pub fn update(&mut self, settings: &LoopSettings) {
        self.mode = settings.mode;
        self.step = settings.step_size;
        self.max_catch_up_steps = settings.max_catch_up_steps.max(1);
    }

    pub fn debt(&self) -> Duration {
        self.debt
    }

    pub fn plan(&mut self, elapsed: Duration) -> TickPlan {
        match self.mode {
            LoopMode::Fixed => TickPlan {
                pulses: 1,
                step: self.step,
                sleep: self.step,
                dropped: 0,
            },
            LoopMode::RealTime => TickPlan {
                pulses: 1,
                step: elapsed,
                sleep: self.step,
                dropped: 0,
            },
            LoopMode::FixedAdaptive => {
                let step_ns = self.step.as_nanos().max(1);
                let debt_ns = (self.debt + elapsed).as_nanos();
                let due = (debt_ns / step_ns) as u64;
                let remainder = Duration::from_nanos((debt_ns % step_ns) as u64);
                let pulses = due.min(self.max_catch_up_steps as u64) as u32;
                self.debt = remainder;

                TickPlan {
                    pulses,
                    step: self.step,
                    sleep: self.step.saturating_sub(remainder),
                    dropped: due - pulses as u64,
                }
            }
        }
    }
}

#[derive(Default)]
struct ControlState {
    state: LoopState,
    stop_requested: bool,
}

#[derive(Default)]
struct LoopControl {
    state: Mutex<ControlState>,
    changed: Condvar,
}

/// A trigger fired by its own thread from a real-time clock.
///
/// `start` checks the reachable subgraph for consistency errors, starts the
/// steps it reaches and spawns the loop thread. Each iteration holds the
/// topology lock shared for its pulses, so structural edits of the enclosing
/// group wait for an in-flight iteration and block the next one. `stop` is
/// cooperative: the thread finishes its current pulse and exits.
pub struct LoopedTrigger {
    trigger: Arc<Trigger>,
    settings: RwLock<LoopSettings>,
    control: LoopControl,
    handle: Mutex<Option<JoinHandle<()>>>,
    topology: RwLock<Arc<RwLock<()>>>,
    simulated_time: Mutex<Duration>,
    started_steps: Mutex<Vec<Arc<StepNode>>>,
}

impl LoopedTrigger {
    pub fn new(name: impl Into<String>, settings: LoopSettings) -> Arc<Self> {
        Arc::new(Self {
            trigger: Trigger::new(name),
            settings: RwLock::new(settings),
            control: LoopControl::default(),
            handle: Mutex::new(None),
            topology: RwLock::new(Arc::new(RwLock::new(()))),
            simulated_time: Mutex::new(Duration::ZERO),
            started_steps: Mutex::new(Vec::new()),
        })
    }

    pub fn with_step_size(name: impl Into<String>, step_size: Duration) -> Arc<Self> {
        Self::new(
            name,
            LoopSettings {
                step_size,
                ..LoopSettings::default()
            },
        )
    }

    pub fn from_config(name: impl Into<String>, config: &LoopedTriggerConfig) -> Arc<Self> {
        Self::new(name, LoopSettings::from(config))
    }

    pub fn id(&self) -> ElementId {
        self.trigger.id()
    }

    pub fn name(&self) -> String {
        self.trigger.name()
    }

    /// The trigger whose listeners this loop fires.
    pub fn trigger(&self) -> &Arc<Trigger> {
        &self.trigger
    }

    pub fn settings(&self) -> LoopSettings {
        *self.settings.read()
    }

    /// Applies to a running loop from its next iteration on.
    pub fn set_settings(&self, settings: LoopSettings) {
        *self.settings.write() = settings;
    }

    pub fn state(&self) -> LoopState {
        self.control.state.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() != LoopState::Stopped
    }

    /// Sum of the step sizes of every pulse fired so far.
    pub fn simulated_time(&self) -> Duration {
        *self.simulated_time.lock()
    }

    pub(crate) fn set_topology(&self, topology: Arc<RwLock<()>>) {
        *self.topology.write() = topology;
    }

    pub fn start(self: &Arc<Self>) -> Result<(), TriggerError> {
        {
            let mut control = self.control.state.lock();
            match control.state {
                LoopState::Running => {
                    return Err(TriggerError::AlreadyRunning {
                        trigger: self.name(),
                    })
                }
                LoopState::Stopping => {
                    return Err(TriggerError::StillStopping {
                        trigger: self.name(),
                    })
                }
                LoopState::Stopped => {
                    control.state = LoopState::Running;
                    control.stop_requested = false;
                }
            }
        }
        self.join_finished_thread();

        let issues: Vec<_> = ConsistencyChecker::check_trigger(&self.trigger)
            .into_iter()
            .filter(|issue| issue.severity == Severity::Error)
            .collect();
        if !issues.is_empty() {
            StartRefused {
                trigger: &self.name(),
                errors: issues.len(),
            }
            .log();
            self.set_stopped();
            return Err(TriggerError::Inconsistent {
                trigger: self.name(),
                issues,
            });
        }

        let steps = schedule::reachable_steps(&self.trigger);
        for step in &steps {
            step.start();
        }
        *self.started_steps.lock() = steps;

        let looped = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(format!("trigger-{}", self.name()))
            .spawn(move || looped.run());
        match spawned {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                let settings = self.settings();
                LoopStarted {
                    trigger: &self.name(),
                    mode: settings.mode,
                    step_size: settings.step_size,
                }
                .log();
                Ok(())
            }
            Err(err) => {
                self.stop_started_steps();
                self.set_stopped();
                Err(TriggerError::Spawn {
                    trigger: self.name(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Requests a stop and waits up to `timeout` for the loop thread to exit.
    ///
    /// On timeout the stop stays requested and the call may be repeated.
    pub fn stop(&self, timeout: Duration) -> Result<(), TriggerError> {
        {
            let mut control = self.control.state.lock();
            if control.state == LoopState::Stopped {
                drop(control);
                self.join_finished_thread();
                return Ok(());
            }
            control.state = LoopState::Stopping;
            control.stop_requested = true;
            self.control.changed.notify_all();

            self.control.changed.wait_while_for(
                &mut control,
                |control| control.state != LoopState::Stopped,
                timeout,
            );
            if control.state != LoopState::Stopped {
                StopTimedOut {
                    trigger: &self.name(),
                    timeout,
                }
                .log();
                return Err(TriggerError::StopTimeout {
                    trigger: self.name(),
                    timeout,
                });
            }
        }
        self.join_finished_thread();
        Ok(())
    }

    /// Stops with the configured stop timeout.
    pub fn stop_default(&self) -> Result<(), TriggerError> {
        self.stop(self.settings().stop_timeout)
    }

    /// Fires one pulse of `step` on the calling thread. Only allowed while the
    /// loop is not running.
    pub fn step(&self, step: Duration) -> Result<PulseReport, TriggerError> {
        if self.is_running() {
            return Err(TriggerError::AlreadyRunning {
                trigger: self.name(),
            });
        }
        let topology = self.topology.read().clone();
        let _shared = topology.read();
        Ok(self.fire(step))
    }

    fn fire(&self, step: Duration) -> PulseReport {
        let simulated_time = {
            let mut time = self.simulated_time.lock();
            *time += step;
            *time
        };
        let ctx = TriggerContext::new(self.name(), step, simulated_time);
        self.trigger.trigger(&ctx)
    }

    fn stop_requested(&self) -> bool {
        self.control.state.lock().stop_requested
    }

    fn run(self: Arc<Self>) {
        let mut timer = LoopTimer::new(&self.settings());
        let mut sleep = self.settings().step_size;
        let mut last = Instant::now();
        let mut pulses: u64 = 0;

        loop {
            {
                let mut control = self.control.state.lock();
                if !control.stop_requested {
                    self.control
                        .changed
                        .wait_while_for(&mut control, |control| !control.stop_requested, sleep);
                }
                if control.stop_requested {
                    break;
                }
            }

            let now = Instant::now();
            let elapsed = now.duration_since(last);
            last = now;

            let settings = self.settings();
            timer.update(&settings);
            let plan = timer.plan(elapsed);
            if plan.dropped > 0 {
                CatchUpClamped {
                    trigger: &self.name(),
                    dropped: plan.dropped,
                    max_catch_up_steps: settings.max_catch_up_steps,
                }
                .log();
            }

            {
                let topology = self.topology.read().clone();
                let _shared = topology.read();
                for _ in 0..plan.pulses {
                    if self.stop_requested() {
                        break;
                    }
                    self.fire(plan.step);
                    pulses += 1;
                }
            }
            sleep = plan.sleep;
        }

        self.stop_started_steps();
        LoopStopped {
            trigger: &self.name(),
            pulses,
        }
        .log();
        self.set_stopped();
    }

    fn stop_started_steps(&self) {
        let steps = std::mem::take(&mut *self.started_steps.lock());
        for step in steps {
            step.stop();
        }
    }

    fn set_stopped(&self) {
        let mut control = self.control.state.lock();
        control.state = LoopState::Stopped;
        control.stop_requested = false;
        self.control.changed.notify_all();
    }

    fn join_finished_thread(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            // The thread has already reported Stopped; a panic there was caught per step.
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for LoopedTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopedTrigger")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("settings", &self.settings())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::stub::BlockingStep;
    use crate::steps::CounterStep;
    use std::thread;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn settings(mode: LoopMode, step: Duration) -> LoopSettings {
        LoopSettings {
            mode,
            step_size: step,
            max_catch_up_steps: 10,
            stop_timeout: ms(1000),
        }
    }

    #[test]
    fn test_catch_up_fires_whole_steps() {
        let mut timer = LoopTimer::new(&settings(LoopMode::FixedAdaptive, ms(10)));

        let plan = timer.plan(ms(35));

        assert_eq!(plan.pulses, 3);
        assert_eq!(plan.step, ms(10));
        assert_eq!(plan.sleep, ms(5));
        assert_eq!(plan.dropped, 0);
        assert_eq!(timer.debt(), ms(5));

        let plan = timer.plan(ms(5));
        assert_eq!(plan.pulses, 1);
        assert_eq!(plan.sleep, ms(10));
    }

    #[test]
    fn test_short_iteration_fires_nothing() {
        let mut timer = LoopTimer::new(&settings(LoopMode::FixedAdaptive, ms(10)));
        let plan = timer.plan(ms(4));
        assert_eq!(plan.pulses, 0);
        assert_eq!(plan.sleep, ms(6));
    }

    #[test]
    fn test_catch_up_is_clamped() {
        let mut timer = LoopTimer::new(&LoopSettings {
            max_catch_up_steps: 4,
            ..settings(LoopMode::FixedAdaptive, ms(10))
        });

        let plan = timer.plan(ms(125));

        assert_eq!(plan.pulses, 4);
        assert_eq!(plan.dropped, 8);
        assert_eq!(timer.debt(), ms(5));
    }

    #[test]
    fn test_fixed_and_real_time_fire_once() {
        let mut fixed = LoopTimer::new(&settings(LoopMode::Fixed, ms(10)));
        let plan = fixed.plan(ms(35));
        assert_eq!((plan.pulses, plan.step), (1, ms(10)));

        let mut real_time = LoopTimer::new(&settings(LoopMode::RealTime, ms(10)));
        let plan = real_time.plan(ms(35));
        assert_eq!((plan.pulses, plan.step), (1, ms(35)));
    }

    #[test]
    fn test_manual_step_advances_simulated_time() {
        let looped = LoopedTrigger::with_step_size("clock", ms(10));
        let counter = StepNode::new("counter", CounterStep::new()).unwrap();
        looped.trigger().add_step(&counter).unwrap();

        looped.step(ms(10)).unwrap();
        let report = looped.step(ms(20)).unwrap();

        assert_eq!(report.computed, 1);
        assert_eq!(looped.simulated_time(), ms(30));
        assert_eq!(counter.stats().last_compute_time, ms(30));
    }

    #[test]
    fn test_start_and_stop() {
        let looped = LoopedTrigger::with_step_size("clock", ms(2));
        let counter = StepNode::new("counter", CounterStep::new()).unwrap();
        looped.trigger().add_step(&counter).unwrap();

        looped.start().unwrap();
        assert_eq!(looped.state(), LoopState::Running);
        assert_eq!(counter.state(), crate::engine::StepState::Started);
        assert!(matches!(looped.start(), Err(TriggerError::AlreadyRunning { .. })));
        assert!(matches!(looped.step(ms(2)), Err(TriggerError::AlreadyRunning { .. })));

        thread::sleep(ms(50));
        looped.stop(ms(1000)).unwrap();

        assert_eq!(looped.state(), LoopState::Stopped);
        assert_eq!(counter.state(), crate::engine::StepState::Stopped);
        assert!(counter.stats().computes > 0);
        assert!(looped.simulated_time() >= ms(2));

        // Stopping twice is harmless and the loop can be restarted.
        looped.stop(ms(10)).unwrap();
        looped.start().unwrap();
        looped.stop(ms(1000)).unwrap();
    }

    #[test]
    fn test_stop_timeout_is_retryable() {
        let looped = LoopedTrigger::with_step_size("clock", ms(1));
        let (blocking, release) = BlockingStep::new();
        let step = StepNode::new("blocking", blocking).unwrap();
        looped.trigger().add_step(&step).unwrap();

        looped.start().unwrap();
        // Give the loop time to enter the blocking compute.
        thread::sleep(ms(50));

        let err = looped.stop(ms(20)).unwrap_err();
        assert!(matches!(err, TriggerError::StopTimeout { .. }));
        assert_eq!(looped.state(), LoopState::Stopping);
        assert!(matches!(looped.start(), Err(TriggerError::StillStopping { .. })));

        release.release();
        looped.stop(ms(2000)).unwrap();
        assert_eq!(looped.state(), LoopState::Stopped);
    }
}
