// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pulse scheduling.
//!
//! A pulse runs in three phases:
//!
//! 1. **Discovery**: depth-first walk from the firing trigger in registration
//!    order. A step is followed by the steps its outputs feed synchronously
//!    (through group connectors) and then by its finished trigger. A custom
//!    listener is followed by its downstream trigger, so the listeners of a
//!    [`MultiTrigger`](crate::engine::MultiTrigger) belong to the same pulse.
//!    Every listener becomes one item, however many paths reach it, which covers
//!    diamonds and triggers chained more than once.
//! 2. **Ordering**: Kahn's algorithm over the discovered items, taking the ready
//!    item with the lowest discovery index first. Edges are synchronous data
//!    dependencies plus "discovered by" edges, so a step still runs after the step
//!    or listener that reached it. Independent items keep registration order.
//! 3. **Execution**: an item runs only once something that reaches it has run.
//!    Items reached from the firing trigger always run; items behind a custom
//!    listener run when its `on_trigger` returns true.
//!
//! Delayed inputs of every scheduled step are latched before the first compute,
//! so they read the value their producer held when the pulse started.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::data::{ConnectionKind, DataSlot};
use crate::engine::step_node::panic_message;
use crate::engine::trigger::ListenerTarget;
use crate::engine::{ElementId, PulseReport, StepNode, StepOutcome, Trigger, TriggerContext};
use crate::observability::messages::graph::ScheduleCycle;
use crate::observability::messages::trigger::{ListenerPanicked, PulseCompleted};
use crate::observability::messages::StructuredLog;
use crate::traits::Triggerable;

#[derive(Clone)]
pub(crate) enum Scheduled {
    Step(Arc<StepNode>),
    Custom {
        listener: Arc<dyn Triggerable>,
        sender: ElementId,
    },
}

#[derive(Default)]
struct Discovery {
    items: Vec<Scheduled>,
    /// Item that first reached each item; `None` is the firing trigger.
    parents: Vec<Option<usize>>,
    /// Items each item makes runnable once it has run.
    activates: Vec<Vec<usize>>,
    /// Reached directly by the firing trigger.
    rooted: Vec<bool>,
    /// Ordering edges from later paths that reached an already discovered item.
    revisits: Vec<(usize, usize)>,
    steps: HashMap<ElementId, usize>,
    triggers: HashMap<ElementId, Vec<usize>>,
    notified: HashMap<(ElementId, ElementId), usize>,
}

impl Discovery {
    fn push(&mut self, item: Scheduled, parent: Option<usize>) -> usize {
        let index = self.items.len();
        self.items.push(item);
        self.parents.push(parent);
        self.activates.push(Vec::new());
        self.rooted.push(parent.is_none());
        if let Some(parent) = parent {
            self.activates[parent].push(index);
        }
        index
    }

    /// Records that `parent` also reaches the already discovered item `index`.
    fn reach(&mut self, index: usize, parent: Option<usize>) {
        let Some(parent) = parent else {
            self.rooted[index] = true;
            return;
        };
        if parent == index || self.activates[parent].contains(&index) {
            return;
        }
        self.activates[parent].push(index);
        // Ordering back onto an ancestor would only close a loop.
        if !self.descends_from(parent, index) {
            self.revisits.push((parent, index));
        }
    }

    /// Whether `index` is `ancestor` or was first reached below it.
    fn descends_from(&self, mut index: usize, ancestor: usize) -> bool {
        loop {
            if index == ancestor {
                return true;
            }
            match self.parents[index] {
                Some(parent) => index = parent,
                None => return false,
            }
        }
    }

    /// Returns the items the trigger's listeners resolve to.
    fn visit_trigger(&mut self, trigger: &Arc<Trigger>, parent: Option<usize>) -> Vec<usize> {
        if let Some(entries) = self.triggers.get(&trigger.id()).cloned() {
            for &entry in &entries {
                self.reach(entry, parent);
            }
            return entries;
        }
        self.triggers.insert(trigger.id(), Vec::new());

        let mut entries = Vec::new();
        for listener in trigger.listeners() {
            match listener.target {
                ListenerTarget::Step(step) => {
                    if let Some(step) = step.upgrade() {
                        entries.push(self.visit_step(&step, parent));
                    }
                }
                ListenerTarget::Trigger(chained) => {
                    if let Some(chained) = chained.upgrade() {
                        entries.extend(self.visit_trigger(&chained, parent));
                    }
                }
                ListenerTarget::Custom(custom) => {
                    if let Some(custom) = custom.upgrade() {
                        entries.push(self.visit_custom(custom, trigger.id(), parent));
                    }
                }
            }
        }
        self.triggers.insert(trigger.id(), entries.clone());
        entries
    }

    fn visit_step(&mut self, step: &Arc<StepNode>, parent: Option<usize>) -> usize {
        if let Some(&index) = self.steps.get(&step.id()) {
            self.reach(index, parent);
            return index;
        }
        let index = self.push(Scheduled::Step(step.clone()), parent);
        self.steps.insert(step.id(), index);

        for downstream in downstream_steps(step) {
            self.visit_step(&downstream, Some(index));
        }
        self.visit_trigger(step.finished_trigger(), Some(index));
        index
    }

    fn visit_custom(&mut self, listener: Arc<dyn Triggerable>, sender: ElementId, parent: Option<usize>) -> usize {
        let key = (listener.id(), sender);
        if let Some(&index) = self.notified.get(&key) {
            self.reach(index, parent);
            return index;
        }
        let downstream = listener.downstream_trigger();
        let index = self.push(Scheduled::Custom { listener, sender }, parent);
        self.notified.insert(key, index);

        if let Some(downstream) = downstream {
            self.visit_trigger(&downstream, Some(index));
        }
        index
    }
}

/// Steps fed synchronously by `step`'s outputs and buffers, in slot and
/// connection order. Group connectors are followed through to the steps behind
/// them.
pub(crate) fn downstream_steps(step: &StepNode) -> Vec<Arc<StepNode>> {
    let mut steps = Vec::new();
    let mut seen_steps = HashSet::new();
    let mut seen_connectors: HashSet<*const DataSlot> = HashSet::new();
    let mut pending = step.slots().owned();
    pending.reverse();

    while let Some(slot) = pending.pop() {
        let mut connectors = Vec::new();
        for (target, kind) in slot.targets() {
            if kind != ConnectionKind::Synchronous {
                continue;
            }
            if target.is_connector() {
                if seen_connectors.insert(Arc::as_ptr(&target)) {
                    connectors.push(target);
                }
            } else if let Some(consumer) = target.owner_step() {
                if consumer.id() != step.id() && seen_steps.insert(consumer.id()) {
                    steps.push(consumer);
                }
            }
        }
        pending.extend(connectors.into_iter().rev());
    }
    steps
}

/// The items of one pulse, in execution order, with what each one unlocks.
pub(crate) struct Schedule {
    items: Vec<Scheduled>,
    order: Vec<usize>,
    activates: Vec<Vec<usize>>,
    rooted: Vec<bool>,
}

impl Schedule {
    /// Every item in execution order, including the ones that only run when a
    /// custom listener passes the pulse on.
    pub(crate) fn ordered(&self) -> impl Iterator<Item = &Scheduled> {
        self.order.iter().map(|index| &self.items[*index])
    }
}

pub(crate) fn schedule(trigger: &Arc<Trigger>) -> Schedule {
    let mut discovery = Discovery::default();
    discovery.visit_trigger(trigger, None);
    let order = order(trigger, &discovery);
    Schedule {
        items: discovery.items,
        order,
        activates: discovery.activates,
        rooted: discovery.rooted,
    }
}

/// Every step a pulse from `trigger` may visit, in discovery order. Includes
/// steps behind custom listeners such as multi triggers.
pub(crate) fn reachable_steps(trigger: &Arc<Trigger>) -> Vec<Arc<StepNode>> {
    let mut discovery = Discovery::default();
    discovery.visit_trigger(trigger, None);
    discovery
        .items
        .into_iter()
        .filter_map(|item| match item {
            Scheduled::Step(step) => Some(step),
            Scheduled::Custom { .. } => None,
        })
        .collect()
}

fn add_edge(dependents: &mut [Vec<usize>], in_degree: &mut [usize], from: usize, to: usize) {
    if from != to && !dependents[from].contains(&to) {
        dependents[from].push(to);
        in_degree[to] += 1;
    }
}

/// Discovery indices in execution order.
fn order(trigger: &Trigger, discovery: &Discovery) -> Vec<usize> {
    let items = &discovery.items;
    let count = items.len();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];

    for (index, parent) in discovery.parents.iter().enumerate() {
        if let Some(parent) = parent {
            add_edge(&mut dependents, &mut in_degree, *parent, index);
        }
    }
    for &(from, to) in &discovery.revisits {
        add_edge(&mut dependents, &mut in_degree, from, to);
    }
    for (index, item) in items.iter().enumerate() {
        if let Scheduled::Step(step) = item {
            for input in step.slots().inputs() {
                if input.source_kind() != Some(ConnectionKind::Synchronous) {
                    continue;
                }
                let producer = input
                    .producer()
                    .and_then(|slot| slot.owner_step())
                    .and_then(|producer| discovery.steps.get(&producer.id()).copied());
                if let Some(producer) = producer {
                    add_edge(&mut dependents, &mut in_degree, producer, index);
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|index| in_degree[*index] == 0).collect();
    let mut ordered = Vec::with_capacity(count);
    let mut placed = vec![false; count];

    while let Some(index) = ready.pop_first() {
        placed[index] = true;
        ordered.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if ordered.len() < count {
        let blocked: Vec<String> = (0..count)
            .filter(|index| !placed[*index])
            .filter_map(|index| match &items[index] {
                Scheduled::Step(step) => Some(step.name()),
                Scheduled::Custom { .. } => None,
            })
            .collect();
        ScheduleCycle {
            trigger: &trigger.name(),
            steps: &blocked,
        }
        .log();
        ordered.extend((0..count).filter(|index| !placed[*index]));
    }
    ordered
}

/// Runs one pulse of `trigger` on the calling thread.
///
/// Downstream triggers of custom listeners that passed the pulse on have their
/// stats recorded here; the firing trigger records its own.
pub(crate) fn run_pulse(trigger: &Arc<Trigger>, ctx: &TriggerContext) -> PulseReport {
    let started = Instant::now();
    let schedule = schedule(trigger);
    let mut report = PulseReport::default();
    let mut reached = schedule.rooted.clone();
    let mut fired: Vec<(Arc<Trigger>, Instant)> = Vec::new();

    for item in &schedule.items {
        if let Scheduled::Step(step) = item {
            step.latch_inputs();
        }
    }

    for &index in &schedule.order {
        if !reached[index] {
            continue;
        }
        let passes_on = match &schedule.items[index] {
            Scheduled::Step(step) => {
                match step.execute(ctx) {
                    StepOutcome::Computed => report.computed += 1,
                    StepOutcome::Skipped => report.skipped += 1,
                    StepOutcome::Faulted => report.faulted += 1,
                }
                true
            }
            Scheduled::Custom { listener, sender } => {
                report.notified += 1;
                let fired_at = Instant::now();
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    listener.on_trigger(ctx, *sender)
                }));
                match result {
                    Ok(true) => {
                        if let Some(downstream) = listener.downstream_trigger() {
                            fired.push((downstream, fired_at));
                        }
                        true
                    }
                    Ok(false) => false,
                    Err(payload) => {
                        ListenerPanicked {
                            trigger: &ctx.source,
                            listener: &listener.name(),
                            message: &panic_message(payload.as_ref()),
                        }
                        .log();
                        false
                    }
                }
            }
        };
        if passes_on {
            for &next in &schedule.activates[index] {
                reached[next] = true;
            }
        }
    }

    let finished = Instant::now();
    for (downstream, fired_at) in fired {
        downstream.record_pulse(finished.duration_since(fired_at));
    }

    report.duration = started.elapsed();
    PulseCompleted {
        trigger: &trigger.name(),
        report: &report,
    }
    .log();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::connect;
    use crate::steps::stub::RecordingStep;
    use std::time::Duration;

    fn ctx() -> TriggerContext {
        TriggerContext::new("test", Duration::from_millis(10), Duration::from_millis(10))
    }

    fn wire(from: &Arc<StepNode>, output: &str, to: &Arc<StepNode>, input: &str) {
        let source = from.slots().slot(crate::data::SlotRole::Output, output).unwrap();
        let target = to.slots().slot(crate::data::SlotRole::Input, input).unwrap();
        connect(&source, &target, ConnectionKind::Synchronous).unwrap();
    }

    fn names(schedule: &Schedule) -> Vec<String> {
        schedule
            .ordered()
            .filter_map(|item| match item {
                Scheduled::Step(step) => Some(step.name()),
                Scheduled::Custom { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_downstream_steps_follow_synchronous_links() {
        let log = RecordingStep::log();
        let source = StepNode::new("source", RecordingStep::source("source", &log)).unwrap();
        let sink = StepNode::new("sink", RecordingStep::relay("sink", &log)).unwrap();
        wire(&source, "out", &sink, "in");

        let trigger = Trigger::new("tick");
        trigger.add_step(&source).unwrap();

        assert_eq!(names(&schedule(&trigger)), vec!["source", "sink"]);
    }

    #[test]
    fn test_producer_registered_later_runs_first() {
        let log = RecordingStep::log();
        let producer = StepNode::new("producer", RecordingStep::source("producer", &log)).unwrap();
        let consumer = StepNode::new("consumer", RecordingStep::relay("consumer", &log)).unwrap();
        wire(&producer, "out", &consumer, "in");

        let trigger = Trigger::new("tick");
        trigger.add_step(&consumer).unwrap();
        trigger.add_step(&producer).unwrap();

        assert_eq!(names(&schedule(&trigger)), vec!["producer", "consumer"]);
    }

    #[test]
    fn test_diamond_is_ordered_once() {
        let log = RecordingStep::log();
        let top = StepNode::new("top", RecordingStep::source("top", &log)).unwrap();
        let left = StepNode::new("left", RecordingStep::relay("left", &log)).unwrap();
        let right = StepNode::new("right", RecordingStep::relay("right", &log)).unwrap();
        let bottom = StepNode::new("bottom", RecordingStep::join("bottom", &log)).unwrap();
        wire(&top, "out", &left, "in");
        wire(&top, "out", &right, "in");
        wire(&left, "out", &bottom, "a");
        wire(&right, "out", &bottom, "b");

        let trigger = Trigger::new("tick");
        trigger.add_step(&top).unwrap();
        let report = trigger.trigger(&ctx());

        assert_eq!(*log.lock(), vec!["top", "left", "right", "bottom"]);
        assert_eq!(report.computed, 4);
    }

    #[test]
    fn test_finished_trigger_listeners_run_after_step() {
        let log = RecordingStep::log();
        let first = StepNode::new("first", RecordingStep::new("first", &log)).unwrap();
        let second = StepNode::new("second", RecordingStep::new("second", &log)).unwrap();
        first.finished_trigger().add_step(&second).unwrap();

        let trigger = Trigger::new("tick");
        trigger.add_step(&first).unwrap();
        trigger.trigger(&ctx());

        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_reachable_steps_include_chained() {
        let log = RecordingStep::log();
        let first = StepNode::new("first", RecordingStep::source("first", &log)).unwrap();
        let second = StepNode::new("second", RecordingStep::relay("second", &log)).unwrap();
        let third = StepNode::new("third", RecordingStep::new("third", &log)).unwrap();
        wire(&first, "out", &second, "in");
        second.finished_trigger().add_step(&third).unwrap();

        let trigger = Trigger::new("tick");
        trigger.add_step(&first).unwrap();

        let reachable: Vec<String> = reachable_steps(&trigger).iter().map(|s| s.name()).collect();
        assert_eq!(reachable, vec!["first", "second", "third"]);
    }
}
