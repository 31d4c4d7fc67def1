// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! On-demand graph analysis.
//!
//! The checker never mutates the graph; it reports what would keep a pulse
//! from producing valid data:
//!
//! 1. **Unconnected inputs**: a mandatory input with no source, or whose link
//!    chain ends before reaching an owned slot
//! 2. **Type mismatches**: between declared types of a connected pair, and
//!    between the data an input currently reads and its declared type
//! 3. **Synchronous cycles**: DFS with a recursion stack over step-to-step
//!    synchronous edges; delayed connections are not edges
//! 4. **Untriggered steps** (warning): steps no trigger of a group reaches
//!
//! A looped trigger refuses to start while its reachable steps have errors.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::data::ConnectionKind;
use crate::engine::schedule;
use crate::engine::{ElementId, Group, StepNode, Trigger};
use crate::observability::messages::consistency::{ConsistencyChecked, CycleDetected};
use crate::observability::messages::StructuredLog;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    UnconnectedInput { slot: String },
    /// The input is linked, but the chain ends at a connector with no source.
    DanglingInput { slot: String },
    TypeMismatch {
        slot: String,
        expected: String,
        found: String,
    },
    SynchronousCycle { cycle: Vec<String> },
    StepNotTriggered,
}

impl Display for IssueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueKind::UnconnectedInput { slot } => {
                write!(f, "mandatory input '{}' is not connected", slot)
            }
            IssueKind::DanglingInput { slot } => {
                write!(f, "input '{}' does not resolve to any output", slot)
            }
            IssueKind::TypeMismatch {
                slot,
                expected,
                found,
            } => write!(f, "input '{}' expects {} but is fed {}", slot, expected, found),
            IssueKind::SynchronousCycle { cycle } => {
                write!(f, "synchronous cycle: {}", cycle.join(" -> "))
            }
            IssueKind::StepNotTriggered => write!(f, "no trigger reaches this step"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConsistencyIssue {
    pub severity: Severity,
    pub kind: IssueKind,
    /// Name of the step the issue was found on.
    pub element: String,
}

impl ConsistencyIssue {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Display for ConsistencyIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} in '{}': {}", severity, self.element, self.kind)
    }
}

pub struct ConsistencyChecker;

impl ConsistencyChecker {
    /// Slot and cycle checks over a set of steps.
    pub fn check_steps(steps: &[Arc<StepNode>]) -> Vec<ConsistencyIssue> {
        let mut issues = Vec::new();
        for step in steps {
            check_inputs(step, &mut issues);
        }
        check_cycles(steps, &mut issues);
        issues
    }

    /// Checks everything a pulse from `trigger` would reach.
    pub fn check_trigger(trigger: &Arc<Trigger>) -> Vec<ConsistencyIssue> {
        let steps = schedule::reachable_steps(trigger);
        let issues = Self::check_steps(&steps);
        log_summary(&trigger.name(), &issues);
        issues
    }

    /// Checks every step of `group` and its nested groups.
    pub fn check_group(group: &Group) -> Vec<ConsistencyIssue> {
        let steps = group.all_steps();
        let mut issues = Self::check_steps(&steps);

        let mut reached: HashSet<ElementId> = HashSet::new();
        for trigger in group.all_trigger_sources() {
            reached.extend(schedule::reachable_steps(&trigger).iter().map(|step| step.id()));
        }
        for step in &steps {
            if !reached.contains(&step.id()) {
                issues.push(ConsistencyIssue {
                    severity: Severity::Warning,
                    kind: IssueKind::StepNotTriggered,
                    element: step.name(),
                });
            }
        }

        log_summary(&group.name(), &issues);
        issues
    }
}

fn log_summary(scope: &str, issues: &[ConsistencyIssue]) {
    let errors = issues.iter().filter(|issue| issue.is_error()).count();
    ConsistencyChecked {
        scope,
        errors,
        warnings: issues.len() - errors,
    }
    .log();
}

fn check_inputs(step: &StepNode, issues: &mut Vec<ConsistencyIssue>) {
    let element = step.name();
    for input in step.slots().inputs() {
        let slot = input.name().to_string();
        if input.source().is_none() {
            if !input.is_optional() {
                issues.push(ConsistencyIssue {
                    severity: Severity::Error,
                    kind: IssueKind::UnconnectedInput { slot },
                    element: element.clone(),
                });
            }
            continue;
        }

        let Some(producer) = input.producer() else {
            issues.push(ConsistencyIssue {
                severity: if input.is_optional() {
                    Severity::Warning
                } else {
                    Severity::Error
                },
                kind: IssueKind::DanglingInput { slot },
                element: element.clone(),
            });
            continue;
        };

        if !producer.data_type().is_compatible_with(&input.data_type()) {
            issues.push(ConsistencyIssue {
                severity: Severity::Error,
                kind: IssueKind::TypeMismatch {
                    slot,
                    expected: input.data_type().to_string(),
                    found: producer.data_type().to_string(),
                },
                element: element.clone(),
            });
            continue;
        }

        if let Some(data) = input.data() {
            if !data.data_type().is_compatible_with(&input.data_type()) {
                issues.push(ConsistencyIssue {
                    severity: Severity::Error,
                    kind: IssueKind::TypeMismatch {
                        slot,
                        expected: input.data_type().to_string(),
                        found: data.data_type().to_string(),
                    },
                    element: element.clone(),
                });
            }
        }
    }
}

/// Step-to-step synchronous edges, producer first, in slot order.
fn synchronous_edges(steps: &[Arc<StepNode>]) -> HashMap<ElementId, Vec<ElementId>> {
    let mut graph: HashMap<ElementId, Vec<ElementId>> = HashMap::new();
    for step in steps {
        for input in step.slots().inputs() {
            if input.source_kind() != Some(ConnectionKind::Synchronous) {
                continue;
            }
            if let Some(producer) = input.producer().and_then(|slot| slot.owner_step()) {
                let consumers = graph.entry(producer.id()).or_default();
                if !consumers.contains(&step.id()) {
                    consumers.push(step.id());
                }
            }
        }
    }
    graph
}

fn check_cycles(steps: &[Arc<StepNode>], issues: &mut Vec<ConsistencyIssue>) {
    let graph = synchronous_edges(steps);
    let names: HashMap<ElementId, String> =
        steps.iter().map(|step| (step.id(), step.name())).collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();
    let mut cycles = Vec::new();

    for step in steps {
        if !visited.contains(&step.id()) {
            dfs_cycle_detection(step.id(), &graph, &mut visited, &mut rec_stack, &mut path, &mut cycles);
        }
    }

    for cycle in cycles {
        let cycle: Vec<String> = cycle
            .iter()
            .map(|id| names.get(id).cloned().unwrap_or_else(|| id.to_string()))
            .collect();
        CycleDetected { cycle: &cycle }.log();
        issues.push(ConsistencyIssue {
            severity: Severity::Error,
            element: cycle.first().cloned().unwrap_or_default(),
            kind: IssueKind::SynchronousCycle { cycle },
        });
    }
}

/// Depth-first search with an explicit recursion stack.
///
/// Nodes on `rec_stack` are on the current path; every edge back to one of them
/// closes a cycle, which is collected as the path slice from that node on, with
/// the node repeated at the end. The walk continues past each cycle so cycles
/// sharing nodes are all found.
fn dfs_cycle_detection(
    node: ElementId,
    graph: &HashMap<ElementId, Vec<ElementId>>,
    visited: &mut HashSet<ElementId>,
    rec_stack: &mut HashSet<ElementId>,
    path: &mut Vec<ElementId>,
    cycles: &mut Vec<Vec<ElementId>>,
) {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(&node) {
        for &neighbor in neighbors {
            if !visited.contains(&neighbor) {
                dfs_cycle_detection(neighbor, graph, visited, rec_stack, path, cycles);
            } else if rec_stack.contains(&neighbor) {
                let start = path.iter().position(|id| *id == neighbor).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(neighbor);
                cycles.push(cycle);
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
}
