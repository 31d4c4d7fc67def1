// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::data::SlotSpec;
use crate::errors::ComputeError;
use crate::traits::{ComputeContext, Step};

/// Publishes the same value on every pulse.
pub struct ConstantStep {
    value: f64,
}

impl ConstantStep {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Step for ConstantStep {
    fn type_name(&self) -> &'static str {
        "constant"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::output::<f64>("value")]
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        ctx.write("value", self.value)
    }
}

/// Counts the pulses it has seen: 1, 2, 3, ...
pub struct CounterStep {
    count: u64,
}

impl CounterStep {
    pub fn new() -> Self {
        Self { count: 0 }
    }
}

impl Default for CounterStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for CounterStep {
    fn type_name(&self) -> &'static str {
        "counter"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::output::<f64>("value")]
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        self.count += 1;
        ctx.write("value", self.count as f64)
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{StepNode, TriggerContext};
    use std::time::Duration;

    fn value(node: &StepNode) -> Option<f64> {
        node.slots().outputs()[0]
            .data()
            .and_then(|data| data.downcast_ref::<f64>().copied())
    }

    #[test]
    fn test_counter_counts_pulses() {
        let ctx = TriggerContext::new("test", Duration::from_millis(5), Duration::from_millis(5));
        let counter = StepNode::new("counter", CounterStep::new()).unwrap();

        for _ in 0..3 {
            counter.execute(&ctx);
        }

        assert_eq!(value(&counter), Some(3.0));
    }

    #[test]
    fn test_constant_publishes_value() {
        let ctx = TriggerContext::new("test", Duration::from_millis(5), Duration::from_millis(5));
        let constant = StepNode::new("pi", ConstantStep::new(2.5)).unwrap();

        constant.execute(&ctx);

        assert_eq!(value(&constant), Some(2.5));
    }
}
