// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::data::SlotSpec;
use crate::errors::ComputeError;
use crate::traits::{ComputeContext, Step};

/// Multiplies its input by a constant factor.
pub struct GainStep {
    factor: f64,
}

impl GainStep {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }
}

impl Step for GainStep {
    fn type_name(&self) -> &'static str {
        "gain"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![
            SlotSpec::input::<f64>("input"),
            SlotSpec::output::<f64>("output"),
        ]
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let input: f64 = ctx.read("input")?;
        ctx.write("output", input * self.factor)
    }
}

/// Adds two inputs. `b` is optional and reads as zero without valid data, so
/// the step can close a delayed feedback loop onto itself.
pub struct SumStep;

impl SumStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SumStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for SumStep {
    fn type_name(&self) -> &'static str {
        "sum"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![
            SlotSpec::input::<f64>("a"),
            SlotSpec::optional_input::<f64>("b"),
            SlotSpec::output::<f64>("sum"),
        ]
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let a: f64 = ctx.read("a")?;
        let b = ctx.read_optional::<f64>("b")?.unwrap_or(0.0);
        ctx.write("sum", a + b)
    }
}

/// Integrates its input over simulated time.
///
/// The running total lives in the `total` buffer, which starts at zero and
/// returns to zero when the step is reset.
pub struct AccumulatorStep;

impl AccumulatorStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AccumulatorStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for AccumulatorStep {
    fn type_name(&self) -> &'static str {
        "accumulator"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![
            SlotSpec::input::<f64>("input"),
            SlotSpec::buffer::<f64>("total").with_initial(0.0_f64),
            SlotSpec::output::<f64>("output"),
        ]
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let input: f64 = ctx.read("input")?;
        let total: f64 = ctx.read("total")?;
        let total = total + input * ctx.step_size().as_secs_f64();
        ctx.write("total", total)?;
        ctx.write("output", total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{connect, ConnectionKind, SlotRole};
    use crate::engine::{StepNode, TriggerContext};
    use crate::steps::ConstantStep;
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx() -> TriggerContext {
        TriggerContext::new("test", Duration::from_millis(500), Duration::from_millis(500))
    }

    fn read(node: &Arc<StepNode>, role: SlotRole, name: &str) -> Option<f64> {
        node.slots()
            .slot(role, name)
            .unwrap()
            .data()
            .and_then(|data| data.downcast_ref::<f64>().copied())
    }

    fn wire(from: &Arc<StepNode>, output: &str, to: &Arc<StepNode>, input: &str) {
        let source = from.slots().slot(SlotRole::Output, output).unwrap();
        let target = to.slots().slot(SlotRole::Input, input).unwrap();
        connect(&source, &target, ConnectionKind::Synchronous).unwrap();
    }

    #[test]
    fn test_sum_treats_missing_b_as_zero() {
        let one = StepNode::new("one", ConstantStep::new(1.0)).unwrap();
        let sum = StepNode::new("sum", SumStep::new()).unwrap();
        wire(&one, "value", &sum, "a");

        one.execute(&ctx());
        sum.execute(&ctx());

        assert_eq!(read(&sum, SlotRole::Output, "sum"), Some(1.0));
    }

    #[test]
    fn test_accumulator_integrates_and_resets() {
        let rate = StepNode::new("rate", ConstantStep::new(4.0)).unwrap();
        let acc = StepNode::new("acc", AccumulatorStep::new()).unwrap();
        wire(&rate, "value", &acc, "input");

        rate.execute(&ctx());
        acc.execute(&ctx());
        acc.execute(&ctx());

        assert_eq!(read(&acc, SlotRole::Output, "output"), Some(4.0));
        assert_eq!(read(&acc, SlotRole::Buffer, "total"), Some(4.0));

        acc.start();
        acc.reset().unwrap();
        assert_eq!(read(&acc, SlotRole::Buffer, "total"), Some(0.0));
        assert_eq!(read(&acc, SlotRole::Output, "output"), None);
    }
}
