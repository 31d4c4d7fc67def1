// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Slot-to-slot connections.
//!
//! A connection is a non-owning link stored on both ends: the target keeps a
//! weak reference to its single source, the source keeps weak references to
//! all of its targets. Structural checks run before anything is linked, so a
//! rejected call leaves both slots untouched.

use serde::Serialize;
use std::sync::Arc;

use crate::data::slot::SlotLink;
use crate::data::{DataSlot, SlotRole};
use crate::errors::GraphError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// The target reads the source's current value and is scheduled after it.
    #[default]
    Synchronous,
    /// The target reads the value the source held when the pulse started.
    Delayed,
}

/// Links `target` to read from `source`.
pub fn connect(
    source: &Arc<DataSlot>,
    target: &Arc<DataSlot>,
    kind: ConnectionKind,
) -> Result<(), GraphError> {
    let from = source.name().to_string();
    let to = target.name().to_string();
    let invalid = |reason: &str| GraphError::InvalidConnection {
        from: from.clone(),
        to: to.clone(),
        reason: reason.to_string(),
    };

    if !(source.is_owned() || source.is_connector()) {
        return Err(invalid("source must be an output, a buffer or a group connector"));
    }
    if target.is_owned() || !(target.role() == SlotRole::Input || target.is_connector()) {
        return Err(invalid("target must be an input or a group connector"));
    }
    if kind == ConnectionKind::Delayed && target.is_connector() {
        return Err(invalid("delayed connections must end at a step input"));
    }
    if !source.data_type().is_compatible_with(&target.data_type()) {
        return Err(GraphError::TypeMismatch {
            from,
            to,
            from_type: source.data_type(),
            to_type: target.data_type(),
        });
    }
    if target.has_live_source() {
        return Err(GraphError::AlreadyConnected { to });
    }
    if kind == ConnectionKind::Synchronous
        && source.owner_id() == target.owner_id()
        && !is_pass_through(source, target)
    {
        return Err(GraphError::SelfLoop { from, to });
    }

    let attached = target.try_attach_source(SlotLink {
        slot: Arc::downgrade(source),
        kind,
    });
    if !attached {
        return Err(GraphError::AlreadyConnected { to });
    }
    source.add_target(SlotLink {
        slot: Arc::downgrade(target),
        kind,
    });
    Ok(())
}

/// Removes the link from `source` to `target`. Returns whether anything was
/// linked; calling it again is a no-op.
pub fn disconnect(source: &Arc<DataSlot>, target: &Arc<DataSlot>) -> bool {
    let linked = target
        .source()
        .is_some_and(|current| Arc::ptr_eq(&current, source));
    if linked {
        target.detach_source();
    }
    let removed = source.remove_target(target);
    linked || removed
}

/// A group's input connector feeding its own output connector directly.
fn is_pass_through(source: &DataSlot, target: &DataSlot) -> bool {
    source.is_connector()
        && target.is_connector()
        && source.role() == SlotRole::Input
        && target.role() == SlotRole::Output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::slot::SlotOwner;
    use crate::data::{Data, SlotSpec, Validity};
    use crate::engine::ElementId;
    use std::sync::Weak;

    fn owned_by(owner: ElementId, spec: SlotSpec) -> Arc<DataSlot> {
        Arc::new(DataSlot::new(spec, owner, SlotOwner::Step(Weak::new()), false))
    }

    fn slot(spec: SlotSpec) -> Arc<DataSlot> {
        owned_by(ElementId::next(), spec)
    }

    #[test]
    fn test_connect_matching_types() {
        let out = slot(SlotSpec::output::<f64>("value"));
        let input = slot(SlotSpec::input::<f64>("input"));

        connect(&out, &input, ConnectionKind::Synchronous).unwrap();

        assert!(Arc::ptr_eq(&input.source().unwrap(), &out));
        assert_eq!(out.targets().len(), 1);
        assert_eq!(input.validity(), Validity::Unknown);

        out.write(Data::new(4.0_f64));
        assert_eq!(input.validity(), Validity::Valid);
        assert_eq!(input.data().unwrap().downcast_ref::<f64>(), Some(&4.0));
    }

    #[test]
    fn test_type_mismatch_leaves_slots_unchanged() {
        let out = slot(SlotSpec::output::<f64>("value"));
        let input = slot(SlotSpec::input::<String>("text"));

        let err = connect(&out, &input, ConnectionKind::Synchronous).unwrap_err();

        assert!(matches!(err, GraphError::TypeMismatch { .. }));
        assert!(input.source().is_none());
        assert!(out.targets().is_empty());
    }

    #[test]
    fn test_untyped_input_accepts_anything() {
        let out = slot(SlotSpec::output::<String>("text"));
        let input = slot(SlotSpec::untyped("anything", SlotRole::Input));
        assert!(connect(&out, &input, ConnectionKind::Synchronous).is_ok());
    }

    #[test]
    fn test_second_source_is_rejected() {
        let a = slot(SlotSpec::output::<f64>("a"));
        let b = slot(SlotSpec::output::<f64>("b"));
        let input = slot(SlotSpec::input::<f64>("input"));

        connect(&a, &input, ConnectionKind::Synchronous).unwrap();
        let err = connect(&b, &input, ConnectionKind::Synchronous).unwrap_err();

        assert!(matches!(err, GraphError::AlreadyConnected { .. }));
        assert!(Arc::ptr_eq(&input.source().unwrap(), &a));
        assert!(b.targets().is_empty());
    }

    #[test]
    fn test_fan_out_is_allowed() {
        let out = slot(SlotSpec::output::<f64>("value"));
        let first = slot(SlotSpec::input::<f64>("first"));
        let second = slot(SlotSpec::input::<f64>("second"));

        connect(&out, &first, ConnectionKind::Synchronous).unwrap();
        connect(&out, &second, ConnectionKind::Synchronous).unwrap();

        assert_eq!(out.targets().len(), 2);
    }

    #[test]
    fn test_input_cannot_be_a_source() {
        let input = slot(SlotSpec::input::<f64>("input"));
        let other = slot(SlotSpec::input::<f64>("other"));
        let err = connect(&input, &other, ConnectionKind::Synchronous).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConnection { .. }));
    }

    #[test]
    fn test_synchronous_self_loop_is_rejected() {
        let owner = ElementId::next();
        let out = owned_by(owner, SlotSpec::output::<f64>("value"));
        let input = owned_by(owner, SlotSpec::input::<f64>("input"));

        let err = connect(&out, &input, ConnectionKind::Synchronous).unwrap_err();
        assert!(matches!(err, GraphError::SelfLoop { .. }));

        connect(&out, &input, ConnectionKind::Delayed).unwrap();
        assert_eq!(input.source_kind(), Some(ConnectionKind::Delayed));
    }

    #[test]
    fn test_delayed_input_reads_latched_value() {
        let out = slot(SlotSpec::output::<f64>("value"));
        let input = slot(SlotSpec::input::<f64>("input"));
        connect(&out, &input, ConnectionKind::Delayed).unwrap();

        out.write(Data::new(1.0_f64));
        input.latch();
        out.write(Data::new(2.0_f64));

        assert_eq!(input.data().unwrap().downcast_ref::<f64>(), Some(&1.0));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let out = slot(SlotSpec::output::<f64>("value"));
        let input = slot(SlotSpec::input::<f64>("input"));
        connect(&out, &input, ConnectionKind::Synchronous).unwrap();

        assert!(disconnect(&out, &input));
        assert!(!disconnect(&out, &input));
        assert!(input.source().is_none());
        assert_eq!(input.validity(), Validity::Invalid);
        assert!(out.targets().is_empty());
    }

    #[test]
    fn test_dropped_source_reads_invalid() {
        let out = slot(SlotSpec::output::<f64>("value"));
        let input = slot(SlotSpec::input::<f64>("input"));
        connect(&out, &input, ConnectionKind::Synchronous).unwrap();
        out.write(Data::new(1.0_f64));

        drop(out);

        assert_eq!(input.validity(), Validity::Invalid);
        let replacement = slot(SlotSpec::output::<f64>("value"));
        assert!(connect(&replacement, &input, ConnectionKind::Synchronous).is_ok());
    }
}
