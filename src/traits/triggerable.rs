// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::engine::{ElementId, Trigger, TriggerContext};

/// A custom trigger listener.
///
/// Steps and triggers are scheduled by the engine directly; anything else that
/// wants to react to a pulse implements this trait and is registered with
/// [`Trigger::add_triggerable`](crate::engine::Trigger::add_triggerable).
/// Listeners are held weakly: dropping the last `Arc` unregisters them.
pub trait Triggerable: Send + Sync {
    fn id(&self) -> ElementId;

    fn name(&self) -> String;

    /// Called once per pulse and sending trigger, on the firing thread.
    ///
    /// Returning true passes the pulse on to the listeners of
    /// [`downstream_trigger`](Self::downstream_trigger), which then run later
    /// in the same pulse.
    fn on_trigger(&self, ctx: &TriggerContext, sender: ElementId) -> bool;

    fn on_connected(&self, _trigger: ElementId) {}

    fn on_disconnected(&self, _trigger: ElementId) {}

    /// A trigger this listener fires in turn, if any. Its listeners are
    /// scheduled, started and checked together with the sending trigger's.
    fn downstream_trigger(&self) -> Option<Arc<Trigger>> {
        None
    }
}
