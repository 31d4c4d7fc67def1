// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use std::sync::Arc;

use crate::engine::{ElementId, Trigger, TriggerContext};
use crate::traits::Triggerable;

/// Fires its own trigger once every connected incoming trigger has fired since
/// the last time it fired.
///
/// Connect incoming triggers with [`Trigger::add_triggerable`] (or
/// `Group::connect_trigger`); connect listeners to [`MultiTrigger::trigger`].
/// The joined listeners run inside the pulse of whichever incoming trigger
/// fired last, so a step reached both directly and through the join still
/// computes once per pulse.
pub struct MultiTrigger {
    id: ElementId,
    trigger: Arc<Trigger>,
    incoming: Mutex<Vec<(ElementId, bool)>>,
}

impl MultiTrigger {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: ElementId::next(),
            trigger: Trigger::new(name),
            incoming: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> String {
        self.trigger.name()
    }

    pub fn trigger(&self) -> &Arc<Trigger> {
        &self.trigger
    }

    pub fn incoming(&self) -> Vec<ElementId> {
        self.incoming.lock().iter().map(|(id, _)| *id).collect()
    }

    /// Marks `sender` as fired. Returns true when that completed the set.
    fn mark(&self, sender: ElementId) -> bool {
        let mut incoming = self.incoming.lock();
        match incoming.iter_mut().find(|(id, _)| *id == sender) {
            Some((_, fired)) => *fired = true,
            None => return false,
        }
        if incoming.iter().all(|(_, fired)| *fired) {
            for (_, fired) in incoming.iter_mut() {
                *fired = false;
            }
            true
        } else {
            false
        }
    }
}

impl Triggerable for MultiTrigger {
    fn id(&self) -> ElementId {
        self.id
    }

    fn name(&self) -> String {
        self.trigger.name()
    }

    fn on_trigger(&self, _ctx: &TriggerContext, sender: ElementId) -> bool {
        self.mark(sender)
    }

    fn on_connected(&self, trigger: ElementId) {
        let mut incoming = self.incoming.lock();
        if !incoming.iter().any(|(id, _)| *id == trigger) {
            incoming.push((trigger, false));
        }
    }

    fn on_disconnected(&self, trigger: ElementId) {
        self.incoming.lock().retain(|(id, _)| *id != trigger);
    }

    fn downstream_trigger(&self) -> Option<Arc<Trigger>> {
        Some(self.trigger.clone())
    }
}

impl std::fmt::Debug for MultiTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiTrigger")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("incoming", &self.incoming.lock().len())
            .finish()
    }
}
