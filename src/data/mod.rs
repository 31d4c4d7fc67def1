// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Typed data ports.
//!
//! * `value` - the type-tagged [`Data`] container and its [`DataType`] tag
//! * `slot` - [`DataSlot`], a named port that owns (outputs, buffers) or links to
//!   (inputs, group connectors) a `Data` value
//! * `connection` - slot-level `connect`/`disconnect`

mod connection;
mod slot;
mod value;

pub use connection::{connect, disconnect, ConnectionKind};
pub use slot::{DataSlot, SlotRole, SlotSpec, Validity};
pub(crate) use slot::SlotOwner;
pub use value::{Data, DataType};
