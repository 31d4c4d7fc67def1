// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Type tag declared by a slot and carried by every [`Data`] value.
///
/// `Any` slots accept every type; two typed tags are compatible only when they
/// name the same Rust type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Any,
    Typed { id: TypeId, name: &'static str },
}

impl DataType {
    pub fn of<T: Any>() -> Self {
        DataType::Typed {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Any => "any",
            DataType::Typed { name, .. } => name,
        }
    }

    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        match (self, other) {
            (DataType::Any, _) | (_, DataType::Any) => true,
            (DataType::Typed { id: a, .. }, DataType::Typed { id: b, .. }) => a == b,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable, type-tagged snapshot of a slot's value.
///
/// Cloning is cheap: the payload sits behind an `Arc` and is shared read-only
/// by every consumer. A step publishes a new value by writing a new `Data`
/// into its output slot, which bumps the slot's change version.
#[derive(Clone)]
pub struct Data {
    data_type: DataType,
    value: Arc<dyn Any + Send + Sync>,
    version: u64,
}

impl Data {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            data_type: DataType::of::<T>(),
            value: Arc::new(value),
            version: 0,
        }
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Change version assigned by the owning slot when the value was written.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("data_type", &self.data_type.name())
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_is_compatible_with_everything() {
        assert!(DataType::Any.is_compatible_with(&DataType::of::<f64>()));
        assert!(DataType::of::<String>().is_compatible_with(&DataType::Any));
    }

    #[test]
    fn test_distinct_types_are_incompatible() {
        assert!(DataType::of::<f64>().is_compatible_with(&DataType::of::<f64>()));
        assert!(!DataType::of::<f64>().is_compatible_with(&DataType::of::<i64>()));
    }

    #[test]
    fn test_data_downcast() {
        let data = Data::new(2.5_f64);
        assert!(data.is::<f64>());
        assert_eq!(data.downcast_ref::<f64>(), Some(&2.5));
        assert_eq!(data.downcast_ref::<i32>(), None);
        assert_eq!(data.data_type(), DataType::of::<f64>());
        assert_eq!(data.version(), 0);
    }

    #[test]
    fn test_clone_shares_payload() {
        let data = Data::new(vec![1u8, 2, 3]).with_version(4);
        let copy = data.clone();
        assert_eq!(copy.version(), 4);
        assert!(std::ptr::eq(
            data.downcast_ref::<Vec<u8>>().unwrap(),
            copy.downcast_ref::<Vec<u8>>().unwrap()
        ));
    }
}
