//! Registry of application object types.
//!
//! A [`TypeRegistry`] maps each [`WireObject`] type to a one-byte class id
//! and back. It is built once at startup, then shared read-only (usually
//! behind an `Arc`) by every writer and reader. Both directions are
//! write-once: a class id names one type, a type has one class id, and a
//! conflicting registration is rejected without touching the registry.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use crate::{ObjectValue, ProtocolError, Reader, WireObject};

pub(crate) type DecodeFn =
    fn(&mut Reader<'_>) -> Result<ObjectValue, ProtocolError>;

struct Entry {
    type_name: &'static str,
    decode: DecodeFn,
}

/// Class id assignments for application object types.
#[derive(Default)]
pub struct TypeRegistry {
    by_class: HashMap<u8, Entry>,
    by_type: HashMap<TypeId, u8>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `class_id`.
    ///
    /// # Errors
    /// - [`ProtocolError::DuplicateType`] if `T` is already registered
    /// - [`ProtocolError::DuplicateClass`] if `class_id` is taken
    pub fn register<T: WireObject>(
        &mut self,
        class_id: u8,
    ) -> Result<(), ProtocolError> {
        let type_name = std::any::type_name::<T>();
        if let Some(&existing) = self.by_type.get(&TypeId::of::<T>()) {
            return Err(ProtocolError::DuplicateType {
                type_name,
                class_id: existing,
            });
        }
        if let Some(entry) = self.by_class.get(&class_id) {
            return Err(ProtocolError::DuplicateClass {
                class_id,
                existing: entry.type_name,
            });
        }

        self.by_type.insert(TypeId::of::<T>(), class_id);
        self.by_class.insert(
            class_id,
            Entry {
                type_name,
                decode: decode_as::<T>,
            },
        );
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: WireObject>(
        mut self,
        class_id: u8,
    ) -> Result<Self, ProtocolError> {
        self.register::<T>(class_id)?;
        Ok(self)
    }

    /// The class id `T` is registered under.
    pub fn class_id<T: WireObject>(&self) -> Option<u8> {
        self.class_id_of(TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.by_class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty()
    }

    pub(crate) fn class_id_of(&self, type_id: TypeId) -> Option<u8> {
        self.by_type.get(&type_id).copied()
    }

    pub(crate) fn decoder(&self, class_id: u8) -> Option<DecodeFn> {
        self.by_class.get(&class_id).map(|entry| entry.decode)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut classes: Vec<_> = self
            .by_class
            .iter()
            .map(|(id, entry)| (*id, entry.type_name))
            .collect();
        classes.sort_unstable();
        f.debug_struct("TypeRegistry")
            .field("classes", &classes)
            .finish()
    }
}

fn decode_as<T: WireObject>(
    reader: &mut Reader<'_>,
) -> Result<ObjectValue, ProtocolError> {
    Ok(ObjectValue::new(T::decode(reader)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Writer;

    #[derive(Debug, Clone, PartialEq)]
    struct Alpha;

    #[derive(Debug, Clone, PartialEq)]
    struct Beta;

    impl WireObject for Alpha {
        fn encode(&self, _: &mut Writer<'_>) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn decode(_: &mut Reader<'_>) -> Result<Self, ProtocolError> {
            Ok(Self)
        }
    }

    impl WireObject for Beta {
        fn encode(&self, _: &mut Writer<'_>) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn decode(_: &mut Reader<'_>) -> Result<Self, ProtocolError> {
            Ok(Self)
        }
    }

    #[test]
    fn test_register_assigns_class_id() {
        let registry = TypeRegistry::new().with::<Alpha>(1).unwrap();
        assert_eq!(registry.class_id::<Alpha>(), Some(1));
        assert_eq!(registry.class_id::<Beta>(), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_same_type_twice_fails_without_mutation() {
        let mut registry = TypeRegistry::new();
        registry.register::<Alpha>(1).unwrap();

        let err = registry.register::<Alpha>(2).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::DuplicateType { class_id: 1, .. }
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.class_id::<Alpha>(), Some(1));
        assert!(registry.decoder(2).is_none());
    }

    #[test]
    fn test_register_two_types_same_class_fails_without_mutation() {
        let mut registry = TypeRegistry::new();
        registry.register::<Alpha>(5).unwrap();

        let err = registry.register::<Beta>(5).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::DuplicateClass { class_id: 5, .. }
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.class_id::<Beta>(), None);
    }

    #[test]
    fn test_debug_lists_classes_in_order() {
        let registry = TypeRegistry::new()
            .with::<Beta>(9)
            .unwrap()
            .with::<Alpha>(2)
            .unwrap();
        let debug = format!("{registry:?}");
        let alpha = debug.find("Alpha").unwrap();
        let beta = debug.find("Beta").unwrap();
        assert!(alpha < beta);
    }
}
