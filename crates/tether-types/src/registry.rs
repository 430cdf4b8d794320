//! # Message Type Registry
//!
//! Append-only table from wire code to [`MessageType`]. One registry is built
//! per process (or per test) and shared through an `Arc` with every server
//! and client that needs to resolve codes; there is no removal operation.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::errors::RegistryError;
use crate::message_type::{CodeRange, MessageType};
use crate::system;

/// Code -> message type table with O(1) lookup.
#[derive(Debug)]
pub struct MessageTypeRegistry {
    types: RwLock<HashMap<u16, MessageType>>,
}

impl MessageTypeRegistry {
    /// Create a registry pre-populated with the system catalog.
    pub fn new() -> Self {
        let types = system::CATALOG
            .into_iter()
            .map(|ty| (ty.code(), ty))
            .collect();
        Self {
            types: RwLock::new(types),
        }
    }

    /// Register a message type.
    ///
    /// Re-registering an identical definition is a no-op. A different
    /// definition under an existing code fails with `DuplicateCode`, and any
    /// new code in the system range fails with `ReservedCode`.
    pub fn register(&self, message_type: MessageType) -> Result<(), RegistryError> {
        let mut types = self.types.write();

        if let Some(existing) = types.get(&message_type.code()) {
            if *existing == message_type {
                return Ok(());
            }
            return Err(RegistryError::DuplicateCode {
                code: message_type.code(),
                existing: existing.name().to_string(),
            });
        }

        if message_type.is_system() {
            return Err(RegistryError::ReservedCode(message_type.code()));
        }

        debug!(
            code = message_type.code(),
            name = message_type.name(),
            range = %message_type.category(),
            "Registered message type"
        );
        types.insert(message_type.code(), message_type);
        Ok(())
    }

    /// Register under the lowest free code in the plugin range.
    pub fn register_auto(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<MessageType, RegistryError> {
        let mut types = self.types.write();

        let code = (CodeRange::PLUGIN_MIN..=u16::MAX)
            .find(|code| !types.contains_key(code))
            .ok_or(RegistryError::CodeSpaceExhausted)?;

        let message_type = MessageType::new(code, name, description);
        debug!(code, name = message_type.name(), "Auto-assigned message type");
        types.insert(code, message_type.clone());
        Ok(message_type)
    }

    /// Look up a type by code.
    pub fn get(&self, code: u16) -> Result<MessageType, RegistryError> {
        self.types
            .read()
            .get(&code)
            .cloned()
            .ok_or(RegistryError::UnknownType(code))
    }

    pub fn has(&self, code: u16) -> bool {
        self.types.read().contains_key(&code)
    }

    /// All registered types, ordered by code.
    pub fn list_all(&self) -> Vec<MessageType> {
        let mut all: Vec<_> = self.types.read().values().cloned().collect();
        all.sort_by_key(MessageType::code);
        all
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

impl Default for MessageTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
