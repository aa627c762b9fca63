//! Registry mapping command types to decoder factories.
//!
//! Resolution walks from most to least specific: an exact `(family, subtype)`
//! entry, then a family-wide entry, then the global catch-all. A miss is a
//! normal outcome, not an error; frames with no decoder still flow through
//! the listener pipeline with an absent command.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use crate::command::{CommandKey, CommandType, SnacCommand, SnacFrame};

/// Errors a factory may produce while decoding a frame's payload.
#[derive(Debug)]
pub enum DecodeError {
    /// The payload ended before a required field.
    Truncated {
        /// Type of the frame being decoded.
        command_type: CommandType,
        /// Bytes the decoder needed.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },
    /// The payload was structurally invalid.
    Malformed {
        /// Type of the frame being decoded.
        command_type: CommandType,
        /// Decoder-specific description of the fault.
        message: String,
    },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated {
                command_type,
                needed,
                available,
            } => write!(
                f,
                "payload for {command_type} truncated: needed {needed} bytes, had {available}"
            ),
            Self::Malformed {
                command_type,
                message,
            } => write!(f, "malformed payload for {command_type}: {message}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decoder turning a raw frame into a typed command.
pub trait CommandFactory: Send + Sync {
    /// Decode `frame` into an application command.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the payload cannot be interpreted. The
    /// processor reports the failure and continues as if no factory matched.
    fn decode(&self, frame: &SnacFrame) -> Result<Box<dyn SnacCommand>, DecodeError>;
}

#[derive(Default)]
struct FactoryMaps {
    exact: HashMap<CommandType, Arc<dyn CommandFactory>>,
    family: HashMap<u16, Arc<dyn CommandFactory>>,
    any: Option<Arc<dyn CommandFactory>>,
}

/// Concurrent registry of command factories keyed by [`CommandKey`].
#[derive(Default)]
pub struct FactoryRegistry {
    inner: RwLock<FactoryMaps>,
}

impl FactoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Install `factory` under `key`, replacing any previous entry.
    pub fn register(&self, key: CommandKey, factory: Arc<dyn CommandFactory>) {
        let mut maps = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match key {
            CommandKey::Exact(command_type) => {
                maps.exact.insert(command_type, factory);
            }
            CommandKey::Family(family) => {
                maps.family.insert(family, factory);
            }
            CommandKey::Any => maps.any = Some(factory),
        }
    }

    /// Remove the entry under `key`, if any.
    pub fn unregister(&self, key: CommandKey) {
        let mut maps = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match key {
            CommandKey::Exact(command_type) => {
                maps.exact.remove(&command_type);
            }
            CommandKey::Family(family) => {
                maps.family.remove(&family);
            }
            CommandKey::Any => maps.any = None,
        }
    }

    /// Find the most specific factory for `command_type`.
    #[must_use]
    pub fn resolve(&self, command_type: CommandType) -> Option<Arc<dyn CommandFactory>> {
        let maps = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        maps.exact
            .get(&command_type)
            .or_else(|| maps.family.get(&command_type.family))
            .or(maps.any.as_ref())
            .cloned()
    }
}
