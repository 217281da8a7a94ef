//! The [`KeyValueStore`] trait backing the identity overlay.

use crate::error::StorageError;

/// A flat string-to-string store.
///
/// Values are opaque to the store; the overlay keeps JSON documents in them.
/// The trait is synchronous: every backend completes in microseconds and is
/// only touched while no network call is in flight.
pub trait KeyValueStore: Send {
    /// Returns the value under `key`, or `None` if it was never written.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Inserts or overwrites the value under `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes `key`. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}
