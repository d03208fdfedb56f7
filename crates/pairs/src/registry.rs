use crate::error::RegistryError;
use crate::handle::{ConnId, ConnectionHandle};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pair_common::PeerId;

/// Concurrent peer id → connection table.
///
/// Registration is insert-if-absent; there is no overwrite path. Removal
/// is keyed by connection identity so that a close event from an old
/// connection never removes a newer registration of the same id.
#[derive(Debug, Default)]
pub struct Registry {
    peers: DashMap<PeerId, ConnectionHandle>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to `handle` if no live connection holds it yet.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] if `id` is taken.
    pub fn register(&self, id: PeerId, handle: ConnectionHandle) -> Result<(), RegistryError> {
        match self.peers.entry(id) {
            Entry::Occupied(entry) => Err(RegistryError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(handle);
                Ok(())
            }
        }
    }

    /// Look up the handle for `id`.
    ///
    /// The returned handle is a clone; the table's shard lock is released
    /// before this returns, so sending through it never blocks the table.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if `id` is not registered.
    pub fn lookup(&self, id: &PeerId) -> Result<ConnectionHandle, RegistryError> {
        self.find(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Like [`Registry::lookup`], but `None` when `id` is not registered.
    #[must_use]
    pub fn find(&self, id: &PeerId) -> Option<ConnectionHandle> {
        self.peers.get(id).map(|entry| entry.value().clone())
    }

    /// Remove `id` only if it is still bound to connection `conn`.
    ///
    /// Idempotent. Returns `true` if an entry was removed.
    pub fn unregister(&self, id: &PeerId, conn: ConnId) -> bool {
        self.peers
            .remove_if(id, |_k, handle| handle.id() == conn)
            .is_some()
    }

    /// Returns `true` if `id` is currently registered.
    #[must_use]
    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    /// Number of registered peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` if no peer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
