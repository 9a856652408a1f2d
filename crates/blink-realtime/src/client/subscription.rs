//! Caller-owned handle to one topic registration.

use std::fmt;
use std::sync::Weak;

/// Something that can release a registration by id.
pub(crate) trait Release: Send + Sync {
    fn release(&self, id: u64);
}

/// One registration on a topic.
///
/// Dropping the handle unsubscribes it. Other registrations on the same
/// topic are unaffected.
pub struct Subscription {
    id: u64,
    destination: String,
    owner: Weak<dyn Release>,
}

impl Subscription {
    pub(crate) fn new(id: u64, destination: String, owner: Weak<dyn Release>) -> Self {
        Subscription {
            id,
            destination,
            owner,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.release(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .finish()
    }
}
