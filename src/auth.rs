//! Administrative capabilities
//!
//! Privileged operations (consumer registry, oracle parameters, ruleset
//! seeding, variant registration) take a [`Capability`] token. A token is
//! minted once by the component that owns the privilege and is checked per
//! call against that component's [`Authority`].

use uuid::Uuid;

/// Proof of administrative rights over one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    authority: Uuid,
}

/// Verifies capabilities minted for a single component
#[derive(Debug)]
pub struct Authority {
    id: Uuid,
}

impl Authority {
    /// Create a new authority along with its only capability
    pub fn new() -> (Self, Capability) {
        let id = Uuid::new_v4();
        (Self { id }, Capability { authority: id })
    }

    pub fn permits(&self, capability: &Capability) -> bool {
        capability.authority == self.id
    }
}
