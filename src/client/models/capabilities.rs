//! Resolution of the UI actions available to the current identity.
//!
//! Display-only gating: the backend authorizes every request on its own.

use std::collections::BTreeSet;

use crate::client::models::session::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    OpenTicketChat,
    SendChatMessage,
    WriteReview,
    PostToFeed,
    UseAssistant,
    PostOffer,
    ManageTickets,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::OpenTicketChat,
        Capability::SendChatMessage,
        Capability::WriteReview,
        Capability::PostToFeed,
        Capability::UseAssistant,
        Capability::PostOffer,
        Capability::ManageTickets,
    ];

    const BASELINE: [Capability; 5] = [
        Capability::OpenTicketChat,
        Capability::SendChatMessage,
        Capability::WriteReview,
        Capability::PostToFeed,
        Capability::UseAssistant,
    ];

    fn granted_by(permission: &str) -> &'static [Capability] {
        match permission {
            "admin" => &Self::ALL,
            "offers:create" => &[Capability::PostOffer],
            "tickets:manage" => &[Capability::ManageTickets],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn allows(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The one place gated actions are decided. Anonymous users get nothing.
pub fn resolve_capabilities(user: Option<&User>) -> CapabilitySet {
    let Some(user) = user else {
        return CapabilitySet::default();
    };

    let mut set: BTreeSet<Capability> = Capability::BASELINE.into_iter().collect();
    for permission in &user.permissions {
        let granted = Capability::granted_by(permission.trim());
        if granted.is_empty() {
            log::debug!("[CAPABILITIES] Ignoring unknown permission '{}'", permission);
        }
        set.extend(granted.iter().copied());
    }
    CapabilitySet(set)
}
