//! The member registry: tracks every connected member.
//!
//! # Concurrency note
//!
//! `MemberRegistry` is NOT thread-safe by itself; it uses a plain
//! `HashMap`. The server wraps it in a `tokio::sync::Mutex` and shares
//! it with the room registry.

use std::collections::HashMap;
use std::time::Instant;

use ringchat_protocol::MemberId;

use crate::{Member, MemberConfig, SessionError};

/// Owns member identities and the links used to reach them.
///
/// ## Lifecycle
///
/// ```text
/// register() ──→ [registered] ──→ remove()
///     │                               │
///     └── fresh MemberId              └── caller purges the id from rooms
/// ```
pub struct MemberRegistry<L> {
    members: HashMap<MemberId, Member<L>>,
    next_id: u64,
    config: MemberConfig,
}

impl<L: Clone> MemberRegistry<L> {
    /// Creates a new, empty registry.
    pub fn new(config: MemberConfig) -> Self {
        Self {
            members: HashMap::new(),
            next_id: 1,
            config,
        }
    }

    /// Registers a new member and returns its freshly assigned id.
    ///
    /// Ids are never reused within one registry.
    ///
    /// # Errors
    /// Returns [`SessionError::Full`] if the configured limit is reached.
    pub fn register(&mut self, link: L) -> Result<MemberId, SessionError> {
        match self.config.max_members {
            Some(limit) if self.members.len() >= limit => {
                return Err(SessionError::Full { limit });
            }
            _ => {}
        }

        let id = MemberId(self.next_id);
        self.next_id += 1;
        self.members.insert(
            id,
            Member {
                id,
                link,
                connected_at: Instant::now(),
            },
        );

        tracing::info!(member_id = %id, "member registered");
        Ok(id)
    }

    /// Removes a member and returns it.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if the id is not registered.
    pub fn remove(&mut self, id: MemberId) -> Result<Member<L>, SessionError> {
        let member = self.members.remove(&id).ok_or(SessionError::NotFound(id))?;
        tracing::info!(
            member_id = %id,
            connected_secs = member.connected_for().as_secs(),
            "member removed"
        );
        Ok(member)
    }

    /// Looks up a member by id.
    pub fn get(&self, id: MemberId) -> Option<&Member<L>> {
        self.members.get(&id)
    }

    /// Returns a clone of the member's link.
    pub fn link(&self, id: MemberId) -> Option<L> {
        self.members.get(&id).map(|m| m.link.clone())
    }

    /// Resolves a list of ids to `(id, link)` pairs, preserving order.
    /// Ids that are no longer registered are skipped.
    pub fn links(&self, ids: &[MemberId]) -> Vec<(MemberId, L)> {
        ids.iter()
            .filter_map(|id| self.link(*id).map(|link| (*id, link)))
            .collect()
    }

    /// Returns `true` if the id is registered.
    pub fn contains(&self, id: MemberId) -> bool {
        self.members.contains_key(&id)
    }

    /// Returns the number of registered members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<L: Clone> Default for MemberRegistry<L> {
    fn default() -> Self {
        Self::new(MemberConfig::default())
    }
}

// =========================================================================
// Tests
// =========================================================================
