//! A connected member: identity plus the link used to reach it.

use std::time::{Duration, Instant};

use ringchat_protocol::MemberId;

/// Settings for a [`MemberRegistry`](crate::MemberRegistry).
#[derive(Debug, Clone, Default)]
pub struct MemberConfig {
    /// Maximum number of simultaneously registered members. `None`
    /// means unlimited.
    pub max_members: Option<usize>,
}

/// One registered member.
///
/// `L` is whatever the caller uses to talk to the member: a network
/// connection in the server, an in-memory fake in tests. The registry
/// owns the link; rooms only ever store the [`MemberId`].
#[derive(Debug, Clone)]
pub struct Member<L> {
    /// Server-assigned identity.
    pub id: MemberId,
    /// How to reach this member.
    pub link: L,
    /// When the member was registered.
    pub connected_at: Instant,
}

impl<L> Member<L> {
    /// How long the member has been connected.
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
