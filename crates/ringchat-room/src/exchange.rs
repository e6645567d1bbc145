//! Multi-party Diffie-Hellman over a ring of members.
//!
//! For members `m0..m(n-1)` in join order, one rotation does:
//!
//! ```text
//! k0 = m0.public
//! k1 = m1.mix(k0)
//! ...
//! m(n-1).post_final(k(n-2))      // m(n-1) mixes and installs g^(s0·…·s(n-1))
//! ```
//!
//! A full exchange runs `n` rotations concurrently, rotation `r` starting
//! at `m(r)`, so every member is the terminus of exactly one rotation.
//! Exponentiation commutes, so every terminus installs the same value.
//! The server only ever sees partial products.
//!
//! With a single member, the seed is posted straight back to it and it
//! installs `g^(s0·s0)`.

use futures_util::future::join_all;
use rand::Rng;
use ringchat_protocol::{MemberId, RoomId};

use crate::{ExchangeError, MemberLink};

/// Settings for a key exchange.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Ask one random member to regenerate its key pair before the
    /// rotations, so no two runs share the same set of secrets.
    pub regenerate_before_rekey: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            regenerate_before_rekey: true,
        }
    }
}

/// Summary of one exchange run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RekeyOutcome {
    /// The room that was rekeyed.
    pub room_id: RoomId,
    /// Number of members in the ring.
    pub members: usize,
    /// Rotations that reached their terminus.
    pub completed: usize,
    /// Rotations abandoned after a failed step.
    pub failed: usize,
}

impl RekeyOutcome {
    /// `true` if every rotation completed.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.completed == self.members
    }
}

/// Runs ring key exchanges.
#[derive(Debug, Clone, Default)]
pub struct KeyExchange {
    config: ExchangeConfig,
}

impl KeyExchange {
    /// Creates an exchange runner.
    pub fn new(config: ExchangeConfig) -> Self {
        Self { config }
    }

    /// Rekeys `room_id` across `members`, in ring order.
    ///
    /// A failing rotation is logged and counted; it never affects its
    /// siblings. A failed regenerate request is logged and the rotations
    /// still run.
    pub async fn run<L: MemberLink>(
        &self,
        room_id: &RoomId,
        members: &[(MemberId, L)],
    ) -> RekeyOutcome {
        let n = members.len();
        if n == 0 {
            return RekeyOutcome {
                room_id: room_id.clone(),
                members: 0,
                completed: 0,
                failed: 0,
            };
        }

        if self.config.regenerate_before_rekey {
            let chosen = rand::rng().random_range(0..n);
            let (member_id, link) = &members[chosen];
            if let Err(e) = link.regenerate_key_pair(room_id).await {
                tracing::warn!(%room_id, %member_id, error = %e, "key pair regeneration failed");
            }
        }

        tracing::debug!(%room_id, members = n, "starting key exchange");

        let rotations = (0..n).map(|start| {
            let ring: Vec<&(MemberId, L)> =
                members[start..].iter().chain(&members[..start]).collect();
            rotate(room_id, ring)
        });
        let results = join_all(rotations).await;

        let mut completed = 0;
        let mut failed = 0;
        for result in results {
            match result {
                Ok(()) => completed += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(%room_id, error = %e, "rotation failed");
                }
            }
        }

        tracing::info!(%room_id, members = n, completed, failed, "key exchange finished");
        RekeyOutcome {
            room_id: room_id.clone(),
            members: n,
            completed,
            failed,
        }
    }
}

/// Walks one rotation. `ring` is non-empty.
async fn rotate<L: MemberLink>(
    room_id: &RoomId,
    ring: Vec<&(MemberId, L)>,
) -> Result<(), ExchangeError> {
    let last = ring.len() - 1;

    let (first_id, first) = ring[0];
    let mut key = first
        .get_public_key(room_id)
        .await
        .map_err(|source| ExchangeError::Link {
            member: *first_id,
            source,
        })?;

    for (member_id, link) in ring.iter().take(last).skip(1) {
        key = link
            .get_mixed_key(room_id, key)
            .await
            .map_err(|source| ExchangeError::Link {
                member: *member_id,
                source,
            })?;
    }

    let (terminus_id, terminus) = ring[last];
    terminus
        .post_final_key(room_id, key)
        .await
        .map_err(|source| ExchangeError::Link {
            member: *terminus_id,
            source,
        })?;

    tracing::trace!(%room_id, terminus = %terminus_id, "rotation complete");
    Ok(())
}
