//! Rooms for Ringchat.
//!
//! A [`RoomRegistry`] owns every live room: its name, its invite code,
//! and its members in join order. Any membership change starts a
//! [`KeyExchange`], which walks the members as a ring so each of them
//! ends up with the same room key without the server learning it.
//!
//! The registry reaches members through the [`MemberLink`] trait, so the
//! same code drives network connections and in-memory test members.

mod error;
mod exchange;
mod link;
mod registry;

pub use error::{ExchangeError, LinkError, RoomError};
pub use exchange::{ExchangeConfig, KeyExchange, RekeyOutcome};
pub use link::MemberLink;
pub use registry::{BroadcastReport, RegistryConfig, RoomRegistry};
