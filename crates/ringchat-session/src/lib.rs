//! Member identity for Ringchat.
//!
//! Every accepted connection becomes a [`Member`] with a server-assigned
//! [`MemberId`](ringchat_protocol::MemberId). The [`MemberRegistry`]
//! owns the mapping from id to link; rooms reference members by id only.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room registry (above)  ← stores member ids, resolves them to links here
//!     ↕
//! Member registry (this crate)  ← who is connected, and how to reach them
//!     ↕
//! Protocol (below)  ← provides MemberId
//! ```

mod error;
mod member;
mod registry;

pub use error::SessionError;
pub use member::{Member, MemberConfig};
pub use registry::MemberRegistry;
