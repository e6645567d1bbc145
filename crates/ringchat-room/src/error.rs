//! Error types for the room layer.

use ringchat_protocol::{ErrorCode, InviteCode, MemberId, ResponseError, RoomId};
use ringchat_transport::TransportError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// No live room has this invite code.
    #[error("invite code {0} is not valid")]
    InvalidInvite(InviteCode),

    /// The member is already in this room.
    #[error("member {0} already in room {1}")]
    AlreadyInRoom(MemberId, RoomId),

    /// The member is not in this room.
    #[error("member {0} not in room {1}")]
    NotInRoom(MemberId, RoomId),

    /// The member id is not registered (its connection is gone).
    #[error("member {0} is not connected")]
    UnknownMember(MemberId),

    /// Room names must contain at least one non-whitespace character.
    #[error("room name must not be empty")]
    InvalidName,

    /// The room has been keyed; only encrypted payloads are relayed.
    #[error("room {0} only accepts encrypted messages")]
    PlaintextRejected(RoomId),

    /// No unused invite code was found within the configured attempts.
    #[error("could not allocate a unique invite code")]
    InviteSpaceExhausted,
}

impl RoomError {
    /// The wire error code reported to the requesting member.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidInvite(_) => ErrorCode::InvalidInvite,
            Self::AlreadyInRoom(..) => ErrorCode::AlreadyInRoom,
            Self::NotInRoom(..) => ErrorCode::NotInRoom,
            Self::UnknownMember(_) | Self::InvalidName | Self::PlaintextRejected(_) => {
                ErrorCode::BadRequest
            }
            Self::InviteSpaceExhausted => ErrorCode::Internal,
        }
    }
}

impl From<RoomError> for ResponseError {
    fn from(err: RoomError) -> Self {
        ResponseError::new(err.code(), err.to_string())
    }
}

/// Why a single call to a member failed.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The underlying connection failed, timed out, or returned an error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The member answered with a payload of the wrong kind.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// A failure inside one rotation of a key exchange.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// A call to `member` failed.
    #[error("exchange step with member {member} failed: {source}")]
    Link {
        member: MemberId,
        #[source]
        source: LinkError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_invite_maps_to_invalid_invite_code() {
        let err: ResponseError = RoomError::InvalidInvite("ABC123".into()).into();
        assert_eq!(err.code, ErrorCode::InvalidInvite);
        assert!(err.message.contains("ABC123"));
    }

    #[test]
    fn test_plaintext_rejected_maps_to_bad_request() {
        let err = RoomError::PlaintextRejected(RoomId("r".into()));
        assert_eq!(err.code(), ErrorCode::BadRequest);
    }
}
