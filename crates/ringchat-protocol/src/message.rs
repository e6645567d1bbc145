//! Request/Response envelopes and their payloads.
//!
//! Every frame body on the wire is a [`Message`]: either a [`Request`]
//! that may expect an answer, or a [`Response`] answering an earlier
//! request by its `uid`. Both directions use the same envelopes — the
//! server asks members for key material with requests, and members ask
//! the server to create or join rooms with requests.
//!
//! ```text
//! { "type": "Request",
//!   "uid": "k3J9aQ0zLm",
//!   "payload": { "kind": "JoinRoom", "invite_code": "aB3xYz" } }
//!
//! { "type": "Response",
//!   "uid": "k3J9aQ0zLm",
//!   "payload": { "kind": "RoomJoined", "room": { ... } } }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ChatPayload, DhValue, InviteCode, MemberId, RequestId, RoomId, RoomInfo};

// ---------------------------------------------------------------------------
// Message — the top-level tagged union
// ---------------------------------------------------------------------------

/// The top-level value carried by every frame.
///
/// Internally tagged on `type`. The closed set of discriminants is
/// listed in [`Message::TYPES`]; the codec checks it before attempting a
/// full decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// An outbound call, possibly awaiting a [`Response`].
    Request(Request),
    /// The answer to an earlier [`Request`].
    Response(Response),
}

impl Message {
    /// Every valid value of the top-level `type` discriminant.
    pub const TYPES: &'static [&'static str] = &["Request", "Response"];
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A request envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id; echoed back in the matching [`Response`].
    pub uid: RequestId,
    /// What is being asked.
    pub payload: RequestPayload,
}

impl Request {
    /// Wraps `payload` in a request with a freshly generated uid.
    pub fn new(payload: RequestPayload) -> Self {
        Self {
            uid: RequestId::generate(),
            payload,
        }
    }
}

/// Every kind of request either side may send.
///
/// Key-exchange kinds flow server → member; room and chat kinds flow
/// member → server; `DeliverMessage` and `Welcome` flow server → member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RequestPayload {
    /// Server → member: "What is your public value for this room?"
    GetPublicKey { room_id: RoomId },

    /// Server → member: "Raise `key` to your secret and send it back."
    GetMixedKey { room_id: RoomId, key: DhValue },

    /// Server → member: "Raise `key` to your secret and install the
    /// result as the room key." Fire-and-forget.
    PostFinalKey { room_id: RoomId, key: DhValue },

    /// Server → member: "Replace your key pair for this room." Sent to
    /// one random member before each rekey so no exchange reuses a
    /// previous run's secrets.
    RegenerateKeyPair { room_id: RoomId },

    /// Member → server: "Create a room and put me in it."
    CreateRoom { name: String },

    /// Member → server: "Put me in the room behind this invite."
    JoinRoom { invite_code: InviteCode },

    /// Member → server: "Take me out of this room."
    LeaveRoom { room_id: RoomId },

    /// Member → server: "Relay this to everyone in the room."
    PostMessage { message: ChatPayload },

    /// Server → member: "A room you are in has a new message."
    /// Fire-and-forget.
    DeliverMessage { message: ChatPayload },

    /// Server → member, first frame after accept: "This is your id."
    /// Fire-and-forget.
    Welcome { member_id: MemberId },
}

/// The discriminant of a [`RequestPayload`], without its fields.
///
/// Used as the key for handler registration on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    GetPublicKey,
    GetMixedKey,
    PostFinalKey,
    RegenerateKeyPair,
    CreateRoom,
    JoinRoom,
    LeaveRoom,
    PostMessage,
    DeliverMessage,
    Welcome,
}

impl RequestKind {
    /// Whether a request of this kind is answered with a [`Response`].
    ///
    /// Exhaustive on purpose: adding a kind forces a decision here.
    pub fn expects_response(self) -> bool {
        match self {
            Self::GetPublicKey
            | Self::GetMixedKey
            | Self::RegenerateKeyPair
            | Self::CreateRoom
            | Self::JoinRoom
            | Self::LeaveRoom
            | Self::PostMessage => true,
            Self::PostFinalKey | Self::DeliverMessage | Self::Welcome => false,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl RequestPayload {
    /// Returns the field-less kind of this payload.
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::GetPublicKey { .. } => RequestKind::GetPublicKey,
            Self::GetMixedKey { .. } => RequestKind::GetMixedKey,
            Self::PostFinalKey { .. } => RequestKind::PostFinalKey,
            Self::RegenerateKeyPair { .. } => RequestKind::RegenerateKeyPair,
            Self::CreateRoom { .. } => RequestKind::CreateRoom,
            Self::JoinRoom { .. } => RequestKind::JoinRoom,
            Self::LeaveRoom { .. } => RequestKind::LeaveRoom,
            Self::PostMessage { .. } => RequestKind::PostMessage,
            Self::DeliverMessage { .. } => RequestKind::DeliverMessage,
            Self::Welcome { .. } => RequestKind::Welcome,
        }
    }

    /// Shorthand for `self.kind().expects_response()`.
    pub fn expects_response(&self) -> bool {
        self.kind().expects_response()
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A response envelope. Exactly one of `error` and `payload` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// The uid of the request being answered.
    pub uid: RequestId,
    /// Set when the request failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    /// Set when the request succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResponsePayload>,
}

impl Response {
    /// A successful response to `uid`.
    pub fn ok(uid: RequestId, payload: ResponsePayload) -> Self {
        Self {
            uid,
            error: None,
            payload: Some(payload),
        }
    }

    /// A failed response to `uid`.
    pub fn err(uid: RequestId, error: ResponseError) -> Self {
        Self {
            uid,
            error: Some(error),
            payload: None,
        }
    }

    /// Builds a response from a handler result.
    pub fn from_result(uid: RequestId, result: Result<ResponsePayload, ResponseError>) -> Self {
        match result {
            Ok(payload) => Self::ok(uid, payload),
            Err(error) => Self::err(uid, error),
        }
    }

    /// Converts the response into a `Result`.
    ///
    /// A response with neither field set (which a well-behaved peer never
    /// sends) is reported as an [`ErrorCode::Internal`] error.
    pub fn into_result(self) -> Result<ResponsePayload, ResponseError> {
        match (self.error, self.payload) {
            (Some(error), _) => Err(error),
            (None, Some(payload)) => Ok(payload),
            (None, None) => Err(ResponseError::new(
                ErrorCode::Internal,
                "response carried neither payload nor error",
            )),
        }
    }
}

/// Successful response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ResponsePayload {
    /// Answer to `GetPublicKey` and `GetMixedKey`.
    PublicKey { value: DhValue },

    /// Answer to `CreateRoom`.
    RoomCreated { room: RoomInfo, invite_code: InviteCode },

    /// Answer to `JoinRoom`.
    RoomJoined { room: RoomInfo },

    /// Generic success with no body.
    Ack,
}

/// Machine-readable failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The receiver has no handler for this request kind.
    UnhandledRequest,
    /// No live room has this invite code.
    InvalidInvite,
    /// The referenced room does not exist.
    NotFound,
    /// The member is already in the room.
    AlreadyInRoom,
    /// The member is not in the room.
    NotInRoom,
    /// The request was well-formed but not acceptable.
    BadRequest,
    /// Something went wrong on the receiving side.
    Internal,
}

/// A failure carried in a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct ResponseError {
    /// Failure category.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl ResponseError {
    /// Creates a new error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! JSON shape tests. The field names and discriminants here are the
    //! wire contract with every client, so a rename is a breaking change.

    use num_bigint::BigUint;

    use super::*;

    fn room(id: &str) -> RoomId {
        RoomId(id.into())
    }

    // =====================================================================
    // Request
    // =====================================================================

    #[test]
    fn test_request_json_format() {
        let msg = Message::Request(Request {
            uid: RequestId("abcdefghij".into()),
            payload: RequestPayload::JoinRoom {
                invite_code: InviteCode::from("aB3xYz"),
            },
        });
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Request");
        assert_eq!(json["uid"], "abcdefghij");
        assert_eq!(json["payload"]["kind"], "JoinRoom");
        assert_eq!(json["payload"]["invite_code"], "aB3xYz");
    }

    #[test]
    fn test_request_mixed_key_carries_hex() {
        let msg = Message::Request(Request {
            uid: RequestId("u".into()),
            payload: RequestPayload::GetMixedKey {
                room_id: room("r1"),
                key: DhValue(BigUint::from(255u32)),
            },
        });
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["payload"]["key"], "ff");
    }

    #[test]
    fn test_request_new_generates_uid() {
        let a = Request::new(RequestPayload::CreateRoom { name: "x".into() });
        let b = Request::new(RequestPayload::CreateRoom { name: "x".into() });
        assert_ne!(a.uid, b.uid);
    }

    #[test]
    fn test_request_with_post_message_round_trip() {
        let msg = Message::Request(Request::new(RequestPayload::PostMessage {
            message: ChatPayload::ChatMessage(crate::ChatMessage {
                room_id: room("r1"),
                sender_id: MemberId(1),
                text: "hello".into(),
            }),
        }));
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: Message = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    // =====================================================================
    // Response
    // =====================================================================

    #[test]
    fn test_response_ok_omits_error_field() {
        let msg = Message::Response(Response::ok(RequestId("u1".into()), ResponsePayload::Ack));
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Response");
        assert_eq!(json["uid"], "u1");
        assert_eq!(json["payload"]["kind"], "Ack");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_response_err_json_format() {
        let msg = Message::Response(Response::err(
            RequestId("u2".into()),
            ResponseError::new(ErrorCode::InvalidInvite, "no such invite"),
        ));
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["error"]["code"], "InvalidInvite");
        assert_eq!(json["error"]["message"], "no such invite");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn test_response_into_result_prefers_error() {
        let resp = Response {
            uid: RequestId("u".into()),
            error: Some(ResponseError::new(ErrorCode::NotFound, "gone")),
            payload: Some(ResponsePayload::Ack),
        };
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_response_into_result_empty_is_internal_error() {
        let resp = Response {
            uid: RequestId("u".into()),
            error: None,
            payload: None,
        };
        assert_eq!(resp.into_result().unwrap_err().code, ErrorCode::Internal);
    }

    #[test]
    fn test_response_room_created_json_format() {
        let payload = ResponsePayload::RoomCreated {
            room: RoomInfo {
                room_id: room("r1"),
                name: "lobby".into(),
                members: vec![MemberId(1)],
            },
            invite_code: InviteCode::from("abc234"),
        };
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["kind"], "RoomCreated");
        assert_eq!(json["room"]["name"], "lobby");
        assert_eq!(json["room"]["members"], serde_json::json!([1]));
        assert_eq!(json["invite_code"], "abc234");
    }

    // =====================================================================
    // Kinds
    // =====================================================================

    #[test]
    fn test_expects_response_per_kind() {
        let r = room("r");
        let k = DhValue(BigUint::from(2u32));
        let answered = [
            RequestPayload::GetPublicKey { room_id: r.clone() },
            RequestPayload::GetMixedKey { room_id: r.clone(), key: k.clone() },
            RequestPayload::RegenerateKeyPair { room_id: r.clone() },
            RequestPayload::CreateRoom { name: "n".into() },
            RequestPayload::JoinRoom { invite_code: "x".into() },
            RequestPayload::LeaveRoom { room_id: r.clone() },
        ];
        for p in &answered {
            assert!(p.expects_response(), "{} should expect a response", p.kind());
        }

        let one_way = [
            RequestPayload::PostFinalKey { room_id: r.clone(), key: k },
            RequestPayload::Welcome { member_id: MemberId(1) },
        ];
        for p in &one_way {
            assert!(!p.expects_response(), "{} should be one-way", p.kind());
        }
    }

    #[test]
    fn test_request_kind_display_matches_wire_name() {
        assert_eq!(RequestKind::PostFinalKey.to_string(), "PostFinalKey");
    }

    #[test]
    fn test_unknown_request_kind_fails() {
        let json = r#"{"type":"Request","uid":"u","payload":{"kind":"Teleport"}}"#;
        let result: Result<Message, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_field_fails() {
        let json = r#"{"type":"Request","uid":"u","payload":{"kind":"GetMixedKey","room_id":"r"}}"#;
        let result: Result<Message, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
