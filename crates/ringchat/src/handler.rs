//! Per-connection handler: welcome, request routing, and cleanup.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register the connection → get a MemberId
//!   2. Register handlers for the member → server request kinds
//!   3. Send Welcome → the member learns its id
//!   4. Run the receive loop until the peer goes away
//!   5. Purge the member from its rooms and unregister it

use std::sync::Arc;

use ringchat_protocol::{
    ErrorCode, MemberId, RequestKind, RequestPayload, ResponseError, ResponsePayload,
};
use ringchat_transport::{Connection, HandlerResult};

use crate::RingchatError;
use crate::server::ServerState;

/// Fallback cleanup for a handler task that is aborted before it can
/// purge its member itself.
///
/// Since `Drop` is synchronous, the async cleanup runs in a spawned task.
struct MemberGuard {
    member_id: MemberId,
    state: Option<Arc<ServerState>>,
}

impl MemberGuard {
    /// Hands the state back for an awaited cleanup; the guard then does
    /// nothing on drop.
    fn disarm(&mut self) -> Option<Arc<ServerState>> {
        self.state.take()
    }
}

impl Drop for MemberGuard {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            let member_id = self.member_id;
            tracing::debug!(%member_id, "handler aborted, purging in background");
            tokio::spawn(async move { cleanup(&state, member_id).await });
        }
    }
}

/// Removes `member_id` from its rooms (rekeying what remains) and from
/// the member registry.
async fn cleanup(state: &ServerState, member_id: MemberId) {
    state.rooms.purge_member(member_id).await;
    if let Err(e) = state.members.lock().await.remove(member_id) {
        tracing::debug!(%member_id, error = %e, "member already removed");
    }
    tracing::info!(%member_id, "member disconnected");
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: Connection,
    state: Arc<ServerState>,
) -> Result<(), RingchatError> {
    let conn_id = conn.id();

    let member_id = state.members.lock().await.register(conn.clone())?;
    let mut guard = MemberGuard {
        member_id,
        state: Some(Arc::clone(&state)),
    };
    tracing::info!(%conn_id, %member_id, peer = ?conn.peer_addr(), "member connected");

    register_handlers(&conn, &state, member_id);

    let result = match conn.request(RequestPayload::Welcome { member_id }).await {
        Ok(_) => conn.run().await,
        Err(e) => Err(e),
    };

    if let Some(state) = guard.disarm() {
        cleanup(&state, member_id).await;
    }
    result?;
    Ok(())
}

fn unexpected(kind: RequestKind) -> ResponseError {
    ResponseError::new(ErrorCode::BadRequest, format!("payload does not match {kind}"))
}

fn register_handlers(conn: &Connection, state: &Arc<ServerState>, member_id: MemberId) {
    let shared = Arc::clone(state);
    conn.register_handler(RequestKind::CreateRoom, move |payload| {
        create_room(Arc::clone(&shared), member_id, payload)
    });

    let shared = Arc::clone(state);
    conn.register_handler(RequestKind::JoinRoom, move |payload| {
        join_room(Arc::clone(&shared), member_id, payload)
    });

    let shared = Arc::clone(state);
    conn.register_handler(RequestKind::LeaveRoom, move |payload| {
        leave_room(Arc::clone(&shared), member_id, payload)
    });

    let shared = Arc::clone(state);
    conn.register_handler(RequestKind::PostMessage, move |payload| {
        post_message(Arc::clone(&shared), member_id, payload)
    });
}

async fn create_room(
    state: Arc<ServerState>,
    member_id: MemberId,
    payload: RequestPayload,
) -> HandlerResult {
    let RequestPayload::CreateRoom { name } = payload else {
        return Err(unexpected(RequestKind::CreateRoom));
    };
    let (room, invite_code) = state.rooms.create_room(member_id, &name).await?;
    Ok(ResponsePayload::RoomCreated { room, invite_code })
}

async fn join_room(
    state: Arc<ServerState>,
    member_id: MemberId,
    payload: RequestPayload,
) -> HandlerResult {
    let RequestPayload::JoinRoom { invite_code } = payload else {
        return Err(unexpected(RequestKind::JoinRoom));
    };
    let room = state.rooms.join_room(member_id, &invite_code).await?;
    Ok(ResponsePayload::RoomJoined { room })
}

async fn leave_room(
    state: Arc<ServerState>,
    member_id: MemberId,
    payload: RequestPayload,
) -> HandlerResult {
    let RequestPayload::LeaveRoom { room_id } = payload else {
        return Err(unexpected(RequestKind::LeaveRoom));
    };
    state.rooms.leave(member_id, &room_id).await?;
    Ok(ResponsePayload::Ack)
}

/// Relays a chat payload. Per-recipient delivery failures are logged by
/// the registry and do not fail the sender's request.
async fn post_message(
    state: Arc<ServerState>,
    member_id: MemberId,
    payload: RequestPayload,
) -> HandlerResult {
    let RequestPayload::PostMessage { message } = payload else {
        return Err(unexpected(RequestKind::PostMessage));
    };
    let report = state.rooms.post_message(member_id, message).await?;
    tracing::debug!(
        %member_id,
        delivered = report.delivered.len(),
        failed = report.failed.len(),
        "message relayed"
    );
    Ok(ResponsePayload::Ack)
}
