use std::sync::Arc;

use ringchat::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

// ---------------------------------------------------------------------------
// Input parsing
// ---------------------------------------------------------------------------

/// `/create <name>`, `/join <code>`, `/leave`, or text for the current room.
fn parse_line(line: &str, current: Option<&RoomId>) -> Result<ClientCommand, String> {
    let line = line.trim();
    if let Some(name) = line.strip_prefix("/create ") {
        return Ok(ClientCommand::CreateRoom { name: name.trim().to_string() });
    }
    if let Some(code) = line.strip_prefix("/join ") {
        return Ok(ClientCommand::JoinRoom { invite_code: code.trim().into() });
    }
    let room_id = current.cloned().ok_or("not in a room; /create or /join first")?;
    if line == "/leave" {
        return Ok(ClientCommand::LeaveRoom { room_id });
    }
    if line.starts_with('/') {
        return Err(format!("unknown command: {line}"));
    }
    Ok(ClientCommand::SendMessage { room_id, text: line.to_string() })
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn render(event: &ClientEvent, json: bool) -> String {
    if json {
        return serde_json::to_string(event).unwrap_or_default();
    }
    match event {
        ClientEvent::MessageReceived { message } => {
            format!("<{}> {}", message.sender_id, message.text)
        }
        ClientEvent::RoomCreated { room, invite_code } => {
            format!("* created {} ({}), invite code {invite_code}", room.name, room.room_id)
        }
        ClientEvent::RoomKeyed {
            room_id,
            fingerprint,
        } => format!("* {room_id} keyed [{fingerprint}]"),
        ClientEvent::Disconnected => "* disconnected".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), RingchatError> {
    let json = std::env::args().any(|a| a == "--json");
    let addr =
        std::env::var("RINGCHAT_ADDR").unwrap_or_else(|_| ringchat::DEFAULT_ADDR.to_string());

    let client = Arc::new(ChatClient::connect(ClientConfig::new(addr)).await?);
    println!("* connected as {}", client.member_id());

    let mut events = client.subscribe();
    let (commands, rx) = mpsc::channel(32);
    let command_loop = spawn_command_loop(Arc::clone(&client), rx);

    let mut current: Option<RoomId> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line, current.as_ref()) {
                    Ok(ClientCommand::JoinRoom { invite_code }) => {
                        // Joins run inline so the room id is known for the next line.
                        match client.join_room(&invite_code).await {
                            Ok(room) => {
                                println!("* joined {} ({})", room.name, room.room_id);
                                current = Some(room.room_id);
                            }
                            Err(e) => eprintln!("! {e}"),
                        }
                    }
                    Ok(command) => {
                        if matches!(command, ClientCommand::LeaveRoom { .. }) {
                            current = None;
                        }
                        if commands.send(command).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("! {e}"),
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let ClientEvent::RoomCreated { room, .. } = &event {
                            current = Some(room.room_id.clone());
                        }
                        let done = matches!(event, ClientEvent::Disconnected);
                        println!("{}", render(&event, json));
                        if done {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => eprintln!("! missed {n} events"),
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    drop(commands);
    let _ = command_loop.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_text_needs_a_room() {
        assert!(parse_line("hello", None).is_err());
        let room = RoomId("r1".into());
        assert_eq!(
            parse_line("hello", Some(&room)).unwrap(),
            ClientCommand::SendMessage { room_id: room, text: "hello".into() }
        );
    }

    #[test]
    fn test_parse_line_commands() {
        assert_eq!(
            parse_line("/create lobby", None).unwrap(),
            ClientCommand::CreateRoom { name: "lobby".into() }
        );
        assert_eq!(
            parse_line("/join aB3xYz", None).unwrap(),
            ClientCommand::JoinRoom { invite_code: "aB3xYz".into() }
        );
        assert!(parse_line("/dance", Some(&RoomId("r".into()))).is_err());
    }
}
