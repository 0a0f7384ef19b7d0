use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

use super::protocol::{ClientMessage, ServerMessage};
use crate::world::PlayerId;

pub type ConnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Spawned(PlayerId),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("already spawned as player {0}")]
    AlreadySpawned(PlayerId),
    #[error("spawn a player before sending '{0}'")]
    NotSpawned(&'static str),
    #[error("connection is closed")]
    Closed,
}

/// What the game loop should do with an admitted message.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Spawn(String),
    Act(PlayerId, ClientMessage),
}

/// One WebSocket connection as seen by the game loop.
#[derive(Debug)]
pub struct Session {
    pub conn_id: ConnId,
    pub peer: SocketAddr,
    pub state: SessionState,
    pub last_seen: Instant,
    outbound: mpsc::UnboundedSender<Message>,
}

impl Session {
    pub fn new(conn_id: ConnId, peer: SocketAddr, outbound: mpsc::UnboundedSender<Message>) -> Self {
        Session {
            conn_id,
            peer,
            state: SessionState::Unauthenticated,
            last_seen: Instant::now(),
            outbound,
        }
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        match self.state {
            SessionState::Spawned(id) => Some(id),
            _ => None,
        }
    }

    /// Gate a decoded message on the connection state. Only one spawn is
    /// allowed per connection and every other message needs a bound player.
    pub fn admit(&self, message: ClientMessage) -> Result<Command, SessionError> {
        match (self.state, message) {
            (SessionState::Closed, _) => Err(SessionError::Closed),
            (SessionState::Unauthenticated, ClientMessage::SpawnPlayer(spawn)) => {
                Ok(Command::Spawn(spawn.username))
            }
            (SessionState::Unauthenticated, other) => Err(SessionError::NotSpawned(other.kind())),
            (SessionState::Spawned(id), ClientMessage::SpawnPlayer(_)) => {
                Err(SessionError::AlreadySpawned(id))
            }
            (SessionState::Spawned(id), other) => Ok(Command::Act(id, other)),
        }
    }

    pub fn bind(&mut self, player_id: PlayerId) -> Result<(), SessionError> {
        match self.state {
            SessionState::Unauthenticated => {
                self.state = SessionState::Spawned(player_id);
                Ok(())
            }
            SessionState::Spawned(id) => Err(SessionError::AlreadySpawned(id)),
            SessionState::Closed => Err(SessionError::Closed),
        }
    }

    /// Mark the session closed and ask the writer to send a close frame.
    /// Returns the player that was bound, if any.
    pub fn close(&mut self) -> Option<PlayerId> {
        let player = self.player_id();
        if self.state != SessionState::Closed {
            let _ = self.outbound.send(Message::Close(None));
        }
        self.state = SessionState::Closed;
        player
    }

    pub fn refresh_last_seen(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    pub fn send(&self, message: &ServerMessage) -> bool {
        self.send_text(&message.to_json())
    }

    /// Queue a pre-serialized frame. Returns false once the writer is gone.
    pub fn send_text(&self, text: &str) -> bool {
        self.outbound.send(Message::Text(text.to_owned().into())).is_ok()
    }

    pub fn ping(&self) -> bool {
        self.outbound.send(Message::Ping(Default::default())).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::protocol::{SpawnPlayer, TileTarget};

    fn session() -> (Session, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        (Session::new(1, peer, tx), rx)
    }

    fn spawn_message() -> ClientMessage {
        ClientMessage::SpawnPlayer(SpawnPlayer {
            username: "ann".to_string(),
        })
    }

    #[test]
    fn unauthenticated_session_only_admits_spawn() {
        let (session, _rx) = session();
        assert_eq!(
            session.admit(spawn_message()).unwrap(),
            Command::Spawn("ann".to_string())
        );
        assert_eq!(
            session
                .admit(ClientMessage::SelectTile(TileTarget { tile_id: 1 }))
                .unwrap_err(),
            SessionError::NotSpawned("select_tile")
        );
    }

    #[test]
    fn spawned_session_rejects_second_spawn() {
        let (mut session, _rx) = session();
        session.bind(7).unwrap();
        assert_eq!(session.player_id(), Some(7));
        assert_eq!(
            session.admit(spawn_message()).unwrap_err(),
            SessionError::AlreadySpawned(7)
        );
        assert_eq!(
            session.admit(ClientMessage::LeaveAlliance).unwrap(),
            Command::Act(7, ClientMessage::LeaveAlliance)
        );
        assert_eq!(session.bind(8).unwrap_err(), SessionError::AlreadySpawned(7));
    }

    #[test]
    fn close_sends_close_frame_once() {
        let (mut session, mut rx) = session();
        session.bind(3).unwrap();
        assert_eq!(session.close(), Some(3));
        assert_eq!(session.close(), None);
        assert!(matches!(rx.try_recv(), Ok(Message::Close(None))));
        assert!(rx.try_recv().is_err());
        assert_eq!(session.admit(spawn_message()).unwrap_err(), SessionError::Closed);
    }

    #[test]
    fn send_serializes_to_text_frame() {
        let (session, mut rx) = session();
        assert!(session.send(&ServerMessage::error("bad")));
        let Ok(Message::Text(text)) = rx.try_recv() else {
            panic!("expected a text frame");
        };
        assert!(text.as_str().contains("\"error\""));
    }

    #[test]
    fn send_fails_after_writer_drops() {
        let (session, rx) = session();
        drop(rx);
        assert!(!session.ping());
    }

    #[tokio::test]
    async fn timeout_tracks_last_seen() {
        let (mut session, _rx) = session();
        assert!(!session.is_timed_out(Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(session.is_timed_out(Duration::from_millis(5)));
        session.refresh_last_seen();
        assert!(!session.is_timed_out(Duration::from_secs(60)));
    }
}
