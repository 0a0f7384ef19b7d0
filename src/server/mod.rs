pub mod protocol;
pub mod session;
pub mod status;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::server::ServerConfig;
use crate::game::{ActionResult, GameEvent, GameState};
use crate::world::PlayerId;
use protocol::{Audience, ClientMessage, GameSnapshot, ServerMessage};
use session::{Command, ConnId, Session};
use status::StatusReport;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A single tick never advances the clock by more than this many intervals,
/// so a stalled loop does not apply a burst of growth at once.
const MAX_CATCH_UP_TICKS: u64 = 5;

/// How long a new connection may take to send its request and finish the upgrade.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Messages from connection tasks to the game loop.
#[derive(Debug)]
pub enum ConnEvent {
    Connected {
        conn_id: ConnId,
        peer: SocketAddr,
        outbound: mpsc::UnboundedSender<Message>,
    },
    Inbound {
        conn_id: ConnId,
        text: String,
    },
    Pong {
        conn_id: ConnId,
    },
    Disconnected {
        conn_id: ConnId,
    },
}

/// State shared between the accept loop, connection tasks and the game loop.
pub struct ServerState {
    /// Latest status report, served on `GET /status`.
    pub status: RwLock<StatusReport>,
    pub max_connections: usize,
    handshake_timeout: Duration,
    events: mpsc::UnboundedSender<ConnEvent>,
    next_conn_id: AtomicU64,
    open_connections: AtomicUsize,
}

impl ServerState {
    pub fn new(max_connections: usize, events: mpsc::UnboundedSender<ConnEvent>) -> Self {
        ServerState {
            status: RwLock::new(StatusReport::default()),
            max_connections,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            events,
            next_conn_id: AtomicU64::new(1),
            open_connections: AtomicUsize::new(0),
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Claim a connection slot, or `None` when the server is full.
    fn try_reserve(&self) -> Option<ConnectionSlot<'_>> {
        self.open_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| {
                (open < self.max_connections).then_some(open + 1)
            })
            .ok()
            .map(|_| ConnectionSlot(&self.open_connections))
    }

    fn notify(&self, event: ConnEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Releases its connection slot on drop.
struct ConnectionSlot<'a>(&'a AtomicUsize);

impl Drop for ConnectionSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// === Game loop ===

/// Owns the game state and every session. All mutation happens on the one
/// task running [`GameServer::run`], so actions are applied in arrival order.
pub struct GameServer {
    game: GameState,
    config: ServerConfig,
    state: Arc<ServerState>,
    sessions: BTreeMap<ConnId, Session>,
}

impl GameServer {
    pub fn new(game: GameState, config: ServerConfig, state: Arc<ServerState>) -> Self {
        GameServer {
            game,
            config,
            state,
            sessions: BTreeMap::new(),
        }
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Run until every connection-event sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ConnEvent>) {
        let mut tick = interval(Duration::from_millis(self.config.tick_interval_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut snapshot = interval(Duration::from_millis(self.config.snapshot_interval_ms));
        snapshot.set_missed_tick_behavior(MissedTickBehavior::Skip);
        snapshot.reset();
        let mut heartbeat = interval(Duration::from_millis(self.config.heartbeat_interval_ms));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        heartbeat.reset();

        let max_step_ms = self.config.tick_interval_ms * MAX_CATCH_UP_TICKS;
        let mut last_tick = Instant::now();

        info!(
            tick_ms = self.config.tick_interval_ms,
            tiles = self.game.tiles().len(),
            "Game loop started"
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let now = Instant::now();
                    let dt_ms = now.duration_since(last_tick).as_millis() as u64;
                    last_tick = now;
                    self.advance(dt_ms.min(max_step_ms));
                    self.refresh_status().await;
                }
                _ = snapshot.tick() => self.broadcast_snapshot(),
                _ = heartbeat.tick() => self.heartbeat(),
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        info!("Game loop stopped");
    }

    pub fn handle_event(&mut self, event: ConnEvent) {
        match event {
            ConnEvent::Connected {
                conn_id,
                peer,
                outbound,
            } => {
                let session = Session::new(conn_id, peer, outbound);
                session.send(&ServerMessage::GameState(GameSnapshot::build(&self.game, true)));
                info!(conn_id, %peer, "Client connected");
                self.sessions.insert(conn_id, session);
            }
            ConnEvent::Inbound { conn_id, text } => self.handle_inbound(conn_id, &text),
            ConnEvent::Pong { conn_id } => {
                if let Some(session) = self.sessions.get_mut(&conn_id) {
                    session.refresh_last_seen();
                }
            }
            ConnEvent::Disconnected { conn_id } => self.disconnect(conn_id),
        }
    }

    fn handle_inbound(&mut self, conn_id: ConnId, text: &str) {
        let Some(session) = self.sessions.get_mut(&conn_id) else {
            return;
        };
        session.refresh_last_seen();

        let admitted = protocol::decode(text)
            .map_err(|e| e.to_string())
            .and_then(|message| session.admit(message).map_err(|e| e.to_string()));
        let command = match admitted {
            Ok(command) => command,
            Err(message) => {
                debug!(conn_id, %message, "Rejected client message");
                session.send(&ServerMessage::error(message));
                return;
            }
        };

        match command {
            Command::Spawn(username) => match self.game.spawn_player(&username) {
                Ok((player_id, events)) => {
                    if self.bind_spawned(conn_id, player_id) {
                        info!(conn_id, player_id, %username, "Player spawned");
                        self.publish(events);
                    }
                }
                Err(e) => self.reply_error(conn_id, e.to_string()),
            },
            Command::Act(player_id, message) => {
                self.game.record_activity(player_id);
                let kind = message.kind();
                match apply(&mut self.game, player_id, message) {
                    Ok(events) => self.publish(events),
                    Err(e) => {
                        debug!(player_id, kind, error = %e, "Action rejected");
                        self.reply_error(conn_id, e.to_string());
                    }
                }
            }
        }
    }

    /// Attach a freshly spawned player to its connection. If the session can
    /// no longer take it, the player is removed again before anyone hears of it.
    fn bind_spawned(&mut self, conn_id: ConnId, player_id: PlayerId) -> bool {
        let bound = match self.sessions.get_mut(&conn_id) {
            Some(session) => session.bind(player_id).map_err(|e| e.to_string()),
            None => Err("connection is gone".to_string()),
        };
        let Err(reason) = bound else {
            return true;
        };
        warn!(conn_id, player_id, %reason, "Could not bind spawned player, removing it");
        if let Err(e) = self.game.remove_player(player_id) {
            error!(player_id, error = %e, "Failed to remove unbound player");
        }
        false
    }

    fn reply_error(&self, conn_id: ConnId, message: String) {
        if let Some(session) = self.sessions.get(&conn_id) {
            session.send(&ServerMessage::error(message));
        }
    }

    /// Advance the simulation and fan out whatever it produced.
    pub fn advance(&mut self, dt_ms: u64) {
        let events = self.game.tick(dt_ms);
        self.publish(events);
    }

    fn publish(&mut self, events: Vec<GameEvent>) {
        for event in &events {
            for (audience, message) in protocol::messages_for_event(event, &self.game) {
                self.deliver(audience, &message);
            }
            if let GameEvent::PlayerLeft { player_id, .. } = event {
                self.close_player_session(*player_id);
            }
        }
    }

    fn deliver(&self, audience: Audience, message: &ServerMessage) {
        let text = message.to_json();
        for session in self.sessions.values() {
            let wanted = match audience {
                Audience::All => true,
                Audience::Player(id) => session.player_id() == Some(id),
                Audience::AllExcept(id) => session.player_id() != Some(id),
            };
            if wanted {
                session.send_text(&text);
            }
        }
    }

    /// A player removed by the engine (inactivity) loses its connection too.
    fn close_player_session(&mut self, player_id: PlayerId) {
        let conn_id = self
            .sessions
            .values()
            .find(|s| s.player_id() == Some(player_id))
            .map(|s| s.conn_id);
        if let Some(mut session) = conn_id.and_then(|id| self.sessions.remove(&id)) {
            session.close();
            info!(conn_id = session.conn_id, player_id, "Closed session of removed player");
        }
    }

    fn disconnect(&mut self, conn_id: ConnId) {
        let Some(mut session) = self.sessions.remove(&conn_id) else {
            return;
        };
        info!(conn_id, peer = %session.peer, "Client disconnected");
        if let Some(player_id) = session.close() {
            match self.game.remove_player(player_id) {
                Ok(events) => self.publish(events),
                Err(e) => debug!(player_id, error = %e, "Player already gone"),
            }
        }
    }

    /// Ping live sessions and drop the ones that stopped answering.
    pub fn heartbeat(&mut self) {
        let timeout = Duration::from_millis(self.config.heartbeat_timeout_ms);
        let expired: Vec<ConnId> = self
            .sessions
            .values()
            .filter(|s| s.is_timed_out(timeout))
            .map(|s| s.conn_id)
            .collect();

        for session in self.sessions.values() {
            if !expired.contains(&session.conn_id) {
                session.ping();
            }
        }
        for conn_id in expired {
            warn!(conn_id, "Heartbeat timed out");
            self.disconnect(conn_id);
        }
    }

    pub fn broadcast_snapshot(&self) {
        let snapshot = ServerMessage::GameState(GameSnapshot::build(&self.game, false));
        self.deliver(Audience::All, &snapshot);
    }

    pub async fn refresh_status(&self) {
        let report = StatusReport::from_game(&self.game, self.sessions.len());
        *self.state.status.write().await = report;
    }
}

/// Route one admitted message to the matching engine action.
fn apply(game: &mut GameState, player_id: PlayerId, message: ClientMessage) -> ActionResult {
    match message {
        // Admitted only through `Command::Spawn`.
        ClientMessage::SpawnPlayer(_) => Ok(Vec::new()),
        ClientMessage::SelectTile(t) => game.select_tile(player_id, t.tile_id),
        ClientMessage::ExpandTerritory(t) => game.expand_territory(player_id, t.tile_id),
        ClientMessage::AdjustWorkerRatio(r) => game.adjust_worker_ratio(player_id, r.ratio),
        ClientMessage::AdjustTroopDeployment(d) => {
            game.adjust_troop_deployment(player_id, d.deployment)
        }
        ClientMessage::BuildStructure(b) => {
            game.build_structure(player_id, b.tile_id, b.structure_type)
        }
        ClientMessage::LaunchMissile(m) => {
            game.launch_missile(player_id, m.from_tile_id, m.to_tile_id)
        }
        ClientMessage::CreateAlliance(a) => game.create_alliance(player_id, &a.name, a.is_public),
        ClientMessage::JoinAlliance(a) => game.join_alliance(player_id, a.alliance_id),
        ClientMessage::LeaveAlliance => game.leave_alliance(player_id),
        ClientMessage::KickFromAlliance(p) => game.kick_from_alliance(player_id, p.player_id),
        ClientMessage::InviteToAlliance(p) => game.invite_to_alliance(player_id, p.player_id),
        ClientMessage::StartConquest(t) => game.start_conquest(player_id, t.tile_id),
        ClientMessage::CancelConquest => game.cancel_conquest(player_id),
    }
}

// === Network ===

/// Bind the listener and accept connections until the task is dropped.
pub async fn start_server(state: Arc<ServerState>, addr: SocketAddr) -> Result<(), BoxError> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Server listening on ws://{} (status at http://{}/status)", addr, addr);
    serve(listener, state).await
}

pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> Result<(), BoxError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, state).await {
                error!(%peer, "Connection error: {}", e);
            }
        });
    }
}

/// Route an incoming TCP connection to the WebSocket or HTTP handler.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), BoxError> {
    let mut buf = [0u8; 512];
    let n = tokio::time::timeout(state.handshake_timeout, stream.peek(&mut buf))
        .await
        .map_err(|_| "no request before handshake timeout")??;
    let request = String::from_utf8_lossy(&buf[..n]).to_lowercase();

    if request.contains("upgrade: websocket") {
        match state.try_reserve() {
            Some(_slot) => handle_websocket(stream, peer, &state).await,
            None => {
                warn!(%peer, max = state.max_connections, "Connection limit reached");
                write_http_response(stream, "503 Service Unavailable", "text/plain", "server full").await
            }
        }
    } else if request.starts_with("get /status") {
        handle_status_request(stream, &state).await
    } else {
        write_http_response(stream, "404 Not Found", "text/plain", "not found").await
    }
}

/// Bridge one WebSocket to the game loop: frames in become [`ConnEvent`]s,
/// queued outbound messages go out on the socket.
async fn handle_websocket(
    stream: TcpStream,
    peer: SocketAddr,
    state: &ServerState,
) -> Result<(), BoxError> {
    let ws_stream = tokio::time::timeout(
        state.handshake_timeout,
        tokio_tungstenite::accept_async(stream),
    )
    .await
    .map_err(|_| "WebSocket handshake timed out")??;
    let conn_id = state.next_conn_id.fetch_add(1, Ordering::SeqCst);
    let (mut write, mut read) = ws_stream.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    if !state.notify(ConnEvent::Connected {
        conn_id,
        peer,
        outbound,
    }) {
        return Err("game loop is not running".into());
    }

    let writer = async {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if write.send(message).await.is_err() || closing {
                break;
            }
        }
    };

    let reader = async {
        while let Some(frame) = read.next().await {
            let event = match frame {
                Ok(Message::Text(text)) => ConnEvent::Inbound {
                    conn_id,
                    text: text.as_str().to_owned(),
                },
                Ok(Message::Pong(_)) => ConnEvent::Pong { conn_id },
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(%peer, "WebSocket read error: {}", e);
                    break;
                }
            };
            if !state.notify(event) {
                break;
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    state.notify(ConnEvent::Disconnected { conn_id });
    Ok(())
}

async fn handle_status_request(stream: TcpStream, state: &ServerState) -> Result<(), BoxError> {
    let body = serde_json::to_string(&*state.status.read().await)?;
    write_http_response(stream, "200 OK", "application/json", &body).await
}

async fn write_http_response(
    mut stream: TcpStream,
    status: &str,
    content_type: &str,
    body: &str,
) -> Result<(), BoxError> {
    // Read and discard the request
    let mut buf = vec![0u8; 4096];
    let _ = stream.read(&mut buf).await?;

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
