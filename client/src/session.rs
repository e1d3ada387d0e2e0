//! Session context: connection lifecycle, room membership and the per-frame update.
//!
//! A [`Session`] owns every piece of mutable client state (local player, remote buffers,
//! walls, camera, latency task) and is driven from one place, the frame loop:
//!
//! ```text
//! Disconnected --connect--> InLobby --room ack--> InWaitingRoom --game_started--> InGame
//!                              ^                        |                           |
//!                              +-------- leave ---------+------ escape / leave -----+
//! (any) --disconnect--> Disconnected
//! ```
//!
//! Every handler checks the current state before touching room data. Outstanding requests
//! are forgotten on every teardown and expire after [`SessionConfig::request_timeout`], so a
//! late reply is dropped instead of resurrecting a room the user already left.

use crate::config::{SessionConfig, SnapshotDelivery};
use crate::error::SessionError;
use crate::latency::LatencyEstimator;
use crate::motion::{HeldKeys, LocalPlayer, MotionController, MotionOutcome};
use crate::reconciler::{LocalIdentity, Reconciler, SnapshotSummary};
use crate::scene::SceneComposer;
use crate::transport::{Transport, TransportEvent};
use log::{debug, info, warn};
use serde_json::Value;
use shared::{
    ActionReply, AckId, ClientEvent, GameStarted, RoomGrant, RoomReply, RosterEntry,
    RosterUpdate, ServerEvent, Snapshot, Wall,
};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// Notices beyond this many unread are dropped oldest first.
const MAX_NOTICES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    InLobby,
    InWaitingRoom,
    InGame,
}

impl SessionState {
    /// Room membership data is only meaningful in these states.
    pub fn in_room(&self) -> bool {
        matches!(self, SessionState::InWaitingRoom | SessionState::InGame)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomMembership {
    pub room_name: String,
    pub is_host: bool,
    pub players: Vec<RosterEntry>,
}

#[derive(Debug, Clone, PartialEq)]
enum RequestKind {
    Room { room_name: String, creator: bool },
    StartGame,
    LeaveRoom,
    GameState,
}

#[derive(Debug, Clone)]
struct PendingRequest {
    kind: RequestKind,
    sent_at: Instant,
}

pub struct Session<T: Transport> {
    config: SessionConfig,
    transport: T,
    running: bool,
    state: SessionState,
    session_id: Option<String>,
    room: Option<RoomMembership>,
    walls: Vec<Wall>,
    motion: MotionController,
    reconciler: Reconciler,
    scene: SceneComposer,
    latency: LatencyEstimator,
    pending: HashMap<AckId, PendingRequest>,
    last_pump: Instant,
    notices: VecDeque<String>,
    last_position_sent: Option<Instant>,
    position_dirty: bool,
    next_poll: Option<Instant>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            motion: MotionController::new(config.motion),
            reconciler: Reconciler::new(config.smoothing),
            scene: SceneComposer::new(config.viewport, config.map),
            latency: LatencyEstimator::new(config.latency),
            config,
            transport,
            running: false,
            state: SessionState::Disconnected,
            session_id: None,
            room: None,
            walls: Vec::new(),
            pending: HashMap::new(),
            last_pump: Instant::now(),
            notices: VecDeque::new(),
            last_position_sent: None,
            position_dirty: false,
            next_poll: None,
        }
    }

    /// Begins consuming transport events. Events queued before this are handled on the
    /// first [`Session::pump`].
    pub fn start(&mut self, now: Instant) {
        if self.running {
            return;
        }
        info!("Session started");
        self.running = true;
        self.pump(now);
    }

    /// Tears everything down and closes the transport. The session ignores all further
    /// events.
    pub fn dispose(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.disconnect_teardown();
        self.transport.close();
        info!("Session disposed");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Applies everything the transport delivered since the last frame, then runs the
    /// scheduled tasks (latency pings, snapshot polling).
    pub fn pump(&mut self, now: Instant) {
        if !self.running {
            return;
        }
        self.last_pump = now;

        while let Some(event) = self.transport.poll_event() {
            self.handle_event(event, now);
        }
        self.expire_requests(now);

        if self.state != SessionState::Disconnected {
            self.latency.poll(now, &mut self.transport);
        }

        self.poll_snapshots(now);
    }

    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Connected { session_id } => self.on_connected(session_id, now),
            TransportEvent::Disconnected { reason } => self.on_disconnected(&reason),
            TransportEvent::Server(event) => self.on_server_event(event, now),
            TransportEvent::Ack { id, payload } => self.on_ack(id, payload, now),
        }
    }

    /// Feeds a snapshot to the reconciler if a room is active. Returns `None` when ignored.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot, now: Instant) -> Option<SnapshotSummary> {
        if !self.state.in_room() {
            debug!("Ignoring snapshot while {:?}", self.state);
            return None;
        }

        let local = LocalIdentity {
            session_id: self.session_id.as_deref(),
            slot: self.motion.player().slot,
        };
        Some(self.reconciler.apply_snapshot(snapshot, local, now))
    }

    pub fn create_room(&mut self, room_name: &str) -> Result<(), SessionError> {
        self.request_room(room_name, true)
    }

    pub fn join_room(&mut self, room_name: &str) -> Result<(), SessionError> {
        self.request_room(room_name, false)
    }

    /// Host-only. The move to `InGame` happens when the server broadcasts `game_started`.
    pub fn start_game(&mut self) -> Result<(), SessionError> {
        self.require_state("start the game", &[SessionState::InWaitingRoom])?;
        if !self.is_host() {
            return Err(SessionError::NotHost);
        }

        let id = self.transport.call(ClientEvent::StartGame {})?;
        self.track(id, RequestKind::StartGame);
        info!("Requested game start");
        Ok(())
    }

    /// Leaves immediately. The server's reply only produces a notice; a rejection still
    /// counts as having left.
    pub fn leave_room(&mut self) -> Result<(), SessionError> {
        self.require_state(
            "leave the room",
            &[SessionState::InWaitingRoom, SessionState::InGame],
        )?;

        let sent = self.transport.call(ClientEvent::LeaveRoom {});
        if let Some(room) = &self.room {
            info!("Leaving room {}", room.room_name);
        }
        self.teardown_room();
        self.state = SessionState::InLobby;

        let id = sent?;
        self.track(id, RequestKind::LeaveRoom);
        Ok(())
    }

    pub fn escape(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::InGame if self.config.waiting_room => {
                self.reconciler.clear();
                self.next_poll = None;
                self.state = SessionState::InWaitingRoom;
                info!("Returned to waiting room");
                Ok(())
            }
            SessionState::InGame | SessionState::InWaitingRoom => self.leave_room(),
            state => Err(SessionError::InvalidState {
                action: "escape",
                state,
            }),
        }
    }

    pub fn request_game_state(&mut self, now: Instant) -> Result<(), SessionError> {
        self.require_state(
            "request game state",
            &[SessionState::InWaitingRoom, SessionState::InGame],
        )?;

        if let SnapshotDelivery::PushAndPoll { interval } = self.config.delivery {
            self.next_poll = Some(now + interval);
        }
        let id = self.transport.call(ClientEvent::GetGameState {})?;
        self.track(id, RequestKind::GameState);
        Ok(())
    }

    /// One frame of gameplay: local motion, remote smoothing, camera, position relay.
    /// Does nothing outside `InGame`.
    pub fn tick(&mut self, keys: HeldKeys, now: Instant, dt: f32) -> Option<MotionOutcome> {
        if self.state != SessionState::InGame {
            return None;
        }

        let outcome = self.motion.tick(keys, self.config.map, &self.walls);
        self.reconciler.advance(dt);
        self.scene
            .follow(self.motion.position(), self.config.motion.player_size);

        if outcome.moved {
            self.position_dirty = true;
        }
        if self.position_dirty && self.send_allowed(now) {
            self.send_position(now);
        }

        Some(outcome)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn room(&self) -> Option<&RoomMembership> {
        self.room.as_ref()
    }

    pub fn is_host(&self) -> bool {
        self.room.as_ref().is_some_and(|room| room.is_host)
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn local_player(&self) -> &LocalPlayer {
        self.motion.player()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn scene(&self) -> &SceneComposer {
        &self.scene
    }

    pub fn latency(&self) -> &LatencyEstimator {
        &self.latency
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// User-facing messages (rejections, host changes, disconnects) since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        self.notices.drain(..).collect()
    }

    fn on_connected(&mut self, session_id: String, now: Instant) {
        info!("Connected with session id {}", session_id);
        self.teardown_room();
        self.session_id = Some(session_id);
        self.state = SessionState::InLobby;
        self.latency.start(now);
    }

    fn on_disconnected(&mut self, reason: &str) {
        if self.state != SessionState::Disconnected {
            warn!("Disconnected: {}", reason);
            self.notify(format!("Disconnected: {}", reason));
        }
        self.disconnect_teardown();
    }

    fn on_server_event(&mut self, event: ServerEvent, now: Instant) {
        match event {
            ServerEvent::GameState(snapshot) => {
                self.apply_snapshot(&snapshot, now);
            }
            ServerEvent::PlayerJoined(update) | ServerEvent::PlayerLeft(update) => {
                self.on_roster(update, now)
            }
            ServerEvent::GameStarted(started) => self.on_game_started(started, now),
            ServerEvent::Other { name } => debug!("Ignoring server event {}", name),
        }
    }

    fn on_roster(&mut self, update: RosterUpdate, now: Instant) {
        let Some(room) = self.room.as_mut().filter(|_| self.state.in_room()) else {
            debug!("Ignoring roster update while {:?}", self.state);
            return;
        };

        let was_host = room.is_host;
        if !update.player_list.is_empty() {
            room.players = update.player_list;
        }

        if let Some(sid) = self.session_id.as_deref() {
            if let Some(me) = room.players.iter().find(|p| p.id == sid) {
                room.is_host = me.is_host;
            }
            if let Some(new_host) = update.new_host.as_deref() {
                room.is_host = new_host == sid;
            }
        }

        if room.is_host && !was_host {
            info!("Host role transferred to this client");
            let message = format!("You are now the host of {}", room.room_name);
            self.notify(message);
        }

        if matches!(self.config.delivery, SnapshotDelivery::PushAndPoll { .. }) {
            if let Err(e) = self.request_game_state(now) {
                warn!("Failed to refresh game state: {}", e);
            }
        }
    }

    fn on_game_started(&mut self, started: GameStarted, now: Instant) {
        if !self.state.in_room() {
            debug!("Ignoring game_started while {:?}", self.state);
            return;
        }

        if let Some(walls) = started.walls {
            self.walls = walls;
        }
        if self.state == SessionState::InWaitingRoom {
            info!("Game started");
            self.state = SessionState::InGame;
            self.scene
                .follow(self.motion.position(), self.config.motion.player_size);
        }
        if let Some(snapshot) = started.snapshot {
            self.apply_snapshot(&snapshot, now);
        }
    }

    fn on_ack(&mut self, id: AckId, payload: Value, now: Instant) {
        let Some(request) = self.pending.remove(&id) else {
            if self.latency.on_pong(id, now).is_none() {
                debug!("Ignoring reply to unknown request {}", id);
            }
            return;
        };

        match request.kind {
            RequestKind::Room { room_name, creator } => {
                self.on_room_reply(room_name, creator, &payload, now)
            }
            RequestKind::StartGame => {
                let reply = ActionReply::from_value(&payload);
                if !reply.success {
                    let message = reply.message_or("Unknown error");
                    warn!("Start game rejected: {}", message);
                    self.notify(format!("Failed to start game: {}", message));
                }
            }
            RequestKind::LeaveRoom => {
                let reply = ActionReply::from_value(&payload);
                if !reply.success {
                    let message = reply.message_or("Unknown error");
                    warn!("Leave room rejected: {}", message);
                    self.notify(format!("Left room ({})", message));
                }
            }
            RequestKind::GameState => {
                let reply = ActionReply::from_value(&payload);
                let Some(value) = reply.game_state.filter(|_| reply.success) else {
                    debug!("Game state request returned nothing");
                    return;
                };
                match Snapshot::parse(&value) {
                    Ok(snapshot) => {
                        self.apply_snapshot(&snapshot, now);
                    }
                    Err(e) => warn!("Dropping polled game state: {}", e),
                }
            }
        }
    }

    fn on_room_reply(&mut self, room_name: String, creator: bool, payload: &Value, now: Instant) {
        let verb = if creator { "create" } else { "join" };

        if self.state != SessionState::InLobby {
            debug!("Ignoring {} reply while {:?}", verb, self.state);
            return;
        }

        match RoomReply::from_value(payload, creator) {
            Ok(RoomReply::Accepted(grant)) => self.enter_room(room_name, grant, now),
            Ok(RoomReply::Rejected { message }) => {
                warn!("Failed to {} room {}: {}", verb, room_name, message);
                self.notify(format!("Failed to {} room: {}", verb, message));
            }
            Err(e) => {
                warn!("Malformed {} reply: {}", verb, e);
                self.notify(format!("Failed to {} room: Unknown error", verb));
            }
        }
    }

    fn enter_room(&mut self, room_name: String, grant: RoomGrant, now: Instant) {
        self.motion.spawn(LocalPlayer {
            position: grant.spawn,
            color: grant.color,
            slot: Some(grant.slot),
            display_name: self.config.username.clone(),
        });
        self.walls = grant.walls;
        self.state = if !self.config.waiting_room || grant.game_started {
            SessionState::InGame
        } else {
            SessionState::InWaitingRoom
        };
        self.scene
            .follow(grant.spawn, self.config.motion.player_size);

        info!(
            "Entered room {} as slot {} ({:?}{})",
            room_name,
            grant.slot,
            self.state,
            if grant.is_host { ", host" } else { "" }
        );
        self.room = Some(RoomMembership {
            room_name,
            is_host: grant.is_host,
            players: grant.player_list,
        });

        if let Some(value) = grant.game_state {
            match Snapshot::parse(&value) {
                Ok(snapshot) => {
                    self.apply_snapshot(&snapshot, now);
                }
                Err(e) => warn!("Dropping initial game state: {}", e),
            }
        }
    }

    fn request_room(&mut self, room_name: &str, creator: bool) -> Result<(), SessionError> {
        let action = if creator { "create a room" } else { "join a room" };
        self.require_state(action, &[SessionState::InLobby])?;

        let room_name = room_name.trim();
        if room_name.is_empty() {
            return Err(SessionError::EmptyRoomName);
        }

        // A newer attempt supersedes any room reply still in flight.
        self.teardown_room();

        let username = self.config.username.clone();
        let event = if creator {
            ClientEvent::CreateRoom {
                room_name: room_name.to_string(),
                username,
            }
        } else {
            ClientEvent::JoinRoom {
                room_name: room_name.to_string(),
                username,
            }
        };

        let id = self.transport.call(event)?;
        self.track(
            id,
            RequestKind::Room {
                room_name: room_name.to_string(),
                creator,
            },
        );
        info!("Requested to {} ({})", action, room_name);
        Ok(())
    }

    fn poll_snapshots(&mut self, now: Instant) {
        if self.state != SessionState::InGame {
            return;
        }
        if !matches!(self.config.delivery, SnapshotDelivery::PushAndPoll { .. }) {
            return;
        }
        if self.next_poll.is_some_and(|due| now < due) {
            return;
        }
        if let Err(e) = self.request_game_state(now) {
            warn!("Failed to poll game state: {}", e);
        }
    }

    fn send_allowed(&self, now: Instant) -> bool {
        match (self.config.position_send_interval, self.last_position_sent) {
            (Some(interval), Some(last)) => now.saturating_duration_since(last) >= interval,
            _ => true,
        }
    }

    fn send_position(&mut self, now: Instant) {
        let position = self.motion.position();
        let event = ClientEvent::UpdatePosition {
            x: position.x,
            y: position.y,
            username: self.config.username.clone(),
        };

        if let Err(e) = self.transport.emit(event) {
            warn!("Failed to send position: {}", e);
        }
        self.last_position_sent = Some(now);
        self.position_dirty = false;
    }

    fn track(&mut self, id: AckId, kind: RequestKind) {
        self.pending.insert(
            id,
            PendingRequest {
                kind,
                sent_at: self.last_pump,
            },
        );
    }

    /// Forgets requests the server never answered. Room and start requests leave a notice,
    /// since the user is otherwise left waiting on nothing.
    fn expire_requests(&mut self, now: Instant) {
        let timeout = self.config.request_timeout;
        let expired: Vec<AckId> = self
            .pending
            .iter()
            .filter(|(_, request)| now.saturating_duration_since(request.sent_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            let Some(request) = self.pending.remove(&id) else {
                continue;
            };
            match request.kind {
                RequestKind::Room { room_name, creator } => {
                    let verb = if creator { "create" } else { "join" };
                    warn!("No reply to {} room {}", verb, room_name);
                    self.notify(format!("Failed to {} room: no response from server", verb));
                }
                RequestKind::StartGame => {
                    warn!("No reply to start game");
                    self.notify("Failed to start game: no response from server".to_string());
                }
                kind => debug!("Request {} ({:?}) expired", id, kind),
            }
        }
    }

    fn require_state(
        &self,
        action: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        match self.state {
            SessionState::Disconnected => Err(SessionError::NotConnected),
            state => Err(SessionError::InvalidState { action, state }),
        }
    }

    fn notify(&mut self, message: String) {
        if self.notices.len() >= MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(message);
    }

    /// Drops everything that belongs to a room, including outstanding requests, so their
    /// replies are ignored when they arrive.
    fn teardown_room(&mut self) {
        self.pending.clear();
        self.room = None;
        self.walls.clear();
        self.reconciler.clear();
        self.scene.reset();
        self.motion.reset();
        self.next_poll = None;
        self.last_position_sent = None;
        self.position_dirty = false;
    }

    fn disconnect_teardown(&mut self) {
        self.teardown_room();
        self.latency.stop();
        self.session_id = None;
        self.state = SessionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, LoopbackPeer};
    use serde_json::json;
    use shared::{OutboundFrame, PlayerInfo, Rgb, Vec2};
    use std::time::Duration;

    fn connected(config: SessionConfig) -> (Session<ChannelTransport>, LoopbackPeer, Instant) {
        let (transport, mut peer) = ChannelTransport::loopback();
        let mut session = Session::new(transport, config);
        let now = Instant::now();
        peer.connect("me");
        session.start(now);
        // Drop the first latency ping.
        peer.drain();
        (session, peer, now)
    }

    fn last_ack(peer: &mut LoopbackPeer) -> AckId {
        peer.drain()
            .iter()
            .rev()
            .find_map(|frame| frame.ack)
            .expect("acknowledged frame")
    }

    fn enter(session: &mut Session<ChannelTransport>, peer: &mut LoopbackPeer, now: Instant) {
        session.create_room("r1").unwrap();
        let id = last_ack(peer);
        peer.reply(
            id,
            json!({"success": true, "color": [255, 0, 0], "position_index": 0, "x": 80, "y": 80, "walls": [], "is_host": true}),
        );
        session.pump(now);
    }

    fn positions(frames: &[OutboundFrame]) -> Vec<(f32, f32)> {
        frames
            .iter()
            .filter_map(|frame| match &frame.event {
                ClientEvent::UpdatePosition { x, y, .. } => Some((*x, *y)),
                _ => None,
            })
            .collect()
    }

    fn right() -> HeldKeys {
        HeldKeys {
            right: true,
            ..HeldKeys::default()
        }
    }

    #[test]
    fn test_connect_enters_lobby_and_starts_latency() {
        let (session, _peer, _) = connected(SessionConfig::default());
        assert_eq!(session.state(), SessionState::InLobby);
        assert_eq!(session.session_id(), Some("me"));
        assert!(session.latency().is_running());
    }

    #[test]
    fn test_events_before_start_are_not_consumed() {
        let (transport, peer) = ChannelTransport::loopback();
        let mut session = Session::new(transport, SessionConfig::default());
        peer.connect("me");

        session.pump(Instant::now());
        assert_eq!(session.state(), SessionState::Disconnected);

        session.start(Instant::now());
        assert_eq!(session.state(), SessionState::InLobby);
    }

    #[test]
    fn test_room_actions_require_connection() {
        let (transport, _peer) = ChannelTransport::loopback();
        let mut session = Session::new(transport, SessionConfig::default());
        session.start(Instant::now());

        assert!(matches!(
            session.create_room("r1"),
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            session.leave_room(),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn test_empty_room_name_is_rejected_locally() {
        let (mut session, mut peer, now) = connected(SessionConfig::default());
        assert!(matches!(
            session.join_room("   "),
            Err(SessionError::EmptyRoomName)
        ));
        assert!(peer.drain().is_empty());
    }

    #[test]
    fn test_create_room_enters_waiting_room() {
        let (mut session, mut peer, now) = connected(SessionConfig::default());
        enter(&mut session, &mut peer, now);

        assert_eq!(session.state(), SessionState::InWaitingRoom);
        assert_eq!(session.local_player().position, Vec2::new(80.0, 80.0));
        assert_eq!(session.local_player().color, Some(Rgb([255, 0, 0])));
        assert!(session.is_host());
        assert_eq!(session.room().unwrap().room_name, "r1");
        assert!(session.reconciler().is_empty());
    }

    #[test]
    fn test_no_waiting_room_goes_straight_to_game() {
        let config = SessionConfig {
            waiting_room: false,
            ..SessionConfig::default()
        };
        let (mut session, mut peer, now) = connected(config);
        enter(&mut session, &mut peer, now);
        assert_eq!(session.state(), SessionState::InGame);
    }

    #[test]
    fn test_rejected_room_stays_in_lobby_with_notice() {
        let (mut session, mut peer, now) = connected(SessionConfig::default());
        session.join_room("full").unwrap();
        let id = last_ack(&mut peer);
        peer.reply(id, json!({"success": false, "message": "Room is full"}));
        session.pump(now);

        assert_eq!(session.state(), SessionState::InLobby);
        assert_eq!(
            session.take_notices(),
            vec!["Failed to join room: Room is full".to_string()]
        );
        assert!(session.take_notices().is_empty());
    }

    #[test]
    fn test_non_host_cannot_start() {
        let (mut session, mut peer, now) = connected(SessionConfig::default());
        session.join_room("r1").unwrap();
        let id = last_ack(&mut peer);
        peer.reply(id, json!({"success": true, "position_index": 1, "is_host": false}));
        session.pump(now);

        assert!(matches!(session.start_game(), Err(SessionError::NotHost)));
        assert!(peer.drain().is_empty());
    }

    #[test]
    fn test_host_start_waits_for_broadcast() {
        let (mut session, mut peer, now) = connected(SessionConfig::default());
        enter(&mut session, &mut peer, now);

        session.start_game().unwrap();
        assert_eq!(session.state(), SessionState::InWaitingRoom);

        peer.push(ServerEvent::GameStarted(GameStarted {
            snapshot: None,
            walls: Some(vec![Wall::new(500.0, 500.0, 50.0, 50.0)]),
        }));
        session.pump(now);

        assert_eq!(session.state(), SessionState::InGame);
        assert_eq!(session.walls().len(), 1);
    }

    #[test]
    fn test_game_started_in_lobby_is_ignored() {
        let (mut session, peer, now) = connected(SessionConfig::default());
        peer.push(ServerEvent::GameStarted(GameStarted::default()));
        session.pump(now);
        assert_eq!(session.state(), SessionState::InLobby);
    }

    #[test]
    fn test_snapshot_ignored_outside_room() {
        let (mut session, _peer, now) = connected(SessionConfig::default());
        let snapshot = Snapshot::from_players([(
            "other",
            PlayerInfo {
                position: Vec2::new(1.0, 1.0),
                color: Rgb::WHITE,
                slot: 1,
                username: None,
            },
        )]);
        assert_eq!(session.apply_snapshot(&snapshot, now), None);
        assert!(session.reconciler().is_empty());
    }

    #[test]
    fn test_leave_room_tears_down_even_when_rejected() {
        let (mut session, mut peer, now) = connected(SessionConfig::default());
        enter(&mut session, &mut peer, now);

        session.leave_room().unwrap();
        assert_eq!(session.state(), SessionState::InLobby);
        assert!(session.room().is_none());
        assert_eq!(session.local_player(), &LocalPlayer::default());

        let id = last_ack(&mut peer);
        peer.reply(id, json!({"success": false, "message": "Not in a room"}));
        session.pump(now);

        assert_eq!(session.state(), SessionState::InLobby);
        assert_eq!(session.take_notices(), vec!["Left room (Not in a room)"]);
    }

    #[test]
    fn test_escape_with_waiting_room() {
        let (mut session, mut peer, now) = connected(SessionConfig::default());
        enter(&mut session, &mut peer, now);
        peer.push(ServerEvent::GameStarted(GameStarted::default()));
        session.pump(now);

        session.escape().unwrap();
        assert_eq!(session.state(), SessionState::InWaitingRoom);
        assert!(session.room().is_some());

        session.escape().unwrap();
        assert_eq!(session.state(), SessionState::InLobby);
    }

    #[test]
    fn test_escape_without_waiting_room_leaves() {
        let config = SessionConfig {
            waiting_room: false,
            ..SessionConfig::default()
        };
        let (mut session, mut peer, now) = connected(config);
        enter(&mut session, &mut peer, now);

        session.escape().unwrap();
        assert_eq!(session.state(), SessionState::InLobby);
        assert!(peer
            .drain()
            .iter()
            .any(|frame| frame.event == ClientEvent::LeaveRoom {}));
    }

    #[test]
    fn test_stale_room_reply_is_ignored() {
        let (mut session, mut peer, now) = connected(SessionConfig::default());
        session.create_room("first").unwrap();
        let first = last_ack(&mut peer);
        session.create_room("second").unwrap();
        let second = last_ack(&mut peer);

        peer.reply(first, json!({"success": true, "x": 1, "y": 1}));
        session.pump(now);
        assert_eq!(session.state(), SessionState::InLobby);

        peer.reply(second, json!({"success": true, "x": 2, "y": 2}));
        session.pump(now);
        assert_eq!(session.room().unwrap().room_name, "second");
        assert_eq!(session.local_player().position, Vec2::new(2.0, 2.0));
    }

    #[test]
    fn test_disconnect_tears_everything_down() {
        let (mut session, mut peer, now) = connected(SessionConfig {
            waiting_room: false,
            ..SessionConfig::default()
        });
        enter(&mut session, &mut peer, now);
        session.tick(right(), now, 1.0 / 60.0);

        peer.disconnect("server closed");
        session.pump(now);

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.room().is_none());
        assert!(session.walls().is_empty());
        assert!(session.reconciler().is_empty());
        assert_eq!(session.scene().camera(), Vec2::ZERO);
        assert_eq!(session.local_player(), &LocalPlayer::default());
        assert!(!session.latency().is_running());
        assert_eq!(session.pending_requests(), 0);
        assert_eq!(session.take_notices(), vec!["Disconnected: server closed"]);
    }

    #[test]
    fn test_tick_only_runs_in_game() {
        let (mut session, mut peer, now) = connected(SessionConfig::default());
        assert_eq!(session.tick(right(), now, 1.0 / 60.0), None);

        enter(&mut session, &mut peer, now);
        assert_eq!(session.tick(right(), now, 1.0 / 60.0), None);
        assert!(positions(&peer.drain()).is_empty());
    }

    #[test]
    fn test_moves_are_sent_every_tick_by_default() {
        let config = SessionConfig {
            waiting_room: false,
            ..SessionConfig::default()
        };
        let (mut session, mut peer, now) = connected(config);
        enter(&mut session, &mut peer, now);
        peer.drain();

        for _ in 0..3 {
            session.tick(right(), now, 1.0 / 60.0);
        }
        session.tick(HeldKeys::default(), now, 1.0 / 60.0);

        assert_eq!(
            positions(&peer.drain()),
            vec![(85.0, 80.0), (90.0, 80.0), (95.0, 80.0)]
        );
    }

    #[test]
    fn test_send_rate_cap_flushes_suppressed_move() {
        let config = SessionConfig {
            waiting_room: false,
            position_send_interval: Some(Duration::from_millis(50)),
            ..SessionConfig::default()
        };
        let (mut session, mut peer, now) = connected(config);
        enter(&mut session, &mut peer, now);
        peer.drain();

        session.tick(right(), now, 1.0 / 60.0);
        session.tick(right(), now + Duration::from_millis(16), 1.0 / 60.0);
        assert_eq!(positions(&peer.drain()), vec![(85.0, 80.0)]);

        // Keys released; the held-back position still goes out once the cap allows.
        session.tick(HeldKeys::default(), now + Duration::from_millis(32), 1.0 / 60.0);
        assert!(positions(&peer.drain()).is_empty());
        session.tick(HeldKeys::default(), now + Duration::from_millis(50), 1.0 / 60.0);
        assert_eq!(positions(&peer.drain()), vec![(90.0, 80.0)]);
        session.tick(HeldKeys::default(), now + Duration::from_millis(120), 1.0 / 60.0);
        assert!(positions(&peer.drain()).is_empty());
    }

    #[test]
    fn test_new_host_promotes_local_player() {
        let (mut session, mut peer, now) = connected(SessionConfig::default());
        session.join_room("r1").unwrap();
        let id = last_ack(&mut peer);
        peer.reply(id, json!({"success": true, "position_index": 1, "is_host": false}));
        session.pump(now);
        assert!(!session.is_host());

        peer.push(ServerEvent::PlayerLeft(RosterUpdate {
            player_list: vec![RosterEntry {
                id: "me".to_string(),
                username: None,
                is_host: true,
            }],
            new_host: Some("me".to_string()),
        }));
        session.pump(now);

        assert!(session.is_host());
        assert_eq!(session.take_notices(), vec!["You are now the host of r1"]);
        assert!(session.start_game().is_ok());
    }

    #[test]
    fn test_dispose_closes_transport() {
        let (mut session, peer, now) = connected(SessionConfig::default());
        session.dispose();

        assert!(!session.is_running());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.transport().is_connected());

        peer.connect("again");
        session.pump(now);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_unanswered_polls_expire() {
        let config = SessionConfig {
            waiting_room: false,
            delivery: SnapshotDelivery::PushAndPoll {
                interval: Duration::from_millis(100),
            },
            request_timeout: Duration::from_secs(1),
            ..SessionConfig::default()
        };
        let (mut session, mut peer, now) = connected(config);
        enter(&mut session, &mut peer, now);
        assert_eq!(session.state(), SessionState::InGame);

        for step in 1..=300u64 {
            session.pump(now + Duration::from_millis(step * 100));
        }

        let sent = peer
            .drain()
            .iter()
            .filter(|f| f.event == ClientEvent::GetGameState {})
            .count();
        assert!(sent >= 300);
        assert!(session.pending_requests() > 0);
        assert!(session.pending_requests() <= 11);
        assert!(session.take_notices().is_empty());
    }

    #[test]
    fn test_unanswered_room_request_times_out() {
        let (mut session, mut peer, now) = connected(SessionConfig::default());
        session.create_room("r1").unwrap();
        let id = last_ack(&mut peer);

        session.pump(now + Duration::from_secs(9));
        assert_eq!(session.pending_requests(), 1);

        session.pump(now + Duration::from_secs(10));
        assert_eq!(session.pending_requests(), 0);
        assert_eq!(
            session.take_notices(),
            vec!["Failed to create room: no response from server"]
        );

        peer.reply(id, json!({"success": true}));
        session.pump(now + Duration::from_secs(11));
        assert_eq!(session.state(), SessionState::InLobby);
        assert!(session.room().is_none());
    }
}
