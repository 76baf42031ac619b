// Peer aggregate
// One value per running game: match state, session, ready flags and step control.
// Everything runs on the caller's frame loop; network work reports back through queues.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use super::ready::{compute_start_intent, ReadyState, StartIntent};
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::game::{
    advance, can_request_step, can_toggle_step_mode, controlled_player, try_set_direction,
    Direction, InputAction, MatchState, Mode, PlayerId, Rules, StepControl, TickEvents,
};
use crate::network::negotiate::{host_flow, join_flow, spawn_negotiation};
use crate::network::offline::{extract_offer_code, invite_link, ManualRelay, OFFLINE_ROOM};
use crate::network::{
    ConnectorFactory, NetworkMessage, Role, Session, SessionEvent, SignalKind, SignalRelay,
    SignalTimings, Snapshot,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PeerSettings {
    pub rules: Rules,
    pub relay_timings: SignalTimings,
    pub manual_timings: SignalTimings,
    pub invite_base_url: Option<String>,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            rules: Rules::default(),
            relay_timings: SignalTimings::default(),
            manual_timings: SignalTimings {
                timeout: Duration::from_secs(300),
                ..SignalTimings::default()
            },
            invite_base_url: None,
        }
    }
}

impl From<&Config> for PeerSettings {
    fn from(config: &Config) -> Self {
        Self {
            rules: Rules::from(&config.game),
            relay_timings: config.network.relay_timings(),
            manual_timings: config.network.manual_timings(),
            invite_base_url: config.network.invite_base().map(str::to_string),
        }
    }
}

/// A player's side of the game, local or networked
pub struct SnakePeer<F, R> {
    pub(crate) settings: PeerSettings,
    pub(crate) state: MatchState,
    pub(crate) session: Session,
    pub(crate) ready: ReadyState,
    pub(crate) steps: StepControl,
    /// Latest direction received from the client (host only)
    pub(crate) remote_dir: Direction,
    /// Copy/paste exchange of the current offline attempt
    pub(crate) manual: Option<ManualRelay>,
    rng: StdRng,
    factory: F,
    relay: R,
}

impl<F, R> SnakePeer<F, R>
where
    F: ConnectorFactory,
    R: SignalRelay + Clone + Send + 'static,
{
    pub fn new(settings: PeerSettings, factory: F, relay: R) -> Self {
        Self::with_rng(settings, factory, relay, StdRng::from_entropy())
    }

    pub fn with_rng(settings: PeerSettings, factory: F, relay: R, rng: StdRng) -> Self {
        let state = MatchState::new(&settings.rules, Role::None);
        Self {
            settings,
            state,
            session: Session::new(),
            ready: ReadyState::default(),
            steps: StepControl::default(),
            remote_dir: Direction::ZERO,
            manual: None,
            rng,
            factory,
            relay,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn ready(&self) -> ReadyState {
        self.ready
    }

    pub fn steps(&self) -> &StepControl {
        &self.steps
    }

    pub fn rules(&self) -> &Rules {
        &self.settings.rules
    }

    pub fn role(&self) -> Role {
        self.session.role()
    }

    // ---- session entry points ----

    /// Host through the room relay
    pub fn host_room(&mut self, room: &str) -> Result<()> {
        let ticket = self.session.begin_host(room)?;
        self.after_begin(Role::Host);

        let connector = self.factory.connector();
        let relay = self.relay.clone();
        let room = room.trim().to_string();
        let timings = self.settings.relay_timings;
        let spawned = spawn_negotiation(ticket, move || async move {
            host_flow(connector, &relay, &room, timings).await
        });
        self.settle(spawned)
    }

    /// Join through the room relay. Ignored while another join is in flight.
    pub fn join_room(&mut self, room: &str) -> Result<()> {
        let Some(ticket) = self.session.begin_join(room)? else {
            return Ok(());
        };
        self.after_begin(Role::Client);

        let connector = self.factory.connector();
        let relay = self.relay.clone();
        let room = room.trim().to_string();
        let timings = self.settings.relay_timings;
        let spawned = spawn_negotiation(ticket, move || async move {
            join_flow(connector, &relay, &room, timings).await
        });
        self.settle(spawned)
    }

    /// Host without a relay: the offer becomes an invite code, the answer is pasted back
    pub fn host_offline(&mut self) -> Result<()> {
        let ticket = self.session.begin_host(OFFLINE_ROOM)?;
        self.after_begin(Role::Host);

        let manual = ManualRelay::new();
        self.manual = Some(manual.clone());
        let connector = self.factory.connector();
        let timings = self.settings.manual_timings;
        let spawned = spawn_negotiation(ticket, move || async move {
            host_flow(connector, &manual, OFFLINE_ROOM, timings).await
        });
        self.settle(spawned)
    }

    /// Join from an invite code or link. Ignored while another join is in flight.
    pub fn join_offline(&mut self, invite: &str) -> Result<()> {
        let code = extract_offer_code(invite)
            .ok_or_else(|| SyncError::InvalidCode("empty invite".to_string()))?;
        let manual = ManualRelay::new();
        let kind = manual.paste(&code)?;
        if kind != SignalKind::Offer {
            return Err(SyncError::InvalidCode(format!("expected an offer code, got {}", kind)));
        }

        let Some(ticket) = self.session.begin_join(OFFLINE_ROOM)? else {
            return Ok(());
        };
        self.after_begin(Role::Client);

        self.manual = Some(manual.clone());
        let connector = self.factory.connector();
        let timings = self.settings.manual_timings;
        let spawned = spawn_negotiation(ticket, move || async move {
            join_flow(connector, &manual, OFFLINE_ROOM, timings).await
        });
        self.settle(spawned)
    }

    /// Feed a pasted code to whatever is waiting for one: an offline host
    /// waiting for its answer, or an idle peer joining from an invite.
    /// A relay host has nothing to paste into and keeps its session.
    pub fn paste(&mut self, input: &str) -> Result<()> {
        if self.session.role() != Role::Host {
            return self.join_offline(input);
        }
        let Some(manual) = &self.manual else {
            return Err(SyncError::InvalidCode(
                "hosting through the relay, nothing to paste".to_string(),
            ));
        };
        let kind = manual.paste(input)?;
        if kind != SignalKind::Answer {
            return Err(SyncError::InvalidCode(format!(
                "expected an answer code, got {}",
                kind
            )));
        }
        Ok(())
    }

    /// Offline host: the invite to hand to the other player
    pub fn invite_link(&self) -> Option<String> {
        let code = self.manual.as_ref()?.published(SignalKind::Offer)?;
        Some(match &self.settings.invite_base_url {
            Some(base) => invite_link(base, &code),
            None => code,
        })
    }

    /// Offline client: the answer code to send back to the host
    pub fn answer_code(&self) -> Option<String> {
        self.manual.as_ref()?.published(SignalKind::Answer)
    }

    /// Record a failure of a user-initiated operation and return to idle
    pub fn fail(&mut self, err: &SyncError) {
        self.session.fail(err.to_string());
        self.reset_net();
    }

    /// A setup step that failed after the session began leaves nothing behind
    fn settle(&mut self, result: Result<()>) -> Result<()> {
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    fn after_begin(&mut self, role: Role) {
        self.reset_net();
        self.state = MatchState::new(&self.settings.rules, role);
    }

    /// Tear down networking and forget everything tied to the link.
    /// Step mode itself survives.
    pub fn cleanup_net(&mut self) {
        self.session.cleanup();
        self.reset_net();
    }

    fn reset_net(&mut self) {
        self.remote_dir = Direction::ZERO;
        self.manual = None;
        self.ready.reset();
        self.steps.pending_steps = 0;
        self.steps.remote_input_count = 0;
    }

    // ---- local actions ----

    pub fn apply(&mut self, action: InputAction) {
        match action {
            InputAction::Steer(dir) => self.steer(dir),
            InputAction::Ready => self.press_ready(),
            InputAction::Step => self.request_step(),
            InputAction::ToggleStepMode => self.toggle_step_mode(),
        }
    }

    pub fn start_local(&mut self) {
        self.cleanup_net();
        self.press_ready();
    }

    /// Ready/start button
    pub fn press_ready(&mut self) {
        match compute_start_intent(self.session.role(), self.session.phase(), self.ready) {
            StartIntent::ToggleHostReady(value) => {
                self.ready.host_ready = value;
                self.sync_ready_to_peer();
                self.try_start_synced_round();
            }
            StartIntent::ToggleClientReady(value) => {
                self.ready.client_ready = value;
                self.session.send(&NetworkMessage::Ready { value });
            }
            StartIntent::StartLocal => {
                self.reset_match();
                info!("Local round started");
            }
            StartIntent::Noop => debug!("Ready ignored while not connected"),
        }
    }

    pub fn toggle_step_mode(&mut self) {
        if !can_toggle_step_mode(self.session.role()) {
            return;
        }
        let enabled = !self.steps.step_mode;
        self.steps.set_step_mode(enabled);
        info!("Step mode {}", if enabled { "on" } else { "off" });
        if self.session.role() == Role::Host {
            self.session.send(&NetworkMessage::DebugState { step_mode: enabled });
        }
    }

    pub fn request_step(&mut self) {
        if !can_request_step(self.state.mode, self.steps.step_mode) {
            return;
        }
        if self.session.role() == Role::Client {
            self.session.send(&NetworkMessage::StepRequest);
        } else {
            self.steps.grant_step();
        }
    }

    /// Steer the locally controlled snake; a client also forwards the intent
    pub fn steer(&mut self, dir: Direction) {
        if !dir.is_valid() {
            return;
        }
        let role = self.session.role();
        let mode = self.state.mode;
        try_set_direction(self.state.player_mut(controlled_player(role)), mode, dir);
        if role == Role::Client {
            self.session.send(&NetworkMessage::Input { dir });
        }
    }

    /// Local seating steers p2 from the same keyboard
    pub fn steer_player(&mut self, id: PlayerId, dir: Direction) {
        if self.session.role() != Role::None || !dir.is_valid() {
            return;
        }
        let mode = self.state.mode;
        try_set_direction(self.state.player_mut(id), mode, dir);
    }

    // ---- frame loop ----

    /// Drain network events, then advance the simulation by `dt`
    pub fn update(&mut self, dt: Duration) -> TickEvents {
        self.pump();

        let role = self.session.role();
        if role == Role::Host && self.state.mode == Mode::Playing && self.steps.remote_input_count > 0
        {
            let dir = self.remote_dir;
            try_set_direction(self.state.player_mut(PlayerId::P2), Mode::Playing, dir);
        }

        let mut events = TickEvents::default();
        if role != Role::Client {
            let rules = self.settings.rules;
            events = advance(&mut self.state, &rules, &mut self.steps, &mut self.rng, dt);
            if events.round_over {
                info!("Round over, winner: {:?}", self.state.winner);
            }
        }

        if role == Role::Host && self.session.is_connected() {
            self.session.send(&NetworkMessage::State {
                payload: Snapshot::capture(&self.state),
            });
        }
        events
    }

    /// Handle everything the session surfaced since the last call
    pub fn pump(&mut self) {
        for event in self.session.poll() {
            match event {
                SessionEvent::Opened => self.on_open(),
                SessionEvent::Message(text) => self.handle_text(&text),
                SessionEvent::Failed(_) | SessionEvent::Closed => self.after_drop(),
            }
        }
    }

    /// The link is gone: back to an idle menu, nobody simulates a stale round
    fn after_drop(&mut self) {
        self.reset_net();
        self.state = MatchState::new(&self.settings.rules, Role::None);
    }

    fn on_open(&mut self) {
        self.ready.reset();
        if self.session.role() == Role::Host {
            self.sync_ready_to_peer();
            self.session.send(&NetworkMessage::DebugState {
                step_mode: self.steps.step_mode,
            });
        }
    }

    pub(crate) fn sync_ready_to_peer(&mut self) {
        if self.session.is_connected() {
            self.session.send(&self.ready.message());
        }
    }

    /// Host only: start when both flags are up
    pub(crate) fn try_start_synced_round(&mut self) {
        if self.session.role() != Role::Host || !self.session.is_connected() {
            return;
        }
        if !self.ready.both() {
            return;
        }
        self.reset_match();
        self.session.send(&NetworkMessage::Start);
        self.sync_ready_to_peer();
        info!("Synced round started");
    }

    /// Fresh round for the current seating; ready flags and pending steps clear
    pub(crate) fn reset_match(&mut self) {
        let rules = self.settings.rules;
        self.state.reset(&rules, self.session.role());
        self.ready.reset();
        self.steps.pending_steps = 0;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::Cell;
    use crate::network::memory::{MemoryChannel, MemoryNetwork};
    use crate::network::{ChannelEvent, MemoryRelay, MessageChannel, Phase};
    use std::time::Instant;

    pub(crate) type TestPeer = SnakePeer<MemoryNetwork, MemoryRelay>;

    pub(crate) fn fast_settings() -> PeerSettings {
        let quick = SignalTimings {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
        };
        PeerSettings {
            relay_timings: quick,
            manual_timings: quick,
            ..PeerSettings::default()
        }
    }

    pub(crate) fn peer(net: &MemoryNetwork, relay: &MemoryRelay) -> TestPeer {
        SnakePeer::with_rng(
            fast_settings(),
            net.clone(),
            relay.clone(),
            StdRng::seed_from_u64(42),
        )
    }

    /// A peer already connected in `role`, plus the far end of its channel
    pub(crate) fn connected(role: Role) -> (TestPeer, MemoryChannel) {
        let mut p = peer(&MemoryNetwork::new(), &MemoryRelay::new());
        let ticket = match role {
            Role::Host => p.session.begin_host("test").unwrap(),
            _ => p.session.begin_join("test").unwrap().unwrap(),
        };
        p.after_begin(role);
        let (local, mut remote) = MemoryChannel::pair();
        ticket.finish(Ok(Box::new(local)));
        p.pump();
        assert_eq!(p.session.phase(), Phase::Connected);
        assert_eq!(remote.try_recv(), Some(ChannelEvent::Open));
        (p, remote)
    }

    pub(crate) fn sent(remote: &mut MemoryChannel) -> Vec<NetworkMessage> {
        std::iter::from_fn(|| remote.try_recv())
            .filter_map(|e| match e {
                ChannelEvent::Message(t) => NetworkMessage::from_text(&t).ok().flatten(),
                _ => None,
            })
            .collect()
    }

    fn pump_until(peers: &mut [&mut TestPeer], done: impl Fn(&[&mut TestPeer]) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(&*peers) {
            assert!(Instant::now() < deadline, "timed out pumping peers");
            for p in peers.iter_mut() {
                p.pump();
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_host_open_pushes_ready_and_step_mode() {
        let (_host, mut remote) = connected(Role::Host);
        assert_eq!(
            sent(&mut remote),
            vec![
                NetworkMessage::ReadyState {
                    host_ready: false,
                    client_ready: false
                },
                NetworkMessage::DebugState { step_mode: false },
            ]
        );
    }

    #[test]
    fn test_host_ready_alone_does_not_start() {
        let (mut host, mut remote) = connected(Role::Host);
        sent(&mut remote);

        host.press_ready();

        assert_eq!(host.state.mode, Mode::Menu);
        assert_eq!(
            sent(&mut remote),
            vec![NetworkMessage::ReadyState {
                host_ready: true,
                client_ready: false
            }]
        );
    }

    #[test]
    fn test_both_ready_in_either_order_starts_exactly_one_round() {
        for host_first in [true, false] {
            let (mut host, mut remote) = connected(Role::Host);
            sent(&mut remote);

            let client_ready = NetworkMessage::Ready { value: true }.to_text().unwrap();
            if host_first {
                host.press_ready();
                remote.inject(&client_ready);
                host.pump();
            } else {
                remote.inject(&client_ready);
                host.pump();
                host.press_ready();
            }

            assert_eq!(host.state.mode, Mode::Playing);
            assert_eq!(host.ready, ReadyState::default());
            let out = sent(&mut remote);
            assert_eq!(out.iter().filter(|m| **m == NetworkMessage::Start).count(), 1);
            assert_eq!(
                out.last(),
                Some(&NetworkMessage::ReadyState {
                    host_ready: false,
                    client_ready: false
                })
            );
        }
    }

    #[test]
    fn test_client_ready_sends_message_and_waits_for_host() {
        let (mut client, mut remote) = connected(Role::Client);
        client.press_ready();

        assert!(client.ready.client_ready);
        assert_eq!(sent(&mut remote), vec![NetworkMessage::Ready { value: true }]);
        assert_eq!(client.state.mode, Mode::Menu);
    }

    #[test]
    fn test_ready_is_noop_while_connecting() {
        let mut p = peer(&MemoryNetwork::new(), &MemoryRelay::new());
        p.session.begin_host("room").unwrap();
        p.press_ready();
        assert_eq!(p.ready, ReadyState::default());
        assert_eq!(p.state.mode, Mode::Menu);
    }

    #[test]
    fn test_local_start_and_seating() {
        let mut p = peer(&MemoryNetwork::new(), &MemoryRelay::new());
        p.start_local();

        assert_eq!(p.state.mode, Mode::Playing);
        assert_eq!(p.state.players[1].direction, Direction::ZERO);

        // p2 sits still until steered
        p.update(Duration::from_millis(34));
        p.update(Duration::from_millis(34));
        p.update(Duration::from_millis(34));
        p.update(Duration::from_millis(34));
        assert_eq!(p.state.players[0].head(), Cell::new(7, 13));
        assert_eq!(p.state.players[1].head(), Cell::new(19, 13));

        p.steer_player(PlayerId::P2, Direction::UP);
        assert_eq!(p.state.players[1].queued_direction, Direction::UP);
    }

    #[test]
    fn test_step_mode_local_grants_steps_directly() {
        let mut p = peer(&MemoryNetwork::new(), &MemoryRelay::new());
        p.start_local();
        p.toggle_step_mode();

        p.update(Duration::from_secs(1));
        assert_eq!(p.state.players[0].head(), Cell::new(6, 13));

        p.request_step();
        assert_eq!(p.steps.pending_steps, 1);
        p.update(Duration::ZERO);
        assert_eq!(p.state.players[0].head(), Cell::new(7, 13));
    }

    #[test]
    fn test_client_cannot_toggle_step_mode_and_requests_steps() {
        let (mut client, mut remote) = connected(Role::Client);
        client.toggle_step_mode();
        assert!(!client.steps.step_mode);

        // mirror host state: step mode on, round playing
        remote.inject(&NetworkMessage::DebugState { step_mode: true }.to_text().unwrap());
        remote.inject(&NetworkMessage::Start.to_text().unwrap());
        client.pump();
        assert!(client.steps.step_mode);
        assert_eq!(client.state.mode, Mode::Playing);

        client.request_step();
        assert_eq!(client.steps.pending_steps, 0);
        assert_eq!(sent(&mut remote), vec![NetworkMessage::StepRequest]);
    }

    #[test]
    fn test_host_toggle_broadcasts_debug_state() {
        let (mut host, mut remote) = connected(Role::Host);
        sent(&mut remote);
        host.toggle_step_mode();
        assert_eq!(sent(&mut remote), vec![NetworkMessage::DebugState { step_mode: true }]);
    }

    #[test]
    fn test_remote_input_merges_only_after_first_input() {
        let (mut host, mut remote) = connected(Role::Host);
        host.reset_match();
        host.toggle_step_mode();

        host.update(Duration::ZERO);
        assert_eq!(host.state.players[1].queued_direction, Direction::LEFT);

        remote.inject(&NetworkMessage::Input { dir: Direction::UP }.to_text().unwrap());
        host.update(Duration::ZERO);
        assert_eq!(host.steps.remote_input_count, 1);
        assert_eq!(host.state.players[1].queued_direction, Direction::UP);

        // reversal of the active direction is rejected at merge time
        remote.inject(&NetworkMessage::Input { dir: Direction::RIGHT }.to_text().unwrap());
        host.update(Duration::ZERO);
        assert_eq!(host.state.players[1].queued_direction, Direction::UP);
    }

    #[test]
    fn test_host_pushes_snapshot_every_frame() {
        let (mut host, mut remote) = connected(Role::Host);
        sent(&mut remote);
        host.toggle_step_mode();
        sent(&mut remote);

        host.update(Duration::ZERO);
        host.update(Duration::ZERO);

        let states = sent(&mut remote)
            .into_iter()
            .filter(|m| matches!(m, NetworkMessage::State { .. }))
            .count();
        assert_eq!(states, 2);
    }

    #[test]
    fn test_client_never_simulates() {
        let (mut client, _remote) = connected(Role::Client);
        client.state.mode = Mode::Playing;
        let before = client.state.clone();
        client.update(Duration::from_secs(2));
        assert_eq!(client.state, before);
    }

    #[test]
    fn test_channel_close_resets_everything_network() {
        let (mut host, mut remote) = connected(Role::Host);
        host.ready.host_ready = true;
        host.steps.remote_input_count = 3;

        remote.close();
        host.pump();

        assert_eq!(host.session.role(), Role::None);
        assert_eq!(host.session.phase(), Phase::Idle);
        assert_eq!(host.session.last_error(), Some("connection closed"));
        assert_eq!(host.ready, ReadyState::default());
        assert_eq!(host.steps.remote_input_count, 0);
    }

    #[test]
    fn test_no_snake_moves_after_the_link_drops() {
        for role in [Role::Host, Role::Client] {
            let (mut p, mut remote) = connected(role);
            if role == Role::Host {
                p.reset_match();
            } else {
                remote.inject(&NetworkMessage::Start.to_text().unwrap());
                p.pump();
            }
            assert_eq!(p.state.mode, Mode::Playing);

            remote.close();
            p.update(Duration::from_millis(1));
            let after_drop = p.state.clone();
            for _ in 0..4 {
                p.update(Duration::from_millis(34));
            }

            assert_eq!(p.session.role(), Role::None);
            assert_eq!(p.state.mode, Mode::Menu);
            assert_eq!(p.state, after_drop);
        }
    }

    #[test]
    fn test_relay_host_rejects_paste_and_keeps_session() {
        let (mut host, _remote) = connected(Role::Host);
        let epoch = host.session.epoch();
        let invite = crate::network::offline::encode_code(
            &crate::network::SessionDescription::new(SignalKind::Offer, "memory-offer:1"),
        )
        .unwrap();

        assert!(matches!(host.paste(&invite), Err(SyncError::InvalidCode(_))));
        assert_eq!(host.session.role(), Role::Host);
        assert!(host.session.is_connected());
        assert_eq!(host.session.epoch(), epoch);
    }

    #[test]
    fn test_full_round_trip_over_memory_relay() {
        let net = MemoryNetwork::new();
        let relay = MemoryRelay::new();
        let mut host = peer(&net, &relay);
        let mut client = peer(&net, &relay);

        host.host_room("room42").unwrap();
        client.join_room(" room42 ").unwrap();
        assert!(client.session.join_in_flight());
        // a second join while in flight changes nothing
        let epoch = client.session.epoch();
        client.join_room("room42").unwrap();
        assert_eq!(client.session.epoch(), epoch);

        pump_until(&mut [&mut host, &mut client], |ps| {
            ps.iter().all(|p| p.session.is_connected())
        });

        client.press_ready();
        pump_until(&mut [&mut host, &mut client], |ps| ps[0].ready.client_ready);
        assert_eq!(host.state.mode, Mode::Menu);

        host.press_ready();
        assert_eq!(host.state.mode, Mode::Playing);
        pump_until(&mut [&mut host, &mut client], |ps| {
            ps[1].state.mode == Mode::Playing
        });
        assert!(!client.ready.host_ready && !client.ready.client_ready);

        client.steer(Direction::UP);
        pump_until(&mut [&mut host, &mut client], |ps| {
            ps[0].steps.remote_input_count == 1
        });

        host.update(Duration::from_millis(105));
        pump_until(&mut [&mut host, &mut client], |ps| {
            ps[1].state.players[1].head() == Cell::new(19, 12)
        });
        assert_eq!(client.state.players[0].head(), Cell::new(7, 13));
    }

    #[test]
    fn test_offline_codes_connect_two_peers() {
        let net = MemoryNetwork::new();
        let relay = MemoryRelay::new();
        let mut host = peer(&net, &relay);
        let mut client = peer(&net, &relay);
        host.settings.invite_base_url = Some("http://play.example/".to_string());

        host.host_offline().unwrap();
        pump_until(&mut [&mut host], |ps| ps[0].invite_link().is_some());
        let link = host.invite_link().unwrap();
        assert!(link.starts_with("http://play.example/#offer="));

        client.paste(&link).unwrap();
        pump_until(&mut [&mut client], |ps| ps[0].answer_code().is_some());
        let answer = client.answer_code().unwrap();

        host.paste(&answer).unwrap();
        pump_until(&mut [&mut host, &mut client], |ps| {
            ps.iter().all(|p| p.session.is_connected())
        });
    }

    #[test]
    fn test_pasting_an_answer_as_invite_is_rejected() {
        let mut p = peer(&MemoryNetwork::new(), &MemoryRelay::new());
        let answer = crate::network::offline::encode_code(
            &crate::network::SessionDescription::new(SignalKind::Answer, "memory-answer:1"),
        )
        .unwrap();
        assert!(matches!(p.paste(&answer), Err(SyncError::InvalidCode(_))));
        assert_eq!(p.session.role(), Role::None);
    }

    #[test]
    fn test_join_timeout_surfaces_error_and_returns_idle() {
        let mut p = peer(&MemoryNetwork::new(), &MemoryRelay::new());
        p.settings.relay_timings.timeout = Duration::from_millis(30);

        p.join_room("nobody-home").unwrap();
        pump_until(&mut [&mut p], |ps| ps[0].session.last_error().is_some());

        assert_eq!(p.session.role(), Role::None);
        assert_eq!(p.session.phase(), Phase::Idle);
        assert!(!p.session.join_in_flight());
        assert_eq!(
            p.session.last_error(),
            Some("Timed out waiting for the host offer")
        );
    }

    #[test]
    fn test_best_never_below_score_over_a_long_game() {
        let mut p = peer(&MemoryNetwork::new(), &MemoryRelay::new());
        p.start_local();
        let turns = [Direction::DOWN, Direction::LEFT, Direction::UP, Direction::RIGHT];
        for i in 0..400 {
            if i % 7 == 0 {
                p.steer(turns[(i / 7) % 4]);
            }
            p.update(Duration::from_millis(34));
            for player in &p.state.players {
                assert!(player.best >= player.score);
            }
            if p.state.mode == Mode::Gameover {
                break;
            }
        }
    }
}
