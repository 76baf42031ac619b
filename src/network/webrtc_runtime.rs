// WebRTC transport using str0m's Sans-I/O implementation
// Negotiation happens through a Str0mConnector; once both descriptions are
// applied the Rtc moves to its own thread, which owns the UDP socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use tracing::{debug, error, info, warn};

use str0m::change::{SdpAnswer, SdpOffer, SdpPendingOffer};
use str0m::channel::{ChannelConfig, ChannelId, Reliability};
use str0m::net::{Protocol, Receive};
use str0m::{Candidate, Event, IceConnectionState, Input, Output, Rtc};

use super::channel::{ChannelEvent, MessageChannel};
use super::peer::{
    require_state, ConnectorFactory, NegotiationState, PeerConnector, SessionDescription,
};
use super::signaling::SignalKind;
use crate::error::{Result, SyncError};

/// Socket read timeout; bounds how long queued sends wait
const POLL_SLICE: Duration = Duration::from_millis(10);

const STUN_TIMEOUT: Duration = Duration::from_secs(5);

fn transport_err(e: impl std::fmt::Display) -> SyncError {
    SyncError::Transport(e.to_string())
}

/// Builds connectors that share STUN server and channel label settings
#[derive(Debug, Clone)]
pub struct Str0mFactory {
    pub stun_server: String,
    pub channel_label: String,
}

impl ConnectorFactory for Str0mFactory {
    type Connector = Str0mConnector;

    fn connector(&self) -> Str0mConnector {
        Str0mConnector::new(&self.stun_server, &self.channel_label)
    }
}

pub struct Str0mConnector {
    rtc: Rtc,
    socket: Option<UdpSocket>,
    state: NegotiationState,
    pending: Option<SdpPendingOffer>,
    channel_id: Option<ChannelId>,
    stun_server: String,
    label: String,
}

impl Str0mConnector {
    pub fn new(stun_server: &str, label: &str) -> Self {
        let rtc = Rtc::builder()
            .set_rtp_mode(false) // data channels only
            .build();
        Self {
            rtc,
            socket: None,
            state: NegotiationState::Stable,
            pending: None,
            channel_id: None,
            stun_server: stun_server.to_string(),
            label: label.to_string(),
        }
    }

    /// Bind the socket and register host + server-reflexive candidates.
    /// Runs once; descriptions created afterwards embed every candidate.
    async fn gather(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        let local_ip = discover_local_ip().unwrap_or_else(|e| {
            warn!("Local IP discovery failed ({}), using loopback", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });

        // Bind to the specific IP so local_addr() matches the host candidate
        let socket = UdpSocket::bind(SocketAddr::new(local_ip, 0)).map_err(transport_err)?;
        socket.set_nonblocking(false).map_err(transport_err)?;
        let host_addr = socket.local_addr().map_err(transport_err)?;

        let host = Candidate::host(host_addr, "udp").map_err(transport_err)?;
        self.rtc
            .add_local_candidate(host)
            .ok_or_else(|| transport_err("host candidate rejected"))?;
        info!("Host candidate: {}", host_addr);

        match query_stun_server(&socket, &self.stun_server).await {
            Ok(public_addr) => match Candidate::server_reflexive(public_addr, host_addr, "udp") {
                Ok(srflx) => {
                    if self.rtc.add_local_candidate(srflx).is_some() {
                        info!("Server reflexive candidate: {}", public_addr);
                    } else {
                        warn!("Server reflexive candidate rejected");
                    }
                }
                Err(e) => warn!("Failed to create server reflexive candidate: {}", e),
            },
            // Host candidate alone still works on a LAN
            Err(e) => warn!("STUN query failed: {:#}", e),
        }

        self.socket = Some(socket);
        Ok(())
    }
}

impl PeerConnector for Str0mConnector {
    fn negotiation_state(&self) -> NegotiationState {
        self.state
    }

    async fn create_offer(&mut self) -> Result<SessionDescription> {
        require_state(self.state, NegotiationState::Stable)?;
        self.gather().await?;

        let mut change = self.rtc.sdp_api();
        let channel_id = change.add_channel_with_config(ChannelConfig {
            label: self.label.clone(),
            ordered: true,
            reliability: Reliability::Reliable,
            negotiated: None,
            protocol: String::new(),
        });
        let (offer, pending) = change
            .apply()
            .ok_or_else(|| transport_err("no SDP changes to apply"))?;

        let sdp = offer.to_sdp_string();
        debug!(
            "Offer created with {} candidates",
            sdp.lines().filter(|l| l.starts_with("a=candidate:")).count()
        );

        self.channel_id = Some(channel_id);
        self.pending = Some(pending);
        self.state = NegotiationState::HaveLocalOffer;
        Ok(SessionDescription::new(SignalKind::Offer, sdp))
    }

    async fn accept_offer(&mut self, offer: SessionDescription) -> Result<SessionDescription> {
        require_state(self.state, NegotiationState::Stable)?;
        let offer = offer.expect_kind(SignalKind::Offer)?;
        self.gather().await?;

        let offer = SdpOffer::from_sdp_string(&offer.sdp)
            .map_err(|e| SyncError::InvalidDescription(e.to_string()))?;
        let answer = self
            .rtc
            .sdp_api()
            .accept_offer(offer)
            .map_err(transport_err)?;

        let sdp = answer.to_sdp_string();
        debug!(
            "Answer created with {} candidates",
            sdp.lines().filter(|l| l.starts_with("a=candidate:")).count()
        );
        Ok(SessionDescription::new(SignalKind::Answer, sdp))
    }

    fn accept_answer(&mut self, answer: SessionDescription) -> Result<()> {
        require_state(self.state, NegotiationState::HaveLocalOffer)?;
        let answer = answer.expect_kind(SignalKind::Answer)?;
        let pending = self.pending.take().ok_or(SyncError::NegotiationState {
            expected: NegotiationState::HaveLocalOffer,
            found: self.state,
        })?;

        let answer = SdpAnswer::from_sdp_string(&answer.sdp)
            .map_err(|e| SyncError::InvalidDescription(e.to_string()))?;
        self.rtc
            .sdp_api()
            .accept_answer(pending, answer)
            .map_err(transport_err)?;

        self.state = NegotiationState::Stable;
        Ok(())
    }

    fn into_channel(mut self) -> Result<Box<dyn MessageChannel>> {
        require_state(self.state, NegotiationState::Stable)?;
        let socket = self
            .socket
            .take()
            .ok_or_else(|| transport_err("connector never gathered candidates"))?;
        let channel = Str0mChannel::spawn(self.rtc, socket, self.channel_id, self.label)?;
        Ok(Box::new(channel))
    }
}

/// Pick the interface most likely to reach a peer on the same network.
/// Home networks first, then corporate ranges, then VPN-style 10.x, then anything else.
fn discover_local_ip() -> anyhow::Result<IpAddr> {
    let interfaces = if_addrs::get_if_addrs().context("failed to list network interfaces")?;

    let mut candidates: Vec<(String, Ipv4Addr)> = interfaces
        .into_iter()
        .filter_map(|iface| match iface.addr.ip() {
            IpAddr::V4(ip) if !ip.is_loopback() => Some((iface.name, ip)),
            _ => None,
        })
        .collect();

    candidates.sort_by_key(|(_, ip)| {
        let o = ip.octets();
        match o {
            [192, 168, ..] => 0,
            [172, b, ..] if (16..=31).contains(&b) => 1,
            [10, ..] => 2,
            _ => 3,
        }
    });

    let (name, ip) = candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no IPv4 interface besides loopback"))?;
    debug!("Selected interface {} ({})", name, ip);
    Ok(IpAddr::V4(ip))
}

/// Learn our public address with a binding request sent from the ICE socket itself,
/// so the NAT mapping it reports is the one peers will see
async fn query_stun_server(socket: &UdpSocket, stun_server: &str) -> anyhow::Result<SocketAddr> {
    let stun_addr = tokio::net::lookup_host(stun_server)
        .await?
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| anyhow!("STUN server {} has no IPv4 address", stun_server))?;
    debug!("STUN server {} resolved to {}", stun_server, stun_addr);

    let socket = socket.try_clone()?;
    let client = stunclient::StunClient::new(stun_addr);
    let public_addr = tokio::task::spawn_blocking(move || -> anyhow::Result<SocketAddr> {
        socket.set_read_timeout(Some(STUN_TIMEOUT))?;
        let addr = client
            .query_external_address(&socket)
            .map_err(|e| anyhow!("STUN query failed: {}", e))?;
        socket.set_read_timeout(None)?;
        Ok(addr)
    })
    .await??;

    Ok(public_addr)
}

enum ChannelCommand {
    Send(String),
    Close,
}

/// Handle to a data channel driven by the str0m I/O thread
pub struct Str0mChannel {
    cmd_tx: mpsc::Sender<ChannelCommand>,
    event_rx: mpsc::Receiver<ChannelEvent>,
    open: Arc<AtomicBool>,
    closed: bool,
}

impl Str0mChannel {
    fn spawn(
        rtc: Rtc,
        socket: UdpSocket,
        channel_id: Option<ChannelId>,
        label: String,
    ) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let open = Arc::new(AtomicBool::new(false));

        let loop_open = open.clone();
        thread::Builder::new()
            .name("str0m-io".to_string())
            .spawn(move || {
                let io = Str0mIo {
                    rtc,
                    socket,
                    channel_id,
                    label,
                    event_tx,
                    open: loop_open,
                };
                io.run(cmd_rx);
            })
            .map_err(transport_err)?;

        Ok(Self {
            cmd_tx,
            event_rx,
            open,
            closed: false,
        })
    }
}

impl MessageChannel for Str0mChannel {
    fn is_open(&self) -> bool {
        !self.closed && self.open.load(Ordering::Acquire)
    }

    fn send(&mut self, text: &str) {
        if self.is_open() {
            let _ = self.cmd_tx.send(ChannelCommand::Send(text.to_string()));
        }
    }

    fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.event_rx.try_recv().ok()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.open.store(false, Ordering::Release);
        let _ = self.cmd_tx.send(ChannelCommand::Close);
    }
}

impl Drop for Str0mChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// State owned by the I/O thread
struct Str0mIo {
    rtc: Rtc,
    socket: UdpSocket,
    /// Known up front on the offering side, learned from ChannelOpen otherwise
    channel_id: Option<ChannelId>,
    label: String,
    event_tx: mpsc::Sender<ChannelEvent>,
    open: Arc<AtomicBool>,
}

impl Str0mIo {
    fn run(mut self, cmd_rx: mpsc::Receiver<ChannelCommand>) {
        info!("Starting WebRTC polling loop");
        match self.poll_loop(&cmd_rx) {
            Ok(()) => debug!("WebRTC polling loop finished"),
            Err(e) => {
                error!("WebRTC polling loop failed: {:#}", e);
                let _ = self.event_tx.send(ChannelEvent::Error(e.to_string()));
            }
        }
        self.open.store(false, Ordering::Release);
        self.rtc.disconnect();
    }

    fn poll_loop(&mut self, cmd_rx: &mpsc::Receiver<ChannelCommand>) -> anyhow::Result<()> {
        let mut buf = vec![0u8; 8192];
        // str0m must be told when its own deadline passes, separate from the socket timeout
        let mut deadline: Option<Instant> = None;

        loop {
            if !self.rtc.is_alive() {
                let _ = self.event_tx.send(ChannelEvent::Closed);
                return Ok(());
            }

            // Drain outputs
            loop {
                match self.rtc.poll_output()? {
                    Output::Transmit(transmit) => {
                        if let Err(e) = self.socket.send_to(&transmit.contents, transmit.destination)
                        {
                            warn!("Failed to send UDP packet to {}: {}", transmit.destination, e);
                        }
                    }
                    Output::Timeout(at) => {
                        deadline = Some(at);
                        self.socket.set_read_timeout(Some(POLL_SLICE))?;
                        break;
                    }
                    Output::Event(event) => {
                        if !self.handle_event(event) {
                            return Ok(());
                        }
                    }
                }
            }

            // Wait for input or the slice to pass
            match self.socket.recv_from(&mut buf) {
                Ok((n, source)) => {
                    let receive = Receive {
                        proto: Protocol::Udp,
                        source,
                        destination: self.socket.local_addr()?,
                        contents: buf[..n].try_into()?,
                    };
                    self.rtc.handle_input(Input::Receive(Instant::now(), receive))?;
                    deadline = None;
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    let now = Instant::now();
                    if deadline.map_or(true, |at| now >= at) {
                        self.rtc.handle_input(Input::Timeout(now))?;
                        deadline = None;
                    }
                }
                Err(e) => return Err(e.into()),
            }

            // Commands from the session
            loop {
                match cmd_rx.try_recv() {
                    Ok(ChannelCommand::Send(text)) => self.write(&text),
                    Ok(ChannelCommand::Close) | Err(mpsc::TryRecvError::Disconnected) => {
                        debug!("Channel closed locally");
                        return Ok(());
                    }
                    Err(mpsc::TryRecvError::Empty) => break,
                }
            }
        }
    }

    fn write(&mut self, text: &str) {
        let Some(cid) = self.channel_id else {
            return;
        };
        if let Some(mut channel) = self.rtc.channel(cid) {
            if let Err(e) = channel.write(false, text.as_bytes()) {
                warn!("Failed to write to data channel: {}", e);
            }
        }
    }

    /// Returns false once the channel is gone
    fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Connected => {
                info!("WebRTC connection established (ICE + DTLS)");
                true
            }
            Event::IceConnectionStateChange(state) => {
                debug!("ICE state: {:?}", state);
                if matches!(state, IceConnectionState::Disconnected) {
                    info!("ICE connection lost");
                    let _ = self.event_tx.send(ChannelEvent::Closed);
                    return false;
                }
                true
            }
            Event::ChannelOpen(cid, label) => {
                if label != self.label {
                    warn!("Ignoring unexpected data channel {:?}", label);
                    return true;
                }
                info!("Data channel {} open", label);
                self.channel_id = Some(cid);
                self.open.store(true, Ordering::Release);
                let _ = self.event_tx.send(ChannelEvent::Open);
                true
            }
            Event::ChannelData(data) => {
                if Some(data.id) != self.channel_id {
                    return true;
                }
                match String::from_utf8(data.data) {
                    Ok(text) => {
                        let _ = self.event_tx.send(ChannelEvent::Message(text));
                    }
                    Err(_) => warn!("Dropping non-UTF-8 data channel message"),
                }
                true
            }
            Event::ChannelClose(cid) => {
                if Some(cid) != self.channel_id {
                    return true;
                }
                info!("Data channel closed by peer");
                let _ = self.event_tx.send(ChannelEvent::Closed);
                false
            }
            _ => true,
        }
    }
}
