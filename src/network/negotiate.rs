// Negotiation flows
// Host and client sides of the offer/answer exchange, run off the frame loop.
// Outcomes come back tagged with the session epoch they were started under.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::channel::MessageChannel;
use super::peer::PeerConnector;
use super::signaling::{poll_signal, SignalKind, SignalRelay, SignalTimings};
use crate::error::{Result, SyncError};

/// Result of one negotiation attempt
pub type Outcome = Result<Box<dyn MessageChannel>>;

pub struct TaggedOutcome {
    pub epoch: u64,
    pub outcome: Outcome,
}

/// Marks a join as in flight until dropped.
/// Holds the epoch it was taken for, so a stale guard never clears a newer join.
pub struct JoinGuard {
    flag: Arc<AtomicU64>,
    token: u64,
}

impl JoinGuard {
    pub(crate) fn acquire(flag: &Arc<AtomicU64>, epoch: u64) -> Self {
        let token = epoch + 1;
        flag.store(token, Ordering::Release);
        Self {
            flag: flag.clone(),
            token,
        }
    }
}

impl Drop for JoinGuard {
    fn drop(&mut self) {
        let _ = self
            .flag
            .compare_exchange(self.token, 0, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Everything a background attempt needs to report back
pub struct Ticket {
    pub(crate) epoch: u64,
    pub(crate) tx: mpsc::Sender<TaggedOutcome>,
    pub(crate) join: Option<JoinGuard>,
}

impl Ticket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn finish(self, outcome: Outcome) {
        if let Err(e) = &outcome {
            debug!("Negotiation attempt {} failed: {}", self.epoch, e);
        }
        // A dropped receiver means the session is gone; the channel closes on drop
        let _ = self.tx.send(TaggedOutcome {
            epoch: self.epoch,
            outcome,
        });
        drop(self.join);
    }
}

/// Host side: publish an offer, wait for the answer, apply it
pub async fn host_flow<C, R>(
    mut connector: C,
    relay: &R,
    room: &str,
    timings: SignalTimings,
) -> Outcome
where
    C: PeerConnector,
    R: SignalRelay,
{
    // A leftover answer from an earlier attempt would be applied to the wrong offer
    relay.clear(room, SignalKind::Answer).await?;

    let offer = connector.create_offer().await?;
    relay.put(room, SignalKind::Offer, &offer).await?;
    info!("Offer published to room {}, waiting for answer", room);

    let answer = poll_signal(relay, room, SignalKind::Answer, timings)
        .await
        .map_err(|e| match e {
            SyncError::SignalTimeout { .. } => SyncError::AnswerTimeout,
            other => other,
        })?
        .expect_kind(SignalKind::Answer)?;

    connector.accept_answer(answer)?;
    info!("Answer applied, connecting");
    connector.into_channel()
}

/// Client side: wait for the offer, answer it, publish the answer
pub async fn join_flow<C, R>(
    mut connector: C,
    relay: &R,
    room: &str,
    timings: SignalTimings,
) -> Outcome
where
    C: PeerConnector,
    R: SignalRelay,
{
    let offer = poll_signal(relay, room, SignalKind::Offer, timings)
        .await
        .map_err(|e| match e {
            SyncError::SignalTimeout { .. } => SyncError::OfferTimeout,
            other => other,
        })?
        .expect_kind(SignalKind::Offer)?;
    info!("Offer received from room {}", room);

    let answer = connector.accept_offer(offer).await?;
    relay.put(room, SignalKind::Answer, &answer).await?;
    info!("Answer published to room {}", room);
    connector.into_channel()
}

/// Run a flow on its own thread with a private tokio runtime.
/// The flow is built on that thread, so its future need not be `Send`.
pub fn spawn_negotiation<F, Fut>(ticket: Ticket, make_flow: F) -> Result<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Outcome>,
{
    let builder = thread::Builder::new().name(format!("negotiation-{}", ticket.epoch));
    spawn_on(builder, ticket, make_flow)
}

fn spawn_on<F, Fut>(builder: thread::Builder, ticket: Ticket, make_flow: F) -> Result<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Outcome>,
{
    let epoch = ticket.epoch;
    builder
        .spawn(move || {
            let outcome = match Runtime::new() {
                Ok(rt) => rt.block_on(make_flow()),
                Err(e) => Err(SyncError::Transport(format!(
                    "failed to create tokio runtime: {}",
                    e
                ))),
            };
            ticket.finish(outcome);
        })
        .map(drop)
        .map_err(|e| {
            warn!("Failed to spawn negotiation thread {}: {}", epoch, e);
            SyncError::Transport(format!("failed to spawn negotiation thread: {}", e))
        })
}
