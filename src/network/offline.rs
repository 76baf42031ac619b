// Offline signaling
// Session descriptions travel as copy/paste codes instead of through a relay

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::info;

use super::peer::SessionDescription;
use super::signaling::{SignalKind, SignalRelay};
use crate::error::{Result, SyncError};

const OFFER_FRAGMENT: &str = "#offer=";

/// Pseudo-room used when no relay is involved
pub const OFFLINE_ROOM: &str = "offline";

pub fn encode_code(desc: &SessionDescription) -> Result<String> {
    let json =
        serde_json::to_vec(desc).map_err(|e| SyncError::InvalidDescription(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

pub fn decode_code(code: &str) -> Result<SessionDescription> {
    let bytes = URL_SAFE_NO_PAD
        .decode(code.trim())
        .map_err(|e| SyncError::InvalidCode(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| SyncError::InvalidCode(e.to_string()))
}

pub fn invite_link(base_url: &str, code: &str) -> String {
    format!("{}{}{}", base_url.trim_end_matches('#'), OFFER_FRAGMENT, code)
}

/// Accept either a bare offer code or a full invite link
pub fn extract_offer_code(input: &str) -> Option<String> {
    let input = input.trim();
    let code = match input.find(OFFER_FRAGMENT) {
        Some(at) => {
            let rest = &input[at + OFFER_FRAGMENT.len()..];
            rest.split('&').next().unwrap_or_default()
        }
        None => input,
    };
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

#[derive(Debug, Default)]
struct ManualSlots {
    published: HashMap<SignalKind, String>,
    pasted: HashMap<SignalKind, SessionDescription>,
}

/// Relay whose far side is a human: `put` publishes a code to show,
/// `get` returns whatever code was pasted for that kind
#[derive(Debug, Clone, Default)]
pub struct ManualRelay {
    slots: Arc<Mutex<ManualSlots>>,
}

impl ManualRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slots<T>(&self, f: impl FnOnce(&mut ManualSlots) -> T) -> Result<T> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| SyncError::Transport("manual relay lock poisoned".to_string()))?;
        Ok(f(&mut slots))
    }

    /// The code this side published for `kind`, to be handed to the other peer
    pub fn published(&self, kind: SignalKind) -> Option<String> {
        self.with_slots(|s| s.published.get(&kind).cloned())
            .ok()
            .flatten()
    }

    /// Decode a code from the other peer and make it available to `get`
    pub fn paste(&self, code: &str) -> Result<SignalKind> {
        let desc = decode_code(code)?;
        let kind = desc.kind;
        self.with_slots(|s| s.pasted.insert(kind, desc))?;
        info!("Pasted {} code accepted", kind);
        Ok(kind)
    }
}

impl SignalRelay for ManualRelay {
    async fn put(&self, _room: &str, kind: SignalKind, payload: &SessionDescription) -> Result<()> {
        let code = encode_code(payload)?;
        info!("{} code ready ({} chars)", kind, code.len());
        self.with_slots(|s| s.published.insert(kind, code))?;
        Ok(())
    }

    async fn get(&self, _room: &str, kind: SignalKind) -> Result<Option<SessionDescription>> {
        self.with_slots(|s| s.pasted.get(&kind).cloned())
    }

    async fn clear(&self, _room: &str, kind: SignalKind) -> Result<()> {
        self.with_slots(|s| {
            s.pasted.remove(&kind);
            s.published.remove(&kind);
        })
    }
}
