// HTTP client for the room relay

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::peer::SessionDescription;
use super::signaling::{SignalKind, SignalRelay};
use crate::error::{Result, SyncError};

#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: Client,
    base: Url,
}

#[derive(Debug, Deserialize)]
struct GetReply {
    #[serde(default)]
    payload: Option<Value>,
}

impl HttpRelay {
    /// `base_url` is the relay root, e.g. `http://127.0.0.1:4173/signal`
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| SyncError::Transport(format!("invalid relay url {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(SyncError::Transport(format!(
                "invalid relay url {}: not a base url",
                base_url
            )));
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    /// `<base>/room/<room>/<kind>`, with the room id percent-encoded
    fn room_url(&self, room: &str, kind: SignalKind) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("room")
                .push(room)
                .push(kind.as_str());
        }
        url
    }
}

fn check(status: StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(SyncError::Relay {
            status: status.as_u16(),
        })
    }
}

impl SignalRelay for HttpRelay {
    async fn put(&self, room: &str, kind: SignalKind, payload: &SessionDescription) -> Result<()> {
        let res = self
            .client
            .post(self.room_url(room, kind))
            .json(&json!({ "payload": payload }))
            .send()
            .await?;
        check(res.status())
    }

    async fn get(&self, room: &str, kind: SignalKind) -> Result<Option<SessionDescription>> {
        let res = self.client.get(self.room_url(room, kind)).send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            debug!("Relay miss for {} in room {}", kind, room);
            return Ok(None);
        }
        check(res.status())?;

        let reply: GetReply = res.json().await?;
        reply
            .payload
            .filter(|p| !p.is_null())
            .map(|p| {
                serde_json::from_value(p).map_err(|e| SyncError::InvalidDescription(e.to_string()))
            })
            .transpose()
    }

    async fn clear(&self, room: &str, kind: SignalKind) -> Result<()> {
        let res = self.client.delete(self.room_url(room, kind)).send().await?;
        check(res.status())
    }
}
