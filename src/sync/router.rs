// Inbound message handling
// Kinds the local role may not receive are dropped, never acted on

use tracing::{debug, info, warn};

use super::controller::SnakePeer;
use crate::game::Mode;
use crate::network::{ConnectorFactory, NetworkMessage, SignalRelay};

impl<F, R> SnakePeer<F, R>
where
    F: ConnectorFactory,
    R: SignalRelay + Clone + Send + 'static,
{
    pub(crate) fn handle_text(&mut self, text: &str) {
        let msg = match NetworkMessage::from_text(text) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                debug!("Ignoring message of unknown type");
                return;
            }
            Err(e) => {
                warn!("Dropping malformed message: {}", e);
                return;
            }
        };

        let role = self.session.role();
        if !msg.accepted_by(role) {
            debug!("Ignoring {} message while {:?}", msg.kind(), role);
            return;
        }
        self.dispatch(msg);
    }

    fn dispatch(&mut self, msg: NetworkMessage) {
        match msg {
            // ---- host side ----
            NetworkMessage::Input { dir } => {
                if !dir.is_valid() {
                    warn!("Dropping input with invalid direction {:?}", dir);
                    return;
                }
                self.remote_dir = dir;
                self.steps.remote_input_count += 1;
            }
            NetworkMessage::Ready { value } => {
                self.ready.client_ready = value;
                self.sync_ready_to_peer();
                self.try_start_synced_round();
            }
            NetworkMessage::StepRequest => {
                if self.steps.step_mode && self.state.mode == Mode::Playing {
                    self.steps.grant_step();
                }
            }

            // ---- client side ----
            NetworkMessage::Start => {
                self.reset_match();
                info!("Host started the round");
            }
            NetworkMessage::DebugState { step_mode } => {
                self.steps.set_step_mode(step_mode);
            }
            NetworkMessage::ReadyState {
                host_ready,
                client_ready,
            } => {
                self.ready.host_ready = host_ready;
                self.ready.client_ready = client_ready;
            }
            NetworkMessage::State { payload } => {
                if let Err(e) = payload.apply_to(&mut self.state) {
                    warn!("Dropping bad snapshot: {}", e);
                }
            }
        }
    }
}
