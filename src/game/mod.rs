pub mod clock;
pub mod input;
pub mod state;
pub mod tick;

pub use clock::{advance, StepControl};
pub use input::{can_request_step, can_toggle_step_mode, controlled_player, InputAction};
pub use state::{
    Cell, ControlKind, DeathReason, Direction, MatchState, Mode, Player, PlayerId, Rules, Winner,
};
pub use tick::{try_set_direction, TickEvents};
