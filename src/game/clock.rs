use std::time::Duration;

use rand::Rng;

use super::state::{MatchState, Mode, Rules};
use super::tick::{step_round, TickEvents};

/// Step-mode bookkeeping. The host declares step mode, the client mirrors it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepControl {
    pub step_mode: bool,
    /// Host-authorised ticks not yet executed
    pub pending_steps: u32,
    /// Remote inputs received so far (diagnostic)
    pub remote_input_count: u64,
}

impl StepControl {
    /// Switching mode in either direction forgets queued steps
    pub fn set_step_mode(&mut self, enabled: bool) {
        self.step_mode = enabled;
        self.pending_steps = 0;
    }

    /// Peers drive this, so it saturates instead of overflowing
    pub fn grant_step(&mut self) {
        self.pending_steps = self.pending_steps.saturating_add(1);
    }
}

/// Advance the authoritative simulation by `dt` of real time.
///
/// Continuous mode banks `dt` and runs every whole tick owed, stopping early
/// when a tick ends the round. Step mode ignores `dt` and runs at most one
/// tick per call, consuming one pending step.
pub fn advance<R: Rng>(
    state: &mut MatchState,
    rules: &Rules,
    steps: &mut StepControl,
    rng: &mut R,
    dt: Duration,
) -> TickEvents {
    let mut events = TickEvents::default();
    if state.mode != Mode::Playing {
        return events;
    }

    if steps.step_mode {
        if steps.pending_steps > 0 {
            steps.pending_steps -= 1;
            events = step_round(state, rules, rng);
        }
        return events;
    }

    state.elapsed += dt;
    while state.elapsed >= rules.step {
        state.elapsed -= rules.step;
        events.merge(step_round(state, rules, rng));
        if state.mode != Mode::Playing {
            break;
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Cell;
    use crate::network::Role;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (MatchState, Rules, StepControl, StdRng) {
        let rules = Rules::default();
        let mut state = MatchState::new(&rules, Role::Host);
        state.reset(&rules, Role::Host);
        (state, rules, StepControl::default(), StdRng::seed_from_u64(11))
    }

    #[test]
    fn test_continuous_mode_banks_partial_ticks() {
        let (mut state, rules, mut steps, mut rng) = setup();

        advance(&mut state, &rules, &mut steps, &mut rng, Duration::from_millis(100));
        assert_eq!(state.players[0].head(), Cell::new(6, 13));

        advance(&mut state, &rules, &mut steps, &mut rng, Duration::from_millis(10));
        assert_eq!(state.players[0].head(), Cell::new(7, 13));
        assert_eq!(state.elapsed, Duration::from_millis(5));
    }

    #[test]
    fn test_continuous_mode_runs_every_owed_tick() {
        let (mut state, rules, mut steps, mut rng) = setup();

        advance(&mut state, &rules, &mut steps, &mut rng, Duration::from_millis(315));

        assert_eq!(state.players[0].head(), Cell::new(9, 13));
        assert_eq!(state.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_step_mode_consumes_one_pending_step() {
        let (mut state, rules, mut steps, mut rng) = setup();
        steps.set_step_mode(true);

        advance(&mut state, &rules, &mut steps, &mut rng, Duration::from_secs(5));
        assert_eq!(state.players[0].head(), Cell::new(6, 13));

        steps.grant_step();
        steps.grant_step();
        advance(&mut state, &rules, &mut steps, &mut rng, Duration::ZERO);
        assert_eq!(state.players[0].head(), Cell::new(7, 13));
        assert_eq!(steps.pending_steps, 1);
        assert_eq!(state.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_toggling_step_mode_clears_pending() {
        let mut steps = StepControl::default();
        steps.set_step_mode(true);
        steps.grant_step();
        steps.set_step_mode(false);
        assert_eq!(steps.pending_steps, 0);
        assert!(!steps.step_mode);
    }

    #[test]
    fn test_no_ticks_outside_play() {
        let rules = Rules::default();
        let mut state = MatchState::new(&rules, Role::Host);
        let mut steps = StepControl::default();
        let mut rng = StdRng::seed_from_u64(1);

        advance(&mut state, &rules, &mut steps, &mut rng, Duration::from_secs(1));

        assert_eq!(state.mode, Mode::Menu);
        assert_eq!(state.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_granted_steps_saturate() {
        let mut steps = StepControl {
            step_mode: true,
            pending_steps: u32::MAX - 1,
            remote_input_count: 0,
        };
        steps.grant_step();
        steps.grant_step();
        assert_eq!(steps.pending_steps, u32::MAX);
    }
}
