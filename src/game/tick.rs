use std::collections::HashSet;

use rand::Rng;

use super::state::{Cell, DeathReason, Direction, MatchState, Mode, Player, PlayerId, Rules, Winner};

/// What happened during one tick, for logging and sync decisions
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TickEvents {
    pub food_eaten: bool,
    pub deaths: u8,
    pub round_over: bool,
}

impl TickEvents {
    pub fn any(&self) -> bool {
        self.food_eaten || self.deaths > 0 || self.round_over
    }

    pub(crate) fn merge(&mut self, other: TickEvents) {
        self.food_eaten |= other.food_eaten;
        self.deaths += other.deaths;
        self.round_over |= other.round_over;
    }
}

/// Queue a direction for the next tick.
/// A request that exactly reverses the active direction is discarded here,
/// never at tick time. Returns whether the request was queued.
pub fn try_set_direction(player: &mut Player, mode: Mode, dir: Direction) -> bool {
    if !player.alive || mode != Mode::Playing {
        return false;
    }
    if player.direction == -dir {
        return false;
    }
    player.queued_direction = dir;
    true
}

/// Per-player plan for the tick being computed
#[derive(Debug, Clone, Copy)]
struct Plan {
    moving: bool,
    next_head: Cell,
    eats: bool,
}

/// Advance the round by one tick, all living players simultaneously
pub fn step_round<R: Rng>(state: &mut MatchState, rules: &Rules, rng: &mut R) -> TickEvents {
    let mut events = TickEvents::default();
    let alive: Vec<usize> = (0..state.players.len())
        .filter(|&i| state.players[i].alive)
        .collect();

    if alive.is_empty() {
        end_round(state);
        events.round_over = true;
        return events;
    }

    let food = state.food;
    let mut plans: [Option<Plan>; 2] = [None, None];
    for &i in &alive {
        let player = &mut state.players[i];
        player.direction = player.queued_direction;
        let moving = !player.direction.is_zero();
        let next_head = if moving {
            player.head().offset(player.direction)
        } else {
            player.head()
        };
        plans[i] = Some(Plan {
            moving,
            next_head,
            eats: moving && next_head == food,
        });
    }

    let mut deaths: [Option<DeathReason>; 2] = [None, None];
    for &i in &alive {
        if let Some(plan) = plans[i] {
            if plan.moving && !plan.next_head.in_bounds(rules.grid) {
                deaths[i] = Some(DeathReason::Wall);
            }
        }
    }

    let occupied = occupied_cells(&state.players, &plans);
    for &i in &alive {
        if let Some(plan) = plans[i] {
            if plan.moving && deaths[i].is_none() && occupied.contains(&plan.next_head) {
                deaths[i] = Some(DeathReason::Body);
            }
        }
    }

    if let [a, b] = alive[..] {
        if let (Some(pa), Some(pb)) = (plans[a], plans[b]) {
            if pa.moving && pb.moving {
                let same_cell = pa.next_head == pb.next_head;
                let swap = pa.next_head == state.players[b].head()
                    && pb.next_head == state.players[a].head();
                if same_cell || swap {
                    deaths[a] = Some(DeathReason::Head);
                    deaths[b] = Some(DeathReason::Head);
                }
            }
        }
    }

    for &i in &alive {
        let player = &mut state.players[i];
        if let Some(reason) = deaths[i] {
            player.kill(reason);
            events.deaths += 1;
            continue;
        }
        let Some(plan) = plans[i] else { continue };
        if !plan.moving {
            continue;
        }
        player.snake.push_front(plan.next_head);
        if plan.eats {
            player.score += 1;
            player.best = player.best.max(player.score);
            events.food_eaten = true;
        } else {
            player.snake.pop_back();
        }
    }

    if events.food_eaten {
        place_food(state, rules, rng);
    }

    if state.players.iter().any(|p| !p.alive) {
        end_round(state);
        events.round_over = true;
    }

    events
}

/// Run `step_round` repeatedly, stopping as soon as the round ends
pub fn step_rounds<R: Rng>(
    state: &mut MatchState,
    rules: &Rules,
    rng: &mut R,
    count: u32,
) -> TickEvents {
    let mut events = TickEvents::default();
    for _ in 0..count {
        events.merge(step_round(state, rules, rng));
        if state.mode != Mode::Playing {
            break;
        }
    }
    events
}

/// Cells a moving head may not enter: every living body, minus each tail
/// that will move away this tick (a tail stays only when its snake eats)
fn occupied_cells(players: &[Player; 2], plans: &[Option<Plan>; 2]) -> HashSet<Cell> {
    let mut cells = HashSet::new();
    for (player, plan) in players.iter().zip(plans) {
        if !player.alive {
            continue;
        }
        let keeps_tail = plan.map(|p| p.eats).unwrap_or(false);
        let limit = if keeps_tail {
            player.snake.len()
        } else {
            player.snake.len() - 1
        };
        cells.extend(player.snake.iter().take(limit).copied());
    }
    cells
}

/// Uniformly random free cell, with bounded retries.
/// After `food_placement_attempts` misses the last candidate is kept even if a
/// snake covers it; on a packed grid this trades exactness for a fixed cost.
pub fn place_food<R: Rng>(state: &mut MatchState, rules: &Rules, rng: &mut R) {
    let mut cell = random_cell(rules.grid, rng);
    let mut tries = 0;
    while state.is_occupied(cell) && tries < rules.food_placement_attempts {
        cell = random_cell(rules.grid, rng);
        tries += 1;
    }
    state.food = cell;
}

fn random_cell<R: Rng>(grid: i32, rng: &mut R) -> Cell {
    Cell::new(rng.gen_range(0..grid), rng.gen_range(0..grid))
}

/// Sole survivor wins, otherwise the higher score, otherwise a draw
pub fn end_round(state: &mut MatchState) {
    let p1 = state.player(PlayerId::P1);
    let p2 = state.player(PlayerId::P2);
    let winner = if p1.alive && !p2.alive {
        Winner::P1
    } else if p2.alive && !p1.alive {
        Winner::P2
    } else if p1.score > p2.score {
        Winner::P1
    } else if p2.score > p1.score {
        Winner::P2
    } else {
        Winner::Draw
    };
    state.winner = Some(winner);
    state.mode = Mode::Gameover;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Role;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn playing(role: Role) -> (MatchState, Rules, StdRng) {
        let rules = Rules::default();
        let mut state = MatchState::new(&rules, role);
        state.reset(&rules, role);
        (state, rules, StdRng::seed_from_u64(7))
    }

    fn set_snake(player: &mut Player, cells: &[(i32, i32)], dir: Direction) {
        player.snake = cells.iter().map(|&(x, y)| Cell::new(x, y)).collect();
        player.direction = dir;
        player.queued_direction = dir;
    }

    fn assert_best_holds(state: &MatchState) {
        for p in &state.players {
            assert!(p.best >= p.score, "{:?} best {} < score {}", p.id, p.best, p.score);
        }
    }

    #[test]
    fn test_reversal_is_rejected_at_input_time() {
        let (mut state, _, _) = playing(Role::Host);
        let mode = state.mode;
        let p1 = state.player_mut(PlayerId::P1);
        assert_eq!(p1.direction, Direction::RIGHT);

        assert!(!try_set_direction(p1, mode, Direction::LEFT));
        assert_eq!(p1.queued_direction, Direction::RIGHT);

        assert!(try_set_direction(p1, mode, Direction::UP));
        assert_eq!(p1.queued_direction, Direction::UP);
    }

    #[test]
    fn test_direction_ignored_outside_play() {
        let rules = Rules::default();
        let mut state = MatchState::new(&rules, Role::Host);
        let p1 = &mut state.players[0];
        assert!(!try_set_direction(p1, Mode::Menu, Direction::UP));
        assert_eq!(p1.queued_direction, Direction::RIGHT);
    }

    #[test]
    fn test_plain_move_drops_tail() {
        let (mut state, rules, mut rng) = playing(Role::Host);
        let events = step_round(&mut state, &rules, &mut rng);

        assert!(!events.any());
        let p1 = state.player(PlayerId::P1);
        assert_eq!(p1.head(), Cell::new(7, 13));
        assert_eq!(p1.snake.len(), 3);
        assert_eq!(*p1.snake.back().unwrap(), Cell::new(5, 13));
        assert_eq!(state.mode, Mode::Playing);
    }

    #[test]
    fn test_zero_direction_does_not_move() {
        let (mut state, rules, mut rng) = playing(Role::None);
        let before = state.player(PlayerId::P2).snake.clone();
        step_round(&mut state, &rules, &mut rng);
        assert_eq!(state.player(PlayerId::P2).snake, before);
        assert!(state.player(PlayerId::P2).alive);
    }

    #[test]
    fn test_wall_death_ends_round_with_survivor_winning() {
        let (mut state, rules, mut rng) = playing(Role::Host);
        set_snake(&mut state.players[0], &[(25, 2), (24, 2), (23, 2)], Direction::RIGHT);

        let events = step_round(&mut state, &rules, &mut rng);

        assert_eq!(events.deaths, 1);
        assert!(events.round_over);
        assert_eq!(state.players[0].reason, Some(DeathReason::Wall));
        assert!(state.players[1].alive);
        assert_eq!(state.mode, Mode::Gameover);
        assert_eq!(state.winner, Some(Winner::P2));
    }

    #[test]
    fn test_body_collision_with_other_snake() {
        let (mut state, rules, mut rng) = playing(Role::Host);
        set_snake(&mut state.players[0], &[(10, 4), (9, 4), (8, 4)], Direction::RIGHT);
        set_snake(&mut state.players[1], &[(12, 5), (11, 5), (11, 4), (11, 3)], Direction::DOWN);

        step_round(&mut state, &rules, &mut rng);

        assert_eq!(state.players[0].reason, Some(DeathReason::Body));
        assert!(state.players[1].alive);
        assert_eq!(state.winner, Some(Winner::P2));
    }

    #[test]
    fn test_moving_into_own_vacating_tail_is_safe() {
        let (mut state, rules, mut rng) = playing(Role::None);
        // Square loop: head at (5,5) turning into its tail at (5,6)
        set_snake(&mut state.players[0], &[(5, 5), (6, 5), (6, 6), (5, 6)], Direction::DOWN);

        step_round(&mut state, &rules, &mut rng);

        assert!(state.players[0].alive);
        assert_eq!(state.players[0].head(), Cell::new(5, 6));
    }

    #[test]
    fn test_tail_is_solid_when_its_snake_eats() {
        let (mut state, rules, mut rng) = playing(Role::Host);
        // p2 eats at (8,8) so its tail (10,9) stays put; p1 heads into it
        set_snake(&mut state.players[1], &[(9, 8), (10, 8), (10, 9)], Direction::LEFT);
        set_snake(&mut state.players[0], &[(10, 10), (10, 11), (10, 12)], Direction::UP);
        state.food = Cell::new(8, 8);

        step_round(&mut state, &rules, &mut rng);

        assert_eq!(state.players[0].reason, Some(DeathReason::Body));
        assert!(state.players[1].alive);
        assert_eq!(state.players[1].score, 1);
    }

    #[test]
    fn test_head_on_same_cell_kills_both() {
        let (mut state, rules, mut rng) = playing(Role::Host);
        set_snake(&mut state.players[0], &[(10, 3), (9, 3)], Direction::RIGHT);
        set_snake(&mut state.players[1], &[(12, 3), (13, 3)], Direction::LEFT);

        step_round(&mut state, &rules, &mut rng);

        assert_eq!(state.players[0].reason, Some(DeathReason::Head));
        assert_eq!(state.players[1].reason, Some(DeathReason::Head));
        assert_eq!(state.winner, Some(Winner::Draw));
    }

    #[test]
    fn test_head_swap_kills_both() {
        let (mut state, rules, mut rng) = playing(Role::Host);
        set_snake(&mut state.players[0], &[(10, 3), (9, 3)], Direction::RIGHT);
        set_snake(&mut state.players[1], &[(11, 3), (12, 3)], Direction::LEFT);

        step_round(&mut state, &rules, &mut rng);

        assert!(!state.players[0].alive && !state.players[1].alive);
        assert_eq!(state.players[0].reason, Some(DeathReason::Head));
        assert_eq!(state.players[1].reason, Some(DeathReason::Head));
    }

    #[test]
    fn test_head_on_tie_breaks_by_score() {
        let (mut state, rules, mut rng) = playing(Role::Host);
        set_snake(&mut state.players[0], &[(10, 3), (9, 3)], Direction::RIGHT);
        set_snake(&mut state.players[1], &[(12, 3), (13, 3)], Direction::LEFT);
        state.players[1].score = 2;
        state.players[1].best = 2;

        step_round(&mut state, &rules, &mut rng);

        assert_eq!(state.winner, Some(Winner::P2));
        assert_best_holds(&state);
    }

    #[test]
    fn test_default_opponents_collide_head_on() {
        // Both start on row 13 facing each other; heads swap on the seventh tick
        let (mut state, rules, mut rng) = playing(Role::Host);
        state.food = Cell::new(0, 0);

        let events = step_rounds(&mut state, &rules, &mut rng, 20);

        assert!(events.round_over);
        assert_eq!(state.players[0].reason, Some(DeathReason::Head));
        assert_eq!(state.players[1].reason, Some(DeathReason::Head));
        assert_eq!(state.winner, Some(Winner::Draw));
        assert_best_holds(&state);
    }

    #[test]
    fn test_default_opponents_winner_follows_score() {
        // p1 eats on the way; wherever the food lands next, the head-on
        // result is a draw only when the scores are level
        let (mut state, rules, mut rng) = playing(Role::Host);
        state.food = Cell::new(8, 13);

        step_rounds(&mut state, &rules, &mut rng, 20);

        let (p1, p2) = (&state.players[0], &state.players[1]);
        assert_eq!(state.mode, Mode::Gameover);
        assert_eq!(p1.reason, Some(DeathReason::Head));
        assert_eq!(p2.reason, Some(DeathReason::Head));
        assert!(p1.score >= 1);
        let expected = if p1.score > p2.score {
            Winner::P1
        } else if p2.score > p1.score {
            Winner::P2
        } else {
            Winner::Draw
        };
        assert_eq!(state.winner, Some(expected));
        assert_best_holds(&state);
    }

    #[test]
    fn test_eating_grows_and_relocates_food() {
        let (mut state, rules, mut rng) = playing(Role::Host);
        state.food = Cell::new(7, 13);
        let tail_before = *state.players[0].snake.back().unwrap();

        let events = step_round(&mut state, &rules, &mut rng);

        let p1 = &state.players[0];
        assert!(events.food_eaten);
        assert_eq!(p1.score, 1);
        assert_eq!(p1.best, 1);
        assert_eq!(p1.snake.len(), 4);
        assert_eq!(*p1.snake.back().unwrap(), tail_before);
        assert_ne!(state.food, Cell::new(7, 13));
        assert!(!state.is_occupied(state.food));
        assert!(state.food.in_bounds(rules.grid));
    }

    #[test]
    fn test_food_placement_gives_up_on_full_grid() {
        let rules = Rules {
            grid: 2,
            food_placement_attempts: 10,
            ..Rules::default()
        };
        let mut state = MatchState::new(&Rules::default(), Role::Host);
        set_snake(&mut state.players[0], &[(0, 0), (1, 0)], Direction::RIGHT);
        set_snake(&mut state.players[1], &[(0, 1), (1, 1)], Direction::LEFT);
        let mut rng = StdRng::seed_from_u64(3);

        place_food(&mut state, &rules, &mut rng);

        assert!(state.food.in_bounds(2));
        assert!(state.is_occupied(state.food));
    }

    #[test]
    fn test_step_rounds_stops_at_gameover() {
        let (mut state, rules, mut rng) = playing(Role::Host);
        set_snake(&mut state.players[0], &[(25, 2), (24, 2)], Direction::RIGHT);
        let p2_before = state.players[1].snake.clone();

        step_rounds(&mut state, &rules, &mut rng, 5);

        assert_eq!(state.mode, Mode::Gameover);
        // p2 moved exactly once, in the tick that ended the round
        assert_eq!(state.players[1].head(), p2_before[0].offset(Direction::LEFT));
    }
}
