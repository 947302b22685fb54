//! Frame Application
//!
//! The per-frame step every replica runs. Must be 100% deterministic:
//! identical worlds fed identical frames end in identical worlds, bit for
//! bit.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::torus::{shortest_displacement, wrap_vec};
use crate::core::vec2::Vec2;
use crate::game::action::{Action, AuthoredAction, Direction};
use crate::game::collision::{
    DamageMap, ProjectileHit,
    find_projectile_target, inside_open_field,
};
use crate::game::config::{Topology, WorldConfig, NANOS_PER_SECOND};
use crate::game::events::GameEvent;
use crate::game::state::{MatchPhase, PlayerId, WorldState};

/// One authenticated, numbered, timed batch of actions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Sequence number assigned by the relay
    pub number: u64,
    /// Real time covered by this frame (ns); drives all physics
    pub elapsed_ns: u64,
    /// Actions in relay order
    pub events: Vec<AuthoredAction>,
}

impl Frame {
    /// Create a frame.
    pub fn new(number: u64, elapsed_ns: u64, events: Vec<AuthoredAction>) -> Self {
        Self { number, elapsed_ns, events }
    }

    /// A frame carrying no actions.
    pub fn empty(number: u64, elapsed_ns: u64) -> Self {
        Self::new(number, elapsed_ns, Vec::new())
    }

    /// Elapsed time in seconds.
    #[inline]
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_ns as f64 / NANOS_PER_SECOND as f64
    }
}

/// Result of applying a frame.
#[derive(Debug, Default)]
pub struct FrameResult {
    /// Events generated this frame
    pub events: Vec<GameEvent>,
    /// Actions the local participant should send (join re-announcements)
    pub outbound: Vec<Action>,
    /// Whether the match ended this frame
    pub match_ended: bool,
    /// Winner (if the match ended with a survivor)
    pub winner: Option<PlayerId>,
}

/// Apply one frame to the world.
///
/// # Arguments
///
/// * `state` - The world (will be mutated)
/// * `frame` - Authenticated actions plus elapsed time
/// * `config` - World constants; must match on every replica
///
/// # Determinism
///
/// - Players are walked in join order, projectiles in creation order
/// - Only IEEE basic operations and `sqrt` on `f64`
/// - Time comes from the frame, never from the host clock
/// - Spawn randomness is derived from the identity alone
pub fn apply_frame(state: &mut WorldState, frame: &Frame, config: &WorldConfig) -> FrameResult {
    let mut result = FrameResult::default();

    // 0. Advance the simulation clock
    state.clock_ns = state.clock_ns.saturating_add(frame.elapsed_ns);
    state.frames_applied += 1;
    let elapsed_seconds = frame.elapsed_seconds();

    // 1-4. Projectile flight, collisions, damage, removal
    if state.phase == MatchPhase::Active {
        update_projectiles(state, frame.number, elapsed_seconds, config);
    }

    // 5. Actions in relay order
    for event in &frame.events {
        apply_action(state, event, frame.number, elapsed_seconds, config, &mut result);
    }

    // 6. Win condition
    if state.phase == MatchPhase::Active {
        check_win_condition(state, frame.number, &mut result);
    }

    result.events = state.take_events();
    result
}

/// Move projectiles, resolve hits, apply damage and drop dead projectiles.
fn update_projectiles(state: &mut WorldState, frame_number: u64, dt: f64, config: &WorldConfig) {
    let now = state.clock_ns;
    let mut projectiles = std::mem::take(&mut state.projectiles);
    let mut marked = vec![false; projectiles.len()];
    let mut hits: Vec<ProjectileHit> = Vec::new();
    let mut damage = DamageMap::new();

    for (index, projectile) in projectiles.iter_mut().enumerate() {
        // Expired projectiles neither move nor hit
        if projectile.is_expired(now, config.projectile_lifetime_ns) {
            marked[index] = true;
            continue;
        }

        // 1. Advance (and re-wrap on the torus)
        projectile.position = projectile.position + projectile.velocity.scale(dt);
        if config.wraps() {
            projectile.position = wrap_vec(projectile.position, config.width, config.height);
        }

        // 2. First living non-owner in join order takes the hit
        if let Some(victim) =
            find_projectile_target(state, projectile.position, &projectile.owner, config.player_size)
        {
            marked[index] = true;
            damage.add(&victim);
            hits.push(ProjectileHit {
                projectile_id: projectile.id,
                victim,
                owner: projectile.owner.clone(),
            });
        }

        if !config.wraps() && !inside_open_field(projectile.position, config.width, config.height) {
            marked[index] = true;
        }
    }

    for hit in hits {
        state.push_event(GameEvent::player_hit(frame_number, hit.victim, hit.projectile_id, hit.owner));
    }

    // 3. Apply accumulated damage once per player
    let mut eliminated = Vec::new();
    for (victim, amount) in damage.iter() {
        if let Some(player) = state.players.get_mut(victim) {
            let was_alive = player.is_alive();
            player.health = player.health.saturating_sub(amount);
            if was_alive && !player.is_alive() {
                eliminated.push(victim.clone());
            }
        }
    }
    for player_id in eliminated {
        state.push_event(GameEvent::player_eliminated(frame_number, player_id));
    }

    // 4. Remove marked projectiles
    let mut marks = marked.into_iter();
    projectiles.retain(|_| !marks.next().unwrap_or(false));
    state.projectiles = projectiles;
}

/// Apply a single action.
fn apply_action(
    state: &mut WorldState,
    event: &AuthoredAction,
    frame_number: u64,
    dt: f64,
    config: &WorldConfig,
    result: &mut FrameResult,
) {
    let author = &event.author;

    if event.action == Action::StartMatch {
        if state.phase == MatchPhase::Waiting {
            state.phase = MatchPhase::Active;
            state.push_event(GameEvent::phase_changed(
                frame_number,
                MatchPhase::Waiting,
                MatchPhase::Active,
            ));
        }
        return;
    }

    // First sight of an identity spawns it and asks us to announce ourselves
    if event.action.spawns_author() && state.spawn_player(author, config) {
        if let Some(player) = state.get_player(author) {
            let spawned = GameEvent::player_spawned(
                frame_number,
                author.clone(),
                player.position,
                player.color,
            );
            state.push_event(spawned);
        }
        result.outbound.push(Action::Join);
    }

    if state.phase != MatchPhase::Active {
        return;
    }
    if !state.get_player(author).is_some_and(|p| p.is_alive()) {
        debug!(author = %author, request = %event.request_id, "action from absent or eliminated player ignored");
        return;
    }

    match event.action {
        Action::Move { direction } => move_player(state, author, direction, dt, config),
        Action::Shoot { target_x, target_y } => {
            handle_shot(state, author, target_x, target_y, frame_number, config)
        }
        Action::Join | Action::StartMatch => {}
    }
}

/// Integrate one axis of movement, then wrap or clamp.
fn move_player(
    state: &mut WorldState,
    author: &PlayerId,
    direction: Direction,
    dt: f64,
    config: &WorldConfig,
) {
    let distance = config.player_speed * dt;
    let Some(player) = state.get_player_mut(author) else {
        return;
    };

    let mut position = player.position;
    match direction {
        Direction::Up => position.y -= distance,
        Direction::Down => position.y += distance,
        Direction::Left => position.x -= distance,
        Direction::Right => position.x += distance,
    }

    player.position = match config.topology {
        Topology::Toroidal => wrap_vec(position, config.width, config.height),
        Topology::Bounded => Vec2::new(
            clamp_axis(position.x, config.width - config.player_size),
            clamp_axis(position.y, config.height - config.player_size),
        ),
    };
}

/// Clamp to `[0, max]`, preferring the bound on ties.
#[inline]
fn clamp_axis(value: f64, max: f64) -> f64 {
    let capped = if max < value { max } else { value };
    if capped > 0.0 {
        capped
    } else {
        0.0
    }
}

/// Fire a projectile if the shooter's cooldown allows.
fn handle_shot(
    state: &mut WorldState,
    author: &PlayerId,
    target_x: i64,
    target_y: i64,
    frame_number: u64,
    config: &WorldConfig,
) {
    let now = state.clock_ns;
    let Some(player) = state.get_player_mut(author) else {
        return;
    };
    if !player.can_shoot(now, config.shoot_cooldown_ns) {
        debug!(author = %author, "shot refused by cooldown");
        return;
    }
    player.last_shot_ns = Some(now);

    let start = player.centre(config.player_size);
    let target = Vec2::new(target_x as f64, target_y as f64);
    let aim = match config.topology {
        Topology::Toroidal => shortest_displacement(start, target, config.width, config.height),
        Topology::Bounded => target - start,
    };

    // A zero-length aim still spends the cooldown
    let Some(direction) = aim.normalize() else {
        return;
    };
    let velocity = direction.scale(config.projectile_speed);
    let projectile_id = state.spawn_projectile(author.clone(), start, velocity);
    state.push_event(GameEvent::projectile_fired(
        frame_number,
        projectile_id,
        author.clone(),
        start,
        velocity,
    ));
}

/// Finish the match once at most one player is standing.
fn check_win_condition(state: &mut WorldState, frame_number: u64, result: &mut FrameResult) {
    if state.players.is_empty() {
        return;
    }

    let (winner, several_alive) = {
        let mut alive = state.alive_players();
        let first = alive.next().map(|p| p.id.clone());
        (first, alive.next().is_some())
    };
    if several_alive {
        return;
    }

    state.phase = MatchPhase::Finished;
    state.winner = winner.clone();
    state.push_event(GameEvent::phase_changed(
        frame_number,
        MatchPhase::Active,
        MatchPhase::Finished,
    ));
    state.push_event(GameEvent::match_finished(frame_number, winner.clone()));

    result.match_ended = true;
    result.winner = winner;
}

/// Rebuild a world from an empty state by applying `frames` in order.
///
/// Returns the final world and every event produced along the way.
pub fn replay_frames(config: &WorldConfig, frames: &[Frame]) -> (WorldState, Vec<GameEvent>) {
    let mut state = WorldState::new();
    let mut all_events = Vec::new();

    for frame in frames {
        let result = apply_frame(&mut state, frame, config);
        all_events.extend(result.events);
    }

    (state, all_events)
}
