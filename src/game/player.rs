//! Player entity - physics body ownership, stats, authoritative movement

use rapier3d::na::{UnitQuaternion, Vector3};
use rapier3d::prelude::RigidBodyHandle;
use uuid::Uuid;

use crate::game::combat::{WeaponStats, MAX_HEALTH};
use crate::game::physics::{PhysicsWorld, SPAWN_POSITION};
use crate::game::RoomError;
use crate::ws::protocol::{InputFrame, MovementState, PlayerSnapshot};

/// Base horizontal speed in m/s
pub const WALK_SPEED: f32 = 5.0;
pub const SPRINT_MULTIPLIER: f32 = 1.5;
pub const CROUCH_MULTIPLIER: f32 = 0.5;

/// Upward velocity applied on jump
pub const JUMP_VELOCITY: f32 = 5.0;
/// Near-zero vertical velocity counts as grounded. Approximation, not a
/// contact flag; double jumps at the apex are possible.
pub const GROUNDED_VY_EPSILON: f32 = 0.1;

/// Bodies falling below this are teleported back to the spawn point
pub const KILL_PLANE_Y: f32 = -10.0;

/// One simulated actor per connection. Owns its physics body exclusively;
/// both are destroyed together on disconnect.
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub body: RigidBodyHandle,
    /// Derived from the last input yaw; the body itself has locked rotations
    pub orientation: UnitQuaternion<f32>,
    pub health: f32,
    pub state: MovementState,
    pub weapon_idx: usize,
    pub ammo: u32,
    pub kills: u32,
    pub deaths: u32,
    pub score: u32,
    /// Highest input sequence seen; stale inputs are discarded
    pub last_input_seq: u32,
    /// At most one buffered input, applied on the next tick (latest wins)
    pub pending_input: Option<InputFrame>,
    /// Fire-rate bookkeeping, unix millis of the last accepted shot
    pub last_shot_ms: u64,
}

impl Player {
    pub fn new(id: Uuid, name: String, world: &mut PhysicsWorld) -> Self {
        let weapon_idx = 0;
        Self {
            id,
            name,
            body: world.spawn_player_body(),
            orientation: UnitQuaternion::identity(),
            health: MAX_HEALTH,
            state: MovementState::Idle,
            weapon_idx,
            ammo: WeaponStats::for_index(weapon_idx).ammo_capacity,
            kills: 0,
            deaths: 0,
            score: 0,
            last_input_seq: 0,
            pending_input: None,
            last_shot_ms: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state != MovementState::Dead
    }

    /// Buffer an input frame for the next tick. Returns Ok(false) when the
    /// frame is stale (sequence not newer than the last seen) and discarded.
    pub fn buffer_input(&mut self, input: InputFrame) -> Result<bool, RoomError> {
        if !self.is_alive() {
            return Err(RoomError::StateConflict);
        }
        if input.seq <= self.last_input_seq {
            return Ok(false);
        }
        self.last_input_seq = input.seq;
        self.pending_input = Some(input);
        Ok(true)
    }

    /// Apply the buffered input, if any. Called once per tick before the
    /// physics step. Dead players are re-checked here because a shot can
    /// land between buffering and the tick.
    pub fn apply_pending_input(&mut self, world: &mut PhysicsWorld) {
        let Some(input) = self.pending_input.take() else {
            return;
        };
        if !self.is_alive() {
            return;
        }

        // Forward/right unit vectors from camera yaw
        let (sin_yaw, cos_yaw) = input.yaw.sin_cos();
        let (forward_x, forward_z) = (sin_yaw, cos_yaw);
        let (right_x, right_z) = (cos_yaw, -sin_yaw);

        let speed = if input.sprint {
            WALK_SPEED * SPRINT_MULTIPLIER
        } else if input.crouch {
            WALK_SPEED * CROUCH_MULTIPLIER
        } else {
            WALK_SPEED
        };

        // Velocity is set directly, not acceleration-blended, for responsive
        // authoritative movement.
        if input.x != 0.0 || input.y != 0.0 {
            self.state = MovementState::Run;
            world.set_horizontal_velocity(
                self.body,
                (forward_x * input.y + right_x * input.x) * speed,
                (forward_z * input.y + right_z * input.x) * speed,
            );
        } else {
            self.state = MovementState::Idle;
            world.set_horizontal_velocity(self.body, 0.0, 0.0);
        }

        if input.jump && world.velocity(self.body)[1].abs() < GROUNDED_VY_EPSILON {
            self.state = MovementState::Jump;
            world.set_vertical_velocity(self.body, JUMP_VELOCITY);
        }

        self.orientation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), input.yaw);
    }

    /// Accept a raw position report (position-echo movement mode only)
    pub fn set_reported_position(
        &mut self,
        world: &mut PhysicsWorld,
        pos: [f32; 3],
        yaw: f32,
    ) -> Result<(), RoomError> {
        if !self.is_alive() {
            return Err(RoomError::StateConflict);
        }
        world.set_position(self.body, pos);
        self.orientation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw);
        Ok(())
    }

    /// Mark killed by combat. Movement input is ignored until respawn.
    pub fn kill(&mut self) {
        self.state = MovementState::Dead;
        self.deaths += 1;
        self.pending_input = None;
    }

    /// Restore a dead player at the spawn point with full health and ammo
    pub fn respawn(&mut self, world: &mut PhysicsWorld) -> Result<(), RoomError> {
        if self.is_alive() {
            return Err(RoomError::StateConflict);
        }
        self.health = MAX_HEALTH;
        self.ammo = WeaponStats::for_index(self.weapon_idx).ammo_capacity;
        self.state = MovementState::Idle;
        world.teleport(self.body, SPAWN_POSITION);
        Ok(())
    }

    /// Silent teleport back to spawn when the body falls out of the level.
    /// Distinct from combat death: no event, no stat change.
    pub fn enforce_kill_plane(&mut self, world: &mut PhysicsWorld) -> bool {
        if world.position(self.body)[1] >= KILL_PLANE_Y {
            return false;
        }
        world.teleport(self.body, SPAWN_POSITION);
        if self.is_alive() {
            self.state = MovementState::Idle;
        }
        true
    }

    /// Serialize the minimal wire fields
    pub fn snapshot(&self, world: &PhysicsWorld) -> PlayerSnapshot {
        let q = self.orientation.coords;
        PlayerSnapshot {
            id: self.id,
            pos: world.position(self.body),
            rot: [q.x, q.y, q.z, q.w],
            vel: world.velocity(self.body),
            hp: self.health,
            state: self.state,
            weapon_idx: self.weapon_idx,
        }
    }

    /// Remove the player's body from the simulation
    pub fn destroy(&self, world: &mut PhysicsWorld) {
        world.remove_body(self.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_player(world: &mut PhysicsWorld) -> Player {
        Player::new(Uuid::new_v4(), "tester".to_string(), world)
    }

    fn input(seq: u32, x: f32, y: f32) -> InputFrame {
        InputFrame {
            seq,
            x,
            y,
            ..InputFrame::default()
        }
    }

    #[test]
    fn forward_input_moves_along_yaw() {
        let mut world = PhysicsWorld::new();
        let mut player = make_player(&mut world);

        // yaw 0 means forward is +Z
        player.buffer_input(input(1, 0.0, 1.0)).unwrap();
        player.apply_pending_input(&mut world);

        let vel = world.velocity(player.body);
        assert!((vel[0]).abs() < 1e-5);
        assert!((vel[2] - WALK_SPEED).abs() < 1e-5);
        assert_eq!(player.state, MovementState::Run);
    }

    #[test]
    fn no_input_axes_means_idle_and_stopped() {
        let mut world = PhysicsWorld::new();
        let mut player = make_player(&mut world);

        player.buffer_input(input(1, 1.0, 0.0)).unwrap();
        player.apply_pending_input(&mut world);
        player.buffer_input(input(2, 0.0, 0.0)).unwrap();
        player.apply_pending_input(&mut world);

        let vel = world.velocity(player.body);
        assert_eq!(vel[0], 0.0);
        assert_eq!(vel[2], 0.0);
        assert_eq!(player.state, MovementState::Idle);
    }

    #[test]
    fn sprint_scales_speed() {
        let mut world = PhysicsWorld::new();
        let mut player = make_player(&mut world);

        let mut frame = input(1, 0.0, 1.0);
        frame.sprint = true;
        player.buffer_input(frame).unwrap();
        player.apply_pending_input(&mut world);

        let vel = world.velocity(player.body);
        assert!((vel[2] - WALK_SPEED * SPRINT_MULTIPLIER).abs() < 1e-5);
    }

    #[test]
    fn stale_sequence_is_discarded() {
        let mut world = PhysicsWorld::new();
        let mut player = make_player(&mut world);

        assert!(player.buffer_input(input(7, 1.0, 0.0)).unwrap());
        // Out-of-order arrival: seq 5 after seq 7 must not regress
        assert!(!player.buffer_input(input(5, -1.0, 0.0)).unwrap());

        player.apply_pending_input(&mut world);
        let vel = world.velocity(player.body);
        assert!(vel[0] > 0.0, "movement regressed to the stale input");
    }

    #[test]
    fn dead_player_rejects_input_and_keeps_velocity() {
        let mut world = PhysicsWorld::new();
        let mut player = make_player(&mut world);
        player.kill();

        assert_eq!(
            player.buffer_input(input(1, 1.0, 1.0)),
            Err(RoomError::StateConflict)
        );
        player.apply_pending_input(&mut world);
        let vel = world.velocity(player.body);
        assert_eq!(vel[0], 0.0);
        assert_eq!(vel[2], 0.0);
    }

    #[test]
    fn jump_requires_near_zero_vertical_velocity() {
        let mut world = PhysicsWorld::new();
        let mut player = make_player(&mut world);

        // Freshly spawned in the air with vy == 0: jump is allowed
        let mut frame = input(1, 0.0, 0.0);
        frame.jump = true;
        player.buffer_input(frame).unwrap();
        player.apply_pending_input(&mut world);
        assert_eq!(player.state, MovementState::Jump);
        assert!((world.velocity(player.body)[1] - JUMP_VELOCITY).abs() < 1e-5);

        // Mid-flight the check fails
        let mut frame = input(2, 0.0, 0.0);
        frame.jump = true;
        player.buffer_input(frame).unwrap();
        player.apply_pending_input(&mut world);
        let vy = world.velocity(player.body)[1];
        assert!((vy - JUMP_VELOCITY).abs() < 1.0, "jump applied twice");
    }

    #[test]
    fn respawn_restores_health_position_and_input() {
        let mut world = PhysicsWorld::new();
        let mut player = make_player(&mut world);
        player.health = 0.0;
        player.kill();

        player.respawn(&mut world).unwrap();
        assert_eq!(player.health, MAX_HEALTH);
        assert_eq!(world.position(player.body), SPAWN_POSITION);
        assert_eq!(player.state, MovementState::Idle);

        // Input accepted again immediately
        assert!(player.buffer_input(input(10, 0.0, 1.0)).unwrap());
    }

    #[test]
    fn respawning_a_live_player_is_a_conflict() {
        let mut world = PhysicsWorld::new();
        let mut player = make_player(&mut world);
        assert_eq!(player.respawn(&mut world), Err(RoomError::StateConflict));
    }

    #[test]
    fn kill_plane_teleports_without_death() {
        let mut world = PhysicsWorld::new();
        let mut player = make_player(&mut world);

        world.set_position(player.body, [3.0, -12.0, 4.0]);
        assert!(player.enforce_kill_plane(&mut world));
        assert_eq!(world.position(player.body), SPAWN_POSITION);
        assert_eq!(world.velocity(player.body), [0.0, 0.0, 0.0]);
        assert!(player.is_alive());
        assert_eq!(player.deaths, 0);

        // Above the plane: untouched
        assert!(!player.enforce_kill_plane(&mut world));
    }
}
