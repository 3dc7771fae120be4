//! Rigid-body world wrapper - gravity, contact materials, static colliders

use rapier3d::na::{UnitQuaternion, Vector3};
use rapier3d::prelude::*;

use crate::util::time::tick_delta;

/// Fixed internal physics step; sub-stepping keeps the simulation
/// independent of caller scheduling jitter.
const FIXED_DT: f32 = 1.0 / 60.0;
/// Cap on catch-up sub-steps per call
const MAX_SUBSTEPS: u32 = 3;

/// Player body shape: sphere approximation of a capsule
const PLAYER_RADIUS: f32 = 0.5;
const PLAYER_MASS: f32 = 60.0;
/// Air resistance on player bodies
const PLAYER_LINEAR_DAMPING: f32 = 0.9;

/// Spawn point for new and respawned players
pub const SPAWN_POSITION: [f32; 3] = [0.0, 5.0, 0.0];

/// Ground slab dimensions. The ground is a finite cuboid with its top face
/// at y = 0, not an infinite halfspace: a body that somehow ends up far
/// below it must keep falling so the kill-plane correction can catch it,
/// rather than being ejected back to the surface by penetration recovery.
const GROUND_HALF_EXTENT: f32 = 250.0;
const GROUND_HALF_THICKNESS: f32 = 0.5;

/// Rigid-body simulation world for one room
pub struct PhysicsWorld {
    gravity: Vector3<f32>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    accumulator: f32,
}

impl PhysicsWorld {
    /// Create a world with standard gravity and a static ground slab.
    /// Contact material is frictionless and non-bouncy everywhere; horizontal
    /// friction is handled by entity movement logic instead.
    pub fn new() -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = FIXED_DT;

        let mut colliders = ColliderSet::new();
        let ground =
            ColliderBuilder::cuboid(GROUND_HALF_EXTENT, GROUND_HALF_THICKNESS, GROUND_HALF_EXTENT)
                .translation(vector![0.0, -GROUND_HALF_THICKNESS, 0.0])
                .friction(0.0)
                .restitution(0.0)
                .build();
        colliders.insert(ground);

        Self {
            gravity: vector![0.0, -9.82, 0.0],
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders,
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            accumulator: 0.0,
        }
    }

    /// Add a static box collider, e.g. level geometry from an external loader
    pub fn add_static_box(&mut self, half_extents: [f32; 3], translation: [f32; 3]) {
        let collider = ColliderBuilder::cuboid(half_extents[0], half_extents[1], half_extents[2])
            .translation(vector![translation[0], translation[1], translation[2]])
            .friction(0.0)
            .restitution(0.0)
            .build();
        self.colliders.insert(collider);
    }

    /// Create a dynamic body for a player at the spawn point
    pub fn spawn_player_body(&mut self) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![
                SPAWN_POSITION[0],
                SPAWN_POSITION[1],
                SPAWN_POSITION[2]
            ])
            .lock_rotations()
            .linear_damping(PLAYER_LINEAR_DAMPING)
            .additional_mass(PLAYER_MASS)
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::ball(PLAYER_RADIUS)
            .friction(0.0)
            .restitution(0.0)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        handle
    }

    /// Remove a body and its colliders from the simulation
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Advance the simulation by `dt` seconds using fixed sub-steps
    pub fn step(&mut self, dt: f32) {
        self.accumulator += dt;

        let mut substeps = 0;
        while self.accumulator >= FIXED_DT && substeps < MAX_SUBSTEPS {
            self.pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                None,
                &(),
                &(),
            );
            self.accumulator -= FIXED_DT;
            substeps += 1;
        }

        // Drop backlog we will never catch up on
        if self.accumulator >= FIXED_DT {
            self.accumulator = self.accumulator.rem_euclid(FIXED_DT);
        }
    }

    /// Advance by exactly one fixed tick
    pub fn step_tick(&mut self) {
        self.step(tick_delta());
    }

    pub fn position(&self, handle: RigidBodyHandle) -> [f32; 3] {
        let t = self.bodies[handle].translation();
        [t.x, t.y, t.z]
    }

    pub fn velocity(&self, handle: RigidBodyHandle) -> [f32; 3] {
        let v = self.bodies[handle].linvel();
        [v.x, v.y, v.z]
    }

    pub fn rotation(&self, handle: RigidBodyHandle) -> UnitQuaternion<f32> {
        *self.bodies[handle].rotation()
    }

    /// Teleport a body, clearing all momentum
    pub fn teleport(&mut self, handle: RigidBodyHandle, position: [f32; 3]) {
        let body = &mut self.bodies[handle];
        body.set_translation(vector![position[0], position[1], position[2]], true);
        body.set_linvel(vector![0.0, 0.0, 0.0], true);
    }

    /// Overwrite horizontal velocity, leaving the vertical component to gravity
    pub fn set_horizontal_velocity(&mut self, handle: RigidBodyHandle, vx: f32, vz: f32) {
        let body = &mut self.bodies[handle];
        let vy = body.linvel().y;
        body.set_linvel(vector![vx, vy, vz], true);
    }

    /// Overwrite vertical velocity (jump impulse)
    pub fn set_vertical_velocity(&mut self, handle: RigidBodyHandle, vy: f32) {
        let body = &mut self.bodies[handle];
        let v = *body.linvel();
        body.set_linvel(vector![v.x, vy, v.z], true);
    }

    pub fn set_position(&mut self, handle: RigidBodyHandle, position: [f32; 3]) {
        self.bodies[handle].set_translation(
            vector![position[0], position[1], position[2]],
            true,
        );
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravity_pulls_bodies_down() {
        let mut world = PhysicsWorld::new();
        let handle = world.spawn_player_body();

        let start_y = world.position(handle)[1];
        for _ in 0..30 {
            world.step_tick();
        }

        assert!(world.position(handle)[1] < start_y);
        assert!(world.velocity(handle)[1] < 0.0);
    }

    #[test]
    fn ground_stops_falling_bodies() {
        let mut world = PhysicsWorld::new();
        let handle = world.spawn_player_body();

        // Several seconds of simulation; the body must come to rest on the
        // ground instead of falling through.
        for _ in 0..600 {
            world.step_tick();
        }

        let y = world.position(handle)[1];
        assert!(y > 0.0, "body fell through the ground: y = {}", y);
        assert!(y < 1.0, "body did not settle: y = {}", y);
    }

    #[test]
    fn body_below_the_ground_keeps_falling() {
        let mut world = PhysicsWorld::new();
        let handle = world.spawn_player_body();

        // A body far under the slab must not be pushed back to the surface
        // by penetration recovery; it stays in free fall so the caller's
        // kill-plane correction can reclaim it.
        world.set_position(handle, [2.0, -11.0, 2.0]);
        for _ in 0..30 {
            world.step_tick();
        }

        assert!(world.position(handle)[1] < -11.0);
        assert!(world.velocity(handle)[1] < 0.0);
    }

    #[test]
    fn removed_body_leaves_the_world() {
        let mut world = PhysicsWorld::new();
        let handle = world.spawn_player_body();
        assert_eq!(world.body_count(), 1);

        world.remove_body(handle);
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn teleport_clears_momentum() {
        let mut world = PhysicsWorld::new();
        let handle = world.spawn_player_body();

        for _ in 0..10 {
            world.step_tick();
        }
        world.teleport(handle, SPAWN_POSITION);

        assert_eq!(world.position(handle), SPAWN_POSITION);
        assert_eq!(world.velocity(handle), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn substepping_caps_catchup_work() {
        let mut world = PhysicsWorld::new();
        let _ = world.spawn_player_body();

        // A huge dt must not stall; backlog beyond MAX_SUBSTEPS is dropped.
        world.step(1.0);
        assert!(world.accumulator < FIXED_DT);
    }
}
