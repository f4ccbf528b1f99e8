//! Rigid-body world
//!
//! Thin wrapper around the rapier3d engine: gravity, solver configuration
//! and the fixed-timestep accumulator. The engine stays opaque behind this
//! module; everything else works with [`BodyHandle`](crate::sim::BodyHandle)
//! ids and glam vectors. The world does not interpret contacts, it only
//! exposes the current contact list and the engine's event channel.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use glam::Vec3;
use rapier3d::prelude::*;

use crate::config::SimConfig;
use crate::consts::{BOARD_HALF_DEPTH, MIN_COLLIDER_EXTENT};
use crate::sim::SetupError;
use crate::sim::body::{BodyDesc, ShapeDesc};
use crate::sim::determinism;
use crate::sim::materials::SurfaceResponse;

// Re-exported so the playfield can hold engine handles without importing
// rapier itself.
pub use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};

/// Accumulator slack for float residue when a clamped frame drains to a
/// whole number of sub-steps.
const ACCUM_EPS: f32 = 1e-5;

#[inline]
fn to_na(v: Vec3) -> Vector<f32> {
    vector![v.x, v.y, v.z]
}

#[inline]
fn from_na(v: &Vector<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

/// Collision-started events reported through the engine's callback channel.
///
/// Mutex-guarded vec instead of a crossbeam channel so the collector stays
/// WASM-safe; the sim itself is single-threaded and only drains it between
/// sub-steps.
#[derive(Default)]
struct ContactEventQueue {
    started: Mutex<Vec<(ColliderHandle, ColliderHandle)>>,
}

impl ContactEventQueue {
    fn drain(&self) -> Vec<(ColliderHandle, ColliderHandle)> {
        match self.started.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventHandler for ContactEventQueue {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let CollisionEvent::Started(a, b, _) = event {
            if let Ok(mut queue) = self.started.lock() {
                queue.push((a, b));
            }
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: f32,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: f32,
    ) {
    }
}

/// The wrapped engine plus the fixed-timestep accumulator
pub struct RigidWorld {
    gravity: Vector<f32>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    events: ContactEventQueue,
    accumulator: f32,
    max_substeps: u32,
    max_frame_delta: f32,
}

impl RigidWorld {
    pub fn new(config: &SimConfig) -> Self {
        let mut params = IntegrationParameters::default();
        params.dt = config.sim_dt;
        if let Some(iterations) = NonZeroUsize::new(config.solver_iterations) {
            params.num_solver_iterations = iterations.into();
        }

        Self {
            gravity: vector![0.0, config.gravity_y, 0.0],
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            events: ContactEventQueue::default(),
            accumulator: 0.0,
            max_substeps: config.max_substeps,
            max_frame_delta: config.max_frame_delta,
        }
    }

    /// Bank a wall-clock delta and return the number of fixed sub-steps to
    /// run now.
    ///
    /// The delta is clamped so one stalled frame cannot schedule unbounded
    /// catch-up, then rounded to the canonical grid so the accumulator's own
    /// state replays identically. Whatever the sub-step cap leaves behind is
    /// clamped afterward.
    pub fn accumulate(&mut self, wall_dt: f32) -> u32 {
        let clamped = wall_dt.clamp(0.0, self.max_frame_delta);
        self.accumulator += determinism::snap(clamped);

        let mut substeps = 0;
        while self.accumulator >= self.params.dt - ACCUM_EPS && substeps < self.max_substeps {
            self.accumulator -= self.params.dt;
            substeps += 1;
        }
        if self.accumulator.abs() < ACCUM_EPS {
            self.accumulator = 0.0;
        }
        self.accumulator = self.accumulator.clamp(0.0, self.params.dt);
        substeps
    }

    /// Leftover banked time, kept visible for round-restart bookkeeping.
    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    pub fn reset_accumulator(&mut self) {
        self.accumulator = 0.0;
    }

    /// Run one fixed sub-step of the engine.
    pub fn substep(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            &(),
            &self.events,
        );
    }

    /// Contact pairs currently known to the narrow phase (primary channel).
    /// The buffer is reused by the caller across sub-steps.
    pub fn active_contacts(&self, out: &mut Vec<(ColliderHandle, ColliderHandle)>) {
        out.clear();
        for pair in self.narrow_phase.contact_pairs() {
            if pair.has_any_active_contact {
                out.push((pair.collider1, pair.collider2));
            }
        }
    }

    /// Contact-started events from the engine callback (secondary channel).
    /// Sensor overlaps only show up here; solid contacts show up on both
    /// channels and deduplicate downstream.
    pub fn drain_contact_events(&self) -> Vec<(ColliderHandle, ColliderHandle)> {
        self.events.drain()
    }

    /// Insert a dynamic mover. Locked to the board plane, rotation-free, with
    /// continuous collision detection so fast shots cannot tunnel.
    pub fn add_mover(
        &mut self,
        id: u32,
        desc: &BodyDesc,
        radius: f32,
    ) -> Result<(RigidBodyHandle, ColliderHandle), SetupError> {
        let radius = checked_extent(radius)?;
        let body = RigidBodyBuilder::dynamic()
            .translation(to_na(desc.position))
            .linvel(to_na(desc.velocity))
            .locked_axes(LockedAxes::TRANSLATION_LOCKED_Z | LockedAxes::ROTATION_LOCKED)
            .ccd_enabled(true)
            .build();
        let body_handle = self.bodies.insert(body);

        // Pair restitution/friction comes entirely from the static collider:
        // Max picks the surface's restitution, Min keeps friction at zero.
        let collider = ColliderBuilder::ball(radius)
            .restitution(0.0)
            .restitution_combine_rule(CoefficientCombineRule::Max)
            .friction(0.0)
            .friction_combine_rule(CoefficientCombineRule::Min)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .user_data(id as u128)
            .build();
        let collider_handle =
            self.colliders
                .insert_with_parent(collider, body_handle, &mut self.bodies);

        Ok((body_handle, collider_handle))
    }

    /// Insert a fixed static collider with the registered surface response.
    pub fn add_static(
        &mut self,
        id: u32,
        desc: &BodyDesc,
        response: SurfaceResponse,
        sensor: bool,
    ) -> Result<(RigidBodyHandle, ColliderHandle), SetupError> {
        let body = RigidBodyBuilder::fixed()
            .translation(to_na(desc.position))
            .rotation(vector![0.0, 0.0, desc.rotation])
            .build();
        let body_handle = self.bodies.insert(body);

        let collider = shape_builder(&desc.shape)?
            .restitution(response.restitution)
            .restitution_combine_rule(CoefficientCombineRule::Max)
            .friction(response.friction)
            .friction_combine_rule(CoefficientCombineRule::Min)
            .sensor(sensor)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .user_data(id as u128)
            .build();
        let collider_handle =
            self.colliders
                .insert_with_parent(collider, body_handle, &mut self.bodies);

        Ok((body_handle, collider_handle))
    }

    pub fn remove(&mut self, body: RigidBodyHandle) {
        self.bodies.remove(
            body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Resolve a collider back to the entity id stored at creation.
    pub fn entity_of(&self, collider: ColliderHandle) -> Option<u32> {
        self.colliders.get(collider).map(|c| c.user_data as u32)
    }

    pub fn position(&self, body: RigidBodyHandle) -> Vec3 {
        self.bodies
            .get(body)
            .map(|b| from_na(b.translation()))
            .unwrap_or(Vec3::ZERO)
    }

    pub fn velocity(&self, body: RigidBodyHandle) -> Vec3 {
        self.bodies
            .get(body)
            .map(|b| from_na(b.linvel()))
            .unwrap_or(Vec3::ZERO)
    }

    pub fn set_position(&mut self, body: RigidBodyHandle, position: Vec3, wake: bool) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.set_translation(to_na(position), wake);
        }
    }

    pub fn set_velocity(&mut self, body: RigidBodyHandle, velocity: Vec3, wake: bool) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.set_linvel(to_na(velocity), wake);
        }
    }

    pub fn wake(&mut self, body: RigidBodyHandle) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.wake_up(true);
        }
    }

    pub fn is_sleeping(&self, body: RigidBodyHandle) -> bool {
        self.bodies.get(body).map(|b| b.is_sleeping()).unwrap_or(false)
    }

    /// Whether the engine currently produces a physical response for this
    /// collider. Engine edge cases can silently drop the flag; the playfield
    /// re-asserts it every frame.
    pub fn collision_response(&self, collider: ColliderHandle) -> bool {
        self.colliders.get(collider).map(|c| c.is_enabled()).unwrap_or(false)
    }

    pub fn set_collision_response(&mut self, collider: ColliderHandle, enabled: bool) {
        if let Some(c) = self.colliders.get_mut(collider) {
            c.set_enabled(enabled);
        }
    }

    /// Snap one mover back to the canonical state grid after a sub-step:
    /// non-finite components reset, out-of-plane drift and spin zeroed,
    /// position and velocity rounded. Returns the post-snap velocity.
    pub fn snap_mover(&mut self, body: RigidBodyHandle) -> Vec3 {
        let Some(b) = self.bodies.get_mut(body) else {
            return Vec3::ZERO;
        };

        let raw_pos = from_na(b.translation());
        let raw_vel = from_na(b.linvel());
        if !raw_pos.is_finite() || !raw_vel.is_finite() {
            log::warn!("non-finite mover state recovered: pos={:?} vel={:?}", raw_pos, raw_vel);
        }

        let pos = Vec3::new(
            determinism::snap(determinism::sanitize(raw_pos.x, 0.0)),
            determinism::snap(determinism::sanitize(raw_pos.y, 0.0)),
            0.0,
        );
        let vel = Vec3::new(
            determinism::snap(determinism::sanitize(raw_vel.x, 0.0)),
            determinism::snap(determinism::sanitize(raw_vel.y, 0.0)),
            0.0,
        );

        if pos != raw_pos {
            b.set_translation(to_na(pos), false);
        }
        if vel != raw_vel {
            b.set_linvel(to_na(vel), false);
        }
        if b.angvel().norm_squared() != 0.0 {
            b.set_angvel(Vector::zeros(), false);
        }
        vel
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

/// Reject non-finite or non-positive extents; clamp merely-tiny ones to the
/// minimum instead of passing degenerate geometry into the engine.
fn checked_extent(extent: f32) -> Result<f32, SetupError> {
    if !extent.is_finite() || extent <= 0.0 {
        return Err(SetupError::DegenerateShape("non-positive extent"));
    }
    Ok(extent.max(MIN_COLLIDER_EXTENT))
}

fn shape_builder(shape: &ShapeDesc) -> Result<ColliderBuilder, SetupError> {
    match shape {
        ShapeDesc::Sphere { radius } => {
            let radius = checked_extent(*radius)?;
            Ok(ColliderBuilder::ball(radius))
        }
        ShapeDesc::Box { half_extents } => {
            let hx = checked_extent(half_extents.x)?;
            let hy = checked_extent(half_extents.y)?;
            Ok(ColliderBuilder::cuboid(hx, hy, BOARD_HALF_DEPTH))
        }
        ShapeDesc::Polygon { points } => {
            if points.len() < 3 {
                return Err(SetupError::DegenerateShape("polygon needs at least 3 points"));
            }
            // Extrude the outline through the play plane
            let mut vertices = Vec::with_capacity(points.len() * 2);
            for p in points {
                if !p.is_finite() {
                    return Err(SetupError::DegenerateShape("non-finite polygon point"));
                }
                vertices.push(point![p.x, p.y, -BOARD_HALF_DEPTH]);
                vertices.push(point![p.x, p.y, BOARD_HALF_DEPTH]);
            }
            ColliderBuilder::convex_hull(&vertices)
                .ok_or(SetupError::DegenerateShape("polygon has no convex hull"))
        }
    }
}
