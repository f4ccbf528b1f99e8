//! Playfield frame loop
//!
//! One logical frame runs, in order: physics sub-steps, collision dispatch
//! for the contacts each sub-step produced, then gameplay reaction through
//! the registered handlers; the caller renders afterward. Body state, the
//! processed-contact set and all stuck tracking are owned by this single
//! sequence; nothing mutates them mid-frame.

use std::collections::BTreeMap;

use glam::{Vec2, Vec3};

use crate::config::SimConfig;
use crate::sim::SetupError;
use crate::sim::body::{BodyCategory, BodyDesc, BodyHandle, ShapeDesc};
use crate::sim::determinism::{self, FramePacer};
use crate::sim::dispatch::{
    ContactEvent, ContactKey, HandlerTable, ProcessedContacts, RoundContext, clamp_rebound,
};
use crate::sim::materials::{BounceCategory, BounceTable, MoverClass};
use crate::sim::normalizer;
use crate::sim::stuck::{StaggeredRemoval, StuckClock, StuckReason, StuckTracker};
use crate::sim::world::{ColliderHandle, RigidBodyHandle, RigidWorld};

/// What one [`Playfield::step`] call did
#[derive(Debug, Default)]
pub struct FrameReport {
    /// Whether a nominal frame ran (early frames are skipped)
    pub ran: bool,
    /// Fixed sub-steps executed
    pub substeps: u32,
    /// Colliders removed by staggered stuck-cleanup this frame
    pub removed: Vec<BodyHandle>,
    /// Movers newly judged stuck this frame, with the tripped signal
    pub newly_stuck: Vec<(BodyHandle, StuckReason)>,
}

/// In-plane footprint cached for the response overrides
#[derive(Debug, Clone, Copy)]
enum PlaneShape {
    Circle { radius: f32 },
    Rect { half: Vec2 },
}

fn plane_shape(shape: &ShapeDesc) -> PlaneShape {
    match shape {
        ShapeDesc::Sphere { radius } => PlaneShape::Circle { radius: *radius },
        ShapeDesc::Box { half_extents } => PlaneShape::Rect { half: *half_extents },
        ShapeDesc::Polygon { points } => {
            let mut half = Vec2::ZERO;
            for p in points {
                half.x = half.x.max(p.x.abs());
                half.y = half.y.max(p.y.abs());
            }
            PlaneShape::Rect { half }
        }
    }
}

struct MoverState {
    body: RigidBodyHandle,
    collider: ColliderHandle,
    radius: f32,
    /// Colliders this mover has touched, in first-touch order
    touched: Vec<BodyHandle>,
    stuck: StuckTracker,
    removal: Option<StaggeredRemoval>,
}

struct StaticState {
    body: RigidBodyHandle,
    category: BodyCategory,
    bounce: BounceCategory,
    restitution: f32,
    shape: PlaneShape,
    rotation: f32,
    position: Vec2,
    hit: bool,
}

/// The board: all bodies, the wrapped engine, and the frame loop
pub struct Playfield {
    world: RigidWorld,
    table: BounceTable,
    handlers: HandlerTable,
    processed: ProcessedContacts,
    pacer: FramePacer,
    clock: StuckClock,
    frame_dt: f32,
    max_rebound_speed: f32,
    movers: BTreeMap<BodyHandle, MoverState>,
    statics: BTreeMap<BodyHandle, StaticState>,
    next_id: u32,
    tick: u64,
    paused: bool,
    contact_scratch: Vec<(ColliderHandle, ColliderHandle)>,
}

impl Playfield {
    pub fn new(config: SimConfig) -> Self {
        Self::with_table(config, BounceTable::standard())
    }

    pub fn with_table(config: SimConfig, table: BounceTable) -> Self {
        Self {
            world: RigidWorld::new(&config),
            table,
            handlers: HandlerTable::default(),
            processed: ProcessedContacts::default(),
            pacer: FramePacer::new(config.frame_dt),
            clock: StuckClock::new(&config.stuck, config.sim_dt),
            frame_dt: config.frame_dt,
            max_rebound_speed: config.max_rebound_speed,
            movers: BTreeMap::new(),
            statics: BTreeMap::new(),
            next_id: 0,
            tick: 0,
            paused: false,
            contact_scratch: Vec::new(),
        }
    }

    /// Create a body from a plain descriptor.
    ///
    /// Static colliders validate their bounce pairing here; a category with
    /// no registered response aborts setup instead of defaulting.
    pub fn add_body(&mut self, desc: &BodyDesc) -> Result<BodyHandle, SetupError> {
        let id = BodyHandle(self.next_id);

        if desc.category.is_mover() {
            let radius = match &desc.shape {
                ShapeDesc::Sphere { radius } => *radius,
                _ => return Err(SetupError::MoverShape),
            };
            let (body, collider) = self.world.add_mover(id.0, desc, radius)?;
            self.movers.insert(
                id,
                MoverState {
                    body,
                    collider,
                    radius: radius.max(crate::consts::MIN_COLLIDER_EXTENT),
                    touched: Vec::new(),
                    stuck: StuckTracker::new(self.tick, &self.clock),
                    removal: None,
                },
            );
        } else {
            let response = self.table.response(MoverClass::Ball, desc.bounce)?;
            let sensor = desc.category.is_sensor();
            let (body, _collider) = self.world.add_static(id.0, desc, response, sensor)?;
            self.statics.insert(
                id,
                StaticState {
                    body,
                    category: desc.category,
                    bounce: desc.bounce,
                    restitution: response.restitution,
                    shape: plane_shape(&desc.shape),
                    rotation: desc.rotation,
                    position: Vec2::new(desc.position.x, desc.position.y),
                    hit: false,
                },
            );
        }

        self.next_id += 1;
        Ok(id)
    }

    /// Remove a body from play. Safe to call twice; the second call is a
    /// no-op returning false.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        if let Some(mover) = self.movers.remove(&handle) {
            self.world.remove(mover.body);
            true
        } else if let Some(stat) = self.statics.remove(&handle) {
            self.world.remove(stat.body);
            true
        } else {
            false
        }
    }

    /// Register the semantic handler for an unordered category pair.
    /// Exactly one handler sees each contact, at most once per frame.
    pub fn on_collision(
        &mut self,
        a: BodyCategory,
        b: BodyCategory,
        handler: impl FnMut(&mut RoundContext, &ContactEvent) + 'static,
    ) {
        self.handlers.register(a, b, handler);
    }

    /// Advance the simulation by one render callback's wall-clock delta.
    ///
    /// The pacer converts wall time into fixed nominal frames (early frames
    /// skip entirely); the world's accumulator converts each nominal frame
    /// into fixed sub-steps. While paused the whole step-and-dispatch
    /// sequence is skipped and the last valid state stays renderable.
    pub fn step(&mut self, wall_dt: f32, ctx: &mut RoundContext) -> FrameReport {
        let mut report = FrameReport::default();
        if self.paused || !self.pacer.tick(wall_dt) {
            return report;
        }
        report.ran = true;

        self.processed.begin_frame();
        let substeps = self.world.accumulate(self.frame_dt);
        report.substeps = substeps;

        for _ in 0..substeps {
            self.tick += 1;
            self.world.substep();
            self.dispatch_contacts(ctx);
            self.snap_movers();
        }

        self.heal_movers();
        self.update_stuck(&mut report);
        report
    }

    // --- queries -----------------------------------------------------------

    pub fn is_stuck(&self, handle: BodyHandle) -> bool {
        self.movers
            .get(&handle)
            .is_some_and(|m| m.removal.is_some())
    }

    /// (colliders removed so far, snapshot size) for a stuck mover's cleanup
    pub fn removal_progress(&self, handle: BodyHandle) -> Option<(usize, usize)> {
        self.movers
            .get(&handle)?
            .removal
            .as_ref()
            .map(|r| r.progress())
    }

    pub fn position(&self, handle: BodyHandle) -> Option<Vec3> {
        if let Some(mover) = self.movers.get(&handle) {
            Some(self.world.position(mover.body))
        } else {
            self.statics
                .get(&handle)
                .map(|s| Vec3::new(s.position.x, s.position.y, 0.0))
        }
    }

    pub fn velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.movers
            .get(&handle)
            .map(|m| self.world.velocity(m.body))
    }

    /// Set a mover's velocity (shot launch). Snapped to the canonical grid
    /// so the aim guide and the actual shot agree.
    pub fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        if let Some(mover) = self.movers.get(&handle) {
            self.world
                .set_velocity(mover.body, determinism::snap_vec3(velocity), true);
        }
    }

    /// Whether a static collider has been hit this round
    pub fn was_hit(&self, handle: BodyHandle) -> Option<bool> {
        self.statics.get(&handle).map(|s| s.hit)
    }

    /// Colliders a mover has touched, in first-touch order
    pub fn touched(&self, handle: BodyHandle) -> Option<&[BodyHandle]> {
        self.movers.get(&handle).map(|m| m.touched.as_slice())
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Simulation time in fixed sub-steps
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn body_count(&self) -> usize {
        self.movers.len() + self.statics.len()
    }

    // --- frame internals ---------------------------------------------------

    fn dispatch_contacts(&mut self, ctx: &mut RoundContext) {
        // Primary channel: scan the narrow phase after the sub-step
        let mut contacts = std::mem::take(&mut self.contact_scratch);
        self.world.active_contacts(&mut contacts);
        for &(c1, c2) in contacts.iter() {
            self.dispatch_pair(c1, c2, ctx);
        }
        self.contact_scratch = contacts;

        // Secondary channel: the engine's event callback. Pairs already seen
        // above are no-ops; sensor overlaps only ever arrive here.
        for (c1, c2) in self.world.drain_contact_events() {
            self.dispatch_pair(c1, c2, ctx);
        }
    }

    fn dispatch_pair(&mut self, c1: ColliderHandle, c2: ColliderHandle, ctx: &mut RoundContext) {
        let Some(a) = self.world.entity_of(c1).map(BodyHandle) else {
            return;
        };
        let Some(b) = self.world.entity_of(c2).map(BodyHandle) else {
            return;
        };
        if a == b || !self.processed.insert(ContactKey::new(a, b)) {
            return;
        }

        match (self.movers.contains_key(&a), self.movers.contains_key(&b)) {
            (true, true) => {
                // Ball on ball: the engine's response stands, only the cap applies
                self.cap_mover(a);
                self.cap_mover(b);
                let event = ContactEvent {
                    mover: a,
                    target: b,
                    target_category: BodyCategory::Ball,
                    first_touch: false,
                    speed: self.mover_speed(a),
                };
                self.handlers
                    .dispatch(BodyCategory::Ball, BodyCategory::Ball, ctx, &event);
            }
            (true, false) => self.dispatch_mover_static(a, b, ctx),
            (false, true) => self.dispatch_mover_static(b, a, ctx),
            (false, false) => {}
        }
    }

    fn dispatch_mover_static(
        &mut self,
        mover_id: BodyHandle,
        static_id: BodyHandle,
        ctx: &mut RoundContext,
    ) {
        let Some(stat) = self.statics.get_mut(&static_id) else {
            return;
        };
        let category = stat.category;

        if category.is_sensor() {
            // Detection only: no response, no cap, no contact bookkeeping
            let speed = match self.movers.get(&mover_id) {
                Some(mover) => self.world.velocity(mover.body).length(),
                None => return,
            };
            let event = ContactEvent {
                mover: mover_id,
                target: static_id,
                target_category: category,
                first_touch: false,
                speed,
            };
            self.handlers
                .dispatch(BodyCategory::Ball, category, ctx, &event);
            return;
        }

        let Some(mover) = self.movers.get_mut(&mover_id) else {
            return;
        };
        let first_touch = !mover.touched.contains(&static_id);
        if first_touch {
            mover.touched.push(static_id);
        }
        mover.stuck.record_contact(static_id, self.tick, first_touch);
        stat.hit = true;

        // Response overrides for the two geometries the generic solver
        // resolves badly
        let pos = self.world.position(mover.body);
        let vel = self.world.velocity(mover.body);
        let pos2 = Vec2::new(pos.x, pos.y);
        let vel2 = Vec2::new(vel.x, vel.y);
        match stat.shape {
            PlaneShape::Rect { half } => {
                if let Some(out) = normalizer::corner_response(
                    pos2,
                    vel2,
                    stat.position,
                    stat.rotation,
                    half,
                    stat.restitution,
                ) {
                    self.world
                        .set_velocity(mover.body, Vec3::new(out.x, out.y, 0.0), true);
                }
            }
            PlaneShape::Circle { radius } => {
                if let Some(out) = normalizer::overlap_response(
                    pos2,
                    vel2,
                    mover.radius,
                    stat.position,
                    radius,
                    stat.restitution,
                ) {
                    self.world.set_position(
                        mover.body,
                        Vec3::new(out.position.x, out.position.y, 0.0),
                        true,
                    );
                    self.world.set_velocity(
                        mover.body,
                        Vec3::new(out.velocity.x, out.velocity.y, 0.0),
                        true,
                    );
                }
            }
        }

        // Restore the invariants the engine sometimes drops on its own
        self.world.wake(mover.body);
        self.world.set_collision_response(mover.collider, true);

        // No-bounce surfaces stop the mover dead
        if stat.bounce == BounceCategory::NoBounce {
            self.world.set_velocity(mover.body, Vec3::ZERO, true);
        }

        // Rebound cap, applied regardless of which path resolved the contact
        let vel = self.world.velocity(mover.body);
        let capped = clamp_rebound(vel, self.max_rebound_speed);
        if capped != vel {
            self.world.set_velocity(mover.body, capped, true);
        }

        let event = ContactEvent {
            mover: mover_id,
            target: static_id,
            target_category: category,
            first_touch,
            speed: capped.length(),
        };
        self.handlers
            .dispatch(BodyCategory::Ball, category, ctx, &event);
    }

    fn cap_mover(&mut self, id: BodyHandle) {
        let Some(mover) = self.movers.get(&id) else {
            return;
        };
        let vel = self.world.velocity(mover.body);
        let capped = clamp_rebound(vel, self.max_rebound_speed);
        if capped != vel {
            self.world.set_velocity(mover.body, capped, true);
        }
    }

    fn mover_speed(&self, id: BodyHandle) -> f32 {
        self.movers
            .get(&id)
            .map(|m| self.world.velocity(m.body).length())
            .unwrap_or(0.0)
    }

    fn snap_movers(&mut self) {
        let tick = self.tick;
        for mover in self.movers.values_mut() {
            let vel = self.world.snap_mover(mover.body);
            mover.stuck.sample_speed(vel.length(), tick, &self.clock);
        }
    }

    fn heal_movers(&mut self) {
        for mover in self.movers.values() {
            if !self.world.collision_response(mover.collider) {
                log::warn!("mover collider response flag dropped by engine; restored");
                self.world.set_collision_response(mover.collider, true);
            }
        }
    }

    fn update_stuck(&mut self, report: &mut FrameReport) {
        let tick = self.tick;
        let mut due: Vec<BodyHandle> = Vec::new();

        for (id, mover) in self.movers.iter_mut() {
            if mover.removal.is_none() {
                if let Some(reason) = mover.stuck.check(tick, &self.clock) {
                    log::debug!(
                        "mover {:?} judged stuck ({:?}); staggered cleanup of {} colliders",
                        id,
                        reason,
                        mover.touched.len()
                    );
                    mover.removal = Some(StaggeredRemoval::new(
                        mover.touched.clone(),
                        tick,
                        self.clock.removal_interval,
                    ));
                    report.newly_stuck.push((*id, reason));
                }
            }
            if let Some(removal) = mover.removal.as_mut() {
                if let Some(victim) = removal.pop_due(tick) {
                    due.push(victim);
                }
            }
        }

        for victim in due {
            if self.remove_body(victim) {
                report.removed.push(victim);
            }
        }
    }
}
