//! Collision dispatch
//!
//! Turns raw engine contacts into at-most-one semantic event per body pair
//! per frame. Two notification channels report contacts (the narrow-phase
//! scan after each sub-step, and the engine's event callback; either one
//! alone can miss fast movers); both funnel through the same processed-pair
//! set, so whichever fires first wins and the other is a no-op.

use std::collections::{HashMap, HashSet};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::sim::body::{BodyCategory, BodyHandle};
use crate::sim::determinism;

/// Unordered pair key over stable entity identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactKey(BodyHandle, BodyHandle);

impl ContactKey {
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }
}

/// Per-frame processed-pair set.
///
/// Rebuilt every frame by clearing and reusing the same allocation rather
/// than allocating fresh.
#[derive(Debug, Default)]
pub struct ProcessedContacts {
    seen: HashSet<ContactKey>,
}

impl ProcessedContacts {
    pub fn begin_frame(&mut self) {
        self.seen.clear();
    }

    /// Returns true the first time a key is seen this frame.
    pub fn insert(&mut self, key: ContactKey) -> bool {
        self.seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// One semantic collision, delivered to at most one handler per frame
#[derive(Debug, Clone, Copy)]
pub struct ContactEvent {
    pub mover: BodyHandle,
    pub target: BodyHandle,
    pub target_category: BodyCategory,
    /// First time this mover has ever touched this target
    pub first_touch: bool,
    /// Mover speed after the response (post-cap, post-snap)
    pub speed: f32,
}

/// Gameplay counters passed explicitly into collision handlers.
///
/// The core never reads these; it only threads them through so handlers
/// don't reach for ambient state and the sim stays independently testable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundContext {
    pub score: u64,
    pub multiplier: u32,
    pub pegs_hit: u32,
    pub balls_lost: u32,
}

impl Default for RoundContext {
    fn default() -> Self {
        Self {
            score: 0,
            multiplier: 1,
            pegs_hit: 0,
            balls_lost: 0,
        }
    }
}

pub type CollisionHandler = Box<dyn FnMut(&mut RoundContext, &ContactEvent)>;

/// Handlers keyed by unordered category pair
#[derive(Default)]
pub struct HandlerTable {
    map: HashMap<(BodyCategory, BodyCategory), CollisionHandler>,
}

impl HandlerTable {
    fn key(a: BodyCategory, b: BodyCategory) -> (BodyCategory, BodyCategory) {
        if a <= b { (a, b) } else { (b, a) }
    }

    pub fn register(
        &mut self,
        a: BodyCategory,
        b: BodyCategory,
        handler: impl FnMut(&mut RoundContext, &ContactEvent) + 'static,
    ) {
        self.map.insert(Self::key(a, b), Box::new(handler));
    }

    /// Invoke the handler registered for this pair, if any. Exactly one
    /// handler sees each event.
    pub fn dispatch(
        &mut self,
        a: BodyCategory,
        b: BodyCategory,
        ctx: &mut RoundContext,
        event: &ContactEvent,
    ) -> bool {
        if let Some(handler) = self.map.get_mut(&Self::key(a, b)) {
            handler(ctx, event);
            true
        } else {
            false
        }
    }

    pub fn is_registered(&self, a: BodyCategory, b: BodyCategory) -> bool {
        self.map.contains_key(&Self::key(a, b))
    }
}

/// Cap a post-collision velocity at the maximum rebound speed.
///
/// Rescales the whole vector so the direction survives, then snaps the
/// result: clamp first, round second.
pub fn clamp_rebound(vel: Vec3, max_speed: f32) -> Vec3 {
    let speed = vel.length();
    if speed > max_speed && speed > 0.0 {
        determinism::snap_vec3(vel * (max_speed / speed))
    } else {
        vel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_key_is_unordered() {
        let a = BodyHandle(3);
        let b = BodyHandle(9);
        assert_eq!(ContactKey::new(a, b), ContactKey::new(b, a));
        assert_ne!(ContactKey::new(a, b), ContactKey::new(a, BodyHandle(10)));
    }

    #[test]
    fn test_processed_set_admits_each_pair_once() {
        let mut processed = ProcessedContacts::default();
        let key = ContactKey::new(BodyHandle(1), BodyHandle(2));
        assert!(processed.insert(key));
        // Second notification channel reporting the same pair is a no-op
        assert!(!processed.insert(ContactKey::new(BodyHandle(2), BodyHandle(1))));
        assert_eq!(processed.len(), 1);

        processed.begin_frame();
        assert!(processed.is_empty());
        assert!(processed.insert(key));
    }

    #[test]
    fn test_handler_routing_is_order_insensitive() {
        let mut table = HandlerTable::default();
        table.register(BodyCategory::Ball, BodyCategory::Peg, |ctx, _event| {
            ctx.pegs_hit += 1;
        });

        let mut ctx = RoundContext::default();
        let event = ContactEvent {
            mover: BodyHandle(0),
            target: BodyHandle(1),
            target_category: BodyCategory::Peg,
            first_touch: true,
            speed: 3.0,
        };
        assert!(table.dispatch(BodyCategory::Peg, BodyCategory::Ball, &mut ctx, &event));
        assert!(table.dispatch(BodyCategory::Ball, BodyCategory::Peg, &mut ctx, &event));
        assert_eq!(ctx.pegs_hit, 2);
        assert!(!table.dispatch(BodyCategory::Ball, BodyCategory::Wall, &mut ctx, &event));
    }

    #[test]
    fn test_rebound_cap_rescales_to_the_cap() {
        // Speed 10 into a super-bouncy surface may leave at 12; the cap wins
        let vel = Vec3::new(0.0, 12.0, 0.0);
        let capped = clamp_rebound(vel, 7.5);
        assert!((capped.length() - 7.5).abs() < 1e-3);
        assert!(capped.y > 0.0);
    }

    #[test]
    fn test_rebound_cap_leaves_slow_movers_alone() {
        let vel = Vec3::new(1.0, -2.0, 0.0);
        assert_eq!(clamp_rebound(vel, 7.5), vel);
    }

    #[test]
    fn test_rebound_cap_output_is_snapped() {
        let vel = Vec3::new(5.0, 9.0, 0.0);
        let capped = clamp_rebound(vel, 7.5);
        assert_eq!(capped, determinism::snap_vec3(capped));
    }
}
