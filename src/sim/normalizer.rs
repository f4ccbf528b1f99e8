//! Corner and overlap response overrides
//!
//! Two contact geometries confuse the generic solver: a ball striking near
//! the corner of a rectangular collider (more than one simultaneously valid
//! contact face), and a ball deeply overlapping a much smaller round
//! collider. In both, the manifold does not correspond to any single
//! intuitive bounce, so these overrides pick one dominant normal
//! deterministically and reflect about it.
//!
//! Both functions are state-free: they look only at position and velocity at
//! contact time, and their outputs land on the canonical rounding grid.

use glam::Vec2;

use crate::sim::determinism::snap_vec2;

/// Fraction of the smaller half-extent that counts as "near the corner"
pub const CORNER_THRESHOLD: f32 = 0.4;
/// Mover/collider radius ratio past which the deep-overlap path takes over
pub const OVERLAP_RATIO: f32 = 1.5;
/// Extra separation added when pushing an overlapping mover out
const PUSH_OUT_MARGIN: f32 = 0.01;
/// Slack on the minimum separation distance for the overlap check
const OVERLAP_TOLERANCE: f32 = 0.02;

/// Standard reflection: v' = v - 2(v·n)n
#[inline]
pub fn reflect_velocity(velocity: Vec2, normal: Vec2) -> Vec2 {
    velocity - 2.0 * velocity.dot(normal) * normal
}

#[inline]
fn rotate(v: Vec2, angle: f32) -> Vec2 {
    if angle == 0.0 {
        return v;
    }
    let (sin, cos) = angle.sin_cos();
    Vec2::new(cos * v.x - sin * v.y, sin * v.x + cos * v.y)
}

/// Replace the engine response for a ball hitting a rectangular collider
/// near one of its corners.
///
/// The ball's position is taken into the collider's local frame so rotated
/// pieces behave like axis-aligned ones. Only a contact within
/// [`CORNER_THRESHOLD`] of *both* the horizontal and vertical boundary is a
/// corner; against a flat face the engine's own response stands and this
/// returns `None`. Near a corner, the dominant axis of travel picks a single
/// face normal (sign opposing the motion) and the velocity reflects about it,
/// scaled by the registered restitution.
pub fn corner_response(
    mover_pos: Vec2,
    mover_vel: Vec2,
    collider_pos: Vec2,
    collider_rot: f32,
    half_extents: Vec2,
    restitution: f32,
) -> Option<Vec2> {
    let local_pos = rotate(mover_pos - collider_pos, -collider_rot);
    let threshold = CORNER_THRESHOLD * half_extents.x.min(half_extents.y);
    let near_x = half_extents.x - local_pos.x.abs() <= threshold;
    let near_y = half_extents.y - local_pos.y.abs() <= threshold;
    if !(near_x && near_y) {
        return None;
    }

    let local_vel = rotate(mover_vel, -collider_rot);
    let normal = if local_vel.x.abs() >= local_vel.y.abs() {
        Vec2::new(-local_vel.x.signum(), 0.0)
    } else {
        Vec2::new(0.0, -local_vel.y.signum())
    };

    let reflected = reflect_velocity(local_vel, normal) * restitution;
    Some(snap_vec2(rotate(reflected, collider_rot)))
}

/// Outcome of the deep-overlap override
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapResponse {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Replace the engine response for a ball at least [`OVERLAP_RATIO`] times
/// larger than a round static collider it overlaps.
///
/// Deep interpenetration between badly mismatched radii confuses the solver,
/// so the normal is taken straight from collider center to mover center. The
/// mover is always pushed out along it by the overlap depth plus a safety
/// margin (otherwise the same contact re-triggers next sub-step); the
/// velocity reflects only while the mover is still heading into the collider.
pub fn overlap_response(
    mover_pos: Vec2,
    mover_vel: Vec2,
    mover_radius: f32,
    collider_pos: Vec2,
    collider_radius: f32,
    restitution: f32,
) -> Option<OverlapResponse> {
    if mover_radius < OVERLAP_RATIO * collider_radius {
        return None;
    }

    let delta = mover_pos - collider_pos;
    let dist = delta.length();
    let min_sep = mover_radius + collider_radius;
    if dist > min_sep + OVERLAP_TOLERANCE {
        return None;
    }

    // Concentric centers leave no direction to separate along; eject upward
    let normal = if dist > f32::EPSILON { delta / dist } else { Vec2::Y };
    let overlap = (min_sep - dist).max(0.0);
    let position = snap_vec2(mover_pos + normal * (overlap + PUSH_OUT_MARGIN));

    let velocity = if mover_vel.dot(normal) < 0.0 {
        snap_vec2(reflect_velocity(mover_vel, normal) * restitution)
    } else {
        mover_vel
    };

    Some(OverlapResponse { position, velocity })
}
