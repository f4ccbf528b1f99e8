//! Determinism layer
//!
//! Floating-point drift across many sub-steps is the dominant source of
//! replay divergence, so after every physics update each mover's position and
//! velocity are snapped back to a fixed 3-decimal grid. Anything that feeds
//! state forward (velocity clamps, aim math for the next shot) must round its
//! own output through the same helpers, clamp first and round second.

use glam::{Vec2, Vec3};

/// Canonical rounding grid: three decimal places
pub const SNAP_SCALE: f32 = 1_000.0;

/// Round a scalar to the canonical grid
#[inline]
pub fn snap(x: f32) -> f32 {
    (x * SNAP_SCALE).round() / SNAP_SCALE
}

#[inline]
pub fn snap_vec2(v: Vec2) -> Vec2 {
    Vec2::new(snap(v.x), snap(v.y))
}

#[inline]
pub fn snap_vec3(v: Vec3) -> Vec3 {
    Vec3::new(snap(v.x), snap(v.y), snap(v.z))
}

/// Replace a non-finite component with a safe baseline.
///
/// Rare solver edge cases can emit NaN/Inf; those are recovered locally
/// instead of propagating through every later frame.
#[inline]
pub fn sanitize(x: f32, fallback: f32) -> f32 {
    if x.is_finite() { x } else { fallback }
}

/// Runs simulation frames at a fixed nominal delta.
///
/// Wall-clock deltas are banked; a frame runs only once at least one nominal
/// delta has elapsed, and always runs with exactly the nominal delta. Frames
/// arriving early are skipped rather than stepped short.
#[derive(Debug, Clone)]
pub struct FramePacer {
    nominal_dt: f32,
    banked: f32,
}

impl FramePacer {
    pub fn new(nominal_dt: f32) -> Self {
        Self {
            nominal_dt,
            banked: 0.0,
        }
    }

    /// Bank elapsed wall time; returns true when a frame should run now.
    pub fn tick(&mut self, wall_dt: f32) -> bool {
        self.banked += wall_dt.max(0.0);
        if self.banked + 1e-6 < self.nominal_dt {
            return false;
        }
        self.banked -= self.nominal_dt;
        // A long stall may bank many frames; keep at most one in reserve so
        // the catch-up burst is bounded (the world's accumulator clamp
        // handles the rest).
        if self.banked > self.nominal_dt {
            self.banked = self.nominal_dt;
        }
        true
    }

    pub fn reset(&mut self) {
        self.banked = 0.0;
    }
}

/// Unit direction for an aim angle, rounded the same way simulation state is.
///
/// Aim guides run outside the physics step but feed the next shot's initial
/// velocity, so their intermediate values must land on the canonical grid too.
pub fn aim_direction(angle: f32) -> Vec2 {
    let angle = snap(angle);
    snap_vec2(Vec2::new(angle.cos(), angle.sin()))
}

/// Launch velocity for a shot at `angle` with `speed`, on the canonical grid.
pub fn launch_velocity(angle: f32, speed: f32) -> Vec3 {
    let dir = aim_direction(angle);
    let speed = snap(speed);
    snap_vec3(Vec3::new(dir.x * speed, dir.y * speed, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_rounds_to_three_decimals() {
        assert_eq!(snap(1.23456), 1.235);
        assert_eq!(snap(-1.23456), -1.235);
        assert_eq!(snap(0.0004), 0.0);
        assert_eq!(snap(2.0), 2.0);
    }

    #[test]
    fn test_snap_is_idempotent() {
        for x in [0.001, -3.25, 17.125, 0.333] {
            assert_eq!(snap(snap(x)), snap(x));
        }
    }

    #[test]
    fn test_sanitize_replaces_non_finite() {
        assert_eq!(sanitize(f32::NAN, 0.0), 0.0);
        assert_eq!(sanitize(f32::INFINITY, 1.5), 1.5);
        assert_eq!(sanitize(-2.5, 0.0), -2.5);
    }

    #[test]
    fn test_pacer_skips_early_frames() {
        let mut pacer = FramePacer::new(1.0 / 60.0);
        // Three quick 120 Hz callbacks: run, skip, run
        assert!(!pacer.tick(1.0 / 120.0));
        assert!(pacer.tick(1.0 / 120.0));
        assert!(!pacer.tick(1.0 / 120.0));
        assert!(pacer.tick(1.0 / 120.0));
    }

    #[test]
    fn test_pacer_bounds_stall_catchup() {
        let mut pacer = FramePacer::new(1.0 / 60.0);
        assert!(pacer.tick(0.5));
        // One banked frame at most: runs once more, then waits again
        assert!(pacer.tick(0.0));
        assert!(!pacer.tick(0.0));
    }

    #[test]
    fn test_aim_direction_is_mirror_symmetric() {
        let up = aim_direction(0.3);
        let down = aim_direction(-0.3);
        assert_eq!(up.x, down.x);
        assert_eq!(up.y, -down.y);
    }

    #[test]
    fn test_launch_velocity_lands_on_grid() {
        let vel = launch_velocity(0.7, 6.5);
        assert_eq!(vel, snap_vec3(vel));
        assert_eq!(vel.z, 0.0);
    }
}
