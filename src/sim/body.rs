//! Body descriptors
//!
//! The gameplay and editor layers describe colliders with plain data; the
//! playfield turns a [`BodyDesc`] into an engine body and hands back a
//! stable [`BodyHandle`]. No engine types leak through this surface.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::consts::{BALL_RADIUS, PEG_RADIUS};
use crate::sim::materials::BounceCategory;

/// Stable identifier for one entity wrapper (mover or static collider).
///
/// Handles are never reused within a round; contact keys are built from
/// them, so they must stay stable for the entity's whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub u32);

/// Semantic collider category used for handler routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BodyCategory {
    /// The dynamic ball
    Ball,
    /// Round target peg
    Peg,
    /// Flat or polygonal wall piece
    Wall,
    /// Special high-restitution zone
    BounceZone,
    /// Catch bucket; detection only, no physical response
    CatchSensor,
    /// Out-of-bounds collector below the board
    Boundary,
}

impl BodyCategory {
    /// Contacts with a sensor never change the mover's velocity
    pub fn is_sensor(self) -> bool {
        matches!(self, BodyCategory::CatchSensor)
    }

    pub fn is_mover(self) -> bool {
        matches!(self, BodyCategory::Ball)
    }
}

/// Collider shape parameters. The board plane is X/Y; flat shapes are
/// extruded through it and movement out of the plane is locked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeDesc {
    Sphere { radius: f32 },
    Box { half_extents: Vec2 },
    /// Convex outline in board coordinates
    Polygon { points: Vec<Vec2> },
}

/// Plain-data description of a body, handed over by the level loader or
/// spawned by gameplay (ball shot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyDesc {
    pub category: BodyCategory,
    pub position: Vec3,
    /// Rotation about the board normal (radians)
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub velocity: Vec3,
    pub shape: ShapeDesc,
    pub bounce: BounceCategory,
}

impl BodyDesc {
    /// A ball ready to be shot; give it a launch velocity before or after
    /// insertion.
    pub fn ball(position: Vec3) -> Self {
        Self {
            category: BodyCategory::Ball,
            position,
            rotation: 0.0,
            velocity: Vec3::ZERO,
            shape: ShapeDesc::Sphere { radius: BALL_RADIUS },
            bounce: BounceCategory::Normal,
        }
    }

    pub fn peg(position: Vec3) -> Self {
        Self {
            category: BodyCategory::Peg,
            position,
            rotation: 0.0,
            velocity: Vec3::ZERO,
            shape: ShapeDesc::Sphere { radius: PEG_RADIUS },
            bounce: BounceCategory::Normal,
        }
    }

    pub fn wall(position: Vec3, half_extents: Vec2, rotation: f32) -> Self {
        Self {
            category: BodyCategory::Wall,
            position,
            rotation,
            velocity: Vec3::ZERO,
            shape: ShapeDesc::Box { half_extents },
            bounce: BounceCategory::Normal,
        }
    }

    pub fn bounce_zone(position: Vec3, half_extents: Vec2, rotation: f32) -> Self {
        Self {
            category: BodyCategory::BounceZone,
            position,
            rotation,
            velocity: Vec3::ZERO,
            shape: ShapeDesc::Box { half_extents },
            bounce: BounceCategory::SuperBouncy,
        }
    }

    pub fn catch_sensor(position: Vec3, half_extents: Vec2) -> Self {
        Self {
            category: BodyCategory::CatchSensor,
            position,
            rotation: 0.0,
            velocity: Vec3::ZERO,
            shape: ShapeDesc::Box { half_extents },
            bounce: BounceCategory::NoBounce,
        }
    }

    pub fn boundary(position: Vec3, half_extents: Vec2) -> Self {
        Self {
            category: BodyCategory::Boundary,
            position,
            rotation: 0.0,
            velocity: Vec3::ZERO,
            shape: ShapeDesc::Box { half_extents },
            bounce: BounceCategory::NoBounce,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_bounce(mut self, bounce: BounceCategory) -> Self {
        self.bounce = bounce;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.shape = ShapeDesc::Sphere { radius };
        self
    }
}
