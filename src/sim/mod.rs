//! Deterministic simulation module
//!
//! All physics-facing logic lives here. This module must be pure and
//! deterministic:
//! - Fixed timestep only
//! - State snapped to a canonical decimal grid after every physics update
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies

pub mod body;
pub mod determinism;
pub mod dispatch;
pub mod materials;
pub mod normalizer;
pub mod playfield;
pub mod stuck;
pub mod world;

pub use body::{BodyCategory, BodyDesc, BodyHandle, ShapeDesc};
pub use dispatch::{ContactEvent, ContactKey, ProcessedContacts, RoundContext};
pub use materials::{BounceCategory, BounceTable, MoverClass, SurfaceResponse};
pub use playfield::{FrameReport, Playfield};
pub use stuck::StuckReason;
pub use world::RigidWorld;

use thiserror::Error;

/// Fatal setup-time configuration errors.
///
/// These abort round construction; none of them is silently defaulted, since
/// a wrong fallback restitution would quietly corrupt gameplay feel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    /// A static collider was created with a bounce category that has no
    /// registered response for the mover class that can hit it.
    #[error("no bounce response registered for {mover:?} against {bounce:?}")]
    UnregisteredPairing {
        mover: MoverClass,
        bounce: BounceCategory,
    },
    /// Shape parameters that cannot produce valid collision geometry.
    #[error("degenerate collider shape: {0}")]
    DegenerateShape(&'static str),
    /// Movers are circular; other shapes are rejected at creation.
    #[error("movers must use a sphere shape")]
    MoverShape,
}
