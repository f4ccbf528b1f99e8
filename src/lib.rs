//! Pegdrop - deterministic physics core for a peg-board ball-drop game
//!
//! Core modules:
//! - `sim`: deterministic simulation (engine wrapper, collision dispatch,
//!   response normalization, stuck detection)
//! - `config`: data-driven tuning for the simulation core
//!
//! Rendering, audio, HUD updates and level-file parsing live outside this
//! crate; gameplay drives the core through [`sim::Playfield`] and plain
//! in-memory [`sim::BodyDesc`] values.

pub mod config;
pub mod sim;

pub use config::{SimConfig, StuckConfig};
pub use sim::{
    BodyCategory, BodyDesc, BodyHandle, BounceCategory, BounceTable, ContactEvent, FrameReport,
    Playfield, RoundContext, SetupError, ShapeDesc, StuckReason,
};

/// Simulation constants
pub mod consts {
    /// Fixed physics sub-step (120 Hz)
    pub const SIM_DT: f32 = 1.0 / 120.0;
    /// Nominal frame delta the simulation is driven with (60 Hz)
    pub const FRAME_DT: f32 = 1.0 / 60.0;
    /// Maximum sub-steps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;
    /// Wall-clock delta clamp; stall time past this is dropped, not replayed
    pub const MAX_FRAME_DELTA: f32 = 0.05;

    /// Board gravity (units/s², negative = down the board)
    pub const GRAVITY_Y: f32 = -9.81;
    /// Velocity solver iterations handed to the engine
    pub const SOLVER_ITERATIONS: usize = 8;

    /// Ball defaults (board units)
    pub const BALL_RADIUS: f32 = 0.25;
    /// Peg defaults
    pub const PEG_RADIUS: f32 = 0.18;

    /// Max speed a mover may leave any physical collision with
    pub const MAX_REBOUND_SPEED: f32 = 7.5;
    /// Smallest collider radius/half-extent accepted at construction
    pub const MIN_COLLIDER_EXTENT: f32 = 0.01;
    /// Half-depth used to extrude 2D board shapes through the play plane
    pub const BOARD_HALF_DEPTH: f32 = 0.5;
}
