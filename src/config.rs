//! Simulation tuning
//!
//! Data-driven knobs for the physics core. The editor persists these
//! alongside level content; the core itself never touches disk.

use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Top-level simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Gravity along the board's Y axis (units/s², negative = down)
    pub gravity_y: f32,
    /// Velocity solver iterations handed to the rigid-body engine
    pub solver_iterations: usize,

    /// Nominal frame delta the sim is driven with (seconds)
    pub frame_dt: f32,
    /// Fixed physics sub-step (seconds)
    pub sim_dt: f32,
    /// Maximum sub-steps per frame
    pub max_substeps: u32,
    /// Wall-clock delta clamp (seconds)
    pub max_frame_delta: f32,

    /// Post-collision speed cap (units/s)
    pub max_rebound_speed: f32,

    /// Stuck-detection thresholds
    pub stuck: StuckConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            gravity_y: GRAVITY_Y,
            solver_iterations: SOLVER_ITERATIONS,
            frame_dt: FRAME_DT,
            sim_dt: SIM_DT,
            max_substeps: MAX_SUBSTEPS,
            max_frame_delta: MAX_FRAME_DELTA,
            max_rebound_speed: MAX_REBOUND_SPEED,
            stuck: StuckConfig::default(),
        }
    }
}

/// Thresholds for the three stuck-detection signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StuckConfig {
    /// Genuine contacts required before any stuck signal may fire
    pub min_contacts: u32,
    /// Cadence of the repeat-pattern check (seconds)
    pub check_interval: f32,
    /// Two contacts closer together than this look like a tight loop (seconds)
    pub pattern_window: f32,
    /// Consecutive positive pattern checks required for a verdict
    pub pattern_trips: u32,
    /// Speed below which a mover counts as not meaningfully moving (units/s)
    pub min_live_speed: f32,
    /// Time below the live-speed threshold before the stagnation signal trips (seconds)
    pub stagnation_timeout: f32,
    /// Time without a never-before-touched contact before the timeout signal trips (seconds)
    pub new_contact_timeout: f32,
    /// Cadence of staggered collider removal after a stuck verdict (seconds)
    pub removal_interval: f32,
}

impl Default for StuckConfig {
    fn default() -> Self {
        Self {
            min_contacts: 3,
            check_interval: 1.6,
            pattern_window: 0.2,
            pattern_trips: 2,
            min_live_speed: 0.35,
            stagnation_timeout: 1.0,
            new_contact_timeout: 5.0,
            removal_interval: 0.15,
        }
    }
}
