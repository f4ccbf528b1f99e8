//! Bounce materials
//!
//! Single source of truth for how a mover responds to each static surface
//! category. Every pairing a board can produce must be registered before the
//! round starts; looking up an unregistered pairing is a setup error, never
//! a silent default.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::sim::SetupError;

/// Bounce behavior assigned to a static collider at creation.
///
/// The category is immutable for the collider's lifetime; changing it means
/// rebuilding the collider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BounceCategory {
    /// Regular peg/wall bounce, slightly livelier than a neutral surface
    Normal,
    /// Low-energy bounce for soft zones
    Dampened,
    /// The mover stops dead on contact
    NoBounce,
    /// Net energy gain per bounce, used for special zones
    SuperBouncy,
}

/// Class of dynamic object a pairing is registered for.
///
/// Only the ball exists today, but the table is keyed on the pair so new
/// mover types register their own rows instead of inheriting the ball's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoverClass {
    Ball,
}

/// Restitution/friction pair for one (mover, surface) pairing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceResponse {
    pub restitution: f32,
    pub friction: f32,
}

impl SurfaceResponse {
    /// Frictionless response; all of the ball's directional control comes
    /// from stored velocity, never from contact drag.
    pub fn bounce(restitution: f32) -> Self {
        Self {
            restitution,
            friction: 0.0,
        }
    }
}

/// Registered (mover × bounce-category) responses
#[derive(Debug, Clone, Default)]
pub struct BounceTable {
    map: HashMap<(MoverClass, BounceCategory), SurfaceResponse>,
}

impl BounceTable {
    /// Table with every pairing the stock boards use.
    pub fn standard() -> Self {
        let mut table = Self::default();
        table.register(MoverClass::Ball, BounceCategory::Normal, SurfaceResponse::bounce(0.87));
        table.register(MoverClass::Ball, BounceCategory::Dampened, SurfaceResponse::bounce(0.3));
        table.register(MoverClass::Ball, BounceCategory::NoBounce, SurfaceResponse::bounce(0.0));
        table.register(MoverClass::Ball, BounceCategory::SuperBouncy, SurfaceResponse::bounce(1.2));
        table
    }

    pub fn register(&mut self, mover: MoverClass, bounce: BounceCategory, response: SurfaceResponse) {
        self.map.insert((mover, bounce), response);
    }

    /// Look up the response for a pairing. Unregistered pairings are a
    /// configuration error and abort setup.
    pub fn response(
        &self,
        mover: MoverClass,
        bounce: BounceCategory,
    ) -> Result<SurfaceResponse, SetupError> {
        self.map
            .get(&(mover, bounce))
            .copied()
            .ok_or(SetupError::UnregisteredPairing { mover, bounce })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_covers_every_category() {
        let table = BounceTable::standard();
        for bounce in [
            BounceCategory::Normal,
            BounceCategory::Dampened,
            BounceCategory::NoBounce,
            BounceCategory::SuperBouncy,
        ] {
            let response = table.response(MoverClass::Ball, bounce).unwrap();
            assert!(
                response.friction == 0.0,
                "ball must never acquire contact drag ({:?})",
                bounce
            );
        }
    }

    #[test]
    fn test_standard_restitution_ordering() {
        let table = BounceTable::standard();
        let normal = table.response(MoverClass::Ball, BounceCategory::Normal).unwrap();
        let dampened = table.response(MoverClass::Ball, BounceCategory::Dampened).unwrap();
        let dead = table.response(MoverClass::Ball, BounceCategory::NoBounce).unwrap();
        let lively = table.response(MoverClass::Ball, BounceCategory::SuperBouncy).unwrap();

        assert_eq!(dead.restitution, 0.0);
        assert!(dampened.restitution < normal.restitution);
        assert!(normal.restitution < 1.0);
        assert!(lively.restitution > 1.0);
    }

    #[test]
    fn test_unregistered_pairing_is_fatal() {
        let table = BounceTable::default();
        let err = table
            .response(MoverClass::Ball, BounceCategory::Normal)
            .unwrap_err();
        assert!(matches!(err, crate::sim::SetupError::UnregisteredPairing { .. }));
    }

    #[test]
    fn test_register_overrides_existing_pairing() {
        let mut table = BounceTable::standard();
        table.register(
            MoverClass::Ball,
            BounceCategory::Normal,
            SurfaceResponse::bounce(0.5),
        );
        let response = table.response(MoverClass::Ball, BounceCategory::Normal).unwrap();
        assert!((response.restitution - 0.5).abs() < 1e-6);
    }
}
