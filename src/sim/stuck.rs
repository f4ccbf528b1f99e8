//! Stuck-entity detection
//!
//! A ball can wedge into a pocket of pegs and micro-bounce forever, or come
//! to rest against geometry without ever reaching a catcher. Three
//! independent signals watch for that; any one of them produces a verdict,
//! and the verdict starts a staggered removal of the colliders the ball has
//! already hit so the round can wind down instead of stalling.
//!
//! All times are simulation ticks (fixed sub-steps), never wall-clock.

use crate::config::StuckConfig;
use crate::sim::body::BodyHandle;

/// Which signal tripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckReason {
    /// The last two contacts repeated inside the pattern window on
    /// consecutive checks
    RepeatPattern,
    /// No meaningfully fast movement for the stagnation timeout
    Stagnant,
    /// No never-before-touched contact for the full timeout
    NoNewContacts,
}

/// Stuck thresholds converted to tick counts once, at setup
#[derive(Debug, Clone)]
pub struct StuckClock {
    pub min_contacts: u32,
    pub check_interval: u64,
    pub pattern_window: u64,
    pub pattern_trips: u32,
    pub min_live_speed: f32,
    pub stagnation_timeout: u64,
    pub new_contact_timeout: u64,
    pub removal_interval: u64,
}

impl StuckClock {
    pub fn new(config: &StuckConfig, sim_dt: f32) -> Self {
        let ticks = |seconds: f32| (seconds / sim_dt).round().max(1.0) as u64;
        Self {
            min_contacts: config.min_contacts,
            check_interval: ticks(config.check_interval),
            pattern_window: ticks(config.pattern_window),
            pattern_trips: config.pattern_trips,
            min_live_speed: config.min_live_speed,
            stagnation_timeout: ticks(config.stagnation_timeout),
            new_contact_timeout: ticks(config.new_contact_timeout),
            removal_interval: ticks(config.removal_interval),
        }
    }
}

/// Per-mover stuck tracking state.
///
/// Accumulates toward a verdict; a genuinely new contact resets the pattern
/// counter and the timeout baseline.
#[derive(Debug, Clone)]
pub struct StuckTracker {
    /// Last two contacts, oldest first
    recent: [Option<(BodyHandle, u64)>; 2],
    last_new_contact: u64,
    last_fast_sample: u64,
    pattern_hits: u32,
    next_check: u64,
    contacts: u32,
}

impl StuckTracker {
    pub fn new(spawn_tick: u64, clock: &StuckClock) -> Self {
        Self {
            recent: [None, None],
            last_new_contact: spawn_tick,
            last_fast_sample: spawn_tick,
            pattern_hits: 0,
            next_check: spawn_tick + clock.check_interval,
            contacts: 0,
        }
    }

    /// Record a physical contact. `first_touch` marks a collider this mover
    /// has never hit before.
    pub fn record_contact(&mut self, target: BodyHandle, tick: u64, first_touch: bool) {
        self.recent[0] = self.recent[1].take();
        self.recent[1] = Some((target, tick));
        self.contacts += 1;
        if first_touch {
            self.last_new_contact = tick;
            self.pattern_hits = 0;
        }
    }

    /// Track the last time the mover was meaningfully moving.
    pub fn sample_speed(&mut self, speed: f32, tick: u64, clock: &StuckClock) {
        if speed > clock.min_live_speed {
            self.last_fast_sample = tick;
        }
    }

    pub fn contact_count(&self) -> u32 {
        self.contacts
    }

    /// Run the stuck checks for this tick. At most one verdict per call;
    /// nothing fires until the mover has registered enough genuine contacts
    /// to rule out a fresh spawn.
    pub fn check(&mut self, tick: u64, clock: &StuckClock) -> Option<StuckReason> {
        if self.contacts < clock.min_contacts {
            return None;
        }

        // Pattern signal runs on its own cadence
        if tick >= self.next_check {
            self.next_check = tick + clock.check_interval;
            let tight = matches!(
                (self.recent[0], self.recent[1]),
                (Some((_, older)), Some((_, newer))) if newer.saturating_sub(older) < clock.pattern_window
            );
            if tight {
                self.pattern_hits += 1;
            } else {
                self.pattern_hits = 0;
            }
            if self.pattern_hits >= clock.pattern_trips {
                return Some(StuckReason::RepeatPattern);
            }
        }

        if tick.saturating_sub(self.last_fast_sample) > clock.stagnation_timeout {
            return Some(StuckReason::Stagnant);
        }

        if tick.saturating_sub(self.last_new_contact) > clock.new_contact_timeout {
            return Some(StuckReason::NoNewContacts);
        }

        None
    }
}

/// Staggered removal of the colliders a stuck mover has touched.
///
/// One collider leaves play per interval instead of everything vanishing in
/// a single frame. Re-triggering while a removal is in flight keeps the
/// original snapshot and index.
#[derive(Debug, Clone)]
pub struct StaggeredRemoval {
    queue: Vec<BodyHandle>,
    index: usize,
    next_tick: u64,
    interval: u64,
}

impl StaggeredRemoval {
    pub fn new(snapshot: Vec<BodyHandle>, tick: u64, interval: u64) -> Self {
        Self {
            queue: snapshot,
            index: 0,
            next_tick: tick + interval,
            interval,
        }
    }

    /// Next collider due for removal at this tick, if any.
    pub fn pop_due(&mut self, tick: u64) -> Option<BodyHandle> {
        if self.index < self.queue.len() && tick >= self.next_tick {
            let handle = self.queue[self.index];
            self.index += 1;
            self.next_tick = tick + self.interval;
            Some(handle)
        } else {
            None
        }
    }

    pub fn finished(&self) -> bool {
        self.index >= self.queue.len()
    }

    /// (removed so far, snapshot size)
    pub fn progress(&self) -> (usize, usize) {
        (self.index, self.queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;

    fn clock() -> StuckClock {
        StuckClock::new(&StuckConfig::default(), SIM_DT)
    }

    #[test]
    fn test_thresholds_convert_to_ticks() {
        let c = clock();
        assert_eq!(c.check_interval, 192); // 1.6 s at 120 Hz
        assert_eq!(c.pattern_window, 24); // 0.2 s
        assert_eq!(c.stagnation_timeout, 120); // 1.0 s
        assert_eq!(c.new_contact_timeout, 600); // 5.0 s
        assert_eq!(c.removal_interval, 18); // 0.15 s
    }

    #[test]
    fn test_no_signal_before_minimum_contacts() {
        let c = clock();
        let mut tracker = StuckTracker::new(0, &c);
        tracker.record_contact(BodyHandle(1), 5, true);
        tracker.record_contact(BodyHandle(1), 10, false);
        // Only two contacts: even a long stagnant stretch stays quiet
        assert_eq!(tracker.check(2_000, &c), None);
    }

    #[test]
    fn test_pattern_signal_needs_two_consecutive_checks() {
        let c = clock();
        let mut tracker = StuckTracker::new(0, &c);
        tracker.record_contact(BodyHandle(1), 5, true);
        tracker.record_contact(BodyHandle(2), 10, true);
        tracker.record_contact(BodyHandle(3), 15, true);

        // Keep the other signals quiet
        let bounce_at = |tracker: &mut StuckTracker, tick: u64| {
            tracker.record_contact(BodyHandle(1), tick, false);
            tracker.record_contact(BodyHandle(2), tick + 10, false);
            tracker.sample_speed(5.0, tick + 10, &c);
        };

        // First check window: tight pair, one hit, no verdict yet
        bounce_at(&mut tracker, 180);
        assert_eq!(tracker.check(192, &c), None);

        // Second check window: tight pair again, verdict
        bounce_at(&mut tracker, 370);
        assert_eq!(tracker.check(384, &c), Some(StuckReason::RepeatPattern));
    }

    #[test]
    fn test_pattern_counter_resets_on_a_loose_window() {
        let c = clock();
        let mut tracker = StuckTracker::new(0, &c);
        tracker.record_contact(BodyHandle(1), 5, true);
        tracker.record_contact(BodyHandle(2), 10, true);
        tracker.record_contact(BodyHandle(3), 15, true);

        tracker.record_contact(BodyHandle(1), 180, false);
        tracker.record_contact(BodyHandle(2), 185, false);
        tracker.sample_speed(5.0, 190, &c);
        assert_eq!(tracker.check(192, &c), None);

        // Spread-out contacts in the second window: counter resets
        tracker.record_contact(BodyHandle(1), 300, false);
        tracker.record_contact(BodyHandle(2), 360, false);
        tracker.sample_speed(5.0, 380, &c);
        assert_eq!(tracker.check(384, &c), None);

        // Tight again: back to one hit, still no verdict
        tracker.record_contact(BodyHandle(1), 570, false);
        tracker.record_contact(BodyHandle(2), 575, false);
        tracker.sample_speed(5.0, 575, &c);
        assert_eq!(tracker.check(576, &c), None);
    }

    #[test]
    fn test_stagnation_signal_trips_after_timeout() {
        let c = clock();
        let mut tracker = StuckTracker::new(0, &c);
        for (i, tick) in [5_u64, 10, 15].iter().enumerate() {
            tracker.record_contact(BodyHandle(i as u32), *tick, true);
        }
        tracker.sample_speed(5.0, 20, &c);

        // Slow samples do not refresh the baseline
        tracker.sample_speed(0.1, 100, &c);
        assert_eq!(tracker.check(141, &c), Some(StuckReason::Stagnant));
    }

    #[test]
    fn test_fast_sample_refreshes_stagnation_baseline() {
        let c = clock();
        let mut tracker = StuckTracker::new(0, &c);
        for (i, tick) in [5_u64, 10, 15].iter().enumerate() {
            tracker.record_contact(BodyHandle(i as u32), *tick, true);
        }
        tracker.sample_speed(5.0, 130, &c);
        assert_eq!(tracker.check(140, &c), None);
    }

    #[test]
    fn test_timeout_signal_fires_at_the_boundary_not_before() {
        let c = clock();
        let mut tracker = StuckTracker::new(0, &c);
        tracker.record_contact(BodyHandle(1), 10, true);
        tracker.record_contact(BodyHandle(2), 20, true);
        tracker.record_contact(BodyHandle(3), 30, true);

        // Re-touching known colliders does not reset the timeout
        for tick in (60..600).step_by(60) {
            tracker.record_contact(BodyHandle(1), tick, false);
            tracker.sample_speed(5.0, tick, &c);
        }

        tracker.sample_speed(5.0, 629, &c);
        assert_eq!(tracker.check(630, &c), None);
        tracker.sample_speed(5.0, 631, &c);
        assert_eq!(tracker.check(631, &c), Some(StuckReason::NoNewContacts));
    }

    #[test]
    fn test_new_contact_resets_timeout_and_pattern() {
        let c = clock();
        let mut tracker = StuckTracker::new(0, &c);
        tracker.record_contact(BodyHandle(1), 10, true);
        tracker.record_contact(BodyHandle(2), 20, true);
        tracker.record_contact(BodyHandle(3), 30, true);

        tracker.sample_speed(5.0, 620, &c);
        tracker.record_contact(BodyHandle(4), 620, true);
        assert_eq!(tracker.check(640, &c), None);
    }

    #[test]
    fn test_staggered_removal_cadence() {
        let snapshot = vec![BodyHandle(1), BodyHandle(2), BodyHandle(3)];
        let mut removal = StaggeredRemoval::new(snapshot, 100, 18);

        assert_eq!(removal.pop_due(100), None);
        assert_eq!(removal.pop_due(117), None);
        assert_eq!(removal.pop_due(118), Some(BodyHandle(1)));
        // Next one waits a full interval from the last removal
        assert_eq!(removal.pop_due(120), None);
        assert_eq!(removal.pop_due(136), Some(BodyHandle(2)));
        assert_eq!(removal.pop_due(154), Some(BodyHandle(3)));
        assert!(removal.finished());
        assert_eq!(removal.pop_due(200), None);
        assert_eq!(removal.progress(), (3, 3));
    }

    #[test]
    fn test_removal_progress_tracks_partial_state() {
        let mut removal = StaggeredRemoval::new(vec![BodyHandle(1), BodyHandle(2)], 0, 18);
        assert_eq!(removal.progress(), (0, 2));
        assert!(!removal.finished());
        removal.pop_due(18);
        assert_eq!(removal.progress(), (1, 2));
    }
}
