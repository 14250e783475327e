//! Quasar activity state machine.
//!
//! Each galaxy carries a [`QuasarTracker`]. When a merger-driven quasar
//! wind fires, the galaxy's escape fraction is boosted for a number of
//! dynamical times. The tracker turns that duration into a per-snapshot
//! fractional-photon weight in `[0, 1]` that the quasar-boosted escape
//! fraction interpolates with.
//!
//! # States
//!
//! - **Idle** (`active_episodes == 0`): the weight is zero.
//! - **Boosting** (`active_episodes >= 1`): time accumulates towards the
//!   episode target. A new event while boosting deepens the counter and
//!   restarts the timer instead of collapsing into the running episode.
//!   A second event resets the accumulated time to zero and replaces the
//!   target; only the counter remembers the overlap.
//!
//! # Order of operations (per snapshot)
//!
//! 1. Register a new event, if any, when the merging companion was large
//!    enough.
//! 2. While boosting, accumulate the previous snapshot's span (weighted by
//!    the remaining fraction of the snapshot if the episode just began and
//!    no other episode is running) and finish the episode if the target is
//!    reached.
//! 3. While idle, report a weight of zero.

use serde::{Deserialize, Serialize};

use rsage_types::GalaxyId;

use crate::error::GridError;

/// Quasar event recorded in a galaxy's history at one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuasarEvent {
    /// Whether a quasar wind fired during the snapshot.
    pub fired: bool,
    /// Substep the wind fired in.
    pub substep: u32,
    /// Particle count of the merging companion's halo.
    pub companion_len: u32,
    /// Galaxy dynamical time at the snapshot (Myr).
    pub dynamical_time_myr: f64,
}

/// Inputs that do not vary per galaxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuasarSettings {
    /// Substeps per snapshot.
    pub steps: u32,
    /// Boost duration in dynamical times.
    pub boost_dyntimes: f64,
    /// Companions must exceed this particle count to trigger a boost.
    pub halo_part_cut: u32,
}

/// What happened to the event counters during one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuasarEventCounts {
    /// Events whose companion exceeded the particle cut.
    pub above_cut: u64,
    /// Events ignored because the companion was too small.
    pub below_cut: u64,
}

impl QuasarEventCounts {
    /// Add another set of counts into this one.
    pub const fn absorb(&mut self, other: Self) {
        self.above_cut = self.above_cut.saturating_add(other.above_cut);
        self.below_cut = self.below_cut.saturating_add(other.below_cut);
    }
}

/// Per-galaxy quasar boost state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuasarTracker {
    /// Number of overlapping episodes still running.
    active_episodes: u32,
    /// Snapshot the most recent episode began at.
    episode_snapshot: Option<u32>,
    /// Length of the most recent episode (Myr).
    target_time: f64,
    /// Time the most recent episode has been active (Myr).
    active_time: f64,
    /// Substep the most recent episode began in.
    episode_substep: Option<u32>,
    /// Fractional-photon weight for the latest snapshot.
    fractional_photon: f64,
}

impl QuasarTracker {
    /// A fresh, idle tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of overlapping episodes still running.
    pub const fn active_episodes(&self) -> u32 {
        self.active_episodes
    }

    /// Whether the tracker is in the boosting state.
    pub const fn is_boosting(&self) -> bool {
        self.active_episodes > 0
    }

    /// Fractional-photon weight computed by the latest update.
    pub const fn fractional_photon(&self) -> f64 {
        self.fractional_photon
    }

    /// Advance the state machine by one snapshot.
    ///
    /// `dt_myr` is the span of the interval ending at `snapshot`. Returns the
    /// event counts this update contributed.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidQuasarWeight`] if the resulting weight is
    /// outside `[0, 1]` or NaN.
    pub fn update(
        &mut self,
        galaxy: GalaxyId,
        snapshot: u32,
        event: &QuasarEvent,
        dt_myr: f64,
        settings: &QuasarSettings,
    ) -> Result<QuasarEventCounts, GridError> {
        let mut counts = QuasarEventCounts::default();

        if event.fired {
            if event.companion_len > settings.halo_part_cut {
                self.active_episodes = self.active_episodes.saturating_add(1);
                self.episode_snapshot = Some(snapshot);
                self.target_time = event.dynamical_time_myr * settings.boost_dyntimes;
                self.episode_substep = Some(event.substep);
                self.active_time = 0.0;
                counts.above_cut = 1;
            } else {
                counts.below_cut = 1;
            }
        }

        if self.active_episodes > 0 {
            let substep_weight =
                if self.episode_snapshot == Some(snapshot) && self.active_episodes == 1 {
                    let substep = self.episode_substep.unwrap_or(0);
                    let remaining = settings.steps.saturating_sub(substep);
                    f64::from(remaining) / f64::from(settings.steps.max(1))
                } else {
                    1.0
                };

            self.active_time += dt_myr * substep_weight;
            self.fractional_photon = substep_weight;

            if self.active_time >= self.target_time {
                let needed = self.target_time - (self.active_time - dt_myr);
                self.fractional_photon = if dt_myr > 0.0 { needed / dt_myr } else { 0.0 };

                self.active_episodes = self.active_episodes.saturating_sub(1);
                self.episode_snapshot = None;
                self.target_time = 0.0;
                self.active_time = 0.0;
                self.episode_substep = None;
            }
        } else {
            // An episode that ended part-way through the previous snapshot
            // must not keep boosting this one.
            self.fractional_photon = 0.0;
        }

        if !(0.0..=1.0).contains(&self.fractional_photon) {
            return Err(GridError::InvalidQuasarWeight {
                galaxy,
                snapshot,
                weight: self.fractional_photon,
            });
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: QuasarSettings = QuasarSettings {
        steps: 10,
        boost_dyntimes: 2.5,
        halo_part_cut: 32,
    };

    fn trigger(substep: u32) -> QuasarEvent {
        QuasarEvent {
            fired: true,
            substep,
            companion_len: 100,
            dynamical_time_myr: 10.0,
        }
    }

    fn quiet() -> QuasarEvent {
        QuasarEvent::default()
    }

    #[test]
    fn idle_tracker_reports_zero() {
        let mut tracker = QuasarTracker::new();
        let r = tracker.update(GalaxyId::new(1), 5, &quiet(), 10.0, &SETTINGS);
        assert!(r.is_ok());
        assert!(tracker.fractional_photon().abs() < f64::EPSILON);
        assert!(!tracker.is_boosting());
    }

    #[test]
    fn three_triggers_then_quiet_ramps_up_and_back_to_zero() {
        let mut tracker = QuasarTracker::new();
        let events = [
            trigger(2),
            trigger(2),
            trigger(2),
            quiet(),
            quiet(),
            quiet(),
            quiet(),
            quiet(),
        ];

        let mut weights = Vec::new();
        for (snap, event) in (1_u32..).zip(events.iter()) {
            let r = tracker.update(GalaxyId::new(1), snap, event, 10.0, &SETTINGS);
            assert!(r.is_ok(), "snapshot {snap}: {r:?}");
            let w = tracker.fractional_photon();
            assert!((0.0..=1.0).contains(&w));
            weights.push(w);
        }

        let expected = [0.8, 1.0, 1.0, 1.0, 0.5, 0.0, 0.0, 0.0];
        for (got, want) in weights.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-9, "weights {weights:?}");
        }
        assert_eq!(tracker.active_episodes(), 0);
        assert!(weights.last().is_some_and(|w| w.abs() < f64::EPSILON));
    }

    #[test]
    fn overlapping_event_restarts_the_timer() {
        let mut tracker = QuasarTracker::new();
        // Target 25 Myr each, 10 Myr snapshots. The second event at
        // snapshot 2 throws away the 10 Myr already accumulated.
        let events = [trigger(0), trigger(0), quiet(), quiet()];
        let mut weights = Vec::new();
        let mut episodes = Vec::new();
        for (snap, event) in (1_u32..).zip(events.iter()) {
            let r = tracker.update(GalaxyId::new(5), snap, event, 10.0, &SETTINGS);
            assert!(r.is_ok(), "snapshot {snap}: {r:?}");
            weights.push(tracker.fractional_photon());
            episodes.push(tracker.active_episodes());
        }

        // Without the restart the episode would end at snapshot 3.
        assert_eq!(episodes, vec![1, 2, 2, 1]);
        let expected = [1.0, 1.0, 1.0, 0.5];
        for (got, want) in weights.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-9, "weights {weights:?}");
        }
    }

    #[test]
    fn small_companion_does_not_boost() {
        let mut tracker = QuasarTracker::new();
        let event = QuasarEvent {
            companion_len: 10,
            ..trigger(0)
        };
        let r = tracker.update(GalaxyId::new(2), 3, &event, 10.0, &SETTINGS);
        assert_eq!(
            r.ok(),
            Some(QuasarEventCounts {
                above_cut: 0,
                below_cut: 1
            })
        );
        assert!(!tracker.is_boosting());
    }

    #[test]
    fn short_episode_ends_within_first_snapshot() {
        let mut tracker = QuasarTracker::new();
        // Target 5 Myr, snapshot 10 Myr, began at substep 0.
        let event = QuasarEvent {
            dynamical_time_myr: 2.0,
            ..trigger(0)
        };
        let r = tracker.update(GalaxyId::new(3), 4, &event, 10.0, &SETTINGS);
        assert!(r.is_ok());
        assert!((tracker.fractional_photon() - 0.5).abs() < 1e-12);
        assert!(!tracker.is_boosting());
    }

    #[test]
    fn zero_length_snapshot_gives_zero_weight_on_completion() {
        let mut tracker = QuasarTracker::new();
        let event = QuasarEvent {
            dynamical_time_myr: 0.0,
            ..trigger(0)
        };
        let r = tracker.update(GalaxyId::new(4), 0, &event, 0.0, &SETTINGS);
        assert!(r.is_ok());
        assert!(tracker.fractional_photon().abs() < f64::EPSILON);
    }

    #[test]
    fn counts_accumulate() {
        let mut total = QuasarEventCounts::default();
        total.absorb(QuasarEventCounts {
            above_cut: 2,
            below_cut: 1,
        });
        total.absorb(QuasarEventCounts {
            above_cut: 1,
            below_cut: 0,
        });
        assert_eq!(total.above_cut, 3);
        assert_eq!(total.below_cut, 1);
    }
}
