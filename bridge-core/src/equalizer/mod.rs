//! Equalizer bypass learning.
//!
//! The right equalizer bypass setting depends on the cable and source and
//! cannot be read from any datasheet, so it is discovered by trial. Each of
//! the two configurations keeps hysteresis counters plus a sticky
//! "known bad" flag that is cleared again as soon as the configuration proves
//! itself, so a wrong early verdict never poisons the search for good.

/// Consecutive good samples needed before a configuration can be promoted.
pub const MIN_FOUND_THRESHOLD: u32 = 3;
/// Good samples needed at the promoted configuration before it is trusted.
pub const MAX_FOUND_THRESHOLD: u32 = 15;
/// Dropped samples tolerated at the promoted configuration.
pub const MAX_DROPPED_THRESHOLD: u32 = 3;
/// Configuration recommended by the manufacturer, preferred on ties.
pub const RECOMMENDED_EQ_CONFIG: bool = true;

/// Hysteresis counters for a single equalizer configuration.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EqConfigStats {
    pub found_count: u32,
    pub dropped_count: u32,
    pub known_bad: bool,
}

impl EqConfigStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            found_count: 0,
            dropped_count: 0,
            known_bad: false,
        }
    }
}

/// Decision produced for a sample taken while searching for a signal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EqAction {
    /// Try the other configuration.
    Toggle,
    /// Keep the current configuration and keep sampling.
    Stay,
    /// The search is over; this configuration should carry the signal.
    Promote(bool),
}

/// Result of [`EqualizerLearner::on_sample`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EqDecision {
    pub action: EqAction,
    /// A configuration that had been producing signal just stopped; the PHY
    /// should be reset regardless of `action`.
    pub glitch_reset: bool,
}

/// Outcome of a dropped sample after promotion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DropOutcome {
    /// Switch to the other configuration without leaving the found state.
    TryOther,
    /// Too many drops; restart the search.
    Abandon,
    /// Tolerated for now.
    Hold,
}

/// Per-configuration counters and the search policy that reads them.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EqualizerLearner {
    stats: [EqConfigStats; 2],
}

impl EqualizerLearner {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stats: [EqConfigStats::new(); 2],
        }
    }

    /// Counters indexed by configuration (`false` first).
    #[must_use]
    pub const fn stats(&self) -> &[EqConfigStats; 2] {
        &self.stats
    }

    #[must_use]
    pub const fn config(&self, config: bool) -> &EqConfigStats {
        &self.stats[index(config)]
    }

    fn config_mut(&mut self, config: bool) -> &mut EqConfigStats {
        &mut self.stats[index(config)]
    }

    /// Consumes one sample taken while searching for a signal.
    pub fn on_sample(&mut self, current: bool, have_signal: bool, forced: Option<bool>) -> EqDecision {
        if forced.is_some_and(|mode| mode != current) {
            return EqDecision {
                action: EqAction::Toggle,
                glitch_reset: false,
            };
        }

        let mut glitch_reset = false;
        let stats = self.config_mut(current);
        if have_signal {
            stats.found_count = stats.found_count.saturating_add(1);
        } else {
            glitch_reset = stats.found_count > 0;
            stats.found_count = 0;
        }

        let action = if self.config(current).found_count >= MIN_FOUND_THRESHOLD {
            EqAction::Promote(self.decide(forced))
        } else if forced.is_some() {
            EqAction::Stay
        } else {
            EqAction::Toggle
        };

        EqDecision {
            action,
            glitch_reset,
        }
    }

    fn decide(&mut self, forced: Option<bool>) -> bool {
        let mut choice = self.config(RECOMMENDED_EQ_CONFIG).found_count >= MIN_FOUND_THRESHOLD - 1;
        if self.config(choice).known_bad && self.config(!choice).found_count > 0 {
            choice = !choice;
        }
        if let Some(mode) = forced {
            choice = mode;
        }

        for stats in &mut self.stats {
            stats.known_bad |= stats.found_count == 0;
            stats.dropped_count = 0;
        }
        self.config_mut(choice).known_bad = false;

        choice
    }

    /// Records a good sample after promotion and returns the running count.
    pub fn record_found(&mut self, current: bool) -> u32 {
        let stats = self.config_mut(current);
        stats.found_count = stats.found_count.saturating_add(1);
        stats.found_count
    }

    /// Records a dropped sample after promotion.
    pub fn record_drop(&mut self, current: bool, forced: Option<bool>) -> DropOutcome {
        let stats = self.config_mut(current);
        stats.dropped_count = stats.dropped_count.saturating_add(1);

        let other = self.config(!current);
        if forced.is_none() && !other.known_bad && other.dropped_count == 0 {
            return DropOutcome::TryOther;
        }

        let stats = self.config_mut(current);
        if stats.dropped_count >= MAX_DROPPED_THRESHOLD {
            stats.dropped_count = 0;
            return DropOutcome::Abandon;
        }

        DropOutcome::Hold
    }

    /// Zeroes both found counters.
    pub fn reset_found(&mut self) {
        for stats in &mut self.stats {
            stats.found_count = 0;
        }
    }

    /// Forgets both "known bad" verdicts.
    pub fn clear_known_bad(&mut self) {
        for stats in &mut self.stats {
            stats.known_bad = false;
        }
    }

    /// Returns every counter to its attach-time value.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

const fn index(config: bool) -> usize {
    config as usize
}
