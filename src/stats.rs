//! Counters kept by the double-sided ranging handlers

/// A counter in the [`Stats`] section
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stat {
    /// Exchanges that ran to completion on this node
    Complete,
    /// Transmissions the radio refused to schedule
    StartTxError,
    /// Exchanges aborted by a reset
    Reset,
}

impl Stat {
    /// All counters, in the order they are reported
    pub const ALL: [Stat; 3] = [Stat::Complete, Stat::StartTxError, Stat::Reset];

    /// The name the counter is reported under
    pub fn name(&self) -> &'static str {
        match self {
            Stat::Complete => "complete",
            Stat::StartTxError => "start_tx_error",
            Stat::Reset => "reset",
        }
    }
}

/// Monotonic counters of one ranging session
///
/// There is no way to reset them. They wrap around after `u32::MAX`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    complete: u32,
    start_tx_error: u32,
    reset: u32,
}

impl Stats {
    /// Name of the statistics section
    pub const NAME: &'static str = "twr_ds";

    /// Returns the current value of a counter
    pub fn get(&self, stat: Stat) -> u32 {
        match stat {
            Stat::Complete => self.complete,
            Stat::StartTxError => self.start_tx_error,
            Stat::Reset => self.reset,
        }
    }

    /// Looks a counter up by its reported name
    pub fn by_name(&self, name: &str) -> Option<u32> {
        Stat::ALL
            .iter()
            .find(|stat| stat.name() == name)
            .map(|stat| self.get(*stat))
    }

    /// Iterates over all counters as `(name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        Stat::ALL.iter().map(move |stat| (stat.name(), self.get(*stat)))
    }

    pub(crate) fn incr(&mut self, stat: Stat) {
        let counter = match stat {
            Stat::Complete => &mut self.complete,
            Stat::StartTxError => &mut self.start_tx_error,
            Stat::Reset => &mut self.reset,
        };
        *counter = counter.wrapping_add(1);
    }
}
