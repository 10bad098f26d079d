//! Per-file progress aggregation across concurrent parts.

use parking_lot::Mutex;

/// Highest percentage reported while bytes are still in flight.
/// 100 is reserved for the moment a transfer is acknowledged as done.
pub const IN_FLIGHT_CAP: u8 = 99;

struct State {
    part_bytes: Vec<u64>,
    reported: u8,
}

/// Folds byte counts from parts that finish in any order into one
/// non-decreasing percentage for the file
pub struct ProgressAggregator {
    total_bytes: u64,
    state: Mutex<State>,
}

impl ProgressAggregator {
    pub fn new(total_bytes: u64, part_count: usize) -> Self {
        Self {
            total_bytes,
            state: Mutex::new(State {
                part_bytes: vec![0; part_count.max(1)],
                reported: 0,
            }),
        }
    }

    /// Record the cumulative bytes sent for one part.
    ///
    /// Returns the new file percentage only when it has grown since the last
    /// report, so callers can forward every `Some` without re-checking.
    pub fn record(&self, part_index: usize, bytes_sent: u64) -> Option<u8> {
        let mut state = self.state.lock();

        let slot = state.part_bytes.get_mut(part_index)?;
        *slot = (*slot).max(bytes_sent);

        let sent: u64 = state.part_bytes.iter().sum();
        let percent = percent_of(sent, self.total_bytes).min(IN_FLIGHT_CAP);

        if percent > state.reported {
            state.reported = percent;
            Some(percent)
        } else {
            None
        }
    }

    /// Last percentage handed out
    pub fn reported(&self) -> u8 {
        self.state.lock().reported
    }
}

/// Floor of `sent / total` as a percentage, clamped to 100
pub fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (sent.min(total) as u128 * 100) / total as u128;
    percent as u8
}
