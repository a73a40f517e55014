use serde::{Deserialize, Serialize};

/// Minimum percent advance between two `Progress` events.
pub const PROGRESS_STEP_PERCENT: u8 = 5;

/// Progress emitted for one session, in issuance order.
///
/// Serialized as `{ "event": "progress", "data": { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ProgressEvent {
    Started {
        content_length: Option<u64>,
    },
    Progress {
        downloaded: u64,
        total: u64,
        percent: u8,
    },
    Finished,
    Installing,
    Error {
        message: String,
    },
}

/// Turns raw byte counts into a throttled `Progress` sequence.
///
/// A `Progress` is produced only when the percentage advanced by at least
/// [`PROGRESS_STEP_PERCENT`] or reached 100, so percent never decreases and
/// 100 is reported at most once.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: Option<u64>,
    downloaded: u64,
    last_percent: u8,
    reported_complete: bool,
}

impl ProgressTracker {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            downloaded: 0,
            last_percent: 0,
            reported_complete: false,
        }
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Record a chunk of `len` bytes.
    pub fn advance(&mut self, len: u64) -> Option<ProgressEvent> {
        self.set_downloaded(self.downloaded.saturating_add(len))
    }

    /// Record a cumulative byte count, as reported by platform updaters.
    pub fn set_downloaded(&mut self, downloaded: u64) -> Option<ProgressEvent> {
        self.downloaded = self.downloaded.max(downloaded);
        let total = self.total?;
        let percent = percent_of(self.downloaded, total);
        if self.reported_complete {
            return None;
        }
        if percent >= self.last_percent.saturating_add(PROGRESS_STEP_PERCENT) || percent == 100 {
            self.last_percent = percent;
            self.reported_complete = percent == 100;
            return Some(ProgressEvent::Progress {
                downloaded: self.downloaded,
                total,
                percent,
            });
        }
        None
    }

    /// Close the sequence: the final 100% `Progress` if it was not reported
    /// yet. Unknown totals are resolved to the byte count actually received.
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        if self.reported_complete {
            return None;
        }
        let total = self.total.unwrap_or(self.downloaded);
        self.total = Some(total);
        self.last_percent = 100;
        self.reported_complete = true;
        Some(ProgressEvent::Progress {
            downloaded: self.downloaded,
            total,
            percent: 100,
        })
    }
}

fn percent_of(downloaded: u64, total: u64) -> u8 {
    let pct = (downloaded as u128 * 100) / total as u128;
    pct.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn percents(events: &[ProgressEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn throttles_to_five_point_steps() {
        let mut tracker = ProgressTracker::new(Some(1000));
        let mut events = Vec::new();
        for _ in 0..100 {
            events.extend(tracker.advance(10));
        }
        events.extend(tracker.finish());

        let seen = percents(&events);
        assert_eq!(seen.first(), Some(&5));
        assert_eq!(seen.last(), Some(&100));
        assert_eq!(seen.len(), 20);
        assert!(seen.windows(2).all(|w| w[1] >= w[0] + PROGRESS_STEP_PERCENT));
    }

    #[test]
    fn large_chunks_jump_and_still_reach_100_once() {
        let mut tracker = ProgressTracker::new(Some(300));
        let mut events = Vec::new();
        events.extend(tracker.advance(100));
        events.extend(tracker.advance(200));
        events.extend(tracker.finish());

        assert_eq!(percents(&events), vec![33, 100]);
    }

    #[test]
    fn unknown_total_reports_only_on_finish() {
        let mut tracker = ProgressTracker::new(None);
        assert!(tracker.advance(4096).is_none());
        assert_eq!(
            tracker.finish(),
            Some(ProgressEvent::Progress {
                downloaded: 4096,
                total: 4096,
                percent: 100
            })
        );
        assert!(tracker.finish().is_none());
    }

    #[test]
    fn cumulative_counts_never_go_backwards() {
        let mut tracker = ProgressTracker::new(Some(100));
        assert!(tracker.set_downloaded(50).is_some());
        assert!(tracker.set_downloaded(20).is_none());
        assert_eq!(tracker.downloaded(), 50);
    }

    #[test]
    fn events_use_tagged_wire_shape() {
        let json = serde_json::to_value(ProgressEvent::Started {
            content_length: Some(42),
        })
        .unwrap();
        assert_eq!(json["event"], "started");
        assert_eq!(json["data"]["content_length"], 42);

        let json = serde_json::to_value(ProgressEvent::Installing).unwrap();
        assert_eq!(json["event"], "installing");
    }
}
