use std::sync::Mutex;

/// Receiver of transfer progress. Both calls happen on the transfer's own
/// task and must not block.
pub trait ProgressSink: Send + Sync {
    fn update_total_size(&self, bytes: u64);
    fn update_progress(&self, percent: u8, bytes: u64);
}

/// Keeps reported percentages from going backwards and reserves 100 for the
/// final report.
#[derive(Debug, Default)]
pub struct MonotoneProgress {
    percent: u8,
}

impl MonotoneProgress {
    pub const IN_FLIGHT_CAP: u8 = 99;

    pub fn in_flight(&mut self, bytes: u64, total: u64) -> u8 {
        let raw = if total == 0 {
            0
        } else {
            (u128::from(bytes) * 100 / u128::from(total)).min(u128::from(Self::IN_FLIGHT_CAP)) as u8
        };
        self.bump(raw)
    }

    pub fn bump(&mut self, percent: u8) -> u8 {
        self.percent = self.percent.max(percent.min(Self::IN_FLIGHT_CAP));
        self.percent
    }
}

/// One `--info=PROGRESS2` status line of rsync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsyncProgress {
    pub bytes: u64,
    pub percent: u8,
}

/// Parses lines such as `  1,234,567  45%   12.34MB/s    0:00:10 (xfr#1, to-chk=0/1)`.
/// Anything else (file names, summaries) yields `None`.
pub fn parse_rsync_progress(line: &str) -> Option<RsyncProgress> {
    let mut fields = line.split_whitespace();
    let bytes = fields.next()?.replace(',', "").parse().ok()?;
    let percent = fields.next()?.strip_suffix('%')?.parse::<u8>().ok()?;
    Some(RsyncProgress {
        bytes,
        percent: percent.min(100),
    })
}

/// Records every report; used by callers that poll state instead of
/// reacting to callbacks.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    TotalSize(u64),
    Progress(u8, u64),
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn last_progress(&self) -> Option<(u8, u64)> {
        self.events().into_iter().rev().find_map(|event| match event {
            ProgressEvent::Progress(percent, bytes) => Some((percent, bytes)),
            ProgressEvent::TotalSize(_) => None,
        })
    }

    fn push(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ProgressSink for RecordingSink {
    fn update_total_size(&self, bytes: u64) {
        self.push(ProgressEvent::TotalSize(bytes));
    }

    fn update_progress(&self, percent: u8, bytes: u64) {
        self.push(ProgressEvent::Progress(percent, bytes));
    }
}
