//! scheduler.rs — per-kind sentence emission on independent periods.
//!
//! Each kind keeps its own deadline and advances it by the exact period, so
//! emission frequency does not drift with tick jitter. A kind that falls more
//! than one full period behind (host stall, suspend) emits once and resyncs
//! instead of replaying the backlog.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;
use vessel_sim::VesselState;

use crate::config::SentenceRates;
use crate::feed::{self, FeedKind};

struct ScheduledSentence {
    kind: FeedKind,
    period: Duration,
    next_due: Instant,
}

pub struct SentenceScheduler {
    entries: Vec<ScheduledSentence>,
    talker: String,
}

impl SentenceScheduler {
    pub fn new(rates: &SentenceRates, talker: &str, now: Instant) -> Self {
        let rate_for = |kind: FeedKind| match kind {
            FeedKind::Hdt => rates.hdt_hz,
            FeedKind::Rot => rates.rot_hz,
            FeedKind::Vhw => rates.vhw_hz,
            FeedKind::MwvRelative => rates.mwv_relative_hz,
            FeedKind::MwvTrue => rates.mwv_true_hz,
            FeedKind::Mwd => rates.mwd_hz,
            FeedKind::Rmc => rates.rmc_hz,
            FeedKind::Gga => rates.gga_hz,
            FeedKind::Vtg => rates.vtg_hz,
            FeedKind::Dpt => rates.dpt_hz,
            FeedKind::Mtw => rates.mtw_hz,
            FeedKind::Xdr => rates.xdr_hz,
        };

        let entries = FeedKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let hz = rate_for(kind);
                if hz <= 0.0 {
                    debug!("{} disabled (rate 0)", kind.label());
                    return None;
                }
                Some(ScheduledSentence {
                    kind,
                    period: Duration::from_secs_f64(1.0 / hz),
                    next_due: now,
                })
            })
            .collect();

        Self {
            entries,
            talker: talker.to_string(),
        }
    }

    /// Render every sentence due at `now`. Pure over its inputs, so tests can
    /// drive it with synthetic instants.
    pub fn poll(&mut self, now: Instant, snap: &VesselState, utc: &DateTime<Utc>) -> Vec<String> {
        let mut out = Vec::new();
        for entry in &mut self.entries {
            if now < entry.next_due {
                continue;
            }
            out.push(feed::render(entry.kind, snap, &self.talker, utc).encode());
            let behind = now - entry.next_due;
            if behind > entry.period {
                // Stalled past a full period: drop the backlog, restart clean.
                entry.next_due = now + entry.period;
            } else {
                entry.next_due += entry.period;
            }
        }
        out
    }

    pub fn active_kinds(&self) -> usize {
        self.entries.len()
    }
}
