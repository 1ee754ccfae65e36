//! Persistent engine state as one aggregate.
//!
//! The peak episode, the early-dose controller and the commit ledger reset
//! each other, so they live together and change only through the named
//! transitions below:
//!
//! | transition      | episode        | early dose | segment |
//! |-----------------|----------------|------------|---------|
//! | `start_episode` | fresh memory   | reset      | +1      |
//! | `end_episode`   | inactive, idle | reset      |         |
//! | `reenter`       |                | reset      | +1      |
//!
//! The commit ledger is never reset by a transition; its cooldowns span
//! episodes. `reenter` stamps the ledger's re-entry time.

use std::collections::VecDeque;

use crate::commit::CommitLedger;
use crate::config::PeakCfg;
use crate::context::DecisionContext;
use crate::early::EarlyDoseState;
use crate::meal::MealSignal;
use crate::peak::{self, PeakBand, PeakCategory, PeakEpisode, PeakOutcome};
use crate::types::DeliveryRecord;

/// Default length of the delivery history ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// Bounded ring of recent nonzero deliveries, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryHistory {
    buf: VecDeque<DeliveryRecord>,
    cap: usize,
}

impl DeliveryHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, record: DeliveryRecord) {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeliveryRecord> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn to_vec(&self) -> Vec<DeliveryRecord> {
        self.buf.iter().copied().collect()
    }
}

impl Default for DeliveryHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub episode: PeakEpisode,
    pub early: EarlyDoseState,
    pub ledger: CommitLedger,
    pub deliveries: DeliveryHistory,
    segment: u64,
}

impl Session {
    pub fn with_history_capacity(cap: usize) -> Self {
        Self {
            deliveries: DeliveryHistory::with_capacity(cap),
            ..Session::default()
        }
    }

    /// Dosing segment counter; bumps on episode start and re-entry.
    pub fn segment(&self) -> u64 {
        self.segment
    }

    pub fn start_episode(&mut self, now_ms: i64, ctx: &DecisionContext) {
        self.episode.begin(now_ms, ctx);
        self.early.reset();
        self.segment += 1;
        tracing::info!(segment = self.segment, bg = ctx.bg_now, "episode start");
    }

    pub fn end_episode(&mut self) {
        self.episode.end();
        self.early.reset();
        tracing::info!(segment = self.segment, "episode exit");
    }

    pub fn reenter(&mut self, now_ms: i64) {
        self.ledger.mark_reentry(now_ms);
        self.early.reset();
        self.segment += 1;
        tracing::info!(segment = self.segment, "re-entry");
    }

    /// Run the episode state machine for one cycle and predict the peak.
    pub fn step_episode(
        &mut self,
        ctx: &DecisionContext,
        meal: MealSignal,
        now_ms: i64,
        cfg: &PeakCfg,
    ) -> PeakOutcome {
        let start = peak::start_condition(ctx, meal.state);
        let mut started = false;
        let mut exited = false;
        if start && !self.episode.active {
            self.start_episode(now_ms, ctx);
            started = true;
        } else if self.episode.active && !start && peak::exit_condition(ctx) {
            self.end_episode();
            exited = true;
        }

        if self.episode.active {
            self.episode.update_memory(now_ms, ctx, cfg);
        }
        let prediction = self.episode.predict(ctx, cfg);
        if self.episode.active {
            self.episode.advance_sub_state(&prediction, ctx, cfg);
        }

        PeakOutcome {
            started,
            exited,
            active: self.episode.active,
            prediction,
            sub_state: self.episode.sub_state,
            confirm_count: self.episode.confirm_count,
            category: PeakCategory::from_peak(prediction.predicted),
            band: PeakBand::from_peak(prediction.predicted),
            momentum: self.episode.momentum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_keeps_newest() {
        let mut h = DeliveryHistory::with_capacity(2);
        for i in 0..3 {
            h.push(DeliveryRecord {
                timestamp_ms: i,
                delivered_u: 0.1,
            });
        }
        let ts: Vec<i64> = h.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(ts, vec![1, 2]);
    }

    #[test]
    fn transitions_reset_early_dose() {
        let ctx = DecisionContext {
            bg_now: 9.0,
            slope: 1.5,
            acceleration: 0.2,
            consistency: 0.9,
            iob_ratio: 0.0,
            delta_to_target: 3.5,
        };
        let mut s = Session::default();
        s.start_episode(0, &ctx);
        assert_eq!(s.segment(), 1);
        s.early.stage = 2;
        s.reenter(30 * 60_000);
        assert_eq!(s.early, EarlyDoseState::default());
        assert_eq!(s.segment(), 2);
        assert_eq!(s.ledger.last_reentry_ms, Some(30 * 60_000));
        s.early.stage = 1;
        s.end_episode();
        assert_eq!(s.early.stage, 0);
        assert!(!s.episode.active);
    }
}
