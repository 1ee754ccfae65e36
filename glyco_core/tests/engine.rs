mod common;

use common::{MIN, flat_history, input, rising_history};
use glyco_core::commit::CommitReason;
use glyco_core::energy::GateLayer;
use glyco_core::error::BuildError;
use glyco_core::mocks::{FailingAudit, FailingStore, MemoryAudit, NullAudit};
use glyco_core::{Engine, SharedEngine, StaticStore, Tunables};
use rstest::rstest;

fn engine() -> Engine {
    Engine::builder().build().unwrap()
}

#[rstest]
fn meal_rise_commits_and_fires_early_stage() {
    let mut e = engine();
    let h = rising_history(0, 9.0);
    let advice = e.advise(&input(0, &h, 0.6));
    assert!(advice.should_deliver);

    let t = e.last_trace().unwrap();
    assert_eq!(t.commit.committed, Some(CommitReason::Meal));
    assert!(t.early.fired);
    assert_eq!(t.early.stage, 1);
    assert!(t.peak.started);
    assert_eq!(t.segment, 1);
    assert!(t.final_dose_u <= 1.2);
    assert!(t.execution.delivered_u <= t.final_dose_u + 1e-12);
    assert!(advice.diagnostic.contains("commit=meal"), "{}", advice.diagnostic);
}

#[rstest]
fn reentry_starts_from_clean_early_state() {
    let audit = MemoryAudit::default();
    let mut e = Engine::builder().audit_sink(audit.clone()).build().unwrap();

    let h0 = rising_history(0, 9.0);
    e.advise(&input(0, &h0, 0.6));
    assert_eq!(e.session().ledger.last_commit_ms, Some(0));
    assert_eq!(e.session().early.stage, 1);

    let h30 = rising_history(30 * MIN, 11.0);
    e.advise(&input(30 * MIN, &h30, 0.6));
    let t = e.last_trace().unwrap();
    assert!(t.reentry);
    assert_eq!(t.early.prior_stage, 0);
    assert_eq!(t.segment, 2);
    assert_eq!(t.commit.committed, Some(CommitReason::Reentry));
    assert_eq!(e.session().ledger.last_reentry_commit_ms, Some(30 * MIN));

    let rows = audit.rows();
    assert_eq!(rows.len(), 2);
    let field = |name: &str| {
        rows[1]
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.clone())
            .unwrap()
    };
    assert_eq!(field("reentry"), "true");
    assert_eq!(field("early_prior_stage"), "0");
}

#[rstest]
fn reentry_is_not_detected_inside_cooldown() {
    let mut e = engine();
    let h0 = rising_history(0, 9.0);
    e.advise(&input(0, &h0, 0.6));
    let h20 = rising_history(20 * MIN, 10.5);
    e.advise(&input(20 * MIN, &h20, 0.6));
    assert!(!e.last_trace().unwrap().reentry);
}

/// A re-entry whose commit stays under the minimum dose is detected once,
/// not on every following cycle.
#[rstest]
fn uncommitted_reentry_is_not_redetected_each_cycle() {
    let mut t = Tunables::default();
    t.commit.min_dose_u = 0.5;
    let mut e = Engine::builder().tunables(t).build().unwrap();

    let h0 = rising_history(0, 9.0);
    e.advise(&input(0, &h0, 0.6));
    assert_eq!(e.last_trace().unwrap().commit.committed, Some(CommitReason::Meal));

    let mut detections = Vec::new();
    for (i, minute) in (30..=50).step_by(5).enumerate() {
        let now = minute * MIN;
        let h = rising_history(now, 11.0 + 0.2 * i as f64);
        let mut inp = input(now, &h, 3.6);
        inp.night = true;
        e.advise(&inp);
        let tr = e.last_trace().unwrap();
        if tr.reentry {
            detections.push(minute);
        }
        if minute == 30 {
            assert!(tr.commit.observed_only);
            assert_eq!(tr.commit.committed, None);
        }
        if minute == 35 {
            assert_eq!(tr.early.prior_stage, 1);
        }
        assert_eq!(tr.segment, 2, "segment moved at minute {minute}");
    }
    assert_eq!(detections, vec![30]);
    assert_eq!(e.session().ledger.last_reentry_ms, Some(30 * MIN));
    assert_eq!(e.session().ledger.last_reentry_commit_ms, None);
}

#[rstest]
fn flat_series_never_starts_an_episode() {
    let mut e = engine();
    for i in 0..12 {
        let now = i * 5 * MIN;
        let h = flat_history(now, 7.0, 8);
        let advice = e.advise(&input(now, &h, 0.5));
        let t = e.last_trace().unwrap();
        assert!(!t.peak.active);
        assert!(!t.peak.started);
        assert_eq!(t.peak.prediction.predicted, 7.0);
        assert_eq!(advice.bolus_u, 0.0);
    }
    assert_eq!(e.session().segment(), 0);
}

#[rstest]
fn sparse_history_hard_stops() {
    let mut e = engine();
    let h = rising_history(0, 9.0);
    let advice = e.advise(&input(0, &h[3..], 0.0));
    let t = e.last_trace().unwrap();
    assert_eq!(t.trend.consistency, 0.0);
    assert_eq!(t.gate.layer, GateLayer::HardStop);
    assert_eq!(advice.bolus_u, 0.0);
    assert_eq!(advice.basal_rate_u_per_h, 0.0);
    assert!(!advice.should_deliver);
}

#[rstest]
fn invalid_input_fails_safe_and_keeps_session() {
    let mut e = engine();
    let h = rising_history(0, 9.0);
    e.advise(&input(0, &h, 0.6));
    let before = e.session().clone();

    let h5 = rising_history(5 * MIN, 9.2);
    let mut bad = input(5 * MIN, &h5, 0.6);
    bad.iob_u = f64::NAN;
    let advice = e.advise(&bad);
    assert_eq!(advice.bolus_u, 0.0);
    assert_eq!(advice.basal_rate_u_per_h, 0.0);
    assert!(!advice.should_deliver);
    assert!(advice.diagnostic.starts_with("fail-safe:"), "{}", advice.diagnostic);
    assert_eq!(e.session(), &before);
}

#[rstest]
fn fail_safe_cycles_are_audited() {
    let audit = MemoryAudit::default();
    let mut e = Engine::builder().audit_sink(audit.clone()).build().unwrap();
    let h = rising_history(0, 9.0);
    e.advise(&input(0, &h, 0.6));

    let h5 = rising_history(5 * MIN, 9.2);
    let mut bad = input(5 * MIN, &h5, 0.6);
    bad.bg_now = f64::INFINITY;
    e.advise(&bad);
    e.advise_from_store(&FailingStore, &input(10 * MIN, &h5, 0.6));

    let rows = audit.rows();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.len() == rows[0].len()));
    let field = |row: usize, name: &str| {
        rows[row]
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.clone())
            .unwrap()
    };
    assert_eq!(field(0, "fail_safe"), "");
    assert_eq!(field(1, "now_ms"), (5 * MIN).to_string());
    assert_eq!(field(1, "final_dose"), "0.0000");
    assert_eq!(field(1, "segment"), "1");
    assert!(field(1, "fail_safe").contains("bg_now must be finite"));
    assert_eq!(field(2, "now_ms"), (10 * MIN).to_string());
    assert!(field(2, "fail_safe").contains("preference store unavailable"));
}

#[rstest]
fn audit_failure_does_not_change_the_decision() {
    let h = rising_history(0, 9.0);
    let mut quiet = Engine::builder().audit_sink(NullAudit).build().unwrap();
    let mut failing = Engine::builder().audit_sink(FailingAudit).build().unwrap();
    assert_eq!(quiet.advise(&input(0, &h, 0.6)), failing.advise(&input(0, &h, 0.6)));
}

#[rstest]
fn store_failure_fails_safe() {
    let mut e = engine();
    let h = rising_history(0, 9.0);
    let advice = e.advise_from_store(&FailingStore, &input(0, &h, 0.6));
    assert_eq!(advice.bolus_u, 0.0);
    assert!(advice.diagnostic.contains("preference store unavailable"));

    let ok = e.advise_from_store(&StaticStore::new(Tunables::default()), &input(0, &h, 0.6));
    assert!(ok.should_deliver);
}

#[rstest]
fn night_uses_the_night_cap() {
    let mut e = engine();
    let h = rising_history(0, 12.0);
    let mut inp = input(0, &h, 0.0);
    inp.night = true;
    e.advise(&inp);
    let t = e.last_trace().unwrap();
    assert_eq!(t.max_single_dose_u, 0.8);
    assert!(t.final_dose_u <= 0.8);
}

#[rstest]
fn delivery_ring_is_bounded() {
    let mut e = Engine::builder().history_capacity(2).build().unwrap();
    for i in 0..4 {
        let now = i * 5 * MIN;
        let h = rising_history(now, 9.0 + 0.2 * i as f64);
        e.advise(&input(now, &h, 0.6));
    }
    let ring = e.delivery_history();
    assert_eq!(ring.len(), 2);
    assert_eq!(ring[0].timestamp_ms, 10 * MIN);
    assert_eq!(ring[1].timestamp_ms, 15 * MIN);
    assert!(ring.iter().all(|r| r.delivered_u > 0.0));
}

#[rstest]
fn zero_history_capacity_is_a_build_error() {
    let err = Engine::builder()
        .history_capacity(0)
        .build()
        .expect_err("should fail");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidHistoryCapacity) => {}
        other => panic!("expected InvalidHistoryCapacity, got: {other:?}"),
    }
}

#[rstest]
fn shared_engine_serializes_callers() {
    let shared = SharedEngine::new(engine());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let s = shared.clone();
            std::thread::spawn(move || {
                let now = i * 5 * MIN;
                let h = rising_history(now, 9.0);
                s.advise(&input(now, &h, 0.6))
            })
        })
        .collect();
    for h in handles {
        let advice = h.join().unwrap();
        assert!(advice.bolus_u >= 0.0);
    }
    assert!(!shared.delivery_history().unwrap().is_empty());
}
