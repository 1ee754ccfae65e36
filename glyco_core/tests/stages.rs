use glyco_core::Tunables;
use glyco_core::commit::{self, CommitInputs, CommitLedger, CommitReason};
use glyco_core::config::{CommitCfg, DeliveryCfg, EnergyCfg, IobCfg, MealCfg, SafetyCfg};
use glyco_core::context::DecisionContext;
use glyco_core::early::EarlyDoseOutcome;
use glyco_core::energy::{self, GateLayer};
use glyco_core::execution::{self, ExecutionMode};
use glyco_core::meal::{MealSignal, MealState};
use glyco_core::peak::PeakCategory;
use glyco_core::safety::{self, Veto};
use glyco_core::trajectory;
use glyco_core::trend;
use rstest::rstest;

fn ctx(slope: f64, accel: f64, consistency: f64, iob_ratio: f64) -> DecisionContext {
    DecisionContext {
        bg_now: 10.0,
        slope,
        acceleration: accel,
        consistency,
        iob_ratio,
        delta_to_target: 4.5,
    }
}

#[rstest]
#[case::unreliable(ctx(3.0, 1.0, 0.1, 0.2))]
#[case::loaded(ctx(3.0, 1.0, 0.9, 1.2))]
fn hard_stop_zeroes_any_raw_dose(#[case] c: DecisionContext) {
    let raw = energy::evaluate(&c, &EnergyCfg::default(), 2.5, 0.5).raw_dose;
    assert!(raw > 0.0);
    let g = energy::gate(&c, raw, false);
    assert_eq!(g.layer, GateLayer::HardStop);
    assert_eq!(g.decided_dose, 0.0);
    assert!(g.blocked());
}

#[rstest]
#[case(false)]
#[case(true)]
fn force_allow_passes_raw_dose_exactly(#[case] night: bool) {
    let c = ctx(3.0, 1.0, 0.9, 0.2);
    let raw = energy::evaluate(&c, &EnergyCfg::default(), 2.5, 0.5).raw_dose;
    let g = energy::gate(&c, raw, night);
    assert_eq!(g.layer, GateLayer::ForceAllow);
    assert_eq!(g.decided_dose, raw);
}

#[rstest]
#[case(0.9, false, 0.9)]
#[case(0.9, true, 0.63)]
#[case(0.25, false, 0.3)]
fn soft_allow_dampening(#[case] consistency: f64, #[case] night: bool, #[case] expected: f64) {
    let c = ctx(1.0, 0.1, consistency, 0.2);
    let g = energy::gate(&c, 1.0, night);
    assert_eq!(g.layer, GateLayer::SoftAllow);
    assert!((g.dampening - expected).abs() < 1e-12);
    assert!((g.decided_dose - expected).abs() < 1e-12);
}

#[rstest]
fn stagnation_boost_only_when_flat_and_high() {
    let cfg = EnergyCfg::default();
    let flat = DecisionContext {
        delta_to_target: 4.0,
        ..ctx(0.0, 0.0, 0.5, 0.0)
    };
    let e = energy::evaluate(&flat, &cfg, 2.5, 0.5);
    assert!((e.stagnation_boost - 0.6).abs() < 1e-12);

    let rising = DecisionContext {
        delta_to_target: 4.0,
        ..ctx(0.5, 0.0, 0.5, 0.0)
    };
    assert_eq!(energy::evaluate(&rising, &cfg, 2.5, 0.5).stagnation_boost, 0.0);
}

#[rstest]
#[case(-1.5, None)]
#[case(-1.7, Some(Veto::Hypo))]
fn hypo_guard(#[case] slope: f64, #[case] veto: Option<Veto>) {
    let c = DecisionContext {
        bg_now: 6.0,
        slope,
        acceleration: 0.0,
        consistency: 0.9,
        iob_ratio: 0.1,
        delta_to_target: 0.5,
    };
    let out = safety::apply(
        0.5,
        &c,
        &CommitLedger::default(),
        &CommitCfg::default(),
        &SafetyCfg::default(),
        0,
    );
    assert_eq!(out.veto, veto);
    assert_eq!(out.dose, if veto.is_some() { 0.0 } else { 0.5 });
}

#[rstest]
fn post_peak_lockout_only_inside_window() {
    let c = ctx(0.1, 0.0, 0.9, 0.4);
    let ledger = CommitLedger {
        last_commit_ms: Some(0),
        ..CommitLedger::default()
    };
    let commit = CommitCfg::default();
    let safety_cfg = SafetyCfg::default();
    let inside = safety::apply(0.5, &c, &ledger, &commit, &safety_cfg, 30 * 60_000);
    assert_eq!(inside.veto, Some(Veto::PostPeak));
    let outside = safety::apply(0.5, &c, &ledger, &commit, &safety_cfg, 120 * 60_000);
    assert_eq!(outside.veto, None);
    assert_eq!(outside.dose, 0.5);
}

#[rstest]
fn hybrid_split_of_042() {
    let r = execution::map(0.42, &DeliveryCfg::default());
    assert_eq!(r.mode, ExecutionMode::Hybrid);
    assert!((r.basal_rate_u_per_h - 2.50).abs() < 1e-9);
    assert!((r.bolus_u - 0.20).abs() < 1e-9);
    assert!(r.delivered_u <= 0.42);
    // Rounding only: one bolus step plus one basal step over the cycle.
    assert!(0.42 - r.delivered_u < 0.05 + 0.05 / 12.0 + 1e-9);
}

#[rstest]
fn trend_of_a_steady_climb() {
    let h: Vec<_> = (0..6)
        .map(|i| glyco_core::GlucoseSample::new(i * 300_000, 6.0 + 0.25 * i as f64))
        .collect();
    let t = trend::estimate(&h);
    assert!((t.slope - 3.0).abs() < 1e-9);
    assert!(t.acceleration.abs() < 1e-9);
    assert!((t.consistency - 1.0).abs() < 1e-9);
}

#[rstest]
fn trend_skips_duplicate_timestamps() {
    let mut h: Vec<_> = (0..6)
        .map(|i| glyco_core::GlucoseSample::new(i * 300_000, 6.0 + 0.25 * i as f64))
        .collect();
    h.insert(3, h[2]);
    assert_eq!(trend::pairwise_slopes(&h).len(), 5);
}

fn early_stage(fired: bool, floor_u: f64, protection_window: bool) -> EarlyDoseOutcome {
    EarlyDoseOutcome {
        prior_stage: 0,
        stage: 1,
        confidence: 0.6,
        disabled: false,
        fired,
        floor_u,
        protection_window,
    }
}

/// Loaded: no meal, IOB ratio 0.7, slope 0.5.
#[rstest]
#[case::fired(true, false, 0.3)]
#[case::gate_stopped(true, true, 0.3)]
#[case::not_fired(false, false, 0.0)]
fn early_floor_is_applied_after_the_loaded_damper(
    #[case] fired: bool,
    #[case] gate_blocked: bool,
    #[case] floor_u: f64,
) {
    let c = ctx(0.5, 0.0, 0.9, 0.7);
    let early = early_stage(fired, floor_u, true);
    let s = trajectory::shape(
        1.0,
        &c,
        MealState::None,
        PeakCategory::Mild,
        &early,
        gate_blocked,
        &Tunables::default(),
    );
    assert!(s.damper.loaded);
    assert!(s.damper.factor <= 0.25);
    assert!(!s.hard_block && !s.correction_hold);
    if fired && !gate_blocked {
        assert!(s.early_floor_applied);
        assert_eq!(s.dose, 0.3);
    } else {
        assert!(!s.early_floor_applied);
        assert!((s.dose - s.damper.factor).abs() < 1e-12);
    }
}

#[rstest]
#[case(false)]
#[case(true)]
fn protection_window_skips_the_hard_block(#[case] protected: bool) {
    let c = ctx(0.4, -0.05, 0.9, 0.75);
    assert!(trajectory::hard_block(&c, MealState::None));
    let s = trajectory::shape(
        1.0,
        &c,
        MealState::None,
        PeakCategory::Mild,
        &early_stage(false, 0.0, protected),
        false,
        &Tunables::default(),
    );
    assert_eq!(s.hard_block, !protected);
    assert!(!s.correction_hold);
    if protected {
        assert!(s.dose > 0.0);
    } else {
        assert_eq!(s.dose, 0.0);
    }
}

#[rstest]
#[case(false)]
#[case(true)]
fn protection_window_skips_the_correction_hold(#[case] protected: bool) {
    let t = Tunables::default();
    let c = DecisionContext {
        bg_now: 7.5,
        delta_to_target: 2.0,
        ..ctx(0.2, 0.02, 0.9, 0.1)
    };
    assert!(trajectory::correction_hold(
        &c,
        MealState::None,
        PeakCategory::Mild,
        &t.holds,
        t.energy.min_consistency
    ));
    let s = trajectory::shape(
        1.0,
        &c,
        MealState::None,
        PeakCategory::Mild,
        &early_stage(false, 0.0, protected),
        false,
        &t,
    );
    assert!(!s.hard_block);
    assert_eq!(s.correction_hold, !protected);
    if protected {
        assert!(s.dose > 0.0);
    } else {
        assert_eq!(s.dose, 0.0);
    }
}

/// Twenty minutes after a meal commit the rise has stalled: absorption
/// applies unless this cycle is a re-entry.
#[rstest]
#[case(false)]
#[case(true)]
fn reentry_bypasses_absorption(#[case] reentry: bool) {
    let stalled = ctx(0.1, 0.0, 0.9, 0.1);
    let mut ledger = CommitLedger {
        last_commit_ms: Some(0),
        last_commit_u: 0.6,
        last_commit_reason: Some(CommitReason::Meal),
        ..CommitLedger::default()
    };
    let out = commit::resolve(
        &CommitInputs {
            pre_dose: 0.1,
            ctx: &stalled,
            meal: MealSignal::NONE,
            category: PeakCategory::Mild,
            reentry,
            gate_blocked: false,
            max_single_dose_u: 1.2,
            min_consistency: 0.35,
            now_ms: 20 * 60_000,
        },
        &mut ledger,
        &CommitCfg::default(),
        &MealCfg::default(),
        &IobCfg::default(),
    );
    if reentry {
        assert!(!out.absorption);
        assert_eq!(out.committed, Some(CommitReason::Reentry));
        assert!((out.dose - 0.3).abs() < 1e-12);
        assert_eq!(ledger.last_reentry_commit_ms, Some(20 * 60_000));
    } else {
        assert!(out.absorption);
        assert_eq!(out.committed, None);
        assert!((out.dose - 0.025).abs() < 1e-12);
        assert_eq!(ledger.last_commit_ms, Some(0));
    }
}
