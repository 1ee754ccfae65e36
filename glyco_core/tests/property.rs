mod common;

use common::MIN;
use glyco_core::damping::iob_damping;
use glyco_core::{CycleInput, Engine, GlucoseSample};
use proptest::prelude::*;

prop_compose! {
    fn history_strategy()(
        start in 2.5f64..20.0,
        steps in prop::collection::vec(-0.6f64..0.6, 0..24),
    ) -> Vec<GlucoseSample> {
        let mut bg = start;
        let n = steps.len() as i64;
        let mut out = vec![GlucoseSample::new(-n * 5 * MIN, bg)];
        for (i, d) in steps.iter().enumerate() {
            bg = (bg + d).max(1.0);
            out.push(GlucoseSample::new((i as i64 + 1 - n) * 5 * MIN, bg));
        }
        out
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn outputs_stay_in_range(
        cycles in prop::collection::vec((history_strategy(), 0.0f64..12.0, any::<bool>()), 1..6),
    ) {
        let mut e = Engine::builder().build().unwrap();
        for (i, (hist, iob, night)) in cycles.iter().enumerate() {
            let now = i as i64 * 5 * MIN;
            let shifted: Vec<GlucoseSample> = hist
                .iter()
                .map(|s| GlucoseSample::new(s.timestamp_ms + now, s.mmol))
                .collect();
            let bg_now = shifted.last().map_or(5.5, |s| s.mmol);
            let advice = e.advise(&CycleInput {
                now_ms: now,
                bg_now,
                history: &shifted,
                iob_u: *iob,
                max_iob_u: 6.0,
                isf_mmol_per_u: 2.5,
                target_mmol: 5.5,
                night: *night,
            });
            prop_assert!(advice.bolus_u >= 0.0);
            prop_assert!(advice.basal_rate_u_per_h >= 0.0);
            prop_assert!(advice.basal_rate_u_per_h <= 15.0);
            prop_assert!(!advice.diagnostic.starts_with("fail-safe"), "{}", advice.diagnostic);

            let t = e.last_trace().unwrap();
            prop_assert!((0.0..=1.0).contains(&t.ctx.consistency));
            prop_assert!((0.0..=1.5).contains(&t.ctx.iob_ratio));
            prop_assert!((0.0..=1.0).contains(&t.primary_iob_factor));
            prop_assert!((0.0..=1.0).contains(&t.damper.factor));
            prop_assert!((0.0..=1.0).contains(&t.gate.dampening));
            prop_assert!(t.peak.prediction.predicted >= bg_now);
            prop_assert!(t.final_dose_u >= 0.0 && t.final_dose_u <= t.max_single_dose_u);
            prop_assert!(t.execution.delivered_u <= t.final_dose_u + 1e-9);
        }
    }

    #[test]
    fn damping_is_bounded(ratio in -1.0f64..3.0, power in 0.1f64..4.0, min_factor in 0.0f64..1.0) {
        let f = iob_damping(ratio, 0.3, 1.0, min_factor, power);
        prop_assert!(f >= min_factor - 1e-12 && f <= 1.0);
    }

    #[test]
    fn mapper_never_over_delivers(dose in 0.0f64..5.0, hybrid in 0.0f64..100.0) {
        let cfg = glyco_core::config::DeliveryCfg { hybrid_percent: hybrid, ..Default::default() };
        let r = glyco_core::execution::map(dose, &cfg);
        prop_assert!(r.delivered_u <= dose + 1e-9);
        prop_assert!(r.bolus_u >= 0.0 && r.basal_rate_u_per_h <= cfg.max_basal_rate_u_per_h);
    }
}
