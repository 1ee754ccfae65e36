#![no_main]
use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;

use glyco_core::{CycleInput, Engine, GlucoseSample};

#[derive(Debug, Arbitrary)]
struct Cycle {
    step_min: u8,
    bg: f64,
    iob: f64,
    night: bool,
}

fuzz_target!(|cycles: Vec<Cycle>| {
    let Ok(mut engine) = Engine::builder().build() else {
        return;
    };
    let mut now = 0i64;
    let mut history: Vec<GlucoseSample> = Vec::new();
    for c in cycles.iter().take(64) {
        now += i64::from(c.step_min) * 60_000;
        history.push(GlucoseSample::new(now, c.bg));
        let start = history.len().saturating_sub(10);
        let advice = engine.advise(&CycleInput {
            now_ms: now,
            bg_now: c.bg,
            history: &history[start..],
            iob_u: c.iob,
            max_iob_u: 6.0,
            isf_mmol_per_u: 2.5,
            target_mmol: 5.5,
            night: c.night,
        });
        assert!(advice.bolus_u.is_finite() && advice.bolus_u >= 0.0);
        assert!(advice.basal_rate_u_per_h.is_finite() && advice.basal_rate_u_per_h >= 0.0);
        assert!(advice.bolus_u <= 1.2 + 1e-9);
    }
});
