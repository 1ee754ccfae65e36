//! The decision engine: one `advise` call per control cycle.
//!
//! `advise` never fails. The pipeline runs in `decide`, which returns
//! `Result`; an error or a panic inside it restores the session to its
//! pre-cycle state and yields a zero-dose advice.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use glyco_traits::AuditSink;

use crate::audit;
use crate::commit::{self, CommitInputs, CommitOutcome};
use crate::config::Tunables;
use crate::context::DecisionContext;
use crate::damping;
use crate::early::{self, EarlyDoseOutcome};
use crate::energy::{self, EnergyBreakdown, GateOutcome};
use crate::error::{BuildError, EngineError, Result};
use crate::execution::{self, ExecutionResult};
use crate::meal::{self, MealSignal};
use crate::peak::PeakOutcome;
use crate::safety::{self, SafetyOutcome};
use crate::session::{DEFAULT_HISTORY_CAPACITY, Session};
use crate::store::ParameterStore;
use crate::trajectory::{self, DamperOutcome, ShapedDose};
use crate::trend::{self, TrendEstimate};
use crate::types::{Advice, CycleInput, DeliveryRecord};

/// Every intermediate quantity of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTrace {
    pub now_ms: i64,
    pub night: bool,
    pub segment: u64,
    pub trend: TrendEstimate,
    pub ctx: DecisionContext,
    pub energy: EnergyBreakdown,
    pub gate: GateOutcome,
    pub meal: MealSignal,
    pub peak: PeakOutcome,
    pub boosted_iob_ratio: f64,
    pub primary_iob_factor: f64,
    pub dose_after_damping: f64,
    pub reentry: bool,
    pub early: EarlyDoseOutcome,
    pub damper: DamperOutcome,
    pub hard_block: bool,
    pub correction_hold: bool,
    pub early_floor_applied: bool,
    pub anti_drip_blocked: bool,
    pub commit: CommitOutcome,
    pub safety: SafetyOutcome,
    pub max_single_dose_u: f64,
    pub final_dose_u: f64,
    pub execution: ExecutionResult,
    pub diagnostic: String,
}

impl DecisionTrace {
    pub fn advice(&self) -> Advice {
        Advice::new(
            self.execution.bolus_u,
            self.execution.basal_rate_u_per_h,
            self.diagnostic.clone(),
        )
    }

    fn describe(&self) -> String {
        let mut s = format!(
            "dose={:.2}U gate={} meal={}({:.2}) peak={} [{}] early={} trend={}",
            self.final_dose_u,
            self.gate.layer.as_str(),
            self.meal.state.as_str(),
            self.meal.confidence,
            self.peak.band.label(),
            self.peak.sub_state.as_str(),
            self.early.stage,
            self.trend.phase.as_str(),
        );
        if self.reentry {
            s.push_str(" reentry");
        }
        if self.hard_block {
            s.push_str(" hold=trajectory");
        } else if self.correction_hold {
            s.push_str(" hold=correction");
        } else if self.anti_drip_blocked {
            s.push_str(" hold=anti-drip");
        }
        if self.early_floor_applied {
            s.push_str(" floor=early");
        }
        if let Some(reason) = self.commit.committed {
            s.push_str(" commit=");
            s.push_str(reason.as_str());
        } else if self.commit.absorption {
            s.push_str(" absorbing");
        }
        if let Some(v) = self.safety.veto {
            s.push_str(" veto=");
            s.push_str(v.as_str());
        }
        s
    }
}

fn check_finite(name: &str, v: f64) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(eyre::Report::new(EngineError::InvalidInput(format!(
            "{name} must be finite, got {v}"
        ))))
    }
}

fn validate_input(input: &CycleInput<'_>) -> Result<()> {
    check_finite("bg_now", input.bg_now)?;
    check_finite("iob_u", input.iob_u)?;
    check_finite("max_iob_u", input.max_iob_u)?;
    check_finite("isf_mmol_per_u", input.isf_mmol_per_u)?;
    check_finite("target_mmol", input.target_mmol)?;
    if input.bg_now <= 0.0 {
        return Err(eyre::Report::new(EngineError::InvalidInput(format!(
            "bg_now must be > 0, got {}",
            input.bg_now
        ))));
    }
    if let Some(s) = input.history.iter().find(|s| !s.mmol.is_finite()) {
        return Err(eyre::Report::new(EngineError::InvalidInput(format!(
            "history sample at {} is not finite",
            s.timestamp_ms
        ))));
    }
    Ok(())
}

/// Run the full pipeline once against `session`.
pub fn decide(
    session: &mut Session,
    t: &Tunables,
    input: &CycleInput<'_>,
) -> Result<DecisionTrace> {
    validate_input(input)?;
    let now = input.now_ms;
    let night = input.night;
    let (gain, max_single) = t.day_night.select(night);
    let min_consistency = t.energy.min_consistency;

    let trend = trend::estimate(input.history);
    let ctx = DecisionContext::build(input, &trend);
    tracing::trace!(
        slope = trend.slope,
        accel = trend.acceleration,
        consistency = trend.consistency,
        "trend"
    );

    let energy = energy::evaluate(&ctx, &t.energy, input.isf_mmol_per_u, gain);
    let gate = energy::gate(&ctx, energy.raw_dose, night);
    let meal = meal::detect(&ctx, &t.meal, min_consistency);
    let peak = session.step_episode(&ctx, meal, now, &t.peak);

    let boosted_iob_ratio =
        damping::peak_boosted_ratio(ctx.iob_ratio, ctx.bg_now, peak.prediction.predicted, &t.iob);
    let primary_iob_factor = damping::primary_factor(boosted_iob_ratio, &t.iob);
    let mut dose = gate.decided_dose * primary_iob_factor;
    let dose_after_damping = dose;
    tracing::trace!(raw = energy.raw_dose, gated = gate.decided_dose, dose, "energy");

    let reentry = commit::detect_reentry(&session.ledger, &ctx, &t.reentry, now);
    if reentry {
        session.reenter(now);
    }

    let early = early::evaluate(
        &mut session.early,
        &ctx,
        meal,
        peak.sub_state,
        now,
        max_single,
        night,
    );

    let ShapedDose {
        dose: shaped_dose,
        damper,
        hard_block,
        correction_hold,
        early_floor_applied,
    } = trajectory::shape(
        dose,
        &ctx,
        meal.state,
        peak.category,
        &early,
        gate.blocked(),
        t,
    );
    dose = shaped_dose;

    let anti_drip_blocked =
        trajectory::anti_drip(dose, meal.state, &mut session.ledger, now, &t.holds);
    if anti_drip_blocked {
        dose = 0.0;
    }

    let commit = commit::resolve(
        &CommitInputs {
            pre_dose: dose,
            ctx: &ctx,
            meal,
            category: peak.category,
            reentry,
            gate_blocked: gate.blocked(),
            max_single_dose_u: max_single,
            min_consistency,
            now_ms: now,
        },
        &mut session.ledger,
        &t.commit,
        &t.meal,
        &t.iob,
    );

    let safety = safety::apply(commit.dose, &ctx, &session.ledger, &t.commit, &t.safety, now);

    if !safety.dose.is_finite() {
        return Err(eyre::Report::new(EngineError::Fault(format!(
            "non-finite commanded dose {}",
            safety.dose
        ))));
    }
    let final_dose_u = safety.dose.clamp(0.0, max_single.max(0.0));
    let execution = execution::map(final_dose_u, &t.delivery);
    if execution.delivered_u > 0.0 {
        session.deliveries.push(DeliveryRecord {
            timestamp_ms: now,
            delivered_u: execution.delivered_u,
        });
    }

    let mut trace = DecisionTrace {
        now_ms: now,
        night,
        segment: session.segment(),
        trend,
        ctx,
        energy,
        gate,
        meal,
        peak,
        boosted_iob_ratio,
        primary_iob_factor,
        dose_after_damping,
        reentry,
        early,
        damper,
        hard_block,
        correction_hold,
        early_floor_applied,
        anti_drip_blocked,
        commit,
        safety,
        max_single_dose_u: max_single,
        final_dose_u,
        execution,
        diagnostic: String::new(),
    };
    trace.diagnostic = trace.describe();
    tracing::debug!(
        dose = final_dose_u,
        bolus = execution.bolus_u,
        basal_rate = execution.basal_rate_u_per_h,
        stage = early.stage,
        category = peak.category.as_str(),
        "cycle"
    );
    Ok(trace)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct Engine {
    tunables: Tunables,
    session: Session,
    audit: Option<Box<dyn AuditSink + Send>>,
    last_trace: Option<DecisionTrace>,
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("segment", &self.session.segment())
            .field("episode_active", &self.session.episode.active)
            .field("early_stage", &self.session.early.stage)
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    pub fn set_tunables(&mut self, tunables: Tunables) {
        self.tunables = tunables;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Trace of the last successful cycle.
    pub fn last_trace(&self) -> Option<&DecisionTrace> {
        self.last_trace.as_ref()
    }

    /// Recent nonzero deliveries, oldest first.
    pub fn delivery_history(&self) -> Vec<DeliveryRecord> {
        self.session.deliveries.to_vec()
    }

    /// Decide one cycle. Always returns an advice; on any internal fault the
    /// advice is zero dose and the session is left untouched.
    pub fn advise(&mut self, input: &CycleInput<'_>) -> Advice {
        let snapshot = self.session.clone();
        let tunables = &self.tunables;
        let session = &mut self.session;
        let outcome = catch_unwind(AssertUnwindSafe(|| decide(session, tunables, input)));
        let reason = match outcome {
            Ok(Ok(trace)) => {
                self.write_audit(&trace);
                let advice = trace.advice();
                self.last_trace = Some(trace);
                return advice;
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panic: {}", panic_message(payload.as_ref())),
        };
        self.session = snapshot;
        self.fail_safe(input, &reason)
    }

    /// Refresh tunables from `store`, then decide. A store failure fails safe.
    pub fn advise_from_store(
        &mut self,
        store: &dyn ParameterStore,
        input: &CycleInput<'_>,
    ) -> Advice {
        match store.snapshot() {
            Ok(t) => {
                self.tunables = t;
                self.advise(input)
            }
            Err(e) => {
                tracing::warn!(error = %e, "parameter store failed");
                self.fail_safe(input, &e.to_string())
            }
        }
    }

    /// Zero-dose advice for a faulted cycle, audited like any other.
    fn fail_safe(&mut self, input: &CycleInput<'_>, reason: &str) -> Advice {
        tracing::warn!(reason = %reason, now_ms = input.now_ms, "fail-safe zero dose");
        let row = audit::fail_safe_record(
            input.now_ms,
            input.night,
            self.session.segment(),
            reason,
        );
        self.write_row(&row);
        Advice::zero(format!("fail-safe: {reason}"))
    }

    fn write_audit(&mut self, trace: &DecisionTrace) {
        if self.audit.is_some() {
            self.write_row(&audit::record(trace));
        }
    }

    fn write_row(&mut self, row: &[(&'static str, String)]) {
        let Some(sink) = self.audit.as_mut() else {
            return;
        };
        if let Err(e) = sink.write_row(row) {
            tracing::warn!(error = %e, "audit write failed");
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

pub struct EngineBuilder {
    tunables: Option<Tunables>,
    audit: Option<Box<dyn AuditSink + Send>>,
    history_capacity: usize,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            tunables: None,
            audit: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl EngineBuilder {
    pub fn tunables(mut self, t: Tunables) -> Self {
        self.tunables = Some(t);
        self
    }

    pub fn audit_sink(mut self, sink: impl AuditSink + Send + 'static) -> Self {
        self.audit = Some(Box::new(sink));
        self
    }

    pub fn history_capacity(mut self, cap: usize) -> Self {
        self.history_capacity = cap;
        self
    }

    pub fn build(self) -> Result<Engine> {
        if self.history_capacity == 0 {
            return Err(eyre::Report::new(BuildError::InvalidHistoryCapacity));
        }
        let tunables = self.tunables.unwrap_or_default();
        let (_, day_cap) = tunables.day_night.select(false);
        let (_, night_cap) = tunables.day_night.select(true);
        let cap_ok = |c: f64| c.is_finite() && c >= 0.0;
        if !(cap_ok(day_cap) && cap_ok(night_cap)) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "max single dose must be finite and >= 0",
            )));
        }
        Ok(Engine {
            tunables,
            session: Session::with_history_capacity(self.history_capacity),
            audit: self.audit,
            last_trace: None,
        })
    }
}

// ── SharedEngine ─────────────────────────────────────────────────────────────

/// Cloneable handle serializing concurrent callers around one engine.
#[derive(Clone, Debug)]
pub struct SharedEngine {
    inner: Arc<Mutex<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn advise(&self, input: &CycleInput<'_>) -> Advice {
        match self.inner.lock() {
            Ok(mut engine) => engine.advise(input),
            Err(_) => {
                tracing::warn!("engine lock poisoned; fail-safe zero dose");
                Advice::zero(format!("fail-safe: {}", EngineError::StateLock))
            }
        }
    }

    pub fn delivery_history(&self) -> Result<Vec<DeliveryRecord>> {
        let engine = self
            .inner
            .lock()
            .map_err(|_| eyre::Report::new(EngineError::StateLock))?;
        Ok(engine.delivery_history())
    }
}
