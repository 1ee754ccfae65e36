#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::similar_names
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Closed-loop insulin decision core (device-agnostic).
//!
//! Once per control cycle the scheduler hands the engine a smoothed glucose
//! history and the current insulin-on-board; the engine answers with an
//! [`Advice`]: a bolus, a temp basal rate, and a diagnostic line. The pump,
//! the audit file and the parameter store sit behind `glyco_traits` seams.
//!
//! ## Pipeline
//!
//! Stages run in a fixed order each cycle:
//!
//! - **Trend** (`trend`): slope, acceleration, consistency
//! - **Context** (`context`): IOB ratio, distance to target
//! - **Energy + gate** (`energy`): raw dose, hard stop / force / soft allow
//! - **Meal** (`meal`): stateless meal likelihood
//! - **Peak** (`peak`): episode memory and peak prediction
//! - **Damping** (`damping`): IOB damping on the peak-boosted ratio
//! - **Early dose** (`early`): anticipatory two-stage floor
//! - **Trajectory** (`trajectory`): continuous damper, holds, anti-drip
//! - **Commit** (`commit`): meal escalation, re-entry, absorption
//! - **Safety** (`safety`): hypo forecast and post-peak veto
//! - **Execution** (`execution`): bolus / temp basal split
//!
//! Persistent state lives in one [`Session`] owned by the [`Engine`].
//!
//! ## Failure model
//!
//! [`Engine::advise`] cannot fail. Invalid input, non-finite arithmetic, a
//! failing parameter store or a panic inside the pipeline all produce a
//! zero-dose advice whose diagnostic starts with `fail-safe:`.

pub mod audit;
pub mod commit;
pub mod config;
pub mod context;
pub mod conversions;
pub mod damping;
pub mod early;
pub mod energy;
pub mod engine;
pub mod error;
pub mod execution;
pub mod meal;
pub mod mocks;
pub mod peak;
pub mod safety;
pub mod session;
pub mod store;
pub mod trajectory;
pub mod trend;
pub mod types;
pub mod util;

pub use config::Tunables;
pub use engine::{DecisionTrace, Engine, EngineBuilder, SharedEngine, decide};
pub use error::{BuildError, EngineError, Report, Result};
pub use execution::{ExecutionMode, ExecutionResult};
pub use session::Session;
pub use store::{ParameterStore, StaticStore};
pub use types::{Advice, CycleInput, DeliveryRecord, GlucoseSample};
