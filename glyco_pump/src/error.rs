use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PumpError {
    #[error("invalid bolus amount: {0} U")]
    InvalidBolus(f64),
    #[error("invalid temp basal rate: {0} U/h")]
    InvalidRate(f64),
    #[error("temp basal rate {rate} U/h above pump max {max} U/h")]
    RateAboveMax { rate: f64, max: f64 },
    #[error("reservoir empty: {requested} U requested, {remaining} U left")]
    ReservoirEmpty { requested: f64, remaining: f64 },
    #[error("pump suspended")]
    Suspended,
}

pub type Result<T> = std::result::Result<T, PumpError>;
