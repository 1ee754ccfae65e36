//! Pump implementations for the `glyco_traits::Pump` seam.
//!
//! Only a simulator lives here; a real driver is wired in by the scheduler.
pub mod error;

use error::{PumpError, Result};
use glyco_traits::{BoxError, Pump};

/// Running temp basal as last commanded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempBasal {
    pub rate_u_per_h: f64,
    pub minutes: u32,
}

/// In-memory pump: validates commands like a device would and keeps totals.
///
/// A temp basal is credited in full when it is set; the replay loop replaces
/// it every cycle, so the credit equals one cycle's worth.
#[derive(Debug, Clone)]
pub struct SimulatedPump {
    max_basal_rate_u_per_h: f64,
    reservoir_u: f64,
    suspended: bool,
    temp_basal: Option<TempBasal>,
    bolus_total_u: f64,
    basal_total_u: f64,
    boluses: usize,
}

impl SimulatedPump {
    pub fn new(max_basal_rate_u_per_h: f64) -> Self {
        Self {
            max_basal_rate_u_per_h,
            reservoir_u: 300.0,
            suspended: false,
            temp_basal: None,
            bolus_total_u: 0.0,
            basal_total_u: 0.0,
            boluses: 0,
        }
    }

    pub fn with_reservoir(mut self, units: f64) -> Self {
        self.reservoir_u = units;
        self
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
        self.temp_basal = None;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn temp_basal(&self) -> Option<TempBasal> {
        self.temp_basal
    }

    pub fn bolus_total_u(&self) -> f64 {
        self.bolus_total_u
    }

    pub fn basal_total_u(&self) -> f64 {
        self.basal_total_u
    }

    pub fn delivered_total_u(&self) -> f64 {
        self.bolus_total_u + self.basal_total_u
    }

    pub fn bolus_count(&self) -> usize {
        self.boluses
    }

    pub fn reservoir_u(&self) -> f64 {
        self.reservoir_u
    }

    fn draw(&mut self, units: f64) -> Result<()> {
        if units > self.reservoir_u + 1e-9 {
            return Err(PumpError::ReservoirEmpty {
                requested: units,
                remaining: self.reservoir_u,
            });
        }
        self.reservoir_u = (self.reservoir_u - units).max(0.0);
        Ok(())
    }

    pub fn bolus(&mut self, units: f64) -> Result<()> {
        if self.suspended {
            return Err(PumpError::Suspended);
        }
        if !(units.is_finite() && units >= 0.0) {
            return Err(PumpError::InvalidBolus(units));
        }
        if units == 0.0 {
            return Ok(());
        }
        self.draw(units)?;
        self.bolus_total_u += units;
        self.boluses += 1;
        tracing::debug!(units, total = self.bolus_total_u, "bolus (simulated)");
        Ok(())
    }

    pub fn temp(&mut self, rate_u_per_h: f64, minutes: u32) -> Result<()> {
        if self.suspended {
            return Err(PumpError::Suspended);
        }
        if !(rate_u_per_h.is_finite() && rate_u_per_h >= 0.0) {
            return Err(PumpError::InvalidRate(rate_u_per_h));
        }
        if rate_u_per_h > self.max_basal_rate_u_per_h + 1e-9 {
            return Err(PumpError::RateAboveMax {
                rate: rate_u_per_h,
                max: self.max_basal_rate_u_per_h,
            });
        }
        if rate_u_per_h == 0.0 {
            if self.temp_basal.take().is_some() {
                tracing::debug!("temp basal cancelled (simulated)");
            }
            return Ok(());
        }
        let units = rate_u_per_h * f64::from(minutes) / 60.0;
        self.draw(units)?;
        self.basal_total_u += units;
        self.temp_basal = Some(TempBasal {
            rate_u_per_h,
            minutes,
        });
        tracing::debug!(rate_u_per_h, minutes, units, "temp basal (simulated)");
        Ok(())
    }
}

impl Pump for SimulatedPump {
    fn deliver_bolus(&mut self, units: f64) -> std::result::Result<(), BoxError> {
        self.bolus(units).map_err(|e| Box::new(e) as BoxError)
    }

    fn set_temp_basal(
        &mut self,
        rate_u_per_h: f64,
        minutes: u32,
    ) -> std::result::Result<(), BoxError> {
        self.temp(rate_u_per_h, minutes)
            .map_err(|e| Box::new(e) as BoxError)
    }
}
