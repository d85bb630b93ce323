// Housing adapter - subsidized unit counts into equivalent amounts
// units (per financing type) × per-type unit subsidy, spread over the
// standard housing delivery curve.

use crate::adapters::CategoryForecast;
use crate::config::HousingConfig;
use crate::db::HousingSummary;
use crate::forecast::ForecastError;
use crate::ratios::HORIZON;

pub struct HousingAdapter {
    config: HousingConfig,
}

impl HousingAdapter {
    pub fn new(config: HousingConfig) -> Self {
        HousingAdapter { config }
    }

    /// Convert housing summaries into a multi-year equivalent amount under
    /// the configured housing action.
    ///
    /// A financing type with units on record but no configured unit cost
    /// aborts the forecast: a silently missing housing contribution is
    /// worse than no forecast at all.
    pub fn project(&self, rows: &[HousingSummary]) -> Result<Vec<CategoryForecast>, ForecastError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        if self.config.action_code.is_empty() {
            return Err(ForecastError::IncompleteConfiguration {
                detail: "housing: no target action code configured".to_string(),
            });
        }

        if self.config.delivery_curve.iter().all(|&r| r == 0.0) {
            return Err(ForecastError::IncompleteConfiguration {
                detail: "housing: delivery curve is all zero".to_string(),
            });
        }

        let mut total = 0.0;

        for row in rows {
            if row.units == 0 {
                continue;
            }

            let unit_cost = self.config.unit_costs.get(&row.financing).ok_or_else(|| {
                ForecastError::IncompleteConfiguration {
                    detail: format!(
                        "housing: no unit cost configured for financing type {}",
                        row.financing
                    ),
                }
            })?;

            total += row.units as f64 * unit_cost;
        }

        let mut amounts = [0.0; HORIZON];
        for (slot, share) in amounts.iter_mut().zip(self.config.delivery_curve.iter()) {
            *slot = total * share;
        }

        Ok(vec![CategoryForecast {
            action_code: self.config.action_code.clone(),
            amounts,
        }])
    }
}
