// Co-property adapter - rehabilitation budgets into equivalent amounts
// project budget × the authority's share ratio, spread over the
// co-property payment curve.

use crate::adapters::CategoryForecast;
use crate::config::CopropertyConfig;
use crate::db::CopropertySummary;
use crate::forecast::ForecastError;
use crate::ratios::HORIZON;

pub struct CopropertyAdapter {
    config: CopropertyConfig,
}

impl CopropertyAdapter {
    pub fn new(config: CopropertyConfig) -> Self {
        CopropertyAdapter { config }
    }

    pub fn project(
        &self,
        rows: &[CopropertySummary],
    ) -> Result<Vec<CategoryForecast>, ForecastError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        if self.config.action_code.is_empty() {
            return Err(ForecastError::IncompleteConfiguration {
                detail: "coproperty: no target action code configured".to_string(),
            });
        }

        if self.config.share_ratio <= 0.0 {
            return Err(ForecastError::IncompleteConfiguration {
                detail: "coproperty: share ratio is not set".to_string(),
            });
        }

        if self.config.curve.iter().all(|&r| r == 0.0) {
            return Err(ForecastError::IncompleteConfiguration {
                detail: "coproperty: payment curve is all zero".to_string(),
            });
        }

        let total: f64 = rows.iter().map(|row| row.budget).sum::<f64>() * self.config.share_ratio;

        let mut amounts = [0.0; HORIZON];
        for (slot, share) in amounts.iter_mut().zip(self.config.curve.iter()) {
            *slot = total * share;
        }

        Ok(vec![CategoryForecast {
            action_code: self.config.action_code.clone(),
            amounts,
        }])
    }
}
