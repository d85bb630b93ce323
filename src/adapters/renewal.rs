// Renewal-project adapter - multi-year project budgets, reconciled
//
// Renewal budgets are already expressed per year bracket. Amounts already
// committed for a project are captured by the commitment aggregator, so
// they are deducted here (earliest bracket first, floored at zero) to
// avoid double counting.

use crate::adapters::CategoryForecast;
use crate::config::RenewalConfig;
use crate::db::RenewProjectBudget;
use crate::forecast::ForecastError;
use crate::ratios::HORIZON;
use std::collections::HashMap;

pub struct RenewalAdapter {
    config: RenewalConfig,
}

impl RenewalAdapter {
    pub fn new(config: RenewalConfig) -> Self {
        RenewalAdapter { config }
    }

    /// Pass project budgets through after deducting per-project committed
    /// totals, and book the remainder under the configured renewal action.
    pub fn project(
        &self,
        budgets: &[RenewProjectBudget],
        committed_by_project: &[(String, f64)],
    ) -> Result<Vec<CategoryForecast>, ForecastError> {
        if budgets.is_empty() {
            return Ok(Vec::new());
        }

        if self.config.action_code.is_empty() {
            return Err(ForecastError::IncompleteConfiguration {
                detail: "renewal: no target action code configured".to_string(),
            });
        }

        let committed: HashMap<&str, f64> = committed_by_project
            .iter()
            .map(|(project, total)| (project.as_str(), *total))
            .collect();

        let mut amounts = [0.0; HORIZON];

        for budget in budgets {
            let mut remaining_committed = committed.get(budget.project.as_str()).copied().unwrap_or(0.0);

            for (slot, bracket) in amounts.iter_mut().zip(budget.amounts.iter()) {
                let deducted = bracket.min(remaining_committed).max(0.0);
                remaining_committed -= deducted;
                *slot += bracket - deducted;
            }
        }

        Ok(vec![CategoryForecast {
            action_code: self.config.action_code.clone(),
            amounts,
        }])
    }
}
