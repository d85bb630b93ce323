// Forecast configuration - unit costs and category share ratios as data
// Explicitly passed to the engine (never ambient state) so the combiner
// stays pure and unit-testable with injected fixtures.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::ratios::HORIZON;

/// Housing adapter configuration: per-financing-type unit subsidies and the
/// standard delivery curve housing amounts are spread over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousingConfig {
    /// Budget action housing subsidies are booked under.
    pub action_code: String,

    /// Per-unit subsidy by financing type (PLAI / PLUS / PLS).
    pub unit_costs: HashMap<String, f64>,

    /// Share of the equivalent amount expected per year offset.
    pub delivery_curve: [f64; HORIZON],
}

/// Co-property adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopropertyConfig {
    pub action_code: String,

    /// Authority share of a co-property project budget.
    pub share_ratio: f64,

    pub curve: [f64; HORIZON],
}

/// Renewal-project adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalConfig {
    pub action_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub housing: HousingConfig,
    pub coproperty: CopropertyConfig,
    pub renewal: RenewalConfig,
}

impl ForecastConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<ForecastConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: ForecastConfig =
            serde_json::from_str(&content).context("Failed to parse forecast configuration")?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {:?}", path))?;

        Ok(())
    }
}

impl Default for ForecastConfig {
    /// The authority's standard values; used on first run and in tests.
    fn default() -> Self {
        let mut unit_costs = HashMap::new();
        unit_costs.insert("PLAI".to_string(), 11_000.0);
        unit_costs.insert("PLUS".to_string(), 7_500.0);
        unit_costs.insert("PLS".to_string(), 3_000.0);

        ForecastConfig {
            housing: HousingConfig {
                action_code: "15400101".to_string(),
                unit_costs,
                delivery_curve: [0.15, 0.35, 0.30, 0.15, 0.05],
            },
            coproperty: CopropertyConfig {
                action_code: "15400301".to_string(),
                share_ratio: 0.35,
                curve: [0.20, 0.40, 0.30, 0.10, 0.0],
            },
            renewal: RenewalConfig {
                action_code: "15400401".to_string(),
            },
        }
    }
}
