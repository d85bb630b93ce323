// Forecast Combiner - merges every contributing source into one
// payment forecast per budget action (Y0..Y4)
//
// Data flows one way: stored facts -> per-source projections -> combiner.
// The combiner only sums; no source mutates another's output. A single
// failing source or adapter aborts the whole request - an incomplete
// forecast is worse than no forecast.

use crate::adapters::{CopropertyAdapter, HousingAdapter, RenewalAdapter};
use crate::commitments::aggregate_commitments;
use crate::config::ForecastConfig;
use crate::db;
use crate::programmation::project_programmation;
use crate::ratios::{RatioTable, HORIZON};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum ForecastError {
    /// Caller supplied no base year, or one that does not parse.
    MissingBaseYear,

    /// One of the contributing sources failed to return data.
    SourceReadFailure { source: &'static str, detail: String },

    /// A category adapter lacks configuration for data it encountered.
    IncompleteConfiguration { detail: String },
}

impl std::fmt::Display for ForecastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForecastError::MissingBaseYear => {
                write!(f, "Missing or invalid base year")
            }
            ForecastError::SourceReadFailure { source, detail } => {
                write!(f, "Failed to read {}: {}", source, detail)
            }
            ForecastError::IncompleteConfiguration { detail } => {
                write!(f, "Incomplete configuration: {}", detail)
            }
        }
    }
}

impl std::error::Error for ForecastError {}

/// Parse the caller-supplied base year before the engine runs.
pub fn parse_base_year(raw: Option<&str>) -> Result<i64, ForecastError> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or(ForecastError::MissingBaseYear)
}

// ============================================================================
// OUTPUT
// ============================================================================

/// One forecast line per budget action, with the original wire names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastEntry {
    #[serde(rename = "AcId")]
    pub action_id: i64,

    #[serde(rename = "AcCode")]
    pub action_code: String,

    #[serde(rename = "AcName")]
    pub action_name: String,

    #[serde(rename = "Pmt0")]
    pub y0: f64,

    #[serde(rename = "Pmt1")]
    pub y1: f64,

    #[serde(rename = "Pmt2")]
    pub y2: f64,

    #[serde(rename = "Pmt3")]
    pub y3: f64,

    #[serde(rename = "Pmt4")]
    pub y4: f64,
}

impl ForecastEntry {
    pub fn amounts(&self) -> [f64; HORIZON] {
        [self.y0, self.y1, self.y2, self.y3, self.y4]
    }
}

/// Response envelope with the stable field name report consumers read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResponse {
    #[serde(rename = "PmtForecast")]
    pub entries: Vec<ForecastEntry>,
}

/// Full forecast outcome: the entry list plus the outstanding balances the
/// ratio table cannot project past its horizon.
#[derive(Debug, Clone)]
pub struct ForecastResult {
    pub base_year: i64,
    pub entries: Vec<ForecastEntry>,
    pub beyond_horizon_total: f64,
    pub computed_at: chrono::DateTime<chrono::Utc>,
}

// ============================================================================
// FORECAST ENGINE
// ============================================================================

pub struct ForecastEngine {
    config: ForecastConfig,
}

impl ForecastEngine {
    pub fn new(config: ForecastConfig) -> Self {
        ForecastEngine { config }
    }

    /// Compute the payment forecast for the given base year.
    ///
    /// Reads every source fresh (no caching - the result is a pure function
    /// of current database state and the base year), projects each source,
    /// and sums contributions per action per year offset. Rounding to cents
    /// happens only at this final step; accumulation stays unrounded to
    /// avoid compounding rounding error across sources.
    pub fn forecast(
        &self,
        conn: &Connection,
        base_year: i64,
    ) -> Result<ForecastResult, ForecastError> {
        // Read all sources; the first failure aborts the request
        let actions = read("budget actions", db::get_actions(conn))?;
        let ratio_rows = read("payment ratios", db::get_ratio_rows(conn))?;
        let balances = read(
            "outstanding commitments",
            db::get_outstanding_balances(conn, base_year),
        )?;
        let programmation = read(
            "programmation",
            db::get_programmation(conn, base_year),
        )?;
        let housing_rows = read(
            "housing summaries",
            db::get_housing_summaries(conn, base_year),
        )?;
        let coproperty_rows = read(
            "co-property summaries",
            db::get_coproperty_summaries(conn, base_year),
        )?;
        let renew_budgets = read(
            "renewal project budgets",
            db::get_renew_budgets(conn, base_year),
        )?;
        let committed_by_project = read(
            "committed amounts by project",
            db::get_committed_by_project(conn),
        )?;

        let table = RatioTable::from_rows(&ratio_rows);

        // Per-source projections
        let commitment_projection = aggregate_commitments(&balances, &table, base_year);
        let programmation_projection = project_programmation(&programmation, &table);

        let housing = HousingAdapter::new(self.config.housing.clone()).project(&housing_rows)?;
        let coproperty =
            CopropertyAdapter::new(self.config.coproperty.clone()).project(&coproperty_rows)?;
        let renewal = RenewalAdapter::new(self.config.renewal.clone())
            .project(&renew_budgets, &committed_by_project)?;

        // Accumulate per action code; BTreeMap keeps the output ordered
        // ascending by code regardless of source insertion order
        let mut totals: BTreeMap<String, [f64; HORIZON]> = BTreeMap::new();

        // Every action in the ratio table is emitted, zero vector included,
        // so the absence of forecast activity stays visible to consumers
        for code in table.action_codes() {
            totals.entry(code.to_string()).or_insert([0.0; HORIZON]);
        }

        // Ratio-projected sources only feed actions the ratio table knows;
        // their contribution outside the table is zero by construction
        for (code, amounts) in &commitment_projection.contributions {
            if let Some(entry) = totals.get_mut(code) {
                add_amounts(entry, amounts);
            }
        }
        for (code, amounts) in &programmation_projection {
            if let Some(entry) = totals.get_mut(code) {
                add_amounts(entry, amounts);
            }
        }

        // Adapter outputs create their action's entry if needed
        for forecast in housing.iter().chain(&coproperty).chain(&renewal) {
            let entry = totals
                .entry(forecast.action_code.clone())
                .or_insert([0.0; HORIZON]);
            add_amounts(entry, &forecast.amounts);
        }

        let entries = self.to_entries(totals, &actions)?;

        Ok(ForecastResult {
            base_year,
            entries,
            beyond_horizon_total: commitment_projection.beyond_horizon_total(),
            computed_at: chrono::Utc::now(),
        })
    }

    /// Resolve accumulated totals against the action reference table and
    /// round each yearly amount to the currency's minor unit.
    fn to_entries(
        &self,
        totals: BTreeMap<String, [f64; HORIZON]>,
        actions: &[db::BudgetAction],
    ) -> Result<Vec<ForecastEntry>, ForecastError> {
        let by_code: HashMap<&str, &db::BudgetAction> = actions
            .iter()
            .map(|action| (action.code.as_str(), action))
            .collect();

        let mut entries = Vec::with_capacity(totals.len());

        for (code, amounts) in totals {
            let action = by_code.get(code.as_str()).ok_or_else(|| {
                ForecastError::IncompleteConfiguration {
                    detail: format!("action code {} is not in the reference table", code),
                }
            })?;

            entries.push(ForecastEntry {
                action_id: action.id,
                action_code: action.code.clone(),
                action_name: action.name.clone(),
                y0: round_cents(amounts[0]),
                y1: round_cents(amounts[1]),
                y2: round_cents(amounts[2]),
                y3: round_cents(amounts[3]),
                y4: round_cents(amounts[4]),
            });
        }

        Ok(entries)
    }
}

fn read<T>(source: &'static str, result: anyhow::Result<T>) -> Result<T, ForecastError> {
    result.map_err(|e| ForecastError::SourceReadFailure {
        source,
        detail: e.to_string(),
    })
}

fn add_amounts(target: &mut [f64; HORIZON], amounts: &[f64; HORIZON]) {
    for (slot, amount) in target.iter_mut().zip(amounts.iter()) {
        *slot += amount;
    }
}

/// Round to the currency's minor unit (cents), half away from zero.
fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        insert_action, insert_commitments, insert_coproperty_summary, insert_housing_summary,
        setup_database, upsert_programmation, upsert_ratio, upsert_renew_budget, Commitment,
        CopropertySummary, HousingSummary, PaymentRatioRow, ProgrammationRow, RenewProjectBudget,
    };

    const BASE_YEAR: i64 = 2024;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn add_action_with_ratios(conn: &Connection, code: &str, name: &str, ratios: [f64; HORIZON]) {
        insert_action(conn, code, name).unwrap();
        for (year_offset, &ratio) in ratios.iter().enumerate() {
            upsert_ratio(
                conn,
                &PaymentRatioRow {
                    action_code: code.to_string(),
                    year_offset,
                    ratio,
                },
            )
            .unwrap();
        }
    }

    fn add_commitment(conn: &Connection, code: &str, year: i64, amount: f64, paid: f64) {
        let cmt = Commitment {
            action_code: code.to_string(),
            year,
            label: format!("ENG {} {} {}", code, year, amount),
            amount,
            paid,
            renew_project: None,
            id: String::new(),
        };
        insert_commitments(conn, &[cmt]).unwrap();
    }

    fn entry<'a>(result: &'a ForecastResult, code: &str) -> &'a ForecastEntry {
        result
            .entries
            .iter()
            .find(|e| e.action_code == code)
            .unwrap_or_else(|| panic!("no entry for action {}", code))
    }

    #[test]
    fn test_parse_base_year() {
        assert_eq!(parse_base_year(Some("2024")).unwrap(), 2024);
        assert_eq!(parse_base_year(Some(" 2024 ")).unwrap(), 2024);
        assert!(matches!(
            parse_base_year(None),
            Err(ForecastError::MissingBaseYear)
        ));
        assert!(matches!(
            parse_base_year(Some("20x4")),
            Err(ForecastError::MissingBaseYear)
        ));
    }

    #[test]
    fn test_reference_scenario_15400202() {
        let conn = test_db();
        add_action_with_ratios(
            &conn,
            "15400202",
            "Aide à la construction",
            [0.8, 1.2, 0.0, 0.0, 0.0],
        );
        add_commitment(&conn, "15400202", BASE_YEAR, 100.0, 0.0);

        let engine = ForecastEngine::new(ForecastConfig::default());
        let result = engine.forecast(&conn, BASE_YEAR).unwrap();

        let e = entry(&result, "15400202");
        assert_eq!(e.amounts(), [80.0, 120.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_zero_vector_action_still_emitted() {
        let conn = test_db();
        add_action_with_ratios(
            &conn,
            "15400202",
            "Aide à la construction",
            [0.5, 0.5, 0.0, 0.0, 0.0],
        );
        // No commitments, no programmation, no category data

        let engine = ForecastEngine::new(ForecastConfig::default());
        let result = engine.forecast(&conn, BASE_YEAR).unwrap();

        assert_eq!(result.entries.len(), 1);
        assert_eq!(entry(&result, "15400202").amounts(), [0.0; HORIZON]);
    }

    #[test]
    fn test_commitment_and_programmation_sum() {
        let conn = test_db();
        add_action_with_ratios(
            &conn,
            "15400202",
            "Aide à la construction",
            [0.5, 0.5, 0.0, 0.0, 0.0],
        );
        add_commitment(&conn, "15400202", BASE_YEAR, 100.0, 0.0);
        upsert_programmation(
            &conn,
            &ProgrammationRow {
                action_code: "15400202".to_string(),
                year: BASE_YEAR,
                amount: 200.0,
            },
        )
        .unwrap();

        let engine = ForecastEngine::new(ForecastConfig::default());
        let result = engine.forecast(&conn, BASE_YEAR).unwrap();

        // (100 + 200) * 0.5 in Y0 and Y1
        let e = entry(&result, "15400202");
        assert_eq!(e.amounts(), [150.0, 150.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_adapter_contributions_reach_their_actions() {
        let conn = test_db();
        let config = ForecastConfig::default();

        insert_action(&conn, &config.housing.action_code, "Logement social").unwrap();
        insert_action(&conn, &config.coproperty.action_code, "Copropriétés").unwrap();
        insert_action(&conn, &config.renewal.action_code, "Renouvellement urbain").unwrap();

        insert_housing_summary(
            &conn,
            &HousingSummary {
                commune: "44109".to_string(),
                year: BASE_YEAR,
                financing: "PLAI".to_string(),
                units: 10,
            },
        )
        .unwrap();
        insert_coproperty_summary(
            &conn,
            &CopropertySummary {
                commune: "44109".to_string(),
                year: BASE_YEAR,
                label: "Les Tilleuls".to_string(),
                budget: 100_000.0,
            },
        )
        .unwrap();
        upsert_renew_budget(
            &conn,
            &RenewProjectBudget {
                project: "NPNRU-01".to_string(),
                year: BASE_YEAR,
                amounts: [10_000.0, 20_000.0, 0.0, 0.0, 0.0],
            },
        )
        .unwrap();

        let engine = ForecastEngine::new(config.clone());
        let result = engine.forecast(&conn, BASE_YEAR).unwrap();

        // Housing: 10 * 11000 = 110000 over the default delivery curve
        let housing = entry(&result, &config.housing.action_code);
        assert_eq!(housing.y0, round_cents(110_000.0 * 0.15));
        assert_eq!(housing.y1, round_cents(110_000.0 * 0.35));

        // Co-property: 100000 * 0.35 over the default curve
        let copro = entry(&result, &config.coproperty.action_code);
        assert_eq!(copro.y0, round_cents(35_000.0 * 0.20));

        // Renewal: brackets passed through untouched
        let renewal = entry(&result, &config.renewal.action_code);
        assert_eq!(renewal.amounts(), [10_000.0, 20_000.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_output_ordered_by_action_code() {
        let conn = test_db();
        // Inserted out of order on purpose
        add_action_with_ratios(&conn, "15400301", "C", [0.1, 0.0, 0.0, 0.0, 0.0]);
        add_action_with_ratios(&conn, "15400101", "A", [0.1, 0.0, 0.0, 0.0, 0.0]);
        add_action_with_ratios(&conn, "15400202", "B", [0.1, 0.0, 0.0, 0.0, 0.0]);

        let engine = ForecastEngine::new(ForecastConfig::default());
        let result = engine.forecast(&conn, BASE_YEAR).unwrap();

        let codes: Vec<&str> = result
            .entries
            .iter()
            .map(|e| e.action_code.as_str())
            .collect();
        assert_eq!(codes, vec!["15400101", "15400202", "15400301"]);
    }

    #[test]
    fn test_idempotent_over_unchanged_state() {
        let conn = test_db();
        add_action_with_ratios(
            &conn,
            "15400202",
            "Aide à la construction",
            [0.4, 0.3, 0.2, 0.05, 0.05],
        );
        add_commitment(&conn, "15400202", 2022, 5_000.0, 1_200.0);
        add_commitment(&conn, "15400202", BASE_YEAR, 10_000.0, 0.0);

        let engine = ForecastEngine::new(ForecastConfig::default());

        let first = engine.forecast(&conn, BASE_YEAR).unwrap();
        let second = engine.forecast(&conn, BASE_YEAR).unwrap();

        let json1 = serde_json::to_string(&ForecastResponse {
            entries: first.entries,
        })
        .unwrap();
        let json2 = serde_json::to_string(&ForecastResponse {
            entries: second.entries,
        })
        .unwrap();

        assert_eq!(json1, json2, "Same state and year must give identical output");
    }

    #[test]
    fn test_beyond_horizon_reported_but_excluded() {
        let conn = test_db();
        add_action_with_ratios(
            &conn,
            "15400202",
            "Aide à la construction",
            [1.0, 0.0, 0.0, 0.0, 0.0],
        );
        add_commitment(&conn, "15400202", 2018, 4_000.0, 500.0); // age 6

        let engine = ForecastEngine::new(ForecastConfig::default());
        let result = engine.forecast(&conn, BASE_YEAR).unwrap();

        assert_eq!(entry(&result, "15400202").amounts(), [0.0; HORIZON]);
        assert_eq!(result.beyond_horizon_total, 3_500.0);
    }

    #[test]
    fn test_housing_config_emptied_fails_whole_forecast() {
        let conn = test_db();
        let mut config = ForecastConfig::default();
        insert_action(&conn, &config.housing.action_code, "Logement social").unwrap();
        add_action_with_ratios(
            &conn,
            "15400202",
            "Aide à la construction",
            [0.5, 0.5, 0.0, 0.0, 0.0],
        );
        add_commitment(&conn, "15400202", BASE_YEAR, 100.0, 0.0);

        insert_housing_summary(
            &conn,
            &HousingSummary {
                commune: "44109".to_string(),
                year: BASE_YEAR,
                financing: "PLAI".to_string(),
                units: 10,
            },
        )
        .unwrap();

        config.housing.unit_costs.clear();

        let engine = ForecastEngine::new(config);
        let result = engine.forecast(&conn, BASE_YEAR);

        // No partial result with housing silently zeroed
        assert!(matches!(
            result,
            Err(ForecastError::IncompleteConfiguration { .. })
        ));
    }

    #[test]
    fn test_source_read_failure_names_the_source() {
        let conn = test_db();
        conn.execute("DROP TABLE payment_ratios", []).unwrap();

        let engine = ForecastEngine::new(ForecastConfig::default());
        let result = engine.forecast(&conn, BASE_YEAR);

        match result {
            Err(ForecastError::SourceReadFailure { source, .. }) => {
                assert_eq!(source, "payment ratios");
            }
            other => panic!("Expected SourceReadFailure, got ok={}", other.is_ok()),
        }
    }

    #[test]
    fn test_rounding_only_at_output() {
        let conn = test_db();
        add_action_with_ratios(
            &conn,
            "15400202",
            "Aide à la construction",
            [0.33335, 0.0, 0.0, 0.0, 0.0],
        );
        // Each source contributes 33.335 unrounded. Rounding per source
        // before summing would give 33.34 + 33.34 = 66.68; rounding the
        // unrounded sum 66.67 at output gives 66.67.
        add_commitment(&conn, "15400202", BASE_YEAR, 100.0, 0.0);
        upsert_programmation(
            &conn,
            &ProgrammationRow {
                action_code: "15400202".to_string(),
                year: BASE_YEAR,
                amount: 100.0,
            },
        )
        .unwrap();

        let engine = ForecastEngine::new(ForecastConfig::default());
        let result = engine.forecast(&conn, BASE_YEAR).unwrap();

        assert_eq!(entry(&result, "15400202").y0, 66.67);
    }

    #[test]
    fn test_non_negative_outputs() {
        let conn = test_db();
        add_action_with_ratios(
            &conn,
            "15400202",
            "Aide à la construction",
            [0.4, 0.3, 0.2, 0.05, 0.05],
        );
        add_commitment(&conn, "15400202", 2021, 8_000.0, 2_000.0);
        add_commitment(&conn, "15400202", BASE_YEAR, 12_000.0, 0.0);

        let engine = ForecastEngine::new(ForecastConfig::default());
        let result = engine.forecast(&conn, BASE_YEAR).unwrap();

        for e in &result.entries {
            for amount in e.amounts() {
                assert!(amount >= 0.0, "negative amount for {}", e.action_code);
            }
        }
    }

    #[test]
    fn test_wire_field_names() {
        let entry = ForecastEntry {
            action_id: 1,
            action_code: "15400202".to_string(),
            action_name: "Aide à la construction".to_string(),
            y0: 80.0,
            y1: 120.0,
            y2: 0.0,
            y3: 0.0,
            y4: 0.0,
        };

        let json = serde_json::to_value(&ForecastResponse {
            entries: vec![entry],
        })
        .unwrap();

        assert!(json.get("PmtForecast").is_some());
        let first = &json["PmtForecast"][0];
        assert_eq!(first["AcCode"], "15400202");
        assert_eq!(first["Pmt0"], 80.0);
        assert_eq!(first["Pmt4"], 0.0);
    }
}
