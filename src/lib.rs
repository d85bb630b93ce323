// Public-Investment Forecast Backend - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod db;
pub mod config;
pub mod ratios;        // Ratio Table - empirical payment ratios per action
pub mod commitments;   // Commitment Aggregator - outstanding balance projection
pub mod programmation; // Programmation Projector - planned amounts as age-0 commitments
pub mod adapters;      // Category Forecast Adapters - housing / co-property / renewal
pub mod forecast;      // Forecast Combiner - merges all sources into Y0..Y4

// Re-export commonly used types
pub use db::{
    BudgetAction, Commitment, CopropertySummary, HousingSummary, OutstandingBalance,
    PaymentRatioRow, ProgrammationRow, RenewProjectBudget,
    setup_database, insert_action, get_actions,
    load_commitments_csv, insert_commitments, record_payment, verify_count,
    get_outstanding_balances, get_committed_by_project,
    upsert_programmation, get_programmation,
    upsert_ratio, get_ratio_rows,
    insert_housing_summary, get_housing_summaries,
    insert_coproperty_summary, get_coproperty_summaries,
    upsert_renew_budget, get_renew_budgets,
};
pub use config::{CopropertyConfig, ForecastConfig, HousingConfig, RenewalConfig};
pub use ratios::{RatioTable, HORIZON};
pub use commitments::{aggregate_commitments, project_balance, CommitmentProjection};
pub use programmation::project_programmation;
pub use adapters::{CategoryForecast, CopropertyAdapter, HousingAdapter, RenewalAdapter};
pub use forecast::{
    parse_base_year, ForecastEngine, ForecastEntry, ForecastError, ForecastResponse,
    ForecastResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
