// Category Forecast Adapters
// Closed set of three category adapters (housing, co-property, renewal
// project), each turning category-specific quantities into per-action,
// per-year equivalent amounts the combiner can accumulate.

pub mod housing;
pub mod coproperty;
pub mod renewal;

pub use housing::HousingAdapter;
pub use coproperty::CopropertyAdapter;
pub use renewal::RenewalAdapter;

use crate::ratios::HORIZON;

/// Normalized adapter output: a multi-year amount booked under one action.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryForecast {
    pub action_code: String,
    pub amounts: [f64; HORIZON],
}
