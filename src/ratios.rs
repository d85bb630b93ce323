// Ratio Table - per-action empirical payment ratios
// ratio[k] = historical share of a commitment's amount paid k years after
// commitment (k = 0..4). Built fresh from stored rows on every forecast.

use crate::db::PaymentRatioRow;
use std::collections::HashMap;

/// Number of years in the forecast window (current year + four ahead).
pub const HORIZON: usize = 5;

/// Per-action payment-ratio vectors, keyed by action code.
///
/// Lookups for unknown actions return the zero vector: such actions simply
/// contribute nothing to ratio-projected amounts, they are not an error.
/// Stored ratios are taken as given - values above 1 pass through (the sum
/// over offsets is NOT constrained to 1 in source data); negative values
/// are clamped to 0 to hold the non-negativity invariant.
#[derive(Debug, Clone, Default)]
pub struct RatioTable {
    ratios: HashMap<String, [f64; HORIZON]>,
}

impl RatioTable {
    pub fn new() -> Self {
        RatioTable {
            ratios: HashMap::new(),
        }
    }

    /// Build the table from stored ratio rows. Rows with an offset beyond
    /// the horizon are ignored.
    pub fn from_rows(rows: &[PaymentRatioRow]) -> Self {
        let mut ratios: HashMap<String, [f64; HORIZON]> = HashMap::new();

        for row in rows {
            if row.year_offset >= HORIZON {
                continue;
            }

            let vector = ratios
                .entry(row.action_code.clone())
                .or_insert([0.0; HORIZON]);
            vector[row.year_offset] = row.ratio.max(0.0);
        }

        RatioTable { ratios }
    }

    /// Ratio vector for an action; zero vector if the action is unknown.
    pub fn get(&self, action_code: &str) -> [f64; HORIZON] {
        self.ratios
            .get(action_code)
            .copied()
            .unwrap_or([0.0; HORIZON])
    }

    pub fn contains(&self, action_code: &str) -> bool {
        self.ratios.contains_key(action_code)
    }

    /// Action codes present in the table.
    pub fn action_codes(&self) -> impl Iterator<Item = &str> {
        self.ratios.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(action_code: &str, year_offset: usize, ratio: f64) -> PaymentRatioRow {
        PaymentRatioRow {
            action_code: action_code.to_string(),
            year_offset,
            ratio,
        }
    }

    #[test]
    fn test_build_and_lookup() {
        let table = RatioTable::from_rows(&[
            row("15400202", 0, 0.8),
            row("15400202", 1, 1.2),
            row("15400301", 0, 0.5),
            row("15400301", 2, 0.3),
        ]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("15400202"), [0.8, 1.2, 0.0, 0.0, 0.0]);
        assert_eq!(table.get("15400301"), [0.5, 0.0, 0.3, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_action_is_zero_vector() {
        let table = RatioTable::from_rows(&[row("15400202", 0, 0.8)]);

        assert!(!table.contains("99999999"));
        assert_eq!(table.get("99999999"), [0.0; HORIZON]);
    }

    #[test]
    fn test_negative_ratio_clamped_to_zero() {
        let table = RatioTable::from_rows(&[row("15400202", 0, -0.4), row("15400202", 1, 0.6)]);

        assert_eq!(table.get("15400202"), [0.0, 0.6, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_ratio_above_one_passes_through() {
        // Source data does not constrain ratios to sum to 1
        let table = RatioTable::from_rows(&[row("15400202", 1, 1.2)]);

        assert_eq!(table.get("15400202")[1], 1.2);
    }

    #[test]
    fn test_offset_beyond_horizon_ignored() {
        let table = RatioTable::from_rows(&[row("15400202", 0, 0.8), row("15400202", 7, 0.5)]);

        assert_eq!(table.get("15400202"), [0.8, 0.0, 0.0, 0.0, 0.0]);
    }
}
