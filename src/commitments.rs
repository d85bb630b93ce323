// Commitment Aggregator - projects outstanding engagement balances
//
// A commitment made `age` years before the base year is expected to pay
// ratio[age] of its outstanding balance in the current year, ratio[age+1]
// the year after, and so on until the ratio index passes the horizon.
// Older commitments therefore contribute to fewer future years (triangular
// pattern). Balances older than the horizon cannot be projected by the
// ratio table at all and are tracked separately, outside Y0..Y4.

use crate::db::OutstandingBalance;
use crate::ratios::{RatioTable, HORIZON};
use std::collections::HashMap;

/// Per-action projected payments plus the beyond-horizon remainder.
#[derive(Debug, Clone, Default)]
pub struct CommitmentProjection {
    /// Projected payments per action code, per year offset (Y0..Y4).
    pub contributions: HashMap<String, [f64; HORIZON]>,

    /// Outstanding balances of commitments older than the horizon,
    /// per action code. Reported but never part of Y0..Y4.
    pub beyond_horizon: HashMap<String, f64>,
}

impl CommitmentProjection {
    pub fn beyond_horizon_total(&self) -> f64 {
        self.beyond_horizon.values().sum()
    }
}

/// Project a single balance with the given age through the ratio vector.
/// Offset k receives `balance * ratio[age + k]`; the projection stops when
/// the ratio index passes the horizon (no extrapolation).
pub fn project_balance(balance: f64, age: usize, ratios: &[f64; HORIZON]) -> [f64; HORIZON] {
    let mut projected = [0.0; HORIZON];

    for (k, slot) in projected.iter_mut().enumerate() {
        let index = age + k;
        if index >= HORIZON {
            break;
        }
        *slot = balance * ratios[index];
    }

    projected
}

/// Aggregate outstanding balances into per-action projected payments for
/// the given base year.
pub fn aggregate_commitments(
    balances: &[OutstandingBalance],
    table: &RatioTable,
    base_year: i64,
) -> CommitmentProjection {
    let mut projection = CommitmentProjection::default();

    for row in balances {
        // The balance query is bounded by year <= base_year; a future year
        // here means inconsistent inputs and contributes nothing.
        if row.commitment_year > base_year {
            continue;
        }

        let age = (base_year - row.commitment_year) as usize;

        if age >= HORIZON {
            *projection
                .beyond_horizon
                .entry(row.action_code.clone())
                .or_insert(0.0) += row.balance;
            continue;
        }

        let ratios = table.get(&row.action_code);
        let projected = project_balance(row.balance, age, &ratios);

        let entry = projection
            .contributions
            .entry(row.action_code.clone())
            .or_insert([0.0; HORIZON]);
        for (slot, amount) in entry.iter_mut().zip(projected.iter()) {
            *slot += amount;
        }
    }

    projection
}
