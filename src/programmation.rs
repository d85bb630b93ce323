// Programmation Projector - projects planned-but-uncommitted amounts
//
// Programmation is the authority's intent to commit this year; once
// committed it will amortize exactly like a real commitment, so the same
// ratio curve applies, anchored at the present (age 0).

use crate::db::ProgrammationRow;
use crate::commitments::project_balance;
use crate::ratios::{RatioTable, HORIZON};
use std::collections::HashMap;

/// Project current-year programming amounts per action, treating each
/// amount as a commitment created in the base year.
pub fn project_programmation(
    rows: &[ProgrammationRow],
    table: &RatioTable,
) -> HashMap<String, [f64; HORIZON]> {
    let mut contributions: HashMap<String, [f64; HORIZON]> = HashMap::new();

    for row in rows {
        let ratios = table.get(&row.action_code);
        let projected = project_balance(row.amount, 0, &ratios);

        let entry = contributions
            .entry(row.action_code.clone())
            .or_insert([0.0; HORIZON]);
        for (slot, amount) in entry.iter_mut().zip(projected.iter()) {
            *slot += amount;
        }
    }

    contributions
}
