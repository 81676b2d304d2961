//! The eight relational-algebra operators (σ, π, ∪, ∩, −, ×, ⋈, ρ).
//!
//! All operators are stateless: they take one or two tables plus a string
//! parameter and return a new table, never mutating their inputs. The set
//! operators compare tuples canonically, as attribute-to-value mappings, so
//! attribute insertion order never causes false negatives.

use tracing::{debug, warn};

use crate::engine::{EvalContext, Evaluator};
use crate::errors::{Error, Result};
use crate::parser;
use crate::value::{tuples_equal, Table, Tuple};

/// Decode a JSON array of flat, scalar-valued records into a table.
pub fn parse_table(text: &str) -> Result<Table> {
    serde_json::from_str(text)
        .map_err(|e| Error::Format(format!("expected a JSON array of flat records: {}", e)))
}

/// σ — keep the rows satisfying `predicate`, a boolean expression whose free
/// identifiers are attribute names of the row under test.
///
/// Exclusion is a soft, per-row policy: a row whose predicate cannot be
/// evaluated is dropped, and an unparseable predicate drops every row.
pub fn selection(table: &Table, predicate: &str) -> Table {
    let formula = match parser::parse_predicate(predicate) {
        Ok(formula) => formula,
        Err(error) => {
            warn!(predicate, %error, "unparseable selection predicate, no rows match");
            return Table::new();
        }
    };

    let evaluator = Evaluator { store: None };
    table
        .iter()
        .filter(|row| {
            let verdict = evaluator.eval_formula(&formula, &EvalContext::for_row(row));
            if !verdict.matched {
                if let Some(diag) = &verdict.diagnostic {
                    debug!(%diag, "row excluded from selection");
                }
            }
            verdict.matched
        })
        .cloned()
        .collect()
}

/// π — restrict every row to the comma-separated attribute list. Attributes
/// missing on a given row are silently omitted for that row.
pub fn projection(table: &Table, attributes: &str) -> Table {
    let attrs: Vec<&str> = attributes.split(',').map(str::trim).collect();
    table
        .iter()
        .map(|row| {
            let mut out = Tuple::new();
            for attr in &attrs {
                if let Some(value) = row.get(*attr) {
                    out.insert((*attr).to_string(), value.clone());
                }
            }
            out
        })
        .collect()
}

/// ∪ — `a` then `b` with duplicates removed; first occurrence wins, so every
/// tuple of `a` is retained and only genuinely new tuples of `b` follow.
pub fn union(a: &Table, b: &Table) -> Table {
    let mut out = Table::new();
    for row in a.iter().chain(b) {
        if !out.iter().any(|seen| tuples_equal(seen, row)) {
            out.push(row.clone());
        }
    }
    out
}

/// ∩ — tuples of `a` with a counterpart in `b`, in `a`'s order.
pub fn intersection(a: &Table, b: &Table) -> Table {
    a.iter()
        .filter(|row| b.iter().any(|other| tuples_equal(row, other)))
        .cloned()
        .collect()
}

/// − — tuples of `a` with no counterpart in `b`, in `a`'s order.
pub fn difference(a: &Table, b: &Table) -> Table {
    a.iter()
        .filter(|row| !b.iter().any(|other| tuples_equal(row, other)))
        .cloned()
        .collect()
}

/// × — every (rowA, rowB) pair in A-major order, with `a`'s attributes
/// prefixed `A_` and `b`'s prefixed `B_`. Always `|a| * |b|` rows.
pub fn cartesian_product(a: &Table, b: &Table) -> Table {
    let mut out = Table::with_capacity(a.len() * b.len());
    for row_a in a {
        for row_b in b {
            let mut row = Tuple::new();
            for (attr, value) in row_a {
                row.insert(format!("A_{}", attr), value.clone());
            }
            for (attr, value) in row_b {
                row.insert(format!("B_{}", attr), value.clone());
            }
            out.push(row);
        }
    }
    out
}

/// ⋈ — merge pairs whose common attributes compare equal.
///
/// Common attributes are determined from the first tuple of each table only,
/// so heterogeneous tables may join incorrectly. With no common attributes
/// this degrades to the cartesian product; with an empty input the result is
/// empty.
pub fn natural_join(a: &Table, b: &Table) -> Table {
    let (first_a, first_b) = match (a.first(), b.first()) {
        (Some(first_a), Some(first_b)) => (first_a, first_b),
        _ => return Table::new(),
    };

    let common: Vec<&String> = first_a
        .keys()
        .filter(|attr| first_b.contains_key(*attr))
        .collect();
    if common.is_empty() {
        return cartesian_product(a, b);
    }

    let mut out = Table::new();
    for row_a in a {
        for row_b in b {
            if !common.iter().all(|attr| row_a.get(*attr) == row_b.get(*attr)) {
                continue;
            }
            let mut row = row_a.clone();
            for (attr, value) in row_b {
                if !common.iter().any(|c| *c == attr) {
                    row.insert(attr.clone(), value.clone());
                }
            }
            out.push(row);
        }
    }
    out
}

/// ρ — per row, replace the key `old_name` with `new_name` at the same
/// position; rows lacking `old_name` pass through unchanged.
pub fn rename(table: &Table, old_name: &str, new_name: &str) -> Table {
    table
        .iter()
        .map(|row| {
            row.iter()
                .map(|(attr, value)| {
                    let attr = if attr == old_name {
                        new_name.to_string()
                    } else {
                        attr.clone()
                    };
                    (attr, value.clone())
                })
                .collect()
        })
        .collect()
}
