//! Metadata values and the MongoDB-subset filter predicate.
//!
//! Metadata is an open map with scalar leaves and nested structure; we model
//! it directly as `serde_json::Value` rather than a bespoke tagged enum — the
//! shapes are identical (`Null | Bool | Number | String | Array | Object`)
//! and every metadata blob round-trips through `index.json` / sidecar files
//! as JSON anyway, so a second representation would just be a lossy copy of
//! the first.

use serde_json::{Map, Value};

pub type Metadata = Map<String, Value>;

/// Evaluates a filter predicate against an item's metadata.
///
/// `filter == None` (or `Value::Null`) always matches. `$and`/`$or` combine
/// sub-filters; any other top-level key is a field test, either a scalar
/// equality or an operator bundle (`$eq/$ne/$gt/$gte/$lt/$lte/$in/$nin`).
pub fn select(meta: &Metadata, filter: Option<&Value>) -> bool {
    let filter = match filter {
        None => return true,
        Some(Value::Null) => return true,
        Some(f) => f,
    };

    let Some(obj) = filter.as_object() else {
        // A non-object filter has no defined meaning; treat as non-matching
        // rather than panic.
        return false;
    };

    for (key, value) in obj {
        match key.as_str() {
            "$and" => {
                let Some(subs) = value.as_array() else {
                    return false;
                };
                if !subs.iter().all(|f| select(meta, Some(f))) {
                    return false;
                }
            }
            "$or" => {
                let Some(subs) = value.as_array() else {
                    return false;
                };
                if !subs.iter().any(|f| select(meta, Some(f))) {
                    return false;
                }
            }
            _ => {
                if value.is_null() {
                    return false;
                }
                let field = meta.get(key);
                let Some(field) = field else {
                    return false;
                };
                if value.is_object() {
                    if !metadata_filter(field, value.as_object().unwrap()) {
                        return false;
                    }
                } else if field != value {
                    return false;
                }
            }
        }
    }
    true
}

/// Evaluates a single field's operator bundle (the right-hand side of a
/// non-`$and`/`$or` key whose value is itself an object).
fn metadata_filter(value: &Value, ops: &Map<String, Value>) -> bool {
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => value == operand,
            "$ne" => value != operand,
            "$gt" => numeric_cmp(value, operand, |a, b| a > b),
            "$gte" => numeric_cmp(value, operand, |a, b| a >= b),
            "$lt" => numeric_cmp(value, operand, |a, b| a < b),
            "$lte" => numeric_cmp(value, operand, |a, b| a <= b),
            "$in" => membership(value, operand, true),
            "$nin" => membership(value, operand, false),
            // Unknown operator keys fall back to direct equality against the
            // operand, matching the interpreter's catch-all branch.
            _ => value == operand,
        };
        if !ok {
            return false;
        }
    }
    true
}

/// `$gt/$gte/$lt/$lte` require `value` to be numeric; any numeric JSON value
/// qualifies (not just floats — the source's `isinstance(value, float)` gate
/// is a bug the intended semantics correct, see SPEC_FULL.md §9(a)).
fn numeric_cmp(value: &Value, operand: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (value.as_f64(), operand.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// `$in/$nin` test array membership for any scalar `value` (not just
/// booleans — see the same corrected-semantics note above).
fn membership(value: &Value, operand: &Value, want_present: bool) -> bool {
    let Some(arr) = operand.as_array() else {
        return false;
    };
    let present = arr.iter().any(|v| v == value);
    present == want_present
}
