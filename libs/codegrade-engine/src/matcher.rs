/// Value Matcher - Flexible Equality for Returned Values
///
/// **Rules (applied at every nesting level):**
/// - Integers compare exactly
/// - Any float involved: equal within 1e-6 absolute OR 1e-6 relative distance
/// - `ordered = false`: arrays compare as multisets (duplicate counts matter)
/// - Objects: same key set, values matched recursively
/// - Type mismatch is a plain non-match, never an error

use serde_json::{Number, Value};

pub const FLOAT_TOLERANCE: f64 = 1e-6;

/// Compare `actual` against `expected`.
pub fn matches(expected: &Value, actual: &Value, ordered: bool) -> bool {
    match (expected, actual) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(e), Value::Bool(a)) => e == a,
        (Value::String(e), Value::String(a)) => e == a,
        (Value::Number(e), Value::Number(a)) => numbers_match(e, a),
        (Value::Array(e), Value::Array(a)) => {
            if e.len() != a.len() {
                return false;
            }
            if ordered {
                e.iter().zip(a).all(|(x, y)| matches(x, y, ordered))
            } else {
                multiset_match(e, a)
            }
        }
        (Value::Object(e), Value::Object(a)) => {
            e.len() == a.len()
                && e.iter().all(|(key, ev)| {
                    a.get(key).is_some_and(|av| matches(ev, av, ordered))
                })
        }
        _ => false,
    }
}

fn numbers_match(expected: &Number, actual: &Number) -> bool {
    if let (Some(e), Some(a)) = (expected.as_i64(), actual.as_i64()) {
        return e == a;
    }
    if let (Some(e), Some(a)) = (expected.as_u64(), actual.as_u64()) {
        return e == a;
    }
    match (expected.as_f64(), actual.as_f64()) {
        (Some(e), Some(a)) => floats_close(e, a),
        _ => false,
    }
}

fn floats_close(expected: f64, actual: f64) -> bool {
    if expected == actual {
        return true;
    }
    let diff = (expected - actual).abs();
    diff <= FLOAT_TOLERANCE || diff <= FLOAT_TOLERANCE * expected.abs().max(actual.abs())
}

/// Order-independent comparison: every expected element consumes one
/// distinct matching actual element.
fn multiset_match(expected: &[Value], actual: &[Value]) -> bool {
    let mut used = vec![false; actual.len()];
    expected.iter().all(|e| {
        let slot = actual
            .iter()
            .enumerate()
            .position(|(i, a)| !used[i] && matches(e, a, false));
        match slot {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_float_within_tolerance() {
        assert!(matches(&json!(0.1), &json!(0.1000001), true));
        assert!(matches(&json!(2.5), &json!(2.5), true));
        assert!(matches(&json!(3), &json!(3.0000000001), true));
    }

    #[test]
    fn test_float_outside_tolerance() {
        assert!(!matches(&json!(0.1), &json!(0.10001), true));
        assert!(!matches(&json!(1.0), &json!(1.00001), true));
    }

    #[test]
    fn test_relative_tolerance_for_large_floats() {
        assert!(matches(&json!(1.0e12), &json!(1.0e12 + 1.0), true));
        assert!(!matches(&json!(1.0e12), &json!(1.0e12 + 1.0e7), true));
    }

    #[test]
    fn test_integers_are_exact() {
        assert!(matches(&json!(10_000_000), &json!(10_000_000), true));
        assert!(!matches(&json!(10_000_000), &json!(10_000_001), true));
    }

    #[test]
    fn test_unordered_multiset() {
        assert!(matches(&json!([1, 2, 2]), &json!([2, 1, 2]), false));
        assert!(!matches(&json!([1, 2, 2]), &json!([1, 1, 2]), false));
        assert!(!matches(&json!([1, 2]), &json!([1, 2, 2]), false));
    }

    #[test]
    fn test_ordered_sequences() {
        assert!(matches(&json!([1, 2, 2]), &json!([1, 2, 2]), true));
        assert!(!matches(&json!([1, 2, 2]), &json!([2, 2, 1]), true));
    }

    #[test]
    fn test_nested_unordered_with_floats() {
        let expected = json!([[1, 2], [0.5, 3]]);
        let actual = json!([[3, 0.5000000001], [2, 1]]);
        assert!(matches(&expected, &actual, false));
        assert!(!matches(&expected, &actual, true));
    }

    #[test]
    fn test_objects_match_recursively() {
        let expected = json!({ "total": 1.5, "items": [1, 2] });
        assert!(matches(&expected, &json!({ "items": [1, 2], "total": 1.5000000001 }), true));
        assert!(!matches(&expected, &json!({ "items": [1, 2] }), true));
        assert!(!matches(&expected, &json!({ "items": [1, 2], "total": 1.5, "extra": 0 }), true));
    }

    #[test]
    fn test_type_mismatch_is_not_a_match() {
        assert!(!matches(&json!([1]), &json!(1), true));
        assert!(!matches(&json!(1), &json!("1"), true));
        assert!(!matches(&json!(true), &json!(1), true));
        assert!(!matches(&json!(null), &json!([]), false));
        assert!(matches(&json!(null), &json!(null), true));
    }
}
