//! Structural matching of step data against a JSON pattern.

use serde_json::Value;

/// Check whether `data` has the shape described by `pattern`.
///
/// - Object patterns match objects that contain every pattern key, each
///   value matching recursively. Extra keys in `data` are ignored.
/// - Array patterns match arrays of the same length, element by element.
/// - Any other pattern matches by equality.
pub fn matches(pattern: &Value, data: &Value) -> bool {
    match (pattern, data) {
        (Value::Object(expected), Value::Object(actual)) => expected.iter().all(|(key, value)| {
            actual
                .get(key)
                .is_some_and(|candidate| matches(value, candidate))
        }),
        (Value::Array(expected), Value::Array(actual)) => {
            expected.len() == actual.len()
                && expected
                    .iter()
                    .zip(actual)
                    .all(|(value, candidate)| matches(value, candidate))
        }
        (Value::Object(_), _) | (Value::Array(_), _) => false,
        (expected, actual) => expected == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_subset_matches() {
        let pattern = json!({"status": "ok"});
        assert!(matches(&pattern, &json!({"status": "ok", "count": 3})));
        assert!(!matches(&pattern, &json!({"status": "failed"})));
        assert!(!matches(&pattern, &json!({"count": 3})));
    }

    #[test]
    fn test_nested_objects() {
        let pattern = json!({"user": {"role": "admin"}});
        assert!(matches(
            &pattern,
            &json!({"user": {"name": "ada", "role": "admin"}})
        ));
        assert!(!matches(&pattern, &json!({"user": {"role": "guest"}})));
        assert!(!matches(&pattern, &json!({"user": "admin"})));
    }

    #[test]
    fn test_empty_object_matches_any_object() {
        assert!(matches(&json!({}), &json!({"anything": true})));
        assert!(!matches(&json!({}), &json!("text")));
    }

    #[test]
    fn test_arrays_match_element_wise() {
        let pattern = json!([{"id": 1}, 2]);
        assert!(matches(&pattern, &json!([{"id": 1, "extra": "x"}, 2])));
        assert!(!matches(&pattern, &json!([{"id": 1}])));
        assert!(!matches(&pattern, &json!([{"id": 1}, 3])));
    }

    #[test]
    fn test_scalars_match_by_equality() {
        assert!(matches(&json!(42), &json!(42)));
        assert!(!matches(&json!(42), &json!("42")));
        assert!(matches(&Value::Null, &Value::Null));
        assert!(!matches(&json!(true), &json!({"flag": true})));
    }
}
