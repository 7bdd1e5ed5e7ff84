/// Canonical Serialization
///
/// Deterministic textual encoding used when comparing a submission's return
/// value against `TestCase::output`:
/// - compact JSON, no insignificant whitespace
/// - object keys in sorted order
/// - integral floats within ±2^53 written as integers (`2.0` → `2`)
/// - other floats in shortest round-trip form
/// - a missing value is `null`
use serde_json::Value;
use std::fmt::Write as _;

/// Largest magnitude at which every integer is exactly representable in f64
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Serialize an optional return value. `None` (undefined / void) is `null`.
pub fn canonical_serialize(value: Option<&Value>) -> String {
    match value {
        Some(value) => canonical_value(value),
        None => "null".to_string(),
    }
}

pub fn canonical_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key]);
            }
            out.push('}');
        }
    }
}

fn write_number(out: &mut String, n: &serde_json::Number) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{}", i);
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{}", u);
    } else if let Some(f) = n.as_f64() {
        if !f.is_finite() {
            out.push_str("null");
        } else if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
            let _ = write!(out, "{}", f as i64);
        } else {
            // serde_json prints the shortest representation that round-trips
            let _ = write!(out, "{}", n);
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => out.push_str("\"\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_is_compact() {
        assert_eq!(canonical_value(&json!([0, 1])), "[0,1]");
        assert_eq!(canonical_value(&json!([0, 1])), canonical_value(&json!([0, 1])));
    }

    #[test]
    fn test_missing_value_is_null() {
        assert_eq!(canonical_serialize(None), "null");
        assert_eq!(canonical_serialize(Some(&Value::Null)), "null");
    }

    #[test]
    fn test_integral_floats_collapse() {
        assert_eq!(canonical_value(&json!(2.0)), "2");
        assert_eq!(canonical_value(&json!(-3.0)), "-3");
        assert_eq!(canonical_value(&json!([1.0, 2.5])), "[1,2.5]");
    }

    #[test]
    fn test_fractional_floats_keep_shortest_form() {
        assert_eq!(canonical_value(&json!(0.1)), "0.1");
        assert_eq!(canonical_value(&json!(2.5)), "2.5");
    }

    #[test]
    fn test_object_keys_sorted() {
        let value: Value = serde_json::from_str(r#"{"b":1,"a":{"d":true,"c":null}}"#).unwrap();
        assert_eq!(canonical_value(&value), r#"{"a":{"c":null,"d":true},"b":1}"#);
    }

    #[test]
    fn test_strings_escaped() {
        assert_eq!(canonical_value(&json!("a\"b\n")), r#""a\"b\n""#);
        assert_eq!(canonical_value(&json!(true)), "true");
    }

    #[test]
    fn test_large_integers_untouched() {
        assert_eq!(canonical_value(&json!(u64::MAX)), u64::MAX.to_string());
        assert_eq!(canonical_value(&json!(i64::MIN)), i64::MIN.to_string());
    }
}
