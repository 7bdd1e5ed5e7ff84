// Static type inference for argument literals in statically typed harnesses
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticType {
    Int,
    Long,
    Double,
    Bool,
    Str,
    Array(Box<StaticType>),
    /// Element type of an empty array; unifies with anything and renders as `Int`
    Unknown,
}

impl StaticType {
    /// Resolve leftover `Unknown` element types
    pub fn settle(self) -> StaticType {
        match self {
            StaticType::Unknown => StaticType::Int,
            StaticType::Array(inner) => StaticType::Array(Box::new(inner.settle())),
            other => other,
        }
    }
}

/// Infer the narrowest static type that can hold `value`. Null, objects,
/// integers beyond i64 and mixed-type arrays have no literal form.
pub fn infer(value: &Value) -> Option<StaticType> {
    match value {
        Value::Bool(_) => Some(StaticType::Bool),
        Value::String(_) => Some(StaticType::Str),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if i32::try_from(i).is_ok() {
                    Some(StaticType::Int)
                } else {
                    Some(StaticType::Long)
                }
            } else if n.is_u64() {
                None
            } else {
                n.as_f64().filter(|f| f.is_finite()).map(|_| StaticType::Double)
            }
        }
        Value::Array(items) => {
            let mut element = StaticType::Unknown;
            for item in items {
                element = unify(element, infer(item)?)?;
            }
            Some(StaticType::Array(Box::new(element)))
        }
        Value::Null | Value::Object(_) => None,
    }
}

fn unify(a: StaticType, b: StaticType) -> Option<StaticType> {
    use StaticType::*;
    match (a, b) {
        (Unknown, t) | (t, Unknown) => Some(t),
        (Array(x), Array(y)) => Some(Array(Box::new(unify(*x, *y)?))),
        (x, y) if x == y => Some(x),
        (Int, Long) | (Long, Int) => Some(Long),
        (Int | Long, Double) | (Double, Int | Long) => Some(Double),
        _ => None,
    }
}

/// Floating literal that always carries a decimal point or exponent
pub fn float_literal(f: f64) -> String {
    format!("{:?}", f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(infer(&json!(9)), Some(StaticType::Int));
        assert_eq!(infer(&json!(5_000_000_000i64)), Some(StaticType::Long));
        assert_eq!(infer(&json!(1.5)), Some(StaticType::Double));
        assert_eq!(infer(&json!("s")), Some(StaticType::Str));
        assert_eq!(infer(&json!(true)), Some(StaticType::Bool));
        assert_eq!(infer(&Value::Null), None);
        assert_eq!(infer(&json!(u64::MAX)), None);
    }

    #[test]
    fn test_arrays_unify_numeric_widths() {
        assert_eq!(
            infer(&json!([1, 5_000_000_000i64])),
            Some(StaticType::Array(Box::new(StaticType::Long)))
        );
        assert_eq!(
            infer(&json!([1, 2.5])),
            Some(StaticType::Array(Box::new(StaticType::Double)))
        );
    }

    #[test]
    fn test_empty_arrays_take_sibling_type() {
        let ty = infer(&json!([[], ["a"]])).unwrap();
        assert_eq!(
            ty,
            StaticType::Array(Box::new(StaticType::Array(Box::new(StaticType::Str))))
        );
        assert_eq!(
            infer(&json!([])).unwrap().settle(),
            StaticType::Array(Box::new(StaticType::Int))
        );
    }

    #[test]
    fn test_unrepresentable() {
        assert_eq!(infer(&json!([1, "a"])), None);
        assert_eq!(infer(&json!([-10, 9, 20, null])), None);
        assert_eq!(infer(&json!({"a": 1})), None);
    }

    #[test]
    fn test_float_literal_has_point() {
        assert_eq!(float_literal(2.0), "2.0");
        assert_eq!(float_literal(0.25), "0.25");
    }
}
