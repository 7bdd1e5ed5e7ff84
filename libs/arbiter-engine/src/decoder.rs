/// Argument Decoder
///
/// Turns a raw `TestCase::input` such as `[2,7,11,15],9` into the ordered
/// argument list handed to the submission's entry point.
///
/// **Splitting Rules:**
/// - A comma is a split point only at nesting depth zero
/// - `[`/`{` open a level, `]`/`}` close one; depth may never go negative
///   and must be back at zero at the end of the input
/// - Commas and brackets inside JSON string literals are ignored
/// - Each piece is parsed as a JSON literal
///
/// `decode` never fails: malformed input degrades to a single opaque string
/// argument so one bad test case cannot abort a batch. `try_decode` exposes
/// the strict result.
use crate::canonical::canonical_value;
use serde_json::Value;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct DecodedArguments {
    values: Vec<Value>,
}

impl DecodedArguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Canonical re-serialization: each argument canonically encoded,
    /// joined with top-level commas.
    pub fn to_canonical_input(&self) -> String {
        self.values
            .iter()
            .map(canonical_value)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Argument lists are equal when their canonical encodings are, so `2.0`
/// and `2` decode to the same arguments.
impl PartialEq for DecodedArguments {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| canonical_value(a) == canonical_value(b))
    }
}

impl fmt::Display for DecodedArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_input())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unbalanced closing bracket at byte {position}")]
    UnexpectedClose { position: usize },
    #[error("unclosed bracket: nesting depth {depth} at end of input")]
    Unclosed { depth: usize },
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("argument {index} is not a valid literal: {source}")]
    InvalidLiteral {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Best-effort decode; see module docs.
pub fn decode(input: &str) -> DecodedArguments {
    match try_decode(input) {
        Ok(args) => args,
        Err(e) => {
            warn!(error = %e, input_len = input.len(), "Falling back to a single string argument");
            DecodedArguments::new(vec![Value::String(input.to_string())])
        }
    }
}

/// Strict decode: split on top-level commas, parse every piece.
pub fn try_decode(input: &str) -> Result<DecodedArguments, DecodeError> {
    if input.trim().is_empty() {
        return Ok(DecodedArguments::default());
    }

    split_top_level(input)?
        .into_iter()
        .enumerate()
        .map(|(index, piece)| {
            serde_json::from_str::<Value>(piece.trim())
                .map_err(|source| DecodeError::InvalidLiteral { index, source })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(DecodedArguments::new)
}

fn split_top_level(input: &str) -> Result<Vec<&str>, DecodeError> {
    let mut pieces = Vec::new();
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;

    for (pos, ch) in input.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(DecodeError::UnexpectedClose { position: pos })?;
            }
            ',' if depth == 0 => {
                pieces.push(&input[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }

    if in_string {
        return Err(DecodeError::UnterminatedString);
    }
    if depth != 0 {
        return Err(DecodeError::Unclosed { depth });
    }

    pieces.push(&input[start..]);
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_splits_only_at_top_level() {
        let args = try_decode("[2,7,11,15],9").unwrap();
        assert_eq!(args.values(), &[json!([2, 7, 11, 15]), json!(9)]);
    }

    #[test]
    fn test_nested_structures() {
        let args = try_decode(r#"[[1,2],[3]],{"a":[1,{"b":2}]},"x""#).unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args.values()[1], json!({"a": [1, {"b": 2}]}));
    }

    #[test]
    fn test_commas_inside_strings_do_not_split() {
        let args = try_decode(r#""A man, a plan, a canal: Panama""#).unwrap();
        assert_eq!(args.values(), &[json!("A man, a plan, a canal: Panama")]);

        let args = try_decode(r#""a\",[b",3"#).unwrap();
        assert_eq!(args.values(), &[json!("a\",[b"), json!(3)]);
    }

    #[test]
    fn test_scalars_and_null() {
        let args = try_decode(r#"true, null, -1.5, "s""#).unwrap();
        assert_eq!(
            args.values(),
            &[json!(true), Value::Null, json!(-1.5), json!("s")]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(decode("").is_empty());
        assert!(decode("   ").is_empty());
    }

    #[test]
    fn test_malformed_nesting_is_an_error() {
        assert!(matches!(
            try_decode("[1,2]],3"),
            Err(DecodeError::UnexpectedClose { position: 5 })
        ));
        assert!(matches!(
            try_decode("[[1,2],3"),
            Err(DecodeError::Unclosed { depth: 1 })
        ));
        assert!(matches!(
            try_decode(r#""open"#),
            Err(DecodeError::UnterminatedString)
        ));
    }

    #[test]
    fn test_bad_literal_reports_index() {
        let err = try_decode("1,nope").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidLiteral { index: 1, .. }));
    }

    #[test]
    fn test_degrades_to_single_string() {
        let args = decode("nums = [1,2], target = 3");
        assert_eq!(args.values(), &[json!("nums = [1,2], target = 3")]);

        let args = decode("1,");
        assert_eq!(args.values(), &[json!("1,")]);
    }

    #[test]
    fn test_decode_is_idempotent_over_canonical_form() {
        let inputs = [
            "[2,7,11,15],9",
            "[3, 3] , 6",
            r#""A man, a plan""#,
            r#"{"b":[1.0,2],"a":null},false"#,
            "[-10,9,20,null,null,15,7]",
            "not json at all",
            "",
        ];
        for input in inputs {
            let first = decode(input);
            let second = decode(&first.to_canonical_input());
            assert_eq!(first, second, "input: {input}");
        }
    }
}
