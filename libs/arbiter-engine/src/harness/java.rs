use super::literal::{float_literal, infer, StaticType};
use super::{declares_typed_function, escaped, matches_pattern, HarnessError, HarnessFile, LanguageRunner};
use crate::decoder::DecodedArguments;
use crate::entry_point::EntryPoint;
use arbiter_common::types::LanguageId;
use serde_json::Value;
use std::fmt::Write as _;

pub struct JavaRunner;

const JSON_WRITER: &str = r#"final class ArbiterJson {
    private ArbiterJson() {}

    static String write(Object value) {
        StringBuilder out = new StringBuilder();
        append(out, value);
        return out.toString();
    }

    static String quote(String text) {
        StringBuilder out = new StringBuilder();
        appendString(out, text);
        return out.toString();
    }

    private static void append(StringBuilder out, Object value) {
        if (value == null) {
            out.append("null");
        } else if (value instanceof String || value instanceof Character) {
            appendString(out, value.toString());
        } else if (value instanceof Boolean) {
            out.append(value.toString());
        } else if (value instanceof Double || value instanceof Float) {
            double d = ((Number) value).doubleValue();
            if (Double.isNaN(d) || Double.isInfinite(d)) {
                out.append("null");
            } else if (d == Math.rint(d) && Math.abs(d) < 9.007199254740992E15) {
                out.append((long) d);
            } else {
                out.append(Double.toString(d));
            }
        } else if (value instanceof Number) {
            out.append(value.toString());
        } else if (value.getClass().isArray()) {
            int length = java.lang.reflect.Array.getLength(value);
            out.append('[');
            for (int i = 0; i < length; i++) {
                if (i > 0) out.append(',');
                append(out, java.lang.reflect.Array.get(value, i));
            }
            out.append(']');
        } else if (value instanceof Iterable) {
            out.append('[');
            boolean first = true;
            for (Object item : (Iterable<?>) value) {
                if (!first) out.append(',');
                first = false;
                append(out, item);
            }
            out.append(']');
        } else if (value instanceof java.util.Map) {
            java.util.TreeMap<String, Object> sorted = new java.util.TreeMap<>();
            for (java.util.Map.Entry<?, ?> e : ((java.util.Map<?, ?>) value).entrySet()) {
                sorted.put(String.valueOf(e.getKey()), e.getValue());
            }
            out.append('{');
            boolean first = true;
            for (java.util.Map.Entry<String, Object> e : sorted.entrySet()) {
                if (!first) out.append(',');
                first = false;
                appendString(out, e.getKey());
                out.append(':');
                append(out, e.getValue());
            }
            out.append('}');
        } else {
            appendString(out, value.toString());
        }
    }

    private static void appendString(StringBuilder out, String text) {
        out.append('"');
        for (int i = 0; i < text.length(); i++) {
            char c = text.charAt(i);
            switch (c) {
                case '"': out.append("\\\""); break;
                case '\\': out.append("\\\\"); break;
                case '\n': out.append("\\n"); break;
                case '\r': out.append("\\r"); break;
                case '\t': out.append("\\t"); break;
                default:
                    if (c < 0x20) {
                        out.append(String.format("\\u%04x", (int) c));
                    } else {
                        out.append(c);
                    }
            }
        }
        out.append('"');
    }
}
"#;

fn type_name(ty: &StaticType) -> String {
    match ty {
        StaticType::Int | StaticType::Unknown => "int".to_string(),
        StaticType::Long => "long".to_string(),
        StaticType::Double => "double".to_string(),
        StaticType::Bool => "boolean".to_string(),
        StaticType::Str => "String".to_string(),
        StaticType::Array(inner) => format!("{}[]", type_name(inner)),
    }
}

fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render `value` as a Java expression of type `ty`. Nested arrays inside an
/// initializer use bare braces.
fn literal(value: &Value, ty: &StaticType, top_level: bool) -> String {
    match (value, ty) {
        (Value::Array(items), StaticType::Array(inner)) => {
            let body = items
                .iter()
                .map(|item| literal(item, inner, false))
                .collect::<Vec<_>>()
                .join(", ");
            if top_level {
                format!("new {}{{{}}}", type_name(ty), body)
            } else {
                format!("{{{}}}", body)
            }
        }
        (Value::String(s), _) => string_literal(s),
        (Value::Bool(b), _) => b.to_string(),
        (Value::Number(n), StaticType::Long) => format!("{}L", n),
        (Value::Number(n), StaticType::Double) => n
            .as_f64()
            .map(float_literal)
            .unwrap_or_else(|| n.to_string()),
        (other, _) => other.to_string(),
    }
}

fn returns_void(source: &str, name: &str) -> bool {
    matches_pattern(&format!(r"\bvoid\s+{}\s*\(", escaped(name)), source)
}

impl LanguageRunner for JavaRunner {
    fn language(&self) -> LanguageId {
        LanguageId::Java
    }

    fn is_compiled(&self) -> bool {
        true
    }

    fn declares(&self, source: &str, name: &str) -> bool {
        declares_typed_function(source, name)
    }

    fn render(
        &self,
        source: &str,
        entry_point: &EntryPoint,
        arguments: &DecodedArguments,
        marker: &str,
    ) -> Result<Vec<HarnessFile>, HarnessError> {
        let mut declarations = String::new();
        let mut names = Vec::with_capacity(arguments.len());
        for (index, value) in arguments.values().iter().enumerate() {
            let ty = infer(value)
                .ok_or(HarnessError::UnrepresentableArgument {
                    index,
                    language: LanguageId::Java,
                })?
                .settle();
            let _ = writeln!(
                declarations,
                "            {} arg{} = {};",
                type_name(&ty),
                index,
                literal(value, &ty, true)
            );
            names.push(format!("arg{}", index));
        }

        let receiver = if matches_pattern(r"\bclass\s+Solution\b", source) {
            "new Solution()."
        } else {
            "Solution."
        };

        let call = format!("{}{}({})", receiver, entry_point.name, names.join(", "));
        // a void method has no value to record
        let invocation = if returns_void(source, &entry_point.name) {
            format!("{call};\n            Object value = null;")
        } else {
            format!("Object value = {call};")
        };

        let solution = format!("import java.util.*;\n\n{source}\n");
        let main = format!(
            r#"public class Main {{
    public static void main(String[] args) {{
        java.io.PrintStream slot = System.out;
        System.setOut(new java.io.PrintStream(java.io.OutputStream.nullOutputStream()));
        String result;
        try {{
{declarations}            {invocation}
            result = "{{\"ok\":true,\"value\":" + ArbiterJson.write(value) + "}}";
        }} catch (Throwable t) {{
            result = "{{\"ok\":false,\"error\":" + ArbiterJson.quote(t.toString()) + "}}";
        }}
        slot.println({marker} + result);
        slot.flush();
        System.exit(0);
    }}
}}

{JSON_WRITER}"#,
            marker = string_literal(marker),
        );

        Ok(vec![
            HarnessFile::new("Solution.java", solution),
            HarnessFile::new("Main.java", main),
        ])
    }
}
