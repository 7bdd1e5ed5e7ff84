use super::literal::{float_literal, infer, StaticType};
use super::{declares_typed_function, matches_pattern, HarnessError, HarnessFile, LanguageRunner};
use crate::decoder::DecodedArguments;
use crate::entry_point::EntryPoint;
use arbiter_common::types::LanguageId;
use serde_json::Value;
use std::fmt::Write as _;

pub struct CppRunner;

const PRELUDE: &str = "#include <bits/stdc++.h>\nusing namespace std;\n";

const JSON_WRITER: &str = r#"namespace arbiter_json {

inline std::string quote(const std::string& text) {
    std::string out = "\"";
    for (unsigned char c : text) {
        switch (c) {
            case '"': out += "\\\""; break;
            case '\\': out += "\\\\"; break;
            case '\n': out += "\\n"; break;
            case '\r': out += "\\r"; break;
            case '\t': out += "\\t"; break;
            default:
                if (c < 0x20) {
                    char buf[8];
                    std::snprintf(buf, sizeof(buf), "\\u%04x", c);
                    out += buf;
                } else {
                    out += static_cast<char>(c);
                }
        }
    }
    return out + "\"";
}

inline std::string write(const std::string& v) { return quote(v); }
inline std::string write(const char* v) { return v ? quote(v) : "null"; }
inline std::string write(char v) { return quote(std::string(1, v)); }
inline std::string write(bool v) { return v ? "true" : "false"; }
inline std::string write(std::nullptr_t) { return "null"; }

template <typename T>
typename std::enable_if<std::is_integral<T>::value, std::string>::type write(T v) {
    return std::to_string(v);
}

template <typename T>
typename std::enable_if<std::is_floating_point<T>::value, std::string>::type write(T v) {
    if (!std::isfinite(v)) return "null";
    if (std::floor(v) == v && std::fabs(v) < 9007199254740992.0) {
        return std::to_string(static_cast<long long>(v));
    }
    std::ostringstream out;
    out << std::setprecision(17) << v;
    return out.str();
}

inline std::string key(const std::string& k) { return quote(k); }
template <typename K>
std::string key(const K& k) { return quote(write(k)); }

template <typename T> std::string write(const std::vector<T>& v);
template <typename K, typename V> std::string write(const std::map<K, V>& m);
template <typename K, typename V> std::string write(const std::unordered_map<K, V>& m);

template <typename T>
std::string write(const std::vector<T>& v) {
    std::string out = "[";
    for (size_t i = 0; i < v.size(); ++i) {
        if (i) out += ",";
        out += write(v[i]);
    }
    return out + "]";
}

template <typename K, typename V>
std::string write(const std::map<K, V>& m) {
    std::string out = "{";
    bool first = true;
    for (const auto& entry : m) {
        if (!first) out += ",";
        first = false;
        out += key(entry.first) + ":" + write(entry.second);
    }
    return out + "}";
}

template <typename K, typename V>
std::string write(const std::unordered_map<K, V>& m) {
    return write(std::map<K, V>(m.begin(), m.end()));
}

// a void entry point records null
template <typename F>
std::string invoke(F&& f) {
    if constexpr (std::is_void_v<decltype(f())>) {
        f();
        return "null";
    } else {
        return write(f());
    }
}

}  // namespace arbiter_json
"#;

fn type_name(ty: &StaticType) -> String {
    match ty {
        StaticType::Int | StaticType::Unknown => "int".to_string(),
        StaticType::Long => "long long".to_string(),
        StaticType::Double => "double".to_string(),
        StaticType::Bool => "bool".to_string(),
        StaticType::Str => "std::string".to_string(),
        StaticType::Array(inner) => format!("std::vector<{}>", type_name(inner)),
    }
}

/// C++ string literal; control bytes as octal escapes, UTF-8 passed through
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
            '?' => out.push_str("\\?"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn literal(value: &Value, ty: &StaticType) -> String {
    match (value, ty) {
        (Value::Array(items), StaticType::Array(inner)) => {
            let body = items
                .iter()
                .map(|item| literal(item, inner))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{}}}", body)
        }
        (Value::String(s), _) => string_literal(s),
        (Value::Bool(b), _) => b.to_string(),
        (Value::Number(n), StaticType::Long) => format!("{}LL", n),
        (Value::Number(n), StaticType::Double) => n
            .as_f64()
            .map(float_literal)
            .unwrap_or_else(|| n.to_string()),
        (other, _) => other.to_string(),
    }
}

impl LanguageRunner for CppRunner {
    fn language(&self) -> LanguageId {
        LanguageId::Cpp
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
                    language: LanguageId::Cpp,
                })?
                .settle();
            let _ = writeln!(
                declarations,
                "        {} arg{} = {};",
                type_name(&ty),
                index,
                literal(value, &ty)
            );
            names.push(format!("arg{}", index));
        }

        let args = names.join(", ");
        let (setup, target) = if matches_pattern(r"\b(?:class|struct)\s+Solution\b", source) {
            (
                "Solution arbiter_solution;\n        ".to_string(),
                format!("arbiter_solution.{}({})", entry_point.name, args),
            )
        } else {
            (String::new(), format!("{}({})", entry_point.name, args))
        };

        let contents = format!(
            r#"{PRELUDE}
{source}

{JSON_WRITER}
#include <fcntl.h>
#include <unistd.h>

int main() {{
    // submission output on fd 1 goes to /dev/null; the slot uses a saved copy
    std::fflush(stdout);
    int arbiter_fd = dup(1);
    int arbiter_null = open("/dev/null", O_WRONLY);
    if (arbiter_null >= 0) {{
        dup2(arbiter_null, 1);
        close(arbiter_null);
    }}
    std::string arbiter_slot;
    try {{
{declarations}        {setup}arbiter_slot = std::string("{{\"ok\":true,\"value\":") + arbiter_json::invoke([&]() {{ return {target}; }}) + "}}";
    }} catch (const std::exception& e) {{
        arbiter_slot = std::string("{{\"ok\":false,\"error\":") + arbiter_json::quote(e.what()) + "}}";
    }} catch (...) {{
        arbiter_slot = "{{\"ok\":false,\"error\":\"unknown exception\"}}";
    }}
    std::cout.flush();
    std::fflush(stdout);
    arbiter_slot = std::string({marker}) + arbiter_slot + "\n";
    FILE* arbiter_out = arbiter_fd >= 0 ? fdopen(arbiter_fd, "w") : stdout;
    std::fputs(arbiter_slot.c_str(), arbiter_out);
    std::fflush(arbiter_out);
    return 0;
}}
"#,
            marker = string_literal(marker),
        );

        Ok(vec![HarnessFile::new("main.cpp", contents)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::entry_point::Resolution;
    use serde_json::json;

    fn entry(name: &str) -> EntryPoint {
        EntryPoint {
            name: name.to_string(),
            arity: None,
            resolution: Resolution::Registered,
        }
    }

    #[test]
    fn test_literals() {
        let ty = infer(&json!([["a"], []])).unwrap().settle();
        assert_eq!(type_name(&ty), "std::vector<std::vector<std::string>>");
        assert_eq!(literal(&json!([["a"], []]), &ty), r#"{{"a"}, {}}"#);
        assert_eq!(literal(&json!(5_000_000_000i64), &StaticType::Long), "5000000000LL");
        assert_eq!(string_literal("x\u{1}??"), r#""x\001\?\?""#);
    }

    #[test]
    fn test_render_free_function() {
        let source = "bool isPalindrome(string s) { return true; }";
        let files = CppRunner
            .render(source, &entry("isPalindrome"), &decode(r#""race a car""#), "@@m@@")
            .unwrap();

        assert_eq!(files[0].name, "main.cpp");
        let main = &files[0].contents;
        assert!(main.starts_with("#include <bits/stdc++.h>"));
        assert!(main.contains(r#"std::string arg0 = "race a car";"#));
        assert!(main.contains("arbiter_json::invoke([&]() { return isPalindrome(arg0); })"));
        assert!(main.contains(r#"arbiter_slot = std::string("@@m@@") + arbiter_slot"#));
    }

    #[test]
    fn test_render_solution_class() {
        let source = "class Solution {\npublic:\n    vector<int> twoSum(vector<int>& nums, int target) { return {0, 1}; }\n};";
        let files = CppRunner
            .render(source, &entry("twoSum"), &decode("[3,3],6"), "@@m@@")
            .unwrap();
        let main = &files[0].contents;
        assert!(main.contains("std::vector<int> arg0 = {3, 3};"));
        assert!(main.contains("Solution arbiter_solution;"));
        assert!(main.contains("return arbiter_solution.twoSum(arg0, arg1); })"));
    }

    #[test]
    fn test_void_entry_point_and_stdout_redirect() {
        let source = "void isPalindrome(string s) { printf(\"%s\\n\", s.c_str()); }";
        let files = CppRunner
            .render(source, &entry("isPalindrome"), &decode(r#""racecar""#), "@@m@@")
            .unwrap();
        let main = &files[0].contents;
        assert!(main.contains("if constexpr (std::is_void_v<decltype(f())>)"));
        assert!(main.contains("dup2(arbiter_null, 1);"));
        assert!(main.contains("fdopen(arbiter_fd, \"w\")"));
    }
}
