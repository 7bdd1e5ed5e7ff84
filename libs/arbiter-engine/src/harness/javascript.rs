use super::{escaped, matches_pattern, HarnessError, HarnessFile, LanguageRunner};
use crate::canonical::canonical_value;
use crate::decoder::DecodedArguments;
use crate::entry_point::EntryPoint;
use arbiter_common::types::LanguageId;

pub struct JavascriptRunner;

impl LanguageRunner for JavascriptRunner {
    fn language(&self) -> LanguageId {
        LanguageId::Javascript
    }

    fn is_compiled(&self) -> bool {
        false
    }

    fn declares(&self, source: &str, name: &str) -> bool {
        let name = escaped(name);
        matches_pattern(
            &format!(r"\bfunction\s*\*?\s*{name}\s*\(|\b(?:var|let|const)\s+{name}\s*="),
            source,
        )
    }

    fn render(
        &self,
        source: &str,
        entry_point: &EntryPoint,
        arguments: &DecodedArguments,
        marker: &str,
    ) -> Result<Vec<HarnessFile>, HarnessError> {
        // JSON text is a valid JavaScript expression
        let call_args = arguments
            .values()
            .iter()
            .map(canonical_value)
            .collect::<Vec<_>>()
            .join(", ");
        let marker = canonical_value(&serde_json::Value::String(marker.to_string()));

        let contents = format!(
            r#"const __arbiterFs = require("fs");
for (const __arbiterLevel of ["log", "info", "warn", "error", "debug", "trace"]) {{
  console[__arbiterLevel] = () => {{}};
}}
process.stdout.write = () => true;

{source}

;(function () {{
  let __arbiterSlot;
  try {{
    const __arbiterValue = {entry}({call_args});
    __arbiterSlot = JSON.stringify({{ ok: true, value: __arbiterValue === undefined ? null : __arbiterValue }});
  }} catch (e) {{
    __arbiterSlot = JSON.stringify({{ ok: false, error: e instanceof Error ? `${{e.name}}: ${{e.message}}` : String(e) }});
  }}
  __arbiterFs.writeSync(1, {marker} + __arbiterSlot + "\n");
}})();
"#,
            entry = entry_point.name,
        );

        Ok(vec![HarnessFile::new("main.js", contents)])
    }
}
