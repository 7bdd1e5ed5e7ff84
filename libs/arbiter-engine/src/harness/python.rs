use super::{escaped, matches_pattern, HarnessError, HarnessFile, LanguageRunner};
use crate::canonical::canonical_value;
use crate::decoder::DecodedArguments;
use crate::entry_point::EntryPoint;
use arbiter_common::types::LanguageId;
use serde_json::Value;

pub struct PythonRunner;

fn string_literal(text: &str) -> String {
    // a JSON string literal is also a valid Python string literal
    canonical_value(&Value::String(text.to_string()))
}

impl LanguageRunner for PythonRunner {
    fn language(&self) -> LanguageId {
        LanguageId::Python
    }

    fn is_compiled(&self) -> bool {
        false
    }

    fn declares(&self, source: &str, name: &str) -> bool {
        matches_pattern(
            &format!(r"(?m)^\s*(?:async\s+)?def\s+{}\s*\(", escaped(name)),
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
        let args_json = string_literal(&format!("[{}]", arguments.to_canonical_input()));
        let name = string_literal(&entry_point.name);
        let marker = string_literal(marker);

        let contents = format!(
            r#"import io as _arbiter_io
import sys as _arbiter_sys
_arbiter_sys.stdout = _arbiter_io.StringIO()

from typing import *

{source}


def _arbiter_finite(value):
    import math
    if isinstance(value, float) and not math.isfinite(value):
        return None
    if isinstance(value, (list, tuple)):
        return [_arbiter_finite(item) for item in value]
    if isinstance(value, dict):
        return {{key: _arbiter_finite(item) for key, item in value.items()}}
    return value


def _arbiter_main():
    import json
    name = {name}
    try:
        args = json.loads({args_json})
        solution = globals().get("Solution")
        if isinstance(solution, type) and hasattr(solution, name):
            target = getattr(solution(), name)
        elif name in globals():
            target = globals()[name]
        else:
            raise NameError("name %r is not defined" % name)
        value = _arbiter_finite(target(*args))
        slot = json.dumps({{"ok": True, "value": value}}, separators=(",", ":"), sort_keys=True, allow_nan=False)
    except BaseException as exc:
        slot = json.dumps({{"ok": False, "error": "%s: %s" % (type(exc).__name__, exc)}})
    _arbiter_sys.__stdout__.write({marker} + slot + "\n")
    _arbiter_sys.__stdout__.flush()


_arbiter_main()
"#
        );

        Ok(vec![HarnessFile::new("main.py", contents)])
    }
}
