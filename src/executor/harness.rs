//! Harness script assembly and result parsing
//!
//! The harness template (`files/harness.js`) is split at its two markers and
//! the per-run values are concatenated between the pieces. Submitted code is
//! spliced in as a JSON string literal and compiled by the harness itself, so
//! it never becomes part of the harness script's own syntax.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::core::error::ExecutionFailure;

const HARNESS_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/harness.js"));

const CONFIG_MARKER: &str = "__CHECKER_CONFIG__";
const USER_CODE_MARKER: &str = "__CHECKER_USER_CODE__";

const CONFLICTING_RESULTS_MESSAGE: &str = "Conflicting result lines on stdout";

/// Globals that survive the harness prelude. Everything else on the global
/// object is deleted before submitted code runs.
pub static ALLOWED_GLOBALS: &[&str] = &[
    // value properties
    "globalThis",
    "Infinity",
    "NaN",
    "undefined",
    // functions
    "isFinite",
    "isNaN",
    "parseFloat",
    "parseInt",
    "decodeURI",
    "decodeURIComponent",
    "encodeURI",
    "encodeURIComponent",
    "escape",
    "unescape",
    "structuredClone",
    // fundamental objects
    "Object",
    "Function",
    "Boolean",
    "Symbol",
    // errors
    "Error",
    "AggregateError",
    "EvalError",
    "RangeError",
    "ReferenceError",
    "SyntaxError",
    "TypeError",
    "URIError",
    // numbers, dates, text
    "Number",
    "BigInt",
    "Math",
    "Date",
    "String",
    "RegExp",
    "JSON",
    "Intl",
    "TextEncoder",
    "TextDecoder",
    // collections
    "Array",
    "Map",
    "Set",
    "WeakMap",
    "WeakSet",
    "ArrayBuffer",
    "DataView",
    "Int8Array",
    "Uint8Array",
    "Uint8ClampedArray",
    "Int16Array",
    "Uint16Array",
    "Int32Array",
    "Uint32Array",
    "Float32Array",
    "Float64Array",
    "BigInt64Array",
    "BigUint64Array",
    // control abstraction and reflection
    "Promise",
    "Reflect",
    "Proxy",
    // replaced with a silent stub by the prelude
    "console",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarnessConfig<'a> {
    allowed_globals: &'a [&'a str],
    marker: &'a str,
    input: &'a str,
}

/// Result line written by the harness
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// A ready-to-run harness script and the marker its result line carries
#[derive(Debug)]
pub struct HarnessScript {
    pub script: String,
    pub marker: String,
}

/// Build the harness script for one (code, input) pair
pub fn build_script(code: &str, input: &str) -> Result<HarnessScript> {
    let (head, rest) = HARNESS_TEMPLATE
        .split_once(CONFIG_MARKER)
        .ok_or_else(|| anyhow!("Harness template is missing {}", CONFIG_MARKER))?;
    let (middle, tail) = rest
        .split_once(USER_CODE_MARKER)
        .ok_or_else(|| anyhow!("Harness template is missing {}", USER_CODE_MARKER))?;

    let marker = result_marker();
    let config = serde_json::to_string(&HarnessConfig {
        allowed_globals: ALLOWED_GLOBALS,
        marker: &marker,
        input,
    })?;
    let source = serde_json::to_string(code)?;

    let mut script =
        String::with_capacity(head.len() + config.len() + middle.len() + source.len() + tail.len());
    script.push_str(head);
    script.push_str(&config);
    script.push_str(middle);
    script.push_str(&source);
    script.push_str(tail);

    Ok(HarnessScript { script, marker })
}

/// Per-run marker. Submitted code cannot read it, so it cannot forge a result line.
fn result_marker() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(COUNTER.fetch_add(1, Ordering::Relaxed));
    if let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) {
        hasher.write_u128(now.as_nanos());
    }
    format!("__CHECKER_RESULT_{:016x}__", hasher.finish())
}

/// Interpret the output of a finished harness run.
///
/// Returns `None` when no result line was written; the caller then derives
/// the failure from the process status and stderr. The harness writes exactly
/// one result line, so several marker lines mean something else wrote to
/// stdout and none of them is trusted.
pub fn parse_result(stdout: &str, marker: &str) -> Option<Result<String, ExecutionFailure>> {
    let prefix = format!("{} ", marker);
    let mut lines = stdout.lines().filter_map(|line| line.strip_prefix(&prefix));
    let line = lines.next()?;
    if lines.next().is_some() {
        return Some(Err(ExecutionFailure::runtime(CONFLICTING_RESULTS_MESSAGE)));
    }
    let envelope: Envelope = serde_json::from_str(line).ok()?;

    Some(if envelope.ok {
        Ok(envelope.value.unwrap_or_default())
    } else {
        Err(ExecutionFailure::runtime(
            envelope.error.unwrap_or_else(|| "Unknown error".to_string()),
        ))
    })
}

/// Best error message from runtime stderr: the first `XxxError: ...` line,
/// skipping runtime warnings
pub fn error_from_stderr(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.contains("Warning"))
        .find(|line| {
            line.split_once(": ").map_or(false, |(name, _)| {
                name.ends_with("Error")
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_script_splices_values() {
        let harness = build_script("function main(n) { return \"n\"; }", "[1,2]").unwrap();
        assert!(harness
            .script
            .contains(r#"("function main(n) { return \"n\"; }");"#));
        assert!(harness.script.contains(r#""input":"[1,2]""#));
        assert!(harness.script.contains(&harness.marker));
        assert!(!harness.script.contains(CONFIG_MARKER));
        assert!(!harness.script.contains(USER_CODE_MARKER));
    }

    #[test]
    fn test_markers_in_user_code_are_not_substituted() {
        let code = "const s = '__CHECKER_CONFIG__ __CHECKER_USER_CODE__';";
        let harness = build_script(code, "1").unwrap();
        assert!(harness.script.contains(code));
        assert_eq!(harness.script.matches(CONFIG_MARKER).count(), 1);
    }

    #[test]
    fn test_user_code_cannot_close_the_harness() {
        let code = "}); process.exit(0); (function () {\n// line comment";
        let harness = build_script(code, "1").unwrap();
        assert!(harness
            .script
            .contains(r#""}); process.exit(0); (function () {\n// line comment""#));
    }

    #[test]
    fn test_markers_differ_per_run() {
        let a = build_script("", "").unwrap();
        let b = build_script("", "").unwrap();
        assert_ne!(a.marker, b.marker);
    }

    #[test]
    fn test_allow_list_excludes_dangerous_globals() {
        for name in [
            "process",
            "require",
            "eval",
            "setTimeout",
            "setInterval",
            "setImmediate",
            "queueMicrotask",
            "fetch",
            "Buffer",
            "WebAssembly",
            "SharedArrayBuffer",
            "Atomics",
            "WeakRef",
            "FinalizationRegistry",
        ] {
            assert!(!ALLOWED_GLOBALS.contains(&name), "{} must not be allowed", name);
        }
        assert!(ALLOWED_GLOBALS.contains(&"JSON"));
        assert!(ALLOWED_GLOBALS.contains(&"TextEncoder"));
    }

    #[test]
    fn test_parse_result_value() {
        let stdout = "noise\nM {\"ok\":true,\"value\":\"10\"}\n";
        assert_eq!(parse_result(stdout, "M"), Some(Ok("10".to_string())));
    }

    #[test]
    fn test_parse_result_error() {
        let stdout = "M {\"ok\":false,\"error\":\"boom\"}\n";
        assert_eq!(
            parse_result(stdout, "M"),
            Some(Err(ExecutionFailure::runtime("boom")))
        );
    }

    #[test]
    fn test_parse_result_rejects_extra_result_lines() {
        let stdout = "M {\"ok\":true,\"value\":\"10\"}\nM {\"ok\":true,\"value\":\"wrong\"}\n";
        assert_eq!(
            parse_result(stdout, "M"),
            Some(Err(ExecutionFailure::runtime(CONFLICTING_RESULTS_MESSAGE)))
        );
    }

    #[test]
    fn test_parse_result_ignores_forged_lines() {
        let stdout = "FORGED {\"ok\":true,\"value\":\"10\"}\n";
        assert_eq!(parse_result(stdout, "M"), None);
        assert_eq!(parse_result("", "M"), None);
    }

    #[test]
    fn test_error_from_stderr() {
        let stderr = "(node:1) ExperimentalWarning: Permission is an experimental feature\n\
                      [stdin]:3\n  return n +;\n\nSyntaxError: Unexpected token ';'\n    at ...\n";
        assert_eq!(
            error_from_stderr(stderr).as_deref(),
            Some("SyntaxError: Unexpected token ';'")
        );
        assert_eq!(error_from_stderr("segfault"), None);
    }
}
