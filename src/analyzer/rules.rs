//! Lint rules
//!
//! Structural rules run on the raw text for every language. Deeper rules run on
//! masked JavaScript-family source so literals and comments never match.

use regex::Regex;
use std::sync::OnceLock;

use crate::core::model::{LintFinding, Severity};
use crate::core::source::{line_col, MaskedSource};

pub const MISSING_MAIN_FUNCTION: &str = "missing-main-function";
pub const SYNTAX_ERROR: &str = "syntax-error";
pub const NO_DEBUGGER: &str = "no-debugger";
pub const NO_EVAL: &str = "no-eval";

struct Patterns {
    entry_point: Regex,
    declaration: Regex,
    debugger: Regex,
    eval_call: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        entry_point: Regex::new(
            r"\bfunction\s*\*?\s*(?:main|solution)\s*[<(]|\b(?:const|let)\s+(?:main|solution)\b",
        )
        .expect("entry point pattern"),
        declaration: Regex::new(r"\bfunction\b|\b(?:const|let|var)\s+[A-Za-z_$\[{]")
            .expect("declaration pattern"),
        debugger: Regex::new(r"\bdebugger\b").expect("debugger pattern"),
        eval_call: Regex::new(r"\beval\s*\(").expect("eval pattern"),
    })
}

/// `main` or `solution` must be defined as a function or a const/let binding
pub fn check_entry_point(code: &str) -> Option<LintFinding> {
    if patterns().entry_point.is_match(code) {
        return None;
    }
    Some(LintFinding::new(
        MISSING_MAIN_FUNCTION,
        Severity::Error,
        "Code must define a function named 'main' or 'solution'",
        1,
        1,
    ))
}

/// Code must contain at least one function declaration or variable assignment
pub fn check_declarations(code: &str) -> Option<LintFinding> {
    if patterns().declaration.is_match(code) {
        return None;
    }
    Some(LintFinding::new(
        SYNTAX_ERROR,
        Severity::Error,
        "Code must contain at least one function declaration or variable assignment",
        1,
        1,
    ))
}

/// Unterminated literals and unbalanced delimiters; reports the first problem only
pub fn check_delimiters(code: &str, masked: &MaskedSource) -> Option<LintFinding> {
    if let Some(open) = masked.unterminated() {
        let (line, column) = line_col(code, open.offset);
        return Some(LintFinding::new(
            SYNTAX_ERROR,
            Severity::Error,
            format!("Unterminated {}", open.kind.describe()),
            line,
            column,
        ));
    }

    let mut stack: Vec<(u8, usize)> = Vec::new();
    for (offset, byte) in masked.text().bytes().enumerate() {
        match byte {
            b'(' | b'[' | b'{' => stack.push((byte, offset)),
            b')' | b']' | b'}' => {
                let expected_open = match byte {
                    b')' => b'(',
                    b']' => b'[',
                    _ => b'{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected_open => {}
                    Some((open, open_offset)) => {
                        let (open_line, open_column) = line_col(code, open_offset);
                        let (line, column) = line_col(code, offset);
                        return Some(LintFinding::new(
                            SYNTAX_ERROR,
                            Severity::Error,
                            format!(
                                "Unexpected '{}', expected '{}' to close '{}' at {}:{}",
                                byte as char,
                                closer_for(open) as char,
                                open as char,
                                open_line,
                                open_column
                            ),
                            line,
                            column,
                        ));
                    }
                    None => {
                        let (line, column) = line_col(code, offset);
                        return Some(LintFinding::new(
                            SYNTAX_ERROR,
                            Severity::Error,
                            format!("Unexpected '{}'", byte as char),
                            line,
                            column,
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    stack.pop().map(|(open, offset)| {
        let (line, column) = line_col(code, offset);
        LintFinding::new(
            SYNTAX_ERROR,
            Severity::Error,
            format!("Unclosed '{}'", open as char),
            line,
            column,
        )
    })
}

fn closer_for(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

pub fn check_debugger(code: &str, masked: &MaskedSource) -> Vec<LintFinding> {
    patterns()
        .debugger
        .find_iter(masked.text())
        .map(|m| {
            let (line, column) = line_col(code, m.start());
            LintFinding::new(
                NO_DEBUGGER,
                Severity::Warning,
                "Unexpected 'debugger' statement",
                line,
                column,
            )
        })
        .collect()
}

pub fn check_eval(code: &str, masked: &MaskedSource) -> Vec<LintFinding> {
    let text = masked.text();
    patterns()
        .eval_call
        .find_iter(text)
        // member calls such as `obj.eval(` are not the global eval
        .filter(|m| !text[..m.start()].trim_end().ends_with('.'))
        .map(|m| {
            let (line, column) = line_col(code, m.start());
            LintFinding::new(
                NO_EVAL,
                Severity::Warning,
                "eval is not available when the code is executed",
                line,
                column,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_forms() {
        for code in [
            "function main(n) { return n; }",
            "function* solution(n) { yield n; }",
            "function main<T>(x: T): T { return x; }",
            "const main = (n) => n;",
            "let solution = function (n) { return n; };",
        ] {
            assert!(check_entry_point(code).is_none(), "{}", code);
        }
        for code in ["function mainly() {}", "var main = 1;", "const mains = 2;"] {
            let finding = check_entry_point(code).expect(code);
            assert_eq!(finding.rule_id, MISSING_MAIN_FUNCTION);
        }
    }

    #[test]
    fn test_declaration_forms() {
        assert!(check_declarations("var x = 1;").is_none());
        assert!(check_declarations("const [a, b] = [1, 2];").is_none());
        assert!(check_declarations("function f() {}").is_none());
        assert!(check_declarations("return 1;").is_some());
    }
}
