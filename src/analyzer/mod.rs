//! Static analyzer - shallow lint and syntax checks
//!
//! Inspects submitted source without running it. Every problem is reported as
//! a [`LintFinding`]; analysis itself never fails.
//!
//! The structural checks (entry point, declarations) apply to every language.
//! Languages from the language table additionally get the JavaScript-family
//! path: literal termination, delimiter balance, `debugger` and `eval` usage.

pub mod rules;

use tracing::debug;

use crate::core::model::LintFinding;
use crate::core::source::MaskedSource;
use crate::languages;

/// Analyze `code` written in `language`
pub fn analyze(code: &str, language: &str) -> Vec<LintFinding> {
    let mut findings = Vec::new();

    if let Some(finding) = rules::check_entry_point(code) {
        findings.push(finding);
    }
    let basic_syntax = rules::check_declarations(code);
    let has_syntax_error = basic_syntax.is_some();
    findings.extend(basic_syntax);

    if languages::get_language_config(language).is_none() {
        debug!(
            "No deeper analysis for language '{}', using text checks only",
            language
        );
        return findings;
    }

    let masked = MaskedSource::new(code);
    let mut deeper = Vec::new();
    if !has_syntax_error {
        deeper.extend(rules::check_delimiters(code, &masked));
    }
    deeper.extend(rules::check_debugger(code, &masked));
    deeper.extend(rules::check_eval(code, &masked));
    deeper.sort_by_key(|f| (f.line, f.column));

    findings.extend(deeper);
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Severity;

    fn rule_ids(findings: &[LintFinding]) -> Vec<&str> {
        findings.iter().map(|f| f.rule_id.as_str()).collect()
    }

    #[test]
    fn test_clean_function_has_no_findings() {
        let findings = analyze("function main(n) { return n * 2; }", "javascript");
        assert!(findings.is_empty(), "{:?}", findings);
    }

    #[test]
    fn test_entry_point_forms() {
        for code in [
            "function solution(a) { return a; }",
            "async function main(a) { return a; }",
            "const main = (a) => a;",
            "let solution = function (a) { return a; };",
        ] {
            assert!(analyze(code, "javascript").is_empty(), "{}", code);
        }
    }

    #[test]
    fn test_missing_entry_point() {
        let findings = analyze("function helper(n) { return n; }", "javascript");
        assert_eq!(rule_ids(&findings), vec![rules::MISSING_MAIN_FUNCTION]);
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!((findings[0].line, findings[0].column), (1, 1));
    }

    #[test]
    fn test_var_binding_is_not_an_entry_point() {
        let findings = analyze("var main = 1;", "javascript");
        assert_eq!(rule_ids(&findings), vec![rules::MISSING_MAIN_FUNCTION]);
    }

    #[test]
    fn test_no_declarations_is_syntax_error() {
        let findings = analyze("1 + 1", "javascript");
        assert_eq!(
            rule_ids(&findings),
            vec![rules::MISSING_MAIN_FUNCTION, rules::SYNTAX_ERROR]
        );
        assert_eq!((findings[1].line, findings[1].column), (1, 1));
    }

    #[test]
    fn test_unbalanced_braces_reported_at_position() {
        let code = "function main(n) {\n  return n;\n";
        let findings = analyze(code, "javascript");
        assert_eq!(rule_ids(&findings), vec![rules::SYNTAX_ERROR]);
        assert_eq!((findings[0].line, findings[0].column), (1, 18));
        assert!(findings[0].message.contains("Unclosed '{'"));
    }

    #[test]
    fn test_mismatched_closer() {
        let findings = analyze("function main(n) { return [n); }", "javascript");
        assert_eq!(rule_ids(&findings), vec![rules::SYNTAX_ERROR]);
        assert_eq!(findings[0].column, 29);
    }

    #[test]
    fn test_unterminated_string() {
        let findings = analyze("function main() {\n  return 'abc;\n}", "typescript");
        assert_eq!(rule_ids(&findings), vec![rules::SYNTAX_ERROR]);
        assert_eq!((findings[0].line, findings[0].column), (2, 10));
    }

    #[test]
    fn test_braces_in_literals_are_ignored() {
        let code = "function main(s) {\n  // }\n  return s + '}' + `{${s}`;\n}";
        assert!(analyze(code, "javascript").is_empty());
    }

    #[test]
    fn test_debugger_and_eval_warnings() {
        let code = "function main(s) {\n  debugger;\n  return eval(s) + obj.eval(s);\n}";
        let findings = analyze(code, "javascript");
        assert_eq!(
            rule_ids(&findings),
            vec![rules::NO_DEBUGGER, rules::NO_EVAL]
        );
        assert!(findings.iter().all(|f| f.severity == Severity::Warning));
        assert_eq!((findings[0].line, findings[0].column), (2, 3));
        assert_eq!((findings[1].line, findings[1].column), (3, 10));
    }

    #[test]
    fn test_unknown_language_gets_text_checks_only() {
        let code = "function main(n) { return (n; }";
        assert!(analyze(code, "brainfuck").is_empty());
        assert_eq!(
            rule_ids(&analyze(code, "javascript")),
            vec![rules::SYNTAX_ERROR]
        );
    }

    #[test]
    fn test_only_one_syntax_error() {
        let findings = analyze("((", "javascript");
        let syntax = findings
            .iter()
            .filter(|f| f.rule_id == rules::SYNTAX_ERROR)
            .count();
        assert_eq!(syntax, 1);
    }
}
