//! Data model for one check run
//!
//! Everything here is created at the start of a check invocation and dropped at
//! its end. Wire names are camelCase to match the assignment service.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default per-test timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u32 = 2000;
/// Default passing threshold in percent
pub const DEFAULT_PASSING_THRESHOLD: f64 = 80.0;
/// Default submission language
pub const DEFAULT_LANGUAGE: &str = "javascript";

/// A single test case supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected: String,
    #[serde(default)]
    pub description: String,
    /// Missing visibility means public
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected: expected.into(),
            description: String::new(),
            is_public: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_public(mut self, is_public: bool) -> Self {
        self.is_public = Some(is_public);
        self
    }

    /// Only an explicit `false` hides a test case
    pub fn is_public(&self) -> bool {
        self.is_public != Some(false)
    }
}

/// Fully merged settings for a check run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSettings {
    #[serde(rename = "timeout")]
    pub timeout_ms: u32,
    pub max_attempts: Option<u32>,
    #[serde(rename = "passingThreshold")]
    pub passing_threshold_percent: f64,
    pub allow_partial_score: bool,
    pub strict_mode: bool,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_attempts: None,
            passing_threshold_percent: DEFAULT_PASSING_THRESHOLD,
            allow_partial_score: true,
            strict_mode: false,
        }
    }
}

impl CheckSettings {
    /// Apply caller-supplied overrides on top of these settings
    pub fn merged_with(&self, overrides: &SettingsOverrides) -> Self {
        Self {
            timeout_ms: overrides.timeout.unwrap_or(self.timeout_ms),
            max_attempts: overrides.max_attempts.unwrap_or(self.max_attempts),
            passing_threshold_percent: overrides
                .passing_threshold
                .unwrap_or(self.passing_threshold_percent),
            allow_partial_score: overrides
                .allow_partial_score
                .unwrap_or(self.allow_partial_score),
            strict_mode: overrides.strict_mode.unwrap_or(self.strict_mode),
        }
    }

    /// Check the settings invariants, returning a description of the first violation
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("timeout must be greater than 0".to_string());
        }
        if !(0.0..=100.0).contains(&self.passing_threshold_percent) {
            return Err(format!(
                "passingThreshold must be within [0, 100], got {}",
                self.passing_threshold_percent
            ));
        }
        Ok(())
    }
}

/// Partial settings as they arrive on the wire; absent fields fall back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsOverrides {
    #[serde(default)]
    pub timeout: Option<u32>,
    /// `Some(None)` is an explicit `null` (no limit), `None` means absent
    #[serde(default, deserialize_with = "explicit_null")]
    pub max_attempts: Option<Option<u32>>,
    #[serde(default)]
    pub passing_threshold: Option<f64>,
    #[serde(default)]
    pub allow_partial_score: Option<bool>,
    #[serde(default)]
    pub strict_mode: Option<bool>,
}

fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Lint finding severity, encoded as 1 (warning) or 2 (error) on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning = 1,
    Error = 2,
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            1 => Ok(Severity::Warning),
            2 => Ok(Severity::Error),
            other => Err(serde::de::Error::custom(format!(
                "invalid severity {}, expected 1 or 2",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintFinding {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl LintFinding {
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            line,
            column,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Result of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub passed: bool,
    pub actual: String,
    pub expected: String,
    pub description: String,
    pub input: String,
    #[serde(rename = "timeout", default, skip_serializing_if = "is_false")]
    pub timed_out: bool,
    /// Visibility of the originating test case; never sent to the caller
    #[serde(skip)]
    pub is_public: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Aggregate counts over all outcomes of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStats {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    #[serde(rename = "timeout")]
    pub timed_out: u32,
    #[serde(rename = "public")]
    pub public_count: u32,
}

/// The sole output artifact of a check invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub lint: Vec<LintFinding>,
    /// Public outcomes only, in input order
    pub tests: Vec<TestOutcome>,
    pub score: u32,
    pub test_stats: TestStats,
    pub passed_threshold: bool,
    pub settings: CheckSettings,
}

/// A check invocation as consumed by the facade
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsOverrides>,
    /// Resolved through an assignment source when no inline test cases are given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<i64>,
}

impl CheckRequest {
    pub fn new(code: impl Into<String>, test_cases: Vec<TestCase>) -> Self {
        Self {
            code: code.into(),
            test_cases,
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_settings(mut self, settings: SettingsOverrides) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_visibility_is_public() {
        let tc: TestCase =
            serde_json::from_str(r#"{"input":"1","expected":"2","description":"d"}"#).unwrap();
        assert!(tc.is_public());
        assert!(!TestCase::new("1", "2").with_public(false).is_public());
        assert!(TestCase::new("1", "2").with_public(true).is_public());
    }

    #[test]
    fn test_settings_merge_keeps_defaults_for_absent_fields() {
        let overrides: SettingsOverrides =
            serde_json::from_str(r#"{"timeout":500,"allowPartialScore":false}"#).unwrap();
        let merged = CheckSettings::default().merged_with(&overrides);

        assert_eq!(merged.timeout_ms, 500);
        assert!(!merged.allow_partial_score);
        assert_eq!(merged.passing_threshold_percent, DEFAULT_PASSING_THRESHOLD);
        assert_eq!(merged.max_attempts, None);
        assert!(!merged.strict_mode);
    }

    #[test]
    fn test_settings_explicit_null_max_attempts() {
        let base = CheckSettings {
            max_attempts: Some(3),
            ..Default::default()
        };

        let absent: SettingsOverrides = serde_json::from_str("{}").unwrap();
        assert_eq!(base.merged_with(&absent).max_attempts, Some(3));

        let null: SettingsOverrides = serde_json::from_str(r#"{"maxAttempts":null}"#).unwrap();
        assert_eq!(base.merged_with(&null).max_attempts, None);
    }

    #[test]
    fn test_settings_validation() {
        assert!(CheckSettings::default().validate().is_ok());

        let zero_timeout = CheckSettings {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());

        let bad_threshold = CheckSettings {
            passing_threshold_percent: 100.5,
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());
    }

    #[test]
    fn test_result_wire_format() {
        let result = CheckResult {
            lint: vec![LintFinding::new("syntax-error", Severity::Error, "bad", 1, 1)],
            tests: vec![TestOutcome {
                passed: false,
                actual: "Error: timeout".into(),
                expected: "1".into(),
                description: "loop".into(),
                input: "0".into(),
                timed_out: true,
                is_public: true,
            }],
            score: 27,
            test_stats: TestStats {
                total: 1,
                passed: 0,
                failed: 1,
                timed_out: 1,
                public_count: 1,
            },
            passed_threshold: false,
            settings: CheckSettings::default(),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["lint"][0]["ruleId"], "syntax-error");
        assert_eq!(json["lint"][0]["severity"], 2);
        assert_eq!(json["tests"][0]["timeout"], true);
        assert!(json["tests"][0].get("isPublic").is_none());
        assert_eq!(json["testStats"]["timeout"], 1);
        assert_eq!(json["testStats"]["public"], 1);
        assert_eq!(json["passedThreshold"], false);
        assert_eq!(json["settings"]["timeout"], 2000);
        assert_eq!(json["settings"]["maxAttempts"], serde_json::Value::Null);
        assert_eq!(json["settings"]["passingThreshold"], 80.0);
    }

    #[test]
    fn test_passing_outcome_omits_timeout_flag() {
        let outcome = TestOutcome {
            passed: true,
            actual: "10".into(),
            expected: "10".into(),
            description: String::new(),
            input: "5".into(),
            timed_out: false,
            is_public: true,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("timeout").is_none());
    }

    #[test]
    fn test_request_defaults_language() {
        let request: CheckRequest = serde_json::from_str(
            r#"{"code":"function main(n){return n}","testCases":[{"input":"1","expected":"1","description":""}]}"#,
        )
        .unwrap();
        assert_eq!(request.language(), "javascript");
        assert_eq!(request.test_cases.len(), 1);
        assert!(request.settings.is_none());
    }
}
