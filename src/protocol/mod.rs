use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Status code assumed when a test does not declare a usable one.
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

// ============================================================================
// DECLARED INPUT (immutable during a run)
// ============================================================================

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    /// Empty means "default, applies to any environment".
    #[serde(default)]
    pub environment: String,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            environment: environment.into(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.environment.is_empty()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HeaderItem {
    pub key: String,
    pub value: String,
}

impl HeaderItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CapturedVariableRule {
    pub name: String,
    pub pattern: String,
}

impl CapturedVariableRule {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

/// Polarity of an assertion: must match or must not match.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssertionType {
    Positive,
    Negative,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssertionMethod {
    /// Regular expression searched in the raw body.
    Regex,
    /// CSS selector evaluated over the parsed HTML body.
    Selector,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Assertion {
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    #[serde(rename = "type")]
    pub assertion_type: AssertionType,
    #[serde(default = "default_assertion_method")]
    pub method: AssertionMethod,
}

fn default_assertion_method() -> AssertionMethod {
    AssertionMethod::Regex
}

impl Assertion {
    pub fn new(
        description: impl Into<String>,
        pattern: impl Into<String>,
        assertion_type: AssertionType,
        method: AssertionMethod,
    ) -> Self {
        Self {
            description: description.into(),
            pattern: pattern.into(),
            assertion_type,
            method,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Test {
    pub position: usize,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub post_body: Option<String>,
    #[serde(default)]
    pub headers: Vec<HeaderItem>,
    /// `None` or a value outside 100..=599 means 200.
    #[serde(default)]
    pub expected_status_code: Option<u16>,
    #[serde(default)]
    pub captured_variables: Vec<CapturedVariableRule>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    /// Pause after this test, in milliseconds.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Test {
    pub fn new(position: usize, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            position,
            description: None,
            method: method.into(),
            url: url.into(),
            post_body: None,
            headers: Vec::new(),
            expected_status_code: None,
            captured_variables: Vec::new(),
            assertions: Vec::new(),
            delay_ms: None,
        }
    }

    /// Status code the response must carry for the test to pass.
    pub fn expected_status(&self) -> u16 {
        match self.expected_status_code {
            Some(code) if (100..=599).contains(&code) => code,
            _ => DEFAULT_EXPECTED_STATUS,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TestFile {
    /// Filled by the loader from the requested name when absent.
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    pub tests: Vec<Test>,
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AssertionResult {
    pub description: String,
    /// Pattern as declared.
    pub pattern: String,
    /// Pattern after variable substitution, the one actually evaluated.
    pub transformed_pattern: String,
    #[serde(rename = "type")]
    pub assertion_type: AssertionType,
    pub method: AssertionMethod,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct TestResult {
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub actual_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    pub response_code_success: bool,
    pub assertion_results: Vec<AssertionResult>,
    pub captured_variables: Vec<Variable>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl TestResult {
    /// True when there are no assertions, or when every assertion succeeded.
    pub fn assertions_success(&self) -> bool {
        crate::assertions::assertions_success(&self.assertion_results)
    }

    pub fn success(&self) -> bool {
        self.response_code_success && self.assertions_success()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TestFileResult {
    pub id: Uuid,
    pub file_name: String,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub total_elapsed_ms: u64,
    pub test_results: Vec<TestResult>,
    pub total_passed: usize,
    pub total_failed: usize,
    pub total_run: usize,
}

impl TestFileResult {
    pub fn new(file_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            environment: environment.into(),
            started_at: Utc::now(),
            total_elapsed_ms: 0,
            test_results: Vec::new(),
            total_passed: 0,
            total_failed: 0,
            total_run: 0,
        }
    }

    /// Recomputes the totals from `test_results`.
    pub fn tally(&mut self) {
        self.total_run = self.test_results.len();
        self.total_passed = self.test_results.iter().filter(|r| r.success()).count();
        self.total_failed = self.total_run - self.total_passed;
    }

    pub fn summary(&self) -> TestFileResultSummary {
        TestFileResultSummary {
            id: self.id,
            date_run: self.started_at,
            file_name: self.file_name.clone(),
            environment: self.environment.clone(),
            total_run_time_ms: self.total_elapsed_ms,
            total_passed: self.total_passed,
            total_failed: self.total_failed,
            total_run: self.total_run,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TestFileResultSummary {
    pub id: Uuid,
    pub date_run: DateTime<Utc>,
    pub file_name: String,
    pub environment: String,
    pub total_run_time_ms: u64,
    pub total_passed: usize,
    pub total_failed: usize,
    pub total_run: usize,
}

// ============================================================================
// TASKS
// ============================================================================

pub type TaskId = u64;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TaskRequest {
    pub file_name: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl TaskRequest {
    pub fn new(file_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            environment: environment.into(),
            username: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum TaskStatus {
    Running,
    Stopped,
    Completed,
    Errored,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Completed => "Completed",
            Self::Errored => "Errored",
        };
        write!(f, "{}", text)
    }
}

/// Progress snapshot of one queued file run.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TaskDetails {
    pub task_id: TaskId,
    pub file_name: String,
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub status: TaskStatus,
    pub current_index: usize,
    pub total_tests: usize,
    pub results: Vec<TestResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,
}
