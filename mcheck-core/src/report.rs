//! Per-check pass/fail reporting

use std::fmt;
use std::io::Write;

/// Outcome of one conformance step. Reported as soon as the step ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: Option<String>,
}

impl CheckResult {
    pub fn pass(name: &'static str) -> Self {
        Self {
            name,
            passed: true,
            detail: None,
        }
    }

    pub fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.passed, &self.detail) {
            (true, _) => write!(f, "[ OK ] {}", self.name),
            (false, Some(detail)) => write!(f, "[FAIL] {}: {}", self.name, detail),
            (false, None) => write!(f, "[FAIL] {}", self.name),
        }
    }
}

pub trait Reporter {
    fn report(&mut self, result: &CheckResult);
}

/// Prints one line per check to stdout.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for ConsoleReporter {
    fn report(&mut self, result: &CheckResult) {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout must not abort the check run.
        let _ = writeln!(stdout, "{result}");
        let _ = stdout.flush();
    }
}

/// Keeps every reported result in order.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    results: Vec<CheckResult>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.results.iter().map(|r| r.name).collect()
    }

    pub fn last(&self) -> Option<&CheckResult> {
        self.results.last()
    }
}

impl Reporter for MemoryReporter {
    fn report(&mut self, result: &CheckResult) {
        self.results.push(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_display() {
        assert_eq!(CheckResult::pass("Ping").to_string(), "[ OK ] Ping");
        assert_eq!(
            CheckResult::fail("Set", "expected `a`, got `b`").to_string(),
            "[FAIL] Set: expected `a`, got `b`"
        );
    }

    #[test]
    fn test_memory_reporter_keeps_order() {
        let mut reporter = MemoryReporter::new();
        reporter.report(&CheckResult::pass("Ping"));
        reporter.report(&CheckResult::fail("Set", "boom"));

        assert_eq!(reporter.names(), vec!["Ping", "Set"]);
        assert!(!reporter.last().unwrap().passed);
    }
}
