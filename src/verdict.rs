use serde::{Deserialize, Serialize};
use std::fmt;

use crate::executor::{Execution, ExecutionOutcome};

/// Verdict for one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    RuntimeError,
    TimeLimitExceeded,
    SystemError,
}

impl Verdict {
    /// Judge one execution against the expected output.
    pub fn of(execution: &Execution, expected: &str) -> Self {
        match execution.outcome {
            ExecutionOutcome::Success => {
                if compare_output(&execution.stdout, expected) {
                    Verdict::Accepted
                } else {
                    Verdict::WrongAnswer
                }
            }
            ExecutionOutcome::RuntimeError => Verdict::RuntimeError,
            ExecutionOutcome::Timeout => Verdict::TimeLimitExceeded,
            ExecutionOutcome::SystemError => Verdict::SystemError,
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Verdict::Accepted
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Accepted => "accepted",
            Verdict::WrongAnswer => "wrong_answer",
            Verdict::RuntimeError => "runtime_error",
            Verdict::TimeLimitExceeded => "time_limit_exceeded",
            Verdict::SystemError => "system_error",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one test as reported back to a student
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<i64>,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
    pub verdict: Verdict,
}

impl TestOutcome {
    pub fn judge(
        test_case_id: Option<i64>,
        input: &str,
        expected: &str,
        execution: &Execution,
    ) -> Self {
        let verdict = Verdict::of(execution, expected);
        Self {
            test_case_id,
            input: input.to_string(),
            expected_output: expected.to_string(),
            actual_output: execution.stdout.clone(),
            passed: verdict.is_accepted(),
            verdict,
        }
    }
}

/// Compare program output with expected output: both sides trimmed.
pub fn compare_output(actual: &str, expected: &str) -> bool {
    actual.trim() == expected.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(outcome: ExecutionOutcome, stdout: &str) -> Execution {
        Execution {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
            outcome,
        }
    }

    #[test]
    fn test_compare_output_exact() {
        assert!(compare_output("hello", "hello"));
        assert!(compare_output("1 2 3", "1 2 3"));
    }

    #[test]
    fn test_compare_output_surrounding_whitespace() {
        assert!(compare_output("25\n", "25"));
        assert!(compare_output("  25 \n\n", "25\n"));
        assert!(compare_output("", "\n"));
    }

    #[test]
    fn test_compare_output_inner_whitespace_matters() {
        assert!(!compare_output("1  2", "1 2"));
        assert!(!compare_output("a\nb", "a\n\nb"));
        assert!(!compare_output("10", "25"));
    }

    #[test]
    fn test_verdict_of_execution() {
        assert_eq!(
            Verdict::of(&exec(ExecutionOutcome::Success, "25\n"), "25"),
            Verdict::Accepted
        );
        assert_eq!(
            Verdict::of(&exec(ExecutionOutcome::Success, "10"), "25"),
            Verdict::WrongAnswer
        );
        // a crash is a failure even when the partial output happens to match
        assert_eq!(
            Verdict::of(&exec(ExecutionOutcome::RuntimeError, "25"), "25"),
            Verdict::RuntimeError
        );
        assert_eq!(
            Verdict::of(&exec(ExecutionOutcome::Timeout, ""), "25"),
            Verdict::TimeLimitExceeded
        );
    }

    #[test]
    fn test_test_outcome_judge() {
        let outcome = TestOutcome::judge(Some(7), "5", "25", &exec(ExecutionOutcome::Success, "25\n"));
        assert!(outcome.passed);
        assert_eq!(outcome.test_case_id, Some(7));
        assert_eq!(outcome.actual_output, "25\n");
        assert_eq!(outcome.verdict.to_string(), "accepted");
    }
}
