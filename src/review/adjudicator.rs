//! Vote adjudication
//!
//! A bug claim is checked by differential testing: the proof input is run
//! against both the reviewed code and the reference solution. The claim
//! holds when the reviewed code misses the expected output and the
//! reference produces it.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ArenaError;
use crate::executor::{CompileError, Executor};
use crate::models::review_vote::VoteKind;
use crate::reference_cache::{ReferenceCache, ReferenceError};
use crate::verdict::Verdict;

/// Counter-example attached to a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofTest {
    pub input: String,
    pub expected_output: String,
}

/// A reviewer's verdict on a peer solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vote {
    ConfirmCorrect,
    ClaimIncorrect(ProofTest),
    Skip,
}

impl Vote {
    pub fn kind(&self) -> VoteKind {
        match self {
            Vote::ConfirmCorrect => VoteKind::Correct,
            Vote::ClaimIncorrect(_) => VoteKind::Incorrect,
            Vote::Skip => VoteKind::Skip,
        }
    }

    pub fn proof(&self) -> Option<&ProofTest> {
        match self {
            Vote::ClaimIncorrect(proof) => Some(proof),
            Vote::ConfirmCorrect | Vote::Skip => None,
        }
    }
}

/// Vote as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub vote: VoteKind,
    #[serde(default)]
    pub proof_test_in: Option<String>,
    #[serde(default)]
    pub proof_test_out: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl TryFrom<&VoteRequest> for Vote {
    type Error = ArenaError;

    fn try_from(request: &VoteRequest) -> Result<Self, Self::Error> {
        match request.vote {
            VoteKind::Correct => Ok(Vote::ConfirmCorrect),
            VoteKind::Skip => Ok(Vote::Skip),
            VoteKind::Incorrect => {
                let input = non_empty(request.proof_test_in.as_deref());
                let expected = non_empty(request.proof_test_out.as_deref());
                match (input, expected) {
                    (Some(input), Some(expected_output)) => Ok(Vote::ClaimIncorrect(ProofTest {
                        input: input.to_string(),
                        expected_output: expected_output.to_string(),
                    })),
                    _ => Err(ArenaError::InvalidRequest(
                        "an 'incorrect' vote needs both proof_test_in and proof_test_out"
                            .to_string(),
                    )),
                }
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Validity decision and the explanation shown to the reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjudication {
    /// None when not adjudicated (skip, or the sandbox was unavailable)
    pub valid: Option<bool>,
    pub message: String,
}

impl Adjudication {
    fn decided(valid: bool, message: impl Into<String>) -> Self {
        Self {
            valid: Some(valid),
            message: message.into(),
        }
    }

    fn pending(message: impl Into<String>) -> Self {
        Self {
            valid: None,
            message: message.into(),
        }
    }

    pub fn skipped() -> Self {
        Self::pending("Review skipped")
    }
}

/// A confirmation is valid when the stored result passed every test.
pub fn adjudicate_confirm(stored_passed: i32, total_tests: u64) -> Adjudication {
    if stored_passed >= 0 && stored_passed as u64 == total_tests {
        Adjudication::decided(true, "Correct: the solution passes every test")
    } else {
        Adjudication::decided(
            false,
            format!(
                "Incorrect: the solution passes only {}/{} tests",
                stored_passed, total_tests
            ),
        )
    }
}

/// Differential test of a bug claim.
pub async fn adjudicate_claim(
    executor: &dyn Executor,
    references: &ReferenceCache,
    time_limit_ms: u32,
    reviewed_code: &str,
    reference_code: &str,
    proof: &ProofTest,
) -> Adjudication {
    let reference = match references.get_or_compile(executor, reference_code).await {
        Ok(reference) => reference,
        Err(ReferenceError::CompileFailed(diagnostics)) => {
            warn!(
                "Reference solution does not compile, claim cannot be validated: {}",
                diagnostics.lines().next().unwrap_or_default()
            );
            return Adjudication::decided(
                false,
                "The reference solution could not be compiled; the claim cannot be validated",
            );
        }
        Err(ReferenceError::System(e)) => {
            return Adjudication::pending(format!("Validation postponed: {}", e));
        }
    };

    let reference_run = executor
        .execute(&reference, &proof.input, time_limit_ms)
        .await;
    if reference_run.is_system_error() {
        return Adjudication::pending(format!(
            "Validation postponed: {}",
            reference_run.stderr
        ));
    }
    let reference_passes = Verdict::of(&reference_run, &proof.expected_output).is_accepted();

    let reviewed_fails = match executor.compile(reviewed_code).await {
        Err(CompileError::Diagnostics(_)) => true,
        Err(CompileError::System(e)) => {
            return Adjudication::pending(format!("Validation postponed: {}", e));
        }
        Ok(artifact) => {
            let run = executor
                .execute(&artifact, &proof.input, time_limit_ms)
                .await;
            if run.is_system_error() {
                return Adjudication::pending(format!("Validation postponed: {}", run.stderr));
            }
            !Verdict::of(&run, &proof.expected_output).is_accepted()
        }
    };

    match (reviewed_fails, reference_passes) {
        (true, true) => Adjudication::decided(
            true,
            "Bug confirmed: the solution fails your test and the reference passes it",
        ),
        (_, false) => Adjudication::decided(
            false,
            "Invalid claim: the reference solution does not produce your expected output",
        ),
        (false, true) => Adjudication::decided(false, "Invalid claim: the solution passes your test"),
    }
}
