//! Worker jobs
//!
//! Every request arrives as a tagged JSON object on the queue and produces
//! exactly one [`JobResult`], including when the operation fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::badges::{evaluate_badges, list_student_badges};
use crate::context::ArenaContext;
use crate::error::{ArenaError, ArenaResult};
use crate::evaluator::{
    add_student_test, list_student_tests, run_custom_test, submit, verify_reference, CustomTest,
};
use crate::review::{cast_vote, ensure_reviews_assigned, list_assigned_reviews, VoteRequest};
use crate::scoring::get_leaderboard;

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJob {
    pub request_id: String,
    pub student_id: i64,
    pub problem_instance_id: i64,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomTestJob {
    pub request_id: String,
    pub student_id: i64,
    pub code: String,
    #[serde(default)]
    pub tests: Vec<CustomTest>,
    /// Also replay the student's saved tests for this instance
    #[serde(default)]
    pub problem_instance_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReferenceJob {
    pub request_id: String,
    pub reference_code: String,
    pub tests: Vec<CustomTest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentTestJob {
    pub request_id: String,
    pub student_id: i64,
    pub problem_instance_id: i64,
    pub input: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListStudentTestsJob {
    pub request_id: String,
    pub student_id: i64,
    pub problem_instance_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionJob {
    pub request_id: String,
    pub game_session_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListReviewsJob {
    pub request_id: String,
    pub student_id: i64,
    pub game_session_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastVoteJob {
    pub request_id: String,
    pub assignment_id: i64,
    #[serde(flatten)]
    pub vote: VoteRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardJob {
    pub request_id: String,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default)]
    pub student_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentBadgesJob {
    pub request_id: String,
    pub student_id: i64,
}

/// Worker job enum - one variant per exposed operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum WorkerJob {
    Submit(SubmitJob),
    CustomTest(CustomTestJob),
    VerifyReference(VerifyReferenceJob),
    AddStudentTest(StudentTestJob),
    ListStudentTests(ListStudentTestsJob),
    AssignReviews(SessionJob),
    ListReviews(ListReviewsJob),
    CastVote(CastVoteJob),
    Leaderboard(LeaderboardJob),
    EvaluateBadges(SessionJob),
    ListBadges(StudentBadgesJob),
}

impl WorkerJob {
    pub fn request_id(&self) -> &str {
        match self {
            WorkerJob::Submit(j) => &j.request_id,
            WorkerJob::CustomTest(j) => &j.request_id,
            WorkerJob::VerifyReference(j) => &j.request_id,
            WorkerJob::AddStudentTest(j) => &j.request_id,
            WorkerJob::ListStudentTests(j) => &j.request_id,
            WorkerJob::AssignReviews(j) | WorkerJob::EvaluateBadges(j) => &j.request_id,
            WorkerJob::ListReviews(j) => &j.request_id,
            WorkerJob::CastVote(j) => &j.request_id,
            WorkerJob::Leaderboard(j) => &j.request_id,
            WorkerJob::ListBadges(j) => &j.request_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkerJob::Submit(_) => "submit",
            WorkerJob::CustomTest(_) => "custom_test",
            WorkerJob::VerifyReference(_) => "verify_reference",
            WorkerJob::AddStudentTest(_) => "add_student_test",
            WorkerJob::ListStudentTests(_) => "list_student_tests",
            WorkerJob::AssignReviews(_) => "assign_reviews",
            WorkerJob::ListReviews(_) => "list_reviews",
            WorkerJob::CastVote(_) => "cast_vote",
            WorkerJob::Leaderboard(_) => "leaderboard",
            WorkerJob::EvaluateBadges(_) => "evaluate_badges",
            WorkerJob::ListBadges(_) => "list_badges",
        }
    }
}

/// Result stored under `arena:result:{request_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub request_id: String,
    /// "ok", or the error class when the operation failed
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl JobResult {
    fn ok(request_id: &str, data: Value) -> Self {
        Self {
            request_id: request_id.to_string(),
            status: "ok".to_string(),
            message: None,
            data,
        }
    }

    pub fn failed(request_id: &str, status: &str, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.to_string(),
            status: status.to_string(),
            message: Some(message.into()),
            data: Value::Null,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

fn to_value<T: Serialize>(value: &T) -> ArenaResult<Value> {
    serde_json::to_value(value).map_err(|e| ArenaError::InvalidRequest(e.to_string()))
}

async fn run(ctx: &ArenaContext, job: &WorkerJob) -> ArenaResult<Value> {
    match job {
        WorkerJob::Submit(j) => {
            let outcome = submit(ctx, j.student_id, j.problem_instance_id, &j.code).await?;
            to_value(&outcome)
        }
        WorkerJob::CustomTest(j) => {
            let mut tests = j.tests.clone();
            if let Some(instance_id) = j.problem_instance_id {
                let saved = list_student_tests(ctx, j.student_id, instance_id).await?;
                tests.extend(saved.into_iter().map(|t| CustomTest {
                    input: t.input,
                    expected_output: t.expected_output,
                }));
            }
            let outcome = run_custom_test(ctx, j.student_id, &j.code, &tests).await?;
            to_value(&outcome)
        }
        WorkerJob::VerifyReference(j) => {
            let outcome = verify_reference(ctx, &j.reference_code, &j.tests).await?;
            to_value(&outcome)
        }
        WorkerJob::AddStudentTest(j) => {
            let test = CustomTest {
                input: j.input.clone(),
                expected_output: j.expected_output.clone(),
            };
            let saved = add_student_test(ctx, j.student_id, j.problem_instance_id, test).await?;
            to_value(&saved)
        }
        WorkerJob::ListStudentTests(j) => {
            let tests = list_student_tests(ctx, j.student_id, j.problem_instance_id).await?;
            to_value(&tests)
        }
        WorkerJob::AssignReviews(j) => {
            let created = ensure_reviews_assigned(ctx, j.game_session_id).await?;
            Ok(serde_json::json!({ "created": created }))
        }
        WorkerJob::ListReviews(j) => {
            let reviews = list_assigned_reviews(ctx, j.student_id, j.game_session_id).await?;
            to_value(&reviews)
        }
        WorkerJob::CastVote(j) => {
            let outcome = cast_vote(ctx, j.assignment_id, &j.vote).await?;
            to_value(&outcome)
        }
        WorkerJob::Leaderboard(j) => {
            let board = get_leaderboard(ctx, j.page, j.page_size, j.student_id).await?;
            to_value(&board)
        }
        WorkerJob::EvaluateBadges(j) => {
            let awarded = evaluate_badges(ctx, j.game_session_id).await?;
            Ok(serde_json::json!({ "awarded": awarded }))
        }
        WorkerJob::ListBadges(j) => {
            let badges = list_student_badges(ctx, j.student_id).await?;
            to_value(&badges)
        }
    }
}

/// Run one job to completion. Never fails: errors become a result too.
pub async fn dispatch(ctx: &ArenaContext, job: &WorkerJob) -> JobResult {
    let request_id = job.request_id();
    info!("Received {} job: request_id={}", job.kind(), request_id);

    match run(ctx, job).await {
        Ok(data) => {
            info!("{} job completed: request_id={}", job.kind(), request_id);
            JobResult::ok(request_id, data)
        }
        Err(e) => {
            error!(
                "Failed to process {} job {}: {}",
                job.kind(),
                request_id,
                e
            );
            JobResult::failed(request_id, e.status(), e.to_string())
        }
    }
}
