//! Submission evaluation
//!
//! Compile once, run every test of the problem setting, then decide under
//! the retention policy whether the attempt replaces the stored best.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::ArenaContext;
use crate::db::is_unique_violation;
use crate::error::{ArenaError, ArenaResult};
use crate::executor::{CompileError, CompiledArtifact};
use crate::models::game_session::SessionPhase;
use crate::models::{
    game_session, participant, problem_instance, solution, solution_test_result, student,
    student_test, test_case,
};
use crate::sandbox::{truncate_capture, SandboxError};
use crate::verdict::TestOutcome;

/// What to do with a new attempt given the stored best.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// No stored solution yet
    Create,
    /// At least as good as the stored best
    Replace,
    /// Worse than the stored best, which stays
    Reject { best: u32 },
}

/// Ties replace the stored solution so a refactor never loses credit.
pub fn decide_retention(previous_best: Option<u32>, new_total: u32) -> Retention {
    match previous_best {
        None => Retention::Create,
        Some(best) if new_total >= best => Retention::Replace,
        Some(best) => Retention::Reject { best },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Accepted,
    Rejected,
    CompileError,
    SystemError,
    PhaseClosed,
    NotAssigned,
}

/// Structured answer to a submission. Only public test results are listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub status: SubmitStatus,
    pub accepted: bool,
    pub tests_passed_public: u32,
    pub tests_passed_total: u32,
    pub public_tests: u32,
    pub total_tests: u32,
    pub all_public_passed: bool,
    pub results: Vec<TestOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
    pub message: String,
}

impl SubmitOutcome {
    fn refused(status: SubmitStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            accepted: false,
            tests_passed_public: 0,
            tests_passed_total: 0,
            public_tests: 0,
            total_tests: 0,
            all_public_passed: false,
            results: Vec::new(),
            compile_error: None,
            message: message.into(),
        }
    }
}

/// Input / expected pair supplied by a student or an instructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomTest {
    pub input: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomTestOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
    pub results: Vec<TestOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
    pub results: Vec<TestOutcome>,
}

/// One graded run over the problem's tests.
struct Evaluation {
    passed_public: u32,
    passed_total: u32,
    public_tests: u32,
    total_tests: u32,
    /// (test case, outcome) in test id order
    outcomes: Vec<(test_case::Model, TestOutcome)>,
}

impl Evaluation {
    fn all_public_passed(&self) -> bool {
        self.passed_public == self.public_tests
    }

    fn all_passed(&self) -> bool {
        self.passed_total == self.total_tests
    }

    fn public_results(&self) -> Vec<TestOutcome> {
        self.outcomes
            .iter()
            .filter(|(tc, _)| tc.is_public())
            .map(|(_, outcome)| outcome.clone())
            .collect()
    }
}

/// Evaluate a submission and apply the retention policy.
pub async fn submit(
    ctx: &ArenaContext,
    student_id: i64,
    problem_instance_id: i64,
    code: &str,
) -> ArenaResult<SubmitOutcome> {
    student::Entity::find_by_id(student_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| ArenaError::not_found("student", student_id))?;
    let instance = problem_instance::Entity::find_by_id(problem_instance_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| ArenaError::not_found("problem instance", problem_instance_id))?;
    let session = game_session::Entity::find_by_id(instance.game_session_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| ArenaError::not_found("game session", instance.game_session_id))?;

    if session.phase != SessionPhase::Submission {
        return Ok(SubmitOutcome::refused(
            SubmitStatus::PhaseClosed,
            "The submission phase of this session is over",
        ));
    }

    let assigned = participant::Entity::find()
        .filter(participant::Column::StudentId.eq(student_id))
        .filter(participant::Column::GameSessionId.eq(session.id))
        .filter(participant::Column::ProblemInstanceId.eq(problem_instance_id))
        .one(&ctx.db)
        .await?;
    if assigned.is_none() {
        return Ok(SubmitOutcome::refused(
            SubmitStatus::NotAssigned,
            "You are not assigned to this problem",
        ));
    }

    let tests = test_case::Entity::find()
        .filter(test_case::Column::ProblemSettingId.eq(instance.problem_setting_id))
        .order_by_asc(test_case::Column::Id)
        .all(&ctx.db)
        .await?;

    let artifact = match ctx.executor.compile(code).await {
        Ok(artifact) => artifact,
        Err(CompileError::Diagnostics(diagnostics)) => {
            info!(
                "Compile error: student={}, instance={}",
                student_id, problem_instance_id
            );
            let mut outcome =
                SubmitOutcome::refused(SubmitStatus::CompileError, "Compilation failed");
            outcome.compile_error = Some(diagnostics);
            return Ok(outcome);
        }
        Err(CompileError::System(e)) => {
            return Ok(SubmitOutcome::refused(
                SubmitStatus::SystemError,
                format!("Evaluation unavailable: {}", e),
            ));
        }
    };

    let evaluation = match run_tests(ctx, &artifact, tests).await {
        Ok(evaluation) => evaluation,
        Err(e) => {
            warn!(
                "Sandbox failure evaluating student={} instance={}: {}",
                student_id, problem_instance_id, e
            );
            return Ok(SubmitOutcome::refused(
                SubmitStatus::SystemError,
                format!("Evaluation unavailable: {}", e),
            ));
        }
    };
    drop(artifact);

    let retained = retain_solution(ctx, student_id, problem_instance_id, code, &evaluation).await?;

    let (status, message) = match retained {
        Ok(()) => (
            SubmitStatus::Accepted,
            format!(
                "Solution saved: {}/{} tests passed",
                evaluation.passed_total, evaluation.total_tests
            ),
        ),
        Err(best) => (
            SubmitStatus::Rejected,
            format!(
                "Passed {}/{} tests, lower than your best of {}/{}; best solution kept",
                evaluation.passed_total, evaluation.total_tests, best, evaluation.total_tests
            ),
        ),
    };

    info!(
        "Submission evaluated: student={}, instance={}, passed={}/{}, status={:?}",
        student_id, problem_instance_id, evaluation.passed_total, evaluation.total_tests, status
    );

    Ok(SubmitOutcome {
        status,
        accepted: status == SubmitStatus::Accepted,
        tests_passed_public: evaluation.passed_public,
        tests_passed_total: evaluation.passed_total,
        public_tests: evaluation.public_tests,
        total_tests: evaluation.total_tests,
        all_public_passed: evaluation.all_public_passed(),
        results: evaluation.public_results(),
        compile_error: None,
        message,
    })
}

async fn run_tests(
    ctx: &ArenaContext,
    artifact: &CompiledArtifact,
    tests: Vec<test_case::Model>,
) -> Result<Evaluation, SandboxError> {
    let mut evaluation = Evaluation {
        passed_public: 0,
        passed_total: 0,
        public_tests: tests.iter().filter(|tc| tc.is_public()).count() as u32,
        total_tests: tests.len() as u32,
        outcomes: Vec::with_capacity(tests.len()),
    };

    for tc in tests {
        let execution = ctx
            .executor
            .execute(artifact, &tc.input, ctx.run_time_limit_ms)
            .await;
        if execution.is_system_error() {
            return Err(SandboxError::Internal(execution.stderr));
        }
        let outcome = TestOutcome::judge(Some(tc.id), &tc.input, &tc.expected_output, &execution);
        if outcome.passed {
            evaluation.passed_total += 1;
            if tc.is_public() {
                evaluation.passed_public += 1;
            }
        }
        evaluation.outcomes.push((tc, outcome));
    }

    Ok(evaluation)
}

/// Persist under the retention policy. `Ok(Err(best))` means rejected.
async fn retain_solution(
    ctx: &ArenaContext,
    student_id: i64,
    problem_instance_id: i64,
    code: &str,
    evaluation: &Evaluation,
) -> ArenaResult<Result<(), u32>> {
    let txn = ctx.db.begin().await?;

    let existing = find_solution(&txn, student_id, problem_instance_id).await?;
    let decision = decide_retention(
        existing.as_ref().map(|s| s.passed_tests.max(0) as u32),
        evaluation.passed_total,
    );

    match write_solution(&txn, decision, student_id, problem_instance_id, code, evaluation).await? {
        Ok(solution_id) => {
            replace_results(&txn, solution_id, evaluation).await?;
            txn.commit().await?;
            Ok(Ok(()))
        }
        Err(best) => {
            txn.rollback().await?;
            Ok(Err(best))
        }
    }
}

/// Apply a retention decision to the solution row. Returns the id written,
/// or the stored best when the attempt lost.
async fn write_solution(
    txn: &DatabaseTransaction,
    decision: Retention,
    student_id: i64,
    problem_instance_id: i64,
    code: &str,
    evaluation: &Evaluation,
) -> ArenaResult<Result<i64, u32>> {
    match decision {
        Retention::Reject { best } => Ok(Err(best)),
        Retention::Replace => {
            replace_if_not_worse(txn, student_id, problem_instance_id, code, evaluation).await
        }
        Retention::Create => {
            let inserted = solution::ActiveModel {
                student_id: Set(student_id),
                problem_instance_id: Set(problem_instance_id),
                code: Set(code.to_string()),
                passed_tests: Set(evaluation.passed_total as i32),
                passed_public_tests: Set(evaluation.passed_public as i32),
                all_passed: Set(evaluation.all_passed()),
                updated_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(txn)
            .await;
            match inserted {
                Ok(model) => Ok(Ok(model.id)),
                // a concurrent first submission won; compete with it instead
                Err(e) if is_unique_violation(&e) => {
                    replace_if_not_worse(txn, student_id, problem_instance_id, code, evaluation)
                        .await
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

/// Swap the per-test rows of a solution for the ones of this evaluation.
async fn replace_results(
    txn: &DatabaseTransaction,
    solution_id: i64,
    evaluation: &Evaluation,
) -> ArenaResult<()> {
    solution_test_result::Entity::delete_many()
        .filter(solution_test_result::Column::SolutionId.eq(solution_id))
        .exec(txn)
        .await?;

    let rows: Vec<solution_test_result::ActiveModel> = evaluation
        .outcomes
        .iter()
        .map(|(tc, outcome)| solution_test_result::ActiveModel {
            solution_id: Set(solution_id),
            test_case_id: Set(tc.id),
            actual_output: Set(truncate_capture(outcome.actual_output.as_bytes())),
            passed: Set(outcome.passed),
            ..Default::default()
        })
        .collect();
    if !rows.is_empty() {
        solution_test_result::Entity::insert_many(rows)
            .exec(txn)
            .await?;
    }
    Ok(())
}

/// Conditional overwrite gated on the freshest stored count.
async fn replace_if_not_worse(
    txn: &DatabaseTransaction,
    student_id: i64,
    problem_instance_id: i64,
    code: &str,
    evaluation: &Evaluation,
) -> ArenaResult<Result<i64, u32>> {
    let new_total = evaluation.passed_total as i32;
    let updated = solution::Entity::update_many()
        .col_expr(solution::Column::Code, Expr::value(code.to_string()))
        .col_expr(solution::Column::PassedTests, Expr::value(new_total))
        .col_expr(
            solution::Column::PassedPublicTests,
            Expr::value(evaluation.passed_public as i32),
        )
        .col_expr(solution::Column::AllPassed, Expr::value(evaluation.all_passed()))
        .col_expr(solution::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(solution::Column::StudentId.eq(student_id))
        .filter(solution::Column::ProblemInstanceId.eq(problem_instance_id))
        .filter(solution::Column::PassedTests.lte(new_total))
        .exec(txn)
        .await?;

    let current = find_solution(txn, student_id, problem_instance_id)
        .await?
        .ok_or_else(|| ArenaError::not_found("solution", problem_instance_id))?;

    if updated.rows_affected == 0 {
        Ok(Err(current.passed_tests.max(0) as u32))
    } else {
        Ok(Ok(current.id))
    }
}

async fn find_solution<C: sea_orm::ConnectionTrait>(
    conn: &C,
    student_id: i64,
    problem_instance_id: i64,
) -> ArenaResult<Option<solution::Model>> {
    Ok(solution::Entity::find()
        .filter(solution::Column::StudentId.eq(student_id))
        .filter(solution::Column::ProblemInstanceId.eq(problem_instance_id))
        .one(conn)
        .await?)
}

/// Run arbitrary tests against a student's code. Nothing is persisted.
pub async fn run_custom_test(
    ctx: &ArenaContext,
    student_id: i64,
    code: &str,
    tests: &[CustomTest],
) -> ArenaResult<CustomTestOutcome> {
    let artifact = match ctx.executor.compile(code).await {
        Ok(artifact) => artifact,
        Err(CompileError::Diagnostics(diagnostics)) => {
            return Ok(CustomTestOutcome {
                compile_error: Some(diagnostics),
                results: Vec::new(),
            });
        }
        Err(CompileError::System(e)) => return Err(e.into()),
    };

    let results = run_custom(ctx, &artifact, tests).await?;
    info!(
        "Custom test run: student={}, tests={}, passed={}",
        student_id,
        results.len(),
        results.iter().filter(|r| r.passed).count()
    );
    Ok(CustomTestOutcome {
        compile_error: None,
        results,
    })
}

/// Check a reference solution against a set of tests before publishing it.
pub async fn verify_reference(
    ctx: &ArenaContext,
    reference_code: &str,
    tests: &[CustomTest],
) -> ArenaResult<VerifyOutcome> {
    let artifact = match ctx.executor.compile(reference_code).await {
        Ok(artifact) => artifact,
        Err(CompileError::Diagnostics(diagnostics)) => {
            return Ok(VerifyOutcome {
                success: false,
                message: "Reference solution does not compile".to_string(),
                compile_error: Some(diagnostics),
                results: Vec::new(),
            });
        }
        Err(CompileError::System(e)) => return Err(e.into()),
    };

    let results = run_custom(ctx, &artifact, tests).await?;
    let passed = results.iter().filter(|r| r.passed).count();
    let success = passed == results.len();
    let message = if success {
        format!("Reference passes all {} tests", results.len())
    } else {
        format!("Reference passes {}/{} tests", passed, results.len())
    };

    Ok(VerifyOutcome {
        success,
        message,
        compile_error: None,
        results,
    })
}

async fn run_custom(
    ctx: &ArenaContext,
    artifact: &CompiledArtifact,
    tests: &[CustomTest],
) -> ArenaResult<Vec<TestOutcome>> {
    let mut results = Vec::with_capacity(tests.len());
    for test in tests {
        let execution = ctx
            .executor
            .execute(artifact, &test.input, ctx.run_time_limit_ms)
            .await;
        if execution.is_system_error() {
            return Err(SandboxError::Internal(execution.stderr).into());
        }
        results.push(TestOutcome::judge(
            None,
            &test.input,
            &test.expected_output,
            &execution,
        ));
    }
    Ok(results)
}

/// Save a student's own test for the instance they are assigned to.
pub async fn add_student_test(
    ctx: &ArenaContext,
    student_id: i64,
    problem_instance_id: i64,
    test: CustomTest,
) -> ArenaResult<student_test::Model> {
    if test.expected_output.trim().is_empty() {
        return Err(ArenaError::InvalidRequest(
            "expected output must not be empty".to_string(),
        ));
    }
    let assigned = participant::Entity::find()
        .filter(participant::Column::StudentId.eq(student_id))
        .filter(participant::Column::ProblemInstanceId.eq(problem_instance_id))
        .one(&ctx.db)
        .await?;
    if assigned.is_none() {
        return Err(ArenaError::InvalidRequest(format!(
            "student {} is not assigned to problem instance {}",
            student_id, problem_instance_id
        )));
    }

    let saved = student_test::ActiveModel {
        student_id: Set(student_id),
        problem_instance_id: Set(problem_instance_id),
        input: Set(test.input),
        expected_output: Set(test.expected_output),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&ctx.db)
    .await?;
    Ok(saved)
}

pub async fn list_student_tests(
    ctx: &ArenaContext,
    student_id: i64,
    problem_instance_id: i64,
) -> ArenaResult<Vec<student_test::Model>> {
    Ok(student_test::Entity::find()
        .filter(student_test::Column::StudentId.eq(student_id))
        .filter(student_test::Column::ProblemInstanceId.eq(problem_instance_id))
        .order_by_asc(student_test::Column::Id)
        .all(&ctx.db)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Execution, ExecutionOutcome};
    use crate::testing::{seed_square_session, set_phase, Fixture, ScriptedExecutor};
    use sea_orm::PaginatorTrait;

    async fn stored(ctx: &ArenaContext, student_id: i64, instance_id: i64) -> solution::Model {
        find_solution(&ctx.db, student_id, instance_id)
            .await
            .unwrap()
            .unwrap()
    }

    /// Grade the fixture's tests so that exactly the first `passed` succeed.
    async fn evaluation(ctx: &ArenaContext, fx: &Fixture, passed: u32) -> Evaluation {
        let tests = test_case::Entity::find()
            .filter(test_case::Column::Id.is_in(fx.test_ids.clone()))
            .order_by_asc(test_case::Column::Id)
            .all(&ctx.db)
            .await
            .unwrap();
        let outcomes = tests
            .into_iter()
            .enumerate()
            .map(|(i, tc)| {
                let stdout = if (i as u32) < passed {
                    tc.expected_output.clone()
                } else {
                    "wrong".to_string()
                };
                let execution = Execution {
                    stdout,
                    stderr: String::new(),
                    exit_code: 0,
                    outcome: ExecutionOutcome::Success,
                };
                let outcome =
                    TestOutcome::judge(Some(tc.id), &tc.input, &tc.expected_output, &execution);
                (tc, outcome)
            })
            .collect();
        Evaluation {
            passed_public: passed.min(2),
            passed_total: passed,
            public_tests: 2,
            total_tests: 5,
            outcomes,
        }
    }

    #[test]
    fn test_decide_retention() {
        assert_eq!(decide_retention(None, 0), Retention::Create);
        assert_eq!(decide_retention(Some(3), 5), Retention::Replace);
        assert_eq!(decide_retention(Some(3), 3), Retention::Replace);
        assert_eq!(decide_retention(Some(3), 2), Retention::Reject { best: 3 });
    }

    #[tokio::test]
    async fn test_first_submission_creates_solution() {
        let ctx = ArenaContext::for_tests().await;
        let fx = seed_square_session(&ctx.db, &["ada"], 100, 2).await;

        let outcome = submit(&ctx, fx.students[0], fx.instance_id, "double")
            .await
            .unwrap();
        assert_eq!(outcome.status, SubmitStatus::Accepted);
        assert_eq!(outcome.tests_passed_public, 2);
        assert_eq!(outcome.tests_passed_total, 2);
        assert!(outcome.all_public_passed);
        // private results stay hidden
        assert_eq!(outcome.results.len(), 2);

        let solution = stored(&ctx, fx.students[0], fx.instance_id).await;
        assert_eq!(solution.passed_tests, 2);
        assert!(!solution.all_passed);
        let rows = solution_test_result::Entity::find()
            .filter(solution_test_result::Column::SolutionId.eq(solution.id))
            .count(&ctx.db)
            .await
            .unwrap();
        assert_eq!(rows, 5);
    }

    #[tokio::test]
    async fn test_worse_submission_rejected_better_replaces() {
        let ctx = ArenaContext::for_tests().await;
        let fx = seed_square_session(&ctx.db, &["ada"], 100, 2).await;
        let ada = fx.students[0];

        submit(&ctx, ada, fx.instance_id, "double").await.unwrap();

        let worse = submit(&ctx, ada, fx.instance_id, "echo").await.unwrap();
        assert_eq!(worse.status, SubmitStatus::Rejected);
        assert!(!worse.accepted);
        assert!(worse.message.contains("lower than your best of 2/5"));
        assert_eq!(stored(&ctx, ada, fx.instance_id).await.code, "double");

        let better = submit(&ctx, ada, fx.instance_id, "square").await.unwrap();
        assert_eq!(better.status, SubmitStatus::Accepted);
        let solution = stored(&ctx, ada, fx.instance_id).await;
        assert_eq!(solution.passed_tests, 5);
        assert!(solution.all_passed);
        assert_eq!(solution.code, "square");

        let results = solution_test_result::Entity::find()
            .filter(solution_test_result::Column::SolutionId.eq(solution.id))
            .all(&ctx.db)
            .await
            .unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.passed));
    }

    #[tokio::test]
    async fn test_create_falls_back_to_conditional_replace() {
        let ctx = ArenaContext::for_tests().await;
        let fx = seed_square_session(&ctx.db, &["ada"], 100, 2).await;
        let ada = fx.students[0];

        submit(&ctx, ada, fx.instance_id, "double").await.unwrap();
        let existing = stored(&ctx, ada, fx.instance_id).await;

        // a racing first submission decided Create before the row appeared
        let better = evaluation(&ctx, &fx, 5).await;
        let txn = ctx.db.begin().await.unwrap();
        let written = write_solution(&txn, Retention::Create, ada, fx.instance_id, "square", &better)
            .await
            .unwrap();
        assert_eq!(written, Ok(existing.id));
        replace_results(&txn, existing.id, &better).await.unwrap();
        txn.commit().await.unwrap();

        let solution = stored(&ctx, ada, fx.instance_id).await;
        assert_eq!(solution.code, "square");
        assert_eq!(solution.passed_tests, 5);
        assert!(solution.all_passed);

        let weaker = evaluation(&ctx, &fx, 3).await;
        let txn = ctx.db.begin().await.unwrap();
        let written = write_solution(&txn, Retention::Create, ada, fx.instance_id, "echo", &weaker)
            .await
            .unwrap();
        assert_eq!(written, Err(5));
        txn.rollback().await.unwrap();

        let count = solution::Entity::find().count(&ctx.db).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(stored(&ctx, ada, fx.instance_id).await.code, "square");
    }

    #[tokio::test]
    async fn test_replace_rechecks_freshest_count() {
        let ctx = ArenaContext::for_tests().await;
        let fx = seed_square_session(&ctx.db, &["ada"], 100, 2).await;
        let ada = fx.students[0];

        submit(&ctx, ada, fx.instance_id, "double").await.unwrap();
        let existing = stored(&ctx, ada, fx.instance_id).await;
        let results_before = solution_test_result::Entity::find()
            .filter(solution_test_result::Column::SolutionId.eq(existing.id))
            .order_by_asc(solution_test_result::Column::TestCaseId)
            .all(&ctx.db)
            .await
            .unwrap();

        // another submission landed 4/5 after this one read the stored best
        solution::ActiveModel {
            id: Set(existing.id),
            passed_tests: Set(4),
            ..Default::default()
        }
        .update(&ctx.db)
        .await
        .unwrap();

        let stale = evaluation(&ctx, &fx, 3).await;
        let txn = ctx.db.begin().await.unwrap();
        let replaced = replace_if_not_worse(&txn, ada, fx.instance_id, "cube", &stale)
            .await
            .unwrap();
        assert_eq!(replaced, Err(4));
        txn.rollback().await.unwrap();

        let solution = stored(&ctx, ada, fx.instance_id).await;
        assert_eq!(solution.code, "double");
        assert_eq!(solution.passed_tests, 4);

        let results_after = solution_test_result::Entity::find()
            .filter(solution_test_result::Column::SolutionId.eq(existing.id))
            .order_by_asc(solution_test_result::Column::TestCaseId)
            .all(&ctx.db)
            .await
            .unwrap();
        assert_eq!(results_after, results_before);
        let ids: Vec<i64> = results_after.iter().map(|r| r.test_case_id).collect();
        assert_eq!(ids, fx.test_ids);
    }

    #[tokio::test]
    async fn test_tie_replaces_code() {
        let ctx = ArenaContext::for_tests().await;
        let fx = seed_square_session(&ctx.db, &["ada"], 100, 2).await;
        let ada = fx.students[0];

        submit(&ctx, ada, fx.instance_id, "square").await.unwrap();
        let again = submit(&ctx, ada, fx.instance_id, " square ").await.unwrap();
        assert_eq!(again.status, SubmitStatus::Accepted);
        assert_eq!(stored(&ctx, ada, fx.instance_id).await.code, " square ");
    }

    #[tokio::test]
    async fn test_compile_error_keeps_best() {
        let ctx = ArenaContext::for_tests().await;
        let fx = seed_square_session(&ctx.db, &["ada"], 100, 2).await;
        let ada = fx.students[0];

        submit(&ctx, ada, fx.instance_id, "square").await.unwrap();
        let outcome = submit(&ctx, ada, fx.instance_id, "broken").await.unwrap();
        assert_eq!(outcome.status, SubmitStatus::CompileError);
        assert!(outcome.compile_error.unwrap().contains("error"));
        assert_eq!(stored(&ctx, ada, fx.instance_id).await.passed_tests, 5);
    }

    #[tokio::test]
    async fn test_runtime_errors_and_timeouts_count_as_failed() {
        let ctx = ArenaContext::for_tests().await;
        let fx = seed_square_session(&ctx.db, &["ada", "bob"], 100, 2).await;

        let crash = submit(&ctx, fx.students[0], fx.instance_id, "fail").await.unwrap();
        assert_eq!(crash.status, SubmitStatus::Accepted);
        assert_eq!(crash.tests_passed_total, 0);

        let hang = submit(&ctx, fx.students[1], fx.instance_id, "hang").await.unwrap();
        assert_eq!(hang.tests_passed_total, 0);
        assert_eq!(
            hang.results[0].verdict,
            crate::verdict::Verdict::TimeLimitExceeded
        );
    }

    #[tokio::test]
    async fn test_system_error_persists_nothing() {
        let ctx = ArenaContext::with_executor(ScriptedExecutor::unavailable()).await;
        let fx = seed_square_session(&ctx.db, &["ada"], 100, 2).await;

        let outcome = submit(&ctx, fx.students[0], fx.instance_id, "square")
            .await
            .unwrap();
        assert_eq!(outcome.status, SubmitStatus::SystemError);
        assert!(find_solution(&ctx.db, fx.students[0], fx.instance_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_submission_refused_outside_phase_or_assignment() {
        let ctx = ArenaContext::for_tests().await;
        let fx = seed_square_session(&ctx.db, &["ada"], 100, 2).await;
        let outsider = crate::testing::add_student(&ctx.db, "eve").await;

        let outcome = submit(&ctx, outsider, fx.instance_id, "square").await.unwrap();
        assert_eq!(outcome.status, SubmitStatus::NotAssigned);

        set_phase(&ctx.db, fx.session_id, SessionPhase::Review).await;
        let outcome = submit(&ctx, fx.students[0], fx.instance_id, "square")
            .await
            .unwrap();
        assert_eq!(outcome.status, SubmitStatus::PhaseClosed);

        let err = submit(&ctx, 999, fx.instance_id, "square").await.unwrap_err();
        assert!(matches!(err, ArenaError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_custom_tests_and_saved_tests() {
        let ctx = ArenaContext::for_tests().await;
        let fx = seed_square_session(&ctx.db, &["ada"], 100, 2).await;
        let ada = fx.students[0];

        add_student_test(
            &ctx,
            ada,
            fx.instance_id,
            CustomTest {
                input: "4".into(),
                expected_output: "16".into(),
            },
        )
        .await
        .unwrap();
        let saved = list_student_tests(&ctx, ada, fx.instance_id).await.unwrap();
        assert_eq!(saved.len(), 1);

        let tests: Vec<CustomTest> = saved
            .into_iter()
            .map(|t| CustomTest {
                input: t.input,
                expected_output: t.expected_output,
            })
            .collect();
        let outcome = run_custom_test(&ctx, ada, "double", &tests).await.unwrap();
        assert!(outcome.compile_error.is_none());
        assert!(!outcome.results[0].passed);
        assert_eq!(outcome.results[0].actual_output.trim(), "8");

        let outcome = run_custom_test(&ctx, ada, "broken", &tests).await.unwrap();
        assert!(outcome.compile_error.is_some());

        // never persisted as a solution
        assert!(find_solution(&ctx.db, ada, fx.instance_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_add_student_test_validation() {
        let ctx = ArenaContext::for_tests().await;
        let fx = seed_square_session(&ctx.db, &["ada"], 100, 2).await;
        let outsider = crate::testing::add_student(&ctx.db, "eve").await;
        let test = CustomTest {
            input: "1".into(),
            expected_output: "1".into(),
        };

        let err = add_student_test(&ctx, outsider, fx.instance_id, test.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::InvalidRequest(_)));

        let err = add_student_test(
            &ctx,
            fx.students[0],
            fx.instance_id,
            CustomTest {
                input: "1".into(),
                expected_output: " ".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ArenaError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_verify_reference() {
        let ctx = ArenaContext::for_tests().await;
        let tests = vec![
            CustomTest {
                input: "3".into(),
                expected_output: "9".into(),
            },
            CustomTest {
                input: "2".into(),
                expected_output: "4".into(),
            },
        ];

        let ok = verify_reference(&ctx, "square", &tests).await.unwrap();
        assert!(ok.success);

        let partial = verify_reference(&ctx, "double", &tests).await.unwrap();
        assert!(!partial.success);
        assert_eq!(partial.message, "Reference passes 1/2 tests");

        let broken = verify_reference(&ctx, "broken", &tests).await.unwrap();
        assert!(!broken.success);
        assert!(broken.compile_error.is_some());
    }
}
