//! Review module - peer review phase
//!
//! - `allocator`: who reviews which solution (pure planning)
//! - `adjudicator`: whether a vote is valid (differential testing)
//!
//! This file wires both to the database: lazy assignment creation, the
//! reviewer's view of their queue, and the vote upsert.

pub mod adjudicator;
pub mod allocator;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::ArenaContext;
use crate::db::is_unique_violation;
use crate::error::{ArenaError, ArenaResult};
use crate::models::game_session::SessionPhase;
use crate::models::review_vote::VoteKind;
use crate::models::{
    game_session, problem_instance, problem_setting, review_assignment, review_vote, solution,
    test_case,
};

pub use adjudicator::{adjudicate_claim, adjudicate_confirm, Adjudication, ProofTest, Vote, VoteRequest};
pub use allocator::{plan_assignments, PlannedReview, SolutionRef};

/// The reviewer's current vote, as shown back to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteView {
    pub vote: VoteKind,
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_test_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_test_out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<review_vote::Model> for VoteView {
    fn from(vote: review_vote::Model) -> Self {
        Self {
            vote: vote.kind,
            valid: vote.valid,
            proof_test_in: vote.proof_test_in,
            proof_test_out: vote.proof_test_out,
            note: vote.note,
        }
    }
}

/// One entry of a reviewer's queue. The author stays anonymous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedReview {
    pub assignment_id: i64,
    pub handle: String,
    pub problem_instance_id: i64,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_vote: Option<VoteView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    Recorded,
    Rejected,
    SessionClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub status: VoteStatus,
    pub valid: Option<bool>,
    pub message: String,
}

pub fn anonymized_handle(solution_id: i64) -> String {
    format!("Candidate #{}", solution_id)
}

/// Create missing review assignments for a session. Returns how many were new.
///
/// Does nothing while the session still accepts submissions. Safe to call
/// repeatedly: existing (reviewer, solution) pairs are skipped.
pub async fn ensure_reviews_assigned(ctx: &ArenaContext, game_session_id: i64) -> ArenaResult<u64> {
    let session = game_session::Entity::find_by_id(game_session_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| ArenaError::not_found("game session", game_session_id))?;
    if session.phase == SessionPhase::Submission {
        return Ok(0);
    }

    let instances = problem_instance::Entity::find()
        .filter(problem_instance::Column::GameSessionId.eq(game_session_id))
        .order_by_asc(problem_instance::Column::Id)
        .all(&ctx.db)
        .await?;

    let mut created = 0u64;
    for instance in instances {
        let solutions: Vec<SolutionRef> = solution::Entity::find()
            .filter(solution::Column::ProblemInstanceId.eq(instance.id))
            .order_by_asc(solution::Column::Id)
            .all(&ctx.db)
            .await?
            .into_iter()
            .map(|s| SolutionRef {
                solution_id: s.id,
                student_id: s.student_id,
            })
            .collect();

        if solutions.len() < 2 {
            debug!(
                "Instance {} has {} solution(s), no reviews assigned",
                instance.id,
                solutions.len()
            );
            continue;
        }

        let plan = plan_assignments(&solutions, instance.review_quota());
        created += insert_assignments(&ctx.db, instance.id, &plan).await?;
    }

    if created > 0 {
        info!(
            "Assigned {} reviews for game session {}",
            created, game_session_id
        );
    }
    Ok(created)
}

/// Insert planned (reviewer, solution) pairs, skipping ones already stored.
async fn insert_assignments(
    db: &DatabaseConnection,
    problem_instance_id: i64,
    plan: &[PlannedReview],
) -> ArenaResult<u64> {
    let mut created = 0u64;
    for &(reviewer_id, solution_id) in plan {
        let inserted = review_assignment::ActiveModel {
            reviewer_id: Set(reviewer_id),
            solution_id: Set(solution_id),
            problem_instance_id: Set(problem_instance_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await;
        match inserted {
            Ok(_) => created += 1,
            Err(e) if is_unique_violation(&e) => {
                debug!(
                    "Assignment reviewer={} solution={} already present",
                    reviewer_id, solution_id
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(created)
}

/// The reviewer's queue for a session, creating assignments on first access.
pub async fn list_assigned_reviews(
    ctx: &ArenaContext,
    student_id: i64,
    game_session_id: i64,
) -> ArenaResult<Vec<AssignedReview>> {
    ensure_reviews_assigned(ctx, game_session_id).await?;

    let instance_ids: Vec<i64> = problem_instance::Entity::find()
        .filter(problem_instance::Column::GameSessionId.eq(game_session_id))
        .all(&ctx.db)
        .await?
        .into_iter()
        .map(|i| i.id)
        .collect();

    let assignments = review_assignment::Entity::find()
        .filter(review_assignment::Column::ReviewerId.eq(student_id))
        .filter(review_assignment::Column::ProblemInstanceId.is_in(instance_ids))
        .order_by_asc(review_assignment::Column::Id)
        .find_also_related(solution::Entity)
        .all(&ctx.db)
        .await?;

    let mut reviews = Vec::with_capacity(assignments.len());
    for (assignment, reviewed) in assignments {
        let Some(reviewed) = reviewed else {
            warn!(
                "Assignment {} points at missing solution {}",
                assignment.id, assignment.solution_id
            );
            continue;
        };
        let current_vote = review_vote::Entity::find()
            .filter(review_vote::Column::AssignmentId.eq(assignment.id))
            .one(&ctx.db)
            .await?
            .map(VoteView::from);
        reviews.push(AssignedReview {
            assignment_id: assignment.id,
            handle: anonymized_handle(reviewed.id),
            problem_instance_id: assignment.problem_instance_id,
            code: reviewed.code,
            current_vote,
        });
    }
    Ok(reviews)
}

/// Record (or replace) the vote on an assignment and adjudicate it afresh.
pub async fn cast_vote(
    ctx: &ArenaContext,
    assignment_id: i64,
    request: &VoteRequest,
) -> ArenaResult<VoteOutcome> {
    let assignment = review_assignment::Entity::find_by_id(assignment_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| ArenaError::not_found("review assignment", assignment_id))?;
    let reviewed = solution::Entity::find_by_id(assignment.solution_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| ArenaError::not_found("solution", assignment.solution_id))?;
    let instance = problem_instance::Entity::find_by_id(assignment.problem_instance_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| ArenaError::not_found("problem instance", assignment.problem_instance_id))?;
    let session = game_session::Entity::find_by_id(instance.game_session_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| ArenaError::not_found("game session", instance.game_session_id))?;

    if session.phase == SessionPhase::Closed {
        return Ok(VoteOutcome {
            status: VoteStatus::SessionClosed,
            valid: None,
            message: "The session is closed; votes can no longer change".to_string(),
        });
    }

    let vote = match Vote::try_from(request) {
        Ok(vote) => vote,
        Err(e) => {
            return Ok(VoteOutcome {
                status: VoteStatus::Rejected,
                valid: None,
                message: e.to_string(),
            });
        }
    };

    let adjudication = match &vote {
        Vote::Skip => Adjudication::skipped(),
        Vote::ConfirmCorrect => {
            let total_tests = test_case::Entity::find()
                .filter(test_case::Column::ProblemSettingId.eq(instance.problem_setting_id))
                .count(&ctx.db)
                .await?;
            adjudicate_confirm(reviewed.passed_tests, total_tests)
        }
        Vote::ClaimIncorrect(proof) => {
            let setting = problem_setting::Entity::find_by_id(instance.problem_setting_id)
                .one(&ctx.db)
                .await?
                .ok_or_else(|| {
                    ArenaError::not_found("problem setting", instance.problem_setting_id)
                })?;
            let adjudication = adjudicate_claim(
                ctx.executor.as_ref(),
                &ctx.references,
                ctx.run_time_limit_ms,
                &reviewed.code,
                &setting.reference_solution,
                proof,
            )
            .await;
            if adjudication.valid.is_none() {
                warn!(
                    "Claim on assignment {} stored unadjudicated: {}",
                    assignment_id, adjudication.message
                );
            }
            adjudication
        }
    };

    store_vote(ctx, assignment_id, &vote, request.note.clone(), adjudication.valid).await?;

    info!(
        "Vote recorded: assignment={}, kind={:?}, valid={:?}",
        assignment_id,
        vote.kind(),
        adjudication.valid
    );

    Ok(VoteOutcome {
        status: VoteStatus::Recorded,
        valid: adjudication.valid,
        message: adjudication.message,
    })
}

async fn store_vote(
    ctx: &ArenaContext,
    assignment_id: i64,
    vote: &Vote,
    note: Option<String>,
    valid: Option<bool>,
) -> ArenaResult<()> {
    let proof = vote.proof();
    let fill = |mut model: review_vote::ActiveModel| {
        model.kind = Set(vote.kind());
        model.proof_test_in = Set(proof.map(|p| p.input.clone()));
        model.proof_test_out = Set(proof.map(|p| p.expected_output.clone()));
        model.valid = Set(valid);
        model.note = Set(note.clone());
        model.updated_at = Set(Utc::now());
        model
    };

    let existing = review_vote::Entity::find()
        .filter(review_vote::Column::AssignmentId.eq(assignment_id))
        .one(&ctx.db)
        .await?;
    if let Some(existing) = existing {
        fill(existing.into()).update(&ctx.db).await?;
        return Ok(());
    }

    let fresh = fill(review_vote::ActiveModel {
        assignment_id: Set(assignment_id),
        ..Default::default()
    });
    match fresh.insert(&ctx.db).await {
        Ok(_) => Ok(()),
        // the same reviewer voted twice at once; the later write wins
        Err(e) if is_unique_violation(&e) => {
            let existing = review_vote::Entity::find()
                .filter(review_vote::Column::AssignmentId.eq(assignment_id))
                .one(&ctx.db)
                .await?
                .ok_or_else(|| ArenaError::not_found("review vote", assignment_id))?;
            fill(existing.into()).update(&ctx.db).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
