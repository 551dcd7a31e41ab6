//! Badge catalog and award evaluation
//!
//! The rule table is a pure function from a student's counters to the set
//! of badges they qualify for. Awards are append-only: a student holds a
//! badge at most once, and a concurrent duplicate insert is a no-op.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::ArenaContext;
use crate::db::is_unique_violation;
use crate::error::{ArenaError, ArenaResult};
use crate::models::badge::BadgeCriteria;
use crate::models::review_vote::VoteKind;
use crate::models::{
    badge, game_session, participant, problem_instance, review_assignment, review_vote, solution,
    student, student_badge,
};
use crate::scoring;

pub struct BadgeDef {
    pub name: &'static str,
    pub description: &'static str,
    pub criteria: BadgeCriteria,
    pub threshold: i32,
}

const fn def(
    name: &'static str,
    description: &'static str,
    criteria: BadgeCriteria,
    threshold: i32,
) -> BadgeDef {
    BadgeDef {
        name,
        description,
        criteria,
        threshold,
    }
}

pub const CATALOG: &[BadgeDef] = &[
    def("Champion", "Finish first on the leaderboard", BadgeCriteria::Rank, 1),
    def("Podium Master", "Finish in the top 3", BadgeCriteria::Rank, 3),
    def("Elite Performer", "Finish in the top 5", BadgeCriteria::Rank, 5),
    def("Rising Star", "Finish in the top 10", BadgeCriteria::Rank, 10),
    def("Bug Hunter", "Prove 5 peer solutions wrong", BadgeCriteria::ValidClaims, 5),
    def("Bug Tracker", "Prove 10 peer solutions wrong", BadgeCriteria::ValidClaims, 10),
    def("Bug Slayer", "Prove 20 peer solutions wrong", BadgeCriteria::ValidClaims, 20),
    def("Bug Exterminator", "Prove 50 peer solutions wrong", BadgeCriteria::ValidClaims, 50),
    def("Bug Whisperer", "Prove 100 peer solutions wrong", BadgeCriteria::ValidClaims, 100),
    def("Sharp Eye", "Correctly confirm 5 solutions", BadgeCriteria::ValidConfirms, 5),
    def("Quality Checker", "Correctly confirm 10 solutions", BadgeCriteria::ValidConfirms, 10),
    def("Insightful Reviewer", "Correctly confirm 20 solutions", BadgeCriteria::ValidConfirms, 20),
    def("Truth Seeker", "Correctly confirm 50 solutions", BadgeCriteria::ValidConfirms, 50),
    def("Peer Review Master", "Correctly confirm 100 solutions", BadgeCriteria::ValidConfirms, 100),
    def("First Pass", "Pass every test in a session", BadgeCriteria::PerfectSessions, 1),
    def("Test Tamer", "Pass every test in 5 sessions", BadgeCriteria::PerfectSessions, 5),
    def("Green Streak", "Pass every test in 10 sessions", BadgeCriteria::PerfectSessions, 10),
    def("Test Virtuoso", "Pass every test in 25 sessions", BadgeCriteria::PerfectSessions, 25),
    def("Teacher's Nightmare", "Pass every test in 50 sessions", BadgeCriteria::PerfectSessions, 50),
    def("Flawless Start", "A perfect session with no bug found by peers", BadgeCriteria::FlawlessSessions, 1),
    def("Clean Run", "5 flawless sessions", BadgeCriteria::FlawlessSessions, 5),
    def("Spotless", "10 flawless sessions", BadgeCriteria::FlawlessSessions, 10),
    def("Untouchable", "25 flawless sessions", BadgeCriteria::FlawlessSessions, 25),
    def("Immaculate", "50 flawless sessions", BadgeCriteria::FlawlessSessions, 50),
];

/// Insert missing catalog entries. Existing rows are left alone.
pub async fn seed_catalog<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    for entry in CATALOG {
        let exists = badge::Entity::find()
            .filter(badge::Column::Name.eq(entry.name))
            .one(db)
            .await?;
        if exists.is_some() {
            continue;
        }
        let inserted = badge::ActiveModel {
            name: Set(entry.name.to_string()),
            description: Set(entry.description.to_string()),
            criteria: Set(entry.criteria),
            threshold: Set(entry.threshold),
            ..Default::default()
        }
        .insert(db)
        .await;
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Everything the rule table looks at for one student.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BadgeCounters {
    pub rank: Option<u32>,
    pub valid_claims: u32,
    pub valid_confirms: u32,
    pub perfect_sessions: u32,
    pub flawless_sessions: u32,
}

pub fn qualifies(criteria: BadgeCriteria, threshold: i32, counters: &BadgeCounters) -> bool {
    let threshold = threshold.max(0) as u32;
    match criteria {
        BadgeCriteria::Rank => counters.rank.is_some_and(|rank| rank <= threshold),
        BadgeCriteria::ValidClaims => counters.valid_claims >= threshold,
        BadgeCriteria::ValidConfirms => counters.valid_confirms >= threshold,
        BadgeCriteria::PerfectSessions => counters.perfect_sessions >= threshold,
        BadgeCriteria::FlawlessSessions => counters.flawless_sessions >= threshold,
    }
}

/// Lifetime counters for a set of students, read from persisted rows.
async fn collect_counters<C: ConnectionTrait>(
    db: &C,
    students: &HashSet<i64>,
) -> ArenaResult<HashMap<i64, BadgeCounters>> {
    let mut counters: HashMap<i64, BadgeCounters> = students
        .iter()
        .map(|&id| (id, BadgeCounters::default()))
        .collect();

    for entry in scoring::ranking(db).await? {
        if let Some(c) = counters.get_mut(&entry.student_id) {
            c.rank = Some(entry.rank);
        }
    }

    let assignments: HashMap<i64, review_assignment::Model> = review_assignment::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|a| (a.id, a))
        .collect();

    // solutions with at least one upheld bug claim against them
    let mut refuted: HashSet<i64> = HashSet::new();
    let valid_votes = review_vote::Entity::find()
        .filter(review_vote::Column::Valid.eq(true))
        .all(db)
        .await?;
    for vote in valid_votes {
        let Some(assignment) = assignments.get(&vote.assignment_id) else {
            continue;
        };
        if vote.kind == VoteKind::Incorrect {
            refuted.insert(assignment.solution_id);
        }
        if let Some(c) = counters.get_mut(&assignment.reviewer_id) {
            match vote.kind {
                VoteKind::Incorrect => c.valid_claims += 1,
                VoteKind::Correct => c.valid_confirms += 1,
                VoteKind::Skip => {}
            }
        }
    }

    let session_of: HashMap<i64, i64> = problem_instance::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|i| (i.id, i.game_session_id))
        .collect();

    let mut perfect: HashSet<(i64, i64)> = HashSet::new();
    let mut flawless: HashSet<(i64, i64)> = HashSet::new();
    let passed_everything = solution::Entity::find()
        .filter(solution::Column::AllPassed.eq(true))
        .all(db)
        .await?;
    for sol in passed_everything {
        let Some(&session_id) = session_of.get(&sol.problem_instance_id) else {
            continue;
        };
        perfect.insert((sol.student_id, session_id));
        if !refuted.contains(&sol.id) {
            flawless.insert((sol.student_id, session_id));
        }
    }
    for (student_id, _) in perfect {
        if let Some(c) = counters.get_mut(&student_id) {
            c.perfect_sessions += 1;
        }
    }
    for (student_id, _) in flawless {
        if let Some(c) = counters.get_mut(&student_id) {
            c.flawless_sessions += 1;
        }
    }

    Ok(counters)
}

/// Students who took part in a session: assigned a problem or submitted one.
async fn session_participants<C: ConnectionTrait>(
    db: &C,
    game_session_id: i64,
) -> ArenaResult<HashSet<i64>> {
    let mut students: HashSet<i64> = participant::Entity::find()
        .filter(participant::Column::GameSessionId.eq(game_session_id))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.student_id)
        .collect();

    let instance_ids: Vec<i64> = problem_instance::Entity::find()
        .filter(problem_instance::Column::GameSessionId.eq(game_session_id))
        .all(db)
        .await?
        .into_iter()
        .map(|i| i.id)
        .collect();
    let solutions = solution::Entity::find()
        .filter(solution::Column::ProblemInstanceId.is_in(instance_ids))
        .all(db)
        .await?;
    students.extend(solutions.into_iter().map(|s| s.student_id));
    Ok(students)
}

/// Award every badge the session's participants now qualify for.
/// Returns the number of new awards.
pub async fn evaluate_badges(ctx: &ArenaContext, game_session_id: i64) -> ArenaResult<u64> {
    game_session::Entity::find_by_id(game_session_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| ArenaError::not_found("game session", game_session_id))?;

    let students = session_participants(&ctx.db, game_session_id).await?;
    let counters = collect_counters(&ctx.db, &students).await?;
    let catalog = badge::Entity::find().all(&ctx.db).await?;

    let mut awarded = 0u64;
    for (student_id, c) in &counters {
        let held: HashSet<i64> = student_badge::Entity::find()
            .filter(student_badge::Column::StudentId.eq(*student_id))
            .all(&ctx.db)
            .await?
            .into_iter()
            .map(|sb| sb.badge_id)
            .collect();

        let earned: Vec<&badge::Model> = catalog
            .iter()
            .filter(|b| !held.contains(&b.id) && qualifies(b.criteria, b.threshold, c))
            .collect();
        awarded += grant_badges(&ctx.db, *student_id, &earned, game_session_id).await?;
    }

    info!(
        "Badge evaluation for session {}: {} students, {} new awards",
        game_session_id,
        counters.len(),
        awarded
    );
    Ok(awarded)
}

/// Record awards for one student. A badge already held is left as it was.
async fn grant_badges<C: ConnectionTrait>(
    db: &C,
    student_id: i64,
    badges: &[&badge::Model],
    game_session_id: i64,
) -> ArenaResult<u64> {
    let mut granted = 0u64;
    for badge in badges {
        let inserted = student_badge::ActiveModel {
            student_id: Set(student_id),
            badge_id: Set(badge.id),
            game_session_id: Set(Some(game_session_id)),
            earned_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await;
        match inserted {
            Ok(_) => {
                granted += 1;
                debug!("Awarded '{}' to student {}", badge.name, student_id);
            }
            Err(e) if is_unique_violation(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(granted)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarnedBadge {
    pub name: String,
    pub description: String,
    pub criteria: BadgeCriteria,
    pub threshold: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_session_id: Option<i64>,
    pub earned_at: DateTime<Utc>,
}

pub async fn list_student_badges(ctx: &ArenaContext, student_id: i64) -> ArenaResult<Vec<EarnedBadge>> {
    student::Entity::find_by_id(student_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| ArenaError::not_found("student", student_id))?;

    let earned = student_badge::Entity::find()
        .filter(student_badge::Column::StudentId.eq(student_id))
        .order_by_asc(student_badge::Column::EarnedAt)
        .order_by_asc(student_badge::Column::Id)
        .find_also_related(badge::Entity)
        .all(&ctx.db)
        .await?;

    Ok(earned
        .into_iter()
        .filter_map(|(award, badge)| {
            badge.map(|badge| EarnedBadge {
                name: badge.name,
                description: badge.description,
                criteria: badge.criteria,
                threshold: badge.threshold,
                game_session_id: award.game_session_id,
                earned_at: award.earned_at,
            })
        })
        .collect())
}
