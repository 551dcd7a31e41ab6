//! Score aggregation and ranking
//!
//! Scores are never stored. Every call recomputes them from solutions,
//! review assignments and votes, so the result is whatever has been
//! committed at read time.

use std::collections::HashMap;

use sea_orm::{ConnectionTrait, EntityTrait, QueryOrder};
use serde::{Deserialize, Serialize};

use crate::context::ArenaContext;
use crate::error::{ArenaError, ArenaResult};
use crate::models::review_vote::VoteKind;
use crate::models::{problem_instance, review_assignment, review_vote, solution, student, test_case};

pub const MAX_PAGE_SIZE: u64 = 100;

/// Half of an instance's points reward passing its tests.
pub fn implementation_share(total_points: i32, passed: i32, total_tests: u64) -> f64 {
    if total_tests == 0 {
        return 0.0;
    }
    0.5 * total_points as f64 * (passed.max(0) as f64 / total_tests as f64)
}

/// One review's unit: the other half of the points split over the
/// reviewer's assignments on that instance.
pub fn review_base(total_points: i32, assigned: usize) -> f64 {
    if assigned == 0 {
        return 0.0;
    }
    0.5 * total_points as f64 / assigned as f64
}

/// Multiplier applied to the review base for one vote.
pub fn vote_multiplier(kind: VoteKind, valid: Option<bool>) -> f64 {
    match (kind, valid) {
        (VoteKind::Incorrect, Some(true)) => 2.0,
        (VoteKind::Correct, Some(true)) => 1.0,
        (VoteKind::Incorrect | VoteKind::Correct, Some(false)) => -1.0,
        (VoteKind::Skip, _) | (_, None) => 0.0,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Clamp a raw total at zero and round it.
pub fn finalize(raw: f64) -> f64 {
    round2(raw.max(0.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentScore {
    pub student_id: i64,
    pub username: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub rank: u32,
    pub student_id: i64,
    pub username: String,
    pub score: f64,
}

/// Sort by score (desc) then student id (asc) and assign competition ranks:
/// ties share a rank, the next score gets its 1-based position.
pub fn rank_scores(mut scores: Vec<StudentScore>) -> Vec<RankedEntry> {
    scores.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    let mut ranked: Vec<RankedEntry> = Vec::with_capacity(scores.len());
    for (i, s) in scores.into_iter().enumerate() {
        let rank = match ranked.last() {
            Some(prev) if prev.score == s.score => prev.rank,
            _ => i as u32 + 1,
        };
        ranked.push(RankedEntry {
            rank,
            student_id: s.student_id,
            username: s.username,
            score: s.score,
        });
    }
    ranked
}

/// Recompute every student's score from persisted rows.
pub async fn compute_scores<C: ConnectionTrait>(db: &C) -> ArenaResult<Vec<StudentScore>> {
    let students = student::Entity::find()
        .order_by_asc(student::Column::Id)
        .all(db)
        .await?;
    let instances: HashMap<i64, problem_instance::Model> = problem_instance::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|i| (i.id, i))
        .collect();

    let mut tests_per_setting: HashMap<i64, u64> = HashMap::new();
    for tc in test_case::Entity::find().all(db).await? {
        *tests_per_setting.entry(tc.problem_setting_id).or_default() += 1;
    }
    let test_count = |instance: &problem_instance::Model| {
        tests_per_setting
            .get(&instance.problem_setting_id)
            .copied()
            .unwrap_or(0)
    };

    let mut raw: HashMap<i64, f64> = HashMap::new();

    for sol in solution::Entity::find().all(db).await? {
        if let Some(instance) = instances.get(&sol.problem_instance_id) {
            *raw.entry(sol.student_id).or_default() +=
                implementation_share(instance.total_points, sol.passed_tests, test_count(instance));
        }
    }

    let assignments = review_assignment::Entity::find().all(db).await?;
    let mut assigned: HashMap<(i64, i64), usize> = HashMap::new();
    for a in &assignments {
        *assigned.entry((a.reviewer_id, a.problem_instance_id)).or_default() += 1;
    }
    let by_id: HashMap<i64, &review_assignment::Model> =
        assignments.iter().map(|a| (a.id, a)).collect();

    for vote in review_vote::Entity::find().all(db).await? {
        let Some(assignment) = by_id.get(&vote.assignment_id) else {
            continue;
        };
        let Some(instance) = instances.get(&assignment.problem_instance_id) else {
            continue;
        };
        let count = assigned
            .get(&(assignment.reviewer_id, instance.id))
            .copied()
            .unwrap_or(0);
        *raw.entry(assignment.reviewer_id).or_default() +=
            vote_multiplier(vote.kind, vote.valid) * review_base(instance.total_points, count);
    }

    Ok(students
        .into_iter()
        .map(|s| StudentScore {
            score: finalize(raw.get(&s.id).copied().unwrap_or(0.0)),
            student_id: s.id,
            username: s.username,
        })
        .collect())
}

/// Global ranking over all students.
pub async fn ranking<C: ConnectionTrait>(db: &C) -> ArenaResult<Vec<RankedEntry>> {
    Ok(rank_scores(compute_scores(db).await?))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentStudent {
    pub rank: u32,
    /// 1-based place in the sorted list (unique, unlike rank)
    pub position: u64,
    pub score: f64,
    pub username: String,
    pub student_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_to_next_rank: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaderboard {
    pub total_students: u64,
    pub total_pages: u64,
    pub page: u64,
    pub page_size: u64,
    pub entries: Vec<RankedEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_student: Option<CurrentStudent>,
}

pub async fn get_leaderboard(
    ctx: &ArenaContext,
    page: u64,
    page_size: u64,
    student_id: Option<i64>,
) -> ArenaResult<Leaderboard> {
    if page < 1 {
        return Err(ArenaError::InvalidRequest("page must be at least 1".into()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(ArenaError::InvalidRequest(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let ranked = ranking(&ctx.db).await?;
    paginate(ranked, page, page_size, student_id)
}

fn paginate(
    ranked: Vec<RankedEntry>,
    page: u64,
    page_size: u64,
    student_id: Option<i64>,
) -> ArenaResult<Leaderboard> {
    let total_students = ranked.len() as u64;
    let total_pages = total_students.div_ceil(page_size);

    let current_student = match student_id {
        Some(id) => {
            let position = ranked
                .iter()
                .position(|e| e.student_id == id)
                .ok_or_else(|| ArenaError::not_found("student", id))?;
            let me = &ranked[position];
            let points_to_next_rank = if me.rank == 1 {
                None
            } else {
                ranked[..position]
                    .iter()
                    .rev()
                    .find(|e| e.score > me.score)
                    .map(|e| round2(e.score - me.score))
            };
            Some(CurrentStudent {
                rank: me.rank,
                position: position as u64 + 1,
                score: me.score,
                username: me.username.clone(),
                student_id: me.student_id,
                points_to_next_rank,
            })
        }
        None => None,
    };

    let entries = ranked
        .into_iter()
        .skip(((page - 1) * page_size) as usize)
        .take(page_size as usize)
        .collect();

    Ok(Leaderboard {
        total_students,
        total_pages,
        page,
        page_size,
        entries,
        current_student,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::submit;
    use crate::models::game_session::SessionPhase;
    use crate::review::{cast_vote, list_assigned_reviews, VoteRequest};
    use crate::testing::{add_student, seed_square_session, set_phase};

    fn score(student_id: i64, score: f64) -> StudentScore {
        StudentScore {
            student_id,
            username: format!("s{}", student_id),
            score,
        }
    }

    #[test]
    fn test_review_contribution_example() {
        // 100 points, 4 reviews assigned: 2 valid claims, 1 invalid confirm
        let base = review_base(100, 4);
        assert_eq!(base, 12.5);
        let total = 2.0 * vote_multiplier(VoteKind::Incorrect, Some(true)) * base
            + vote_multiplier(VoteKind::Correct, Some(false)) * base;
        assert_eq!(total, 37.5);
    }

    #[test]
    fn test_vote_multipliers() {
        assert_eq!(vote_multiplier(VoteKind::Skip, None), 0.0);
        assert_eq!(vote_multiplier(VoteKind::Incorrect, None), 0.0);
        assert_eq!(vote_multiplier(VoteKind::Incorrect, Some(false)), -1.0);
        assert_eq!(vote_multiplier(VoteKind::Correct, Some(true)), 1.0);
    }

    #[test]
    fn test_implementation_share() {
        assert_eq!(implementation_share(100, 3, 5), 30.0);
        assert_eq!(implementation_share(100, 5, 5), 50.0);
        assert_eq!(implementation_share(100, 0, 0), 0.0);
    }

    #[test]
    fn test_finalize_clamps_and_rounds() {
        assert_eq!(finalize(-12.5), 0.0);
        assert_eq!(finalize(33.333333), 33.33);
        assert_eq!(finalize(0.1 + 0.2), 0.3);
    }

    #[test]
    fn test_competition_ranking() {
        let ranked = rank_scores(vec![
            score(4, 50.0),
            score(2, 80.0),
            score(3, 80.0),
            score(1, 10.0),
            score(5, 50.0),
        ]);
        let view: Vec<(u32, i64)> = ranked.iter().map(|e| (e.rank, e.student_id)).collect();
        assert_eq!(view, vec![(1, 2), (1, 3), (3, 4), (3, 5), (5, 1)]);

        // recomputation from the same rows is stable
        let again = rank_scores(vec![
            score(5, 50.0),
            score(1, 10.0),
            score(3, 80.0),
            score(4, 50.0),
            score(2, 80.0),
        ]);
        assert_eq!(again, ranked);
    }

    #[test]
    fn test_paginate_and_current_student() {
        let ranked = rank_scores(vec![
            score(1, 90.0),
            score(2, 70.0),
            score(3, 70.0),
            score(4, 20.5),
            score(5, 0.0),
        ]);
        let board = paginate(ranked.clone(), 2, 2, Some(4)).unwrap();
        assert_eq!(board.total_students, 5);
        assert_eq!(board.total_pages, 3);
        let ids: Vec<i64> = board.entries.iter().map(|e| e.student_id).collect();
        assert_eq!(ids, vec![3, 4]);

        let me = board.current_student.unwrap();
        assert_eq!(me.rank, 4);
        assert_eq!(me.position, 4);
        assert_eq!(me.points_to_next_rank, Some(49.5));

        let top = paginate(ranked.clone(), 1, 10, Some(1)).unwrap();
        assert_eq!(top.current_student.unwrap().points_to_next_rank, None);

        // tied at rank 2: the gap is to the student above the tie block
        let tied = paginate(ranked.clone(), 1, 10, Some(3)).unwrap();
        assert_eq!(tied.current_student.unwrap().points_to_next_rank, Some(20.0));

        assert!(paginate(ranked, 1, 10, Some(99)).is_err());
    }

    #[tokio::test]
    async fn test_leaderboard_validation() {
        let ctx = ArenaContext::for_tests().await;
        for (page, size) in [(0, 10), (1, 0), (1, 101)] {
            let err = get_leaderboard(&ctx, page, size, None).await.unwrap_err();
            assert!(matches!(err, ArenaError::InvalidRequest(_)));
        }
        let empty = get_leaderboard(&ctx, 1, 10, None).await.unwrap();
        assert_eq!(empty.total_students, 0);
        assert!(empty.entries.is_empty());
    }

    #[tokio::test]
    async fn test_scores_from_persisted_rows() {
        let ctx = ArenaContext::for_tests().await;
        let fx = seed_square_session(&ctx.db, &["ada", "bob"], 100, 2).await;
        let (ada, bob) = (fx.students[0], fx.students[1]);
        let idle = add_student(&ctx.db, "idle").await;

        submit(&ctx, ada, fx.instance_id, "square").await.unwrap();
        submit(&ctx, bob, fx.instance_id, "double").await.unwrap();
        set_phase(&ctx.db, fx.session_id, SessionPhase::Review).await;

        // ada proves bob wrong, bob wrongly calls ada's code buggy
        let ada_queue = list_assigned_reviews(&ctx, ada, fx.session_id).await.unwrap();
        let bob_queue = list_assigned_reviews(&ctx, bob, fx.session_id).await.unwrap();
        let claim = |input: &str, output: &str| VoteRequest {
            vote: VoteKind::Incorrect,
            proof_test_in: Some(input.into()),
            proof_test_out: Some(output.into()),
            note: None,
        };
        cast_vote(&ctx, ada_queue[0].assignment_id, &claim("5", "25")).await.unwrap();
        cast_vote(&ctx, bob_queue[0].assignment_id, &claim("5", "10")).await.unwrap();

        let scores: HashMap<i64, f64> = compute_scores(&ctx.db)
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.student_id, s.score))
            .collect();
        // ada: 50 implementation + 2 * 50 review
        assert_eq!(scores[&ada], 150.0);
        // bob: 0.5 * 100 * 2/5 = 20, minus 50 for the invalid claim, clamped
        assert_eq!(scores[&bob], 0.0);
        assert_eq!(scores[&idle], 0.0);

        let board = get_leaderboard(&ctx, 1, 10, Some(bob)).await.unwrap();
        assert_eq!(board.total_students, 3);
        assert_eq!(board.entries[0].student_id, ada);
        let me = board.current_student.unwrap();
        assert_eq!(me.rank, 2);
        assert_eq!(me.points_to_next_rank, Some(150.0));
    }
}
