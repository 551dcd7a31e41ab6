//! Review assignment planning
//!
//! Pure function over a snapshot of one problem instance's solutions.
//! Persistence and duplicate handling live in `review::ensure_reviews_assigned`.

/// The parts of a solution the planner looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolutionRef {
    pub solution_id: i64,
    pub student_id: i64,
}

/// (reviewer student id, reviewed solution id)
pub type PlannedReview = (i64, i64);

/// Plan who reviews what for one problem instance.
///
/// Solutions are taken in arrival order (ascending id). Reviewer `i` gets
/// the `quota` solutions that follow its own position, wrapping around, so
/// every solution is reviewed by the same number of peers. Fewer than two
/// solutions means nobody can review anybody.
pub fn plan_assignments(solutions: &[SolutionRef], quota: usize) -> Vec<PlannedReview> {
    let mut ordered = solutions.to_vec();
    ordered.sort_by_key(|s| s.solution_id);
    ordered.dedup_by_key(|s| s.student_id);

    let n = ordered.len();
    if n < 2 {
        return Vec::new();
    }

    let per_reviewer = quota.min(n - 1);
    let mut plan = Vec::with_capacity(n * per_reviewer);
    for (i, reviewer) in ordered.iter().enumerate() {
        for offset in 1..=per_reviewer {
            let target = ordered[(i + offset) % n];
            plan.push((reviewer.student_id, target.solution_id));
        }
    }
    plan
}
