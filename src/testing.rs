//! Test fixtures: a scripted executor and database seeding helpers.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

use crate::executor::{CompileError, CompiledArtifact, Execution, ExecutionOutcome, Executor};
use crate::models::game_session::SessionPhase;
use crate::models::test_case::TestScope;
use crate::models::{
    game_session, participant, problem_instance, problem_setting, student, test_case,
};
use crate::sandbox::SandboxError;

const BINARY: &str = "main";

/// Executor that "compiles" a handful of named programs.
///
/// The source text (trimmed) is the program name. The artifact is a real
/// temporary directory holding a file with that name, so cleanup can be
/// observed on disk.
///
/// - `echo`   prints stdin back
/// - `square` prints n*n
/// - `double` prints n+n
/// - `fail`   exits with a runtime error
/// - `hang`   times out
/// - `broken` (or anything else) does not compile
#[derive(Default)]
pub struct ScriptedExecutor {
    compiles: AtomicUsize,
    unavailable: bool,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails as if isolate were missing.
    pub fn unavailable() -> Self {
        Self {
            compiles: AtomicUsize::new(0),
            unavailable: true,
        }
    }

    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn compile(&self, source: &str) -> Result<CompiledArtifact, CompileError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(CompileError::System(SandboxError::Unavailable(
                "isolate executable not found".into(),
            )));
        }
        let program = source.trim();
        if !matches!(program, "echo" | "square" | "double" | "fail" | "hang") {
            return Err(CompileError::Diagnostics(format!(
                "main.cpp:1:1: error: '{}' does not name a type",
                program
            )));
        }
        let dir = tempfile::tempdir().map_err(|e| CompileError::System(e.into()))?;
        std::fs::write(dir.path().join(BINARY), program)
            .map_err(|e| CompileError::System(e.into()))?;
        Ok(CompiledArtifact::new(dir, BINARY))
    }

    async fn execute(
        &self,
        artifact: &CompiledArtifact,
        stdin: &str,
        _time_limit_ms: u32,
    ) -> Execution {
        if self.unavailable {
            return Execution::system_error("isolate executable not found");
        }
        let program = match std::fs::read_to_string(artifact.binary()) {
            Ok(program) => program,
            Err(e) => return Execution::system_error(e.to_string()),
        };
        let number = stdin.trim().parse::<i64>().unwrap_or(0);
        let (stdout, outcome) = match program.as_str() {
            "echo" => (stdin.to_string(), ExecutionOutcome::Success),
            "square" => (format!("{}\n", number * number), ExecutionOutcome::Success),
            "double" => (format!("{}\n", number + number), ExecutionOutcome::Success),
            "fail" => (String::new(), ExecutionOutcome::RuntimeError),
            _ => (String::new(), ExecutionOutcome::Timeout),
        };
        Execution {
            stdout,
            stderr: String::new(),
            exit_code: if outcome == ExecutionOutcome::RuntimeError { 1 } else { 0 },
            outcome,
        }
    }
}

/// Ids of a seeded single-problem session.
pub struct Fixture {
    pub session_id: i64,
    pub instance_id: i64,
    pub students: Vec<i64>,
    pub test_ids: Vec<i64>,
}

/// Session with one "square" problem, tests 2 public + 3 private.
///
/// Inputs are chosen so that `double` passes exactly the public ones
/// (0 and 2) and fails all private ones.
pub async fn seed_square_session(
    db: &DatabaseConnection,
    usernames: &[&str],
    total_points: i32,
    review_number: i32,
) -> Fixture {
    let session = game_session::ActiveModel {
        title: Set("Week 1".into()),
        phase: Set(SessionPhase::Submission),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();

    let setting = problem_setting::ActiveModel {
        title: Set("Square".into()),
        reference_solution: Set("square".into()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();

    let mut test_ids = Vec::new();
    for (input, expected, scope) in [
        ("0", "0", TestScope::Public),
        ("2", "4", TestScope::Public),
        ("3", "9", TestScope::Private),
        ("5", "25", TestScope::Private),
        ("7", "49", TestScope::Private),
    ] {
        let tc = test_case::ActiveModel {
            problem_setting_id: Set(setting.id),
            input: Set(input.into()),
            expected_output: Set(expected.into()),
            scope: Set(scope),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
        test_ids.push(tc.id);
    }

    let instance = problem_instance::ActiveModel {
        game_session_id: Set(session.id),
        problem_setting_id: Set(setting.id),
        title: Set("Square".into()),
        total_points: Set(total_points),
        review_number: Set(review_number),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();

    let mut students = Vec::new();
    for name in usernames {
        let id = add_student(db, name).await;
        participant::ActiveModel {
            student_id: Set(id),
            game_session_id: Set(session.id),
            problem_instance_id: Set(instance.id),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
        students.push(id);
    }

    Fixture {
        session_id: session.id,
        instance_id: instance.id,
        students,
        test_ids,
    }
}

pub async fn add_student(db: &DatabaseConnection, username: &str) -> i64 {
    student::ActiveModel {
        username: Set(username.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
    .id
}

pub async fn set_phase(db: &DatabaseConnection, session_id: i64, phase: SessionPhase) {
    game_session::ActiveModel {
        id: Set(session_id),
        phase: Set(phase),
        ..Default::default()
    }
    .update(db)
    .await
    .unwrap();
}
