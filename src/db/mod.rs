//! Database connection and schema

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, SqlErr};
use tracing::info;

use crate::badges;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS student (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS game_session (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        phase TEXT NOT NULL DEFAULT 'submission'
    )",
    "CREATE TABLE IF NOT EXISTS problem_setting (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        reference_solution TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS test_case (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        problem_setting_id INTEGER NOT NULL REFERENCES problem_setting(id),
        input TEXT NOT NULL,
        expected_output TEXT NOT NULL,
        scope TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS problem_instance (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        game_session_id INTEGER NOT NULL REFERENCES game_session(id),
        problem_setting_id INTEGER NOT NULL REFERENCES problem_setting(id),
        title TEXT NOT NULL,
        total_points INTEGER NOT NULL,
        review_number INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS participant (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES student(id),
        game_session_id INTEGER NOT NULL REFERENCES game_session(id),
        problem_instance_id INTEGER NOT NULL REFERENCES problem_instance(id),
        UNIQUE (student_id, game_session_id)
    )",
    "CREATE TABLE IF NOT EXISTS solution (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES student(id),
        problem_instance_id INTEGER NOT NULL REFERENCES problem_instance(id),
        code TEXT NOT NULL,
        passed_tests INTEGER NOT NULL,
        passed_public_tests INTEGER NOT NULL,
        all_passed BOOLEAN NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (student_id, problem_instance_id)
    )",
    "CREATE TABLE IF NOT EXISTS solution_test_result (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        solution_id INTEGER NOT NULL REFERENCES solution(id) ON DELETE CASCADE,
        test_case_id INTEGER NOT NULL REFERENCES test_case(id),
        actual_output TEXT NOT NULL,
        passed BOOLEAN NOT NULL,
        UNIQUE (solution_id, test_case_id)
    )",
    "CREATE TABLE IF NOT EXISTS student_test (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES student(id),
        problem_instance_id INTEGER NOT NULL REFERENCES problem_instance(id),
        input TEXT NOT NULL,
        expected_output TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS review_assignment (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        reviewer_id INTEGER NOT NULL REFERENCES student(id),
        solution_id INTEGER NOT NULL REFERENCES solution(id),
        problem_instance_id INTEGER NOT NULL REFERENCES problem_instance(id),
        created_at TEXT NOT NULL,
        UNIQUE (reviewer_id, solution_id)
    )",
    "CREATE TABLE IF NOT EXISTS review_vote (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        assignment_id INTEGER NOT NULL UNIQUE REFERENCES review_assignment(id),
        kind TEXT NOT NULL,
        proof_test_in TEXT,
        proof_test_out TEXT,
        valid BOOLEAN,
        note TEXT,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS badge (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL,
        criteria TEXT NOT NULL,
        threshold INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS student_badge (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES student(id),
        badge_id INTEGER NOT NULL REFERENCES badge(id),
        game_session_id INTEGER REFERENCES game_session(id),
        earned_at TEXT NOT NULL,
        UNIQUE (student_id, badge_id)
    )",
];

/// Connect to the database and make sure the schema and badge catalog exist.
pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(url.to_owned());
    options.sqlx_logging(false);
    let db = Database::connect(options).await?;
    setup(&db).await?;
    info!("Database ready at {}", url);
    Ok(db)
}

/// Create tables and seed the badge catalog. Safe to run repeatedly.
pub async fn setup(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.execute_unprepared("PRAGMA foreign_keys = ON").await?;
    for statement in SCHEMA {
        db.execute_unprepared(statement).await?;
    }
    badges::seed_catalog(db).await?;
    Ok(())
}

/// Whether a write failed only because the row already exists.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory db");
    setup(&db).await.expect("Failed to create schema");
    db
}
