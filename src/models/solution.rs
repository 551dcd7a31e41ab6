use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// A student's current best code for one problem instance.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "solution")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub student_id: i64,
    pub problem_instance_id: i64,
    pub code: String,
    /// Tests passed over public and private scope.
    pub passed_tests: i32,
    pub passed_public_tests: i32,
    pub all_passed: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
    #[sea_orm(
        belongs_to = "super::problem_instance::Entity",
        from = "Column::ProblemInstanceId",
        to = "super::problem_instance::Column::Id"
    )]
    ProblemInstance,
    #[sea_orm(has_many = "super::solution_test_result::Entity")]
    TestResult,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl Related<super::solution_test_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestResult.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
