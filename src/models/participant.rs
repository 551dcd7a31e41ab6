use sea_orm::entity::prelude::*;

/// Which problem instance a student was given in a session.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "participant")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub student_id: i64,
    pub game_session_id: i64,
    pub problem_instance_id: i64,
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
}

impl ActiveModelBehavior for ActiveModel {}
