use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One round of the competition: submission phase, then review phase.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "game_session")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub title: String,
    pub phase: SessionPhase,
}

/// Lifecycle phase of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Students may submit and resubmit.
    #[sea_orm(string_value = "submission")]
    Submission,
    /// Submissions are frozen; reviews are assigned and voted on.
    #[sea_orm(string_value = "review")]
    Review,
    /// Nothing may change any more.
    #[sea_orm(string_value = "closed")]
    Closed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::problem_instance::Entity")]
    ProblemInstance,
}

impl Related<super::problem_instance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProblemInstance.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
