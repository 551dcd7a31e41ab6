use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The reviewer's current verdict on an assignment. Overwritten on re-vote.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "review_vote")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub assignment_id: i64,
    pub kind: VoteKind,
    pub proof_test_in: Option<String>,
    pub proof_test_out: Option<String>,
    /// None until adjudicated (skip votes stay None).
    pub valid: Option<bool>,
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Stored vote kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    #[sea_orm(string_value = "correct")]
    Correct,
    #[sea_orm(string_value = "incorrect")]
    Incorrect,
    #[sea_orm(string_value = "skip")]
    Skip,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::review_assignment::Entity",
        from = "Column::AssignmentId",
        to = "super::review_assignment::Column::Id"
    )]
    Assignment,
}

impl Related<super::review_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assignment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
