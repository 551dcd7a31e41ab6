use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog entry for an achievement.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "badge")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub description: String,
    pub criteria: BadgeCriteria,
    /// For `Rank` the maximum rank, otherwise the minimum count.
    pub threshold: i32,
}

/// Counter a badge threshold is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum BadgeCriteria {
    #[sea_orm(string_value = "rank")]
    Rank,
    #[sea_orm(string_value = "valid_claims")]
    ValidClaims,
    #[sea_orm(string_value = "valid_confirms")]
    ValidConfirms,
    #[sea_orm(string_value = "perfect_sessions")]
    PerfectSessions,
    #[sea_orm(string_value = "flawless_sessions")]
    FlawlessSessions,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::student_badge::Entity")]
    StudentBadge,
}

impl Related<super::student_badge::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StudentBadge.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
