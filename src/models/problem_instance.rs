use sea_orm::entity::prelude::*;

/// Review quota applied when an instance does not set one.
pub const DEFAULT_REVIEW_NUMBER: i32 = 3;

/// A problem setting bound into a game session (a "match").
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "problem_instance")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub game_session_id: i64,
    pub problem_setting_id: i64,
    pub title: String,
    /// Points budget: half for implementation, half for reviewing.
    pub total_points: i32,
    /// How many peer solutions each student reviews (0 = default).
    pub review_number: i32,
}

impl Model {
    pub fn review_quota(&self) -> usize {
        if self.review_number > 0 {
            self.review_number as usize
        } else {
            DEFAULT_REVIEW_NUMBER as usize
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::game_session::Entity",
        from = "Column::GameSessionId",
        to = "super::game_session::Column::Id"
    )]
    GameSession,
    #[sea_orm(
        belongs_to = "super::problem_setting::Entity",
        from = "Column::ProblemSettingId",
        to = "super::problem_setting::Column::Id"
    )]
    ProblemSetting,
}

impl Related<super::game_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GameSession.def()
    }
}

impl Related<super::problem_setting::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProblemSetting.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
