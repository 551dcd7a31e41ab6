use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Input / expected output pair owned by a problem setting.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "test_case")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub problem_setting_id: i64,
    pub input: String,
    pub expected_output: String,
    pub scope: TestScope,
}

/// Who may see a test and its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TestScope {
    #[sea_orm(string_value = "public")]
    Public,
    #[sea_orm(string_value = "private")]
    Private,
}

impl Model {
    pub fn is_public(&self) -> bool {
        self.scope == TestScope::Public
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::problem_setting::Entity",
        from = "Column::ProblemSettingId",
        to = "super::problem_setting::Column::Id"
    )]
    ProblemSetting,
}

impl Related<super::problem_setting::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProblemSetting.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
