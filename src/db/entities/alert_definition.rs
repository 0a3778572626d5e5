use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::DefinitionStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alert_definitions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    #[sea_orm(indexed)]
    pub owning_team: String,
    #[sea_orm(nullable)]
    pub team: Option<String>,
    #[sea_orm(nullable)]
    pub responsible_team: Option<String>,
    #[sea_orm(indexed)]
    pub check_definition_id: i32,
    #[sea_orm(column_type = "Text")]
    pub condition: String,
    pub priority: i32,
    #[sea_orm(column_type = "Json")]
    pub entities: Json,
    #[sea_orm(column_type = "Json")]
    pub notifications: Json,
    pub status: DefinitionStatus,
    pub created_by: String,
    pub last_modified_by: String,
    #[sea_orm(indexed)]
    pub last_modified_snapshot_id: i64,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

// No relation on check_definition_id: DELETED alerts may outlive a detached check,
// so the column must not carry a foreign key.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
