use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::DefinitionStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "check_definitions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    #[sea_orm(indexed)]
    pub owning_team: String,
    #[sea_orm(nullable)]
    pub source_url: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub command: String,
    #[sea_orm(column_type = "Json")]
    pub entities: Json,
    pub interval: i64,
    pub status: DefinitionStatus,
    pub created_by: String,
    pub last_modified_by: String,
    #[sea_orm(indexed)]
    pub last_modified_snapshot_id: i64,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
