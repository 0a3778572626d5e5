use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbErr, Schema,
    sea_query::{Index, IndexCreateStatement},
};
use tracing::info;

use crate::db::entities::{alert_definition, check_definition, definition_snapshot};
use crate::db::enums::DefinitionKind;
use crate::db::services::snapshot_service;

/// Creates the registry tables if missing and seeds one snapshot counter row per kind.
pub async fn setup(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut checks = schema.create_table_from_entity(check_definition::Entity);
    let mut alerts = schema.create_table_from_entity(alert_definition::Entity);
    let mut snapshots = schema.create_table_from_entity(definition_snapshot::Entity);
    for table in [&mut checks, &mut alerts, &mut snapshots] {
        table.if_not_exists();
        db.execute(backend.build(&*table)).await?;
    }

    for index in indexes() {
        db.execute(backend.build(&index)).await?;
    }

    for kind in DefinitionKind::all() {
        snapshot_service::ensure_counter(db, kind).await?;
    }

    info!("Definition registry schema is ready.");
    Ok(())
}

fn indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .if_not_exists()
            .name("idx_check_definitions_name_team")
            .table(check_definition::Entity)
            .col(check_definition::Column::Name)
            .col(check_definition::Column::OwningTeam)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_check_definitions_snapshot")
            .table(check_definition::Entity)
            .col(check_definition::Column::LastModifiedSnapshotId)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_alert_definitions_name_team")
            .table(alert_definition::Entity)
            .col(alert_definition::Column::Name)
            .col(alert_definition::Column::OwningTeam)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_alert_definitions_check")
            .table(alert_definition::Entity)
            .col(alert_definition::Column::CheckDefinitionId)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_alert_definitions_snapshot")
            .table(alert_definition::Entity)
            .col(alert_definition::Column::LastModifiedSnapshotId)
            .to_owned(),
    ]
}
