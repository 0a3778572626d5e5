//! Snapshot sequencer: one strictly increasing counter per definition kind, kept in the
//! `definition_snapshots` table so it survives restarts and is shared by every instance.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    sea_query::Expr,
};

use crate::db::entities::definition_snapshot;
use crate::db::enums::DefinitionKind;

/// Inserts the counter row for `kind` at 0 unless it already exists.
pub async fn ensure_counter<C: ConnectionTrait>(conn: &C, kind: DefinitionKind) -> Result<(), DbErr> {
    let existing = definition_snapshot::Entity::find_by_id(kind.as_str().to_owned())
        .one(conn)
        .await?;
    if existing.is_none() {
        definition_snapshot::ActiveModel {
            kind: Set(kind.as_str().to_owned()),
            snapshot_id: Set(0),
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

/// Advances the counter and returns the new id.
///
/// Must run inside the mutation's transaction: the UPDATE takes the row lock, so
/// concurrent writers of the same kind are serialised and commit in id order. If the
/// transaction rolls back, the id is released with it.
pub async fn next_id<C: ConnectionTrait>(conn: &C, kind: DefinitionKind) -> Result<i64, DbErr> {
    let result = definition_snapshot::Entity::update_many()
        .col_expr(
            definition_snapshot::Column::SnapshotId,
            Expr::col(definition_snapshot::Column::SnapshotId).add(1),
        )
        .filter(definition_snapshot::Column::Kind.eq(kind.as_str()))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        definition_snapshot::ActiveModel {
            kind: Set(kind.as_str().to_owned()),
            snapshot_id: Set(1),
        }
        .insert(conn)
        .await?;
        return Ok(1);
    }

    current_id(conn, kind).await
}

/// Highest id issued so far for `kind`, 0 if none.
pub async fn current_id<C: ConnectionTrait>(conn: &C, kind: DefinitionKind) -> Result<i64, DbErr> {
    let row = definition_snapshot::Entity::find_by_id(kind.as_str().to_owned())
        .one(conn)
        .await?;
    Ok(row.map(|r| r.snapshot_id).unwrap_or(0))
}
