//! Queries shared by the check and alert tables.

use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    Select, TransactionTrait,
};
use tracing::debug;

use crate::db::entities::{alert_definition, check_definition};
use crate::db::enums::{DefinitionKind, DefinitionStatus};
use crate::db::models::{DefinitionsDiff, DefinitionsSnapshot};
use crate::db::services::{diff_service, snapshot_service};
use crate::error::AppError;

/// A table of versioned, team-owned definitions.
pub trait DefinitionEntity: EntityTrait {
    const KIND: DefinitionKind;

    fn id_column() -> Self::Column;
    fn name_column() -> Self::Column;
    fn owning_team_column() -> Self::Column;
    fn status_column() -> Self::Column;
    fn snapshot_column() -> Self::Column;
}

/// Row accessors the diff needs to sort changed from disabled definitions.
pub trait DefinitionRow {
    fn id(&self) -> i32;
    fn status(&self) -> DefinitionStatus;
}

impl DefinitionEntity for check_definition::Entity {
    const KIND: DefinitionKind = DefinitionKind::Check;

    fn id_column() -> Self::Column {
        check_definition::Column::Id
    }

    fn name_column() -> Self::Column {
        check_definition::Column::Name
    }

    fn owning_team_column() -> Self::Column {
        check_definition::Column::OwningTeam
    }

    fn status_column() -> Self::Column {
        check_definition::Column::Status
    }

    fn snapshot_column() -> Self::Column {
        check_definition::Column::LastModifiedSnapshotId
    }
}

impl DefinitionRow for check_definition::Model {
    fn id(&self) -> i32 {
        self.id
    }

    fn status(&self) -> DefinitionStatus {
        self.status
    }
}

impl DefinitionEntity for alert_definition::Entity {
    const KIND: DefinitionKind = DefinitionKind::Alert;

    fn id_column() -> Self::Column {
        alert_definition::Column::Id
    }

    fn name_column() -> Self::Column {
        alert_definition::Column::Name
    }

    fn owning_team_column() -> Self::Column {
        alert_definition::Column::OwningTeam
    }

    fn status_column() -> Self::Column {
        alert_definition::Column::Status
    }

    fn snapshot_column() -> Self::Column {
        alert_definition::Column::LastModifiedSnapshotId
    }
}

impl DefinitionRow for alert_definition::Model {
    fn id(&self) -> i32 {
        self.id
    }

    fn status(&self) -> DefinitionStatus {
        self.status
    }
}

pub fn with_status<E: DefinitionEntity>(query: Select<E>, status: Option<DefinitionStatus>) -> Select<E> {
    match status {
        Some(status) => query.filter(E::status_column().eq(status)),
        None => query,
    }
}

/// Rows that are not DELETED.
pub fn live<E: DefinitionEntity>() -> Select<E> {
    E::find().filter(E::status_column().ne(DefinitionStatus::Deleted))
}

pub async fn find_live_by_id<E, C>(conn: &C, id: i32) -> Result<Option<E::Model>, AppError>
where
    E: DefinitionEntity,
    C: ConnectionTrait,
{
    Ok(live::<E>().filter(E::id_column().eq(id)).one(conn).await?)
}

/// The live row holding the natural key `(name, owning_team)`.
pub async fn find_live_by_key<E, C>(
    conn: &C,
    name: &str,
    owning_team: &str,
) -> Result<Option<E::Model>, AppError>
where
    E: DefinitionEntity,
    C: ConnectionTrait,
{
    Ok(live::<E>()
        .filter(E::name_column().eq(name))
        .filter(E::owning_team_column().eq(owning_team))
        .one(conn)
        .await?)
}

/// All rows with `status` (all rows for `None`), pinned to the current snapshot.
pub async fn get_by_status<E, T>(
    db: &DatabaseConnection,
    status: Option<DefinitionStatus>,
) -> Result<DefinitionsSnapshot<T>, AppError>
where
    E: DefinitionEntity,
    T: From<E::Model>,
{
    let txn = db.begin().await?;
    let snapshot_id = snapshot_service::current_id(&txn, E::KIND).await?;
    let rows = with_status(E::find(), status)
        .filter(E::snapshot_column().lte(snapshot_id))
        .order_by_asc(E::id_column())
        .all(&txn)
        .await?;
    txn.commit().await?;

    debug!(kind = E::KIND.as_str(), snapshot_id, count = rows.len(), "Loaded definitions.");
    Ok(DefinitionsSnapshot {
        snapshot_id,
        definitions: rows.into_iter().map(T::from).collect(),
    })
}

/// Unknown ids are omitted.
pub async fn get_by_ids<E, T>(
    db: &DatabaseConnection,
    status: Option<DefinitionStatus>,
    ids: &[i32],
) -> Result<Vec<T>, AppError>
where
    E: DefinitionEntity,
    T: From<E::Model>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = with_status(E::find(), status)
        .filter(E::id_column().is_in(ids.iter().copied()))
        .order_by_asc(E::id_column())
        .all(db)
        .await?;
    Ok(rows.into_iter().map(T::from).collect())
}

pub async fn get_by_owning_teams<E, T>(
    db: &DatabaseConnection,
    status: Option<DefinitionStatus>,
    teams: &[String],
) -> Result<Vec<T>, AppError>
where
    E: DefinitionEntity,
    T: From<E::Model>,
{
    if teams.is_empty() {
        return Ok(Vec::new());
    }
    let rows = with_status(E::find(), status)
        .filter(E::owning_team_column().is_in(teams.iter().cloned()))
        .order_by_asc(E::id_column())
        .all(db)
        .await?;
    Ok(rows.into_iter().map(T::from).collect())
}

/// Definitions changed or disabled after `since`, relative to the current snapshot.
pub async fn diff<E, T>(
    db: &DatabaseConnection,
    since: Option<i64>,
) -> Result<DefinitionsDiff<T>, AppError>
where
    E: DefinitionEntity,
    E::Model: DefinitionRow,
    T: From<E::Model>,
{
    let txn = db.begin().await?;
    let current = snapshot_service::current_id(&txn, E::KIND).await?;
    let window = diff_service::DiffWindow::new(since, current);

    let mut rows = Vec::new();
    if window.needs_rows() {
        let mut query = E::find().filter(E::snapshot_column().lte(window.snapshot_id()));
        if let Some(after) = window.after() {
            query = query.filter(E::snapshot_column().gt(after));
        }
        if !window.reports_disabled() {
            query = query.filter(E::status_column().eq(DefinitionStatus::Active));
        }
        rows = query.order_by_asc(E::id_column()).all(&txn).await?;
    }
    txn.commit().await?;

    let (changed, disabled) = diff_service::classify(rows);
    debug!(
        kind = E::KIND.as_str(),
        ?since,
        snapshot_id = window.snapshot_id(),
        changed = changed.len(),
        disabled = disabled.len(),
        "Computed definitions diff."
    );
    Ok(diff_service::assemble(
        window,
        changed.into_iter().map(T::from).collect(),
        disabled,
    ))
}
