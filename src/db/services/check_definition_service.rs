use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::entities::check_definition;
use crate::db::enums::{DefinitionKind, DefinitionStatus};
use crate::db::models::{
    CheckDefinition, CheckDefinitionImport, CheckDefinitionsDiff, DefinitionsSnapshot,
    DeleteResult, ImportResult,
};
use crate::db::services::definition_store::{self, live};
use crate::db::services::{alert_definition_service, snapshot_service};
use crate::error::AppError;
use crate::permission::{self, Authority, Decision, DenialReason, NewDefinition, Permission};

type Checks = check_definition::Entity;

#[derive(Clone)]
pub struct CheckDefinitionService {
    db: Arc<DatabaseConnection>,
}

impl CheckDefinitionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a check or updates the live one the import matches.
    ///
    /// Matching order: explicit id, then source url, then `(name, owning team)`.
    pub async fn create_or_update(
        &self,
        import: CheckDefinitionImport,
        authority: &Authority,
    ) -> Result<ImportResult<CheckDefinition>, AppError> {
        import.validate()?;

        let txn = self.db.begin().await?;
        let snapshot_id = snapshot_service::next_id(&txn, DefinitionKind::Check).await?;

        let name = import.name.trim().to_string();
        let requested_team = import
            .owning_team
            .as_deref()
            .map(str::trim)
            .filter(|team| !team.is_empty());

        let mut existing = match import.id {
            Some(id) => definition_store::find_live_by_id::<Checks, _>(&txn, id).await?,
            None => None,
        };
        if existing.is_none() {
            if let Some(url) = import.source_url.as_deref().filter(|u| !u.trim().is_empty()) {
                existing = find_live_by_source_url(&txn, url).await?;
            }
        }
        let owning_team = match (requested_team, existing.as_ref(), authority.first_team()) {
            (Some(team), _, _) => team.to_string(),
            (None, Some(row), _) => row.owning_team.clone(),
            (None, None, Some(team)) => team.to_string(),
            (None, None, None) => {
                txn.rollback().await?;
                let decision = Decision::Denied(DenialReason::NoTeams);
                warn!(
                    user = %authority.user_name(),
                    name = %name,
                    %decision,
                    "Check definition import denied."
                );
                return self.denied(None).await;
            }
        };
        if existing.is_none() {
            existing = definition_store::find_live_by_key::<Checks, _>(&txn, &name, &owning_team).await?;
        }

        let Some(current) = existing else {
            let decision = permission::evaluate(
                Permission::AddCheck,
                &NewDefinition {
                    kind: DefinitionKind::Check,
                    owning_team: &owning_team,
                },
                authority,
            );
            if !decision.is_granted() {
                txn.rollback().await?;
                warn!(
                    user = %authority.user_name(),
                    name = %name,
                    owning_team = %owning_team,
                    %decision,
                    "Check definition import denied."
                );
                return self.denied(None).await;
            }

            let now = Utc::now();
            let model = check_definition::ActiveModel {
                name: Set(name),
                description: Set(import.description),
                owning_team: Set(owning_team),
                source_url: Set(import.source_url),
                command: Set(import.command),
                entities: Set(import.entities),
                interval: Set(import.interval),
                status: Set(import.status),
                created_by: Set(authority.user_name().to_string()),
                last_modified_by: Set(authority.user_name().to_string()),
                last_modified_snapshot_id: Set(snapshot_id),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            txn.commit().await?;

            info!(
                check_id = model.id,
                snapshot_id,
                user = %authority.user_name(),
                "Created check definition."
            );
            return Ok(ImportResult {
                entity: Some(model.into()),
                is_new_entity: true,
                permission_denied: false,
                snapshot_id,
            });
        };

        // Evaluated against the stored owning team, not the proposed one.
        let decision = permission::evaluate(Permission::ModifyCheck, &current, authority);
        if !decision.is_granted() {
            txn.rollback().await?;
            warn!(
                user = %authority.user_name(),
                check_id = current.id,
                %decision,
                "Check definition update denied."
            );
            return self.denied(Some(current.into())).await;
        }

        if current.name != name || current.owning_team != owning_team {
            if let Some(other) =
                definition_store::find_live_by_key::<Checks, _>(&txn, &name, &owning_team).await?
            {
                if other.id != current.id {
                    txn.rollback().await?;
                    return Err(AppError::DuplicateDefinition(format!(
                        "check '{name}' already exists for team {owning_team} (id {})",
                        other.id
                    )));
                }
            }
        }

        let check_id = current.id;
        let mut active: check_definition::ActiveModel = current.into_active_model();
        active.name = Set(name);
        active.description = Set(import.description);
        active.owning_team = Set(owning_team);
        active.source_url = Set(import.source_url);
        active.command = Set(import.command);
        active.entities = Set(import.entities);
        active.interval = Set(import.interval);
        active.status = Set(import.status);
        active.last_modified_by = Set(authority.user_name().to_string());
        active.last_modified_snapshot_id = Set(snapshot_id);
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            check_id,
            snapshot_id,
            user = %authority.user_name(),
            "Updated check definition."
        );
        Ok(ImportResult {
            entity: Some(model.into()),
            is_new_entity: false,
            permission_denied: false,
            snapshot_id,
        })
    }

    async fn denied(
        &self,
        entity: Option<CheckDefinition>,
    ) -> Result<ImportResult<CheckDefinition>, AppError> {
        Ok(ImportResult {
            entity,
            is_new_entity: false,
            permission_denied: true,
            snapshot_id: self.current_snapshot_id().await?,
        })
    }

    pub async fn get_by_status(
        &self,
        status: Option<DefinitionStatus>,
    ) -> Result<DefinitionsSnapshot<CheckDefinition>, AppError> {
        definition_store::get_by_status::<Checks, _>(&self.db, status).await
    }

    pub async fn get_by_ids(
        &self,
        status: Option<DefinitionStatus>,
        ids: &[i32],
    ) -> Result<Vec<CheckDefinition>, AppError> {
        definition_store::get_by_ids::<Checks, _>(&self.db, status, ids).await
    }

    pub async fn get_by_owning_teams(
        &self,
        status: Option<DefinitionStatus>,
        teams: &[String],
    ) -> Result<Vec<CheckDefinition>, AppError> {
        definition_store::get_by_owning_teams::<Checks, _>(&self.db, status, teams).await
    }

    /// Soft-deletes the live check with this natural key. A missing check is a no-op.
    pub async fn delete(
        &self,
        authority: &Authority,
        name: &str,
        owning_team: &str,
    ) -> Result<DeleteResult<CheckDefinition>, AppError> {
        let txn = self.db.begin().await?;
        let snapshot_id = snapshot_service::next_id(&txn, DefinitionKind::Check).await?;

        let Some(current) =
            definition_store::find_live_by_key::<Checks, _>(&txn, name.trim(), owning_team.trim())
                .await?
        else {
            txn.rollback().await?;
            debug!(name, owning_team, "No live check definition to delete.");
            return Ok(DeleteResult {
                entity: None,
                permission_denied: false,
            });
        };

        let decision = permission::evaluate(Permission::DeleteCheck, &current, authority);
        if !decision.is_granted() {
            txn.rollback().await?;
            warn!(
                user = %authority.user_name(),
                check_id = current.id,
                %decision,
                "Check definition delete denied."
            );
            return Ok(DeleteResult {
                entity: Some(current.into()),
                permission_denied: true,
            });
        }

        // Blocks while an alert transaction holds the row via `lock_live_for_reference`.
        let check_id = current.id;
        let mut active: check_definition::ActiveModel = current.into_active_model();
        active.status = Set(DefinitionStatus::Deleted);
        active.last_modified_by = Set(authority.user_name().to_string());
        active.last_modified_snapshot_id = Set(snapshot_id);
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            check_id,
            snapshot_id,
            user = %authority.user_name(),
            "Marked check definition as deleted."
        );
        Ok(DeleteResult {
            entity: Some(model.into()),
            permission_denied: false,
        })
    }

    /// Physically removes DELETED checks that no live alert references.
    /// Returns the number of removed rows.
    pub async fn delete_detached(&self) -> Result<u64, AppError> {
        let txn = self.db.begin().await?;
        let snapshot_id = snapshot_service::next_id(&txn, DefinitionKind::Check).await?;

        let deleted_ids: Vec<i32> = Checks::find()
            .select_only()
            .column(check_definition::Column::Id)
            .filter(check_definition::Column::Status.eq(DefinitionStatus::Deleted))
            .into_tuple()
            .all(&txn)
            .await?;
        let referenced: HashSet<i32> =
            alert_definition_service::live_check_references(&txn, &deleted_ids).await?;
        let detached: Vec<i32> = deleted_ids
            .into_iter()
            .filter(|id| !referenced.contains(id))
            .collect();

        if detached.is_empty() {
            txn.rollback().await?;
            debug!("No detached check definitions to remove.");
            return Ok(0);
        }

        let result = Checks::delete_many()
            .filter(check_definition::Column::Id.is_in(detached))
            .filter(check_definition::Column::Status.eq(DefinitionStatus::Deleted))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(
            removed = result.rows_affected,
            still_referenced = referenced.len(),
            snapshot_id,
            "Removed detached check definitions."
        );
        Ok(result.rows_affected)
    }

    /// Checks changed or disabled after `since`, relative to the current snapshot.
    pub async fn diff(&self, since: Option<i64>) -> Result<CheckDefinitionsDiff, AppError> {
        definition_store::diff::<Checks, _>(&self.db, since).await
    }

    pub async fn current_snapshot_id(&self) -> Result<i64, AppError> {
        Ok(snapshot_service::current_id(&*self.db, DefinitionKind::Check).await?)
    }

    /// Distinct owning teams of every live check.
    pub async fn live_owning_teams(&self) -> Result<Vec<String>, AppError> {
        let teams: Vec<String> = live::<Checks>()
            .select_only()
            .column(check_definition::Column::OwningTeam)
            .distinct()
            .into_tuple()
            .all(&*self.db)
            .await?;
        Ok(teams)
    }
}

fn live_for_reference(check_id: i32) -> Select<Checks> {
    live::<Checks>()
        .filter(check_definition::Column::Id.eq(check_id))
        .lock_shared()
}

/// Reads the live check an alert is about to reference and holds a share lock on it
/// until `conn`'s transaction ends.
///
/// A concurrent soft delete of the check waits for the alert to commit, so detach
/// cleanup always sees the new reference. On SQLite the write transaction already
/// serialises writers and no row lock is emitted.
pub async fn lock_live_for_reference<C: ConnectionTrait>(
    conn: &C,
    check_id: i32,
) -> Result<Option<check_definition::Model>, AppError> {
    Ok(live_for_reference(check_id).one(conn).await?)
}

async fn find_live_by_source_url<C: ConnectionTrait>(
    conn: &C,
    source_url: &str,
) -> Result<Option<check_definition::Model>, AppError> {
    Ok(live::<Checks>()
        .filter(check_definition::Column::SourceUrl.eq(source_url))
        .order_by_asc(check_definition::Column::Id)
        .one(conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    #[test]
    fn test_reference_lookup_takes_share_lock_on_postgres() {
        let sql = live_for_reference(7).build(DbBackend::Postgres).to_string();
        assert!(sql.contains("FOR SHARE"), "{sql}");
    }

    #[test]
    fn test_reference_lookup_has_no_lock_clause_on_sqlite() {
        let sql = live_for_reference(7).build(DbBackend::Sqlite).to_string();
        assert!(!sql.contains("FOR SHARE"), "{sql}");
    }
}
