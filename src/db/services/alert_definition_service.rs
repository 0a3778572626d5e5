use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::entities::alert_definition;
use crate::db::enums::{DefinitionKind, DefinitionStatus};
use crate::db::models::{
    AlertDefinition, AlertDefinitionImport, AlertDefinitionsDiff, DefinitionsSnapshot,
    DeleteResult, ImportResult,
};
use crate::db::services::definition_store::{self, live};
use crate::db::services::{check_definition_service, snapshot_service};
use crate::error::AppError;
use crate::permission::{self, Authority, Decision, DenialReason, NewDefinition, Permission};

type Alerts = alert_definition::Entity;

#[derive(Clone)]
pub struct AlertDefinitionService {
    db: Arc<DatabaseConnection>,
}

impl AlertDefinitionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates an alert or updates the live one matched by id, then by `(name, owning team)`.
    /// The referenced check must exist and not be deleted.
    pub async fn create_or_update(
        &self,
        import: AlertDefinitionImport,
        authority: &Authority,
    ) -> Result<ImportResult<AlertDefinition>, AppError> {
        import.validate()?;

        let txn = self.db.begin().await?;
        let snapshot_id = snapshot_service::next_id(&txn, DefinitionKind::Alert).await?;

        // Share-locks the check until commit so it cannot be deleted under the new reference.
        if check_definition_service::lock_live_for_reference(&txn, import.check_definition_id)
            .await?
            .is_none()
        {
            txn.rollback().await?;
            return Err(AppError::InvalidInput(format!(
                "check definition {} does not exist",
                import.check_definition_id
            )));
        }

        let name = import.name.trim().to_string();
        let requested_team = import
            .owning_team
            .as_deref()
            .map(str::trim)
            .filter(|team| !team.is_empty());

        let mut existing = match import.id {
            Some(id) => definition_store::find_live_by_id::<Alerts, _>(&txn, id).await?,
            None => None,
        };
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
                    "Alert definition import denied."
                );
                return self.denied(None).await;
            }
        };
        if existing.is_none() {
            existing = definition_store::find_live_by_key::<Alerts, _>(&txn, &name, &owning_team).await?;
        }

        let Some(current) = existing else {
            let decision = permission::evaluate(
                Permission::AddAlert,
                &NewDefinition {
                    kind: DefinitionKind::Alert,
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
                    "Alert definition import denied."
                );
                return self.denied(None).await;
            }

            let now = Utc::now();
            let model = alert_definition::ActiveModel {
                name: Set(name),
                description: Set(import.description),
                owning_team: Set(owning_team),
                team: Set(non_blank(import.team)),
                responsible_team: Set(non_blank(import.responsible_team)),
                check_definition_id: Set(import.check_definition_id),
                condition: Set(import.condition),
                priority: Set(import.priority),
                entities: Set(import.entities),
                notifications: Set(import.notifications),
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
                alert_id = model.id,
                check_id = model.check_definition_id,
                snapshot_id,
                user = %authority.user_name(),
                "Created alert definition."
            );
            return Ok(ImportResult {
                entity: Some(model.into()),
                is_new_entity: true,
                permission_denied: false,
                snapshot_id,
            });
        };

        let decision = permission::evaluate(Permission::ModifyAlert, &current, authority);
        if !decision.is_granted() {
            txn.rollback().await?;
            warn!(
                user = %authority.user_name(),
                alert_id = current.id,
                %decision,
                "Alert definition update denied."
            );
            return self.denied(Some(current.into())).await;
        }

        if current.name != name || current.owning_team != owning_team {
            if let Some(other) =
                definition_store::find_live_by_key::<Alerts, _>(&txn, &name, &owning_team).await?
            {
                if other.id != current.id {
                    txn.rollback().await?;
                    return Err(AppError::DuplicateDefinition(format!(
                        "alert '{name}' already exists for team {owning_team} (id {})",
                        other.id
                    )));
                }
            }
        }

        let alert_id = current.id;
        let mut active: alert_definition::ActiveModel = current.into_active_model();
        active.name = Set(name);
        active.description = Set(import.description);
        active.owning_team = Set(owning_team);
        active.team = Set(non_blank(import.team));
        active.responsible_team = Set(non_blank(import.responsible_team));
        active.check_definition_id = Set(import.check_definition_id);
        active.condition = Set(import.condition);
        active.priority = Set(import.priority);
        active.entities = Set(import.entities);
        active.notifications = Set(import.notifications);
        active.status = Set(import.status);
        active.last_modified_by = Set(authority.user_name().to_string());
        active.last_modified_snapshot_id = Set(snapshot_id);
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            alert_id,
            snapshot_id,
            user = %authority.user_name(),
            "Updated alert definition."
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
        entity: Option<AlertDefinition>,
    ) -> Result<ImportResult<AlertDefinition>, AppError> {
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
    ) -> Result<DefinitionsSnapshot<AlertDefinition>, AppError> {
        definition_store::get_by_status::<Alerts, _>(&self.db, status).await
    }

    pub async fn get_by_ids(
        &self,
        status: Option<DefinitionStatus>,
        ids: &[i32],
    ) -> Result<Vec<AlertDefinition>, AppError> {
        definition_store::get_by_ids::<Alerts, _>(&self.db, status, ids).await
    }

    pub async fn get_by_owning_teams(
        &self,
        status: Option<DefinitionStatus>,
        teams: &[String],
    ) -> Result<Vec<AlertDefinition>, AppError> {
        definition_store::get_by_owning_teams::<Alerts, _>(&self.db, status, teams).await
    }

    pub async fn get_by_check(
        &self,
        status: Option<DefinitionStatus>,
        check_id: i32,
    ) -> Result<Vec<AlertDefinition>, AppError> {
        let rows = definition_store::with_status(Alerts::find(), status)
            .filter(alert_definition::Column::CheckDefinitionId.eq(check_id))
            .order_by_asc(alert_definition::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn delete(
        &self,
        authority: &Authority,
        name: &str,
        owning_team: &str,
    ) -> Result<DeleteResult<AlertDefinition>, AppError> {
        let txn = self.db.begin().await?;
        let snapshot_id = snapshot_service::next_id(&txn, DefinitionKind::Alert).await?;

        let Some(current) =
            definition_store::find_live_by_key::<Alerts, _>(&txn, name.trim(), owning_team.trim())
                .await?
        else {
            txn.rollback().await?;
            debug!(name, owning_team, "No live alert definition to delete.");
            return Ok(DeleteResult {
                entity: None,
                permission_denied: false,
            });
        };

        let decision = permission::evaluate(Permission::DeleteAlert, &current, authority);
        if !decision.is_granted() {
            txn.rollback().await?;
            warn!(
                user = %authority.user_name(),
                alert_id = current.id,
                %decision,
                "Alert definition delete denied."
            );
            return Ok(DeleteResult {
                entity: Some(current.into()),
                permission_denied: true,
            });
        }

        let alert_id = current.id;
        let mut active: alert_definition::ActiveModel = current.into_active_model();
        active.status = Set(DefinitionStatus::Deleted);
        active.last_modified_by = Set(authority.user_name().to_string());
        active.last_modified_snapshot_id = Set(snapshot_id);
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            alert_id,
            snapshot_id,
            user = %authority.user_name(),
            "Marked alert definition as deleted."
        );
        Ok(DeleteResult {
            entity: Some(model.into()),
            permission_denied: false,
        })
    }

    pub async fn diff(&self, since: Option<i64>) -> Result<AlertDefinitionsDiff, AppError> {
        definition_store::diff::<Alerts, _>(&self.db, since).await
    }

    pub async fn current_snapshot_id(&self) -> Result<i64, AppError> {
        Ok(snapshot_service::current_id(&*self.db, DefinitionKind::Alert).await?)
    }

    /// Every team named by a live alert: owning, alerting and responsible teams.
    pub async fn live_teams(&self) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String, Option<String>, Option<String>)> = live::<Alerts>()
            .select_only()
            .column(alert_definition::Column::OwningTeam)
            .column(alert_definition::Column::Team)
            .column(alert_definition::Column::ResponsibleTeam)
            .into_tuple()
            .all(&*self.db)
            .await?;

        let mut teams = Vec::with_capacity(rows.len());
        for (owning_team, team, responsible_team) in rows {
            teams.push(owning_team);
            teams.extend(team);
            teams.extend(responsible_team);
        }
        Ok(teams)
    }
}

/// Which of `check_ids` are referenced by at least one live alert.
pub(crate) async fn live_check_references<C: ConnectionTrait>(
    conn: &C,
    check_ids: &[i32],
) -> Result<HashSet<i32>, AppError> {
    if check_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let referenced: Vec<i32> = live::<Alerts>()
        .select_only()
        .column(alert_definition::Column::CheckDefinitionId)
        .distinct()
        .filter(alert_definition::Column::CheckDefinitionId.is_in(check_ids.iter().copied()))
        .into_tuple()
        .all(conn)
        .await?;
    Ok(referenced.into_iter().collect())
}

fn non_blank(team: Option<String>) -> Option<String> {
    team.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
