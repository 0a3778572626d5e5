//! Registry service: the entry point upstream API and CLI layers call.

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::RegistryConfig;
use crate::db::enums::{DefinitionKind, DefinitionStatus};
use crate::db::models::{
    AlertDefinition, AlertDefinitionImport, AlertDefinitionsDiff, CheckDefinition,
    CheckDefinitionImport, CheckDefinitionsDiff, DefinitionsSnapshot, DeleteResult, ImportResult,
};
use crate::db::schema;
use crate::db::services::{self as db_services, AlertDefinitionService, CheckDefinitionService};
use crate::error::AppError;
use crate::permission::Authority;

#[derive(Clone)]
pub struct RegistryService {
    db: Arc<DatabaseConnection>,
    checks: CheckDefinitionService,
    alerts: AlertDefinitionService,
}

impl RegistryService {
    pub fn new(db: DatabaseConnection) -> Self {
        let db = Arc::new(db);
        Self {
            checks: CheckDefinitionService::new(db.clone()),
            alerts: AlertDefinitionService::new(db.clone()),
            db,
        }
    }

    /// Connects with the configured pool size and makes sure the schema exists.
    pub async fn connect(config: &RegistryConfig) -> Result<Self, AppError> {
        let mut opt = ConnectOptions::new(config.database_url.to_owned());
        opt.max_connections(config.max_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let db = Database::connect(opt).await?;
        let registry = Self::new(db);
        registry.setup_schema().await?;
        info!(
            max_connections = config.max_connections,
            "Definition registry connected."
        );
        Ok(registry)
    }

    pub async fn setup_schema(&self) -> Result<(), AppError> {
        schema::setup(&self.db).await?;
        Ok(())
    }

    // --- Checks ---

    pub async fn create_or_update_check_definition(
        &self,
        import: CheckDefinitionImport,
        authority: &Authority,
    ) -> Result<ImportResult<CheckDefinition>, AppError> {
        self.checks.create_or_update(import, authority).await
    }

    pub async fn get_check_definitions(
        &self,
        status: Option<DefinitionStatus>,
    ) -> Result<DefinitionsSnapshot<CheckDefinition>, AppError> {
        self.checks.get_by_status(status).await
    }

    pub async fn get_check_definitions_by_ids(
        &self,
        status: Option<DefinitionStatus>,
        ids: &[i32],
    ) -> Result<Vec<CheckDefinition>, AppError> {
        self.checks.get_by_ids(status, ids).await
    }

    pub async fn get_check_definitions_by_owning_teams(
        &self,
        status: Option<DefinitionStatus>,
        teams: &[String],
    ) -> Result<Vec<CheckDefinition>, AppError> {
        self.checks.get_by_owning_teams(status, teams).await
    }

    pub async fn get_check_definitions_diff(
        &self,
        since: Option<i64>,
    ) -> Result<CheckDefinitionsDiff, AppError> {
        self.checks.diff(since).await
    }

    pub async fn delete_check_definition(
        &self,
        authority: &Authority,
        name: &str,
        owning_team: &str,
    ) -> Result<DeleteResult<CheckDefinition>, AppError> {
        self.checks.delete(authority, name, owning_team).await
    }

    pub async fn delete_detached_check_definitions(&self) -> Result<u64, AppError> {
        self.checks.delete_detached().await
    }

    // --- Alerts ---

    pub async fn create_or_update_alert_definition(
        &self,
        import: AlertDefinitionImport,
        authority: &Authority,
    ) -> Result<ImportResult<AlertDefinition>, AppError> {
        self.alerts.create_or_update(import, authority).await
    }

    pub async fn get_alert_definitions(
        &self,
        status: Option<DefinitionStatus>,
    ) -> Result<DefinitionsSnapshot<AlertDefinition>, AppError> {
        self.alerts.get_by_status(status).await
    }

    pub async fn get_alert_definitions_by_ids(
        &self,
        status: Option<DefinitionStatus>,
        ids: &[i32],
    ) -> Result<Vec<AlertDefinition>, AppError> {
        self.alerts.get_by_ids(status, ids).await
    }

    pub async fn get_alert_definitions_by_owning_teams(
        &self,
        status: Option<DefinitionStatus>,
        teams: &[String],
    ) -> Result<Vec<AlertDefinition>, AppError> {
        self.alerts.get_by_owning_teams(status, teams).await
    }

    pub async fn get_alert_definitions_by_check(
        &self,
        status: Option<DefinitionStatus>,
        check_id: i32,
    ) -> Result<Vec<AlertDefinition>, AppError> {
        self.alerts.get_by_check(status, check_id).await
    }

    pub async fn get_alert_definitions_diff(
        &self,
        since: Option<i64>,
    ) -> Result<AlertDefinitionsDiff, AppError> {
        self.alerts.diff(since).await
    }

    pub async fn delete_alert_definition(
        &self,
        authority: &Authority,
        name: &str,
        owning_team: &str,
    ) -> Result<DeleteResult<AlertDefinition>, AppError> {
        self.alerts.delete(authority, name, owning_team).await
    }

    // --- Shared ---

    pub async fn current_snapshot_id(&self, kind: DefinitionKind) -> Result<i64, AppError> {
        match kind {
            DefinitionKind::Check => self.checks.current_snapshot_id().await,
            DefinitionKind::Alert => self.alerts.current_snapshot_id().await,
        }
    }

    pub async fn get_all_teams(&self) -> Result<Vec<String>, AppError> {
        db_services::get_all_teams(&self.checks, &self.alerts).await
    }
}
