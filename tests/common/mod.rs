#![allow(dead_code)]

use definition_registry::db::enums::DefinitionStatus;
use definition_registry::db::models::{AlertDefinitionImport, CheckDefinitionImport};
use definition_registry::{Authority, RegistryService};
use sea_orm::{ConnectOptions, Database};
use serde_json::json;

/// Fresh registry on a private in-memory SQLite database.
///
/// A single pooled connection keeps every query on the same in-memory database.
pub async fn registry() -> RegistryService {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_owned());
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(opt)
        .await
        .expect("failed to open in-memory database");

    let registry = RegistryService::new(db);
    registry
        .setup_schema()
        .await
        .expect("failed to create registry schema");
    registry
}

pub fn user(name: &str, teams: &[&str]) -> Authority {
    Authority::new(name, teams.iter().copied())
}

pub fn check_import(name: &str, owning_team: Option<&str>) -> CheckDefinitionImport {
    CheckDefinitionImport {
        id: None,
        name: name.to_string(),
        description: Some(format!("{name} check")),
        owning_team: owning_team.map(str::to_string),
        source_url: None,
        command: "http('http://localhost:8080/health').code()".to_string(),
        entities: json!([{ "type": "host" }]),
        interval: 60,
        status: DefinitionStatus::Active,
    }
}

pub fn alert_import(name: &str, check_id: i32, owning_team: Option<&str>) -> AlertDefinitionImport {
    AlertDefinitionImport {
        id: None,
        name: name.to_string(),
        description: None,
        owning_team: owning_team.map(str::to_string),
        team: None,
        responsible_team: None,
        check_definition_id: check_id,
        condition: "value != 200".to_string(),
        priority: 2,
        entities: json!([]),
        notifications: json!([]),
        status: DefinitionStatus::Active,
    }
}
