use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::entities::{alert_definition, check_definition};
use crate::db::enums::DefinitionStatus;
use crate::error::AppError;

// --- Check definitions ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDefinition {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub owning_team: String,
    pub source_url: Option<String>,
    pub command: String,
    pub entities: Value,
    pub interval: i64,
    pub status: DefinitionStatus,
    pub created_by: String,
    pub last_modified_by: String,
    pub last_modified_snapshot_id: i64,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl From<check_definition::Model> for CheckDefinition {
    fn from(m: check_definition::Model) -> Self {
        CheckDefinition {
            id: m.id,
            name: m.name,
            description: m.description,
            owning_team: m.owning_team,
            source_url: m.source_url,
            command: m.command,
            entities: m.entities,
            interval: m.interval,
            status: m.status,
            created_by: m.created_by,
            last_modified_by: m.last_modified_by,
            last_modified_snapshot_id: m.last_modified_snapshot_id,
            created_at: m.created_at,
            last_modified: m.updated_at,
        }
    }
}

/// Payload of a create-or-update call for a check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDefinitionImport {
    #[serde(default)]
    pub id: Option<i32>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owning_team: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    pub command: String,
    #[serde(default = "empty_entities")]
    pub entities: Value,
    pub interval: i64,
    #[serde(default = "default_status")]
    pub status: DefinitionStatus,
}

impl CheckDefinitionImport {
    pub fn validate(&self) -> Result<(), AppError> {
        require_non_empty("name", &self.name)?;
        require_non_empty("command", &self.command)?;
        if self.interval <= 0 {
            return Err(AppError::InvalidInput(format!(
                "interval must be positive, got {}",
                self.interval
            )));
        }
        require_entity_list(&self.entities)?;
        require_importable_status(self.status)
    }
}

// --- Alert definitions ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDefinition {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub owning_team: String,
    pub team: Option<String>,
    pub responsible_team: Option<String>,
    pub check_definition_id: i32,
    pub condition: String,
    pub priority: i32,
    pub entities: Value,
    pub notifications: Value,
    pub status: DefinitionStatus,
    pub created_by: String,
    pub last_modified_by: String,
    pub last_modified_snapshot_id: i64,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl From<alert_definition::Model> for AlertDefinition {
    fn from(m: alert_definition::Model) -> Self {
        AlertDefinition {
            id: m.id,
            name: m.name,
            description: m.description,
            owning_team: m.owning_team,
            team: m.team,
            responsible_team: m.responsible_team,
            check_definition_id: m.check_definition_id,
            condition: m.condition,
            priority: m.priority,
            entities: m.entities,
            notifications: m.notifications,
            status: m.status,
            created_by: m.created_by,
            last_modified_by: m.last_modified_by,
            last_modified_snapshot_id: m.last_modified_snapshot_id,
            created_at: m.created_at,
            last_modified: m.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDefinitionImport {
    #[serde(default)]
    pub id: Option<i32>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owning_team: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub responsible_team: Option<String>,
    pub check_definition_id: i32,
    pub condition: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "empty_entities")]
    pub entities: Value,
    #[serde(default = "empty_entities")]
    pub notifications: Value,
    #[serde(default = "default_status")]
    pub status: DefinitionStatus,
}

impl AlertDefinitionImport {
    pub fn validate(&self) -> Result<(), AppError> {
        require_non_empty("name", &self.name)?;
        require_non_empty("condition", &self.condition)?;
        if !(1..=3).contains(&self.priority) {
            return Err(AppError::InvalidInput(format!(
                "priority must be between 1 and 3, got {}",
                self.priority
            )));
        }
        if self.check_definition_id <= 0 {
            return Err(AppError::InvalidInput(
                "checkDefinitionId is required".to_string(),
            ));
        }
        require_entity_list(&self.entities)?;
        if !self.notifications.is_array() {
            return Err(AppError::InvalidInput(
                "notifications must be a JSON array".to_string(),
            ));
        }
        require_importable_status(self.status)
    }
}

// --- Results ---

/// Outcome of a create-or-update. A denied import carries the stored row, if any, untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult<T> {
    pub entity: Option<T>,
    pub is_new_entity: bool,
    pub permission_denied: bool,
    pub snapshot_id: i64,
}

/// Outcome of a soft delete. `entity` is `None` when nothing matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult<T> {
    pub entity: Option<T>,
    pub permission_denied: bool,
}

/// A query result pinned to the snapshot it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionsSnapshot<T> {
    pub snapshot_id: i64,
    pub definitions: Vec<T>,
}

/// Changes since a baseline snapshot. Absent lists mean "nothing in this category".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionsDiff<T> {
    pub snapshot_id: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub disabled_definitions: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub changed_definitions: Option<Vec<T>>,
}

pub type CheckDefinitionsDiff = DefinitionsDiff<CheckDefinition>;
pub type AlertDefinitionsDiff = DefinitionsDiff<AlertDefinition>;

fn empty_entities() -> Value {
    Value::Array(Vec::new())
}

fn default_status() -> DefinitionStatus {
    DefinitionStatus::Active
}

fn default_priority() -> i32 {
    2
}

fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_entity_list(entities: &Value) -> Result<(), AppError> {
    if !entities.is_array() {
        return Err(AppError::InvalidInput(
            "entities must be a JSON array".to_string(),
        ));
    }
    Ok(())
}

fn require_importable_status(status: DefinitionStatus) -> Result<(), AppError> {
    if status == DefinitionStatus::Deleted {
        return Err(AppError::InvalidInput(
            "status DELETED cannot be imported, delete the definition instead".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check_import() -> CheckDefinitionImport {
        serde_json::from_value(json!({
            "name": "http availability",
            "command": "http('http://localhost/health').code()",
            "interval": 60
        }))
        .unwrap()
    }

    #[test]
    fn test_import_defaults() {
        let import = check_import();
        assert_eq!(import.status, DefinitionStatus::Active);
        assert_eq!(import.entities, json!([]));
        assert!(import.owning_team.is_none());
        assert!(import.validate().is_ok());
    }

    #[test]
    fn test_import_rejects_blank_name() {
        let mut import = check_import();
        import.name = "   ".to_string();
        assert!(matches!(import.validate(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_import_rejects_deleted_status() {
        let mut import = check_import();
        import.status = DefinitionStatus::Deleted;
        assert!(matches!(import.validate(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_alert_import_rejects_out_of_range_priority() {
        let import: AlertDefinitionImport = serde_json::from_value(json!({
            "name": "latency too high",
            "checkDefinitionId": 7,
            "condition": ">100",
            "priority": 9
        }))
        .unwrap();
        assert!(matches!(import.validate(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_empty_diff_serializes_without_lists() {
        let diff: CheckDefinitionsDiff = DefinitionsDiff {
            snapshot_id: 4,
            disabled_definitions: None,
            changed_definitions: None,
        };
        assert_eq!(serde_json::to_value(&diff).unwrap(), json!({ "snapshotId": 4 }));
    }
}
