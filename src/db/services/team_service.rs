use std::collections::BTreeSet;

use crate::db::services::{AlertDefinitionService, CheckDefinitionService};
use crate::error::AppError;

/// Union of every team named by a live check or alert, sorted and without duplicates.
pub async fn get_all_teams(
    checks: &CheckDefinitionService,
    alerts: &AlertDefinitionService,
) -> Result<Vec<String>, AppError> {
    let mut teams: BTreeSet<String> = checks.live_owning_teams().await?.into_iter().collect();
    teams.extend(alerts.live_teams().await?);
    Ok(teams.into_iter().collect())
}
