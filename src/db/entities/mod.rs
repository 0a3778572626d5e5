//! SeaORM entities backing the definition registry.

pub mod alert_definition;
pub mod check_definition;
pub mod definition_snapshot;

