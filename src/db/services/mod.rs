//! Definition store, snapshot sequencer and diff engine.
//!
//! Each mutation runs in one transaction that first advances the kind's snapshot
//! counter, so the row write and its snapshot stamp commit or roll back together.

pub mod alert_definition_service;
pub mod check_definition_service;
pub mod definition_store;
pub mod diff_service;
pub mod snapshot_service;
pub mod team_service;

pub use alert_definition_service::AlertDefinitionService;
pub use check_definition_service::CheckDefinitionService;
pub use team_service::get_all_teams;
