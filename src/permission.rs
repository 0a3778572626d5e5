//! Team/user capability checks gating every registry mutation.
//!
//! Each mutation kind is a [`Permission`] variant; [`evaluate`] decides it against the
//! definition it targets and the [`Authority`] of the caller. Evaluation is pure and
//! never fails: the result is a [`Decision`] carrying the reason either way.

use std::fmt;

use crate::db::entities::{alert_definition, check_definition};
use crate::db::enums::DefinitionKind;

/// The acting identity: user name plus team memberships, in the order the identity
/// provider listed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    user_name: String,
    teams: Vec<String>,
}

impl Authority {
    pub fn new<I, T>(user_name: impl Into<String>, teams: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for team in teams {
            let team = team.into();
            if !team.trim().is_empty() && !unique.contains(&team) {
                unique.push(team);
            }
        }
        Authority {
            user_name: user_name.into(),
            teams: unique,
        }
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn first_team(&self) -> Option<&str> {
        self.teams.first().map(String::as_str)
    }

    pub fn is_member_of(&self, team: &str) -> bool {
        self.teams.iter().any(|t| t == team)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    AddCheck,
    ModifyCheck,
    DeleteCheck,
    AddAlert,
    ModifyAlert,
    DeleteAlert,
}

impl Permission {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Permission::AddCheck | Permission::ModifyCheck | Permission::DeleteCheck => {
                DefinitionKind::Check
            }
            Permission::AddAlert | Permission::ModifyAlert | Permission::DeleteAlert => {
                DefinitionKind::Alert
            }
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, Permission::AddCheck | Permission::AddAlert)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::AddCheck => "add check definition",
            Permission::ModifyCheck => "modify check definition",
            Permission::DeleteCheck => "delete check definition",
            Permission::AddAlert => "add alert definition",
            Permission::ModifyAlert => "modify alert definition",
            Permission::DeleteAlert => "delete alert definition",
        };
        f.write_str(name)
    }
}

/// What a permission is evaluated against.
pub trait OwnedDefinition {
    fn kind(&self) -> DefinitionKind;
    fn owning_team(&self) -> &str;
    /// `None` for a definition that has not been stored yet.
    fn last_modified_by(&self) -> Option<&str>;
}

impl OwnedDefinition for check_definition::Model {
    fn kind(&self) -> DefinitionKind {
        DefinitionKind::Check
    }

    fn owning_team(&self) -> &str {
        &self.owning_team
    }

    fn last_modified_by(&self) -> Option<&str> {
        Some(&self.last_modified_by)
    }
}

impl OwnedDefinition for alert_definition::Model {
    fn kind(&self) -> DefinitionKind {
        DefinitionKind::Alert
    }

    fn owning_team(&self) -> &str {
        &self.owning_team
    }

    fn last_modified_by(&self) -> Option<&str> {
        Some(&self.last_modified_by)
    }
}

/// A definition about to be created, with its owning team already resolved.
#[derive(Debug, Clone, Copy)]
pub struct NewDefinition<'a> {
    pub kind: DefinitionKind,
    pub owning_team: &'a str,
}

impl OwnedDefinition for NewDefinition<'_> {
    fn kind(&self) -> DefinitionKind {
        self.kind
    }

    fn owning_team(&self) -> &str {
        self.owning_team
    }

    fn last_modified_by(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Granted(GrantReason),
    Denied(DenialReason),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantReason {
    TeamMember { team: String },
    Author,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    NotTeamMember { team: String },
    NoTeams,
    NoTeamOrAuthorMatch { team: String },
    KindMismatch { expected: DefinitionKind, actual: DefinitionKind },
    NotYetCreated,
    AlreadyCreated,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Granted(GrantReason::TeamMember { team }) => {
                write!(f, "granted: member of owning team {team}")
            }
            Decision::Granted(GrantReason::Author) => f.write_str("granted: last modified by caller"),
            Decision::Denied(DenialReason::NotTeamMember { team }) => {
                write!(f, "denied: not a member of team {team}")
            }
            Decision::Denied(DenialReason::NoTeams) => {
                f.write_str("denied: caller belongs to no team")
            }
            Decision::Denied(DenialReason::NoTeamOrAuthorMatch { team }) => write!(
                f,
                "denied: not a member of owning team {team} and not the last author"
            ),
            Decision::Denied(DenialReason::KindMismatch { expected, actual }) => {
                write!(f, "denied: permission applies to {expected}, target is {actual}")
            }
            Decision::Denied(DenialReason::NotYetCreated) => {
                f.write_str("denied: definition does not exist yet")
            }
            Decision::Denied(DenialReason::AlreadyCreated) => {
                f.write_str("denied: definition already exists")
            }
        }
    }
}

/// Decides whether `authority` may perform `permission` on `definition`.
///
/// Creation is granted when the new owning team is one of the caller's teams. Changes
/// to a stored definition are granted to members of its stored owning team and to its
/// last author.
pub fn evaluate<D>(permission: Permission, definition: &D, authority: &Authority) -> Decision
where
    D: OwnedDefinition + ?Sized,
{
    if permission.kind() != definition.kind() {
        return Decision::Denied(DenialReason::KindMismatch {
            expected: permission.kind(),
            actual: definition.kind(),
        });
    }

    let team = definition.owning_team();
    match (permission.is_creation(), definition.last_modified_by()) {
        (true, Some(_)) => Decision::Denied(DenialReason::AlreadyCreated),
        (false, None) => Decision::Denied(DenialReason::NotYetCreated),
        (true, None) if authority.teams().is_empty() => Decision::Denied(DenialReason::NoTeams),
        (true, None) => {
            if authority.is_member_of(team) {
                Decision::Granted(GrantReason::TeamMember {
                    team: team.to_string(),
                })
            } else {
                Decision::Denied(DenialReason::NotTeamMember {
                    team: team.to_string(),
                })
            }
        }
        (false, Some(author)) => {
            if authority.is_member_of(team) {
                Decision::Granted(GrantReason::TeamMember {
                    team: team.to_string(),
                })
            } else if author == authority.user_name() {
                Decision::Granted(GrantReason::Author)
            } else {
                Decision::Denied(DenialReason::NoTeamOrAuthorMatch {
                    team: team.to_string(),
                })
            }
        }
    }
}
