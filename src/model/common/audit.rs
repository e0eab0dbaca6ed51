use std::fmt::{Display, Formatter};
use std::str::FromStr;

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed enumeration of auditable actions. Every state-changing
/// operation in the system appends exactly one entry tagged with one of
/// these kinds.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    CandidateRegistered,
    CandidateApproved,
    CandidateRejected,
    CandidateUpdated,
    CandidateDeleted,
    ElectionCreated,
    ElectionUpdated,
    ElectionDeleted,
    ElectionStarted,
    ElectionStopped,
    VoteCast,
    VoterRegistered,
    SettingsUpdated,
}

impl ActionKind {
    /// The wire name of this kind, as used in audit entries and filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CandidateRegistered => "CANDIDATE_REGISTERED",
            Self::CandidateApproved => "CANDIDATE_APPROVED",
            Self::CandidateRejected => "CANDIDATE_REJECTED",
            Self::CandidateUpdated => "CANDIDATE_UPDATED",
            Self::CandidateDeleted => "CANDIDATE_DELETED",
            Self::ElectionCreated => "ELECTION_CREATED",
            Self::ElectionUpdated => "ELECTION_UPDATED",
            Self::ElectionDeleted => "ELECTION_DELETED",
            Self::ElectionStarted => "ELECTION_STARTED",
            Self::ElectionStopped => "ELECTION_STOPPED",
            Self::VoteCast => "VOTE_CAST",
            Self::VoterRegistered => "VOTER_REGISTERED",
            Self::SettingsUpdated => "SETTINGS_UPDATED",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown action kind: {0}")]
pub struct UnknownActionKind(String);

impl FromStr for ActionKind {
    type Err = UnknownActionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CANDIDATE_REGISTERED" => Ok(Self::CandidateRegistered),
            "CANDIDATE_APPROVED" => Ok(Self::CandidateApproved),
            "CANDIDATE_REJECTED" => Ok(Self::CandidateRejected),
            "CANDIDATE_UPDATED" => Ok(Self::CandidateUpdated),
            "CANDIDATE_DELETED" => Ok(Self::CandidateDeleted),
            "ELECTION_CREATED" => Ok(Self::ElectionCreated),
            "ELECTION_UPDATED" => Ok(Self::ElectionUpdated),
            "ELECTION_DELETED" => Ok(Self::ElectionDeleted),
            "ELECTION_STARTED" => Ok(Self::ElectionStarted),
            "ELECTION_STOPPED" => Ok(Self::ElectionStopped),
            "VOTE_CAST" => Ok(Self::VoteCast),
            "VOTER_REGISTERED" => Ok(Self::VoterRegistered),
            "SETTINGS_UPDATED" => Ok(Self::SettingsUpdated),
            other => Err(UnknownActionKind(other.to_string())),
        }
    }
}

impl From<ActionKind> for Bson {
    fn from(kind: ActionKind) -> Self {
        to_bson(&kind).expect("Serialisation is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_roundtrip() {
        let kinds = [
            ActionKind::CandidateRegistered,
            ActionKind::CandidateApproved,
            ActionKind::CandidateRejected,
            ActionKind::CandidateUpdated,
            ActionKind::CandidateDeleted,
            ActionKind::ElectionCreated,
            ActionKind::ElectionUpdated,
            ActionKind::ElectionDeleted,
            ActionKind::ElectionStarted,
            ActionKind::ElectionStopped,
            ActionKind::VoteCast,
            ActionKind::VoterRegistered,
            ActionKind::SettingsUpdated,
        ];
        for kind in kinds {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!("VOTE_DELETED".parse::<ActionKind>().is_err());
    }
}
