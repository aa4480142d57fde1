use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AfError;
use crate::node::NodeId;

/// Which facet of a node a verifier objects to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeFacet {
    Statement,
    Inference,
    Gap,
    Scope,
}

/// How strongly a challenge blocks progress. Only open `Critical`
/// challenges gate acceptance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Advisory,
    #[default]
    Normal,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Open,
    Resolved,
    Withdrawn,
}

/// A verifier's objection attached to a node.
///
/// `Open` is the only status that contributes to blocking logic; both
/// transitions out of it (`Resolved`, `Withdrawn`) are terminal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub target_node: NodeId,
    pub facet: ChallengeFacet,
    pub reason: String,
    #[serde(default)]
    pub severity: Severity,
    pub status: ChallengeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raised_by: Option<String>,
    pub raised_at: DateTime<Utc>,
}

impl Challenge {
    pub fn is_open(&self) -> bool {
        self.status == ChallengeStatus::Open
    }

    /// Move an open challenge to a terminal status.
    pub fn transition(&mut self, to: ChallengeStatus) -> Result<(), AfError> {
        if to == ChallengeStatus::Open {
            return Err(AfError::InvalidTransition(format!(
                "challenge {} cannot be reopened",
                self.id
            )));
        }
        if self.status != ChallengeStatus::Open {
            return Err(AfError::InvalidTransition(format!(
                "challenge {} is {:?}, only open challenges transition",
                self.id, self.status
            )));
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge() -> Challenge {
        Challenge {
            id: "CH-0a1b2c3d4e".into(),
            target_node: NodeId::root(),
            facet: ChallengeFacet::Gap,
            reason: "missing case n = 0".into(),
            severity: Severity::Normal,
            status: ChallengeStatus::Open,
            raised_by: Some("verifier-1".into()),
            raised_at: Utc::now(),
        }
    }

    #[test]
    fn open_resolves_once() {
        let mut c = challenge();
        c.transition(ChallengeStatus::Resolved).unwrap();
        assert_eq!(c.status, ChallengeStatus::Resolved);
        assert!(c.transition(ChallengeStatus::Withdrawn).is_err());
    }

    #[test]
    fn reopen_is_rejected() {
        let mut c = challenge();
        assert!(c.transition(ChallengeStatus::Open).is_err());
    }

    #[test]
    fn severity_defaults_to_normal() {
        let json = r#"{
            "id": "CH-ff00",
            "target_node": "1",
            "facet": "statement",
            "reason": "unclear",
            "status": "open",
            "raised_at": "2026-01-01T00:00:00Z"
        }"#;
        let c: Challenge = serde_json::from_str(json).unwrap();
        assert_eq!(c.severity, Severity::Normal);
        assert_eq!(c.raised_by, None);
    }

    #[test]
    fn severity_ordering_puts_critical_last() {
        assert!(Severity::Advisory < Severity::Normal);
        assert!(Severity::Normal < Severity::Critical);
    }
}
