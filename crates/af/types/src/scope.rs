use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AfError;
use crate::node::NodeId;

/// A local assumption opened by a `local_assume` node.
///
/// Active until a matching `local_discharge` closes it. Double-discharge is
/// rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScopeEntry {
    pub opened_by: NodeId,
    pub statement: String,
    pub opened_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharged_at: Option<DateTime<Utc>>,
}

impl ScopeEntry {
    pub fn new(
        opened_by: NodeId,
        statement: impl Into<String>,
        opened_at: DateTime<Utc>,
    ) -> Result<Self, AfError> {
        let statement = statement.into();
        if statement.trim().is_empty() {
            return Err(AfError::Validation(format!(
                "scope opened by {opened_by} has an empty statement"
            )));
        }
        Ok(ScopeEntry {
            opened_by,
            statement,
            opened_at,
            discharged_at: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.discharged_at.is_none()
    }

    pub fn discharge(&mut self, at: DateTime<Utc>) -> Result<(), AfError> {
        if self.discharged_at.is_some() {
            return Err(AfError::ScopeClosed(format!(
                "assumption opened by {} is already discharged",
                self.opened_by
            )));
        }
        self.discharged_at = Some(at);
        Ok(())
    }
}
