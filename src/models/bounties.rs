use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BountyStatus {
    Pending,
    /// Claimed for a transfer that has not been confirmed yet.
    Releasing,
    /// Claimed for a refund that has not been confirmed yet.
    Refunding,
    Released,
    Refunded,
}

impl BountyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BountyStatus::Pending => "pending",
            BountyStatus::Releasing => "releasing",
            BountyStatus::Refunding => "refunding",
            BountyStatus::Released => "released",
            BountyStatus::Refunded => "refunded",
        }
    }

    /// The terminal state an in-flight claim settles into.
    pub fn settles_as(&self) -> Option<BountyStatus> {
        match self {
            BountyStatus::Releasing => Some(BountyStatus::Released),
            BountyStatus::Refunding => Some(BountyStatus::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BountyStatus::Released | BountyStatus::Refunded)
    }
}

impl fmt::Display for BountyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("unknown bounty status: {0}")]
pub struct UnknownStatus(pub String);

impl TryFrom<String> for BountyStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(BountyStatus::Pending),
            "releasing" => Ok(BountyStatus::Releasing),
            "refunding" => Ok(BountyStatus::Refunding),
            "released" => Ok(BountyStatus::Released),
            "refunded" => Ok(BountyStatus::Refunded),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, sqlx::FromRow)]
pub struct Bounty {
    pub id: i64,
    pub problem_id: i64,
    pub user_id: i64,
    pub amount: i64,
    #[sqlx(try_from = "String")]
    pub status: BountyStatus,
    pub payment_intent_id: Option<String>,
    /// Set while a release is claimed and after it settles.
    pub solver_id: Option<i64>,
    pub settlement_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FundBounty {
    pub problem_id: i64,
    pub amount: i64,
    pub payment_method_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReleaseBounty {
    pub solver_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_rendering() {
        for status in [
            BountyStatus::Pending,
            BountyStatus::Releasing,
            BountyStatus::Refunding,
            BountyStatus::Released,
            BountyStatus::Refunded,
        ] {
            assert_eq!(BountyStatus::try_from(status.to_string()), Ok(status));
        }
        assert!(BountyStatus::try_from("paid".to_string()).is_err());
    }

    #[test]
    fn only_claims_settle() {
        assert_eq!(
            BountyStatus::Releasing.settles_as(),
            Some(BountyStatus::Released)
        );
        assert_eq!(
            BountyStatus::Refunding.settles_as(),
            Some(BountyStatus::Refunded)
        );
        assert_eq!(BountyStatus::Pending.settles_as(), None);
        assert_eq!(BountyStatus::Released.settles_as(), None);
        assert!(!BountyStatus::Releasing.is_terminal());
        assert!(BountyStatus::Refunded.is_terminal());
    }
}
