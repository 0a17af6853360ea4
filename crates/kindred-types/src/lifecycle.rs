//! Two-sided match handshake.
//!
//! Each participant owns one `SideStatus`. The match-level phase is derived
//! from the pair and never stored independently of it; `MatchSides::apply`
//! is the only place a side changes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideStatus {
    Pending,
    Accepted,
    Rejected,
}

impl SideStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn from_accept(accept: bool) -> Self {
        if accept { Self::Accept } else { Self::Reject }
    }

    fn status(self) -> SideStatus {
        match self {
            Self::Accept => SideStatus::Accepted,
            Self::Reject => SideStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    /// At least one side is still pending and nobody has rejected.
    Unconfirmed,
    /// Both sides accepted.
    Confirmed,
    /// Either side rejected. History stays readable, nothing new is accepted.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSides {
    pub a: SideStatus,
    pub b: SideStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub sides: MatchSides,
    /// False when the decision repeated the side's current status.
    pub changed: bool,
    /// True only on the write that moved the match into `Confirmed`.
    pub became_confirmed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("a rejected side cannot accept again")]
    DecisionFinal,
}

impl MatchSides {
    pub fn pending() -> Self {
        Self {
            a: SideStatus::Pending,
            b: SideStatus::Pending,
        }
    }

    pub fn get(&self, side: Side) -> SideStatus {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        if self.a == SideStatus::Rejected || self.b == SideStatus::Rejected {
            MatchPhase::Closed
        } else if self.a == SideStatus::Accepted && self.b == SideStatus::Accepted {
            MatchPhase::Confirmed
        } else {
            MatchPhase::Unconfirmed
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.phase() == MatchPhase::Confirmed
    }

    /// Writes `decision` for `side`.
    ///
    /// Pending may move either way, an accepted side may still withdraw by
    /// rejecting, a rejected side is final.
    pub fn apply(&self, side: Side, decision: Decision) -> Result<Transition, TransitionError> {
        let current = self.get(side);
        let target = decision.status();

        if current == target {
            return Ok(Transition {
                sides: *self,
                changed: false,
                became_confirmed: false,
            });
        }
        if current == SideStatus::Rejected {
            return Err(TransitionError::DecisionFinal);
        }

        let mut next = *self;
        match side {
            Side::A => next.a = target,
            Side::B => next.b = target,
        }

        Ok(Transition {
            sides: next,
            changed: true,
            became_confirmed: !self.is_confirmed() && next.is_confirmed(),
        })
    }
}
