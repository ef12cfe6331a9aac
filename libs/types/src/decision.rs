//! Actions produced by the decision stage and the context it reads

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::trading::Side;

/// Discrete trading action applied by the position service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Ignore,
    Open,
    OpenSmall,
    Add,
    AddSmall,
    Reduce,
    #[serde(rename = "TightenSL")]
    TightenSL,
    Close,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Ignore => "Ignore",
            Action::Open => "Open",
            Action::OpenSmall => "OpenSmall",
            Action::Add => "Add",
            Action::AddSmall => "AddSmall",
            Action::Reduce => "Reduce",
            Action::TightenSL => "TightenSL",
            Action::Close => "Close",
        }
    }

    /// Whether applying this action submits an order
    pub fn places_order(&self) -> bool {
        !matches!(self, Action::Ignore | Action::TightenSL)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action plus the rule that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
    /// Fraction of the position to shed, set only for `Reduce`
    pub reduce_percent: Option<f64>,
}

impl Decision {
    pub fn new(action: Action, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
            reduce_percent: None,
        }
    }

    pub fn ignore(reason: impl Into<String>) -> Self {
        Self::new(Action::Ignore, reason)
    }

    pub fn reduce(percent: f64, reason: impl Into<String>) -> Self {
        Self {
            action: Action::Reduce,
            reason: reason.into(),
            reduce_percent: Some(percent),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.action, self.reason)
    }
}

/// Position and trend facts handed to the signal manager's `decide`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub has_l2_position: bool,
    pub l2_entry: Option<Decimal>,
    /// Held side of the L2 position, when one exists
    pub l2_side: Option<Side>,
    /// Unrealized PnL in multiples of initial risk
    pub unrealized_r: f64,
    /// Trend direction agrees with the signal side
    pub trend_ok: bool,
    pub strong_short_tf: bool,
}
