//! Role-based redaction of financial figures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::Figure;
use crate::ledger::LedgerError;

/// Roles of people viewing reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    /// Full access.
    Owner,
    /// Full access except ownership transfer.
    Admin,
    /// Books vendor bills and payments.
    Accountant,
    /// Runs the warehouse; sees unit counts only.
    InventoryManager,
    /// Floor staff.
    Staff,
    /// Read-only access.
    Viewer,
}

impl ViewerRole {
    /// Returns true if this role may see money figures.
    #[must_use]
    pub const fn has_financial_access(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin | Self::Accountant)
    }
}

impl std::fmt::Display for ViewerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Admin => write!(f, "admin"),
            Self::Accountant => write!(f, "accountant"),
            Self::InventoryManager => write!(f, "inventory_manager"),
            Self::Staff => write!(f, "staff"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

/// What a viewer may see; also the dashboard cache partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeLevel {
    /// Unit counts and money.
    Financial,
    /// Unit counts only.
    UnitsOnly,
}

/// Decides which figures a viewer sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedactionPolicy {
    level: PrivilegeLevel,
}

impl RedactionPolicy {
    /// Policy for a viewer role.
    #[must_use]
    pub fn for_role(role: ViewerRole) -> Self {
        let level = if role.has_financial_access() {
            PrivilegeLevel::Financial
        } else {
            PrivilegeLevel::UnitsOnly
        };
        Self { level }
    }

    /// The viewer's privilege level.
    #[must_use]
    pub fn level(&self) -> PrivilegeLevel {
        self.level
    }

    /// Returns the value or `RedactionPolicyViolation`.
    pub fn reveal(&self, value: Decimal) -> Result<Decimal, LedgerError> {
        match self.level {
            PrivilegeLevel::Financial => Ok(value),
            PrivilegeLevel::UnitsOnly => Err(LedgerError::RedactionPolicyViolation),
        }
    }

    /// Wraps a financial value, turning a policy violation into the sentinel.
    #[must_use]
    pub fn financial(&self, value: Decimal) -> Figure {
        self.reveal(value).map_or(Figure::Redacted, Figure::Visible)
    }
}
