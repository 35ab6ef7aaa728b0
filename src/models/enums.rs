//! Shared domain enums
//!
//! Stored as lowercase text columns; conversions go through `as_str` / `FromStr`
//! so an unknown value is rejected when a row is loaded.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// ReservationStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
    Borrowed,
    Returned,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::Borrowed => "borrowed",
            ReservationStatus::Returned => "returned",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    /// Holds a claim on the book (counts toward duplicate-hold checks)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Pending | ReservationStatus::Approved | ReservationStatus::Borrowed
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Rejected | ReservationStatus::Returned | ReservationStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "approved" => Ok(ReservationStatus::Approved),
            "rejected" => Ok(ReservationStatus::Rejected),
            "borrowed" => Ok(ReservationStatus::Borrowed),
            "returned" => Ok(ReservationStatus::Returned),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            _ => Err(format!("Invalid reservation status: {}", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// DamageSeverity / BookCondition
// ---------------------------------------------------------------------------

/// Discrete damage tiers assessed by staff at return
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DamageSeverity {
    Minor,
    Moderate,
    Major,
}

impl DamageSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DamageSeverity::Minor => "Minor",
            DamageSeverity::Moderate => "Moderate",
            DamageSeverity::Major => "Major",
        }
    }
}

/// Physical condition of a book when it comes back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BookCondition {
    Good,
    Damaged(DamageSeverity),
    Lost,
}

impl BookCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookCondition::Good => "Good",
            BookCondition::Damaged(DamageSeverity::Minor) => "Damaged-Minor",
            BookCondition::Damaged(DamageSeverity::Moderate) => "Damaged-Moderate",
            BookCondition::Damaged(DamageSeverity::Major) => "Damaged-Major",
            BookCondition::Lost => "Lost",
        }
    }

    /// Whether the copy goes back on the shelf after this return
    pub fn returns_to_circulation(&self) -> bool {
        match self {
            BookCondition::Good => true,
            BookCondition::Damaged(DamageSeverity::Minor | DamageSeverity::Moderate) => true,
            BookCondition::Damaged(DamageSeverity::Major) | BookCondition::Lost => false,
        }
    }
}

impl std::fmt::Display for BookCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "good" => Ok(BookCondition::Good),
            "damaged-minor" => Ok(BookCondition::Damaged(DamageSeverity::Minor)),
            "damaged-moderate" => Ok(BookCondition::Damaged(DamageSeverity::Moderate)),
            "damaged-major" => Ok(BookCondition::Damaged(DamageSeverity::Major)),
            "lost" => Ok(BookCondition::Lost),
            _ => Err(format!("Invalid book condition: {}", s)),
        }
    }
}

impl TryFrom<String> for BookCondition {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BookCondition> for String {
    fn from(c: BookCondition) -> Self {
        c.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// PenaltyKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyKind {
    Late,
    Damage,
    Lost,
}

impl PenaltyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PenaltyKind::Late => "late",
            PenaltyKind::Damage => "damage",
            PenaltyKind::Lost => "lost",
        }
    }
}

impl std::str::FromStr for PenaltyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "late" => Ok(PenaltyKind::Late),
            "damage" => Ok(PenaltyKind::Damage),
            "lost" => Ok(PenaltyKind::Lost),
            _ => Err(format!("Invalid penalty kind: {}", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// PaymentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// CopyStatus
// ---------------------------------------------------------------------------

/// Status of one physical copy (copy-managed books only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Available,
    Reserved,
    Borrowed,
    Damaged,
    Lost,
}

impl CopyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Available => "available",
            CopyStatus::Reserved => "reserved",
            CopyStatus::Borrowed => "borrowed",
            CopyStatus::Damaged => "damaged",
            CopyStatus::Lost => "lost",
        }
    }
}

impl std::str::FromStr for CopyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(CopyStatus::Available),
            "reserved" => Ok(CopyStatus::Reserved),
            "borrowed" => Ok(CopyStatus::Borrowed),
            "damaged" => Ok(CopyStatus::Damaged),
            "lost" => Ok(CopyStatus::Lost),
            _ => Err(format!("Invalid copy status: {}", s)),
        }
    }
}
