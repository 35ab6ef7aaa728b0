//! Late fee and condition penalty arithmetic
//!
//! All amounts are `Decimal`; lateness is counted in whole minutes, rounding any
//! partial minute up.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::{
    config::PenaltyConfig,
    models::{BookCondition, DamageSeverity, PenaltyKind},
};

/// Fees owed for one return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub minutes_late: i64,
    pub late_fee: Decimal,
    pub condition_penalty: Decimal,
}

impl Assessment {
    pub fn total(&self) -> Decimal {
        self.late_fee + self.condition_penalty
    }

    /// Non-zero ledger lines making up the total
    pub fn lines(&self, condition: BookCondition) -> Vec<(PenaltyKind, Decimal)> {
        let mut lines = Vec::new();
        if self.late_fee > Decimal::ZERO {
            lines.push((PenaltyKind::Late, self.late_fee));
        }
        if self.condition_penalty > Decimal::ZERO {
            let kind = match condition {
                BookCondition::Lost => PenaltyKind::Lost,
                BookCondition::Good | BookCondition::Damaged(_) => PenaltyKind::Damage,
            };
            lines.push((kind, self.condition_penalty));
        }
        lines
    }
}

/// `ceil(max(0, returned - due))` in minutes
pub fn minutes_late(due: DateTime<Utc>, returned: DateTime<Utc>) -> i64 {
    let elapsed = returned - due;
    if elapsed <= Duration::zero() {
        return 0;
    }
    let whole_seconds = elapsed.num_seconds();
    let sub_second = (elapsed - Duration::seconds(whole_seconds))
        .num_nanoseconds()
        .unwrap_or(0);
    let partial = whole_seconds % 60 > 0 || sub_second > 0;
    whole_seconds / 60 + i64::from(partial)
}

pub fn condition_penalty(schedule: &PenaltyConfig, condition: BookCondition) -> Decimal {
    match condition {
        BookCondition::Good => Decimal::ZERO,
        BookCondition::Damaged(DamageSeverity::Minor) => schedule.damage_minor,
        BookCondition::Damaged(DamageSeverity::Moderate) => schedule.damage_moderate,
        BookCondition::Damaged(DamageSeverity::Major) => schedule.damage_major,
        BookCondition::Lost => schedule.lost_fee,
    }
}

/// Assess a return. A loan without a due date is never late, and a lost book
/// owes the flat lost fee with no lateness on top.
pub fn assess(
    schedule: &PenaltyConfig,
    due: Option<DateTime<Utc>>,
    returned: DateTime<Utc>,
    condition: BookCondition,
) -> Assessment {
    let minutes = match (condition, due) {
        (BookCondition::Lost, _) | (_, None) => 0,
        (_, Some(due)) => minutes_late(due, returned),
    };
    Assessment {
        minutes_late: minutes,
        late_fee: schedule.per_minute_rate * Decimal::from(minutes),
        condition_penalty: condition_penalty(schedule, condition),
    }
}
