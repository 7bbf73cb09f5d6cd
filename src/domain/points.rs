use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TransactionSource;

/// Earning rates of an association
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsConfiguration {
    pub association_id: Uuid,
    /// Points granted for checking in at an event
    pub event_check_in: i64,
    /// Points granted per tracked activity unit (e.g. per kilometer)
    pub activity_per_unit: i64,
    /// Maximum points a single tracked activity can earn
    pub activity_cap: Option<i64>,
    /// How many points are worth one currency unit
    pub points_per_currency_unit: i64,
}

impl PointsConfiguration {
    /// Configuration that grants nothing
    pub fn disabled(association_id: Uuid) -> Self {
        Self {
            association_id,
            event_check_in: 0,
            activity_per_unit: 0,
            activity_cap: None,
            points_per_currency_unit: 1,
        }
    }

    /// Points earned for an event
    pub fn points_for(&self, event: &EarningEvent) -> i64 {
        match event {
            EarningEvent::EventCheckIn { .. } => self.event_check_in,
            EarningEvent::ActivityTracked { units, .. } => {
                let points = self.activity_per_unit.saturating_mul(i64::from(*units));
                match self.activity_cap {
                    Some(cap) => points.min(cap),
                    None => points,
                }
            }
        }
        .max(0)
    }

    /// Currency value of a number of points, in whole currency units
    ///
    /// Returns `None` when the conversion rate is not set.
    pub fn currency_value(&self, points: i64) -> Option<i64> {
        (self.points_per_currency_unit > 0).then(|| points / self.points_per_currency_unit)
    }
}

/// Something a member did that earns points
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EarningEvent {
    /// The member checked in at an association event
    EventCheckIn { event_id: Uuid, event_name: String },
    /// The member logged a tracked activity
    ActivityTracked { activity: String, units: u32 },
}

impl EarningEvent {
    pub fn source(&self) -> TransactionSource {
        match self {
            EarningEvent::EventCheckIn { .. } => TransactionSource::EventCheckIn,
            EarningEvent::ActivityTracked { .. } => TransactionSource::ActivityTracking,
        }
    }

    pub fn description(&self) -> String {
        match self {
            EarningEvent::EventCheckIn { event_name, .. } => format!("Check-in at {event_name}"),
            EarningEvent::ActivityTracked { activity, units } => format!("{activity} ({units})"),
        }
    }

    pub fn source_id(&self) -> Option<String> {
        match self {
            EarningEvent::EventCheckIn { event_id, .. } => Some(event_id.to_string()),
            EarningEvent::ActivityTracked { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use speculoos::prelude::*;

    #[fixture]
    fn config() -> PointsConfiguration {
        PointsConfiguration {
            association_id: Uuid::new_v4(),
            event_check_in: 50,
            activity_per_unit: 3,
            activity_cap: Some(100),
            points_per_currency_unit: 10,
        }
    }

    #[rstest]
    #[case(EarningEvent::EventCheckIn { event_id: Uuid::nil(), event_name: "Gala".into() }, 50)]
    #[case(EarningEvent::ActivityTracked { activity: "Run".into(), units: 5 }, 15)]
    #[case(EarningEvent::ActivityTracked { activity: "Run".into(), units: 500 }, 100)]
    fn test_points_for(
        config: PointsConfiguration,
        #[case] event: EarningEvent,
        #[case] expected: i64,
    ) {
        assert_that!(config.points_for(&event)).is_equal_to(expected);
    }

    #[rstest]
    fn test_currency_value(config: PointsConfiguration) {
        assert_that!(config.currency_value(125)).is_equal_to(Some(12));
        assert_that!(PointsConfiguration {
            points_per_currency_unit: 0,
            ..config
        }
        .currency_value(125))
        .is_none();
    }
}
