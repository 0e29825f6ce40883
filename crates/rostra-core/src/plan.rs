//! The subscription plan catalogue.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// ISO 4217 code for every plan price.
pub const CURRENCY: &str = "IDR";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
  Display, EnumString, IntoStaticStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Plan {
  Monthly,
  Yearly,
}

impl Plan {
  /// Gross amount in whole rupiah.
  pub fn price(self) -> i64 {
    match self {
      Self::Monthly => 49_000,
      Self::Yearly => 490_000,
    }
  }

  /// How long a settled purchase extends the subscription.
  pub fn duration(self) -> TimeDelta {
    match self {
      Self::Monthly => TimeDelta::days(30),
      Self::Yearly => TimeDelta::days(365),
    }
  }

  /// Human-readable item name sent to the gateway.
  pub fn label(self) -> &'static str {
    match self {
      Self::Monthly => "Rostra Premium (1 month)",
      Self::Yearly => "Rostra Premium (1 year)",
    }
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn every_plan_has_positive_price_and_duration() {
    for plan in Plan::iter() {
      assert!(plan.price() > 0, "{plan}");
      assert!(plan.duration() > TimeDelta::zero(), "{plan}");
    }
  }

  #[test]
  fn yearly_is_cheaper_per_day() {
    let per_day = |p: Plan| p.price() as f64 / p.duration().num_days() as f64;
    assert!(per_day(Plan::Yearly) < per_day(Plan::Monthly));
  }
}
