// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Duty statuses, the transition table, and status filters.

use serde::{Deserialize, Serialize};

/// One of the four regulatory duty statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DutyStatus {
    /// Off duty.
    OffDuty,
    /// In the sleeper berth.
    Sleeper,
    /// On duty, not driving.
    OnDuty,
    /// Driving.
    Driving,
}

impl DutyStatus {
    /// All statuses in declaration order.
    pub const ALL: [Self; 4] = [Self::OffDuty, Self::Sleeper, Self::OnDuty, Self::Driving];

    /// Counts toward on-duty totals (ON_DUTY and DRIVING).
    pub fn is_on_duty(self) -> bool {
        matches!(self, Self::OnDuty | Self::Driving)
    }

    /// Counts toward rest spans (OFF_DUTY and SLEEPER).
    pub fn is_rest(self) -> bool {
        !self.is_on_duty()
    }

    /// Statuses reachable from `self` in a single change.
    pub fn successors(self) -> &'static [Self] {
        match self {
            Self::OffDuty => &[Self::OnDuty, Self::Sleeper],
            Self::Sleeper => &[Self::OffDuty, Self::OnDuty],
            Self::OnDuty => &[Self::Driving, Self::OffDuty, Self::Sleeper],
            Self::Driving => &[Self::OnDuty, Self::OffDuty],
        }
    }

    /// Whether `self -> next` is allowed by the transition table.
    pub fn can_transition_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// Wire/display label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OffDuty => "OFF_DUTY",
            Self::Sleeper => "SLEEPER",
            Self::OnDuty => "ON_DUTY",
            Self::Driving => "DRIVING",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::OffDuty => 1,
            Self::Sleeper => 1 << 1,
            Self::OnDuty => 1 << 2,
            Self::Driving => 1 << 3,
        }
    }
}

impl std::fmt::Display for DutyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[HOS_UNKNOWN_STATUS] unknown duty status {0:?}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for DutyStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(s.to_owned()))
    }
}

/// Compact set of duty statuses, used as an accumulation filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusSet(u8);

impl StatusSet {
    /// No statuses.
    pub const EMPTY: Self = Self(0);
    /// DRIVING only.
    pub const DRIVING_ONLY: Self = Self(DutyStatus::Driving.bit());
    /// ON_DUTY and DRIVING.
    pub const ON_DUTY: Self = Self(DutyStatus::OnDuty.bit() | DutyStatus::Driving.bit());
    /// OFF_DUTY and SLEEPER.
    pub const REST: Self = Self(DutyStatus::OffDuty.bit() | DutyStatus::Sleeper.bit());
    /// Every status.
    pub const ALL: Self = Self(Self::ON_DUTY.0 | Self::REST.0);

    /// Returns the set with `status` added.
    pub const fn with(self, status: DutyStatus) -> Self {
        Self(self.0 | status.bit())
    }

    /// Membership test.
    pub const fn contains(self, status: DutyStatus) -> bool {
        self.0 & status.bit() != 0
    }

    /// Returns `true` if no status is present.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates members in declaration order.
    pub fn iter(self) -> impl Iterator<Item = DutyStatus> {
        DutyStatus::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl FromIterator<DutyStatus> for StatusSet {
    fn from_iter<I: IntoIterator<Item = DutyStatus>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl From<DutyStatus> for StatusSet {
    fn from(status: DutyStatus) -> Self {
        Self::EMPTY.with(status)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_regulation_workflow() {
        use DutyStatus::{Driving, OffDuty, OnDuty, Sleeper};
        let allowed = [
            (OffDuty, OnDuty),
            (OffDuty, Sleeper),
            (Sleeper, OffDuty),
            (Sleeper, OnDuty),
            (OnDuty, Driving),
            (OnDuty, OffDuty),
            (OnDuty, Sleeper),
            (Driving, OnDuty),
            (Driving, OffDuty),
        ];
        for from in DutyStatus::ALL {
            for to in DutyStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn parses_labels_loosely() {
        assert_eq!("off_duty".parse(), Ok(DutyStatus::OffDuty));
        assert_eq!("ON-DUTY".parse(), Ok(DutyStatus::OnDuty));
        assert_eq!(" driving ".parse(), Ok(DutyStatus::Driving));
        assert!("napping".parse::<DutyStatus>().is_err());
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&DutyStatus::OffDuty).unwrap();
        assert_eq!(json, "\"OFF_DUTY\"");
        let back: DutyStatus = serde_json::from_str("\"SLEEPER\"").unwrap();
        assert_eq!(back, DutyStatus::Sleeper);
    }

    #[test]
    fn status_set_constants() {
        assert!(StatusSet::ON_DUTY.contains(DutyStatus::Driving));
        assert!(StatusSet::ON_DUTY.contains(DutyStatus::OnDuty));
        assert!(!StatusSet::ON_DUTY.contains(DutyStatus::Sleeper));
        assert_eq!(
            StatusSet::REST.iter().collect::<Vec<_>>(),
            vec![DutyStatus::OffDuty, DutyStatus::Sleeper]
        );
        let set: StatusSet = [DutyStatus::Driving].into_iter().collect();
        assert_eq!(set, StatusSet::DRIVING_ONLY);
        assert!(StatusSet::EMPTY.is_empty());
    }
}
