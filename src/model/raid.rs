//! Capital raid seasons and the weekly raid window.

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc, Weekday};
use serde::Deserialize;

use super::{refresh_delay, timestamp, DEADLINE_GRACE_SECS};
use crate::cache::Polled;

/// Refresh period while a raid weekend is running
pub const RAID_REFRESH_PERIOD: Duration = Duration::from_secs(3 * 3600);

const RAID_START_HOUR: u32 = 12;

/// Raid season phase
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RaidState {
    /// raid weekend running
    Ongoing,
    /// raid weekend over
    Ended,
    /// state this crate does not know
    #[serde(other)]
    Unknown,
}

/// Raid results of one clan member
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidMember {
    /// player tag
    pub tag: String,
    /// player name
    pub name: String,
    /// attacks used
    pub attacks: u32,
    /// regular attacks allowed
    pub attack_limit: u32,
    /// bonus attacks allowed
    pub bonus_attack_limit: u32,
    /// capital gold looted
    pub capital_resources_looted: u64,
}

/// A capital raid weekend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidSeason {
    /// phase
    pub state: RaidState,
    /// weekend start
    #[serde(with = "timestamp")]
    pub start_time: DateTime<Utc>,
    /// weekend end
    #[serde(with = "timestamp")]
    pub end_time: DateTime<Utc>,
    /// capital gold looted by the whole clan
    pub capital_total_loot: u64,
    /// districts fully raided
    pub raids_completed: u32,
    /// attacks used
    pub total_attacks: u32,
    /// enemy districts destroyed
    pub enemy_districts_destroyed: u32,
    /// raid medals from attacks
    pub offensive_reward: u32,
    /// raid medals from defenses
    pub defensive_reward: u32,
    /// participating members
    #[serde(default)]
    pub members: Vec<RaidMember>,
}

impl RaidSeason {
    /// Whether the weekend is running
    pub fn is_ongoing(&self) -> bool {
        self.state == RaidState::Ongoing
    }

    /// Members by loot, best first
    pub fn top_looters(&self) -> Vec<&RaidMember> {
        let mut members: Vec<_> = self.members.iter().collect();
        members.sort_by(|a, b| b.capital_resources_looted.cmp(&a.capital_resources_looted));
        members
    }

    /// Time until this season should be fetched again.
    ///
    /// Every three hours, or five minutes after the end when that comes first.
    pub fn refresh_in(&self, now: DateTime<Utc>) -> Duration {
        if self.state != RaidState::Ongoing {
            return RAID_REFRESH_PERIOD;
        }

        let left = self.end_time.timestamp() - now.timestamp();
        if left < RAID_REFRESH_PERIOD.as_secs() as i64 {
            refresh_delay(left + DEADLINE_GRACE_SECS)
        } else {
            RAID_REFRESH_PERIOD
        }
    }
}

impl Polled for RaidSeason {
    fn is_same(&self, other: &Self) -> bool {
        self == other
    }

    fn refresh_in(&self, now: DateTime<Utc>) -> Duration {
        RaidSeason::refresh_in(self, now)
    }
}

/// Time left until the next raid weekend opens, Friday at noon local time.
///
/// `None` while inside the raid window, from Friday until Monday noon included.
pub fn until_raid_weekend(now: NaiveDateTime) -> Option<Duration> {
    let weekday = now.weekday();

    let in_window = match weekday {
        Weekday::Fri | Weekday::Sat | Weekday::Sun => true,
        Weekday::Mon => now.hour() <= RAID_START_HOUR,
        Weekday::Tue | Weekday::Wed | Weekday::Thu => false,
    };
    if in_window {
        return None;
    }

    let days = Weekday::Fri.num_days_from_monday() - weekday.num_days_from_monday();
    let friday = now.date() + chrono::Duration::days(i64::from(days));
    let opens = friday.and_hms_opt(RAID_START_HOUR, 0, 0)?;

    (opens - now).to_std().ok()
}
