//! Clan war and capital raid state, as returned by the game api, with their refresh rules.

pub mod raid;
pub mod war;

pub use raid::{until_raid_weekend, RaidMember, RaidSeason, RaidState};
pub use war::{LeagueClan, LeagueGroup, LeagueRound, War, WarClan, WarState};

use std::time::Duration;

/// No refresh is ever scheduled sooner than this
pub const MIN_REFRESH: Duration = Duration::from_secs(60);

/// Delay added after a deadline, the api lags a few minutes behind the game
pub(crate) const DEADLINE_GRACE_SECS: i64 = 300;

/// Whole seconds to a duration, floored at [`MIN_REFRESH`]
pub(crate) fn refresh_delay(secs: i64) -> Duration {
    let floor = MIN_REFRESH.as_secs() as i64;
    Duration::from_secs(secs.max(floor) as u64)
}

/// Api timestamps look like `20240105T080000.000Z`
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer};

    const FORMAT: &str = "%Y%m%dT%H%M%S%.fZ";

    pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s, FORMAT).map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| parse(&s).map_err(de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_parse_api_timestamp() {
        assert_eq!(
            timestamp::parse("20240105T080000.000Z").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 8, 0, 0).unwrap()
        );
        assert!(timestamp::parse("2024-01-05T08:00:00Z").is_err());
    }

    #[test]
    fn test_refresh_delay_is_floored() {
        assert_eq!(refresh_delay(-500), MIN_REFRESH);
        assert_eq!(refresh_delay(59), MIN_REFRESH);
        assert_eq!(refresh_delay(61), Duration::from_secs(61));
    }
}
