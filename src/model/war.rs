//! Clan wars, regular and league, and when to poll them again.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{refresh_delay, timestamp, DEADLINE_GRACE_SECS};
use crate::cache::Polled;

/// Fallback refresh period, also used while a war is far from ending
pub const WAR_REFRESH_PERIOD: Duration = Duration::from_secs(3600);

/// War phase
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarState {
    /// clan is not in a war
    NotInWar,
    /// preparation day
    Preparation,
    /// battle day
    InWar,
    /// war finished, result available
    WarEnded,
    /// state this crate does not know
    #[serde(other)]
    Unknown,
}

/// One side of a war
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WarClan {
    /// clan tag
    pub tag: String,
    /// clan name
    pub name: String,
    /// clan level
    pub clan_level: u32,
    /// stars won
    pub stars: u32,
    /// total destruction
    pub destruction_percentage: f64,
    /// attacks used
    pub attacks: u32,
    /// experience earned, known when the war ended
    pub exp_earned: u32,
}

/// A regular war or one clan war league war
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct War {
    /// phase
    pub state: WarState,
    /// tracked clan side, or the first clan of a league war
    pub clan: WarClan,
    /// the other side
    pub opponent: WarClan,
    /// members per side
    #[serde(default)]
    pub team_size: u32,
    /// explicit attack count, absent for older wars
    #[serde(default, rename = "attacksPerMember")]
    pub declared_attacks_per_member: Option<u32>,
    /// preparation day start
    #[serde(default, with = "timestamp::option")]
    pub preparation_start_time: Option<DateTime<Utc>>,
    /// battle day start for regular wars
    #[serde(default, with = "timestamp::option")]
    pub start_time: Option<DateTime<Utc>>,
    /// battle day start for league wars
    #[serde(default, with = "timestamp::option")]
    pub war_start_time: Option<DateTime<Utc>>,
    /// battle day end
    #[serde(default, with = "timestamp::option")]
    pub end_time: Option<DateTime<Utc>>,
    /// fetched through the clan war league endpoints
    #[serde(skip)]
    pub is_cwl: bool,
    /// league war tag
    #[serde(skip)]
    pub tag: Option<String>,
    /// league day, 1 based
    #[serde(skip)]
    pub league_day: Option<usize>,
}

impl War {
    /// Start of the battle day
    pub fn battle_start(&self) -> Option<DateTime<Utc>> {
        self.war_start_time.or(self.start_time)
    }

    /// Attacks each member may do, league wars default to one
    pub fn attacks_per_member(&self) -> u32 {
        self.declared_attacks_per_member
            .unwrap_or(if self.is_cwl { 1 } else { 2 })
    }

    /// Attacks available to a whole side
    pub fn attacks_per_clan(&self) -> u32 {
        self.attacks_per_member() * self.team_size
    }

    /// Same phase, same scores on both sides, same war kind
    pub fn is_same_war(&self, other: &Self) -> bool {
        self.state == other.state
            && self.clan == other.clan
            && self.opponent == other.opponent
            && self.is_cwl == other.is_cwl
    }

    /// Whether `clan_tag` fights in this war, on either side
    pub fn involves(&self, clan_tag: &str) -> bool {
        self.clan.tag == clan_tag || self.opponent.tag == clan_tag
    }

    /// Put `clan_tag` on the `clan` side, league wars list clans in any order
    pub fn oriented_for(mut self, clan_tag: &str) -> Self {
        if self.opponent.tag == clan_tag {
            std::mem::swap(&mut self.clan, &mut self.opponent);
        }
        self
    }

    /// Time until this war should be fetched again.
    ///
    /// During preparation, five minutes after the battle day starts. On the last
    /// battle hour, five minutes after it ends. Hourly otherwise.
    pub fn refresh_in(&self, now: DateTime<Utc>) -> Duration {
        let now = now.timestamp();

        let secs = match self.state {
            WarState::Preparation => self
                .battle_start()
                .map(|start| start.timestamp() - now + DEADLINE_GRACE_SECS),
            WarState::InWar => self
                .end_time
                .map(|end| end.timestamp() - now)
                .filter(|left| *left < WAR_REFRESH_PERIOD.as_secs() as i64)
                .map(|left| left + DEADLINE_GRACE_SECS),
            WarState::NotInWar | WarState::WarEnded | WarState::Unknown => None,
        };

        secs.map(refresh_delay).unwrap_or(WAR_REFRESH_PERIOD)
    }
}

impl Polled for War {
    fn is_same(&self, other: &Self) -> bool {
        self.is_same_war(other)
    }

    fn refresh_in(&self, now: DateTime<Utc>) -> Duration {
        War::refresh_in(self, now)
    }
}

/// Clan taking part in a league group
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeagueClan {
    /// clan tag
    pub tag: String,
    /// clan name
    pub name: String,
    /// clan level
    pub clan_level: u32,
}

/// Wars of one league day
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeagueRound {
    /// war tags, `#0` while not drawn yet
    pub war_tags: Vec<String>,
}

impl LeagueRound {
    /// true once every war of the day has been drawn
    pub fn is_drawn(&self) -> bool {
        !self.war_tags.iter().any(|tag| tag == "#0")
    }
}

/// Clan war league group of the current season
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueGroup {
    /// group state, `preparation`, `inWar` or `ended`
    #[serde(default)]
    pub state: String,
    /// season, like `2024-01`
    #[serde(default)]
    pub season: String,
    /// clans of the group
    #[serde(default)]
    pub clans: Vec<LeagueClan>,
    #[serde(default)]
    rounds: Vec<LeagueRound>,
}

impl LeagueGroup {
    /// Drawn rounds, in league day order
    pub fn rounds(&self) -> impl Iterator<Item = &LeagueRound> + '_ {
        self.rounds.iter().filter(|round| round.is_drawn())
    }
}
