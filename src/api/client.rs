use bytes::Bytes;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use snafu::prelude::*;
use url::Url;

use super::error::variant::*;
use super::types::*;
use super::Result;
use crate::model::{LeagueGroup, RaidSeason, War, WarState};

static BASE_URL: &str = "https://api.clashofclans.com/v1";

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Clash of Clans HTTP API Client
#[derive(Debug, Clone)]
pub struct Client {
    client: reqwest::Client,
    base: Url,
}

impl Client {
    /// create a new api client using a developer token
    pub fn new<S: AsRef<str> + ?Sized>(token: &S) -> Result<Self> {
        Self::with_base_url(token, BASE_URL)
    }

    /// create a new api client talking to another api root, like a proxy
    pub fn with_base_url<S: AsRef<str> + ?Sized>(token: &S, base: &str) -> Result<Self> {
        let base = Url::parse(base)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .context(InvalidBaseURL { url: base })?;

        let auth_header_value = format!("Bearer {}", token.as_ref())
            .parse()
            .map_err(|_| TokenInvalid.build())?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, auth_header_value);

        let client = reqwest::Client::builder()
            .gzip(true)
            .deflate(true)
            .user_agent(APP_USER_AGENT)
            .default_headers(headers)
            .build()
            .context(ClientCreateFailed)?;

        Ok(Self { client, base })
    }

    /// api url for the given path segments, each segment is percent encoded (tags start with `#`)
    fn endpoint<I>(&self, segments: I) -> Url
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn request<R>(&self, url: Url) -> Result<Option<R>>
    where
        R: DeserializeOwned,
    {
        log::trace!("GET {}", url);

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|_| RequestFailed {
                method: Method::GET,
                url: url.as_str(),
            })?;

        let status = resp.status();

        let body = resp.bytes().await.with_context(|_| RequestFailed {
            method: Method::GET,
            url: url.as_str(),
        })?;

        decode_response(&url, status, body)
    }

    /// Call /clans/{tag}/currentwar, the regular war only
    pub async fn current_regular_war(&self, clan_tag: &str) -> Result<Option<War>> {
        self.request(self.endpoint(["clans", clan_tag, "currentwar"]))
            .await
    }

    /// Call /clans/{tag}/currentwar/leaguegroup
    pub async fn league_group(&self, clan_tag: &str) -> Result<Option<LeagueGroup>> {
        self.request(self.endpoint(["clans", clan_tag, "currentwar", "leaguegroup"]))
            .await
    }

    /// Call /clanwarleagues/wars/{tag}
    pub async fn league_war(&self, war_tag: &str) -> Result<Option<War>> {
        let war: Option<War> = self
            .request(self.endpoint(["clanwarleagues", "wars", war_tag]))
            .await?;

        Ok(war.map(|mut war| {
            war.is_cwl = true;
            war.tag = Some(war_tag.to_string());
            war
        }))
    }

    /// Find the league war of `clan_tag` in a league round
    async fn find_league_war(&self, round: &[String], clan_tag: &str) -> Result<Option<War>> {
        for war_tag in round {
            if let Some(war) = self.league_war(war_tag).await? {
                if war.involves(clan_tag) {
                    return Ok(Some(war.oriented_for(clan_tag)));
                }
            }
        }
        Ok(None)
    }

    /// The war of the current clan war league day.
    ///
    /// While the last drawn day is still in preparation, the previous day (which
    /// is being fought) is returned instead.
    pub async fn current_league_war(&self, clan_tag: &str) -> Result<Option<War>> {
        let group = match self.league_group(clan_tag).await? {
            Some(group) => group,
            None => {
                log::debug!("No league group found for {}", clan_tag);
                return Ok(None);
            }
        };

        let rounds: Vec<_> = group.rounds().collect();
        let mut league_day = rounds.len();

        let last = match rounds.last() {
            Some(last) => last,
            None => {
                log::debug!("League group of {} has no drawn round", clan_tag);
                return Ok(None);
            }
        };

        let mut war = self.find_league_war(&last.war_tags, clan_tag).await?;

        let preparing = matches!(&war, Some(w) if w.state == WarState::Preparation);
        if preparing && rounds.len() > 1 {
            let previous = &rounds[rounds.len() - 2];
            if let Some(fighting) = self.find_league_war(&previous.war_tags, clan_tag).await? {
                league_day -= 1;
                war = Some(fighting);
            }
        }

        log::debug!("League war of {} is on day {}", clan_tag, league_day);

        Ok(war.map(|mut war| {
            war.league_day = Some(league_day);
            war
        }))
    }

    /// Current regular war, or the current league war when not in a regular one
    pub async fn current_war(&self, clan_tag: &str) -> Result<Option<War>> {
        match self.current_regular_war(clan_tag).await? {
            Some(war) if war.state != WarState::NotInWar => {
                log::debug!("Regular war found for {}", clan_tag);
                Ok(Some(war))
            }
            _ => self.current_league_war(clan_tag).await,
        }
    }

    /// Call /clans/{tag}/capitalraidseasons, newest first
    pub async fn raid_seasons(&self, clan_tag: &str, limit: u32) -> Result<Vec<RaidSeason>> {
        let mut url = self.endpoint(["clans", clan_tag, "capitalraidseasons"]);
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());

        let list: Option<ItemList<RaidSeason>> = self.request(url).await?;
        Ok(list.map(|l| l.items).unwrap_or_default())
    }

    /// The raid weekend being played, if any
    pub async fn current_raid_season(&self, clan_tag: &str) -> Result<Option<RaidSeason>> {
        let latest = self.raid_seasons(clan_tag, 1).await?.into_iter().next();
        Ok(latest.filter(RaidSeason::is_ongoing))
    }
}

/// Not found and access denied (private war log) both mean nothing to show
fn decode_response<R>(url: &Url, status: StatusCode, body: Bytes) -> Result<Option<R>>
where
    R: DeserializeOwned,
{
    match status {
        StatusCode::OK => serde_json::from_slice(&body)
            .map(Some)
            .with_context(|_| ParseBodyFailed { body }),
        StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
            log::debug!("GET {} got {}, treat as absent", url, status);
            Ok(None)
        }
        _ => HTTPStatusNotOK {
            method: Method::GET,
            url: url.as_str(),
            status_code: status,
            reason: ClientError::describe(&body),
        }
        .fail(),
    }
}
