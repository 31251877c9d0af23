//! Tracks the clan war and raid weekend of `CLAN_TAG` and shows them as the bot presence.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Utc};
use clanwatch::{
    api,
    cache::PollCache,
    config::Config,
    gateway::{
        Activity, ActivityTimestamps, Client, ClientHandle, EventHandler, HandlerResult, Presence,
        Ready,
    },
    model::{until_raid_weekend, RaidSeason, War, WarState},
    BoxError, Error,
};
use serde_json::Value;

const COMPETING: u8 = 5;

/// Presence built from the latest war and raid state
#[derive(Debug)]
struct Board {
    handle: ClientHandle,
    war: Mutex<Option<Activity>>,
    raid: Mutex<Option<Activity>>,
}

impl Board {
    fn publish(&self) {
        let activities = [&self.war, &self.raid]
            .iter()
            .filter_map(|slot| slot.lock().ok().and_then(|a| a.clone()))
            .collect();

        self.handle.update_presence(Presence::online(activities));
    }

    fn set_war(&self, war: &War) {
        if let Ok(mut slot) = self.war.lock() {
            *slot = war_activity(war);
        }
        self.publish();
    }

    fn set_raid(&self, season: &RaidSeason) {
        if let Ok(mut slot) = self.raid.lock() {
            *slot = raid_activity(season);
        }
        self.publish();
    }
}

fn end_timestamps(end: Option<DateTime<Utc>>) -> Option<ActivityTimestamps> {
    end.map(|end| ActivityTimestamps {
        start: None,
        end: Some(end.timestamp_millis()),
    })
}

fn war_activity(war: &War) -> Option<Activity> {
    let state = match war.state {
        WarState::Preparation => "Preparation".to_string(),
        WarState::InWar | WarState::WarEnded => {
            format!("{} ★ {}", war.clan.stars, war.opponent.stars)
        }
        WarState::NotInWar | WarState::Unknown => return None,
    };

    let name = match war.league_day {
        Some(day) if war.is_cwl => format!("Clan War League, day {}", day),
        _ => "Clan War".to_string(),
    };

    let mut activity = Activity::new(name, COMPETING);
    activity.details = Some(format!("vs {}", war.opponent.name));
    activity.state = Some(state);
    activity.timestamps = end_timestamps(war.end_time);
    Some(activity)
}

fn raid_activity(season: &RaidSeason) -> Option<Activity> {
    if !season.is_ongoing() {
        return None;
    }

    let mut activity = Activity::new("Raid Weekend", COMPETING);
    activity.state = Some(format!("{} capital gold", season.capital_total_loot));
    activity.timestamps = end_timestamps(Some(season.end_time));
    Some(activity)
}

struct Handler {
    war: PollCache<War>,
    raid: PollCache<RaidSeason>,
}

#[async_trait::async_trait]
impl EventHandler for Handler {
    async fn on_ready(&self, ready: &Ready) -> HandlerResult {
        log::info!(
            "Logged in as {}, custom emojis: {}",
            ready.user.username,
            ready.user.can_use_custom_emojis()
        );

        let war = self.war.clone();
        tokio::spawn(async move {
            if let Err(err) = war.get(false).await {
                log::warn!("Warm up war cache failed: {}", err);
            }
        });

        Ok(())
    }

    async fn on_message_create(&self, data: &Value) -> HandlerResult {
        // api calls can be slow, keep them off the connection task
        match data["content"].as_str() {
            Some("!war") => {
                let war = self.war.clone();
                tokio::spawn(async move {
                    match war.get(false).await {
                        Ok(war) => {
                            log::info!("Current war: {:?}", war.as_ref().map(war_activity))
                        }
                        Err(err) => log::warn!("Get current war failed: {}", err),
                    }
                });
            }
            Some("!raid") => {
                let raid = self.raid.clone();
                tokio::spawn(async move {
                    match raid.get(false).await {
                        Ok(raid) => {
                            log::info!("Current raid: {:?}", raid.as_ref().map(raid_activity))
                        }
                        Err(err) => log::warn!("Get current raid failed: {}", err),
                    }
                });
            }
            _ => {}
        }
        Ok(())
    }
}

fn api_error(source: api::Error) -> BoxError {
    Box::new(Error::CallAPIFailed { source })
}

#[tokio::main]
async fn main() -> clanwatch::Result<()> {
    pretty_env_logger::init();

    let config = Config::from_env().map_err(|source| Error::LoadConfigFailed { source })?;
    let coc = api::Client::new(&config.coc_token).map_err(|source| Error::CallAPIFailed { source })?;

    let client = Client::new(config.gateway.clone());
    let board = Arc::new(Board {
        handle: client.handle(),
        war: Mutex::new(None),
        raid: Mutex::new(None),
    });

    let war = {
        let (coc, tag) = (coc.clone(), config.clan_tag.clone());
        let board = Arc::clone(&board);

        PollCache::builder("war", move || {
            let (coc, tag) = (coc.clone(), tag.clone());
            async move { coc.current_war(&tag).await.map_err(api_error) }
        })
        .debounce(config.cache_debounce)
        .on_change(move |war: War| {
            let board = Arc::clone(&board);
            async move {
                board.set_war(&war);
                Ok(())
            }
        })
        .build()
    };

    let raid = {
        let (coc, tag) = (coc.clone(), config.clan_tag.clone());
        let board = Arc::clone(&board);

        // latest season, ended ones included, so the refresh chain never stops
        PollCache::builder("raid", move || {
            let (coc, tag) = (coc.clone(), tag.clone());
            async move {
                let seasons = coc.raid_seasons(&tag, 1).await.map_err(api_error)?;
                Ok::<_, BoxError>(seasons.into_iter().next())
            }
        })
        .debounce(config.cache_debounce)
        .on_change(move |season: RaidSeason| {
            let board = Arc::clone(&board);
            async move {
                board.set_raid(&season);
                Ok(())
            }
        })
        .build()
    };

    match until_raid_weekend(Local::now().naive_local()) {
        Some(delay) => {
            log::info!("Next raid weekend in {:?}", delay);
            raid.refresh_after(delay).await;
        }
        None => {
            if let Err(err) = raid.get(false).await {
                log::warn!("Initial raid fetch failed: {}", err);
            }
        }
    }

    let client = client.with_handler(Handler { war, raid });
    let handle = client.handle();
    let running = tokio::spawn(client.run());

    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Wait for ctrl-c failed: {}", err);
    }

    log::info!("Shutting down");
    handle.stop();
    if let Err(err) = running.await {
        log::error!("Gateway task failed: {}", err);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::{future, time::Duration};

    use serde_json::json;

    use super::*;

    fn stalled<T: clanwatch::cache::Polled>(name: &str) -> PollCache<T> {
        PollCache::builder(name, || future::pending::<Result<Option<T>, BoxError>>()).build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_do_not_wait_for_the_api() {
        let handler = Handler {
            war: stalled("war"),
            raid: stalled("raid"),
        };

        for command in ["!war", "!raid"] {
            let data = json!({ "content": command });
            let handled =
                tokio::time::timeout(Duration::from_secs(1), handler.on_message_create(&data))
                    .await;
            assert!(matches!(handled, Ok(Ok(()))), "{} blocked", command);
        }
    }
}
