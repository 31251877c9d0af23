//! Configuration loaded from environment variables (and an optional `.env` file).

use std::{env, str::FromStr, time::Duration};

use snafu::prelude::*;
use url::Url;

use crate::gateway::{ConnectionProperties, Identify};

/// Default gateway endpoint, api version 10 with json encoding
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// GUILD_MESSAGES | GUILD_MESSAGE_REACTIONS | DIRECT_MESSAGES | DIRECT_MESSAGE_REACTIONS | MESSAGE_CONTENT
pub const DEFAULT_INTENTS: u64 = (1 << 9) | (1 << 10) | (1 << 12) | (1 << 13) | (1 << 15);

const DEFAULT_APP_NAME: &str = "clanwatch";
const DEFAULT_MAX_RECONNECT_DELAY_SECS: u64 = 60;
const DEFAULT_CACHE_DEBOUNCE_MS: u64 = 3000;

/// Error when load configuration
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ConfigError {
    /// required environment variable is not set
    #[snafu(display("environment variable {name} is required"))]
    MissingVariable {
        /// variable name
        name: String,
    },

    /// environment variable can't be parsed
    #[snafu(display("environment variable {name} has invalid value {value:?}"))]
    InvalidVariable {
        /// variable name
        name: String,
        /// raw value
        value: String,
    },

    /// gateway url is not a websocket url
    #[snafu(display("invalid gateway url {url}: {source}"))]
    InvalidGatewayURL {
        /// the url
        url: String,
        /// source error
        source: url::ParseError,
    },

    /// gateway url schema is not websocket
    #[snafu(display("the gateway url {url} has schema {schema}, only ws or wss is ok"))]
    InvalidGatewaySchema {
        /// the url
        url: String,
        /// the schema
        schema: String,
    },
}

/// Gateway connection settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// gateway endpoint, reconnects always go here
    pub url: Url,
    /// authorization token, bot tokens start with `Bot `
    pub token: String,
    /// reported as browser/device in identify
    pub app_name: String,
    /// gateway intents, sent for bot tokens only
    pub intents: u64,
    /// ask the server for zlib compressed payloads
    pub compress: bool,
    /// reconnect when a heartbeat is due while the previous one is unacknowledged
    pub detect_zombie: bool,
    /// upper bound of the reconnect backoff
    pub max_reconnect_delay: Duration,
}

impl GatewayConfig {
    /// Settings with defaults for everything but the token
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            url: Url::parse(DEFAULT_GATEWAY_URL).expect("default gateway url is valid"),
            token: token.into(),
            app_name: DEFAULT_APP_NAME.to_string(),
            intents: DEFAULT_INTENTS,
            compress: false,
            detect_zombie: true,
            max_reconnect_delay: Duration::from_secs(DEFAULT_MAX_RECONNECT_DELAY_SECS),
        }
    }

    /// true for `Bot ` prefixed tokens
    pub fn is_bot_token(&self) -> bool {
        self.token.starts_with("Bot ")
    }

    pub(crate) fn identify(&self) -> Identify {
        Identify {
            token: self.token.clone(),
            properties: ConnectionProperties {
                os: env::consts::OS.to_string(),
                browser: self.app_name.clone(),
                device: self.app_name.clone(),
            },
            intents: self.is_bot_token().then(|| self.intents),
            compress: self.compress.then(|| true),
        }
    }
}

/// Whole application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// gateway settings
    pub gateway: GatewayConfig,
    /// clash of clans api token
    pub coc_token: String,
    /// tracked clan tag, like `#2GLCQ00G0`
    pub clan_tag: String,
    /// poll cache debounce window
    pub cache_debounce: Duration,
}

impl Config {
    /// Load configuration from environment variables, reading `.env` first if present.
    ///
    /// | variable | default |
    /// |---|---|
    /// | `DISCORD_AUTHORIZATION_TOKEN` | required |
    /// | `IS_BOT_TOKEN` | `1` |
    /// | `COC_API_TOKEN` | required |
    /// | `CLAN_TAG` | required |
    /// | `GATEWAY_URL` | [`DEFAULT_GATEWAY_URL`] |
    /// | `APP_NAME` | `clanwatch` |
    /// | `GATEWAY_INTENTS` | [`DEFAULT_INTENTS`] |
    /// | `GATEWAY_COMPRESS` | `0` |
    /// | `GATEWAY_DETECT_ZOMBIE` | `1` |
    /// | `GATEWAY_MAX_RECONNECT_DELAY_SECS` | `60` |
    /// | `CACHE_DEBOUNCE_MS` | `3000` |
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            log::debug!("No .env file loaded: {}", err);
        }

        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .with_context(|| error::MissingVariable { name })
        };

        let discord_token = required("DISCORD_AUTHORIZATION_TOKEN")?;
        let is_bot = parse_bool(&lookup, "IS_BOT_TOKEN", true)?;
        let token = if is_bot {
            format!("Bot {}", discord_token)
        } else {
            discord_token
        };

        let url = lookup("GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
        let url = parse_gateway_url(&url)?;

        let mut gateway = GatewayConfig::new(token);
        gateway.url = url;
        if let Some(app_name) = lookup("APP_NAME") {
            gateway.app_name = app_name;
        }
        gateway.intents = parse(&lookup, "GATEWAY_INTENTS", DEFAULT_INTENTS)?;
        gateway.compress = parse_bool(&lookup, "GATEWAY_COMPRESS", false)?;
        gateway.detect_zombie = parse_bool(&lookup, "GATEWAY_DETECT_ZOMBIE", true)?;
        gateway.max_reconnect_delay = Duration::from_secs(parse(
            &lookup,
            "GATEWAY_MAX_RECONNECT_DELAY_SECS",
            DEFAULT_MAX_RECONNECT_DELAY_SECS,
        )?);

        Ok(Self {
            gateway,
            coc_token: required("COC_API_TOKEN")?,
            clan_tag: required("CLAN_TAG")?,
            cache_debounce: Duration::from_millis(parse(
                &lookup,
                "CACHE_DEBOUNCE_MS",
                DEFAULT_CACHE_DEBOUNCE_MS,
            )?),
        })
    }
}

fn parse_gateway_url(url: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(url).context(error::InvalidGatewayURL { url })?;

    ensure!(
        parsed.scheme() == "wss" || parsed.scheme() == "ws",
        error::InvalidGatewaySchema {
            url,
            schema: parsed.scheme(),
        }
    );

    Ok(parsed)
}

fn parse<L, T>(lookup: &L, name: &str, default: T) -> Result<T, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .ok()
            .with_context(|| error::InvalidVariable { name, value: &value }),
    }
}

fn parse_bool<L>(lookup: &L, name: &str, default: bool) -> Result<bool, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    match lookup(name).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") | Some("TRUE") => Ok(true),
        Some("0") | Some("false") | Some("FALSE") => Ok(false),
        Some(value) => error::InvalidVariable { name, value }.fail(),
    }
}
