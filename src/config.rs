use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::{collections::HashSet, env, fs, time::Duration};
use thiserror::Error;

use crate::inexogy_api::DEFAULT_BASE_URL;
use crate::meter_sensor::slugify;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_CONFIG_PATH: &str = "inexogy.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A single physical meter to expose
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeterConfig {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HomeAssistantConfig {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub token: String,
    #[serde(deserialize_with = "one_or_many")]
    pub meters: Vec<MeterConfig>,
    #[serde(
        default = "default_scan_interval",
        deserialize_with = "time_period"
    )]
    pub scan_interval: Duration,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub home_assistant: Option<HomeAssistantConfig>,
}

impl Config {
    /// Loads the config file named by `INEXOGY_CONFIG` (default `inexogy.toml`)
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("INEXOGY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config = Self::from_toml(&contents)?;

        if config.home_assistant.is_none() {
            config.home_assistant = home_assistant_from_env();
        }
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::Invalid("token must not be empty".into()));
        }
        if self.meters.is_empty() {
            return Err(ConfigError::Invalid("at least one meter is required".into()));
        }
        let mut ids = HashSet::new();
        let mut slugs = HashSet::new();
        for meter in &self.meters {
            if meter.id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "meter '{}' has an empty id",
                    meter.name
                )));
            }
            if !ids.insert(meter.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "meter id '{}' is configured twice",
                    meter.id
                )));
            }
            // Entity ids are derived from the name, so names must differ after slugging
            if !slugs.insert(slugify(&meter.name)) {
                return Err(ConfigError::Invalid(format!(
                    "meter name '{}' clashes with another meter's name",
                    meter.name
                )));
            }
        }
        if self.scan_interval.is_zero() {
            return Err(ConfigError::Invalid("scan_interval must be positive".into()));
        }
        Ok(())
    }
}

/// Home Assistant connection from `HA_URL` / `HA_TOKEN`, if `HA_URL` is set
fn home_assistant_from_env() -> Option<HomeAssistantConfig> {
    let url = env::var("HA_URL").unwrap_or_default();
    if url.is_empty() {
        return None;
    }
    Some(HomeAssistantConfig {
        url,
        token: env::var("HA_TOKEN").unwrap_or_default(),
    })
}

fn default_scan_interval() -> Duration {
    DEFAULT_SCAN_INTERVAL
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<MeterConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Many(Vec<MeterConfig>),
        One(MeterConfig),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Many(meters) => meters,
        Raw::One(meter) => vec![meter],
    })
}

/// Accepts seconds, "HH:MM[:SS]" or a `{ days, hours, minutes, seconds, milliseconds }` table
fn time_period<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Parts {
        #[serde(default)]
        days: f64,
        #[serde(default)]
        hours: f64,
        #[serde(default)]
        minutes: f64,
        #[serde(default)]
        seconds: f64,
        #[serde(default)]
        milliseconds: f64,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
        Table(Parts),
    }

    let seconds = match Raw::deserialize(deserializer)? {
        Raw::Int(i) => i as f64,
        Raw::Float(f) => f,
        Raw::Text(s) => parse_clock(&s).map_err(de::Error::custom)?,
        Raw::Table(p) => {
            p.days * 86_400.0
                + p.hours * 3_600.0
                + p.minutes * 60.0
                + p.seconds
                + p.milliseconds / 1_000.0
        }
    };

    Duration::try_from_secs_f64(seconds)
        .map_err(|_| de::Error::custom(format!("invalid time period: {seconds} seconds")))
}

/// Parses "HH:MM", "HH:MM:SS" or a bare number of seconds, optionally negative
fn parse_clock(text: &str) -> Result<f64, String> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let parts: Vec<&str> = body.split(':').collect();
    let numbers = parts
        .iter()
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("invalid time period '{text}'"))?;

    let seconds = match numbers.as_slice() {
        [s] => *s,
        [h, m] => h * 3_600.0 + m * 60.0,
        [h, m, s] => h * 3_600.0 + m * 60.0 + s,
        _ => return Err(format!("invalid time period '{text}'")),
    };

    Ok(if negative { -seconds } else { seconds })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = Config::from_toml(
            r#"
            token = "secret"

            [[meters]]
            id = "abc"
            name = "House"
            "#,
        )
        .unwrap();

        assert_eq!(config.token, "secret");
        assert_eq!(config.scan_interval, Duration::from_secs(30));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.home_assistant, None);
        assert_eq!(
            config.meters,
            vec![MeterConfig {
                id: "abc".into(),
                name: "House".into()
            }]
        );
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            token = "secret"
            scan_interval = "00:01:30"
            base_url = "http://localhost:9000/public/v1"

            [[meters]]
            id = 123456
            name = "House"

            [[meters]]
            id = "garage"
            name = "Garage"

            [home_assistant]
            url = "http://homeassistant.local:8123"
            token = "ha_token"
            "#,
        )
        .unwrap();

        assert_eq!(config.scan_interval, Duration::from_secs(90));
        assert_eq!(config.meters.len(), 2);
        assert_eq!(config.meters[0].id, "123456");
        assert_eq!(config.meters[1].name, "Garage");
        assert_eq!(
            config.home_assistant,
            Some(HomeAssistantConfig {
                url: "http://homeassistant.local:8123".into(),
                token: "ha_token".into()
            })
        );
    }

    #[test]
    fn test_single_meter_table() {
        let config = Config::from_toml(
            r#"
            token = "secret"

            [meters]
            id = "abc"
            name = "House"
            "#,
        )
        .unwrap();

        assert_eq!(config.meters.len(), 1);
        assert_eq!(config.meters[0].id, "abc");
    }

    #[test]
    fn test_scan_interval_forms() {
        let cases = [
            ("scan_interval = 45", Duration::from_secs(45)),
            ("scan_interval = 2.5", Duration::from_millis(2500)),
            ("scan_interval = \"10\"", Duration::from_secs(10)),
            ("scan_interval = \"01:00\"", Duration::from_secs(3600)),
            ("scan_interval = { minutes = 2, seconds = 5 }", Duration::from_secs(125)),
            ("scan_interval = { milliseconds = 500 }", Duration::from_millis(500)),
        ];

        for (line, expected) in cases {
            let toml = format!(
                "token = \"t\"\n{line}\n[[meters]]\nid = \"a\"\nname = \"A\"\n"
            );
            let config = Config::from_toml(&toml).unwrap();
            assert_eq!(config.scan_interval, expected, "for `{line}`");
        }
    }

    #[test]
    fn test_invalid_configs() {
        let cases = [
            // missing token
            "[[meters]]\nid = \"a\"\nname = \"A\"\n",
            // empty token
            "token = \"\"\n[[meters]]\nid = \"a\"\nname = \"A\"\n",
            // missing meters
            "token = \"t\"\n",
            // empty meter list
            "token = \"t\"\nmeters = []\n",
            // meter without name
            "token = \"t\"\n[[meters]]\nid = \"a\"\n",
            // zero interval
            "token = \"t\"\nscan_interval = 0\n[[meters]]\nid = \"a\"\nname = \"A\"\n",
            // negative interval
            "token = \"t\"\nscan_interval = \"-00:00:10\"\n[[meters]]\nid = \"a\"\nname = \"A\"\n",
            // garbage interval
            "token = \"t\"\nscan_interval = \"soon\"\n[[meters]]\nid = \"a\"\nname = \"A\"\n",
            // same meter twice
            "token = \"t\"\n[[meters]]\nid = \"a\"\nname = \"A\"\n[[meters]]\nid = \"a\"\nname = \"B\"\n",
            // two meters publishing to the same entity ids
            "token = \"t\"\n[[meters]]\nid = \"a\"\nname = \"House\"\n[[meters]]\nid = \"b\"\nname = \"house\"\n",
        ];

        for toml in cases {
            assert!(Config::from_toml(toml).is_err(), "accepted:\n{toml}");
        }
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("00:00:30"), Ok(30.0));
        assert_eq!(parse_clock("1:30"), Ok(5400.0));
        assert_eq!(parse_clock("-5"), Ok(-5.0));
        assert!(parse_clock("1:2:3:4").is_err());
        assert!(parse_clock("").is_err());
    }
}
