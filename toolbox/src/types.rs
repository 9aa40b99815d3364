use std::path::Path;

use serde::Deserialize;
use subsurface_toolbox_core::GpxWriter;

use crate::arguments::TrackOptions;
use crate::errors::ConfigError;
use crate::helpers::fs;

const DIVE_TRACK_INTERVAL: i64 = 900;

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Time zone token used instead of the host offset
    pub default_time_zone: Option<String>,
    /// Target seconds between dive track points
    pub dive_track_interval: i64,
    pub track_poi: bool,
    pub detect_stops: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_time_zone: None,
            dive_track_interval: DIVE_TRACK_INTERVAL,
            track_poi: false,
            detect_stops: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_text(path)?;
        let config = serde_yml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(path = %path.display(), ?config, "Loaded configuration");
        Ok(config)
    }

    /// Command line time zone, falling back to the configured one.
    pub fn time_zone<'a>(&'a self, flag: Option<&'a str>) -> Option<&'a str> {
        flag.or(self.default_time_zone.as_deref())
    }

    pub fn writer(&self, options: &TrackOptions) -> GpxWriter {
        GpxWriter::new(
            options.track_poi || self.track_poi,
            options.detect_stops || self.detect_stops,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_config() {
        let config: Config = serde_yml::from_str("default_time_zone: '+0100'\ntrack_poi: true\n").unwrap();
        assert_eq!(config.default_time_zone.as_deref(), Some("+0100"));
        assert_eq!(config.dive_track_interval, 900);
        assert!(config.track_poi);
        assert!(!config.detect_stops);
    }

    #[test]
    fn test_time_zone_precedence() {
        let config = Config {
            default_time_zone: Some("-0300".to_string()),
            ..Default::default()
        };
        assert_eq!(config.time_zone(Some("+0200")), Some("+0200"));
        assert_eq!(config.time_zone(None), Some("-0300"));
        assert_eq!(Config::default().time_zone(None), None);
    }
}
