//! Preflight configuration from environment.

use std::env;
use std::str::FromStr;
use wpm_core::GeoPoint;
use wpm_sdk::{MaxRadius, PhotoFileFormat, PreflightSettings};

#[derive(Debug, Clone)]
pub struct Config {
    pub home_lat: Option<f64>,
    pub home_lon: Option<f64>,
    pub go_home_height_m: u32,
    pub max_radius_enabled: bool,
    pub max_radius_m: u32,
    pub max_height_m: u32,
    pub photo_format: PhotoFileFormat,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values use defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            home_lat: parsed(&lookup, "WPM_HOME_LAT"),
            home_lon: parsed(&lookup, "WPM_HOME_LON"),
            go_home_height_m: parsed(&lookup, "WPM_GO_HOME_HEIGHT_M").unwrap_or(70),
            max_radius_enabled: lookup("WPM_MAX_RADIUS_ENABLED")
                .map(|s| !matches!(s.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(true),
            max_radius_m: parsed(&lookup, "WPM_MAX_RADIUS_M").unwrap_or(1000),
            max_height_m: parsed(&lookup, "WPM_MAX_HEIGHT_M").unwrap_or(200),
            photo_format: lookup("WPM_PHOTO_FORMAT")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }

    pub fn preflight_settings(&self) -> PreflightSettings {
        let home = match (self.home_lat, self.home_lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };
        PreflightSettings {
            home,
            go_home_height_m: self.go_home_height_m,
            max_radius: MaxRadius {
                enabled: self.max_radius_enabled,
                radius_m: self.max_radius_m,
            },
            max_height_m: self.max_height_m,
            photo_format: self.photo_format,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_match_preflight_defaults() {
        assert_eq!(config(&[]).preflight_settings(), PreflightSettings::default());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("WPM_HOME_LAT", "33.6209929"),
            ("WPM_HOME_LON", "130.6265251"),
            ("WPM_GO_HOME_HEIGHT_M", "90"),
            ("WPM_MAX_RADIUS_ENABLED", "false"),
            ("WPM_MAX_HEIGHT_M", "120"),
            ("WPM_PHOTO_FORMAT", "raw"),
        ]);
        let settings = cfg.preflight_settings();
        assert_eq!(settings.home, Some(GeoPoint::new(33.6209929, 130.6265251)));
        assert_eq!(settings.go_home_height_m, 90);
        assert!(!settings.max_radius.enabled);
        assert_eq!(settings.max_height_m, 120);
        assert_eq!(settings.photo_format, PhotoFileFormat::Raw);
    }

    #[test]
    fn test_partial_home_is_ignored() {
        let cfg = config(&[("WPM_HOME_LAT", "33.6"), ("WPM_MAX_HEIGHT_M", "tall")]);
        let settings = cfg.preflight_settings();
        assert_eq!(settings.home, None);
        assert_eq!(settings.max_height_m, 200);
    }
}
