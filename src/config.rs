use motion::{ControllerConfig, TrackingConfig};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub location: LocationConfig,
    #[serde(default)]
    pub motor: ControllerConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub station_id: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub timezone_offset_hours: f64,
    /// Turn angle assumed when nothing is stored, tenths of a degree
    #[serde(default = "default_heading")]
    pub heading: i16,
}

fn default_heading() -> i16 {
    1800
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // Try external file first
        let config = if Path::new("config.toml").exists() {
            let config_content = fs::read_to_string("config.toml")?;
            let config = Self::parse(&config_content)?;
            log::info!("Loaded configuration from file");
            config
        } else {
            // Fallback to embedded defaults
            let config = Self::parse(include_str!("../config.toml.example"))?;
            log::warn!("Using embedded default configuration");
            config
        };
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.motor.validate()?;
        if !(-90.0..=90.0).contains(&config.location.latitude) {
            anyhow::bail!("latitude {} out of range", config.location.latitude);
        }
        if !(0..3600).contains(&config.location.heading) {
            anyhow::bail!("heading {} must be in 0..3600 tenths", config.location.heading);
        }
        Ok(config)
    }
}

// Helper functions for easy access
impl Config {
    pub fn get_latitude(&self) -> f64 {
        self.location.latitude
    }

    pub fn get_longitude(&self) -> f64 {
        self.location.longitude
    }

    pub fn get_altitude(&self) -> f64 {
        self.location.altitude
    }

    pub fn get_station_id(&self) -> u32 {
        self.device.station_id
    }

    pub fn get_timezone_offset(&self) -> f64 {
        self.location.timezone_offset_hours
    }
}
