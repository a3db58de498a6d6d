//! Inexogy Meter Bridge Library
//!
//! Polls the inexogy metering API and exposes power, imported energy and
//! exported energy of each configured meter as Home Assistant sensors.

pub mod config;
pub mod home_assistant;
pub mod inexogy_api;
pub mod logging;
pub mod meter_sensor;
pub mod sensor_platform;

// Re-export commonly used types for easier access
pub use config::{Config, MeterConfig};
pub use inexogy_api::{FetchError, InexogyAPI, Reading};
pub use meter_sensor::{MeterSensor, SensorKind};
pub use sensor_platform::SensorPlatform;
