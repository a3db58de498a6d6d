use crate::config::Config;
use crate::home_assistant::{HAStateUpdate, HomeAssistantAPI};
use crate::inexogy_api::InexogyAPI;
use crate::meter_sensor::{MeterSensor, SensorKind};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Owns every meter sensor and drives the poll cycle.
///
/// Sensors are updated one after another on a single task, so no sensor state
/// is ever shared.
pub struct SensorPlatform {
    api: InexogyAPI,
    home_assistant: Option<HomeAssistantAPI>,
    scan_interval: Duration,
    sensors: Vec<MeterSensor>,
}

impl SensorPlatform {
    /// Builds the power, import and export sensors for every configured meter
    pub fn new(config: &Config) -> Result<Self, anyhow::Error> {
        let api = InexogyAPI::new(&config.base_url, &config.token)?;
        let home_assistant = config
            .home_assistant
            .as_ref()
            .map(|ha| HomeAssistantAPI::new(&ha.url, &ha.token))
            .transpose()?;

        let sensors: Vec<MeterSensor> = config
            .meters
            .iter()
            .flat_map(|meter| {
                SensorKind::ALL
                    .into_iter()
                    .map(move |kind| MeterSensor::new(kind, &meter.id, &meter.name))
            })
            .collect();

        tracing::info!(
            sensors = sensors.len(),
            scan_interval = ?config.scan_interval,
            home_assistant = home_assistant.is_some(),
            "Sensor platform configured"
        );

        Ok(Self {
            api,
            home_assistant,
            scan_interval: config.scan_interval,
            sensors,
        })
    }

    pub fn sensors(&self) -> &[MeterSensor] {
        &self.sensors
    }

    /// Spawns the poll loop on its own task
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Updates every sensor once before publishing, then polls forever
    pub async fn run(&mut self) {
        tracing::info!("Starting inexogy sensor platform");

        self.update_all().await;
        self.publish_all().await;

        let mut poll_interval = interval(self.scan_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and the initial pass already ran
        poll_interval.tick().await;

        loop {
            poll_interval.tick().await;
            self.poll_once().await;
        }
    }

    /// One scheduler tick: update all sensors, then publish their states
    pub async fn poll_once(&mut self) {
        self.update_all().await;
        self.publish_all().await;
    }

    pub async fn update_all(&mut self) {
        for sensor in self.sensors.iter_mut() {
            sensor.update(&self.api).await;
        }
    }

    pub async fn publish_all(&self) {
        for sensor in &self.sensors {
            let entity_id = sensor.entity_id();
            let update = HAStateUpdate {
                state: sensor.state(),
                attributes: sensor.attributes(),
            };

            match &self.home_assistant {
                Some(ha) => {
                    if let Err(e) = ha.write_state(&entity_id, &update).await {
                        tracing::error!(entity_id = %entity_id, "Failed to write state to Home Assistant: {e:#}");
                    }
                }
                None => {
                    tracing::info!(
                        entity_id = %entity_id,
                        state = %update.state,
                        unit = sensor.kind().unit(),
                        meter_id = sensor.meter_id(),
                        "sensor state"
                    );
                }
            }
        }
    }
}
