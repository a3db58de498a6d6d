use crate::inexogy_api::{FetchError, InexogyAPI, Reading};
use serde_json::json;

/// The three quantities derived from a meter reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Power,
    EnergyImport,
    EnergyExport,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [
        SensorKind::Power,
        SensorKind::EnergyImport,
        SensorKind::EnergyExport,
    ];

    // Field names still need checking against the provider's reading format
    pub fn field(&self) -> &'static str {
        match self {
            SensorKind::Power => "power",
            SensorKind::EnergyImport => "energyImport",
            SensorKind::EnergyExport => "energyExport",
        }
    }

    /// Divisor applied to the raw field (energy arrives in Wh)
    pub fn scale(&self) -> f64 {
        match self {
            SensorKind::Power => 1.0,
            SensorKind::EnergyImport | SensorKind::EnergyExport => 1000.0,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Power => "W",
            SensorKind::EnergyImport | SensorKind::EnergyExport => "kWh",
        }
    }

    pub fn name_suffix(&self) -> &'static str {
        match self {
            SensorKind::Power => "Power",
            SensorKind::EnergyImport => "Energy Import",
            SensorKind::EnergyExport => "Energy Export",
        }
    }

    fn unique_id_suffix(&self) -> &'static str {
        match self {
            SensorKind::Power => "inexogypowersensor",
            SensorKind::EnergyImport => "inexogyenergyimportsensor",
            SensorKind::EnergyExport => "inexogyenergyexportsensor",
        }
    }

    pub fn device_class(&self) -> &'static str {
        match self {
            SensorKind::Power => "power",
            SensorKind::EnergyImport | SensorKind::EnergyExport => "energy",
        }
    }

    pub fn state_class(&self) -> &'static str {
        match self {
            SensorKind::Power => "measurement",
            SensorKind::EnergyImport | SensorKind::EnergyExport => "total_increasing",
        }
    }
}

/// One exposed sensor for one meter.
///
/// Every sensor keeps its own last reading and fetches on its own, so a meter
/// costs three requests per poll. A failed fetch or a missing field leaves the
/// previously exposed value in place.
#[derive(Debug, Clone)]
pub struct MeterSensor {
    kind: SensorKind,
    meter_id: String,
    name: String,
    unique_id: String,
    last_reading: Option<Reading>,
    native_value: Option<f64>,
}

impl MeterSensor {
    pub fn new(kind: SensorKind, meter_id: &str, meter_name: &str) -> Self {
        Self {
            kind,
            meter_id: meter_id.to_string(),
            name: format!("{} {}", meter_name, kind.name_suffix()),
            unique_id: format!("inexogy_{}_{}", meter_id, kind.unique_id_suffix()),
            last_reading: None,
            native_value: None,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn meter_id(&self) -> &str {
        &self.meter_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn entity_id(&self) -> String {
        format!("sensor.{}", slugify(&self.name))
    }

    pub fn native_value(&self) -> Option<f64> {
        self.native_value
    }

    pub fn has_value(&self) -> bool {
        self.native_value.is_some()
    }

    /// Fetches a fresh reading and re-derives the value. Never fails.
    pub async fn update(&mut self, api: &InexogyAPI) {
        let result = api.fetch_latest_reading(&self.meter_id).await;
        self.apply_fetch_result(result);
    }

    /// Folds a fetch outcome into the sensor state
    pub fn apply_fetch_result(&mut self, result: Result<Reading, FetchError>) {
        match result {
            Ok(reading) => self.last_reading = Some(reading),
            Err(e @ FetchError::UnexpectedShape(_)) => {
                tracing::warn!(meter_id = %self.meter_id, sensor = %self.name, "{e}");
            }
            Err(e) => {
                tracing::error!(
                    meter_id = %self.meter_id,
                    sensor = %self.name,
                    "Error fetching inexogy data: {e}"
                );
            }
        }

        let Some(reading) = &self.last_reading else {
            return;
        };

        match reading.derive_value(self.kind.field(), self.kind.scale()) {
            Some(value) => {
                if self.native_value != Some(value) {
                    tracing::debug!(sensor = %self.name, value, unit = self.kind.unit(), "sensor value changed");
                }
                self.native_value = Some(value);
            }
            None => {
                tracing::debug!(sensor = %self.name, field = self.kind.field(), "field missing in reading");
            }
        }
    }

    /// State string as Home Assistant expects it
    pub fn state(&self) -> String {
        match self.native_value {
            Some(value) => value.to_string(),
            None => "unknown".to_string(),
        }
    }

    pub fn attributes(&self) -> serde_json::Value {
        json!({
            "friendly_name": self.name,
            "unit_of_measurement": self.kind.unit(),
            "device_class": self.kind.device_class(),
            "state_class": self.kind.state_class(),
            "meter_id": self.meter_id,
            "unique_id": self.unique_id,
        })
    }
}

/// Turns a display name into an entity id object part, e.g. "Küche Power" -> "kuche_power"
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        match c {
            'a'..='z' | '0'..='9' => slug.push(c),
            'ä' | 'à' | 'á' | 'â' => slug.push('a'),
            'ö' | 'ò' | 'ó' | 'ô' => slug.push('o'),
            'ü' | 'ù' | 'ú' | 'û' => slug.push('u'),
            'é' | 'è' | 'ê' => slug.push('e'),
            'ß' => slug.push_str("ss"),
            _ => {
                if !slug.is_empty() && !slug.ends_with('_') {
                    slug.push('_');
                }
            }
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}
