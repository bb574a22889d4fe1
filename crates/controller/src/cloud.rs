//! ThingSpeak-style telemetry uploader.
//!
//! The collector charts what the plant actually receives, so total lux is
//! the leading field and the natural-only measurement rides along last.
//! Failed uploads are the caller's problem to log and skip; this client
//! only guarantees the request cannot hang past its timeout.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::CloudConfig;
use crate::error::NetworkError;
use crate::ports::CloudPort;
use crate::record::{IrrigationState, TelemetryRecord};

/// Form body of one collector update.
#[derive(Debug, PartialEq, Serialize)]
struct UpdateFields<'a> {
    api_key: &'a str,
    /// Total lux — light actually reaching the plant.
    field1: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    field2: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field3: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field4: Option<f32>,
    /// 1 while a dose ran this cycle.
    field5: u8,
    /// Natural lux — sunlight with the fixture forced off.
    field6: f32,
}

impl<'a> UpdateFields<'a> {
    fn new(api_key: &'a str, record: &TelemetryRecord) -> Self {
        Self {
            api_key,
            field1: record.total_lux,
            field2: record.soil_moisture_pct,
            field3: record.ambient_temp_c,
            field4: record.ambient_humidity_pct,
            field5: u8::from(record.irrigation_state == IrrigationState::Watering),
            field6: record.natural_lux,
        }
    }
}

pub struct ThingSpeakClient {
    client: Client,
    url: String,
    api_key: String,
}

impl ThingSpeakClient {
    pub fn new(cfg: &CloudConfig) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs_f64(cfg.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
        })
    }
}

impl CloudPort for ThingSpeakClient {
    async fn publish(&mut self, record: &TelemetryRecord) -> Result<(), NetworkError> {
        let fields = UpdateFields::new(&self.api_key, record);
        let response = self.client.post(&self.url).form(&fields).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                status: status.as_u16(),
            });
        }

        debug!(
            entry = %response.text().await.unwrap_or_default(),
            "telemetry published"
        );
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
