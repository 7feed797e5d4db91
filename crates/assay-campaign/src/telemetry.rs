//! Usage telemetry for campaigns.
//!
//! A [`Telemetry`] handle sits on every campaign and forwards
//! [`TelemetryEvent`]s to an injected [`TelemetryReporter`]. Reporting never
//! fails from the campaign's point of view: disabled telemetry drops events
//! and backends swallow their own errors.

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const TELEMETRY_ENV_VAR: &str = "ASSAY_TELEMETRY_ENABLED";

/// What a telemetry event measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryLabel {
    CountRecommend,
    BatchSize,
    CountAddResults,
    RecommendedMeasurementPercentage,
}

impl TelemetryLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CountRecommend => "count_recommend",
            Self::BatchSize => "batch_size",
            Self::CountAddResults => "count_add_results",
            Self::RecommendedMeasurementPercentage => "recommended_measurement_percentage",
        }
    }
}

impl fmt::Display for TelemetryLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub campaign_id: Uuid,
    pub label: TelemetryLabel,
    pub value: f64,
    /// Wall-clock time at which the event was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Sink for telemetry events.
pub trait TelemetryReporter: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl TelemetryReporter for NoopReporter {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Emits events as `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl TelemetryReporter for TracingReporter {
    fn record(&self, event: TelemetryEvent) {
        info!(
            target: "assay::telemetry",
            campaign = %event.campaign_id,
            label = %event.label,
            value = event.value,
            "telemetry"
        );
    }
}

/// Forwards events over a crossbeam channel. A disconnected receiver is
/// ignored.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: Sender<TelemetryEvent>,
}

impl ChannelReporter {
    pub fn new(tx: Sender<TelemetryEvent>) -> Self {
        Self { tx }
    }
}

impl TelemetryReporter for ChannelReporter {
    fn record(&self, event: TelemetryEvent) {
        let _ = self.tx.send(event);
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Values recorded under `label`, in order.
    pub fn values(&self, label: TelemetryLabel) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.label == label)
            .map(|e| e.value)
            .collect()
    }
}

impl TelemetryReporter for MemoryReporter {
    fn record(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl TelemetryConfig {
    /// Read `ASSAY_TELEMETRY_ENABLED`; unset means enabled.
    pub fn from_env() -> Self {
        match std::env::var(TELEMETRY_ENV_VAR) {
            Ok(value) => Self {
                enabled: parse_flag(&value).unwrap_or(true),
            },
            Err(_) => Self::default(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Gated reporter handle owned by a campaign.
#[derive(Clone)]
pub struct Telemetry {
    config: TelemetryConfig,
    reporter: Arc<dyn TelemetryReporter>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            config: TelemetryConfig::default(),
            reporter: Arc::new(NoopReporter),
        }
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    pub fn new(config: TelemetryConfig, reporter: Arc<dyn TelemetryReporter>) -> Self {
        Self { config, reporter }
    }

    /// Reporter gated by the environment.
    pub fn from_env(reporter: Arc<dyn TelemetryReporter>) -> Self {
        Self::new(TelemetryConfig::from_env(), reporter)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn record(&self, campaign_id: Uuid, label: TelemetryLabel, value: f64) {
        if !self.config.enabled {
            return;
        }
        self.reporter.record(TelemetryEvent {
            campaign_id,
            label,
            value,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_telemetry_drops_events() {
        let memory = Arc::new(MemoryReporter::new());
        let telemetry = Telemetry::new(TelemetryConfig { enabled: false }, memory.clone());
        telemetry.record(Uuid::new_v4(), TelemetryLabel::BatchSize, 3.0);
        assert!(memory.events().is_empty());

        let telemetry = Telemetry::new(TelemetryConfig::default(), memory.clone());
        telemetry.record(Uuid::new_v4(), TelemetryLabel::BatchSize, 3.0);
        assert_eq!(memory.values(TelemetryLabel::BatchSize), vec![3.0]);
    }

    #[test]
    fn channel_reporter_survives_dropped_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let reporter = ChannelReporter::new(tx);
        let id = Uuid::new_v4();
        let telemetry = Telemetry::new(TelemetryConfig::default(), Arc::new(reporter));

        telemetry.record(id, TelemetryLabel::CountRecommend, 1.0);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.campaign_id, id);
        assert_eq!(event.label, TelemetryLabel::CountRecommend);

        drop(rx);
        telemetry.record(id, TelemetryLabel::CountRecommend, 1.0);
    }

    #[test]
    fn flag_parsing() {
        assert_eq!(parse_flag("False"), Some(false));
        assert_eq!(parse_flag(" 1 "), Some(true));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn labels_serialize_snake_case() {
        let label = TelemetryLabel::RecommendedMeasurementPercentage;
        let json = serde_json::to_string(&label).unwrap();
        assert_eq!(json, r#""recommended_measurement_percentage""#);
    }
}
