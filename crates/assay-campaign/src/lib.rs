//! Experimentation campaigns for Assay.
//!
//! Provides:
//! - The [`Campaign`] state machine driving the recommend / measure cycle
//! - An append-only measurement log with batch and fit numbers
//! - Campaign construction from JSON configuration
//! - Versioned JSON documents of the full campaign state
//! - Pluggable usage telemetry

pub mod campaign;
pub mod config;
pub mod document;
pub mod log;
pub mod telemetry;

pub use campaign::{Campaign, CampaignId};
pub use config::CampaignConfig;
pub use document::{DOCUMENT_VERSION, VERSION_KEY};
pub use log::{MeasurementLog, BATCH_NR_COLUMN, FIT_NR_COLUMN};
pub use telemetry::{
    ChannelReporter, MemoryReporter, NoopReporter, Telemetry, TelemetryConfig, TelemetryEvent,
    TelemetryLabel, TelemetryReporter, TracingReporter,
};
