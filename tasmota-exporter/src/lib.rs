//! Prometheus metrics exporter for Tasmota devices.
//!
//! Every scrape of the `/metrics` endpoint polls the JSON status API of each
//! configured device, extracts switch state, energy, power, voltage, supply
//! voltage and uptime, and renders them in Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ Tasmota devices │<────│    Collector    │<────│   HTTP Server   │
//! │ (/cm?cmnd=...)  │     │ (per scrape)    │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! A device that cannot be reached or returns invalid JSON is logged and
//! left out of that scrape; the other devices are still reported.
//!
//! # Usage
//!
//! ```bash
//! tasmota-exporter --config config.json5
//! tasmota-exporter --device sonoff-pow-1.home --device albohes-1.home
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod exposition;
pub mod extract;
pub mod http;
pub mod metric;

pub use collector::{DeviceError, SharedCollector, TasmotaCollector};
pub use config::ExporterConfig;
pub use http::HttpServer;
pub use metric::{MetricKind, MetricSample, SampleValue};
