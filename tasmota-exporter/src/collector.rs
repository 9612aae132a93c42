//! Scrape-time collection of Tasmota device metrics.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::config::PollingConfig;
use crate::extract::{self, FieldError};
use crate::metric::{MetricKind, MetricSample};

/// Error type for a single device pass.
///
/// Any of these abandons the device for the current scrape; the remaining
/// devices are unaffected.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Polling task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Polls every configured device on demand.
///
/// Holds no per-scrape state: each call to [`collect`](Self::collect) builds
/// a fresh set of samples.
pub struct TasmotaCollector {
    devices: Vec<String>,
    client: reqwest::Client,
    command: String,
}

/// Create a shareable collector handle.
pub type SharedCollector = Arc<TasmotaCollector>;

impl TasmotaCollector {
    /// Create a collector for `devices`, polled in the given order.
    pub fn new(devices: Vec<String>, polling: &PollingConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(polling.timeout())
            .build()?;

        Ok(Self {
            devices,
            client,
            command: polling.status_command.trim().replace(' ', "%20"),
        })
    }

    /// Configured device addresses.
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// Status URL for a device, e.g. `http://relay-1/cm?cmnd=status%2010`.
    pub fn status_url(&self, device: &str) -> String {
        format!("http://{}/cm?cmnd={}", device, self.command)
    }

    /// Run one collection pass over all devices.
    ///
    /// Devices are polled concurrently, each in its own task. Samples are
    /// returned in configured device order; a device that fails contributes
    /// nothing.
    pub async fn collect(&self) -> Vec<MetricSample> {
        let handles: Vec<_> = self
            .devices
            .iter()
            .map(|node| {
                let client = self.client.clone();
                let url = self.status_url(node);
                let node = node.clone();
                tokio::spawn(async move { poll_device(&client, &node, &url).await })
            })
            .collect();

        let mut samples = Vec::with_capacity(self.devices.len() * MetricKind::ALL.len());

        for (node, handle) in self.devices.iter().zip(handles) {
            match handle.await.map_err(DeviceError::from).and_then(|r| r) {
                Ok(device_samples) => {
                    debug!(node = %node, count = device_samples.len(), "Device collected");
                    samples.extend(device_samples);
                }
                Err(e) => {
                    error!(node = %node, error = %e, "Device poll failed");
                }
            }
        }

        samples
    }

    /// Poll a single device.
    pub async fn collect_device(&self, node: &str) -> Result<Vec<MetricSample>, DeviceError> {
        poll_device(&self.client, node, &self.status_url(node)).await
    }
}

async fn poll_device(
    client: &reqwest::Client,
    node: &str,
    url: &str,
) -> Result<Vec<MetricSample>, DeviceError> {
    info!(node = %node, "Requesting JSON");
    let document = fetch_status(client, url).await?;
    Ok(samples_from_document(node, &document))
}

/// Fetch and decode a device status document.
async fn fetch_status(client: &reqwest::Client, url: &str) -> Result<Value, DeviceError> {
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    Ok(serde_json::from_slice(&body)?)
}

/// Extract every metric kind from one status document.
///
/// Kinds are independent: a missing field is skipped silently, a malformed
/// one is logged and skipped, and neither affects the other kinds.
pub fn samples_from_document(node: &str, document: &Value) -> Vec<MetricSample> {
    let mut samples = Vec::with_capacity(MetricKind::ALL.len());

    match extract::switch_states(document) {
        Some(states) => {
            debug!(node = %node, ?states, "Switch states");
            samples.push(MetricSample::switch_state(node, states));
        }
        None => trace!(node = %node, "No switch states"),
    }

    let readings: [(MetricKind, Result<Option<f64>, FieldError>); 5] = [
        (MetricKind::Energy, extract::energy_total(document)),
        (MetricKind::Power, extract::power(document)),
        (MetricKind::Voltage, extract::voltage(document)),
        (MetricKind::SupplyVoltage, extract::supply_voltage(document)),
        (MetricKind::Uptime, extract::uptime_seconds(document)),
    ];

    for (kind, reading) in readings {
        match reading {
            Ok(Some(value)) => {
                debug!(node = %node, metric = kind.name(), value, "Field extracted");
                samples.push(MetricSample::gauge(node, kind, value));
            }
            Ok(None) => trace!(node = %node, metric = kind.name(), "Field absent"),
            Err(e) => {
                warn!(node = %node, metric = kind.name(), error = %e, "Skipping malformed field");
            }
        }
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::SampleValue;
    use serde_json::json;
    use std::io::Write;
    use tracing::instrument::WithSubscriber;

    /// In-memory log sink for a fmt subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
            let sink = self.clone();
            tracing_subscriber::fmt()
                .with_writer(move || sink.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::TRACE)
                .finish()
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn full_document() -> Value {
        json!({
            "StatusSTS": {
                "Uptime": "2T03:15:09",
                "Vcc": 3.2,
                "POWER1": "ON",
                "POWER2": "OFF"
            },
            "StatusSNS": {
                "ENERGY": { "Total": 10.5, "Power": 100, "Voltage": 230 }
            }
        })
    }

    fn kinds(samples: &[MetricSample]) -> Vec<MetricKind> {
        samples.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_all_kinds_extracted() {
        let samples = samples_from_document("pow-1", &full_document());

        assert_eq!(kinds(&samples), MetricKind::ALL.to_vec());
        assert!(samples.iter().all(|s| s.node == "pow-1"));
    }

    #[test]
    fn test_uptime_value() {
        let samples = samples_from_document("pow-1", &full_document());
        let uptime = samples
            .iter()
            .find(|s| s.kind == MetricKind::Uptime)
            .unwrap();
        assert_eq!(uptime.value, SampleValue::Gauge(184509.0));
    }

    #[test]
    fn test_missing_power_keeps_other_kinds() {
        let mut doc = full_document();
        doc["StatusSNS"]["ENERGY"]
            .as_object_mut()
            .unwrap()
            .remove("Power");

        let samples = samples_from_document("pow-1", &doc);
        let kinds = kinds(&samples);

        assert!(!kinds.contains(&MetricKind::Power));
        assert!(kinds.contains(&MetricKind::Energy));
        assert!(kinds.contains(&MetricKind::Voltage));
        assert!(kinds.contains(&MetricKind::Uptime));
        assert!(kinds.contains(&MetricKind::SwitchState));
    }

    #[test]
    fn test_malformed_uptime_keeps_other_kinds() {
        for uptime in ["abcT03:15:09", "2-03:15:09"] {
            let mut doc = full_document();
            doc["StatusSTS"]["Uptime"] = json!(uptime);

            let samples = samples_from_document("pow-1", &doc);
            let kinds = kinds(&samples);

            assert!(!kinds.contains(&MetricKind::Uptime));
            assert_eq!(kinds.len(), MetricKind::ALL.len() - 1);
        }
    }

    #[test]
    fn test_plain_relay_without_sensor() {
        let doc = json!({
            "StatusSTS": { "Uptime": "0T00:00:00", "POWER": "OFF" }
        });
        let samples = samples_from_document("relay", &doc);

        assert_eq!(
            kinds(&samples),
            vec![MetricKind::SwitchState, MetricKind::Uptime]
        );
        assert_eq!(samples[1].value, SampleValue::Gauge(0.0));
    }

    #[test]
    fn test_empty_document() {
        assert!(samples_from_document("relay", &json!({})).is_empty());
    }

    #[test]
    fn test_status_url() {
        let collector =
            TasmotaCollector::new(vec!["relay-1".into()], &PollingConfig::default()).unwrap();
        assert_eq!(
            collector.status_url("relay-1"),
            "http://relay-1/cm?cmnd=status%2010"
        );
    }

    #[test]
    fn test_status_url_custom_command() {
        let polling = PollingConfig {
            status_command: "status 0".to_string(),
            ..Default::default()
        };
        let collector = TasmotaCollector::new(vec![], &polling).unwrap();
        assert_eq!(
            collector.status_url("10.0.0.5:8080"),
            "http://10.0.0.5:8080/cm?cmnd=status%200"
        );
    }

    #[tokio::test]
    async fn test_no_devices() {
        let collector = TasmotaCollector::new(vec![], &PollingConfig::default()).unwrap();
        assert!(collector.collect().await.is_empty());
    }

    #[test]
    fn test_devices_keep_config_order() {
        let devices = vec!["b.home".to_string(), "a.home".to_string()];
        let collector = TasmotaCollector::new(devices.clone(), &PollingConfig::default()).unwrap();
        assert_eq!(collector.devices(), devices.as_slice());
    }

    #[tokio::test]
    async fn test_failed_device_is_logged() {
        let logs = CapturedLogs::default();
        let polling = PollingConfig {
            timeout_ms: 500,
            ..Default::default()
        };
        // Port 1 on loopback refuses connections.
        let collector = TasmotaCollector::new(vec!["127.0.0.1:1".into()], &polling).unwrap();

        let samples = collector
            .collect()
            .with_subscriber(logs.subscriber())
            .await;
        assert!(samples.is_empty());

        let output = logs.contents();
        let line = output
            .lines()
            .find(|l| l.contains("Device poll failed"))
            .unwrap_or_else(|| panic!("no device failure logged: {}", output));
        assert!(line.contains("ERROR"));
        assert!(line.contains("node=127.0.0.1:1"));
        assert!(line.contains("Request failed"));
    }

    #[test]
    fn test_malformed_field_is_logged() {
        let logs = CapturedLogs::default();
        let mut doc = full_document();
        doc["StatusSTS"]["Uptime"] = json!("abcT03:15:09");

        let samples = tracing::subscriber::with_default(logs.subscriber(), || {
            samples_from_document("pow-1", &doc)
        });
        assert_eq!(samples.len(), MetricKind::ALL.len() - 1);

        let output = logs.contents();
        let line = output
            .lines()
            .find(|l| l.contains("Skipping malformed field"))
            .unwrap_or_else(|| panic!("no malformed field logged: {}", output));
        assert!(line.contains("WARN"));
        assert!(line.contains("node=pow-1"));
        assert!(line.contains("uptime"));
        assert!(line.contains("abcT03:15:09"));
    }
}
