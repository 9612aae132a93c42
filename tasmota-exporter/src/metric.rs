//! Metric samples produced from Tasmota status documents.

use std::collections::BTreeMap;

/// The metric kinds extracted from a device status document.
///
/// Names, label keys and label values are consumed by downstream
/// dashboards and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    SwitchState,
    Energy,
    Power,
    Voltage,
    SupplyVoltage,
    Uptime,
}

impl MetricKind {
    /// All kinds in exposition order.
    pub const ALL: [MetricKind; 6] = [
        MetricKind::SwitchState,
        MetricKind::Energy,
        MetricKind::Power,
        MetricKind::Voltage,
        MetricKind::SupplyVoltage,
        MetricKind::Uptime,
    ];

    /// Prometheus metric name.
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::SwitchState => "switch_state",
            MetricKind::Energy => "energy",
            MetricKind::Power => "power",
            MetricKind::Voltage => "voltage",
            MetricKind::SupplyVoltage => "esp_power_supply",
            MetricKind::Uptime => "uptime",
        }
    }

    /// HELP text for the exposition format.
    pub fn help(&self) -> &'static str {
        match self {
            MetricKind::SwitchState => "State of switches",
            MetricKind::Energy => "Energy reported by sensor",
            MetricKind::Power => "Power reported by sensor",
            MetricKind::Voltage => "Voltage reported by sensor",
            MetricKind::SupplyVoltage => "Voltage provided to ESP module",
            MetricKind::Uptime => "Uptime reported by device",
        }
    }

    /// Value of the `domain` label.
    pub fn domain(&self) -> &'static str {
        match self {
            MetricKind::SwitchState => "switch",
            _ => "sensor",
        }
    }

    /// `(type, unit)` label values for gauge kinds, `None` for the state-set.
    pub fn type_and_unit(&self) -> Option<(&'static str, &'static str)> {
        match self {
            MetricKind::SwitchState => None,
            MetricKind::Energy => Some(("energy", "kWh")),
            MetricKind::Power => Some(("power", "W")),
            MetricKind::Voltage => Some(("voltage", "V")),
            MetricKind::SupplyVoltage => Some(("voltage", "V")),
            MetricKind::Uptime => Some(("time", "s")),
        }
    }
}

/// The value carried by a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    /// Point-in-time numeric value.
    Gauge(f64),
    /// Named boolean switches.
    StateSet(BTreeMap<String, bool>),
}

/// One metric sample for one device.
///
/// The label set is derived from `node` and `kind`, so a sample can never
/// carry a node label other than the device it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub node: String,
    pub kind: MetricKind,
    pub value: SampleValue,
}

impl MetricSample {
    /// Create a gauge sample.
    pub fn gauge(node: &str, kind: MetricKind, value: f64) -> Self {
        Self {
            node: node.to_string(),
            kind,
            value: SampleValue::Gauge(value),
        }
    }

    /// Create a switch state-set sample.
    pub fn switch_state(node: &str, states: BTreeMap<String, bool>) -> Self {
        Self {
            node: node.to_string(),
            kind: MetricKind::SwitchState,
            value: SampleValue::StateSet(states),
        }
    }

    /// Label pairs in exposition order.
    pub fn labels(&self) -> Vec<(&'static str, &str)> {
        let mut labels = vec![("node", self.node.as_str()), ("domain", self.kind.domain())];
        if let Some((kind_type, unit)) = self.kind.type_and_unit() {
            labels.push(("type", kind_type));
            labels.push(("unit", unit));
        }
        labels
    }
}
