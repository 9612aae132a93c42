//! Prometheus text exposition format (version 0.0.4).

use std::fmt::{self, Display, Write};

use crate::metric::{MetricKind, MetricSample, SampleValue};

/// Content type served on the metrics endpoint.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples in Prometheus exposition format.
///
/// Samples are grouped into one family per metric name, in
/// [`MetricKind::ALL`] order; within a family, series keep the order of
/// `samples`. The switch state-set is exposed as a gauge with one series per
/// switch, keyed by a label named after the metric.
pub fn render(samples: &[MetricSample]) -> String {
    let mut output = String::with_capacity(samples.len() * 100);

    for kind in MetricKind::ALL {
        let mut series = samples.iter().filter(|s| s.kind == kind).peekable();
        if series.peek().is_none() {
            continue;
        }

        let name = kind.name();
        writeln!(output, "# HELP {} {}", name, kind.help()).ok();
        writeln!(output, "# TYPE {} gauge", name).ok();

        for sample in series {
            let mut labels = sample.labels();
            match &sample.value {
                SampleValue::Gauge(value) => {
                    write_series(&mut output, name, &labels, GaugeValue(*value));
                }
                SampleValue::StateSet(states) => {
                    labels.push((name, ""));
                    for (state, enabled) in states {
                        if let Some(last) = labels.last_mut() {
                            last.1 = state.as_str();
                        }
                        write_series(&mut output, name, &labels, u8::from(*enabled));
                    }
                }
            }
        }
    }

    output
}

/// Write one `name{k="v",...} value` line, keeping the given label order.
fn write_series(output: &mut String, name: &str, labels: &[(&str, &str)], value: impl Display) {
    output.push_str(name);

    for (i, (key, val)) in labels.iter().enumerate() {
        output.push(if i == 0 { '{' } else { ',' });
        output.push_str(key);
        output.push_str("=\"");
        push_escaped(output, val);
        output.push('"');
    }
    if !labels.is_empty() {
        output.push('}');
    }

    writeln!(output, " {}", value).ok();
}

/// Append a label value, escaping backslash, double quote and newline.
fn push_escaped(output: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => output.push_str("\\\\"),
            '"' => output.push_str("\\\""),
            '\n' => output.push_str("\\n"),
            _ => output.push(c),
        }
    }
}

/// Gauge value formatting: whole numbers without a trailing `.0`.
///
/// Values come from JSON numbers, which are always finite.
struct GaugeValue(f64);

impl Display for GaugeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{:.0}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}
