//! Prometheus text exposition rendering
//!
//! Every column of a [`Snapshot`] becomes one gauge group:
//!
//! ```text
//! # HELP acc_<name> Metric <COLUMN>[ (unit: <unit>)]
//! # TYPE acc_<name> gauge
//! acc_<name> <value>
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::snapshot::{Snapshot, SnapshotValue};

/// Namespace prepended to every metric name.
pub const METRIC_PREFIX: &str = "acc_";

/// Body served before the first successful refresh.
pub const PLACEHOLDER: &str = "# no metrics yet\n";

// ── ExpositionDocument ─────────────────────────────────────────

/// Immutable exposition text. Cloning shares the underlying buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct ExpositionDocument(Arc<str>);

impl ExpositionDocument {
    pub fn placeholder() -> Self {
        Self(Arc::from(PLACEHOLDER))
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self(Arc::from(text.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_placeholder(&self) -> bool {
        &*self.0 == PLACEHOLDER
    }

    /// Sample lines of the document; comments and blank lines are skipped.
    pub fn samples(&self) -> impl Iterator<Item = SampleLine<'_>> {
        self.0.lines().filter_map(SampleLine::parse)
    }
}

impl Default for ExpositionDocument {
    fn default() -> Self {
        Self::placeholder()
    }
}

impl fmt::Display for ExpositionDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ExpositionDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExpositionDocument")
            .field(&format_args!("{} bytes", self.0.len()))
            .finish()
    }
}

impl From<ExpositionDocument> for String {
    fn from(doc: ExpositionDocument) -> Self {
        doc.0.to_string()
    }
}

// ── SampleLine ─────────────────────────────────────────────────

/// A parsed `name{labels} value` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLine<'a> {
    pub name: &'a str,
    pub labels: Option<&'a str>,
    pub value: &'a str,
}

impl<'a> SampleLine<'a> {
    /// Parse a single exposition line. Returns `None` for comments, blank
    /// lines and anything without a value.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (name, labels, rest) = match line.find('{') {
            Some(open) => {
                let close = open + line[open..].find('}')?;
                (&line[..open], Some(&line[open + 1..close]), &line[close + 1..])
            }
            None => {
                let split = line.find(char::is_whitespace)?;
                (&line[..split], None, &line[split..])
            }
        };

        // A trailing timestamp is allowed by the format; only the value matters here.
        let value = rest.split_whitespace().next()?;
        Some(Self {
            name: name.trim(),
            labels,
            value,
        })
    }
}

// ── Rendering ──────────────────────────────────────────────────

/// Derive the metric name for a source column.
///
/// Lowercase, whitespace runs collapsed to `_`, characters outside the
/// Prometheus name alphabet replaced by `_`, prefixed with [`METRIC_PREFIX`].
pub fn metric_name(column: &str) -> String {
    let mut name = String::with_capacity(METRIC_PREFIX.len() + column.len());
    name.push_str(METRIC_PREFIX);

    let mut pending_separator = false;
    for ch in column.trim().chars() {
        if ch.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if pending_separator {
            name.push('_');
            pending_separator = false;
        }
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == ':' {
            name.push(ch);
        } else {
            name.push('_');
        }
    }
    name
}

/// Rendered sample value plus the unit split off a text value, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedValue {
    pub value: String,
    pub unit: Option<String>,
}

impl RenderedValue {
    fn plain(value: String) -> Self {
        Self { value, unit: None }
    }
}

/// Render a typed column value as a sample value.
pub fn render_value(value: &SnapshotValue) -> RenderedValue {
    match value {
        SnapshotValue::Integer(v) => RenderedValue::plain(v.to_string()),
        SnapshotValue::Real(v) => RenderedValue::plain(format_float(*v)),
        SnapshotValue::Text(text) => render_text(text),
        SnapshotValue::Null => RenderedValue::plain("NaN".to_string()),
    }
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

fn render_text(raw: &str) -> RenderedValue {
    let trimmed = raw.trim();

    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return RenderedValue::plain("1".to_string()),
        "false" => return RenderedValue::plain("0".to_string()),
        _ => {}
    }

    let (number, unit) = match trimmed.split_once(' ') {
        Some((number, unit)) => (number, Some(unit.trim())),
        None => match trimmed.strip_suffix('%') {
            Some(number) => (number, Some("%")),
            None => (trimmed, None),
        },
    };
    let unit = unit.filter(|u| !u.is_empty()).map(str::to_string);

    let value = if let Ok(int) = number.parse::<i64>() {
        int.to_string()
    } else if let Ok(float) = number.parse::<f64>() {
        format_float(float)
    } else {
        "NaN".to_string()
    };

    RenderedValue { value, unit }
}

fn escape_help(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Render a snapshot into an exposition document.
pub fn render(snapshot: &Snapshot) -> ExpositionDocument {
    let mut out = String::with_capacity(snapshot.len() * 96);
    let mut seen = HashSet::with_capacity(snapshot.len());

    for (column, value) in snapshot.iter() {
        let name = metric_name(column);
        if !seen.insert(name.clone()) {
            warn!(column, metric = %name, "Duplicate metric name after normalisation, skipping column");
            continue;
        }

        let rendered = render_value(value);
        let column = column.trim();
        let help = match &rendered.unit {
            Some(unit) => format!("Metric {} (unit: {})", column, unit),
            None => format!("Metric {}", column),
        };

        out.push_str(&format!("# HELP {} {}\n", name, escape_help(&help)));
        out.push_str(&format!("# TYPE {} gauge\n", name));
        out.push_str(&format!("{} {}\n", name, rendered.value));
    }

    ExpositionDocument::from_text(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.push("REQUESTSFROMCLIENT", SnapshotValue::Integer(120));
        snapshot.push("BYTESDROPPED", SnapshotValue::Null);
        snapshot.push("CREATIONDATE", SnapshotValue::Real(712800000.0));
        snapshot
    }

    #[test]
    fn metric_name_normalises_column() {
        assert_eq!(metric_name("ZREQUESTSFROMCLIENT"), "acc_zrequestsfromclient");
        assert_eq!(metric_name("  Bytes  From Cache "), "acc_bytes_from_cache");
        assert_eq!(metric_name("Peer\tCount"), "acc_peer_count");
        assert_eq!(metric_name("rate-%"), "acc_rate__");
    }

    #[test]
    fn render_scenario_document() {
        let doc = render(&scenario_snapshot());
        let text = doc.as_str();

        assert!(text.contains("acc_requestsfromclient 120\n"));
        assert!(text.contains("acc_bytesdropped NaN\n"));
        assert!(text.contains("acc_creationdate 712800000\n"));
        assert!(text.contains("# TYPE acc_creationdate gauge\n"));
        assert!(text.contains("# HELP acc_requestsfromclient Metric REQUESTSFROMCLIENT\n"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn one_group_per_column() {
        let snapshot = scenario_snapshot();
        let doc = render(&snapshot);
        let lines: Vec<&str> = doc.as_str().lines().collect();

        assert_eq!(lines.len(), snapshot.len() * 3);
        for (group, (column, _)) in lines.chunks(3).zip(snapshot.iter()) {
            let name = metric_name(column);
            assert!(group[0].starts_with(&format!("# HELP {} ", name)));
            assert_eq!(group[1], format!("# TYPE {} gauge", name));
            assert!(group[2].starts_with(&format!("{} ", name)));
        }
    }

    #[test]
    fn samples_parse_back_to_rendered_pairs() {
        let snapshot = scenario_snapshot();
        let doc = render(&snapshot);

        let parsed: Vec<(String, String)> = doc
            .samples()
            .map(|s| (s.name.to_string(), s.value.to_string()))
            .collect();
        let expected: Vec<(String, String)> = snapshot
            .iter()
            .map(|(column, value)| (metric_name(column), render_value(value).value))
            .collect();

        assert_eq!(parsed, expected);
    }

    #[test]
    fn text_values_split_unit_into_help() {
        let mut snapshot = Snapshot::new();
        snapshot.push("CACHE SIZE", SnapshotValue::Text("12.5 GB".into()));
        let doc = render(&snapshot);

        assert!(doc
            .as_str()
            .contains("# HELP acc_cache_size Metric CACHE SIZE (unit: GB)\n"));
        assert!(doc.as_str().contains("acc_cache_size 12.5\n"));
    }

    #[test]
    fn text_values_are_normalised() {
        let cases = [
            ("TRUE", "1", None),
            ("false", "0", None),
            ("42", "42", None),
            ("3 %", "3", Some("%")),
            ("7%", "7", Some("%")),
            ("not a number", "NaN", Some("a number")),
            ("", "NaN", None),
        ];
        for (input, value, unit) in cases {
            let rendered = render_value(&SnapshotValue::Text(input.to_string()));
            assert_eq!(rendered.value, value, "input {:?}", input);
            assert_eq!(rendered.unit.as_deref(), unit, "input {:?}", input);
        }
    }

    #[test]
    fn special_floats() {
        assert_eq!(render_value(&SnapshotValue::Real(f64::INFINITY)).value, "+Inf");
        assert_eq!(render_value(&SnapshotValue::Real(f64::NEG_INFINITY)).value, "-Inf");
        assert_eq!(render_value(&SnapshotValue::Real(0.25)).value, "0.25");
    }

    #[test]
    fn duplicate_names_keep_first_column() {
        let mut snapshot = Snapshot::new();
        snapshot.push("A B", SnapshotValue::Integer(1));
        snapshot.push("a_b", SnapshotValue::Integer(2));
        let doc = render(&snapshot);

        let samples: Vec<_> = doc.samples().collect();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, "1");
    }

    #[test]
    fn sample_line_parsing() {
        assert_eq!(SampleLine::parse("# HELP x y"), None);
        assert_eq!(SampleLine::parse("   "), None);
        assert_eq!(SampleLine::parse("lonely"), None);

        let plain = SampleLine::parse("acc_x 5").unwrap();
        assert_eq!((plain.name, plain.labels, plain.value), ("acc_x", None, "5"));

        let labelled = SampleLine::parse(r#"acc_x{creationDate="1 2"} 7 1700000000"#).unwrap();
        assert_eq!(labelled.name, "acc_x");
        assert_eq!(labelled.labels, Some(r#"creationDate="1 2""#));
        assert_eq!(labelled.value, "7");
    }

    #[test]
    fn placeholder_is_a_comment() {
        let doc = ExpositionDocument::default();
        assert!(doc.is_placeholder());
        assert!(doc.as_str().contains("no metrics yet"));
        assert_eq!(doc.samples().count(), 0);
    }
}
