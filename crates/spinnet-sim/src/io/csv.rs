//! Flat CSV view of an export: one row per history time.
//!
//! Columns: `time,<nodeIds…>,<geometric property names…>,<statistic names…>`.
//! Fields containing a comma, quote or line break are wrapped in quotes with
//! internal quotes doubled.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Write;

use crate::analysis::{GeometricProperties, StateStatistics};
use crate::error::SimulationError;
use crate::io::export::{ExportOptions, SerializedSimulation};

/// Columns read back from a CSV export, keyed by header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvResults {
    pub headers: Vec<String>,
    pub times:   Vec<f64>,
    /// Every non-time column, in header order of first appearance.
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl CsvResults {
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

// ── Export ───────────────────────────────────────────────────────────────────

pub fn to_csv(data: &SerializedSimulation, opts: &ExportOptions) -> Result<String, SimulationError> {
    let mut out = Vec::new();
    write_csv(data, opts, &mut out)?;
    String::from_utf8(out).map_err(|e| SimulationError::Validation(vec![format!("csv is not utf-8: {e}")]))
}

/// Write the CSV form of `data`. Fails when there is no history to tabulate.
pub fn write_csv<W: Write>(data: &SerializedSimulation, opts: &ExportOptions, writer: &mut W) -> Result<usize, SimulationError> {
    let history = data
        .history
        .as_ref()
        .filter(|h| !h.states.is_empty())
        .ok_or_else(|| SimulationError::Validation(vec!["No simulation history data to export as CSV".to_string()]))?;

    let geo = data
        .geometric_properties
        .as_ref()
        .filter(|g| opts.include_geometric_properties && !g.is_empty());
    let stats = data
        .statistics
        .as_ref()
        .filter(|s| opts.include_statistics && !s.is_empty());

    let geo_names = geo.map(|g| ordered_names(&GeometricProperties::NAMES, g.first().map(|p| &p.properties)));
    let stat_names = stats.map(|s| ordered_names(&StateStatistics::NAMES, s.first().map(|p| &p.statistics)));

    let mut header: Vec<String> = vec!["time".to_string()];
    header.extend(history.states[0].node_ids.iter().cloned());
    header.extend(geo_names.iter().flatten().cloned());
    header.extend(stat_names.iter().flatten().cloned());
    let header_line: Vec<Cow<'_, str>> = header.iter().map(|h| escape_field(h)).collect();
    writeln!(writer, "{}", header_line.join(","))?;

    let mut rows = 0;
    for (time, state) in history.times.iter().zip(&history.states) {
        let mut row: Vec<String> = Vec::with_capacity(header.len());
        row.push(time.to_string());
        row.extend(state.values.iter().map(f64::to_string));

        if let (Some(samples), Some(names)) = (geo, &geo_names) {
            let found = samples.iter().find(|p| p.time == *time).map(|p| &p.properties);
            row.extend(names.iter().map(|n| lookup(found, n)));
        }
        if let (Some(samples), Some(names)) = (stats, &stat_names) {
            let found = samples.iter().find(|s| s.time == *time).map(|s| &s.statistics);
            row.extend(names.iter().map(|n| lookup(found, n)));
        }

        writeln!(writer, "{}", row.join(","))?;
        rows += 1;
    }
    Ok(rows)
}

/// Known names first in their canonical order, then any extras sorted.
fn ordered_names(known: &[&str], sample: Option<&BTreeMap<String, f64>>) -> Vec<String> {
    let Some(sample) = sample else {
        return Vec::new();
    };
    let mut names: Vec<String> = known
        .iter()
        .filter(|n| sample.contains_key(**n))
        .map(|n| n.to_string())
        .collect();
    names.extend(sample.keys().filter(|k| !known.contains(&k.as_str())).cloned());
    names
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn lookup(values: Option<&BTreeMap<String, f64>>, name: &str) -> String {
    values
        .and_then(|m| m.get(name))
        .copied()
        .unwrap_or(0.0)
        .to_string()
}

// ── Import ───────────────────────────────────────────────────────────────────

/// Parse a CSV produced by [`to_csv`]. Rows with an unparseable time are
/// skipped; unparseable cells read as `0`.
pub fn parse_csv_results(text: &str) -> Result<CsvResults, SimulationError> {
    let mut records = split_records(text).into_iter();
    let headers = records
        .next()
        .ok_or_else(|| SimulationError::Validation(vec!["Invalid CSV format: empty input".to_string()]))?;
    let time_index = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("time"))
        .ok_or_else(|| SimulationError::Validation(vec!["Invalid CSV format: missing \"time\" column".to_string()]))?;

    let mut results = CsvResults {
        headers: headers.clone(),
        times:   Vec::new(),
        columns: headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != time_index)
            .map(|(_, h)| (h.clone(), Vec::new()))
            .collect(),
    };

    for cells in records {
        let Some(time) = cells.get(time_index).and_then(|c| c.parse::<f64>().ok()) else {
            continue;
        };
        results.times.push(time);
        for (i, name) in headers.iter().enumerate() {
            if i == time_index {
                continue;
            }
            let value = cells.get(i).and_then(|c| c.parse::<f64>().ok()).unwrap_or(0.0);
            if let Some(column) = results.columns.get_mut(name) {
                column.push(value);
            }
        }
    }
    Ok(results)
}

/// Split `text` into records of fields. Quoted fields may hold commas,
/// doubled quotes and line breaks; unquoted fields are trimmed. Blank lines
/// are dropped.
fn split_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut was_quoted = false;

    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if !was_quoted && field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                was_quoted = true;
            }
            ',' => record.push(finish_field(&mut field, &mut was_quoted)),
            '\r' => {}
            '\n' => {
                record.push(finish_field(&mut field, &mut was_quoted));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }
    if was_quoted || !field.is_empty() || !record.is_empty() {
        record.push(finish_field(&mut field, &mut was_quoted));
        records.push(record);
    }

    records.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    records
}

fn finish_field(field: &mut String, was_quoted: &mut bool) -> String {
    let value = std::mem::take(field);
    if std::mem::replace(was_quoted, false) {
        value
    } else {
        value.trim().to_string()
    }
}
