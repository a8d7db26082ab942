//! Telemetry output for the experiment: CSV writer for per-step metrics.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use spinnet_diffusion::StateVector;
use spinnet_sim::analysis::geometry::volume_entropy;

/// One row in the telemetry CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: u64,
    pub time: f64,
    pub volume: f64,
    pub max_value: f64,
    pub entropy: f64,
    pub normalizations: u64,
}

impl StepRecord {
    pub fn new(step: u64, time: f64, state: &StateVector, normalizations: u64) -> Self {
        Self {
            step,
            time,
            volume: state.volume(),
            max_value: state.max_abs(),
            entropy: volume_entropy(state),
            normalizations,
        }
    }
}

/// Write a full run to CSV.
pub fn write_csv(path: &Path, records: &[StepRecord]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    write_records(&mut w, records)?;
    w.flush()
}

fn write_records<W: Write>(w: &mut W, records: &[StepRecord]) -> std::io::Result<()> {
    writeln!(w, "step,time,volume,max_value,entropy,normalizations")?;

    for r in records {
        writeln!(
            w,
            "{},{:.6},{:.6},{:.6},{:.6},{}",
            r.step, r.time, r.volume, r.max_value, r.entropy, r.normalizations,
        )?;
    }
    Ok(())
}
