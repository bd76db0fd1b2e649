use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{info, warn};

use crate::{error::OutputError, modal::ModalResults};

/// Time series of named channels sampled by the coordinator
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    channels: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one sample. The first sample fixes the channel list.
    pub fn record(&mut self, sample: Vec<(String, f64)>) {
        if self.channels.is_empty() {
            self.channels = sample.iter().map(|(name, _)| name.clone()).collect();
        } else if sample.len() != self.channels.len() {
            warn!(
                "recorder: sample with {} channels skipped, expected {}",
                sample.len(),
                self.channels.len()
            );
            return;
        }
        self.rows.push(sample.into_iter().map(|(_, v)| v).collect());
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All samples of one channel
    pub fn channel(&self, name: &str) -> Option<Vec<f64>> {
        let i = self.channels.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[i]).collect())
    }

    /// Most recent sample of one channel
    pub fn last(&self, name: &str) -> Option<f64> {
        let i = self.channels.iter().position(|c| c == name)?;
        self.rows.last().map(|r| r[i])
    }

    pub fn clear(&mut self) {
        self.channels.clear();
        self.rows.clear();
    }
}

/// Writes a recorder as CSV with a header row of channel names
pub fn write_recorder<W: Write>(writer: W, recorder: &Recorder) -> Result<(), OutputError> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(recorder.channels())?;
    for row in recorder.rows() {
        w.write_record(row.iter().map(|v| format!("{v:e}")))?;
    }
    w.flush()?;
    Ok(())
}

/// Writes the modal table: one row per mode
pub fn write_modal_table<W: Write>(writer: W, results: &ModalResults) -> Result<(), OutputError> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(["mode", "frequency_hz", "damping_ratio"])?;
    for (i, m) in results.modes.iter().enumerate() {
        w.write_record([
            i.to_string(),
            format!("{:e}", m.frequency),
            format!("{:e}", m.damping_ratio),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Writes mode shapes in the nodes' local frames, one row per node and mode
pub fn write_mode_shapes<W: Write>(writer: W, results: &ModalResults) -> Result<(), OutputError> {
    let mut w = csv::Writer::from_writer(writer);
    let components = ["tx", "ty", "tz", "rx", "ry", "rz"];
    let mut header = vec!["mode".to_string(), "node".to_string()];
    for c in components {
        header.push(format!("{c}_re"));
        header.push(format!("{c}_im"));
    }
    w.write_record(&header)?;
    for (i, m) in results.modes.iter().enumerate() {
        for s in &m.node_shapes {
            let mut record = vec![i.to_string(), s.node.0.to_string()];
            for c in s.translation.iter().chain(&s.rotation) {
                record.push(format!("{:e}", c.re));
                record.push(format!("{:e}", c.im));
            }
            w.write_record(&record)?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Output files under one directory
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, OutputError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn write_time_series(&self, name: &str, recorder: &Recorder) -> Result<PathBuf, OutputError> {
        let path = self.dir.join(format!("{name}.csv"));
        write_recorder(fs::File::create(&path)?, recorder)?;
        info!(
            "wrote {} samples of {} channels to {}",
            recorder.len(),
            recorder.channels().len(),
            path.display()
        );
        Ok(path)
    }

    /// Writes `<name>_modes.csv` and `<name>_shapes.csv`
    pub fn write_modal(&self, name: &str, results: &ModalResults) -> Result<PathBuf, OutputError> {
        let path = self.dir.join(format!("{name}_modes.csv"));
        write_modal_table(fs::File::create(&path)?, results)?;
        write_mode_shapes(
            fs::File::create(self.dir.join(format!("{name}_shapes.csv")))?,
            results,
        )?;
        info!("wrote {} modes to {}", results.modes.len(), path.display());
        Ok(path)
    }
}
