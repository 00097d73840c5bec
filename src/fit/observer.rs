use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

// ---------------------------------------------------------------------------
// FitObserver – diagnostics hook, never affects the fit result
// ---------------------------------------------------------------------------

/// Receives the fitted window of each spectrum: the raw data and the
/// model evaluated at the converged parameters.
pub trait FitObserver {
    fn observe(&mut self, detector: &str, first_channel: usize, data: &[f64], model: &[f64]);
}

pub struct NoopObserver;

impl FitObserver for NoopObserver {
    fn observe(&mut self, _detector: &str, _first_channel: usize, _data: &[f64], _model: &[f64]) {}
}

/// Logs the residual summary of each fit.
pub struct LogObserver;

impl FitObserver for LogObserver {
    fn observe(&mut self, detector: &str, first_channel: usize, data: &[f64], model: &[f64]) {
        let chi2: f64 = data
            .iter()
            .zip(model)
            .filter(|(d, _)| **d > 0.0)
            .map(|(d, m)| (d - m).powi(2) / d)
            .sum();
        log::debug!(
            "{detector}: {} channels from {first_channel}, chi2/channel {:.3}",
            data.len(),
            chi2 / data.len().max(1) as f64
        );
    }
}

/// Writes `channel,data,model` CSV files, one per detector, into a
/// directory. Write failures are logged and otherwise ignored.
pub struct CsvObserver {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvObserver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    /// Files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write(path: &Path, first_channel: usize, data: &[f64], model: &[f64]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        writer.write_record(["channel", "data", "model"])?;
        for (i, (d, m)) in data.iter().zip(model).enumerate() {
            writer.write_record(&[
                (first_channel + i).to_string(),
                d.to_string(),
                m.to_string(),
            ])?;
        }
        writer.flush().context("flushing fit CSV")?;
        Ok(())
    }
}

impl FitObserver for CsvObserver {
    fn observe(&mut self, detector: &str, first_channel: usize, data: &[f64], model: &[f64]) {
        let path = self.dir.join(format!("{detector}_fit.csv"));
        match Self::write(&path, first_channel, data, model) {
            Ok(()) => self.written.push(path),
            Err(e) => log::warn!("Failed to write fit diagnostics for {detector}: {e:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_observer_writes_one_row_per_channel() {
        let dir = tempfile::tempdir().unwrap();
        let mut observer = CsvObserver::new(dir.path());
        observer.observe("bs2-1", 400, &[5.0, 6.0, 7.0], &[5.5, 6.0, 6.5]);

        assert_eq!(observer.written().len(), 1);
        let mut reader = csv::Reader::from_path(&observer.written()[0]).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][0], "400");
        assert_eq!(&rows[2][2], "6.5");
    }

    #[test]
    fn csv_observer_survives_missing_directory() {
        let mut observer = CsvObserver::new("/nonexistent/fit/dir");
        observer.observe("bs2-1", 400, &[1.0], &[1.0]);
        assert!(observer.written().is_empty());
    }
}
