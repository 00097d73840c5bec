use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;

use neutron_unfold::data::loader::DatasetPaths;
use neutron_unfold::fit::{CsvObserver, FitObserver, LogObserver};
use neutron_unfold::{default_batch, report, ExperimentConstants, RunConfig, Unfolder};

/// Unfold neutron spectra from foil activities and Bonner-sphere spectra.
#[derive(Parser, Debug)]
#[command(name = "neutron-unfold", version, about)]
struct Args {
    /// Batch file: `{ "dataset": {...}, "constants": {...}, "runs": [...] }`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bundled dataset JSON; overrides the batch file's dataset bundle.
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Output JSON with every run record.
    #[arg(long, default_value = "results.json")]
    out: PathBuf,

    /// Also write per-bin spectra as CSV.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write `channel,data,model` CSV files of each sphere fit here.
    #[arg(long)]
    fit_csv_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
struct BatchFile {
    #[serde(default)]
    dataset: DatasetPaths,
    #[serde(default)]
    constants: ExperimentConstants,
    #[serde(default)]
    runs: Vec<RunConfig>,
}

fn load_batch(path: &Path) -> Result<BatchFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading batch file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing batch file {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (mut batch, base) = match &args.config {
        Some(path) => {
            let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
            (load_batch(path)?, base)
        }
        None => (BatchFile::default(), PathBuf::new()),
    };
    if let Some(dataset) = &args.dataset {
        // Command-line paths are relative to the working directory.
        batch.dataset.bundle = Some(std::path::absolute(dataset)?);
    }
    if batch.runs.is_empty() {
        log::info!("No runs configured, using the built-in batch");
        batch.runs = default_batch();
    }

    let dataset = batch.dataset.load(&base)?;
    let unfolder = Unfolder::from_dataset(&dataset, &batch.constants);

    let mut csv_observer;
    let mut log_observer = LogObserver;
    let observer: &mut dyn FitObserver = match &args.fit_csv_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
            csv_observer = CsvObserver::new(dir);
            &mut csv_observer
        }
        None => &mut log_observer,
    };

    let results = unfolder.run_batch_observed(&batch.runs, observer);

    report::write_json(&args.out, &results)?;
    if let Some(csv) = &args.csv {
        report::write_csv(csv, &results)?;
    }

    let failed = results.failures().count();
    if failed > 0 {
        bail!("{failed} of {} run(s) failed", results.runs.len());
    }
    Ok(())
}
