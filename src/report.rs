use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::pipeline::{BatchReport, UnfoldReport};

// ---------------------------------------------------------------------------
// JSON – full run records
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct BatchDocument<'a> {
    solutions: BTreeMap<&'a str, &'a UnfoldReport>,
    failures: BTreeMap<&'a str, FailureRecord>,
}

#[derive(Serialize)]
struct FailureRecord {
    kind: String,
    message: String,
}

/// Write `{ "solutions": { name: record }, "failures": { name: error } }`.
pub fn write_json(path: &Path, batch: &BatchReport) -> Result<()> {
    let document = BatchDocument {
        solutions: batch.succeeded().map(|r| (r.name.as_str(), r)).collect(),
        failures: batch
            .failures()
            .map(|(name, e)| {
                (
                    name,
                    FailureRecord {
                        kind: format!("{:?}", e.kind()),
                        message: e.to_string(),
                    },
                )
            })
            .collect(),
    };
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &document)
        .context("writing results JSON")?;
    log::info!("Wrote {} solution(s) to {}", document.solutions.len(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// CSV – one row per run and energy bin
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct BinRow<'a> {
    run: &'a str,
    bin: usize,
    e_low: f64,
    e_high: f64,
    default: f64,
    solution: f64,
}

/// Write `run,bin,e_low,e_high,default,solution` rows for every
/// successful run.
pub fn write_csv(path: &Path, batch: &BatchReport) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for report in batch.succeeded() {
        let edges = report.edges();
        for (bin, (solution, default)) in report
            .spectrum()
            .iter()
            .zip(&report.default_spectrum)
            .enumerate()
        {
            writer
                .serialize(BinRow {
                    run: &report.name,
                    bin,
                    e_low: edges[bin],
                    e_high: edges[bin + 1],
                    default: *default,
                    solution: *solution,
                })
                .with_context(|| format!("writing run '{}' bin {bin}", report.name))?;
        }
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunConfig, SolverParams};
    use crate::fit::NoopObserver;
    use crate::pipeline::Unfolder;
    use crate::testing;

    fn batch() -> BatchReport {
        let catalog = testing::catalog();
        let flux = testing::flux();
        let foil = testing::foil_data();
        let spheres = testing::sphere_spectra();
        let constants = testing::constants();
        let unfolder = Unfolder::new(&catalog, &flux, &foil, &spheres, &constants);
        let params = SolverParams {
            tolerance: 0.0,
            max_iterations: 10,
        };
        unfolder.run_batch_observed(
            &[
                RunConfig::new("foil", "foil", 1e5, "Gravel", params),
                RunConfig::new("broken", "foil", 1e5, "simplex", params),
            ],
            &mut NoopObserver,
        )
    }

    #[test]
    fn json_lists_solutions_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        write_json(&path, &batch()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        let foil = &doc["solutions"]["foil"];
        assert_eq!(foil["solution"]["edges"].as_array().unwrap().len(), testing::N_BINS + 1);
        assert_eq!(foil["solution"]["values"].as_array().unwrap().len(), testing::N_BINS);
        assert_eq!(foil["iterations"], 10);
        assert_eq!(doc["failures"]["broken"]["kind"], "InputValidation");
    }

    #[test]
    fn csv_has_one_row_per_bin_of_each_successful_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        write_csv(&path, &batch()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            ["run", "bin", "e_low", "e_high", "default", "solution"]
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), testing::N_BINS);
        assert!(rows.iter().all(|r| &r[0] == "foil"));
        let e_low: f64 = rows[1][2].parse().unwrap();
        let e_high: f64 = rows[0][3].parse().unwrap();
        assert_eq!(e_low, e_high);
    }
}
