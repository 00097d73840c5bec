use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::catalog::InMemoryCatalog;
use super::experiment::{SphereSpectra, TabulatedFoilData};
use super::flux::{FluxTable, TabulatedFlux};
use super::model::{RawSpectrum, ResponseFunction};

// ---------------------------------------------------------------------------
// Dataset – everything a run reads
// ---------------------------------------------------------------------------

/// The four external collaborators, loaded and ready for a run.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub catalog: InMemoryCatalog,
    pub flux: TabulatedFlux,
    pub foil: TabulatedFoilData,
    pub spheres: SphereSpectra,
}

/// Serialized form of a [`Dataset`], a single JSON document:
///
/// ```json
/// {
///   "responses": { "ft_au0": { "values": [...], "edges": [...] }, ... },
///   "flux": { "reference_power_kw": 1e5, "particles": { "n": { "shape": [...], "data": [...] } } },
///   "foil": { "activities": [...] },
///   "spheres": { "0": { "counts": [...], "live_time": 600.0 }, ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    pub responses: BTreeMap<String, ResponseFunction>,
    pub flux: FluxTable,
    pub foil: TabulatedFoilData,
    pub spheres: BTreeMap<u8, RawSpectrum>,
}

impl Dataset {
    pub fn to_file(&self) -> DatasetFile {
        DatasetFile {
            responses: self.catalog.entries().clone(),
            flux: FluxTable::from(&self.flux),
            foil: self.foil.clone(),
            spheres: self.spheres.iter().map(|(size, s)| (size, s.clone())).collect(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer(std::io::BufWriter::new(file), &self.to_file())
            .context("writing dataset JSON")?;
        Ok(())
    }
}

impl TryFrom<DatasetFile> for Dataset {
    type Error = anyhow::Error;

    fn try_from(file: DatasetFile) -> Result<Self> {
        let flux = TabulatedFlux::try_from(file.flux).context("flux table")?;
        Ok(Dataset {
            catalog: file.responses.into_iter().collect(),
            flux,
            foil: file.foil,
            spheres: checked_spheres(file.spheres)?,
        })
    }
}

/// Load a bundled dataset JSON file.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let file: DatasetFile = read_json(path)?;
    let dataset = Dataset::try_from(file)
        .with_context(|| format!("invalid dataset {}", path.display()))?;
    log::info!(
        "Loaded dataset {}: {} responses, {} sphere spectra, {} foil activities",
        path.display(),
        dataset.catalog.len(),
        dataset.spheres.len(),
        dataset.foil.activities.len()
    );
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// DatasetPaths – where a batch finds its inputs
// ---------------------------------------------------------------------------

/// A bundled dataset, individual collaborator files, or a bundle with
/// some parts overridden. Relative paths resolve against `base`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetPaths {
    pub bundle: Option<PathBuf>,
    pub responses: Option<PathBuf>,
    pub flux: Option<PathBuf>,
    pub foil: Option<PathBuf>,
    pub spheres: Option<PathBuf>,
}

impl DatasetPaths {
    pub fn bundle(path: impl Into<PathBuf>) -> Self {
        Self {
            bundle: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn load(&self, base: &Path) -> Result<Dataset> {
        let resolve = |p: &PathBuf| base.join(p);
        let bundle = self
            .bundle
            .as_ref()
            .map(|p| load_dataset(&resolve(p)))
            .transpose()?;

        let (catalog, flux, foil, spheres) = match bundle {
            Some(d) => (Some(d.catalog), Some(d.flux), Some(d.foil), Some(d.spheres)),
            None => (None, None, None, None),
        };

        let catalog = match &self.responses {
            Some(p) => Some(load_catalog(&resolve(p))?),
            None => catalog,
        };
        let flux = match &self.flux {
            Some(p) => Some(load_flux(&resolve(p))?),
            None => flux,
        };
        let foil = match &self.foil {
            Some(p) => Some(load_foil(&resolve(p))?),
            None => foil,
        };
        let spheres = match &self.spheres {
            Some(p) => Some(load_sphere_spectra(&resolve(p))?),
            None => spheres,
        };

        Ok(Dataset {
            catalog: catalog.context("no response catalog given (bundle or responses)")?,
            flux: flux.context("no flux table given (bundle or flux)")?,
            foil: foil.context("no foil data given (bundle or foil)")?,
            spheres: spheres.context("no sphere spectra given (bundle or spheres)")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Per-collaborator loaders.  Dispatch by extension.
// ---------------------------------------------------------------------------

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Supported formats:
/// * `.json` – `{ "name": { "values": [...], "edges": [...] }, ... }`
/// * `.csv`  – columns `name`, `edges`, `values`, the last two holding
///   semicolon-separated floats
pub fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    let catalog = match extension(path).as_str() {
        "json" => {
            let entries: BTreeMap<String, ResponseFunction> = read_json(path)?;
            InMemoryCatalog::new(entries)
        }
        "csv" => load_catalog_csv(path)?,
        other => bail!("Unsupported response catalog extension: .{other}"),
    };
    log::info!("Loaded {} response functions from {}", catalog.len(), path.display());
    Ok(catalog)
}

/// Supported formats:
/// * `.json` – `{ "0": { "counts": [...], "live_time": 600.0 }, ... }`
/// * `.csv`  – columns `size`, `live_time`, `counts`, the last holding
///   semicolon-separated channel counts
pub fn load_sphere_spectra(path: &Path) -> Result<SphereSpectra> {
    let spheres = match extension(path).as_str() {
        "json" => {
            let raw: BTreeMap<u8, RawSpectrum> = read_json(path)?;
            checked_spheres(raw)?
        }
        "csv" => load_spheres_csv(path)?,
        other => bail!("Unsupported sphere spectra extension: .{other}"),
    };
    log::info!("Loaded {} sphere spectra from {}", spheres.len(), path.display());
    Ok(spheres)
}

/// `.json` flux table: `{ "reference_power_kw": ..., "particles": { ... } }`.
pub fn load_flux(path: &Path) -> Result<TabulatedFlux> {
    match extension(path).as_str() {
        "json" => {
            let table: FluxTable = read_json(path)?;
            let flux = TabulatedFlux::try_from(table)
                .with_context(|| format!("invalid flux table {}", path.display()))?;
            log::info!(
                "Loaded flux for {:?} at {} kW from {}",
                flux.particles().collect::<Vec<_>>(),
                flux.reference_power_kw(),
                path.display()
            );
            Ok(flux)
        }
        other => bail!("Unsupported flux table extension: .{other}"),
    }
}

/// Supported formats:
/// * `.json` – `{ "activities": [...] }`
/// * `.csv`  – one `activity` column, one row per foil channel
pub fn load_foil(path: &Path) -> Result<TabulatedFoilData> {
    match extension(path).as_str() {
        "json" => read_json(path),
        "csv" => load_foil_csv(path),
        other => bail!("Unsupported foil data extension: .{other}"),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading JSON file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing JSON {}", path.display()))
}

/// Re-check what deserialization alone does not.
fn checked_spheres(raw: BTreeMap<u8, RawSpectrum>) -> Result<SphereSpectra> {
    let mut spheres = SphereSpectra::default();
    for (size, s) in raw {
        let spectrum = RawSpectrum::new(s.counts, s.live_time)
            .with_context(|| format!("sphere {size}"))?;
        spheres.insert(size, spectrum);
    }
    Ok(spheres)
}

// ---------------------------------------------------------------------------
// CSV loaders
// ---------------------------------------------------------------------------

fn column(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .with_context(|| format!("CSV missing '{name}' column"))
}

fn load_catalog_csv(path: &Path) -> Result<InMemoryCatalog> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let name_idx = column(&headers, "name")?;
    let edges_idx = column(&headers, "edges")?;
    let values_idx = column(&headers, "values")?;

    let mut catalog = InMemoryCatalog::default();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let name = record.get(name_idx).unwrap_or("").trim();
        if name.is_empty() {
            bail!("CSV row {row_no}: empty response name");
        }
        let edges = parse_semicolon_list(record.get(edges_idx).unwrap_or(""), row_no, "edges")?;
        let values = parse_semicolon_list(record.get(values_idx).unwrap_or(""), row_no, "values")?;
        if edges.len() != values.len() + 1 {
            bail!(
                "CSV row {row_no}: {} values need {} edges, got {}",
                values.len(),
                values.len() + 1,
                edges.len()
            );
        }
        catalog.insert(name, ResponseFunction::new(values, edges));
    }
    Ok(catalog)
}

fn load_spheres_csv(path: &Path) -> Result<SphereSpectra> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let size_idx = column(&headers, "size")?;
    let live_idx = column(&headers, "live_time")?;
    let counts_idx = column(&headers, "counts")?;

    let mut spheres = SphereSpectra::default();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let size: u8 = parse_field(record.get(size_idx), row_no, "size")?;
        let live_time: f64 = parse_field(record.get(live_idx), row_no, "live_time")?;
        let counts = parse_semicolon_list(record.get(counts_idx).unwrap_or(""), row_no, "counts")?;
        let spectrum = RawSpectrum::new(counts, live_time)
            .with_context(|| format!("CSV row {row_no}: sphere {size}"))?;
        spheres.insert(size, spectrum);
    }
    Ok(spheres)
}

fn load_foil_csv(path: &Path) -> Result<TabulatedFoilData> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let idx = column(&headers, "activity")?;

    let mut activities = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        activities.push(parse_field(record.get(idx), row_no, "activity")?);
    }
    Ok(TabulatedFoilData { activities })
}

fn parse_field<T>(s: Option<&str>, row: usize, col: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let tok = s.unwrap_or("").trim();
    tok.parse::<T>()
        .with_context(|| format!("Row {row}, {col}: '{tok}' is not a number"))
}

fn parse_semicolon_list<T>(s: &str, row: usize, col: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<T>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::catalog::ResponseCatalog;
    use crate::testing;
    use std::io::Write;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn catalog_csv_with_semicolon_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "responses.csv",
            "name,edges,values\nft_au0,0.1;1;10,2.5;3.5\nbs0-1,0.1;1;10,0.0;1e-2\n",
        );
        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        let r = catalog.lookup("bs0-1").unwrap();
        assert_eq!(r.edges, vec![0.1, 1.0, 10.0]);
        assert_eq!(r.values, vec![0.0, 0.01]);
    }

    #[test]
    fn catalog_csv_reports_bad_numbers_with_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "responses.csv", "name,edges,values\nft_au0,0;1;2,1;x\n");
        let msg = format!("{:#}", load_catalog(&path).unwrap_err());
        assert!(msg.contains("Row 0, values[1]"), "{msg}");
    }

    #[test]
    fn catalog_csv_requires_one_more_edge_than_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "responses.csv", "name,edges,values\nft_au0,0;1,1;2\n");
        assert!(load_catalog(&path).is_err());
    }

    #[test]
    fn sphere_csv_rows_become_spectra() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "spheres.csv",
            "size,live_time,counts\n2,600,1;2;3;4\n12,300.5,0;0;7\n",
        );
        let spheres = load_sphere_spectra(&path).unwrap();
        assert_eq!(spheres.len(), 2);
        assert_eq!(spheres.get(2).unwrap().counts, vec![1, 2, 3, 4]);
        assert_eq!(spheres.get(12).unwrap().live_time, 300.5);
    }

    #[test]
    fn sphere_json_rejects_zero_live_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "spheres.json",
            r#"{ "3": { "counts": [1, 2], "live_time": 0.0 } }"#,
        );
        let msg = format!("{:#}", load_sphere_spectra(&path).unwrap_err());
        assert!(msg.contains("sphere 3"), "{msg}");
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "flux.txt", "");
        let msg = load_flux(&path).unwrap_err().to_string();
        assert!(msg.contains(".txt"));
    }

    #[test]
    fn bundle_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = Dataset {
            catalog: testing::catalog(),
            flux: testing::flux(),
            foil: testing::foil_data(),
            spheres: testing::sphere_spectra(),
        };
        let path = dir.path().join("dataset.json");
        dataset.save(&path).unwrap();

        let loaded = load_dataset(&path).unwrap();
        assert_eq!(loaded.catalog, dataset.catalog);
        assert_eq!(loaded.flux, dataset.flux);
        assert_eq!(loaded.foil, dataset.foil);
        assert_eq!(loaded.spheres, dataset.spheres);
    }

    #[test]
    fn individual_files_override_the_bundle() {
        let dir = tempfile::tempdir().unwrap();
        Dataset {
            catalog: testing::catalog(),
            flux: testing::flux(),
            foil: testing::foil_data(),
            spheres: testing::sphere_spectra(),
        }
        .save(&dir.path().join("dataset.json"))
        .unwrap();
        write(dir.path(), "foil.csv", "activity\n1\n2\n3\n");

        let paths = DatasetPaths {
            foil: Some("foil.csv".into()),
            ..DatasetPaths::bundle("dataset.json")
        };
        let loaded = paths.load(dir.path()).unwrap();
        assert_eq!(loaded.foil.activities, vec![1.0, 2.0, 3.0]);
        assert_eq!(loaded.spheres.len(), 7);
    }

    #[test]
    fn missing_parts_are_named() {
        let dir = tempfile::tempdir().unwrap();
        let msg = DatasetPaths::default().load(dir.path()).unwrap_err().to_string();
        assert!(msg.contains("response catalog"));
    }
}
