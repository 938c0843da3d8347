//! Export of finished runs to the output directory.
//!
//! A single run is written as plain files. Several runs are bundled into
//! one `vega_maps_{timestamp}.zip` holding the same files per instrument.
//! Instruments whose file-safe ids coincide, like `TTD US` and `TTD_US`,
//! get `_2`, `_3` suffixes in submission order.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use vegamap_engine::ComputationRun;
use vegamap_traits::config::EngineConfig;

use crate::error::{ExportError, ExportResult};
use crate::heatmap::{self, HeatmapStyle};
use crate::tabular::{self, stem_file_name};

/// Which artifacts are produced per instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    /// Write the delimited table.
    pub tables: bool,
    /// Write the heatmap image.
    pub images: bool,
    /// Heatmap layout.
    pub style: HeatmapStyle,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            tables: true,
            images: true,
            style: HeatmapStyle::default(),
        }
    }
}

/// What an export produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportArtifact {
    /// Files of a single-instrument export.
    Files(Vec<PathBuf>),
    /// Archive of a multi-instrument export.
    Archive(PathBuf),
}

impl ExportArtifact {
    /// Every path written.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            ExportArtifact::Files(files) => files.iter().map(PathBuf::as_path).collect(),
            ExportArtifact::Archive(path) => vec![path.as_path()],
        }
    }
}

/// Writes vega map tables and heatmaps.
#[derive(Debug, Clone)]
pub struct VegaMapExporter {
    output_dir: PathBuf,
    options: ExportOptions,
}

impl VegaMapExporter {
    /// Exporter writing into `output_dir`.
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            options: ExportOptions::default(),
        }
    }

    /// Exporter writing into the configured output directory.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.output_dir)
    }

    /// Replace the export options.
    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// Output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Export runs, naming an archive after the current time.
    pub fn export<'a>(
        &self,
        runs: impl IntoIterator<Item = &'a ComputationRun>,
    ) -> ExportResult<ExportArtifact> {
        self.export_at(runs, Utc::now())
    }

    /// Export runs, naming an archive after `timestamp`.
    pub fn export_at<'a>(
        &self,
        runs: impl IntoIterator<Item = &'a ComputationRun>,
        timestamp: DateTime<Utc>,
    ) -> ExportResult<ExportArtifact> {
        let runs: Vec<&ComputationRun> = runs.into_iter().collect();
        let stems = unique_stems(&runs);
        fs::create_dir_all(&self.output_dir)?;

        match runs.as_slice() {
            [] => Err(ExportError::Empty),
            [run] => {
                let mut files = Vec::new();
                for (name, bytes) in self.artifacts(run, &stems[0])? {
                    let path = self.output_dir.join(name);
                    fs::write(&path, bytes)?;
                    debug!(path = %path.display(), "wrote export file");
                    files.push(path);
                }
                info!(instrument_id = %run.instrument_id(), files = files.len(), "exported vega map");
                Ok(ExportArtifact::Files(files))
            }
            many => {
                let path = self
                    .output_dir
                    .join(format!("vega_maps_{}.zip", timestamp.format("%Y%m%d_%H%M%S")));
                self.write_archive(&path, many, &stems)?;
                info!(path = %path.display(), instruments = many.len(), "exported vega map archive");
                Ok(ExportArtifact::Archive(path))
            }
        }
    }

    fn artifacts(&self, run: &ComputationRun, stem: &str) -> ExportResult<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        if self.options.tables {
            out.push((stem_file_name(stem, "csv"), tabular::table_bytes(run)?));
        }
        if self.options.images {
            out.push((
                stem_file_name(stem, "png"),
                heatmap::png_bytes(run, &self.options.style)?,
            ));
        }
        Ok(out)
    }

    fn write_archive(&self, path: &Path, runs: &[&ComputationRun], stems: &[String]) -> ExportResult<()> {
        let mut zip = ZipWriter::new(File::create(path)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (run, stem) in runs.iter().zip(stems) {
            for (name, bytes) in self.artifacts(run, stem)? {
                zip.start_file(name, options)?;
                zip.write_all(&bytes)?;
            }
        }
        zip.finish()?;
        Ok(())
    }
}

/// File stem per run, unique across the export.
fn unique_stems(runs: &[&ComputationRun]) -> Vec<String> {
    let mut taken = HashSet::new();
    runs.iter()
        .map(|run| {
            let base = run.instrument_id().file_stem();
            let mut stem = base.clone();
            let mut n = 2;
            while !taken.insert(stem.clone()) {
                stem = format!("{base}_{n}");
                n += 1;
            }
            if stem != base {
                warn!(instrument_id = %run.instrument_id(), stem = %stem, "file name already taken, renamed");
            }
            stem
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use vegamap_engine::{AxisKind, GridAxes, GridAxis, SensitivityMatrix};
    use vegamap_traits::InstrumentId;

    fn run(id: &str) -> ComputationRun {
        let axes = GridAxes::new(
            GridAxis::from_centers(AxisKind::Strike, vec![0.9, 1.1]).unwrap(),
            GridAxis::from_centers(AxisKind::Tenor, vec![6.0, 12.0]).unwrap(),
            100.0,
        )
        .unwrap();
        ComputationRun::new(
            InstrumentId::new(id),
            SensitivityMatrix::from_rows(vec![vec![1.0, -2.0], vec![3.0, f64::NAN]]).unwrap(),
            axes,
            100.0,
            Some(0.5),
            0.7,
        )
    }

    fn timestamp() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-07-07T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_single_run_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = VegaMapExporter::new(dir.path().join("out"));
        let single = run("TTD US Equity");

        let artifact = exporter.export_at([&single], timestamp()).unwrap();
        let ExportArtifact::Files(files) = artifact else {
            panic!("expected plain files");
        };
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["TTD_US_Equity_vega_map.csv", "TTD_US_Equity_vega_map.png"]);

        let csv = fs::read_to_string(&files[0]).unwrap();
        assert!(csv.starts_with("# instrument: TTD US Equity\nstrike,6m,12m"));
        assert!(csv.contains("1.1,3,NaN"));
    }

    #[test]
    fn test_many_runs_are_archived() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = VegaMapExporter::new(dir.path());
        let runs = [run("A"), run("B")];

        let artifact = exporter.export_at(runs.iter(), timestamp()).unwrap();
        let expected = dir.path().join("vega_maps_20250707_093000.zip");
        assert_eq!(artifact, ExportArtifact::Archive(expected.clone()));

        let mut archive = zip::ZipArchive::new(File::open(&expected).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            ["A_vega_map.csv", "A_vega_map.png", "B_vega_map.csv", "B_vega_map.png"]
        );

        let mut text = String::new();
        archive
            .by_name("B_vega_map.csv")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.starts_with("# instrument: B\nstrike,6m,12m"));
        // Only the archive lands in the directory.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_colliding_ids_get_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = VegaMapExporter::new(dir.path()).with_options(ExportOptions {
            images: false,
            ..Default::default()
        });
        let runs = [run("TTD US"), run("TTD_US"), run("TTD US"), run("TTD_US_2")];

        let artifact = exporter.export_at(runs.iter(), timestamp()).unwrap();
        let ExportArtifact::Archive(path) = artifact else {
            panic!("expected an archive");
        };
        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            [
                "TTD_US_2_2_vega_map.csv",
                "TTD_US_2_vega_map.csv",
                "TTD_US_3_vega_map.csv",
                "TTD_US_vega_map.csv",
            ]
        );

        let mut text = String::new();
        archive
            .by_name("TTD_US_2_vega_map.csv")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.starts_with("# instrument: TTD_US\n"));
    }

    #[test]
    fn test_tables_only() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = VegaMapExporter::new(dir.path()).with_options(ExportOptions {
            images: false,
            ..Default::default()
        });
        let single = run("A");
        let artifact = exporter.export_at([&single], timestamp()).unwrap();
        assert_eq!(artifact.paths().len(), 1);
    }

    #[test]
    fn test_nothing_to_export() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = VegaMapExporter::new(dir.path());
        let none: Vec<ComputationRun> = Vec::new();
        assert!(matches!(exporter.export_at(&none, timestamp()), Err(ExportError::Empty)));
    }
}
