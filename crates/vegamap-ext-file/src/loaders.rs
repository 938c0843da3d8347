//! Loaders for strike lists and cached surfaces.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, warn};

use vegamap_engine::{CacheEntry, ResultStore, StrikeSource, TenorAxis};

use crate::error::{ExportError, ExportResult};
use crate::tabular::{self, parse_months, STRIKE_HEADER};

const DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// STRIKE LISTS
// =============================================================================

/// Read absolute strikes from a delimited file.
///
/// The values come from the column headed `strike` when there is one,
/// otherwise from the first column. Blank cells are skipped.
pub fn read_strike_list<R: Read>(reader: R, name: &str) -> ExportResult<Vec<f64>> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut column = 0;
    let mut strikes = Vec::new();
    for (line, record) in csv.records().enumerate() {
        let record = record?;
        if line == 0 {
            if let Some(i) = record.iter().position(|c| c.eq_ignore_ascii_case(STRIKE_HEADER)) {
                column = i;
                continue;
            }
        }
        let Some(cell) = record.get(column).filter(|c| !c.is_empty()) else {
            continue;
        };
        let strike = cell
            .parse::<f64>()
            .map_err(|_| ExportError::parse(name, format!("line {}: '{cell}' is not a strike", line + 1)))?;
        strikes.push(strike);
    }

    if strikes.is_empty() {
        return Err(ExportError::parse(name, "no strikes"));
    }
    Ok(strikes)
}

/// Load a strike list file as a grid source.
pub fn load_strike_list(path: impl AsRef<Path>) -> ExportResult<StrikeSource> {
    let path = path.as_ref();
    let strikes = read_strike_list(File::open(path)?, &path.display().to_string())?;
    debug!(path = %path.display(), count = strikes.len(), "loaded strike list");
    Ok(StrikeSource::Listed(strikes))
}

// =============================================================================
// SURFACES
// =============================================================================

/// Read a cached surface.
///
/// A file headed `strike` is a vega map table (strike rows) and is
/// transposed. Any other layout has one tenor per row, keyed by a month
/// label (`6m`, `6`) or a `YYYY-MM-DD` date, and strike ratios across the
/// header.
///
/// A leading `# instrument: <id>` line names the surface; `ticker` is used
/// when there is none.
pub fn read_surface<R: Read>(mut reader: R, ticker: &str, name: &str) -> ExportResult<CacheEntry> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let (instrument, body) = tabular::split_instrument_line(&bytes);
    let ticker = instrument.as_deref().unwrap_or(ticker);

    let mut csv = csv::Reader::from_reader(body);
    let header = csv.headers()?.clone();
    if header.get(0).map(str::trim) == Some(STRIKE_HEADER) {
        return tabular::read_table(body, name)?.into_cache_entry(ticker);
    }

    let strikes = header
        .iter()
        .skip(1)
        .map(|cell| {
            cell.trim()
                .parse::<f64>()
                .map_err(|_| ExportError::parse(name, format!("strike header '{cell}'")))
        })
        .collect::<ExportResult<Vec<f64>>>()?;

    let mut keys = Vec::new();
    let mut values = Vec::new();
    for (line, record) in csv.records().enumerate() {
        let record = record?;
        keys.push(record.get(0).unwrap_or_default().trim().to_string());
        let row = record
            .iter()
            .skip(1)
            .map(|cell| {
                cell.trim()
                    .parse::<f64>()
                    .map_err(|_| ExportError::parse(name, format!("row {line}: '{cell}' is not a number")))
            })
            .collect::<ExportResult<Vec<f64>>>()?;
        values.push(row);
    }

    let tenor_axis = tenor_axis(&keys, name)?;
    Ok(CacheEntry::new(ticker, values, strikes, tenor_axis)?)
}

fn tenor_axis(keys: &[String], name: &str) -> ExportResult<TenorAxis> {
    let Some(first) = keys.first() else {
        return Err(ExportError::parse(name, "no tenor rows"));
    };
    if NaiveDate::parse_from_str(first, DATE_FORMAT).is_ok() {
        keys.iter()
            .map(|k| {
                NaiveDate::parse_from_str(k, DATE_FORMAT)
                    .map_err(|_| ExportError::parse(name, format!("'{k}' is not a date")))
            })
            .collect::<ExportResult<Vec<_>>>()
            .map(TenorAxis::Dates)
    } else {
        keys.iter()
            .map(|k| parse_months(k).ok_or_else(|| ExportError::parse(name, format!("'{k}' is not a tenor"))))
            .collect::<ExportResult<Vec<_>>>()
            .map(TenorAxis::Months)
    }
}

/// Ticker implied by a surface file name.
///
/// `TTD_US_Equity_vega_map.csv` gives `TTD_US_Equity`. This is the
/// file-safe form, so it only names surfaces without an instrument line.
pub fn ticker_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(stem.strip_suffix("_vega_map").unwrap_or(stem).to_string())
}

/// Load one surface file, naming it after its instrument line or the file.
pub fn load_surface(path: impl AsRef<Path>) -> ExportResult<CacheEntry> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let ticker = ticker_from_path(path).ok_or_else(|| ExportError::parse(&name, "no file stem"))?;
    read_surface(File::open(path)?, &ticker, &name)
}

/// Load every `.csv` surface of a directory into `store`.
///
/// Files that do not parse are logged and skipped. Returns the number of
/// surfaces loaded.
pub fn load_surfaces_into(dir: impl AsRef<Path>, store: &ResultStore) -> ExportResult<usize> {
    let mut paths: Vec<_> = fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    paths.sort();

    let mut loaded = 0;
    for path in paths {
        match load_surface(&path) {
            Ok(entry) => {
                debug!(ticker = entry.ticker(), path = %path.display(), "loaded surface");
                store.insert_surface(entry);
                loaded += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping surface"),
        }
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strike_list_with_header() {
        let text = "ticker,strike\nNDX,20000\nNDX,22726.01\nNDX,\n";
        assert_eq!(read_strike_list(text.as_bytes(), "s.csv").unwrap(), vec![20000.0, 22726.01]);
    }

    #[test]
    fn test_strike_list_without_header() {
        assert_eq!(read_strike_list("90\n100\n110\n".as_bytes(), "s.csv").unwrap(), vec![90.0, 100.0, 110.0]);
        assert!(read_strike_list("strike\n".as_bytes(), "s.csv").is_err());
        assert!(read_strike_list("strike\nabc\n".as_bytes(), "s.csv").is_err());
    }

    #[test]
    fn test_dated_surface() {
        let text = "date,0.9,1.0\n2025-07-07,1.5,-2\n2026-01-07,0.5,NaN\n";
        let entry = read_surface(text.as_bytes(), "TTD", "t.csv").unwrap();
        assert_eq!(entry.ticker(), "TTD");
        assert_eq!(entry.strike_axis(), &[0.9, 1.0]);
        assert_eq!(
            entry.tenor_axis(),
            &TenorAxis::Dates(vec![
                NaiveDate::from_ymd_opt(2025, 7, 7).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 7).unwrap(),
            ])
        );
        assert_eq!(entry.value(0, 1), Some(-2.0));
        assert!(entry.value(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_month_surface() {
        let text = "tenor,0.9,1.0\n6m,1,2\n12,3,4\n";
        let entry = read_surface(text.as_bytes(), "A", "a.csv").unwrap();
        assert_eq!(entry.tenor_axis(), &TenorAxis::Months(vec![6.0, 12.0]));
    }

    #[test]
    fn test_vega_map_table_is_transposed() {
        let text = "strike,6m,12m\n0.9,1,2\n1.1,3,4\n";
        let entry = read_surface(text.as_bytes(), "A", "a.csv").unwrap();
        assert_eq!(entry.strike_axis(), &[0.9, 1.1]);
        assert_eq!(entry.value(1, 0), Some(2.0));
        assert_eq!(entry.value(0, 1), Some(3.0));
    }

    #[test]
    fn test_mixed_tenor_keys_rejected() {
        let text = "date,1.0\n2025-07-07,1\n6m,2\n";
        assert!(read_surface(text.as_bytes(), "A", "a.csv").is_err());
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("TTD_US_Equity_vega_map.csv"), "strike,6m\n1,2\n").unwrap();
        fs::write(dir.path().join("broken.csv"), "date,x\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = ResultStore::new();
        assert_eq!(load_surfaces_into(dir.path(), &store).unwrap(), 1);
        assert!(store.surface("TTD_US_Equity").is_some());
    }

    #[test]
    fn test_instrument_line_names_surface() {
        let text = "# instrument: TTD US Equity\ntenor,0.9,1.0\n6m,1,2\n";
        let entry = read_surface(text.as_bytes(), "TTD_US_Equity", "t.csv").unwrap();
        assert_eq!(entry.ticker(), "TTD US Equity");
        assert_eq!(entry.value(0, 1), Some(2.0));
    }

    #[test]
    fn test_reloaded_surface_is_shadowed_by_run() {
        use vegamap_engine::{AxisKind, ComputationRun, GridAxes, GridAxis, SensitivityMatrix};
        use vegamap_traits::InstrumentId;

        let axes = GridAxes::new(
            GridAxis::from_centers(AxisKind::Strike, vec![0.9, 1.1]).unwrap(),
            GridAxis::from_centers(AxisKind::Tenor, vec![6.0]).unwrap(),
            100.0,
        )
        .unwrap();
        let run = |value: f64| {
            ComputationRun::new(
                InstrumentId::new("TTD US Equity"),
                SensitivityMatrix::from_rows(vec![vec![value], vec![value]]).unwrap(),
                axes.clone(),
                100.0,
                None,
                0.5,
            )
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(tabular::vega_map_file_name(&InstrumentId::new("TTD US Equity"), "csv"));
        fs::write(&path, tabular::table_bytes(&run(1.0)).unwrap()).unwrap();

        let store = ResultStore::new();
        assert_eq!(load_surfaces_into(dir.path(), &store).unwrap(), 1);
        assert!(store.surface("TTD US Equity").is_some());
        assert!(store.surface("TTD_US_Equity").is_none());

        store.insert(run(7.0));
        let entries = store.cache_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ticker(), "TTD US Equity");
        assert_eq!(entries[0].value(0, 0), Some(7.0));
    }
}
