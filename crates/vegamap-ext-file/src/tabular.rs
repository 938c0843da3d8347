//! Delimited vega map tables.
//!
//! One row per strike bucket keyed by its center, one column per tenor
//! bucket headed by its label (`6m`). Failed cells are written as `NaN`.
//!
//! The first line, `# instrument: <id>`, keeps the raw instrument id, since
//! file names only carry its file-safe form.

use std::io::{Read, Write};

use vegamap_engine::{CacheEntry, ComputationRun, SensitivityMatrix, TenorAxis};
use vegamap_traits::InstrumentId;

use crate::error::{ExportError, ExportResult};

/// Header of the strike key column.
pub const STRIKE_HEADER: &str = "strike";

const INSTRUMENT_PREFIX: &str = "# instrument: ";

/// File name of an instrument's artifact, e.g. `NDX_note_vega_map.csv`.
pub fn vega_map_file_name(instrument_id: &InstrumentId, extension: &str) -> String {
    stem_file_name(&instrument_id.file_stem(), extension)
}

/// File name of an artifact for an already file-safe stem.
pub fn stem_file_name(stem: &str, extension: &str) -> String {
    format!("{stem}_vega_map.{extension}")
}

/// Split a leading `# instrument: <id>` line off table content.
pub(crate) fn split_instrument_line(bytes: &[u8]) -> (Option<String>, &[u8]) {
    let Some(rest) = bytes.strip_prefix(INSTRUMENT_PREFIX.as_bytes()) else {
        return (None, bytes);
    };
    let end = rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
    let id = String::from_utf8_lossy(&rest[..end]).trim().to_string();
    let body = rest.get(end + 1..).unwrap_or_default();
    (Some(id).filter(|id| !id.is_empty()), body)
}

/// Write the table of a run.
pub fn write_table<W: Write>(run: &ComputationRun, mut writer: W) -> ExportResult<()> {
    writeln!(writer, "{INSTRUMENT_PREFIX}{}", run.instrument_id())?;
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec![STRIKE_HEADER.to_string()];
    header.extend(run.axes().tenor().labels());
    csv.write_record(&header)?;

    let matrix = run.matrix();
    for (row, strike) in run.axes().strike().centers().iter().enumerate() {
        let mut record = vec![strike.to_string()];
        if let Some(values) = matrix.row(row) {
            record.extend(values.iter().map(|v| v.to_string()));
        }
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

/// Table of a run as bytes.
pub fn table_bytes(run: &ComputationRun) -> ExportResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_table(run, &mut buf)?;
    Ok(buf)
}

/// A vega map table read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct VegaTable {
    instrument_id: Option<InstrumentId>,
    strikes: Vec<f64>,
    tenor_labels: Vec<String>,
    matrix: SensitivityMatrix,
}

impl VegaTable {
    /// Instrument named by the file, if any.
    pub fn instrument_id(&self) -> Option<&InstrumentId> {
        self.instrument_id.as_ref()
    }

    /// Strike centers, one per row.
    pub fn strikes(&self) -> &[f64] {
        &self.strikes
    }

    /// Tenor labels, one per column.
    pub fn tenor_labels(&self) -> &[String] {
        &self.tenor_labels
    }

    /// Values, strike rows by tenor columns.
    pub fn matrix(&self) -> &SensitivityMatrix {
        &self.matrix
    }

    /// Tenor centers in months.
    pub fn tenor_months(&self) -> ExportResult<Vec<f64>> {
        self.tenor_labels
            .iter()
            .map(|label| {
                parse_months(label)
                    .ok_or_else(|| ExportError::parse("header", format!("tenor label '{label}'")))
            })
            .collect()
    }

    /// Surface for the summary index.
    pub fn into_cache_entry(self, ticker: impl Into<String>) -> ExportResult<CacheEntry> {
        let months = self.tenor_months()?;
        Ok(CacheEntry::new(
            ticker,
            self.matrix.transposed(),
            self.strikes,
            TenorAxis::Months(months),
        )?)
    }
}

/// Read a table written by [`write_table`]; `name` is used in errors.
///
/// The instrument line is optional.
pub fn read_table<R: Read>(mut reader: R, name: &str) -> ExportResult<VegaTable> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let (instrument_id, body) = split_instrument_line(&bytes);

    let mut csv = csv::Reader::from_reader(body);
    let header = csv.headers()?.clone();
    if header.get(0) != Some(STRIKE_HEADER) {
        return Err(ExportError::parse(name, "first column must be 'strike'"));
    }
    let tenor_labels: Vec<String> = header.iter().skip(1).map(str::to_string).collect();

    let mut strikes = Vec::new();
    let mut values = Vec::new();
    for (line, record) in csv.records().enumerate() {
        let record = record?;
        let strike = parse_cell(record.get(0), name, line)?;
        if record.len() != tenor_labels.len() + 1 {
            return Err(ExportError::parse(
                name,
                format!("row {line} has {} values for {} tenors", record.len().saturating_sub(1), tenor_labels.len()),
            ));
        }
        strikes.push(strike);
        for field in record.iter().skip(1) {
            values.push(parse_cell(Some(field), name, line)?);
        }
    }

    let matrix = SensitivityMatrix::from_row_major(strikes.len(), tenor_labels.len(), values)?;
    Ok(VegaTable {
        instrument_id: instrument_id.map(InstrumentId::new),
        strikes,
        tenor_labels,
        matrix,
    })
}

fn parse_cell(field: Option<&str>, name: &str, line: usize) -> ExportResult<f64> {
    let field = field.unwrap_or_default().trim();
    field
        .parse::<f64>()
        .map_err(|_| ExportError::parse(name, format!("row {line}: '{field}' is not a number")))
}

/// Month offset of a tenor label: `6m`, `6M` or a bare `6`.
pub(crate) fn parse_months(label: &str) -> Option<f64> {
    let label = label.trim();
    let digits = label
        .strip_suffix('m')
        .or_else(|| label.strip_suffix('M'))
        .unwrap_or(label);
    digits.parse::<f64>().ok().filter(|m| m.is_finite())
}
