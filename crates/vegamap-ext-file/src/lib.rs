//! # Vegamap File Extension
//!
//! File exporters and loaders for the Vegamap sensitivity engine.
//!
//! ## Exporters
//!
//! - [`VegaMapExporter`]: Tables and heatmaps per instrument, one archive for a basket
//! - [`write_table`]/[`read_table`]: Delimited vega map tables
//! - [`render`]/[`png_bytes`]: Diverging-scale heatmaps with average-life and barrier markers
//!
//! ## Loaders
//!
//! - [`load_strike_list`]: Absolute strikes for the grid partitioner
//! - [`load_surface`]/[`load_surfaces_into`]: Cached surfaces for the summary index
//!
//! ## Example
//!
//! ```ignore
//! use vegamap_ext_file::VegaMapExporter;
//!
//! let exporter = VegaMapExporter::from_config(&config);
//! let artifact = exporter.export(report.runs())?;
//! ```

#![warn(missing_docs)]

mod bundle;
mod error;
mod heatmap;
mod loaders;
mod tabular;

pub use bundle::*;
pub use error::*;
pub use heatmap::*;
pub use loaders::*;
pub use tabular::*;
