//! Ingestion-and-visualization core for packaged single-cell expression
//! datasets: a ZIP upload goes in, a colored 2-D (UMAP) scatter PNG comes
//! out. The UI shell that drives this pipeline lives elsewhere; this crate
//! is the data flow and its failure surface.

pub mod archive;
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod palette;
pub mod render_scatter;
pub mod session;
pub mod workspace;
