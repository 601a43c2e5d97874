use crate::error::ViewerError;
use log::info;
use ndarray::Array2;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// One named per-cell metadata column.
///
/// A column whose JSON values are all numbers loads as `Numeric`; anything
/// else loads as `Categorical` with the string form of each value (JSON
/// null becomes the category `"NA"`, mirroring pandas' missing marker).
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataColumn {
    Categorical(Vec<String>),
    Numeric(Vec<f64>),
}

impl MetadataColumn {
    pub fn len(&self) -> usize {
        match self {
            MetadataColumn::Categorical(values) => values.len(),
            MetadataColumn::Numeric(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory cell × feature dataset: expression matrix, ordered per-cell
/// metadata columns, and an optional 2-D embedding.
///
/// All three index the same ordered set of cells. The matrix is read-only
/// after load; only the embedding engine adds to the model (the embedding,
/// once, in place).
#[derive(Clone, Debug)]
pub struct Dataset {
    matrix: Array2<f64>,
    cell_metadata: Vec<(String, MetadataColumn)>,
    embedding_2d: Option<Vec<[f64; 2]>>,
}

/// On-disk `.adata` document: a JSON mirror of the AnnData schema.
/// `X` is the cell × feature matrix, `obs` the ordered metadata columns,
/// `obsm.X_umap` the optional precomputed embedding.
#[derive(Deserialize)]
struct AdataDocument {
    #[serde(rename = "X")]
    x: Vec<Vec<f64>>,
    #[serde(default)]
    obs: Vec<AdataColumn>,
    #[serde(default)]
    obsm: AdataObsm,
}

#[derive(Deserialize)]
struct AdataColumn {
    name: String,
    values: Vec<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct AdataObsm {
    #[serde(rename = "X_umap")]
    x_umap: Option<Vec<[f64; 2]>>,
}

impl Dataset {
    /// Reads a `.adata` dataset file. Pure read, callable repeatedly on the
    /// same path. Zero cells or zero metadata columns is a valid
    /// (degenerate) dataset, not an error.
    pub fn from_adata_file(path: &Path) -> Result<Self, ViewerError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ViewerError::DatasetFormat(format!("cannot read {}: {e}", path.display())))?;
        let doc: AdataDocument = serde_json::from_str(&text)
            .map_err(|e| ViewerError::DatasetFormat(format!("not a valid .adata document: {e}")))?;

        let n_cells = doc.x.len();
        let n_features = doc.x.first().map(|row| row.len()).unwrap_or(0);
        let mut flat = Vec::with_capacity(n_cells * n_features);
        for (i, row) in doc.x.iter().enumerate() {
            if row.len() != n_features {
                return Err(ViewerError::DatasetFormat(format!(
                    "matrix row {i} has {} values, expected {n_features}",
                    row.len()
                )));
            }
            flat.extend_from_slice(row);
        }
        let matrix = Array2::from_shape_vec((n_cells, n_features), flat)
            .map_err(|e| ViewerError::DatasetFormat(format!("bad matrix shape: {e}")))?;

        let mut cell_metadata = Vec::with_capacity(doc.obs.len());
        for column in doc.obs {
            let parsed = parse_column(&column, n_cells)?;
            cell_metadata.push((column.name, parsed));
        }

        if let Some(coords) = &doc.obsm.x_umap {
            if coords.len() != n_cells {
                return Err(ViewerError::DatasetFormat(format!(
                    "embedding has {} rows, expected {n_cells}",
                    coords.len()
                )));
            }
        }

        let dataset = Self {
            matrix,
            cell_metadata,
            embedding_2d: doc.obsm.x_umap,
        };
        info!(
            "Loaded dataset from {}: {} cells x {} features, {} metadata fields, embedding {}",
            path.display(),
            dataset.n_cells(),
            dataset.n_features(),
            dataset.cell_metadata.len(),
            if dataset.embedding_2d.is_some() {
                "present"
            } else {
                "absent"
            }
        );
        Ok(dataset)
    }

    /// Assembles a dataset from already-built parts, enforcing the shared
    /// cell-order invariant.
    pub fn from_parts(
        matrix: Array2<f64>,
        cell_metadata: Vec<(String, MetadataColumn)>,
        embedding_2d: Option<Vec<[f64; 2]>>,
    ) -> Result<Self, ViewerError> {
        let n_cells = matrix.nrows();
        for (name, column) in &cell_metadata {
            if column.len() != n_cells {
                return Err(ViewerError::DatasetFormat(format!(
                    "metadata column '{name}' has {} values, expected {n_cells}",
                    column.len()
                )));
            }
        }
        if let Some(coords) = &embedding_2d {
            if coords.len() != n_cells {
                return Err(ViewerError::DatasetFormat(format!(
                    "embedding has {} rows, expected {n_cells}",
                    coords.len()
                )));
            }
        }
        Ok(Self {
            matrix,
            cell_metadata,
            embedding_2d,
        })
    }

    #[inline(always)]
    pub fn n_cells(&self) -> usize {
        self.matrix.nrows()
    }

    #[inline(always)]
    pub fn n_features(&self) -> usize {
        self.matrix.ncols()
    }

    #[inline(always)]
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Metadata field names in insertion order; this order defines the
    /// color-field list offered to the user.
    pub fn metadata_fields(&self) -> Vec<String> {
        self.cell_metadata
            .iter()
            .map(|(name, _)| name.to_owned())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&MetadataColumn> {
        self.cell_metadata
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, column)| column)
    }

    #[inline(always)]
    pub fn embedding(&self) -> Option<&[[f64; 2]]> {
        self.embedding_2d.as_deref()
    }

    pub(crate) fn set_embedding(&mut self, coords: Vec<[f64; 2]>) {
        debug_assert_eq!(coords.len(), self.n_cells());
        self.embedding_2d = Some(coords);
    }
}

fn parse_column(column: &AdataColumn, n_cells: usize) -> Result<MetadataColumn, ViewerError> {
    if column.values.len() != n_cells {
        return Err(ViewerError::DatasetFormat(format!(
            "metadata column '{}' has {} values, expected {n_cells}",
            column.name,
            column.values.len()
        )));
    }
    let all_numeric = column.values.iter().all(|v| v.is_number());
    if all_numeric {
        let values = column
            .values
            .iter()
            .map(|v| v.as_f64().unwrap_or(f64::NAN))
            .collect::<Vec<_>>();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ViewerError::DatasetFormat(format!(
                "metadata column '{}' contains non-finite values",
                column.name
            )));
        }
        return Ok(MetadataColumn::Numeric(values));
    }
    let mut values = Vec::with_capacity(column.values.len());
    for value in &column.values {
        let text = match value {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Null => "NA".to_string(),
            _ => {
                return Err(ViewerError::DatasetFormat(format!(
                    "metadata column '{}' contains a non-scalar value",
                    column.name
                )));
            }
        };
        values.push(text);
    }
    Ok(MetadataColumn::Categorical(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_adata(doc: &serde_json::Value) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".adata").unwrap();
        file.write_all(doc.to_string().as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_matrix_metadata_and_embedding() {
        let file = write_adata(&json!({
            "X": [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            "obs": [
                {"name": "cell_type", "values": ["t", "t", "b"]},
                {"name": "n_genes", "values": [120, 340, 98]},
            ],
            "obsm": {"X_umap": [[0.0, 0.0], [1.0, 1.0], [2.0, 0.5]]},
        }));
        let dataset = Dataset::from_adata_file(file.path()).unwrap();
        assert_eq!(dataset.n_cells(), 3);
        assert_eq!(dataset.n_features(), 2);
        assert_eq!(dataset.metadata_fields(), vec!["cell_type", "n_genes"]);
        assert_eq!(
            dataset.column("cell_type"),
            Some(&MetadataColumn::Categorical(vec![
                "t".to_string(),
                "t".to_string(),
                "b".to_string()
            ]))
        );
        assert_eq!(
            dataset.column("n_genes"),
            Some(&MetadataColumn::Numeric(vec![120.0, 340.0, 98.0]))
        );
        assert_eq!(dataset.embedding().unwrap().len(), 3);
        assert_eq!(dataset.matrix()[[2, 1]], 6.0);
    }

    #[test]
    fn test_field_order_follows_document_order() {
        let file = write_adata(&json!({
            "X": [[0.0]],
            "obs": [
                {"name": "zeta", "values": ["x"]},
                {"name": "alpha", "values": ["y"]},
            ],
        }));
        let dataset = Dataset::from_adata_file(file.path()).unwrap();
        assert_eq!(dataset.metadata_fields(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_degenerate_dataset_is_valid() {
        let file = write_adata(&json!({"X": []}));
        let dataset = Dataset::from_adata_file(file.path()).unwrap();
        assert_eq!(dataset.n_cells(), 0);
        assert_eq!(dataset.n_features(), 0);
        assert!(dataset.metadata_fields().is_empty());
        assert!(dataset.embedding().is_none());
    }

    #[test]
    fn test_mixed_column_becomes_categorical() {
        let file = write_adata(&json!({
            "X": [[0.0], [0.0], [0.0]],
            "obs": [{"name": "batch", "values": [1, "two", null]}],
        }));
        let dataset = Dataset::from_adata_file(file.path()).unwrap();
        assert_eq!(
            dataset.column("batch"),
            Some(&MetadataColumn::Categorical(vec![
                "1".to_string(),
                "two".to_string(),
                "NA".to_string()
            ]))
        );
    }

    #[test]
    fn test_ragged_matrix_is_rejected() {
        let file = write_adata(&json!({"X": [[1.0, 2.0], [3.0]]}));
        let err = Dataset::from_adata_file(file.path()).unwrap_err();
        assert!(matches!(err, ViewerError::DatasetFormat(_)), "{err}");
    }

    #[test]
    fn test_column_length_mismatch_is_rejected() {
        let file = write_adata(&json!({
            "X": [[1.0], [2.0]],
            "obs": [{"name": "short", "values": ["a"]}],
        }));
        let err = Dataset::from_adata_file(file.path()).unwrap_err();
        assert!(matches!(err, ViewerError::DatasetFormat(_)), "{err}");
    }

    #[test]
    fn test_embedding_length_mismatch_is_rejected() {
        let file = write_adata(&json!({
            "X": [[1.0], [2.0]],
            "obsm": {"X_umap": [[0.0, 0.0]]},
        }));
        let err = Dataset::from_adata_file(file.path()).unwrap_err();
        assert!(matches!(err, ViewerError::DatasetFormat(_)), "{err}");
    }

    #[test]
    fn test_not_json_is_rejected() {
        let mut file = NamedTempFile::with_suffix(".adata").unwrap();
        file.write_all(b"\x89HDF\r\n\x1a\n").unwrap();
        let err = Dataset::from_adata_file(file.path()).unwrap_err();
        assert!(matches!(err, ViewerError::DatasetFormat(_)), "{err}");
    }

    #[test]
    fn test_load_is_repeatable() {
        let file = write_adata(&json!({
            "X": [[1.0]],
            "obs": [{"name": "tag", "values": ["a"]}],
        }));
        let first = Dataset::from_adata_file(file.path()).unwrap();
        let second = Dataset::from_adata_file(file.path()).unwrap();
        assert_eq!(first.metadata_fields(), second.metadata_fields());
        assert_eq!(first.matrix(), second.matrix());
    }
}
