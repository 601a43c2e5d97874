use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum ViewerError {
    /// Declared filename is not a ZIP, or the bytes are not a valid archive.
    InvalidArchive(String),
    /// The archive parsed, but expanding its entries failed.
    Extraction(String),
    /// No dataset file at the top level of the expanded archive.
    NoDatasetFound,
    /// Dataset file unreadable or not in the expected container format.
    DatasetFormat(String),
    /// Degenerate matrix or layout failure while computing the embedding.
    EmbeddingComputation(String),
    /// Render was called on a dataset without an embedding (caller bug).
    MissingEmbedding,
    /// Rasterization or encoding of the scatter image failed.
    Render(String),
    Io(std::io::Error),
}

impl Error for ViewerError {}

impl fmt::Display for ViewerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ViewerError::InvalidArchive(msg) => write!(f, "Invalid archive: {msg}"),
            ViewerError::Extraction(msg) => write!(f, "Archive extraction failed: {msg}"),
            ViewerError::NoDatasetFound => {
                write!(f, "No dataset file (.adata) found in the archive")
            }
            ViewerError::DatasetFormat(msg) => write!(f, "Unreadable dataset: {msg}"),
            ViewerError::EmbeddingComputation(msg) => {
                write!(f, "Embedding computation failed: {msg}")
            }
            ViewerError::MissingEmbedding => {
                write!(f, "Dataset has no 2-D embedding; compute one before rendering")
            }
            ViewerError::Render(msg) => write!(f, "Plot rendering failed: {msg}"),
            ViewerError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl From<std::io::Error> for ViewerError {
    fn from(err: std::io::Error) -> Self {
        ViewerError::Io(err)
    }
}
