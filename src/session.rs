use crate::archive;
use crate::dataset::Dataset;
use crate::embedding::{ensure_embedding, EmbeddingParams};
use crate::error::ViewerError;
use crate::render_scatter::{render_scatter, RenderedPlot};
use crate::workspace::Workspace;
use log::{info, warn};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionStatus {
    NoDataset,
    Loading,
    Ready,
    Error,
}

/// Orchestrates one upload/render cycle at a time: resolve, load, ensure
/// embedding, render, in that explicit order. Holds the transient state
/// the UI layer queries (current dataset handle, color selection, last
/// message); never panics on pipeline failures, which instead transition
/// the session to `Error` with the message retained.
pub struct Session {
    workspace: Workspace,
    status: SessionStatus,
    message: String,
    dataset: Option<Arc<Dataset>>,
    color_fields: Vec<String>,
    selected_field: Option<String>,
    embedding_params: EmbeddingParams,
}

impl Session {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            status: SessionStatus::NoDataset,
            message: "Upload a ZIP file to begin".to_string(),
            dataset: None,
            color_fields: Vec::new(),
            selected_field: None,
            embedding_params: EmbeddingParams::default(),
        }
    }

    pub fn with_embedding_params(mut self, params: EmbeddingParams) -> Self {
        self.embedding_params = params;
        self
    }

    /// Handles an upload: replaces any current dataset, runs the resolver
    /// and loader, and lands in `Ready` (color-field list populated, first
    /// field selected) or `Error` (message retained, no dataset referenced).
    pub fn on_upload(&mut self, archive_bytes: &[u8], declared_filename: &str) {
        self.status = SessionStatus::Loading;
        self.message = format!("Processing '{declared_filename}'");
        self.dataset = None;
        self.color_fields.clear();
        self.selected_field = None;

        match self.ingest(archive_bytes, declared_filename) {
            Ok(dataset) => {
                self.color_fields = dataset.metadata_fields();
                self.selected_field = self.color_fields.first().cloned();
                info!(
                    "Session ready: {} cells, color fields {:?}",
                    dataset.n_cells(),
                    self.color_fields
                );
                self.dataset = Some(Arc::new(dataset));
                self.status = SessionStatus::Ready;
                self.message = "File processed successfully".to_string();
            }
            Err(e) => {
                warn!("Upload of '{declared_filename}' failed: {e}");
                self.status = SessionStatus::Error;
                self.message = e.to_string();
            }
        }
    }

    fn ingest(&self, archive_bytes: &[u8], declared_filename: &str) -> Result<Dataset, ViewerError> {
        let path = archive::resolve(archive_bytes, declared_filename, &self.workspace)?;
        Dataset::from_adata_file(&path)
    }

    /// Changes the color selection; the session stays `Ready` and only the
    /// next render is affected. The name is not validated here: the field
    /// list and the dataset can be updated by independent UI actions, and
    /// the renderer falls back to uncolored for unknown names.
    pub fn on_color_field_change(&mut self, name: &str) {
        self.selected_field = Some(name.to_string());
    }

    /// Non-blocking read of the current state and user-facing message.
    pub fn status(&self) -> (SessionStatus, &str) {
        (self.status, &self.message)
    }

    /// Ordered color-field choices; empty unless a dataset is loaded.
    pub fn current_color_fields(&self) -> &[String] {
        &self.color_fields
    }

    pub fn current_color_field(&self) -> Option<&str> {
        self.selected_field.as_deref()
    }

    /// Renders the current (dataset, color field) selection.
    ///
    /// Returns `Ok(None)` when no dataset is ready. The embedding is
    /// computed on demand, copy-on-write against the shared handle, so an
    /// in-flight render holding an older snapshot never observes a
    /// partially-populated embedding. Embedding and render failures are
    /// returned (and logged) without tearing down the loaded dataset.
    pub fn plot_for_current_selection(&mut self) -> Result<Option<RenderedPlot>, ViewerError> {
        if self.status != SessionStatus::Ready {
            return Ok(None);
        }
        let Some(handle) = self.dataset.as_mut() else {
            return Ok(None);
        };
        if handle.embedding().is_none() {
            let dataset = Arc::make_mut(handle);
            if let Err(e) = ensure_embedding(dataset, &self.embedding_params) {
                warn!("Embedding computation failed: {e}");
                return Err(e);
            }
        }
        let snapshot = Arc::clone(handle);
        let field = self.selected_field.clone();
        render_scatter(&snapshot, field.as_deref()).map(Some)
    }
}
