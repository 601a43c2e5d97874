use crate::error::ViewerError;
use crate::workspace::Workspace;
use log::{info, warn};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// The one upload container format the viewer accepts.
pub const ARCHIVE_EXT: &str = ".zip";
/// Dataset container extension scanned for after extraction.
pub const DATASET_EXT: &str = ".adata";

/// Persists an uploaded archive into the workspace, expands it, and returns
/// the path of the dataset file to load.
///
/// The archive is stored under its declared name (overwriting any earlier
/// upload of the same name) and expanded into the workspace root. Only the
/// top level of the workspace is scanned for dataset files; if several are
/// present, the lexicographically first name wins. Residue from earlier
/// uploads is left in place.
pub fn resolve(
    archive_bytes: &[u8],
    declared_filename: &str,
    workspace: &Workspace,
) -> Result<PathBuf, ViewerError> {
    if !declared_filename.to_ascii_lowercase().ends_with(ARCHIVE_EXT) {
        return Err(ViewerError::InvalidArchive(format!(
            "'{declared_filename}' is not a {ARCHIVE_EXT} file"
        )));
    }
    let file_name = Path::new(declared_filename)
        .file_name()
        .ok_or_else(|| ViewerError::InvalidArchive(format!("bad filename '{declared_filename}'")))?;

    let archive_path = workspace.join(file_name);
    fs::write(&archive_path, archive_bytes)
        .map_err(|e| ViewerError::Extraction(format!("cannot persist archive: {e}")))?;
    info!(
        "Stored upload '{}' ({} bytes) in {}",
        declared_filename,
        archive_bytes.len(),
        workspace.root().display()
    );

    let file = File::open(&archive_path)
        .map_err(|e| ViewerError::Extraction(format!("cannot reopen archive: {e}")))?;
    let mut archive = ZipArchive::new(file).map_err(zip_error)?;
    expand(&mut archive, workspace)?;

    select_dataset_file(workspace)
}

fn zip_error(err: zip::result::ZipError) -> ViewerError {
    match err {
        zip::result::ZipError::Io(e) => ViewerError::Extraction(e.to_string()),
        other => ViewerError::InvalidArchive(other.to_string()),
    }
}

fn expand(archive: &mut ZipArchive<File>, workspace: &Workspace) -> Result<(), ViewerError> {
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_error)?;
        // enclosed_name() is None for absolute or parent-escaping names.
        let relative = entry.enclosed_name().ok_or_else(|| {
            ViewerError::Extraction(format!("entry '{}' escapes the workspace", entry.name()))
        })?;
        let target = workspace.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| ViewerError::Extraction(format!("cannot create directory: {e}")))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ViewerError::Extraction(format!("cannot create directory: {e}")))?;
        }
        let mut out = File::create(&target)
            .map_err(|e| ViewerError::Extraction(format!("cannot write '{}': {e}", entry.name())))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| ViewerError::Extraction(format!("cannot write '{}': {e}", entry.name())))?;
    }
    Ok(())
}

/// Top-level, non-recursive scan for dataset files; lexicographically first
/// name wins when the archive carried more than one.
fn select_dataset_file(workspace: &Workspace) -> Result<PathBuf, ViewerError> {
    let mut candidates: Vec<String> = fs::read_dir(workspace.root())
        .map_err(|e| ViewerError::Extraction(format!("cannot scan workspace: {e}")))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.to_ascii_lowercase().ends_with(DATASET_EXT))
        .collect();
    candidates.sort();

    match candidates.first() {
        None => Err(ViewerError::NoDatasetFound),
        Some(winner) => {
            if candidates.len() > 1 {
                warn!(
                    "Archive expanded to {} dataset files; selecting '{winner}'",
                    candidates.len()
                );
            } else {
                info!("Selected dataset file '{winner}'");
            }
            Ok(workspace.join(winner))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, bytes) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_resolve_single_dataset_file() {
        let ws = Workspace::ephemeral().unwrap();
        let bytes = build_zip(&[("cells.adata", b"{}"), ("readme.txt", b"hi")]);
        let path = resolve(&bytes, "upload.zip", &ws).unwrap();
        assert_eq!(path, ws.join("cells.adata"));
        assert!(path.is_file());
        // The archive itself was persisted under its declared name.
        assert!(ws.join("upload.zip").is_file());
    }

    #[test]
    fn test_resolve_no_dataset_file() {
        let ws = Workspace::ephemeral().unwrap();
        let bytes = build_zip(&[("readme.txt", b"hi")]);
        let err = resolve(&bytes, "upload.zip", &ws).unwrap_err();
        assert!(matches!(err, ViewerError::NoDatasetFound), "{err}");
    }

    #[test]
    fn test_resolve_multiple_datasets_is_deterministic() {
        let bytes = build_zip(&[("zebra.adata", b"{}"), ("aardvark.adata", b"{}")]);
        for _ in 0..3 {
            let ws = Workspace::ephemeral().unwrap();
            let path = resolve(&bytes, "upload.zip", &ws).unwrap();
            assert_eq!(path, ws.join("aardvark.adata"));
        }
    }

    #[test]
    fn test_nested_dataset_is_not_selected() {
        let ws = Workspace::ephemeral().unwrap();
        let bytes = build_zip(&[("sub/nested.adata", b"{}")]);
        let err = resolve(&bytes, "upload.zip", &ws).unwrap_err();
        assert!(matches!(err, ViewerError::NoDatasetFound), "{err}");
    }

    #[test]
    fn test_corrupt_archive_is_invalid() {
        let ws = Workspace::ephemeral().unwrap();
        let err = resolve(b"these are not zip bytes", "upload.zip", &ws).unwrap_err();
        assert!(matches!(err, ViewerError::InvalidArchive(_)), "{err}");
    }

    #[test]
    fn test_wrong_extension_is_invalid() {
        let ws = Workspace::ephemeral().unwrap();
        let err = resolve(b"whatever", "dataset.tar.gz", &ws).unwrap_err();
        assert!(matches!(err, ViewerError::InvalidArchive(_)), "{err}");
    }

    #[test]
    fn test_escaping_entry_is_rejected() {
        let ws = Workspace::ephemeral().unwrap();
        let bytes = build_zip(&[("../escape.adata", b"{}")]);
        let err = resolve(&bytes, "upload.zip", &ws).unwrap_err();
        assert!(matches!(err, ViewerError::Extraction(_)), "{err}");
    }

    #[test]
    fn test_reupload_overwrites_archive_and_keeps_residue() {
        let ws = Workspace::ephemeral().unwrap();
        let first = build_zip(&[("old.adata", b"{}")]);
        resolve(&first, "upload.zip", &ws).unwrap();

        let second = build_zip(&[("new.adata", b"{}")]);
        // Old extraction residue is still there, so the lexicographic scan
        // may pick it up again; that accumulation is the documented contract.
        let path = resolve(&second, "upload.zip", &ws).unwrap();
        assert_eq!(path, ws.join("new.adata"));
        assert!(ws.join("old.adata").is_file());
    }
}
