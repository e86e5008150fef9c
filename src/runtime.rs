// ONNX Runtime session loading shared by the OCR and QA models
use anyhow::Result;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::info;

use crate::error::InitError;

/// Load an ONNX model, failing with `MissingAsset` when the file is absent.
pub(crate) fn load_session(path: &Path, what: &'static str, intra_threads: usize) -> Result<Session, InitError> {
    if !path.is_file() {
        return Err(InitError::MissingAsset {
            what,
            path: path.to_path_buf(),
        });
    }

    info!(model = %path.display(), "loading {what}");
    let session = build_session(path, intra_threads).map_err(|e| InitError::Model {
        path: path.to_path_buf(),
        reason: format!("{e:#}"),
    })?;
    info!(
        inputs = session.inputs.len(),
        outputs = session.outputs.len(),
        "{what} loaded"
    );
    Ok(session)
}

fn build_session(path: &Path, intra_threads: usize) -> Result<Session> {
    Ok(Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads.max(1))?
        .commit_from_file(path)?)
}
