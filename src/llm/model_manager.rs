//! Model file management: locate, download, verify, and delete weights.
//!
//! Models are stored in the platform data directory unless overridden:
//!   macOS:   ~/Library/Application Support/local-llm-chat/models/
//!   Linux:   ~/.local/share/local-llm-chat/models/
//!   Windows: %LOCALAPPDATA%/local-llm-chat/models/

use super::error::ModelFileError;
use super::model_registry::{available_models, ModelConfiguration, ModelId};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Default base directory for downloaded models.
pub fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("local-llm-chat")
        .join("models")
}

/// Full path of a model's weights file.
pub fn model_path(dir: &Path, model: &ModelConfiguration) -> PathBuf {
    dir.join(model.weights_file)
}

fn partial_path(dir: &Path, model: &ModelConfiguration) -> PathBuf {
    dir.join(format!("{}.partial", model.weights_file))
}

/// Check if a model's weights are already on disk.
pub fn is_model_downloaded(dir: &Path, model: &ModelConfiguration) -> bool {
    let path = model_path(dir, model);
    path.exists() && path.metadata().map(|m| m.len() > 0).unwrap_or(false)
}

/// Where `LlamaRuntime` gets a model's weights from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsLocation {
    OnDisk(PathBuf),
    Download(String),
}

/// Decide where a model's weights come from without touching the network.
///
/// Models without a published GGUF are rejected up front unless a locally
/// converted file is already in `dir`.
pub fn resolve_weights(dir: &Path, model: &ModelConfiguration) -> Result<WeightsLocation, ModelFileError> {
    if is_model_downloaded(dir, model) {
        return Ok(WeightsLocation::OnDisk(model_path(dir, model)));
    }
    model
        .download_url()
        .map(WeightsLocation::Download)
        .ok_or(ModelFileError::NotPublished {
            model: model.id,
            repo: model.repo_id,
            file: model.weights_file,
        })
}

/// IDs of all catalog models whose weights are on disk.
pub fn downloaded_model_ids(dir: &Path) -> Vec<ModelId> {
    available_models()
        .iter()
        .filter(|m| is_model_downloaded(dir, m))
        .map(|m| m.id)
        .collect()
}

/// Download a model's weights, reporting progress as a fraction.
///
/// Supports resumption: if a partial file exists, sends a Range header.
/// Returns the path to the downloaded file on success.
#[cfg(feature = "local-llm")]
pub async fn download_model(
    dir: &Path,
    model: &ModelConfiguration,
    on_progress: &super::runtime::ProgressFn,
) -> Result<PathBuf, ModelFileError> {
    use std::io::Write;

    std::fs::create_dir_all(dir).map_err(|e| ModelFileError::io(dir, e))?;

    let dest = model_path(dir, model);
    let partial = partial_path(dir, model);

    let existing_bytes = if partial.exists() {
        partial.metadata().map(|m| m.len()).unwrap_or(0)
    } else {
        0
    };

    let url = model.download_url().ok_or(ModelFileError::NotPublished {
        model: model.id,
        repo: model.repo_id,
        file: model.weights_file,
    })?;
    log::info!(
        "[MODEL] Downloading {} from {} ({} bytes, resuming from {})",
        model.id,
        url,
        model.size_bytes,
        existing_bytes
    );

    let client = reqwest::Client::new();
    let mut req = client.get(&url);
    if existing_bytes > 0 {
        req = req.header("Range", format!("bytes={}-", existing_bytes));
    }

    let mut resp = req
        .send()
        .await
        .map_err(|e| ModelFileError::Download(format!("request failed: {}", e)))?;

    if !resp.status().is_success() && resp.status() != reqwest::StatusCode::PARTIAL_CONTENT {
        return Err(ModelFileError::Download(format!("HTTP {}", resp.status())));
    }

    // A server that ignores Range sends the whole body again.
    let resuming = existing_bytes > 0 && resp.status() == reqwest::StatusCode::PARTIAL_CONTENT;
    let mut downloaded = if resuming { existing_bytes } else { 0 };
    let total = resp
        .content_length()
        .map(|len| len + downloaded)
        .unwrap_or(model.size_bytes)
        .max(1);

    let mut file = if resuming {
        std::fs::OpenOptions::new()
            .append(true)
            .open(&partial)
            .map_err(|e| ModelFileError::io(&partial, e))?
    } else {
        std::fs::File::create(&partial).map_err(|e| ModelFileError::io(&partial, e))?
    };

    on_progress(downloaded as f64 / total as f64);

    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| ModelFileError::Download(format!("stream error: {}", e)))?
    {
        file.write_all(&chunk)
            .map_err(|e| ModelFileError::io(&partial, e))?;
        downloaded += chunk.len() as u64;

        // Report every ~512 KB to avoid flooding observers
        if downloaded % (512 * 1024) < chunk.len() as u64 || downloaded >= total {
            on_progress((downloaded as f64 / total as f64).min(1.0));
        }
    }
    file.flush().map_err(|e| ModelFileError::io(&partial, e))?;

    std::fs::rename(&partial, &dest).map_err(|e| ModelFileError::io(&dest, e))?;

    log::info!("[MODEL] Download complete: {}", dest.display());
    Ok(dest)
}

/// Verify a downloaded model's integrity via SHA-256.
///
/// Reads the file in 8 MB chunks to avoid loading multi-GB weights into
/// memory. Models without a recorded hash pass.
pub fn verify_model_hash(path: &Path, expected_hash: Option<&str>) -> Result<(), ModelFileError> {
    let Some(expected) = expected_hash else {
        return Ok(());
    };

    use std::io::Read;
    let file = std::fs::File::open(path).map_err(|e| ModelFileError::io(path, e))?;
    let mut reader = std::io::BufReader::with_capacity(8 * 1024 * 1024, file);
    let mut hasher = Sha256::new();

    let mut buf = vec![0u8; 8 * 1024 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| ModelFileError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let actual = format!("{:x}", hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(ModelFileError::HashMismatch {
            expected: expected.to_string(),
            actual,
        });
    }

    Ok(())
}

/// Verify a model's weights and delete them if the hash does not match, so
/// the next load fetches a fresh copy.
pub fn verify_or_discard(dir: &Path, model: &ModelConfiguration) -> Result<PathBuf, ModelFileError> {
    let path = model_path(dir, model);
    match verify_model_hash(&path, model.sha256) {
        Ok(()) => Ok(path),
        Err(err @ ModelFileError::HashMismatch { .. }) => {
            log::warn!("[MODEL] {} failed verification, discarding: {}", model.id, err);
            delete_model(dir, model)?;
            Err(err)
        }
        Err(err) => Err(err),
    }
}

/// Delete a downloaded model and any partial download.
pub fn delete_model(dir: &Path, model: &ModelConfiguration) -> Result<(), ModelFileError> {
    let path = model_path(dir, model);
    if path.exists() {
        std::fs::remove_file(&path).map_err(|e| ModelFileError::io(&path, e))?;
        log::info!("[MODEL] Deleted: {}", path.display());
    }
    let partial = partial_path(dir, model);
    if partial.exists() {
        let _ = std::fs::remove_file(&partial);
    }
    Ok(())
}
