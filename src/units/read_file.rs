use crate::errors::AppResult;
use base64::Engine;
use std::{fs, path::Path};

pub fn read(path: &Path) -> AppResult<String> {
    let data = fs::read(path)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(data))
}

pub fn decode(content_b64: &str) -> AppResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(content_b64)
        .map_err(|e| crate::errors::AppError::Transport(format!("invalid base64 content: {e}")))
}
