//! File-storage collaborator — uploads binary deliverables.
//!
//! `deliver` treats this call as a blocking dependency: the upload runs
//! strictly before any milestone row is mutated, and a failure aborts the
//! whole operation with the milestone left `Released`. No retries; the
//! caller resubmits.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::errors::{ApiError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    secure_url: String,
}

/// Upload `bytes` to the storage service and return the permanent URL.
pub async fn upload(
    client: &Client,
    config: &Config,
    bytes: Vec<u8>,
    file_name: &str,
    public_id: Option<&str>,
) -> Result<String> {
    let part = Part::bytes(bytes).file_name(file_name.to_string());
    let mut form = Form::new()
        .part("file", part)
        .text("folder", config.storage_folder.clone())
        .text("resource_type", "auto");
    if let Some(public_id) = public_id {
        form = form.text("public_id", public_id.to_string());
    }

    let response = client
        .post(format!("{}/upload", config.storage_url))
        .multipart(form)
        .send()
        .await
        .map_err(|e| ApiError::Upload(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ApiError::Upload(format!(
            "storage service returned {}",
            response.status()
        )));
    }

    let body: UploadResponse = response
        .json()
        .await
        .map_err(|e| ApiError::Upload(format!("unparsable storage response: {e}")))?;

    Ok(body.secure_url)
}
