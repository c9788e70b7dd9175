use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};

use crate::core::settings::Settings;
use crate::download::fetch::{FetchOptions, FetchOutcome};
use crate::download::service::{DownloadEvent, DownloadHandle, DownloadService};
use crate::download::target::{resolve_destination, sanitize_name, ContentCategory};

/// Inbound download request, as the host UI or HTTP layer hands it over.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: String,
    pub file_name: String,
    pub content_type: String,
    #[serde(default)]
    pub use_new_folder: bool,
    #[serde(default)]
    pub model_name: Option<String>,
}

/// Structured acknowledgment returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub message: String,
    pub success: bool,
}

impl DownloadResponse {
    fn accepted(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
        }
    }
}

#[derive(Debug)]
struct ValidatedRequest {
    url: String,
    destination: PathBuf,
    model_name: String,
}

/// Caller-facing download surface: validates requests, resolves destinations
/// and hands the work to a background worker.
pub struct DownloadApi {
    base_dir: PathBuf,
    service: DownloadService,
}

impl DownloadApi {
    /// Build the API and the event stream hosts subscribe to for progress.
    pub fn new(settings: &Settings) -> Result<(Self, Receiver<DownloadEvent>)> {
        let options = FetchOptions {
            max_retries: settings.max_retries,
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
        };
        let (service, events) = DownloadService::new(options, settings.api_key.as_deref())?;
        Ok((
            Self {
                base_dir: settings.base_dir.clone(),
                service,
            },
            events,
        ))
    }

    /// Download a model file into the folder its content type dictates.
    ///
    /// Returns immediately with "Downloading ..." unless `wait` is set, in
    /// which case the terminal outcome is reported instead. Invalid input is
    /// reported as a failed response, never as a panic or error.
    pub fn download_model(&self, request: DownloadRequest, wait: bool) -> DownloadResponse {
        let validated = match self.validate(request) {
            Ok(validated) => validated,
            Err(response) => return response,
        };
        let handle = self.service.start(validated.url, validated.destination);
        if !wait {
            return DownloadResponse::accepted(format!("Downloading {}...", validated.model_name));
        }
        match handle.join() {
            Ok(FetchOutcome::Completed(_)) => {
                DownloadResponse::accepted(format!("Downloaded {}", validated.model_name))
            }
            Ok(FetchOutcome::AlreadyDownloaded) => DownloadResponse::accepted(format!(
                "{} is already downloaded",
                validated.model_name
            )),
            Ok(FetchOutcome::LockedByOther) => DownloadResponse::accepted(format!(
                "{} is already being downloaded",
                validated.model_name
            )),
            Err(error) => DownloadResponse::rejected(format!(
                "Download of {} failed: {error}",
                validated.model_name
            )),
        }
    }

    /// Validate and start a download, returning its handle for callers that
    /// track completion themselves.
    pub fn begin_download(
        &self,
        request: DownloadRequest,
    ) -> Result<DownloadHandle, DownloadResponse> {
        let validated = self.validate(request)?;
        Ok(self.service.start(validated.url, validated.destination))
    }

    fn validate(&self, request: DownloadRequest) -> Result<ValidatedRequest, DownloadResponse> {
        if request.url.is_empty() || !request.url.starts_with("http") {
            return Err(DownloadResponse::rejected(format!(
                "No valid URL provided: {}",
                request.url
            )));
        }
        if request.file_name.is_empty() {
            return Err(DownloadResponse::rejected("No file name provided"));
        }
        let Some(category) = ContentCategory::parse(&request.content_type) else {
            return Err(DownloadResponse::rejected(format!(
                "Invalid content type, given {} but expected one of {:?}",
                request.content_type,
                ContentCategory::NAMES
            )));
        };

        let mut file_name = sanitize_name(&request.file_name);
        if !file_name.contains('.') {
            file_name.push_str(".safetensors");
        }

        let model_name = request
            .model_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                file_name
                    .rsplit_once('.')
                    .map(|(stem, _)| stem.to_string())
                    .unwrap_or_else(|| file_name.clone())
            });
        let model_name = sanitize_name(&model_name).replace('.', "_");

        let destination = resolve_destination(
            &self.base_dir,
            category,
            &model_name,
            &file_name,
            request.use_new_folder,
        );
        Ok(ValidatedRequest {
            url: request.url,
            destination,
            model_name,
        })
    }
}
