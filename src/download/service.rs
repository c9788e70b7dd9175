use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;

use super::fetch::{fetch, FetchOptions, FetchOutcome};
use crate::error::FetchError;

/// Status notifications a host UI can subscribe to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum DownloadEvent {
    #[serde(rename_all = "camelCase")]
    Started { destination: PathBuf, url: String },
    #[serde(rename_all = "camelCase")]
    Progress {
        destination: PathBuf,
        bytes_downloaded: u64,
        bytes_total: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Skipped {
        destination: PathBuf,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        destination: PathBuf,
        bytes_downloaded: u64,
        sha256: String,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        destination: PathBuf,
        error: String,
    },
}

/// Handle to one in-flight download.
///
/// Dropping it detaches the worker; `join` waits for the terminal outcome.
/// There is no cancellation: a started download runs to success or
/// retry exhaustion.
#[derive(Debug)]
pub struct DownloadHandle {
    destination: PathBuf,
    worker: JoinHandle<Result<FetchOutcome, FetchError>>,
}

impl DownloadHandle {
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the download reaches a terminal state.
    pub fn join(self) -> Result<FetchOutcome, FetchError> {
        self.worker.join().unwrap_or(Err(FetchError::Worker))
    }
}

/// Spawns one worker thread per download. Workers for different destinations
/// are fully independent; duplicate destinations are fended off by the
/// fetcher's lock marker.
pub struct DownloadService {
    client: Client,
    options: FetchOptions,
    events: Sender<DownloadEvent>,
}

impl DownloadService {
    /// Build the service and the receiving end of its event stream.
    pub fn new(
        options: FetchOptions,
        api_key: Option<&str>,
    ) -> Result<(Self, Receiver<DownloadEvent>)> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .context("api key is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(None)
            .build()
            .context("create download http client")?;
        let (events, receiver) = unbounded();
        Ok((
            Self {
                client,
                options,
                events,
            },
            receiver,
        ))
    }

    pub fn start(&self, url: String, destination: PathBuf) -> DownloadHandle {
        let client = self.client.clone();
        let options = self.options.clone();
        let events = self.events.clone();
        let dest = destination.clone();

        let worker = thread::spawn(move || {
            let _ = events.send(DownloadEvent::Started {
                destination: dest.clone(),
                url: url.clone(),
            });

            let progress_events = events.clone();
            let progress_dest = dest.clone();
            let result = fetch(&client, &url, &dest, &options, move |bytes, total| {
                let _ = progress_events.send(DownloadEvent::Progress {
                    destination: progress_dest.clone(),
                    bytes_downloaded: bytes,
                    bytes_total: total,
                });
            });

            let event = match &result {
                Ok(FetchOutcome::Completed(report)) => DownloadEvent::Completed {
                    destination: dest,
                    bytes_downloaded: report.bytes_downloaded,
                    sha256: report.sha256.clone(),
                },
                Ok(FetchOutcome::AlreadyDownloaded) => DownloadEvent::Skipped {
                    destination: dest,
                    reason: "destination already exists".into(),
                },
                Ok(FetchOutcome::LockedByOther) => DownloadEvent::Skipped {
                    destination: dest,
                    reason: "another download holds the lock".into(),
                },
                Err(error) => DownloadEvent::Failed {
                    destination: dest,
                    error: error.to_string(),
                },
            };
            let _ = events.send(event);
            result
        });

        DownloadHandle {
            destination,
            worker,
        }
    }
}
