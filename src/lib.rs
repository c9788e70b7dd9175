pub mod api;
pub mod core;
pub mod download;
pub mod error;
pub mod metadata;
pub mod registry;

pub use crate::api::{DownloadApi, DownloadRequest, DownloadResponse};
pub use crate::core::settings::{Settings, SettingsManager};
pub use crate::download::fetch::{fetch, FetchOptions, FetchOutcome, FetchReport};
pub use crate::download::service::{DownloadEvent, DownloadHandle, DownloadService};
pub use crate::download::target::ContentCategory;
pub use crate::error::FetchError;
pub use crate::registry::{BrowseSession, ModelPage, RegistryClient, SearchQuery, SortOrder};

use tracing::metadata::LevelFilter;

/// Install a global tracing subscriber, honoring `CIVITAI_LOG` for the level.
pub fn init_logging() {
    let filter = std::env::var("CIVITAI_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
