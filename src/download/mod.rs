pub mod fetch;
pub mod service;
pub mod target;

pub use fetch::{fetch, lock_marker_path, partial_path, FetchOptions, FetchOutcome, FetchReport};
pub use service::{DownloadEvent, DownloadHandle, DownloadService};
pub use target::{model_folder, resolve_destination, sanitize_name, ContentCategory};
