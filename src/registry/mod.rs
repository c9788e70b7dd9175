pub mod client;
pub mod session;
pub mod types;

pub use client::{RegistryClient, SearchQuery, DEFAULT_ENDPOINT};
pub use session::{BrowseSession, VersionDetails};
pub use types::{
    Creator, ModelFile, ModelImage, ModelPage, ModelSummary, ModelVersion, PageMetadata, SortOrder,
};
