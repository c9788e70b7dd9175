use super::types::{ModelPage, ModelSummary, ModelVersion};

/// Caller-owned view over the most-recently-fetched registry page.
///
/// Every browse operation reads from the session it is handed, so two hosts
/// paging through different searches never observe each other's state.
#[derive(Debug, Default)]
pub struct BrowseSession {
    page: Option<ModelPage>,
}

/// Everything the host needs to render one model version.
#[derive(Debug, Clone)]
pub struct VersionDetails {
    pub model_name: String,
    pub version_name: String,
    pub uploader: Option<String>,
    pub description: Option<String>,
    pub trained_words: Vec<String>,
    pub image_urls: Vec<String>,
    pub file_names: Vec<String>,
    pub download_url: Option<String>,
}

impl BrowseSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_page(&mut self, page: ModelPage) {
        self.page = Some(page);
    }

    pub fn clear(&mut self) {
        self.page = None;
    }

    #[must_use]
    pub fn page(&self) -> Option<&ModelPage> {
        self.page.as_ref()
    }

    #[must_use]
    pub fn next_page_url(&self) -> Option<&str> {
        self.page
            .as_ref()
            .and_then(|page| page.metadata.next_page.as_deref())
    }

    #[must_use]
    pub fn model_names(&self, include_nsfw: bool) -> Vec<&str> {
        self.items()
            .filter(|item| include_nsfw || !item.nsfw)
            .map(|item| item.name.as_str())
            .collect()
    }

    #[must_use]
    pub fn version_names(&self, model_name: &str) -> Vec<&str> {
        self.find_model(model_name)
            .map(|model| {
                model
                    .model_versions
                    .iter()
                    .map(|version| version.name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn file_names(&self, model_name: &str, version_name: &str) -> Vec<&str> {
        self.find_version(model_name, version_name)
            .map(|version| version.files.iter().map(|file| file.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Resolve the download URL of one file of one model version.
    #[must_use]
    pub fn download_url(
        &self,
        model_name: &str,
        version_name: &str,
        file_name: &str,
    ) -> Option<&str> {
        self.find_version(model_name, version_name)?
            .files
            .iter()
            .find(|file| file.name == file_name)?
            .download_url
            .as_deref()
    }

    #[must_use]
    pub fn version_details(&self, model_name: &str, version_name: &str) -> Option<VersionDetails> {
        let model = self.find_model(model_name)?;
        let version = model
            .model_versions
            .iter()
            .find(|version| version.name == version_name)?;
        Some(VersionDetails {
            model_name: model.name.clone(),
            version_name: version.name.clone(),
            uploader: model.creator.as_ref().map(|creator| creator.username.clone()),
            description: model.description.clone(),
            trained_words: version.trained_words.clone(),
            image_urls: version.images.iter().map(|image| image.url.clone()).collect(),
            file_names: version.files.iter().map(|file| file.name.clone()).collect(),
            download_url: version.download_url.clone(),
        })
    }

    fn items(&self) -> impl Iterator<Item = &ModelSummary> {
        self.page.iter().flat_map(|page| page.items.iter())
    }

    fn find_model(&self, model_name: &str) -> Option<&ModelSummary> {
        self.items().find(|item| item.name == model_name)
    }

    fn find_version(&self, model_name: &str, version_name: &str) -> Option<&ModelVersion> {
        self.find_model(model_name)?
            .model_versions
            .iter()
            .find(|version| version.name == version_name)
    }
}
