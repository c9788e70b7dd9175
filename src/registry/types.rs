use serde::{Deserialize, Serialize};

/// One page of registry search results.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPage {
    #[serde(default)]
    pub items: Vec<ModelSummary>,
    #[serde(default)]
    pub metadata: PageMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default)]
    pub total_items: Option<u64>,
    #[serde(default)]
    pub current_page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub name: String,
    #[serde(default, rename = "type")]
    pub model_type: Option<String>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub creator: Option<Creator>,
    #[serde(default)]
    pub model_versions: Vec<ModelVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Creator {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVersion {
    pub name: String,
    #[serde(default)]
    pub trained_words: Vec<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub files: Vec<ModelFile>,
    #[serde(default)]
    pub images: Vec<ModelImage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFile {
    pub name: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default, rename = "sizeKB")]
    pub size_kb: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelImage {
    pub url: String,
}

/// Sort orders the registry understands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Newest,
    #[serde(rename = "Most Downloaded")]
    MostDownloaded,
    #[serde(rename = "Highest Rated")]
    HighestRated,
    #[serde(rename = "Most Liked")]
    MostLiked,
}

impl SortOrder {
    #[must_use]
    pub fn as_param(&self) -> &'static str {
        match self {
            Self::Newest => "Newest",
            Self::MostDownloaded => "Most Downloaded",
            Self::HighestRated => "Highest Rated",
            Self::MostLiked => "Most Liked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_about_missing_optionals() {
        let page: ModelPage = serde_json::from_str(
            r#"{"items":[{"name":"Bare Model"}],"metadata":{}}"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(!page.items[0].nsfw);
        assert!(page.items[0].model_versions.is_empty());
        assert!(page.metadata.next_page.is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let version: ModelVersion = serde_json::from_str(
            r#"{"name":"v1.0","baseModel":"SD 1.5","files":[{"name":"m.safetensors","sizeKB":2048.5,"pickleScanResult":"Success"}]}"#,
        )
        .unwrap();
        assert_eq!(version.files[0].name, "m.safetensors");
        assert_eq!(version.files[0].size_kb, Some(2048.5));
    }

    #[test]
    fn sort_orders_render_their_registry_spelling() {
        assert_eq!(SortOrder::Newest.as_param(), "Newest");
        assert_eq!(SortOrder::MostDownloaded.as_param(), "Most Downloaded");
        assert_eq!(SortOrder::HighestRated.as_param(), "Highest Rated");
        assert_eq!(SortOrder::MostLiked.as_param(), "Most Liked");
    }
}
