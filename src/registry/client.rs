use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use super::session::BrowseSession;
use super::types::{ModelPage, SortOrder};
use crate::download::target::ContentCategory;

pub const DEFAULT_ENDPOINT: &str = "https://civitai.com/api/v1/models";

/// Search parameters for one registry query.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub category: ContentCategory,
    pub sort: SortOrder,
    /// Free-text term; `None` or empty lists without filtering.
    pub term: Option<String>,
}

impl SearchQuery {
    #[must_use]
    pub fn new(category: ContentCategory) -> Self {
        Self {
            category,
            sort: SortOrder::default(),
            term: None,
        }
    }
}

/// Stateless client for the model registry REST API. Page state lives in the
/// caller's [`BrowseSession`].
pub struct RegistryClient {
    http: Client,
    endpoint: String,
    page_limit: u32,
}

impl RegistryClient {
    pub fn new(endpoint: impl Into<String>, page_limit: u32, api_key: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .context("api key is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let http = Client::builder()
            .default_headers(headers)
            .build()
            .context("create registry http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            page_limit,
        })
    }

    pub fn search(&self, query: &SearchQuery) -> Result<ModelPage> {
        let mut request = self.http.get(&self.endpoint).query(&[
            ("limit", self.page_limit.to_string().as_str()),
            ("types", query.category.as_str()),
            ("sort", query.sort.as_param()),
        ]);
        if let Some(term) = query.term.as_deref().filter(|term| !term.is_empty()) {
            request = request.query(&[("query", term)]);
        }
        execute(request)
    }

    /// Fetch an explicit page-cursor URL, as returned in `metadata.nextPage`.
    pub fn fetch_page(&self, url: &str) -> Result<ModelPage> {
        execute(self.http.get(url))
    }

    /// Follow the session's next-page cursor, if the registry offered one.
    pub fn next_page(&self, session: &BrowseSession) -> Result<Option<ModelPage>> {
        match session.next_page_url() {
            Some(url) => self.fetch_page(url).map(Some),
            None => Ok(None),
        }
    }
}

fn execute(request: RequestBuilder) -> Result<ModelPage> {
    let response = request.send().context("query model registry")?;
    let status = response.status();
    if !status.is_success() {
        bail!("registry request failed with status {status}");
    }
    let body = response.text().context("read registry response")?;
    serde_json::from_str(&body).context("parse registry response")
}
