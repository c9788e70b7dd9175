use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};

use crate::download::target::{model_folder, ContentCategory};

/// Image hosts reject requests without a browser-looking agent.
const IMAGE_USER_AGENT: &str = "Mozilla/5.0";

static IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"src=['"]?([^'" >]+)"#).expect("image url pattern"));

/// Streaming SHA-256 digest of a file, hex encoded.
pub fn compute_sha256(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Pull `src=` URLs out of a rendered preview HTML fragment, for hosts that
/// only hold the markup rather than the registry payload.
#[must_use]
pub fn extract_image_urls(html: &str) -> Vec<String> {
    IMG_SRC
        .captures_iter(html)
        .map(|capture| capture[1].to_string())
        .collect()
}

/// Sidecar `.txt` path for a model file.
#[must_use]
pub fn sidecar_text_path(model_file: &Path) -> PathBuf {
    model_file.with_extension("txt")
}

/// Write the trained-word list next to where the model file lands.
///
/// Returns the written path, or `None` when there is nothing to write or a
/// sidecar already exists (existing files are never overwritten).
pub fn save_trained_words(
    base_dir: &Path,
    category: ContentCategory,
    use_new_folder: bool,
    model_name: &str,
    file_name: &str,
    trained_words: &[String],
) -> Result<Option<PathBuf>> {
    if trained_words.is_empty() {
        return Ok(None);
    }
    let folder = model_folder(base_dir, category, model_name, use_new_folder);
    let path = sidecar_text_path(&folder.join(file_name));
    if path.exists() {
        return Ok(None);
    }
    fs::create_dir_all(&folder)
        .with_context(|| format!("create model folder {}", folder.display()))?;
    fs::write(&path, trained_words.join(", "))
        .with_context(|| format!("write trained words to {}", path.display()))?;
    Ok(Some(path))
}

/// Download preview images into the model folder as `{stem}_{i}.{ext}`.
///
/// The first image is additionally copied to `{stem}.png` so the host UI
/// picks it up as the thumbnail. Individual failures are logged and skipped.
pub fn save_preview_images(
    base_dir: &Path,
    category: ContentCategory,
    model_name: &str,
    file_stem: &str,
    image_urls: &[String],
) -> Result<Vec<PathBuf>> {
    let client = Client::builder()
        .user_agent(IMAGE_USER_AGENT)
        .build()
        .context("create image http client")?;
    let folder = model_folder(base_dir, category, model_name, false);
    fs::create_dir_all(&folder)
        .with_context(|| format!("create model folder {}", folder.display()))?;

    let mut saved = Vec::new();
    for (index, url) in image_urls.iter().enumerate() {
        match fetch_image(&client, url) {
            Ok((bytes, extension)) => {
                let path = folder.join(format!("{file_stem}_{index}.{extension}"));
                fs::write(&path, &bytes)
                    .with_context(|| format!("write preview image {}", path.display()))?;
                if index == 0 {
                    let thumbnail = folder.join(format!("{file_stem}.png"));
                    fs::copy(&path, &thumbnail)
                        .with_context(|| format!("copy thumbnail {}", thumbnail.display()))?;
                }
                saved.push(path);
            }
            Err(error) => tracing::warn!("failed to save preview image {url}: {error:?}"),
        }
    }
    Ok(saved)
}

fn fetch_image(client: &Client, url: &str) -> Result<(Vec<u8>, String)> {
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("request image {url}"))?
        .error_for_status()
        .with_context(|| format!("download image {url}"))?;
    let extension = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(extension_from_content_type)
        .unwrap_or_else(|| "png".to_string());
    let bytes = response.bytes().context("read image body")?;
    Ok((bytes.to_vec(), extension))
}

fn extension_from_content_type(content_type: &str) -> String {
    content_type
        .rsplit('/')
        .next()
        .filter(|ext| !ext.is_empty())
        .unwrap_or("png")
        .to_string()
}
