use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Registry content categories. The serialized form doubles as the `types=`
/// query parameter value and as the caller-facing type string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentCategory {
    Checkpoint,
    Hypernetwork,
    TextualInversion,
    AestheticGradient,
    #[serde(rename = "VAE")]
    Vae,
    #[serde(rename = "LORA")]
    Lora,
    LoCon,
}

impl ContentCategory {
    pub const NAMES: [&'static str; 7] = [
        "Checkpoint",
        "Hypernetwork",
        "TextualInversion",
        "AestheticGradient",
        "VAE",
        "LORA",
        "LoCon",
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Checkpoint" => Some(Self::Checkpoint),
            "Hypernetwork" => Some(Self::Hypernetwork),
            "TextualInversion" => Some(Self::TextualInversion),
            "AestheticGradient" => Some(Self::AestheticGradient),
            "VAE" => Some(Self::Vae),
            "LORA" => Some(Self::Lora),
            "LoCon" => Some(Self::LoCon),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkpoint => "Checkpoint",
            Self::Hypernetwork => "Hypernetwork",
            Self::TextualInversion => "TextualInversion",
            Self::AestheticGradient => "AestheticGradient",
            Self::Vae => "VAE",
            Self::Lora => "LORA",
            Self::LoCon => "LoCon",
        }
    }

    /// Folder convention of the host webui installation, relative to its root.
    #[must_use]
    pub fn folder(&self) -> &'static str {
        match self {
            Self::Checkpoint => "models/Stable-diffusion",
            Self::Hypernetwork => "models/hypernetworks",
            Self::TextualInversion => "embeddings",
            Self::AestheticGradient => {
                "extensions/stable-diffusion-webui-aesthetic-gradients/aesthetic_embeddings"
            }
            Self::Vae => "models/VAE",
            Self::Lora => "models/Lora",
            Self::LoCon => "models/LyCORIS",
        }
    }

    /// Embeddings-style categories are stored flat; the rest nest one
    /// subfolder per model.
    fn uses_model_subfolder(&self) -> bool {
        matches!(
            self,
            Self::Checkpoint | Self::Hypernetwork | Self::Lora | Self::LoCon
        )
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip characters that are invalid on common filesystems.
///
/// Spaces become underscores, parentheses are dropped, `:` becomes `-`, and
/// the remaining reserved set `<>:"/\|?*` is removed outright.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter_map(|ch| match ch {
            ' ' => Some('_'),
            ':' => Some('-'),
            '(' | ')' => None,
            '<' | '>' | '"' | '/' | '\\' | '|' | '?' | '*' => None,
            other => Some(other),
        })
        .collect()
}

/// Folder a model's files (and sidecars) land in.
#[must_use]
pub fn model_folder(
    base_dir: &Path,
    category: ContentCategory,
    model_name: &str,
    use_new_folder: bool,
) -> PathBuf {
    let mut folder = base_dir.join(category.folder());
    if use_new_folder {
        folder.push("new");
    }
    if category.uses_model_subfolder() {
        folder.push(sanitize_name(model_name));
    }
    folder
}

/// Absolute destination path for a model file.
#[must_use]
pub fn resolve_destination(
    base_dir: &Path,
    category: ContentCategory,
    model_name: &str,
    file_name: &str,
    use_new_folder: bool,
) -> PathBuf {
    model_folder(base_dir, category, model_name, use_new_folder).join(file_name)
}
