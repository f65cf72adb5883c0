//! Layered settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_CHUNKING__CHUNK_SIZE`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub chunking: ChunkingSettings,
    pub ingest: IngestSettings,
    pub query: QuerySettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub vocabulary: Vocabulary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Directory of the on-disk LanceDB database.
    pub uri: String,
    pub collection: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { uri: "./data/lancedb".into(), collection: "cyanview_docs".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub batch_size: usize,
    pub embed_batch_size: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self { batch_size: 100, embed_batch_size: 32 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub top_k: usize,
    pub score_threshold: Option<f32>,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self { top_k: 5, score_threshold: Some(0.7) }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    #[default]
    Cls,
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Directory holding `config.json`, `tokenizer.json` and the weights.
    pub model_dir: Option<String>,
    pub pooling: Pooling,
    pub max_len: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, pooling: Pooling::Cls, max_len: 512 }
    }
}

/// External answer generator. Empty `command` means retrieval only.
///
/// The command receives `{"query", "context", "style"}` as JSON on stdin and
/// prints the answer on stdout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub command: Vec<String>,
}

impl GenerationSettings {
    pub fn is_enabled(&self) -> bool {
        !self.command.is_empty()
    }
}

/// Domain vocabulary for the metadata extractor. Order matters: it is the
/// tie-break when two terms are mentioned equally often.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub products: Vec<String>,
    pub topics: Vec<String>,
}

const DEFAULT_PRODUCTS: &[&str] = &[
    "RCP", "Remote Control Panel",
    "CI0", "Camera Interface",
    "RIO", "Remote I/O",
    "RIO Live", "RIO-Live",
    "VP4", "Video Processor",
    "NIO", "Network I/O",
    "GWY", "External Gateway",
    "CY-RSBM", "CY-CI0BM",
    "CY-TALLY-BOX",
];

const DEFAULT_TOPICS: &[&str] = &[
    "Camera Control", "Lens Control", "Tally", "REMI", "Remote Production",
    "Color Correction", "Shading", "Integration", "PTZ", "Gimbal",
    "IP Control", "Serial Control", "SDI Control", "USB Control",
    "Wireless Control", "API", "Firmware", "Configuration",
];

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            products: DEFAULT_PRODUCTS.iter().map(ToString::to_string).collect(),
            topics: DEFAULT_TOPICS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::from_figment(Self::figment_for_env(&env_name))
    }

    pub fn figment_for_env(env_name: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| Error::config(format!("failed to load settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(Error::config("chunking.chunk_size must be > 0"));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(Error::config(format!(
                "chunking.chunk_overlap ({}) must be < chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if self.ingest.batch_size == 0 || self.ingest.embed_batch_size == 0 {
            return Err(Error::config("ingest batch sizes must be > 0"));
        }
        if self.query.top_k == 0 {
            return Err(Error::config("query.top_k must be > 0"));
        }
        if self.generation.command.first().is_some_and(|p| p.trim().is_empty()) {
            return Err(Error::config("generation.command must start with a program"));
        }
        if self.store.collection.trim().is_empty() {
            return Err(Error::config("store.collection must not be empty"));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Result<Settings> {
        Settings::from_figment(
            Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(toml)),
        )
    }

    #[test]
    fn defaults_match_reference_pipeline() {
        let s = from_toml("").expect("defaults");
        assert_eq!(s.chunking.chunk_size, 1000);
        assert_eq!(s.chunking.chunk_overlap, 200);
        assert_eq!(s.query.top_k, 5);
        assert_eq!(s.query.score_threshold, Some(0.7));
        assert_eq!(s.store.collection, "cyanview_docs");
        assert!(s.vocabulary.products.iter().any(|p| p == "RIO Live"));
    }

    #[test]
    fn toml_overrides_nested_keys() {
        let s = from_toml("[chunking]\nchunk_size = 300\nchunk_overlap = 30\n[vocabulary]\nproducts = [\"Widget\"]\n")
            .expect("settings");
        assert_eq!(s.chunking.chunk_size, 300);
        assert_eq!(s.vocabulary.products, vec!["Widget".to_string()]);
        // untouched sections keep defaults
        assert!(!s.vocabulary.topics.is_empty());
    }

    #[test]
    fn overlap_not_below_size_is_rejected() {
        let err = from_toml("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn zero_top_k_is_rejected() {
        assert!(from_toml("[query]\ntop_k = 0\n").unwrap_err().is_configuration());
    }

    #[test]
    fn generation_command_is_optional() {
        assert!(!from_toml("").expect("defaults").generation.is_enabled());
        let s = from_toml("[generation]\ncommand = [\"ollama-answer\", \"--model\", \"llama3\"]\n").expect("settings");
        assert!(s.generation.is_enabled());
        assert_eq!(s.generation.command[0], "ollama-answer");
        assert!(from_toml("[generation]\ncommand = [\" \"]\n").unwrap_err().is_configuration());
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/base");
        assert_eq!(resolve_with_base(base, "/abs/x"), PathBuf::from("/abs/x"));
        assert_eq!(resolve_with_base(base, "rel/x"), PathBuf::from("/base/rel/x"));
    }
}
