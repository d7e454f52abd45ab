// ABOUTME: Configuration module for the slidev pipeline
// ABOUTME: Per-collaborator option sections, override merging and environment settings

use crate::errors::{Result, SlidevError};
use crate::layout::ProjectLayout;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Process-level settings for the binary
pub struct Config {
    pub entry: PathBuf,
    pub theme: Option<String>,
    pub client_root: Option<PathBuf>,
    pub port: u16,
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entry: PathBuf::from("slides.md"),
            theme: None,
            client_root: None,
            port: 3030,
            debounce_ms: 300,
        }
    }
}

impl Config {
    /// Create a new configuration instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let entry = env::var("SLIDEV_ENTRY")
            .ok()
            .map(PathBuf::from)
            .unwrap_or(defaults.entry);
        let theme = env::var("SLIDEV_THEME").ok().filter(|s| !s.is_empty());
        let client_root = env::var("SLIDEV_CLIENT_ROOT").ok().map(PathBuf::from);
        let port = env::var("SLIDEV_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(defaults.port);
        let debounce_ms = env::var("SLIDEV_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.debounce_ms);

        Self {
            entry,
            theme,
            client_root,
            port,
            debounce_ms,
        }
    }
}

/// Top-level options object. Each section is forwarded to one collaborator
/// and merged onto that collaborator's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginOptions {
    pub theme: Option<String>,
    pub client_root: Option<PathBuf>,
    pub vue: VueOverrides,
    pub markdown: MarkdownOverrides,
    pub components: ComponentsOverrides,
    pub icons: IconsOverrides,
    pub remote_assets: RemoteAssetsOverrides,
    pub windicss: WindiOverrides,
}

impl PluginOptions {
    /// Load overrides from a `.json`, `.yaml` or `.yml` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(SlidevError::FileReadError)?;
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "json" => serde_json::from_str(&content).map_err(|e| {
                SlidevError::ConfigError(format!("Invalid options file {:?}: {}", path, e))
            }),
            "yaml" | "yml" => serde_yaml_ng::from_str(&content).map_err(|e| {
                SlidevError::ConfigError(format!("Invalid options file {:?}: {}", path, e))
            }),
            _ => Err(SlidevError::ConfigError(format!(
                "Unsupported options file format: {:?}",
                path
            ))),
        }
    }

    /// Merge every override section onto its defaults for the given layout
    pub fn resolve(&self, layout: &ProjectLayout) -> ResolvedOptions {
        ResolvedOptions {
            vue: self.vue.merge(VueOptions::default()),
            markdown: self.markdown.merge(MarkdownOptions::default()),
            components: self.components.merge(ComponentsOptions::for_layout(layout)),
            icons: self.icons.merge(IconsOptions::default()),
            remote_assets: self
                .remote_assets
                .merge(RemoteAssetsOptions::for_layout(layout)),
            windicss: self.windicss.merge(WindiOptions::for_layout(layout)),
        }
    }
}

/// Options after defaults have been applied
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub vue: VueOptions,
    pub markdown: MarkdownOptions,
    pub components: ComponentsOptions,
    pub icons: IconsOptions,
    pub remote_assets: RemoteAssetsOptions,
    pub windicss: WindiOptions,
}

// A present override field replaces the default field wholesale.
fn pick<T: Clone>(over: &Option<T>, default: T) -> T {
    over.clone().unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct VueOptions {
    /// Extensions compiled as components
    pub include: Vec<String>,
}

impl Default for VueOptions {
    fn default() -> Self {
        Self {
            include: vec!["vue".to_string(), "md".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VueOverrides {
    pub include: Option<Vec<String>>,
}

impl VueOverrides {
    fn merge(&self, d: VueOptions) -> VueOptions {
        VueOptions {
            include: pick(&self.include, d.include),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarkdownOptions {
    pub wrapper_classes: String,
    pub head_enabled: bool,
    pub html: bool,
    pub linkify: bool,
    pub highlight: bool,
    pub monaco: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            wrapper_classes: String::new(),
            head_enabled: true,
            html: true,
            linkify: true,
            highlight: true,
            monaco: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkdownOverrides {
    pub wrapper_classes: Option<String>,
    pub head_enabled: Option<bool>,
    pub html: Option<bool>,
    pub linkify: Option<bool>,
    pub highlight: Option<bool>,
    pub monaco: Option<bool>,
}

impl MarkdownOverrides {
    fn merge(&self, d: MarkdownOptions) -> MarkdownOptions {
        MarkdownOptions {
            wrapper_classes: pick(&self.wrapper_classes, d.wrapper_classes),
            head_enabled: pick(&self.head_enabled, d.head_enabled),
            html: pick(&self.html, d.html),
            linkify: pick(&self.linkify, d.linkify),
            highlight: pick(&self.highlight, d.highlight),
            monaco: pick(&self.monaco, d.monaco),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentsOptions {
    pub extensions: Vec<String>,
    /// Search directories, highest precedence first. Relative entries are
    /// tried against the consuming file's directory, then the deck root.
    pub dirs: Vec<PathBuf>,
    pub deep: bool,
}

impl ComponentsOptions {
    pub fn for_layout(layout: &ProjectLayout) -> Self {
        Self {
            extensions: vec!["vue".to_string(), "md".to_string(), "ts".to_string()],
            dirs: vec![
                PathBuf::from("components"),
                PathBuf::from("src/components"),
                layout.theme_root.join("components"),
                layout.client_root.join("components"),
                layout.client_root.join("builtin"),
            ],
            deep: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComponentsOverrides {
    pub extensions: Option<Vec<String>>,
    pub dirs: Option<Vec<PathBuf>>,
    pub deep: Option<bool>,
}

impl ComponentsOverrides {
    fn merge(&self, d: ComponentsOptions) -> ComponentsOptions {
        ComponentsOptions {
            extensions: pick(&self.extensions, d.extensions),
            dirs: pick(&self.dirs, d.dirs),
            deep: pick(&self.deep, d.deep),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IconsOptions {
    /// Tag prefix marking an icon (`<IconFoo/>` with prefix `icon`)
    pub prefix: String,
    /// Collection used when a prefixed tag names no known collection
    pub default_collection: String,
    pub collections: Vec<String>,
}

impl Default for IconsOptions {
    fn default() -> Self {
        let collections = [
            "bi",
            "bx",
            "carbon",
            "emojione",
            "fa",
            "fa-brands",
            "fa-solid",
            "fluent",
            "heroicons",
            "ic",
            "la",
            "logos",
            "lucide",
            "material-symbols",
            "mdi",
            "noto",
            "octicon",
            "ph",
            "ri",
            "simple-icons",
            "tabler",
            "twemoji",
            "uil",
            "vscode-icons",
        ];
        Self {
            prefix: "icon".to_string(),
            default_collection: "carbon".to_string(),
            collections: collections.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IconsOverrides {
    pub prefix: Option<String>,
    pub default_collection: Option<String>,
    pub collections: Option<Vec<String>>,
}

impl IconsOverrides {
    fn merge(&self, d: IconsOptions) -> IconsOptions {
        IconsOptions {
            prefix: pick(&self.prefix, d.prefix),
            default_collection: pick(&self.default_collection, d.default_collection),
            collections: pick(&self.collections, d.collections),
        }
    }
}

pub const DEFAULT_REMOTE_ASSET_PATTERN: &str = r#"https?://[^\s'"`()<>?#]+\.(?:png|jpe?g|gif|svg|webp|avif|ico|mp4|webm|ogg|mp3|wav|woff2?|ttf|otf)\b(?:[?#][^\s'"`()<>]*)?"#;

#[derive(Debug, Clone)]
pub struct RemoteAssetsOptions {
    pub enabled: bool,
    pub patterns: Vec<String>,
    pub cache_dir: PathBuf,
    pub timeout_secs: u64,
    pub retries: u32,
}

impl RemoteAssetsOptions {
    pub fn for_layout(layout: &ProjectLayout) -> Self {
        Self {
            enabled: true,
            patterns: vec![DEFAULT_REMOTE_ASSET_PATTERN.to_string()],
            cache_dir: layout.deck_root.join(".slidev").join("remote-assets"),
            timeout_secs: 10,
            retries: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteAssetsOverrides {
    pub enabled: Option<bool>,
    pub patterns: Option<Vec<String>>,
    pub cache_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
}

impl RemoteAssetsOverrides {
    fn merge(&self, d: RemoteAssetsOptions) -> RemoteAssetsOptions {
        RemoteAssetsOptions {
            enabled: pick(&self.enabled, d.enabled),
            patterns: pick(&self.patterns, d.patterns),
            cache_dir: pick(&self.cache_dir, d.cache_dir),
            timeout_secs: pick(&self.timeout_secs, d.timeout_secs),
            retries: pick(&self.retries, d.retries),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WindiOptions {
    /// Glob patterns, relative to the deck root, of files to scan
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Theme and client directories scanned even though they sit in `node_modules`
    pub scan_dirs: Vec<PathBuf>,
    /// `windi.config.json` files merged in order; later files win
    pub config_files: Vec<PathBuf>,
}

impl WindiOptions {
    pub fn for_layout(layout: &ProjectLayout) -> Self {
        Self {
            include: ["**/*.md", "**/*.vue", "**/*.html", "**/*.ts", "**/*.tsx"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude: [".git/**", "node_modules/**", "dist/**", ".slidev/**"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            scan_dirs: vec![
                layout.theme_root.join("components"),
                layout.theme_root.join("layouts"),
                layout.client_root.join("builtin"),
                layout.client_root.join("components"),
                layout.client_root.join("layouts"),
            ],
            config_files: vec![
                layout.client_root.join("windi.config.json"),
                layout.theme_root.join("windi.config.json"),
                layout.deck_root.join("windi.config.json"),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WindiOverrides {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub scan_dirs: Option<Vec<PathBuf>>,
    pub config_files: Option<Vec<PathBuf>>,
}

impl WindiOverrides {
    fn merge(&self, d: WindiOptions) -> WindiOptions {
        WindiOptions {
            include: pick(&self.include, d.include),
            exclude: pick(&self.exclude, d.exclude),
            scan_dirs: pick(&self.scan_dirs, d.scan_dirs),
            config_files: pick(&self.config_files, d.config_files),
        }
    }
}
