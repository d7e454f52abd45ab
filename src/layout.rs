// ABOUTME: Project layout resolution for the slidev pipeline
// ABOUTME: Derives deck, theme and client runtime directories from the deck location

use crate::deck;
use crate::errors::{Result, SlidevError};
use crate::utils;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_THEME: &str = "default";
const CLIENT_PACKAGE: &str = "node_modules/@slidev/client";

/// Where the deck, its theme and the shared client runtime live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    /// Absolute path to the deck markdown file
    pub entry: PathBuf,
    pub deck_root: PathBuf,
    /// Theme name or path as declared
    pub theme: String,
    pub theme_root: PathBuf,
    pub client_root: PathBuf,
}

impl ProjectLayout {
    /// Whether `declared` names a different theme than the one this layout
    /// was resolved for.
    pub fn theme_changed(&self, declared: Option<&str>) -> bool {
        declared.unwrap_or(DEFAULT_THEME) != self.theme
    }
}

/// Resolve the project layout for a deck.
///
/// The theme comes from `theme` when given, else from the deck headmatter,
/// else the default theme. A theme that cannot be located is fatal.
pub fn resolve_layout(
    entry: &Path,
    theme: Option<&str>,
    client_root: Option<&Path>,
) -> Result<ProjectLayout> {
    utils::validate_file_exists(entry)
        .map_err(|e| SlidevError::ConfigError(format!("Invalid deck entry: {}", e)))?;
    let entry = utils::get_absolute_path(entry)?;
    let deck_root = entry
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| SlidevError::ConfigError(format!("Deck has no parent: {:?}", entry)))?;

    let theme = match theme {
        Some(name) => name.to_string(),
        None => declared_theme(&entry)?.unwrap_or_else(|| DEFAULT_THEME.to_string()),
    };

    let theme_root = resolve_theme_root(&theme, &deck_root)?;
    let client_root = resolve_client_root(client_root, &deck_root)?;

    info!(
        "Resolved layout: deck {:?}, theme {:?} at {:?}",
        deck_root, theme, theme_root
    );

    Ok(ProjectLayout {
        entry,
        deck_root,
        theme,
        theme_root,
        client_root,
    })
}

/// Read the `theme` key from the deck headmatter, if any
pub fn declared_theme(entry: &Path) -> Result<Option<String>> {
    let content = fs::read_to_string(entry).map_err(SlidevError::FileReadError)?;
    let headmatter = deck::read_headmatter(&content)
        .map_err(|e| SlidevError::ConfigError(format!("Invalid deck headmatter: {}", e)))?;
    Ok(headmatter
        .get("theme")
        .and_then(|v| v.as_str())
        .map(str::to_string))
}

/// Package directories a theme name may live in, in lookup order
pub fn theme_candidates(theme: &str) -> Vec<PathBuf> {
    if theme.starts_with("@slidev/theme-") || theme.starts_with("slidev-theme-") {
        return vec![Path::new("node_modules").join(theme)];
    }
    vec![
        Path::new("node_modules/@slidev").join(format!("theme-{}", theme)),
        Path::new("node_modules").join(format!("slidev-theme-{}", theme)),
        Path::new("node_modules").join(theme),
    ]
}

fn is_path_like(theme: &str) -> bool {
    theme.starts_with('.') || theme.starts_with('/') || Path::new(theme).is_absolute()
}

fn resolve_theme_root(theme: &str, deck_root: &Path) -> Result<PathBuf> {
    if is_path_like(theme) {
        let path = deck_root.join(theme);
        if path.is_dir() {
            return utils::get_absolute_path(&path);
        }
        return Err(SlidevError::ConfigError(format!(
            "Theme directory not found: {:?}",
            path
        )));
    }

    for candidate in theme_candidates(theme) {
        if let Some(found) = utils::find_upwards(deck_root, &candidate) {
            if found.is_dir() {
                debug!("Theme {:?} found at {:?}", theme, found);
                return Ok(found);
            }
        }
    }

    Err(SlidevError::ConfigError(format!(
        "Theme \"{}\" could not be found from {:?}",
        theme, deck_root
    )))
}

fn resolve_client_root(explicit: Option<&Path>, deck_root: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = deck_root.join(path);
        if path.is_dir() {
            return utils::get_absolute_path(&path);
        }
        return Err(SlidevError::ConfigError(format!(
            "Client runtime directory not found: {:?}",
            path
        )));
    }

    utils::find_upwards(deck_root, Path::new(CLIENT_PACKAGE))
        .filter(|p| p.is_dir())
        .ok_or_else(|| {
            SlidevError::ConfigError(format!(
                "Client runtime {} could not be found from {:?}",
                CLIENT_PACKAGE, deck_root
            ))
        })
}
