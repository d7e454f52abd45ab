// ABOUTME: Transform unit types for the slidev pipeline
// ABOUTME: Describes one file travelling through the transform chain

use crate::errors::Degradation;
use std::path::{Path, PathBuf};

/// How a file is routed through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    DeckMarkdown,
    Script,
    Style,
    Other,
}

impl FileKind {
    /// Classify a file id by its extension, ignoring any query string
    pub fn from_id(id: &str) -> Self {
        let path = id.split('?').next().unwrap_or(id);
        let ext = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "md" | "markdown" => FileKind::DeckMarkdown,
            "vue" | "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => FileKind::Script,
            "css" | "scss" | "sass" | "less" | "postcss" | "styl" => FileKind::Style,
            _ => FileKind::Other,
        }
    }
}

/// One file's trip through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct TransformUnit {
    pub file_id: String,
    pub kind: FileKind,
    pub source_text: String,
    pub code: String,
    pub source_map: Option<String>,
    /// Set once the markdown compiler produced `code`
    pub from_markdown: bool,
    pub degradations: Vec<Degradation>,
}

impl TransformUnit {
    pub fn new(file_id: &str, source_text: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            kind: FileKind::from_id(file_id),
            source_text: source_text.to_string(),
            code: source_text.to_string(),
            source_map: None,
            from_markdown: false,
            degradations: Vec::new(),
        }
    }

    /// Extension of the file id, lowercased
    pub fn extension(&self) -> String {
        let path = self.file_id.split('?').next().unwrap_or(&self.file_id);
        Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// Directory of the file on disk, when the id is a real path
    pub fn directory(&self) -> Option<PathBuf> {
        let path = Path::new(self.file_id.split('?').next().unwrap_or(&self.file_id));
        if path.is_absolute() {
            path.parent().map(Path::to_path_buf)
        } else {
            None
        }
    }
}
