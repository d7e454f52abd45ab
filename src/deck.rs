// ABOUTME: Slide deck parsing for the slidev pipeline
// ABOUTME: Splits a deck into slides with front matter and builds the SlideDeckState

use crate::errors::{Result, SlidevError};
use crate::layout::ProjectLayout;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// Front matter as a key-sorted JSON map
pub type Frontmatter = serde_json::Map<String, Value>;

static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t#]*$").unwrap());
// Front matter opens with a `key:` line; anything else after a separator is slide body
static FRONTMATTER_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[A-Za-z_$][\w$-]*\s*:").unwrap());
static NOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<!--([\s\S]*?)-->\s*$").unwrap());

/// One slide as written in the deck
#[derive(Debug, Clone, PartialEq)]
pub struct SlideSource {
    /// Position in the deck, counting hidden slides
    pub index: usize,
    /// First and last source line (0-based, inclusive start, exclusive end)
    pub start_line: usize,
    pub end_line: usize,
    pub raw_frontmatter: String,
    pub frontmatter: Frontmatter,
    pub content: String,
}

impl SlideSource {
    pub fn title(&self) -> Option<String> {
        if let Some(title) = self.frontmatter.get("title").and_then(Value::as_str) {
            return Some(title.to_string());
        }
        TITLE_RE
            .captures(&self.content)
            .map(|c| c[1].trim().to_string())
    }

    /// Presenter note: a trailing HTML comment
    pub fn note(&self) -> Option<String> {
        NOTE_RE
            .captures(self.content.trim_end())
            .map(|c| c[1].trim().to_string())
            .filter(|n| !n.is_empty())
    }

    pub fn is_hidden(&self) -> bool {
        ["hide", "disabled"]
            .iter()
            .any(|key| self.frontmatter.get(*key).and_then(Value::as_bool) == Some(true))
    }

    pub fn src(&self) -> Option<&str> {
        self.frontmatter.get("src").and_then(Value::as_str)
    }

    /// The slide as a standalone markdown file with its front matter re-attached
    pub fn to_markdown(&self) -> String {
        if self.raw_frontmatter.trim().is_empty() {
            self.content.clone()
        } else {
            format!("---\n{}\n---\n{}", self.raw_frontmatter, self.content)
        }
    }
}

/// A parsed deck before any external `src` files are read
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDeck {
    pub headmatter: Frontmatter,
    pub slides: Vec<SlideSource>,
}

fn is_separator(line: &str) -> bool {
    let line = line.trim_end();
    line.starts_with("---") && !line[3..].starts_with('-')
}

fn fence_marker(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let ch = trimmed.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    if len >= 3 {
        Some(&trimmed[..len])
    } else {
        None
    }
}

fn parse_yaml_map(raw: &str) -> std::result::Result<Frontmatter, String> {
    if raw.trim().is_empty() {
        return Ok(Frontmatter::new());
    }
    match serde_yaml_ng::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Frontmatter::new()),
        Ok(other) => Err(format!("front matter must be a mapping, found {}", other)),
        Err(e) => Err(e.to_string()),
    }
}

struct Block {
    start: usize,
    raw_frontmatter: Option<String>,
    body: Vec<String>,
}

impl Block {
    fn new(start: usize) -> Self {
        Self {
            start,
            raw_frontmatter: None,
            body: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.raw_frontmatter.is_none() && self.body.iter().all(|l| l.trim().is_empty())
    }
}

/// Split deck text into slides.
///
/// A `---` line outside a code fence separates slides. When the line after a
/// separator is not blank, everything up to the next `---` is that slide's
/// YAML front matter.
pub fn parse_deck(file_id: &str, text: &str) -> Result<ParsedDeck> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks: Vec<(Block, usize)> = Vec::new();
    let mut current = Block::new(0);
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if is_separator(line) {
            if i != 0 {
                let finished = std::mem::replace(&mut current, Block::new(i));
                blocks.push((finished, i));
            }

            let has_frontmatter = lines
                .get(i + 1)
                .map(|next| FRONTMATTER_KEY_RE.is_match(next))
                .unwrap_or(false);
            if has_frontmatter {
                // Without a closing `---` before the next fence the lines are body
                let close = (i + 1..lines.len())
                    .take_while(|&j| fence_marker(lines[j]).is_none())
                    .find(|&j| lines[j].trim_end() == "---");
                match close {
                    Some(close) => {
                        current.raw_frontmatter = Some(lines[i + 1..close].join("\n"));
                        i = close + 1;
                    }
                    None => i += 1,
                }
            } else {
                i += 1;
            }
            continue;
        }

        if let Some(marker) = fence_marker(line) {
            let close = (i + 1..lines.len())
                .find(|&j| lines[j].trim_start().starts_with(marker))
                .ok_or_else(|| {
                    SlidevError::compile(
                        file_id,
                        format!("unterminated code fence starting at line {}", i + 1),
                    )
                })?;
            current
                .body
                .extend(lines[i..=close].iter().map(|l| l.to_string()));
            i = close + 1;
            continue;
        }

        current.body.push(line.to_string());
        i += 1;
    }
    blocks.push((current, lines.len()));

    let mut slides = Vec::new();
    for (block, end) in blocks {
        if block.is_empty() {
            continue;
        }
        let raw = block.raw_frontmatter.unwrap_or_default();
        let frontmatter = parse_yaml_map(&raw).map_err(|e| {
            SlidevError::compile(
                file_id,
                format!("invalid front matter at line {}: {}", block.start + 1, e),
            )
        })?;
        let mut content = block.body.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        slides.push(SlideSource {
            index: slides.len(),
            start_line: block.start,
            end_line: end,
            raw_frontmatter: raw,
            frontmatter,
            content,
        });
    }

    let headmatter = slides
        .first()
        .map(|s| s.frontmatter.clone())
        .unwrap_or_default();

    debug!("Parsed {} slides from {}", slides.len(), file_id);
    Ok(ParsedDeck { headmatter, slides })
}

/// Split a single markdown file into its leading front matter and body
pub fn split_frontmatter(file_id: &str, text: &str) -> Result<(Frontmatter, String)> {
    let mut lines = text.lines();
    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return Ok((Frontmatter::new(), text.to_string())),
    }

    let rest: Vec<&str> = lines.collect();
    let close = rest
        .iter()
        .position(|l| l.trim_end() == "---")
        .ok_or_else(|| SlidevError::compile(file_id, "unterminated front matter"))?;
    let frontmatter = parse_yaml_map(&rest[..close].join("\n"))
        .map_err(|e| SlidevError::compile(file_id, format!("invalid front matter: {}", e)))?;
    let mut body = rest[close + 1..].join("\n");
    if text.ends_with('\n') {
        body.push('\n');
    }
    Ok((frontmatter, body))
}

/// Parse only the deck headmatter
pub fn read_headmatter(text: &str) -> std::result::Result<Frontmatter, String> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() || !is_separator(lines[0]) {
        return Ok(Frontmatter::new());
    }
    if !lines.get(1).map(|l| FRONTMATTER_KEY_RE.is_match(l)).unwrap_or(false) {
        return Ok(Frontmatter::new());
    }
    let close = (1..lines.len())
        .take_while(|&j| fence_marker(lines[j]).is_none())
        .find(|&j| lines[j].trim_end() == "---");
    match close {
        Some(close) => parse_yaml_map(&lines[1..close].join("\n")),
        None => Ok(Frontmatter::new()),
    }
}

/// A slide whose body lives in another file (`src:` front matter)
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalSource {
    pub path: PathBuf,
    /// `None` when the file could not be read
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeckSlide {
    pub source: SlideSource,
    pub external: Option<ExternalSource>,
}

impl DeckSlide {
    /// Markdown for this slide, reading through `src:` references
    pub fn markdown(&self, module_id: &str) -> Result<String> {
        let external = match &self.external {
            None => return Ok(self.source.to_markdown()),
            Some(external) => external,
        };
        let content = external.content.as_ref().ok_or_else(|| {
            SlidevError::resolution(
                module_id,
                format!(
                    "slide {} references missing file {:?}",
                    self.source.index + 1,
                    external.path
                ),
            )
        })?;

        // Front matter on the referencing slide wins over the imported file's
        let (mut frontmatter, body) = split_frontmatter(&external.path.to_string_lossy(), content)?;
        for (key, value) in &self.source.frontmatter {
            if key != "src" {
                frontmatter.insert(key.clone(), value.clone());
            }
        }
        if frontmatter.is_empty() {
            return Ok(body);
        }
        let yaml = serde_yaml_ng::to_string(&frontmatter)
            .map_err(|e| SlidevError::compile(module_id, e.to_string()))?;
        Ok(format!("---\n{}---\n{}", yaml, body))
    }
}

/// Everything virtual modules are derived from.
///
/// Two structurally equal states must produce byte-identical modules.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideDeckState {
    pub layout: ProjectLayout,
    pub headmatter: Frontmatter,
    pub slides: Vec<DeckSlide>,
    /// Stylesheets to import from the entry, in order
    pub styles: Vec<PathBuf>,
    /// Setup files declared or found by convention; may not exist
    pub setup_files: Vec<PathBuf>,
}

impl SlideDeckState {
    /// Read the deck entry and everything it references
    pub fn load(layout: &ProjectLayout) -> Result<Self> {
        let text = fs::read_to_string(&layout.entry).map_err(SlidevError::FileReadError)?;
        let parsed = parse_deck(&layout.entry.to_string_lossy(), &text)?;

        let slides = parsed
            .slides
            .into_iter()
            .map(|source| {
                let external = source.src().map(|src| {
                    let path = layout.deck_root.join(src);
                    let content = fs::read_to_string(&path).ok();
                    ExternalSource { path, content }
                });
                DeckSlide { source, external }
            })
            .collect();

        let styles = [
            layout.client_root.join("styles/index.css"),
            layout.theme_root.join("styles/index.css"),
            layout.deck_root.join("style.css"),
        ]
        .into_iter()
        .filter(|p| p.is_file())
        .collect();

        let mut setup_files: Vec<PathBuf> = [
            layout.theme_root.join("setup/main.ts"),
            layout.deck_root.join("setup/main.ts"),
        ]
        .into_iter()
        .filter(|p| p.is_file())
        .collect();
        if let Some(declared) = parsed.headmatter.get("setups").and_then(Value::as_array) {
            for entry in declared.iter().filter_map(Value::as_str) {
                let path = layout.deck_root.join(entry);
                if !setup_files.contains(&path) {
                    setup_files.push(path);
                }
            }
        }

        Ok(Self {
            layout: layout.clone(),
            headmatter: parsed.headmatter,
            slides,
            styles,
            setup_files,
        })
    }

    /// Slides that appear in the presentation, numbered from 1
    pub fn visible_slides(&self) -> impl Iterator<Item = (usize, &DeckSlide)> {
        self.slides
            .iter()
            .filter(|s| !s.source.is_hidden())
            .enumerate()
            .map(|(i, s)| (i + 1, s))
    }

    pub fn slide(&self, no: usize) -> Option<&DeckSlide> {
        self.visible_slides()
            .find(|(n, _)| *n == no)
            .map(|(_, s)| s)
    }
}
