// ABOUTME: Component auto-importer for the slidev pipeline
// ABOUTME: Finds used-but-undeclared component tags and injects imports for them

pub mod factory;
pub mod icons;

use crate::config::ComponentsOptions;
use crate::errors::Degradation;
use crate::unit::{FileKind, TransformUnit};
use crate::utils;
use log::{debug, warn};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use factory::FactoryResolver;
pub use icons::IconResolver;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([A-Za-z][\w-]*)").unwrap());
static SCRIPT_SETUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<script\b[^>]*\bsetup\b[^>]*>").unwrap());
static SCRIPT_BODY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<script\b[^>]*>([\s\S]*?)</script>").unwrap());
static DEFAULT_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bimport\s+([A-Za-z_$][\w$]*)").unwrap());
static NAMED_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bimport\s*(?:[A-Za-z_$][\w$]*\s*,\s*)?\{([^}]*)\}").unwrap());
static DECLARATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:const|let|var|function|class)\s+([A-Za-z_$][\w$]*)").unwrap()
});

// Tags the component compiler handles itself
const BUILTIN_TAGS: &[&str] = &[
    "Component",
    "KeepAlive",
    "Slot",
    "Suspense",
    "Teleport",
    "Template",
    "Transition",
    "TransitionGroup",
];

/// Where a tag should be imported from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentResolution {
    /// Local binding the import introduces
    pub import_specifier: String,
    pub import_path: String,
}

impl ComponentResolution {
    pub fn new(import_specifier: impl Into<String>, import_path: impl Into<String>) -> Self {
        Self {
            import_specifier: import_specifier.into(),
            import_path: import_path.into(),
        }
    }

    fn statement(&self) -> String {
        format!("import {} from '{}'", self.import_specifier, self.import_path)
    }
}

/// Maps a used tag name to an import, or declines.
pub trait ComponentResolver: Send + Sync {
    fn resolve(&self, tag: &str) -> Option<ComponentResolution>;
}

impl<F> ComponentResolver for F
where
    F: Fn(&str) -> Option<ComponentResolution> + Send + Sync,
{
    fn resolve(&self, tag: &str) -> Option<ComponentResolution> {
        self(tag)
    }
}

type DirIndex = BTreeMap<String, PathBuf>;

pub struct ComponentImporter {
    options: ComponentsOptions,
    deck_root: PathBuf,
    include: Vec<String>,
    resolvers: Vec<Arc<dyn ComponentResolver>>,
    indexes: RwLock<HashMap<PathBuf, Arc<DirIndex>>>,
}

impl ComponentImporter {
    /// `include` lists the extensions whose files are treated as components
    pub fn new(
        options: ComponentsOptions,
        deck_root: &Path,
        include: Vec<String>,
        resolvers: Vec<Arc<dyn ComponentResolver>>,
    ) -> Self {
        Self {
            options,
            deck_root: deck_root.to_path_buf(),
            include,
            resolvers,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub fn applies_to(&self, unit: &TransformUnit) -> bool {
        unit.kind == FileKind::Script && self.include.contains(&unit.extension())
    }

    /// Search directories for a file in `consumer_dir`, highest precedence first
    pub fn search_dirs(&self, consumer_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut dirs = Vec::new();

        if let Some(local) = consumer_dir.filter(|d| *d != self.deck_root.as_path()) {
            for dir in self.options.dirs.iter().filter(|d| d.is_relative()) {
                dirs.push(local.join(dir));
            }
        }
        for dir in &self.options.dirs {
            if dir.is_relative() {
                dirs.push(self.deck_root.join(dir));
            } else {
                dirs.push(dir.clone());
            }
        }
        dirs
    }

    /// Drop cached directory listings after files were added or removed
    pub fn invalidate(&self) {
        self.indexes.write().clear();
    }

    fn index(&self, dir: &Path) -> Arc<DirIndex> {
        if let Some(index) = self.indexes.read().get(dir) {
            return index.clone();
        }

        let index = Arc::new(self.scan_dir(dir));
        self.indexes.write().insert(dir.to_path_buf(), index.clone());
        index
    }

    fn scan_dir(&self, dir: &Path) -> DirIndex {
        let mut index = DirIndex::new();
        if !dir.is_dir() {
            return index;
        }

        let base = glob::Pattern::escape(&dir.to_string_lossy());
        let depth = if self.options.deep { "**/*" } else { "*" };
        for ext in &self.options.extensions {
            let pattern = format!("{}/{}.{}", base, depth, ext);
            let entries = match glob::glob(&pattern) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Invalid component pattern {}: {}", pattern, e);
                    continue;
                }
            };
            for path in entries.flatten() {
                if let Some(stem) = path.file_stem() {
                    let name = utils::to_pascal_case(&stem.to_string_lossy());
                    index.entry(name).or_insert(path);
                }
            }
        }
        debug!("Indexed {} components in {:?}", index.len(), dir);
        index
    }

    /// Resolve one tag: directories first, then custom resolvers in order
    pub fn resolve_tag(&self, tag: &str, consumer_dir: Option<&Path>) -> Option<ComponentResolution> {
        let name = utils::to_pascal_case(tag);

        for dir in self.search_dirs(consumer_dir) {
            if let Some(path) = self.index(&dir).get(&name) {
                return Some(ComponentResolution::new(name, utils::slash_path(path)));
            }
        }

        self.resolvers.iter().find_map(|r| r.resolve(tag))
    }

    /// Inject imports for every used-but-undeclared component in the unit
    pub fn apply(&self, unit: &mut TransformUnit) {
        if !self.applies_to(unit) {
            return;
        }

        let declared = declared_identifiers(&unit.code);
        let consumer_dir = unit.directory();
        let mut imports: BTreeMap<String, ComponentResolution> = BTreeMap::new();

        for tag in used_component_tags(&unit.code) {
            let name = utils::to_pascal_case(&tag);
            if declared.contains(&name) || imports.contains_key(&name) {
                continue;
            }
            match self.resolve_tag(&tag, consumer_dir.as_deref()) {
                Some(resolution) => {
                    debug!("Resolved <{}> in {} to {}", tag, unit.file_id, resolution.import_path);
                    imports.insert(name, resolution);
                }
                None => {
                    warn!("Unresolved component <{}> in {}", tag, unit.file_id);
                    unit.degradations
                        .push(Degradation::UnresolvedComponent { tag: tag.clone() });
                }
            }
        }

        if imports.is_empty() {
            return;
        }
        let statements: Vec<String> = imports.values().map(ComponentResolution::statement).collect();
        unit.code = inject_imports(&unit.code, &statements);
    }
}

fn template_section(code: &str) -> &str {
    match (code.find("<template"), code.rfind("</template>")) {
        (Some(start), Some(end)) if start < end => &code[start..end],
        _ => code,
    }
}

/// Component-looking tags used in the template, deduplicated in source order
pub fn used_component_tags(code: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for caps in TAG_RE.captures_iter(template_section(code)) {
        let tag = &caps[1];
        let is_component = tag.contains('-') || tag.chars().any(|c| c.is_ascii_uppercase());
        if !is_component || tag == "template" {
            continue;
        }
        let pascal = utils::to_pascal_case(tag);
        if BUILTIN_TAGS.contains(&pascal.as_str()) {
            continue;
        }
        if seen.insert(pascal) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn declared_identifiers(code: &str) -> BTreeSet<String> {
    let mut declared = BTreeSet::new();
    for script in SCRIPT_BODY_RE.captures_iter(code) {
        let body = &script[1];
        for caps in DEFAULT_IMPORT_RE.captures_iter(body) {
            declared.insert(caps[1].to_string());
        }
        for caps in NAMED_IMPORT_RE.captures_iter(body) {
            for spec in caps[1].split(',') {
                // `{ A as B }` binds B
                if let Some(local) = spec.split_whitespace().last() {
                    declared.insert(local.to_string());
                }
            }
        }
        for caps in DECLARATION_RE.captures_iter(body) {
            declared.insert(caps[1].to_string());
        }
    }
    declared
}

fn inject_imports(code: &str, statements: &[String]) -> String {
    let block = statements.join("\n");
    match SCRIPT_SETUP_RE.find(code) {
        Some(open) => format!(
            "{}\n{}{}",
            &code[..open.end()],
            block,
            &code[open.end()..]
        ),
        None => format!("{}\n<script setup>\n{}\n</script>\n", code.trim_end(), block),
    }
}
