// ABOUTME: Utility style compiler for the slidev pipeline
// ABOUTME: Accumulates utility class tokens across every scanned file and emits one stylesheet

pub mod rules;

use crate::config::WindiOptions;
use crate::errors::Result;
use crate::utils;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub use rules::{RuleGenerator, UtilityRule};

static CLASS_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:class|className)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// Shape of a `windi.config.json` file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WindiConfigFile {
    pub shortcuts: BTreeMap<String, String>,
    pub theme: WindiTheme,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WindiTheme {
    pub colors: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct Accumulator {
    generation: u64,
    /// token -> ids of the files it was seen in
    tokens: BTreeMap<String, BTreeSet<String>>,
}

/// Scans files for utility classes and compiles the observed ones.
///
/// Appends are serialized through the accumulator lock. Emission waits until
/// every in-flight scan has committed or been dropped.
pub struct UtilityStyleCompiler {
    root: PathBuf,
    /// Extra directories scanned with the same globs, even under `node_modules`
    scan_dirs: Vec<PathBuf>,
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
    generator: RuleGenerator,
    accumulator: Mutex<Accumulator>,
    in_flight: Mutex<usize>,
    idle: Condvar,
}

impl UtilityStyleCompiler {
    pub fn new(options: &WindiOptions, root: &Path) -> Result<Self> {
        let include = options
            .include
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let exclude = options
            .exclude
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            root: root.to_path_buf(),
            scan_dirs: options.scan_dirs.clone(),
            include,
            exclude,
            generator: load_generator(&options.config_files),
            accumulator: Mutex::new(Accumulator::default()),
            in_flight: Mutex::new(0),
            idle: Condvar::new(),
        })
    }

    /// Whether a file id falls inside the configured glob set
    pub fn matches(&self, file_id: &str) -> bool {
        let path = Path::new(file_id.split('?').next().unwrap_or(file_id));

        // Scan dirs are matched relative to themselves, so a theme inside
        // `node_modules` is not caught by the deck-level excludes
        if let Some(rel) = self
            .scan_dirs
            .iter()
            .find_map(|dir| path.strip_prefix(dir).ok())
        {
            return self.matches_relative(&utils::slash_path(rel));
        }

        let relative = match path.strip_prefix(&self.root) {
            Ok(rel) => utils::slash_path(rel),
            Err(_) => utils::slash_path(path).trim_start_matches('/').to_string(),
        };
        self.matches_relative(&relative)
    }

    fn matches_relative(&self, relative: &str) -> bool {
        self.include.iter().any(|p| p.matches(relative))
            && !self.exclude.iter().any(|p| p.matches(relative))
    }

    /// Files under the root and the scan dirs matched by the glob set, sorted
    pub fn matched_files(&self) -> Vec<PathBuf> {
        let mut files = BTreeSet::new();
        for dir in std::iter::once(&self.root).chain(self.scan_dirs.iter()) {
            if !dir.is_dir() {
                continue;
            }
            let base = glob::Pattern::escape(&dir.to_string_lossy());
            for pattern in &self.include {
                let full = format!("{}/{}", base, pattern.as_str());
                match glob::glob(&full) {
                    Ok(paths) => files.extend(
                        paths
                            .flatten()
                            .filter(|p| p.is_file())
                            .filter(|p| self.matches(&p.to_string_lossy())),
                    ),
                    Err(e) => warn!("Invalid scan pattern {}: {}", full, e),
                }
            }
        }
        files.into_iter().collect()
    }

    /// Utility tokens used in class attributes of `code`
    pub fn extract(&self, code: &str) -> BTreeSet<String> {
        let mut tokens = BTreeSet::new();
        for caps in CLASS_ATTR_RE.captures_iter(code) {
            let value = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            for candidate in value.split(|c: char| {
                !(c.is_ascii_alphanumeric() || "-_:/.!%".contains(c))
            }) {
                if !candidate.is_empty() && self.generator.generate(candidate).is_some() {
                    tokens.insert(candidate.to_string());
                }
            }
        }
        tokens
    }

    /// Start a scan. The returned guard must be committed for its tokens to
    /// reach the accumulator.
    pub fn begin_scan(&self, file_id: &str) -> ScanGuard<'_> {
        *self.in_flight.lock() += 1;
        let generation = self.accumulator.lock().generation;
        ScanGuard {
            compiler: self,
            file_id: file_id.to_string(),
            generation,
            tokens: BTreeSet::new(),
        }
    }

    /// Scan and commit in one step
    pub fn scan(&self, file_id: &str, code: &str) {
        let mut guard = self.begin_scan(file_id);
        guard.record(code);
        guard.commit();
    }

    fn wait_idle(&self) -> parking_lot::MutexGuard<'_, usize> {
        let mut in_flight = self.in_flight.lock();
        while *in_flight > 0 {
            self.idle.wait(&mut in_flight);
        }
        in_flight
    }

    /// Reset the accumulator for a new full build
    pub fn begin_full_build(&self) -> u64 {
        // Holding the in-flight lock keeps new scans out until the reset is done
        let _idle = self.wait_idle();
        let mut acc = self.accumulator.lock();
        acc.generation += 1;
        acc.tokens.clear();
        info!("Utility styles reset (generation {})", acc.generation);
        acc.generation
    }

    pub fn generation(&self) -> u64 {
        self.accumulator.lock().generation
    }

    /// Tokens accumulated so far
    pub fn tokens(&self) -> Vec<String> {
        self.accumulator.lock().tokens.keys().cloned().collect()
    }

    /// Emit the stylesheet for every accumulated token
    pub fn stylesheet(&self) -> String {
        let _idle = self.wait_idle();
        let acc = self.accumulator.lock();

        let mut rules: Vec<UtilityRule> = acc
            .tokens
            .keys()
            .filter_map(|t| self.generator.generate(t))
            .collect();
        rules.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.token.cmp(&b.token)));

        let mut css = String::from("/* windicss utilities */\n");
        let mut open_media: Option<&str> = None;
        for rule in &rules {
            if rule.media != open_media {
                if open_media.is_some() {
                    css.push_str("}\n");
                }
                if let Some(media) = rule.media {
                    css.push_str(&format!("@media {} {{\n", media));
                }
                open_media = rule.media;
            }
            css.push_str(&rule.to_css());
        }
        if open_media.is_some() {
            css.push_str("}\n");
        }
        debug!("Emitted {} utility rules", rules.len());
        css
    }

    fn commit(&self, guard: &ScanGuard<'_>) {
        let mut acc = self.accumulator.lock();
        if acc.generation != guard.generation {
            debug!("Dropping stale scan of {}", guard.file_id);
            return;
        }
        for token in &guard.tokens {
            acc.tokens
                .entry(token.clone())
                .or_default()
                .insert(guard.file_id.clone());
        }
    }
}

/// An in-flight scan of one file
pub struct ScanGuard<'a> {
    compiler: &'a UtilityStyleCompiler,
    file_id: String,
    generation: u64,
    tokens: BTreeSet<String>,
}

impl<'a> ScanGuard<'a> {
    pub fn record(&mut self, code: &str) {
        let found = self.compiler.extract(code);
        self.tokens.extend(found);
    }

    /// Append the recorded tokens to the accumulator
    pub fn commit(self) {
        self.compiler.commit(&self);
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.compiler.in_flight.lock();
        *in_flight -= 1;
        if *in_flight == 0 {
            self.compiler.idle.notify_all();
        }
    }
}

fn load_generator(config_files: &[PathBuf]) -> RuleGenerator {
    let mut shortcuts = BTreeMap::new();
    let mut colors = BTreeMap::new();

    for path in config_files.iter().filter(|p| p.is_file()) {
        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|c| serde_json::from_str::<WindiConfigFile>(&c).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => {
                debug!("Loaded utility config {:?}", path);
                shortcuts.extend(config.shortcuts);
                colors.extend(config.theme.colors);
            }
            Err(e) => warn!("Skipping utility config {:?}: {}", path, e),
        }
    }
    RuleGenerator::new(shortcuts, colors)
}
