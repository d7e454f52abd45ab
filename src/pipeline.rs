// ABOUTME: Pipeline assembly for the slidev build
// ABOUTME: Composes every transform and provider in fixed order and drives transforms and full builds

use crate::components::{
    factory, ComponentImporter, ComponentResolver, FactoryResolver, IconResolver,
};
use crate::config::{PluginOptions, ResolvedOptions};
use crate::deck::SlideDeckState;
use crate::errors::{Degradation, Result, SlidevError};
use crate::escape::EscapePostProcessor;
use crate::layout::{self, ProjectLayout};
use crate::markdown::MarkdownCompiler;
use crate::remote_assets::{AssetCache, HttpAssetCache, RemoteAssetRewriter};
use crate::server_ref::ServerRef;
use crate::unit::{FileKind, TransformUnit};
use crate::utils;
use crate::virtual_modules::{VirtualModuleId, VirtualModuleProviders};
use crate::windicss::UtilityStyleCompiler;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// One stage of the pipeline. The order of `Pipeline::plugins` is fixed.
pub enum Plugin {
    Markdown(MarkdownCompiler),
    Escape(EscapePostProcessor),
    Components(ComponentImporter),
    UtilityStyles(Arc<UtilityStyleCompiler>),
    RemoteAssets(RemoteAssetRewriter),
    VirtualModules(VirtualModuleProviders),
}

impl Plugin {
    pub fn name(&self) -> &'static str {
        match self {
            Plugin::Markdown(_) => "slidev:markdown",
            Plugin::Escape(_) => "slidev:escape",
            Plugin::Components(_) => "slidev:components",
            Plugin::UtilityStyles(_) => "slidev:windicss",
            Plugin::RemoteAssets(_) => "slidev:remote-assets",
            Plugin::VirtualModules(_) => "slidev:virtual-modules",
        }
    }
}

/// Result of a versioned transform
#[derive(Debug)]
pub enum TransformOutcome {
    Emitted(TransformUnit),
    /// A newer version of the file was submitted; this result was discarded
    Superseded,
}

/// When a run's utility tokens reach the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Commit {
    Always,
    /// Only while `version` is still the latest for the file
    IfCurrent(u64),
    Never,
}

/// Assembles a `Pipeline` from an entry file and options
pub struct PipelineBuilder {
    entry: PathBuf,
    theme: Option<String>,
    client_root: Option<PathBuf>,
    options: PluginOptions,
    resolvers: Vec<Arc<dyn ComponentResolver>>,
    asset_cache: Option<Arc<dyn AssetCache>>,
    server_ref: Option<Arc<ServerRef>>,
}

impl PipelineBuilder {
    pub fn new(entry: impl Into<PathBuf>) -> Self {
        Self {
            entry: entry.into(),
            theme: None,
            client_root: None,
            options: PluginOptions::default(),
            resolvers: Vec::new(),
            asset_cache: None,
            server_ref: None,
        }
    }

    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn client_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_root = Some(path.into());
        self
    }

    pub fn options(mut self, options: PluginOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a custom component resolver, tried after directory search and
    /// after the icon and element factory resolvers
    pub fn resolver(mut self, resolver: Arc<dyn ComponentResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn asset_cache(mut self, cache: Arc<dyn AssetCache>) -> Self {
        self.asset_cache = Some(cache);
        self
    }

    /// Share session state with the pipeline. Without one the pipeline
    /// creates its own, unsynced and scoped to its lifetime.
    pub fn server_ref(mut self, server_ref: Arc<ServerRef>) -> Self {
        self.server_ref = Some(server_ref);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let explicit_theme = self.theme.clone().or_else(|| self.options.theme.clone());
        let client_root = self
            .client_root
            .clone()
            .or_else(|| self.options.client_root.clone());

        let layout = layout::resolve_layout(
            &self.entry,
            explicit_theme.as_deref(),
            client_root.as_deref(),
        )?;
        let options = self.options.resolve(&layout);

        let mut resolvers: Vec<Arc<dyn ComponentResolver>> = vec![
            Arc::new(IconResolver::new(&options.icons)),
            Arc::new(FactoryResolver::new()),
        ];
        resolvers.extend(self.resolvers);

        let utility = Arc::new(UtilityStyleCompiler::new(&options.windicss, &layout.deck_root)?);
        let asset_cache = self
            .asset_cache
            .unwrap_or_else(|| Arc::new(HttpAssetCache::new(&options.remote_assets)));

        let plugins = vec![
            Plugin::Markdown(MarkdownCompiler::new(options.markdown.clone())),
            Plugin::Escape(EscapePostProcessor::new()),
            Plugin::Components(ComponentImporter::new(
                options.components.clone(),
                &layout.deck_root,
                options.vue.include.clone(),
                resolvers,
            )),
            Plugin::UtilityStyles(utility.clone()),
            Plugin::RemoteAssets(RemoteAssetRewriter::new(
                &options.remote_assets,
                &layout.deck_root,
                asset_cache,
            )?),
            Plugin::VirtualModules(VirtualModuleProviders::new(options.markdown.monaco)),
        ];

        info!(
            "Assembled pipeline: {}",
            plugins.iter().map(Plugin::name).collect::<Vec<_>>().join(" -> ")
        );

        Ok(Pipeline {
            layout,
            explicit_theme: explicit_theme.is_some(),
            options,
            plugins,
            utility,
            server_ref: self.server_ref.unwrap_or_else(|| Arc::new(ServerRef::new(false))),
            deck_state: RwLock::new(None),
            versions: Mutex::new(HashMap::new()),
        })
    }
}

/// A file that failed to compile during a full build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    pub file_id: String,
    pub message: String,
}

/// Everything a full build produced
#[derive(Debug)]
pub struct BuildOutput {
    pub units: Vec<TransformUnit>,
    pub failures: Vec<BuildFailure>,
    pub modules: BTreeMap<String, String>,
    pub stylesheet: String,
}

impl BuildOutput {
    pub fn degradations(&self) -> impl Iterator<Item = (&str, &Degradation)> {
        self.units
            .iter()
            .flat_map(|u| u.degradations.iter().map(move |d| (u.file_id.as_str(), d)))
    }

    /// Write units, virtual modules and the stylesheet under `dir`
    pub fn write_to(&self, dir: &Path, deck_root: &Path) -> Result<Vec<PathBuf>> {
        utils::validate_directory_writable(dir)?;
        let mut written = Vec::new();

        for unit in &self.units {
            let mut path = dir.join(output_path(&unit.file_id, deck_root));
            if unit.from_markdown {
                path = append_extension(&path, "vue");
            }
            write_file(&path, &unit.code)?;
            written.push(path);
        }
        for failure in &self.failures {
            let path = append_extension(&dir.join(output_path(&failure.file_id, deck_root)), "error");
            write_file(&path, &failure.message)?;
            written.push(path);
        }
        for (id, code) in &self.modules {
            let name = VirtualModuleId::parse(id)
                .map(|m| m.output_name())
                .unwrap_or_else(|| id.trim_start_matches('/').replace('/', "_"));
            let path = dir.join("modules").join(name);
            write_file(&path, code)?;
            written.push(path);
        }
        let css = dir.join("windi.css");
        write_file(&css, &self.stylesheet)?;
        written.push(css);

        Ok(written)
    }
}

fn output_path(file_id: &str, deck_root: &Path) -> PathBuf {
    if let Some(VirtualModuleId::Slide(no)) = VirtualModuleId::parse(file_id) {
        return PathBuf::from("slides").join(format!("{}.md", no));
    }
    let path = Path::new(file_id);
    match path.strip_prefix(deck_root) {
        Ok(rel) => PathBuf::from("files").join(rel),
        Err(_) => PathBuf::from("files").join(file_id.trim_start_matches('/')),
    }
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    utils::ensure_parent_directory_exists(path)?;
    fs::write(path, content).map_err(SlidevError::FileReadError)
}

/// The assembled pipeline for one deck
pub struct Pipeline {
    layout: ProjectLayout,
    explicit_theme: bool,
    options: ResolvedOptions,
    plugins: Vec<Plugin>,
    utility: Arc<UtilityStyleCompiler>,
    server_ref: Arc<ServerRef>,
    deck_state: RwLock<Option<Arc<SlideDeckState>>>,
    /// Latest submitted version per file id
    versions: Mutex<HashMap<String, u64>>,
}

impl Pipeline {
    pub fn builder(entry: impl Into<PathBuf>) -> PipelineBuilder {
        PipelineBuilder::new(entry)
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn utility_styles(&self) -> &UtilityStyleCompiler {
        &self.utility
    }

    pub fn server_ref(&self) -> &Arc<ServerRef> {
        &self.server_ref
    }

    /// Whether the deck now declares a different theme, so the layout and
    /// pipeline must be assembled again
    pub fn needs_reassembly(&self) -> Result<bool> {
        if self.explicit_theme {
            return Ok(false);
        }
        let declared = layout::declared_theme(&self.layout.entry)?;
        Ok(self.layout.theme_changed(declared.as_deref()))
    }

    /// Whether any of `changed` requires a fresh pipeline: the declared theme
    /// moved, or a utility config file was edited
    pub fn needs_reassembly_for(&self, changed: &[PathBuf]) -> Result<bool> {
        let config_files = &self.options.windicss.config_files;
        if changed.iter().any(|p| config_files.contains(p)) {
            debug!("Utility config changed");
            return Ok(true);
        }
        self.needs_reassembly()
    }

    /// Current deck state, read from disk on first use after invalidation
    pub fn deck_state(&self) -> Result<Arc<SlideDeckState>> {
        if let Some(state) = self.deck_state.read().as_ref() {
            return Ok(state.clone());
        }
        let state = Arc::new(SlideDeckState::load(&self.layout)?);
        *self.deck_state.write() = Some(state.clone());
        Ok(state)
    }

    /// Forget cached deck state and component directory listings
    pub fn invalidate(&self) {
        debug!("Invalidating cached deck state");
        *self.deck_state.write() = None;
        for plugin in &self.plugins {
            if let Plugin::Components(importer) = plugin {
                importer.invalidate();
            }
        }
    }

    fn providers(&self) -> Option<&VirtualModuleProviders> {
        self.plugins.iter().find_map(|p| match p {
            Plugin::VirtualModules(providers) => Some(providers),
            _ => None,
        })
    }

    /// Canonical id for a virtual module import, `None` for real files
    pub fn resolve_id(&self, id: &str) -> Option<String> {
        VirtualModuleId::parse(id).map(|m| m.as_string())
    }

    /// Serve a virtual module. `Ok(None)` means the id is not virtual.
    pub fn load(&self, id: &str) -> Result<Option<String>> {
        let module = match VirtualModuleId::parse(id) {
            Some(module) => module,
            None => return Ok(None),
        };
        match module {
            VirtualModuleId::WindiCss => Ok(Some(self.utility.stylesheet())),
            VirtualModuleId::ServerRefState => Ok(Some(self.server_ref.module_code())),
            VirtualModuleId::Factory(element) => Ok(Some(factory::module_code(element))),
            _ => {
                let providers = self.providers().ok_or_else(|| {
                    SlidevError::resolution(id, "no virtual module provider in the pipeline")
                })?;
                let state = self.deck_state()?;
                providers.provide(module, &state)
            }
        }
    }

    /// Run one file through the pipeline and commit its utility tokens
    pub fn transform(&self, file_id: &str, source: &str) -> Result<TransformUnit> {
        self.run(file_id, source, Commit::Always).map(|outcome| match outcome {
            TransformOutcome::Emitted(unit) => unit,
            // Unversioned runs always emit
            TransformOutcome::Superseded => TransformUnit::new(file_id, source),
        })
    }

    /// Run one file through the pipeline without touching the utility
    /// accumulator
    pub fn preview(&self, file_id: &str, source: &str) -> Result<TransformUnit> {
        self.run(file_id, source, Commit::Never).map(|outcome| match outcome {
            TransformOutcome::Emitted(unit) => unit,
            TransformOutcome::Superseded => TransformUnit::new(file_id, source),
        })
    }

    /// Run one version of a file. If a newer version of the same file id is
    /// submitted before this one finishes, the result is discarded.
    pub fn transform_version(
        &self,
        file_id: &str,
        version: u64,
        source: &str,
    ) -> Result<TransformOutcome> {
        {
            let mut versions = self.versions.lock();
            let latest = versions.entry(file_id.to_string()).or_insert(version);
            if version < *latest {
                debug!("Skipping stale version {} of {}", version, file_id);
                return Ok(TransformOutcome::Superseded);
            }
            *latest = version;
        }
        self.run(file_id, source, Commit::IfCurrent(version))
    }

    fn run(&self, file_id: &str, source: &str, commit: Commit) -> Result<TransformOutcome> {
        let mut unit = TransformUnit::new(file_id, source);
        let mut scan = None;

        for plugin in &self.plugins {
            match plugin {
                Plugin::Markdown(compiler) => {
                    if unit.kind == FileKind::DeckMarkdown {
                        unit.code = compiler.compile(file_id, &unit.code)?;
                        unit.kind = FileKind::Script;
                        unit.from_markdown = true;
                    }
                }
                Plugin::Escape(escape) => escape.apply(&mut unit),
                Plugin::Components(importer) => importer.apply(&mut unit),
                Plugin::UtilityStyles(utility) => {
                    if utility.matches(file_id) {
                        let mut guard = utility.begin_scan(file_id);
                        guard.record(&unit.code);
                        scan = Some(guard);
                    }
                }
                Plugin::RemoteAssets(rewriter) => rewriter.apply(&mut unit),
                Plugin::VirtualModules(_) => {}
            }
        }

        // Hold the version lock while committing so a newer version cannot
        // slip in between the check and the commit
        let versions = self.versions.lock();
        match commit {
            Commit::Never => {}
            Commit::Always => {
                if let Some(guard) = scan {
                    guard.commit();
                }
            }
            Commit::IfCurrent(v) => {
                if versions.get(file_id) != Some(&v) {
                    debug!("Discarding superseded result for {}", file_id);
                    return Ok(TransformOutcome::Superseded);
                }
                if let Some(guard) = scan {
                    guard.commit();
                }
            }
        }
        drop(versions);

        Ok(TransformOutcome::Emitted(unit))
    }

    /// Files outside the deck entry that the utility scan covers
    fn scanned_files(&self) -> Vec<PathBuf> {
        self.utility
            .matched_files()
            .into_iter()
            .filter(|p| p != &self.layout.entry)
            .collect()
    }

    /// Reset the utility accumulator, transform every slide and matched file
    /// concurrently, then load every virtual module and emit the stylesheet.
    ///
    /// A deck that fails to compile is recorded as a failure; the other
    /// matched files still build.
    pub fn full_build(&self) -> Result<BuildOutput> {
        info!("Starting full build of {:?}", self.layout.entry);
        self.invalidate();
        self.utility.begin_full_build();

        let mut failures = Vec::new();
        let state = match self.deck_state() {
            Ok(state) => Some(state),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("{}", e);
                failures.push(BuildFailure {
                    file_id: self.layout.entry.to_string_lossy().to_string(),
                    message: e.to_string(),
                });
                None
            }
        };

        let mut jobs: Vec<(String, std::result::Result<String, String>)> = Vec::new();
        if let Some(state) = &state {
            for (no, slide) in state.visible_slides() {
                let id = VirtualModuleId::Slide(no).as_string();
                let markdown = slide.markdown(&id)?;
                jobs.push((id, Ok(markdown)));
            }
        }
        for path in self.scanned_files() {
            let id = path.to_string_lossy().to_string();
            let content = fs::read_to_string(&path).map_err(|e| e.to_string());
            jobs.push((id, content));
        }

        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .max(1);
        let chunk_size = jobs.len().div_ceil(workers).max(1);

        let results: Vec<(String, Result<TransformUnit>)> = thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .chunks(chunk_size)
                .map(|chunk| {
                    let handle = scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|(id, content)| {
                                let result = match content {
                                    Ok(source) => self.transform(id, source),
                                    Err(e) => Err(SlidevError::compile(id.as_str(), e.as_str())),
                                };
                                (id.clone(), result)
                            })
                            .collect::<Vec<_>>()
                    });
                    (chunk, handle)
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|(chunk, handle)| match handle.join() {
                    Ok(results) => results,
                    Err(_) => {
                        error!("A build worker panicked on {} files", chunk.len());
                        chunk
                            .iter()
                            .map(|(id, _)| {
                                let e = SlidevError::compile(id.as_str(), "build worker panicked");
                                (id.clone(), Err(e))
                            })
                            .collect()
                    }
                })
                .collect()
        });

        let mut units = Vec::new();
        for (file_id, result) in results {
            match result {
                Ok(unit) => units.push(unit),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("{}", e);
                    failures.push(BuildFailure {
                        file_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut modules = BTreeMap::new();
        if state.is_some() {
            for module in VirtualModuleId::DECK_MODULES {
                let id = module.as_string();
                if let Some(code) = self.load(&id)? {
                    modules.insert(id, code);
                }
            }
        }
        for &element in factory::ELEMENTS {
            let module = VirtualModuleId::Factory(element);
            let id = module.as_string();
            let quoted = format!("'{}'", id);
            if units.iter().any(|u| u.code.contains(&quoted)) {
                modules.insert(id, factory::module_code(element));
            }
        }
        let server_ref_id = VirtualModuleId::ServerRefState.as_string();
        modules.insert(server_ref_id, self.server_ref.module_code());

        let stylesheet = self.utility.stylesheet();

        info!(
            "Full build finished: {} units, {} failures, {} modules, {} utility tokens",
            units.len(),
            failures.len(),
            modules.len(),
            self.utility.tokens().len()
        );

        Ok(BuildOutput {
            units,
            failures,
            modules,
            stylesheet,
        })
    }
}
