use super::*;
use crate::config::{ComponentsOptions, IconsOptions, RemoteAssetsOptions, WindiOptions};
use crate::windicss::RuleGenerator;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const TWO_SLIDES: &str = "---\ntitle: Demo\n---\n\n# First\n\nHello\n\n---\n\n# Second\n\n<!-- speaker note -->\n";

/// A deck directory with the client runtime and default theme installed
struct DeckFixture {
    dir: TempDir,
}

impl DeckFixture {
    fn new(deck: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        for pkg in ["node_modules/@slidev/client", "node_modules/@slidev/theme-default"] {
            fs::create_dir_all(dir.path().join(pkg)).expect("Failed to create package dir");
        }
        fs::write(dir.path().join("slides.md"), deck).expect("Failed to write deck");
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn entry(&self) -> PathBuf {
        self.root().join("slides.md")
    }

    fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create dir");
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    fn layout(&self) -> ProjectLayout {
        resolve_layout(&self.entry(), None, None).expect("Failed to resolve layout")
    }

    fn state(&self) -> SlideDeckState {
        SlideDeckState::load(&self.layout()).expect("Failed to load deck state")
    }
}

fn compiled_unit(file_id: &str, code: &str) -> TransformUnit {
    let mut unit = TransformUnit::new(file_id, code);
    unit.kind = FileKind::Script;
    unit.from_markdown = true;
    unit
}

// ---- deck parsing ----

#[test]
fn test_parse_deck_splits_slides_with_headmatter() {
    let deck = parse_deck("slides.md", TWO_SLIDES).unwrap();

    assert_eq!(deck.slides.len(), 2);
    assert_eq!(deck.headmatter.get("title").and_then(|v| v.as_str()), Some("Demo"));
    assert_eq!(deck.slides[0].title().as_deref(), Some("Demo"));
    assert_eq!(deck.slides[1].title().as_deref(), Some("Second"));
    assert_eq!(deck.slides[1].note().as_deref(), Some("speaker note"));
    assert!(deck.slides[0].content.contains("Hello"));
}

#[test]
fn test_parse_deck_ignores_separators_inside_fences() {
    let text = "# One\n\n```yaml\n---\nkey: value\n---\n```\n\n---\n\n# Two\n";
    let deck = parse_deck("slides.md", text).unwrap();

    assert_eq!(deck.slides.len(), 2);
    assert!(deck.slides[0].content.contains("key: value"));
}

#[test]
fn test_parse_deck_hidden_slides() {
    let text = "# One\n\n---\nhide: true\n---\n\n# Hidden\n\n---\n\n# Three\n";
    let deck = parse_deck("slides.md", text).unwrap();

    assert_eq!(deck.slides.len(), 3);
    assert!(deck.slides[1].is_hidden());
    assert!(!deck.slides[2].is_hidden());
}

#[test]
fn test_parse_deck_unterminated_fence_is_compile_error() {
    let result = parse_deck("slides.md", "# One\n\n```js\nconst a = 1\n");
    assert!(matches!(result, Err(SlidevError::CompileError { .. })));
}

#[test]
fn test_parse_deck_compact_separators_split_slides() {
    let deck = parse_deck("slides.md", "# A\n---\n# B\n").unwrap();

    assert_eq!(deck.slides.len(), 2);
    assert_eq!(deck.slides[0].title().as_deref(), Some("A"));
    assert_eq!(deck.slides[1].title().as_deref(), Some("B"));
    assert!(deck.slides[1].frontmatter.is_empty());
}

#[test]
fn test_parse_deck_invalid_frontmatter_is_compile_error() {
    let result = parse_deck("slides.md", "---\ntitle: [unclosed\n---\n\n# One\n");
    match result {
        Err(SlidevError::CompileError { file, .. }) => assert_eq!(file, "slides.md"),
        other => panic!("Expected compile error, got {:?}", other),
    }
}

// ---- layout and options ----

#[test]
fn test_resolve_layout_default_theme() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    let layout = fixture.layout();

    assert_eq!(layout.theme, layout::DEFAULT_THEME);
    assert!(layout.theme_root.ends_with("node_modules/@slidev/theme-default"));
    assert!(layout.client_root.ends_with("node_modules/@slidev/client"));
    assert_eq!(layout.entry.parent(), Some(layout.deck_root.as_path()));
}

#[test]
fn test_resolve_layout_missing_theme_is_config_error() {
    let fixture = DeckFixture::new("---\ntheme: seriph\n---\n\n# One\n");
    let result = resolve_layout(&fixture.entry(), None, None);

    match result {
        Err(e @ SlidevError::ConfigError(_)) => assert!(e.is_fatal()),
        other => panic!("Expected config error, got {:?}", other),
    }
}

#[test]
fn test_resolve_layout_explicit_theme_path() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    fs::create_dir_all(fixture.root().join("my-theme")).unwrap();

    let layout = resolve_layout(&fixture.entry(), Some("./my-theme"), None).unwrap();
    assert!(layout.theme_root.ends_with("my-theme"));
    assert!(layout.theme_changed(None));
    assert!(!layout.theme_changed(Some("./my-theme")));
}

#[test]
fn test_options_merge_overrides_one_level() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    let options: PluginOptions = serde_json::from_str(
        r#"{ "markdown": { "wrapperClasses": "prose" }, "icons": { "defaultCollection": "mdi" } }"#,
    )
    .unwrap();

    let resolved = options.resolve(&fixture.layout());
    assert_eq!(resolved.markdown.wrapper_classes, "prose");
    assert!(resolved.markdown.head_enabled);
    assert_eq!(resolved.icons.default_collection, "mdi");
    assert_eq!(resolved.icons.prefix, IconsOptions::default().prefix);
    assert_eq!(resolved.vue.include, vec!["vue".to_string(), "md".to_string()]);
}

#[test]
fn test_options_from_yaml_file() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    let path = fixture.write(
        "slidev.yaml",
        "remoteAssets:\n  enabled: false\nwindicss:\n  include: ['**/*.vue']\n",
    );

    let options = PluginOptions::from_file(&path).unwrap();
    let resolved = options.resolve(&fixture.layout());
    assert!(!resolved.remote_assets.enabled);
    assert_eq!(resolved.windicss.include, vec!["**/*.vue".to_string()]);
    assert!(!resolved.windicss.exclude.is_empty());
}

#[test]
fn test_options_unsupported_file_format() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    let path = fixture.write("slidev.toml", "x = 1\n");
    assert!(matches!(
        PluginOptions::from_file(&path),
        Err(SlidevError::ConfigError(_))
    ));
}

// ---- markdown compiler and escape post-processor ----

fn compiler() -> MarkdownCompiler {
    MarkdownCompiler::new(config::MarkdownOptions::default())
}

#[test]
fn test_compile_produces_template_and_script() {
    let code = compiler()
        .compile("slide.md", "---\ntitle: Hi\nclass: text-center\n---\n\n# Hello\n")
        .unwrap();

    assert!(code.starts_with("<template>\n<div class=\"text-center\">"));
    assert!(code.contains("<h1>Hello</h1>"));
    assert!(code.contains("<script setup>"));
    assert!(code.contains("const frontmatter = {\"class\":\"text-center\",\"title\":\"Hi\"}"));
    assert!(code.contains("useHead("));
}

#[test]
fn test_compile_highlights_and_protects_code() {
    let code = compiler()
        .compile("slide.md", "```js\nconst a = { b: 1 } // {{ x }}\n```\n")
        .unwrap();

    assert!(code.contains("<pre class=\"language-js\" v-pre><code class=\"language-js\">"));
    assert!(code.contains("<span class=\"token keyword\">const</span>"));
    assert!(code.contains("\\{ b: "));
    assert!(!code.contains("= { b: "));
}

#[test]
fn test_compile_unterminated_interpolation_is_compile_error() {
    let result = compiler().compile("slide.md", "# Title\n\nValue: {{ count\n");
    assert!(matches!(result, Err(SlidevError::CompileError { .. })));
}

#[test]
fn test_compile_hoists_script_setup() {
    let source = "# Counter\n\n<Counter :start=\"1\" />\n\n<script setup lang=\"ts\">\nconst step = 2\n</script>\n\n<style>\nh1 { color: red }\n</style>\n";
    let code = compiler().compile("slide.md", source).unwrap();

    assert!(code.contains("<script setup lang=\"ts\">"));
    assert!(code.contains("const step = 2"));
    let template_end = code.find("</template>").unwrap();
    assert!(!code[..template_end].contains("const step"));
    assert!(code[template_end..].contains("<style>"));
}

#[test]
fn test_compile_monaco_fence() {
    let code = compiler()
        .compile("slide.md", "```ts {monaco}\nlet x = 1\n```\n")
        .unwrap();

    assert!(code.contains("<Monaco"));
    assert!(code.contains("lang=\"ts\""));
    assert!(!code.contains("language-ts"));
}

#[test]
fn test_escape_restores_braces_once() {
    let escape = EscapePostProcessor::new();
    let compiled = compiler()
        .compile("slide.md", "Inline `{x}` and\n\n```js\nlet o = {}\n```\n")
        .unwrap();

    let once = escape.unescape(&compiled).into_owned();
    let twice = escape.unescape(&once).into_owned();
    assert_eq!(once, twice);
    assert!(!once.contains(markdown::ESCAPED_BRACE));
    assert!(once.contains("<code v-pre>{x}</code>"));
}

#[test]
fn test_escape_only_touches_compiled_markdown() {
    let escape = EscapePostProcessor::new();
    let mut plain = TransformUnit::new("/deck/a.ts", "const re = /\\{/");
    escape.apply(&mut plain);
    assert_eq!(plain.code, "const re = /\\{/");

    let mut compiled = compiled_unit("/deck/a.md", "<code>\\{a}</code>");
    escape.apply(&mut compiled);
    assert_eq!(compiled.code, "<code>{a}</code>");
}

// ---- components and icons ----

#[test]
fn test_icon_resolver() {
    let icons = IconResolver::new(&IconsOptions::default());

    let foo = icons.resolve("IconFoo").unwrap();
    assert_eq!(foo.import_specifier, "IconFoo");
    assert_eq!(foo.import_path, "~icons/carbon/foo");

    let mdi = icons.resolve("IconMdiAccountBox").unwrap();
    assert_eq!(mdi.import_path, "~icons/mdi/account-box");

    let carbon = icons.resolve("carbon-add").unwrap();
    assert_eq!(carbon.import_specifier, "CarbonAdd");
    assert_eq!(carbon.import_path, "~icons/carbon/add");

    assert!(icons.resolve("MyButton").is_none());
    assert!(icons.resolve("Icon").is_none());
}

fn importer(root: &Path, resolvers: Vec<Arc<dyn ComponentResolver>>) -> ComponentImporter {
    let options = ComponentsOptions {
        extensions: vec!["vue".to_string(), "md".to_string()],
        dirs: vec![PathBuf::from("components"), root.join("theme/components")],
        deep: true,
    };
    ComponentImporter::new(
        options,
        root,
        vec!["vue".to_string(), "md".to_string()],
        resolvers,
    )
}

#[test]
fn test_component_directory_precedence() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    fixture.write("components/Card.vue", "<template><div/></template>");
    fixture.write("theme/components/Card.vue", "<template><div/></template>");
    fixture.write("theme/components/Badge.vue", "<template><div/></template>");
    fixture.write("pages/components/Card.vue", "<template><div/></template>");

    let importer = importer(fixture.root(), Vec::new());

    let deck_card = importer.resolve_tag("Card", None).unwrap();
    assert!(deck_card.import_path.ends_with("/components/Card.vue"));
    assert!(!deck_card.import_path.contains("theme"));

    let badge = importer.resolve_tag("badge", None).unwrap();
    assert!(badge.import_path.ends_with("theme/components/Badge.vue"));

    let pages = fixture.root().join("pages");
    let local_card = importer.resolve_tag("Card", Some(&pages)).unwrap();
    assert!(local_card.import_path.ends_with("pages/components/Card.vue"));
}

#[test]
fn test_component_importer_injects_missing_imports() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    fixture.write("components/Card.vue", "<template><div/></template>");
    let icons: Arc<dyn ComponentResolver> = Arc::new(IconResolver::new(&IconsOptions::default()));
    let importer = importer(fixture.root(), vec![icons]);

    let code = "<template>\n<div><Card/><Card/><IconFoo/><Missing/><Known/></div>\n</template>\n\n<script setup>\nimport Known from './known'\n</script>\n";
    let mut unit = compiled_unit("/deck/slide.md", code);
    importer.apply(&mut unit);

    assert_eq!(unit.code.matches("import Card from").count(), 1);
    assert!(unit.code.contains("import IconFoo from '~icons/carbon/foo'"));
    assert_eq!(unit.code.matches("import Known").count(), 1);
    assert!(!unit.code.contains("import Missing"));
    assert_eq!(
        unit.degradations,
        vec![Degradation::UnresolvedComponent {
            tag: "Missing".to_string()
        }]
    );
}

#[test]
fn test_custom_resolvers_run_in_order_after_directories() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    fixture.write("components/Chart.vue", "<template><div/></template>");

    let first: Arc<dyn ComponentResolver> = Arc::new(|tag: &str| {
        (tag == "Chart" || tag == "Tweet")
            .then(|| ComponentResolution::new(tag, format!("first/{}", tag)))
    });
    let second: Arc<dyn ComponentResolver> =
        Arc::new(|tag: &str| Some(ComponentResolution::new(tag, format!("second/{}", tag))));
    let importer = importer(fixture.root(), vec![first, second]);

    assert!(importer
        .resolve_tag("Chart", None)
        .unwrap()
        .import_path
        .ends_with("components/Chart.vue"));
    assert_eq!(importer.resolve_tag("Tweet", None).unwrap().import_path, "first/Tweet");
    assert_eq!(importer.resolve_tag("Other", None).unwrap().import_path, "second/Other");
}

// ---- utility styles ----

#[test]
fn test_rule_generation() {
    let generator = RuleGenerator::default();

    let padding = generator.generate("p-4").unwrap();
    assert_eq!(padding.declarations, vec![("padding".to_string(), "1rem".to_string())]);

    let hover = generator.generate("hover:bg-blue-500").unwrap();
    assert_eq!(hover.selector, ".hover\\:bg-blue-500:hover");
    assert_eq!(hover.declarations[0].0, "background-color");

    let half = generator.generate("md:w-1/2").unwrap();
    assert_eq!(half.media, Some("(min-width: 768px)"));
    assert_eq!(half.declarations[0].1, "50%");

    let negative = generator.generate("-mt-2").unwrap();
    assert_eq!(negative.declarations[0].1, "-0.5rem");

    assert!(generator.generate("-p-2").is_none());
    assert!(generator.generate("token").is_none());
    assert!(generator.generate("weird:p-4").is_none());
}

#[test]
fn test_rule_generation_shortcuts_and_theme_colors() {
    let mut shortcuts = BTreeMap::new();
    shortcuts.insert("btn".to_string(), "px-4 py-2 rounded".to_string());
    let mut colors = BTreeMap::new();
    colors.insert("brand".to_string(), serde_json::json!({ "500": "#ff0066" }));
    colors.insert("accent".to_string(), serde_json::json!("#123456"));
    let generator = RuleGenerator::new(shortcuts, colors);

    let btn = generator.generate("btn").unwrap();
    assert_eq!(btn.declarations.len(), 5);
    assert_eq!(
        generator.generate("text-brand-500").unwrap().declarations[0].1,
        "#ff0066"
    );
    assert_eq!(generator.generate("bg-accent").unwrap().declarations[0].1, "#123456");
}

#[test]
fn test_rule_generation_rejects_repeated_variants() {
    let generator = RuleGenerator::default();

    assert!(generator.generate("hover:p-4").is_some());
    assert!(generator.generate("hover:hover:p-4").is_none());
    assert!(generator.generate(&format!("{}p-4", "hover:".repeat(256))).is_none());
    assert!(generator.generate("dark:hover:focus:active:visited:disabled:p-4").is_some());
}

fn utility_compiler(root: &Path) -> UtilityStyleCompiler {
    let options = WindiOptions {
        include: vec!["**/*.md".to_string(), "**/*.vue".to_string()],
        exclude: vec!["node_modules/**".to_string()],
        scan_dirs: Vec::new(),
        config_files: vec![root.join("windi.config.json")],
    };
    UtilityStyleCompiler::new(&options, root).unwrap()
}

#[test]
fn test_utility_stylesheet_contains_only_observed_tokens() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    let utility = utility_compiler(fixture.root());

    utility.scan("/a.vue", "<div class=\"p-4 text-center unknown-thing\"></div>");
    utility.scan("/b.vue", "<span :class=\"'m-2'\" className='font-bold'></span>");
    let css = utility.stylesheet();

    assert!(css.contains(".p-4 {"));
    assert!(css.contains(".text-center {"));
    assert!(css.contains(".font-bold {"));
    assert!(!css.contains("unknown-thing"));
    assert!(!css.contains(".m-4"));
}

#[test]
fn test_utility_full_build_resets_and_drops_stale_scans() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    let utility = utility_compiler(fixture.root());

    utility.scan("/a.vue", "<div class=\"p-4\"></div>");
    let mut stale = utility.begin_scan("/b.vue");
    stale.record("<div class=\"m-8\"></div>");
    drop(stale);

    // An uncommitted scan contributes nothing
    assert_eq!(utility.tokens(), vec!["p-4".to_string()]);

    let generation = utility.generation();
    assert_eq!(utility.begin_full_build(), generation + 1);
    assert!(utility.tokens().is_empty());

    utility.scan("/a.vue", "<div class=\"grid\"></div>");
    assert_eq!(utility.tokens(), vec!["grid".to_string()]);
}

#[test]
fn test_utility_stylesheet_waits_for_in_flight_scans() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    let utility = utility_compiler(fixture.root());
    let emitted = AtomicBool::new(false);

    thread::scope(|scope| {
        let mut guard = utility.begin_scan("/a.vue");
        guard.record("<div class=\"flex\"></div>");

        let reader = scope.spawn(|| {
            let css = utility.stylesheet();
            emitted.store(true, Ordering::SeqCst);
            css
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!emitted.load(Ordering::SeqCst));

        guard.commit();
        let css = reader.join().unwrap();
        assert!(css.contains(".flex {"));
    });
}

#[test]
fn test_utility_concurrent_scans_all_land() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    let utility = utility_compiler(fixture.root());
    let spacing: Vec<String> = (1..=16).map(|n| format!("p-{}", n)).collect();

    thread::scope(|scope| {
        for (i, token) in spacing.iter().enumerate() {
            let utility = &utility;
            scope.spawn(move || {
                utility.scan(&format!("/c{}.vue", i), &format!("<div class=\"{}\"></div>", token));
            });
        }
    });

    let tokens = utility.tokens();
    for token in &spacing {
        assert!(tokens.contains(token), "missing {}", token);
    }
}

#[test]
fn test_utility_windi_config_is_loaded() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    fixture.write(
        "windi.config.json",
        r#"{ "shortcuts": { "card": "p-4 rounded-lg shadow" } }"#,
    );
    let utility = utility_compiler(fixture.root());

    utility.scan("/a.vue", "<div class=\"card\"></div>");
    assert!(utility.stylesheet().contains(".card {"));
}

#[test]
fn test_utility_matches_globs() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    let utility = utility_compiler(fixture.root());

    assert!(utility.matches(&fixture.root().join("components/A.vue").to_string_lossy()));
    assert!(utility.matches("/@slidev/slide/1.md"));
    assert!(!utility.matches(&fixture.root().join("node_modules/x/A.vue").to_string_lossy()));
    assert!(!utility.matches(&fixture.root().join("style.css").to_string_lossy()));
}

// ---- remote assets ----

struct FakeCache {
    dir: PathBuf,
    fail: bool,
    calls: Mutex<usize>,
}

impl AssetCache for FakeCache {
    fn materialize(&self, url: &str) -> Result<PathBuf> {
        *self.calls.lock() += 1;
        if self.fail {
            return Err(SlidevError::ValidationError("offline".to_string()));
        }
        Ok(self.dir.join(HttpAssetCache::file_name(url)))
    }
}

fn rewriter(root: &Path, fail: bool) -> (RemoteAssetRewriter, Arc<FakeCache>) {
    let cache = Arc::new(FakeCache {
        dir: root.join(".slidev/remote-assets"),
        fail,
        calls: Mutex::new(0),
    });
    let options = RemoteAssetsOptions {
        enabled: true,
        patterns: vec![config::DEFAULT_REMOTE_ASSET_PATTERN.to_string()],
        cache_dir: root.join(".slidev/remote-assets"),
        timeout_secs: 1,
        retries: 1,
    };
    let rewriter = RemoteAssetRewriter::new(&options, root, cache.clone()).unwrap();
    (rewriter, cache)
}

#[test]
fn test_remote_assets_rewritten_once_per_url() {
    let root = PathBuf::from("/deck");
    let (rewriter, cache) = rewriter(&root, false);
    let code = "<img src=\"https://cdn.svg.io/a.png\"><img src=\"https://cdn.svg.io/a.png\"> <a href=\"https://example.com/page\">";

    let (once, degradations) = rewriter.rewrite(code);
    let expected = format!("/.slidev/remote-assets/{}", HttpAssetCache::file_name("https://cdn.svg.io/a.png"));
    assert_eq!(once.matches(&expected).count(), 2);
    assert!(once.contains("https://example.com/page"));
    assert!(degradations.is_empty());
    assert_eq!(*cache.calls.lock(), 1);

    let (twice, _) = rewriter.rewrite(&once);
    assert_eq!(once, twice);
}

#[test]
fn test_remote_asset_failure_keeps_url() {
    let root = PathBuf::from("/deck");
    let (rewriter, _) = rewriter(&root, true);
    let mut unit = TransformUnit::new("/deck/a.vue", "<img src=\"https://example.com/a.jpg?w=100\">");

    rewriter.apply(&mut unit);
    assert_eq!(unit.code, unit.source_text);
    assert!(matches!(
        unit.degradations.as_slice(),
        [Degradation::AssetFetchFailed { url, .. }] if url == "https://example.com/a.jpg?w=100"
    ));
}

#[test]
fn test_cached_asset_is_written_whole() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("cache/abc.png");

    remote_assets::store(&target, b"first").unwrap();
    remote_assets::store(&target, b"second").unwrap();

    assert_eq!(fs::read(&target).unwrap(), b"second");
    let leftovers: Vec<_> = fs::read_dir(dir.path().join("cache"))
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_asset_file_name_is_stable() {
    let a = HttpAssetCache::file_name("https://example.com/img/photo.JPG?x=1");
    let b = HttpAssetCache::file_name("https://example.com/img/photo.JPG?x=1");
    assert_eq!(a, b);
    assert!(a.ends_with(".jpg"));
    assert_ne!(a, HttpAssetCache::file_name("https://example.com/img/other.JPG"));
}

// ---- shared state ----

#[test]
fn test_server_ref_defaults_and_sync() {
    let server_ref = ServerRef::new(true);
    assert_eq!(server_ref.get("page"), Some(0));
    assert_eq!(server_ref.get("tab"), Some(0));

    let updates = server_ref.subscribe();
    server_ref.set("page", 3).unwrap();
    assert_eq!(
        updates.try_recv().unwrap(),
        StateUpdate {
            key: "page".to_string(),
            value: 3
        }
    );

    let applied = server_ref
        .apply_client_update(&StateUpdate {
            key: "tab".to_string(),
            value: 1,
        })
        .unwrap();
    assert!(applied);
    assert_eq!(server_ref.get("tab"), Some(1));
    assert!(server_ref.set("zoom", 2).is_err());
}

#[test]
fn test_server_ref_without_sync_keeps_sides_independent() {
    let server_ref = ServerRef::new(false);
    let updates = server_ref.subscribe();

    let applied = server_ref
        .apply_client_update(&StateUpdate {
            key: "page".to_string(),
            value: 5,
        })
        .unwrap();
    assert!(!applied);
    assert_eq!(server_ref.get("page"), Some(0));

    server_ref.set("page", 2).unwrap();
    assert!(updates.try_recv().is_err());
    assert!(server_ref.module_code().contains("export const sync = false"));
}

#[test]
fn test_server_ref_sessions_do_not_share_state() {
    let a = ServerRef::new(true);
    let b = ServerRef::new(true);
    a.set("page", 7).unwrap();

    assert_eq!(b.get("page"), Some(0));
    assert_ne!(a.session(), b.session());
}

// ---- virtual modules ----

#[test]
fn test_virtual_module_ids() {
    assert_eq!(VirtualModuleId::parse("/@slidev/slides"), Some(VirtualModuleId::Slides));
    assert_eq!(VirtualModuleId::parse("/@slidev/slide/3.md"), Some(VirtualModuleId::Slide(3)));
    assert_eq!(VirtualModuleId::parse("/@slidev/slide/0.md"), None);
    assert_eq!(VirtualModuleId::parse("/virtual:windi.css"), Some(VirtualModuleId::WindiCss));
    assert_eq!(VirtualModuleId::parse("/components/A.vue"), None);
    assert_eq!(VirtualModuleId::Slide(2).as_string(), "/@slidev/slide/2.md");
    assert_eq!(
        VirtualModuleId::parse("/@vue-factory/div"),
        Some(VirtualModuleId::Factory("div"))
    );
    assert_eq!(VirtualModuleId::parse("/@vue-factory/blink"), None);
}

#[test]
fn test_slides_module_lists_visible_slides() {
    let fixture = DeckFixture::new("# One\n\n---\nhide: true\n---\n\n# Hidden\n\n---\n\n# Three\n");
    let providers = VirtualModuleProviders::new(true);
    let code = providers.slides(&fixture.state()).unwrap();

    assert!(code.contains("import n1 from '/@slidev/slide/1.md'"));
    assert!(code.contains("import n2 from '/@slidev/slide/2.md'"));
    assert!(!code.contains("n3"));
    assert!(code.contains("\"title\":\"Three\""));
}

#[test]
fn test_slide_with_src_reads_external_file() {
    let fixture = DeckFixture::new("# One\n\n---\nsrc: ./pages/intro.md\nclass: big\n---\n");
    fixture.write("pages/intro.md", "---\ntitle: Intro\n---\n\n# Imported\n");
    let state = fixture.state();
    let providers = VirtualModuleProviders::new(true);

    let markdown = providers.slide(&state, 2).unwrap();
    assert!(markdown.contains("# Imported"));
    assert!(markdown.contains("class: big"));
    assert!(markdown.contains("title: Intro"));
    assert!(!markdown.contains("src:"));
}

#[test]
fn test_missing_src_is_resolution_error() {
    let fixture = DeckFixture::new("# One\n\n---\nsrc: ./missing.md\n---\n");
    let providers = VirtualModuleProviders::new(true);

    match providers.slides(&fixture.state()) {
        Err(e @ SlidevError::ResolutionError { .. }) => assert!(e.is_fatal()),
        other => panic!("Expected resolution error, got {:?}", other),
    }
}

#[test]
fn test_setups_module() {
    let fixture = DeckFixture::new("---\nsetups: ['./setup/extra.ts']\n---\n\n# One\n");
    let providers = VirtualModuleProviders::new(true);
    assert!(matches!(
        providers.setups(&fixture.state()),
        Err(SlidevError::ResolutionError { .. })
    ));

    fixture.write("setup/extra.ts", "export default () => {}\n");
    fixture.write("setup/main.ts", "export default () => {}\n");
    let code = providers.setups(&fixture.state()).unwrap();
    assert!(code.contains("import setup0 from '"));
    assert!(code.contains("setup/main.ts'"));
    assert!(code.contains("import setup1 from '"));
    assert!(code.contains("setup1(app)"));
}

#[test]
fn test_monaco_module_only_when_needed() {
    let providers = VirtualModuleProviders::new(true);

    let plain = DeckFixture::new(TWO_SLIDES);
    assert_eq!(providers.monaco(&plain.state()).unwrap(), "export default undefined\n");

    let editor = DeckFixture::new("# Code\n\n```ts {monaco}\nconst a = 1\n```\n");
    assert!(providers.monaco(&editor.state()).unwrap().contains("MonacoEnvironment"));
    assert_eq!(
        VirtualModuleProviders::new(false).monaco(&editor.state()).unwrap(),
        "export default undefined\n"
    );
}

#[test]
fn test_configs_module_merges_headmatter() {
    let fixture = DeckFixture::new("---\ntitle: Talk\ncanvasWidth: 1200\n---\n\n# One\n");
    let code = VirtualModuleProviders::new(true)
        .configs(&fixture.state())
        .unwrap();

    assert!(code.starts_with("export default {"));
    assert!(code.contains("\"title\":\"Talk\""));
    assert!(code.contains("\"canvasWidth\":1200"));
    assert!(code.contains("\"theme\":\"default\""));
}

#[test]
fn test_entry_module_imports_styles_and_slides() {
    let fixture = DeckFixture::new(TWO_SLIDES);
    fixture.write("style.css", "h1 { color: red }\n");
    let code = VirtualModuleProviders::new(true)
        .entry(&fixture.state())
        .unwrap();

    assert!(code.contains("import slides from '/@slidev/slides'"));
    assert!(code.contains("style.css'"));
    assert!(code.contains("import 'virtual:windi.css'"));
    assert!(code.contains("export const total = 2"));
    assert!(code.contains("app.mount('#app')"));
}

// ---- utils ----

#[test]
fn test_name_casing() {
    assert_eq!(utils::to_pascal_case("my-button"), "MyButton");
    assert_eq!(utils::to_pascal_case("carbon-add"), "CarbonAdd");
    assert_eq!(utils::to_kebab_case("IconFoo"), "icon-foo");
    assert_eq!(utils::to_kebab_case("IconMdiAccount"), "icon-mdi-account");
    assert_eq!(utils::to_kebab_case("carbon-add"), "carbon-add");
}

#[test]
fn test_file_kind_routing() {
    assert_eq!(FileKind::from_id("/deck/slides.md"), FileKind::DeckMarkdown);
    assert_eq!(FileKind::from_id("/deck/A.vue?vue&type=script"), FileKind::Script);
    assert_eq!(FileKind::from_id("/deck/style.css"), FileKind::Style);
    assert_eq!(FileKind::from_id("/deck/logo.png"), FileKind::Other);
}
