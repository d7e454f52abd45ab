//! Property-based tests using proptest

use proptest::prelude::*;
use slidev::config::{RemoteAssetsOptions, WindiOptions, DEFAULT_REMOTE_ASSET_PATTERN};
use slidev::{
    AssetCache, EscapePostProcessor, HttpAssetCache, Pipeline, RemoteAssetRewriter, Result,
    UtilityStyleCompiler,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const KNOWN_UTILITIES: &[&str] = &[
    "flex",
    "grid",
    "block",
    "hidden",
    "text-center",
    "rounded-lg",
    "p-4",
];

struct LocalCache {
    dir: PathBuf,
}

impl AssetCache for LocalCache {
    fn materialize(&self, url: &str) -> Result<PathBuf> {
        Ok(self.dir.join(HttpAssetCache::file_name(url)))
    }
}

fn rewriter(root: &Path) -> RemoteAssetRewriter {
    let options = RemoteAssetsOptions {
        enabled: true,
        patterns: vec![DEFAULT_REMOTE_ASSET_PATTERN.to_string()],
        cache_dir: root.join(".slidev/remote-assets"),
        timeout_secs: 1,
        retries: 0,
    };
    let cache = Arc::new(LocalCache {
        dir: options.cache_dir.clone(),
    });
    RemoteAssetRewriter::new(&options, root, cache).expect("Failed to build rewriter")
}

fn utility_compiler(root: &Path) -> UtilityStyleCompiler {
    let options = WindiOptions {
        include: vec!["**/*.vue".to_string()],
        exclude: Vec::new(),
        scan_dirs: Vec::new(),
        config_files: Vec::new(),
    };
    UtilityStyleCompiler::new(&options, root).expect("Failed to build compiler")
}

fn deck_with_slides(titles: &[String]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for pkg in ["node_modules/@slidev/client", "node_modules/@slidev/theme-default"] {
        fs::create_dir_all(dir.path().join(pkg)).expect("Failed to create package dir");
    }
    let deck = titles
        .iter()
        .map(|t| format!("# {}\n", t))
        .collect::<Vec<_>>()
        .join("\n---\n\n");
    fs::write(dir.path().join("slides.md"), deck).expect("Failed to write deck");
    dir
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_unescape_is_idempotent(code in "[a-z{}\\\\ ]{0,40}") {
        let escape = EscapePostProcessor::new();
        let once = escape.unescape(&code).into_owned();
        let twice = escape.unescape(&once).into_owned();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_unescape_leaves_no_escaped_braces(code in "[a-z{}\\\\ ]{0,40}") {
        let escape = EscapePostProcessor::new();
        let once = escape.unescape(&code);
        prop_assert!(!once.contains("\\{"), "unescaped output still contains an escaped brace: {:?}", once);
    }

    #[test]
    fn test_remote_rewrite_is_idempotent(
        host in "[a-z]{1,8}",
        name in "[a-z]{1,8}",
        ext in prop::sample::select(vec!["png", "svg", "jpg", "webp"]),
        filler in "[a-z ]{0,12}",
    ) {
        let root = TempDir::new().unwrap();
        let rewriter = rewriter(root.path());
        let url = format!("https://{}.com/{}.{}", host, name, ext);
        let code = format!("<img src=\"{}\"/>{}<a href=\"{}\">", url, filler, url);

        let (once, degradations) = rewriter.rewrite(&code);
        prop_assert!(degradations.is_empty());
        prop_assert!(!once.contains(&url));

        let (twice, _) = rewriter.rewrite(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_stylesheet_has_rule_iff_token_was_scanned(
        picked in prop::sample::subsequence(KNOWN_UTILITIES.to_vec(), 0..=KNOWN_UTILITIES.len())
    ) {
        let root = TempDir::new().unwrap();
        let compiler = utility_compiler(root.path());
        let file = root.path().join("Box.vue");
        compiler.scan(
            &file.to_string_lossy(),
            &format!("<template><div class=\"{}\"/></template>", picked.join(" ")),
        );

        let css = compiler.stylesheet();
        for token in KNOWN_UTILITIES {
            let rule = format!(".{} {{", token);
            prop_assert_eq!(css.contains(&rule), picked.contains(token), "token {}", token);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn test_virtual_modules_are_deterministic(
        titles in prop::collection::vec("[A-Za-z][A-Za-z ]{0,10}[A-Za-z]", 1..5)
    ) {
        let dir = deck_with_slides(&titles);
        let first = Pipeline::builder(dir.path().join("slides.md")).build().unwrap();
        let second = Pipeline::builder(dir.path().join("slides.md")).build().unwrap();

        for id in ["/@slidev/configs", "/@slidev/entry", "/@slidev/slides", "/@slidev/setups"] {
            prop_assert_eq!(first.load(id).unwrap(), second.load(id).unwrap());
        }

        let slides = first.load("/@slidev/slides").unwrap().unwrap();
        prop_assert_eq!(slides.matches("{ no: ").count(), titles.len());
    }
}
