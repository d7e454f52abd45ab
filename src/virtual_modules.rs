// ABOUTME: Virtual module providers for the slidev pipeline
// ABOUTME: Generates config, entry, slide list, setup and editor loader modules from deck state

use crate::components::factory::{self, FACTORY_PREFIX};
use crate::deck::{self, DeckSlide, Frontmatter, SlideDeckState};
use crate::errors::{Result, SlidevError};
use crate::markdown::monaco;
use crate::utils;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::fmt::Write as _;
use std::path::Path;

pub const CONFIGS_ID: &str = "/@slidev/configs";
pub const ENTRY_ID: &str = "/@slidev/entry";
pub const SLIDES_ID: &str = "/@slidev/slides";
pub const SETUPS_ID: &str = "/@slidev/setups";
pub const MONACO_ID: &str = "/@slidev/monaco";
pub const WINDI_ID: &str = "virtual:windi.css";
pub const SERVER_REF_ID: &str = "/@server-ref/state";
const SLIDE_PREFIX: &str = "/@slidev/slide/";

static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t#]*$").unwrap());

/// Identifiers that are always served by the pipeline, never read from disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualModuleId {
    Configs,
    Entry,
    Slides,
    Setups,
    Monaco,
    /// Markdown of one visible slide, numbered from 1
    Slide(usize),
    WindiCss,
    ServerRefState,
    /// Wrapper component for one plain element
    Factory(&'static str),
}

impl VirtualModuleId {
    /// Modules derived purely from the deck state, in build order
    pub const DECK_MODULES: [VirtualModuleId; 5] = [
        VirtualModuleId::Configs,
        VirtualModuleId::Slides,
        VirtualModuleId::Setups,
        VirtualModuleId::Monaco,
        VirtualModuleId::Entry,
    ];

    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim_start_matches('\0');
        let id = id.split('?').next().unwrap_or(id);
        // Served over HTTP as `/virtual:...`
        let id = id
            .strip_prefix('/')
            .filter(|rest| rest.starts_with("virtual:"))
            .unwrap_or(id);
        match id {
            CONFIGS_ID => Some(Self::Configs),
            ENTRY_ID => Some(Self::Entry),
            SLIDES_ID => Some(Self::Slides),
            SETUPS_ID => Some(Self::Setups),
            MONACO_ID => Some(Self::Monaco),
            WINDI_ID | "/@windicss/windi.css" => Some(Self::WindiCss),
            SERVER_REF_ID => Some(Self::ServerRefState),
            _ if id.starts_with(FACTORY_PREFIX) => id
                .strip_prefix(FACTORY_PREFIX)
                .and_then(factory::known_element)
                .map(Self::Factory),
            _ => id
                .strip_prefix(SLIDE_PREFIX)
                .and_then(|rest| rest.strip_suffix(".md"))
                .and_then(|no| no.parse::<usize>().ok())
                .filter(|no| *no > 0)
                .map(Self::Slide),
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            Self::Configs => CONFIGS_ID.to_string(),
            Self::Entry => ENTRY_ID.to_string(),
            Self::Slides => SLIDES_ID.to_string(),
            Self::Setups => SETUPS_ID.to_string(),
            Self::Monaco => MONACO_ID.to_string(),
            Self::Slide(no) => format!("{}{}.md", SLIDE_PREFIX, no),
            Self::WindiCss => WINDI_ID.to_string(),
            Self::ServerRefState => SERVER_REF_ID.to_string(),
            Self::Factory(element) => format!("{}{}", FACTORY_PREFIX, element),
        }
    }

    /// File name used when a build writes this module to disk
    pub fn output_name(&self) -> String {
        match self {
            Self::Configs => "configs.js".to_string(),
            Self::Entry => "entry.js".to_string(),
            Self::Slides => "slides.js".to_string(),
            Self::Setups => "setups.js".to_string(),
            Self::Monaco => "monaco.js".to_string(),
            Self::Slide(no) => format!("slide-{}.md", no),
            Self::WindiCss => "windi.css".to_string(),
            Self::ServerRefState => "server-ref-state.js".to_string(),
            Self::Factory(element) => format!("vue-factory-{}.js", element),
        }
    }
}

impl fmt::Display for VirtualModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Defaults for the configs module; headmatter keys override them
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeckConfig<'a> {
    title: String,
    theme: &'a str,
    aspect_ratio: f64,
    canvas_width: u32,
    color_schema: &'a str,
    highlighter: &'a str,
    router_mode: &'a str,
    download: bool,
    info: bool,
}

fn fs_path(path: &Path) -> String {
    utils::slash_path(path)
}

/// Produces the deck-derived virtual modules.
///
/// Each provider only reads the state it is given. Structurally equal states
/// yield byte-identical output.
#[derive(Debug, Clone, Copy)]
pub struct VirtualModuleProviders {
    monaco_enabled: bool,
}

impl VirtualModuleProviders {
    pub fn new(monaco_enabled: bool) -> Self {
        Self { monaco_enabled }
    }

    /// Serve a deck-derived module. Returns `None` for ids that are not
    /// derived from deck state.
    pub fn provide(&self, id: VirtualModuleId, state: &SlideDeckState) -> Result<Option<String>> {
        debug!("Providing virtual module {}", id);
        let code = match id {
            VirtualModuleId::Configs => self.configs(state)?,
            VirtualModuleId::Entry => self.entry(state)?,
            VirtualModuleId::Slides => self.slides(state)?,
            VirtualModuleId::Setups => self.setups(state)?,
            VirtualModuleId::Monaco => self.monaco(state)?,
            VirtualModuleId::Slide(no) => self.slide(state, no)?,
            VirtualModuleId::WindiCss
            | VirtualModuleId::ServerRefState
            | VirtualModuleId::Factory(_) => return Ok(None),
        };
        Ok(Some(code))
    }

    pub fn configs(&self, state: &SlideDeckState) -> Result<String> {
        let title = state
            .headmatter
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| state.slides.first().and_then(|s| s.source.title()))
            .unwrap_or_else(|| "Slidev".to_string());

        let defaults = DeckConfig {
            title,
            theme: &state.layout.theme,
            aspect_ratio: 16.0 / 9.0,
            canvas_width: 980,
            color_schema: "auto",
            highlighter: "prism",
            router_mode: "history",
            download: false,
            info: false,
        };

        let mut config = match serde_json::to_value(&defaults) {
            Ok(Value::Object(map)) => map,
            _ => Frontmatter::new(),
        };
        for (key, value) in &state.headmatter {
            if key != "theme" {
                config.insert(key.clone(), value.clone());
            }
        }
        let json = serde_json::to_string(&config)
            .map_err(|e| SlidevError::resolution(CONFIGS_ID, e.to_string()))?;

        Ok(format!("export default {}\n", json))
    }

    pub fn entry(&self, state: &SlideDeckState) -> Result<String> {
        let total = state.visible_slides().count();
        let mut code = String::new();

        code.push_str("import { createApp } from 'vue'\n");
        code.push_str("import { createRouter, createWebHistory } from 'vue-router'\n");
        let _ = writeln!(
            code,
            "import App from '{}'",
            fs_path(&state.layout.client_root.join("App.vue"))
        );
        let _ = writeln!(code, "import slides from '{}'", SLIDES_ID);
        let _ = writeln!(code, "import setup from '{}'", SETUPS_ID);
        for style in &state.styles {
            let _ = writeln!(code, "import '{}'", fs_path(style));
        }
        let _ = writeln!(code, "import '{}'", WINDI_ID);
        code.push('\n');
        let _ = writeln!(code, "export const total = {}", total);
        code.push_str(
            "const router = createRouter({\n  \
               history: createWebHistory(),\n  \
               routes: [\n    \
                 { path: '/', redirect: '/1' },\n    \
                 ...slides.map(s => ({ path: `/${s.no}`, component: s.component, meta: s.meta })),\n  \
               ],\n\
             })\n",
        );
        code.push_str("const app = createApp(App)\n");
        code.push_str("app.use(router)\n");
        code.push_str("setup(app)\n");
        code.push_str("app.mount('#app')\n");
        Ok(code)
    }

    pub fn slides(&self, state: &SlideDeckState) -> Result<String> {
        let mut imports = String::new();
        let mut entries = String::new();

        for (no, slide) in state.visible_slides() {
            let meta = slide_meta(slide, SLIDES_ID)?;
            let meta = serde_json::to_string(&meta)
                .map_err(|e| SlidevError::resolution(SLIDES_ID, e.to_string()))?;
            let _ = writeln!(
                imports,
                "import n{} from '{}'",
                no,
                VirtualModuleId::Slide(no)
            );
            let _ = writeln!(
                entries,
                "  {{ no: {0}, path: '{0}', component: n{0}, meta: {1} }},",
                no, meta
            );
        }

        Ok(format!(
            "{}\nexport const slides = [\n{}]\nexport default slides\n",
            imports, entries
        ))
    }

    pub fn setups(&self, state: &SlideDeckState) -> Result<String> {
        let mut imports = String::new();
        let mut calls = String::new();

        for (i, path) in state.setup_files.iter().enumerate() {
            if !path.is_file() {
                return Err(SlidevError::resolution(
                    SETUPS_ID,
                    format!("setup file not found: {:?}", path),
                ));
            }
            let _ = writeln!(imports, "import setup{} from '{}'", i, fs_path(path));
            let _ = writeln!(calls, "  setup{}(app)", i);
        }

        Ok(format!(
            "{}\nexport default function setup(app) {{\n{}}}\n",
            imports, calls
        ))
    }

    pub fn monaco(&self, state: &SlideDeckState) -> Result<String> {
        if !self.monaco_enabled {
            return Ok("export default undefined\n".to_string());
        }
        let mut required = false;
        for (_, slide) in state.visible_slides() {
            if monaco::contains_monaco(&slide.markdown(MONACO_ID)?) {
                required = true;
                break;
            }
        }
        if !required {
            return Ok("export default undefined\n".to_string());
        }

        Ok("import * as monaco from 'monaco-editor'\n\
            import EditorWorker from 'monaco-editor/esm/vs/editor/editor.worker?worker'\n\
            import JsonWorker from 'monaco-editor/esm/vs/language/json/json.worker?worker'\n\
            import CssWorker from 'monaco-editor/esm/vs/language/css/css.worker?worker'\n\
            import HtmlWorker from 'monaco-editor/esm/vs/language/html/html.worker?worker'\n\
            import TsWorker from 'monaco-editor/esm/vs/language/typescript/ts.worker?worker'\n\
            \n\
            self.MonacoEnvironment = {\n  \
              getWorker(_, label) {\n    \
                if (label === 'json') return new JsonWorker()\n    \
                if (label === 'css' || label === 'scss' || label === 'less') return new CssWorker()\n    \
                if (label === 'html' || label === 'handlebars' || label === 'razor') return new HtmlWorker()\n    \
                if (label === 'typescript' || label === 'javascript') return new TsWorker()\n    \
                return new EditorWorker()\n  \
              },\n\
            }\n\
            \n\
            export default monaco\n"
            .to_string())
    }

    pub fn slide(&self, state: &SlideDeckState, no: usize) -> Result<String> {
        let id = VirtualModuleId::Slide(no).as_string();
        let slide = state
            .slide(no)
            .ok_or_else(|| SlidevError::resolution(&id, format!("no slide {}", no)))?;
        slide.markdown(&id)
    }
}

fn slide_meta(slide: &DeckSlide, module_id: &str) -> Result<Value> {
    let source = &slide.source;
    let (frontmatter, title) = match &slide.external {
        None => (source.frontmatter.clone(), source.title()),
        Some(_) => {
            let markdown = slide.markdown(module_id)?;
            let (frontmatter, body) = deck::split_frontmatter(module_id, &markdown)?;
            let title = frontmatter
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| HEADING_RE.captures(&body).map(|c| c[1].trim().to_string()));
            (frontmatter, title)
        }
    };

    Ok(serde_json::json!({
        "frontmatter": frontmatter,
        "title": title,
        "note": source.note(),
        "index": source.index,
        "start": source.start_line,
        "end": source.end_line,
    }))
}
