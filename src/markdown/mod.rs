// ABOUTME: Markdown compiler for the slidev pipeline
// ABOUTME: Turns slide markdown into a component with template, script and style blocks

pub mod highlight;
pub mod monaco;

use crate::config::MarkdownOptions;
use crate::deck;
use crate::errors::{Result, SlidevError};
use comrak::{markdown_to_html, ComrakOptions};
use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<pre><code(?: class="language-([^"]+)")?>([\s\S]*?)</code></pre>|<code>([\s\S]*?)</code>"#)
        .unwrap()
});
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<script\b([^>]*)>([\s\S]*?)</script>\n?").unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<style\b[^>]*>[\s\S]*?</style>\n?").unwrap());
static SETUP_ATTR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bsetup\b").unwrap());
static TS_ATTR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\blang=["']ts["']"#).unwrap());

/// Marker written in front of every brace inside code regions
pub const ESCAPED_BRACE: &str = "\\{";

/// Protect a code region: literal backslashes become entities and braces get
/// the escape marker.
fn protect_braces(html: &str) -> String {
    html.replace('\\', "&#92;").replace('{', ESCAPED_BRACE)
}

/// Compiles one markdown file into a component definition.
pub struct MarkdownCompiler {
    options: MarkdownOptions,
}

struct Hoisted {
    setup: Vec<String>,
    scripts: Vec<String>,
    styles: Vec<String>,
    typescript: bool,
}

impl MarkdownCompiler {
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MarkdownOptions {
        &self.options
    }

    fn comrak_options(&self) -> ComrakOptions {
        let mut options = ComrakOptions::default();
        options.render.unsafe_ = self.options.html;
        options.extension.autolink = self.options.linkify;
        options.extension.table = true;
        options.extension.strikethrough = true;
        options.extension.tasklist = true;
        options.parse.smart = false;
        options
    }

    /// Compile markdown source into component code
    pub fn compile(&self, file_id: &str, source: &str) -> Result<String> {
        debug!("Compiling markdown: {}", file_id);

        let (frontmatter, body) = deck::split_frontmatter(file_id, source)?;
        check_fences(file_id, &body)?;

        let body = if self.options.monaco {
            monaco::transform_monaco(&body).into_owned()
        } else {
            body
        };

        let html = markdown_to_html(&body, &self.comrak_options());
        let html = self.render_code(&html);
        check_interpolations(file_id, &html)?;

        let (template, hoisted) = hoist_blocks(&html);
        Ok(self.assemble(&frontmatter, template.trim(), hoisted))
    }

    fn render_code(&self, html: &str) -> String {
        CODE_RE
            .replace_all(html, |caps: &Captures| {
                if let Some(inline) = caps.get(3) {
                    return format!("<code v-pre>{}</code>", protect_braces(inline.as_str()));
                }

                let code = highlight::unescape_html(caps.get(2).map_or("", |m| m.as_str()));
                let lang = caps.get(1).map(|m| m.as_str());
                let rendered = match lang {
                    Some(lang) if self.options.highlight => highlight::highlight(&code, lang),
                    _ => highlight::escape_html(&code),
                };
                let rendered = protect_braces(&rendered);
                match lang {
                    Some(lang) => format!(
                        "<pre class=\"language-{0}\" v-pre><code class=\"language-{0}\">{1}</code></pre>",
                        lang, rendered
                    ),
                    None => format!("<pre v-pre><code>{}</code></pre>", rendered),
                }
            })
            .into_owned()
    }

    fn assemble(&self, frontmatter: &deck::Frontmatter, template: &str, hoisted: Hoisted) -> String {
        let mut classes: Vec<&str> = Vec::new();
        if !self.options.wrapper_classes.is_empty() {
            classes.push(&self.options.wrapper_classes);
        }
        if let Some(class) = frontmatter.get("class").and_then(Value::as_str) {
            classes.push(class);
        }

        let mut code = String::from("<template>\n");
        if classes.is_empty() {
            code.push_str("<div>\n");
        } else {
            code.push_str(&format!("<div class=\"{}\">\n", classes.join(" ")));
        }
        code.push_str(template);
        code.push_str("\n</div>\n</template>\n\n");

        if hoisted.typescript {
            code.push_str("<script setup lang=\"ts\">\n");
        } else {
            code.push_str("<script setup>\n");
        }
        if self.options.head_enabled {
            code.push_str("import { useHead } from '@vueuse/head'\n");
        }
        let json = Value::Object(frontmatter.clone()).to_string();
        code.push_str(&format!("const frontmatter = {}\n", json));
        code.push_str("defineExpose({ frontmatter })\n");
        if self.options.head_enabled {
            code.push_str("useHead({ title: frontmatter.title, meta: frontmatter.meta })\n");
        }
        for setup in &hoisted.setup {
            code.push_str(setup.trim());
            code.push('\n');
        }
        code.push_str("</script>\n");

        for block in hoisted.scripts.iter().chain(hoisted.styles.iter()) {
            code.push('\n');
            code.push_str(block.trim());
            code.push('\n');
        }
        code
    }
}

// A fence left open would swallow the rest of the file.
fn check_fences(file_id: &str, body: &str) -> Result<()> {
    let mut open: Option<(usize, String)> = None;
    for (no, line) in body.lines().enumerate() {
        let trimmed = line.trim_start();
        let marker: String = trimmed
            .chars()
            .take_while(|c| *c == '`' || *c == '~')
            .collect();
        let closes = matches!(
            &open,
            Some((_, fence)) if marker.len() >= fence.len() && marker.starts_with(&fence[..1])
        );
        if closes {
            open = None;
        } else if open.is_none() && marker.len() >= 3 {
            open = Some((no + 1, marker));
        }
    }
    match open {
        Some((line, _)) => Err(SlidevError::compile(
            file_id,
            format!("unterminated code fence starting at line {}", line),
        )),
        None => Ok(()),
    }
}

// Every `{{` outside code must be closed.
fn check_interpolations(file_id: &str, html: &str) -> Result<()> {
    let mut rest = html;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => rest = &after[end + 2..],
            None => {
                return Err(SlidevError::compile(
                    file_id,
                    "unterminated {{ interpolation in template",
                ))
            }
        }
    }
    Ok(())
}

fn hoist_blocks(html: &str) -> (String, Hoisted) {
    let mut hoisted = Hoisted {
        setup: Vec::new(),
        scripts: Vec::new(),
        styles: Vec::new(),
        typescript: false,
    };

    let without_scripts = SCRIPT_RE.replace_all(html, |caps: &Captures| {
        let attrs = &caps[1];
        if TS_ATTR_RE.is_match(attrs) {
            hoisted.typescript = true;
        }
        if SETUP_ATTR_RE.is_match(attrs) {
            hoisted.setup.push(caps[2].to_string());
        } else {
            hoisted.scripts.push(caps[0].to_string());
        }
        String::new()
    });
    let template = STYLE_RE
        .replace_all(&without_scripts, |caps: &Captures| {
            hoisted.styles.push(caps[0].to_string());
            String::new()
        })
        .into_owned();

    (template, hoisted)
}
