// ABOUTME: Interactive code playground support for slide markdown
// ABOUTME: Rewrites `{monaco}` code fences into editor components before rendering

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static MONACO_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^```(\w+?)[ \t]*\{monaco([\w:,-]*)\}[ \t]*\n([\s\S]*?)^```[ \t]*$").unwrap()
});

/// Whether the markdown asks for at least one editor
pub fn contains_monaco(markdown: &str) -> bool {
    MONACO_FENCE_RE.is_match(markdown)
}

/// Replace every `{monaco}` fence with a `<Monaco>` component
pub fn transform_monaco(markdown: &str) -> Cow<'_, str> {
    MONACO_FENCE_RE.replace_all(markdown, |caps: &Captures| {
        let lang = caps[1].trim();
        let options = &caps[2];
        let encoded = STANDARD.encode(&caps[3]);
        format!(
            "<Monaco :code=\"'{}'\" lang=\"{}\" :readonly=\"{}\" />\n",
            encoded,
            lang,
            options.contains("readonly")
        )
    })
}
