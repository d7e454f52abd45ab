// ABOUTME: Post-processing pass for compiled markdown components
// ABOUTME: Restores braces that the markdown compiler escaped inside code regions

use crate::unit::{FileKind, TransformUnit};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

// Any run of backslashes before a brace collapses, so a second pass finds
// nothing left to replace.
static ESCAPED_BRACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\+\{").unwrap());

/// Undoes the markdown compiler's brace escaping.
#[derive(Debug, Default, Clone, Copy)]
pub struct EscapePostProcessor;

impl EscapePostProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Only compiled markdown carries escape markers
    pub fn applies_to(&self, unit: &TransformUnit) -> bool {
        unit.from_markdown && unit.kind == FileKind::Script
    }

    pub fn unescape<'a>(&self, code: &'a str) -> Cow<'a, str> {
        ESCAPED_BRACE_RE.replace_all(code, "{")
    }

    pub fn apply(&self, unit: &mut TransformUnit) {
        if !self.applies_to(unit) {
            return;
        }
        let code = self.unescape(&unit.code).into_owned();
        unit.code = code;
    }
}
