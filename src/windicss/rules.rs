// ABOUTME: Utility class rule generation
// ABOUTME: Derives CSS declarations mechanically from utility class names

use serde_json::Value;
use std::collections::BTreeMap;

pub type Declaration = (String, String);

/// One generated CSS rule for one utility token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtilityRule {
    pub token: String,
    pub selector: String,
    pub media: Option<&'static str>,
    pub declarations: Vec<Declaration>,
    /// Sort key: media breakpoint first, then number of state variants
    pub order: (u8, u8),
}

impl UtilityRule {
    pub fn to_css(&self) -> String {
        let indent = if self.media.is_some() { "  " } else { "" };
        let mut css = format!("{}{} {{\n", indent, self.selector);
        for (prop, value) in &self.declarations {
            css.push_str(&format!("{}  {}: {};\n", indent, prop, value));
        }
        css.push_str(&format!("{}}}\n", indent));
        css
    }
}

const BREAKPOINTS: &[(&str, &str)] = &[
    ("sm", "(min-width: 640px)"),
    ("md", "(min-width: 768px)"),
    ("lg", "(min-width: 1024px)"),
    ("xl", "(min-width: 1280px)"),
    ("2xl", "(min-width: 1536px)"),
];

const PSEUDO_VARIANTS: &[&str] = &["hover", "focus", "active", "visited", "disabled"];

const SPACING: &[(&str, &[&str])] = &[
    ("m-", &["margin"]),
    ("mx-", &["margin-left", "margin-right"]),
    ("my-", &["margin-top", "margin-bottom"]),
    ("mt-", &["margin-top"]),
    ("mr-", &["margin-right"]),
    ("mb-", &["margin-bottom"]),
    ("ml-", &["margin-left"]),
    ("p-", &["padding"]),
    ("px-", &["padding-left", "padding-right"]),
    ("py-", &["padding-top", "padding-bottom"]),
    ("pt-", &["padding-top"]),
    ("pr-", &["padding-right"]),
    ("pb-", &["padding-bottom"]),
    ("pl-", &["padding-left"]),
    ("gap-x-", &["column-gap"]),
    ("gap-y-", &["row-gap"]),
    ("gap-", &["gap"]),
    ("inset-", &["top", "right", "bottom", "left"]),
    ("top-", &["top"]),
    ("right-", &["right"]),
    ("bottom-", &["bottom"]),
    ("left-", &["left"]),
];

const STATIC_UTILITIES: &[(&str, &[(&str, &str)])] = &[
    ("block", &[("display", "block")]),
    ("inline-block", &[("display", "inline-block")]),
    ("inline", &[("display", "inline")]),
    ("flex", &[("display", "flex")]),
    ("inline-flex", &[("display", "inline-flex")]),
    ("grid", &[("display", "grid")]),
    ("hidden", &[("display", "none")]),
    ("flex-row", &[("flex-direction", "row")]),
    ("flex-col", &[("flex-direction", "column")]),
    ("flex-wrap", &[("flex-wrap", "wrap")]),
    ("flex-1", &[("flex", "1 1 0%")]),
    ("flex-auto", &[("flex", "1 1 auto")]),
    ("flex-none", &[("flex", "none")]),
    ("items-start", &[("align-items", "flex-start")]),
    ("items-center", &[("align-items", "center")]),
    ("items-end", &[("align-items", "flex-end")]),
    ("justify-start", &[("justify-content", "flex-start")]),
    ("justify-center", &[("justify-content", "center")]),
    ("justify-end", &[("justify-content", "flex-end")]),
    ("justify-between", &[("justify-content", "space-between")]),
    ("justify-around", &[("justify-content", "space-around")]),
    ("text-left", &[("text-align", "left")]),
    ("text-center", &[("text-align", "center")]),
    ("text-right", &[("text-align", "right")]),
    ("text-justify", &[("text-align", "justify")]),
    ("italic", &[("font-style", "italic")]),
    ("not-italic", &[("font-style", "normal")]),
    ("underline", &[("text-decoration", "underline")]),
    ("line-through", &[("text-decoration", "line-through")]),
    ("no-underline", &[("text-decoration", "none")]),
    ("uppercase", &[("text-transform", "uppercase")]),
    ("lowercase", &[("text-transform", "lowercase")]),
    ("capitalize", &[("text-transform", "capitalize")]),
    ("font-sans", &[("font-family", "ui-sans-serif, system-ui, sans-serif")]),
    ("font-serif", &[("font-family", "ui-serif, Georgia, serif")]),
    ("font-mono", &[("font-family", "ui-monospace, Menlo, monospace")]),
    ("static", &[("position", "static")]),
    ("relative", &[("position", "relative")]),
    ("absolute", &[("position", "absolute")]),
    ("fixed", &[("position", "fixed")]),
    ("sticky", &[("position", "sticky")]),
    ("overflow-hidden", &[("overflow", "hidden")]),
    ("overflow-auto", &[("overflow", "auto")]),
    ("overflow-scroll", &[("overflow", "scroll")]),
    ("truncate", &[("overflow", "hidden"), ("text-overflow", "ellipsis"), ("white-space", "nowrap")]),
    ("select-none", &[("user-select", "none")]),
    ("cursor-pointer", &[("cursor", "pointer")]),
    ("border", &[("border-width", "1px"), ("border-style", "solid")]),
    ("rounded", &[("border-radius", "0.25rem")]),
    ("rounded-none", &[("border-radius", "0px")]),
    ("rounded-sm", &[("border-radius", "0.125rem")]),
    ("rounded-md", &[("border-radius", "0.375rem")]),
    ("rounded-lg", &[("border-radius", "0.5rem")]),
    ("rounded-xl", &[("border-radius", "0.75rem")]),
    ("rounded-2xl", &[("border-radius", "1rem")]),
    ("rounded-full", &[("border-radius", "9999px")]),
    ("shadow", &[("box-shadow", "0 1px 3px 0 rgba(0, 0, 0, 0.1), 0 1px 2px 0 rgba(0, 0, 0, 0.06)")]),
    ("shadow-md", &[("box-shadow", "0 4px 6px -1px rgba(0, 0, 0, 0.1), 0 2px 4px -1px rgba(0, 0, 0, 0.06)")]),
    ("shadow-lg", &[("box-shadow", "0 10px 15px -3px rgba(0, 0, 0, 0.1), 0 4px 6px -2px rgba(0, 0, 0, 0.05)")]),
    ("shadow-xl", &[("box-shadow", "0 20px 25px -5px rgba(0, 0, 0, 0.1), 0 10px 10px -5px rgba(0, 0, 0, 0.04)")]),
    ("shadow-none", &[("box-shadow", "none")]),
];

const FONT_SIZES: &[(&str, &str, &str)] = &[
    ("xs", "0.75rem", "1rem"),
    ("sm", "0.875rem", "1.25rem"),
    ("base", "1rem", "1.5rem"),
    ("lg", "1.125rem", "1.75rem"),
    ("xl", "1.25rem", "1.75rem"),
    ("2xl", "1.5rem", "2rem"),
    ("3xl", "1.875rem", "2.25rem"),
    ("4xl", "2.25rem", "2.5rem"),
    ("5xl", "3rem", "1"),
    ("6xl", "3.75rem", "1"),
    ("7xl", "4.5rem", "1"),
    ("8xl", "6rem", "1"),
    ("9xl", "8rem", "1"),
];

const FONT_WEIGHTS: &[(&str, &str)] = &[
    ("thin", "100"),
    ("extralight", "200"),
    ("light", "300"),
    ("normal", "400"),
    ("medium", "500"),
    ("semibold", "600"),
    ("bold", "700"),
    ("extrabold", "800"),
    ("black", "900"),
];

const LEADING: &[(&str, &str)] = &[
    ("none", "1"),
    ("tight", "1.25"),
    ("snug", "1.375"),
    ("normal", "1.5"),
    ("relaxed", "1.625"),
    ("loose", "2"),
];

const TRACKING: &[(&str, &str)] = &[
    ("tighter", "-0.05em"),
    ("tight", "-0.025em"),
    ("normal", "0em"),
    ("wide", "0.025em"),
    ("wider", "0.05em"),
    ("widest", "0.1em"),
];

const MAX_WIDTHS: &[(&str, &str)] = &[
    ("xs", "20rem"),
    ("sm", "24rem"),
    ("md", "28rem"),
    ("lg", "32rem"),
    ("xl", "36rem"),
    ("2xl", "42rem"),
    ("3xl", "48rem"),
    ("4xl", "56rem"),
    ("5xl", "64rem"),
    ("6xl", "72rem"),
    ("7xl", "80rem"),
    ("prose", "65ch"),
];

// (hue, saturation) per palette color
const PALETTE: &[(&str, u16, u8)] = &[
    ("gray", 220, 13),
    ("red", 0, 84),
    ("orange", 25, 95),
    ("yellow", 45, 93),
    ("green", 142, 71),
    ("teal", 173, 80),
    ("blue", 217, 91),
    ("indigo", 239, 84),
    ("purple", 271, 91),
    ("pink", 330, 81),
];

const SHADE_LIGHTNESS: &[(&str, u8)] = &[
    ("50", 97),
    ("100", 94),
    ("200", 86),
    ("300", 77),
    ("400", 66),
    ("500", 56),
    ("600", 47),
    ("700", 39),
    ("800", 31),
    ("900", 24),
];

fn decls(pairs: &[(&str, &str)]) -> Vec<Declaration> {
    pairs
        .iter()
        .map(|(p, v)| (p.to_string(), v.to_string()))
        .collect()
}

fn lookup(table: &[(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn number(value: &str) -> Option<f64> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    value.parse::<f64>().ok()
}

fn spacing_value(value: &str) -> Option<String> {
    match value {
        "0" => Some("0px".to_string()),
        "px" => Some("1px".to_string()),
        _ => number(value).map(|n| format!("{}rem", n * 0.25)),
    }
}

fn fraction(value: &str) -> Option<String> {
    let (a, b) = value.split_once('/')?;
    let (a, b) = (number(a)?, number(b)?);
    if b == 0.0 {
        return None;
    }
    let percent = (a / b * 100.0 * 1_000_000.0).round() / 1_000_000.0;
    Some(format!("{}%", percent))
}

fn size_value(value: &str, axis_screen: &str) -> Option<String> {
    match value {
        "full" => Some("100%".to_string()),
        "screen" => Some(axis_screen.to_string()),
        "auto" => Some("auto".to_string()),
        "min" => Some("min-content".to_string()),
        "max" => Some("max-content".to_string()),
        "fit" => Some("fit-content".to_string()),
        _ => fraction(value).or_else(|| spacing_value(value)),
    }
}

/// Escape a class token for use in a selector
pub fn escape_selector(token: &str) -> String {
    let mut out = String::with_capacity(token.len() + 8);
    for (i, ch) in token.chars().enumerate() {
        if i == 0 && ch.is_ascii_digit() {
            out.push_str(&format!("\\3{} ", ch));
        } else if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('\\');
            out.push(ch);
        }
    }
    out
}

/// Turns utility tokens into CSS rules
#[derive(Debug, Clone, Default)]
pub struct RuleGenerator {
    shortcuts: BTreeMap<String, String>,
    colors: BTreeMap<String, Value>,
}

impl RuleGenerator {
    pub fn new(shortcuts: BTreeMap<String, String>, colors: BTreeMap<String, Value>) -> Self {
        Self { shortcuts, colors }
    }

    /// The rule for a token, or `None` when the token is not a utility
    pub fn generate(&self, token: &str) -> Option<UtilityRule> {
        let mut parts: Vec<&str> = token.split(':').collect();
        let utility = parts.pop()?;
        if utility.is_empty() {
            return None;
        }

        let mut media = None;
        let mut media_order = 0u8;
        let mut pseudo = String::new();
        let mut dark = false;
        let mut states = 0u8;
        let mut seen: Vec<&str> = Vec::new();
        for variant in parts {
            // Each variant may appear once, which also bounds `states`
            if seen.contains(&variant) {
                return None;
            }
            seen.push(variant);
            if let Some(pos) = BREAKPOINTS.iter().position(|(name, _)| *name == variant) {
                if media.is_some() {
                    return None;
                }
                media = Some(BREAKPOINTS[pos].1);
                media_order = pos as u8 + 1;
            } else if PSEUDO_VARIANTS.contains(&variant) {
                pseudo.push(':');
                pseudo.push_str(variant);
                states += 1;
            } else if variant == "dark" {
                dark = true;
                states += 1;
            } else {
                return None;
            }
        }

        let (important, utility) = match utility.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, utility),
        };
        let mut declarations = self.declarations(utility)?;
        if important {
            for (_, value) in declarations.iter_mut() {
                value.push_str(" !important");
            }
        }

        let mut selector = format!(".{}{}", escape_selector(token), pseudo);
        if dark {
            selector = format!(".dark {}", selector);
        }

        Some(UtilityRule {
            token: token.to_string(),
            selector,
            media,
            declarations,
            order: (media_order, states),
        })
    }

    fn declarations(&self, utility: &str) -> Option<Vec<Declaration>> {
        if let Some(expansion) = self.shortcuts.get(utility) {
            let mut merged = Vec::new();
            for part in expansion.split_whitespace() {
                // Shortcuts may not nest or carry variants
                if part.contains(':') || self.shortcuts.contains_key(part) {
                    continue;
                }
                merged.extend(self.base_declarations(part)?);
            }
            return if merged.is_empty() { None } else { Some(merged) };
        }
        self.base_declarations(utility)
    }

    fn base_declarations(&self, utility: &str) -> Option<Vec<Declaration>> {
        if let Some((_, pairs)) = STATIC_UTILITIES.iter().find(|(name, _)| *name == utility) {
            return Some(decls(pairs));
        }

        let (negative, body) = match utility.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, utility),
        };

        for (prefix, props) in SPACING {
            if let Some(value) = body.strip_prefix(prefix) {
                let allows_negative = !prefix.starts_with('p') && !prefix.starts_with("gap");
                if negative && !allows_negative {
                    return None;
                }
                let value = if value == "auto" && allows_negative && !prefix.starts_with("gap") {
                    "auto".to_string()
                } else {
                    spacing_value(value)?
                };
                let value = if negative { format!("-{}", value) } else { value };
                return Some(props.iter().map(|p| (p.to_string(), value.clone())).collect());
            }
        }
        if negative {
            return None;
        }

        if let Some(v) = body.strip_prefix("w-") {
            return size_value(v, "100vw").map(|v| vec![("width".to_string(), v)]);
        }
        if let Some(v) = body.strip_prefix("h-") {
            return size_value(v, "100vh").map(|v| vec![("height".to_string(), v)]);
        }
        if let Some(v) = body.strip_prefix("min-w-") {
            return size_value(v, "100vw").map(|v| vec![("min-width".to_string(), v)]);
        }
        if let Some(v) = body.strip_prefix("min-h-") {
            return size_value(v, "100vh").map(|v| vec![("min-height".to_string(), v)]);
        }
        if let Some(v) = body.strip_prefix("max-w-") {
            let value = lookup(MAX_WIDTHS, v)
                .map(str::to_string)
                .or_else(|| size_value(v, "100vw"))?;
            return Some(vec![("max-width".to_string(), value)]);
        }
        if let Some(v) = body.strip_prefix("max-h-") {
            return size_value(v, "100vh").map(|v| vec![("max-height".to_string(), v)]);
        }

        if let Some(v) = body.strip_prefix("text-") {
            if let Some((_, size, line)) = FONT_SIZES.iter().find(|(name, _, _)| *name == v) {
                return Some(decls(&[("font-size", *size), ("line-height", *line)]));
            }
            return self.color(v).map(|c| vec![("color".to_string(), c)]);
        }
        if let Some(v) = body.strip_prefix("bg-") {
            return self.color(v).map(|c| vec![("background-color".to_string(), c)]);
        }
        if let Some(v) = body.strip_prefix("border-") {
            if let Some(n) = number(v) {
                return Some(vec![("border-width".to_string(), format!("{}px", n))]);
            }
            return self.color(v).map(|c| vec![("border-color".to_string(), c)]);
        }
        if let Some(v) = body.strip_prefix("font-") {
            return lookup(FONT_WEIGHTS, v).map(|w| decls(&[("font-weight", w)]));
        }
        if let Some(v) = body.strip_prefix("leading-") {
            return lookup(LEADING, v).map(|l| decls(&[("line-height", l)]));
        }
        if let Some(v) = body.strip_prefix("tracking-") {
            return lookup(TRACKING, v).map(|t| decls(&[("letter-spacing", t)]));
        }
        if let Some(v) = body.strip_prefix("opacity-") {
            let n = number(v).filter(|n| *n <= 100.0)?;
            return Some(vec![("opacity".to_string(), format!("{}", n / 100.0))]);
        }
        if let Some(v) = body.strip_prefix("z-") {
            if v == "auto" {
                return Some(decls(&[("z-index", "auto")]));
            }
            let n = number(v).filter(|n| n.fract() == 0.0)?;
            return Some(vec![("z-index".to_string(), format!("{}", n))]);
        }
        if let Some(v) = body.strip_prefix("grid-cols-") {
            let n = number(v).filter(|n| n.fract() == 0.0 && *n >= 1.0 && *n <= 12.0)?;
            return Some(vec![(
                "grid-template-columns".to_string(),
                format!("repeat({}, minmax(0, 1fr))", n),
            )]);
        }
        None
    }

    /// Resolve a color name such as `blue-500`, `white` or a theme color
    fn color(&self, name: &str) -> Option<String> {
        match name {
            "white" => return Some("#fff".to_string()),
            "black" => return Some("#000".to_string()),
            "transparent" => return Some("transparent".to_string()),
            "current" => return Some("currentColor".to_string()),
            _ => {}
        }

        if let Some(value) = self.theme_color(name) {
            return Some(value);
        }

        let (color, shade) = name.rsplit_once('-')?;
        let (_, hue, saturation) = PALETTE.iter().find(|(c, _, _)| *c == color)?;
        let (_, lightness) = SHADE_LIGHTNESS.iter().find(|(s, _)| *s == shade)?;
        Some(format!("hsl({}, {}%, {}%)", hue, saturation, lightness))
    }

    fn theme_color(&self, name: &str) -> Option<String> {
        if let Some(Value::String(value)) = self.colors.get(name) {
            return Some(value.clone());
        }
        let (color, shade) = name.rsplit_once('-')?;
        match self.colors.get(color)? {
            Value::Object(shades) => shades.get(shade)?.as_str().map(str::to_string),
            _ => None,
        }
    }
}
