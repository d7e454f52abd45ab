// ABOUTME: Prism-style syntax highlighting for fenced code
// ABOUTME: Wraps comments, strings, keywords and numbers in token spans

use once_cell::sync::Lazy;
use regex::Regex;

struct Grammar {
    aliases: &'static [&'static str],
    pattern: Regex,
}

fn grammar(
    aliases: &'static [&'static str],
    comment: &str,
    extra: &str,
    keywords: &[&str],
) -> Grammar {
    let keyword = if keywords.is_empty() {
        // Never matches
        r"\b\B".to_string()
    } else {
        format!(r"\b(?:{})\b", keywords.join("|"))
    };
    let source = format!(
        r#"(?P<comment>{})|(?P<string>"(?:\\.|[^"\\\n])*"|'(?:\\.|[^'\\\n])*'{})|(?P<keyword>{})|(?P<number>\b\d+(?:\.\d+)?\b)"#,
        comment, extra, keyword
    );
    Grammar {
        aliases,
        pattern: Regex::new(&source).unwrap(),
    }
}

static GRAMMARS: Lazy<Vec<Grammar>> = Lazy::new(|| {
    vec![
        grammar(
            &["js", "javascript", "ts", "typescript", "jsx", "tsx", "mjs", "cjs", "json"],
            r"//[^\n]*|/\*[\s\S]*?\*/",
            r"|`(?:\\.|[^`\\])*`",
            &[
                "as", "async", "await", "break", "case", "catch", "class", "const", "continue",
                "default", "delete", "do", "else", "enum", "export", "extends", "false",
                "finally", "for", "from", "function", "if", "import", "in", "instanceof",
                "interface", "let", "new", "null", "of", "return", "static", "super", "switch",
                "this", "throw", "true", "try", "type", "typeof", "undefined", "var", "void",
                "while", "yield",
            ],
        ),
        grammar(
            &["rust", "rs"],
            r"//[^\n]*|/\*[\s\S]*?\*/",
            "",
            &[
                "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else",
                "enum", "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop",
                "match", "mod", "move", "mut", "pub", "ref", "return", "self", "Self", "static",
                "struct", "super", "trait", "true", "type", "unsafe", "use", "where", "while",
            ],
        ),
        grammar(
            &["py", "python"],
            r"#[^\n]*",
            "",
            &[
                "and", "as", "assert", "async", "await", "break", "class", "continue", "def",
                "del", "elif", "else", "except", "False", "finally", "for", "from", "global",
                "if", "import", "in", "is", "lambda", "None", "nonlocal", "not", "or", "pass",
                "raise", "return", "True", "try", "while", "with", "yield",
            ],
        ),
        grammar(
            &["sh", "bash", "shell", "zsh", "yaml", "yml", "toml"],
            r"#[^\n]*",
            "",
            &[
                "if", "then", "else", "elif", "fi", "for", "while", "do", "done", "case", "esac",
                "function", "export", "true", "false", "null",
            ],
        ),
        grammar(
            &["html", "vue", "xml", "svg", "markup"],
            r"<!--[\s\S]*?-->",
            "",
            &[],
        ),
        grammar(
            &["css", "scss", "less", "postcss"],
            r"/\*[\s\S]*?\*/",
            "",
            &["important"],
        ),
    ]
});

/// Escape text for HTML output
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Reverse the escaping applied by the markdown renderer to code text
pub fn unescape_html(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn find_grammar(lang: &str) -> Option<&'static Grammar> {
    let lang = lang.to_ascii_lowercase();
    GRAMMARS
        .iter()
        .find(|g| g.aliases.iter().any(|a| *a == lang))
}

/// Highlight raw code, returning escaped HTML with token spans.
/// Unknown languages are escaped without tokens.
pub fn highlight(code: &str, lang: &str) -> String {
    let grammar = match find_grammar(lang) {
        Some(g) => g,
        None => return escape_html(code),
    };

    let mut out = String::with_capacity(code.len() * 2);
    let mut last = 0;
    for caps in grammar.pattern.captures_iter(code) {
        let (kind, m) = match ["comment", "string", "keyword", "number"]
            .iter()
            .find_map(|name| caps.name(name).map(|m| (*name, m)))
        {
            Some(found) => found,
            None => continue,
        };
        out.push_str(&escape_html(&code[last..m.start()]));
        out.push_str(&format!(
            "<span class=\"token {}\">{}</span>",
            kind,
            escape_html(m.as_str())
        ));
        last = m.end();
    }
    out.push_str(&escape_html(&code[last..]));
    out
}
