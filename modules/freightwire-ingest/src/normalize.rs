//! Deterministic text normalization: identical input always produces
//! identical output. Pipeline order: HTML unescape, tag strip (preserving
//! paragraph breaks), whitespace collapse, Unicode NFKC, full-width
//! punctuation fold, title desuffixing.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
            .expect("script/style regex")
    })
}

fn block_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<(br\s*/?|/p|/div|/li|/tr|/h[1-6]|/blockquote)>").expect("block regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag regex"))
}

/// Full normalization for HTML-shaped input.
pub fn normalize_html_text(html: &str) -> String {
    let unescaped = unescape_entities(html);
    let stripped = strip_tags(&unescaped);
    finish(&stripped)
}

/// Normalization for already-plain text (feed summaries, API bodies).
pub fn clean_text(text: &str) -> String {
    finish(&unescape_entities(text))
}

/// Title normalization: single line, NFKC, punctuation folded.
pub fn clean_title(title: &str) -> String {
    let cleaned = clean_text(title);
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn finish(text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    let nfkc: String = collapsed.nfkc().collect();
    fold_fullwidth_punctuation(&nfkc)
}

/// Decode the common named entities plus numeric references.
pub fn unescape_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '&' {
            out.push(c);
            continue;
        }
        let rest = &input[i..];
        let end = match rest.find(';') {
            Some(end) if end <= 11 => end,
            _ => {
                out.push(c);
                continue;
            }
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse().ok()
                    }
                })
                .and_then(char::from_u32),
        };
        match decoded {
            Some(d) => {
                out.push(d);
                // skip the consumed entity
                for _ in 0..end {
                    chars.next();
                }
            }
            None => out.push(c),
        }
    }
    out
}

/// Remove tags, turning block-level closers into paragraph breaks.
fn strip_tags(html: &str) -> String {
    let without_scripts = script_style_re().replace_all(html, " ");
    let with_breaks = block_close_re().replace_all(&without_scripts, "\n\n");
    tag_re().replace_all(&with_breaks, " ").into_owned()
}

/// Collapse runs of spaces/tabs; keep at most one blank line between
/// paragraphs.
fn collapse_whitespace(text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs.join("\n\n")
}

/// Fold CJK full-width punctuation to ASCII. NFKC already handles the
/// FF01–FF5E block; this covers the ideographic marks it leaves alone.
fn fold_fullwidth_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '，' | '、' => ',',
            '。' => '.',
            '！' => '!',
            '？' => '?',
            '：' => ':',
            '；' => ';',
            '（' => '(',
            '）' => ')',
            '【' => '[',
            '】' => ']',
            '《' | '》' | '“' | '”' | '「' | '」' | '『' | '』' => '"',
            '‘' | '’' => '\'',
            '　' => ' ',
            '～' => '~',
            other => other,
        })
        .collect()
}

/// Drop a trailing "| Source Name" style suffix when it names the source.
pub fn desuffix_title(title: &str, source_name: &str) -> String {
    let source = source_name.trim().to_lowercase();
    if source.is_empty() {
        return title.to_string();
    }
    for sep in [" | ", " - ", " – ", " — "] {
        if let Some(idx) = title.rfind(sep) {
            let suffix = title[idx + sep.len()..].trim().to_lowercase();
            if suffix == source {
                return title[..idx].trim_end().to_string();
            }
        }
    }
    title.to_string()
}

/// Reduce markdown to plain prose: links keep their text, images and
/// formatting markers disappear.
pub fn markdown_to_text(markdown: &str) -> String {
    static IMAGE_RE: OnceLock<Regex> = OnceLock::new();
    static LINK_RE: OnceLock<Regex> = OnceLock::new();
    static MARKER_RE: OnceLock<Regex> = OnceLock::new();
    let image_re =
        IMAGE_RE.get_or_init(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("image regex"));
    let link_re =
        LINK_RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("link regex"));
    let marker_re = MARKER_RE
        .get_or_init(|| Regex::new(r"(?m)^#{1,6}\s+|[*_`]{1,3}|^>\s?").expect("marker regex"));

    let no_images = image_re.replace_all(markdown, "");
    let no_links = link_re.replace_all(&no_images, "$1");
    let plain = marker_re.replace_all(&no_links, "");
    collapse_whitespace(&plain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_deterministic() {
        let input = "<p>Ｒates　ｕｐ！</p>\n<p>More&nbsp;detail&hellip;</p>";
        assert_eq!(normalize_html_text(input), normalize_html_text(input));
    }

    #[test]
    fn strips_tags_preserving_paragraphs() {
        let html = "<div><p>First paragraph.</p><p>Second   paragraph.</p></div>";
        let out = normalize_html_text(html);
        assert_eq!(out, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn drops_script_and_style_blocks() {
        let html = "<p>Visible</p><script>var x = '<p>hidden</p>';</script><style>p{}</style>";
        let out = normalize_html_text(html);
        assert_eq!(out, "Visible");
    }

    #[test]
    fn unescapes_entities() {
        assert_eq!(unescape_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(unescape_entities("&#65;&#x42;"), "AB");
        assert_eq!(unescape_entities("broken &amp"), "broken &amp");
    }

    #[test]
    fn nfkc_folds_fullwidth_ascii() {
        assert_eq!(clean_text("ＡＢＣ１２３"), "ABC123");
    }

    #[test]
    fn folds_cjk_punctuation() {
        assert_eq!(clean_text("货运，涨价。真的！"), "货运,涨价.真的!");
        assert_eq!(clean_text("《公告》：测试"), "\"公告\":测试");
    }

    #[test]
    fn desuffix_removes_matching_source() {
        assert_eq!(
            desuffix_title("Rates surge | The Loadstar", "The Loadstar"),
            "Rates surge"
        );
        assert_eq!(
            desuffix_title("Rates surge - the loadstar", "The Loadstar"),
            "Rates surge"
        );
    }

    #[test]
    fn desuffix_keeps_unrelated_suffix() {
        assert_eq!(
            desuffix_title("Rates surge | Market Report", "The Loadstar"),
            "Rates surge | Market Report"
        );
    }

    #[test]
    fn markdown_to_text_keeps_link_text() {
        let md = "# Title\n\nSee [the report](https://example.com) for *details*.";
        let out = markdown_to_text(md);
        assert_eq!(out, "Title\n\nSee the report for details.");
    }
}
