//! Helpers for the rich-text fields (question content, answers, task
//! descriptions and notes): visible-text extraction, sanitization before
//! storage, and search-term highlighting.

use once_cell::sync::Lazy;
use regex::Regex;

const BLOCKED_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "applet", "noscript", "template",
];

static BLOCKED_WITH_CONTENT: Lazy<Vec<Regex>> = Lazy::new(|| {
    BLOCKED_ELEMENTS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("valid element regex")
        })
        .collect()
});

static BLOCKED_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(script|style|iframe|object|embed|applet|noscript|template|meta|link|base|form|frame|frameset)\b[^>]*>")
        .expect("valid tag regex")
});

static COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

// Quoted attribute values may contain `>`.
static OPEN_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<([a-zA-Z][a-zA-Z0-9:-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#).expect("valid open tag regex")
});

// Unquoted values also stop at `/`, so `<img/src=x/onerror=..>` splits into
// separate attributes and the handler is dropped.
static ATTRS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'<>/]+)))?"#).expect("valid attr regex")
});

static CHAR_REFS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)&#(x[0-9a-f]+|[0-9]+);?").expect("valid char ref regex"));

const URL_ATTRS: &[&str] = &[
    "href", "src", "xlink:href", "action", "formaction", "background", "poster", "cite", "srcset", "data",
];

const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto", "ftp", "ftps", "tel"];

const INLINE_IMAGES: &[&str] = &["data:image/png", "data:image/jpeg", "data:image/gif", "data:image/webp"];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Remove every tag and comment, keeping text content.
///
/// Quoted attribute values may contain `>`; an unterminated tag or comment
/// swallows the rest of the input.
pub fn strip_tags(html: &str) -> String {
    let chars: Vec<char> = html.chars().collect();
    let len = chars.len();
    let mut out = String::with_capacity(html.len());
    let mut i = 0;

    while i < len {
        if chars[i] != '<' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        if i + 3 < len && chars[i + 1] == '!' && chars[i + 2] == '-' && chars[i + 3] == '-' {
            i += 4;
            let mut closed = false;
            while i + 2 < len {
                if chars[i] == '-' && chars[i + 1] == '-' && chars[i + 2] == '>' {
                    i += 3;
                    closed = true;
                    break;
                }
                i += 1;
            }
            if !closed {
                break;
            }
            continue;
        }
        i += 1;
        let (mut single, mut double) = (false, false);
        while i < len {
            match chars[i] {
                '"' if !single => double = !double,
                '\'' if !double => single = !single,
                '>' if !single && !double => {
                    i += 1;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
    }
    out
}

/// Decode the handful of entities an editor commonly emits.
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Text a reader would actually see: markup stripped, entities decoded,
/// whitespace collapsed and trimmed.
pub fn visible_text(html: &str) -> String {
    let decoded = decode_entities(&strip_tags(html));
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

pub fn has_visible_text(html: &str) -> bool {
    !visible_text(html).is_empty()
}

pub fn visible_len(html: &str) -> usize {
    visible_text(html).chars().count()
}

/// Decode character references and the named entities that can hide a URL
/// scheme, then drop whitespace and control characters the way a browser
/// does when it reads the scheme.
fn normalize_url(value: &str) -> String {
    let decoded = CHAR_REFS.replace_all(value, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32).map(String::from).unwrap_or_default()
    });
    let decoded = decode_entities(&decoded)
        .replace("&colon;", ":")
        .replace("&Tab;", "")
        .replace("&NewLine;", "");
    decoded
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_lowercase()
}

/// Relative references and an allow-list of schemes pass; anything else
/// (`javascript:`, `vbscript:`, `data:text/html`, unknown schemes) does not.
pub fn is_safe_url(value: &str) -> bool {
    let url = normalize_url(value);
    let scheme_end = match url.find(':') {
        Some(i) => i,
        None => return true,
    };
    if url[..scheme_end].contains(['/', '?', '#']) {
        return true;
    }
    SAFE_SCHEMES.contains(&&url[..scheme_end]) || INLINE_IMAGES.iter().any(|p| url.starts_with(p))
}

fn unsafe_style(value: &str) -> bool {
    let style = normalize_url(value);
    style.contains("javascript:") || style.contains("expression(") || style.contains("vbscript:")
}

/// Rebuild an opening tag keeping only harmless attributes, each re-quoted
/// so the browser reads it exactly as we did.
fn clean_tag(name: &str, attrs: &str) -> String {
    let mut out = format!("<{name}");
    for caps in ATTRS.captures_iter(attrs) {
        let attr = caps[1].to_ascii_lowercase();
        if attr.starts_with("on") {
            continue;
        }
        let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4)).map(|m| m.as_str());
        match value {
            Some(v) if URL_ATTRS.contains(&attr.as_str()) && !is_safe_url(v) => continue,
            Some(v) if attr == "style" && unsafe_style(v) => continue,
            Some(v) => {
                out.push(' ');
                out.push_str(&caps[1]);
                out.push_str("=\"");
                out.push_str(&v.replace('"', "&quot;"));
                out.push('"');
            }
            None => {
                out.push(' ');
                out.push_str(&caps[1]);
            }
        }
    }
    if attrs.trim_end().ends_with('/') {
        out.push('/');
    }
    out.push('>');
    out
}

/// Sanitize rich text before it is stored.
pub fn sanitize_rich_text(html: &str) -> String {
    let mut out = COMMENTS.replace_all(html, "").into_owned();
    for re in BLOCKED_WITH_CONTENT.iter() {
        out = re.replace_all(&out, "").into_owned();
    }
    out = BLOCKED_TAGS.replace_all(&out, "").into_owned();
    out = OPEN_TAGS
        .replace_all(&out, |caps: &regex::Captures| clean_tag(&caps[1], &caps[2]))
        .into_owned();
    out.trim().to_string()
}

/// Plain-text fields (titles) keep no markup at all.
pub fn plain_text(input: &str) -> String {
    strip_tags(input).trim().to_string()
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape `text` and wrap case-insensitive occurrences of `query` in
/// `<mark class="highlight">`.
pub fn highlight(text: &str, query: &str) -> String {
    let escaped = escape(text);
    let needle = query.trim();
    if needle.is_empty() {
        return escaped;
    }
    match Regex::new(&format!("(?i){}", regex::escape(&escape(needle)))) {
        Ok(re) => re
            .replace_all(&escaped, r#"<mark class="highlight">$0</mark>"#)
            .into_owned(),
        Err(_) => escaped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_handles_quotes_and_comments() {
        assert_eq!(strip_tags("<p>Hello <b>World</b></p>"), "Hello World");
        assert_eq!(strip_tags(r#"<a title="x>y">Link</a>"#), "Link");
        assert_eq!(strip_tags("Hello<!-- hidden -->World"), "HelloWorld");
        assert_eq!(strip_tags("Hello<br"), "Hello");
    }

    #[test]
    fn empty_editor_markup_has_no_visible_text() {
        assert!(!has_visible_text(""));
        assert!(!has_visible_text("<p>&nbsp;</p>"));
        assert!(!has_visible_text("<p>   </p><br/>"));
        assert!(has_visible_text("<p>ok</p>"));
        assert_eq!(visible_text("<p>a\n\n  b</p>"), "a b");
    }

    #[test]
    fn sanitize_drops_scripts_handlers_and_js_urls() {
        let dirty = r#"<p onclick="steal()">Hi</p><script>alert(1)</script><a href="javascript:alert(1)">x</a><img src=x onerror=alert(1)>"#;
        let clean = sanitize_rich_text(dirty);
        assert!(!clean.contains("script"));
        assert!(!clean.contains("onclick"));
        assert!(!clean.contains("onerror"));
        assert!(!clean.contains("javascript:"));
        assert!(clean.contains("<p>Hi</p>"));
        assert!(clean.contains("<a>x</a>"));
    }

    #[test]
    fn sanitize_handles_slash_separators_and_encoded_schemes() {
        let clean = sanitize_rich_text("<p>ok</p><img/src=x/onerror=alert(1)>");
        assert!(!clean.contains("onerror"));
        assert!(clean.starts_with("<p>ok</p><img"));

        let clean = sanitize_rich_text(r#"<img src="x"onerror="alert(1)">"#);
        assert_eq!(clean, r#"<img src="x">"#);

        for payload in [
            r#"<a href="&#106;avascript:alert(1)">x</a>"#,
            r#"<a href="&#x6A;avascript:alert(1)">x</a>"#,
            r#"<a href="&#106avascript:alert(1)">x</a>"#,
            r#"<a href="java&#x09;script:alert(1)">x</a>"#,
            r#"<a href="javascript&colon;alert(1)">x</a>"#,
            r#"<a href=" JaVaScRiPt:alert(1)">x</a>"#,
            r#"<a href='data:text/html,<b>x</b>'>x</a>"#,
        ] {
            assert_eq!(sanitize_rich_text(payload), "<a>x</a>", "{payload}");
        }
    }

    #[test]
    fn url_allow_list() {
        assert!(is_safe_url("https://example.com/a?b=1&amp;c=2"));
        assert!(is_safe_url("/media/questions/question_1/a.png"));
        assert!(is_safe_url("#section"));
        assert!(is_safe_url("docs/page.html"));
        assert!(is_safe_url("mailto:it@example.com"));
        assert!(is_safe_url("data:image/png;base64,iVBORw0KGgo="));
        assert!(!is_safe_url("vbscript:msgbox(1)"));
        assert!(!is_safe_url("data:image/svg+xml,<svg/onload=alert(1)>"));
    }

    #[test]
    fn sanitize_keeps_ordinary_markup() {
        let html = r#"<h2>Title</h2><p>Some <strong>bold</strong> <a href="https://example.com">link</a></p>"#;
        assert_eq!(sanitize_rich_text(html), html);
    }

    #[test]
    fn highlight_marks_matches_case_insensitively() {
        assert_eq!(
            highlight("Learning Django <fast>", "django"),
            r#"Learning <mark class="highlight">Django</mark> &lt;fast&gt;"#
        );
        assert_eq!(highlight("a.b", "."), r#"a<mark class="highlight">.</mark>b"#);
    }
}
