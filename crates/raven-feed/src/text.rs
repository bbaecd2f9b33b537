//! Small helpers over the HTML bodies the editor produces.

/// Strip tags and decode the handful of entities the editor emits.
/// Block-level closers and `<br>` become newlines.
pub fn plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let mut tag = String::new();
                for t in chars.by_ref() {
                    if t == '>' {
                        break;
                    }
                    tag.push(t);
                }
                let name = tag
                    .trim_start_matches('/')
                    .split(|ch: char| ch.is_whitespace() || ch == '/')
                    .next()
                    .unwrap_or("")
                    .to_ascii_lowercase();
                let closing = tag.starts_with('/');
                let breaks = name == "br" || (closing && matches!(name.as_str(), "p" | "li" | "div" | "blockquote" | "pre"));
                if breaks && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            '&' => {
                let mut entity = String::new();
                while let Some(&e) = chars.peek() {
                    if !(e.is_ascii_alphanumeric() || e == '#') || entity.len() > 8 {
                        break;
                    }
                    entity.push(e);
                    chars.next();
                }
                let decoded = match entity.as_str() {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "#39" | "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                };
                match (decoded, chars.peek()) {
                    (Some(ch), Some(';')) => {
                        chars.next();
                        out.push(ch);
                    }
                    _ => {
                        out.push('&');
                        out.push_str(&entity);
                    }
                }
            }
            _ => out.push(c),
        }
    }

    out.trim_end_matches('\n').to_string()
}

/// First http(s) URL in the text, used to decide on a link preview card.
pub fn first_url(text: &str) -> Option<&str> {
    let start = text.find("https://").or_else(|| text.find("http://"))?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || matches!(c, '"' | '<' | '>' | '\''))
        .unwrap_or(rest.len());
    let url = rest[..end].trim_end_matches(['.', ',', ')', ';']);
    (url.len() > "https://".len()).then_some(url)
}
