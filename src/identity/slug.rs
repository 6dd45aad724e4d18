/// Maximum length of a slug
const MAX_SLUG_LENGTH: usize = 100;

/// Slug used when a title has no usable characters
const UNTITLED: &str = "untitled";

/// Characters that separate words; runs of them become a single dash
fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '-' | '_' | '.' | '/' | '\\')
}

/// Turn a display title into a path-safe slug
///
/// Lower-cases ASCII letters, keeps digits, collapses separator runs into a
/// single `-` and drops everything else. The result is used in object paths
/// and as the show lookup key, so it must stay stable for a given input.
pub fn sanitize_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else if is_separator(c) {
            pending_separator = true;
        }
    }

    let truncated = truncate_at_boundary(&slug, MAX_SLUG_LENGTH);
    if truncated.is_empty() {
        UNTITLED.to_string()
    } else {
        truncated
    }
}

/// Truncate an ASCII slug, preferring to cut at a dash
fn truncate_at_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let truncated = &s[..max_len];
    if let Some(pos) = truncated.rfind('-')
        && pos > max_len / 2
    {
        return truncated[..pos].to_string();
    }

    truncated.trim_end_matches('-').to_string()
}
