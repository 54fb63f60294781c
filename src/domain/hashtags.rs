//! Tag name normalization and `#hashtag` extraction from post bodies.

use super::error::DomainError;

pub const MAX_TAG_LEN: usize = 64;

fn is_tag_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '-'
}

/// Canonical form of a tag name: trimmed, one leading `#` removed, lowercased.
pub fn normalize_tag_name(raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    let name = trimmed.strip_prefix('#').unwrap_or(trimmed).to_lowercase();

    let Some(first) = name.chars().next() else {
        return Err(DomainError::validation("tag name is required"));
    };
    if !first.is_alphanumeric() {
        return Err(DomainError::validation(format!(
            "tag `{raw}` must start with a letter or digit"
        )));
    }
    if name.chars().count() > MAX_TAG_LEN {
        return Err(DomainError::validation(format!(
            "tag `{raw}` exceeds {MAX_TAG_LEN} characters"
        )));
    }
    if !name.chars().all(is_tag_char) {
        return Err(DomainError::validation(format!(
            "tag `{raw}` contains unsupported characters"
        )));
    }

    Ok(name)
}

/// Normalize a batch of tag names, dropping duplicates but keeping first-seen order.
pub fn normalize_tag_names<I, S>(names: I) -> Result<Vec<String>, DomainError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = Vec::new();
    for name in names {
        let normalized = normalize_tag_name(name.as_ref())?;
        if !seen.contains(&normalized) {
            seen.push(normalized);
        }
    }
    Ok(seen)
}

/// Extract normalized `#hashtags` from free text.
///
/// A `#` only opens a hashtag at the start of the text or after a character
/// that cannot be part of a tag, so `page#anchor` is ignored. Over-long
/// tokens are skipped rather than truncated.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut previous: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        let opens = ch == '#' && previous.is_none_or(|prev| !is_tag_char(prev) && prev != '#');
        previous = Some(ch);
        if !opens {
            continue;
        }

        let start = index + ch.len_utf8();
        let mut end = start;
        while let Some(&(next_index, next)) = chars.peek() {
            if !is_tag_char(next) {
                break;
            }
            end = next_index + next.len_utf8();
            previous = Some(next);
            chars.next();
        }

        let token = text[start..end].trim_end_matches(['-', '_']);
        match normalize_tag_name(token) {
            Ok(tag) if !tags.contains(&tag) => tags.push(tag),
            _ => {}
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_hash_and_lowercases() {
        assert_eq!(normalize_tag_name("  #Rust ").expect("valid"), "rust");
        assert_eq!(normalize_tag_name("Web-Dev").expect("valid"), "web-dev");
        assert!(normalize_tag_name("#").is_err());
        assert!(normalize_tag_name("-dash").is_err());
        assert!(normalize_tag_name("two words").is_err());
        assert!(normalize_tag_name(&"a".repeat(MAX_TAG_LEN + 1)).is_err());
    }

    #[test]
    fn normalize_batch_deduplicates() {
        let names = normalize_tag_names(["Rust", "#rust", "tokio"]).expect("valid");
        assert_eq!(names, vec!["rust".to_string(), "tokio".to_string()]);
    }

    #[test]
    fn extract_finds_tags_in_order() {
        let text = "Shipping #Rust and #tokio today. #rust again, see https://x.io/page#anchor";
        assert_eq!(extract_hashtags(text), vec!["rust", "tokio"]);
    }

    #[test]
    fn extract_handles_punctuation_and_unicode() {
        let text = "(#café) #web-dev- ##double #_bad #ok.";
        assert_eq!(extract_hashtags(text), vec!["café", "web-dev", "ok"]);
    }

    #[test]
    fn extract_skips_overlong_tokens() {
        let text = format!("#{} #short", "x".repeat(MAX_TAG_LEN + 1));
        assert_eq!(extract_hashtags(&text), vec!["short"]);
    }
}
