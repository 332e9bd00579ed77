use uuid::Uuid;

const MAX_SLUG_CHARS: usize = 60;

/// Slug из латиницы, цифр, `-` и иероглифов CJK.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_dash = true;
            continue;
        }
        if !is_slug_char(ch) {
            continue;
        }
        if pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        pending_dash = false;
        slug.push(ch);
    }

    match slug.char_indices().nth(MAX_SLUG_CHARS) {
        Some((cut, _)) => slug[..cut].trim_end_matches('-').to_string(),
        None => slug,
    }
}

pub fn slugify_or_fallback(input: &str, prefix: &str) -> String {
    let slug = slugify(input);
    if !slug.is_empty() {
        return slug;
    }
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &suffix[..6])
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.chars().count() <= MAX_SLUG_CHARS
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug.chars().all(|ch| ch == '-' || is_slug_char(ch))
}

fn is_slug_char(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch.is_ascii_digit() || ('\u{4e00}'..='\u{9fa5}').contains(&ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_joins_words() {
        assert_eq!(slugify("  Hello World  "), "hello-world");
        assert_eq!(slugify("snake_case and  spaces"), "snake-case-and-spaces");
    }

    #[test]
    fn slugify_drops_punctuation_and_collapses_dashes() {
        assert_eq!(slugify("Rust: 2024 -- edition!"), "rust-2024-edition");
        assert_eq!(slugify("--leading and trailing--"), "leading-and-trailing");
    }

    #[test]
    fn slugify_keeps_cjk_ideographs() {
        assert_eq!(slugify("技术 笔记"), "技术-笔记");
    }

    #[test]
    fn slugify_truncates_long_titles() {
        let slug = slugify(&"word ".repeat(40));
        assert!(slug.chars().count() <= 60);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn fallback_is_used_for_unsluggable_input() {
        let slug = slugify_or_fallback("!!!", "cat");
        assert!(slug.starts_with("cat-"));
        assert_eq!(slug.len(), "cat-".len() + 6);
        assert!(is_valid_slug(&slug));
    }

    #[test]
    fn is_valid_slug_rejects_bad_shapes() {
        assert!(is_valid_slug("a-b-c"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("-a"));
        assert!(!is_valid_slug("a--b"));
        assert!(!is_valid_slug("Upper"));
        assert!(!is_valid_slug("with space"));
    }
}
