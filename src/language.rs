//! Languages offered for dubbing.

/// Display name and code of every language the pipeline offers.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("English", "en"),
    ("Spanish", "es"),
    ("French", "fr"),
    ("German", "de"),
    ("Hindi", "hi"),
    ("Tamil", "ta"),
    ("Arabic", "ar"),
    ("Chinese (Simplified)", "zh-cn"),
    ("Japanese", "ja"),
    ("Korean", "ko"),
    ("Portuguese", "pt"),
    ("Russian", "ru"),
    ("Italian", "it"),
    ("Dutch", "nl"),
    ("Polish", "pl"),
    ("Turkish", "tr"),
    ("Vietnamese", "vi"),
    ("Thai", "th"),
    ("Indonesian", "id"),
    ("Malay", "ms"),
];

pub const DEFAULT_TARGET_LANGUAGE: &str = "hi";
pub const DEFAULT_SOURCE_LANGUAGE: &str = "en";

/// Resolve a language code or display name (case-insensitive) to its code.
pub fn resolve_language(input: &str) -> Option<&'static str> {
    let needle = input.trim();
    LANGUAGES
        .iter()
        .find(|(name, code)| code.eq_ignore_ascii_case(needle) || name.eq_ignore_ascii_case(needle))
        .map(|(_, code)| *code)
}

/// Display name for a code, falling back to the code itself.
pub fn language_name(code: &str) -> String {
    LANGUAGES
        .iter()
        .find(|(_, c)| c.eq_ignore_ascii_case(code))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_by_code_or_name() {
        assert_eq!(resolve_language("hi"), Some("hi"));
        assert_eq!(resolve_language("Hindi"), Some("hi"));
        assert_eq!(resolve_language("chinese (simplified)"), Some("zh-cn"));
        assert_eq!(resolve_language(" ZH-CN "), Some("zh-cn"));
        assert_eq!(resolve_language("Klingon"), None);
    }

    #[test]
    fn test_language_name_fallback() {
        assert_eq!(language_name("ja"), "Japanese");
        assert_eq!(language_name("sv"), "sv");
    }
}
