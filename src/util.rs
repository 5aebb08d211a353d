use reqwest::Url;

/// Parse "true"/"false"/"1"/"0" from an owned String.
pub fn parse_bool_flag(s: String) -> Option<bool> {
    parse_bool_str(&s)
}

/// Parse "true"/"false"/"1"/"0" from a &str.
pub fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads an environment variable, treating blank values as unset.
pub fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Keeps the last `max_chars` characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((index, _)) => &text[index..],
        None => "",
    }
}

/// Returns true for localhost, loopback IPv4/IPv6, and 0.0.0.0 URLs.
pub fn is_local_endpoint_url(url: &str) -> bool {
    let parsed = match Url::parse(url.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    match parsed.host_str() {
        Some(host) => {
            let normalized = host.trim().to_ascii_lowercase();
            normalized == "localhost"
                || normalized == "::1"
                || normalized == "0.0.0.0"
                || normalized.starts_with("127.")
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_helpers() {
        assert_eq!(parse_bool_str("true"), Some(true));
        assert_eq!(parse_bool_str("0"), Some(false));
        assert_eq!(parse_bool_flag("YES".to_string()), Some(true));
        assert_eq!(parse_bool_flag("off".to_string()), Some(false));
        assert_eq!(parse_bool_str("maybe"), None);
    }

    #[test]
    fn test_is_local_endpoint_url_normalizes_case_and_space() {
        assert!(is_local_endpoint_url(" HTTP://LOCALHOST:8000/v1/messages "));
        assert!(is_local_endpoint_url("https://127.0.0.1/v1/completions"));
        assert!(is_local_endpoint_url("https://0.0.0.0/v1/chat/completions"));
        assert!(is_local_endpoint_url("http://localhost:8080/v1/completions"));
        assert!(!is_local_endpoint_url(
            "https://evil-localhost.com/v1/chat/completions"
        ));
        assert!(!is_local_endpoint_url(
            "https://api.openai.com/v1/chat/completions"
        ));
        assert!(!is_local_endpoint_url("not a url"));
    }

    #[test]
    fn test_tail_chars_counts_characters_not_bytes() {
        assert_eq!(tail_chars("hello", 10), "hello");
        assert_eq!(tail_chars("hello", 3), "llo");
        assert_eq!(tail_chars("héllo wörld", 5), "wörld");
        assert_eq!(tail_chars("abc", 0), "");
    }

    #[test]
    fn test_env_nonempty_ignores_blank_values() {
        let _guard = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var("CODELOOP_UTIL_TEST_VAR", "   ");
        assert_eq!(env_nonempty("CODELOOP_UTIL_TEST_VAR"), None);
        std::env::set_var("CODELOOP_UTIL_TEST_VAR", "value");
        assert_eq!(
            env_nonempty("CODELOOP_UTIL_TEST_VAR").as_deref(),
            Some("value")
        );
        std::env::remove_var("CODELOOP_UTIL_TEST_VAR");
    }
}
