use std::collections::HashMap;

/// Parse query parameters from a URI or a bare query string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use chorus::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/api/posts?page=2&limit=5");
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// assert_eq!(params.get("limit"), Some(&"5".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    let query = match uri.find('?') {
        Some(query_start) => &uri[query_start + 1..],
        None if uri.contains('=') => uri,
        None => return params,
    };

    for param in query.split('&').filter(|p| !p.is_empty()) {
        if let Some(eq_idx) = param.find('=') {
            let key = &param[..eq_idx];
            let encoded_value = &param[eq_idx + 1..];
            let decoded = urlencoding::decode(encoded_value)
                .unwrap_or(std::borrow::Cow::Borrowed(encoded_value))
                .to_string();
            params.insert(key.to_string(), decoded);
        } else {
            // Flag parameter without value
            params.insert(param.to_string(), String::new());
        }
    }

    params
}

/// Get a positive integer parameter, if present and valid
pub fn get_int(params: &HashMap<String, String>, key: &str) -> Option<usize> {
    params
        .get(key)
        .and_then(|s| s.parse::<usize>().ok())
        .map(|n| n.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_uri_and_bare_query() {
        let params = parse_query_params("/api/posts?page=3&flag");
        assert_eq!(get_int(&params, "page"), Some(3));
        assert_eq!(params.get("flag"), Some(&String::new()));

        let bare = parse_query_params("limit=0");
        assert_eq!(get_int(&bare, "limit"), Some(1));
    }

    #[test]
    fn decodes_values_and_ignores_missing() {
        let params = parse_query_params("/x?name=hello%20world");
        assert_eq!(params.get("name").map(String::as_str), Some("hello world"));
        assert_eq!(get_int(&params, "page"), None);
        assert!(parse_query_params("/x").is_empty());
    }
}
