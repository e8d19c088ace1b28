//! 会话凭据提取
//!
//! 令牌优先从 cookie 读取，浏览器以外的客户端可以用 `?token=` 查询参数代替。

use application::SessionCredentials;
use axum::http::{header, HeaderMap};

pub fn credentials_from_request(
    headers: &HeaderMap,
    cookie_name: &str,
    query_token: Option<&str>,
) -> SessionCredentials {
    let token = cookie_value(headers, cookie_name)
        .or_else(|| query_token.filter(|token| !token.is_empty()).map(str::to_string));

    match token {
        Some(token) => SessionCredentials::new(token),
        None => SessionCredentials::anonymous(),
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn reads_named_cookie() {
        let creds = credentials_from_request(
            &headers("theme=dark; session_token=abc123; lang=en"),
            "session_token",
            None,
        );
        assert_eq!(creds.token.as_deref(), Some("abc123"));
    }

    #[test]
    fn cookie_wins_over_query() {
        let creds = credentials_from_request(&headers("session_token=abc"), "session_token", Some("xyz"));
        assert_eq!(creds.token.as_deref(), Some("abc"));
    }

    #[test]
    fn falls_back_to_query_token() {
        let creds = credentials_from_request(&headers("other=1"), "session_token", Some("xyz"));
        assert_eq!(creds.token.as_deref(), Some("xyz"));
    }

    #[test]
    fn missing_everywhere_is_anonymous() {
        let creds = credentials_from_request(&HeaderMap::new(), "session_token", Some(""));
        assert!(creds.token.is_none());
    }
}
