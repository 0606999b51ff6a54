//! Hypermedia links returned by invoke and subscribe

use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};

/// Link relation pointing at a follow-up resource
pub const REL_TASK_ID: &str = "taskid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

/// `{links:[...]}` response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    pub links: Vec<Link>,
}

impl Links {
    /// Single `taskid` link
    #[must_use]
    pub fn task(href: String) -> Self {
        Self {
            links: vec![Link {
                rel: REL_TASK_ID.to_string(),
                href,
            }],
        }
    }
}

/// Host used in absolute links: the configured public host, else the
/// request's `Host` header, else `localhost:{port}`
#[must_use]
pub fn link_host(public_host: Option<&str>, headers: &HeaderMap, port: u16) -> String {
    public_host
        .map(str::to_string)
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("localhost:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn public_host_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("10.0.0.5:8080"));
        assert_eq!(link_host(Some("things.example"), &headers, 8080), "things.example");
        assert_eq!(link_host(None, &headers, 8080), "10.0.0.5:8080");
        assert_eq!(link_host(None, &HeaderMap::new(), 8080), "localhost:8080");
    }

    #[test]
    fn task_link_shape() {
        let json = serde_json::to_value(Links::task("http://h/a/1".to_string())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"links": [{"rel": "taskid", "href": "http://h/a/1"}]})
        );
    }
}
