#![allow(dead_code)]

use std::net::TcpListener;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Wraps `inner` in a minimal results page body.
pub fn results_page(inner: &str) -> String {
    format!(
        "<html><head><title>Search</title></head><body><div class=\"sidebar\">{}</div></body></html>",
        inner
    )
}

/// Page carrying the primary `span#sidebar-title` element.
pub fn primary_page(text: &str) -> String {
    results_page(&format!("<span id=\"sidebar-title\">{}</span>", text))
}

/// Page carrying only the fallback result counter element.
pub fn fallback_page(text: &str) -> String {
    results_page(&format!(
        "<span qaselector=\"sidebar-result-counter\">{}</span>",
        text
    ))
}

fn html(status: u16, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_string(body.to_string())
        .insert_header("content-type", "text/html; charset=utf-8")
}

/// Creates a mock server that serves `body` with 200 OK at `url_path`.
pub async fn mock_page_server(url_path: &str, body: &str) -> MockServer {
    let server = MockServer::start().await;
    mount_page(&server, url_path, body).await;
    server
}

/// Mounts a 200 OK page at `url_path` on an existing server.
pub async fn mount_page(server: &MockServer, url_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(html(200, body))
        .mount(server)
        .await;
}

/// Mounts a response with `status_code` at `url_path` on an existing server.
pub async fn mount_status(server: &MockServer, url_path: &str, status_code: u16) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(server)
        .await;
}

/// Creates a mock server that answers `status_code` for the first `failures`
/// requests to `url_path` and serves `body` afterwards.
pub async fn mock_flaky_server(url_path: &str, status_code: u16, failures: u64, body: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status_code))
        .up_to_n_times(failures)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(html(200, body))
        .with_priority(2)
        .mount(&server)
        .await;

    server
}

/// Creates a mock server that returns the specified HTTP status for every request.
pub async fn mock_error_server(status_code: u16) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(&server)
        .await;

    server
}

/// Creates a mock server that delays every response by `delay_ms` milliseconds.
pub async fn mock_timeout_server(delay_ms: u64) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(html(200, &primary_page("too late")).set_delay(Duration::from_millis(delay_ms)))
        .mount(&server)
        .await;

    server
}

/// Creates a mock server whose first `slow` responses at `url_path` are
/// delayed by `delay_ms` and whose later responses are immediate.
pub async fn mock_slow_then_fast_server(url_path: &str, slow: u64, delay_ms: u64, body: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(html(200, body).set_delay(Duration::from_millis(delay_ms)))
        .up_to_n_times(slow)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(html(200, body))
        .with_priority(2)
        .mount(&server)
        .await;

    server
}

/// Returns a URL on a local port nobody is listening on.
pub fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/search", port)
}

/// Number of requests the server has seen so far.
pub async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_page_server_serves_html() {
        let server = mock_page_server("/search", &primary_page("12 results")).await;

        let body = reqwest::get(format!("{}/search", server.uri()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains("sidebar-title"));
        assert!(body.contains("12 results"));
    }

    #[tokio::test]
    async fn test_mock_flaky_server_recovers() {
        let server = mock_flaky_server("/search", 403, 1, &primary_page("ok")).await;
        let url = format!("{}/search", server.uri());

        assert_eq!(reqwest::get(&url).await.unwrap().status(), 403);
        assert_eq!(reqwest::get(&url).await.unwrap().status(), 200);
    }
}
