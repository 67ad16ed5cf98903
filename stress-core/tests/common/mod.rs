use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    http::{HeaderMap, Method, StatusCode},
};
use stress_core::{
    HeaderSource, HttpTransport, LoadRunner, RequestExecutor, token_bucket::RateLimiter,
};
use tokio::net::TcpListener;

pub type Hits = Arc<AtomicUsize>;

pub fn hits() -> Hits {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(hits: &Hits) -> usize {
    hits.load(Ordering::SeqCst)
}

/// bind an ephemeral port and serve `app` on it
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("test server addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    addr
}

/// every request gets `status`
pub fn status_app(status: StatusCode, hits: Hits) -> Router {
    Router::new().fallback(move || {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            (status, "bad request: unsupported path")
        }
    })
}

/// answers 200, but only after `delay`
pub fn slow_app(delay: Duration, hits: Hits) -> Router {
    Router::new().fallback(move || {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            StatusCode::OK
        }
    })
}

/// 200 only for a JSON stats POST carrying the api key
pub fn api_app(hits: Hits) -> Router {
    Router::new().fallback(move |method: Method, headers: HeaderMap, body: String| {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
            if method != Method::POST {
                return (StatusCode::BAD_REQUEST, format!("wrong method {method}"));
            }
            if header("content-type") != Some("application/json") {
                return (StatusCode::BAD_REQUEST, "wrong content type".to_string());
            }
            if header("x-api-key") != Some("secret") {
                return (StatusCode::BAD_REQUEST, "missing api key".to_string());
            }
            if body != r#"{"action":"get_stats"}"# {
                return (StatusCode::BAD_REQUEST, format!("unexpected body {body}"));
            }
            (StatusCode::OK, "{}".to_string())
        }
    })
}

pub fn header_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "stress-it-{}-{name}.json",
        std::process::id()
    ));
    std::fs::write(&path, contents).expect("write header file");
    path
}

pub fn runner(timeout: Duration, headers: impl Into<PathBuf>) -> LoadRunner<HttpTransport> {
    let limiter = Arc::new(RateLimiter::new(100.0, 1).expect("limiter"));
    let transport = HttpTransport::new(timeout).expect("http client");
    LoadRunner::new(
        limiter,
        RequestExecutor::with_default_attempts(transport, HeaderSource::new(headers)),
    )
}
