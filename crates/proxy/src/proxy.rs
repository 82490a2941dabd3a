//! The integrity verification endpoint.
//!
//! Any method and any path: only the `url` and `integrity` query parameters
//! matter. Each request is verified against a fresh fetch.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderValue, CACHE_CONTROL, HOST, ORIGIN};
use http::Request;
use networking::headers::cache_control;
use networking::Fetcher;
use tracing::debug;

use crate::response::HttpResponse;
use crate::server::Handler;
use crate::verify::IntegrityVerifier;

/// Serves verified resources.
pub struct ProxyService<F> {
    verifier: IntegrityVerifier<F>,
    no_store: bool,
}

impl<F: Fetcher> ProxyService<F> {
    pub fn new(fetcher: F, no_store: bool) -> Self {
        Self {
            verifier: IntegrityVerifier::new(fetcher),
            no_store,
        }
    }
}

#[async_trait]
impl<F: Fetcher + 'static> Handler for ProxyService<F> {
    async fn handle(&self, request: Request<Bytes>) -> HttpResponse {
        debug!(
            method = %request.method(),
            host = request.headers().get(HOST).and_then(|h| h.to_str().ok()).unwrap_or("-"),
            origin = request.headers().get(ORIGIN).and_then(|o| o.to_str().ok()).unwrap_or("-"),
            "verification request"
        );

        let outcome = self.verifier.verify_query(request.uri().query()).await;
        debug!(outcome = outcome.kind(), status = outcome.status().as_u16(), "verification finished");
        let mut response = outcome.into_response();
        if self.no_store {
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static(cache_control::NO_STORE));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetServer;
    use crate::config::AssetServerConfig;
    use crate::response::tests::body_bytes;
    use crate::response::MISMATCH_SCRIPT;
    use crate::server::tests::local_client;
    use crate::server::{bind, serve, ServeOptions};
    use crate::verify::tests::{CountingFetcher, WORKER_INTEGRITY, WORKER_JS};
    use http::header::CONTENT_TYPE;
    use http::{Method, StatusCode};
    use integrity_security::{HashAlgorithm, IntegrityToken};
    use networking::{ClientConfig, HttpClient};
    use std::net::SocketAddr;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use url::form_urlencoded;

    fn request(method: Method, uri: &str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    fn verify_uri(base: &str, target: &str, integrity: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("url", target)
            .append_pair("integrity", integrity)
            .finish();
        format!("{}/verify?{}", base, query)
    }

    #[tokio::test]
    async fn test_any_method_and_path() {
        let fetcher = CountingFetcher::serving(WORKER_JS, None);
        let service = ProxyService::new(fetcher.clone(), true);

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("url", "http://localhost:8888/worker.js")
            .append_pair("integrity", WORKER_INTEGRITY)
            .finish();

        for (method, path) in [(Method::GET, "/"), (Method::POST, "/anything/else"), (Method::PUT, "/x")] {
            let response = service
                .handle(request(method, &format!("{}?{}", path, query)))
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_bytes(response).await, WORKER_JS);
        }
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_no_store_header() {
        let fetcher = CountingFetcher::serving(WORKER_JS, None);

        let service = ProxyService::new(fetcher.clone(), true);
        let response = service.handle(request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CACHE_CONTROL], "no-store");

        let service = ProxyService::new(fetcher.clone(), false);
        let response = service.handle(request(Method::GET, "/")).await;
        assert!(!response.headers().contains_key(CACHE_CONTROL));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_unescaped_plus_in_token() {
        let fetcher = CountingFetcher::serving(WORKER_JS, None);
        let service = ProxyService::new(fetcher, true);

        // Token pasted into the query without percent-encoding; its `+`
        // decodes to a space.
        let token = "sha512-jpRGQ2bM9VWxWmvuxUtEwD6ACV4kPxCa2d2uy6za3O2O8D1YWPCC04bfjyJ39PxLRqYxHfDoIaMLbNLWDKl+iQ==";
        assert_eq!(token, IntegrityToken::generate(WORKER_JS, HashAlgorithm::Sha512));
        let uri = format!("/?url=http://localhost:8888/worker.js&integrity={}", token);
        let response = service.handle(request(Method::GET, &uri)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_repeated_requests_refetch() {
        let fetcher = CountingFetcher::serving(b"tampered", None);
        let service = ProxyService::new(fetcher.clone(), true);
        let uri = verify_uri("", "http://x/w.js", WORKER_INTEGRITY);

        for _ in 0..3 {
            let response = service.handle(request(Method::GET, &uri)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_bytes(response).await, MISMATCH_SCRIPT);
        }
        assert_eq!(fetcher.calls(), 3);
    }

    async fn spawn<H: Handler>(handler: H, options: ServeOptions) -> SocketAddr {
        let listener = bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(
            listener,
            Arc::new(handler),
            options,
            std::future::pending::<()>(),
        ));
        addr
    }

    /// Asset origin serving the demo scripts plus a proxy with a real client.
    async fn spawn_demo() -> (String, String) {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demo/third-party-scripts");
        let cdn = spawn(
            AssetServer::new(&AssetServerConfig::default().with_root(root)),
            ServeOptions::new("cdn", 1024),
        )
        .await;

        let client = HttpClient::with_config(ClientConfig {
            timeout: Duration::from_secs(5),
            system_proxy: false,
            ..ClientConfig::default()
        })
        .unwrap();
        let proxy = spawn(
            ProxyService::new(client, true),
            ServeOptions::discarding_body("proxy"),
        )
        .await;

        (format!("http://{}", cdn), format!("http://{}", proxy))
    }

    #[tokio::test]
    async fn test_large_post_body_is_still_verified() {
        let fetcher = CountingFetcher::serving(WORKER_JS, None);
        let addr = spawn(
            ProxyService::new(fetcher.clone(), true),
            ServeOptions::discarding_body("proxy"),
        )
        .await;
        let uri = verify_uri(
            &format!("http://{}", addr),
            "http://localhost:8888/worker.js",
            WORKER_INTEGRITY,
        );

        let response = local_client()
            .post(&uri)
            .body(vec![b'x'; 100 * 1024])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(&response.bytes().await.unwrap()[..], WORKER_JS);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_match() {
        let (cdn, proxy) = spawn_demo().await;
        let client = local_client();
        let uri = verify_uri(&proxy, &format!("{}/worker.js", cdn), WORKER_INTEGRITY);

        for _ in 0..2 {
            let response = client.get(&uri).send().await.unwrap();
            assert_eq!(response.status(), 200);
            assert_eq!(response.headers()[CONTENT_TYPE], "application/javascript");
            assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
            assert_eq!(&response.bytes().await.unwrap()[..], WORKER_JS);
        }
    }

    #[tokio::test]
    async fn test_end_to_end_failures() {
        let (cdn, proxy) = spawn_demo().await;
        let client = local_client();

        // Wrong digest: soft failure with an inert script.
        let token = IntegrityToken::generate(b"something else", HashAlgorithm::Sha256);
        let response = client
            .get(verify_uri(&proxy, &format!("{}/worker.js", cdn), &token))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), MISMATCH_SCRIPT);

        // Missing upstream file.
        let response = client
            .get(verify_uri(&proxy, &format!("{}/missing.js", cdn), WORKER_INTEGRITY))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 502);
        assert_eq!(response.text().await.unwrap(), "// Failed to fetch target (404)\n");

        // Nothing listening upstream.
        let closed = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let response = client
            .get(verify_uri(&proxy, &format!("http://{}/w.js", closed), WORKER_INTEGRITY))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        assert!(response.text().await.unwrap().starts_with("// Error: "));

        // Not a URL at all.
        let response = client
            .get(verify_uri(&proxy, "not a url", WORKER_INTEGRITY))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
    }
}
