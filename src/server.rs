use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;

use crate::config::{CheckOptions, Config};
use crate::error::CheckError;
use crate::models::CheckRequest;
use crate::prober::Prober;

pub struct CheckServer {
    config: Config,
    base_options: CheckOptions,
    prober: Arc<Prober>,
}

impl CheckServer {
    pub fn new(config: Config, prober: Arc<Prober>) -> Self {
        let base_options = config.check_options();
        Self {
            config,
            base_options,
            prober,
        }
    }

    /// Binds the configured address and serves in the background.
    pub async fn start(self: Arc<Self>) -> Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.serve(listener)
    }

    pub fn serve(self: Arc<Self>, listener: TcpListener) -> Result<SocketAddr> {
        let local_addr = listener.local_addr()?;
        log::info!("Check server listening on {}", local_addr);

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let io = TokioIo::new(stream);
                        let server = Arc::clone(&self);
                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let server = Arc::clone(&server);
                                async move { server.handle_request(req).await }
                            });
                            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                                log::error!("Error serving connection: {}", err);
                            }
                        });
                    }
                    Err(e) => {
                        log::error!("Error accepting connection: {}", e);
                    }
                }
            }
        });

        Ok(local_addr)
    }

    async fn handle_request(
        &self,
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let start = std::time::Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = match (&method, path.as_str()) {
            (&Method::POST, "/check") => {
                let body = req.into_body().collect().await?.to_bytes();
                match serde_json::from_slice::<CheckRequest>(&body) {
                    Ok(request) => self.run(request).await,
                    Err(e) => error_response(StatusCode::BAD_REQUEST, format!("invalid JSON body: {}", e)),
                }
            }
            (&Method::GET, "/check") => match query_request(req.uri().query().unwrap_or_default()) {
                Ok(request) => self.run(request).await,
                Err(e) => error_response(StatusCode::BAD_REQUEST, e),
            },
            (_, "/check") => error_response(StatusCode::METHOD_NOT_ALLOWED, "use GET or POST"),
            _ => error_response(StatusCode::NOT_FOUND, "not found"),
        };

        log::info!(
            "{} {} -> {} in {:?}",
            method,
            path,
            response.status().as_u16(),
            start.elapsed()
        );
        Ok(response)
    }

    async fn run(&self, request: CheckRequest) -> Response<Full<Bytes>> {
        let outcome = match request.options(&self.base_options, self.config.default_proxy.as_deref()) {
            Ok(opts) => self.prober.check(&request.address, &opts).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => json_response(StatusCode::OK, &result),
            Err(e) => {
                log::warn!("Check of {:?} aborted: {}", request.address, e);
                error_response(status_for(&e), e.to_string())
            }
        }
    }
}

fn status_for(err: &CheckError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::BAD_GATEWAY
    }
}

/// Builds a request from `host`, `port` and optional `proxy` query parameters.
fn query_request(query: &str) -> Result<CheckRequest, String> {
    let mut host = None;
    let mut port = None;
    let mut proxy = String::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "host" => host = Some(value.into_owned()),
            "port" => port = Some(value.into_owned()),
            "proxy" => proxy = value.into_owned(),
            _ => {}
        }
    }

    let host = host.filter(|h| !h.is_empty()).ok_or("missing host parameter")?;
    let port = port.filter(|p| !p.is_empty()).ok_or("missing port parameter")?;
    let address = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };

    Ok(CheckRequest {
        address,
        use_proxy: !proxy.is_empty(),
        proxy,
    })
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let payload = serde_json::to_vec(body).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(payload)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": message.into() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckResult;
    use std::time::Duration;

    #[test]
    fn query_builds_bare_address() {
        let req = query_request("host=example.com&port=443").unwrap();
        assert_eq!(req.address, "example.com:443");
        assert!(!req.use_proxy);

        let req = query_request("host=%3A%3A1&port=80&proxy=127.0.0.1%3A3128").unwrap();
        assert_eq!(req.address, "[::1]:80");
        assert!(req.use_proxy);
        assert_eq!(req.proxy, "127.0.0.1:3128");
    }

    #[test]
    fn query_requires_host_and_port() {
        assert!(query_request("port=80").is_err());
        assert!(query_request("host=example.com").is_err());
        assert!(query_request("host=&port=80").is_err());
    }

    async fn start_server() -> SocketAddr {
        let config = Config {
            ping_count: Some(1),
            ping_timeout: Some(1),
            port_timeout: Some(2),
            ..Default::default()
        };
        let server = Arc::new(CheckServer::new(config, Arc::new(Prober::new())));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        server.serve(listener).unwrap()
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn get_check_reports_open_port() {
        let server = start_server().await;
        let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = target.local_addr().unwrap().port();

        let response = client()
            .get(format!("http://{}/check?host=127.0.0.1&port={}", server, port))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let result: CheckResult = serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
        assert_eq!(result.host, "127.0.0.1");
        assert_eq!(result.port, port);
        assert!(result.port_success);
        assert!(!result.http_checked);
    }

    #[tokio::test]
    async fn post_check_rejects_bad_input() {
        let server = start_server().await;
        let url = format!("http://{}/check", server);

        let bad_json = client().post(&url).body("{").send().await.unwrap();
        assert_eq!(bad_json.status(), reqwest::StatusCode::BAD_REQUEST);

        let no_proxy = client()
            .post(&url)
            .body(r#"{"address": "https://example.com", "use_proxy": true}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(no_proxy.status(), reqwest::StatusCode::BAD_REQUEST);

        let bad_address = client()
            .post(&url)
            .body(r#"{"address": "ftp://example.com"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(bad_address.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let server = start_server().await;
        let response = client()
            .get(format!("http://{}/metrics", server))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
