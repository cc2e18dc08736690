use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use http_body_util::Full;
use hyper::{
    body::{self, Bytes},
    header::{HeaderValue, ALLOW, CONTENT_TYPE},
    server::conn::http1::Builder as HyperHttpBuilder,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use ipnet::IpNet;
use proxy_metrics::Metrics;
use tokio::net::{TcpListener, TcpStream};
use tracing::warn;

use crate::{
    common::{BuildError, ExporterError},
    profile::{text_response, ProfileEndpoint, ProfileEndpoints},
    ExporterFuture,
};

/// Path of the scrape endpoint.
pub const METRICS_PATH: &str = "/metrics";

const APPLICATION_JSON: &str = "application/json";

struct HttpListeningExporter {
    inner: Arc<Inner>,
}

struct Inner {
    metrics: Metrics,
    allowed_addresses: Option<Vec<IpNet>>,
    profile: Option<ProfileEndpoints>,
}

impl HttpListeningExporter {
    async fn serve(&self, listener: std::net::TcpListener) -> Result<(), ExporterError> {
        let listener = TcpListener::from_std(listener).map_err(ExporterError::HttpListener)?;

        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!("Error accepting connection. Ignoring request. Error: {:?}", e);
                    continue;
                }
            };

            let remote_addr = match stream.peer_addr() {
                Ok(remote_address) => remote_address.ip(),
                Err(e) => {
                    warn!("Error obtaining remote address. Ignoring request. Error: {:?}", e);
                    continue;
                }
            };

            self.process_stream(stream, remote_addr);
        }
    }

    fn process_stream(&self, stream: TcpStream, remote_address: IpAddr) {
        let inner = self.inner.clone();
        let service = service_fn(move |req: Request<body::Incoming>| {
            let inner = inner.clone();
            async move {
                Ok::<_, hyper::Error>(Self::handle_http_request(&inner, remote_address, &req))
            }
        });

        tokio::task::spawn(async move {
            if let Err(err) =
                HyperHttpBuilder::new().serve_connection(TokioIo::new(stream), service).await
            {
                warn!("Error serving connection.  Error: {:?}", err);
            };
        });
    }

    fn handle_http_request<B>(
        inner: &Inner,
        remote_address: IpAddr,
        req: &Request<B>,
    ) -> Response<Full<Bytes>> {
        let is_allowed = match &inner.allowed_addresses {
            Some(addresses) => addresses.iter().any(|address| address.contains(&remote_address)),
            None => true,
        };

        if is_allowed {
            Self::route(inner, req.method(), req.uri().path(), req.uri().query())
        } else {
            Self::new_forbidden_response()
        }
    }

    fn route(
        inner: &Inner,
        method: &Method,
        path: &str,
        query: Option<&str>,
    ) -> Response<Full<Bytes>> {
        if let Some(profile) = &inner.profile {
            if let Some(endpoint) = ProfileEndpoint::from_path(path) {
                return profile.handle(endpoint, query);
            }
        }

        let prefix = match path.strip_prefix(METRICS_PATH) {
            Some("") => "",
            Some(rest) => match rest.strip_prefix('/') {
                Some(prefix) => prefix,
                None => return text_response(StatusCode::NOT_FOUND, "not found\n"),
            },
            None => return text_response(StatusCode::NOT_FOUND, "not found\n"),
        };

        if method != Method::GET {
            let mut response =
                text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
            response.headers_mut().insert(ALLOW, HeaderValue::from_static("GET"));
            return response;
        }

        match inner.metrics.snapshot_matching(prefix).to_json() {
            Ok(document) => {
                let mut response = Response::new(Full::new(Bytes::from(document)));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
                response
            }
            Err(e) => {
                warn!(error = %e, "failed to render metrics snapshot");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics\n")
            }
        }
    }

    fn new_forbidden_response() -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::<Bytes>::default());
        *response.status_mut() = StatusCode::FORBIDDEN;
        response
    }
}

/// Creates an `ExporterFuture` implementing a http listener that serves metric snapshots.
///
/// # Errors
/// Will return Err if it cannot bind to the listen address
pub(crate) fn new_http_listener(
    metrics: Metrics,
    listen_address: SocketAddr,
    allowed_addresses: Option<Vec<IpNet>>,
    profile: Option<ProfileEndpoints>,
) -> Result<ExporterFuture, BuildError> {
    let listener = std::net::TcpListener::bind(listen_address)
        .and_then(|listener| {
            listener.set_nonblocking(true)?;
            Ok(listener)
        })
        .map_err(|e| BuildError::FailedToCreateHTTPListener(e.to_string()))?;

    let exporter =
        HttpListeningExporter { inner: Arc::new(Inner { metrics, allowed_addresses, profile }) };

    Ok(Box::pin(async move { exporter.serve(listener).await }))
}

#[cfg(test)]
mod tests {
    use std::{net::IpAddr, str::FromStr, time::Instant};

    use hyper::{header::CONTENT_TYPE, Method, Request, StatusCode};
    use ipnet::IpNet;
    use proxy_metrics::{Metrics, Options};

    use super::{HttpListeningExporter, Inner};
    use crate::profile::ProfileEndpoints;

    fn inner(profile: bool) -> Inner {
        let metrics = Metrics::new(Options { listener: ":9911".to_owned(), ..Options::default() });
        metrics.inc_routing_failures();
        metrics.measure_backend("route_a", Instant::now());
        metrics.flush();

        Inner {
            metrics,
            allowed_addresses: None,
            profile: profile.then(ProfileEndpoints::default),
        }
    }

    fn request(method: Method, uri: &str) -> Request<()> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap_or_else(|e| panic!("failed to build request: {:?}", e))
    }

    fn local() -> IpAddr {
        IpAddr::from([127, 0, 0, 1])
    }

    #[test]
    fn new_forbidden_response_always_succeeds() {
        let response = HttpListeningExporter::new_forbidden_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_scrape() {
        let inner = inner(false);
        let req = request(Method::GET, "/metrics");
        let response = HttpListeningExporter::handle_http_request(&inner, local(), &req);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_routes() {
        let inner = inner(false);
        let cases = [
            (Method::GET, "/metrics/", StatusCode::OK),
            (Method::GET, "/metrics/backend.", StatusCode::OK),
            (Method::GET, "/metricsfoo", StatusCode::NOT_FOUND),
            (Method::GET, "/", StatusCode::NOT_FOUND),
            (Method::GET, "/debug/pprof/cmdline", StatusCode::NOT_FOUND),
            (Method::POST, "/metrics", StatusCode::METHOD_NOT_ALLOWED),
            (Method::DELETE, "/metrics/backend.", StatusCode::METHOD_NOT_ALLOWED),
        ];

        for (method, uri, status) in cases {
            let req = request(method.clone(), uri);
            let response = HttpListeningExporter::handle_http_request(&inner, local(), &req);
            assert_eq!(response.status(), status, "{} {}", method, uri);
        }
    }

    #[test]
    fn test_profile_routes() {
        let inner = inner(true);
        let cases = [
            ("/debug/pprof/", StatusCode::OK),
            ("/debug/pprof/cmdline", StatusCode::OK),
            ("/debug/pprof/profile", StatusCode::NOT_IMPLEMENTED),
            ("/metrics", StatusCode::OK),
        ];

        for (uri, status) in cases {
            let req = request(Method::GET, uri);
            let response = HttpListeningExporter::handle_http_request(&inner, local(), &req);
            assert_eq!(response.status(), status, "{}", uri);
        }
    }

    #[test]
    fn test_allowlist() {
        let mut inner = inner(false);
        inner.allowed_addresses = Some(vec![IpNet::from_str("10.0.0.0/8").expect("invalid net")]);

        let req = request(Method::GET, "/metrics");
        let denied = HttpListeningExporter::handle_http_request(&inner, local(), &req);
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let allowed =
            HttpListeningExporter::handle_http_request(&inner, IpAddr::from([10, 1, 2, 3]), &req);
        assert_eq!(allowed.status(), StatusCode::OK);
    }
}
