//! Profiling endpoints mounted under `/debug/pprof`.
//!
//! The index and the command line are answered directly.  Everything that needs an actual
//! profiler is handed to a [`Profiler`], when one is configured, and answered with
//! `501 Not Implemented` otherwise.
use std::{env, ffi::OsString, sync::Arc};

use http_body_util::Full;
use hyper::{
    body::Bytes,
    header::{HeaderValue, CONTENT_TYPE},
    Response, StatusCode,
};

/// Path under which the profiling endpoints are mounted.
pub const PROFILE_PATH: &str = "/debug/pprof";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// A profiling endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileEndpoint<'a> {
    /// Lists the available endpoints.
    Index,
    /// The command line of the running process.
    Cmdline,
    /// A CPU profile.
    Profile,
    /// Symbol lookup for program counters.
    Symbol,
    /// An execution trace.
    Trace,
    /// Any other named profile, such as `heap`.
    Named(&'a str),
}

impl<'a> ProfileEndpoint<'a> {
    /// Resolves a request path to an endpoint.
    ///
    /// Returns `None` when the path is not under [`PROFILE_PATH`].
    pub fn from_path(path: &'a str) -> Option<Self> {
        let rest = path.strip_prefix(PROFILE_PATH)?;
        let name = match rest {
            "" | "/" => return Some(ProfileEndpoint::Index),
            rest => rest.strip_prefix('/')?,
        };

        Some(match name {
            "cmdline" => ProfileEndpoint::Cmdline,
            "profile" => ProfileEndpoint::Profile,
            "symbol" => ProfileEndpoint::Symbol,
            "trace" => ProfileEndpoint::Trace,
            name => ProfileEndpoint::Named(name),
        })
    }
}

/// Produces profiles on behalf of the profiling endpoints.
pub trait Profiler: Send + Sync + 'static {
    /// Answers a request for `endpoint`, with the raw query string of the request if any.
    fn serve(&self, endpoint: ProfileEndpoint<'_>, query: Option<&str>) -> Response<Full<Bytes>>;
}

#[derive(Clone, Default)]
pub(crate) struct ProfileEndpoints {
    profiler: Option<Arc<dyn Profiler>>,
}

impl ProfileEndpoints {
    pub(crate) fn new(profiler: Option<Arc<dyn Profiler>>) -> Self {
        Self { profiler }
    }

    pub(crate) fn handle(
        &self,
        endpoint: ProfileEndpoint<'_>,
        query: Option<&str>,
    ) -> Response<Full<Bytes>> {
        match endpoint {
            ProfileEndpoint::Index => text_response(StatusCode::OK, index()),
            ProfileEndpoint::Cmdline => text_response(StatusCode::OK, cmdline()),
            endpoint => match &self.profiler {
                Some(profiler) => profiler.serve(endpoint, query),
                None => text_response(StatusCode::NOT_IMPLEMENTED, "profiling is not available\n"),
            },
        }
    }
}

fn index() -> String {
    let mut body = String::from("profiles:\n");
    for name in ["cmdline", "profile", "symbol", "trace"] {
        body.push_str(PROFILE_PATH);
        body.push('/');
        body.push_str(name);
        body.push('\n');
    }
    body
}

/// Arguments of the running process, separated by NUL bytes.
fn cmdline() -> String {
    join_args(env::args_os())
}

// Arguments are NUL-separated; anything that is not valid UTF-8 is replaced lossily.
fn join_args<I>(args: I) -> String
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect::<Vec<_>>().join("\0")
}

pub(crate) fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http_body_util::Full;
    use hyper::{body::Bytes, Response, StatusCode};

    use super::{join_args, text_response, ProfileEndpoint, ProfileEndpoints, Profiler};

    #[test]
    fn test_from_path() {
        let cases = [
            ("/debug/pprof", Some(ProfileEndpoint::Index)),
            ("/debug/pprof/", Some(ProfileEndpoint::Index)),
            ("/debug/pprof/cmdline", Some(ProfileEndpoint::Cmdline)),
            ("/debug/pprof/profile", Some(ProfileEndpoint::Profile)),
            ("/debug/pprof/symbol", Some(ProfileEndpoint::Symbol)),
            ("/debug/pprof/trace", Some(ProfileEndpoint::Trace)),
            ("/debug/pprof/heap", Some(ProfileEndpoint::Named("heap"))),
            ("/debug/pprofile", None),
            ("/metrics", None),
        ];
        for (path, expected) in cases {
            assert_eq!(ProfileEndpoint::from_path(path), expected, "path {}", path);
        }
    }

    #[test]
    fn test_without_profiler() {
        let endpoints = ProfileEndpoints::default();

        assert_eq!(endpoints.handle(ProfileEndpoint::Index, None).status(), StatusCode::OK);
        assert_eq!(endpoints.handle(ProfileEndpoint::Cmdline, None).status(), StatusCode::OK);
        let delegated =
            [ProfileEndpoint::Profile, ProfileEndpoint::Trace, ProfileEndpoint::Named("heap")];
        for endpoint in delegated {
            assert_eq!(endpoints.handle(endpoint, None).status(), StatusCode::NOT_IMPLEMENTED);
        }
    }

    #[test]
    fn test_with_profiler() {
        struct Teapot;

        impl Profiler for Teapot {
            fn serve(
                &self,
                endpoint: ProfileEndpoint<'_>,
                query: Option<&str>,
            ) -> Response<Full<Bytes>> {
                assert_eq!(endpoint, ProfileEndpoint::Profile);
                assert_eq!(query, Some("seconds=1"));
                text_response(StatusCode::IM_A_TEAPOT, "")
            }
        }

        let endpoints = ProfileEndpoints::new(Some(Arc::new(Teapot)));
        let response = endpoints.handle(ProfileEndpoint::Profile, Some("seconds=1"));
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn test_join_args() {
        let args = ["proxy", "-address", ":9090"].map(std::ffi::OsString::from);
        assert_eq!(join_args(args), "proxy\0-address\0:9090");
        assert_eq!(join_args(Vec::<std::ffi::OsString>::new()), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_join_args_not_utf8() {
        use std::{ffi::OsString, os::unix::ffi::OsStringExt};

        let args = vec![OsString::from("proxy"), OsString::from_vec(vec![b'-', 0xff, b'x'])];
        assert_eq!(join_args(args), "proxy\0-\u{fffd}x");
    }
}
