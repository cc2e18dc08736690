//! Metric key construction.
//!
//! Every event measured on the serving path maps to exactly one key template.  Dynamic parts of a
//! key are rendered verbatim, except for hosts and HTTP methods, which are sanitized so that the
//! resulting name stays a flat, bounded-cardinality token.
use std::fmt::{self, Write};

/// Sentinel used in place of any HTTP method outside of the standard set.
pub const UNKNOWN_METHOD: &str = "_unknownmethod_";

const MEASURED_METHODS: [&str; 8] =
    ["OPTIONS", "GET", "HEAD", "POST", "PUT", "DELETE", "TRACE", "CONNECT"];

/// A measured event along with the identity it was measured for.
///
/// The [`Display`][fmt::Display] implementation renders the canonical metric name, without any
/// prefix.  Use [`Key::render`] to get the prefixed name as stored in the registry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Key<'a> {
    /// `routelookup`
    RouteLookup,
    /// `routefailure`
    RouteFailure,
    /// `filter.<filter>.request`
    FilterRequest {
        /// Name of the filter.
        filter: &'a str,
    },
    /// `allfilters.request.<route>`
    AllFiltersRequest {
        /// Id of the route.
        route: &'a str,
    },
    /// `backend.<route>`
    Backend {
        /// Id of the route.
        route: &'a str,
    },
    /// `backendhost.<host>`
    BackendHost {
        /// Backend or request host, sanitized when rendered.
        host: &'a str,
    },
    /// `filter.<filter>.response`
    FilterResponse {
        /// Name of the filter.
        filter: &'a str,
    },
    /// `allfilters.response.<route>`
    AllFiltersResponse {
        /// Id of the route.
        route: &'a str,
    },
    /// `response.<code>.<method>.skipper.<route>`
    Response {
        /// HTTP status code.
        code: u16,
        /// HTTP method, collapsed to the sentinel when not a standard one.
        method: &'a str,
        /// Id of the route.
        route: &'a str,
    },
    /// `serveroute.<route>.<method>.<code>`
    ServeRoute {
        /// Id of the route.
        route: &'a str,
        /// HTTP method, collapsed to the sentinel when not a standard one.
        method: &'a str,
        /// HTTP status code.
        code: u16,
    },
    /// `servehost.<host>.<method>.<code>`
    ServeHost {
        /// Backend or request host, sanitized when rendered.
        host: &'a str,
        /// HTTP method, collapsed to the sentinel when not a standard one.
        method: &'a str,
        /// HTTP status code.
        code: u16,
    },
    /// `errors.backend.<route>`
    ErrorsBackend {
        /// Id of the route.
        route: &'a str,
    },
    /// `errors.streaming.<route>`
    ErrorsStreaming {
        /// Id of the route.
        route: &'a str,
    },
}

impl Key<'_> {
    /// Renders the key with the given prefix prepended verbatim.
    pub fn render(&self, prefix: &str) -> String {
        let mut name = String::with_capacity(prefix.len() + 32);
        name.push_str(prefix);
        // Writing into a `String` never fails.
        let _ = write!(name, "{}", self);
        name
    }
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Key::RouteLookup => f.write_str("routelookup"),
            Key::RouteFailure => f.write_str("routefailure"),
            Key::FilterRequest { filter } => write!(f, "filter.{}.request", filter),
            Key::AllFiltersRequest { route } => write!(f, "allfilters.request.{}", route),
            Key::Backend { route } => write!(f, "backend.{}", route),
            Key::BackendHost { host } => write!(f, "backendhost.{}", HostForKey(host)),
            Key::FilterResponse { filter } => write!(f, "filter.{}.response", filter),
            Key::AllFiltersResponse { route } => write!(f, "allfilters.response.{}", route),
            Key::Response { code, method, route } => {
                write!(f, "response.{}.{}.skipper.{}", code, measured_method(method), route)
            }
            Key::ServeRoute { route, method, code } => {
                write!(f, "serveroute.{}.{}.{}", route, measured_method(method), code)
            }
            Key::ServeHost { host, method, code } => {
                write!(f, "servehost.{}.{}.{}", HostForKey(host), measured_method(method), code)
            }
            Key::ErrorsBackend { route } => write!(f, "errors.backend.{}", route),
            Key::ErrorsStreaming { route } => write!(f, "errors.streaming.{}", route),
        }
    }
}

struct HostForKey<'a>(&'a str);

impl fmt::Display for HostForKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '.' => f.write_char('_')?,
                ':' => f.write_str("__")?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}

/// Flattens a host into a single key segment.
///
/// Every `.` becomes `_` and every `:` becomes `__`, so `10.0.0.1:8080` turns into
/// `10_0_0_1__8080`.
pub fn host_for_key(host: &str) -> String {
    HostForKey(host).to_string()
}

/// Maps an HTTP method to itself if it is one of the standard methods, or to [`UNKNOWN_METHOD`].
///
/// Matching is case-sensitive, as method tokens are.
pub fn measured_method(method: &str) -> &str {
    if MEASURED_METHODS.contains(&method) {
        method
    } else {
        UNKNOWN_METHOD
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{host_for_key, measured_method, Key, UNKNOWN_METHOD};

    #[test]
    fn test_host_for_key() {
        let test_cases = vec![
            ("10.0.0.1:8080", "10_0_0_1__8080"),
            ("www.example.org", "www_example_org"),
            ("[::1]:443", "[____1]__443"),
            ("localhost", "localhost"),
            ("", ""),
        ];

        for (input, expected) in test_cases {
            assert_eq!(host_for_key(input), expected);
        }
    }

    #[test]
    fn test_measured_method() {
        for method in ["OPTIONS", "GET", "HEAD", "POST", "PUT", "DELETE", "TRACE", "CONNECT"] {
            assert_eq!(measured_method(method), method);
        }

        assert_eq!(measured_method("PATCH"), UNKNOWN_METHOD);
        assert_eq!(measured_method("get"), UNKNOWN_METHOD);
        assert_eq!(measured_method(""), UNKNOWN_METHOD);
        assert_eq!(measured_method("GET\r\nX-Injected: 1"), UNKNOWN_METHOD);
    }

    #[test]
    fn test_key_templates() {
        let test_cases = vec![
            (Key::RouteLookup, "routelookup"),
            (Key::RouteFailure, "routefailure"),
            (Key::FilterRequest { filter: "setPath" }, "filter.setPath.request"),
            (Key::AllFiltersRequest { route: "r1" }, "allfilters.request.r1"),
            (Key::Backend { route: "r1" }, "backend.r1"),
            (Key::BackendHost { host: "10.0.0.1:8080" }, "backendhost.10_0_0_1__8080"),
            (Key::FilterResponse { filter: "setPath" }, "filter.setPath.response"),
            (Key::AllFiltersResponse { route: "r1" }, "allfilters.response.r1"),
            (
                Key::Response { code: 200, method: "GET", route: "r1" },
                "response.200.GET.skipper.r1",
            ),
            (
                Key::ServeRoute { route: "r1", method: "PATCH", code: 404 },
                "serveroute.r1._unknownmethod_.404",
            ),
            (
                Key::ServeHost { host: "example.org:80", method: "POST", code: 502 },
                "servehost.example_org__80.POST.502",
            ),
            (Key::ErrorsBackend { route: "r1" }, "errors.backend.r1"),
            (Key::ErrorsStreaming { route: "r1" }, "errors.streaming.r1"),
        ];

        for (key, expected) in test_cases {
            assert_eq!(key.to_string(), expected);
        }
    }

    #[test]
    fn test_render_with_prefix() {
        assert_eq!(Key::RouteLookup.render(""), "routelookup");
        assert_eq!(Key::Backend { route: "r1" }.render("skipper."), "skipper.backend.r1");
    }

    proptest! {
        #[test]
        fn sanitized_host_is_a_single_segment(host in "[a-z0-9.:\\-]{0,64}") {
            let sanitized = host_for_key(&host);
            prop_assert!(!sanitized.contains('.'));
            prop_assert!(!sanitized.contains(':'));
        }

        #[test]
        fn measured_method_is_bounded(method in "\\PC{0,16}") {
            let measured = measured_method(&method);
            prop_assert!(measured == method || measured == UNKNOWN_METHOD);
            let allowed = [
                "OPTIONS", "GET", "HEAD", "POST", "PUT", "DELETE", "TRACE", "CONNECT",
                UNKNOWN_METHOD,
            ];
            prop_assert!(allowed.contains(&measured));
        }
    }
}
