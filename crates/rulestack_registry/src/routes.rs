//! The route metadata table.
//!
//! One descriptor per route carries the cross-cutting policy every
//! middleware reads: whether authentication is required, the role it
//! takes, and the per-IP rate limit. Paths use brace-delimited wildcard
//! segments (`/v1/packages/{name}`); matching is segmentwise. Routes
//! missing from the table default to requiring authentication at role
//! `user`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Publisher,
    Admin,
}

impl Role {
    /// Whether an account with `role` satisfies this requirement.
    pub fn allows(&self, role: &str) -> bool {
        match self {
            Self::User => true,
            Self::Publisher => matches!(role, "publisher" | "admin"),
            Self::Admin => role == "admin",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RouteMeta {
    pub method: &'static str,
    pub path: &'static str,
    pub requires_auth: bool,
    pub required_role: Role,
    /// Requests per minute per client IP; 0 disables rate limiting.
    pub rate_limit: u32,
    pub description: &'static str,
}

/// Policy applied to requests whose route is not in the table.
pub const DEFAULT_META: RouteMeta = RouteMeta {
    method: "*",
    path: "*",
    requires_auth: true,
    required_role: Role::User,
    rate_limit: 60,
    description: "unregistered route",
};

pub const ROUTES: &[RouteMeta] = &[
    RouteMeta {
        method: "GET",
        path: "/v1/health",
        requires_auth: false,
        required_role: Role::User,
        rate_limit: 0,
        description: "service health",
    },
    RouteMeta {
        method: "GET",
        path: "/v1/packages",
        requires_auth: false,
        required_role: Role::User,
        rate_limit: 120,
        description: "search packages",
    },
    RouteMeta {
        method: "POST",
        path: "/v1/packages",
        requires_auth: true,
        required_role: Role::Publisher,
        rate_limit: 30,
        description: "publish a package version",
    },
    RouteMeta {
        method: "GET",
        path: "/v1/packages/{name}",
        requires_auth: false,
        required_role: Role::User,
        rate_limit: 120,
        description: "package summary",
    },
    RouteMeta {
        method: "GET",
        path: "/v1/packages/{name}/versions/{version}",
        requires_auth: false,
        required_role: Role::User,
        rate_limit: 120,
        description: "package version record",
    },
    RouteMeta {
        method: "GET",
        path: "/v1/blobs/{sha256}",
        requires_auth: false,
        required_role: Role::User,
        rate_limit: 60,
        description: "download an archive blob",
    },
    RouteMeta {
        method: "POST",
        path: "/v1/auth/register",
        requires_auth: false,
        required_role: Role::User,
        rate_limit: 10,
        description: "create an account",
    },
    RouteMeta {
        method: "POST",
        path: "/v1/auth/login",
        requires_auth: false,
        required_role: Role::User,
        rate_limit: 10,
        description: "open a session",
    },
    RouteMeta {
        method: "POST",
        path: "/v1/auth/logout",
        requires_auth: true,
        required_role: Role::User,
        rate_limit: 30,
        description: "close the current session",
    },
    RouteMeta {
        method: "GET",
        path: "/v1/auth/profile",
        requires_auth: true,
        required_role: Role::User,
        rate_limit: 60,
        description: "current account",
    },
    RouteMeta {
        method: "POST",
        path: "/v1/auth/change-password",
        requires_auth: true,
        required_role: Role::User,
        rate_limit: 10,
        description: "change password, revoking other sessions",
    },
    RouteMeta {
        method: "DELETE",
        path: "/v1/auth/delete-account",
        requires_auth: true,
        required_role: Role::User,
        rate_limit: 10,
        description: "delete the current account",
    },
    RouteMeta {
        method: "GET",
        path: "/v1/admin/users",
        requires_auth: true,
        required_role: Role::Admin,
        rate_limit: 30,
        description: "list accounts",
    },
    RouteMeta {
        method: "DELETE",
        path: "/v1/admin/users/{id}",
        requires_auth: true,
        required_role: Role::Admin,
        rate_limit: 30,
        description: "delete an account",
    },
];

/// Look up the descriptor for a request. `None` means the route is not
/// registered; callers apply [`DEFAULT_META`].
pub fn route_meta(method: &str, path: &str) -> Option<&'static RouteMeta> {
    ROUTES
        .iter()
        .find(|meta| meta.method == method && path_matches(meta.path, path))
}

/// Segmentwise match with `{x}` as a one-segment wildcard.
fn path_matches(pattern: &str, path: &str) -> bool {
    let mut pattern_segments = pattern.trim_matches('/').split('/');
    let mut path_segments = path.trim_matches('/').split('/');
    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some(p), Some(s)) => {
                let is_wildcard = p.starts_with('{') && p.ends_with('}');
                if !is_wildcard && p != s {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_paths_match() {
        let meta = route_meta("GET", "/v1/health").unwrap();
        assert!(!meta.requires_auth);
        assert_eq!(meta.rate_limit, 0);
    }

    #[test]
    fn wildcard_segments_match_one_segment() {
        let meta = route_meta("GET", "/v1/packages/security-rules/versions/1.0.0").unwrap();
        assert_eq!(meta.path, "/v1/packages/{name}/versions/{version}");

        assert!(route_meta("GET", "/v1/packages/a/b/c").is_none());
        assert!(route_meta("GET", "/v1/packages/security-rules/versions").is_none());
    }

    #[test]
    fn method_is_part_of_the_key() {
        let get = route_meta("GET", "/v1/packages").unwrap();
        let post = route_meta("POST", "/v1/packages").unwrap();
        assert!(!get.requires_auth);
        assert!(post.requires_auth);
        assert_eq!(post.required_role, Role::Publisher);
    }

    #[test]
    fn unregistered_routes_fall_back_to_authenticated_user() {
        assert!(route_meta("GET", "/v1/secret").is_none());
        assert!(DEFAULT_META.requires_auth);
        assert_eq!(DEFAULT_META.required_role, Role::User);
    }

    #[test]
    fn role_ordering() {
        assert!(Role::User.allows("user"));
        assert!(Role::User.allows("admin"));
        assert!(Role::Publisher.allows("publisher"));
        assert!(Role::Publisher.allows("admin"));
        assert!(!Role::Publisher.allows("user"));
        assert!(Role::Admin.allows("admin"));
        assert!(!Role::Admin.allows("publisher"));
    }
}
