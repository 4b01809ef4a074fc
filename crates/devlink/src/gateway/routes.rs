use crate::config::GatewayConfig;

/// Forwarding rule: requests whose path falls under `prefix` go to `upstream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    prefix: String,
    upstream: String,
}

impl Route {
    pub fn new(prefix: impl Into<String>, upstream: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let upstream = upstream.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            upstream: upstream.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Prefixes match whole path segments: `/user` covers `/user` and `/user/7`,
    /// not `/username`. An empty prefix matches every path.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.prefix.is_empty(),
            None => false,
        }
    }

    /// Destination URL for `path_and_query` on this route's upstream.
    pub fn target(&self, path_and_query: &str) -> String {
        format!("{}{}", self.upstream, path_and_query)
    }
}

/// Ordered rule set; the first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(vec![
            Route::new("/user", &config.user_upstream),
            Route::new("/company", &config.company_upstream),
            Route::new("/job", &config.job_upstream),
            Route::new("/apply", &config.apply_upstream),
        ])
    }

    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::time::Duration;

    fn config() -> GatewayConfig {
        GatewayConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            user_upstream: "http://auth:8001".to_string(),
            company_upstream: "http://profile:8002".to_string(),
            job_upstream: "http://jobs:8003".to_string(),
            apply_upstream: "http://applications:8004/".to_string(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn default_table_maps_each_prefix_to_its_service() {
        let table = RouteTable::from_config(&config());

        let upstream = |path: &str| table.resolve(path).map(|route| route.upstream().to_string());
        assert_eq!(upstream("/user/login").as_deref(), Some("http://auth:8001"));
        assert_eq!(upstream("/company").as_deref(), Some("http://profile:8002"));
        assert_eq!(upstream("/job/42").as_deref(), Some("http://jobs:8003"));
        assert_eq!(upstream("/apply/list").as_deref(), Some("http://applications:8004"));
        assert_eq!(upstream("/health"), None);
    }

    #[test]
    fn prefixes_respect_segment_boundaries() {
        let route = Route::new("/user", "http://auth");
        assert!(route.matches("/user"));
        assert!(route.matches("/user/"));
        assert!(route.matches("/user/7/profile"));
        assert!(!route.matches("/username"));
        assert!(!route.matches("/users/7"));
        assert!(!route.matches("/api/user"));
    }

    #[test]
    fn first_matching_rule_wins() {
        let table = RouteTable::new(vec![
            Route::new("/job/archive", "http://archive"),
            Route::new("/job", "http://jobs"),
            Route::new("/job/archive", "http://never"),
        ]);

        assert_eq!(
            table.resolve("/job/archive/9").map(Route::upstream),
            Some("http://archive")
        );
        assert_eq!(table.resolve("/job/9").map(Route::upstream), Some("http://jobs"));
    }

    #[test]
    fn root_prefix_is_a_catch_all() {
        let table = RouteTable::new(vec![Route::new("/", "http://fallback")]);
        assert!(table.resolve("/anything/at/all").is_some());
    }

    #[test]
    fn target_keeps_path_and_query() {
        let route = Route::new("/apply/", "http://applications:8004/");
        assert_eq!(
            route.target("/apply/list?user_id=u1"),
            "http://applications:8004/apply/list?user_id=u1"
        );
    }
}
