use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{HandlerResult, PatternError};
use crate::pattern::{self, CompiledPattern, RouteKind};
use crate::request::Request;
use crate::response::Response;
use crate::utils::HttpMethod;

/// Chance that a regex hit at index `i > 0` trades places with `i - 1`.
pub const SWAP_PROBABILITY: f64 = 0.001;

pub type Handler = Arc<dyn Fn(&Request, &mut Response, &Params) -> HandlerResult + Send + Sync>;

/// Named captures of a matched route, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    inner: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets `name`, replacing an existing value in place.
    pub fn insert(&mut self, name: &str, value: String) {
        match self.inner.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value,
            None => self.inner.push((name.to_string(), value)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params {
            inner: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// A registered route. Two routes are equal when method and pattern are.
pub struct Route {
    pub method: HttpMethod,
    pub pattern: String,
    compiled: CompiledPattern,
    handler: Handler,
}

impl Route {
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn is_simple(&self) -> bool {
        self.compiled.is_simple()
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method && self.pattern == other.pattern
    }
}

impl Eq for Route {}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("simple", &self.is_simple())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: Params,
}

#[derive(Default)]
struct MethodRoutes {
    simple: HashMap<String, Arc<Route>>,
    regex: Vec<Arc<Route>>,
}

/// Route table with an exact-match tier and an ordered regex tier per method.
pub struct Router {
    routes: RwLock<HashMap<HttpMethod, MethodRoutes>>,
    optimize: AtomicBool,
    swap_probability: f64,
}

impl Router {
    pub fn new() -> Self {
        Router {
            routes: RwLock::new(HashMap::new()),
            optimize: AtomicBool::new(false),
            swap_probability: SWAP_PROBABILITY,
        }
    }

    /// Turns the move-towards-front reordering of regex routes on or off.
    pub fn set_optimize(&self, enabled: bool) {
        self.optimize.store(enabled, Ordering::Relaxed);
    }

    pub fn optimize(&self) -> bool {
        self.optimize.load(Ordering::Relaxed)
    }

    /// Compiles `pattern` and installs it. A simple route replaces an earlier
    /// handler for the same key; regex routes are appended, first one wins.
    pub fn add(
        &self,
        method: &str,
        pattern: &str,
        handler: Handler,
        kind: RouteKind,
    ) -> Result<Arc<Route>, PatternError> {
        let method = HttpMethod::parse(method);
        let compiled = pattern::compile(pattern, kind)?;
        let route = Arc::new(Route {
            method: method.clone(),
            pattern: pattern.to_string(),
            compiled,
            handler,
        });

        let mut routes = self.routes.write();
        let tier = routes.entry(method.clone()).or_default();
        match &route.compiled {
            CompiledPattern::Simple(key) => {
                if tier.simple.insert(key.clone(), Arc::clone(&route)).is_some() {
                    debug!(%method, pattern, "replaced simple route");
                } else {
                    debug!(%method, pattern, "added simple route");
                }
            }
            CompiledPattern::Regex(re) => {
                debug!(%method, pattern, regex = re.as_str(), "added regex route");
                tier.regex.push(Arc::clone(&route));
            }
        }
        Ok(route)
    }

    /// Finds the route for `path`. Never fails; `None` means no match.
    pub fn route(&self, path: &str, method: &HttpMethod) -> Option<RouteMatch> {
        let path = path.trim().trim_start_matches('/');

        let (found, index) = {
            let routes = self.routes.read();
            let tier = routes.get(method)?;
            if let Some(route) = tier.simple.get(path) {
                return Some(RouteMatch {
                    route: Arc::clone(route),
                    params: Params::new(),
                });
            }
            tier.regex.iter().enumerate().find_map(|(i, route)| {
                let CompiledPattern::Regex(re) = &route.compiled else {
                    return None;
                };
                let caps = re.captures(path)?;
                let params = re
                    .capture_names()
                    .flatten()
                    .filter_map(|name| caps.name(name).map(|m| (name, m.as_str())))
                    .collect();
                Some((RouteMatch { route: Arc::clone(route), params }, i))
            })?
        };

        if index > 0 && self.optimize() && fastrand::f64() < self.swap_probability {
            self.promote(method, &found.route, index);
        }
        Some(found)
    }

    /// Swaps the route at `index` with its predecessor. Skipped when the
    /// table is busy or has changed since the lookup.
    fn promote(&self, method: &HttpMethod, route: &Arc<Route>, index: usize) {
        let Some(mut routes) = self.routes.try_write() else {
            return;
        };
        let Some(tier) = routes.get_mut(method) else {
            return;
        };
        if tier
            .regex
            .get(index)
            .is_some_and(|current| Arc::ptr_eq(current, route))
        {
            tier.regex.swap(index - 1, index);
            trace!(%method, pattern = %route.pattern, index, "promoted regex route");
        }
    }

    /// Snapshot of every reachable route.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        let routes = self.routes.read();
        routes
            .values()
            .flat_map(|tier| tier.simple.values().chain(tier.regex.iter()))
            .cloned()
            .collect()
    }

    /// Regex-tier patterns for `method`, in scan order.
    pub fn regex_order(&self, method: &HttpMethod) -> Vec<String> {
        self.routes
            .read()
            .get(method)
            .map(|tier| tier.regex.iter().map(|r| r.pattern.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.routes
            .read()
            .values()
            .map(|tier| tier.simple.len() + tier.regex.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn set_swap_probability(&mut self, probability: f64) {
        self.swap_probability = probability;
    }
}

impl Default for Router {
    fn default() -> Self {
        Router::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use std::collections::HashSet;

    fn named(tag: &'static str) -> Handler {
        Arc::new(move |_: &Request, _: &mut Response, _: &Params| Ok(Body::from(tag)))
    }

    #[test]
    fn simple_routes_match_exact_key_only() {
        let router = Router::new();
        router.add("get", "/hello", named("hello"), RouteKind::Auto).unwrap();
        router.add("GET", "/", named("root"), RouteKind::Auto).unwrap();

        let hit = router.route("/hello", &HttpMethod::GET).unwrap();
        assert_eq!(hit.route.pattern, "/hello");
        assert!(hit.params.is_empty());
        assert_eq!(router.route("/", &HttpMethod::GET).unwrap().route.pattern, "/");
        assert_eq!(router.route("", &HttpMethod::GET).unwrap().route.pattern, "/");
        assert!(router.route("/hello/x", &HttpMethod::GET).is_none());
        assert!(router.route("/hello", &HttpMethod::POST).is_none());
    }

    #[test]
    fn simple_route_replacement() {
        let router = Router::new();
        router.add("GET", "/a", named("first"), RouteKind::Auto).unwrap();
        router.add("GET", "a/", named("second"), RouteKind::Auto).unwrap();
        assert_eq!(router.len(), 1);
        assert_eq!(router.route("/a", &HttpMethod::GET).unwrap().route.pattern, "a/");
    }

    #[test]
    fn regex_routes_first_match_wins_and_extract_params() {
        let router = Router::new();
        router.add("GET", "/number/:n#[0-9]+#", named("num"), RouteKind::Auto).unwrap();
        router.add("GET", "/:page/:n", named("generic"), RouteKind::Auto).unwrap();
        router.add("GET", "/number/:n#[0-9]+#", named("dup"), RouteKind::Auto).unwrap();
        assert_eq!(router.len(), 3);

        let hit = router.route("/number/42", &HttpMethod::GET).unwrap();
        assert_eq!(hit.route.pattern, "/number/:n#[0-9]+#");
        assert_eq!(hit.params.get("n"), Some("42"));
        assert_eq!(regex_index(&router, &hit.route), 0);

        let hit = router.route("/number/Tim", &HttpMethod::GET).unwrap();
        assert_eq!(hit.route.pattern, "/:page/:n");
        assert_eq!(hit.params.get("page"), Some("number"));
        assert_eq!(hit.params.get("n"), Some("Tim"));
    }

    fn regex_index(router: &Router, route: &Arc<Route>) -> usize {
        let routes = router.routes.read();
        routes[&route.method]
            .regex
            .iter()
            .position(|r| Arc::ptr_eq(r, route))
            .unwrap()
    }

    #[test]
    fn optimizer_is_off_by_default() {
        let mut router = Router::new();
        router.set_swap_probability(1.0);
        router.add("GET", "/a/:x", named("a"), RouteKind::Auto).unwrap();
        router.add("GET", "/b/:x", named("b"), RouteKind::Auto).unwrap();
        router.route("/b/1", &HttpMethod::GET).unwrap();
        assert_eq!(router.regex_order(&HttpMethod::GET), vec!["/a/:x", "/b/:x"]);
    }

    #[test]
    fn optimizer_moves_hits_forward() {
        let mut router = Router::new();
        router.set_swap_probability(1.0);
        router.set_optimize(true);
        for p in ["/a/:x", "/b/:x", "/c/:x"] {
            router.add("GET", p, named("h"), RouteKind::Auto).unwrap();
        }
        router.route("/c/1", &HttpMethod::GET).unwrap();
        assert_eq!(router.regex_order(&HttpMethod::GET), vec!["/a/:x", "/c/:x", "/b/:x"]);
        router.route("/c/1", &HttpMethod::GET).unwrap();
        assert_eq!(router.regex_order(&HttpMethod::GET), vec!["/c/:x", "/a/:x", "/b/:x"]);
        router.route("/c/1", &HttpMethod::GET).unwrap();
        assert_eq!(router.regex_order(&HttpMethod::GET), vec!["/c/:x", "/a/:x", "/b/:x"]);
    }

    #[test]
    fn optimizer_never_changes_membership() {
        let router = Router::new();
        router.set_optimize(true);
        let patterns: Vec<String> = (0..20).map(|i| format!("/r{i}/:x")).collect();
        for p in &patterns {
            router.add("GET", p, named("h"), RouteKind::Auto).unwrap();
        }
        for n in 0..20_000 {
            let target = format!("/r{}/{}", 19 - n % 5, n);
            let hit = router.route(&target, &HttpMethod::GET).unwrap();
            assert_eq!(hit.route.pattern, format!("/r{}/:x", 19 - n % 5));
        }
        let before: HashSet<_> = patterns.into_iter().collect();
        let after: HashSet<_> = router.regex_order(&HttpMethod::GET).into_iter().collect();
        assert_eq!(before, after);
        assert_eq!(router.len(), 20);
    }
}
