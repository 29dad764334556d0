use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;

use crate::context::ParsingContext;
use crate::error::RouterError;
use crate::router::Router;
use relay_http::HeaderList;

/// Everything about the inbound request the matching pipeline needs:
/// method, headers, parsed query string, and the request body collected so
/// far. Built once per request by the server binary from the raw request
/// line, header list, and accumulated body bytes.
pub struct RouteRequest<'a> {
    pub method: &'a str,
    pub headers: &'a HeaderList,
    pub query: &'a HashMap<String, String>,
    pub body: &'a [u8],
}

/// Split an HTTP request target (`/items?limit=10&offset=5`) into its path
/// and a query parameter map.
pub fn split_target(target: &str) -> (&str, HashMap<String, String>) {
    match target.split_once('?') {
        None => (target, HashMap::new()),
        Some((path, query)) => {
            let mut map = HashMap::new();
            for pair in query.split('&') {
                if pair.is_empty() {
                    continue;
                }
                match pair.split_once('=') {
                    Some((k, v)) => {
                        map.insert(k.to_string(), v.to_string());
                    }
                    None => {
                        map.insert(pair.to_string(), String::new());
                    }
                }
            }
            (path, map)
        }
    }
}

#[derive(Clone)]
pub enum PathSpec {
    Literal(String),
    Regex(Arc<Regex>),
}

impl PathSpec {
    pub fn literal(prefix: impl Into<String>) -> Self {
        Self::Literal(prefix.into())
    }

    /// `pattern` is anchored at the start of the remaining path
    /// automatically; callers should not add their own leading `^`.
    pub fn regex(pattern: &str) -> Result<Self, RouterError> {
        let anchored = format!("^(?:{pattern})");
        Ok(Self::Regex(Arc::new(Regex::new(&anchored)?)))
    }

    /// How many entries a successful match pushes onto `resources`: one for
    /// a literal, or `1 + capture_group_count` for a regex (the full match
    /// plus each group, in order).
    pub fn num_captured_elements(&self) -> usize {
        match self {
            PathSpec::Literal(_) => 1,
            PathSpec::Regex(re) => re.captures_len(),
        }
    }

    /// On success, returns the length of `remaining` consumed and the
    /// resource strings to push, in order.
    fn try_match(&self, remaining: &str) -> Option<(usize, Vec<String>)> {
        match self {
            PathSpec::Literal(prefix) => {
                remaining.starts_with(prefix.as_str()).then(|| (prefix.len(), vec![prefix.clone()]))
            }
            PathSpec::Regex(re) => {
                let caps = re.captures(remaining)?;
                let whole = caps.get(0)?;
                if whole.start() != 0 {
                    return None;
                }
                let mut resources = Vec::with_capacity(re.captures_len());
                resources.push(whole.as_str().to_string());
                for i in 1..caps.len() {
                    resources.push(caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default());
                }
                Some((whole.end(), resources))
            }
        }
    }
}

/// A `key=value` query constraint or a `header:key=value` header constraint
/// that must hold for a route to be considered.
#[derive(Clone)]
pub enum ParamFilter {
    Query { key: String, value: String },
    Header { key: String, value: String },
}

impl ParamFilter {
    pub fn query(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Query { key: key.into(), value: value.into() }
    }

    pub fn header(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Header { key: key.into(), value: value.into() }
    }

    fn matches(&self, request: &RouteRequest<'_>) -> bool {
        match self {
            ParamFilter::Query { key, value } => request.query.get(key).is_some_and(|v| v == value),
            ParamFilter::Header { key, value } => {
                request.headers.get(key).is_some_and(|v| v.eq_ignore_ascii_case(value))
            }
        }
    }
}

/// Runs when a route's path/verb/param tests all pass, before recursing
/// into its child router. May attach a typed object to the context, or
/// reject the request by emitting a response itself and returning `false`
/// (the router then reports `MatchResult::Error` without recursing).
pub type ExtractorHook =
    Arc<dyn Fn(&mut ParsingContext, &RouteRequest<'_>, &crate::connection::RestConnection) -> bool + Send + Sync>;

pub struct Route {
    pub(crate) path: PathSpec,
    pub(crate) verbs: HashSet<String>,
    pub(crate) params: Vec<ParamFilter>,
    pub(crate) child: Router,
    pub(crate) extractor: Option<ExtractorHook>,
    pub(crate) description: String,
}

impl Route {
    pub fn new(path: PathSpec, child: Router) -> Self {
        Self {
            path,
            verbs: HashSet::new(),
            params: Vec::new(),
            child,
            extractor: None,
            description: String::new(),
        }
    }

    pub fn with_verbs(mut self, verbs: impl IntoIterator<Item = &'static str>) -> Self {
        self.verbs = verbs.into_iter().map(|v| v.to_ascii_uppercase()).collect();
        self
    }

    pub fn with_params(mut self, params: Vec<ParamFilter>) -> Self {
        self.params = params;
        self
    }

    pub fn with_extractor(mut self, hook: ExtractorHook) -> Self {
        self.extractor = Some(hook);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub(crate) fn try_match(&self, remaining: &str) -> Option<(usize, Vec<String>)> {
        self.path.try_match(remaining)
    }

    pub(crate) fn verb_allowed(&self, method: &str) -> bool {
        self.verbs.is_empty() || self.verbs.contains(method)
    }

    pub(crate) fn params_match(&self, request: &RouteRequest<'_>) -> bool {
        self.params.iter().all(|p| p.matches(request))
    }
}
