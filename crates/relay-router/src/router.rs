use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::connection::RestConnection;
use crate::context::ParsingContext;
use crate::error::HandlerError;
use crate::help::{RouteEntryHelp, RouteHelp};
use crate::route::{Route, RouteRequest};

/// Outcome of a successful route dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// A handler ran and the request is resolved (including panics and
    /// handler-returned errors, both of which produce a 500).
    Matched,
    /// A handler accepted the request but will complete it later, holding
    /// onto the `RestConnection` itself.
    HandledAsync,
    /// An extractor hook rejected the request and already emitted a
    /// response; the request is resolved but no handler ran.
    Error,
    /// Nothing in this subtree matched; caller should keep searching
    /// siblings, or (at the root) return 404.
    NoMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Done,
    Async,
}

pub type Handler = Arc<
    dyn Fn(&ParsingContext, &RouteRequest<'_>, &RestConnection) -> Result<HandlerOutcome, HandlerError>
        + Send
        + Sync,
>;

/// One node of the route tree: an optional handler invoked when this router
/// is `terminal` and `remaining` is empty, plus an ordered list of child
/// routes tried in insertion order.
pub struct Router {
    description: String,
    terminal: bool,
    root_handler: Option<Handler>,
    routes: Vec<Route>,
}

impl Router {
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: description.into(), terminal: false, root_handler: None, routes: Vec::new() }
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn with_root_handler(mut self, handler: Handler) -> Self {
        self.root_handler = Some(handler);
        self
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Entry point for a fresh request: dispatches into the tree and turns
    /// a root-level `NoMatch` into a 404.
    pub fn handle(&self, ctx: &mut ParsingContext, request: &RouteRequest<'_>, conn: &RestConnection) -> MatchResult {
        match self.dispatch(ctx, request, conn) {
            MatchResult::NoMatch => {
                conn.send_response(404, b"not found", "text/plain");
                MatchResult::Matched
            }
            other => other,
        }
    }

    pub fn dispatch(&self, ctx: &mut ParsingContext, request: &RouteRequest<'_>, conn: &RestConnection) -> MatchResult {
        for route in &self.routes {
            let snapshot = ctx.snapshot();

            if !route.verb_allowed(request.method) || !route.params_match(request) {
                continue;
            }
            let Some((matched_len, pushed)) = route.try_match(&ctx.remaining) else {
                continue;
            };
            for resource in pushed {
                ctx.push_resource(resource);
            }
            ctx.strip_matched(matched_len);

            if let Some(hook) = &route.extractor {
                let hook = hook.clone();
                let accepted = catch_unwind(AssertUnwindSafe(|| hook(ctx, request, conn)));
                match accepted {
                    Ok(true) => {}
                    Ok(false) => {
                        ctx.restore(snapshot);
                        return MatchResult::Error;
                    }
                    Err(_) => {
                        ctx.restore(snapshot);
                        if !conn.response_sent() {
                            conn.send_response(500, b"internal error", "text/plain");
                        }
                        return MatchResult::Error;
                    }
                }
            }

            match route.child.dispatch(ctx, request, conn) {
                MatchResult::NoMatch => {
                    ctx.restore(snapshot);
                    continue;
                }
                other => return other,
            }
        }

        if self.terminal && ctx.remaining.is_empty() {
            if let Some(handler) = &self.root_handler {
                return self.invoke_handler(handler, ctx, request, conn);
            }
        }

        if request.method == "OPTIONS" {
            let allowed = self.child_verbs();
            if !allowed.is_empty() {
                conn.send_response_with_headers(
                    200,
                    b"",
                    "text/plain",
                    &[("Allow".to_string(), allowed.join(","))],
                );
                return MatchResult::Matched;
            }
        }

        MatchResult::NoMatch
    }

    fn invoke_handler(
        &self,
        handler: &Handler,
        ctx: &ParsingContext,
        request: &RouteRequest<'_>,
        conn: &RestConnection,
    ) -> MatchResult {
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(ctx, request, conn)));
        match outcome {
            Ok(Ok(HandlerOutcome::Done)) => MatchResult::Matched,
            Ok(Ok(HandlerOutcome::Async)) => MatchResult::HandledAsync,
            Ok(Err(e)) => {
                if !conn.response_sent() {
                    conn.send_response(500, e.to_string().as_bytes(), "text/plain");
                }
                MatchResult::Matched
            }
            Err(_) => {
                if !conn.response_sent() {
                    conn.send_response(500, b"internal error", "text/plain");
                }
                MatchResult::Matched
            }
        }
    }

    /// Verb set implied by this router's direct child routes, used for
    /// `OPTIONS` synthesis. Does not recurse into grandchildren: `OPTIONS`
    /// describes only the routes reachable at this exact path.
    fn child_verbs(&self) -> Vec<String> {
        let mut verbs: Vec<String> = self
            .routes
            .iter()
            .flat_map(|r| if r.verbs.is_empty() { vec!["*".to_string()] } else { r.verbs.iter().cloned().collect() })
            .collect();
        verbs.sort();
        verbs.dedup();
        verbs
    }

    pub fn describe(&self) -> RouteHelp {
        RouteHelp {
            description: self.description.clone(),
            terminal: self.terminal,
            has_root_handler: self.root_handler.is_some(),
            routes: self
                .routes
                .iter()
                .map(|route| RouteEntryHelp {
                    path: match &route.path {
                        crate::route::PathSpec::Literal(lit) => lit.clone(),
                        crate::route::PathSpec::Regex(re) => re.as_str().to_string(),
                    },
                    verbs: {
                        let mut v: Vec<String> = route.verbs.iter().cloned().collect();
                        v.sort();
                        v
                    },
                    params: route
                        .params
                        .iter()
                        .map(|p| match p {
                            crate::route::ParamFilter::Query { key, value } => format!("{key}={value}"),
                            crate::route::ParamFilter::Header { key, value } => format!("header:{key}={value}"),
                        })
                        .collect(),
                    description: route.description.clone(),
                    child: Some(Box::new(route.child.describe())),
                })
                .collect(),
        }
    }
}
