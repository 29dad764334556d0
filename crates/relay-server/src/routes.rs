//! Default route tree served out of the box: a liveness check and a small
//! echo endpoint useful for exercising the router/connection plumbing end
//! to end. Real deployments are expected to build their own `Router` and
//! wire it in through `run()` instead of relying on this one.

use std::sync::Arc;

use relay_router::{HandlerOutcome, PathSpec, Route, Router};

pub fn default_router() -> Router {
    let healthz = Router::new("healthz").terminal().with_root_handler(Arc::new(|_ctx, _req, conn| {
        conn.send_response(200, b"ok", "text/plain");
        Ok(HandlerOutcome::Done)
    }));

    let echo = Router::new("echo").terminal().with_root_handler(Arc::new(|ctx, req, conn| {
        let received = String::from_utf8_lossy(req.body);
        let body = format!(
            "{{\"remaining\":\"{}\",\"body\":\"{}\"}}",
            ctx.remaining,
            received.replace('"', "\\\"")
        );
        conn.send_response(200, body.as_bytes(), "application/json");
        Ok(HandlerOutcome::Done)
    }));

    Router::new("root")
        .with_route(Route::new(PathSpec::literal("/healthz"), healthz).with_verbs(["GET"]))
        .with_route(
            Route::new(PathSpec::regex(r"/echo(/.*)?").expect("static pattern"), echo)
                .with_verbs(["GET", "POST"]),
        )
}
