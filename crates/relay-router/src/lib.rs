//! Hierarchical path/verb router. A `Router` is a tree of `Route`s; dispatch
//! threads a `ParsingContext` down the tree so handlers can address nested
//! resources, and hands handlers a `RestConnection` capability to emit
//! exactly one response.

mod connection;
mod context;
mod error;
mod help;
mod route;
mod router;

pub use connection::{ResponseSink, RestConnection};
pub use context::{ParsingContext, Snapshot};
pub use error::{HandlerError, RouterError};
pub use help::{RouteEntryHelp, RouteHelp};
pub use route::{split_target, ExtractorHook, ParamFilter, PathSpec, Route, RouteRequest};
pub use router::{Handler, HandlerOutcome, MatchResult, Router};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use relay_http::HeaderList;

    struct Capture(Mutex<Vec<u8>>);
    impl ResponseSink for Capture {
        fn send_bytes(&self, bytes: &[u8]) {
            self.0.lock().unwrap().extend_from_slice(bytes);
        }
        fn close(&self) {}
    }

    fn request<'a>(method: &'a str, headers: &'a HeaderList, query: &'a HashMap<String, String>) -> RouteRequest<'a> {
        RouteRequest { method, headers, query, body: b"" }
    }

    #[test]
    fn dispatches_nested_literal_routes() {
        let seen_resources: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_remaining: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
        let resources_clone = seen_resources.clone();
        let remaining_clone = seen_remaining.clone();

        let items_router = Router::new("items").terminal().with_root_handler(Arc::new(move |ctx, _req, conn| {
            *resources_clone.lock().unwrap() = ctx.resources.clone();
            *remaining_clone.lock().unwrap() = ctx.remaining.clone();
            conn.send_response(200, b"ok", "text/plain");
            Ok(HandlerOutcome::Done)
        }));
        let items_route = Route::new(PathSpec::literal("/items"), items_router).with_verbs(["GET"]);

        let v1_router = Router::new("v1").with_route(items_route);
        let v1_route = Route::new(PathSpec::literal("/v1"), v1_router);

        let root = Router::new("root").with_route(v1_route);

        let headers = HeaderList::new();
        let query = HashMap::new();
        let req = request("GET", &headers, &query);

        let sink = Arc::new(Capture(Mutex::new(Vec::new())));
        let conn = RestConnection::new(sink.clone());
        let mut ctx = ParsingContext::new("/v1/items");
        let result = root.handle(&mut ctx, &req, &conn);

        assert_eq!(result, MatchResult::Matched);
        assert_eq!(*seen_resources.lock().unwrap(), vec!["/v1".to_string(), "/items".to_string()]);
        assert_eq!(*seen_remaining.lock().unwrap(), "");
        let response = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn unmatched_path_returns_404() {
        let items_router = Router::new("items").terminal().with_root_handler(Arc::new(|_ctx, _req, conn| {
            conn.send_response(200, b"ok", "text/plain");
            Ok(HandlerOutcome::Done)
        }));
        let items_route = Route::new(PathSpec::literal("/items"), items_router).with_verbs(["GET"]);
        let v1_router = Router::new("v1").with_route(items_route);
        let v1_route = Route::new(PathSpec::literal("/v1"), v1_router);
        let root = Router::new("root").with_route(v1_route);

        let headers = HeaderList::new();
        let query = HashMap::new();
        let req = request("GET", &headers, &query);
        let sink = Arc::new(Capture(Mutex::new(Vec::new())));
        let conn = RestConnection::new(sink.clone());
        let mut ctx = ParsingContext::new("/v1/other");

        let result = root.handle(&mut ctx, &req, &conn);
        assert_eq!(result, MatchResult::Matched);
        let response = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn regex_route_captures_groups() {
        let count = Arc::new(AtomicUsize::new(0));
        let captured_resources = Arc::new(Mutex::new(Vec::new()));
        let captured_clone = captured_resources.clone();
        let count_clone = count.clone();

        let item_router = Router::new("item").terminal().with_root_handler(Arc::new(move |ctx, _req, conn| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            *captured_clone.lock().unwrap() = ctx.resources.clone();
            conn.send_response(200, b"ok", "text/plain");
            Ok(HandlerOutcome::Done)
        }));
        let item_route = Route::new(PathSpec::regex(r"/items/([0-9]+)").unwrap(), item_router);
        let v1_router = Router::new("v1").with_route(item_route);
        let v1_route = Route::new(PathSpec::literal("/v1"), v1_router);
        let root = Router::new("root").with_route(v1_route);

        let headers = HeaderList::new();
        let query = HashMap::new();
        let req = request("GET", &headers, &query);
        let sink = Arc::new(Capture(Mutex::new(Vec::new())));
        let conn = RestConnection::new(sink);
        let mut ctx = ParsingContext::new("/v1/items/42");

        let result = root.handle(&mut ctx, &req, &conn);
        assert_eq!(result, MatchResult::Matched);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*captured_resources.lock().unwrap(), vec!["/v1".to_string(), "/items/42".to_string(), "42".to_string()]);
    }

    #[test]
    fn options_synthesizes_allow_header() {
        let get_router = Router::new("get-x").terminal().with_root_handler(Arc::new(|_ctx, _req, conn| {
            conn.send_response(200, b"ok", "text/plain");
            Ok(HandlerOutcome::Done)
        }));
        let post_router = Router::new("post-x").terminal().with_root_handler(Arc::new(|_ctx, _req, conn| {
            conn.send_response(200, b"ok", "text/plain");
            Ok(HandlerOutcome::Done)
        }));
        let root = Router::new("root")
            .with_route(Route::new(PathSpec::literal("/x"), get_router).with_verbs(["GET"]))
            .with_route(Route::new(PathSpec::literal("/x"), post_router).with_verbs(["POST"]));

        let headers = HeaderList::new();
        let query = HashMap::new();
        let req = request("OPTIONS", &headers, &query);
        let sink = Arc::new(Capture(Mutex::new(Vec::new())));
        let conn = RestConnection::new(sink.clone());
        let mut ctx = ParsingContext::new("/x");

        let result = root.handle(&mut ctx, &req, &conn);
        assert_eq!(result, MatchResult::Matched);
        let response = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Allow: GET,POST\r\n"));
    }

    #[test]
    fn handler_panic_becomes_500_and_matched() {
        let root_router = Router::new("boom").terminal().with_root_handler(Arc::new(|_ctx, _req, _conn| {
            panic!("handler exploded");
        }));
        let root = Router::new("root").with_route(Route::new(PathSpec::literal("/boom"), root_router));

        let headers = HeaderList::new();
        let query = HashMap::new();
        let req = request("GET", &headers, &query);
        let sink = Arc::new(Capture(Mutex::new(Vec::new())));
        let conn = RestConnection::new(sink.clone());
        let mut ctx = ParsingContext::new("/boom");

        let result = root.handle(&mut ctx, &req, &conn);
        assert_eq!(result, MatchResult::Matched);
        let response = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }

    #[test]
    fn describe_renders_to_json() {
        let leaf = Router::new("leaf").terminal();
        let root = Router::new("root").with_route(Route::new(PathSpec::literal("/x"), leaf).with_verbs(["GET"]));
        let json = root.describe().to_json_pretty().unwrap();
        assert!(json.contains("\"path\": \"/x\""));
        assert!(json.contains("\"GET\""));
    }
}
