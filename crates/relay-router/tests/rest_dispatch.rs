use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use relay_http::HeaderList;
use relay_router::{HandlerOutcome, MatchResult, PathSpec, ParsingContext, ResponseSink, RestConnection, Route, RouteRequest, Router};

struct Capture {
    body: Mutex<Vec<u8>>,
}

impl ResponseSink for Capture {
    fn send_bytes(&self, bytes: &[u8]) {
        self.body.lock().unwrap().extend_from_slice(bytes);
    }
    fn close(&self) {}
}

fn connection() -> (RestConnection, Arc<Capture>) {
    let capture = Arc::new(Capture { body: Mutex::new(Vec::new()) });
    (RestConnection::new(capture.clone() as Arc<dyn ResponseSink>), capture)
}

fn build_api_router() -> Router {
    let item_detail = Router::new("item-detail").terminal().with_root_handler(Arc::new(|ctx, _req, conn| {
        let id = &ctx.resources[ctx.resources.len() - 1];
        conn.send_response(200, format!("item {id}").as_bytes(), "text/plain");
        Ok(HandlerOutcome::Done)
    }));
    let items_list = Router::new("items-list").terminal().with_root_handler(Arc::new(|_ctx, _req, conn| {
        conn.send_response(200, b"[]", "application/json");
        Ok(HandlerOutcome::Done)
    }));

    let items = Router::new("items")
        .with_route(Route::new(PathSpec::regex(r"/(\d+)").unwrap(), item_detail).with_verbs(["GET"]))
        .with_route(Route::new(PathSpec::literal(""), items_list).with_verbs(["GET", "POST"]));

    Router::new("v1").with_route(Route::new(PathSpec::literal("/items"), items))
}

fn request<'a>(method: &'a str, headers: &'a HeaderList, query: &'a HashMap<String, String>) -> RouteRequest<'a> {
    RouteRequest { method, headers, query, body: b"" }
}

#[test]
fn lists_and_fetches_through_nested_routes() {
    let router = build_api_router();
    let headers = HeaderList::new();
    let query = HashMap::new();

    let mut ctx = ParsingContext::new("/items");
    let (conn, capture) = connection();
    let result = router.handle(&mut ctx, &request("GET", &headers, &query), &conn);
    assert_eq!(result, MatchResult::Matched);
    assert_eq!(&*capture.body.lock().unwrap(), b"[]");

    let mut ctx = ParsingContext::new("/items/42");
    let (conn, capture) = connection();
    let result = router.handle(&mut ctx, &request("GET", &headers, &query), &conn);
    assert_eq!(result, MatchResult::Matched);
    assert_eq!(&*capture.body.lock().unwrap(), b"item 42");
}

#[test]
fn unmatched_method_returns_404() {
    let router = build_api_router();
    let headers = HeaderList::new();
    let query = HashMap::new();

    let mut ctx = ParsingContext::new("/items/42");
    let (conn, capture) = connection();
    let result = router.handle(&mut ctx, &request("DELETE", &headers, &query), &conn);
    assert_eq!(result, MatchResult::Matched);
    assert_eq!(&*capture.body.lock().unwrap(), b"not found");
}

#[test]
fn describe_includes_every_mounted_path() {
    let router = build_api_router();
    let help = router.describe();
    let json = help.to_json_pretty().unwrap();
    assert!(json.contains("/items"));
}
