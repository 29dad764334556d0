use serde::Serialize;

/// Serializable description of one router node and its child routes,
/// produced by [`crate::Router::describe`]. Kept separate from the
/// matching core: reflection lives here, not in `dispatch`.
#[derive(Debug, Serialize)]
pub struct RouteHelp {
    pub description: String,
    pub terminal: bool,
    pub has_root_handler: bool,
    pub routes: Vec<RouteEntryHelp>,
}

#[derive(Debug, Serialize)]
pub struct RouteEntryHelp {
    pub path: String,
    pub verbs: Vec<String>,
    pub params: Vec<String>,
    pub description: String,
    pub child: Option<Box<RouteHelp>>,
}

impl RouteHelp {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
