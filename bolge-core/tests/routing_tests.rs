use bolge_core::{
    Error, HttpRequest, RequestContext, Route, RouteTable, UrlMatcher, CONTROLLER_ATTRIBUTE,
    ROUTE_ATTRIBUTE,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn table() -> RouteTable {
    let mut routes = RouteTable::new();
    routes
        .add("home", Route::new("/").with_controller("app.home"))
        .unwrap();
    routes
        .add(
            "blog_list",
            Route::new("/blog/{page}")
                .with_controller("app.blog::list")
                .with_default("page", 1)
                .with_requirement("page", "\\d+"),
        )
        .unwrap();
    routes
        .add(
            "blog_show",
            Route::new("/blog/{slug}").with_controller("app.blog::show"),
        )
        .unwrap();
    routes
        .add(
            "contact_submit",
            Route::new("/contact")
                .with_controller("app.contact::submit")
                .with_methods(["post"]),
        )
        .unwrap();
    routes
}

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_static_route() {
    let attrs = table().match_path("/", &RequestContext::default()).unwrap();
    assert_eq!(attrs.get(ROUTE_ATTRIBUTE), Some(&json!("home")));
    assert_eq!(attrs.get(CONTROLLER_ATTRIBUTE), Some(&json!("app.home")));
}

#[test]
fn test_first_matching_route_wins() {
    let routes = table();
    let context = RequestContext::default();

    let attrs = routes.match_path("/blog/7", &context).unwrap();
    assert_eq!(attrs.get(ROUTE_ATTRIBUTE), Some(&json!("blog_list")));
    assert_eq!(attrs.get("page"), Some(&json!("7")));

    // Fails the \d+ requirement, falls through to the slug route
    let attrs = routes.match_path("/blog/hello-world", &context).unwrap();
    assert_eq!(attrs.get(ROUTE_ATTRIBUTE), Some(&json!("blog_show")));
    assert_eq!(attrs.get("slug"), Some(&json!("hello-world")));
}

#[test]
fn test_placeholder_values_are_decoded() {
    let attrs = table()
        .match_path("/blog/caf%C3%A9", &RequestContext::default())
        .unwrap();
    assert_eq!(attrs.get("slug"), Some(&json!("café")));
}

#[test]
fn test_route_not_found() {
    let result = table().match_path("/xyz", &RequestContext::default());
    assert!(matches!(result, Err(Error::RouteNotFound(path)) if path == "/xyz"));
}

#[test]
fn test_method_not_allowed() {
    let result = table().match_path("/contact", &RequestContext::default());
    match result {
        Err(Error::MethodNotAllowed(msg)) => assert!(msg.contains("POST")),
        other => panic!("expected MethodNotAllowed, got {:?}", other),
    }

    let context = RequestContext {
        method: "POST".into(),
        ..RequestContext::default()
    };
    assert!(table().match_path("/contact", &context).is_ok());
}

#[test]
fn test_head_is_allowed_for_get_routes() {
    let mut routes = RouteTable::new();
    routes
        .add("feed", Route::new("/feed").with_methods(["GET"]))
        .unwrap();
    let context = RequestContext {
        method: "HEAD".into(),
        ..RequestContext::default()
    };
    assert!(routes.match_path("/feed", &context).is_ok());
}

#[test]
fn test_matcher_uses_request_method() {
    let matcher = UrlMatcher::new(Arc::new(table()), RequestContext::default());

    assert!(matcher.match_request(&HttpRequest::post("/contact")).is_ok());
    assert!(matches!(
        matcher.match_request(&HttpRequest::get("/contact")),
        Err(Error::MethodNotAllowed(_))
    ));
}

#[test]
fn test_generate_fills_defaults() {
    let routes = table();
    assert_eq!(routes.generate("blog_list", &HashMap::new()).unwrap(), "/blog/1");
    assert_eq!(
        routes.generate("blog_list", &params(&[("page", "4")])).unwrap(),
        "/blog/4"
    );
    assert_eq!(routes.generate("home", &HashMap::new()).unwrap(), "/");
}

#[test]
fn test_generated_url_matches_back() {
    let routes = table();
    let context = RequestContext::default();

    for name in ["home", "blog_list"] {
        let url = routes.generate(name, &HashMap::new()).unwrap();
        let attrs = routes.match_path(&url, &context).unwrap();
        assert_eq!(attrs.get(ROUTE_ATTRIBUTE), Some(&json!(name)));

        for (key, default) in routes.get(name).unwrap().defaults() {
            let matched = attrs.get(key).map(bolge_core::value_to_string);
            assert_eq!(matched, Some(bolge_core::value_to_string(default)));
        }
    }
}

#[test]
fn test_generate_extra_parameters_go_to_query() {
    let url = table()
        .generate("blog_show", &params(&[("slug", "a b"), ("ref", "mail"), ("utm", "x")]))
        .unwrap();
    assert_eq!(url, "/blog/a%20b?ref=mail&utm=x");
}

#[test]
fn test_generate_errors() {
    let routes = table();

    assert!(matches!(
        routes.generate("nope", &HashMap::new()),
        Err(Error::RouteNotFound(_))
    ));
    assert!(matches!(
        routes.generate("blog_show", &HashMap::new()),
        Err(Error::MissingParameters(msg)) if msg.contains("slug")
    ));
    assert!(matches!(
        routes.generate("blog_list", &params(&[("page", "first")])),
        Err(Error::InvalidParameter(_))
    ));
}

#[test]
fn test_readding_a_route_moves_it_last() {
    let mut routes = table();
    routes
        .add("home", Route::new("/home").with_controller("app.home"))
        .unwrap();

    assert_eq!(routes.len(), 4);
    assert_eq!(routes.names().last(), Some(&"home"));
    assert!(routes.match_path("/", &RequestContext::default()).is_err());
}

#[test]
fn test_add_collection_with_prefix() {
    let mut admin = RouteTable::new();
    admin
        .add("admin_index", Route::new("/").with_controller("admin::index"))
        .unwrap();
    admin
        .add("admin_users", Route::new("/users/{id}"))
        .unwrap();

    let mut routes = table();
    routes.add_collection(admin, Some("/admin")).unwrap();

    let context = RequestContext::default();
    let attrs = routes.match_path("/admin", &context).unwrap();
    assert_eq!(attrs.get(ROUTE_ATTRIBUTE), Some(&json!("admin_index")));

    let attrs = routes.match_path("/admin/users/5", &context).unwrap();
    assert_eq!(attrs.get("id"), Some(&json!("5")));
}
