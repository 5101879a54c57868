use std::sync::{Arc, Mutex};

use roam_core::prelude::*;
use serde_json::json;

fn sample_routes() -> Vec<Route> {
    vec![
        Route::new("home", "/"),
        Route::new("users", "/users").child(Route::new("view", "/:id")),
        Route::new("search", "/search?q"),
    ]
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

fn record_events(router: &Router) -> Arc<Mutex<Vec<&'static str>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in EventKind::ALL {
        let log = log.clone();
        router
            .add_event_listener(
                kind,
                Arc::new(move |event: &RouterEvent| {
                    log.lock().unwrap().push(event.kind().as_str());
                }),
            )
            .unwrap();
    }
    log
}

#[tokio::test]
async fn start_matches_initial_path() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    let events = record_events(&router);

    let state = router.start("/users/7").await.unwrap();
    assert_eq!(state.name, "users.view");
    assert_eq!(state.params["id"], json!("7"));
    assert_eq!(state.path, "/users/7");
    assert_eq!(
        *events.lock().unwrap(),
        vec!["router_start", "transition_success"]
    );
    assert!(router.is_started());
}

#[tokio::test]
async fn start_empty_path_uses_default_route() {
    let router = Router::new(
        sample_routes(),
        RouterOptions::new().with_default_route("home"),
    )
    .unwrap();
    router.start("").await.unwrap();
    assert_eq!(router.get_state().unwrap().name, "home");
}

#[tokio::test]
async fn start_empty_path_without_default_fails() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    let err = router.start("").await.unwrap_err();
    assert_eq!(err.code(), "no_start_path_or_state");
    assert!(!router.is_started());
}

#[tokio::test]
async fn start_unmatched_path_falls_back_to_default() {
    let router = Router::new(
        sample_routes(),
        RouterOptions::new().with_default_route("home"),
    )
    .unwrap();
    let state = router.start("/does/not/exist").await.unwrap();
    assert_eq!(state.name, "home");
}

#[tokio::test]
async fn start_unmatched_path_without_default_fails() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    let events = record_events(&router);
    let err = router.start("/does/not/exist").await.unwrap_err();
    assert_eq!(err.code(), "route_not_found");
    assert_eq!(
        *events.lock().unwrap(),
        vec!["router_start", "transition_error"]
    );
    // Back to IDLE; a later start can succeed.
    assert!(!router.is_started());
    router.start("/").await.unwrap();
}

#[tokio::test]
async fn start_unmatched_path_with_allow_not_found() {
    let router = Router::new(
        sample_routes(),
        RouterOptions::new().with_allow_not_found(true),
    )
    .unwrap();
    let state = router.start("/does/not/exist").await.unwrap();
    assert_eq!(state.name, UNKNOWN_ROUTE);
    assert_eq!(state.params["path"], json!("/does/not/exist"));
}

#[tokio::test]
async fn start_with_state_skips_matching() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    let prebuilt = (*router.build_state("home", Params::new()).unwrap()).clone();
    let state = router.start_with_state(prebuilt).await.unwrap();
    assert_eq!(state.name, "home");
    assert!(router.is_started());
}

#[tokio::test]
async fn navigate_emits_start_then_success() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    router.start("/").await.unwrap();
    let events = record_events(&router);

    router
        .navigate("users.view", params(&[("id", "1")]))
        .await
        .unwrap();
    assert_eq!(
        *events.lock().unwrap(),
        vec!["transition_start", "transition_success"]
    );
}

#[tokio::test]
async fn navigate_to_missing_route_rejects_and_emits_error() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    router.start("/").await.unwrap();
    let events = record_events(&router);

    let err = router.navigate("nope", Params::new()).await.unwrap_err();
    assert_eq!(err.code(), "route_not_found");
    // No transition_start: the FSM never moved to TRANSITIONING.
    assert_eq!(*events.lock().unwrap(), vec!["transition_error"]);
    assert_eq!(router.get_state().unwrap().name, "home");
}

#[tokio::test]
async fn navigate_to_same_state_rejects_without_events() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    router.start("/users/7").await.unwrap();
    let events = record_events(&router);

    let err = router
        .navigate("users.view", params(&[("id", "7")]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "same_states");
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn force_bypasses_same_state_short_circuit() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    router.start("/users/7").await.unwrap();
    let first_id = router.get_state().unwrap().id;

    let state = router
        .navigate_with_options(
            "users.view",
            params(&[("id", "7")]),
            NavigationOptions {
                force: true,
                ..NavigationOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(state.id > first_id);
}

#[tokio::test]
async fn reload_reruns_guards_and_assigns_new_id() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let checks = Arc::new(AtomicUsize::new(0));
    let c = checks.clone();
    let routes = vec![
        Route::new("home", "/"),
        Route::new("users", "/users").child(Route::new("view", "/:id").can_activate(
            GuardSpec::check(move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
                GuardCheck::Allow
            }),
        )),
    ];
    let router = Router::new(routes, RouterOptions::default()).unwrap();
    router.start("/users/7").await.unwrap();
    assert_eq!(checks.load(Ordering::SeqCst), 1);
    let first_id = router.get_state().unwrap().id;
    let events = record_events(&router);

    let state = router
        .navigate_with_options(
            "users.view",
            params(&[("id", "7")]),
            NavigationOptions {
                reload: true,
                ..NavigationOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(checks.load(Ordering::SeqCst), 2);
    assert!(state.id > first_id);
    assert_eq!(
        *events.lock().unwrap(),
        vec!["transition_start", "transition_success"]
    );
}

#[tokio::test]
async fn previous_state_rotates() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    router.start("/").await.unwrap();
    router
        .navigate("users.view", params(&[("id", "1")]))
        .await
        .unwrap();
    assert_eq!(router.get_state().unwrap().name, "users.view");
    assert_eq!(router.get_previous_state().unwrap().name, "home");
}

#[tokio::test]
async fn query_params_flow_through() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    router.start("/").await.unwrap();
    let state = router
        .navigate("search", params(&[("q", "rust")]))
        .await
        .unwrap();
    assert_eq!(state.path, "/search?q=rust");
    assert_eq!(state.params["q"], json!("rust"));
}

#[tokio::test]
async fn navigate_to_default_uses_configured_params() {
    let mut defaults = Params::new();
    defaults.insert("id".into(), json!("42"));
    let router = Router::new(
        sample_routes(),
        RouterOptions::new()
            .with_default_route("users.view")
            .with_default_params(defaults),
    )
    .unwrap();
    router.start("/").await.unwrap();
    let state = router.navigate_to_default().await.unwrap();
    assert_eq!(state.name, "users.view");
    assert_eq!(state.params["id"], json!("42"));
}

#[tokio::test]
async fn is_navigating_tracks_the_transition() {
    let routes = vec![
        Route::new("home", "/"),
        Route::new("slow", "/slow").can_activate(GuardSpec::check(|_, _| {
            GuardCheck::Defer(Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                true
            }))
        })),
    ];
    let router = Arc::new(Router::new(routes, RouterOptions::default()).unwrap());
    router.start("/").await.unwrap();
    assert!(!router.is_navigating());

    let r = router.clone();
    let handle = tokio::spawn(async move { r.navigate("slow", Params::new()).await });
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    assert!(router.is_navigating());

    handle.await.unwrap().unwrap();
    assert!(!router.is_navigating());
    assert_eq!(router.get_state().unwrap().name, "slow");
}

#[tokio::test]
async fn states_are_shared_immutably() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    let state = router.start("/users/7").await.unwrap();
    // A state handed out earlier is untouched by later navigations.
    router
        .navigate("users.view", params(&[("id", "8")]))
        .await
        .unwrap();
    assert_eq!(state.params["id"], json!("7"));
}

#[tokio::test]
async fn match_and_build_are_symmetric() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    let path = router
        .build_path("users.view", params(&[("id", "7")]))
        .unwrap();
    assert_eq!(path, "/users/7");
    let state = router.match_path(&path, None).unwrap().unwrap();
    assert_eq!(state.name, "users.view");
    assert_eq!(state.params["id"], json!("7"));
}

#[tokio::test]
async fn is_active_reflects_current_state() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    router.start("/users/7").await.unwrap();
    assert!(router.is_active("users", None, false, true));
    assert!(router.is_active("users.view", Some(&params(&[("id", "7")])), false, true));
    assert!(!router.is_active("users.view", Some(&params(&[("id", "9")])), false, true));
    assert!(!router.is_active("home", None, false, true));
}

#[tokio::test]
async fn should_update_node_follows_the_transition_path() {
    let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
    let from = router.start("/users/7").await.unwrap();
    let to = router.navigate("home", Params::new()).await.unwrap();

    assert!(router.should_update_node("", &to, Some(&*from)));
    assert!(router.should_update_node("home", &to, Some(&*from)));
    assert!(router.should_update_node("users.view", &to, Some(&*from)));
    assert!(!router.should_update_node("search", &to, Some(&*from)));
    assert!(router.should_update_node("", &to, None));
}
