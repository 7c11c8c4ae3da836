use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hookwire_core::{Application, Container};
use hookwire_web::constants::{BINDINGS_STAGE, LOCAL_PLATFORM};
use hookwire_web::WebServiceProvider;
use hookwire_web::prelude::*;
use serde_json::{json, Value};

#[derive(Debug, Clone, Default)]
struct Widget {
    id: u32,
    name: String,
}

impl RouteModel for Widget {
    fn resolve_route_binding(&self, field: &str, value: &str) -> anyhow::Result<Option<Self>> {
        if field != "id" {
            return Ok(None);
        }
        Ok(match value {
            "42" => Some(Widget {
                id: 42,
                name: "sprocket".to_string(),
            }),
            _ => None,
        })
    }
}

struct Harness {
    router: Router,
    platform: Arc<LocalPlatform>,
    container: Arc<Container>,
}

fn boot() -> Harness {
    let app = Application::new("dispatch-tests")
        .config_file("/nonexistent/hookwire.toml")
        .skip_logging()
        .without_discovery()
        .provider(WebServiceProvider)
        .run()
        .unwrap();

    let container = Arc::clone(app.container());
    let platform = container.get_as::<LocalPlatform>(LOCAL_PLATFORM).unwrap();
    let router = Router::from_container(Arc::clone(&container)).unwrap();

    Harness {
        router,
        platform,
        container,
    }
}

fn show_widget(calls: &Arc<AtomicUsize>) -> Action {
    let calls = Arc::clone(calls);
    Action::new(move |request: Request| -> Result<Value, Fault> {
        calls.fetch_add(1, Ordering::SeqCst);
        let widget = request
            .entity::<Widget>("widget")
            .ok_or_else(|| Fault::bad_request("widget was not bound"))?;
        Ok(json!({
            "id": widget.id,
            "name": widget.name,
            "note": request.input("note").cloned(),
        }))
    })
    .param(Parameter::entity::<Widget>("widget"))
}

fn bound_widget_routes(harness: &mut Harness, calls: &Arc<AtomicUsize>) {
    harness.router.middleware([BINDINGS_STAGE]);
    harness
        .router
        .group(|router| {
            router.get("widgets/{widget}", show_widget(calls))?;
            Ok(())
        })
        .unwrap();
    harness.router.dispatch(&Request::default()).unwrap();
}

#[test]
fn web_provider_registers_defaults() {
    let harness = boot();
    assert!(harness.container.has(BINDINGS_STAGE));
    assert!(harness.container.has(hookwire_web::constants::EXCEPTION_HANDLER));
    assert_eq!(harness.router.config().rest_namespace, "api");
}

#[test]
fn entity_is_substituted_before_the_action_runs() {
    let mut harness = boot();
    let calls = Arc::new(AtomicUsize::new(0));
    bound_widget_routes(&mut harness, &calls);

    let response = harness.platform.serve(Request::get("/api/widgets/42"));

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json_body(),
        Some(&json!({ "id": 42, "name": "sprocket", "note": null }))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_entity_never_reaches_the_action() {
    let mut harness = boot();
    let calls = Arc::new(AtomicUsize::new(0));
    bound_widget_routes(&mut harness, &calls);

    let response = harness.platform.serve(Request::get("/api/widgets/7"));

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response.json_body().unwrap();
    assert_eq!(body["message"], "No Widget found where id = '7'");
    assert_eq!(body["path"], "/api/widgets/7");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn each_trigger_runs_the_full_pipeline() {
    let mut harness = boot();
    let calls = Arc::new(AtomicUsize::new(0));
    bound_widget_routes(&mut harness, &calls);

    let first = harness
        .platform
        .serve(Request::get("/api/widgets/42").with_input("note", "first"));
    let second = harness.platform.serve(Request::get("/api/widgets/42"));

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(first.json_body().unwrap()["note"], "first");
    assert_eq!(second.json_body().unwrap()["note"], Value::Null);
    assert_eq!(harness.router.routes()[0].state(), RouteState::Registered);
}

#[test]
fn action_failures_are_translated_at_the_boundary() {
    let mut harness = boot();
    harness
        .router
        .get(
            "explode",
            Action::new(|_: Request| -> Result<Response, Fault> {
                Err(anyhow::anyhow!("storage offline").into())
            }),
        )
        .unwrap();
    harness
        .router
        .get(
            "panic",
            Action::new(|_: Request| -> Result<Response, Fault> { panic!("handler bug") }),
        )
        .unwrap();
    harness
        .router
        .post(
            "conflict",
            Action::new(|_: Request| -> Result<Response, Fault> {
                Err(Fault::http(StatusCode::CONFLICT, "name taken"))
            }),
        )
        .unwrap();

    assert!(harness.router.dispatch(&Request::default()).is_ok());

    let exploded = harness.platform.serve(Request::get("/api/explode"));
    assert_eq!(exploded.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(exploded.json_body().unwrap()["message"], "Internal Server Error");

    let panicked = harness.platform.serve(Request::get("/api/panic"));
    assert_eq!(panicked.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let conflict = harness.platform.serve(Request::post("/api/conflict"));
    assert_eq!(conflict.status(), StatusCode::CONFLICT);
    assert_eq!(conflict.json_body().unwrap()["message"], "name taken");
}

#[test]
fn nested_groups_shape_the_url() {
    let mut harness = boot();
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

    for name in ["m1", "m2", "m3"] {
        let log = Arc::clone(&log);
        harness
            .container
            .register_stage_fn(name, move |request: Request, next: Next<'_, Request, Response>| {
                log.lock().push(name);
                next.run(request)
            });
    }

    harness.router.namespace("shop").prefix("a").middleware(["m1"]);
    harness
        .router
        .group(|router| {
            router.namespace("v1").prefix("b").middleware(["m2"]);
            router.group(|router| {
                router.prefix("c").middleware(["m1", "m3"]);
                router.group(|router| {
                    router.get(
                        "leaf",
                        Action::new(|_: Request| -> Result<&'static str, Fault> { Ok("leaf") }),
                    )?;
                    Ok(())
                })
            })
        })
        .unwrap();
    harness.router.dispatch(&Request::default()).unwrap();

    let response = harness.platform.serve(Request::get("/shop/v1/a/b/c/leaf"));
    assert_eq!(response.text_body(), Some("leaf"));
    assert_eq!(*log.lock(), vec!["m1", "m2", "m3"]);

    assert_eq!(
        harness.platform.serve(Request::get("/api/a/b/c/leaf")).status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        harness.platform.serve(Request::post("/shop/v1/a/b/c/leaf")).status(),
        StatusCode::METHOD_NOT_ALLOWED
    );
}

#[test]
fn ajax_routes_answer_both_hooks() {
    let mut harness = boot();
    harness.router.namespace("shop");
    harness
        .router
        .group(|router| {
            router.ajax(
                "widgets/rename",
                Action::new(|request: Request| -> Result<String, Fault> {
                    let name = request
                        .input("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| Fault::bad_request("name is required"))?;
                    Ok(format!("renamed to {}", name))
                }),
            )?;
            Ok(())
        })
        .unwrap();
    harness.router.dispatch(&Request::default()).unwrap();

    let member = harness
        .platform
        .fire_ajax(
            "shop/widgets/rename",
            Request::post("/admin-ajax").with_input("name", "cog"),
            true,
        )
        .unwrap();
    assert_eq!(member.text_body(), Some("renamed to cog"));

    let guest = harness
        .platform
        .fire_ajax("shop/widgets/rename", Request::post("/admin-ajax"), false)
        .unwrap();
    assert_eq!(guest.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn optional_entity_parameter_is_bound_only_when_present() {
    let mut harness = boot();
    harness.router.middleware([BINDINGS_STAGE]);
    harness
        .router
        .group(|router| {
            router.get(
                "gadgets/{widget?}",
                Action::new(|request: Request| -> Result<Value, Fault> {
                    let name = request.entity::<Widget>("widget").map(|w| w.name.clone());
                    Ok(json!({ "widget": name }))
                })
                .param(Parameter::entity::<Widget>("widget").optional()),
            )?;
            Ok(())
        })
        .unwrap();
    harness.router.dispatch(&Request::default()).unwrap();

    let bare = harness.platform.serve(Request::get("/api/gadgets"));
    assert_eq!(bare.status(), StatusCode::OK);
    assert_eq!(bare.json_body(), Some(&json!({ "widget": null })));

    let bound = harness.platform.serve(Request::get("/api/gadgets/42"));
    assert_eq!(bound.json_body(), Some(&json!({ "widget": "sprocket" })));

    let missing = harness.platform.serve(Request::get("/api/gadgets/7"));
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[test]
fn rest_routes_dispatched_after_initialization_are_never_served() {
    let mut harness = boot();
    harness
        .router
        .get(
            "early",
            Action::new(|_: Request| -> Result<&'static str, Fault> { Ok("early") }),
        )
        .unwrap();
    harness.router.dispatch(&Request::default()).unwrap();

    let early = harness.platform.serve(Request::get("/api/early"));
    assert_eq!(early.text_body(), Some("early"));
    assert!(harness.platform.is_rest_initialized());

    let late = harness
        .router
        .get(
            "late",
            Action::new(|_: Request| -> Result<&'static str, Fault> { Ok("late") }),
        )
        .unwrap();
    harness.router.dispatch(&Request::default()).unwrap();

    assert_eq!(late.state(), RouteState::Registered);
    assert_eq!(
        harness.platform.serve(Request::get("/api/late")).status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        harness.platform.serve(Request::get("/api/early")).text_body(),
        Some("early")
    );
}
