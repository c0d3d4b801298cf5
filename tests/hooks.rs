//! Hook registration, postponement, aliases and plugins.

use axum::http::StatusCode;
use serde_json::json;
use std::sync::{Arc, Mutex};
use trellis::config::EngineConfig;
use trellis::engine::template::{AFTER_RENDER, BEFORE_RENDER};
use trellis::{App, AppConfig, HookArgs, HookTable, HookType, Hookable, Plugin};

mod common;

use common::Counter;

fn template_config(templates: serde_json::Value) -> AppConfig {
    let mut config = AppConfig::default();
    config.app.name = "hooks".into();
    config.engines.template =
        Some(EngineConfig::new("minijinja").with_option("templates", templates));
    config
}

#[test]
fn test_postponed_template_hook_attaches_once() {
    let mut app = App::from_config(template_config(json!({"index": "Hello {{ name }}"}))).unwrap();
    let fired = Counter::new();
    let f = fired.clone();
    let registration = app
        .hook("before_template_render", move |args| {
            f.bump();
            if let Some(tokens) = args.tokens() {
                tokens.insert("name".into(), json!("hooked"));
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(registration.name, BEFORE_RENDER);
    assert_eq!(registration.attached, 0);
    assert_eq!(app.hooks().postponed_count(HookType::Engine, "template"), 1);

    app.get("/", |ctx| Ok(ctx.template("index", json!({"name": "plain"}))?.into()))
        .unwrap();
    let dispatcher = app.into_dispatcher();

    assert_eq!(common::get(&dispatcher, "/").text(), "Hello hooked");
    assert_eq!(fired.get(), 1);
    assert_eq!(common::get(&dispatcher, "/").text(), "Hello hooked");
    assert_eq!(fired.get(), 2);

    let engine = dispatcher.app().template_engine().unwrap().unwrap();
    assert_eq!(engine.hook_table().count(BEFORE_RENDER), 1);
    assert_eq!(
        dispatcher.app().hooks().postponed_count(HookType::Engine, "template"),
        0
    );
}

#[test]
fn test_hook_attaches_to_live_engine() {
    let mut app = App::from_config(template_config(json!({"index": "x"}))).unwrap();
    let engine = app.template_engine().unwrap().unwrap();
    let registration = app
        .hook(AFTER_RENDER, |args| {
            if let Some(content) = args.content() {
                content.push('!');
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(registration.attached, 1);
    assert_eq!(engine.hook_table().count(AFTER_RENDER), 1);
}

#[test]
fn test_alias_and_canonical_name_run_the_same_list() {
    let mut app = App::new("hooks");
    let fired = Counter::new();
    let f = fired.clone();
    app.add_hook_alias("on_error_start", "core.error.before");
    app.hook("on_error_start", move |_| {
        f.bump();
        Ok(())
    })
    .unwrap();
    assert_eq!(app.hooks().count("before_error"), 1);

    app.execute_hook("before_error", &mut HookArgs::None).unwrap();
    assert_eq!(fired.get(), 1);
    app.execute_hook("core.error.before", &mut HookArgs::None).unwrap();
    assert_eq!(fired.get(), 2);
}

#[test]
fn test_error_hooks_on_not_found() {
    let mut app = App::new("hooks");
    let before = Counter::new();
    let b = before.clone();
    app.hook("before_error", move |_| {
        b.bump();
        Ok(())
    })
    .unwrap();
    app.hook("init_error", |args| {
        if let Some(report) = args.error_report() {
            report.message = "nothing here".into();
        }
        Ok(())
    })
    .unwrap();

    let response = common::get(&app.into_dispatcher(), "/nope");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.text().contains("nothing here"));
    assert_eq!(before.get(), 1);
}

#[test]
fn test_error_page_from_template_view() {
    let app = App::from_config(template_config(json!({
        "404": "missing: {{ message }} ({{ status }})"
    })))
    .unwrap();
    let response = common::get(&app.into_dispatcher(), "/nope");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text(), "missing: Not Found (404)");
}

#[test]
fn test_route_exception_sees_failure() {
    let mut config = AppConfig::default();
    config.app.show_errors = true;
    let mut app = App::from_config(config).unwrap();
    let seen = Arc::new(Mutex::new(None));
    let s = seen.clone();
    app.hook("on_route_exception", move |args| {
        if let Some(err) = args.failure() {
            *s.lock().unwrap() = Some(err.root().to_string());
        }
        Ok(())
    })
    .unwrap();
    app.get("/boom", |_| Err(trellis::Error::msg("boom").into()))
        .unwrap();

    let response = common::get(&app.into_dispatcher(), "/boom");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().contains("boom"));
    assert_eq!(seen.lock().unwrap().as_deref(), Some("boom"));
}

#[test]
fn test_failing_before_hook_is_tagged() {
    let mut app = App::new("hooks");
    app.hook("before", |_| Err(trellis::Error::msg("denied").into()))
        .unwrap();
    app.get("/", |_| Ok("never".into())).unwrap();
    let err = app
        .into_dispatcher()
        .dispatch(trellis::Request::get("/").unwrap())
        .unwrap_err();
    assert!(
        matches!(&err, trellis::Error::Hook { position, .. } if position == "core.app.before_request")
    );
}

#[test]
fn test_file_handler_is_a_live_candidate() {
    let mut app = App::new("hooks");
    let registration = app.hook("before_file_render", |_| Ok(())).unwrap();
    assert_eq!(registration.name, "handler.file.before_render");
    assert_eq!(registration.attached, 1);
    assert!(app
        .supported_hooks()
        .contains(&"handler.file.after_render".to_string()));
}

struct Greeter {
    table: HookTable,
}

impl Greeter {
    fn new() -> Self {
        Self {
            table: HookTable::new(["plugin.greeter.greeting"]),
        }
    }
}

impl Hookable for Greeter {
    fn hook_type(&self) -> HookType {
        HookType::Plugin
    }

    fn candidate_name(&self) -> &str {
        "greeter"
    }

    fn hook_table(&self) -> &HookTable {
        &self.table
    }
}

impl Plugin for Greeter {
    fn hook_aliases(&self) -> Vec<(String, String)> {
        vec![("greeting".into(), "plugin.greeter.greeting".into())]
    }

    fn on_register(&self, app: &mut App) -> trellis::Result<()> {
        app.get("/greet", |ctx| {
            let mut data = json!({"text": "hello"});
            ctx.app()
                .execute_hook("greeting", &mut HookArgs::Data(&mut data))?;
            Ok(data["text"].as_str().unwrap_or_default().to_string().into())
        })
    }
}

#[test]
fn test_plugin_hooks_aliases_and_routes() {
    let mut app = App::new("hooks");
    app.add_hook_alias("greeting", "core.error.before");

    app.hook("plugin.greeter.greeting", |args| {
        if let Some(serde_json::Value::Object(map)) = args.data() {
            let upper = map["text"].as_str().unwrap_or_default().to_uppercase();
            map.insert("text".into(), json!(upper));
        }
        Ok(())
    })
    .unwrap();

    let plugin = Arc::new(Greeter::new());
    app.register_plugin(plugin.clone()).unwrap();
    assert_eq!(plugin.hook_table().count("plugin.greeter.greeting"), 1);

    let registration = app
        .hook("greeting", |args| {
            if let Some(serde_json::Value::Object(map)) = args.data() {
                let text = map["text"].as_str().unwrap_or_default().to_string();
                map.insert("text".into(), json!(format!("{text}!")));
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(registration.name, "plugin.greeter.greeting");
    assert_eq!(registration.attached, 1);

    let response = common::get(&app.into_dispatcher(), "/greet");
    assert_eq!(response.text(), "HELLO!");
}
