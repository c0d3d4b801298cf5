//! Trellis demo server.
//!
//! Builds a small App from a TOML config (or defaults) and serves it:
//!
//! ```text
//! GET  /                 greeting, rendered through the template engine when configured
//! GET  /hello/:name      plain text
//! GET  /api/status       structured data through the serializer engine
//! GET  /visits           session counter
//! GET  /old              redirect to /
//! ANY  /legacy/**        forward to /hello/<first segment>
//! ```

use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use tokio::net::TcpListener;

use trellis::config::{load_config, AppConfig};
use trellis::observability::{logging, metrics};
use trellis::{App, HttpServer, LogLevel, Params};

#[derive(Debug, Parser)]
#[command(name = "trellis", version, about = "Trellis demo server")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn demo_app(config: AppConfig) -> trellis::Result<App> {
    let mut app = App::from_config(config)?;

    app.hook("before", |args| {
        if let Some(ctx) = args.context() {
            let path = ctx.request().path().to_string();
            ctx.set_var("entry_path", path);
        }
        Ok(())
    })?;

    app.get("/", |ctx| {
        let has_templates = ctx.app().template_engine()?.is_some();
        if has_templates {
            return Ok(ctx.template("index", json!({"title": "Trellis"}))?.into());
        }
        Ok(format!("Welcome to {}", ctx.app().name()).into())
    })?;

    app.get("/hello/:name", |ctx| {
        let name = ctx.param("name").unwrap_or("stranger").to_string();
        ctx.log(LogLevel::Info, &format!("greeting {name}"))?;
        Ok(format!("Hello, {name}!").into())
    })?;

    app.with_prefix("/api", |app| {
        app.get("/status", |ctx| {
            Ok(json!({
                "app": ctx.app().name(),
                "routes": ctx.app().routes().len(),
            })
            .into())
        })
    })?;

    app.get("/visits", |ctx| {
        let visits = ctx
            .session_get("visits")?
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            + 1;
        ctx.session_set("visits", visits)?;
        Ok(format!("visits: {visits}").into())
    })?;

    app.get("/old", |ctx| ctx.redirect("/"))?;

    app.any(&[], "/legacy/**", |ctx| {
        let target = ctx.splat().first().cloned().unwrap_or_default();
        let first = target.split('/').next().unwrap_or_default().to_string();
        ctx.forward(&format!("/hello/{first}"), Params::new(), None)
    })?;

    Ok(app)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!(app = %config.app.name, "trellis v0.1.0 starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let listener_config = config.listener.clone();
    let app = demo_app(config)?;
    tracing::info!(routes = app.routes().len(), "Routes declared");

    HttpServer::new(app.into_dispatcher(), listener_config)
        .run(listener)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
