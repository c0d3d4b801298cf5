//! End-to-end requests through the bundled HTTP server.

use reqwest::StatusCode;
use trellis::{App, Dispatcher};

mod common;

fn app() -> Dispatcher {
    let mut app = App::new("server");
    app.get("/hello/:name", |ctx| {
        Ok(format!("hello {}", ctx.param("name").unwrap_or("?")).into())
    })
    .unwrap();
    app.get("/go", |ctx| ctx.redirect("/hello/bob")).unwrap();
    app.post("/form", |ctx| {
        Ok(format!("name={}", ctx.param("name").unwrap_or("")).into())
    })
    .unwrap();
    app.into_dispatcher()
}

#[tokio::test]
async fn test_get_over_http() {
    let (addr, shutdown) = common::start_server(app()).await;
    let client = common::client();

    let response = client
        .get(format!("http://{addr}/hello/ann"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers()["content-type"],
        "text/html; charset=utf-8"
    );
    assert_eq!(response.text().await.unwrap(), "hello ann");

    let response = client
        .get(format!("http://{addr}/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_redirect_uses_request_host() {
    let (addr, shutdown) = common::start_server(app()).await;
    let response = common::client()
        .get(format!("http://{addr}/go"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()["location"].to_str().unwrap(),
        format!("http://{addr}/hello/bob")
    );
    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_form_post_and_head() {
    let (addr, shutdown) = common::start_server(app()).await;
    let client = common::client();

    let response = client
        .post(format!("http://{addr}/form"))
        .form(&[("name", "ann")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "name=ann");

    let response = client
        .head(format!("http://{addr}/hello/ann"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.bytes().await.unwrap().is_empty());

    let _ = shutdown.send(());
}
