//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use trellis::config::ListenerConfig;
use trellis::{Dispatcher, HttpServer, Request, Response};

/// Dispatch a GET for `uri`.
pub fn get(dispatcher: &Dispatcher, uri: &str) -> Response {
    dispatcher.handle(Request::get(uri).unwrap())
}

/// A shared counter for hooks and handlers.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// `name=value` of the first `Set-Cookie` header, if any.
pub fn set_cookie(response: &Response) -> Option<String> {
    response
        .header("set-cookie")
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// Serve `dispatcher` on an ephemeral port until the returned sender fires.
pub async fn start_server(dispatcher: Dispatcher) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let server = HttpServer::new(dispatcher, ListenerConfig::default());
    tokio::spawn(async move {
        let _ = server
            .run_until(listener, async {
                let _ = rx.await;
            })
            .await;
    });
    (addr, tx)
}

/// A client that neither pools nor follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
