//! Requests against a live fixture server

use std::fs;
use std::path::Path;

use reqwest::StatusCode;
use testrig_common::FaultLog;
use testrig_fixture::{FixtureConfig, FixtureServer, HookRegistry, HookRequest};

async fn start(root: &Path, faults: FaultLog) -> FixtureServer {
    let mut hooks = HookRegistry::with_builtins();
    hooks.register("broken", |_: &HookRequest| -> anyhow::Result<axum::response::Response> {
        anyhow::bail!("hook exploded")
    });
    hooks.register("panicky", |_: &HookRequest| -> anyhow::Result<axum::response::Response> {
        panic!("hook panicked")
    });

    FixtureServer::start(
        FixtureConfig {
            www_root: root.join("www"),
            certs_dir: root.join("certs"),
            echo: false,
        },
        hooks,
        faults,
    )
    .await
    .unwrap()
}

fn site(root: &Path) {
    let www = root.join("www");
    fs::create_dir_all(www.join("docs")).unwrap();
    fs::write(www.join("hello.txt"), "hello\n").unwrap();
    fs::write(www.join("page.html"), "<p>hi</p>").unwrap();
    fs::write(www.join("docs/index.html"), "<h1>docs</h1>").unwrap();
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_serves_files_over_http_and_https() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    let faults = FaultLog::new();
    let server = start(dir.path(), faults.clone()).await;
    let client = client();

    let http = format!("http://{}/", server.http_addr());
    let https = format!("https://{}/", server.https_addr());
    for base in [&http, &https] {
        let response = client.get(format!("{base}HELLO.txt?x=1")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/plain"
        );
        assert_eq!(response.text().await.unwrap(), "hello\n");
    }

    let page = client.get(format!("{http}page.html")).send().await.unwrap();
    assert_eq!(page.headers()["content-type"].to_str().unwrap(), "text/html");

    assert!(server.http_base().starts_with("http://localhost:"));
    assert!(server.https_base().starts_with("https://localhost:"));

    server.shutdown().await;
    assert!(faults.is_empty());
}

#[tokio::test]
async fn test_directories_missing_files_and_traversal() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    fs::write(dir.path().join("secret.txt"), "secret").unwrap();
    let server = start(dir.path(), FaultLog::new()).await;
    let client = client();
    let base = format!("http://{}", server.http_addr());

    let index = client.get(format!("{base}/docs/")).send().await.unwrap();
    assert_eq!(index.text().await.unwrap(), "<h1>docs</h1>");

    let redirect = client.get(format!("{base}/docs")).send().await.unwrap();
    assert_eq!(redirect.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(redirect.headers()["location"], "/docs/");

    let missing = client.get(format!("{base}/nope.js")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.text().await.unwrap(), "File not found");

    let escaped = client
        .get(format!("{base}/%2e%2e/secret.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(escaped.status(), StatusCode::NOT_FOUND);

    server.shutdown().await;
}

#[tokio::test]
async fn test_hooks_and_post() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    let faults = FaultLog::new();
    let server = start(dir.path(), faults.clone()).await;
    let client = client();
    let base = format!("http://{}", server.http_addr());

    let echoed: serde_json::Value = client
        .post(format!("{base}/echo?a=b"))
        .body("payload")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["query"], "a=b");
    assert_eq!(echoed["body"], "payload");

    let status = client
        .get(format!("{base}/status?code=418"))
        .send()
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::IM_A_TEAPOT);

    let broken = client.get(format!("{base}/broken")).send().await.unwrap();
    assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);

    server.shutdown().await;

    let recorded = faults.drain();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].summary.contains("hook exploded"));
}

#[tokio::test]
async fn test_panicking_hook_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    let faults = FaultLog::new();
    let server = start(dir.path(), faults.clone()).await;
    let client = client();
    let base = format!("http://{}", server.http_addr());

    let response = client.get(format!("{base}/panicky")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Serving carries on after the panic
    let hello = client.get(format!("{base}/hello.txt")).send().await.unwrap();
    assert_eq!(hello.status(), StatusCode::OK);

    server.shutdown().await;

    let recorded = faults.drain();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].summary.contains("hook panicked"));
}

#[tokio::test]
async fn test_post_without_length_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    let server = start(dir.path(), FaultLog::new()).await;
    let base = format!("http://{}", server.http_addr());

    // A streamed body is sent chunked, without Content-Length
    let chunks: Vec<Result<&'static str, std::io::Error>> = vec![Ok("a"), Ok("b")];
    let body = reqwest::Body::wrap_stream(futures::stream::iter(chunks));
    let response = client().post(format!("{base}/echo")).body(body).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.text().await.unwrap(),
        "No or invalid Content-Length in POST (None)"
    );

    server.shutdown().await;
}
