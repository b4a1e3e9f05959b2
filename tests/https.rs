//! Serving over the HTTPS listener.

use reqwest::StatusCode;
use serde_json::Value;

mod common;

use common::{start_echo_backend, start_proxy_with, Gate};

#[tokio::test]
async fn test_https_listener_marks_requests_secure() {
    let backend = start_echo_backend("secure", Gate::default()).await;
    let proxy = start_proxy_with([("secure.test/api", format!("PROXY:{}", backend))], |config| {
        config.listener.https_port = Some(0);
        config.tls.self_signed_hosts = vec!["secure.test".to_string()];
    })
    .await;
    let https_port = proxy.https_addr.unwrap().port();
    let client = proxy.https_client(&["secure.test"]);

    // A streamed upload carries no Content-Length.
    let chunks = futures_util::stream::iter(["hello ", "over ", "tls"].map(Ok::<_, std::io::Error>));
    let res = client
        .post(proxy.https_url("secure.test", "/api/submit"))
        .body(reqwest::Body::wrap_stream(chunks))
        .send()
        .await
        .expect("HTTPS listener unreachable");
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["backend"], "secure");
    assert_eq!(body["uri"], "/submit");

    let headers = &body["headers"];
    assert_eq!(headers["x-forwarded-ssl"], "on");
    assert_eq!(headers["x-forwarded-proto"], "https");
    assert_eq!(headers["x-forwarded-port"], https_port.to_string().as_str());
    assert_eq!(
        headers["x-forwarded-origin"],
        format!("https://secure.test:{}", https_port).as_str()
    );

    // The plain listener keeps serving the same table.
    let res = proxy
        .client(&["secure.test"])
        .get(proxy.url("secure.test", "/api/plain"))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["headers"]["x-forwarded-ssl"], "off");

    drop(client);
    proxy.stop().await;
}
