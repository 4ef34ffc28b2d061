//! Tests for the request service.

use std::collections::HashMap;
use std::time::Duration;

use fetchline::http::ResponseData;
use fetchline::{
    CancellationToken, HttpMethod, NetworkError, RequestConfig, RequestError, RequestService,
    ResponseType,
};
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn service_for(server: &MockServer) -> RequestService {
    RequestService::configure()
        .base_url(server.uri())
        .build()
        .expect("Failed to build service")
}

fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_service_defaults() {
    let service = RequestService::initialize().expect("Failed to build service");
    let config = service.config();

    assert!(config.base_url.is_none());
    assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    assert!(!config.with_credentials);
    assert_eq!(config.xsrf_cookie_name, "XSRF-TOKEN");
    assert_eq!(config.xsrf_header_name, "X-XSRF-TOKEN");
    assert!(config.user_agent.as_deref().unwrap().starts_with("fetchline/"));
}

#[test]
fn test_invalid_default_header_is_rejected() {
    let result = RequestService::configure().default_header("bad header", "x");
    assert!(matches!(result, Err(NetworkError::InvalidHeader(_))));
}

#[tokio::test]
async fn test_request_returns_unwrapped_payload() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let items: Vec<u32> = service
        .request(
            RequestConfig::new(HttpMethod::Get, "/items"),
            None,
            ResponseType::Json,
        )
        .await
        .expect("Request failed");

    assert_eq!(items, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_default_headers_are_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("accept", "application/json"))
        .and(header("content-type", "application/json; charset=UTF-8"))
        .and(body_string(r#"{"name":"John"}"#))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let config = RequestConfig {
        data: Some(fetchline::RequestBody::Json(json!({"name": "John"}))),
        ..RequestConfig::new(HttpMethod::Post, "/echo")
    };
    let created: Value = service
        .request(config, None, ResponseType::Json)
        .await
        .expect("Request failed");

    assert_eq!(created["id"], 1);
}

#[tokio::test]
async fn test_content_type_dropped_without_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let nothing: Value = service
        .request(
            RequestConfig::new(HttpMethod::Get, "/plain"),
            None,
            ResponseType::Json,
        )
        .await
        .expect("Request failed");
    assert_eq!(nothing, Value::Null);

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("content-type").is_none());
    assert_eq!(
        requests[0].headers.get("accept").unwrap().to_str().unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_header_precedence_on_the_wire() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/headers"))
        .and(header("a", "2"))
        .and(header("b", "3"))
        .and(header("c", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = RequestService::configure()
        .base_url(mock_server.uri())
        .default_header("A", "1")
        .unwrap()
        .build()
        .unwrap();

    let config = RequestConfig {
        headers: map(&[("A", "2"), ("B", "2")]),
        ..RequestConfig::new(HttpMethod::Get, "/headers")
    };
    let custom = map(&[("B", "3"), ("C", "3")]);

    let result: Value = service
        .request(config, Some(&custom), ResponseType::Json)
        .await
        .expect("Request failed");
    assert_eq!(result, json!({"ok": true}));
}

#[tokio::test]
async fn test_error_payload_is_normalized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "X", "error_code": 42})),
        )
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let result: Result<Value, RequestError> = service
        .request(
            RequestConfig::new(HttpMethod::Post, "/orders"),
            None,
            ResponseType::Json,
        )
        .await;

    let error = result.unwrap_err();
    assert_eq!(error, RequestError::new("X", Some(42)));
    assert!(!error.success);
}

#[tokio::test]
async fn test_error_without_payload_falls_back() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let error = service
        .request::<Value>(
            RequestConfig::new(HttpMethod::Get, "/broken"),
            None,
            ResponseType::Json,
        )
        .await
        .unwrap_err();

    assert_eq!(error, RequestError::new("Something went wrong", None));
    assert_eq!(
        serde_json::to_value(&error).unwrap(),
        json!({"success": false, "message": "Something went wrong"})
    );
}

#[tokio::test]
async fn test_relative_url_without_base_fails() {
    let service = RequestService::initialize().unwrap();
    let error = service
        .request::<Value>(
            RequestConfig::new(HttpMethod::Get, "/items"),
            None,
            ResponseType::Json,
        )
        .await
        .unwrap_err();

    assert_eq!(error.message, fetchline::GENERIC_MESSAGE);
    assert_eq!(error.error_code, None);
}

#[tokio::test]
async fn test_timeout_is_normalized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let config = RequestConfig {
        timeout: Some(Duration::from_millis(100)),
        ..RequestConfig::new(HttpMethod::Get, "/slow")
    };
    let error = service
        .request::<Value>(config, None, ResponseType::Json)
        .await
        .unwrap_err();

    assert_eq!(error, RequestError::new("Something went wrong", None));
}

#[tokio::test]
async fn test_signal_cancels_in_flight_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"late": true}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let token = CancellationToken::new();
    let config = RequestConfig {
        signal: Some(token.signal()),
        ..RequestConfig::new(HttpMethod::Get, "/slow")
    };

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.abort();
    });

    let started = std::time::Instant::now();
    let error = service
        .request::<Value>(config, None, ResponseType::Json)
        .await
        .unwrap_err();

    assert_eq!(error, RequestError::canceled());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_already_aborted_signal_cancels() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let token = CancellationToken::new();
    token.abort();
    let config = RequestConfig {
        signal: Some(token.signal()),
        ..RequestConfig::new(HttpMethod::Get, "/never")
    };

    let error = service
        .request::<Value>(config, None, ResponseType::Json)
        .await
        .unwrap_err();
    assert!(error.is_canceled());
}

#[tokio::test]
async fn test_query_params_are_appended() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "rust lang"))
        .and(query_param("page", "2"))
        .and(query_param("tags[]", "a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let config = RequestConfig {
        params: json!({"q": "rust lang", "page": 2, "tags": ["a"], "skip": null})
            .as_object()
            .cloned(),
        ..RequestConfig::new(HttpMethod::Get, "/search")
    };

    let results: Vec<Value> = service
        .request(config, None, ResponseType::Json)
        .await
        .expect("Request failed");
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_text_and_binary_response_types() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/text"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"not\":\"parsed\"}"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 1, 254, 255]))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);

    let text: String = service
        .request(
            RequestConfig::new(HttpMethod::Get, "/text"),
            None,
            ResponseType::Text,
        )
        .await
        .unwrap();
    assert_eq!(text, "{\"not\":\"parsed\"}");

    let bytes: Vec<u8> = service
        .request(
            RequestConfig::new(HttpMethod::Get, "/bin"),
            None,
            ResponseType::ArrayBuffer,
        )
        .await
        .unwrap();
    assert_eq!(bytes, vec![0, 1, 254, 255]);
}

#[tokio::test]
async fn test_xsrf_token_is_copied_for_same_origin() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/protected"))
        .and(header("x-xsrf-token", "tok123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let origin = Url::parse(&mock_server.uri()).unwrap();
    service
        .cookie_jar()
        .unwrap()
        .add_cookie_str("XSRF-TOKEN=tok123; Path=/", &origin);

    let result: Value = service
        .request(
            RequestConfig::new(HttpMethod::Post, "/protected"),
            None,
            ResponseType::Json,
        )
        .await
        .expect("Request failed");
    assert_eq!(result["ok"], true);
}

#[tokio::test]
async fn test_xsrf_token_withheld_cross_origin() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/other"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&mock_server)
        .await;

    let target = Url::parse(&format!("{}/other", mock_server.uri())).unwrap();

    for (with_credentials, expect_header) in [(false, false), (true, true)] {
        let service = RequestService::configure()
            .base_url("https://app.example.com")
            .with_credentials(with_credentials)
            .build()
            .unwrap();
        service
            .cookie_jar()
            .unwrap()
            .add_cookie_str("XSRF-TOKEN=tok123; Path=/", &target);

        let _: Value = service
            .request(
                RequestConfig::new(HttpMethod::Get, target.as_str()),
                None,
                ResponseType::Json,
            )
            .await
            .unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let last = requests.last().unwrap();
        assert_eq!(last.headers.get("x-xsrf-token").is_some(), expect_header);
    }
}

#[tokio::test]
async fn test_interceptors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/intercepted"))
        .and(header("x-request-source", "interceptor"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-deprecated", "true")
                .set_body_json(json!({"ok": true})),
        )
        .mount(&mock_server)
        .await;

    let service = RequestService::configure()
        .base_url(mock_server.uri())
        .add_request_interceptor(|config| {
            config
                .headers
                .insert("X-Request-Source".into(), "interceptor".into());
        })
        .add_response_interceptor(|envelope| {
            if envelope.header("x-deprecated").is_some() {
                return Err(NetworkError::Interceptor("deprecated endpoint".into()));
            }
            assert!(matches!(envelope.data, ResponseData::Json(_)));
            Ok(())
        })
        .error_transformer(|error| match error {
            NetworkError::Interceptor(reason) => NetworkError::HttpStatus {
                status: 410,
                body: Some(json!({"message": reason, "error_code": 410})),
            },
            other => other,
        })
        .build()
        .unwrap();

    let error = service
        .request::<Value>(
            RequestConfig::new(HttpMethod::Get, "/intercepted"),
            None,
            ResponseType::Json,
        )
        .await
        .unwrap_err();

    assert_eq!(error, RequestError::new("deprecated endpoint", Some(410)));
}

#[tokio::test]
async fn test_error_transformer_skipped_on_cancel() {
    let mock_server = MockServer::start().await;

    let service = RequestService::configure()
        .base_url(mock_server.uri())
        .error_transformer(|_| NetworkError::HttpStatus {
            status: 500,
            body: Some(json!({"message": "transformed"})),
        })
        .build()
        .unwrap();

    let token = CancellationToken::new();
    token.abort();
    let config = RequestConfig {
        signal: Some(token.signal()),
        ..RequestConfig::new(HttpMethod::Get, "/x")
    };

    let error = service
        .request::<Value>(config, None, ResponseType::Json)
        .await
        .unwrap_err();
    assert_eq!(error, RequestError::canceled());
}
