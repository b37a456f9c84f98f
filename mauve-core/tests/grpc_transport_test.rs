use echo_service::{ECHO_METADATA_KEY, Echo, EchoServiceServer, SERVICE_NAME};
use http::StatusCode;
use mauve_core::grpc::{GrpcRequest, GrpcTransport};
use mauve_core::{Client, ConnectionInformation, Credentials, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::runtime::Handle;

#[derive(Debug, PartialEq, Deserialize)]
struct EchoReply {
    message: String,
    #[serde(default)]
    sequence: i32,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn echo_client() -> Client<GrpcTransport<EchoServiceServer<Echo>>> {
    init_tracing();
    let transport = GrpcTransport::from_service(
        Handle::current(),
        EchoServiceServer::new(Echo),
        echo_service::FILE_DESCRIPTOR_SET,
    )
    .unwrap();

    Client::new(ConnectionInformation::new("in-process://echo"), transport)
}

fn echo(method: &str, body: Value) -> GrpcRequest {
    GrpcRequest::new(SERVICE_NAME, method, body)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unary() {
    let client = echo_client();

    let res: Response<Value> = client
        .execute_async(echo("UnaryEcho", json!({ "message": "hello" })))
        .await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.message(), "Success.");
    assert_eq!(res.into_content(), Some(json!({ "message": "hello" })));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unary_into_a_typed_output() {
    let client = echo_client();

    let res: Response<EchoReply> = client
        .execute_async(echo("UnaryEcho", json!({ "message": "typed" })))
        .await;

    assert_eq!(
        res.into_content(),
        Some(EchoReply {
            message: "typed".to_string(),
            sequence: 0
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_streaming() {
    let client = echo_client();

    let res: Response<Vec<EchoReply>> = client
        .execute_async(echo(
            "ServerStreamingEcho",
            json!({ "message": "stream", "repeat": 2 }),
        ))
        .await;

    let replies = res.into_content().unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].message, "stream #0");
    assert_eq!(replies[1].message, "stream #1");
    assert_eq!(replies[1].sequence, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_streaming() {
    let client = echo_client();
    let body = json!([
        { "message": "A" },
        { "message": "B" },
        { "message": "C" }
    ]);

    let res: Response<EchoReply> = client
        .execute_async(echo("ClientStreamingEcho", body))
        .await;

    assert_eq!(
        res.into_content(),
        Some(EchoReply {
            message: "A B C".to_string(),
            sequence: 3
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_streaming_requires_an_array() {
    let client = echo_client();

    let res: Response<Value> = client
        .execute_async(echo("ClientStreamingEcho", json!({ "message": "A" })))
        .await;

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        res.message(),
        "Invalid input: 'Client streaming requires a JSON Array body'"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bidirectional_streaming() {
    let client = echo_client();
    let body = json!([{ "message": "ping" }, { "message": "pong" }]);

    let res: Response<Vec<EchoReply>> = client
        .execute_async(echo("BidirectionalEcho", body))
        .await;

    let messages: Vec<String> = res
        .into_content()
        .unwrap()
        .into_iter()
        .map(|r| r.message)
        .collect();
    assert_eq!(messages, vec!["echo: ping", "echo: pong"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_is_a_fault() {
    let client = echo_client();

    let res: Response<Value> = client
        .execute_async(echo("UnaryEcho", json!({ "message": "" })))
        .await;

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.content(), None);
    assert_eq!(
        res.message(),
        "gRPC status InvalidArgument: message must not be empty"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_service_and_method() {
    let client = echo_client();

    let res: Response<Value> = client
        .execute_async(GrpcRequest::new("echo.Missing", "UnaryEcho", json!({})))
        .await;
    assert_eq!(res.message(), "Service 'echo.Missing' not found");

    let res: Response<Value> = client
        .execute_async(echo("Shout", json!({})))
        .await;
    assert_eq!(
        res.message(),
        "Method 'Shout' not found in service 'echo.EchoService'"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_body_that_does_not_match_the_schema() {
    let client = echo_client();

    let res: Response<Value> = client
        .execute_async(echo("UnaryEcho", json!({ "nope": 1 })))
        .await;

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.content(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_output_that_does_not_fit_the_type() {
    let client = echo_client();

    let res: Response<Vec<EchoReply>> = client
        .execute_async(echo("UnaryEcho", json!({ "message": "single" })))
        .await;

    assert_eq!(res.content(), None);
    assert!(res.message().starts_with("Failed to decode the response body"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_credentials_are_sent_as_authorization_metadata() {
    let mut client = echo_client();
    client.set_connection(
        ConnectionInformation::new("in-process://echo").with_credentials(Credentials::Bearer {
            token: "s3cr3t".to_string(),
        }),
    );

    let request = echo("UnaryEcho", json!({ "message": "ignored" }))
        .with_header(ECHO_METADATA_KEY, "authorization");
    let res: Response<EchoReply> = client.execute_async(request).await;

    assert_eq!(res.into_content().unwrap().message, "Bearer s3cr3t");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_custom_headers_are_sent() {
    let client = echo_client();

    let request = echo("UnaryEcho", json!({ "message": "ignored" }))
        .with_header(ECHO_METADATA_KEY, "x-tenant")
        .with_header("x-tenant", "acme");
    let res: Response<EchoReply> = client.execute_async(request).await;

    assert_eq!(res.into_content().unwrap().message, "acme");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_server_fails_within_the_timeout() {
    init_tracing();
    let connection = ConnectionInformation::new("http://127.0.0.1:1")
        .with_timeout(Duration::from_millis(500));
    let transport = GrpcTransport::connect_lazy(
        Handle::current(),
        &connection,
        echo_service::FILE_DESCRIPTOR_SET,
    )
    .unwrap();
    let client = Client::new(connection, transport);

    let res: Response<Value> = client
        .execute_async(echo("UnaryEcho", json!({ "message": "hello" })))
        .await;

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.content(), None);
    assert!(!res.message().is_empty());
}

#[tokio::test]
async fn test_sync_execute_inside_a_current_thread_runtime_is_a_fault() {
    let client = echo_client();

    let res: Response<Value> = client.execute(&echo("UnaryEcho", json!({ "message": "hi" })));

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.content(), None);
    assert_eq!(
        res.message(),
        "Client::execute cannot block inside a single-threaded async runtime; \
         use Client::execute_async instead"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_execute_inside_a_multi_thread_runtime() {
    let client = echo_client();

    let res: Response<EchoReply> = client.execute(&echo("UnaryEcho", json!({ "message": "hi" })));

    assert_eq!(res.into_content().unwrap().message, "hi");
}

#[test]
fn test_sync_execute_on_an_owned_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let transport = GrpcTransport::from_service(
        runtime.handle().clone(),
        EchoServiceServer::new(Echo),
        echo_service::FILE_DESCRIPTOR_SET,
    )
    .unwrap();
    let client = Client::new(ConnectionInformation::new("in-process://echo"), transport);

    assert_eq!(client.transport().list_services(), vec![SERVICE_NAME]);

    let res: Response<EchoReply> = client.execute(&echo("UnaryEcho", json!({ "message": "sync" })));

    assert_eq!(res.into_content().unwrap().message, "sync");
}
