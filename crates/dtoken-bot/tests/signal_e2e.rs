//! End-to-end test: Signal receive, dispatch, Signal reply.

mod common;

use common::test_dispatcher;
use registration_store::{MemoryStore, PhoneNumber, RegistrationStore};
use signal_client::{MessageReceiver, SignalClient};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOT_NUMBER: &str = "+15555555555";

#[tokio::test]
async fn test_registration_over_signal() {
    // 1. Mock signal-cli REST API
    let signal_server = MockServer::start().await;

    let inbound = serde_json::json!([
        {
            "envelope": {
                "source": "+14155551234",
                "sourceNumber": "+14155551234",
                "sourceName": "Alice",
                "timestamp": 1677652288000i64,
                "dataMessage": {
                    "message": " 5551234567 ",
                    "timestamp": 1677652288000i64
                }
            },
            "account": BOT_NUMBER
        }
    ]);

    Mock::given(method("GET"))
        .and(path("/v1/receive/%2B15555555555"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&inbound))
        .mount(&signal_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/send"))
        .and(body_string_contains("Your D-Token is: "))
        .and(body_string_contains("+14155551234"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&signal_server)
        .await;

    // 2. Wire the bot
    let store = Arc::new(MemoryStore::new());
    let dispatcher = test_dispatcher(store.clone());
    let signal = SignalClient::new(signal_server.uri(), BOT_NUMBER).unwrap();

    // 3. Receive one message and answer it, as the service loop does
    let receiver = MessageReceiver::new(signal.clone(), Duration::from_millis(50));
    let mut stream = Box::pin(receiver.stream());
    let message = stream.next().await.unwrap();
    assert_eq!(message.display_name(), "Alice");

    let reply = dispatcher.dispatch(&message).await.unwrap();
    signal.reply(&message, &reply).await.unwrap();

    // 4. Registration persisted under the display name
    let record = store
        .find_by_phone(&PhoneNumber::parse("5551234567").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.username, "Alice");
    assert!(reply.ends_with(&record.d_token.to_string()));
}

#[tokio::test]
async fn test_registration_after_receive_error() {
    let signal_server = MockServer::start().await;

    let inbound = serde_json::json!([
        {
            "envelope": {
                "source": "+14155551234",
                "timestamp": 1677652288000i64,
                "dataMessage": {
                    "message": "5551234567",
                    "timestamp": 1677652288000i64
                }
            },
            "account": BOT_NUMBER
        }
    ]);

    // First poll fails, the next one delivers the message.
    Mock::given(method("GET"))
        .and(path("/v1/receive/%2B15555555555"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&signal_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/receive/%2B15555555555"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&inbound))
        .mount(&signal_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let dispatcher = test_dispatcher(store.clone());
    let signal = SignalClient::new(signal_server.uri(), BOT_NUMBER).unwrap();

    let receiver = MessageReceiver::new(signal, Duration::from_millis(50))
        .with_error_backoff(Duration::from_millis(20));
    let mut stream = Box::pin(receiver.stream());

    let message = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("receiver should recover after backoff")
        .unwrap();
    assert_eq!(message.display_name(), "+14155551234");

    let reply = dispatcher.dispatch(&message).await.unwrap();
    assert!(reply.starts_with("Your D-Token is: "));
    assert_eq!(store.count().await.unwrap(), 1);
}
