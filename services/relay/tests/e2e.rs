// End-to-end publish/subscribe flow over a real listener, mirroring how a
// deployment would wire the relay together.
use bytes::Bytes;
use relay::http;
use relay_broker::Registry;
use relay_client::{ClientError, Subscription};
use relay_wire::Envelope;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

async fn start_relay(mailbox_capacity: usize) -> (SocketAddr, Registry) {
    let registry = Registry::new(mailbox_capacity).expect("registry");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = http::router(registry.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, registry)
}

// Registration happens on the server after the upgrade completes; wait for
// it so publishes cannot race ahead of the subscriber.
async fn wait_for_subscribers(registry: &Registry, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while registry.subscriber_count() < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscriber registration deadline");
}

#[tokio::test]
async fn publish_reaches_subscriber_in_order() {
    let (addr, registry) = start_relay(2).await;

    let (subscription, mut messages) =
        Subscription::connect(&format!("ws://{addr}/subscribe"), 2)
            .await
            .expect("subscribe");
    let cancel = CancellationToken::new();
    let receive = tokio::spawn(subscription.receive(cancel.clone()));
    wait_for_subscribers(&registry, 1).await;

    let client = reqwest::Client::new();
    for content in [b"hello" as &[u8], b"world"] {
        let envelope = Envelope::new(Bytes::copy_from_slice(content));
        let response = client
            .post(format!("http://{addr}/publish"))
            .json(&envelope)
            .send()
            .await
            .expect("post");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.expect("body"), "okay");
    }

    let first = timeout(Duration::from_secs(2), messages.recv())
        .await
        .expect("deadline")
        .expect("first");
    assert_eq!(first.content, Bytes::from_static(b"hello"));
    let second = timeout(Duration::from_secs(2), messages.recv())
        .await
        .expect("deadline")
        .expect("second");
    assert_eq!(second.content, Bytes::from_static(b"world"));

    // Ask the client to exit and make sure it reports cancellation.
    cancel.cancel();
    let err = receive.await.expect("join").expect_err("cancelled");
    assert!(matches!(
        err,
        ClientError::Cancelled | ClientError::CancelledBeforeDelivery
    ));
    // The serving loop notices the client's close and releases the entry.
    timeout(Duration::from_secs(2), async {
        while registry.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("unregister deadline");
}

#[tokio::test]
async fn publish_without_subscribers_still_succeeds() {
    let (addr, registry) = start_relay(2).await;
    let client = reqwest::Client::new();
    let envelope = Envelope::new(Bytes::from_static(b"nobody home"));
    let response = client
        .post(format!("http://{addr}/publish"))
        .json(&envelope)
        .send()
        .await
        .expect("post");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(registry.subscriber_count(), 0);
}

#[tokio::test]
async fn publish_rejects_wrong_method_and_bad_body() {
    let (addr, _registry) = start_relay(2).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/publish"))
        .send()
        .await
        .expect("get");
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

    let response = client
        .post(format!("http://{addr}/publish"))
        .header("content-type", "application/json")
        .body("{not an envelope")
        .send()
        .await
        .expect("post");
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn two_subscribers_each_observe_the_publish() {
    let (addr, registry) = start_relay(4).await;

    let mut receivers = Vec::new();
    let mut tasks = Vec::new();
    for _ in 0..2 {
        let (subscription, messages) =
            Subscription::connect(&format!("ws://{addr}/subscribe"), 4)
                .await
                .expect("subscribe");
        receivers.push(messages);
        tasks.push(tokio::spawn(subscription.receive(CancellationToken::new())));
    }
    wait_for_subscribers(&registry, 2).await;

    let delivered = registry.broadcast(&Envelope::new(Bytes::from_static(b"fanout")));
    assert_eq!(delivered, 2);
    for messages in receivers.iter_mut() {
        let envelope = timeout(Duration::from_secs(2), messages.recv())
            .await
            .expect("deadline")
            .expect("envelope");
        assert_eq!(envelope.content, Bytes::from_static(b"fanout"));
    }
}
