mod common;

use common::{UPSTREAM_ADDR, example_zone, exchange, query_bytes, test_engine};
use ddns_agent::config::BindAddress;
use ddns_agent::dns::enums::DNSResourceType;
use ddns_agent::dns::resource::DNSResourceData;
use ddns_agent::error::AgentError;
use ddns_agent::listener::{Family, ListenerManager, ListenerState};

#[tokio::test]
async fn test_udp_round_trip_answers_from_index() {
    let (engine, _) = test_engine(example_zone());
    let manager = ListenerManager::new(engine);
    let addr = manager
        .create_listener(Family::V4, 0, "127.0.0.1", false)
        .await
        .unwrap();

    let response = exchange(addr, &query_bytes(0x4242, "www.example.com", DNSResourceType::A))
        .await
        .expect("no response");
    assert_eq!(response.header.id, 0x4242);
    assert!(response.header.qr);
    assert!(response.header.aa);
    assert_eq!(response.questions[0].name(), "www.example.com");
    assert_eq!(response.answers.len(), 1);
    assert_eq!(
        response.answers[0].rdata,
        DNSResourceData::A("203.0.113.10".parse().unwrap())
    );

    manager.close_all().await;
}

#[tokio::test]
async fn test_cname_chain_over_udp() {
    let (engine, _) = test_engine(example_zone());
    let manager = ListenerManager::new(engine);
    let addr = manager
        .create_listener(Family::V4, 0, "127.0.0.1", false)
        .await
        .unwrap();

    let response = exchange(addr, &query_bytes(1, "blog.example.com", DNSResourceType::A))
        .await
        .unwrap();
    assert_eq!(response.answers.len(), 2);
    assert_eq!(
        response.answers[0].rdata,
        DNSResourceData::CNAME("www.example.com".into())
    );
    assert_eq!(
        response.answers[1].rdata,
        DNSResourceData::A("203.0.113.10".parse().unwrap())
    );

    manager.close_all().await;
}

#[tokio::test]
async fn test_listener_is_idempotent_per_address() {
    let (engine, _) = test_engine(example_zone());
    let manager = ListenerManager::new(engine);

    let first = manager
        .create_listener(Family::V4, 0, "127.0.0.1", true)
        .await
        .unwrap();
    let second = manager
        .bind(BindAddress::new("127.0.0.1".parse().unwrap(), true), 0)
        .await
        .unwrap();
    assert_eq!(first, second);

    let listeners = manager.listeners().await;
    assert_eq!(listeners.len(), 1);
    assert_eq!(listeners[0].key, "127.0.0.1:0");
    assert!(listeners[0].trusted);
    assert_eq!(manager.state("127.0.0.1", 0).await, ListenerState::Listening);

    manager.close_all().await;
    assert_eq!(manager.state("127.0.0.1", 0).await, ListenerState::Unbound);
    assert!(manager.listeners().await.is_empty());
}

#[tokio::test]
async fn test_unsupported_type_gets_no_reply() {
    let (engine, _) = test_engine(example_zone());
    let manager = ListenerManager::new(engine.clone());
    let addr = manager
        .create_listener(Family::V4, 0, "127.0.0.1", true)
        .await
        .unwrap();

    let reply = exchange(addr, &query_bytes(9, "www.example.com", DNSResourceType::SRV)).await;
    assert!(reply.is_none());

    let snapshot = engine.flush_stats();
    assert_eq!(snapshot.querys, 1);
    assert_eq!(snapshot.misses, 1);

    manager.close_all().await;
}

#[tokio::test]
async fn test_malformed_datagram_counts_error() {
    let (engine, _) = test_engine(example_zone());
    let manager = ListenerManager::new(engine.clone());
    let addr = manager
        .create_listener(Family::V4, 0, "127.0.0.1", false)
        .await
        .unwrap();

    assert!(exchange(addr, &[0xde, 0xad]).await.is_none());
    assert_eq!(engine.flush_stats().errors, 1);

    manager.close_all().await;
}

#[tokio::test]
async fn test_trusted_listener_forwards_unowned_names() {
    let (engine, upstream) = test_engine(example_zone());
    let manager = ListenerManager::new(engine);
    let addr = manager
        .create_listener(Family::V4, 0, "127.0.0.1", true)
        .await
        .unwrap();

    let response = exchange(addr, &query_bytes(3, "example.org", DNSResourceType::A))
        .await
        .unwrap();
    assert!(!response.header.aa);
    assert!(response.header.ra);
    assert_eq!(response.answers.len(), 1);
    assert_eq!(response.answers[0].rdata, DNSResourceData::A(UPSTREAM_ADDR));
    assert_eq!(upstream.calls(), 1);

    // owned zone: empty answer, never forwarded
    let response = exchange(addr, &query_bytes(4, "nope.example.com", DNSResourceType::A))
        .await
        .unwrap();
    assert!(response.answers.is_empty());
    assert_eq!(upstream.calls(), 1);

    manager.close_all().await;
}

#[tokio::test]
async fn test_closed_listener_stops_answering() {
    let (engine, _) = test_engine(example_zone());
    let manager = ListenerManager::new(engine);
    let addr = manager
        .create_listener(Family::V4, 0, "127.0.0.1", false)
        .await
        .unwrap();
    manager.close_all().await;

    let reply = exchange(addr, &query_bytes(5, "www.example.com", DNSResourceType::A)).await;
    assert!(reply.is_none());
}

#[tokio::test]
async fn test_bad_addresses_are_rejected() {
    let (engine, _) = test_engine(example_zone());
    let manager = ListenerManager::new(engine);

    assert!(matches!(
        manager.create_listener(Family::V4, 0, "not-an-ip", false).await,
        Err(AgentError::InvalidAddress(_))
    ));
    assert!(matches!(
        manager.create_listener(Family::V6, 0, "127.0.0.1", false).await,
        Err(AgentError::InvalidAddress(_))
    ));
    assert!(manager.listeners().await.is_empty());
}
