mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeUpstream, example_zone, exchange, query_bytes};
use ddns_agent::agent::log_stats_events;
use ddns_agent::dns::enums::DNSResourceType;
use ddns_agent::dns::resource::DNSResourceData;
use ddns_agent::psl::SuffixList;
use ddns_agent::source::{FileRecordSource, StaticRecordSource};
use ddns_agent::stats::Stats;
use ddns_agent::zone::{ChangeEvent, RecordType, ResourceRecord, ZoneIndex};
use ddns_agent::{Agent, AgentConfig, AgentEvent};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn test_config() -> AgentConfig {
    AgentConfig {
        port: 0,
        stats_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

async fn loopback_addr(agent: &Agent) -> std::net::SocketAddr {
    agent
        .listeners()
        .await
        .into_iter()
        .find(|l| l.key == "127.0.0.1:0")
        .expect("loopback listener")
        .local_addr
}

async fn wait_for(
    events: &mut tokio::sync::broadcast::Receiver<AgentEvent>,
    wanted: impl Fn(&AgentEvent) -> bool,
) -> AgentEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.unwrap();
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not received")
}

#[tokio::test]
async fn test_start_syncs_file_records_and_goes_online() {
    let dir = TempDir::new().unwrap();
    let records_path = dir.path().join("records.json");
    std::fs::write(&records_path, serde_json::to_vec(&example_zone()).unwrap()).unwrap();

    let agent = Agent::new(
        test_config(),
        Arc::new(FileRecordSource::new(&records_path)),
        Arc::new(FakeUpstream::default()),
        Arc::new(SuffixList::bundled()),
    );
    let mut events = agent.subscribe();
    agent.start(None).await;

    assert_eq!(wait_for(&mut events, |e| *e == AgentEvent::Online).await, AgentEvent::Online);
    // bootstrap entries come on top of the synced zone
    assert!(agent.engine().entries() > 5);

    let addr = loopback_addr(&agent).await;
    let response = exchange(addr, &query_bytes(7, "api.dev.example.com", DNSResourceType::A))
        .await
        .unwrap();
    assert!(response.header.aa);
    assert!(response.header.ra);
    assert_eq!(response.answers[0].name(), "api.dev.example.com");
    assert_eq!(
        response.answers[0].rdata,
        DNSResourceData::A("203.0.113.30".parse().unwrap())
    );

    agent.shutdown().await;
}

#[tokio::test]
async fn test_missing_records_file_still_starts() {
    let dir = TempDir::new().unwrap();
    let agent = Agent::new(
        test_config(),
        Arc::new(FileRecordSource::new(dir.path().join("absent.json"))),
        Arc::new(FakeUpstream::default()),
        Arc::new(SuffixList::bundled()),
    );
    let mut events = agent.subscribe();
    agent.start(None).await;

    wait_for(&mut events, |e| *e == AgentEvent::Online).await;
    assert!(agent.sync().await.is_err());
    assert!(!agent.listeners().await.is_empty());

    agent.shutdown().await;
}

#[tokio::test]
async fn test_change_events_reach_the_index() {
    let agent = Agent::new(
        test_config(),
        Arc::new(StaticRecordSource::new(example_zone())),
        Arc::new(FakeUpstream::default()),
        Arc::new(SuffixList::bundled()),
    );
    let (tx, rx) = mpsc::channel(8);
    agent.start(Some(rx)).await;
    let addr = loopback_addr(&agent).await;

    let record = ResourceRecord::new("mail", "mail.example.com", RecordType::A, "203.0.113.25");
    tx.send(ChangeEvent::Created(record.clone())).await.unwrap();

    let mut answered = false;
    for _ in 0..20 {
        let response = exchange(addr, &query_bytes(8, "mail.example.com", DNSResourceType::A))
            .await
            .unwrap();
        if !response.answers.is_empty() {
            answered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(answered);

    tx.send(ChangeEvent::removed(&record)).await.unwrap();
    let mut removed = false;
    for _ in 0..20 {
        let response = exchange(addr, &query_bytes(9, "mail.example.com", DNSResourceType::A))
            .await
            .unwrap();
        if response.answers.is_empty() {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(removed);

    agent.shutdown().await;
}

#[tokio::test]
async fn test_stats_events_are_published() {
    let agent = Agent::new(
        test_config(),
        Arc::new(StaticRecordSource::new(example_zone())),
        Arc::new(FakeUpstream::default()),
        Arc::new(SuffixList::bundled()),
    );
    let mut events = agent.subscribe();
    agent.start(None).await;

    let addr = loopback_addr(&agent).await;
    exchange(addr, &query_bytes(1, "www.example.com", DNSResourceType::A))
        .await
        .unwrap();

    let event = wait_for(&mut events, |e| {
        matches!(e, AgentEvent::Stats(s) if s.querys_total >= 1)
    })
    .await;
    let AgentEvent::Stats(snapshot) = event else {
        unreachable!()
    };
    assert!(snapshot.records > 0);
    assert_eq!(snapshot.errors_total, 0);

    agent.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_saves_cache() {
    let dir = TempDir::new().unwrap();
    let cache_path = dir.path().join("upstream-cache.json");
    let upstream = Arc::new(FakeUpstream::default());

    let agent = Agent::new(
        AgentConfig {
            cache_file: Some(cache_path.clone()),
            ..test_config()
        },
        Arc::new(StaticRecordSource::new(example_zone())),
        upstream.clone(),
        Arc::new(SuffixList::bundled()),
    );
    let mut events = agent.subscribe();
    agent.start(None).await;
    // second start is a no-op
    agent.start(None).await;

    let addr = loopback_addr(&agent).await;
    let response = exchange(addr, &query_bytes(2, "example.org", DNSResourceType::A))
        .await
        .unwrap();
    assert_eq!(response.answers.len(), 1);
    assert_eq!(upstream.calls(), 1);

    agent.shutdown().await;
    agent.shutdown().await;
    wait_for(&mut events, |e| *e == AgentEvent::Offline).await;
    assert!(agent.listeners().await.is_empty());
    assert!(cache_path.exists());

    // a fresh agent picks the snapshot back up and answers without the upstream
    let upstream = Arc::new(FakeUpstream::default());
    let agent = Agent::new(
        AgentConfig {
            cache_file: Some(cache_path),
            ..test_config()
        },
        Arc::new(StaticRecordSource::default()),
        upstream.clone(),
        Arc::new(SuffixList::bundled()),
    );
    agent.start(None).await;
    let addr = loopback_addr(&agent).await;
    let response = exchange(addr, &query_bytes(3, "example.org", DNSResourceType::A))
        .await
        .unwrap();
    assert_eq!(response.answers.len(), 1);
    assert_eq!(upstream.calls(), 0);

    agent.shutdown().await;
}

#[tokio::test]
async fn test_start_after_shutdown_stays_down() {
    let agent = Agent::new(
        test_config(),
        Arc::new(StaticRecordSource::new(example_zone())),
        Arc::new(FakeUpstream::default()),
        Arc::new(SuffixList::bundled()),
    );
    agent.shutdown().await;

    let mut events = agent.subscribe();
    agent.start(None).await;

    assert!(agent.listeners().await.is_empty());
    // no Online and no stats ticks from a stopped agent
    let quiet = timeout(Duration::from_millis(200), events.recv()).await;
    assert!(quiet.is_err());
}

#[tokio::test]
async fn test_stats_logger_survives_lag() {
    let (tx, rx) = tokio::sync::broadcast::channel(1);
    let snapshot = Stats::new().flush(&ZoneIndex::new());

    // overflow the channel before the logger reads anything
    for _ in 0..3 {
        tx.send(AgentEvent::Stats(snapshot.clone())).unwrap();
    }
    let logger = tokio::spawn(log_stats_events(rx));
    tokio::time::sleep(Duration::from_millis(20)).await;
    tx.send(AgentEvent::Stats(snapshot)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(tx);

    let seen = timeout(Duration::from_secs(1), logger).await.unwrap().unwrap();
    assert_eq!(seen, 2);
}
