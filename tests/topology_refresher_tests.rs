use clusterroute::{
    ClusterInfo, DispatcherConfig, FailureTracker, FileTopologyCache, InMemoryTopologyCache,
    InMemoryTopologyFetcher, NodeDescriptor, NodeRegistry, RefreshOutcome, TopologyCache,
    TopologyDestination, TopologyDocument, TopologyRefresher, cluster_identity_hash,
    select_authoritative,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::Barrier;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    registry: Arc<NodeRegistry>,
    failures: Arc<FailureTracker>,
    refresher: Arc<TopologyRefresher>,
    primary: NodeDescriptor,
}

fn harness(
    fetcher: &InMemoryTopologyFetcher,
    cache: Arc<dyn TopologyCache>,
    config: DispatcherConfig,
) -> Harness {
    let registry = Arc::new(NodeRegistry::new());
    let failures = Arc::new(FailureTracker::new());
    let refresher = TopologyRefresher::new(
        Arc::clone(&registry),
        Arc::clone(&failures),
        Arc::new(fetcher.clone()),
        cache,
        &config,
    );
    Harness {
        registry,
        failures,
        refresher,
        primary: config.primary.clone(),
    }
}

fn config(primary: &str) -> DispatcherConfig {
    DispatcherConfig::new(primary).topology_poll_interval(Duration::from_millis(20))
}

fn leader_document(commit_index: u64) -> TopologyDocument {
    TopologyDocument::new(commit_index).responder_is_leader(true)
}

async fn refresh_once(h: &Harness) -> RefreshOutcome {
    let target = h.refresher.generation() + 1;
    assert!(h.refresher.ensure_fresh(&h.primary));
    h.refresher
        .wait_for_generation(target, WAIT)
        .await
        .expect("refresh did not finish");
    h.refresher.last_outcome().unwrap()
}

#[tokio::test]
async fn primary_answer_becomes_topology() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher
        .set_topology(
            "http://a",
            leader_document(3)
                .with_destination(TopologyDestination::new("http://b").cluster_information(ClusterInfo::follower(3)))
                .with_destination(TopologyDestination::new("http://c").ignored_by_client(true)),
        )
        .await;
    let h = harness(&fetcher, Arc::new(InMemoryTopologyCache::new()), config("http://a"));

    assert_eq!(refresh_once(&h).await, RefreshOutcome::LeaderFound);

    let addresses = h
        .registry
        .current_nodes()
        .into_iter()
        .map(|node| node.address)
        .collect::<Vec<_>>();
    assert_eq!(addresses, vec!["http://b", "http://a"]);
    assert_eq!(h.registry.current_leader().unwrap().address, "http://a");
    assert!(h.refresher.last_updated().is_some());
    assert!(!h.refresher.is_refreshing());
}

#[tokio::test]
async fn leader_listing_itself_is_adopted() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher
        .set_topology(
            "http://a",
            leader_document(5)
                .with_destination(TopologyDestination::new("http://a"))
                .with_destination(TopologyDestination::new("http://b")),
        )
        .await;
    let h = harness(&fetcher, Arc::new(InMemoryTopologyCache::new()), config("http://a"));

    assert_eq!(refresh_once(&h).await, RefreshOutcome::LeaderFound);
    assert_eq!(fetcher.total_probes().await, 1);

    let nodes = h.registry.current_nodes();
    let addresses = nodes.iter().map(|node| node.address.as_str()).collect::<Vec<_>>();
    assert_eq!(addresses, vec!["http://a", "http://b"]);
    assert_eq!(h.registry.current_leader().unwrap().address, "http://a");
}

#[tokio::test]
async fn concurrent_ensure_fresh_runs_a_single_probe_round() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher.set_topology("http://a", leader_document(1)).await;
    fetcher.set_latency(Some(Duration::from_millis(100))).await;
    let h = harness(&fetcher, Arc::new(InMemoryTopologyCache::new()), config("http://a"));

    let barrier = Arc::new(Barrier::new(10));
    let callers = (0..10)
        .map(|_| {
            let refresher = Arc::clone(&h.refresher);
            let primary = h.primary.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                refresher.ensure_fresh(&primary)
            })
        })
        .collect::<Vec<_>>();

    let mut started = 0;
    for caller in callers {
        if caller.await.unwrap() {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    h.refresher.wait_for_generation(1, WAIT).await.unwrap();
    assert_eq!(fetcher.total_probes().await, 1);
    assert_eq!(h.refresher.generation(), 1);
}

#[tokio::test]
async fn higher_commit_index_wins() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher
        .set_topology("http://x", leader_document(5))
        .await;
    fetcher
        .set_topology(
            "http://y",
            TopologyDocument::new(7)
                .with_destination(TopologyDestination::new("http://z").cluster_information(ClusterInfo::leader(7))),
        )
        .await;
    let h = harness(&fetcher, Arc::new(InMemoryTopologyCache::new()), config("http://x"));
    h.registry
        .replace_topology(vec![NodeDescriptor::new("http://x"), NodeDescriptor::new("http://y")], None);

    assert_eq!(refresh_once(&h).await, RefreshOutcome::LeaderFound);

    let addresses = h
        .registry
        .current_nodes()
        .into_iter()
        .map(|node| node.address)
        .collect::<Vec<_>>();
    assert_eq!(addresses, vec!["http://z", "http://y"]);
    assert_eq!(h.registry.current_leader().unwrap().address, "http://z");
}

#[test]
fn equal_commit_index_keeps_first_answer() {
    let answers = vec![
        (NodeDescriptor::new("http://first"), TopologyDocument::new(4)),
        (NodeDescriptor::new("http://second"), TopologyDocument::new(4)),
        (NodeDescriptor::new("http://older"), TopologyDocument::new(2)),
    ];
    let (node, _) = select_authoritative(answers).unwrap();
    assert_eq!(node.address, "http://first");
    assert!(select_authoritative(Vec::new()).is_none());
}

#[tokio::test]
async fn failover_server_with_stale_topology_is_not_adopted() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher.set_unreachable("http://stale").await;
    fetcher
        .set_topology(
            "http://primary",
            TopologyDocument::new(10)
                .with_destination(TopologyDestination::new("http://b").cluster_information(ClusterInfo::leader(10))),
        )
        .await;
    fetcher
        .set_topology("http://failover", leader_document(3))
        .await;

    let h = harness(
        &fetcher,
        Arc::new(InMemoryTopologyCache::new()),
        config("http://primary").failover_server(NodeDescriptor::new("http://failover")),
    );
    h.registry
        .replace_topology(vec![NodeDescriptor::new("http://stale")], None);

    assert_eq!(refresh_once(&h).await, RefreshOutcome::LeaderFound);

    // The failover round probed primary and failover server side by side.
    assert_eq!(fetcher.probe_count("http://primary").await, 1);
    assert_eq!(fetcher.probe_count("http://failover").await, 1);
    assert_eq!(fetcher.probe_count("http://stale").await, 2);

    assert_eq!(h.registry.current_leader().unwrap().address, "http://b");
    let nodes = h.registry.current_nodes();
    assert!(!nodes.contains(&NodeDescriptor::new("http://failover")));
    assert!(nodes.contains(&NodeDescriptor::new("http://primary")));
}

#[tokio::test]
async fn unreachable_primary_falls_back_to_failover_servers() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher.set_unreachable("http://primary").await;
    fetcher
        .set_topology("http://failover", leader_document(2))
        .await;

    let h = harness(
        &fetcher,
        Arc::new(InMemoryTopologyCache::new()),
        config("http://primary").failover_server(NodeDescriptor::new("http://failover")),
    );

    assert_eq!(refresh_once(&h).await, RefreshOutcome::LeaderFound);
    assert_eq!(h.registry.current_leader().unwrap().address, "http://failover");
    assert_eq!(fetcher.probe_count("http://primary").await, 2);
    assert_eq!(fetcher.probe_count("http://failover").await, 1);
}

#[tokio::test]
async fn nobody_answering_adopts_primary_as_sole_leader() {
    let fetcher = InMemoryTopologyFetcher::new();
    let h = harness(
        &fetcher,
        Arc::new(InMemoryTopologyCache::new()),
        config("http://primary").failover_server(NodeDescriptor::new("http://failover")),
    );

    assert_eq!(refresh_once(&h).await, RefreshOutcome::SingleNodeFallback);
    assert_eq!(h.registry.current_nodes(), vec![NodeDescriptor::new("http://primary")]);
    assert_eq!(
        h.registry.current_leader(),
        Some(NodeDescriptor::new("http://primary"))
    );
}

#[tokio::test]
async fn cached_leader_skips_first_probe_only() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher.set_topology("http://a", leader_document(9)).await;
    let cache = InMemoryTopologyCache::new();
    let identity = cluster_identity_hash(&NodeDescriptor::new("http://a"));
    cache
        .insert(
            identity,
            vec![
                NodeDescriptor::new("http://a"),
                NodeDescriptor::new("http://cached-leader").with_cluster_info(ClusterInfo::leader(8)),
            ],
        )
        .await;
    let h = harness(&fetcher, Arc::new(cache), config("http://a"));

    assert_eq!(refresh_once(&h).await, RefreshOutcome::CachedLeader);
    assert_eq!(fetcher.total_probes().await, 0);
    assert_eq!(
        h.registry.current_leader().unwrap().address,
        "http://cached-leader"
    );

    fetcher.set_unreachable("http://cached-leader").await;
    assert_eq!(refresh_once(&h).await, RefreshOutcome::LeaderFound);
    assert_eq!(fetcher.probe_count("http://a").await, 1);
    assert_eq!(h.registry.current_leader().unwrap().address, "http://a");
}

#[tokio::test]
async fn cached_nodes_without_leader_are_probed() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher.set_topology("http://b", leader_document(4)).await;
    let cache = InMemoryTopologyCache::new();
    cache
        .insert(
            cluster_identity_hash(&NodeDescriptor::new("http://a")),
            vec![NodeDescriptor::new("http://b")],
        )
        .await;
    let h = harness(&fetcher, Arc::new(cache), config("http://a"));

    assert_eq!(refresh_once(&h).await, RefreshOutcome::LeaderFound);
    assert_eq!(fetcher.probe_count("http://a").await, 0);
    assert_eq!(h.registry.current_leader().unwrap().address, "http://b");
}

#[tokio::test]
async fn refresh_saves_topology_to_cache() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher.set_topology("http://a", leader_document(1)).await;
    let cache = InMemoryTopologyCache::new();
    let h = harness(&fetcher, Arc::new(cache.clone()), config("http://a"));

    refresh_once(&h).await;

    let saved = cache
        .load(&cluster_identity_hash(&h.primary))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved, vec![NodeDescriptor::new("http://a")]);
    assert!(saved[0].is_leader());
}

#[tokio::test]
async fn refresh_keeps_polling_until_leader_is_elected() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher.set_topology("http://a", TopologyDocument::new(1)).await;
    let h = harness(&fetcher, Arc::new(InMemoryTopologyCache::new()), config("http://a"));

    assert!(h.refresher.ensure_fresh(&h.primary));
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(h.refresher.is_refreshing());
    assert!(h.registry.current_leader().is_none());
    assert!(fetcher.probe_count("http://a").await >= 2);

    fetcher.set_topology("http://a", leader_document(2)).await;
    h.refresher.wait_for_generation(1, WAIT).await.unwrap();
    assert_eq!(h.refresher.last_outcome(), Some(RefreshOutcome::LeaderFound));
    assert_eq!(h.registry.current_leader().unwrap().address, "http://a");
}

#[tokio::test]
async fn shutdown_releases_single_flight_marker() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher.set_topology("http://a", TopologyDocument::new(1)).await;
    let h = harness(&fetcher, Arc::new(InMemoryTopologyCache::new()), config("http://a"));

    assert!(h.refresher.ensure_fresh(&h.primary));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!h.refresher.ensure_fresh(&h.primary));

    h.refresher.shutdown();
    h.refresher.wait_for_generation(1, WAIT).await.unwrap();
    assert_eq!(h.refresher.last_outcome(), Some(RefreshOutcome::Aborted));
    assert!(!h.refresher.is_refreshing());

    assert!(h.refresher.ensure_fresh(&h.primary));
    h.refresher.shutdown();
}

#[tokio::test]
async fn shutdown_aborts_latest_run_after_earlier_one_finished() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher.set_topology("http://a", leader_document(1)).await;
    let h = harness(&fetcher, Arc::new(InMemoryTopologyCache::new()), config("http://a"));

    assert_eq!(refresh_once(&h).await, RefreshOutcome::LeaderFound);

    fetcher.set_topology("http://a", TopologyDocument::new(2)).await;
    h.registry.clear_leader();
    assert!(h.refresher.ensure_fresh(&h.primary));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.refresher.is_refreshing());

    h.refresher.shutdown();
    h.refresher.wait_for_generation(2, WAIT).await.unwrap();
    assert_eq!(h.refresher.last_outcome(), Some(RefreshOutcome::Aborted));
    assert!(!h.refresher.is_refreshing());

    let probes = fetcher.total_probes().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fetcher.total_probes().await, probes);
}

#[tokio::test]
async fn successful_probe_resets_failure_count() {
    let fetcher = InMemoryTopologyFetcher::new();
    fetcher.set_topology("http://a", leader_document(1)).await;
    let h = harness(&fetcher, Arc::new(InMemoryTopologyCache::new()), config("http://a"));
    h.failures.record_failure("http://a");
    h.failures.record_failure("http://a");
    assert!(!h.failures.is_healthy_enough("http://a"));

    refresh_once(&h).await;
    assert_eq!(h.failures.failure_count("http://a"), 0);
}

#[tokio::test]
async fn file_cache_round_trip_and_corruption() {
    let dir = tempdir().unwrap();
    let cache = FileTopologyCache::new(dir.path().join("topology"));
    assert!(cache.load("cluster-1").await.unwrap().is_none());

    let nodes = vec![
        NodeDescriptor::new("http://a").with_cluster_info(ClusterInfo::leader(3)),
        NodeDescriptor::new("http://b"),
    ];
    cache.save("cluster-1", &nodes).await.unwrap();
    let loaded = cache.load("cluster-1").await.unwrap().unwrap();
    assert_eq!(loaded, nodes);
    assert!(loaded[0].is_leader());

    std::fs::write(cache.path_for("cluster-1"), b"{ not json").unwrap();
    assert!(cache.load("cluster-1").await.unwrap().is_none());
}

#[test]
fn cluster_identity_is_stable_per_address() {
    let a1 = cluster_identity_hash(&NodeDescriptor::new("http://A:8080/"));
    let a2 = cluster_identity_hash(&NodeDescriptor::new("http://a:8080"));
    let b = cluster_identity_hash(&NodeDescriptor::new("http://b:8080"));
    assert_eq!(a1, a2);
    assert_ne!(a1, b);
}
