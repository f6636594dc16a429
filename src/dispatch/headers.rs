pub const CLUSTER_AWARE_HEADER: &str = "x-cluster-aware";
pub const CLUSTER_READ_BEHAVIOR_HEADER: &str = "x-cluster-read-behavior";
pub const CLUSTER_FAILOVER_HEADER: &str = "x-cluster-failover";
pub const PRIMARY_SERVER_URL_HEADER: &str = "x-primary-server-url";
pub const PRIMARY_SERVER_LAST_CHECK_HEADER: &str = "x-primary-server-last-check";
pub const FORCE_PRIMARY_CHECK_HEADER: &str = "x-force-primary-check";

fn bool_header(flag: bool) -> HeaderValue {
    HeaderValue::from_static(if flag { "true" } else { "false" })
}

/// Markers describing the call's cluster policy. Nothing is added for
/// `ClusterBehavior::None`.
pub fn add_cluster_headers(behavior: ClusterBehavior, headers: &mut HeaderMap) {
    if !behavior.is_cluster_aware() {
        return;
    }
    headers.insert(
        HeaderName::from_static(CLUSTER_AWARE_HEADER),
        bool_header(true),
    );
    headers.insert(
        HeaderName::from_static(CLUSTER_READ_BEHAVIOR_HEADER),
        HeaderValue::from_static(if behavior.reads_from_all() { "all" } else { "leader" }),
    );
    headers.insert(
        HeaderName::from_static(CLUSTER_FAILOVER_HEADER),
        bool_header(behavior.allows_failover()),
    );
}

/// Adds the primary's health markers when a request goes to a secondary.
fn add_primary_health_headers(
    primary: &NodeDescriptor,
    failures: &FailureTracker,
    headers: &mut HeaderMap,
) {
    if let Ok(url) = HeaderValue::from_str(&primary.address) {
        headers.insert(HeaderName::from_static(PRIMARY_SERVER_URL_HEADER), url);
    }

    let health = failures.snapshot(&primary.address);
    if health.failures > 0 {
        let stamp = health
            .last_checked_at
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Ok(value) = HeaderValue::from_str(&stamp) {
            headers.insert(HeaderName::from_static(PRIMARY_SERVER_LAST_CHECK_HEADER), value);
        }
    }
    if health.force_check {
        headers.insert(
            HeaderName::from_static(FORCE_PRIMARY_CHECK_HEADER),
            bool_header(true),
        );
    }
}

/// Reads the force-check marker back from a response, if present.
fn force_check_from_response(headers: &HeaderMap) -> Option<bool> {
    let value = headers.get(FORCE_PRIMARY_CHECK_HEADER)?.to_str().ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
