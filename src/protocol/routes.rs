/// Schedule resource: create/update writes it, retrieve is not supported
pub const SCHEDULE_ENDPOINT: &str = "/aker/schedule";
/// Persisted schedule document
pub const PERSISTENT_SCHEDULE_ENDPOINT: &str = "/aker/schedule/persistent";
/// Checksum of the persisted schedule document
pub const PERSISTENT_CHECKSUM_ENDPOINT: &str = "/aker/schedule/persistent/checksum";
/// Devices blocked right now
pub const NOW_ENDPOINT: &str = "/aker/schedule/now";

/// Schedule resource a destination refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Schedule,
    PersistentSchedule,
    PersistentChecksum,
    Now,
}

/// Routing table, most specific pattern first.
///
/// Destinations match by substring, so a pattern that contains an earlier
/// one would be unreachable; `resolve` relies on this order.
const ROUTES: [(&str, Endpoint); 4] = [
    (PERSISTENT_CHECKSUM_ENDPOINT, Endpoint::PersistentChecksum),
    (PERSISTENT_SCHEDULE_ENDPOINT, Endpoint::PersistentSchedule),
    (NOW_ENDPOINT, Endpoint::Now),
    (SCHEDULE_ENDPOINT, Endpoint::Schedule),
];

/// Find the endpoint a destination refers to
///
/// A destination matches an endpoint when it contains the endpoint's pattern
/// anywhere (e.g. `mac:112233445566/config/aker/schedule/now`). The first
/// match in table order wins.
pub fn resolve(dest: &str) -> Option<Endpoint> {
    ROUTES
        .iter()
        .find(|(pattern, _)| dest.contains(pattern))
        .map(|(_, endpoint)| *endpoint)
}
