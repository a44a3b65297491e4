//! Well-known coordination-store paths.
//!
//! These are not consumed by anything in this crate (the store client is an
//! external collaborator), but a `CoordGateway` implementation needs them,
//! and the in-memory fakes used by this crate's tests key their maps by the
//! same layout so test fixtures read the same way production ones would.

/// `/consumers/<group>/ids/<consumerId>`
pub fn consumer(group: &str, consumer_id: &str) -> String {
    format!("/consumers/{}/ids/{}", group, consumer_id)
}

/// `/consumers/<group>/ids`
pub fn consumers(group: &str) -> String {
    format!("/consumers/{}/ids", group)
}

/// `/consumers/<group>/owners/<topic>/<partition>`
pub fn owner(group: &str, topic: &str, partition: i32) -> String {
    format!("/consumers/{}/owners/{}/{}", group, topic, partition)
}

/// `/consumers/<group>/offsets/<topic>/<partition>`
pub fn offset(group: &str, topic: &str, partition: i32) -> String {
    format!("/consumers/{}/offsets/{}/{}", group, topic, partition)
}

/// `/consumers/<group>/changes`
pub fn changes(group: &str) -> String {
    format!("/consumers/{}/changes", group)
}

/// `/consumers/<group>/sync`
pub fn sync(group: &str) -> String {
    format!("/consumers/{}/sync", group)
}

/// `/brokers/ids`
pub fn broker_ids() -> &'static str {
    "/brokers/ids"
}

/// `/brokers/topics`
pub fn broker_topics() -> &'static str {
    "/brokers/topics"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_match_the_documented_layout() {
        assert_eq!(consumer("g", "c0"), "/consumers/g/ids/c0");
        assert_eq!(owner("g", "t", 3), "/consumers/g/owners/t/3");
        assert_eq!(offset("g", "t", 3), "/consumers/g/offsets/t/3");
        assert_eq!(changes("g"), "/consumers/g/changes");
        assert_eq!(sync("g"), "/consumers/g/sync");
        assert_eq!(broker_ids(), "/brokers/ids");
        assert_eq!(broker_topics(), "/brokers/topics");
    }
}
