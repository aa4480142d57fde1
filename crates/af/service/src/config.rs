use chrono::Duration;

/// Tunables for the coordination core.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Maximum node depth (`1.2.3` has depth 3).
    pub max_depth: usize,
    /// Maximum direct children per node.
    pub max_children: usize,
    /// CAS retry budget before surfacing `ConcurrentModification`.
    pub cas_attempts: u32,
    /// Claim TTL applied when the caller does not pass one.
    pub default_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            max_depth: 20,
            max_children: 10,
            cas_attempts: 8,
            default_ttl: Duration::minutes(15),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.max_depth, 20);
        assert_eq!(config.max_children, 10);
        assert_eq!(config.cas_attempts, 8);
        assert_eq!(config.default_ttl, Duration::minutes(15));
    }
}
