use rand::distributions::{Alphanumeric, DistString};
use serde::{Deserialize, Serialize};

/// Represents storage quotas from MEGA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageQuotas {
    /// The amount of memory used (in bytes).
    pub memory_used: u64,
    /// The total amount of memory, used or unused (in bytes).
    pub memory_total: u64,
}

/// Generates a random alphanumeric string, used as the idempotence token
/// MEGA requires on mutating commands (`i`) so a retried request doesn't
/// create a duplicate.
pub(crate) fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    Alphanumeric.sample_string(&mut rng, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_string_has_requested_length() {
        assert_eq!(random_string(10).len(), 10);
    }
}
