// ID Provider Port (for deterministic testing)

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique transaction ID
    fn generate_id(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Hands out `tx-1`, `tx-2`, ... in call order
    #[derive(Default)]
    pub struct SequentialIdProvider {
        next: AtomicU64,
    }

    impl SequentialIdProvider {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl IdProvider for SequentialIdProvider {
        fn generate_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            format!("tx-{}", n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::SequentialIdProvider;
    use super::*;

    #[test]
    fn test_uuid_ids_are_unique() {
        let provider = UuidProvider;
        assert_ne!(provider.generate_id(), provider.generate_id());
    }

    #[test]
    fn test_sequential_ids() {
        let provider = SequentialIdProvider::new();
        assert_eq!(provider.generate_id(), "tx-1");
        assert_eq!(provider.generate_id(), "tx-2");
    }
}
