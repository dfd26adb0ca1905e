/// Application query/result cache, invalidated on logout so no authenticated
/// data outlives the session.
pub trait QueryCache: Send + Sync {
    fn invalidate_all(&self);
}

/// For hosts without a query cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopQueryCache;

impl QueryCache for NoopQueryCache {
    fn invalidate_all(&self) {}
}
