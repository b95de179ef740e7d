use async_trait::async_trait;

/// Source of raw block headers by height (a peer, an indexer, a file).
#[async_trait]
pub trait HeaderSource: Send + Sync {
    /// Current best height known to the source.
    async fn tip_height(&self) -> anyhow::Result<u32>;

    /// Up to `count` consecutive raw 80-byte headers starting at `start_height`.
    /// An empty batch means the source has nothing at that height.
    async fn headers_from(&self, start_height: u32, count: u32) -> anyhow::Result<Vec<Vec<u8>>>;
}
