//! Volatile store for tests and embedders that persist elsewhere.
use std::collections::HashSet;

use async_trait::async_trait;
use bitcoin::BlockHash;
use parking_lot::Mutex;

use crate::{header::HEADER_SIZE, store::Store};

#[derive(Default)]
struct Inner {
    headers: Vec<[u8; HEADER_SIZE]>,
    seen: HashSet<[u8; HEADER_SIZE]>,
    tip: Option<(u32, BlockHash)>,
}

/// In-memory [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_header(&self, raw: [u8; HEADER_SIZE]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        if inner.seen.insert(raw) {
            inner.headers.push(raw);
        }
        Ok(())
    }

    async fn load_headers(&self) -> anyhow::Result<Vec<[u8; HEADER_SIZE]>> {
        Ok(self.inner.lock().headers.clone())
    }

    async fn header_count(&self) -> anyhow::Result<u64> {
        Ok(self.inner.lock().headers.len() as u64)
    }

    async fn load_tip(&self) -> anyhow::Result<Option<(u32, BlockHash)>> {
        Ok(self.inner.lock().tip)
    }

    async fn save_tip(&self, height: u32, hash: BlockHash) -> anyhow::Result<()> {
        self.inner.lock().tip = Some((height, hash));
        Ok(())
    }
}
