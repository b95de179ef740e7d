#![cfg(feature = "store-sqlite")]

mod common;

use std::sync::Arc;

use common::{branch, regtest};
use niebla_spv::{
    engine::HeaderSync,
    store::{sqlite_store::SqliteStore, Store},
};
use tempfile::NamedTempFile;

#[tokio::test]
async fn sqlite_store_roundtrips() -> anyhow::Result<()> {
    // temp file for each run
    let tmp = NamedTempFile::new()?;
    let store = SqliteStore::new(tmp.path())?;

    // Defaults on a fresh DB
    assert!(store.load_tip().await?.is_none(), "fresh DB has no tip yet");
    assert!(store.load_headers().await?.is_empty());
    assert_eq!(store.header_count().await?, 0);

    let (_, genesis) = regtest();
    let headers = branch(&genesis, 3, 1);
    for h in &headers {
        store.save_header(h.serialize()).await?;
    }
    // Re-saving is ignored.
    store.save_header(headers[0].serialize()).await?;

    let loaded = store.load_headers().await?;
    assert_eq!(
        loaded,
        headers.iter().map(|h| h.serialize()).collect::<Vec<_>>(),
        "headers come back in insertion order"
    );
    assert_eq!(store.header_count().await?, 3);

    store.save_tip(3, headers[2].identity()).await?;
    assert_eq!(store.load_tip().await?, Some((3, headers[2].identity())));
    store.save_tip(2, headers[1].identity()).await?;
    assert_eq!(store.load_tip().await?, Some((2, headers[1].identity())));

    Ok(())
}

#[tokio::test]
async fn chain_survives_reopening_the_file() -> anyhow::Result<()> {
    let tmp = NamedTempFile::new()?;
    let (_, genesis) = regtest();
    let headers = branch(&genesis, 5, 1);

    {
        let (chain, _) = regtest();
        let chain = Arc::new(chain);
        let store = SqliteStore::new(tmp.path())?;
        for h in &headers {
            chain.ingest(*h)?;
            store.save_header(h.serialize()).await?;
        }
        store.save_tip(chain.tip_height(), chain.tip().hash).await?;
    }

    let (chain, _) = regtest();
    let chain = Arc::new(chain);
    let sync = HeaderSync::new(chain.clone(), SqliteStore::new(tmp.path())?, NoSource);
    assert_eq!(sync.restore().await?, 5);
    assert_eq!(chain.tip().hash, headers[4].identity());
    Ok(())
}

struct NoSource;

#[async_trait::async_trait]
impl niebla_spv::headers::HeaderSource for NoSource {
    async fn tip_height(&self) -> anyhow::Result<u32> {
        Ok(0)
    }
    async fn headers_from(&self, _start: u32, _count: u32) -> anyhow::Result<Vec<Vec<u8>>> {
        Ok(vec![])
    }
}
