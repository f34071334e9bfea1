//! Shared fixtures for the gateway functional tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use mnemosyne::config::MnemosyneConfig;
use mnemosyne::Gateway;
use mnemosyne_test::{MemoryStore, TestClient};

pub const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub const CONTAINER: &str = "/v1/AUTH_test/docs";
pub const REVISIONS: &str = "/v1/AUTH_test/docs_revs";
pub const OBJECT: &str = "/v1/AUTH_test/docs/report.txt";

/// First second handed out by [`ticking_clock`].
pub const EPOCH: i64 = 1_700_000_000;

pub fn config(encryption: bool, revisions: bool) -> MnemosyneConfig {
    let mut config = MnemosyneConfig::default();
    config.encryption.enabled = encryption;
    config.key_management.enabled = encryption;
    config.key_management.key = encryption.then(|| KEY.to_string());
    config.revisions.enabled = revisions;
    config
}

/// A clock that advances one second per call, starting at [`EPOCH`].
pub fn ticking_clock() -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
    let next = Arc::new(AtomicI64::new(EPOCH));
    move || {
        let secs = next.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
    }
}

/// Name of the `n`th revision (zero based) written with [`ticking_clock`].
///
/// Each write consumes one tick.
pub fn revision(n: i64) -> String {
    format!("report.txt.{}.000000", EPOCH + n)
}

/// A store holding a versioned container and its revisions container.
pub fn versioned_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_container(CONTAINER, &[("revisions-location", "docs_revs")]);
    store.create_container(REVISIONS, &[]);
    store
}

pub fn gateway(config: &MnemosyneConfig, store: &MemoryStore) -> Gateway {
    Gateway::builder(config)
        .backend(store.clone())
        .clock(ticking_clock())
        .build()
        .unwrap()
}

pub fn client(gateway: Gateway) -> TestClient {
    let gateway = Arc::new(gateway);
    TestClient::new(move |request| {
        let gateway = Arc::clone(&gateway);
        async move { gateway.handle(request).await }
    })
}
