//! Test doubles for the upstream

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use husk_core::error::HuskError;
use parking_lot::Mutex;

use crate::client::{RemoteContent, RemoteFetcher};
use crate::ProxyResult;

/// What the fake upstream answers with
#[derive(Debug, Clone)]
pub enum Upstream {
    Serve(RemoteContent),
    Missing,
    Fail,
}

/// Fetcher that counts calls and answers with a switchable response
#[derive(Debug)]
pub struct ScriptedFetcher {
    calls: AtomicUsize,
    upstream: Mutex<Upstream>,
}

impl ScriptedFetcher {
    pub fn new(upstream: Upstream) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            upstream: Mutex::new(upstream),
        }
    }

    pub fn serving(body: &str) -> Self {
        Self::new(Upstream::Serve(RemoteContent::new(body.to_string())))
    }

    pub fn set(&self, upstream: Upstream) {
        *self.upstream.lock() = upstream;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self) -> ProxyResult<Option<RemoteContent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.upstream.lock() {
            Upstream::Serve(content) => Ok(Some(content.clone())),
            Upstream::Missing => Ok(None),
            Upstream::Fail => Err(HuskError::Upstream {
                message: "connection refused".to_string(),
                source: None,
            }),
        }
    }
}

#[async_trait]
impl RemoteFetcher for ScriptedFetcher {
    async fn load_package(&self, _name: &str) -> ProxyResult<Option<RemoteContent>> {
        self.answer()
    }

    async fn load_asset(&self, _path: &str) -> ProxyResult<Option<RemoteContent>> {
        self.answer()
    }
}
