//! Scripted collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::avatar::{AvatarFetcher, FetchError};
use crate::revocation::{RevocationApi, RevocationApiError, RevocationResponse};

type ApiReply = Result<RevocationResponse, RevocationApiError>;

/// Replies from a queue, then from a fallback; records requested tickets.
#[derive(Debug)]
pub(crate) struct ScriptedRevocationApi {
    replies: Mutex<VecDeque<ApiReply>>,
    fallback: Mutex<ApiReply>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<u64>>,
}

impl ScriptedRevocationApi {
    pub(crate) fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(RevocationResponse::ok(0, Vec::new()))),
            delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, reply: ApiReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn set_fallback(&self, reply: ApiReply) {
        *self.fallback.lock().unwrap() = reply;
    }

    /// Make every request take `delay` before replying.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RevocationApi for ScriptedRevocationApi {
    async fn get_revocations(&self, ticket: u64) -> Result<RevocationResponse, RevocationApiError> {
        self.calls.lock().unwrap().push(ticket);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.replies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}

/// Serves fixed bodies per URL; unknown URLs are 404s.
#[derive(Debug, Default)]
pub(crate) struct ScriptedFetcher {
    bodies: Mutex<HashMap<String, Result<Vec<u8>, FetchError>>>,
    flaky: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub(crate) fn serve(&self, url: &str, body: Result<Vec<u8>, FetchError>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body);
    }

    /// The next fetch of `url` stalls for `stall` and then fails transiently.
    pub(crate) fn fail_once_after(&self, url: &str, stall: Duration) {
        self.flaky.lock().unwrap().insert(url.to_string(), stall);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AvatarFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let stall = self.flaky.lock().unwrap().remove(url);
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
            return Err(FetchError::Transient(format!("{url} stalled")));
        }
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::NotFound(url.to_string())))
    }
}
