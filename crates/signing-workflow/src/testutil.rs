//! Scripted in-memory provider for unit tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use provider::{ProviderError, ProviderFuture, ProviderResponse, SigningProvider};
use serde_json::{Value, json};
use signstation::SignSubmission;

pub(crate) const FAKE_TOKEN: &str = "at_fake";
pub(crate) const FAKE_URL: &str = "https://host/doc/123?sig=abc";

enum Scripted {
    Reply(u16, Value),
    Timeout,
}

/// Provider whose replies are queued per operation. When a queue is empty
/// the operation succeeds with a canned reply.
#[derive(Default)]
pub(crate) struct FakeProvider {
    tokens: Mutex<VecDeque<Scripted>>,
    signs: Mutex<VecDeque<Scripted>>,
    downloads: Mutex<VecDeque<Scripted>>,
    token_delay: Duration,
    pub token_calls: AtomicU32,
    pub sign_calls: AtomicU32,
    pub download_calls: AtomicU32,
    pub submissions: Mutex<Vec<SignSubmission>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, status: u16, body: Value) -> Self {
        self.tokens.lock().unwrap().push_back(Scripted::Reply(status, body));
        self
    }

    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    pub fn with_sign(self, status: u16, body: Value) -> Self {
        self.signs.lock().unwrap().push_back(Scripted::Reply(status, body));
        self
    }

    pub fn with_sign_timeout(self) -> Self {
        self.signs.lock().unwrap().push_back(Scripted::Timeout);
        self
    }

    pub fn with_download(self, status: u16, body: Value) -> Self {
        self.downloads
            .lock()
            .unwrap()
            .push_back(Scripted::Reply(status, body));
        self
    }

    pub fn calls(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    fn next(queue: &Mutex<VecDeque<Scripted>>, fallback: Value) -> provider::Result<ProviderResponse> {
        match queue.lock().unwrap().pop_front() {
            Some(Scripted::Reply(status, body)) => Ok(ProviderResponse { status, body }),
            Some(Scripted::Timeout) => Err(ProviderError::Timeout("scripted timeout".into())),
            None => Ok(ProviderResponse {
                status: 200,
                body: fallback,
            }),
        }
    }
}

impl SigningProvider for FakeProvider {
    fn id(&self) -> &str {
        "fake"
    }

    fn request_token(&self) -> ProviderFuture<'_> {
        Box::pin(async move {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            if !self.token_delay.is_zero() {
                tokio::time::sleep(self.token_delay).await;
            }
            Self::next(
                &self.tokens,
                json!({"data": {"accessToken": FAKE_TOKEN, "expiresIn": 1800}}),
            )
        })
    }

    fn submit_document<'a>(
        &'a self,
        _token: &'a str,
        submission: &'a SignSubmission,
    ) -> ProviderFuture<'a> {
        Box::pin(async move {
            self.sign_calls.fetch_add(1, Ordering::SeqCst);
            self.submissions.lock().unwrap().push(submission.clone());
            Self::next(&self.signs, json!({"data": {"id": "123"}}))
        })
    }

    fn request_download_url<'a>(
        &'a self,
        _token: &'a str,
        _document_id: &'a str,
    ) -> ProviderFuture<'a> {
        Box::pin(async move {
            self.download_calls.fetch_add(1, Ordering::SeqCst);
            Self::next(&self.downloads, json!({"data": FAKE_URL}))
        })
    }
}
