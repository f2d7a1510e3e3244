use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use adbrain_core::traits::GenerationProvider;
use adbrain_core::types::ProviderReply;

/// Returns its replies in order, repeating the last one once exhausted.
pub struct ScriptedProvider {
    name: String,
    replies: Mutex<Vec<ProviderReply>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &str, replies: Vec<String>) -> Self {
        Self::with_replies(name, replies.into_iter().map(ProviderReply::text).collect())
    }

    pub fn with_replies(name: &str, replies: Vec<ProviderReply>) -> Self {
        Self {
            name: name.to_string(),
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, _prompt: String) -> BoxFuture<'_, ProviderReply> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let replies = self.replies.lock().unwrap();
        let reply = replies
            .get(idx)
            .or_else(|| replies.last())
            .cloned()
            .unwrap_or_else(|| ProviderReply::unavailable("script exhausted"));
        Box::pin(async move { reply })
    }
}

/// Always returns the same text.
pub struct StaticProvider {
    name: String,
    text: String,
    calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GenerationProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, _prompt: String) -> BoxFuture<'_, ProviderReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = ProviderReply::text(self.text.clone());
        Box::pin(async move { reply })
    }
}

/// Sleeps before answering; used to exercise per-call timeouts.
pub struct SlowProvider {
    name: String,
    delay: Duration,
}

impl SlowProvider {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

impl GenerationProvider for SlowProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, _prompt: String) -> BoxFuture<'_, ProviderReply> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            ProviderReply::text("slow reply")
        })
    }
}

/// Picks a reply by the first route whose needle appears in the prompt.
pub struct RoutedProvider {
    name: String,
    routes: Vec<(String, ProviderReply)>,
    fallback: ProviderReply,
    calls: AtomicUsize,
}

impl RoutedProvider {
    pub fn new(name: &str, fallback: &str) -> Self {
        Self {
            name: name.to_string(),
            routes: Vec::new(),
            fallback: ProviderReply::text(fallback),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn route(mut self, needle: &str, reply: ProviderReply) -> Self {
        self.routes.push((needle.to_string(), reply));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GenerationProvider for RoutedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, prompt: String) -> BoxFuture<'_, ProviderReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .routes
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone());
        Box::pin(async move { reply })
    }
}
