//! Scripted record source for tests and benchmarks

use crate::model::{DedupRecord, User};
use crate::source::{RecordSource, SourceError};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Generator<R> = Arc<dyn Fn(usize, usize) -> Vec<R> + Send + Sync>;

#[derive(Clone)]
enum Script<R> {
    Respond(Vec<R>),
    Fail(String),
    Hang,
}

/// Builder for creating configured scripted sources
///
/// Calls are numbered from zero in the order `fetch` is entered. A per-call
/// script wins over the generator, which wins over the default script.
pub struct ScriptedSourceBuilder<R = User> {
    name: String,
    default: Script<R>,
    per_call: HashMap<usize, Script<R>>,
    generator: Option<Generator<R>>,
    latency: Duration,
    jitter: Duration,
}

impl<R> Default for ScriptedSourceBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ScriptedSourceBuilder<R> {
    pub fn new() -> Self {
        Self {
            name: "scripted".to_string(),
            default: Script::Respond(Vec::new()),
            per_call: HashMap::new(),
            generator: None,
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Return these records from every call without its own script
    pub fn always(mut self, records: Vec<R>) -> Self {
        self.default = Script::Respond(records);
        self
    }

    /// Fail every call without its own script
    pub fn fail_always(mut self, message: &str) -> Self {
        self.default = Script::Fail(message.to_string());
        self
    }

    /// Build each response from `(call index, batch size)`
    pub fn generate<F>(mut self, generator: F) -> Self
    where
        F: Fn(usize, usize) -> Vec<R> + Send + Sync + 'static,
    {
        self.generator = Some(Arc::new(generator));
        self
    }

    pub fn respond_call(mut self, call: usize, records: Vec<R>) -> Self {
        self.per_call.insert(call, Script::Respond(records));
        self
    }

    pub fn fail_call(mut self, call: usize, message: &str) -> Self {
        self.per_call
            .insert(call, Script::Fail(message.to_string()));
        self
    }

    pub fn fail_calls(mut self, calls: &[usize], message: &str) -> Self {
        for &call in calls {
            self.per_call
                .insert(call, Script::Fail(message.to_string()));
        }
        self
    }

    /// Never return from this call
    pub fn hang_call(mut self, call: usize) -> Self {
        self.per_call.insert(call, Script::Hang);
        self
    }

    /// Fixed delay before every response
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Extra random delay in `0..=jitter` before every response
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn build(self) -> ScriptedSource<R> {
        ScriptedSource {
            name: self.name,
            default: self.default,
            per_call: self.per_call,
            generator: self.generator,
            latency: self.latency,
            jitter: self.jitter,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }
}

/// Record source that replays a script instead of calling an API
pub struct ScriptedSource<R = User> {
    name: String,
    default: Script<R>,
    per_call: HashMap<usize, Script<R>>,
    generator: Option<Generator<R>>,
    latency: Duration,
    jitter: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
}

/// Decrements the in-flight count when a fetch finishes or is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedSource<User> {
    pub fn builder() -> ScriptedSourceBuilder<User> {
        ScriptedSourceBuilder::new()
    }
}

impl<R> ScriptedSource<R> {
    /// Number of times `fetch` has been entered
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch` calls currently pending
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.latency;
        }
        let max = self.jitter.as_micros() as u64;
        self.latency + Duration::from_micros(rand::rng().random_range(0..=max))
    }

    fn script_for(&self, call: usize, batch_size: usize) -> Script<R>
    where
        R: Clone,
    {
        if let Some(script) = self.per_call.get(&call) {
            return script.clone();
        }
        if let Some(generator) = &self.generator {
            return Script::Respond(generator(call, batch_size));
        }
        self.default.clone()
    }
}

#[async_trait]
impl<R> RecordSource for ScriptedSource<R>
where
    R: DedupRecord + Clone + Sync,
{
    type Record = R;

    async fn fetch(&self, batch_size: usize) -> Result<Vec<R>, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.in_flight);
        let script = self.script_for(call, batch_size);

        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match script {
            Script::Respond(records) => Ok(records.into_iter().take(batch_size).collect()),
            Script::Fail(message) => Err(SourceError::Other(message)),
            Script::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
