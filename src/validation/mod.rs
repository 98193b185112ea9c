use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::store::UserStore;

pub mod stages;

pub use stages::{
    CenterExists, CenterParamValid, EmailNotExists, PasswordMatches, RequireFields, TrimKeys,
    TrimValues, UsernameExists, UsernameNotExists,
};

/// Request state threaded through a validation chain. Stages transform
/// this owned value; nothing is mutated behind the handler's back.
pub struct RequestContext {
    pub body: Map<String, Value>,
    pub params: HashMap<String, String>,
    pub store: Arc<dyn UserStore>,
}

impl RequestContext {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            body: Map::new(),
            params: HashMap::new(),
            store,
        }
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// The named body field, when present and a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(Value::as_str)
    }
}

/// One gating predicate/transform in a validation chain. A stage either
/// lets the request proceed (possibly after normalizing the body) or
/// rejects it with an [`ApiError`].
#[async_trait]
pub trait Stage: Send + Sync {
    async fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError>;
}

/// Ordered list of stages evaluated front to back. The first rejection
/// short-circuits: later stages never run and the caller must not invoke
/// its handler.
#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn Stage>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub async fn run(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        for stage in &self.stages {
            stage.apply(ctx).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::store::MemoryStore;

    /// Counts how often it runs; stands in for a downstream stage or
    /// handler in short-circuit tests.
    struct Probe(Arc<AtomicUsize>);

    #[async_trait]
    impl Stage for Probe {
        async fn apply(&self, _ctx: &mut RequestContext) -> Result<(), ApiError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn body(fields: &[(&str, &str)]) -> Map<String, Value> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[tokio::test]
    async fn rejection_stops_the_chain() {
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new()
            .stage(RequireFields(&["username", "password"]))
            .stage(Probe(hits.clone()));

        let mut ctx = RequestContext::new(Arc::new(MemoryStore::new()))
            .with_body(body(&[("username", "bob")]));
        let err = chain.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "password required in body!");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stages_run_in_order_when_all_allow() {
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new()
            .stage(TrimKeys)
            .stage(Probe(hits.clone()))
            .stage(Probe(hits.clone()));

        let mut ctx = RequestContext::new(Arc::new(MemoryStore::new()));
        chain.run(&mut ctx).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
