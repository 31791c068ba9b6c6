use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

/// `Source` aborts the load; `Rejected` and `Transform` only drop one record.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("record rejected: {0}")]
    Rejected(String),
    #[error("transform error: {0}")]
    Transform(String),
}

impl PipelineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Source(_))
    }
}

pub type RecordStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> RecordStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

/// Records that survived loading plus the number dropped along the way.
#[derive(Debug)]
pub struct LoadReport<T> {
    pub records: Vec<T>,
    pub rejected: usize,
}

pub struct Pipeline<S, T> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<T, T> + Send + Sync>>, // same-type transforms chain
}

impl<T, S> Pipeline<S, T>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
{
    /// Drains the source through every transform into memory.
    pub async fn collect(self) -> Result<LoadReport<T>, PipelineError> {
        let mut stream = self.source.stream().await;

        // Apply transforms in sequence (if any).
        for t in self.transforms {
            let t_arc = t.clone();
            stream = Box::pin(stream.then(move |item| {
                let t_inner = t_arc.clone();
                async move {
                    match item {
                        Ok(env) => t_inner.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        let mut records = Vec::new();
        let mut rejected = 0usize;
        while let Some(item) = stream.next().await {
            match item {
                Ok(env) => records.push(env.payload),
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "load aborted");
                    return Err(e);
                }
                Err(e) => {
                    rejected += 1;
                    tracing::debug!(error = %e, "record dropped");
                }
            }
        }

        if rejected > 0 {
            tracing::warn!(
                rejected,
                kept = records.len(),
                "some records were dropped while loading"
            );
        }

        Ok(LoadReport { records, rejected })
    }
}
