//! A small in-process evaluation engine.
//!
//! Values are memoized by key. At most one computation per key is in flight at
//! a time, while different keys are computed concurrently by whichever threads
//! ask for them. Failures are never cached; transient ones are retried here,
//! persistent ones are handed back to the caller right away.

use std::{
    fmt::Display,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use dashmap::DashMap;
use log::{debug, warn};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transience {
    /// The same computation may succeed when attempted again.
    Transient,
    /// The failure is stable until the user changes the inputs.
    Persistent,
}

pub trait Classify {
    fn transience(&self) -> Transience;
}

/// A kind of computation the [`Evaluator`] knows how to run.
pub trait NodeFunction: Send + Sync {
    /// Stable identifier of the computation kind.
    const NAME: &'static str;

    type Key: Clone + Eq + Hash + Display + Send + Sync;
    type Value: Clone + Send + Sync;
    type Error: Classify + std::error::Error + Send + Sync + 'static;

    fn compute(&self, key: &Self::Key) -> Result<Self::Value, Self::Error>;

    /// Short label for progress reporting, if the function has one.
    fn extract_tag(&self, key: &Self::Key) -> Option<String>;
}

#[derive(Error, Debug)]
#[error("{error} (attempts: {attempts})")]
pub struct EvaluationError<E> {
    pub error: E,
    pub attempts: u32,
}

impl<E: Classify> EvaluationError<E> {
    pub fn transience(&self) -> Transience {
        self.error.transience()
    }
}

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

type Slot<V> = Arc<Mutex<Option<V>>>;

pub struct Evaluator<F: NodeFunction> {
    function: F,
    max_retries: u32,
    retry_delay: Duration,
    entries: DashMap<F::Key, Slot<F::Value>>,
}

impl<F: NodeFunction> Evaluator<F> {
    pub fn new(function: F) -> Self {
        Self {
            function,
            max_retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            entries: DashMap::new(),
        }
    }

    /// Number of extra attempts after a transient failure.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn function(&self) -> &F {
        &self.function
    }

    pub fn evaluate(&self, key: &F::Key) -> Result<F::Value, EvaluationError<F::Error>> {
        let slot = Arc::clone(&self.entries.entry(key.clone()).or_default());
        // A panicking computation leaves nothing behind in the slot.
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(value) = slot.as_ref() {
            debug!("{} {} is up to date", F::NAME, key);
            return Ok(value.clone());
        }

        match self.function.extract_tag(key) {
            Some(tag) => debug!("Computing {} [{}] {}", F::NAME, tag, key),
            None => debug!("Computing {} {}", F::NAME, key),
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.function.compute(key) {
                Ok(value) => {
                    *slot = Some(value.clone());
                    return Ok(value);
                }
                Err(error)
                    if error.transience() == Transience::Transient
                        && attempts <= self.max_retries =>
                {
                    warn!(
                        "{} {} failed on attempt {}, retrying: {}",
                        F::NAME,
                        key,
                        attempts,
                        error
                    );
                    std::thread::sleep(self.retry_delay);
                }
                Err(error) => return Err(EvaluationError { error, attempts }),
            }
        }
    }

    /// The cached value for `key`, without computing it.
    pub fn cached(&self, key: &F::Key) -> Option<F::Value> {
        let slot = Arc::clone(self.entries.get(key)?.value());
        let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.clone()
    }

    /// Forgets the value of `key`. A computation of `key` that is in flight
    /// finishes first and its value is dropped.
    pub fn invalidate(&self, key: &F::Key) -> bool {
        debug!("Invalidating {} {}", F::NAME, key);
        let Some(slot) = self.entries.get(key).map(|entry| Arc::clone(entry.value())) else {
            return false;
        };
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.take().is_some()
    }

    pub fn invalidate_all(&self) {
        let slots: Vec<_> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for slot in slots {
            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        }
    }
}
