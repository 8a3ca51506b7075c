//! Exponential-backoff retries around external collaborators.
//!
//! Only external failures ([`Error::is_external`]) are retried; anything
//! else is returned on the first occurrence. Delays double after each
//! failed attempt and are capped at `max_backoff_ms`.
//!
//! The tree builder never retries on its own. Wrap a collaborator in
//! [`RetryingEmbedder`] or [`RetryingSummarizer`] to opt in; a build still
//! fails once the retry budget is spent.

use std::time::Duration;

use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::summarize::Summarizer;
use serde::{Deserialize, Serialize};

/// How often and how patiently to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy with the default budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the first delay.
    pub fn with_initial_backoff_ms(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Set the delay cap.
    pub fn with_max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: usize) -> Duration {
        let shift = retry.saturating_sub(1).min(63) as u32;
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Check the parameters.
    pub fn validate(&self) -> Result<()> {
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(Error::InvalidParameter {
                name: "initial_backoff_ms",
                message: "must not exceed max_backoff_ms",
            });
        }
        Ok(())
    }
}

/// Run `op` until it succeeds, fails with a non-external error, or the
/// retry budget is spent.
///
/// `op` receives the 0-based attempt number. `what` names the operation in
/// log events.
pub fn retry_with_backoff<T, F>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut(usize) -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_external() => return Err(err),
            Err(err) if attempt >= policy.max_retries => {
                return Err(Error::RetriesExhausted {
                    attempts: attempt + 1,
                    last: Box::new(err),
                });
            }
            Err(err) => {
                attempt += 1;
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    operation = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after failure"
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

/// An [`Embedder`] that retries its inner embedder.
#[derive(Debug, Clone)]
pub struct RetryingEmbedder<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: Embedder> RetryingEmbedder<E> {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped embedder.
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: Embedder> Embedder for RetryingEmbedder<E> {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        retry_with_backoff(&self.policy, "embed", |_| self.inner.embed(texts))
    }
}

/// A [`Summarizer`] that retries its inner summarizer.
#[derive(Debug, Clone)]
pub struct RetryingSummarizer<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Summarizer> RetryingSummarizer<S> {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped summarizer.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Summarizer> Summarizer for RetryingSummarizer<S> {
    fn summarize(&self, text: &str) -> Result<String> {
        retry_with_backoff(&self.policy, "summarize", |_| self.inner.summarize(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{embed, summarize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instant(retries: usize) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(retries)
            .with_initial_backoff_ms(0)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(10), Duration::from_millis(30_000));
        assert_eq!(policy.backoff(200), Duration::from_millis(30_000));
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let result = retry_with_backoff(&instant(3), "op", |attempt| {
            if attempt < 2 {
                Err(Error::Embedding("flaky".into()))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_exhaustion_reports_attempts() {
        let calls = AtomicUsize::new(0);
        let err = retry_with_backoff(&instant(2), "op", |_| -> Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Sink("down".into()))
        })
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            err,
            Error::RetriesExhausted {
                attempts: 3,
                last: Box::new(Error::Sink("down".into())),
            }
        );
    }

    #[test]
    fn test_internal_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let err = retry_with_backoff(&instant(5), "op", |_| -> Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::EmptyInput)
        })
        .unwrap_err();
        assert_eq!(err, Error::EmptyInput);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retrying_summarizer() {
        let calls = AtomicUsize::new(0);
        let flaky = summarize::from_fn(|text: &str| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::Summarization("503".into()))
            } else {
                Ok(text.len().to_string())
            }
        });
        let s = RetryingSummarizer::new(flaky, instant(1));
        assert_eq!(s.summarize("abcd").unwrap(), "4");
    }

    #[test]
    fn test_retrying_embedder_gives_up() {
        let broken = embed::from_fn(|_: &[String]| Err(Error::Embedding("offline".into())));
        let e = RetryingEmbedder::new(broken, instant(2));
        let err = e.embed(&["x".to_string()]).unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
        assert!(err.is_external());
    }

    #[test]
    fn test_policy_from_json_and_validate() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_retries": 5}"#).unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_backoff_ms, 500);
        assert!(policy.validate().is_ok());
        assert!(RetryPolicy::new().with_initial_backoff_ms(60_000).validate().is_err());
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}
