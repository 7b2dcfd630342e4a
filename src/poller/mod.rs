//! Deadline-bounded polling until a search-index write becomes visible.
//!
//! Writes to the server under test reach its search index asynchronously, so a
//! search issued right after a write may not see it yet. [`Poller`] re-runs a
//! caller-supplied visibility check until it passes or the configured deadline
//! elapses. When a commit strategy is available it first asks the index to
//! commit, which usually makes the first check succeed.
use std::future::Future;
use std::sync::Arc;

use metrics::{counter, histogram};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::commit::{CommitStrategy, HttpCommit};
use crate::error::{Result, SearchPollError};
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::suite::SuiteConfig;

pub mod types;

pub use types::{DEFAULT_MAX_WAIT_SECONDS, PollConfig, PollOutcome, PollSettings};

/// Polls a visibility check under a deadline.
///
/// A poller holds no per-call state: one instance may be shared by concurrent
/// callers, each polling its own predicate.
#[derive(Clone)]
pub struct Poller {
    config: PollConfig,
    commit: Option<Arc<dyn CommitStrategy>>,
}

impl Poller {
    /// Create a poller that never commits, regardless of the configured endpoint.
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            commit: None,
        }
    }

    /// Create a poller that commits through `http_client` when the config
    /// names a commit endpoint.
    pub fn from_config<H: HttpClient + 'static>(config: PollConfig, http_client: H) -> Self {
        let commit = config.commit_endpoint().cloned().map(|endpoint| {
            Arc::new(HttpCommit::new(endpoint, http_client)) as Arc<dyn CommitStrategy>
        });
        Self { config, commit }
    }

    /// Create a poller from the suite configuration.
    pub fn from_suite<H: HttpClient + 'static>(suite: &SuiteConfig, http_client: H) -> Result<Self> {
        Ok(Self::from_config(suite.poll_config()?, http_client))
    }

    /// Replace the commit strategy.
    pub fn with_commit(mut self, commit: Arc<dyn CommitStrategy>) -> Self {
        self.commit = Some(commit);
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn commits(&self) -> bool {
        self.commit.is_some()
    }

    /// Poll `predicate` until it returns `Ok(true)` or the deadline passes.
    pub async fn await_visible<F, Fut>(&self, predicate: F) -> Result<PollOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        self.await_visible_with_cancel(predicate, &CancellationToken::new())
            .await
    }

    /// Poll `predicate` until it returns `Ok(true)`, the deadline passes, or
    /// `cancel` fires.
    ///
    /// Cancellation and the deadline both yield [`PollOutcome::TimedOut`]. An
    /// `Err` from the predicate ends the poll at once with
    /// [`SearchPollError::PredicateFailed`].
    #[tracing::instrument(
        skip(self, predicate, cancel),
        fields(max_wait_ms = types::millis(self.config.max_wait()), commit = self.commit.is_some())
    )]
    pub async fn await_visible_with_cancel<F, Fut>(
        &self,
        mut predicate: F,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        let start = Instant::now();
        let max_wait = self.config.max_wait();

        if let Some(commit) = &self.commit {
            tokio::select! {
                result = tokio::time::timeout(max_wait, commit.commit()) => {
                    match result {
                        Ok(Ok(())) => {
                            counter!("searchpoll_commit_total", "outcome" => "ok").increment(1);
                            tracing::debug!(target_index = %commit.target(), "Forced index commit");
                        }
                        Ok(Err(e)) => {
                            counter!("searchpoll_commit_total", "outcome" => "failed").increment(1);
                            tracing::warn!(
                                target_index = %commit.target(),
                                error = %e,
                                "Index commit failed, falling back to polling"
                            );
                        }
                        Err(_) => {
                            counter!("searchpoll_commit_total", "outcome" => "timed_out").increment(1);
                            tracing::warn!(
                                target_index = %commit.target(),
                                "Index commit did not finish before the deadline"
                            );
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Poll cancelled during index commit");
                    return Ok(self.finish(PollOutcome::TimedOut { waited: start.elapsed(), attempts: 0 }));
                }
            }
        }

        let mut attempts: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                tracing::info!(attempts, "Poll cancelled");
                return Ok(self.finish(PollOutcome::TimedOut {
                    waited: start.elapsed(),
                    attempts,
                }));
            }

            attempts += 1;
            counter!("searchpoll_predicate_checks_total").increment(1);

            match predicate().await {
                Ok(true) => {
                    return Ok(self.finish(PollOutcome::Visible {
                        elapsed: start.elapsed(),
                        attempts,
                    }));
                }
                Ok(false) => {
                    tracing::debug!(
                        attempt = attempts,
                        elapsed_ms = types::millis(start.elapsed()),
                        "Not visible yet"
                    );
                }
                Err(source) => {
                    counter!("searchpoll_poll_total", "outcome" => "predicate_failed").increment(1);
                    tracing::warn!(attempt = attempts, error = %source, "Visibility check failed");
                    return Err(SearchPollError::PredicateFailed {
                        attempt: attempts,
                        source,
                    });
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= max_wait {
                return Ok(self.finish(PollOutcome::TimedOut {
                    waited: elapsed,
                    attempts,
                }));
            }

            // Never sleep past the deadline; the last check happens right at it.
            let pause = self.config.interval_after(attempts - 1).min(max_wait - elapsed);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => {
                    tracing::info!(attempts, "Poll cancelled");
                    return Ok(self.finish(PollOutcome::TimedOut { waited: start.elapsed(), attempts }));
                }
            }
        }
    }

    /// Blocking form of [`Poller::await_visible`] for synchronous callers.
    ///
    /// Drives the poll on a private current-thread runtime. Returns an error
    /// when called from inside an async runtime; use [`Poller::await_visible`] there.
    pub fn await_visible_blocking<F>(&self, mut predicate: F) -> Result<PollOutcome>
    where
        F: FnMut() -> anyhow::Result<bool>,
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(SearchPollError::Other(anyhow::anyhow!(
                "blocking poll called from inside an async runtime"
            )));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.await_visible(|| std::future::ready(predicate())))
    }

    fn finish(&self, outcome: PollOutcome) -> PollOutcome {
        let label = outcome.label();
        counter!("searchpoll_poll_total", "outcome" => label).increment(1);
        histogram!("searchpoll_wait_seconds", "outcome" => label)
            .record(outcome.elapsed_ms() as f64 / 1000.0);

        match outcome {
            PollOutcome::Visible { attempts, .. } => {
                tracing::info!(elapsed_ms = outcome.elapsed_ms(), attempts, "Result visible");
            }
            PollOutcome::TimedOut { attempts, .. } => {
                tracing::info!(
                    waited_ms = outcome.elapsed_ms(),
                    attempts,
                    "Result not visible before deadline"
                );
            }
        }
        outcome
    }
}

/// Poll `predicate` with `config`, committing through a default reqwest client
/// when the config names a commit endpoint.
pub async fn await_visible<F, Fut>(predicate: F, config: &PollConfig) -> Result<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    Poller::from_config(config.clone(), ReqwestHttpClient::new())
        .await_visible(predicate)
        .await
}
