//! The polling loop.

use std::fmt;
use std::future::Future;

use mlops_core::PollingConfig;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

type Callback = Box<dyn FnOnce() + Send>;

/// How a polling session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The checker returned `false`; `on_give_up` fired.
    GaveUp,
    /// The retry budget ran out; `on_max_retries` fired.
    MaxRetries,
    /// The session was cancelled; no callback fired.
    Cancelled,
}

/// Bounded, cancellable retry loop around an async predicate.
///
/// Each round checks the retry budget, waits `gap`, then asks the checker
/// whether to keep going:
///
/// 1. `attempts_made >= max_retries` fires `on_max_retries` and stops. The
///    budget is checked before waiting, so `max_retries = 0` never calls the
///    checker.
/// 2. Otherwise wait `gap`, increment `attempts_made` and await the checker.
/// 3. `Ok(false)` fires `on_give_up` and stops, `Ok(true)` starts the next
///    round, `Err(e)` is returned from [`start`](Self::start) as is.
///
/// Cancellation is checked after every suspension point. Once the token is
/// cancelled no callback fires, even if a check was already in flight.
///
/// # Example
///
/// ```
/// # async fn demo() {
/// use std::convert::Infallible;
/// use mlops_core::PollingConfig;
/// use mlops_tasks::{PollOutcome, PollingScheduler};
///
/// let mut remaining = 3;
/// let mut scheduler = PollingScheduler::new(PollingConfig::default(), move || {
///     remaining -= 1;
///     let keep_going = remaining > 0;
///     async move { Ok::<_, Infallible>(keep_going) }
/// })
/// .on_give_up(|| println!("settled"));
///
/// assert_eq!(scheduler.start().await, Ok(PollOutcome::GaveUp));
/// # }
/// ```
pub struct PollingScheduler<F> {
    config: PollingConfig,
    checker: F,
    on_give_up: Option<Callback>,
    on_max_retries: Option<Callback>,
    cancel: CancellationToken,
    attempts_made: u32,
}

impl<F> PollingScheduler<F> {
    /// Create a scheduler around `checker` with its own cancellation token.
    pub fn new(config: PollingConfig, checker: F) -> Self {
        Self {
            config,
            checker,
            on_give_up: None,
            on_max_retries: None,
            cancel: CancellationToken::new(),
            attempts_made: 0,
        }
    }

    /// Called once when the checker asks to stop.
    #[must_use]
    pub fn on_give_up(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_give_up = Some(Box::new(f));
        self
    }

    /// Called once when the retry budget is exhausted.
    #[must_use]
    pub fn on_max_retries(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_max_retries = Some(Box::new(f));
        self
    }

    /// Tie the session to a token owned by the caller (e.g. a UI context).
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that tears this session down when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub const fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub const fn config(&self) -> &PollingConfig {
        &self.config
    }
}

impl<F, Fut, E> PollingScheduler<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    /// Run the loop until the checker stops it, the budget runs out, or the
    /// session is cancelled.
    pub async fn start(&mut self) -> Result<PollOutcome, E> {
        let cancel = self.cancel.clone();

        loop {
            if cancel.is_cancelled() {
                return Ok(PollOutcome::Cancelled);
            }

            if self.config.is_exhausted(self.attempts_made) {
                tracing::debug!(
                    target: "mlops.tasks",
                    attempts = self.attempts_made,
                    "Poll retry budget exhausted"
                );
                if let Some(callback) = self.on_max_retries.take() {
                    callback();
                }
                return Ok(PollOutcome::MaxRetries);
            }

            tokio::select! {
                biased;

                () = cancel.cancelled() => return Ok(PollOutcome::Cancelled),

                () = sleep(self.config.gap) => {}
            }

            self.attempts_made += 1;

            let keep_polling = tokio::select! {
                biased;

                () = cancel.cancelled() => return Ok(PollOutcome::Cancelled),

                result = (self.checker)() => result?,
            };

            if cancel.is_cancelled() {
                return Ok(PollOutcome::Cancelled);
            }

            if !keep_polling {
                tracing::trace!(
                    target: "mlops.tasks",
                    attempts = self.attempts_made,
                    "Poll checker asked to stop"
                );
                if let Some(callback) = self.on_give_up.take() {
                    callback();
                }
                return Ok(PollOutcome::GaveUp);
            }
        }
    }
}

impl<F, Fut, E> PollingScheduler<F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<bool, E>> + Send + 'static,
    E: Send + 'static,
{
    /// Run the loop on the tokio runtime.
    ///
    /// The returned handle shares this scheduler's cancellation token.
    pub fn spawn(mut self) -> PollHandle<E> {
        let cancel = self.cancel.clone();
        let join = tokio::spawn(async move { self.start().await });
        PollHandle { cancel, join }
    }
}

impl<F> fmt::Debug for PollingScheduler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("config", &self.config)
            .field("attempts_made", &self.attempts_made)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Handle to a spawned polling session.
pub struct PollHandle<E> {
    cancel: CancellationToken,
    join: JoinHandle<Result<PollOutcome, E>>,
}

impl<E> PollHandle<E> {
    /// Stop the session. Callbacks that have not started yet will not fire.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the session to end.
    pub async fn join(self) -> Result<PollOutcome, E> {
        match self.join.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Ok(PollOutcome::Cancelled),
        }
    }
}
