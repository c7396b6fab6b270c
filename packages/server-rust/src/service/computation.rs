//! Deferred computations returned by operation invocations.
//!
//! An invoker hands back a [`ComputationResult`]: a ready value, a single
//! [`Pending`] computation, or an ordered batch of them. A `Pending` is only
//! ever observed through [`Pending::outcome`], which reports one of four
//! terminal states; nothing blocks a worker thread while waiting.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// ---------------------------------------------------------------------------
// Produced / Outcome
// ---------------------------------------------------------------------------

/// What a successfully completed computation produced.
pub enum Produced<T> {
    /// A plain value.
    Value(T),
    /// Another deferred computation that must itself be awaited.
    Nested(Pending<T>),
}

/// Terminal state observed when awaiting a [`Pending`].
pub enum Outcome<T> {
    Completed(Produced<T>),
    /// Raised one or more errors.
    Faulted(Vec<anyhow::Error>),
    Canceled,
    /// The completion source went away without reaching any terminal state.
    Abandoned(String),
}

impl<T> Outcome<T> {
    /// Label used in logs.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => "completed",
            Outcome::Faulted(_) => "faulted",
            Outcome::Canceled => "canceled",
            Outcome::Abandoned(_) => "abandoned",
        }
    }
}

// ---------------------------------------------------------------------------
// Pending
// ---------------------------------------------------------------------------

enum State<T> {
    /// Not started; runs only once `start()` spawns it or `outcome()` polls it.
    Unstarted(BoxFuture<Outcome<T>>),
    /// Spawned on the tokio runtime.
    Running(JoinHandle<Outcome<T>>),
    /// Completed from elsewhere through a [`Completer`].
    External(oneshot::Receiver<Outcome<T>>),
}

/// A deferred computation that eventually produces a value, a fault, or a
/// cancellation.
pub struct Pending<T> {
    state: State<T>,
}

impl<T: Send + 'static> Pending<T> {
    /// Wraps a fallible future without starting it.
    pub fn new<F, E>(fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        Self::from_outcome(async move {
            match fut.await {
                Ok(value) => Outcome::Completed(Produced::Value(value)),
                Err(err) => Outcome::Faulted(vec![err.into()]),
            }
        })
    }

    /// Wraps a future whose result is itself a deferred computation.
    pub fn nested<F, E>(fut: F) -> Self
    where
        F: Future<Output = Result<Pending<T>, E>> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        Self::from_outcome(async move {
            match fut.await {
                Ok(inner) => Outcome::Completed(Produced::Nested(inner)),
                Err(err) => Outcome::Faulted(vec![err.into()]),
            }
        })
    }

    /// Wraps a future that reports its terminal state directly.
    pub fn from_outcome<F>(fut: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self {
            state: State::Unstarted(Box::pin(fut)),
        }
    }

    /// Like [`Pending::new`], but already running on the tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn<F, E>(fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        Self::new(fut).start()
    }

    /// A computation that completes with `value`.
    pub fn ready(value: T) -> Self {
        Self::from_outcome(async move { Outcome::Completed(Produced::Value(value)) })
    }

    /// A computation that faults with every error in `errors`.
    pub fn faulted(errors: Vec<anyhow::Error>) -> Self {
        Self::from_outcome(async move { Outcome::Faulted(errors) })
    }

    /// A computation that ends canceled.
    pub fn canceled() -> Self {
        Self::from_outcome(async { Outcome::Canceled })
    }

    /// Runs `fut` until it finishes or `token` is canceled, whichever comes first.
    pub fn cancellable<F, E>(token: CancellationToken, fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        Self::from_outcome(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => Outcome::Canceled,
                result = fut => match result {
                    Ok(value) => Outcome::Completed(Produced::Value(value)),
                    Err(err) => Outcome::Faulted(vec![err.into()]),
                },
            }
        })
    }

    /// A computation completed from elsewhere through the returned [`Completer`].
    #[must_use]
    pub fn channel() -> (Completer<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            Completer { tx },
            Self {
                state: State::External(rx),
            },
        )
    }

    /// Whether the computation is already in flight.
    #[must_use]
    pub fn is_started(&self) -> bool {
        !matches!(self.state, State::Unstarted(_))
    }

    /// Starts an unstarted computation on the tokio runtime. Already-running
    /// and externally completed computations are returned unchanged.
    ///
    /// # Panics
    ///
    /// Panics when an unstarted computation is started outside a tokio runtime.
    #[must_use]
    pub fn start(self) -> Self {
        match self.state {
            State::Unstarted(fut) => Self {
                state: State::Running(tokio::spawn(fut)),
            },
            state => Self { state },
        }
    }

    /// Waits for the terminal state. Unstarted computations are driven inline.
    pub async fn outcome(self) -> Outcome<T> {
        match self.state {
            State::Unstarted(fut) => fut.await,
            State::Running(handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(err) => join_error_outcome(err),
            },
            State::External(rx) => rx.await.unwrap_or_else(|_| {
                Outcome::Abandoned(
                    "completer dropped before reaching a terminal state".to_string(),
                )
            }),
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Unstarted(_) => "unstarted",
            State::Running(_) => "running",
            State::External(_) => "external",
        };
        f.debug_struct("Pending").field("state", &state).finish()
    }
}

fn join_error_outcome<T>(err: JoinError) -> Outcome<T> {
    if err.is_cancelled() {
        return Outcome::Canceled;
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    Outcome::Faulted(vec![anyhow::anyhow!("computation panicked: {message}")])
}

// ---------------------------------------------------------------------------
// Completer
// ---------------------------------------------------------------------------

/// Completion side of [`Pending::channel`]. Every method consumes the
/// completer, so a computation reaches at most one terminal state.
pub struct Completer<T> {
    tx: oneshot::Sender<Outcome<T>>,
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("receiver_alive", &!self.tx.is_closed())
            .finish()
    }
}

impl<T> Completer<T> {
    pub fn complete(self, value: T) {
        self.finish(Outcome::Completed(Produced::Value(value)));
    }

    pub fn complete_nested(self, inner: Pending<T>) {
        self.finish(Outcome::Completed(Produced::Nested(inner)));
    }

    pub fn fault(self, err: impl Into<anyhow::Error>) {
        self.finish(Outcome::Faulted(vec![err.into()]));
    }

    pub fn fault_all(self, errors: Vec<anyhow::Error>) {
        self.finish(Outcome::Faulted(errors));
    }

    pub fn cancel(self) {
        self.finish(Outcome::Canceled);
    }

    fn finish(self, outcome: Outcome<T>) {
        // Receiver may have been dropped.
        let _ = self.tx.send(outcome);
    }
}

// ---------------------------------------------------------------------------
// ComputationResult
// ---------------------------------------------------------------------------

/// Whatever an operation invocation returned.
#[derive(Debug)]
pub enum ComputationResult<T> {
    /// Already computed.
    Value(T),
    /// One deferred computation.
    Pending(Pending<T>),
    /// Independent deferred computations whose results form one ordered sequence.
    Batch(Vec<Pending<T>>),
}

impl<T> From<Pending<T>> for ComputationResult<T> {
    fn from(pending: Pending<T>) -> Self {
        ComputationResult::Pending(pending)
    }
}

impl<T> From<Vec<Pending<T>>> for ComputationResult<T> {
    fn from(batch: Vec<Pending<T>>) -> Self {
        ComputationResult::Batch(batch)
    }
}
