//! Normalises whatever an operation returned into one value or one error.

use ferrule_core::{ClassifiedError, FaultCause};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::debug;

use super::computation::{ComputationResult, Outcome, Pending, Produced};

/// Successful resolution: a single value, or the ordered results of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resolved<T> {
    Single(T),
    Sequence(Vec<T>),
}

impl<T> Resolved<T> {
    #[must_use]
    pub fn into_single(self) -> Option<T> {
        match self {
            Resolved::Single(value) => Some(value),
            Resolved::Sequence(_) => None,
        }
    }

    #[must_use]
    pub fn into_sequence(self) -> Option<Vec<T>> {
        match self {
            Resolved::Single(_) => None,
            Resolved::Sequence(values) => Some(values),
        }
    }
}

/// Resolves a [`ComputationResult`] for one named operation.
///
/// Rules:
/// - a `Value` succeeds immediately;
/// - a `Pending` is started if needed, awaited, and exactly one nested
///   `Pending` is unwrapped (a second level is an invariant violation);
/// - a `Batch` is started as a whole and joined in index order; when
///   several elements fail, the lowest index decides the error. Siblings of
///   a failed element are never canceled.
#[derive(Debug, Clone)]
pub struct ResultResolver {
    operation: String,
}

impl ResultResolver {
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Resolves `result` to a success value or a classified error.
    ///
    /// # Errors
    ///
    /// `Faulted`, `Canceled`, or `InvariantViolation` when an awaited
    /// computation did not complete with a value.
    pub async fn resolve<T: Send + 'static>(
        &self,
        result: ComputationResult<T>,
    ) -> Result<Resolved<T>, ClassifiedError> {
        let resolved = match result {
            ComputationResult::Value(value) => Ok(Resolved::Single(value)),
            ComputationResult::Pending(pending) => {
                self.await_single(pending).await.map(Resolved::Single)
            }
            ComputationResult::Batch(batch) => {
                self.await_batch(batch).await.map(Resolved::Sequence)
            }
        };

        let outcome = match &resolved {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        debug!(operation = %self.operation, outcome, "resolved operation result");
        metrics::counter!("ferrule_resolutions_total", "outcome" => outcome).increment(1);

        resolved
    }

    /// Resolves `result` and fires exactly one of the two continuations.
    pub async fn resolve_with<T, R, S, F>(
        &self,
        result: ComputationResult<T>,
        on_success: S,
        on_failure: F,
    ) -> R
    where
        T: Send + 'static,
        S: FnOnce(Resolved<T>) -> R,
        F: FnOnce(ClassifiedError) -> R,
    {
        match self.resolve(result).await {
            Ok(value) => on_success(value),
            Err(err) => on_failure(err),
        }
    }

    async fn await_single<T: Send + 'static>(
        &self,
        pending: Pending<T>,
    ) -> Result<T, ClassifiedError> {
        match self.settle(pending).await? {
            Produced::Value(value) => Ok(value),
            Produced::Nested(inner) => match self.settle(inner).await? {
                Produced::Value(value) => Ok(value),
                Produced::Nested(_) => Err(self.violation(
                    "nested computation produced another pending computation",
                )),
            },
        }
    }

    async fn await_batch<T: Send + 'static>(
        &self,
        batch: Vec<Pending<T>>,
    ) -> Result<Vec<T>, ClassifiedError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        // Everything is in flight before the first await.
        let started: Vec<Pending<T>> = batch.into_iter().map(Pending::start).collect();
        let settled = join_all(started.into_iter().map(|p| self.await_single(p))).await;

        // collect() stops at the first error in index order.
        settled.into_iter().collect()
    }

    async fn settle<T: Send + 'static>(
        &self,
        pending: Pending<T>,
    ) -> Result<Produced<T>, ClassifiedError> {
        match pending.start().outcome().await {
            Outcome::Completed(produced) => Ok(produced),
            Outcome::Faulted(errors) => Err(ClassifiedError::Faulted {
                operation: self.operation.clone(),
                cause: FaultCause::from_errors(errors),
            }),
            Outcome::Canceled => Err(ClassifiedError::Canceled {
                operation: self.operation.clone(),
            }),
            Outcome::Abandoned(detail) => Err(self.violation(&detail)),
        }
    }

    fn violation(&self, detail: &str) -> ClassifiedError {
        ClassifiedError::InvariantViolation {
            operation: self.operation.clone(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;
    use tokio_util::sync::CancellationToken;

    use super::*;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("record {0} not found")]
    struct NotFound(u32);

    fn resolver() -> ResultResolver {
        ResultResolver::new("GetUser")
    }

    fn delayed(value: u32, delay_ms: u64) -> Pending<u32> {
        Pending::new(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok::<_, anyhow::Error>(value)
        })
    }

    #[tokio::test]
    async fn value_succeeds_immediately() {
        let resolved = resolver().resolve(ComputationResult::Value(3)).await.unwrap();
        assert_eq!(resolved, Resolved::Single(3));
    }

    #[tokio::test]
    async fn unstarted_pending_is_started_and_awaited() {
        let pending = Pending::new(async { Ok::<_, anyhow::Error>("done") });
        let resolved = resolver().resolve(pending.into()).await.unwrap();
        assert_eq!(resolved.into_single(), Some("done"));
    }

    #[tokio::test]
    async fn single_fault_carries_exact_cause() {
        let pending: Pending<u32> = Pending::new(async { Err(NotFound(9)) });
        let err = resolver().resolve(pending.into()).await.unwrap_err();
        match err {
            ClassifiedError::Faulted { operation, cause } => {
                assert_eq!(operation, "GetUser");
                let single = cause.single().expect("not a composite");
                assert_eq!(single.downcast_ref::<NotFound>(), Some(&NotFound(9)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_faults_stay_composite() {
        let (completer, pending) = Pending::<u32>::channel();
        completer.fault_all(vec![
            anyhow::Error::new(NotFound(1)),
            anyhow::Error::new(NotFound(2)),
        ]);
        let err = resolver().resolve(pending.into()).await.unwrap_err();
        assert!(matches!(
            err,
            ClassifiedError::Faulted { cause: FaultCause::Composite(ref errs), .. } if errs.len() == 2
        ));
    }

    #[tokio::test]
    async fn cancellation_is_canceled_not_faulted() {
        let token = CancellationToken::new();
        token.cancel();
        let pending = Pending::cancellable(token, async { Ok::<_, anyhow::Error>(1_u32) });
        let err = resolver().resolve(pending.into()).await.unwrap_err();
        assert!(matches!(err, ClassifiedError::Canceled { .. }));
    }

    #[tokio::test]
    async fn abandoned_completion_is_invariant_violation() {
        let (completer, pending) = Pending::<u32>::channel();
        drop(completer);
        let err = resolver().resolve(pending.into()).await.unwrap_err();
        assert!(matches!(err, ClassifiedError::InvariantViolation { .. }));
    }

    #[tokio::test]
    async fn nested_pending_is_unwrapped_once() {
        let pending = Pending::nested(async { Ok::<_, anyhow::Error>(delayed(11, 1)) });
        let resolved = resolver().resolve(pending.into()).await.unwrap();
        assert_eq!(resolved, Resolved::Single(11));
    }

    #[tokio::test]
    async fn nested_fault_is_classified() {
        let pending = Pending::nested(async {
            Ok::<_, anyhow::Error>(Pending::<u32>::faulted(vec![anyhow::Error::new(
                NotFound(3),
            )]))
        });
        let err = resolver().resolve(pending.into()).await.unwrap_err();
        assert!(matches!(err, ClassifiedError::Faulted { .. }));
    }

    #[tokio::test]
    async fn doubly_nested_pending_is_rejected() {
        let pending = Pending::nested(async {
            Ok::<_, anyhow::Error>(Pending::nested(async {
                Ok::<_, anyhow::Error>(Pending::ready(1_u32))
            }))
        });
        let err = resolver().resolve(pending.into()).await.unwrap_err();
        assert!(matches!(err, ClassifiedError::InvariantViolation { .. }));
    }

    #[tokio::test]
    async fn empty_batch_is_empty_sequence() {
        let resolved = resolver()
            .resolve(ComputationResult::<u32>::Batch(Vec::new()))
            .await
            .unwrap();
        assert_eq!(resolved, Resolved::Sequence(Vec::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_preserves_input_order() {
        let batch = vec![delayed(0, 30), delayed(1, 10), delayed(2, 20)];
        let resolved = resolver().resolve(batch.into()).await.unwrap();
        assert_eq!(resolved.into_sequence(), Some(vec![0, 1, 2]));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_lowest_failing_index_wins() {
        let slow_fail = Pending::new(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<u32, _>(NotFound(0))
        });
        let fast_fail = Pending::new(async { Err::<u32, _>(NotFound(2)) });
        let batch = vec![slow_fail, delayed(1, 5), fast_fail];

        let err = resolver().resolve(batch.into()).await.unwrap_err();
        match err {
            ClassifiedError::Faulted { cause, .. } => {
                let single = cause.single().unwrap();
                assert_eq!(single.downcast_ref::<NotFound>(), Some(&NotFound(0)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batch_failure_does_not_cancel_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();
        let sibling = Pending::new(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(1_u32)
        });
        let batch = vec![Pending::canceled(), sibling];

        let err = resolver().resolve(batch.into()).await.unwrap_err();
        assert!(matches!(err, ClassifiedError::Canceled { .. }));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batch_elements_unwrap_nested_results() {
        let batch = vec![
            Pending::ready(1_u32),
            Pending::nested(async { Ok::<_, anyhow::Error>(Pending::ready(2_u32)) }),
        ];
        let resolved = resolver().resolve(batch.into()).await.unwrap();
        assert_eq!(resolved, Resolved::Sequence(vec![1, 2]));
    }

    #[tokio::test]
    async fn exactly_one_continuation_fires() {
        let successes = AtomicUsize::new(0);
        let failures = AtomicUsize::new(0);

        resolver()
            .resolve_with(
                ComputationResult::Value(1_u32),
                |_| successes.fetch_add(1, Ordering::SeqCst),
                |_| failures.fetch_add(1, Ordering::SeqCst),
            )
            .await;
        resolver()
            .resolve_with(
                Pending::<u32>::canceled().into(),
                |_| successes.fetch_add(1, Ordering::SeqCst),
                |_| failures.fetch_add(1, Ordering::SeqCst),
            )
            .await;

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resolved_serializes_untagged() {
        let single = serde_json::to_string(&Resolved::Single(1)).unwrap();
        let sequence = serde_json::to_string(&Resolved::Sequence(vec![1, 2])).unwrap();
        assert_eq!(single, "1");
        assert_eq!(sequence, "[1,2]");
    }

    proptest! {
        #[test]
        fn batch_output_matches_input_order(delays in prop::collection::vec(0_u64..50, 0..12)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let expected: Vec<u32> = (0..delays.len() as u32).collect();
            let batch: Vec<Pending<u32>> = delays
                .iter()
                .enumerate()
                .map(|(i, delay)| delayed(i as u32, *delay))
                .collect();

            let resolved = rt.block_on(resolver().resolve(batch.into())).unwrap();
            prop_assert_eq!(resolved, Resolved::Sequence(expected));
        }
    }
}
