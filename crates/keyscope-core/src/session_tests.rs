//! Tests for scan sessions

use super::session::*;
use super::test_support::*;
use crate::{Cursor, DataSource, ScanError};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::Semaphore;

fn session_for(source: ScriptedSource) -> (ScanSession, Arc<ScriptedSource>) {
    let source = Arc::new(source);
    let session = ScanSession::new(source.clone() as Arc<dyn DataSource>);
    (session, source)
}

/// Wait until the session has received `batches` batches
async fn until_batches(session: &ScanSession, batches: usize) {
    let mut rx = session.subscribe();
    rx.wait_for(|p| p.batches >= batches || p.status.is_terminal())
        .await
        .unwrap();
}

#[cfg(test)]
mod options_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let options = ScanOptions::new();
        assert_eq!(options.pattern, "*");
        assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!options.with_metadata);
        assert_eq!(options.limit, 0);
        assert_eq!(options.batch_delay, Duration::ZERO);
    }

    #[test]
    fn test_empty_pattern_matches_everything() {
        let options = ScanOptions::new().with_pattern("");
        assert_eq!(options.pattern, "*");

        let options = ScanOptions::new().with_pattern("user:*");
        assert_eq!(options.pattern, "user:*");
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let (session, source) = session_for(ScriptedSource::batches(vec![]));
        let err = session.start("*", 0).unwrap_err();
        assert!(matches!(err, ScanError::InvalidOptions(_)));
        assert_eq!(session.status(), ScanStatus::Idle);
        assert_eq!(source.scan_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let (session, _source) = session_for(ScriptedSource::batches(vec![]));
        let err = session.start("*", 10).unwrap_err();
        assert!(matches!(err, ScanError::Configuration(_)));
        assert_eq!(session.status(), ScanStatus::Idle);
    }
}

#[cfg(test)]
mod drive_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_completed_scan_accumulates_in_order() {
        let (session, _source) = session_for(ScriptedSource::batches(vec![
            (5, vec!["a", "ab", "b"]),
            (0, vec!["abc"]),
        ]));

        session.start("*", 100).unwrap();
        let status = session.wait().await;

        assert_eq!(status, ScanStatus::Completed);
        assert_eq!(ids(&session.items()), vec!["a", "ab", "b", "abc"]);
        assert!(session.cursor().is_start());
    }

    #[tokio::test]
    async fn test_cursor_is_passed_back_to_source() {
        let (session, source) = session_for(ScriptedSource::batches(vec![
            (17, vec!["a"]),
            (42, vec!["b"]),
            (0, vec!["c"]),
        ]));

        session.start("*", 10).unwrap();
        session.wait().await;

        assert_eq!(
            *source.cursors.lock(),
            vec![Cursor::start(), Cursor::from(17u64), Cursor::from(42u64)]
        );
    }

    #[tokio::test]
    async fn test_item_count_equals_sum_of_batches() {
        let batches = vec![
            (3, vec!["k1", "k2"]),
            (9, vec![]),
            (4, vec!["k3", "k4", "k5"]),
            (0, vec!["k6"]),
        ];
        let expected: usize = batches.iter().map(|(_, keys)| keys.len()).sum();
        let (session, _source) = session_for(ScriptedSource::batches(batches));

        session.start("k*", 2).unwrap();
        session.wait().await;

        let progress = session.progress();
        assert_eq!(session.len(), expected);
        assert_eq!(progress.total_appended, expected);
        assert_eq!(progress.items_so_far, expected);
        assert_eq!(progress.batches, 4);
        assert_eq!(progress.status, ScanStatus::Completed);
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let (session, _source) = session_for(ScriptedSource::batches(vec![
            (8, vec!["a", "b"]),
            (0, vec!["b", "c"]),
        ]));

        session.start("*", 100).unwrap();
        session.wait().await;

        assert_eq!(ids(&session.items()), vec!["a", "b", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_items() {
        let (session, _source) = session_for(ScriptedSource::new(vec![
            Step::Batch(5, vec!["a", "ab", "b"]),
            Step::Fail(ScanError::SourceUnavailable("connection reset".into())),
        ]));

        session.start("*", 100).unwrap();
        let status = session.wait().await;

        assert_eq!(
            status,
            ScanStatus::Failed(ScanError::SourceUnavailable("connection reset".into()))
        );
        assert_eq!(ids(&session.items()), vec!["a", "ab", "b"]);
        assert_eq!(session.progress().items_so_far, 3);
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let (session, source) = session_for(ScriptedSource::new(vec![Step::Fail(
            ScanError::SourceUnavailable("down".into()),
        )]));

        session.start("*", 100).unwrap();
        session.wait().await;

        assert_eq!(source.scan_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_limit_truncates_and_completes() {
        let (session, source) = session_for(ScriptedSource::batches(vec![
            (1, vec!["a", "b", "c"]),
            (2, vec!["d", "e", "f"]),
            (0, vec!["g"]),
        ]));

        session
            .start_with(ScanOptions::new().with_batch_size(3).with_limit(4))
            .unwrap();
        let status = session.wait().await;

        assert_eq!(status, ScanStatus::Completed);
        assert_eq!(ids(&session.items()), vec!["a", "b", "c", "d"]);
        assert_eq!(source.scan_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_estimated_total_is_published() {
        let (session, _source) =
            session_for(ScriptedSource::batches(vec![(0, vec!["a"])]).with_estimate(250));

        session.start("*", 10).unwrap();
        session.wait().await;

        assert_eq!(session.progress().estimated_total, Some(250));
    }

    #[tokio::test]
    async fn test_batch_delay_still_completes() {
        let (session, _source) = session_for(ScriptedSource::batches(vec![
            (1, vec!["a"]),
            (0, vec!["b"]),
        ]));

        session
            .start_with(ScanOptions::new().with_batch_delay(Duration::from_millis(5)))
            .unwrap();

        assert_eq!(session.wait().await, ScanStatus::Completed);
        assert_eq!(session.len(), 2);
    }
}

#[cfg(test)]
mod metadata_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::{Item, ItemKind, ItemMetadata, ScanBatch, Ttl};

    #[tokio::test]
    async fn test_metadata_is_attached() {
        let (session, _source) = session_for(ScriptedSource::batches(vec![(0, vec!["abc"])]));

        session
            .start_with(ScanOptions::new().with_metadata())
            .unwrap();
        session.wait().await;

        let items = session.items();
        let metadata = items[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.kind, ItemKind::String);
        assert_eq!(metadata.ttl, Ttl::NoExpiry);
        assert_eq!(metadata.size, 3);
    }

    #[tokio::test]
    async fn test_vanished_key_is_skipped() {
        let source = ScriptedSource::batches(vec![(4, vec!["a", "gone", "b"]), (0, vec!["c"])])
            .with_missing(&["gone"]);
        let (session, _source) = session_for(source);

        session
            .start_with(ScanOptions::new().with_metadata())
            .unwrap();
        let status = session.wait().await;

        assert_eq!(status, ScanStatus::Completed);
        assert_eq!(ids(&session.items()), vec!["a", "b", "c"]);
        assert_eq!(session.progress().skipped, 1);
    }

    #[tokio::test]
    async fn test_metadata_command_error_skips_key() {
        let source = ScriptedSource::batches(vec![(0, vec!["a", "b", "c"])]).with_metadata_error(
            "b",
            ScanError::Source("WRONGTYPE Operation against a key holding the wrong kind of value".into()),
        );
        let (session, _source) = session_for(source);

        session
            .start_with(ScanOptions::new().with_metadata())
            .unwrap();
        let status = session.wait().await;

        assert_eq!(status, ScanStatus::Completed);
        let items = session.items();
        assert_eq!(ids(&items), vec!["a", "c"]);
        assert!(items.iter().all(|item| item.metadata.is_some()));
        assert_eq!(session.progress().skipped, 1);
    }

    #[tokio::test]
    async fn test_default_metadata_batch_keeps_order() {
        let source = ScriptedSource::batches(vec![]).with_missing(&["b"]);
        let ids = vec!["a".to_string(), "b".to_string(), "ccc".to_string()];

        let results = source.metadata_batch(&ids).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().size, 1);
        assert!(matches!(&results[1], Err(ScanError::NotFound(id)) if id == "b"));
        assert_eq!(results[2].as_ref().unwrap().size, 3);
    }

    /// Answers a two-key batch with a single metadata result
    struct ShortLookupSource;

    #[async_trait::async_trait]
    impl DataSource for ShortLookupSource {
        fn name(&self) -> &str {
            "short-lookup"
        }

        async fn scan(&self, _cursor: &Cursor, _pattern: &str, _batch_size: usize) -> crate::Result<ScanBatch> {
            Ok(ScanBatch::new(Cursor::start(), vec![Item::new("a"), Item::new("b")]))
        }

        async fn metadata(&self, id: &str) -> crate::Result<ItemMetadata> {
            Err(ScanError::NotFound(id.to_string()))
        }

        async fn metadata_batch(&self, _ids: &[String]) -> crate::Result<Vec<crate::Result<ItemMetadata>>> {
            Ok(vec![Ok(ItemMetadata::new(ItemKind::Hash, Ttl::NoExpiry, 2))])
        }
    }

    #[tokio::test]
    async fn test_short_metadata_batch_fails_session() {
        let session = ScanSession::new(Arc::new(ShortLookupSource));

        session
            .start_with(ScanOptions::new().with_metadata())
            .unwrap();
        let status = session.wait().await;

        assert!(matches!(status, ScanStatus::Failed(ScanError::Source(_))));
        assert!(session.is_empty());
    }

    #[test]
    fn test_per_item_errors() {
        assert!(ScanError::NotFound("k".into()).is_per_item());
        assert!(ScanError::Source("WRONGTYPE".into()).is_per_item());
        assert!(!ScanError::SourceUnavailable("reset".into()).is_per_item());
        assert!(!ScanError::AlreadyRunning.is_per_item());
    }

    #[tokio::test]
    async fn test_metadata_transport_error_fails_session() {
        let source = ScriptedSource::batches(vec![(4, vec!["a"]), (0, vec!["b"])])
            .with_metadata_error("b", ScanError::SourceUnavailable("broken pipe".into()));
        let (session, _source) = session_for(source);

        session
            .start_with(ScanOptions::new().with_metadata())
            .unwrap();
        let status = session.wait().await;

        assert!(matches!(status, ScanStatus::Failed(ScanError::SourceUnavailable(_))));
        assert_eq!(ids(&session.items()), vec!["a"]);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_new_session_is_idle() {
        let (session, _source) = session_for(ScriptedSource::batches(vec![]));
        assert_eq!(session.status(), ScanStatus::Idle);
        assert!(session.is_empty());
        assert_eq!(session.wait().await, ScanStatus::Idle);
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let (session, _source) = session_for(
            ScriptedSource::batches(vec![(1, vec!["a"]), (0, vec!["b"])]).gated(gate.clone()),
        );

        session.start("*", 10).unwrap();
        let err = session.start("other:*", 10).unwrap_err();

        assert_eq!(err, ScanError::AlreadyRunning);
        assert_eq!(session.options().pattern, "*");
        assert_eq!(session.status(), ScanStatus::Running);

        gate.add_permits(2);
        assert_eq!(session.wait().await, ScanStatus::Completed);
    }

    #[tokio::test]
    async fn test_restart_replaces_items() {
        let (session, source) = session_for(ScriptedSource::batches(vec![(0, vec!["a", "b"])]));

        session.start("*", 10).unwrap();
        session.wait().await;
        assert_eq!(session.len(), 2);

        source.push(Step::Batch(0, vec!["c"]));
        session.start("*", 10).unwrap();
        assert_eq!(session.wait().await, ScanStatus::Completed);

        assert_eq!(ids(&session.items()), vec!["c"]);
        assert_eq!(session.progress().total_appended, 1);
    }

    #[tokio::test]
    async fn test_restart_after_failure() {
        let (session, source) = session_for(ScriptedSource::new(vec![Step::Fail(
            ScanError::Source("ERR unknown command".into()),
        )]));

        session.start("*", 10).unwrap();
        assert!(matches!(session.wait().await, ScanStatus::Failed(_)));

        source.push(Step::Batch(0, vec!["x"]));
        session.start("*", 10).unwrap();
        assert_eq!(session.wait().await, ScanStatus::Completed);
        assert_eq!(ids(&session.items()), vec!["x"]);
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle() {
        let (session, _source) = session_for(ScriptedSource::batches(vec![(0, vec!["a"])]));

        session.start("*", 10).unwrap();
        session.wait().await;
        session.reset().unwrap();

        assert_eq!(session.status(), ScanStatus::Idle);
        assert!(session.is_empty());
        assert_eq!(session.progress(), ScanProgress::default());
    }

    #[tokio::test]
    async fn test_reset_while_running_is_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let (session, _source) =
            session_for(ScriptedSource::batches(vec![(0, vec!["a"])]).gated(gate.clone()));

        session.start("*", 10).unwrap();
        assert_eq!(session.reset(), Err(ScanError::AlreadyRunning));

        gate.add_permits(1);
        session.wait().await;
        assert!(session.reset().is_ok());
    }
}

#[cfg(test)]
mod cancellation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cancel_between_batches() {
        let gate = Arc::new(Semaphore::new(1));
        let (session, source) = session_for(
            ScriptedSource::batches(vec![(1, vec!["a", "b"]), (0, vec!["c"])]).gated(gate.clone()),
        );

        session.start("*", 10).unwrap();
        until_batches(&session, 1).await;

        session.cancel();
        assert_eq!(session.wait().await, ScanStatus::Cancelled);
        assert_eq!(ids(&session.items()), vec!["a", "b"]);

        // A late response must not land in the store
        gate.add_permits(5);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.len(), 2);
        assert_eq!(session.status(), ScanStatus::Cancelled);
        assert!(source.scan_calls.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancel_before_first_batch() {
        let gate = Arc::new(Semaphore::new(0));
        let (session, _source) =
            session_for(ScriptedSource::batches(vec![(0, vec!["a"])]).gated(gate.clone()));

        session.start("*", 10).unwrap();
        session.cancel();

        assert_eq!(session.wait().await, ScanStatus::Cancelled);
        gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let (session, _source) = session_for(ScriptedSource::batches(vec![(0, vec!["a"])]));
        session.cancel();
        assert_eq!(session.status(), ScanStatus::Idle);

        session.start("*", 10).unwrap();
        assert_eq!(session.wait().await, ScanStatus::Completed);
        session.cancel();
        assert_eq!(session.status(), ScanStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_during_batch_delay() {
        let (session, _source) = session_for(ScriptedSource::batches(vec![
            (1, vec!["a"]),
            (0, vec!["b"]),
        ]));

        session
            .start_with(ScanOptions::new().with_batch_delay(Duration::from_secs(60)))
            .unwrap();
        until_batches(&session, 1).await;
        session.cancel();

        assert_eq!(session.wait().await, ScanStatus::Cancelled);
        assert_eq!(ids(&session.items()), vec!["a"]);
    }
}

#[cfg(test)]
mod progress_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_growth_is_monotonic() {
        let gate = Arc::new(Semaphore::new(0));
        let (session, _source) = session_for(
            ScriptedSource::batches(vec![
                (1, vec!["a", "b"]),
                (2, vec![]),
                (3, vec!["c"]),
                (0, vec!["d", "e"]),
            ])
            .gated(gate.clone()),
        );

        session.start("*", 10).unwrap();
        let mut observed = vec![session.len()];
        for batch in 1..=4 {
            gate.add_permits(1);
            until_batches(&session, batch).await;
            observed.push(session.len());
        }
        session.wait().await;

        assert_eq!(observed, vec![0, 2, 2, 3, 5]);
        assert!(observed.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_subscriber_sees_running_then_completed() {
        let gate = Arc::new(Semaphore::new(0));
        let (session, _source) =
            session_for(ScriptedSource::batches(vec![(0, vec!["a"])]).gated(gate.clone()));

        session.start("*", 10).unwrap();
        let rx = session.subscribe();
        assert_eq!(rx.borrow().status, ScanStatus::Running);
        assert_eq!(rx.borrow().items_so_far, 0);

        gate.add_permits(1);
        session.wait().await;

        let progress = session.progress();
        assert_eq!(progress.status, ScanStatus::Completed);
        assert_eq!(progress.items_so_far, 1);
    }

    #[tokio::test]
    async fn test_drive_loop_does_not_wait_for_slow_subscriber() {
        let (session, _source) = session_for(ScriptedSource::batches(vec![
            (1, vec!["a"]),
            (2, vec!["b"]),
            (0, vec!["c"]),
        ]));

        // Subscribed but never read
        let _rx = session.subscribe();
        session.start("*", 10).unwrap();

        assert_eq!(session.wait().await, ScanStatus::Completed);
        assert_eq!(session.len(), 3);
    }

    #[tokio::test]
    async fn test_runs_on_provided_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let source = Arc::new(ScriptedSource::batches(vec![(0, vec!["a", "b"])]));
        let session = ScanSession::with_runtime(source, runtime.handle().clone());

        session.start("*", 10).unwrap();
        assert_eq!(session.wait().await, ScanStatus::Completed);
        assert_eq!(session.len(), 2);

        runtime.shutdown_background();
    }
}
