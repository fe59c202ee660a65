//! Retention sweeper for remote resource collections.
//!
//! A sweep repeatedly lists finished resources updated before a cutoff,
//! oldest first, and deletes each one until a listing comes back empty:
//! 1. List one page with `scope=finished`, `sort=asc`, `updated_before=<cutoff>`
//! 2. Stop with a [`SweepSummary`] when the page is empty
//! 3. Delete every resource on the page, in page order
//! 4. Reissue the same listing
//!
//! There is no cursor. Deleted resources drop out of the filtered listing, so
//! reissuing the query advances the window and a rerun after a crash simply
//! picks up where the last one stopped.
//!
//! Rate limiting is never retried: a `429` on any call aborts the sweep with
//! [`SweepError::RateLimited`]. Other deletion failures are logged and skipped;
//! a skipped resource is attempted again when the next listing returns it.
//! If a page where nothing could be deleted comes back unchanged and every
//! deletion fails a second time, the sweep stops with
//! [`SweepError::RequestFailed`].

mod api;
mod cutoff;
mod error;

use tracing::Instrument;

pub use api::{
    HttpResourceApi, ListQuery, MAX_PAGE_SIZE, ResourceApi, ResourceRecord, ResourceRef,
    TOKEN_HEADER,
};
pub use cutoff::RetentionCutoff;
pub use error::{ApiError, SweepError};

/// Counters and ids collected by a drained sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    /// Listing calls issued, including the final empty one.
    pub list_calls: u64,
    /// Deletion calls issued, successful or not.
    pub delete_calls: u64,
    /// Resources deleted, in the order they were deleted.
    pub deleted: Vec<ResourceRef>,
    /// Resources whose deletion failed with a non-fatal error.
    pub failed: Vec<ResourceRef>,
}

impl SweepSummary {
    /// Check if anything was deleted.
    pub fn has_deletions(&self) -> bool {
        !self.deleted.is_empty()
    }
}

/// `Ok` means the sweep drained every matching resource.
pub type SweepOutcome = Result<SweepSummary, SweepError>;

/// One sweep over a resource collection.
pub struct Sweeper<A> {
    api: A,
    page_size: u32,
    cutoff: RetentionCutoff,
    span: tracing::Span,
}

impl<A: ResourceApi> Sweeper<A> {
    /// Create a sweeper. `page_size` must be within `1..=100`.
    pub fn new(api: A, page_size: u32, cutoff: RetentionCutoff) -> Result<Self, SweepError> {
        validate_page_size(page_size)?;
        let span = tracing::info_span!(
            "sweep",
            url = %api.base_url(),
            updated_before = %cutoff,
            per_page = page_size
        );
        Ok(Self {
            api,
            page_size,
            cutoff,
            span,
        })
    }

    /// Emit this sweep's log events inside `span` instead of the default one.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn cutoff(&self) -> RetentionCutoff {
        self.cutoff
    }

    /// Run the sweep to completion or to the first fatal error.
    pub async fn run(&self) -> SweepOutcome {
        self.run_loop().instrument(self.span.clone()).await
    }

    async fn run_loop(&self) -> SweepOutcome {
        let query = ListQuery::new(self.page_size, self.cutoff);
        let mut summary = SweepSummary::default();
        // Ids of the previous page when none of them could be deleted.
        let mut undeletable: Option<Vec<ResourceRef>> = None;

        loop {
            summary.list_calls += 1;
            let page = match self.api.list(&query).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(
                        reason = %e.reason(),
                        url = %e.url(),
                        "Querying for resources failed"
                    );
                    if e.is_rate_limited() {
                        tracing::error!("Rate limits have been reached, wait and try again later");
                    }
                    return Err(e.into());
                }
            };

            if page.is_empty() {
                tracing::info!(
                    deleted = summary.deleted.len(),
                    failed = summary.failed.len(),
                    list_calls = summary.list_calls,
                    delete_calls = summary.delete_calls,
                    "No more resources found, sweep drained"
                );
                return Ok(summary);
            }

            let ids: Vec<ResourceRef> = page.into_iter().map(|record| record.id).collect();
            tracing::debug!(count = ids.len(), "Fetched page of resources to delete");

            let deleted_before = summary.deleted.len();
            for id in &ids {
                summary.delete_calls += 1;
                match self.api.delete(id).await {
                    Ok(()) => {
                        tracing::info!(id = %id, "Resource successfully deleted");
                        summary.deleted.push(id.clone());
                    }
                    Err(e) if e.is_rate_limited() => {
                        tracing::error!(
                            id = %id,
                            url = %e.url(),
                            "Rate limits have been reached, wait and try again later"
                        );
                        return Err(e.into());
                    }
                    Err(e) => {
                        tracing::warn!(
                            id = %id,
                            reason = %e.reason(),
                            url = %e.url(),
                            "Deleting resource failed"
                        );
                        summary.failed.push(id.clone());
                    }
                }
            }

            if summary.deleted.len() > deleted_before {
                undeletable = None;
                continue;
            }

            // A page that failed entirely, came back unchanged and failed again
            // will keep coming back; the window cannot move past it.
            if undeletable.as_ref() == Some(&ids) {
                tracing::error!(
                    count = ids.len(),
                    "No resource on the page could be deleted after retrying, sweep cannot make progress"
                );
                return Err(SweepError::RequestFailed {
                    reason: "no resource on the page could be deleted".to_string(),
                    url: self.api.base_url().to_string(),
                });
            }
            undeletable = Some(ids);
        }
    }
}

/// Sweep `base_url` with a fresh HTTP client.
///
/// Arguments are validated before any request is made. An empty or unusable
/// `base_url`, a `page_size` outside `1..=100` and a missing or unparsable
/// `cutoff` all yield [`SweepError::InvalidArgument`].
pub async fn sweep(
    base_url: &str,
    token: &str,
    page_size: u32,
    cutoff: Option<&str>,
) -> SweepOutcome {
    if base_url.trim().is_empty() {
        return Err(SweepError::InvalidArgument(
            "base URL must not be empty".to_string(),
        ));
    }
    validate_page_size(page_size)?;
    let cutoff = RetentionCutoff::resolve(cutoff)?;

    let api = HttpResourceApi::new(base_url, token)?;
    Sweeper::new(api, page_size, cutoff)?.run().await
}

fn validate_page_size(page_size: u32) -> Result<(), SweepError> {
    if (1..=MAX_PAGE_SIZE).contains(&page_size) {
        Ok(())
    } else {
        Err(SweepError::InvalidArgument(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use reqwest::StatusCode;

    use super::*;

    const BASE_URL: &str = "https://api.example/pipelines";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        List,
        Delete(ResourceRef),
    }

    /// How a scripted deletion fails.
    #[derive(Debug, Clone, Copy)]
    enum Failure {
        /// The resource is already gone (a concurrent sweep removed it).
        Vanished,
        /// The resource stays and every deletion attempt fails.
        Persistent(StatusCode),
        /// The first deletion attempt fails; later ones succeed.
        Once(StatusCode),
        RateLimited,
    }

    #[derive(Default)]
    struct Backend {
        resources: Vec<(u64, DateTime<Utc>)>,
        calls: Vec<Call>,
        delete_failures: HashMap<u64, Failure>,
        list_failure: Option<StatusCode>,
    }

    /// In-memory resource API that applies the server-side filter.
    #[derive(Clone, Default)]
    struct FakeApi {
        backend: Arc<Mutex<Backend>>,
    }

    impl FakeApi {
        fn with_resources(resources: &[(u64, DateTime<Utc>)]) -> Self {
            let api = Self::default();
            api.backend.lock().unwrap().resources = resources.to_vec();
            api
        }

        fn fail_delete(&self, id: u64, failure: Failure) {
            self.backend
                .lock()
                .unwrap()
                .delete_failures
                .insert(id, failure);
        }

        fn fail_list(&self, status: StatusCode) {
            self.backend.lock().unwrap().list_failure = Some(status);
        }

        fn calls(&self) -> Vec<Call> {
            self.backend.lock().unwrap().calls.clone()
        }

        fn list_calls(&self) -> usize {
            self.calls().iter().filter(|c| **c == Call::List).count()
        }

        fn delete_calls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Delete(_)))
                .count()
        }

        fn remaining(&self) -> Vec<u64> {
            self.backend
                .lock()
                .unwrap()
                .resources
                .iter()
                .map(|(id, _)| *id)
                .collect()
        }
    }

    #[async_trait]
    impl ResourceApi for FakeApi {
        fn base_url(&self) -> &str {
            BASE_URL
        }

        async fn list(&self, query: &ListQuery) -> Result<Vec<ResourceRecord>, ApiError> {
            let mut backend = self.backend.lock().unwrap();
            backend.calls.push(Call::List);
            if let Some(status) = backend.list_failure {
                return Err(ApiError::from_status(status, BASE_URL));
            }

            let mut matching: Vec<_> = backend
                .resources
                .iter()
                .filter(|(_, updated)| *updated < query.updated_before.at())
                .copied()
                .collect();
            matching.sort_by_key(|(_, updated)| *updated);

            Ok(matching
                .into_iter()
                .take(query.per_page as usize)
                .map(|(id, _)| ResourceRecord::new(id))
                .collect())
        }

        async fn delete(&self, id: &ResourceRef) -> Result<(), ApiError> {
            let mut backend = self.backend.lock().unwrap();
            backend.calls.push(Call::Delete(id.clone()));

            let ResourceRef::Integer(numeric) = id else {
                return Err(ApiError::from_status(StatusCode::NOT_FOUND, BASE_URL));
            };
            let url = format!("{BASE_URL}/{numeric}");

            match backend.delete_failures.get(numeric).copied() {
                Some(Failure::Vanished) => {
                    backend.resources.retain(|(rid, _)| rid != numeric);
                    backend.delete_failures.remove(numeric);
                    Err(ApiError::from_status(StatusCode::NOT_FOUND, url))
                }
                Some(Failure::Persistent(status)) => Err(ApiError::from_status(status, url)),
                Some(Failure::Once(status)) => {
                    backend.delete_failures.remove(numeric);
                    Err(ApiError::from_status(status, url))
                }
                Some(Failure::RateLimited) => Err(ApiError::RateLimited { url }),
                None => {
                    backend.resources.retain(|(rid, _)| rid != numeric);
                    Ok(())
                }
            }
        }
    }

    fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    fn cutoff() -> RetentionCutoff {
        RetentionCutoff::new(ts(2023, 1, 1))
    }

    fn ids(values: &[u64]) -> Vec<ResourceRef> {
        values.iter().copied().map(ResourceRef::from).collect()
    }

    #[tokio::test]
    async fn test_empty_first_page_drains_after_one_listing() {
        let api = FakeApi::default();
        let summary = Sweeper::new(api.clone(), 100, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(api.calls(), vec![Call::List]);
        assert_eq!(summary.list_calls, 1);
        assert_eq!(summary.delete_calls, 0);
        assert!(!summary.has_deletions());
    }

    #[tokio::test]
    async fn test_single_page_deleted_in_page_order() {
        let api = FakeApi::with_resources(&[
            (30, ts(2022, 3, 1)),
            (10, ts(2022, 1, 1)),
            (20, ts(2022, 2, 1)),
        ]);
        let summary = Sweeper::new(api.clone(), 100, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(
            api.calls(),
            vec![
                Call::List,
                Call::Delete(10.into()),
                Call::Delete(20.into()),
                Call::Delete(30.into()),
                Call::List,
            ]
        );
        assert_eq!(summary.deleted, ids(&[10, 20, 30]));
        assert_eq!(summary.list_calls, 2);
        assert_eq!(summary.delete_calls, 3);
    }

    #[tokio::test]
    async fn test_resources_at_or_after_cutoff_are_kept() {
        let api = FakeApi::with_resources(&[
            (1, ts(2022, 12, 31)),
            (2, ts(2023, 1, 1)),
            (3, ts(2023, 6, 1)),
        ]);
        let summary = Sweeper::new(api.clone(), 10, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(summary.deleted, ids(&[1]));
        assert_eq!(api.remaining(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_concrete_three_record_scenario() {
        let api = FakeApi::with_resources(&[
            (1, ts(2022, 1, 1)),
            (2, ts(2022, 6, 1)),
            (3, ts(2022, 12, 1)),
        ]);
        let summary = Sweeper::new(api.clone(), 2, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(
            api.calls(),
            vec![
                Call::List,
                Call::Delete(1.into()),
                Call::Delete(2.into()),
                Call::List,
                Call::Delete(3.into()),
                Call::List,
            ]
        );
        assert_eq!(summary.list_calls, 3);
        assert_eq!(summary.delete_calls, 3);
        assert_eq!(summary.deleted, ids(&[1, 2, 3]));
        assert!(api.remaining().is_empty());
    }

    #[tokio::test]
    async fn test_non_fatal_delete_failure_continues_through_pages() {
        let api = FakeApi::with_resources(&[
            (1, ts(2022, 1, 1)),
            (2, ts(2022, 2, 1)),
            (3, ts(2022, 3, 1)),
            (4, ts(2022, 4, 1)),
            (5, ts(2022, 5, 1)),
        ]);
        api.fail_delete(2, Failure::Vanished);

        let summary = Sweeper::new(api.clone(), 3, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(
            api.calls(),
            vec![
                Call::List,
                Call::Delete(1.into()),
                Call::Delete(2.into()),
                Call::Delete(3.into()),
                Call::List,
                Call::Delete(4.into()),
                Call::Delete(5.into()),
                Call::List,
            ]
        );
        assert_eq!(summary.deleted, ids(&[1, 3, 4, 5]));
        assert_eq!(summary.failed, ids(&[2]));
    }

    #[tokio::test]
    async fn test_rate_limited_delete_aborts_immediately() {
        let api = FakeApi::with_resources(&[
            (1, ts(2022, 1, 1)),
            (2, ts(2022, 2, 1)),
            (3, ts(2022, 3, 1)),
        ]);
        api.fail_delete(2, Failure::RateLimited);

        let err = Sweeper::new(api.clone(), 100, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, SweepError::RateLimited { ref url } if url.ends_with("/2")));
        assert_eq!(
            api.calls(),
            vec![Call::List, Call::Delete(1.into()), Call::Delete(2.into())]
        );
        assert_eq!(api.remaining(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_rate_limited_listing_aborts_without_deleting() {
        let api = FakeApi::with_resources(&[(1, ts(2022, 1, 1))]);
        api.fail_list(StatusCode::TOO_MANY_REQUESTS);

        let err = Sweeper::new(api.clone(), 100, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, SweepError::RateLimited { .. }));
        assert_eq!(api.calls(), vec![Call::List]);
    }

    #[tokio::test]
    async fn test_listing_failure_is_request_failed() {
        let api = FakeApi::with_resources(&[(1, ts(2022, 1, 1))]);
        api.fail_list(StatusCode::UNAUTHORIZED);

        let err = Sweeper::new(api.clone(), 100, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap_err();

        match err {
            SweepError::RequestFailed { reason, url } => {
                assert_eq!(reason, "Unauthorized");
                assert_eq!(url, BASE_URL);
            }
            other => panic!("expected RequestFailed, got {other:?}"),
        }
        assert_eq!(api.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_second_run_after_drain_is_a_single_listing() {
        let api = FakeApi::with_resources(&[(1, ts(2022, 1, 1)), (2, ts(2022, 2, 1))]);
        let sweeper = Sweeper::new(api.clone(), 100, cutoff()).unwrap();

        sweeper.run().await.unwrap();
        let calls_after_first = api.calls().len();

        let second = sweeper.run().await.unwrap();
        assert_eq!(second.list_calls, 1);
        assert_eq!(second.delete_calls, 0);
        assert_eq!(api.calls()[calls_after_first..], [Call::List]);
    }

    #[tokio::test]
    async fn test_page_that_cannot_be_deleted_stops_the_sweep() {
        let api = FakeApi::with_resources(&[(1, ts(2022, 1, 1)), (2, ts(2022, 2, 1))]);
        api.fail_delete(1, Failure::Persistent(StatusCode::FORBIDDEN));
        api.fail_delete(2, Failure::Persistent(StatusCode::FORBIDDEN));

        let err = Sweeper::new(api.clone(), 100, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, SweepError::RequestFailed { .. }));
        assert_eq!(
            api.calls(),
            vec![
                Call::List,
                Call::Delete(1.into()),
                Call::Delete(2.into()),
                Call::List,
                Call::Delete(1.into()),
                Call::Delete(2.into()),
            ]
        );
        assert_eq!(api.remaining(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_delete_is_retried_when_listed_again() {
        let api = FakeApi::with_resources(&[(1, ts(2022, 1, 1))]);
        api.fail_delete(1, Failure::Once(StatusCode::BAD_GATEWAY));

        let summary = Sweeper::new(api.clone(), 1, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(
            api.calls(),
            vec![
                Call::List,
                Call::Delete(1.into()),
                Call::List,
                Call::Delete(1.into()),
                Call::List,
            ]
        );
        assert_eq!(summary.failed, ids(&[1]));
        assert_eq!(summary.deleted, ids(&[1]));
        assert!(api.remaining().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_continue_through_later_pages() {
        let api = FakeApi::with_resources(&[
            (1, ts(2022, 1, 1)),
            (2, ts(2022, 2, 1)),
            (3, ts(2022, 3, 1)),
            (4, ts(2022, 4, 1)),
        ]);
        api.fail_delete(1, Failure::Once(StatusCode::SERVICE_UNAVAILABLE));
        api.fail_delete(2, Failure::Once(StatusCode::SERVICE_UNAVAILABLE));

        let summary = Sweeper::new(api.clone(), 2, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap();

        // [1,2] both fail -> [1,2] retried -> [3,4] -> []
        assert_eq!(summary.list_calls, 4);
        assert_eq!(summary.delete_calls, 6);
        assert_eq!(summary.failed, ids(&[1, 2]));
        assert_eq!(summary.deleted, ids(&[1, 2, 3, 4]));
        assert!(api.remaining().is_empty());
    }

    #[tokio::test]
    async fn test_partially_failing_page_keeps_going() {
        // 1 can never be deleted, but 2 and 3 can; the window still moves.
        let api = FakeApi::with_resources(&[
            (1, ts(2022, 1, 1)),
            (2, ts(2022, 2, 1)),
            (3, ts(2022, 3, 1)),
        ]);
        api.fail_delete(1, Failure::Persistent(StatusCode::INTERNAL_SERVER_ERROR));

        let err = Sweeper::new(api.clone(), 2, cutoff())
            .unwrap()
            .run()
            .await
            .unwrap_err();

        // [1,2] -> [1,3] -> [1] -> [1] (failed twice)
        assert!(matches!(err, SweepError::RequestFailed { .. }));
        assert_eq!(api.remaining(), vec![1]);
        assert_eq!(api.list_calls(), 4);
        assert_eq!(api.delete_calls(), 6);
    }

    #[test]
    fn test_page_size_bounds() {
        for size in [0, MAX_PAGE_SIZE + 1] {
            let err = Sweeper::new(FakeApi::default(), size, cutoff()).err().unwrap();
            assert!(matches!(err, SweepError::InvalidArgument(_)));
        }
        assert!(Sweeper::new(FakeApi::default(), 1, cutoff()).is_ok());
        assert!(Sweeper::new(FakeApi::default(), MAX_PAGE_SIZE, cutoff()).is_ok());
    }

    #[tokio::test]
    async fn test_sweep_rejects_missing_cutoff() {
        let err = sweep(BASE_URL, "token", 100, None).await.unwrap_err();
        assert!(matches!(err, SweepError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_sweep_rejects_relative_base_url() {
        let err = sweep("/pipelines", "token", 100, Some("1 week")).await.unwrap_err();
        assert!(matches!(err, SweepError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_sweep_rejects_empty_base_url() {
        let err = sweep("  ", "token", 100, Some("1 week")).await.unwrap_err();
        assert!(matches!(err, SweepError::InvalidArgument(_)));
    }
}
