// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for single-key resolution, invalidation and preloading.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, UNIX_EPOCH},
};

use futures::future::{Ready, ready};
use pretty_assertions::assert_eq;
use stockpile::{CacheEntry, FailureKind, OriginError, OriginErrorKind, ResolveOptions, Source, Stockpile};
use stockpile_tier::testing::{LocalOp, MockLocalStore, MockRemoteStore, RemoteOp};
use tick::ClockControl;

type Remote = MockRemoteStore<CacheEntry<String>>;
type TestCache = Stockpile<String, MockLocalStore, Remote>;

const T0: i64 = 1_700_000_000_000;

struct Harness {
    control: ClockControl,
    cache: TestCache,
    local: MockLocalStore,
    remote: Remote,
    calls: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        let control = ClockControl::new_at(UNIX_EPOCH + Duration::from_millis(T0.unsigned_abs()));
        let local = MockLocalStore::new();
        let remote = Remote::new();
        let cache = Stockpile::builder::<String>(control.to_clock())
            .name("test")
            .local(local.clone())
            .remote(remote.clone())
            .build();

        Self {
            control,
            cache,
            local,
            remote,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A fetcher that counts its invocations and produces `outcome`.
    fn fetcher(&self, outcome: Result<&str, OriginError>) -> impl FnOnce() -> Ready<Result<String, OriginError>> + Send + 'static {
        let calls = Arc::clone(&self.calls);
        let outcome = outcome.map(str::to_owned);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            ready(outcome)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn advance(&self, duration: Duration) {
        self.control.advance(duration);
    }
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

#[tokio::test]
async fn two_resolves_within_ttl_fetch_once() {
    let h = Harness::new();
    let options = ResolveOptions::default();

    let first = h.cache.resolve_detailed("k", h.fetcher(Ok("v1")), &options).await.expect("resolve failed");
    h.advance(minutes(4));
    let second = h.cache.resolve_detailed("k", h.fetcher(Ok("v2")), &options).await.expect("resolve failed");

    assert_eq!(h.calls(), 1);
    assert_eq!(first.source(), Source::Origin);
    assert_eq!(second.source(), Source::Local);
    assert_eq!(second.value(), "v1");
}

#[tokio::test]
async fn usage_scenario_with_configured_local_ttl() {
    let h = Harness::new();
    let options = ResolveOptions::from_json(r#"{ "localTTL": 900000 }"#).expect("valid options");
    let key = "usage:89852";

    let first = h.cache.resolve(key, h.fetcher(Ok("12.5 GB")), &options).await.expect("resolve failed");
    let second = h.cache.resolve(key, h.fetcher(Ok("13.0 GB")), &options).await.expect("resolve failed");

    assert_eq!(h.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(
        h.local.raw(key).as_deref(),
        Some(r#"{"data":"12.5 GB","timestamp":1700000000000,"ttl":900000}"#)
    );
}

#[tokio::test]
async fn fresh_fetch_writes_both_tiers_with_their_ttls() {
    let h = Harness::new();
    let options = ResolveOptions::new().local_ttl(minutes(1)).remote_ttl(minutes(10));

    h.cache.resolve("k", h.fetcher(Ok("v")), &options).await.expect("resolve failed");

    let local: CacheEntry<String> = serde_json::from_str(&h.local.raw("k").expect("local entry")).expect("valid entry");
    assert_eq!(local.ttl(), Some(minutes(1)));
    assert_eq!(local.timestamp(), T0);

    let remote_set = h
        .remote
        .operations()
        .into_iter()
        .find(|op| matches!(op, RemoteOp::Set { .. }))
        .expect("remote write");
    assert_eq!(
        remote_set,
        RemoteOp::Set {
            key: "k".to_string(),
            value: CacheEntry::new("v".to_string(), T0).with_ttl(Some(minutes(10))),
            ttl: None,
        }
    );
}

#[tokio::test]
async fn expired_local_falls_through_to_remote_and_backfills() {
    let h = Harness::new();
    let options = ResolveOptions::new().local_ttl(minutes(1)).remote_ttl(minutes(30));

    h.cache.resolve("k", h.fetcher(Ok("v1")), &options).await.expect("resolve failed");
    h.advance(minutes(2));

    let resolution = h
        .cache
        .resolve_detailed("k", h.fetcher(Err(OriginError::transient("unused"))), &options)
        .await
        .expect("resolve failed");

    assert_eq!(h.calls(), 1);
    assert_eq!(resolution.source(), Source::Remote);
    assert_eq!(resolution.value(), "v1");

    // The backfilled entry keeps the remote capture time.
    let local: CacheEntry<String> = serde_json::from_str(&h.local.raw("k").expect("local entry")).expect("valid entry");
    assert_eq!(local.timestamp(), T0);
    assert_eq!(local.ttl(), Some(minutes(1)));
}

#[tokio::test]
async fn transient_failure_serves_stale_value() {
    let h = Harness::new();
    let options = ResolveOptions::default();

    h.cache.resolve("k", h.fetcher(Ok("old")), &options).await.expect("resolve failed");
    h.advance(minutes(31));

    let resolution = h
        .cache
        .resolve_detailed("k", h.fetcher(Err(OriginError::transient("503"))), &options)
        .await
        .expect("stale value expected");

    assert_eq!(h.calls(), 2);
    assert_eq!(resolution.source(), Source::Stale);
    assert!(!resolution.is_fresh());
    assert_eq!(resolution.into_value(), "old");
}

#[tokio::test]
async fn failure_without_any_cached_value_propagates() {
    let h = Harness::new();

    let error = h
        .cache
        .resolve("k", h.fetcher(Err(OriginError::transient("offline"))), &ResolveOptions::default())
        .await
        .expect_err("no fallback exists");

    assert_eq!(error.key(), "k");
    assert_eq!(error.kind(), FailureKind::Origin(OriginErrorKind::Transient));
    assert_eq!(error.origin_error().map(OriginError::message), Some("offline"));
}

#[tokio::test]
async fn permanent_failure_is_not_masked_by_default() {
    let h = Harness::new();
    let options = ResolveOptions::default();

    h.cache.resolve("k", h.fetcher(Ok("old")), &options).await.expect("resolve failed");
    h.advance(minutes(31));

    let error = h
        .cache
        .resolve("k", h.fetcher(Err(OriginError::permanent("deleted"))), &options)
        .await
        .expect_err("permanent errors propagate");
    assert_eq!(error.kind(), FailureKind::Origin(OriginErrorKind::Permanent));

    let masked = h
        .cache
        .resolve_detailed(
            "k",
            h.fetcher(Err(OriginError::permanent("deleted"))),
            &options.clone().serve_stale_on_permanent_error(true),
        )
        .await
        .expect("masked by stale value");
    assert_eq!(masked.source(), Source::Stale);
    assert_eq!(masked.value(), "old");
}

#[tokio::test]
async fn rate_limit_opens_backoff_window() {
    let h = Harness::new();
    let options = ResolveOptions::default();

    h.cache.resolve("k", h.fetcher(Ok("good")), &options).await.expect("resolve failed");
    h.advance(minutes(31));

    // T: the origin rate-limits for 900 seconds; the last good value is served.
    let limited = h
        .cache
        .resolve_detailed("k", h.fetcher(Err(OriginError::rate_limited(Duration::from_secs(900), "429"))), &options)
        .await
        .expect("stale value expected");
    assert_eq!(limited.source(), Source::Stale);
    assert_eq!(limited.value(), "good");
    assert_eq!(h.calls(), 2);

    // T + 600s: the origin is not contacted.
    h.advance(Duration::from_secs(600));
    let soft = h
        .cache
        .resolve_detailed("k", h.fetcher(Ok("fresh")), &options)
        .await
        .expect("backoff value expected");
    assert_eq!(soft.source(), Source::Backoff);
    assert_eq!(soft.value(), "good");
    assert_eq!(h.calls(), 2);
    assert!(h.cache.ledger().is_backed_off("k").await.expect("ledger readable"));

    // T + 901s: the origin is called again and the backoff is cleared.
    h.advance(Duration::from_secs(301));
    let fresh = h
        .cache
        .resolve_detailed("k", h.fetcher(Ok("fresh")), &options)
        .await
        .expect("resolve failed");
    assert_eq!(fresh.source(), Source::Origin);
    assert_eq!(fresh.value(), "fresh");
    assert_eq!(h.calls(), 3);
    assert!(!h.local.contains_key("#backoff:k"));
}

#[tokio::test]
async fn sub_second_retry_after_still_backs_off() {
    let h = Harness::new();
    let options = ResolveOptions::default();

    let error = h
        .cache
        .resolve("k", h.fetcher(Err(OriginError::rate_limited(Duration::from_millis(500), "429"))), &options)
        .await
        .expect_err("nothing to serve");
    assert!(error.is_rate_limited());

    // The window is rounded up to a whole second.
    h.advance(Duration::from_millis(600));
    let error = h
        .cache
        .resolve("k", h.fetcher(Ok("v")), &options)
        .await
        .expect_err("origin must not be contacted");
    assert!(error.is_rate_limited());
    assert_eq!(h.calls(), 1);

    h.advance(Duration::from_millis(400));
    assert_eq!(h.cache.resolve("k", h.fetcher(Ok("v")), &options).await.expect("resolve failed"), "v");
    assert_eq!(h.calls(), 2);
}

#[tokio::test]
async fn caller_keys_do_not_collide_with_backoff_records() {
    let h = Harness::new();
    let options = ResolveOptions::default();

    h.cache
        .ledger()
        .record_backoff("a", Some(&"7".to_string()), Duration::from_secs(900))
        .await
        .expect("ledger write failed");

    let lookalike = h
        .cache
        .resolve_detailed("a#backoff", h.fetcher(Ok("99")), &options)
        .await
        .expect("resolve failed");
    assert_eq!(lookalike.source(), Source::Origin);
    assert_eq!(lookalike.value(), "99");
    assert_eq!(h.calls(), 1);

    let reserved = h
        .cache
        .resolve_detailed("#backoff:a", h.fetcher(Ok("98")), &options)
        .await
        .expect("resolve failed");
    assert_eq!(reserved.source(), Source::Origin);
    assert_eq!(reserved.value(), "98");
    assert_eq!(h.calls(), 2);

    // Neither write disturbed the record for `a`.
    let backed_off = h.cache.resolve_detailed("a", h.fetcher(Ok("new")), &options).await.expect("resolve failed");
    assert_eq!(backed_off.source(), Source::Backoff);
    assert_eq!(backed_off.value(), "7");
    assert_eq!(h.calls(), 2);
}

#[tokio::test]
async fn rate_limit_without_cached_value_still_backs_off() {
    let h = Harness::new();
    let options = ResolveOptions::default();

    let error = h
        .cache
        .resolve("k", h.fetcher(Err(OriginError::rate_limited(Duration::from_secs(60), "429"))), &options)
        .await
        .expect_err("nothing to serve");
    assert!(error.is_rate_limited());

    h.advance(Duration::from_secs(30));
    let error = h
        .cache
        .resolve("k", h.fetcher(Ok("v")), &options)
        .await
        .expect_err("origin must not be contacted");
    assert!(error.is_rate_limited());
    assert_eq!(error.origin_error().and_then(OriginError::retry_after), Some(Duration::from_secs(30)));
    assert_eq!(h.calls(), 1);

    h.advance(Duration::from_secs(31));
    assert_eq!(h.cache.resolve("k", h.fetcher(Ok("v")), &options).await.expect("resolve failed"), "v");
    assert_eq!(h.calls(), 2);
}

#[tokio::test]
async fn invalidate_forces_origin_fetch() {
    let h = Harness::new();
    let options = ResolveOptions::new().evergreen_local().evergreen_remote();

    h.cache.resolve("k", h.fetcher(Ok("v1")), &options).await.expect("resolve failed");
    h.cache.invalidate("k").await.expect("invalidate failed");

    assert!(!h.local.contains_key("k"));
    assert!(!h.remote.contains_key("k"));

    let value = h.cache.resolve("k", h.fetcher(Ok("v2")), &options).await.expect("resolve failed");
    assert_eq!(value, "v2");
    assert_eq!(h.calls(), 2);
}

#[tokio::test]
async fn invalidate_clears_backoff() {
    let h = Harness::new();
    let options = ResolveOptions::default();

    let _ = h
        .cache
        .resolve("k", h.fetcher(Err(OriginError::rate_limited(Duration::from_secs(900), "429"))), &options)
        .await;
    h.cache.invalidate("k").await.expect("invalidate failed");

    let value = h.cache.resolve("k", h.fetcher(Ok("v")), &options).await.expect("resolve failed");
    assert_eq!(value, "v");
    assert_eq!(h.calls(), 2);
}

#[tokio::test]
async fn invalidate_reports_store_failures() {
    let h = Harness::new();
    h.remote.fail_when(|op| matches!(op, RemoteOp::Delete(_)));

    let error = h.cache.invalidate("k").await.expect_err("remote delete fails");
    assert_eq!(error.kind(), FailureKind::Store);
    // The other tiers are still cleared.
    assert!(h.local.operations().contains(&LocalOp::Remove("k".to_string())));
    assert!(h.local.operations().contains(&LocalOp::Remove("#backoff:k".to_string())));
}

#[tokio::test]
async fn preload_is_served_without_origin() {
    let h = Harness::new();
    let options = ResolveOptions::default();

    h.cache.preload("k", "mine".to_string(), &options).await.expect("preload failed");

    let resolution = h.cache.resolve_detailed("k", h.fetcher(Ok("theirs")), &options).await.expect("resolve failed");
    assert_eq!(h.calls(), 0);
    assert_eq!(resolution.source(), Source::Local);
    assert_eq!(resolution.value(), "mine");
    assert!(h.remote.contains_key("k"));
}

#[tokio::test]
async fn store_failures_degrade_to_origin() {
    let h = Harness::new();
    h.local.fail_when(|_| true);
    h.remote.fail_when(|_| true);

    let value = h
        .cache
        .resolve("k", h.fetcher(Ok("v")), &ResolveOptions::default())
        .await
        .expect("store failures must not fail the resolution");
    assert_eq!(value, "v");
    assert_eq!(h.calls(), 1);
}

#[tokio::test]
async fn failing_local_read_falls_through_to_remote() {
    let h = Harness::new();
    h.remote.seed("k", CacheEntry::new("remote".to_string(), T0).with_ttl(Some(minutes(30))));
    h.local.fail_when(|op| matches!(op, LocalOp::Get(_)));

    let resolution = h
        .cache
        .resolve_detailed("k", h.fetcher(Ok("origin")), &ResolveOptions::default())
        .await
        .expect("resolve failed");
    assert_eq!(resolution.source(), Source::Remote);
    assert_eq!(h.calls(), 0);
}

#[tokio::test]
async fn corrupt_local_entry_is_a_miss() {
    let h = Harness::new();
    h.local.seed("k", "{ not json".to_string());

    let value = h.cache.resolve("k", h.fetcher(Ok("v")), &ResolveOptions::default()).await.expect("resolve failed");
    assert_eq!(value, "v");
    assert_eq!(h.calls(), 1);
}

#[tokio::test]
async fn disabled_tiers_are_bypassed() {
    let h = Harness::new();
    let options = ResolveOptions::new().enable_local_cache(false).enable_remote_cache(false);

    h.cache.resolve("k", h.fetcher(Ok("v1")), &options).await.expect("resolve failed");
    h.cache.resolve("k", h.fetcher(Ok("v2")), &options).await.expect("resolve failed");

    assert_eq!(h.calls(), 2);
    assert!(h.remote.operations().is_empty());
    assert!(h.local.operations().iter().all(|op| op.key() == "#backoff:k"));
}

#[tokio::test]
async fn remote_only_caching() {
    let h = Harness::new();
    let options = ResolveOptions::new().enable_local_cache(false);

    h.cache.resolve("k", h.fetcher(Ok("v1")), &options).await.expect("resolve failed");
    let second = h.cache.resolve_detailed("k", h.fetcher(Ok("v2")), &options).await.expect("resolve failed");

    assert_eq!(h.calls(), 1);
    assert_eq!(second.source(), Source::Remote);
    assert!(!h.local.contains_key("k"));
}

#[tokio::test]
async fn expired_remote_entry_is_kept_for_stale_fallback() {
    let control = ClockControl::new_at(UNIX_EPOCH + Duration::from_millis(T0.unsigned_abs()));
    let cache = Stockpile::builder::<String>(control.to_clock()).memory().build();
    let options = ResolveOptions::new()
        .enable_local_cache(false)
        .remote_ttl(Duration::from_millis(20));

    cache.resolve("k", || async { Ok("v1".to_string()) }, &options).await.expect("resolve failed");

    // Long enough for the backend to have evicted the entry had it been given the freshness as a TTL.
    tokio::time::sleep(Duration::from_millis(100)).await;
    control.advance(minutes(5));

    let resolution = cache
        .resolve_detailed("k", || async { Err(OriginError::transient("offline")) }, &options)
        .await
        .expect("stale value expected");
    assert_eq!(resolution.source(), Source::Stale);
    assert_eq!(resolution.value(), "v1");
}

#[tokio::test]
async fn evergreen_entries_never_go_stale() {
    let h = Harness::new();
    let options = ResolveOptions::new().evergreen_local();

    h.cache.resolve("k", h.fetcher(Ok("reference")), &options).await.expect("resolve failed");
    h.advance(Duration::from_secs(365 * 24 * 60 * 60));

    let resolution = h.cache.resolve_detailed("k", h.fetcher(Ok("new")), &options).await.expect("resolve failed");
    assert_eq!(resolution.source(), Source::Local);
    assert_eq!(h.calls(), 1);
    assert!(!h.local.raw("k").expect("local entry").contains("ttl"));
}

#[tokio::test]
async fn closed_cache_rejects_operations() {
    let h = Harness::new();
    let options = ResolveOptions::default();

    h.cache.close().await;
    assert!(h.cache.is_closed());

    let error = h.cache.resolve("k", h.fetcher(Ok("v")), &options).await.expect_err("closed");
    assert_eq!(error.kind(), FailureKind::Closed);
    assert_eq!(h.calls(), 0);

    assert_eq!(h.cache.invalidate("k").await.expect_err("closed").kind(), FailureKind::Closed);
    assert_eq!(
        h.cache.preload("k", "v".to_string(), &options).await.expect_err("closed").kind(),
        FailureKind::Closed
    );
}
