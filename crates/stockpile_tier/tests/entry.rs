// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the persisted shapes of `CacheEntry` and `RateLimitRecord`.

use std::time::Duration;

use serde_json::{Value, json};
use stockpile_tier::{CacheEntry, RateLimitRecord};

#[test]
fn entry_with_ttl_persists_ttl_in_millis() {
    let entry = CacheEntry::new(json!({"used": 12}), 1_700_000_000_000).with_ttl(Some(Duration::from_secs(300)));
    let persisted: Value = serde_json::to_value(&entry).expect("serialize");

    assert_eq!(
        persisted,
        json!({
            "data": {"used": 12},
            "timestamp": 1_700_000_000_000_i64,
            "ttl": 300_000,
        })
    );
}

#[test]
fn evergreen_entry_omits_ttl() {
    let entry = CacheEntry::new("catalog", 5);
    let persisted: Value = serde_json::to_value(&entry).expect("serialize");

    assert_eq!(persisted, json!({"data": "catalog", "timestamp": 5}));
}

#[test]
fn entry_without_ttl_field_reads_back_as_evergreen() {
    let entry: CacheEntry<String> = serde_json::from_str(r#"{"data":"x","timestamp":10}"#).expect("deserialize");

    assert_eq!(entry.ttl(), None);
    assert!(!entry.is_expired(i64::MAX));
    assert_eq!(entry.timestamp(), 10);
}

#[test]
fn rate_limit_record_persists_retry_after_in_seconds() {
    let record = RateLimitRecord::new(vec![1, 2], 42, Duration::from_secs(900));
    let persisted: Value = serde_json::to_value(&record).expect("serialize");

    assert_eq!(persisted, json!({"data": [1, 2], "timestamp": 42, "retryAfter": 900}));
}

#[test]
fn rate_limit_record_reads_back_window() {
    let record: RateLimitRecord<u32> =
        serde_json::from_str(r#"{"data":7,"timestamp":1000,"retryAfter":60}"#).expect("deserialize");

    assert_eq!(*record.data(), 7);
    assert_eq!(record.observed_at(), 1_000);
    assert_eq!(record.retry_after(), Duration::from_secs(60));
    assert!(record.is_active(60_999));
    assert!(!record.is_active(61_000));
}
