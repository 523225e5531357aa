// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::UNIX_EPOCH;

use tick::Clock;

/// Returns the clock's current time in milliseconds since the Unix epoch.
///
/// Times before the epoch read as zero.
pub(crate) fn unix_millis(clock: &Clock) -> i64 {
    clock
        .system_time()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
