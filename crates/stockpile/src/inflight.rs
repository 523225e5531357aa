// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key de-duplication of in-flight resolutions.

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyspawn::Spawner;
use futures::{
    channel::oneshot,
    future::{BoxFuture, FutureExt, Shared},
};
use parking_lot::Mutex;
use uniflight::{LeaderPanicked, Merger};

/// Resolves once the task it belongs to has finished.
pub(crate) type Completion = Shared<BoxFuture<'static, ()>>;

/// A key together with the generation it was resolved at.
type FlightKey = (String, u64);

type RunningSet = Arc<Mutex<HashMap<u64, (String, Completion)>>>;

/// At most one outstanding resolution per key and generation; late callers await the same one.
///
/// Each call runs as its own task on the spawner, so the work finishes and its cache writes
/// land even after every caller stopped awaiting. A caller arriving while the work is still
/// running joins it.
pub(crate) struct InFlight<O> {
    spawner: Spawner,
    merger: Merger<FlightKey, O>,
    running: RunningSet,
    next_id: AtomicU64,
}

impl<O> Debug for InFlight<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight").field("running", &self.running.lock().len()).finish()
    }
}

/// Removes a task from the running set when it finishes or unwinds.
struct Registration {
    running: RunningSet,
    id: u64,
    _done: oneshot::Sender<()>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.running.lock().remove(&self.id);
    }
}

impl<O> InFlight<O>
where
    O: Clone + Send + Sync + 'static,
{
    pub fn new(spawner: Spawner) -> Self {
        Self {
            spawner,
            merger: Merger::new(),
            running: Arc::default(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Runs `work` for `key` at `generation`, or joins the run already in flight for them.
    ///
    /// The flag is `true` when this call's `work` was the one executed. A joined call drops its
    /// `work` unpolled.
    pub async fn run<W>(&self, key: &str, generation: u64, work: W) -> (Result<O, LeaderPanicked>, bool)
    where
        W: Future<Output = O> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (done, finished) = oneshot::channel::<()>();
        let completion = finished.map(|_| ()).boxed().shared();
        self.running.lock().insert(id, (key.to_owned(), completion));

        let registration = Registration {
            running: Arc::clone(&self.running),
            id,
            _done: done,
        };
        let merger = self.merger.clone();
        let flight = (key.to_owned(), generation);

        self.spawner
            .spawn(async move {
                let _registration = registration;
                let mut started = false;
                let outcome = merger
                    .execute(&flight, || {
                        started = true;
                        work
                    })
                    .await;
                (outcome, started)
            })
            .await
    }

    /// Returns the key and completion of every task still running.
    pub fn snapshot(&self) -> Vec<(String, Completion)> {
        self.running.lock().values().cloned().collect()
    }

    /// Returns the number of tasks still running.
    pub fn len(&self) -> usize {
        self.running.lock().len()
    }
}
