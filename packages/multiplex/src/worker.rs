//! Named worker threads sharing a join barrier.

use std::{
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use crate::Error;

type OnFinish = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Barrier {
    remaining: usize,
    finished: bool,
}

struct State {
    stage: String,
    barrier: Mutex<Barrier>,
    finished: Condvar,
    panicked: AtomicUsize,
    on_finish: Mutex<Option<OnFinish>>,
}

impl State {
    fn barrier(&self) -> MutexGuard<'_, Barrier> {
        self.barrier.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a fixed group of worker threads.
///
/// When the last worker exits, the group's completion callback runs on that worker's
/// thread, and only then is the group marked finished.
#[derive(Clone)]
pub struct WorkerGroup {
    state: Arc<State>,
}

/// Holds one slot of the barrier until dropped.
struct Slot {
    state: Arc<State>,
    index: Option<usize>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let state = &self.state;

        if thread::panicking() {
            let count = state.panicked.fetch_add(1, Ordering::SeqCst) + 1;
            log::error!(
                "{} worker {:?} panicked ({count} so far)",
                state.stage,
                self.index
            );
        } else if let Some(index) = self.index {
            log::trace!("{} worker {index} finished", state.stage);
        }

        let remaining = {
            let mut barrier = state.barrier();
            barrier.remaining -= 1;
            barrier.remaining
        };
        if remaining > 0 {
            return;
        }

        let on_finish = state
            .on_finish
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(on_finish) = on_finish {
            on_finish();
        }

        state.barrier().finished = true;
        state.finished.notify_all();
        log::debug!("{} finished", state.stage);
    }
}

impl WorkerGroup {
    /// Spawns `workers` threads named `{stage}-{index}`, each running `body(index)`.
    ///
    /// `on_finish` runs exactly once, after every spawned worker has exited.
    ///
    /// # Errors
    ///
    /// * If a worker thread fails to spawn. Workers spawned before the failure keep
    ///   running and `on_finish` still runs once they exit.
    pub fn spawn<F>(
        stage: &str,
        workers: usize,
        on_finish: impl FnOnce() + Send + 'static,
        body: F,
    ) -> Result<Self, Error>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let group = Self {
            state: Arc::new(State {
                stage: stage.to_owned(),
                barrier: Mutex::new(Barrier::default()),
                finished: Condvar::new(),
                panicked: AtomicUsize::new(0),
                on_finish: Mutex::new(Some(Box::new(on_finish))),
            }),
        };

        // Held until every worker is spawned so an early exit can't finish the group.
        let starter = group.slot(None);
        let body = Arc::new(body);

        for index in 0..workers {
            let slot = group.slot(Some(index));
            let body = body.clone();

            log::trace!("{stage} worker {index} spawning");

            thread::Builder::new()
                .name(format!("{stage}-{index}"))
                .spawn(move || {
                    let _slot = slot;
                    body(index);
                })?;
        }

        drop(starter);

        Ok(group)
    }

    fn slot(&self, index: Option<usize>) -> Slot {
        self.state.barrier().remaining += 1;

        Slot {
            state: self.state.clone(),
            index,
        }
    }

    #[must_use]
    pub fn stage(&self) -> &str {
        &self.state.stage
    }

    /// Blocks until every worker has exited and the completion callback has run.
    ///
    /// # Errors
    ///
    /// * If any worker panicked
    pub fn wait(&self) -> Result<(), Error> {
        let state = &self.state;
        drop(
            state
                .finished
                .wait_while(state.barrier(), |barrier| !barrier.finished)
                .unwrap_or_else(PoisonError::into_inner),
        );

        match state.panicked.load(Ordering::SeqCst) {
            0 => Ok(()),
            count => Err(Error::WorkerPanicked {
                stage: state.stage.clone(),
                count,
            }),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.barrier().finished
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn runs_every_worker_and_finishes_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let finishes = Arc::new(AtomicUsize::new(0));

        let group = WorkerGroup::spawn(
            "test",
            8,
            {
                let finishes = finishes.clone();
                move || {
                    finishes.fetch_add(1, Ordering::SeqCst);
                }
            },
            {
                let runs = runs.clone();
                move |_index| {
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            },
        )
        .unwrap();

        group.wait().unwrap();

        assert!(group.is_finished());
        assert_eq!(runs.load(Ordering::SeqCst), 8);
        assert_eq!(finishes.load(Ordering::SeqCst), 1);
    }

    #[test_log::test]
    fn on_finish_has_run_when_wait_returns() {
        let done = Arc::new(AtomicBool::new(false));

        let group = WorkerGroup::spawn(
            "test",
            3,
            {
                let done = done.clone();
                move || done.store(true, Ordering::SeqCst)
            },
            |index| thread::sleep(std::time::Duration::from_millis(10 * index as u64)),
        )
        .unwrap();

        group.wait().unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test_log::test]
    fn zero_workers_finish_immediately() {
        let group = WorkerGroup::spawn("empty", 0, || {}, |_| {}).unwrap();

        group.wait().unwrap();
        assert_eq!(group.stage(), "empty");
    }

    #[test_log::test]
    fn panicking_workers_are_reported() {
        let group = WorkerGroup::spawn(
            "flaky",
            4,
            || {},
            |index| assert!(index.is_multiple_of(2), "worker {index} fails"),
        )
        .unwrap();

        match group.wait() {
            Err(Error::WorkerPanicked { stage, count }) => {
                assert_eq!(stage, "flaky");
                assert_eq!(count, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
