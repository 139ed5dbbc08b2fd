//! Worker pools built on [`FanOut`] and [`FanIn`].
//!
//! Each pool runs a fixed number of worker threads and can be started once. Producer and
//! transform pools create their own output endpoints and close them once every worker
//! has finished; consumer pools only drain.

use std::{
    marker::PhantomData,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crossbeam_channel::Receiver;

use crate::{Error, FanIn, FanOut, OutputConfig, endpoint::channels, worker::WorkerGroup};

const fn validate_workers(workers: usize) -> Result<(), Error> {
    if workers == 0 {
        return Err(Error::InvalidConfig("a pool needs at least one worker"));
    }
    Ok(())
}

/// Creates the output endpoints for a stage and a [`FanOut`] over their senders.
fn outputs<T>(output: OutputConfig) -> (Arc<FanOut<T>>, Vec<Receiver<T>>) {
    let (senders, receivers) = channels(output.endpoints, output.capacity);
    (Arc::new(FanOut::from(senders)), receivers)
}

fn close_when_done<T>(stage: &'static str, fan_out: Arc<FanOut<T>>) -> impl FnOnce() + Send
where
    T: Send + 'static,
{
    move || {
        if let Err(e) = fan_out.close_all() {
            log::error!("{stage}: failed to close outputs: {e:?}");
        }
    }
}

/// The worker group of a pool, set at most once.
#[derive(Default)]
struct Started(Mutex<Option<WorkerGroup>>);

impl Started {
    fn group_slot(&self) -> MutexGuard<'_, Option<WorkerGroup>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `spawn` unless the pool already started, holding the slot for the whole call so
    /// that concurrent starts spawn one group between them.
    fn start<R>(
        &self,
        spawn: impl FnOnce() -> Result<(WorkerGroup, R), Error>,
    ) -> Result<R, Error> {
        let mut slot = self.group_slot();
        if slot.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let (group, started) = spawn()?;
        *slot = Some(group);

        Ok(started)
    }

    fn wait(&self) -> Result<(), Error> {
        self.group().ok_or(Error::NotStarted)?.wait()
    }

    fn group(&self) -> Option<WorkerGroup> {
        self.group_slot().clone()
    }

    fn is_finished(&self) -> bool {
        self.group_slot().as_ref().is_some_and(WorkerGroup::is_finished)
    }
}

/// Runs `workers` producers that all send into one shared [`FanOut`].
pub struct ProducerPool<T> {
    workers: usize,
    output: OutputConfig,
    started: Started,
    _payload: PhantomData<fn(T)>,
}

impl<T: Send + 'static> ProducerPool<T> {
    /// # Errors
    ///
    /// * If `workers` is zero or `output` is invalid
    pub fn new(workers: usize, output: OutputConfig) -> Result<Self, Error> {
        validate_workers(workers)?;
        output.validate()?;

        Ok(Self {
            workers,
            output,
            started: Started::default(),
            _payload: PhantomData,
        })
    }

    /// Creates the output endpoints, starts the workers and returns the reading halves
    /// without waiting for the workers.
    ///
    /// Each worker runs `producer(worker_index, fan_out)`. The outputs are closed once
    /// every worker has returned.
    ///
    /// # Errors
    ///
    /// * If the pool was already started
    /// * If a worker thread fails to spawn
    pub fn start<F>(&self, producer: F) -> Result<Vec<Receiver<T>>, Error>
    where
        F: Fn(usize, &FanOut<T>) + Send + Sync + 'static,
    {
        self.started.start(|| {
            let (fan_out, receivers) = outputs(self.output);

            let group = WorkerGroup::spawn(
                "producer",
                self.workers,
                close_when_done("producer", fan_out.clone()),
                move |index| producer(index, &fan_out),
            )?;

            Ok((group, receivers))
        })
    }

    /// Blocks until every producer has returned and the outputs are closed.
    ///
    /// # Errors
    ///
    /// * If the pool was never started
    /// * If any worker panicked
    pub fn wait(&self) -> Result<(), Error> {
        self.started.wait()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.started.is_finished()
    }

    pub(crate) fn group(&self) -> Option<WorkerGroup> {
        self.started.group()
    }
}

/// Runs `workers` transforms that drain one shared [`FanIn`] into one shared [`FanOut`].
pub struct TransformPool<I, O> {
    workers: usize,
    output: OutputConfig,
    started: Started,
    _payload: PhantomData<fn(I) -> O>,
}

impl<I: Send + 'static, O: Send + 'static> TransformPool<I, O> {
    /// # Errors
    ///
    /// * If `workers` is zero or `output` is invalid
    pub fn new(workers: usize, output: OutputConfig) -> Result<Self, Error> {
        validate_workers(workers)?;
        output.validate()?;

        Ok(Self {
            workers,
            output,
            started: Started::default(),
            _payload: PhantomData,
        })
    }

    /// Starts the workers over `inputs` and returns the reading halves of the outputs.
    ///
    /// Each input value is handed to exactly one worker, which runs
    /// `transform(value, fan_out)`; the transform may send any number of results. The
    /// outputs are closed once the inputs are exhausted and every worker has returned.
    ///
    /// # Errors
    ///
    /// * If the pool was already started
    /// * If a worker thread fails to spawn
    pub fn start<F>(
        &self,
        inputs: Vec<Receiver<I>>,
        transform: F,
    ) -> Result<Vec<Receiver<O>>, Error>
    where
        F: Fn(I, &FanOut<O>) + Send + Sync + 'static,
    {
        self.started.start(|| {
            let fan_in = FanIn::new(inputs);
            let (fan_out, receivers) = outputs(self.output);

            let group = WorkerGroup::spawn(
                "transform",
                self.workers,
                close_when_done("transform", fan_out.clone()),
                move |_index| {
                    for value in &fan_in {
                        transform(value, &fan_out);
                    }
                },
            )?;

            Ok((group, receivers))
        })
    }

    /// Blocks until the inputs are drained, every worker has returned and the outputs
    /// are closed.
    ///
    /// # Errors
    ///
    /// * If the pool was never started
    /// * If any worker panicked
    pub fn wait(&self) -> Result<(), Error> {
        self.started.wait()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.started.is_finished()
    }

    pub(crate) fn group(&self) -> Option<WorkerGroup> {
        self.started.group()
    }
}

/// Runs `workers` consumers that drain one shared [`FanIn`].
pub struct ConsumerPool<T> {
    workers: usize,
    started: Started,
    _payload: PhantomData<fn(T)>,
}

impl<T: Send + 'static> ConsumerPool<T> {
    /// # Errors
    ///
    /// * If `workers` is zero
    pub fn new(workers: usize) -> Result<Self, Error> {
        validate_workers(workers)?;

        Ok(Self {
            workers,
            started: Started::default(),
            _payload: PhantomData,
        })
    }

    /// Starts the workers over `inputs`, calling `consumer(value)` once per delivered
    /// value until the inputs are exhausted.
    ///
    /// # Errors
    ///
    /// * If the pool was already started
    /// * If a worker thread fails to spawn
    pub fn start<F>(&self, inputs: Vec<Receiver<T>>, consumer: F) -> Result<(), Error>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.started.start(|| {
            let fan_in = FanIn::new(inputs);

            let group = WorkerGroup::spawn(
                "consumer",
                self.workers,
                || {},
                move |_index| {
                    for value in &fan_in {
                        consumer(value);
                    }
                },
            )?;

            Ok((group, ()))
        })
    }

    /// Blocks until every consumer has drained its share of the inputs.
    ///
    /// # Errors
    ///
    /// * If the pool was never started
    /// * If any worker panicked
    pub fn wait(&self) -> Result<(), Error> {
        self.started.wait()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.started.is_finished()
    }

    pub(crate) fn group(&self) -> Option<WorkerGroup> {
        self.started.group()
    }
}
