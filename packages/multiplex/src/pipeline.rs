//! Chainable producer → transform(s) → consumer pipelines.

use crossbeam_channel::Receiver;

use crate::{
    ConsumerPool, Error, FanOut, OutputConfig, PipelineConfig, ProducerPool, TransformPool,
    worker::WorkerGroup,
};

/// Builder that wires a [`ProducerPool`], any number of [`TransformPool`]s and a
/// terminating [`ConsumerPool`] together.
///
/// Each stage reads the endpoints created by the stage before it. Any stage other than
/// [`produce`](Self::produce) fails with [`Error::NotStarted`] on a pipeline that has no
/// producer yet.
pub struct Pipeline<T> {
    config: PipelineConfig,
    current: Option<Vec<Receiver<T>>>,
    stages: Vec<WorkerGroup>,
}

impl<T: Send + 'static> Pipeline<T> {
    #[must_use]
    pub const fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            current: None,
            stages: vec![],
        }
    }

    /// Creates a pipeline with worker counts read from the environment.
    ///
    /// # Errors
    ///
    /// * If a worker count variable is not a valid number
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::new(PipelineConfig::from_env()?))
    }

    /// Starts the producer stage.
    ///
    /// # Errors
    ///
    /// * If the pipeline already has a producer
    /// * If the config is invalid or a worker fails to spawn
    pub fn produce<F>(mut self, output: OutputConfig, producer: F) -> Result<Self, Error>
    where
        F: Fn(usize, &FanOut<T>) + Send + Sync + 'static,
    {
        if self.current.is_some() {
            return Err(Error::AlreadyStarted);
        }
        self.config.validate()?;

        let pool = ProducerPool::new(self.config.producers, output)?;
        let endpoints = pool.start(producer)?;

        log::debug!("produce: {} endpoint(s)", endpoints.len());

        self.stages.extend(pool.group());
        self.current = Some(endpoints);

        Ok(self)
    }

    fn take_current(&mut self) -> Result<Vec<Receiver<T>>, Error> {
        self.current.take().ok_or(Error::NotStarted)
    }

    /// Adds a transform stage reading the current endpoints.
    ///
    /// # Errors
    ///
    /// * If the pipeline has no producer
    /// * If the config is invalid or a worker fails to spawn
    pub fn process<U, F>(
        mut self,
        output: OutputConfig,
        transform: F,
    ) -> Result<Pipeline<U>, Error>
    where
        U: Send + 'static,
        F: Fn(T, &FanOut<U>) + Send + Sync + 'static,
    {
        let inputs = self.take_current()?;

        log::debug!("process: {} endpoint(s) in", inputs.len());

        let pool = TransformPool::new(self.config.transformers, output)?;
        let endpoints = pool.start(inputs, transform)?;

        log::debug!("process: {} endpoint(s) out", endpoints.len());

        self.stages.extend(pool.group());

        Ok(Pipeline {
            config: self.config,
            current: Some(endpoints),
            stages: self.stages,
        })
    }

    /// Adds a final transform stage and hands its output endpoints to the caller instead
    /// of a consumer stage.
    ///
    /// # Errors
    ///
    /// * If the pipeline has no producer
    /// * If the config is invalid or a worker fails to spawn
    pub fn collect<U, F>(
        self,
        output: OutputConfig,
        transform: F,
    ) -> Result<Vec<Receiver<U>>, Error>
    where
        U: Send + 'static,
        F: Fn(T, &FanOut<U>) + Send + Sync + 'static,
    {
        self.process(output, transform)?.into_endpoints()
    }

    /// Hands the current endpoints to the caller.
    ///
    /// # Errors
    ///
    /// * If the pipeline has no producer
    pub fn into_endpoints(mut self) -> Result<Vec<Receiver<T>>, Error> {
        self.take_current()
    }

    /// Terminates the pipeline with a consumer stage without waiting for it.
    ///
    /// # Errors
    ///
    /// * If the pipeline has no producer
    /// * If a worker fails to spawn
    pub fn consume<F>(mut self, consumer: F) -> Result<PipelineHandle, Error>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let inputs = self.take_current()?;

        log::debug!(
            "consume: {} endpoint(s) after {} stage(s)",
            inputs.len(),
            self.stages.len()
        );

        let pool = ConsumerPool::new(self.config.consumers)?;
        pool.start(inputs, consumer)?;

        let consumers = pool.group().ok_or(Error::NotStarted)?;

        Ok(PipelineHandle {
            consumers,
            upstream: self.stages,
        })
    }

    /// Terminates the pipeline with a consumer stage and blocks until every value has been
    /// consumed.
    ///
    /// # Errors
    ///
    /// * If the pipeline has no producer
    /// * If a worker fails to spawn
    /// * If any worker in any stage panicked
    pub fn consume_and_wait<F>(self, consumer: F) -> Result<(), Error>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.consume(consumer)?.wait()
    }
}

/// Handle to a running pipeline whose consumer stage has been started.
pub struct PipelineHandle {
    consumers: WorkerGroup,
    upstream: Vec<WorkerGroup>,
}

impl PipelineHandle {
    /// Blocks until the consumer stage has drained every value.
    ///
    /// # Errors
    ///
    /// * If any worker in any stage panicked
    pub fn wait(&self) -> Result<(), Error> {
        let consumed = self.consumers.wait();

        for stage in &self.upstream {
            log::trace!("wait: checking {} stage", stage.stage());
            stage.wait()?;
        }

        consumed
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.consumers.is_finished()
    }
}
