//! Background decoding.
//!
//! Workers pull jobs from a shared queue and push results onto the completion queue,
//! which the cache drains on the GPU thread. Workers never see GPU state.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::Config;
use crate::decode::{Decoder, Source};
use crate::error::{DecodeError, Error};
use crate::key::CacheKey;
use crate::pixels::Pixels;

struct Job {
    key: CacheKey,
    source: Source,
}

/// A finished decode waiting to be uploaded.
pub(crate) struct Completed {
    pub key: CacheKey,
    pub source: Source,
    pub result: Result<Pixels, DecodeError>,
}

pub(crate) struct WorkerPool {
    jobs: Option<flume::Sender<Job>>,
    queued: flume::Receiver<Job>,
    completed: flume::Receiver<Completed>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(config: &Config, decoder: Arc<dyn Decoder>) -> Result<Self, Error> {
        let (jobs_tx, jobs_rx) = flume::unbounded::<Job>();
        let (completed_tx, completed_rx) = flume::unbounded::<Completed>();

        let mut pool = Self {
            jobs: Some(jobs_tx),
            queued: jobs_rx.clone(),
            completed: completed_rx,
            workers: Vec::with_capacity(config.worker_count()),
        };

        for i in 0..config.worker_count() {
            let jobs = jobs_rx.clone();
            let completed = completed_tx.clone();
            let decoder = decoder.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}-{i}", config.thread_name))
                .spawn(move || run(jobs, completed, decoder))
                .map_err(|e| Error::Spawn(Arc::new(e)))?;
            pool.workers.push(handle);
        }

        log::debug!("started {} decode workers", pool.workers.len());
        Ok(pool)
    }

    /// Queues a decode.
    pub fn submit(&self, key: CacheKey, source: Source) -> Result<(), DecodeError> {
        // Workers own the only completion senders.
        if self.completed.is_disconnected() {
            return Err(DecodeError::WorkerGone);
        }
        self.jobs
            .as_ref()
            .ok_or(DecodeError::WorkerGone)?
            .send(Job { key, source })
            .map_err(|_| DecodeError::WorkerGone)
    }

    /// Takes a finished decode, if there is one.
    pub fn try_completed(&self) -> Option<Completed> {
        self.completed.try_recv().ok()
    }

    /// Whether every worker has exited and every result has been taken.
    pub fn is_gone(&self) -> bool {
        self.completed.is_disconnected() && self.completed.is_empty()
    }

    /// Blocks until a decode finishes.
    pub fn wait_completed(&self) -> Result<Completed, DecodeError> {
        self.completed.recv().map_err(|_| DecodeError::WorkerGone)
    }

    /// Stops the workers once their current job is done. Queued jobs are dropped.
    pub fn shutdown(&mut self) {
        // Closing the job queue ends each worker's receive loop.
        self.jobs = None;
        let dropped = self.queued.drain().count();
        if dropped > 0 {
            log::debug!("dropped {dropped} queued decodes");
        }
        while self.completed.try_recv().is_ok() {}
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("decode worker panicked during shutdown");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(jobs: flume::Receiver<Job>, completed: flume::Sender<Completed>, decoder: Arc<dyn Decoder>) {
    while let Ok(Job { key, source }) = jobs.recv() {
        if completed.is_disconnected() {
            break;
        }
        log::debug!("decoding {key}");
        let result = catch_unwind(AssertUnwindSafe(|| decoder.decode(&source)))
            .unwrap_or_else(|panic| Err(DecodeError::Panicked(panic_message(&*panic))));
        if completed.send(Completed { key, source, result }).is_err() {
            break;
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
