//! Stage 4: Background writer pool.
//!
//! Encoding and compressing output files is the slow part of extraction, and
//! it never needs the document. Each decoded image is packaged into a
//! [`WriteJob`] that owns everything it needs (raster buffer, colour map
//! snapshot, sink, output path) and handed to a [`WriterPool`].
//!
//! ## Concurrency model
//!
//! The pool owns a private tokio runtime. `n` workers run on its blocking
//! thread pool and pull jobs from one shared unbounded channel:
//!
//! ```text
//! extractor ──send──▶ [ mpsc::unbounded ] ──blocking_recv──▶ worker 0..n
//! ```
//!
//! Submission never blocks the interpreter. Workers exit once the sender is
//! dropped and the queue is empty, which is how [`WriterPool::drain`] waits
//! for every queued job.
//!
//! A job that fails (or panics) is logged with its path and counted; it
//! never takes the worker or its siblings down.

use crate::color::{resolve_row, ColorMap};
use crate::error::{ExtractError, JobError};
use crate::pipeline::raster::{RasterBuffer, RasterFormat};
use crate::pipeline::select::Container;
use crate::pipeline::sink::{new_sink, RowSink};
use futures::future::join_all;
use std::any::Any;
use std::fs::File;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// One output file, fully self-contained.
pub struct WriteJob {
    pub path: PathBuf,
    pub format: RasterFormat,
    pub raster: RasterBuffer,
    pub color_map: Option<Box<dyn ColorMap>>,
    pub dpi: f64,
    sink: Box<dyn RowSink>,
}

impl WriteJob {
    /// Package a decoded image. The colour map is deep-copied so the job
    /// outlives the interpreter's copy.
    pub fn new(
        path: PathBuf,
        container: Container,
        raster: RasterBuffer,
        color_map: Option<&dyn ColorMap>,
        dpi: f64,
    ) -> Self {
        let format = raster.format;
        Self {
            path,
            format,
            color_map: color_map.filter(|m| m.is_ok()).map(|m| m.snapshot()),
            raster,
            dpi,
            sink: new_sink(container, format),
        }
    }

    /// Encode the image. Rows missing from a truncated buffer are written as
    /// zeros so the file always has the declared height.
    pub fn run(mut self) -> Result<(), JobError> {
        let file = File::create(&self.path).map_err(|source| JobError::Open {
            path: self.path.clone(),
            source,
        })?;
        let (width, height) = (self.raster.width, self.raster.height);
        self.sink
            .init(file, width, height, self.dpi, self.dpi)
            .map_err(|source| JobError::Init {
                path: self.path.clone(),
                source,
            })?;

        let mut row = vec![0u8; self.format.row_bytes(width as usize)];
        let map = self.color_map.as_deref();
        for y in 0..height {
            resolve_row(self.format, map, self.raster.row(y), width as usize, &mut row);
            self.sink.write_row(&row).map_err(|source| JobError::Row {
                path: self.path.clone(),
                row: y,
                source,
            })?;
        }

        self.sink.close().map_err(|source| JobError::Close {
            path: self.path.clone(),
            source,
        })?;
        if self.raster.is_truncated() {
            warn!(
                "'{}': image data ended after {} of {} rows",
                self.path.display(),
                self.raster.rows_present(),
                height
            );
        }
        debug!("Wrote '{}'", self.path.display());
        Ok(())
    }
}

impl std::fmt::Debug for WriteJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteJob")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("width", &self.raster.width)
            .field("height", &self.raster.height)
            .finish_non_exhaustive()
    }
}

/// Completed/failed counters shared by the workers.
#[derive(Debug, Default)]
pub struct JobStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl JobStats {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn record(&self, outcome: &Result<(), JobError>) {
        match outcome {
            Ok(()) => self.completed.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }
}

/// Run one job on the current thread, containing panics and logging errors.
pub fn execute(job: WriteJob, stats: &JobStats) {
    let path = job.path.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.run())).unwrap_or_else(|payload| {
        Err(JobError::Panicked {
            path,
            detail: panic_detail(payload.as_ref()),
        })
    });
    if let Err(e) = &outcome {
        error!("{e}");
    }
    stats.record(&outcome);
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

type JobQueue = Arc<Mutex<mpsc::UnboundedReceiver<WriteJob>>>;

/// Fixed set of writer threads behind an unbounded job queue.
pub struct WriterPool {
    runtime: Option<Runtime>,
    sender: Option<mpsc::UnboundedSender<WriteJob>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<JobStats>,
}

impl WriterPool {
    /// Start `threads` workers (at least one).
    pub fn new(threads: usize, stats: Arc<JobStats>) -> Result<Self, ExtractError> {
        let threads = threads.max(1);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .max_blocking_threads(threads)
            .thread_name("pdfimages-writer")
            .build()
            .map_err(|source| ExtractError::PoolStartFailed { source })?;

        let (sender, receiver) = mpsc::unbounded_channel::<WriteJob>();
        let queue: JobQueue = Arc::new(Mutex::new(receiver));
        let workers = (0..threads)
            .map(|id| {
                let queue = Arc::clone(&queue);
                let stats = Arc::clone(&stats);
                runtime.spawn_blocking(move || worker_loop(id, &queue, &stats))
            })
            .collect();

        debug!("Started {} image writer thread(s)", threads);
        Ok(Self {
            runtime: Some(runtime),
            sender: Some(sender),
            workers,
            stats,
        })
    }

    /// Queue a job. Never blocks. If the workers are gone the job runs on the
    /// calling thread instead.
    pub fn submit(&self, job: WriteJob) {
        let job = match &self.sender {
            Some(sender) => match sender.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };
        warn!("Writer pool unavailable; writing '{}' inline", job.path.display());
        execute(job, &self.stats);
    }

    /// Wait until every submitted job has finished, then stop the workers.
    /// Idempotent. Safe to call from inside another tokio runtime.
    pub fn drain(&mut self) {
        // Closing the channel lets workers exit once the queue is empty.
        self.sender.take();
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let workers = std::mem::take(&mut self.workers);
        let wait = || {
            for result in runtime.block_on(join_all(workers)) {
                if let Err(e) = result {
                    error!("Writer worker terminated abnormally: {e}");
                }
            }
        };
        if Handle::try_current().is_ok() {
            std::thread::scope(|s| {
                s.spawn(wait);
            });
        } else {
            wait();
        }
        runtime.shutdown_background();
    }

    pub fn stats(&self) -> &JobStats {
        &self.stats
    }
}

impl Drop for WriterPool {
    fn drop(&mut self) {
        self.drain();
    }
}

fn worker_loop(id: usize, queue: &Mutex<mpsc::UnboundedReceiver<WriteJob>>, stats: &JobStats) {
    loop {
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blocking_recv();
        match next {
            Some(job) => execute(job, stats),
            None => break,
        }
    }
    debug!("Writer worker {} exiting", id);
}
