//! Finds bundle files under a directory and runs per-file work over them on
//! a bounded worker pool.

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread,
};

use anyhow::Context;
use bundle_codec::{read_signature, Signature};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::report::{Level, ProgressTracker, Reporter};

/// Number of files the generator hands to the pool at a time.
pub const GENERATOR_CHUNK_SIZE: usize = 100;

/// Which container signatures a batch accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFilter {
    UnityFsOnly,
    AnyBundle,
}

impl SignatureFilter {
    pub fn accepts(self, signature: Signature) -> bool {
        match self {
            SignatureFilter::UnityFsOnly => signature == Signature::UnityFs,
            SignatureFilter::AnyBundle => true,
        }
    }
}

/// Recursively lists every file under `root` whose signature passes
/// `filter`, in file name order.
///
/// Files that can't be read are skipped. An unreadable `root` is an error.
pub fn find_bundles(root: &Path, filter: SignatureFilter) -> anyhow::Result<Vec<PathBuf>> {
    let mut bundles = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Could not enumerate {}", root.display()))?;

        if !entry.file_type().is_file() {
            continue;
        }

        match read_signature(entry.path()) {
            Ok(Some(signature)) if filter.accepts(signature) => {
                bundles.push(entry.into_path());
            }
            Ok(_) => {
                log::trace!("Skipping {}, not a bundle", entry.path().display());
            }
            Err(err) => {
                log::debug!("Skipping {}: {}", entry.path().display(), err);
            }
        }
    }

    Ok(bundles)
}

/// Worker counts used by the two engines when none is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// One worker per available processor.
    AllCores,

    /// Leaves one processor free, but always uses at least one worker.
    AllButOne,

    Exactly(NonZeroUsize),
}

impl Parallelism {
    pub fn from_jobs(jobs: Option<usize>, default: Parallelism) -> Self {
        match jobs.and_then(NonZeroUsize::new) {
            Some(jobs) => Parallelism::Exactly(jobs),
            None => default,
        }
    }

    pub fn threads(self) -> usize {
        let available = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);

        match self {
            Parallelism::AllCores => available,
            Parallelism::AllButOne => available.saturating_sub(1).max(1),
            Parallelism::Exactly(jobs) => jobs.get(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub message: String,
}

/// What happened to every item of a batch, in input order.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub completed: Vec<(PathBuf, T)>,
    pub failures: Vec<BatchFailure>,
}

impl<T> BatchOutcome<T> {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failures.len()
    }
}

/// Runs work over a list of files on a fixed-size pool.
pub struct BatchRunner<'a> {
    pool: rayon::ThreadPool,
    reporter: &'a dyn Reporter,
    chunk_size: Option<usize>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(parallelism: Parallelism, reporter: &'a dyn Reporter) -> anyhow::Result<Self> {
        let threads = parallelism.threads();
        log::debug!("Starting worker pool with {} threads", threads);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("bundlemaster-worker-{}", index))
            .build()
            .context("Could not start worker pool")?;

        Ok(Self {
            pool,
            reporter,
            chunk_size: None,
        })
    }

    /// Hands files to the pool `chunk_size` at a time, so that everything
    /// held for one chunk can be released before the next starts.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }

    /// Runs `work` on every path.
    ///
    /// A failing item is logged through the reporter and recorded; it never
    /// stops the rest of the batch.
    pub fn run<T, F>(&self, paths: &[PathBuf], work: F) -> BatchOutcome<T>
    where
        T: Send,
        F: Fn(&Path) -> anyhow::Result<T> + Sync,
    {
        let tracker = ProgressTracker::new(self.reporter, paths.len());
        let chunk_size = self.chunk_size.unwrap_or(paths.len()).max(1);

        let mut outcome = BatchOutcome {
            completed: Vec::new(),
            failures: Vec::new(),
        };

        for chunk in paths.chunks(chunk_size) {
            let results: Vec<_> = self.pool.install(|| {
                chunk
                    .par_iter()
                    .map(|path| {
                        let result = work(path);
                        tracker.advance();
                        (path, result)
                    })
                    .collect()
            });

            for (path, result) in results {
                match result {
                    Ok(value) => outcome.completed.push((path.clone(), value)),
                    Err(err) => {
                        self.reporter.log(
                            Level::Error,
                            &format!("Error processing {}: {:#}", path.display(), err),
                        );
                        outcome.failures.push(BatchFailure {
                            path: path.clone(),
                            message: format!("{:#}", err),
                        });
                    }
                }
            }
        }

        tracker.finish();

        outcome
    }
}
