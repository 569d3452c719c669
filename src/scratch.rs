//! Private temporary files that either get atomically moved into place or
//! removed, plus the retry helpers used around them.

use std::{
    io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

/// How many times removing a leftover scratch file is attempted.
const CLEANUP_ATTEMPTS: u32 = 3;
const CLEANUP_DELAY: Duration = Duration::from_millis(100);

/// A temporary file created next to its eventual destination.
///
/// The file is removed when the `ScratchFile` is dropped unless it was moved
/// into place with [`ScratchFile::persist`]. Removal failures are logged and
/// otherwise ignored.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    persisted: bool,
}

impl ScratchFile {
    /// Creates a new, empty scratch file inside `dir`.
    ///
    /// Creating it in the destination's directory keeps the final rename on
    /// one filesystem.
    pub fn new_in(dir: &Path) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(".bundlemaster-")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        let (_, path) = file.keep()?;
        log::trace!("Created scratch file {}", path.display());

        Ok(Self {
            path,
            persisted: false,
        })
    }

    /// Creates a scratch file beside `destination`.
    pub fn for_destination(destination: &Path) -> io::Result<Self> {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        Self::new_in(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the scratch file for writing, truncating it.
    pub fn create(&self) -> io::Result<fs_err::File> {
        fs_err::File::create(self.path())
    }

    /// Atomically moves the scratch file to `destination`, replacing whatever
    /// is there.
    pub fn persist(mut self, destination: &Path) -> io::Result<()> {
        fs_err::rename(&self.path, destination)?;

        log::trace!("Moved {} to {}", self.path.display(), destination.display());
        self.persisted = true;

        Ok(())
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.persisted {
            remove_with_retry(&self.path);
        }
    }
}

fn remove_with_retry(path: &Path) {
    for attempt in 1..=CLEANUP_ATTEMPTS {
        match fs_err::remove_file(path) {
            Ok(()) => return,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return,
            Err(err) => {
                if attempt == CLEANUP_ATTEMPTS {
                    log::warn!("Could not remove temporary file: {}", err);
                } else {
                    log::debug!("Retrying removal of {}: {}", path.display(), err);
                    thread::sleep(CLEANUP_DELAY);
                }
            }
        }
    }
}

/// Writes `contents` to `destination` through a scratch file, so readers
/// never see a partially written file.
pub fn write_atomic(destination: &Path, contents: &[u8]) -> io::Result<()> {
    let scratch = ScratchFile::for_destination(destination)?;
    fs_err::write(scratch.path(), contents)?;
    scratch.persist(destination)
}

/// Copies `source` to `destination` through a scratch file.
pub fn copy_atomic(source: &Path, destination: &Path) -> io::Result<()> {
    let scratch = ScratchFile::for_destination(destination)?;
    fs_err::copy(source, scratch.path())?;
    scratch.persist(destination)
}

/// Whether an I/O error looks like another process briefly holding the file.
pub fn is_transient_lock(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    match err.raw_os_error() {
        // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
        #[cfg(windows)]
        Some(32) | Some(33) => true,

        // EBUSY
        #[cfg(unix)]
        Some(16) => true,

        _ => false,
    }
}

/// Fixed-delay retry schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Runs `operation`, retrying it while it fails with an error that
    /// `should_retry` accepts and retries remain.
    pub fn run<T, E, F, R>(&self, mut operation: F, should_retry: R) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;

        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.retries && should_retry(&err) => {
                    attempt += 1;
                    log::debug!("Attempt {} failed, retrying", attempt);
                    thread::sleep(self.delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
