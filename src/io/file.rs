//! Whole-file reads on a helper thread.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::core::{
    CancellationSource, CancellationToken, Disposable, LoopResult, ResourceTrackingScheduler,
    Scheduler, UntrackHandle,
};
use crate::promise::{defer, defer_cancelable, CancelablePromise, Deferred, Promise};

const CHUNK_SIZE: usize = 64 * 1024;

/// Read `path` to the end, giving up between chunks once `token` is cancelled.
fn read_until_cancelled(path: &Path, token: Option<&CancellationToken>) -> io::Result<Option<Vec<u8>>> {
    let mut file = File::open(path)?;
    let hint = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut bytes = Vec::with_capacity(usize::try_from(hint).unwrap_or(0));
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        if token.is_some_and(CancellationToken::is_cancelled) {
            return Ok(None);
        }
        match file.read(&mut chunk) {
            Ok(0) => return Ok(Some(bytes)),
            Ok(n) => bytes.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

fn settle<P>(deferred: &Deferred<Vec<u8>, P>, path: &Path, result: io::Result<Vec<u8>>)
where
    P: AsRef<Promise<Vec<u8>>> + Clone,
{
    match result {
        Ok(bytes) => {
            debug!(path = %path.display(), bytes = bytes.len(), "file read");
            deferred.resolve(bytes);
        }
        Err(e) => {
            deferred.reject(anyhow::Error::new(e).context(format!("failed to read {}", path.display())));
        }
    }
}

fn spawn_reader<F>(body: F) -> io::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name("nloop-io".into())
        .spawn(body)
        .map(|_| ())
}

/// Read the whole file at `path` on a helper thread.
///
/// The promise resolves with the file's bytes or rejects with the I/O error;
/// continuations run on `scheduler`.
///
/// # Errors
///
/// Returns `LoopError::Spawn` if the helper thread could not be created.
pub fn read_all_bytes<S>(scheduler: &S, path: impl AsRef<Path>) -> LoopResult<Promise<Vec<u8>>>
where
    S: Scheduler + Clone + 'static,
{
    let deferred = defer::<Vec<u8>, S>(scheduler.clone());
    let promise = deferred.promise();
    let path = path.as_ref().to_path_buf();

    spawn_reader(move || {
        let result = read_until_cancelled(&path, None)
            .map(|bytes| bytes.unwrap_or_default());
        settle(&deferred, &path, result);
    })?;
    Ok(promise)
}

/// In-flight read registered on the scheduler's resource tracker.
struct ReadJob {
    path: PathBuf,
    promise: CancelablePromise<Vec<u8>>,
}

impl Disposable for ReadJob {
    fn dispose(&self) {
        if self.promise.cancel() {
            debug!(path = %self.path.display(), "file read abandoned");
        }
    }
}

impl fmt::Debug for ReadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadJob").field("path", &self.path).finish()
    }
}

/// Read the whole file at `path`, tracked on `scheduler` until it completes.
///
/// Cancelling the returned promise stops the read at the next chunk boundary.
/// Disposing the scheduler cancels every outstanding read. A helper thread that
/// cannot be spawned rejects the promise.
///
/// # Errors
///
/// Returns `LoopError::Disposed` if the scheduler has been disposed.
pub fn read_all_bytes_cancelable<S>(
    scheduler: &S,
    path: impl AsRef<Path>,
) -> LoopResult<CancelablePromise<Vec<u8>>>
where
    S: ResourceTrackingScheduler + Clone + 'static,
{
    let source = CancellationSource::new();
    let token = source.token();
    let deferred = defer_cancelable::<Vec<u8>, S, _>(scheduler.clone(), move || {
        source.cancel();
    });
    let promise = deferred.promise();
    let path = path.as_ref().to_path_buf();

    let job = Arc::new(ReadJob {
        path: path.clone(),
        promise: promise.clone(),
    });
    let reader_token = token.clone();

    scheduler.track_resource_with(
        &token,
        Box::new(move |untrack: UntrackHandle| {
            let spawned = spawn_reader({
                let deferred = deferred.clone();
                let path = path.clone();
                let untrack = untrack.clone();
                move || {
                    if let Some(result) = read_until_cancelled(&path, Some(&reader_token)).transpose() {
                        settle(&deferred, &path, result);
                    }
                    // Settled first, so disposing the job finds nothing to cancel.
                    untrack.untrack();
                }
            });
            if let Err(e) = spawned {
                settle(&deferred, &path, Err(e));
                untrack.untrack();
            }
            job as Arc<dyn Disposable>
        }),
    )?;
    Ok(promise)
}
