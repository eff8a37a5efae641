//! Default file-serving handler and its worker-side routine.
//!
//! The handler runs on the accept thread and does the minimum possible:
//! wrap the connection and path in a [`Job`] and enqueue it. A pool worker
//! picks the job up, resolves the path against the content source and
//! streams the file back over the connection it now owns.
use std::{io::Read, sync::Arc};

use log::{debug, warn};

use crate::{
    codec::Status,
    content::ContentSource,
    queue::JobQueue,
    server::{Context, HandlerError},
};

const SEND_BUFSIZE: usize = 4096;

/// Unit of deferred work: one connection plus the path it asked for.
/// Exactly one worker consumes a job; dropping it closes the connection.
#[derive(Debug)]
pub struct Job {
    pub context: Context,
    pub path: String,
}

/// Build the pool-backed request handler.
///
/// Ownership of the context moves into the job on enqueue. If the queue has
/// already shut down the job comes back, and the connection is answered
/// with `ERROR` and closed here rather than dropped silently.
pub fn pool_handler(
    queue: Arc<JobQueue<Job>>,
) -> impl FnMut(Context, &str) -> Result<(), HandlerError> + Send {
    move |context, path| {
        let job = Job {
            context,
            path: path.to_string(),
        };

        match queue.enqueue(job) {
            Ok(()) => Ok(()),
            Err(job) => {
                warn!("queue rejected {}; answering ERROR", job.path);
                let mut context = job.context;
                let _ = context.send_header(Status::Error, 0);
                context.abort();
                Err(HandlerError::Rejected)
            }
        }
    }
}

/// Serve one job to completion on a worker thread.
///
/// Every outcome is resolved here, towards the peer: missing content is
/// `FILE_NOT_FOUND`, a stat failure is `ERROR`, and a mid-body send failure
/// simply ends the transfer (the peer sees a premature close). The
/// connection is closed when the job ends, whatever happened.
pub(crate) fn serve_job<C>(job: Job, content: &C)
where
    C: ContentSource + ?Sized,
{
    let Job { mut context, path } = job;

    let mut file = match content.get(&path) {
        Some(file) => file,
        None => {
            debug!("{path}: not found");
            let _ = context.send_header(Status::FileNotFound, 0);
            context.abort();
            return;
        }
    };

    let filelen = match file.metadata() {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!("{path}: stat failed: {e}");
            let _ = context.send_header(Status::Error, 0);
            context.abort();
            return;
        }
    };

    if let Err(e) = context.send_header(Status::Ok, filelen) {
        debug!("{path}: header send failed: {e}");
        context.abort();
        return;
    }

    let mut buf = [0u8; SEND_BUFSIZE];
    let mut remaining = filelen;
    while remaining > 0 {
        let want = remaining.min(SEND_BUFSIZE as u64) as usize;
        let n = match file.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("{path}: read failed: {e}");
                break;
            }
        };

        if let Err(e) = context.send(&buf[..n]) {
            debug!("{path}: peer went away with {remaining} bytes left: {e}");
            break;
        }
        remaining -= n as u64;
    }

    context.abort();
}
