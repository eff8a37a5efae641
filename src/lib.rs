pub mod client;
pub mod codec;
pub mod content;
pub mod handler;
pub mod pool;
pub mod queue;
pub mod server;
pub mod workload;

pub use client::{ClientError, Transfer};
pub use codec::Status;
pub use content::{ContentMap, ContentSource};
pub use handler::{Job, pool_handler};
pub use pool::WorkerPool;
pub use queue::JobQueue;
pub use server::{Context, DEFAULT_MAX_PENDING, Handler, HandlerError, Server};
pub use workload::Workload;
