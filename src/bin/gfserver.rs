use std::{error::Error, path::PathBuf, process, sync::Arc, time::Duration};

use clap::Parser;
use getfile::{ContentMap, DEFAULT_MAX_PENDING, Server, WorkerPool, pool_handler};

#[derive(Debug, Parser)]
#[command(version, about = "Multithreaded GETFILE file server")]
struct Cli {
    /// Listen port
    #[arg(short, long, default_value_t = 56726)]
    port: u16,

    /// Number of worker threads
    #[arg(short = 't', long, default_value_t = 16)]
    nthreads: usize,

    /// Content file mapping request paths to local files
    #[arg(short = 'm', long, default_value = "content.txt")]
    content: PathBuf,

    /// Delay in each content lookup, in microseconds
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u64).range(0..=5_000_000))]
    delay: u64,

    /// Listen backlog for pending connections
    #[arg(long, default_value_t = DEFAULT_MAX_PENDING)]
    max_pending: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();

    ctrlc::set_handler(|| process::exit(0))?;

    let content = ContentMap::load(&cli.content)?.with_delay(Duration::from_micros(cli.delay));
    let pool = WorkerPool::start(cli.nthreads, Arc::new(content));

    let server =
        Server::new(cli.port, pool_handler(pool.queue())).max_pending(cli.max_pending);
    server.serve()?;

    Ok(())
}
