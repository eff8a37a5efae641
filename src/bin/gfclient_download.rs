use std::{
    error::Error,
    fs::{self, File},
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
    thread,
};

use clap::Parser;
use getfile::{JobQueue, Status, Transfer, Workload};

#[derive(Debug, Parser)]
#[command(version, about = "Workload-driven GETFILE download client")]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    /// Server port
    #[arg(short, long, default_value_t = 56726)]
    port: u16,

    /// Path to workload file
    #[arg(short, long, default_value = "workload.txt")]
    workload: PathBuf,

    /// Number of download threads
    #[arg(short = 't', long, default_value_t = 8)]
    nthreads: usize,

    /// Total number of requests
    #[arg(short, long, default_value_t = 16)]
    nrequests: usize,
}

/// One download: a request path and the local file it lands in.
struct Download {
    req_path: String,
    local_path: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let workload = Workload::load(&cli.workload)?;
    let queue = Arc::new(JobQueue::new());

    let downloaders = (0..cli.nthreads.max(1))
        .map(|_| {
            let queue = Arc::clone(&queue);
            let server = cli.server.clone();
            let port = cli.port;
            thread::spawn(move || {
                while let Some(download) = queue.dequeue() {
                    if let Err(e) = fetch(&server, port, &download) {
                        eprintln!("{}: {e}", download.req_path);
                    }
                }
            })
        })
        .collect::<Vec<_>>();

    for i in 0..cli.nrequests {
        let req_path = workload.next_path().to_string();
        let local_path = PathBuf::from(format!("{}-{i:06}", req_path.trim_start_matches('/')));

        // Queue never rejects before shutdown below.
        let _ = queue.enqueue(Download {
            req_path,
            local_path,
        });
    }

    // No more producers; workers drain the queue and exit.
    queue.shutdown();
    for downloader in downloaders {
        let _ = downloader.join();
    }

    Ok(())
}

/// Accounting for one completed download.
#[derive(Debug)]
struct Fetched {
    status: Status,
    filelen: u64,
    received: u64,
}

fn fetch(server: &str, port: u16, download: &Download) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = download.local_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(&download.local_path)?;

    println!("Requesting {server}{}", download.req_path);

    match stream_to(server, port, &download.req_path, &mut file) {
        Ok(fetched) => {
            println!("Status: {}", fetched.status);
            println!("Received {} of {} bytes", fetched.received, fetched.filelen);
            if fetched.status != Status::Ok {
                let _ = fs::remove_file(&download.local_path);
            }
            Ok(())
        }
        Err(e) => {
            // Incomplete or failed downloads leave no partial file behind.
            let _ = fs::remove_file(&download.local_path);
            Err(e)
        }
    }
}

/// Stream one request body into `out`. A failed local write fails the
/// download even when the transfer itself completed.
fn stream_to(
    server: &str,
    port: u16,
    req_path: &str,
    out: &mut dyn Write,
) -> Result<Fetched, Box<dyn Error>> {
    let mut write_err: Option<io::Error> = None;
    let mut transfer = Transfer::new(server, port, req_path).on_data(|chunk| {
        if write_err.is_none() {
            if let Err(e) = out.write_all(chunk) {
                write_err = Some(e);
            }
        }
    });
    let result = transfer.perform();

    let fetched = Fetched {
        status: transfer.status(),
        filelen: transfer.filelen(),
        received: transfer.bytes_received(),
    };
    drop(transfer);

    result?;
    if let Some(e) = write_err {
        return Err(e.into());
    }
    Ok(fetched)
}
