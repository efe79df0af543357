use clap::Parser;
use futures::StreamExt;
use hoptrace::{resolver, TraceOptions, Tracer};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Simple example to show traceroute capabilities
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// IPv4 address to trace the route to
    destination: String,
    /// Maximum number of hops
    #[arg(short, long, default_value_t = 30)]
    max_hops: u8,
    /// Per attempt timeout in milliseconds
    #[arg(short, long, default_value_t = 500)]
    timeout: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let options = Arc::new(
        TraceOptions::new(&args.destination)
            .with_max_hops(args.max_hops)
            .with_timeout(Duration::from_millis(args.timeout)),
    );

    let watcher = {
        let options = Arc::clone(&options);
        tokio::spawn(async move {
            if let Some(mut hops) = options.subscribe().await {
                while let Some(hop) = hops.next().await {
                    println!("{}", hop);
                }
            }
        })
    };

    let hops = Tracer::system()
        .run(&options)
        .await
        .into_result()
        .unwrap();
    watcher.await.unwrap();

    resolver::wait_all(&hops).await;
    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "Resolved route:").unwrap();
        for hop in &hops {
            writeln!(stdout, "{}", hop).unwrap();
        }
    }
}
