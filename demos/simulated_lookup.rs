//! Run lookups over an in-memory network and print how they went.
//!
//! Run: `cargo run --example simulated_lookup -- --size 2000 --fanout 3`

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use histo::Histogram;
use kad_search::{Config, Id, KadSearch, SearchStatus, Testnet};
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of nodes in the simulated network
    #[arg(long, default_value_t = 1000)]
    size: usize,
    /// Number of closest nodes to collect
    #[arg(long, default_value_t = 20)]
    closest: usize,
    /// Number of concurrent workers per lookup
    #[arg(long, default_value_t = 3)]
    fanout: usize,
    /// Number of lookups to run
    #[arg(long, default_value_t = 20)]
    lookups: usize,
    /// Percentage of nodes that never answer
    #[arg(long, default_value_t = 0)]
    unreachable: usize,
    /// Simulated latency of every network call, in milliseconds
    #[arg(long, default_value_t = 5)]
    latency: u64,
    /// Look up existing node Ids instead of random targets
    #[arg(long)]
    existing: bool,
    /// Log every search step
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .init();

    if cli.size == 0 {
        eprintln!("The network needs at least one node");
        return;
    }

    let testnet = Testnet::new(cli.size);
    let down = cli.size * cli.unreachable.min(100) / 100;
    let unreachable = testnet.nodes().iter().skip(1).take(down).copied().collect::<Vec<_>>();
    let testnet = Arc::new(
        testnet
            .with_unreachable(&unreachable)
            .with_latency(Duration::from_millis(cli.latency)),
    );

    println!(
        "Network of {} nodes ({} unreachable), {} lookups\n",
        cli.size,
        unreachable.len(),
        cli.lookups
    );

    let mut latency = Histogram::with_buckets(10);
    let mut contacts = Histogram::with_buckets(10);
    let mut found = 0;
    let mut optimal = 0;

    for i in 0..cli.lookups {
        let target = if cli.existing {
            testnet.nodes()[(1 + i * 7919) % cli.size].id
        } else {
            Id::random()
        };

        let config = Config {
            closest: cli.closest,
            fanout: cli.fanout,
            ..Default::default()
        };

        let mut search = match KadSearch::new(testnet.clone(), target, config) {
            Ok(search) => search,
            Err(error) => {
                eprintln!("Invalid lookup: {}", error);
                return;
            }
        };

        let start = Instant::now();
        let lookup = match search.find(Some(Duration::from_secs(30))) {
            Ok(lookup) => lookup,
            Err(error) => {
                eprintln!("Lookup failed to start: {}", error);
                return;
            }
        };
        let elapsed = start.elapsed();

        let stats = search.stats();
        latency.add(elapsed.as_millis() as u64);
        contacts.add((stats.contacted + stats.failed) as u64);

        if lookup.status() == SearchStatus::Done {
            found += 1;
        }
        if lookup.nodes().first().map(|node| node.id)
            == testnet.closest(&target, 1).first().map(|node| node.id)
        {
            optimal += 1;
        }

        println!(
            "{:>3} {} {:?} in {:?}, {} results, {:?}",
            i,
            target,
            lookup.status(),
            elapsed,
            lookup.nodes().len(),
            stats
        );
    }

    println!("\nExact target found: {}/{}", found, cli.lookups);
    println!("Closest node found: {}/{}", optimal, cli.lookups);
    println!("\nLookup latency (ms):\n{}", latency);
    println!("Nodes contacted per lookup:\n{}", contacts);
}
