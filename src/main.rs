/*!
 * memstress - Interactive Memory Exhaustion Diagnostic
 *
 * Grows this process's memory footprint in controlled increments and
 * reports allocation rate, cumulative usage, and host-reported memory
 * around the point of exhaustion.
 */

use anyhow::Result;
use clap::Parser;
use memstress::{
    format_bytes, format_duration, format_rate, init_tracing, probe, LogSink, StressEngine,
    TestConfig, TestResult,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "memstress", about = "Grow memory usage in timed steps to find the limit")]
struct Args {
    /// Size of each allocation step, in MB
    #[arg(long, default_value_t = 100)]
    chunk_size_mb: u64,

    /// Stop once this much memory has been allocated, in MB
    #[arg(long, default_value_t = 4096)]
    target_mb: u64,

    /// Begin allocating immediately instead of waiting for `start`
    #[arg(long)]
    auto_start: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    info!("memstress starting...");

    let probe = probe::detect();
    let engine = Arc::new(
        StressEngine::new()
            .with_probe(probe)
            .with_sink(Arc::new(LogSink)),
    );

    let config = TestConfig::from_mb(args.chunk_size_mb, args.target_mb)?;
    info!(
        "Configured: {} chunks toward a {} target",
        format_bytes(config.chunk_size),
        format_bytes(config.target_limit)
    );

    if args.auto_start {
        engine.start(config)?;
    } else {
        println!("commands: start | stop | release | stats | quit");
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(input) => {
                        if !handle_command(&engine, config, input.trim()) {
                            break;
                        }
                    }
                    // stdin closed; keep an auto-started run alive until it finishes
                    None => {
                        if args.auto_start {
                            wait_for_run(&engine).await;
                        }
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
        }
    }

    if engine.is_running() {
        if let Some(result) = engine.stop(false) {
            print_result(&result);
        }
    }

    Ok(())
}

/// Execute one interactive command. Returns false when the session should
/// end.
fn handle_command(engine: &Arc<StressEngine>, config: TestConfig, command: &str) -> bool {
    match command {
        "start" => match engine.start(config) {
            Ok(()) => println!("test started"),
            Err(e) => warn!("cannot start: {}", e),
        },
        "stop" => match engine.stop(false) {
            Some(result) => print_result(&result),
            None => println!("no run to stop"),
        },
        "release" => {
            if engine.is_running() {
                warn!("releasing while the test is still allocating");
            }
            engine.release();
            println!("memory released - the runtime will reclaim it shortly");
        }
        "stats" => print_stats(engine),
        "quit" | "exit" => return false,
        "" => {}
        other => println!("unknown command: {other} (start | stop | release | stats | quit)"),
    }
    true
}

/// Block until an in-flight run stops on its own (completion or exhaustion).
async fn wait_for_run(engine: &Arc<StressEngine>) {
    while engine.is_running() {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    if let Some(result) = engine.last_result() {
        print_result(&result);
    }
}

fn print_stats(engine: &Arc<StressEngine>) {
    let stats = engine.snapshot();
    println!(
        "allocated: {}  rate: {}  elapsed: {}  progress: {:.1}%",
        format_bytes(stats.allocated_bytes),
        format_rate(stats.rate_bytes_per_sec),
        format_duration(stats.elapsed_ms),
        stats.progress_fraction * 100.0
    );
    if let Some(heap) = stats.host_heap {
        println!(
            "host: {} used / {} total",
            format_bytes(heap.used_bytes),
            format_bytes(heap.total_bytes)
        );
    }
    if let Some(result) = stats.last_result {
        print_result(&result);
    }
}

fn print_result(result: &TestResult) {
    if result.completed {
        println!(
            "test completed: {} allocated in {} ({} average)",
            format_bytes(result.total_allocated),
            format_duration(result.duration_ms),
            format_rate(result.average_rate)
        );
    } else {
        println!(
            "RAM limit hit: {} allocated before the host declined, after {}",
            format_bytes(result.total_allocated),
            format_duration(result.duration_ms)
        );
    }
    if let Ok(json) = serde_json::to_string(result) {
        println!("{json}");
    }
}
