//! flashwire - Echo Server
//!
//! This is the demo entry point for the flashwire engine.
//! It accepts TCP connections and drives one engine per connection, echoing
//! everything it receives.

use flashwire::connection::{
    BasicContext, ConnectionEngine, EngineConfig, HandlerPriority, HeartbeatListener,
    NetworkStatsListener, StepOutcome, TcpChannel, ThreadingStrategy,
};
use flashwire::handlers::EchoHandler;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long an idle connection task sleeps before stepping again
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Flush pending output on every step
    fair: bool,
    /// Heartbeat timeout; zero disables it
    heartbeat: Duration,
    /// Scheduling class requested by every connection
    threading: ThreadingStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: flashwire::DEFAULT_HOST.to_string(),
            port: flashwire::DEFAULT_PORT,
            fair: false,
            heartbeat: Duration::ZERO,
            threading: ThreadingStrategy::SingleThreaded,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = value_of(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = value_of(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--heartbeat-ms" => {
                    let millis = value_of(&args, i, "--heartbeat-ms")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid heartbeat timeout");
                            std::process::exit(1);
                        });
                    config.heartbeat = Duration::from_millis(millis);
                    i += 2;
                }
                "--threading" => {
                    config.threading = match value_of(&args, i, "--threading") {
                        "single" => ThreadingStrategy::SingleThreaded,
                        "concurrent" => ThreadingStrategy::Concurrent,
                        "busy" => ThreadingStrategy::MultiThreadedBusyWaiting,
                        other => {
                            eprintln!("Error: unknown threading strategy '{}'", other);
                            std::process::exit(1);
                        }
                    };
                    i += 2;
                }
                "--fair" => {
                    config.fair = true;
                    i += 1;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("flashwire version {}", flashwire::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn value_of<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
flashwire - Non-Blocking TCP Connection Engine (echo server)

USAGE:
    flashwire [OPTIONS]

OPTIONS:
    -h, --host <HOST>           Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>           Port to listen on (default: 7878)
        --fair                  Flush pending output on every step
        --heartbeat-ms <MS>     Drop connections silent for longer than this
        --threading <MODE>      single | concurrent | busy (default: single)
    -v, --version               Print version information
        --help                  Print this help message

ENVIRONMENT:
    FLASHWIRE_TCP_BUFFER            Socket buffer size in bytes (default: 65536)
    FLASHWIRE_DISABLE_TCP_NODELAY   Leave Nagle's algorithm on
    FLASHWIRE_MONITOR_SECS          Statistics window in seconds (default: 10)
    RUST_LOG                        Log filter (default: info)

EXAMPLES:
    flashwire                          # Start on 127.0.0.1:7878
    flashwire --port 9000 --fair       # Fair flushing on port 9000
    flashwire --heartbeat-ms 5000      # Drop peers silent for 5s

CONNECTING:
    $ nc 127.0.0.1 7878
    hello
    hello
"#
    );
}

/// Reports network statistics through the log.
struct LoggingStats {
    peer: SocketAddr,
}

impl NetworkStatsListener for LoggingStats {
    fn on_network_stats(&self, write_rate: u64, read_rate: u64, poll_rate: u64) {
        info!(peer = %self.peer, write_rate, read_rate, poll_rate, "Connection throughput");
    }
}

/// Reports dead or failed connections through the log.
struct LoggingHeartbeat {
    peer: SocketAddr,
}

impl HeartbeatListener for LoggingHeartbeat {
    fn on_missed_heartbeat(&self) {
        warn!(peer = %self.peer, "Missed heartbeat");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Socket options are process-wide and read once
    let engine_config = Arc::new(EngineConfig::from_env()?);
    info!(
        tcp_buffer = engine_config.tcp_buffer_size,
        nodelay = !engine_config.disable_tcp_nodelay,
        "Engine configuration loaded"
    );

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(
        "flashwire v{} listening on {}",
        flashwire::VERSION,
        config.bind_address()
    );

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, &config, engine_config) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: TcpListener, config: &Config, engine_config: Arc<EngineConfig>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = start_connection(stream, addr, config, &engine_config) {
                    error!("Failed to set up connection from {}: {}", addr, e);
                }
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

fn start_connection(
    stream: tokio::net::TcpStream,
    addr: SocketAddr,
    config: &Config,
    engine_config: &EngineConfig,
) -> anyhow::Result<()> {
    let channel = TcpChannel::new(stream.into_std()?)?;
    let context = BasicContext::new()
        .with_heartbeat_timeout(config.heartbeat)
        .with_threading_strategy(config.threading)
        .with_heartbeat_listener(Arc::new(LoggingHeartbeat { peer: addr }))
        .with_stats_listener(Arc::new(LoggingStats { peer: addr }));

    let engine =
        ConnectionEngine::with_fairness(channel, Box::new(context), engine_config, config.fair);
    engine.set_handler(Box::new(EchoHandler::new()));
    info!("Client connected: {}", addr);

    match engine.priority() {
        HandlerPriority::Blocking => {
            // busy-waiting connections get a thread of their own
            tokio::task::spawn_blocking(move || {
                loop {
                    match engine.step() {
                        Ok(StepOutcome::Busy) => {}
                        Ok(StepOutcome::Idle) => std::hint::spin_loop(),
                        Err(e) => {
                            debug!(peer = %addr, kind = ?e.kind(), "Connection finished: {}", e);
                            break;
                        }
                    }
                }
                info!("Client disconnected: {}", addr);
            });
        }
        HandlerPriority::Medium | HandlerPriority::Concurrent => {
            tokio::spawn(async move {
                loop {
                    match engine.step() {
                        Ok(StepOutcome::Busy) => tokio::task::yield_now().await,
                        Ok(StepOutcome::Idle) => tokio::time::sleep(IDLE_BACKOFF).await,
                        Err(e) => {
                            debug!(peer = %addr, kind = ?e.kind(), "Connection finished: {}", e);
                            break;
                        }
                    }
                }
                info!("Client disconnected: {}", addr);
            });
        }
    }

    Ok(())
}
