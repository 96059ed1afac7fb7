use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use rtp2http::{
    config::{DEFAULT_INTERFACE, DEFAULT_QUEUE_CAPACITY},
    RelayConfig, RelayContext, RelayInfoBridge, RelayServer,
};
use std::net::{IpAddr, SocketAddr};
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let args = RelayArgs::parse();
    init_logger(&args.loglevel);

    let config = RelayConfig::new(&args.net, &args.timeout, args.queue_capacity)?;
    let bind_addr = SocketAddr::new(args.addr, args.port);

    let mut bridge = RelayInfoBridge::new();
    if args.report_events {
        bridge.set_listener(|json| println!("{json}"));
    }
    let shutdown = CancellationToken::new();
    let relay = RelayContext::new(bridge, shutdown.clone());

    info!(
        "relaying multicast on {} (presence timeout {:?}, queue {})",
        config.interface, config.presence_timeout, config.queue_capacity
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("rtp2http")
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("stopping, closing all sessions"),
                Err(e) => error!("failed to listen for ctrl-c: {}", e),
            }
            shutdown.cancel();
        });

        RelayServer::new(bind_addr, config, relay).serve().await
    })
}

fn init_logger(level: &str) {
    let level = match level {
        "T" => LevelFilter::Trace,
        "D" => LevelFilter::Debug,
        "W" => LevelFilter::Warn,
        "E" => LevelFilter::Error,
        _ => LevelFilter::Info,
    };

    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct RelayArgs {
    /// Network interface (name or IPv4 address) to receive multicast on
    #[arg(short = 'n', long, default_value = DEFAULT_INTERFACE)]
    net: String,

    /// Address the HTTP server binds to
    #[arg(short = 'a', long, default_value = "0.0.0.0")]
    addr: IpAddr,

    /// Port the HTTP server listens on
    #[arg(short = 'p', long, default_value_t = 5566)]
    port: u16,

    /// How long to wait for the first RTP packet, e.g. 30s, 500ms, 1m30s
    #[arg(short = 't', long, default_value = "30s")]
    timeout: String,

    /// Datagrams buffered per session between socket and client
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Print session state/traffic reports as JSON lines on stdout
    #[arg(long)]
    report_events: bool,

    /// Log level: T, D, I, W or E
    #[arg(short = 'l', long, default_value = "I",
        value_parser = clap::builder::PossibleValuesParser::new(["T", "D", "I", "W", "E"]))]
    loglevel: String,
}
