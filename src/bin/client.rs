use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use clap::Parser;
use clap_derive::Parser;
use streambench::client::run_client;
use streambench::config::{build_runtime, ClientConfig};
use streambench::shutdown::ShutdownToken;
use tracing::Level;

/// Connects to a streaming server, reads and discards everything it sends, and reports the
///  bandwidth when the connection ends.
#[derive(Parser)]
#[clap(version)]
struct Args {
    /// the tcp port to connect to
    port: u16,

    #[clap(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    host: IpAddr,

    #[clap(long, default_value_t = 65535)]
    read_buffer_size: usize,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

pub fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut config = ClientConfig::new(SocketAddr::new(args.host, args.port));
    config.read_buffer_size = args.read_buffer_size;

    let runtime = build_runtime(1)?;
    runtime.block_on(run_client(&config, ShutdownToken::new()))?;
    Ok(())
}
