use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use clap::{ArgAction, Parser};
use clap_derive::Parser;
use streambench::config::{build_runtime, SendStrategy, StreamConfig, DEFAULT_HEADER_SIZE, DEFAULT_PACKETS_PER_GROUP, DEFAULT_PAYLOAD_SIZE};
use streambench::server::serve;
use streambench::shutdown::ShutdownToken;
use tracing::{info, Level};

/// Streams an endless sequence of fixed size "video packets" to each client that connects, to
///  compare the throughput of different ways of writing them to the socket.
///
/// Examples:
///   streambench-server 1985 true
///   streambench-server 1985 false true
///   streambench-server 1985 false false
#[derive(Parser)]
#[clap(version, verbatim_doc_comment)]
struct Args {
    /// the tcp listen port
    port: u16,

    /// whether to send each group with a single vectored write (writev): true or false
    #[clap(action = ArgAction::Set)]
    use_vectored: bool,

    /// for regular (not vectored) writes: whether to write each header and payload separately
    ///  instead of copying a group into one big buffer
    #[clap(action = ArgAction::Set, default_value_t = false)]
    write_one_by_one: bool,

    #[clap(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    #[clap(long, default_value_t = DEFAULT_PACKETS_PER_GROUP)]
    packets_per_group: usize,

    #[clap(long, default_value_t = DEFAULT_HEADER_SIZE)]
    header_size: usize,

    #[clap(long, default_value_t = DEFAULT_PAYLOAD_SIZE)]
    payload_size: usize,

    /// 1 keeps all work on a single core, which is what the benchmark is designed for
    #[clap(long, default_value_t = 1)]
    worker_threads: usize,

    /// close connections with a regular FIN handshake instead of setting SO_LINGER to 0
    #[clap(long, default_value_t = false)]
    keep_linger: bool,

    /// run without signal handling, until the process is killed
    #[clap(long, default_value_t = false)]
    ignore_signals: bool,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

impl Args {
    fn to_config(&self) -> StreamConfig {
        let mut config = StreamConfig::new(
            SocketAddr::new(self.bind, self.port),
            SendStrategy::from_flags(self.use_vectored, self.write_one_by_one),
        );
        config.packets_per_group = self.packets_per_group;
        config.header_size = self.header_size;
        config.payload_size = self.payload_size;
        config.worker_threads = self.worker_threads;
        config.linger_zero = !self.keep_linger;
        config.handle_signals = !self.ignore_signals;
        config
    }
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

    let config = args.to_config();
    config.validate()?;

    info!("streaming server: listen at tcp://{}, strategy {:?}, {} worker thread(s)", config.listen_addr, config.strategy, config.worker_threads);
    info!("{} packets of {} + {} bytes per group", config.packets_per_group, config.header_size, config.payload_size);

    let runtime = build_runtime(config.worker_threads)?;
    runtime.block_on(serve(config, ShutdownToken::new()))?;

    info!("server stopped");
    Ok(())
}
