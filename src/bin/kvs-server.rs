//! this binary starts the kvs server
//! to see the list of options, type: `kvs-server --help`
//!
//! `kvs-server <CONTROL_PORT> <DATA_PORT> [--host IP] [--workers N] [--queue-size N] [--log-level LEVEL]`
//!
//!     Listen for control commands on CONTROL_PORT and for key/value sessions on DATA_PORT.
//!     Print a usage message and return a non-zero exit code if either port is missing or
//!     any option does not parse.

use std::net::IpAddr;
use std::process::exit;
use std::str::FromStr;

use clap::{crate_version, App, Arg, ArgMatches};
use kvs::config::{DEFAULT_QUEUE_SIZE, DEFAULT_WORKERS};
use kvs::{KvStore, KvsError, KvsServer, Result, ServerConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_LOG_LEVEL: &str = "info";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    config: ServerConfig,
    log_level: Level,
}

impl Opt {
    /// validates the command line values
    /// returns `Ok<Opt>` if everything is valid
    /// # Errors
    /// returns [`KvsError::Parsing`] if one of the parameters is invalid
    ///
    fn build(matches: &ArgMatches) -> Result<Opt> {
        let control_port: u16 = parse_arg(matches, "CONTROL_PORT")?;
        let data_port: u16 = parse_arg(matches, "DATA_PORT")?;
        let host: IpAddr = parse_arg(matches, "host")?;
        let workers: usize = parse_arg(matches, "workers")?;
        let queue_size: usize = parse_arg(matches, "queue-size")?;
        let log_level: Level = parse_arg(matches, "log-level")?;

        let config = ServerConfig::new(control_port, data_port)
            .with_host(host)
            .with_workers(workers)
            .with_queue_size(queue_size);
        config.validate()?;

        Ok(Opt { config, log_level })
    }
}

fn main() {
    let workers = DEFAULT_WORKERS.to_string();
    let queue_size = DEFAULT_QUEUE_SIZE.to_string();

    // parse command line args
    let matches = App::new("kvs-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a multi-threaded key-value server with separate control and data ports")
        .arg(Arg::with_name("CONTROL_PORT")
            .help("port that accepts the 'count' and 'shutdown' control commands")
            .required(true)
            .index(1))
        .arg(Arg::with_name("DATA_PORT")
            .help("port that accepts key/value sessions")
            .required(true)
            .index(2))
        .arg(Arg::with_name("host")
            .long("host")
            .value_name("IP_ADDR")
            .help("sets the IP address both ports listen on")
            .default_value(DEFAULT_HOST))
        .arg(Arg::with_name("workers")
            .long("workers")
            .value_name("N")
            .help("sets the number of worker threads")
            .default_value(&workers))
        .arg(Arg::with_name("queue-size")
            .long("queue-size")
            .value_name("N")
            .help("sets how many accepted connections may wait for a worker")
            .default_value(&queue_size))
        .arg(Arg::with_name("log-level")
            .long("log-level")
            .value_name("LEVEL")
            .help("one of: error, warn, info, debug, trace")
            .default_value(DEFAULT_LOG_LEVEL))
        .get_matches();

    // validate command line options, store them in Opt
    let opt = match Opt::build(&matches) {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}\n\n{}", err, matches.usage());
            exit(1);
        }
    };

    // set up a tracing subscriber to log to STDERR
    subscriber_config(opt.log_level);

    // start the server
    if let Err(e) = run(opt) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("kvs-server {}", env!("CARGO_PKG_VERSION"));
    info!(
        "{} workers, queue size {}",
        opt.config.workers, opt.config.queue_size
    );

    let server = KvsServer::bind(opt.config, KvStore::new())?;
    server.run()?;
    info!("kvs-server stopped");
    Ok(())
}

/// parses the value of the argument `name` into a `T`
fn parse_arg<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    let raw = matches
        .value_of(name)
        .ok_or_else(|| KvsError::Parsing(format!("missing value for {}", name)))?;
    raw.parse()
        .map_err(|_| KvsError::Parsing(format!("could not parse {} from {:?}", name, raw)))
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(level: Level) {
    let subscriber = FmtSubscriber::builder()
        // all spans/events at `level` or more severe will be written
        .with_max_level(level)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting tracing default subscriber failed: {}", e);
    }
}
