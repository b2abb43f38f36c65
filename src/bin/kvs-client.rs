//! The kvs-client executable supports the following command line arguments:
//!
//! `kvs-client put <KEY> <VALUE> [--addr IP-PORT]`
//!
//!     Create or update a string key with a string value.
//!
//! `kvs-client get <KEY> [--addr IP-PORT]`
//!
//!     Get the string value of a given string key. Prints "Key not found" if it is missing.
//!
//! `kvs-client delete <KEY> [--addr IP-PORT]`
//!
//!     Remove a given string key. A missing key is treated as an error.
//!
//! `kvs-client exists <KEY> [--addr IP-PORT]`
//!
//!     Print whether the key is in the store.
//!
//! `kvs-client count [--addr IP-PORT]`
//!
//!     Print the number of keys in the store, using a data channel session.
//!
//! `kvs-client ctl <count|shutdown> [--control-addr IP-PORT]`
//!
//!     Send a command to the server's control channel and print the reply.
//!
//! --addr defaults to 127.0.0.1:4001 and --control-addr to 127.0.0.1:4000.
//! Print an error and return a non-zero exit code on server error, or if an address does not
//! parse.

use std::net::SocketAddr;
use std::process::exit;

use clap::{crate_version, App, Arg, ArgMatches, SubCommand};
use kvs::{control_request, KvsClient, KvsError, PutOutcome, Result};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_DATA_ADDRESS: &str = "127.0.0.1:4001";
const DEFAULT_CONTROL_ADDRESS: &str = "127.0.0.1:4000";

/// the request to run against the server
#[derive(Debug)]
enum Request {
    Get { key: String },
    Put { key: String, value: String },
    Delete { key: String },
    Exists { key: String },
    Count,
    Control { command: String },
}

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the server's ip:port for the request
    addr: SocketAddr,
    req: Request,
}

impl Opt {
    /// validates the `addr` parameter is a valid IP address and PORT
    /// # Errors
    /// returns [`KvsError::Parsing`] if the address is invalid
    fn build(addr: &str, req: Request) -> Result<Opt> {
        let addr: SocketAddr = addr.parse().map_err(|_| {
            KvsError::Parsing(format!("could not parse {} into an IP address and port", &addr))
        })?;
        Ok(Opt { addr, req })
    }
}

fn main() {
    // configure a subscriber that will log messages to STDERR
    subscriber_config();

    let key_arg = || Arg::with_name("KEY").required(true).index(1);
    let addr_arg = || {
        Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .help("sets the IP_ADDR:PORT of the server's data channel")
            .default_value(DEFAULT_DATA_ADDRESS)
    };

    let matches = App::new("kvs-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a client for the kvs key-value server")
        .subcommands(vec![
            SubCommand::with_name("put")
                .about("Set the value of a string key to a string")
                .arg(key_arg())
                .arg(Arg::with_name("VALUE").required(true).index(2))
                .arg(addr_arg()),
            SubCommand::with_name("get")
                .about("Get the string value of a given string key")
                .arg(key_arg())
                .arg(addr_arg()),
            SubCommand::with_name("delete")
                .about("Removes a given key")
                .arg(key_arg())
                .arg(addr_arg()),
            SubCommand::with_name("exists")
                .about("Checks whether a given key is in the store")
                .arg(key_arg())
                .arg(addr_arg()),
            SubCommand::with_name("count")
                .about("Prints the number of keys in the store")
                .arg(addr_arg()),
            SubCommand::with_name("ctl")
                .about("Sends 'count' or 'shutdown' to the control channel")
                .arg(Arg::with_name("COMMAND").required(true).index(1))
                .arg(Arg::with_name("control-addr")
                    .long("control-addr")
                    .value_name("IP_ADDR:PORT")
                    .help("sets the IP_ADDR:PORT of the server's control channel")
                    .default_value(DEFAULT_CONTROL_ADDRESS)),
        ])
        .get_matches();

    let result = parse_options(&matches).and_then(run);
    if let Err(e) = result {
        eprintln!("{}", e);
        exit(1);
    }
}

/// runs the specified request against the server at `opt.addr`
fn run(opt: Opt) -> Result<()> {
    debug!(?opt, "running request");
    if let Request::Control { command } = &opt.req {
        print!("{}", control_request(opt.addr, command)?);
        return Ok(());
    }

    let mut client = KvsClient::connect(opt.addr)?;
    match opt.req {
        Request::Get { key } => match client.get(&key)? {
            Some(value) => println!("{}", value),
            None => println!("Key not found"),
        },
        Request::Put { key, value } => match client.put(&key, &value)? {
            PutOutcome::Created => println!("created"),
            PutOutcome::Updated => println!("updated"),
        },
        Request::Delete { key } => client.delete(&key)?,
        Request::Exists { key } => println!("{}", client.exists(&key)?),
        Request::Count => println!("{}", client.count()?),
        Request::Control { .. } => {}
    }
    client.end()
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: &ArgMatches) -> Result<Opt> {
    let value = |args: &ArgMatches, name: &str| -> Result<String> {
        args.value_of(name)
            .map(String::from)
            .ok_or_else(|| KvsError::Parsing(format!("missing {}", name)))
    };

    let (name, args) = match matches.subcommand() {
        (name, Some(args)) => (name, args),
        _ => return Err(KvsError::Parsing(matches.usage().to_string())),
    };
    let req = match name {
        "put" => Request::Put { key: value(args, "KEY")?, value: value(args, "VALUE")? },
        "get" => Request::Get { key: value(args, "KEY")? },
        "delete" => Request::Delete { key: value(args, "KEY")? },
        "exists" => Request::Exists { key: value(args, "KEY")? },
        "count" => Request::Count,
        "ctl" => {
            let command = value(args, "COMMAND")?;
            return Opt::build(&value(args, "control-addr")?, Request::Control { command });
        }
        other => return Err(KvsError::Parsing(format!("unknown command {}", other))),
    };
    Opt::build(&value(args, "addr")?, req)
}

/// configures a tracing subscriber that will log warnings to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting tracing default subscriber failed: {}", e);
    }
}
