//! Per-connection request handling for both channels.
//!
//! [`serve`] runs a whole data channel session on a worker thread. [`serve_control`] answers
//! the single request of a control connection on the dispatcher thread.
use std::borrow::Cow;
use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::engine::{KvsEngine, PutOutcome};
use crate::error::{KvsError, Result};
use crate::protocol::{self, ControlCommand, DataCommand, RequestLine, LINE};

// a control client that connects but never sends a line must not stall the dispatcher forever
const CONTROL_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// The reply to one data channel request
#[derive(Debug, PartialEq, Eq)]
pub struct Reply {
    /// the text written back to the client
    pub text: Cow<'static, str>,
    /// `true` if the session ends after this reply
    pub close: bool,
}

impl Reply {
    fn new(text: impl Into<Cow<'static, str>>) -> Self {
        Reply {
            text: text.into(),
            close: false,
        }
    }

    fn closing(text: &'static str) -> Self {
        Reply {
            text: Cow::Borrowed(text),
            close: true,
        }
    }
}

/// Executes one parsed data channel `command` against the `engine`.
///
/// Store errors never escape this function; they become the fixed error reply of the
/// command that failed.
pub fn execute<E: KvsEngine>(engine: &E, command: DataCommand) -> Reply {
    match command {
        DataCommand::Get { key } => match engine.get(&key) {
            Some(value) => Reply::new(value),
            None => Reply::new(protocol::NO_SUCH_ITEM),
        },
        DataCommand::Put { key, value } => match engine.put(key, value) {
            Ok(PutOutcome::Created) => Reply::new(protocol::ITEM_CREATED),
            Ok(PutOutcome::Updated) => Reply::new(protocol::ITEM_UPDATED),
            // the key was seen as present but vanished before its update
            Err(KvsError::KeyNotFound) => Reply::new(protocol::UPDATE_FAILED),
            Err(e) => {
                warn!("put failed: {}", e);
                Reply::new(protocol::CREATE_FAILED)
            }
        },
        DataCommand::Delete { key } => match engine.remove(&key) {
            Ok(()) => Reply::new(protocol::DELETE_OK),
            Err(_) => Reply::new(protocol::DELETE_FAILED),
        },
        DataCommand::Exists { key } => {
            if engine.exists(&key) {
                Reply::new(protocol::ITEM_EXISTS)
            } else {
                Reply::new(protocol::ITEM_MISSING)
            }
        }
        DataCommand::Count => Reply::new(engine.count().to_string()),
        DataCommand::End => Reply::closing(protocol::GOODBYE),
        DataCommand::LineTooLong => Reply::new(protocol::LINE_TOO_LONG),
        DataCommand::TooManyParams => Reply::new(protocol::TOO_MANY_PARAMS),
        DataCommand::TooFewParams => Reply::new(protocol::TOO_FEW_PARAMS),
        DataCommand::Invalid => Reply::new(protocol::INVALID_COMMAND),
    }
}

/// Runs the request/response loop of one data channel connection until the client sends
/// `end`, disconnects, or a read fails.
///
/// # Errors
/// returns an IO error if a response could not be written to the client
#[instrument(skip(engine, tcp))]
pub fn serve<E: KvsEngine>(engine: &E, tcp: TcpStream) -> Result<()> {
    let peer_addr = tcp.peer_addr()?;
    let mut reader = BufReader::new(&tcp);
    let mut writer = BufWriter::new(&tcp);
    debug!("session started for {}", peer_addr);

    protocol::write_frame(&mut writer, protocol::WELCOME)?;
    loop {
        protocol::write_frame(&mut writer, protocol::PROMPT)?;

        let command = match protocol::read_request_line(&mut reader, LINE) {
            Ok(Some(RequestLine::Text(line))) => DataCommand::parse(&line),
            Ok(Some(RequestLine::TooLong)) => DataCommand::LineTooLong,
            Ok(None) => {
                debug!("{} disconnected", peer_addr);
                break;
            }
            Err(e) => {
                debug!("read from {} failed, ending session: {}", peer_addr, e);
                break;
            }
        };
        debug!("Receive request from {}: {:?}", peer_addr, command);

        let reply = execute(engine, command);
        protocol::write_frame(&mut writer, &reply.text)?;
        if reply.close {
            break;
        }
    }
    debug!("session ended for {}", peer_addr);
    Ok(())
}

/// Reads the single request of a control connection and answers it.
///
/// Returns the command that was received so the caller can act on a shutdown. A failure to
/// read the request is answered like an unrecognized command, and a failure to write the
/// reply is only logged: neither may take the dispatcher down.
#[instrument(skip(engine, tcp))]
pub fn serve_control<E: KvsEngine>(engine: &E, tcp: TcpStream) -> ControlCommand {
    if let Err(e) = tcp.set_read_timeout(Some(CONTROL_READ_TIMEOUT)) {
        warn!("could not set control read timeout: {}", e);
    }
    let mut reader = BufReader::new(&tcp);
    let command = match protocol::read_request_line(&mut reader, LINE) {
        Ok(Some(RequestLine::Text(line))) => ControlCommand::parse(&line),
        Ok(_) => ControlCommand::Error,
        Err(e) => {
            warn!("could not read control request: {}", e);
            ControlCommand::Error
        }
    };
    debug!(?command, "control request");

    let reply = match command {
        ControlCommand::Count => Cow::Owned(protocol::control_count_reply(engine.count())),
        ControlCommand::Shutdown => Cow::Borrowed(protocol::SHUTTING_DOWN),
        ControlCommand::Error => Cow::Borrowed(protocol::CONTROL_ERROR),
    };
    let mut writer = BufWriter::new(&tcp);
    if let Err(e) = protocol::write_frame(&mut writer, &reply) {
        warn!("could not write control reply: {}", e);
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::KvStore;

    fn run(engine: &KvStore, line: &str) -> Reply {
        execute(engine, DataCommand::parse(line))
    }

    #[test]
    fn put_reports_create_then_update() {
        let engine = KvStore::new();
        assert_eq!(run(&engine, "put foo bar").text, protocol::ITEM_CREATED);
        assert_eq!(run(&engine, "put foo baz").text, protocol::ITEM_UPDATED);
        assert_eq!(run(&engine, "get foo").text, "baz");
    }

    #[test]
    fn lookups_on_missing_keys() {
        let engine = KvStore::new();
        assert_eq!(run(&engine, "get nope").text, protocol::NO_SUCH_ITEM);
        assert_eq!(run(&engine, "exists nope").text, protocol::ITEM_MISSING);
        assert_eq!(run(&engine, "delete nope").text, protocol::DELETE_FAILED);
    }

    #[test]
    fn delete_then_exists_reports_absent() {
        let engine = KvStore::new();
        run(&engine, "put k v");
        assert_eq!(run(&engine, "exists k").text, protocol::ITEM_EXISTS);
        assert_eq!(run(&engine, "delete k").text, protocol::DELETE_OK);
        assert_eq!(run(&engine, "exists k").text, protocol::ITEM_MISSING);
    }

    #[test]
    fn count_is_decimal() {
        let engine = KvStore::new();
        for i in 0..12 {
            run(&engine, &format!("put k{} v", i));
        }
        assert_eq!(run(&engine, "count").text, "12");
    }

    #[test]
    fn only_end_closes_the_session() {
        let engine = KvStore::new();
        let end = run(&engine, "end");
        assert!(end.close);
        assert_eq!(end.text, protocol::GOODBYE);
        assert!(run(&engine, "").close);
        for line in &["get", "get a b", "bogus", "count"] {
            assert!(!run(&engine, line).close, "{} closed the session", line);
        }
    }

    #[test]
    fn malformed_requests_get_distinct_replies() {
        let engine = KvStore::new();
        let replies = vec![
            run(&engine, "put a").text,
            run(&engine, "put a b c").text,
            run(&engine, "remove a").text,
            execute(&engine, DataCommand::LineTooLong).text,
        ];
        assert_eq!(
            replies,
            vec![
                protocol::TOO_FEW_PARAMS,
                protocol::TOO_MANY_PARAMS,
                protocol::INVALID_COMMAND,
                protocol::LINE_TOO_LONG,
            ]
        );
    }
}
