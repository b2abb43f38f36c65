//! The line oriented text protocol spoken on the control and data channels.
//!
//! Clients send one command per line. Everything the server writes is a fixed size frame of
//! [`LINE`] bytes: the message, truncated to `LINE` bytes and padded with NUL bytes.
use std::io::{self, BufRead, Read, Write};

/// size, in bytes, of every frame written by the server and the longest accepted request line
pub const LINE: usize = 255;

/// sent once when a worker picks up a data connection
pub const WELCOME: &str = "Welcome to the KV store.\n";
/// sent before every data channel request
pub const PROMPT: &str = "\nPlease enter a command > ";
/// sent in reply to `end`, before the connection is closed
pub const GOODBYE: &str = "Goodbye\n";

/// `get` on a missing key
pub const NO_SUCH_ITEM: &str = "No such item.";
/// `put` created a new key
pub const ITEM_CREATED: &str = "Item succesfully created";
/// `put` replaced the value of an existing key
pub const ITEM_UPDATED: &str = "Key sucsessfully updated";
/// the store could not create the key
pub const CREATE_FAILED: &str = "Error creating item";
/// the store could not update the key
pub const UPDATE_FAILED: &str = "Error updating item";
/// `delete` removed the key
pub const DELETE_OK: &str = "Delete successful";
/// `delete` on a missing key
pub const DELETE_FAILED: &str = "Deletion error occured";
/// `exists` found the key
pub const ITEM_EXISTS: &str = "Item exists";
/// `exists` did not find the key
pub const ITEM_MISSING: &str = "Item doesn't exist";
/// request line longer than [`LINE`]
pub const LINE_TOO_LONG: &str = "Error, line is too long";
/// unrecognized command word
pub const INVALID_COMMAND: &str = "Error, invalid command: use get, put, count, exists";
/// a command was given more arguments than it takes
pub const TOO_MANY_PARAMS: &str = "Error, too many parameters";
/// a command was given fewer arguments than it needs
pub const TOO_FEW_PARAMS: &str = "Error, too few parameters";

/// control channel reply to anything but `count` or `shutdown`
pub const CONTROL_ERROR: &str = "Error\n";
/// control channel reply to `shutdown`
pub const SHUTTING_DOWN: &str = "Shutting down\n";

/// A request received on the data channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataCommand {
    /// get the value of a key
    Get {
        /// the key to look up
        key: String,
    },
    /// create or update a key
    Put {
        /// the key to set
        key: String,
        /// the value to set
        value: String,
    },
    /// remove a key
    Delete {
        /// the key to remove
        key: String,
    },
    /// check whether a key is present
    Exists {
        /// the key to check
        key: String,
    },
    /// number of keys in the store
    Count,
    /// close the session
    End,
    /// the request line was longer than [`LINE`]
    LineTooLong,
    /// a known command was given more arguments than it takes
    TooManyParams,
    /// a known command was given fewer arguments than it needs
    TooFewParams,
    /// the command word was not recognized
    Invalid,
}

impl DataCommand {
    /// Parses one request line (without its line terminator).
    ///
    /// An empty line ends the session, the same as `end`.
    pub fn parse(line: &str) -> DataCommand {
        if line.len() > LINE {
            return DataCommand::LineTooLong;
        }
        let mut words = line.split_whitespace();
        let cmd = match words.next() {
            Some(cmd) => cmd,
            None => return DataCommand::End,
        };
        let args: Vec<&str> = words.collect();

        let arity = match cmd {
            "get" | "delete" | "exists" => 1,
            "put" => 2,
            "count" | "end" => 0,
            _ => return DataCommand::Invalid,
        };
        if args.len() > arity {
            return DataCommand::TooManyParams;
        }
        if args.len() < arity {
            return DataCommand::TooFewParams;
        }

        match (cmd, args.as_slice()) {
            ("get", [key]) => DataCommand::Get { key: key.to_string() },
            ("delete", [key]) => DataCommand::Delete { key: key.to_string() },
            ("exists", [key]) => DataCommand::Exists { key: key.to_string() },
            ("put", [key, value]) => DataCommand::Put {
                key: key.to_string(),
                value: value.to_string(),
            },
            ("count", []) => DataCommand::Count,
            ("end", []) => DataCommand::End,
            _ => DataCommand::Invalid,
        }
    }
}

/// A request received on the control channel
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// report the number of keys in the store
    Count,
    /// stop accepting connections and stop the workers
    Shutdown,
    /// anything else
    Error,
}

impl ControlCommand {
    /// parses one control line; surrounding whitespace is ignored
    pub fn parse(line: &str) -> ControlCommand {
        match line.trim() {
            "count" => ControlCommand::Count,
            "shutdown" => ControlCommand::Shutdown,
            _ => ControlCommand::Error,
        }
    }
}

/// the control channel reply to `count`
pub fn control_count_reply(count: usize) -> String {
    format!("{}  \n", count)
}

/// One line read from a client
#[derive(Debug, PartialEq, Eq)]
pub enum RequestLine {
    /// a complete line, with the `\r\n` or `\n` terminator removed
    Text(String),
    /// the line exceeded the maximum length; the remainder was discarded
    TooLong,
}

/// Reads one line of at most `max` bytes from `reader`.
///
/// Returns `Ok(None)` at end of stream. A line longer than `max`, not counting its `\r\n`
/// or `\n` terminator, is consumed up to and including its newline and reported as
/// [`RequestLine::TooLong`]. Bytes that are not valid UTF-8 are replaced.
pub fn read_request_line<R: BufRead>(reader: &mut R, max: usize) -> io::Result<Option<RequestLine>> {
    // room for the line plus a `\r\n` terminator
    let limit = max + 2;
    let mut buf = Vec::with_capacity(limit);
    let n = reader
        .by_ref()
        .take(limit as u64)
        .read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') && buf.len() == limit {
        skip_line(reader)?;
        return Ok(Some(RequestLine::TooLong));
    }

    let text = String::from_utf8_lossy(&buf);
    let text = text.trim_end_matches(&['\r', '\n'][..]);
    if text.len() > max {
        return Ok(Some(RequestLine::TooLong));
    }
    Ok(Some(RequestLine::Text(text.to_string())))
}

// consumes input up to and including the next newline, or until end of stream
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let (found, used) = {
            let available = reader.fill_buf()?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, available.len()),
            }
        };
        reader.consume(used);
        if found {
            return Ok(());
        }
    }
}

/// writes `msg` as a single frame of exactly [`LINE`] bytes and flushes the writer
pub fn write_frame<W: Write>(writer: &mut W, msg: &str) -> io::Result<()> {
    let mut frame = [0u8; LINE];
    let bytes = msg.as_bytes();
    let len = bytes.len().min(LINE);
    frame[..len].copy_from_slice(&bytes[..len]);
    writer.write_all(&frame)?;
    writer.flush()
}

/// Reads one frame of exactly [`LINE`] bytes and returns its text without the NUL padding.
///
/// Returns `Ok(None)` if the stream ended before a new frame started.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<String>> {
    let mut frame = [0u8; LINE];
    let mut filled = 0;
    while filled < LINE {
        match reader.read(&mut frame[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated frame")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    let end = frame.iter().position(|b| *b == 0).unwrap_or(LINE);
    Ok(Some(String::from_utf8_lossy(&frame[..end]).into_owned()))
}
