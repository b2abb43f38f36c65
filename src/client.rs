use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crate::engine::PutOutcome;
use crate::protocol::{self, LINE};
use crate::{KvsError, Result};

/// `KvsClient` holds one data channel session with a [`KvsServer`](crate::KvsServer).
///
/// [`connect`](KvsClient::connect) returns once a worker has picked up the connection and
/// sent its welcome banner, so it blocks while the server's queue is backed up.
pub struct KvsClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl KvsClient {
    /// creates a client and establishes a session with the data channel at the given `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let tcp_reader = TcpStream::connect(addr)?;
        let tcp_writer = tcp_reader.try_clone()?;
        let mut client = KvsClient {
            reader: BufReader::new(tcp_reader),
            writer: BufWriter::new(tcp_writer),
        };
        client.read_frame()?;
        Ok(client)
    }

    /// Sends one raw request `line` and returns the server's reply, without NUL padding.
    pub fn request(&mut self, line: &str) -> Result<String> {
        // every request is preceded by a prompt
        self.read_frame()?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.read_frame()
    }

    /// gets the value of the specified `key` from the server
    /// ## Returns
    /// `Ok<Some<String>>` if the value was found for the key.
    /// `Ok<None>` if there is no value associated with the key
    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        check_word(key)?;
        let reply = self.request(&format!("get {}", key))?;
        if reply == protocol::NO_SUCH_ITEM {
            Ok(None)
        } else {
            Ok(Some(reply))
        }
    }

    /// sets `key` to `value`, creating the key if needed
    /// # Errors
    /// `Err<KvsError::StringErr>` with the server's reply if the store rejected the request
    pub fn put(&mut self, key: &str, value: &str) -> Result<PutOutcome> {
        check_word(key)?;
        check_word(value)?;
        let reply = self.request(&format!("put {} {}", key, value))?;
        match reply.as_str() {
            protocol::ITEM_CREATED => Ok(PutOutcome::Created),
            protocol::ITEM_UPDATED => Ok(PutOutcome::Updated),
            _ => Err(KvsError::StringErr(reply)),
        }
    }

    /// removes a key and its associated value from the store
    /// # Errors
    /// `Err<KvsError::KeyNotFound>` if the key was not in the store
    pub fn delete(&mut self, key: &str) -> Result<()> {
        check_word(key)?;
        let reply = self.request(&format!("delete {}", key))?;
        match reply.as_str() {
            protocol::DELETE_OK => Ok(()),
            protocol::DELETE_FAILED => Err(KvsError::KeyNotFound),
            _ => Err(KvsError::StringErr(reply)),
        }
    }

    /// returns `true` if the `key` is in the store
    pub fn exists(&mut self, key: &str) -> Result<bool> {
        check_word(key)?;
        let reply = self.request(&format!("exists {}", key))?;
        match reply.as_str() {
            protocol::ITEM_EXISTS => Ok(true),
            protocol::ITEM_MISSING => Ok(false),
            _ => Err(KvsError::StringErr(reply)),
        }
    }

    /// the number of keys in the store
    pub fn count(&mut self) -> Result<usize> {
        let reply = self.request("count")?;
        reply
            .trim()
            .parse()
            .map_err(|_| KvsError::Parsing(format!("unexpected count reply: {:?}", reply)))
    }

    /// ends the session
    pub fn end(mut self) -> Result<()> {
        let reply = self.request("end")?;
        if reply == protocol::GOODBYE {
            Ok(())
        } else {
            Err(KvsError::StringErr(reply))
        }
    }

    fn read_frame(&mut self) -> Result<String> {
        protocol::read_frame(&mut self.reader)?
            .ok_or_else(|| KvsError::StringErr("the server closed the connection".to_string()))
    }
}

/// Sends one `command` to the control channel at `addr` and returns the reply, without NUL
/// padding.
pub fn control_request<A: ToSocketAddrs>(addr: A, command: &str) -> Result<String> {
    let mut tcp = TcpStream::connect(addr)?;
    tcp.write_all(command.as_bytes())?;
    tcp.write_all(b"\n")?;
    tcp.flush()?;
    protocol::read_frame(&mut tcp)?
        .ok_or_else(|| KvsError::StringErr("the server closed the connection".to_string()))
}

// keys and values travel as single whitespace separated words
fn check_word(word: &str) -> Result<()> {
    if word.is_empty() || word.len() >= LINE || word.chars().any(char::is_whitespace) {
        return Err(KvsError::Parsing(format!(
            "{:?} must be a single word shorter than {} bytes",
            word, LINE
        )));
    }
    Ok(())
}
