//! Minimal Redis-protocol server for tests.
//!
//! Answers `PING` with `PONG`, `GET <key>` with a fixed bulk string, `INCR`
//! with an integer and anything else (connection setup included) with `OK`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

/// A background server bound to a random localhost port.
pub struct FakeKvServer {
    addr: SocketAddr,
}

impl FakeKvServer {
    /// Starts a server replying `get_reply` to every `GET`.
    pub fn start(get_reply: impl Into<String>) -> Self {
        let reply = get_reply.into();
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake kv server");
        let addr = listener.local_addr().expect("fake kv server address");
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let reply = reply.clone();
                thread::spawn(move || serve(stream, &reply));
            }
        });
        Self { addr }
    }

    pub fn uri(&self) -> String {
        format!("redis://{}/0", self.addr)
    }
}

fn serve(stream: TcpStream, get_reply: &str) {
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);
    let mut writer = stream;
    while let Some(args) = read_command(&mut reader) {
        let name = args.first().map(|a| a.to_ascii_uppercase()).unwrap_or_default();
        let response = match name.as_str() {
            "PING" => "+PONG\r\n".to_string(),
            "GET" => format!("${}\r\n{}\r\n", get_reply.len(), get_reply),
            "INCR" => ":1\r\n".to_string(),
            _ => "+OK\r\n".to_string(),
        };
        if writer.write_all(response.as_bytes()).is_err() {
            return;
        }
    }
}

/// Reads one RESP array of bulk strings.
fn read_command(reader: &mut impl BufRead) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).ok()?;
        buf.truncate(len);
        args.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Some(args)
}
