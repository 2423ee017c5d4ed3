#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ssdb_client::PoolConfig;

/// What the mock server does with one command.
pub enum Reply {
    /// Write these blocks followed by the terminator.
    Blocks(Vec<Vec<u8>>),
    /// Write raw bytes as-is.
    Raw(Vec<u8>),
    /// Write raw bytes piece by piece, pausing between pieces.
    Trickle(Vec<Vec<u8>>),
    /// Close the socket without answering.
    Close,
}

pub type Handler = Arc<dyn Fn(&[Vec<u8>]) -> Reply + Send + Sync>;

pub struct MockServer {
    pub port: u16,
    accepted: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<Vec<Vec<u8>>>>>,
}

impl MockServer {
    pub fn spawn(handler: impl Fn(&[Vec<u8>]) -> Reply + Send + Sync + 'static) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let accepted_clone = Arc::clone(&accepted);
        let commands_clone = Arc::clone(&commands);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                accepted_clone.fetch_add(1, Ordering::SeqCst);
                let handler = Arc::clone(&handler);
                let commands = Arc::clone(&commands_clone);
                thread::spawn(move || serve(stream, handler, commands));
            }
        });

        MockServer {
            port,
            accepted,
            commands,
        }
    }

    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// All commands received so far, across connections.
    pub fn commands(&self) -> Vec<Vec<Vec<u8>>> {
        self.commands.lock().unwrap().clone()
    }

    pub fn count_of(&self, name: &str) -> usize {
        self.commands()
            .iter()
            .filter(|cmd| cmd[0] == name.as_bytes())
            .count()
    }

    pub fn pool_config(&self) -> PoolConfig {
        let mut config = PoolConfig::new("127.0.0.1", self.port);
        // Tests drive sweeps by hand unless they shorten this.
        config.health_check_interval = Duration::from_secs(3600);
        config.connect_timeout = Duration::from_secs(2);
        config.read_timeout = Some(Duration::from_secs(2));
        config.write_timeout = Some(Duration::from_secs(2));
        config
    }
}

fn serve(stream: TcpStream, handler: Handler, commands: Arc<Mutex<Vec<Vec<Vec<u8>>>>>) {
    let mut writer = stream.try_clone().expect("clone");
    let mut reader = BufReader::new(stream);
    while let Some(cmd) = read_command(&mut reader) {
        commands.lock().unwrap().push(cmd.clone());
        match handler(&cmd) {
            Reply::Blocks(blocks) => {
                let mut out = Vec::new();
                for block in blocks {
                    out.extend_from_slice(block.len().to_string().as_bytes());
                    out.push(b'\n');
                    out.extend_from_slice(&block);
                    out.push(b'\n');
                }
                out.push(b'\n');
                if writer.write_all(&out).is_err() {
                    return;
                }
            }
            Reply::Raw(raw) => {
                if writer.write_all(&raw).is_err() {
                    return;
                }
            }
            Reply::Trickle(pieces) => {
                for piece in pieces {
                    if writer.write_all(&piece).and_then(|()| writer.flush()).is_err() {
                        return;
                    }
                    thread::sleep(Duration::from_millis(30));
                }
            }
            Reply::Close => return,
        }
        let _ = writer.flush();
    }
}

/// Reads blocks up to the empty terminator; `None` on EOF or bad framing.
fn read_command(reader: &mut BufReader<TcpStream>) -> Option<Vec<Vec<u8>>> {
    let mut blocks = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        if line.is_empty() {
            return if blocks.is_empty() { None } else { Some(blocks) };
        }
        let len: usize = line.parse().ok()?;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data).ok()?;
        let mut newline = [0u8; 1];
        reader.read_exact(&mut newline).ok()?;
        blocks.push(data);
    }
}

pub fn blocks(items: &[&str]) -> Reply {
    Reply::Blocks(items.iter().map(|item| item.as_bytes().to_vec()).collect())
}

/// Handler answering `ok` to everything, with `get` returning `value`.
pub fn ok_handler(cmd: &[Vec<u8>]) -> Reply {
    match cmd[0].as_slice() {
        b"get" => blocks(&["ok", "value"]),
        _ => blocks(&["ok"]),
    }
}
