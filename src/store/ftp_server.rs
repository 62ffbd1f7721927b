//! In-memory FTP server for store tests
//!
//! Speaks the part of RFC 959 the FTP store uses: login, TYPE, CWD, MKD,
//! PASV, STOR, RETR, MDTM, RNFR/RNTO, DELE and QUIT. Each control connection
//! gets its own thread; the server runs until the test process exits.

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Default)]
struct Tree {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, (Vec<u8>, DateTime<Utc>)>,
}

#[derive(Clone)]
pub(crate) struct MockFtpServer {
    port: u16,
    tree: Arc<Mutex<Tree>>,
}

impl MockFtpServer {
    pub(crate) fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let mut tree = Tree::default();
        tree.dirs.insert("/".to_string());
        let tree = Arc::new(Mutex::new(tree));

        let shared = Arc::clone(&tree);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let tree = Arc::clone(&shared);
                thread::spawn(move || {
                    let _ = Connection::new(stream, tree).run();
                });
            }
        });
        Self { port, tree }
    }

    /// `ftp://` URI pointing at `path` on this server
    pub(crate) fn url(&self, path: &str) -> String {
        format!("ftp://127.0.0.1:{}{}", self.port, path)
    }

    pub(crate) fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.tree
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|(data, _)| data.clone())
    }

    /// Absolute paths of every stored file, sorted
    pub(crate) fn paths(&self) -> Vec<String> {
        self.tree.lock().unwrap().files.keys().cloned().collect()
    }

    pub(crate) fn has_dir(&self, path: &str) -> bool {
        self.tree.lock().unwrap().dirs.contains(path)
    }
}

struct Connection {
    control: BufReader<TcpStream>,
    out: TcpStream,
    tree: Arc<Mutex<Tree>>,
    cwd: String,
    passive: Option<TcpListener>,
    rename_from: Option<String>,
}

impl Connection {
    fn new(stream: TcpStream, tree: Arc<Mutex<Tree>>) -> Self {
        let out = stream.try_clone().unwrap();
        Self {
            control: BufReader::new(stream),
            out,
            tree,
            cwd: "/".to_string(),
            passive: None,
            rename_from: None,
        }
    }

    fn reply(&mut self, line: &str) -> io::Result<()> {
        self.out.write_all(format!("{line}\r\n").as_bytes())
    }

    fn resolve(&self, name: &str) -> String {
        let joined = if name.starts_with('/') {
            name.to_string()
        } else {
            format!("{}/{}", self.cwd.trim_end_matches('/'), name)
        };
        match joined.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        }
    }

    fn accept_data(&mut self) -> io::Result<TcpStream> {
        let listener = self
            .passive
            .take()
            .ok_or_else(|| io::Error::other("no passive listener"))?;
        Ok(listener.accept()?.0)
    }

    fn run(mut self) -> io::Result<()> {
        self.reply("220 mock ftp ready")?;
        let mut buf = String::new();
        loop {
            buf.clear();
            if self.control.read_line(&mut buf)? == 0 {
                return Ok(());
            }
            let command = buf.trim_end().to_string();
            let (verb, arg) = command.split_once(' ').unwrap_or((command.as_str(), ""));

            match verb.to_ascii_uppercase().as_str() {
                "USER" => self.reply("331 password required")?,
                "PASS" => self.reply("230 logged in")?,
                "TYPE" => self.reply("200 type set")?,
                "CWD" => {
                    let dir = self.resolve(arg);
                    if self.tree.lock().unwrap().dirs.contains(&dir) {
                        self.cwd = dir;
                        self.reply("250 directory changed")?;
                    } else {
                        self.reply("550 no such directory")?;
                    }
                }
                "MKD" => {
                    let dir = self.resolve(arg);
                    self.tree.lock().unwrap().dirs.insert(dir.clone());
                    self.reply(&format!("257 \"{dir}\" created"))?;
                }
                "PASV" => {
                    let listener = TcpListener::bind("127.0.0.1:0")?;
                    let port = listener.local_addr()?.port();
                    self.passive = Some(listener);
                    self.reply(&format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{})",
                        port >> 8,
                        port & 0xff
                    ))?;
                }
                "STOR" => {
                    let path = self.resolve(arg);
                    self.reply("150 ready for data")?;
                    let mut body = Vec::new();
                    self.accept_data()?.read_to_end(&mut body)?;
                    self.tree
                        .lock()
                        .unwrap()
                        .files
                        .insert(path, (body, Utc::now()));
                    self.reply("226 transfer complete")?;
                }
                "RETR" => {
                    let path = self.resolve(arg);
                    let data = self
                        .tree
                        .lock()
                        .unwrap()
                        .files
                        .get(&path)
                        .map(|(data, _)| data.clone());
                    match data {
                        Some(data) => {
                            self.reply("150 sending data")?;
                            let mut stream = self.accept_data()?;
                            stream.write_all(&data)?;
                            drop(stream);
                            self.reply("226 transfer complete")?;
                        }
                        None => self.reply("550 file not found")?,
                    }
                }
                "MDTM" => {
                    let path = self.resolve(arg);
                    let modified = self
                        .tree
                        .lock()
                        .unwrap()
                        .files
                        .get(&path)
                        .map(|(_, modified)| *modified);
                    match modified {
                        Some(modified) => {
                            self.reply(&format!("213 {}", modified.format("%Y%m%d%H%M%S")))?
                        }
                        None => self.reply("550 file not found")?,
                    }
                }
                "RNFR" => {
                    let path = self.resolve(arg);
                    if self.tree.lock().unwrap().files.contains_key(&path) {
                        self.rename_from = Some(path);
                        self.reply("350 ready for destination")?;
                    } else {
                        self.reply("550 file not found")?;
                    }
                }
                "RNTO" => {
                    let to = self.resolve(arg);
                    let moved = self.rename_from.take().and_then(|from| {
                        let mut tree = self.tree.lock().unwrap();
                        let entry = tree.files.remove(&from)?;
                        tree.files.insert(to, entry);
                        Some(())
                    });
                    match moved {
                        Some(()) => self.reply("250 renamed")?,
                        None => self.reply("503 RNFR required first")?,
                    }
                }
                "DELE" => {
                    let path = self.resolve(arg);
                    self.tree.lock().unwrap().files.remove(&path);
                    self.reply("250 deleted")?;
                }
                "QUIT" => {
                    self.reply("221 bye")?;
                    return Ok(());
                }
                _ => self.reply("502 command not implemented")?,
            }
        }
    }
}
