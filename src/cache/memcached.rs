//! memcached backed cache store speaking the text protocol
//!
//! Each command checks a connection out of a small idle pool, or opens a new
//! one, so concurrent requests never wait on each other. A connection that
//! fails is dropped instead of being returned to the pool.

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::CacheStore;
use crate::errors::{CacheError, CacheResult};

/// Longest key memcached accepts
pub const MAX_KEY_LENGTH: usize = 250;

/// Idle connections kept open for reuse
pub const MAX_IDLE_CONNECTIONS: usize = 8;

/// Expiry values above this are read by memcached as absolute unix times
const RELATIVE_EXPIRY_LIMIT: u64 = 60 * 60 * 24 * 30;

type Connection = BufReader<TcpStream>;

#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Line(String),
    Value(Option<Vec<u8>>),
}

pub struct MemcachedStore {
    addr: String,
    io_timeout: Duration,
    idle: Mutex<Vec<Connection>>,
}

impl MemcachedStore {
    /// Create a store for `addr` (`host:port`); connecting is deferred to first use
    pub fn new(addr: impl Into<String>, io_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            io_timeout,
            idle: Mutex::new(Vec::new()),
        }
    }

    async fn connect(&self) -> CacheResult<Connection> {
        let stream = timeout(self.io_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| CacheError::Timeout(self.io_timeout))??;
        stream.set_nodelay(true)?;
        debug!("Connected to memcached at {}", self.addr);
        Ok(BufReader::new(stream))
    }

    async fn checkout(&self) -> CacheResult<Connection> {
        let idle = self.idle.lock().await.pop();
        match idle {
            Some(connection) => Ok(connection),
            None => self.connect().await,
        }
    }

    async fn checkin(&self, connection: Connection) {
        let mut idle = self.idle.lock().await;
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(connection);
        }
    }

    async fn request(&self, command: &[u8], reads_value: bool) -> CacheResult<Reply> {
        let mut connection = self.checkout().await?;

        let result =
            match timeout(self.io_timeout, exchange(&mut connection, command, reads_value)).await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Timeout(self.io_timeout)),
            };

        match &result {
            Ok(_) => self.checkin(connection).await,
            Err(e) => warn!("memcached command failed, dropping connection: {}", e),
        }
        result
    }

    /// Connections currently parked for reuse
    pub async fn idle_connections(&self) -> usize {
        self.idle.lock().await.len()
    }
}

fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty()
        || key.len() > MAX_KEY_LENGTH
        || key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control())
    {
        return Err(CacheError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// memcached `exptime` for a TTL, switching to absolute time past 30 days
fn expiry(ttl: Option<Duration>) -> u64 {
    match ttl {
        None => 0,
        Some(ttl) => {
            let secs = ttl.as_secs().max(1);
            if secs <= RELATIVE_EXPIRY_LIMIT {
                secs
            } else {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                now + secs
            }
        }
    }
}

fn storage_command(verb: &str, key: &str, value: &[u8], ttl: Option<Duration>) -> Vec<u8> {
    let mut command =
        format!("{verb} {key} 0 {} {}\r\n", expiry(ttl), value.len()).into_bytes();
    command.extend_from_slice(value);
    command.extend_from_slice(b"\r\n");
    command
}

async fn read_line(connection: &mut Connection) -> CacheResult<String> {
    let mut line = String::new();
    if connection.read_line(&mut line).await? == 0 {
        return Err(CacheError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "memcached closed the connection",
        )));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn check_error(line: &str) -> CacheResult<()> {
    if line == "ERROR" || line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR") {
        return Err(CacheError::protocol(line));
    }
    Ok(())
}

async fn exchange(
    connection: &mut Connection,
    command: &[u8],
    reads_value: bool,
) -> CacheResult<Reply> {
    connection.get_mut().write_all(command).await?;
    connection.get_mut().flush().await?;

    let line = read_line(connection).await?;
    check_error(&line)?;

    if !reads_value {
        return Ok(Reply::Line(line));
    }
    if line == "END" {
        return Ok(Reply::Value(None));
    }

    // VALUE <key> <flags> <bytes>
    let length: usize = line
        .strip_prefix("VALUE ")
        .and_then(|rest| rest.split_whitespace().nth(2))
        .and_then(|bytes| bytes.parse().ok())
        .ok_or_else(|| CacheError::protocol(format!("unexpected get reply: {line}")))?;

    let mut data = vec![0u8; length + 2];
    connection.read_exact(&mut data).await?;
    if !data.ends_with(b"\r\n") {
        return Err(CacheError::protocol("value block not terminated by CRLF"));
    }
    data.truncate(length);

    let end = read_line(connection).await?;
    if end != "END" {
        return Err(CacheError::protocol(format!("expected END, got {end}")));
    }
    Ok(Reply::Value(Some(data)))
}

fn unexpected(command: &str, reply: Reply) -> CacheError {
    CacheError::protocol(format!("unexpected {command} reply: {reply:?}"))
}

#[async_trait]
impl CacheStore for MemcachedStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        validate_key(key)?;
        match self.request(format!("get {key}\r\n").as_bytes(), true).await? {
            Reply::Value(value) => Ok(value),
            reply => Err(unexpected("get", reply)),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        validate_key(key)?;
        match self
            .request(&storage_command("set", key, value, ttl), false)
            .await?
        {
            Reply::Line(line) if line == "STORED" => Ok(()),
            reply => Err(unexpected("set", reply)),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        match self.request(format!("delete {key}\r\n").as_bytes(), false).await? {
            Reply::Line(line) if line == "DELETED" => Ok(true),
            Reply::Line(line) if line == "NOT_FOUND" => Ok(false),
            reply => Err(unexpected("delete", reply)),
        }
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
        validate_key(key)?;
        match self
            .request(format!("incr {key} {delta}\r\n").as_bytes(), false)
            .await?
        {
            Reply::Line(line) if line == "NOT_FOUND" => Ok(None),
            Reply::Line(line) => line
                .parse()
                .map(Some)
                .map_err(|_| CacheError::protocol(format!("unexpected incr reply: {line}"))),
            reply => Err(unexpected("incr", reply)),
        }
    }

    async fn add(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<bool> {
        validate_key(key)?;
        match self
            .request(&storage_command("add", key, value, ttl), false)
            .await?
        {
            Reply::Line(line) if line == "STORED" => Ok(true),
            Reply::Line(line) if line == "NOT_STORED" => Ok(false),
            reply => Err(unexpected("add", reply)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Minimal memcached speaking just enough of the text protocol
    async fn spawn_fake_memcached() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let data: Arc<Mutex<HashMap<String, Vec<u8>>>> = Arc::default();

        tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                let data = data.clone();
                tokio::spawn(async move {
                    let mut conn = BufReader::new(socket);
                    loop {
                        let mut line = String::new();
                        if conn.read_line(&mut line).await.unwrap_or(0) == 0 {
                            return;
                        }
                        let parts: Vec<String> =
                            line.split_whitespace().map(String::from).collect();
                        let reply = match parts[0].as_str() {
                            "get" => match data.lock().await.get(&parts[1]) {
                                Some(v) => {
                                    let mut out =
                                        format!("VALUE {} 0 {}\r\n", parts[1], v.len()).into_bytes();
                                    out.extend_from_slice(v);
                                    out.extend_from_slice(b"\r\nEND\r\n");
                                    out
                                }
                                None => b"END\r\n".to_vec(),
                            },
                            "set" | "add" => {
                                let len: usize = parts[4].parse().unwrap();
                                let mut value = vec![0u8; len + 2];
                                conn.read_exact(&mut value).await.unwrap();
                                value.truncate(len);
                                let mut map = data.lock().await;
                                if parts[0] == "add" && map.contains_key(&parts[1]) {
                                    b"NOT_STORED\r\n".to_vec()
                                } else {
                                    map.insert(parts[1].clone(), value);
                                    b"STORED\r\n".to_vec()
                                }
                            }
                            "delete" => match data.lock().await.remove(&parts[1]) {
                                Some(_) => b"DELETED\r\n".to_vec(),
                                None => b"NOT_FOUND\r\n".to_vec(),
                            },
                            "incr" => {
                                let mut map = data.lock().await;
                                match map.get_mut(&parts[1]) {
                                    Some(v) => {
                                        let n: u64 = String::from_utf8_lossy(v).parse().unwrap();
                                        let next = n + parts[2].parse::<u64>().unwrap();
                                        *v = next.to_string().into_bytes();
                                        format!("{next}\r\n").into_bytes()
                                    }
                                    None => b"NOT_FOUND\r\n".to_vec(),
                                }
                            }
                            _ => b"ERROR\r\n".to_vec(),
                        };
                        conn.get_mut().write_all(&reply).await.unwrap();
                    }
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_round_trips_through_text_protocol() {
        let store = MemcachedStore::new(spawn_fake_memcached().await, Duration::from_secs(2));

        assert_eq!(store.get("icon-http://example.com").await.unwrap(), None);

        let icon = b"\x00\x00\x01\x00binary\r\nwith crlf".to_vec();
        store
            .set("icon-http://example.com", &icon, Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(
            store.get("icon-http://example.com").await.unwrap(),
            Some(icon)
        );

        assert!(store.delete("icon-http://example.com").await.unwrap());
        assert!(!store.delete("icon-http://example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_counters_use_add_and_incr() {
        let store = MemcachedStore::new(spawn_fake_memcached().await, Duration::from_secs(2));

        assert_eq!(store.increment("counter-hits", 1).await.unwrap(), None);
        assert!(store.add("counter-hits", b"0", None).await.unwrap());
        assert!(!store.add("counter-hits", b"0", None).await.unwrap());
        assert_eq!(store.increment("counter-hits", 1).await.unwrap(), Some(1));
        assert_eq!(store.increment("counter-hits", 2).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_rejects_invalid_keys_without_io() {
        let store = MemcachedStore::new("127.0.0.1:1", Duration::from_millis(100));

        let long_key = "k".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            store.get(&long_key).await,
            Err(CacheError::InvalidKey { .. })
        ));
        assert!(matches!(
            store.set("has space", b"x", None).await,
            Err(CacheError::InvalidKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let store = MemcachedStore::new(addr, Duration::from_millis(500));
        assert!(store.get("icon-x").await.is_err());
    }

    #[tokio::test]
    async fn test_stalled_command_does_not_block_others() {
        let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let silent_addr = silent.local_addr().unwrap().to_string();
        // Accepts connections and never answers
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = silent.accept().await {
                held.push(socket);
            }
        });

        let store = Arc::new(MemcachedStore::new(silent_addr, Duration::from_millis(300)));
        let started = tokio::time::Instant::now();
        let (first, second) = tokio::join!(store.get("icon-a"), store.get("icon-b"));

        assert!(matches!(first, Err(CacheError::Timeout(_))));
        assert!(matches!(second, Err(CacheError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_millis(550));
        assert_eq!(store.idle_connections().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_commands_reuse_pooled_connections() {
        let store = Arc::new(MemcachedStore::new(
            spawn_fake_memcached().await,
            Duration::from_secs(2),
        ));
        store.add("counter-requests", b"0", None).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.increment("counter-requests", 1).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_some());
        }

        assert_eq!(
            store.get("counter-requests").await.unwrap(),
            Some(b"20".to_vec())
        );
        let idle = store.idle_connections().await;
        assert!((1..=MAX_IDLE_CONNECTIONS).contains(&idle));
    }

    #[test]
    fn test_expiry_switches_to_absolute_time() {
        assert_eq!(expiry(None), 0);
        assert_eq!(expiry(Some(Duration::from_secs(60))), 60);
        assert_eq!(
            expiry(Some(Duration::from_secs(RELATIVE_EXPIRY_LIMIT))),
            RELATIVE_EXPIRY_LIMIT
        );
        assert!(expiry(Some(Duration::from_secs(RELATIVE_EXPIRY_LIMIT + 1))) > 1_000_000_000);
    }

    #[test]
    fn test_storage_command_layout() {
        let command = storage_command("set", "k", b"abc", Some(Duration::from_secs(5)));
        assert_eq!(command, b"set k 0 5 3\r\nabc\r\n".to_vec());
    }
}
