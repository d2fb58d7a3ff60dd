//! Remote backend integration tests.
//!
//! These tests run the Redis backend against a `MockRedisServer` that speaks
//! enough RESP over real TCP to serve SET/GET/MGET/SCAN, and check that the
//! metric store produces the same aggregates as the embedded backend.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use splitway_core::config::RemoteConfig;
use splitway_core::{Signature, Track};
use splitway_store::{EmbeddedBackend, KvBackend, MetricKey, MetricStore, RemoteBackend, UserKey};

// ── MockRedisServer ──────────────────────────────────────────────────

#[derive(Default)]
struct MockState {
    values: HashMap<Vec<u8>, Vec<u8>>,
    expiries: HashMap<Vec<u8>, u64>,
}

/// A TCP server that speaks a minimal Redis RESP protocol:
/// 1. SET key value [EX seconds] stores the value and records the expiry
/// 2. GET and MGET return stored values or nil
/// 3. SCAN returns every matching key in one batch with cursor 0
/// 4. Every other command gets +OK
struct MockRedisServer {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
}

impl MockRedisServer {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind to random port");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(Mutex::new(MockState::default()));

        let shared = Arc::clone(&state);
        std::thread::spawn(move || {
            while let Ok((stream, _)) = listener.accept() {
                let state = Arc::clone(&shared);
                std::thread::spawn(move || Self::handle_connection(stream, state));
            }
        });

        std::thread::sleep(Duration::from_millis(10));
        Self { addr, state }
    }

    fn config(&self) -> RemoteConfig {
        RemoteConfig {
            address: self.addr.to_string(),
        }
    }

    fn expiry_of(&self, key: &str) -> Option<u64> {
        self.state.lock().unwrap().expiries.get(key.as_bytes()).copied()
    }

    fn handle_connection(stream: TcpStream, state: Arc<Mutex<MockState>>) {
        let mut writer = stream.try_clone().expect("clone stream");
        let mut reader = BufReader::new(stream);
        while let Some(args) = read_command(&mut reader) {
            let reply = Self::execute(&args, &state);
            if writer.write_all(&reply).is_err() || writer.flush().is_err() {
                break;
            }
        }
    }

    fn execute(args: &[Vec<u8>], state: &Mutex<MockState>) -> Vec<u8> {
        let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        let mut state = state.lock().unwrap();
        match name.as_str() {
            "SET" => {
                let key = args[1].clone();
                state.values.insert(key.clone(), args[2].clone());
                let ex = args
                    .iter()
                    .position(|a| a.eq_ignore_ascii_case(b"EX"))
                    .and_then(|i| args.get(i + 1))
                    .and_then(|v| String::from_utf8_lossy(v).parse::<u64>().ok());
                match ex {
                    Some(secs) => state.expiries.insert(key, secs),
                    None => state.expiries.remove(&key),
                };
                b"+OK\r\n".to_vec()
            }
            "GET" => bulk(state.values.get(&args[1])),
            "MGET" => {
                let mut reply = format!("*{}\r\n", args.len() - 1).into_bytes();
                for key in &args[1..] {
                    reply.extend(bulk(state.values.get(key)));
                }
                reply
            }
            "SCAN" => {
                let pattern = args
                    .iter()
                    .position(|a| a.eq_ignore_ascii_case(b"MATCH"))
                    .and_then(|i| args.get(i + 1))
                    .map(|p| unescape_prefix(p))
                    .unwrap_or_default();
                // Reverse order so the client has to sort.
                let mut keys: Vec<&Vec<u8>> = state
                    .values
                    .keys()
                    .filter(|k| k.starts_with(&pattern))
                    .collect();
                keys.sort();
                keys.reverse();
                let mut reply = b"*2\r\n$1\r\n0\r\n".to_vec();
                reply.extend(format!("*{}\r\n", keys.len()).into_bytes());
                for key in keys {
                    reply.extend(bulk(Some(key)));
                }
                reply
            }
            _ => b"+OK\r\n".to_vec(),
        }
    }
}

fn read_command(reader: &mut BufReader<TcpStream>) -> Option<Vec<Vec<u8>>> {
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
        let mut buf = vec![0u8; len + 2];
        reader.read_exact(&mut buf).ok()?;
        buf.truncate(len);
        args.push(buf);
    }
    Some(args)
}

fn bulk(value: Option<&Vec<u8>>) -> Vec<u8> {
    match value {
        Some(v) => {
            let mut out = format!("${}\r\n", v.len()).into_bytes();
            out.extend_from_slice(v);
            out.extend_from_slice(b"\r\n");
            out
        }
        None => b"$-1\r\n".to_vec(),
    }
}

/// Turn an escaped `prefix*` glob back into its literal prefix.
fn unescape_prefix(pattern: &[u8]) -> Vec<u8> {
    let body = pattern.strip_suffix(b"*").unwrap_or(pattern);
    let mut out = Vec::with_capacity(body.len());
    let mut escaped = false;
    for &b in body {
        if b == b'\\' && !escaped {
            escaped = true;
            continue;
        }
        escaped = false;
        out.push(b);
    }
    out
}

// ── Helpers ──────────────────────────────────────────────────────────

fn metric(app: &str, track: u32, metric: &str, user: &str, txn: &str) -> MetricKey {
    MetricKey {
        app: app.to_string(),
        track: Track::new(track),
        signature: Signature::new("sig"),
        metric: metric.to_string(),
        user: user.to_string(),
        transaction: txn.to_string(),
    }
}

fn record_sample_traffic(store: &MetricStore) {
    store.set_metric(&metric("shop/backend", 0, "latency", "bob", "t2"), 31.5).unwrap();
    store.set_metric(&metric("shop/backend", 0, "latency", "alice", "t1"), 12.0).unwrap();
    store.set_metric(&metric("shop/backend", 0, "latency", "alice", "t3"), 18.25).unwrap();
    store.set_metric(&metric("shop/backend", 0, "revenue", "alice", "t3"), 99.0).unwrap();
    store.set_metric(&metric("shop/backend", 0, "latency", "alice", "t1"), 12.0).unwrap();
    store.set_metric(&metric("shop/backend", 1, "latency", "carol", "t4"), 7.0).unwrap();
    store.set_metric(&metric("shop/frontend", 0, "latency", "dave", "t5"), 1.0).unwrap();
    store
        .set_user(&UserKey {
            app: "shop/backend".to_string(),
            track: Track::new(0),
            signature: Signature::new("sig"),
            user: "erin".to_string(),
        })
        .unwrap();
}

// ── Tests ────────────────────────────────────────────────────────────

#[test]
fn remote_put_get_and_sorted_scan() {
    let server = MockRedisServer::start();
    let backend = RemoteBackend::open(&server.config(), None).unwrap();

    backend.put("p::b", b"2").unwrap();
    backend.put("p::a", b"1").unwrap();
    backend.put("q::a", b"3").unwrap();

    assert_eq!(backend.get("p::a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(backend.get("missing").unwrap(), None);
    assert_eq!(
        backend.scan_prefix("p::").unwrap(),
        vec![
            ("p::a".to_string(), b"1".to_vec()),
            ("p::b".to_string(), b"2".to_vec()),
        ]
    );
    assert_eq!(backend.count_prefix("p::").unwrap(), 2);
}

#[test]
fn remote_writes_apply_ttl() {
    let server = MockRedisServer::start();
    let backend = RemoteBackend::open(&server.config(), Some(Duration::from_secs(600))).unwrap();
    backend.put("k", b"v").unwrap();
    assert_eq!(server.expiry_of("k"), Some(600));

    let untimed = RemoteBackend::open(&server.config(), None).unwrap();
    untimed.put("k2", b"v").unwrap();
    assert_eq!(server.expiry_of("k2"), None);
}

#[test]
fn backends_produce_identical_metrics_json() {
    let server = MockRedisServer::start();
    let remote = MetricStore::new(Arc::new(RemoteBackend::open(&server.config(), None).unwrap()));
    let embedded = MetricStore::new(Arc::new(EmbeddedBackend::open_in_memory(None).unwrap()));

    record_sample_traffic(&remote);
    record_sample_traffic(&embedded);

    for (app, track) in [("shop/backend", 0), ("shop/backend", 1), ("shop/frontend", 0)] {
        let sig = Signature::new("sig");
        let a = serde_json::to_string(&remote.get_metrics(app, Track::new(track), &sig).unwrap())
            .unwrap();
        let b = serde_json::to_string(&embedded.get_metrics(app, Track::new(track), &sig).unwrap())
            .unwrap();
        assert_eq!(a, b, "{app} track {track}");
    }

    let backend = remote.get_metrics("shop/backend", Track::new(0), &Signature::new("sig")).unwrap();
    assert_eq!(backend["latency"].transactions_series, vec![12.0, 18.25, 31.5]);
    assert_eq!(backend["latency"].users_series, vec![30.25, 31.5, 0.0]);
    assert_eq!(backend["revenue"].users_series, vec![99.0, 0.0, 0.0]);
}

#[test]
fn remote_experiment_results() {
    let server = MockRedisServer::start();
    let store = MetricStore::new(Arc::new(RemoteBackend::open(&server.config(), None).unwrap()));
    let result = serde_json::json!({"winner": 0});
    store.set_experiment_result("shop", "exp", &result).unwrap();
    assert_eq!(store.get_experiment_result("shop", "exp").unwrap(), Some(result));
    assert_eq!(store.get_experiment_result("shop", "other").unwrap(), None);
}
