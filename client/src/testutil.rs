//! Test doubles shared by the unit tests.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ClientError;
use crate::process::DaemonControl;
use crate::rpc::{Gateway, Method};
use crate::types::Output;

/// Path-routed gateway double. Unrouted paths fail with a transport error.
#[derive(Default)]
pub struct MockGateway {
    routes: Mutex<HashMap<String, Result<Value, ClientError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<(String, Option<Value>)>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, value: Value) {
        self.routes.lock().unwrap().insert(path.to_string(), Ok(value));
    }

    pub fn fail(&self, path: &str, err: ClientError) {
        self.routes.lock().unwrap().insert(path.to_string(), Err(err));
    }

    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(path.to_string(), delay);
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(p, _)| p == path).count()
    }

    pub fn calls_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p.starts_with(prefix))
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .and_then(|(_, b)| b.clone())
    }

    pub fn set_history(&self, outputs: &[Output]) {
        self.respond("/api/wallet/history", json!({ "outputs": outputs }));
    }

    pub fn set_height(&self, height: u64) {
        self.respond(
            "/api/status",
            json!({ "chain_height": height, "peers": 8, "mempool_size": 0, "syncing": false }),
        );
    }

    pub fn set_blocks(&self, heights: impl IntoIterator<Item = u64>) {
        for h in heights {
            self.respond(
                &format!("/api/block/{h}"),
                json!({ "height": h, "difficulty": (h * 10) as f64 }),
            );
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn call(&self, _method: Method, path: &str, body: Option<Value>) -> Result<Value, ClientError> {
        self.calls.lock().unwrap().push((path.to_string(), body));
        let delay = self.delays.lock().unwrap().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.routes
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| Err(ClientError::Transport(format!("no route for {path}"))))
    }
}

/// Daemon control double. `probe` reports ready once `ready_after` probes
/// have been made since the last start.
pub struct MockDaemon {
    pub starts: AtomicUsize,
    pub probes: AtomicUsize,
    pub stops: AtomicUsize,
    pub wipes: AtomicUsize,
    ready_after: Mutex<Option<usize>>,
    start_error: Mutex<Option<ClientError>>,
    running: AtomicBool,
    start_delay: Duration,
}

impl MockDaemon {
    pub fn new(ready_after: Option<usize>) -> Self {
        Self {
            starts: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            wipes: AtomicUsize::new(0),
            ready_after: Mutex::new(ready_after),
            start_error: Mutex::new(None),
            running: AtomicBool::new(false),
            start_delay: Duration::from_millis(100),
        }
    }

    /// A daemon that is already up before anyone asks.
    pub fn already_running() -> Self {
        let d = Self::new(Some(0));
        d.running.store(true, Ordering::SeqCst);
        d
    }

    pub fn fail_start_with(&self, err: ClientError) {
        *self.start_error.lock().unwrap() = Some(err);
    }

    pub fn clear_start_error(&self) {
        *self.start_error.lock().unwrap() = None;
    }

    pub fn set_ready_after(&self, probes: Option<usize>) {
        *self.ready_after.lock().unwrap() = probes;
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DaemonControl for MockDaemon {
    async fn start(&self) -> Result<(), ClientError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.start_delay).await;
        if let Some(err) = self.start_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.probes.store(0, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn probe(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let seen = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        match *self.ready_after.lock().unwrap() {
            Some(n) => seen > n,
            None => false,
        }
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    async fn wipe_chain_data(&self) -> Result<(), ClientError> {
        self.wipes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn output(id: &str, height: u64, amount: u64, spent: bool) -> Output {
    Output {
        id: id.to_string(),
        index: 0,
        amount,
        block_height: height,
        spent,
        spent_height: if spent { Some(height + 1) } else { None },
        is_coinbase: false,
    }
}
