mod client;

use log::LevelFilter;
use std::sync::Once;

use hifitime::prelude::Duration;

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::mpsc::UnboundedReceiver,
    time::timeout,
};

use crate::config::SessionConfig;

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::builder()
            .is_test(true)
            .filter_level(LevelFilter::Debug)
            .init();
    });
}

/// Bound on every wait of the test suite
pub const TEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Test mountpoint and credentials
pub const MOUNTPOINT: &str = "MOUNT01";
pub const USERNAME: &str = "user";
pub const PASSWORD: &str = "pass";

/// In-process NTRIP caster
pub struct Caster {
    listener: TcpListener,
    pub port: u16,
}

impl Caster {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self { listener, port }
    }

    /// [SessionConfig] pointing to this caster
    pub fn config(&self) -> SessionConfig {
        SessionConfig::new("127.0.0.1", MOUNTPOINT)
            .with_port(self.port)
            .with_credentials(USERNAME, PASSWORD)
            .with_connect_timeout(Duration::from_seconds(2.0))
    }

    /// Accepts one client, reads its request (up to the blank line)
    /// and answers with `status`. Returns the request and the connection.
    pub async fn accept(&self, status: &str) -> (String, BufReader<TcpStream>) {
        let response = format!("{}\r\n", status);
        self.accept_raw(response.as_bytes()).await
    }

    /// Accepts one client and reads its request, without answering.
    pub async fn accept_silent(&self) -> (String, BufReader<TcpStream>) {
        self.accept_raw(&[]).await
    }

    /// Accepts one client, reads its request and answers with raw `response` bytes.
    pub async fn accept_raw(&self, response: &[u8]) -> (String, BufReader<TcpStream>) {
        let (stream, _) = timeout(TEST_TIMEOUT, self.listener.accept())
            .await
            .unwrap()
            .unwrap();

        let mut stream = BufReader::new(stream);
        let mut request = String::new();

        loop {
            let mut line = String::new();

            let size = timeout(TEST_TIMEOUT, stream.read_line(&mut line))
                .await
                .unwrap()
                .unwrap();

            request.push_str(&line);

            if size == 0 || line == "\r\n" {
                break;
            }
        }

        if !response.is_empty() {
            stream.get_mut().write_all(response).await.unwrap();
            stream.get_mut().flush().await.unwrap();
        }

        (request, stream)
    }
}

/// Reads one line sent by the client
pub async fn read_line(stream: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();

    timeout(TEST_TIMEOUT, stream.read_line(&mut line))
        .await
        .unwrap()
        .unwrap();

    line
}

/// Waits for the first item matching `f`, skipping all others.
pub async fn wait_for<T: std::fmt::Debug, F: Fn(&T) -> bool>(
    rx: &mut UnboundedReceiver<T>,
    f: F,
) -> T {
    timeout(TEST_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Some(item) if f(&item) => return item,
                Some(_) => continue,
                None => panic!("channel closed"),
            }
        }
    })
    .await
    .unwrap()
}

/// All items received so far
pub fn drain<T>(rx: &mut UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}
