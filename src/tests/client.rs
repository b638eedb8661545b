use crate::{
    client::{ConnectionEvent, ConnectionState, StreamingClient},
    error::Error,
    tests::{Caster, MOUNTPOINT, TEST_TIMEOUT, drain, init_logger, read_line, wait_for},
};

use hifitime::prelude::Duration;
use rstest::rstest;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
    time::{sleep, timeout},
};

fn state_changed(state: ConnectionState) -> impl Fn(&ConnectionEvent) -> bool {
    move |event: &ConnectionEvent| {
        matches!(event, ConnectionEvent::StateChanged { state: s, .. } if *s == state)
    }
}

/// RTCM 1005 frame (station coordinates)
const PAYLOAD: [u8; 25] = [
    0xD3, 0x00, 0x13, 0x3E, 0xD0, 0x00, 0x03, 0x8A, 0x0E, 0xDE, 0xEF, 0x34, 0xB4, 0xBD, 0x62, 0xAC,
    0x09, 0x41, 0x98, 0x6F, 0x33, 0x36, 0x0B, 0x98, 0x00,
];

#[tokio::test]
async fn streaming() {
    init_logger();

    let caster = Caster::bind().await;
    let client = StreamingClient::new(caster.config());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (request, mut stream) = caster.accept("HTTP/1.1 200 OK").await;

        stream.get_mut().write_all(&PAYLOAD).await.unwrap();
        stream.get_mut().flush().await.unwrap();

        let line = read_line(&mut stream).await;
        (request, line, stream)
    });

    client.connect(tx).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Streaming);

    assert_eq!(
        rx.recv().await,
        Some(ConnectionEvent::StateChanged {
            state: ConnectionState::Connecting,
            detail: None,
        })
    );

    assert_eq!(
        rx.recv().await,
        Some(ConnectionEvent::StateChanged {
            state: ConnectionState::Streaming,
            detail: None,
        })
    );

    // correction bytes are passed through verbatim
    let mut received = Vec::<u8>::new();

    while received.len() < PAYLOAD.len() {
        match wait_for(&mut rx, |event| matches!(event, ConnectionEvent::Correction(_))).await {
            ConnectionEvent::Correction(chunk) => {
                assert!(!chunk.is_empty());
                received.extend_from_slice(&chunk.bytes);
            },
            _ => unreachable!(),
        }
    }

    assert_eq!(received, PAYLOAD);

    let sentence = "$GPGGA,123456.000,3707.4074,N,12252.5926,W,1,07,1.0,10.5,M,,M,,*47";
    client.send(sentence).unwrap();

    let (request, line, _stream) = server.await.unwrap();

    assert!(request.starts_with(&format!("GET /{} HTTP/1.1\r\n", MOUNTPOINT)));
    assert!(request.contains("User-Agent: NTRIP ntrip2rtk/"));
    assert!(request.contains("Authorization: Basic dXNlcjpwYXNz\r\n"));
    assert!(request.ends_with("\r\n\r\n"));

    assert_eq!(line, format!("{}\r\n", sentence));

    assert_eq!(
        wait_for(&mut rx, |event| matches!(event, ConnectionEvent::UplinkSent(_))).await,
        ConnectionEvent::UplinkSent(sentence.to_string())
    );

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    assert_eq!(
        rx.recv().await,
        Some(ConnectionEvent::StateChanged {
            state: ConnectionState::Disconnected,
            detail: None,
        })
    );
}

#[rstest]
#[case("HTTP/1.1 401 Unauthorized")]
#[case("HTTP/1.1 404 Not Found")]
#[case("SOURCETABLE 200 OK")]
#[tokio::test]
async fn rejected(#[case] status: &str) {
    init_logger();

    let caster = Caster::bind().await;
    let client = StreamingClient::new(caster.config());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let response = status.to_string();

    let server = tokio::spawn(async move {
        let (_, mut stream) = caster.accept(&response).await;

        // never to be interpreted as corrections
        let _ = stream.get_mut().write_all(&PAYLOAD).await;
        stream
    });

    match client.connect(tx).await {
        Err(Error::Protocol(detail)) => assert_eq!(detail, status),
        other => panic!("unexpected result: {:?}", other),
    }

    assert_eq!(client.state(), ConnectionState::Failed);

    let _stream = server.await.unwrap();
    sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(
        drain(&mut rx),
        vec![
            ConnectionEvent::StateChanged {
                state: ConnectionState::Connecting,
                detail: None,
            },
            ConnectionEvent::StateChanged {
                state: ConnectionState::Failed,
                detail: Some(status.to_string()),
            },
        ]
    );

    // nothing to send to
    assert!(matches!(client.send("$GPGGA"), Err(Error::NotStreaming)));
}

#[tokio::test]
async fn unauthorized() {
    init_logger();

    let caster = Caster::bind().await;
    let client = StreamingClient::new(caster.config());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (_, stream) = caster.accept("HTTP/1.1 401 Unauthorized").await;
        stream
    });

    assert!(client.connect(tx).await.is_err());
    let _stream = server.await.unwrap();

    match wait_for(&mut rx, state_changed(ConnectionState::Failed)).await {
        ConnectionEvent::StateChanged { detail, .. } => {
            assert!(detail.unwrap_or_default().contains("401"));
        },
        _ => unreachable!(),
    }

    assert!(
        drain(&mut rx)
            .iter()
            .all(|event| !matches!(event, ConnectionEvent::Correction(_)))
    );
}

#[tokio::test]
async fn connection_refused() {
    init_logger();

    let config = {
        let caster = Caster::bind().await;
        caster.config()
    };

    let client = StreamingClient::new(config);
    let (tx, mut rx) = mpsc::unbounded_channel();

    assert!(matches!(client.connect(tx).await, Err(Error::Connection(_))));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);

    match &events[1] {
        ConnectionEvent::StateChanged { state, detail } => {
            assert_eq!(*state, ConnectionState::Disconnected);
            assert!(detail.is_some());
        },
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn silent_caster() {
    init_logger();

    let caster = Caster::bind().await;
    let config = caster
        .config()
        .with_connect_timeout(Duration::from_milliseconds(300.0));

    let client = StreamingClient::new(config);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (_, stream) = caster.accept_silent().await;
        stream
    });

    let result = timeout(TEST_TIMEOUT, client.connect(tx)).await.unwrap();
    assert!(matches!(result, Err(Error::Timeout)));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let _stream = server.await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);

    match &events[1] {
        ConnectionEvent::StateChanged { state, detail } => {
            assert_eq!(*state, ConnectionState::Disconnected);
            assert!(detail.is_some());
        },
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn disconnect_while_connecting() {
    init_logger();

    let caster = Caster::bind().await;
    let client = StreamingClient::new(caster.config());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let (accepted_tx, accepted_rx) = tokio::sync::oneshot::channel();

    let server = tokio::spawn(async move {
        let (_, stream) = caster.accept_silent().await;
        let _ = accepted_tx.send(());
        stream
    });

    let connecting = {
        let client = client.clone();
        tokio::spawn(async move { client.connect(tx).await })
    };

    // handshake is pending: caster has the request
    timeout(TEST_TIMEOUT, accepted_rx).await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Connecting);

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let result = timeout(TEST_TIMEOUT, connecting).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::Aborted)));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let _stream = server.await.unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![
            ConnectionEvent::StateChanged {
                state: ConnectionState::Connecting,
                detail: None,
            },
            ConnectionEvent::StateChanged {
                state: ConnectionState::Disconnected,
                detail: None,
            },
        ]
    );
}

#[tokio::test]
async fn invalid_status_encoding() {
    init_logger();

    let caster = Caster::bind().await;
    let client = StreamingClient::new(caster.config());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (_, stream) = caster.accept_raw(b"\xD3\x00\x13 garbage 403\r\n").await;
        stream
    });

    match client.connect(tx).await {
        Err(Error::Protocol(detail)) => assert!(detail.contains("403")),
        other => panic!("unexpected result: {:?}", other),
    }

    assert_eq!(client.state(), ConnectionState::Failed);

    let _stream = server.await.unwrap();

    match wait_for(&mut rx, state_changed(ConnectionState::Failed)).await {
        ConnectionEvent::StateChanged { detail, .. } => {
            assert!(detail.unwrap_or_default().contains("garbage 403"));
        },
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn closed_by_caster() {
    init_logger();

    let caster = Caster::bind().await;
    let client = StreamingClient::new(caster.config());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (_, mut stream) = caster.accept("ICY 200 OK").await;
        stream.get_mut().shutdown().await.unwrap();

        // client must release the socket
        let mut remaining = Vec::new();
        timeout(TEST_TIMEOUT, stream.read_to_end(&mut remaining))
            .await
            .unwrap()
            .unwrap();
    });

    client.connect(tx).await.unwrap();

    wait_for(&mut rx, state_changed(ConnectionState::Failed)).await;
    server.await.unwrap();

    assert_eq!(client.state(), ConnectionState::Failed);

    // exactly one failure
    sleep(std::time::Duration::from_millis(50)).await;
    assert!(drain(&mut rx).is_empty());

    // sending is a no-op, not a fault
    assert!(matches!(client.send("$GPGGA"), Err(Error::NotStreaming)));
    assert!(drain(&mut rx).is_empty());

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn stale_stream() {
    init_logger();

    let caster = Caster::bind().await;
    let config = caster
        .config()
        .with_stream_timeout(Duration::from_milliseconds(200.0));

    let client = StreamingClient::new(config);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (_, stream) = caster.accept("HTTP/1.1 200 OK").await;
        stream
    });

    client.connect(tx).await.unwrap();
    let _stream = server.await.unwrap();

    match wait_for(&mut rx, state_changed(ConnectionState::Failed)).await {
        ConnectionEvent::StateChanged { detail, .. } => {
            assert!(detail.unwrap_or_default().contains("no data received"));
        },
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn connect_disconnect_cycles() {
    init_logger();

    const CYCLES: usize = 5;

    let caster = Caster::bind().await;
    let client = StreamingClient::new(caster.config());

    let server = tokio::spawn(async move {
        let mut released = 0;

        for _ in 0..CYCLES {
            let (_, mut stream) = caster.accept("ICY 200 OK").await;

            let mut remaining = Vec::new();
            timeout(TEST_TIMEOUT, stream.read_to_end(&mut remaining))
                .await
                .unwrap()
                .unwrap();

            released += 1;
        }

        released
    });

    for _ in 0..CYCLES {
        let (tx, _rx) = mpsc::unbounded_channel();

        client.connect(tx).await.unwrap();
        assert_eq!(client.state(), ConnectionState::Streaming);

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    assert_eq!(server.await.unwrap(), CYCLES);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    init_logger();

    let caster = Caster::bind().await;
    let client = StreamingClient::new(caster.config());
    let (tx, mut rx) = mpsc::unbounded_channel();

    // never connected
    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let server = tokio::spawn(async move {
        let (_, stream) = caster.accept("HTTP/1.1 200 OK").await;
        stream
    });

    client.connect(tx.clone()).await.unwrap();
    let _stream = server.await.unwrap();

    // one connection at a time
    assert!(matches!(
        client.connect(tx).await,
        Err(Error::AlreadyConnected)
    ));

    client.disconnect().await;
    client.disconnect().await;

    let disconnections = drain(&mut rx)
        .into_iter()
        .filter(state_changed(ConnectionState::Disconnected))
        .count();

    assert_eq!(disconnections, 1);
    assert!(matches!(client.send("$GPGGA"), Err(Error::NotStreaming)));
}

#[tokio::test]
async fn uplink_ordering() {
    init_logger();

    let caster = Caster::bind().await;
    let client = StreamingClient::new(caster.config());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (_, mut stream) = caster.accept("HTTP/1.1 200 OK").await;

        let mut lines = Vec::new();
        for _ in 0..3 {
            lines.push(read_line(&mut stream).await);
        }
        lines
    });

    client.connect(tx).await.unwrap();

    for i in 0..3 {
        client.send(&format!("LINE{}", i)).unwrap();
    }

    assert_eq!(
        server.await.unwrap(),
        vec!["LINE0\r\n", "LINE1\r\n", "LINE2\r\n"]
    );

    for i in 0..3 {
        assert_eq!(
            wait_for(&mut rx, |event| matches!(event, ConnectionEvent::UplinkSent(_))).await,
            ConnectionEvent::UplinkSent(format!("LINE{}", i))
        );
    }

    client.disconnect().await;
}
