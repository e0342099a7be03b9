use pg_probe::probe::{ProbeMessage, TimeoutOrCancel};
use pg_probe::{detect, Detector, PostgresProbe, ProbeContext, ProbeTarget, Verdict};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const AUTH_MD5: &[u8] = b"R\0\0\0\x0c\0\0\0\x05\x01\x02\x03\x04";

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// True once the client side has gone away: EOF, or a reset when the client
/// closed with our reply still unread.
async fn client_closed(socket: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => continue,
            }
        }
    })
    .await;
    drained.is_ok()
}

/// Serves one connection: reads a request of `request_len` bytes, answers with
/// `reply`, then reports the request and whether the client hung up.
fn answer_once(
    listener: TcpListener,
    request_len: usize,
    reply: &'static [u8],
) -> JoinHandle<(Vec<u8>, bool)> {
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; request_len];
        socket.read_exact(&mut request).await.unwrap();
        socket.write_all(reply).await.unwrap();
        let closed = client_closed(&mut socket).await;
        (request, closed)
    })
}

fn startup_len() -> usize {
    PostgresProbe::default().message().as_bytes().len()
}

#[tokio::test]
async fn nothing_listening_is_negative() {
    let (listener, port) = bind().await;
    drop(listener);

    let ctx = ProbeContext::new().with_timeout(Duration::from_secs(5));
    assert!(!detect(&ctx, "127.0.0.1", port).await.unwrap());

    let report = PostgresProbe::default()
        .probe(&ctx, &ProbeTarget::new("127.0.0.1", port))
        .await
        .unwrap();
    assert_eq!(report.verdict, Verdict::Unreachable);
}

#[tokio::test]
async fn unresolvable_host_is_negative() {
    let ctx = ProbeContext::new().with_timeout(Duration::from_secs(5));
    let detected = detect(&ctx, "no-such-host.invalid", 5432).await.unwrap();
    assert!(!detected);
}

#[tokio::test]
async fn auth_request_is_detected() {
    let (listener, port) = bind().await;
    let server = answer_once(listener, startup_len(), AUTH_MD5);

    let ctx = ProbeContext::new().with_timeout(Duration::from_secs(5));
    assert!(detect(&ctx, "127.0.0.1", port).await.unwrap());

    let (request, closed) = server.await.unwrap();
    assert_eq!(request, PostgresProbe::default().message().as_bytes());
    assert!(closed, "probe left its socket open");
}

#[tokio::test]
async fn short_reply_then_close_is_negative() {
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; startup_len()];
        socket.read_exact(&mut request).await.unwrap();
        socket.write_all(b"R\0").await.unwrap();
    });

    let report = PostgresProbe::default()
        .probe(
            &ProbeContext::new().with_timeout(Duration::from_secs(5)),
            &ProbeTarget::new("127.0.0.1", port),
        )
        .await
        .unwrap();
    server.await.unwrap();

    assert_eq!(report.verdict, Verdict::Incomplete);
    assert_eq!(report.received, b"R\0");
    assert!(!report.detected());
}

#[tokio::test]
async fn silent_listener_resolves_by_deadline() {
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; startup_len()];
        socket.read_exact(&mut request).await.unwrap();
        client_closed(&mut socket).await
    });

    let deadline = Duration::from_millis(500);
    let start = Instant::now();
    let ctx = ProbeContext::new().with_timeout(deadline);
    let report = PostgresProbe::default()
        .probe(&ctx, &ProbeTarget::new("127.0.0.1", port))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.verdict, Verdict::Cancelled(TimeoutOrCancel::Timeout));
    assert!(elapsed >= deadline);
    assert!(elapsed < deadline + Duration::from_secs(1), "took {elapsed:?}");
    assert!(server.await.unwrap(), "probe left its socket open");
}

#[tokio::test]
async fn one_byte_off_is_negative() {
    let (listener, port) = bind().await;
    let server = answer_once(listener, startup_len(), b"R\0\0\x01");

    let report = PostgresProbe::default()
        .probe(
            &ProbeContext::new().with_timeout(Duration::from_secs(5)),
            &ProbeTarget::new("127.0.0.1", port),
        )
        .await
        .unwrap();

    assert_eq!(report.verdict, Verdict::Mismatched);
    assert_eq!(report.received, b"R\0\0\x01");
    let (_, closed) = server.await.unwrap();
    assert!(closed);
}

#[tokio::test]
async fn non_postgres_banner_is_negative() {
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"SSH-2.0-OpenSSH_9.3\r\n").await.unwrap();
        client_closed(&mut socket).await
    });

    let ctx = ProbeContext::new().with_timeout(Duration::from_secs(5));
    assert!(!detect(&ctx, "127.0.0.1", port).await.unwrap());
    assert!(server.await.unwrap());
}

#[tokio::test]
async fn repeated_probes_are_independent() {
    let (listener, port) = bind().await;
    let request_len = startup_len();
    let server = tokio::spawn(async move {
        let mut accepted = 0;
        for _ in 0..2 {
            let (mut socket, _) = listener.accept().await.unwrap();
            accepted += 1;
            let mut request = vec![0u8; request_len];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(AUTH_MD5).await.unwrap();
            assert!(client_closed(&mut socket).await);
        }
        accepted
    });

    let probe = PostgresProbe::default();
    let target = ProbeTarget::new("127.0.0.1", port);
    for _ in 0..2 {
        let ctx = ProbeContext::new().with_timeout(Duration::from_secs(5));
        assert!(probe.detect(&ctx, &target).await.unwrap());
    }
    assert_eq!(server.await.unwrap(), 2);
}

#[tokio::test]
async fn concurrent_probes_share_one_instance() {
    let (listener, port) = bind().await;
    let request_len = startup_len();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = vec![0u8; request_len];
                if socket.read_exact(&mut request).await.is_ok() {
                    let _ = socket.write_all(AUTH_MD5).await;
                }
            });
        }
    });

    let probe = std::sync::Arc::new(PostgresProbe::default());
    let mut handles = Vec::new();
    for _ in 0..16 {
        let probe = probe.clone();
        handles.push(tokio::spawn(async move {
            let ctx = ProbeContext::new().with_timeout(Duration::from_secs(5));
            probe
                .detect(&ctx, &ProbeTarget::new("127.0.0.1", port))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }
}

#[tokio::test]
async fn ssl_request_shape_matches_fatal_error() {
    let (listener, port) = bind().await;
    let server = answer_once(listener, 8, b"E\0\0\0\x85SFATAL\0VFATAL\0C0A000\0");

    let probe = PostgresProbe::new(ProbeMessage::ssl_request());
    let ctx = ProbeContext::new().with_timeout(Duration::from_secs(5));
    let report = probe
        .probe(&ctx, &ProbeTarget::new("127.0.0.1", port))
        .await
        .unwrap();
    assert_eq!(report.verdict, Verdict::Matched);

    let (request, closed) = server.await.unwrap();
    assert_eq!(request, [0x00, 0x00, 0x00, 0x08, 0x00, 0x03, 0x00, 0x00]);
    assert!(closed);
}

#[tokio::test]
async fn cancelling_mid_read_is_negative() {
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        client_closed(&mut socket).await
    });

    let ctx = ProbeContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let report = PostgresProbe::default()
        .probe(&ctx, &ProbeTarget::new("127.0.0.1", port))
        .await
        .unwrap();
    assert_eq!(report.verdict, Verdict::Cancelled(TimeoutOrCancel::Cancel));
    assert!(server.await.unwrap(), "probe left its socket open");
}
