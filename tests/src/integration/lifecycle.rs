//! # Connection Lifecycle Scenarios
//!
//! Registry bookkeeping across connects and disconnects, pending requests
//! aborted by a disconnect, and corrupted input from a raw socket.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use tether_net::{Callback, Client, ClientConfig, ConnectionError, Server, ServerConfig};
    use tether_types::CorrelationId;
    use tether_wire::{encode, read_frame, Request, MAX_CONTENT_LEN};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    use crate::harness::{
        connected_client, echo_server, registry, server_side, silent_server, wait_until, ECHO,
        NOTE,
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disconnect_shrinks_registry_by_one() {
        let (server, port) = silent_server().await;
        let leaving = connected_client(&server, port).await;
        let staying = connected_client(&server, port).await;
        assert_eq!(server.client_count(), 2);

        let leaving_id = server_side(&server, &leaving).id();
        leaving.disconnect().await;
        wait_until(|| server.client_count() == 1).await;

        assert!(server.client(leaving_id).is_none());
        assert!(server_side(&server, &staying).is_connected());

        staying.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_client_pending_request_released_on_disconnect() {
        let (server, port) = silent_server().await;
        let client = connected_client(&server, port).await;
        let peer = server_side(&server, &client);

        let waiter = {
            let client = client.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let result = client
                    .send_and_wait(&Request::new(NOTE, b"hold".to_vec()), Duration::from_secs(10))
                    .await;
                (result, started.elapsed())
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        server.close_client(&peer);
        let (result, elapsed) = waiter.await.unwrap();

        assert!(matches!(result, Ok(None)));
        assert!(elapsed < Duration::from_secs(2), "waiter hung for {elapsed:?}");
        wait_until(|| !client.is_connected()).await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_server_pending_request_released_when_client_leaves() {
        let (server, port) = silent_server().await;
        let client = connected_client(&server, port).await;
        let peer = server_side(&server, &client);

        let waiter = {
            let server = server.clone();
            let peer = peer.clone();
            tokio::spawn(async move {
                server
                    .send_and_wait(&peer, &Request::new(NOTE, b"hold".to_vec()), Duration::from_secs(10))
                    .await
            })
        };
        wait_until(|| peer.connection().pending().pending_count() == 1).await;

        client.disconnect().await;

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter released by the disconnect")
            .unwrap();
        assert!(matches!(result, Ok(None)));
        assert_eq!(peer.connection().pending().pending_count(), 0);
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_connect_and_disconnect_fire_once() {
        let (server, port) = silent_server().await;
        let connects = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        {
            let connects = Arc::clone(&connects);
            server.set_callback(Callback::on_connect(move |_| {
                let connects = Arc::clone(&connects);
                async move {
                    connects.fetch_add(1, Ordering::SeqCst);
                }
            }));
            let disconnects = Arc::clone(&disconnects);
            server.set_callback(Callback::on_disconnect(move |_| {
                let disconnects = Arc::clone(&disconnects);
                async move {
                    disconnects.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        let client = connected_client(&server, port).await;
        wait_until(|| connects.load(Ordering::SeqCst) == 1).await;

        // Close from both ends at once
        let peer = server_side(&server, &client);
        server.close_client(&peer);
        client.disconnect().await;
        wait_until(|| disconnects.load(Ordering::SeqCst) == 1).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reconnect_after_disconnect() {
        let (server, port) = echo_server().await;
        let client = connected_client(&server, port).await;

        assert!(matches!(
            client.connect().await,
            Err(ConnectionError::AlreadyConnected)
        ));

        client.disconnect().await;
        assert!(!client.is_connected());
        wait_until(|| server.client_count() == 0).await;

        client.connect().await.unwrap();
        let reply = client
            .send_and_wait(&Request::new(ECHO, b"again".to_vec()), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.unwrap().content(), b"again");

        client.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_client_limit() {
        let server = Server::new(
            ServerConfig {
                max_clients: 2,
                ..ServerConfig::for_testing()
            },
            registry(),
        );
        let port = server.start().await.unwrap().port();

        let first = connected_client(&server, port).await;
        let second = connected_client(&server, port).await;

        let third = Client::new(ClientConfig::for_testing(port), registry());
        third.connect().await.unwrap();
        wait_until(|| !third.is_connected()).await;
        assert_eq!(server.client_count(), 2);

        // A slot frees up once someone leaves
        first.disconnect().await;
        wait_until(|| server.client_count() == 1).await;
        third.connect().await.unwrap();
        wait_until(|| server.client_count() == 2).await;

        second.disconnect().await;
        third.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_corrupted_frame_is_never_delivered() {
        let (server, port) = echo_server().await;
        let delivered = Arc::new(AtomicUsize::new(0));
        {
            let delivered = Arc::clone(&delivered);
            server.set_callback(Callback::on_recv(move |peer, message| {
                let delivered = Arc::clone(&delivered);
                async move {
                    delivered.fetch_add(1, Ordering::SeqCst);
                    let _ = peer.send(&message.respond(message.content().to_vec())).await;
                }
            }));
        }

        let mut raw = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut corrupted = encode(ECHO.code(), b"tampered", CorrelationId::new()).unwrap();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0x80;
        let intact_id = CorrelationId::new();
        raw.write_all(&corrupted).await.unwrap();
        raw.write_all(&encode(ECHO.code(), b"intact", intact_id).unwrap())
            .await
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(2), read_frame(&mut raw, MAX_CONTENT_LEN))
            .await
            .expect("echo of the intact frame")
            .unwrap()
            .expect("connection still open");

        assert_eq!(reply.content(), b"intact");
        assert_eq!(reply.correlation_id(), intact_id);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(server.client_count(), 1);

        let peer = server.clients().remove(0);
        assert_eq!(peer.connection().stats().frames_dropped.load(Ordering::Relaxed), 1);
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_truncated_frame_closes_connection() {
        let (server, port) = silent_server().await;
        let mut raw = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        wait_until(|| server.client_count() == 1).await;

        let frame = encode(NOTE.code(), b"cut short", CorrelationId::new()).unwrap();
        raw.write_all(&frame[..20]).await.unwrap();
        drop(raw);

        wait_until(|| server.client_count() == 0).await;
        server.close_all().await;
    }
}
