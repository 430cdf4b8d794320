//! # Request / Reply Scenarios
//!
//! `send_and_wait` against echoing and silent servers, concurrent callers,
//! late replies and ping latency.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use futures::future::join_all;
    use tether_net::Callback;
    use tether_types::system::PONG;
    use tether_wire::Request;

    use crate::harness::{connected_client, echo_server, server_side, silent_server, ECHO, NOTE};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_echo_reply_within_timeout() {
        let (server, port) = echo_server().await;
        let client = connected_client(&server, port).await;

        let request = Request::new(ECHO, b"hello tether".to_vec());
        let started = Instant::now();
        let reply = client
            .send_and_wait(&request, Duration::from_secs(1))
            .await
            .unwrap()
            .expect("echo server replies");

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(reply.content(), request.content());
        assert_eq!(reply.correlation_id(), request.correlation_id());
        assert_eq!(reply.message_type(), &ECHO);

        client.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_silent_server_times_out_at_deadline() {
        let (server, port) = silent_server().await;
        let client = connected_client(&server, port).await;

        let started = Instant::now();
        let reply = client
            .send_and_wait(&Request::new(NOTE, b"anyone?".to_vec()), Duration::from_millis(200))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(reply.is_none());
        assert!(elapsed >= Duration::from_millis(190), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "returned late: {elapsed:?}");
        // Timing out leaves the connection usable
        assert!(client.is_connected());

        client.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clients_receive_only_their_own_replies() {
        let (server, port) = echo_server().await;
        let alice = connected_client(&server, port).await;
        let bob = connected_client(&server, port).await;

        let rounds = (0..25).map(|i| {
            let alice = alice.clone();
            let bob = bob.clone();
            async move {
                let a = Request::new(ECHO, format!("alice-{i}"));
                let b = Request::new(ECHO, format!("bob-{i}"));
                let (ra, rb) = tokio::join!(
                    alice.send_and_wait(&a, Duration::from_secs(1)),
                    bob.send_and_wait(&b, Duration::from_secs(1)),
                );
                let (ra, rb) = (ra.unwrap().unwrap(), rb.unwrap().unwrap());
                assert_eq!(ra.correlation_id(), a.correlation_id());
                assert_eq!(ra.content(), a.content());
                assert_eq!(rb.correlation_id(), b.correlation_id());
                assert_eq!(rb.content(), b.content());
            }
        });
        join_all(rounds).await;

        alice.disconnect().await;
        bob.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_requests_on_one_connection() {
        let (server, port) = echo_server().await;
        let client = connected_client(&server, port).await;

        let requests: Vec<_> = (0..32u8)
            .map(|i| Request::new(ECHO, vec![i; 64]))
            .collect();
        let replies = join_all(
            requests
                .iter()
                .map(|request| client.send_and_wait(request, Duration::from_secs(2))),
        )
        .await;

        for (request, reply) in requests.iter().zip(replies) {
            let reply = reply.unwrap().expect("every request is answered");
            assert_eq!(reply.correlation_id(), request.correlation_id());
            assert_eq!(reply.content(), request.content());
        }

        client.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_correlated_reply_skips_on_recv() {
        let (server, port) = echo_server().await;
        let client = connected_client(&server, port).await;
        let unsolicited = Arc::new(AtomicUsize::new(0));
        {
            let unsolicited = Arc::clone(&unsolicited);
            client.set_callback(Callback::on_recv(move |_, _| {
                let unsolicited = Arc::clone(&unsolicited);
                async move {
                    unsolicited.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        let reply = client
            .send_and_wait(&Request::new(ECHO, b"mine".to_vec()), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(reply.is_some());

        // A fire-and-forget message is echoed too, and that echo has no waiter
        client.send(&Request::new(ECHO, b"stray".to_vec())).await.unwrap();
        crate::harness::wait_until(|| unsolicited.load(Ordering::SeqCst) == 1).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(unsolicited.load(Ordering::SeqCst), 1);

        client.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_late_reply_is_consumed() {
        let (server, port) = silent_server().await;
        server.set_callback(Callback::on_recv(|peer, message| async move {
            let reply = message.respond(message.content().to_vec());
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                let _ = peer.send(&reply).await;
            });
        }));

        let client = connected_client(&server, port).await;
        let delivered = Arc::new(AtomicUsize::new(0));
        {
            let delivered = Arc::clone(&delivered);
            client.set_callback(Callback::on_recv(move |_, _| {
                let delivered = Arc::clone(&delivered);
                async move {
                    delivered.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        let reply = client
            .send_and_wait(&Request::new(ECHO, b"slow".to_vec()), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(reply.is_none());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        let server_link = client.server().unwrap();
        let stats = server_link.connection().pending().stats();
        assert_eq!(stats.total_late.load(Ordering::Relaxed), 1);
        assert_eq!(stats.total_timeouts.load(Ordering::Relaxed), 1);

        client.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ping_server_reports_latency() {
        let (server, port) = silent_server().await;
        let client = connected_client(&server, port).await;

        let pong = client
            .ping_server(Duration::from_secs(1))
            .await
            .unwrap()
            .expect("server answers PING without any callback");

        assert_eq!(pong.message_type(), &PONG);
        assert!(pong.latency() >= 0);
        assert!(pong.latency() < 1000);

        client.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ping_client_reports_latency() {
        let (server, port) = silent_server().await;
        let client = connected_client(&server, port).await;
        let peer = server_side(&server, &client);

        let pong = server
            .ping_client(&peer, Duration::from_secs(1))
            .await
            .unwrap()
            .expect("client answers PING");
        assert!(pong.latency() >= 0);

        client.disconnect().await;
        server.close_all().await;
    }
}
