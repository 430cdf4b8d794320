//! # Broadcast Scenarios
//!
//! One frame fanned out to the registered clients, with exclusions.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tether_net::{Callback, Client};
    use tether_types::CorrelationId;
    use tether_wire::{Request, Response};
    use tokio::sync::mpsc;

    use crate::harness::{connected_client, server_side, silent_server, NOTE};

    /// A connected client whose unsolicited messages are forwarded to the
    /// returned channel.
    async fn listening_client(
        server: &tether_net::Server,
        port: u16,
    ) -> (Client, mpsc::UnboundedReceiver<Response>) {
        let client = connected_client(server, port).await;
        let (tx, rx) = mpsc::unbounded_channel();
        client.set_callback(Callback::on_recv(move |_, response| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(response);
            }
        }));
        (client, rx)
    }

    async fn received(rx: &mut mpsc::UnboundedReceiver<Response>) -> Response {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("broadcast arrives within 2s")
            .expect("client callback alive")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_broadcast_skips_excluded_client() {
        let (server, port) = silent_server().await;
        let (client1, mut rx1) = listening_client(&server, port).await;
        let (client2, mut rx2) = listening_client(&server, port).await;
        let (client3, mut rx3) = listening_client(&server, port).await;
        assert_eq!(server.client_count(), 3);

        let excluded = server_side(&server, &client2).id();
        let request = Request::new(NOTE, b"to everyone but two".to_vec());
        let report = server.broadcast(&request, &[excluded]).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.excluded, 1);
        assert!(report.is_complete());

        let first = received(&mut rx1).await;
        let third = received(&mut rx3).await;
        assert_eq!(first.content(), request.content());
        assert_eq!(third.content(), request.content());
        assert_eq!(first.correlation_id(), third.correlation_id());

        // Give the excluded client ample time to (wrongly) receive it
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx2.try_recv().is_err());

        for client in [client1, client2, client3] {
            client.disconnect().await;
        }
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_broadcast_to_explicit_targets() {
        let (server, port) = silent_server().await;
        let (client1, mut rx1) = listening_client(&server, port).await;
        let (client2, mut rx2) = listening_client(&server, port).await;

        let target = server_side(&server, &client1);
        let request = Request::new(NOTE, b"just one".to_vec());
        let report = server.broadcast_to(&request, &[target], &[]).await.unwrap();
        assert_eq!(report.delivered, 1);

        assert_eq!(received(&mut rx1).await.content(), b"just one");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx2.try_recv().is_err());

        client1.disconnect().await;
        client2.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_broadcast_survives_a_departed_client() {
        let (server, port) = silent_server().await;
        let (client1, mut rx1) = listening_client(&server, port).await;
        let (client2, _rx2) = listening_client(&server, port).await;

        // Snapshot taken while both are registered, then one leaves
        let targets = server.clients();
        client2.disconnect().await;
        crate::harness::wait_until(|| server.client_count() == 1).await;

        let request = Request::new(NOTE, b"still here?".to_vec());
        let report = server.broadcast_to(&request, &targets, &[]).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.success_rate(), 0.5);
        assert_eq!(received(&mut rx1).await.content(), b"still here?");

        client1.disconnect().await;
        server.close_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unknown_exclusion_is_ignored() {
        let (server, port) = silent_server().await;
        let (client, mut rx) = listening_client(&server, port).await;

        let request = Request::new(NOTE, b"hello".to_vec())
            .with_correlation_id(CorrelationId::new());
        let report = server
            .broadcast(&request, &[tether_net::PeerId::new(9_999)])
            .await
            .unwrap();

        assert_eq!(report.excluded, 0);
        assert_eq!(received(&mut rx).await.correlation_id(), request.correlation_id());

        client.disconnect().await;
        server.close_all().await;
    }
}
