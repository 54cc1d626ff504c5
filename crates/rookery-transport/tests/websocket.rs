//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! with a `tokio-tungstenite` client.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use rookery_transport::{Connection, Transport, WebSocketConnection, WebSocketTransport};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    /// Binds a transport on a random port and returns a connected
    /// client/server pair.
    async fn connected_pair() -> (ClientWs, WebSocketConnection) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have local addr");

        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let server = server_handle.await.expect("task should complete");
        (client, server)
    }

    #[tokio::test]
    async fn test_websocket_send_json_arrives_as_text_frame() {
        let (mut client, server) = connected_pair().await;
        assert!(server.id().into_inner() > 0);

        server
            .send(br#"{"type":"get_state"}"#)
            .await
            .expect("send should succeed");

        let msg = client.next().await.unwrap().unwrap();
        match msg {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{"type":"get_state"}"#),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_recv_accepts_text_and_binary() {
        let (mut client, server) = connected_pair().await;

        client
            .send(Message::Text("hello".to_string().into()))
            .await
            .unwrap();
        client
            .send(Message::Binary(vec![0xff, 0x00].into()))
            .await
            .unwrap();

        let first = server.recv().await.expect("recv").expect("data");
        assert_eq!(first, b"hello");
        let second = server.recv().await.expect("recv").expect("data");
        assert_eq!(second, vec![0xff, 0x00]);
    }

    #[tokio::test]
    async fn test_websocket_send_while_recv_pending_does_not_block() {
        let (mut client, server) = connected_pair().await;
        let server = Arc::new(server);

        // Park a receiver on the connection, then push from another task.
        let reader = Arc::clone(&server);
        let pending = tokio::spawn(async move { reader.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), server.send(b"push"))
            .await
            .expect("send must not wait on the pending recv")
            .expect("send should succeed");

        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"push");

        client.send(Message::Close(None)).await.unwrap();
        let result = pending.await.unwrap().expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }
}
