//! Integration tests for the WebSocket transport.
//!
//! A real listener on an OS-assigned port and a real `tokio-tungstenite`
//! client, so frames actually cross a socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use mathduel_transport::{
        Connection, Transport, WebSocketConnection, WebSocketTransport,
    };
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn pair() -> (WebSocketConnection, ClientWs) {
        pair_at("/").await
    }

    async fn pair_at(path: &str) -> (WebSocketConnection, ClientWs) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("bound address");

        let server = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let (client, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
                .await
                .expect("client should connect");
        let conn = server.await.expect("accept task");
        (conn, client)
    }

    #[tokio::test]
    async fn test_utf8_frames_arrive_as_text() {
        let (conn, mut client) = pair().await;

        conn.send(br#"{"type":"registered"}"#).await.expect("send");

        let msg = client.next().await.unwrap().expect("client recv");
        match msg {
            Message::Text(text) => {
                assert_eq!(text.as_str(), r#"{"type":"registered"}"#)
            }
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recv_accepts_text_and_binary() {
        let (conn, mut client) = pair().await;

        client
            .send(Message::Text("hello".to_owned().into()))
            .await
            .expect("client send");
        client
            .send(Message::Binary(vec![1u8, 2, 3].into()))
            .await
            .expect("client send");

        assert_eq!(conn.recv().await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(conn.recv().await.unwrap(), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_send_is_not_blocked_by_pending_recv() {
        let (conn, mut client) = pair().await;
        let conn = std::sync::Arc::new(conn);

        // Park a reader with nothing to read.
        let reader = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), conn.send(b"push"))
            .await
            .expect("send must not wait for the reader")
            .expect("send");

        let msg = client.next().await.unwrap().expect("client recv");
        assert_eq!(&msg.into_data()[..], b"push");
        reader.abort();
    }

    #[tokio::test]
    async fn test_client_close_yields_none() {
        let (conn, mut client) = pair().await;

        client.close(None).await.expect("client close");

        let result = conn.recv().await.expect("clean close is not an error");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_connection_ids_are_distinct() {
        let (a, _ca) = pair().await;
        let (b, _cb) = pair().await;
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_request_path_is_captured() {
        let (conn, _client) = pair_at("/room/k3x9qa").await;
        assert_eq!(conn.path(), "/room/k3x9qa");

        let (root, _client) = pair().await;
        assert_eq!(root.path(), "/");
    }
}
