//! axum の WebSocket を使ったトランスポート実装
//!
//! ## 責務
//!
//! - `WebSocket` を読み込み側と書き込み側に分割
//! - axum の `Message` と `InboundFrame` の相互変換
//!
//! ## 設計ノート
//!
//! WebSocket の受付（アップグレード）は UI 層（`ui/handler/websocket.rs`）で行われます。
//! この実装はアップグレード済みのソケットを受け取り、ポンプに渡せる形にします。
//! デッドラインはポンプ側のタイマーで管理されるため、ここでは扱いません。

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};

use crate::domain::{InboundFrame, TransportError, TransportReader, TransportWriter};

/// Split an upgraded socket into its reader and writer halves
pub fn split(socket: WebSocket) -> (WsReader, WsWriter) {
    let (sink, stream) = socket.split();
    (WsReader { stream }, WsWriter { sink })
}

/// 読み込み側（read pump が所有）
pub struct WsReader {
    stream: SplitStream<WebSocket>,
}

/// 書き込み側（write pump が所有）
pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
}

impl From<Message> for InboundFrame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => InboundFrame::Text(text.as_str().to_owned()),
            Message::Binary(bytes) => InboundFrame::Binary(bytes.to_vec()),
            Message::Ping(_) => InboundFrame::Ping,
            Message::Pong(_) => InboundFrame::Pong,
            Message::Close(_) => InboundFrame::Close,
        }
    }
}

#[async_trait]
impl TransportReader for WsReader {
    async fn read_frame(&mut self) -> Result<Option<InboundFrame>, TransportError> {
        match self.stream.next().await {
            Some(Ok(message)) => Ok(Some(message.into())),
            Some(Err(e)) => Err(TransportError::Io(e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TransportWriter for WsWriter {
    async fn write_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn write_ping(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Ping(Default::default()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // the peer may already be gone; the close frame is best effort
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            tracing::debug!("Failed to send close frame: {}", e);
        }
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_to_inbound_frame() {
        // テスト項目: axum の Message が InboundFrame に変換される
        // given (前提条件):
        let text = Message::Text("{\"type\":\"ping\"}".into());
        let binary = Message::Binary(vec![1u8, 2, 3].into());

        // when (操作):
        let text = InboundFrame::from(text);
        let binary = InboundFrame::from(binary);
        let pong = InboundFrame::from(Message::Pong(Default::default()));
        let close = InboundFrame::from(Message::Close(None));

        // then (期待する結果):
        assert_eq!(text, InboundFrame::Text("{\"type\":\"ping\"}".to_string()));
        assert_eq!(binary, InboundFrame::Binary(vec![1, 2, 3]));
        assert_eq!(pong, InboundFrame::Pong);
        assert_eq!(close, InboundFrame::Close);
    }
}
