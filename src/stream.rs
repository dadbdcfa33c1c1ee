//! NDJSON framing for streamed widget output.
//!
//! Each frame is one line. A batch frame is `{"data":[...]}`; a producer may
//! also send a whole payload as a single frame.

use crate::error::{EngineError, Result};

use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Frames buffered before the producer waits on the client.
pub const FRAME_BUFFER: usize = 16;

/// Encode one value as a newline-terminated frame.
pub fn frame_value(value: &Value) -> Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

/// Encode one batch as a newline-terminated frame.
pub fn frame(rows: Vec<Value>) -> Result<String> {
    frame_value(&json!({ "data": rows }))
}

/// Sending half of a frame stream.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<String>,
}

impl FrameSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn send(&self, rows: Vec<Value>) -> Result<()> {
        self.send_line(frame(rows)?).await
    }

    pub async fn send_value(&self, value: &Value) -> Result<()> {
        self.send_line(frame_value(value)?).await
    }

    async fn send_line(&self, line: String) -> Result<()> {
        self.tx
            .send(line)
            .await
            .map_err(|_| EngineError::Transport("stream receiver closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_frame_is_one_line() {
        let line = frame(vec![json!({"a": 1}), json!({"a": 2})]).unwrap();
        assert_eq!(line, "{\"data\":[{\"a\":1},{\"a\":2}]}\n");
    }

    #[tokio::test]
    async fn test_whole_value_is_one_frame() {
        let (sender, mut rx) = FrameSender::channel(1);
        assert_ok!(sender.send_value(&json!({"done": true, "data": []})).await);
        assert_eq!(rx.recv().await.unwrap(), "{\"done\":true,\"data\":[]}\n");
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (sender, rx) = FrameSender::channel(1);
        drop(rx);
        let err = assert_err!(sender.send(vec![]).await);
        assert!(matches!(err, EngineError::Transport(_)));
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (sender, mut rx) = FrameSender::channel(4);
        assert_ok!(sender.send(vec![json!(1)]).await);
        assert_ok!(sender.send(vec![json!(2)]).await);
        drop(sender);
        assert_eq!(rx.recv().await.unwrap(), "{\"data\":[1]}\n");
        assert_eq!(rx.recv().await.unwrap(), "{\"data\":[2]}\n");
        assert!(rx.recv().await.is_none());
    }
}
