//! Speech service contracts
//!
//! The recognizer side hands out a push stream plus an event receiver; the
//! synthesis side hands out a lazy chunk stream. Adapters own the provider
//! connection and publish events, they never call back into the session.

use crate::events::{RecognizerEvent, SynthesisEvent};
use crate::{GatewayError, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Commands carried over a recognizer push stream.
#[derive(Debug)]
pub(crate) enum StreamCommand {
    Audio(Vec<u8>),
    Stop,
}

/// Write side of a streaming recognition session.
///
/// Writes are serialized by the underlying channel; `stop` requests graceful
/// termination, after which the adapter emits [`RecognizerEvent::Ended`].
pub struct PushStream {
    tx: mpsc::Sender<StreamCommand>,
}

impl PushStream {
    /// Pair a new push stream with its command receiver (adapter side).
    pub fn channel(buffer: usize) -> (Self, PushStreamReceiver) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, PushStreamReceiver { rx })
    }

    /// Forward PCM bytes to the provider.
    pub async fn write(&self, pcm: Vec<u8>) -> Result<()> {
        self.tx
            .send(StreamCommand::Audio(pcm))
            .await
            .map_err(|_| GatewayError::Recognizer("push stream closed".into()))
    }

    /// Request graceful termination. Safe to call after the stream ended.
    pub async fn stop(&self) {
        let _ = self.tx.send(StreamCommand::Stop).await;
    }
}

/// Adapter-side receiver for push stream commands.
pub struct PushStreamReceiver {
    rx: mpsc::Receiver<StreamCommand>,
}

impl PushStreamReceiver {
    /// Next command, or `None` once the write side is dropped.
    pub async fn recv(&mut self) -> Option<PushStreamItem> {
        self.rx.recv().await.map(|cmd| match cmd {
            StreamCommand::Audio(pcm) => PushStreamItem::Audio(pcm),
            StreamCommand::Stop => PushStreamItem::Stop,
        })
    }
}

/// Item read from a [`PushStreamReceiver`].
#[derive(Debug)]
pub enum PushStreamItem {
    Audio(Vec<u8>),
    Stop,
}

/// A live recognition session: the write side plus its event feed.
pub struct RecognizerSession {
    pub stream: PushStream,
    pub events: mpsc::Receiver<RecognizerEvent>,
}

/// Streaming speech-to-text entry point.
///
/// At most one session per call; the orchestrator enforces this.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Open a streaming session declaring 8 kHz / 16-bit / mono input.
    ///
    /// [`RecognizerEvent::Ready`] is emitted on the session's event feed once
    /// the provider accepts audio.
    async fn start(&self) -> Result<RecognizerSession>;
}

/// Text-to-speech entry point.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Begin synthesis of `text`, returning a finite, non-restartable stream
    /// of PCM chunks terminated by [`SynthesisEvent::End`] or
    /// [`SynthesisEvent::Error`].
    async fn synthesize(&self, text: &str) -> Result<mpsc::Receiver<SynthesisEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_stream_orders_writes_before_stop() {
        let (stream, mut rx) = PushStream::channel(8);
        stream.write(vec![1, 2]).await.unwrap();
        stream.write(vec![3]).await.unwrap();
        stream.stop().await;

        assert!(matches!(rx.recv().await, Some(PushStreamItem::Audio(a)) if a == vec![1, 2]));
        assert!(matches!(rx.recv().await, Some(PushStreamItem::Audio(a)) if a == vec![3]));
        assert!(matches!(rx.recv().await, Some(PushStreamItem::Stop)));
    }

    #[tokio::test]
    async fn test_push_stream_write_after_close_errors() {
        let (stream, rx) = PushStream::channel(1);
        drop(rx);
        assert!(stream.write(vec![0]).await.is_err());
    }
}
