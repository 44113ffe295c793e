//! In-memory transport for controller tests. The test plays the server.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tayori_shared::protocol::{ClientFrame, ServerFrame};
use tokio::{sync::mpsc, time::Instant};

use crate::error::ClientError;

use super::{Connector, FrameSink, FrameStream};

/// Server end of one fake session. Dropping it drops the session.
pub(crate) struct ServerEnd {
    pub to_client: mpsc::UnboundedSender<ServerFrame>,
    pub from_client: mpsc::UnboundedReceiver<ClientFrame>,
}

impl ServerEnd {
    pub fn push(&self, frame: ServerFrame) {
        let _ = self.to_client.send(frame);
    }

    pub async fn next(&mut self) -> Option<ClientFrame> {
        self.from_client.recv().await
    }

    /// Next frame that is not a heartbeat
    pub async fn next_non_heartbeat(&mut self) -> Option<ClientFrame> {
        loop {
            match self.from_client.recv().await? {
                ClientFrame::Heartbeat => continue,
                frame => return Some(frame),
            }
        }
    }
}

type Link = (mpsc::UnboundedReceiver<ServerFrame>, mpsc::UnboundedSender<ClientFrame>);

/// Hands out scripted sessions in order; once the script runs out every
/// attempt is refused.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    script: Arc<Mutex<VecDeque<Option<Link>>>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next attempt to succeed and return the server end.
    pub fn accept_next(&self) -> ServerEnd {
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        self.script
            .lock()
            .unwrap()
            .push_back(Some((client_rx, client_tx)));
        ServerEnd {
            to_client,
            from_client,
        }
    }

    /// Script the next attempt to be refused.
    pub fn refuse_next(&self) {
        self.script.lock().unwrap().push_back(None);
    }

    /// When each connection attempt was made
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), ClientError> {
        self.attempts.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front().flatten();
        match next {
            Some((incoming, outgoing)) => Ok((
                Box::new(FakeSink { outgoing }),
                Box::new(FakeStream { incoming }),
            )),
            None => Err(ClientError::ConnectionError("refused".to_string())),
        }
    }
}

struct FakeSink {
    outgoing: mpsc::UnboundedSender<ClientFrame>,
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send(&mut self, frame: &ClientFrame) -> Result<(), ClientError> {
        self.outgoing
            .send(frame.clone())
            .map_err(|_| ClientError::ConnectionLost("server end dropped".to_string()))
    }

    async fn close(&mut self) {}
}

struct FakeStream {
    incoming: mpsc::UnboundedReceiver<ServerFrame>,
}

#[async_trait]
impl FrameStream for FakeStream {
    async fn next_frame(&mut self) -> Option<Result<ServerFrame, ClientError>> {
        self.incoming.recv().await.map(Ok)
    }
}
