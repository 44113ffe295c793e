//! Sends awaiting acknowledgment.
//!
//! An envelope stays here from the moment the caller submits it until the
//! server answers with `send-ack` or `send-failed`. After a reconnect every
//! remaining envelope is resent with its original `client_message_id`, which
//! the server's dedup window turns into at most one delivery.

use std::collections::VecDeque;

use tayori_shared::protocol::{DeliveryReceipt, OutboundEnvelope, SendFailureReason};
use tokio::sync::oneshot;

use crate::error::ClientError;

pub type SendResponder = oneshot::Sender<Result<DeliveryReceipt, ClientError>>;

struct PendingSend {
    envelope: OutboundEnvelope,
    responders: Vec<SendResponder>,
}

/// Pending sends in submission order
#[derive(Default)]
pub struct Outbox {
    pending: VecDeque<PendingSend>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `envelope` and the caller waiting on it.
    ///
    /// # Returns
    ///
    /// `true` if the envelope is new and must be written to the transport;
    /// `false` if the same `client_message_id` is already pending, in which
    /// case the caller just joins the existing wait
    pub fn enqueue(&mut self, envelope: OutboundEnvelope, responder: SendResponder) -> bool {
        if let Some(pending) = self.find_mut(&envelope.client_message_id) {
            pending.responders.push(responder);
            return false;
        }

        self.pending.push_back(PendingSend {
            envelope,
            responders: vec![responder],
        });
        true
    }

    pub fn acknowledge(&mut self, receipt: DeliveryReceipt) {
        let Some(pending) = self.take(&receipt.client_message_id) else {
            tracing::debug!(
                "Ack for '{}' with nothing pending",
                receipt.client_message_id
            );
            return;
        };
        for responder in pending.responders {
            let _ = responder.send(Ok(receipt.clone()));
        }
    }

    pub fn reject(&mut self, client_message_id: &str, reason: SendFailureReason) {
        let Some(pending) = self.take(client_message_id) else {
            return;
        };
        let error = ClientError::SendFailed {
            client_message_id: client_message_id.to_string(),
            reason,
        };
        for responder in pending.responders {
            let _ = responder.send(Err(error.clone()));
        }
    }

    /// Envelopes to resend after reconnecting, oldest first
    pub fn unacknowledged(&self) -> Vec<OutboundEnvelope> {
        self.pending.iter().map(|p| p.envelope.clone()).collect()
    }

    /// Fail every pending send (the client is closing for good)
    pub fn fail_all(&mut self, error: &ClientError) {
        for pending in self.pending.drain(..) {
            for responder in pending.responders {
                let _ = responder.send(Err(error.clone()));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn find_mut(&mut self, client_message_id: &str) -> Option<&mut PendingSend> {
        self.pending
            .iter_mut()
            .find(|p| p.envelope.client_message_id == client_message_id)
    }

    fn take(&mut self, client_message_id: &str) -> Option<PendingSend> {
        let index = self
            .pending
            .iter()
            .position(|p| p.envelope.client_message_id == client_message_id)?;
        self.pending.remove(index)
    }
}
