//! The outstanding request of a link.

use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::trace;

use crate::dialect::Dialect;
use crate::error::LinkResult;

/// Completion side of a transaction, held by the waiting caller.
pub(crate) type Completion<D> = Receiver<LinkResult<<D as Dialect>::Reply>>;

/// A request waiting for its reply.
///
/// Created by the caller and parked in the link's receive state until the
/// receive path completes it or the caller abandons it on timeout.
pub(crate) struct Transaction<D: Dialect> {
    /// Sequence number, unique per link.
    pub seq: u64,
    /// The request as sent.
    pub request: D::Request,
    /// Maximum reply length the caller asked for.
    pub reply_len: usize,
    /// When the request was handed to the transport.
    pub started: Instant,
    completion: Sender<LinkResult<D::Reply>>,
}

impl<D: Dialect> Transaction<D> {
    pub fn new(seq: u64, request: D::Request, reply_len: usize) -> (Self, Completion<D>) {
        let (completion, waiter) = crossbeam_channel::bounded(1);
        let txn = Transaction {
            seq,
            request,
            reply_len,
            started: Instant::now(),
            completion,
        };
        (txn, waiter)
    }

    /// Hand the result to the waiting caller.
    pub fn complete(self, result: LinkResult<D::Reply>) {
        if self.completion.send(result).is_err() {
            trace!("transaction #{} completed after its caller left", self.seq);
        }
    }
}

impl<D: Dialect> std::fmt::Debug for Transaction<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("seq", &self.seq)
            .field("request", &self.request)
            .field("reply_len", &self.reply_len)
            .finish()
    }
}
