//! Request/response handling over a [`NetlinkSocket`].

use super::builder::MessageBuilder;
use super::message::{MessageIter, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NlMsgError};
use super::socket::NetlinkSocket;
use crate::error::{Error, Result};

/// A message received in reply to a request: its type and payload.
pub type Reply = (u16, Vec<u8>);

pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new()?,
        })
    }

    async fn send(&self, mut builder: MessageBuilder) -> Result<u32> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg).await?;
        Ok(seq)
    }

    /// Send a request and return the reply addressed to it.
    pub async fn request(&self, builder: MessageBuilder) -> Result<Reply> {
        let seq = self.send(builder).await?;

        loop {
            let data = self.socket.recv_msg().await?;
            for result in MessageIter::new(&data) {
                let (header, payload) = result?;

                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_error() {
                    check_error(payload)?;
                    continue;
                }

                return Ok((header.nlmsg_type, payload.to_vec()));
            }
        }
    }

    /// Send a request that expects an ACK only (no data response).
    pub async fn request_ack(&self, builder: MessageBuilder) -> Result<()> {
        let seq = self.send(builder).await?;
        let response = self.socket.recv_msg().await?;
        process_ack(&response, seq)
    }

    /// Send a dump request and collect every reply until DONE.
    pub async fn dump(&self, builder: MessageBuilder) -> Result<Vec<Reply>> {
        let seq = self.send(builder).await?;
        let mut responses = Vec::new();

        loop {
            let data = self.socket.recv_msg().await?;

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;

                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_error() {
                    check_error(payload)?;
                    continue;
                }

                if header.is_done() {
                    return Ok(responses);
                }

                responses.push((header.nlmsg_type, payload.to_vec()));
            }
        }
    }

    /// Join a multicast group for monitoring.
    pub fn subscribe(&mut self, group: u32) -> Result<()> {
        self.socket.add_membership(group)
    }

    /// Receive the next multicast datagram.
    pub async fn recv_event(&self) -> Result<Vec<u8>> {
        self.socket.recv_msg().await
    }
}

fn check_error(payload: &[u8]) -> Result<()> {
    let err = NlMsgError::from_bytes(payload)?;
    if err.is_ack() {
        Ok(())
    } else {
        Err(Error::from_errno(err.error))
    }
}

fn process_ack(data: &[u8], expected_seq: u32) -> Result<()> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if header.nlmsg_seq != expected_seq {
            continue;
        }

        if header.is_error() {
            return check_error(payload);
        }
    }

    Err(Error::InvalidMessage("expected ACK message".into()))
}

pub fn dump_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_DUMP)
}

pub fn ack_request(msg_type: u16, flags: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_ACK | flags)
}
