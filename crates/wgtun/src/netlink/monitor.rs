//! Link state notifications over rtnetlink.

use tokio::sync::{Mutex, mpsc};

use super::builder::MessageBuilder;
use super::connection::Connection;
use super::kernel_index;
use super::message::{MessageIter, NLM_F_REQUEST, NlMsgType};
use super::messages::{IfInfoMsg, LinkMessage, parse_payload};
use super::socket::RTNLGRP_LINK;
use crate::error::{Error, Result};
use crate::interface_id::InterfaceId;
use crate::observer::{InterfaceChange, InterfaceMonitor, Subscription};
use crate::status::OperStatus;

/// [`InterfaceMonitor`] backed by the `RTNLGRP_LINK` multicast group.
pub struct NetlinkMonitor {
    conn: Mutex<Connection>,
}

impl NetlinkMonitor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::new()?),
        })
    }
}

/// Translate one datagram of link notifications.
fn link_changes(data: &[u8]) -> Vec<InterfaceChange> {
    let mut changes = Vec::new();

    for result in MessageIter::new(data) {
        let Ok((header, payload)) = result else { break };

        let deleted = match header.nlmsg_type {
            NlMsgType::RTM_NEWLINK => false,
            NlMsgType::RTM_DELLINK => true,
            _ => continue,
        };

        let msg = match parse_payload(payload, LinkMessage::parse) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed link message");
                continue;
            }
        };

        let status = if deleted {
            Some(OperStatus::NotPresent)
        } else {
            msg.operstate.map(OperStatus::from_kernel)
        };

        changes.push(InterfaceChange {
            interface: InterfaceId::from_index(msg.index()),
            status,
        });
    }

    changes
}

impl InterfaceMonitor for NetlinkMonitor {
    fn subscribe(&self) -> Result<Subscription> {
        let mut conn = Connection::new()?;
        conn.subscribe(RTNLGRP_LINK)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            loop {
                // Ending the subscription makes the observer subscribe again
                // and re-read every watched interface, which also recovers
                // notifications the kernel dropped on overrun.
                let data = match conn.recv_event().await {
                    Ok(data) => data,
                    Err(e) if e.errno() == Some(libc::ENOBUFS) => {
                        tracing::info!("link notifications overran the socket buffer");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "link monitor receive failed");
                        return;
                    }
                };

                for change in link_changes(&data) {
                    if tx.send(change).is_err() {
                        return;
                    }
                }
            }
        });

        Ok(Subscription::new(rx, Some(reader)))
    }

    async fn oper_status(&self, interface: InterfaceId) -> Result<OperStatus> {
        let index = kernel_index(interface)?;

        let mut builder = MessageBuilder::new(NlMsgType::RTM_GETLINK, NLM_F_REQUEST);
        builder.append(&IfInfoMsg {
            ifi_index: index as i32,
            ..Default::default()
        });

        let (ty, payload) = self.conn.lock().await.request(builder).await?;
        if ty != NlMsgType::RTM_NEWLINK {
            return Err(Error::InvalidMessage(format!("unexpected reply type {}", ty)));
        }

        let msg = parse_payload(&payload, LinkMessage::parse)?;
        Ok(msg
            .operstate
            .map(OperStatus::from_kernel)
            .unwrap_or(OperStatus::Unknown))
    }
}
