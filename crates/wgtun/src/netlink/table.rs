//! rtnetlink-backed [`RouteTable`].

use tokio::sync::Mutex;

use super::attr::{family_of, ip_bytes};
use super::builder::MessageBuilder;
use super::connection::{Connection, ack_request, dump_request};
use super::message::{NLM_F_CREATE, NLM_F_EXCL, NlMsgType};
use super::kernel_index;
use super::messages::{
    AddressMessage, IFA_F_PERMANENT, IfAddrMsg, RT_SCOPE_LINK, RT_TABLE_MAIN, RTN_UNICAST,
    RTPROT_STATIC, RouteMessage, RtMsg, ifa, parse_payload, rta,
};
use crate::config::Prefix;
use crate::error::Result;
use crate::interface_id::InterfaceId;
use crate::net::{AddressEntry, RouteEntry, RouteTable};

/// Kernel address and main routing table over a NETLINK_ROUTE socket.
///
/// Requests are serialized so replies are never interleaved.
pub struct NetlinkTable {
    conn: Mutex<Connection>,
}

impl NetlinkTable {
    pub fn new() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::new()?),
        })
    }
}

fn address_header(prefix: &Prefix, index: u32) -> IfAddrMsg {
    IfAddrMsg {
        ifa_family: family_of(&prefix.addr()),
        ifa_prefixlen: prefix.cidr(),
        ifa_flags: IFA_F_PERMANENT,
        ifa_scope: 0,
        ifa_index: index,
    }
}

fn route_header(destination: &Prefix) -> RtMsg {
    RtMsg {
        rtm_family: family_of(&destination.addr()),
        rtm_dst_len: destination.cidr(),
        rtm_table: RT_TABLE_MAIN,
        rtm_protocol: RTPROT_STATIC,
        rtm_scope: RT_SCOPE_LINK,
        rtm_type: RTN_UNICAST,
        ..Default::default()
    }
}

/// RTM_NEWROUTE for `destination` through interface `index`.
///
/// No `NLM_F_EXCL`: the kernel only rejects an identical route on the same
/// device with EEXIST, while the same destination on another device is
/// added alongside it.
fn route_request(destination: &Prefix, index: u32) -> MessageBuilder {
    let mut builder = ack_request(NlMsgType::RTM_NEWROUTE, NLM_F_CREATE);
    builder.append(&route_header(destination));
    if destination.cidr() > 0 {
        builder.append_attr(rta::DST, &ip_bytes(&destination.addr()));
    }
    builder.append_attr_u32(rta::OIF, index);
    builder.append_attr_u32(rta::PRIORITY, 0);
    builder
}

impl RouteTable for NetlinkTable {
    async fn add_address(&self, interface: InterfaceId, prefix: Prefix) -> Result<()> {
        let index = kernel_index(interface)?;
        let addr = ip_bytes(&prefix.addr());

        let mut builder = ack_request(NlMsgType::RTM_NEWADDR, NLM_F_CREATE | NLM_F_EXCL);
        builder.append(&address_header(&prefix, index));
        builder.append_attr(ifa::LOCAL, &addr);
        builder.append_attr(ifa::ADDRESS, &addr);

        tracing::debug!(%interface, %prefix, "RTM_NEWADDR");
        self.conn.lock().await.request_ack(builder).await
    }

    async fn addresses(&self) -> Result<Vec<AddressEntry>> {
        let mut builder = dump_request(NlMsgType::RTM_GETADDR);
        builder.append(&IfAddrMsg::default());

        let replies = self.conn.lock().await.dump(builder).await?;

        let mut entries = Vec::with_capacity(replies.len());
        for (ty, payload) in replies {
            if ty != NlMsgType::RTM_NEWADDR {
                continue;
            }
            let msg = parse_payload(&payload, AddressMessage::parse)?;
            let Some(addr) = msg.address else { continue };
            let Ok(prefix) = Prefix::new(addr, msg.header.ifa_prefixlen) else {
                continue;
            };
            entries.push(AddressEntry {
                interface: InterfaceId::from_index(msg.header.ifa_index),
                prefix,
            });
        }

        Ok(entries)
    }

    async fn delete_address(&self, entry: &AddressEntry) -> Result<()> {
        let index = kernel_index(entry.interface)?;

        let mut builder = ack_request(NlMsgType::RTM_DELADDR, 0);
        let mut header = address_header(&entry.prefix, index);
        header.ifa_flags = 0;
        builder.append(&header);
        builder.append_attr(ifa::LOCAL, &ip_bytes(&entry.prefix.addr()));

        tracing::debug!(interface = %entry.interface, prefix = %entry.prefix, "RTM_DELADDR");
        self.conn.lock().await.request_ack(builder).await
    }

    async fn add_route(&self, interface: InterfaceId, destination: Prefix) -> Result<()> {
        let index = kernel_index(interface)?;

        let builder = route_request(&destination, index);

        tracing::debug!(%interface, %destination, "RTM_NEWROUTE");
        self.conn.lock().await.request_ack(builder).await
    }

    async fn routes(&self) -> Result<Vec<RouteEntry>> {
        let mut builder = dump_request(NlMsgType::RTM_GETROUTE);
        builder.append(&RtMsg::default());

        let replies = self.conn.lock().await.dump(builder).await?;

        let mut entries = Vec::new();
        for (ty, payload) in replies {
            if ty != NlMsgType::RTM_NEWROUTE {
                continue;
            }
            let msg = parse_payload(&payload, RouteMessage::parse)?;
            if msg.table != RT_TABLE_MAIN as u32 {
                continue;
            }
            let Some(oif) = msg.oif else { continue };

            let destination = match msg.destination {
                Some(addr) => Prefix::new(addr, msg.header.rtm_dst_len),
                None if msg.header.rtm_family == libc::AF_INET6 as u8 => {
                    Prefix::new(std::net::Ipv6Addr::UNSPECIFIED.into(), 0)
                }
                None => Prefix::new(std::net::Ipv4Addr::UNSPECIFIED.into(), 0),
            };
            let Ok(destination) = destination else { continue };

            entries.push(RouteEntry {
                interface: InterfaceId::from_index(oif),
                destination,
                metric: msg.priority.unwrap_or(0),
            });
        }

        Ok(entries)
    }

    async fn delete_route(&self, entry: &RouteEntry) -> Result<()> {
        let index = kernel_index(entry.interface)?;

        let mut builder = ack_request(NlMsgType::RTM_DELROUTE, 0);
        let mut header = route_header(&entry.destination);
        header.rtm_protocol = 0;
        header.rtm_scope = 0;
        header.rtm_type = 0;
        builder.append(&header);
        if entry.destination.cidr() > 0 {
            builder.append_attr(rta::DST, &ip_bytes(&entry.destination.addr()));
        }
        builder.append_attr_u32(rta::OIF, index);
        builder.append_attr_u32(rta::PRIORITY, entry.metric);

        tracing::debug!(interface = %entry.interface, destination = %entry.destination, "RTM_DELROUTE");
        self.conn.lock().await.request_ack(builder).await
    }
}
