//! pfSense `filterlog` record decoder.
//!
//! A record is a comma-separated token stream whose shape depends on earlier
//! tokens (IP version, protocol number). Fields are consumed strictly in order;
//! running out of tokens fails the whole record.
//!
//! ```text
//! rule,sub-rule,anchor,tracker,iface,reason,action,dir,4,
//!   tos,ecn,ttl,id,offset,flags,proto-id,proto-name,
//!   length,src,dst,
//!   [src-port,dst-port,data-length,]          TCP/UDP
//!   [tcp-flags,seq,ack,window,urg,options,]   TCP
//!   [icmp-type,...]                           ICMP
//! ```

use std::str::FromStr;

use crate::entry::{
    FirewallEntry, ICMP, Ipv4Header, PortFields, ProtocolFields, TCP, TcpFields, UDP,
};
use crate::error::LogPipelineError;

/// Ordered cursor over the comma-separated fields of a record.
struct Fields<'a> {
    tokens: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            tokens: content.split(','),
        }
    }

    fn next(&mut self, field: &'static str) -> Result<&'a str, LogPipelineError> {
        self.tokens.next().ok_or_else(|| LogPipelineError::Decode {
            field,
            reason: "missing field".to_owned(),
        })
    }

    fn owned(&mut self, field: &'static str) -> Result<String, LogPipelineError> {
        self.next(field).map(str::to_owned)
    }

    fn number<T: FromStr>(&mut self, field: &'static str) -> Result<T, LogPipelineError> {
        let token = self.next(field)?;
        token.trim().parse().map_err(|_| LogPipelineError::Decode {
            field,
            reason: format!("expected integer, got '{token}'"),
        })
    }
}

/// Decodes the record text that follows the `filterlog:` marker.
///
/// Tokens past the last field the protocol defines are ignored. Hostnames are
/// left unset.
pub fn decode(content: &str) -> Result<FirewallEntry, LogPipelineError> {
    let mut fields = Fields::new(content.trim());

    let rule_number = fields.owned("rule_number")?;
    let sub_rule_number = fields.owned("sub_rule_number")?;
    let anchor = fields.owned("anchor")?;
    let tracker_id = fields.owned("tracker_id")?;
    let interface = fields.owned("interface")?;
    let reason = fields.owned("reason")?;
    let action = fields.owned("action")?;
    let direction = fields.owned("direction")?;
    let ip_version: u8 = fields.number("ip_version")?;

    if ip_version != 4 {
        return Err(LogPipelineError::UnsupportedIpVersion(ip_version));
    }

    let ipv4 = Ipv4Header {
        tos: fields.owned("tos")?,
        ecn: fields.owned("ecn")?,
        ttl: fields.owned("ttl")?,
        identification: fields.owned("identification")?,
        fragment_offset: fields.owned("fragment_offset")?,
        flags: fields.owned("flags")?,
        protocol_id: fields.number("protocol_id")?,
        protocol_name: fields.owned("protocol_name")?,
    };

    let total_length = fields.owned("total_length")?;
    let source_address = fields.owned("source_address")?;
    let destination_address = fields.owned("destination_address")?;

    let protocol = match ipv4.protocol_id {
        TCP => ProtocolFields::Tcp {
            ports: decode_ports(&mut fields)?,
            tcp: TcpFields {
                flags: fields.owned("tcp_flags")?,
                sequence_number: fields.owned("sequence_number")?,
                ack_number: fields.owned("ack_number")?,
                window_size: fields.owned("window_size")?,
                urgent_pointer: fields.owned("urgent_pointer")?,
                options: fields.owned("options")?,
            },
        },
        UDP => ProtocolFields::Udp {
            ports: decode_ports(&mut fields)?,
        },
        ICMP => ProtocolFields::Icmp {
            icmp_type: fields.owned("icmp_type")?,
        },
        _ => ProtocolFields::Other,
    };

    Ok(FirewallEntry {
        rule_number,
        sub_rule_number,
        anchor,
        tracker_id,
        interface,
        reason,
        action,
        direction,
        ip_version,
        ipv4,
        total_length,
        source_address,
        destination_address,
        protocol,
        source_hostname: None,
        destination_hostname: None,
    })
}

fn decode_ports(fields: &mut Fields<'_>) -> Result<PortFields, LogPipelineError> {
    Ok(PortFields {
        source_port: fields.owned("source_port")?,
        destination_port: fields.owned("destination_port")?,
        data_length: fields.owned("data_length")?,
    })
}
