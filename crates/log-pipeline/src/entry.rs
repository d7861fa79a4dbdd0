//! Decoded log entries and their rendering.
//!
//! [`LogEntry`] is a closed set of variants, each rendered through its
//! `Display` implementation. Entries live for a single line: they are built
//! by the classifier, rendered once and dropped.

use std::fmt;

use crate::resolver::Resolution;

/// IANA protocol number for ICMP.
pub const ICMP: u8 = 1;
/// IANA protocol number for TCP.
pub const TCP: u8 = 6;
/// IANA protocol number for UDP.
pub const UDP: u8 = 17;

/// One decoded log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Line that carries neither a firewall nor a DHCP record
    Unparsed {
        /// Diagnostic text
        message: String,
    },
    /// pfSense `filterlog` record
    Firewall(FirewallEntry),
    /// `dhcpd` lease record
    DhcpLease(DhcpLeaseEntry),
}

impl LogEntry {
    /// Short variant name, used as a log field and metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unparsed { .. } => "unparsed",
            Self::Firewall(_) => "firewall",
            Self::DhcpLease(_) => "dhcp",
        }
    }

    /// Returns the firewall entry, if any.
    pub fn as_firewall(&self) -> Option<&FirewallEntry> {
        match self {
            Self::Firewall(entry) => Some(entry),
            _ => None,
        }
    }

    /// Returns the firewall entry mutably, if any.
    pub fn as_firewall_mut(&mut self) -> Option<&mut FirewallEntry> {
        match self {
            Self::Firewall(entry) => Some(entry),
            _ => None,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparsed { message } => f.write_str(message),
            Self::Firewall(entry) => entry.fmt(f),
            Self::DhcpLease(entry) => entry.fmt(f),
        }
    }
}

/// IPv4 header fields of a `filterlog` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub tos: String,
    pub ecn: String,
    pub ttl: String,
    pub identification: String,
    pub fragment_offset: String,
    pub flags: String,
    /// IANA protocol number
    pub protocol_id: u8,
    /// Protocol name as logged (`tcp`, `udp`, `icmp`, ...)
    pub protocol_name: String,
}

/// Port fields shared by TCP and UDP records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortFields {
    pub source_port: String,
    pub destination_port: String,
    pub data_length: String,
}

/// TCP-only fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpFields {
    /// Flag letters, e.g. `S`, `SA`, `FA`
    pub flags: String,
    pub sequence_number: String,
    pub ack_number: String,
    pub window_size: String,
    pub urgent_pointer: String,
    pub options: String,
}

/// Protocol-dependent tail of a record.
///
/// Which fields exist follows from the protocol number alone, so each variant
/// carries exactly the fields that were consumed for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolFields {
    Tcp { ports: PortFields, tcp: TcpFields },
    Udp { ports: PortFields },
    Icmp { icmp_type: String },
    /// Any other protocol: nothing past the addresses is decoded
    Other,
}

impl ProtocolFields {
    /// Port fields for TCP and UDP.
    pub fn ports(&self) -> Option<&PortFields> {
        match self {
            Self::Tcp { ports, .. } | Self::Udp { ports } => Some(ports),
            _ => None,
        }
    }

    /// TCP-only fields.
    pub fn tcp(&self) -> Option<&TcpFields> {
        match self {
            Self::Tcp { tcp, .. } => Some(tcp),
            _ => None,
        }
    }

    /// ICMP type.
    pub fn icmp_type(&self) -> Option<&str> {
        match self {
            Self::Icmp { icmp_type } => Some(icmp_type),
            _ => None,
        }
    }
}

/// A pfSense packet-filter decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallEntry {
    pub rule_number: String,
    /// Usually empty
    pub sub_rule_number: String,
    /// Usually empty
    pub anchor: String,
    /// Unique per rule
    pub tracker_id: String,
    pub interface: String,
    /// e.g. `match`
    pub reason: String,
    /// e.g. `block`, `pass`
    pub action: String,
    /// `in` or `out`
    pub direction: String,
    /// Always 4; other versions are rejected by the decoder
    pub ip_version: u8,
    pub ipv4: Ipv4Header,
    pub total_length: String,
    pub source_address: String,
    pub destination_address: String,
    pub protocol: ProtocolFields,
    /// Reverse-resolved source, if known at render time
    pub source_hostname: Option<String>,
    /// Reverse-resolved destination, if known at render time
    pub destination_hostname: Option<String>,
}

impl FirewallEntry {
    /// IANA protocol number.
    pub fn protocol_id(&self) -> u8 {
        self.ipv4.protocol_id
    }

    /// Source hostname, or the address when unresolved.
    pub fn source_display(&self) -> &str {
        self.source_hostname
            .as_deref()
            .unwrap_or(&self.source_address)
    }

    /// Destination hostname, or the address when unresolved.
    pub fn destination_display(&self) -> &str {
        self.destination_hostname
            .as_deref()
            .unwrap_or(&self.destination_address)
    }

    /// Stores a resolver answer on every field whose address matches.
    ///
    /// Returns `true` if a hostname was stored.
    pub fn apply_resolution(&mut self, resolution: &Resolution) -> bool {
        let Some(hostname) = resolution.hostname.as_ref() else {
            return false;
        };

        let mut applied = false;
        if self.source_address == resolution.ip {
            self.source_hostname = Some(hostname.clone());
            applied = true;
        }
        if self.destination_address == resolution.ip {
            self.destination_hostname = Some(hostname.clone());
            applied = true;
        }
        applied
    }
}

impl fmt::Display for FirewallEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = &self.ipv4.protocol_name;
        let src = self.source_display();
        let dst = self.destination_display();
        let rule = &self.rule_number;

        match &self.protocol {
            ProtocolFields::Udp { ports } => write!(
                f,
                "{proto} {src}:{} --> {dst}:{} -- rule {rule}",
                ports.source_port, ports.destination_port
            ),
            ProtocolFields::Tcp { ports, tcp } => write!(
                f,
                "{proto} {src}:{} --> {dst}:{} {} -- rule {rule}",
                ports.source_port, ports.destination_port, tcp.flags
            ),
            ProtocolFields::Icmp { icmp_type } => {
                write!(f, "{proto} {src} --> {dst}, {icmp_type} -- rule {rule}")
            }
            ProtocolFields::Other => {
                write!(f, "Protocol not handled: {}", self.ipv4.protocol_id)
            }
        }
    }
}

/// A `dhcpd` lease record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpLeaseEntry {
    /// Text after the `dhcpd:` tag, with the vendor annotation when a MAC was found
    pub text: String,
    /// First MAC address found on the line
    pub mac: Option<String>,
}

impl fmt::Display for DhcpLeaseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(protocol_id: u8, protocol_name: &str, protocol: ProtocolFields) -> FirewallEntry {
        FirewallEntry {
            rule_number: "5".to_owned(),
            sub_rule_number: String::new(),
            anchor: String::new(),
            tracker_id: "1000000103".to_owned(),
            interface: "igb0".to_owned(),
            reason: "match".to_owned(),
            action: "block".to_owned(),
            direction: "in".to_owned(),
            ip_version: 4,
            ipv4: Ipv4Header {
                tos: "0x0".to_owned(),
                ecn: String::new(),
                ttl: "64".to_owned(),
                identification: "1".to_owned(),
                fragment_offset: "0".to_owned(),
                flags: "DF".to_owned(),
                protocol_id,
                protocol_name: protocol_name.to_owned(),
            },
            total_length: "60".to_owned(),
            source_address: "10.0.0.1".to_owned(),
            destination_address: "10.0.0.2".to_owned(),
            protocol,
            source_hostname: None,
            destination_hostname: None,
        }
    }

    fn ports() -> PortFields {
        PortFields {
            source_port: "5353".to_owned(),
            destination_port: "53".to_owned(),
            data_length: "40".to_owned(),
        }
    }

    #[test]
    fn udp_renders_ports() {
        let e = entry(UDP, "udp", ProtocolFields::Udp { ports: ports() });
        assert_eq!(e.to_string(), "udp 10.0.0.1:5353 --> 10.0.0.2:53 -- rule 5");
    }

    #[test]
    fn other_protocol_renders_number() {
        let e = entry(50, "esp", ProtocolFields::Other);
        assert_eq!(e.to_string(), "Protocol not handled: 50");
    }

    #[test]
    fn hostname_replaces_address_at_render_time() {
        let mut e = entry(UDP, "udp", ProtocolFields::Udp { ports: ports() });
        assert_eq!(e.source_display(), "10.0.0.1");

        let applied = e.apply_resolution(&Resolution {
            ip: "10.0.0.2".to_owned(),
            hostname: Some("dns.lan".to_owned()),
        });
        assert!(applied);
        assert_eq!(e.to_string(), "udp 10.0.0.1:5353 --> dns.lan:53 -- rule 5");
    }

    #[test]
    fn failed_resolution_leaves_address() {
        let mut e = entry(ICMP, "icmp", ProtocolFields::Icmp {
            icmp_type: "request".to_owned(),
        });
        let applied = e.apply_resolution(&Resolution {
            ip: "10.0.0.1".to_owned(),
            hostname: None,
        });
        assert!(!applied);
        assert_eq!(e.to_string(), "icmp 10.0.0.1 --> 10.0.0.2, request -- rule 5");
    }

    #[test]
    fn resolution_for_same_address_fills_both_sides() {
        let mut e = entry(ICMP, "icmp", ProtocolFields::Icmp {
            icmp_type: "reply".to_owned(),
        });
        e.destination_address = e.source_address.clone();
        e.apply_resolution(&Resolution {
            ip: "10.0.0.1".to_owned(),
            hostname: Some("gw.lan".to_owned()),
        });
        assert_eq!(e.to_string(), "icmp gw.lan --> gw.lan, reply -- rule 5");
    }

    #[test]
    fn log_entry_kinds() {
        let unparsed = LogEntry::Unparsed {
            message: "Cannot process line x".to_owned(),
        };
        assert_eq!(unparsed.kind(), "unparsed");
        assert_eq!(unparsed.to_string(), "Cannot process line x");
        assert!(unparsed.as_firewall().is_none());

        let dhcp = LogEntry::DhcpLease(DhcpLeaseEntry {
            text: "DHCPACK on 10.0.0.9".to_owned(),
            mac: None,
        });
        assert_eq!(dhcp.kind(), "dhcp");
        assert_eq!(dhcp.to_string(), "DHCPACK on 10.0.0.9");
    }

    #[test]
    fn protocol_accessors_match_variant() {
        let tcp = ProtocolFields::Tcp {
            ports: ports(),
            tcp: TcpFields {
                flags: "S".to_owned(),
                sequence_number: "1".to_owned(),
                ack_number: String::new(),
                window_size: "64240".to_owned(),
                urgent_pointer: String::new(),
                options: "mss".to_owned(),
            },
        };
        assert!(tcp.ports().is_some());
        assert!(tcp.tcp().is_some());
        assert!(tcp.icmp_type().is_none());

        assert!(ProtocolFields::Other.ports().is_none());
        assert!(ProtocolFields::Other.tcp().is_none());
    }
}
