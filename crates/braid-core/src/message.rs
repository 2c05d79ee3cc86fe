//! In-memory DNS message model.
//!
//! The engine terminates no sockets and encodes no wire format; transports
//! own framing. What the chain needs is a deep-clonable message it can
//! inspect, mutate, and synthesize replies from:
//!
//! - [`Message`] with its [`Header`], optional [`Question`], and record
//!   sections.
//! - Reply constructors ([`Message::reply_to`], [`Message::servfail_reply`],
//!   [`Message::nxdomain_reply`], [`Message::empty_reply`]) that copy the
//!   query header the way a resolver must.
//! - Reverse-zone name helpers ([`reverse_name`], [`ip_from_reverse_name`])
//!   used by PTR synthesis.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

// =============================================================================
// Response codes and record types
// =============================================================================

/// DNS response code (RCODE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rcode {
    /// No error (0).
    NoError,
    /// Format error (1).
    FormErr,
    /// Server failure (2).
    ServFail,
    /// Non-existent domain (3).
    NxDomain,
    /// Not implemented (4).
    NotImp,
    /// Query refused (5).
    Refused,
    /// Any other code.
    Other(u8),
}

impl Rcode {
    /// Returns the numeric RCODE value.
    pub fn code(self) -> u8 {
        match self {
            Rcode::NoError => 0,
            Rcode::FormErr => 1,
            Rcode::ServFail => 2,
            Rcode::NxDomain => 3,
            Rcode::NotImp => 4,
            Rcode::Refused => 5,
            Rcode::Other(c) => c,
        }
    }

    /// Parses a numeric RCODE value.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Rcode::NoError,
            1 => Rcode::FormErr,
            2 => Rcode::ServFail,
            3 => Rcode::NxDomain,
            4 => Rcode::NotImp,
            5 => Rcode::Refused,
            c => Rcode::Other(c),
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rcode::NoError => write!(f, "NOERROR"),
            Rcode::FormErr => write!(f, "FORMERR"),
            Rcode::ServFail => write!(f, "SERVFAIL"),
            Rcode::NxDomain => write!(f, "NXDOMAIN"),
            Rcode::NotImp => write!(f, "NOTIMP"),
            Rcode::Refused => write!(f, "REFUSED"),
            Rcode::Other(c) => write!(f, "RCODE{c}"),
        }
    }
}

/// DNS record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record (1).
    A,
    /// Canonical name record (5).
    Cname,
    /// Pointer record (12).
    Ptr,
    /// Text record (16).
    Txt,
    /// IPv6 address record (28).
    Aaaa,
    /// Any other type.
    Other(u16),
}

impl RecordType {
    /// Returns the numeric TYPE value.
    pub fn code(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Cname => 5,
            RecordType::Ptr => 12,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Other(c) => c,
        }
    }

    /// Parses a numeric TYPE value.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => RecordType::A,
            5 => RecordType::Cname,
            12 => RecordType::Ptr,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            c => RecordType::Other(c),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Cname => write!(f, "CNAME"),
            RecordType::Ptr => write!(f, "PTR"),
            RecordType::Txt => write!(f, "TXT"),
            RecordType::Aaaa => write!(f, "AAAA"),
            RecordType::Other(c) => write!(f, "TYPE{c}"),
        }
    }
}

/// DNS class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DnsClass {
    /// Internet (1).
    In,
    /// Chaos (3).
    Ch,
    /// Any (255).
    Any,
    /// Any other class.
    Other(u16),
}

impl Default for DnsClass {
    fn default() -> Self {
        DnsClass::In
    }
}

impl fmt::Display for DnsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsClass::In => write!(f, "IN"),
            DnsClass::Ch => write!(f, "CH"),
            DnsClass::Any => write!(f, "ANY"),
            DnsClass::Other(c) => write!(f, "CLASS{c}"),
        }
    }
}

// =============================================================================
// Message sections
// =============================================================================

/// The question section of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Queried name, stored as presented (case preserved).
    pub name: String,
    /// Queried record type.
    pub qtype: RecordType,
    /// Queried class.
    pub qclass: DnsClass,
}

impl Question {
    /// Creates an IN-class question.
    pub fn new(name: impl Into<String>, qtype: RecordType) -> Self {
        Self {
            name: name.into(),
            qtype,
            qclass: DnsClass::In,
        }
    }

    /// Returns a case-folded key identifying this question.
    ///
    /// DNS names compare case-insensitively; two questions with the same key
    /// are the same query for coalescing purposes.
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.name.to_ascii_lowercase(),
            self.qtype.code(),
            match self.qclass {
                DnsClass::In => 1,
                DnsClass::Ch => 3,
                DnsClass::Any => 255,
                DnsClass::Other(c) => c,
            }
        )
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.qclass, self.qtype)
    }
}

/// Record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RData {
    /// IPv4 address.
    A(Ipv4Addr),
    /// IPv6 address.
    Aaaa(Ipv6Addr),
    /// Target of a pointer record.
    Ptr(String),
    /// Canonical name.
    Cname(String),
    /// Text payload.
    Txt(String),
    /// Opaque payload for types the engine does not interpret.
    Other(Vec<u8>),
}

/// A resource record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Owner name.
    pub name: String,
    /// Record type.
    pub rtype: RecordType,
    /// Record class.
    pub class: DnsClass,
    /// Time to live, in seconds.
    pub ttl: u32,
    /// Payload.
    pub rdata: RData,
}

impl Record {
    /// Creates an IN-class A record.
    pub fn a(name: impl Into<String>, ttl: u32, addr: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            rtype: RecordType::A,
            class: DnsClass::In,
            ttl,
            rdata: RData::A(addr),
        }
    }

    /// Creates an IN-class AAAA record.
    pub fn aaaa(name: impl Into<String>, ttl: u32, addr: Ipv6Addr) -> Self {
        Self {
            name: name.into(),
            rtype: RecordType::Aaaa,
            class: DnsClass::In,
            ttl,
            rdata: RData::Aaaa(addr),
        }
    }

    /// Creates an IN-class PTR record.
    pub fn ptr(name: impl Into<String>, ttl: u32, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rtype: RecordType::Ptr,
            class: DnsClass::In,
            ttl,
            rdata: RData::Ptr(target.into()),
        }
    }

    /// Returns the address carried by an A or AAAA record, if any.
    pub fn ip(&self) -> Option<IpAddr> {
        match self.rdata {
            RData::A(v4) => Some(IpAddr::V4(v4)),
            RData::Aaaa(v6) => Some(IpAddr::V6(v6)),
            _ => None,
        }
    }
}

// =============================================================================
// Header and message
// =============================================================================

/// Message header fields the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Transaction id.
    pub id: u16,
    /// QR flag: `true` for responses.
    pub response: bool,
    /// Opcode (0 = standard query).
    pub opcode: u8,
    /// AA flag.
    pub authoritative: bool,
    /// TC flag.
    pub truncated: bool,
    /// RD flag.
    pub recursion_desired: bool,
    /// RA flag.
    pub recursion_available: bool,
    /// Response code.
    pub rcode: Rcode,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            id: 0,
            response: false,
            opcode: 0,
            authoritative: false,
            truncated: false,
            recursion_desired: true,
            recursion_available: false,
            rcode: Rcode::NoError,
        }
    }
}

/// A DNS message.
///
/// `Clone` performs the deep copy the chain relies on for branch isolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Header fields.
    pub header: Header,
    /// The question section. Queries handled by the engine always carry one.
    pub question: Option<Question>,
    /// Answer section.
    pub answers: Vec<Record>,
    /// Authority section.
    pub authorities: Vec<Record>,
    /// Additional section.
    pub additionals: Vec<Record>,
}

impl Message {
    /// Creates a query message for `question`.
    pub fn query(question: Question) -> Self {
        Self {
            header: Header::default(),
            question: Some(question),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// Sets the transaction id (builder form).
    pub fn with_id(mut self, id: u16) -> Self {
        self.header.id = id;
        self
    }

    /// Creates an empty NOERROR reply to `query`.
    ///
    /// The reply copies the query's transaction id, question, and RD flag,
    /// sets the QR and RA flags, and carries no records.
    pub fn reply_to(query: &Message) -> Self {
        Self {
            header: Header {
                id: query.header.id,
                response: true,
                opcode: query.header.opcode,
                authoritative: false,
                truncated: false,
                recursion_desired: query.header.recursion_desired,
                recursion_available: true,
                rcode: Rcode::NoError,
            },
            question: query.question.clone(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// Creates a SERVFAIL reply to `query`.
    pub fn servfail_reply(query: &Message) -> Self {
        let mut reply = Self::reply_to(query);
        reply.header.rcode = Rcode::ServFail;
        reply
    }

    /// Creates an NXDOMAIN reply to `query`.
    pub fn nxdomain_reply(query: &Message) -> Self {
        let mut reply = Self::reply_to(query);
        reply.header.rcode = Rcode::NxDomain;
        reply
    }

    /// Creates an empty NOERROR reply to `query`.
    pub fn empty_reply(query: &Message) -> Self {
        Self::reply_to(query)
    }

    /// Appends `record` to the answer section (builder form).
    pub fn with_answer(mut self, record: Record) -> Self {
        self.answers.push(record);
        self
    }
}

// =============================================================================
// Reverse-zone names
// =============================================================================

/// Returns the reverse-zone name for `ip`.
///
/// IPv4 addresses map into `in-addr.arpa.`, IPv6 addresses nibble-by-nibble
/// into `ip6.arpa.`. The returned name is fully qualified.
pub fn reverse_name(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa.", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => {
            let mut name = String::with_capacity(72);
            for byte in v6.octets().iter().rev() {
                name.push_str(&format!("{:x}.{:x}.", byte & 0x0f, byte >> 4));
            }
            name.push_str("ip6.arpa.");
            name
        }
    }
}

/// Parses the address out of a reverse-zone name, if `name` is one.
///
/// Accepts names with or without the trailing dot, in any case.
pub fn ip_from_reverse_name(name: &str) -> Option<IpAddr> {
    let name = name.to_ascii_lowercase();
    let name = name.strip_suffix('.').unwrap_or(&name);

    if let Some(prefix) = name.strip_suffix(".in-addr.arpa") {
        let labels: Vec<&str> = prefix.split('.').collect();
        if labels.len() != 4 {
            return None;
        }
        let mut octets = [0u8; 4];
        for (i, label) in labels.iter().rev().enumerate() {
            octets[i] = label.parse().ok()?;
        }
        return Some(IpAddr::V4(Ipv4Addr::from(octets)));
    }

    if let Some(prefix) = name.strip_suffix(".ip6.arpa") {
        let nibbles: Vec<&str> = prefix.split('.').collect();
        if nibbles.len() != 32 {
            return None;
        }
        let mut octets = [0u8; 16];
        for (i, nibble) in nibbles.iter().rev().enumerate() {
            if nibble.len() != 1 {
                return None;
            }
            let v = u8::from_str_radix(nibble, 16).ok()?;
            if i % 2 == 0 {
                octets[i / 2] = v << 4;
            } else {
                octets[i / 2] |= v;
            }
        }
        return Some(IpAddr::V6(Ipv6Addr::from(octets)));
    }

    None
}
