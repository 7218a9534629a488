//! DSR header codec
//!
//! A DSR header is a 4-byte common header followed by a chain of options:
//!
//! ```text
//! +-------------+----------+----------------+------------------------+
//! | next header | reserved | payload length | options ...            |
//! |     1B      |    1B    |       2B       | (payload length bytes) |
//! +-------------+----------+----------------+------------------------+
//! ```
//!
//! Every option except Pad1 is `type (1B) | data length (1B) | data`.
//! Anything after the option chain is the encapsulated payload, whose
//! protocol is given by the next-header field.
//!
//! Decoding goes through a bounds-checked cursor and produces typed
//! [`DsrOption`] records; any inconsistency is a [`ParseError`]. Multi-byte
//! fields are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use manet_core::NodeAddress;

use crate::error::ParseError;

/// Size of the common header
pub const HEADER_LEN: usize = 4;

/// Next-header value for a header with nothing encapsulated
pub const NO_NEXT_HEADER: u8 = 0;

/// Largest option data length the one-byte length field can express
pub const MAX_OPTION_DATA_LEN: usize = u8::MAX as usize;

/// Error type carried in a route error: the unreachable node
pub const ERROR_NODE_UNREACHABLE: u8 = 1;

const ADDR_LEN: usize = NodeAddress::WIRE_LEN;

const SEGMENTS_LEFT_MASK: u16 = 0x003f;
const SALVAGE_MASK: u16 = 0x03c0;
const SALVAGE_SHIFT: u16 = 6;
const LAST_HOP_EXTERNAL_BIT: u16 = 1 << 14;
const FIRST_HOP_EXTERNAL_BIT: u16 = 1 << 15;

/// Option type codes
pub mod option_type {
    pub const PAD1: u8 = 0;
    pub const PADN: u8 = 1;
    pub const ROUTE_REQUEST: u8 = 2;
    pub const ROUTE_REPLY: u8 = 3;
    pub const ROUTE_ERROR: u8 = 4;
    pub const ACK_REQUEST: u8 = 5;
    pub const ACK: u8 = 6;
    pub const SOURCE_ROUTE: u8 = 7;
}

macro_rules! checked_get_impl {
    ($checked_getter: ident, $ty:ty, $getter: ident) => {
        fn $checked_getter(&mut self) -> Result<$ty, ParseError> {
            self.ensure(size_of::<$ty>())?;
            Ok(self.$getter())
        }
    };
}

/// Bounds-checked reads on top of [`Buf`]
trait BufExt: Buf {
    fn ensure(&self, needed: usize) -> Result<(), ParseError> {
        if self.remaining() < needed {
            return Err(ParseError::Truncated {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    checked_get_impl!(checked_get_u8, u8, get_u8);
    checked_get_impl!(checked_get_u16, u16, get_u16);
    checked_get_impl!(checked_get_u32, u32, get_u32);

    fn checked_get_addr(&mut self) -> Result<NodeAddress, ParseError> {
        self.checked_get_u32().map(NodeAddress)
    }

    fn checked_get_addrs(&mut self, count: usize) -> Result<Vec<NodeAddress>, ParseError> {
        self.ensure(count * ADDR_LEN)?;
        Ok((0..count).map(|_| NodeAddress(self.get_u32())).collect())
    }

    fn try_skip(&mut self, count: usize) -> Result<(), ParseError> {
        self.ensure(count)?;
        self.advance(count);
        Ok(())
    }
}

impl<B: Buf> BufExt for B {}

fn put_addrs(buf: &mut BytesMut, addrs: &[NodeAddress]) {
    for addr in addrs {
        buf.put_u32(addr.0);
    }
}

/// Route Request option (type 2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    /// Per-initiator request identifier
    pub identification: u16,
    /// Node whose route is wanted
    pub target: NodeAddress,
    /// Nodes the request has passed through, initiator excluded
    pub recorded: Vec<NodeAddress>,
}

impl RouteRequest {
    /// Identification and target
    pub const FIXED_DATA_LEN: usize = 6;

    pub fn new(identification: u16, target: NodeAddress) -> Self {
        Self {
            identification,
            target,
            recorded: Vec::new(),
        }
    }

    pub fn data_len(&self) -> usize {
        Self::FIXED_DATA_LEN + self.recorded.len() * ADDR_LEN
    }

    /// Whether one more address still fits the length field
    pub fn can_record_another(&self) -> bool {
        self.data_len() + ADDR_LEN <= MAX_OPTION_DATA_LEN
    }
}

/// Route Reply option (type 3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReply {
    /// The last hop of the route is outside the DSR network
    pub last_hop_external: bool,
    /// Route from the first hop after the requester to the target
    pub path: Vec<NodeAddress>,
}

impl RouteReply {
    /// Flags byte
    pub const FIXED_DATA_LEN: usize = 1;

    pub fn new(path: Vec<NodeAddress>) -> Self {
        Self {
            last_hop_external: false,
            path,
        }
    }

    pub fn data_len(&self) -> usize {
        Self::data_len_for(self.path.len())
    }

    /// Data length of a reply carrying `hops` addresses
    pub fn data_len_for(hops: usize) -> usize {
        Self::FIXED_DATA_LEN + hops * ADDR_LEN
    }

    /// The node the reply was generated for: last address of the path
    pub fn target(&self) -> Option<NodeAddress> {
        self.path.last().copied()
    }
}

/// Route Error option (type 4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteError {
    pub error_type: u8,
    /// Salvage count of the packet that triggered the error
    pub salvage: u8,
    /// Node that detected the broken link
    pub source: NodeAddress,
    /// Node the error is addressed to
    pub destination: NodeAddress,
    /// Next hop that could not be reached
    pub unreachable: NodeAddress,
}

impl RouteError {
    /// Type, salvage, source and destination
    pub const FIXED_DATA_LEN: usize = 10;
    /// Fixed part plus the unreachable address
    pub const DATA_LEN: usize = Self::FIXED_DATA_LEN + ADDR_LEN;

    pub fn node_unreachable(
        salvage: u8,
        source: NodeAddress,
        destination: NodeAddress,
        unreachable: NodeAddress,
    ) -> Self {
        Self {
            error_type: ERROR_NODE_UNREACHABLE,
            salvage,
            source,
            destination,
            unreachable,
        }
    }
}

/// Source Route option (type 7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoute {
    pub first_hop_external: bool,
    pub last_hop_external: bool,
    /// Times the packet has been salvaged (4 bits)
    pub salvage: u8,
    /// Hops still to be visited (6 bits)
    pub segments_left: u8,
    /// Node that last salvaged the packet, present iff `salvage > 0`
    pub salvage_origin: Option<NodeAddress>,
    /// Intermediate hops, source and destination excluded
    pub hops: Vec<NodeAddress>,
}

impl SourceRoute {
    /// Flags word
    pub const FIXED_DATA_LEN: usize = 2;

    /// A fresh source route over `hops` with every segment left to visit
    pub fn new(hops: Vec<NodeAddress>) -> Self {
        Self {
            first_hop_external: false,
            last_hop_external: false,
            salvage: 0,
            segments_left: hops.len() as u8,
            salvage_origin: None,
            hops,
        }
    }

    /// Mark the route as salvaged by `origin`
    pub fn salvaged(mut self, salvage: u8, origin: NodeAddress) -> Self {
        self.salvage = salvage;
        self.salvage_origin = (salvage > 0).then_some(origin);
        self
    }

    pub fn data_len(&self) -> usize {
        let origin = usize::from(self.salvage_origin.is_some());
        Self::FIXED_DATA_LEN + (self.hops.len() + origin) * ADDR_LEN
    }

    /// Pack the flags word: F(1) L(1) reserved(4) salvage(4) segments-left(6)
    pub fn flags(&self) -> u16 {
        let mut flags = u16::from(self.segments_left) & SEGMENTS_LEFT_MASK;
        flags |= (u16::from(self.salvage) << SALVAGE_SHIFT) & SALVAGE_MASK;
        if self.last_hop_external {
            flags |= LAST_HOP_EXTERNAL_BIT;
        }
        if self.first_hop_external {
            flags |= FIRST_HOP_EXTERNAL_BIT;
        }
        flags
    }

    /// Consume one segment and return the next hop.
    ///
    /// Returns `None` when the segment just consumed was the last one, in
    /// which case the next hop is the datagram's destination.
    pub fn advance(&mut self) -> Option<NodeAddress> {
        self.segments_left = self.segments_left.saturating_sub(1);
        if self.segments_left == 0 {
            return None;
        }
        let index = self.hops.len() - usize::from(self.segments_left);
        self.hops.get(index).copied()
    }
}

/// A decoded DSR option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DsrOption {
    Pad1,
    /// PadN with the number of filler bytes
    PadN(u8),
    RouteRequest(RouteRequest),
    RouteReply(RouteReply),
    RouteError(RouteError),
    SourceRoute(SourceRoute),
}

impl DsrOption {
    /// Option type code
    pub fn kind(&self) -> u8 {
        match self {
            Self::Pad1 => option_type::PAD1,
            Self::PadN(_) => option_type::PADN,
            Self::RouteRequest(_) => option_type::ROUTE_REQUEST,
            Self::RouteReply(_) => option_type::ROUTE_REPLY,
            Self::RouteError(_) => option_type::ROUTE_ERROR,
            Self::SourceRoute(_) => option_type::SOURCE_ROUTE,
        }
    }

    /// Length on the wire, type and length bytes included
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Pad1 => 1,
            Self::PadN(n) => 2 + usize::from(*n),
            Self::RouteRequest(rreq) => 2 + rreq.data_len(),
            Self::RouteReply(rrep) => 2 + rrep.data_len(),
            Self::RouteError(_) => 2 + RouteError::DATA_LEN,
            Self::SourceRoute(sr) => 2 + sr.data_len(),
        }
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind());
        match self {
            Self::Pad1 => {}
            Self::PadN(n) => {
                buf.put_u8(*n);
                buf.put_bytes(0, usize::from(*n));
            }
            Self::RouteRequest(rreq) => {
                buf.put_u8(rreq.data_len() as u8);
                buf.put_u16(rreq.identification);
                buf.put_u32(rreq.target.0);
                put_addrs(buf, &rreq.recorded);
            }
            Self::RouteReply(rrep) => {
                buf.put_u8(rrep.data_len() as u8);
                buf.put_u8(if rrep.last_hop_external { 0x80 } else { 0 });
                put_addrs(buf, &rrep.path);
            }
            Self::RouteError(rerr) => {
                buf.put_u8(RouteError::DATA_LEN as u8);
                buf.put_u8(rerr.error_type);
                buf.put_u8(rerr.salvage & 0x0f);
                buf.put_u32(rerr.source.0);
                buf.put_u32(rerr.destination.0);
                buf.put_u32(rerr.unreachable.0);
            }
            Self::SourceRoute(sr) => {
                buf.put_u8(sr.data_len() as u8);
                buf.put_u16(sr.flags());
                if let Some(origin) = sr.salvage_origin {
                    buf.put_u32(origin.0);
                }
                put_addrs(buf, &sr.hops);
            }
        }
    }

    fn deser(buf: &mut &[u8]) -> Result<Self, ParseError> {
        let kind = buf.checked_get_u8()?;
        if kind == option_type::PAD1 {
            return Ok(Self::Pad1);
        }

        let length = buf.checked_get_u8()?;
        buf.ensure(usize::from(length))?;
        let mut data = &buf[..usize::from(length)];
        buf.advance(usize::from(length));

        let invalid = || ParseError::InvalidOptionLength { kind, length };
        let len = usize::from(length);

        match kind {
            option_type::PADN => {
                data.try_skip(len)?;
                Ok(Self::PadN(length))
            }
            option_type::ROUTE_REQUEST => {
                if len < RouteRequest::FIXED_DATA_LEN
                    || (len - RouteRequest::FIXED_DATA_LEN) % ADDR_LEN != 0
                {
                    return Err(invalid());
                }
                let identification = data.checked_get_u16()?;
                let target = data.checked_get_addr()?;
                let recorded = data.checked_get_addrs((len - RouteRequest::FIXED_DATA_LEN) / ADDR_LEN)?;
                Ok(Self::RouteRequest(RouteRequest {
                    identification,
                    target,
                    recorded,
                }))
            }
            option_type::ROUTE_REPLY => {
                if len < RouteReply::FIXED_DATA_LEN
                    || (len - RouteReply::FIXED_DATA_LEN) % ADDR_LEN != 0
                {
                    return Err(invalid());
                }
                let flags = data.checked_get_u8()?;
                let path = data.checked_get_addrs((len - RouteReply::FIXED_DATA_LEN) / ADDR_LEN)?;
                Ok(Self::RouteReply(RouteReply {
                    last_hop_external: flags & 0x80 != 0,
                    path,
                }))
            }
            option_type::ROUTE_ERROR => {
                if len != RouteError::DATA_LEN {
                    return Err(invalid());
                }
                Ok(Self::RouteError(RouteError {
                    error_type: data.checked_get_u8()?,
                    salvage: data.checked_get_u8()? & 0x0f,
                    source: data.checked_get_addr()?,
                    destination: data.checked_get_addr()?,
                    unreachable: data.checked_get_addr()?,
                }))
            }
            option_type::SOURCE_ROUTE => {
                if len < SourceRoute::FIXED_DATA_LEN
                    || (len - SourceRoute::FIXED_DATA_LEN) % ADDR_LEN != 0
                {
                    return Err(invalid());
                }
                let flags = data.checked_get_u16()?;
                let salvage = ((flags & SALVAGE_MASK) >> SALVAGE_SHIFT) as u8;
                let segments_left = (flags & SEGMENTS_LEFT_MASK) as u8;
                let mut count = (len - SourceRoute::FIXED_DATA_LEN) / ADDR_LEN;

                let salvage_origin = if salvage > 0 {
                    if count == 0 {
                        return Err(invalid());
                    }
                    count -= 1;
                    Some(data.checked_get_addr()?)
                } else {
                    None
                };
                let hops = data.checked_get_addrs(count)?;

                if usize::from(segments_left) > hops.len() {
                    return Err(ParseError::SegmentsLeftOutOfRange {
                        segments_left,
                        hops: hops.len(),
                    });
                }

                Ok(Self::SourceRoute(SourceRoute {
                    first_hop_external: flags & FIRST_HOP_EXTERNAL_BIT != 0,
                    last_hop_external: flags & LAST_HOP_EXTERNAL_BIT != 0,
                    salvage,
                    segments_left,
                    salvage_origin,
                    hops,
                }))
            }
            option_type::ACK_REQUEST | option_type::ACK => Err(ParseError::UnsupportedOption(kind)),
            other => Err(ParseError::UnknownOption(other)),
        }
    }
}

/// A DSR header together with the payload it encapsulates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsrPacket {
    /// Protocol of the encapsulated payload
    pub next_header: u8,
    pub options: Vec<DsrOption>,
    /// Bytes following the option chain
    pub payload: Bytes,
}

impl DsrPacket {
    /// A header with no options and nothing encapsulated
    pub fn control() -> Self {
        Self {
            next_header: NO_NEXT_HEADER,
            options: Vec::new(),
            payload: Bytes::new(),
        }
    }

    /// A header in front of a payload of protocol `next_header`
    pub fn encapsulate(next_header: u8, payload: Bytes) -> Self {
        Self {
            next_header,
            options: Vec::new(),
            payload,
        }
    }

    pub fn with_option(mut self, option: DsrOption) -> Self {
        self.options.push(option);
        self
    }

    /// Length of the option chain, the header's payload length field
    pub fn options_len(&self) -> usize {
        self.options.iter().map(DsrOption::encoded_len).sum()
    }

    /// Total encoded length
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.options_len() + self.payload.len()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.ser(&mut buf);
        buf.freeze()
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.next_header);
        buf.put_u8(0);
        buf.put_u16(self.options_len() as u16);
        for option in &self.options {
            option.ser(buf);
        }
        buf.put_slice(&self.payload);
    }

    /// Decode a header and its options; the remainder becomes the payload
    pub fn decode(bytes: &Bytes) -> Result<Self, ParseError> {
        let mut header: &[u8] = bytes;
        let next_header = header.checked_get_u8()?;
        let _reserved = header.checked_get_u8()?;
        let declared = usize::from(header.checked_get_u16()?);

        if declared > header.remaining() {
            return Err(ParseError::PayloadLengthMismatch {
                declared,
                available: header.remaining(),
            });
        }

        let mut options_buf = &header[..declared];
        let mut options = Vec::new();
        while options_buf.has_remaining() {
            options.push(DsrOption::deser(&mut options_buf)?);
        }

        Ok(Self {
            next_header,
            options,
            payload: bytes.slice(HEADER_LEN + declared..),
        })
    }

    pub fn source_route(&self) -> Option<&SourceRoute> {
        self.options.iter().find_map(|option| match option {
            DsrOption::SourceRoute(sr) => Some(sr),
            _ => None,
        })
    }

    pub fn source_route_mut(&mut self) -> Option<&mut SourceRoute> {
        self.options.iter_mut().find_map(|option| match option {
            DsrOption::SourceRoute(sr) => Some(sr),
            _ => None,
        })
    }

    /// Remove the source route option, returning it
    pub fn take_source_route(&mut self) -> Option<SourceRoute> {
        let index = self
            .options
            .iter()
            .position(|option| matches!(option, DsrOption::SourceRoute(_)))?;
        match self.options.remove(index) {
            DsrOption::SourceRoute(sr) => Some(sr),
            _ => None,
        }
    }

    pub fn has_route_reply(&self) -> bool {
        self.options
            .iter()
            .any(|option| matches!(option, DsrOption::RouteReply(_)))
    }

    /// Whether the first option is a route request
    pub fn starts_with_route_request(&self) -> bool {
        matches!(self.options.first(), Some(DsrOption::RouteRequest(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> NodeAddress {
        NodeAddress::from_octets(10, 0, 0, n)
    }

    fn addrs(ns: &[u8]) -> Vec<NodeAddress> {
        ns.iter().map(|n| addr(*n)).collect()
    }

    #[test]
    fn test_route_request_wire_layout() {
        let mut rreq = RouteRequest::new(0x0102, addr(9));
        rreq.recorded = addrs(&[2]);
        let packet = DsrPacket::control().with_option(DsrOption::RouteRequest(rreq));
        let bytes = packet.encode();

        assert_eq!(
            &bytes[..],
            &[
                0, 0, 0, 12, // common header: no next header, 12 bytes of options
                2, 10, // type, length
                0x01, 0x02, // identification
                10, 0, 0, 9, // target
                10, 0, 0, 2, // recorded hop
            ]
        );
        assert_eq!(DsrPacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_route_error_wire_layout() {
        let rerr = RouteError::node_unreachable(2, addr(1), addr(5), addr(3));
        let packet = DsrPacket::control().with_option(DsrOption::RouteError(rerr.clone()));
        let bytes = packet.encode();

        assert_eq!(bytes.len(), HEADER_LEN + 16);
        assert_eq!(bytes[4], option_type::ROUTE_ERROR);
        assert_eq!(bytes[5], 14);
        assert_eq!(bytes[6], ERROR_NODE_UNREACHABLE);
        assert_eq!(bytes[7], 2);

        let decoded = DsrPacket::decode(&bytes).unwrap();
        assert_eq!(decoded.options, vec![DsrOption::RouteError(rerr)]);
    }

    #[test]
    fn test_source_route_flags() {
        let sr = SourceRoute::new(addrs(&[2, 3, 4])).salvaged(3, addr(7));
        // salvage 3 in bits 6..10, segments left 3 in bits 0..6
        assert_eq!(sr.flags(), (3 << 6) | 3);
        assert_eq!(sr.data_len(), 2 + 4 * 4);

        let mut flagged = SourceRoute::new(addrs(&[2]));
        flagged.first_hop_external = true;
        flagged.last_hop_external = true;
        assert_eq!(flagged.flags(), 0x8000 | 0x4000 | 1);
    }

    #[test]
    fn test_salvaged_source_route_carries_origin() {
        let sr = SourceRoute::new(addrs(&[4, 5])).salvaged(1, addr(3));
        let packet = DsrPacket::encapsulate(17, Bytes::from_static(b"data"))
            .with_option(DsrOption::SourceRoute(sr));

        let bytes = packet.encode();
        // header, type, len, flags, origin, 2 hops, payload
        assert_eq!(bytes.len(), 4 + 2 + 2 + 4 + 8 + 4);
        assert_eq!(&bytes[8..12], &[10, 0, 0, 3]);

        let decoded = DsrPacket::decode(&bytes).unwrap();
        let sr = decoded.source_route().unwrap();
        assert_eq!(sr.salvage, 1);
        assert_eq!(sr.salvage_origin, Some(addr(3)));
        assert_eq!(sr.hops, addrs(&[4, 5]));
        assert_eq!(decoded.payload, Bytes::from_static(b"data"));
        assert_eq!(decoded.next_header, 17);
    }

    #[test]
    fn test_source_route_walk_reaches_zero_at_last_forwarder() {
        // S -> A -> B -> C -> D: the source route lists A, B, C
        let hops = addrs(&[1, 2, 3]);
        let packet = DsrPacket::encapsulate(17, Bytes::new())
            .with_option(DsrOption::SourceRoute(SourceRoute::new(hops.clone())));
        let mut bytes = packet.encode();

        let mut next_hops = Vec::new();
        for _ in &hops {
            let mut decoded = DsrPacket::decode(&bytes).unwrap();
            let sr = decoded.source_route_mut().unwrap();
            match sr.advance() {
                Some(next) => {
                    next_hops.push(next);
                    bytes = decoded.encode();
                }
                None => {
                    assert_eq!(sr.segments_left, 0);
                    next_hops.push(addr(4));
                }
            }
        }

        // A forwards to B, B to C, C strips the option and sends to D
        assert_eq!(next_hops, addrs(&[2, 3, 4]));
    }

    #[test]
    fn test_padding_is_skipped() {
        let packet = DsrPacket::control()
            .with_option(DsrOption::Pad1)
            .with_option(DsrOption::PadN(3))
            .with_option(DsrOption::RouteReply(RouteReply::new(addrs(&[2, 3]))));
        let bytes = packet.encode();
        assert_eq!(bytes.len(), 4 + 1 + 5 + 2 + 1 + 8);

        let decoded = DsrPacket::decode(&bytes).unwrap();
        assert!(decoded.has_route_reply());
        assert_eq!(decoded.options.len(), 3);
    }

    #[test]
    fn test_take_source_route_keeps_other_options() {
        let mut packet = DsrPacket::control()
            .with_option(DsrOption::SourceRoute(SourceRoute::new(addrs(&[2]))))
            .with_option(DsrOption::RouteReply(RouteReply::new(addrs(&[2, 3]))));

        let sr = packet.take_source_route().unwrap();
        assert_eq!(sr.hops, addrs(&[2]));
        assert!(packet.source_route().is_none());
        assert!(packet.has_route_reply());
        assert_eq!(packet.options_len(), 2 + 1 + 8);
    }

    #[test]
    fn test_truncated_header() {
        let err = DsrPacket::decode(&Bytes::from_static(&[0, 0])).unwrap_err();
        assert!(matches!(err, ParseError::Truncated { .. }));
    }

    #[test]
    fn test_checked_reads_leave_short_buffer_untouched() {
        let mut buf = Bytes::from_static(&[7, 1, 2]);
        assert_eq!(buf.checked_get_u8().unwrap(), 7);
        assert_eq!(
            buf.checked_get_u32().unwrap_err(),
            ParseError::Truncated {
                needed: 4,
                remaining: 2
            }
        );
        assert_eq!(buf.checked_get_u16().unwrap(), 0x0102);
        assert!(buf.checked_get_addrs(1).is_err());
    }

    #[test]
    fn test_declared_length_beyond_buffer() {
        let err = DsrPacket::decode(&Bytes::from_static(&[0, 0, 0, 20, 1, 0])).unwrap_err();
        assert_eq!(
            err,
            ParseError::PayloadLengthMismatch {
                declared: 20,
                available: 2
            }
        );
    }

    #[test]
    fn test_option_overrunning_declared_length() {
        // PadN claims 4 filler bytes but only 2 are inside the option chain
        let bytes = Bytes::from_static(&[0, 0, 0, 4, 1, 4, 0, 0, 0, 0]);
        let err = DsrPacket::decode(&bytes).unwrap_err();
        assert!(matches!(err, ParseError::Truncated { .. }));
    }

    #[test]
    fn test_unknown_and_unsupported_options() {
        let unknown = Bytes::from_static(&[0, 0, 0, 2, 9, 0]);
        assert_eq!(
            DsrPacket::decode(&unknown).unwrap_err(),
            ParseError::UnknownOption(9)
        );

        let ack = Bytes::from_static(&[0, 0, 0, 4, 6, 2, 0, 1]);
        assert_eq!(
            DsrPacket::decode(&ack).unwrap_err(),
            ParseError::UnsupportedOption(6)
        );
    }

    #[test]
    fn test_misaligned_option_length() {
        // Route reply with 3 bytes after the flags byte
        let bytes = Bytes::from_static(&[0, 0, 0, 6, 3, 4, 0, 10, 0, 0]);
        assert_eq!(
            DsrPacket::decode(&bytes).unwrap_err(),
            ParseError::InvalidOptionLength {
                kind: option_type::ROUTE_REPLY,
                length: 4
            }
        );
    }

    #[test]
    fn test_segments_left_out_of_range() {
        // One hop listed but segments left says 5
        let bytes = Bytes::from_static(&[0, 0, 0, 8, 7, 6, 0, 5, 10, 0, 0, 2]);
        assert_eq!(
            DsrPacket::decode(&bytes).unwrap_err(),
            ParseError::SegmentsLeftOutOfRange {
                segments_left: 5,
                hops: 1
            }
        );
    }

    #[test]
    fn test_request_length_limit() {
        let mut rreq = RouteRequest::new(1, addr(9));
        rreq.recorded = vec![addr(1); 61];
        // 6 + 61 * 4 = 250; one more address would need 254
        assert!(rreq.can_record_another());
        rreq.recorded.push(addr(2));
        assert!(!rreq.can_record_another());
    }
}
