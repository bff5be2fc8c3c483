//! BNEP data-frame codecs: header classification, Ethernet-frame
//! parsing with address reconstruction, and header/frame builders for
//! the transmit path.
//!
//! BNEP frames are tiny and their layouts fixed, so the codecs work on
//! the byte slices directly: [`parse_header`] proves the whole fixed
//! header is present, and the field accessors index inside that proven
//! region.

use crate::addr::EtherAddr;
use crate::bnep::{
    read_be16, write_be16, BnepPacketType, COMPRESSED_HEADER_LEN, ETHER_ADDR_LEN,
    EXT_HEADER_FLAG, GENERAL_HEADER_LEN, TYPE_MASK,
};
use crate::{DecodeError, EncodeError};

/// Classified first pass over a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub pkt_type: BnepPacketType,
    /// Whether a chain of extension headers follows the fixed header.
    pub has_ext: bool,
    /// Length of the fixed, type-specific header.
    pub header_len: usize,
}

/// An Ethernet-shaped view of a received BNEP data frame. Addresses
/// elided on the wire are reconstructed from the channel's endpoints;
/// the payload borrows from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetFrame<'a> {
    pub dst: EtherAddr,
    pub src: EtherAddr,
    pub ethertype: u16,
    pub payload: &'a [u8],
}

/// Classifies a frame by its first byte and checks the fixed header is
/// present in full.
pub fn parse_header(data: &[u8]) -> Result<FrameHeader, DecodeError> {
    let first = *data.first().ok_or(DecodeError::TooShort)?;
    let pkt_type = BnepPacketType::from_u8(first & TYPE_MASK).ok_or(DecodeError::UnknownType)?;
    let header_len = pkt_type.base_header_len();
    if data.len() < header_len {
        return Err(DecodeError::TooShort);
    }
    Ok(FrameHeader {
        pkt_type,
        has_ext: first & EXT_HEADER_FLAG != 0,
        header_len,
    })
}

/// Splits a control frame into its control tag and body.
///
/// The tag is returned raw so that unknown values can be echoed back in
/// a command-not-understood reply.
pub fn parse_control(data: &[u8]) -> Result<(u8, &[u8]), DecodeError> {
    if data.len() < 2 {
        return Err(DecodeError::TooShort);
    }
    if BnepPacketType::from_u8(data[0] & TYPE_MASK) != Some(BnepPacketType::Control) {
        return Err(DecodeError::UnknownType);
    }
    Ok((data[1], &data[2..]))
}

/// Parses a BNEP data frame into an Ethernet-shaped view.
///
/// Address selection follows the packet type: general frames carry both
/// addresses on the wire; compressed variants substitute `local` for the
/// elided destination and `remote` for the elided source, matching the
/// receive direction of a point-to-point channel. Any chain of extension
/// headers between the fixed header and the payload is skipped; a chain
/// that runs past the end of the buffer rejects the frame.
pub fn parse_ethernet_frame<'a>(
    data: &'a [u8],
    local: &EtherAddr,
    remote: &EtherAddr,
) -> Result<EthernetFrame<'a>, DecodeError> {
    let header = parse_header(data)?;

    let mut payload_at = header.header_len;
    let mut more = header.has_ext;
    while more {
        if payload_at + 2 > data.len() {
            return Err(DecodeError::TooShort);
        }
        let tag = data[payload_at];
        let ext_len = data[payload_at + 1] as usize;
        more = tag & EXT_HEADER_FLAG != 0;
        payload_at += 2 + ext_len;
    }
    if payload_at > data.len() {
        return Err(DecodeError::TooShort);
    }

    // Field offsets below stay inside header_len, which parse_header
    // proved present.
    let (dst, src, ethertype) = match header.pkt_type {
        BnepPacketType::GeneralEthernet => {
            (addr_at(data, 1), addr_at(data, 7), read_be16(data, 13))
        }
        BnepPacketType::CompressedEthernet => (*local, *remote, read_be16(data, 1)),
        BnepPacketType::CompressedSrcOnly => (*local, addr_at(data, 1), read_be16(data, 7)),
        BnepPacketType::CompressedDstOnly => (addr_at(data, 1), *remote, read_be16(data, 7)),
        BnepPacketType::Control => return Err(DecodeError::UnknownType),
    };

    Ok(EthernetFrame {
        dst,
        src,
        ethertype,
        payload: &data[payload_at..],
    })
}

/// Picks the data-frame header length for the transmit direction:
/// 3 bytes when both addresses match the channel endpoints and can be
/// elided, 15 otherwise.
pub fn header_len_for(
    dst: &EtherAddr,
    src: &EtherAddr,
    local: &EtherAddr,
    remote: &EtherAddr,
) -> usize {
    if dst == remote && src == local {
        COMPRESSED_HEADER_LEN
    } else {
        GENERAL_HEADER_LEN
    }
}

/// Writes a data-frame header of the given length into the start of
/// `buf`. `header_len` must come from [`header_len_for`] (or be forced
/// to [`GENERAL_HEADER_LEN`]).
pub fn write_ethernet_header(
    buf: &mut [u8],
    header_len: usize,
    dst: &EtherAddr,
    src: &EtherAddr,
    ethertype: u16,
) -> Result<(), EncodeError> {
    if buf.len() < header_len {
        return Err(EncodeError::BufferTooSmall);
    }
    match header_len {
        COMPRESSED_HEADER_LEN => {
            buf[0] = BnepPacketType::CompressedEthernet as u8;
            write_be16(buf, 1, ethertype);
        }
        GENERAL_HEADER_LEN => {
            buf[0] = BnepPacketType::GeneralEthernet as u8;
            buf[1..7].copy_from_slice(dst.as_bytes());
            buf[7..13].copy_from_slice(src.as_bytes());
            write_be16(buf, 13, ethertype);
        }
        _ => return Err(EncodeError::InvalidLength),
    }
    Ok(())
}

/// Builds a complete general Ethernet frame (15-byte header plus
/// payload), returning the total length.
pub fn build_general_ethernet(
    buf: &mut [u8],
    dst: &EtherAddr,
    src: &EtherAddr,
    ethertype: u16,
    payload: &[u8],
) -> Result<usize, EncodeError> {
    let total = GENERAL_HEADER_LEN + payload.len();
    if buf.len() < total {
        return Err(EncodeError::BufferTooSmall);
    }
    write_ethernet_header(buf, GENERAL_HEADER_LEN, dst, src, ethertype)?;
    buf[GENERAL_HEADER_LEN..total].copy_from_slice(payload);
    Ok(total)
}

/// Builds a complete compressed Ethernet frame (3-byte header plus
/// payload), returning the total length.
pub fn build_compressed_ethernet(
    buf: &mut [u8],
    ethertype: u16,
    payload: &[u8],
) -> Result<usize, EncodeError> {
    let total = COMPRESSED_HEADER_LEN + payload.len();
    if buf.len() < total {
        return Err(EncodeError::BufferTooSmall);
    }
    buf[0] = BnepPacketType::CompressedEthernet as u8;
    write_be16(buf, 1, ethertype);
    buf[COMPRESSED_HEADER_LEN..total].copy_from_slice(payload);
    Ok(total)
}

/// Reads a MAC address at a fixed offset inside the validated header.
fn addr_at(data: &[u8], at: usize) -> EtherAddr {
    let mut bytes = [0u8; ETHER_ADDR_LEN];
    bytes.copy_from_slice(&data[at..at + ETHER_ADDR_LEN]);
    EtherAddr::new(bytes)
}
