//! BNEP control messages: connection setup, filter replies, and the
//! command-not-understood echo. Every codec covers the full frame
//! including the leading packet-type byte; encoders return the frame
//! length so callers can hand the exact span to the radio.

use crate::bnep::{
    read_be16, write_be16, BnepControlType, BnepPacketType, FilterResponseCode, ServiceUuid,
    SetupResponseCode, TYPE_MASK, UUID_SIZE_16,
};
use crate::{DecodeError, EncodeError};

/// Setup connection request. This implementation always asks for
/// PANU (source) to NAP (destination).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupRequest {
    pub dst_uuid: ServiceUuid,
    pub src_uuid: ServiceUuid,
}

impl SetupRequest {
    /// Encoded length: type, control tag, UUID size, two 16-bit UUIDs.
    pub const WIRE_LEN: usize = 7;

    /// The request this client sends: PANU source asking for NAP service.
    pub const fn panu_to_nap() -> Self {
        Self {
            dst_uuid: ServiceUuid::Nap,
            src_uuid: ServiceUuid::Panu,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(EncodeError::BufferTooSmall);
        }
        buf[0] = BnepPacketType::Control as u8;
        buf[1] = BnepControlType::SetupRequest as u8;
        buf[2] = UUID_SIZE_16;
        write_be16(buf, 3, self.dst_uuid.to_u16());
        write_be16(buf, 5, self.src_uuid.to_u16());
        Ok(Self::WIRE_LEN)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let body = control_body(frame, BnepControlType::SetupRequest)?;
        if body.len() < 5 {
            return Err(DecodeError::TooShort);
        }
        if body[0] != UUID_SIZE_16 {
            return Err(DecodeError::UnknownType);
        }
        let dst_uuid = ServiceUuid::from_u16(read_be16(body, 1)).ok_or(DecodeError::UnknownType)?;
        let src_uuid = ServiceUuid::from_u16(read_be16(body, 3)).ok_or(DecodeError::UnknownType)?;
        Ok(Self { dst_uuid, src_uuid })
    }
}

/// Setup connection response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupResponse {
    pub code: SetupResponseCode,
}

impl SetupResponse {
    pub const WIRE_LEN: usize = 4;

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(EncodeError::BufferTooSmall);
        }
        buf[0] = BnepPacketType::Control as u8;
        buf[1] = BnepControlType::SetupResponse as u8;
        write_be16(buf, 2, self.code.to_u16());
        Ok(Self::WIRE_LEN)
    }

    /// Decodes a full setup-response frame, verifying the control tag.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let body = control_body(frame, BnepControlType::SetupResponse)?;
        if body.len() < 2 {
            return Err(DecodeError::TooShort);
        }
        Ok(Self {
            code: SetupResponseCode::from_u16(read_be16(body, 0)),
        })
    }
}

/// Builds the reply to a peer-issued filter set request, returning the
/// frame length.
///
/// `response_type` must be [`FilterNetTypeResponse`] or
/// [`FilterMultiAddrResponse`], matching the request that is being
/// answered.
///
/// [`FilterNetTypeResponse`]: BnepControlType::FilterNetTypeResponse
/// [`FilterMultiAddrResponse`]: BnepControlType::FilterMultiAddrResponse
pub fn build_filter_response(
    buf: &mut [u8],
    response_type: BnepControlType,
    code: FilterResponseCode,
) -> Result<usize, EncodeError> {
    debug_assert!(matches!(
        response_type,
        BnepControlType::FilterNetTypeResponse | BnepControlType::FilterMultiAddrResponse
    ));
    if buf.len() < 4 {
        return Err(EncodeError::BufferTooSmall);
    }
    buf[0] = BnepPacketType::Control as u8;
    buf[1] = response_type as u8;
    write_be16(buf, 2, code.to_u16());
    Ok(4)
}

/// Builds a command-not-understood reply echoing the offending control
/// tag, returning the frame length.
pub fn build_command_not_understood(buf: &mut [u8], offending: u8) -> Result<usize, EncodeError> {
    if buf.len() < 3 {
        return Err(EncodeError::BufferTooSmall);
    }
    buf[0] = BnepPacketType::Control as u8;
    buf[1] = BnepControlType::CommandNotUnderstood as u8;
    buf[2] = offending;
    Ok(3)
}

/// Verifies the control framing and expected tag, returning the message
/// body after the tag.
fn control_body(frame: &[u8], tag: BnepControlType) -> Result<&[u8], DecodeError> {
    if frame.len() < 2 {
        return Err(DecodeError::TooShort);
    }
    if BnepPacketType::from_u8(frame[0] & TYPE_MASK) != Some(BnepPacketType::Control) {
        return Err(DecodeError::UnknownType);
    }
    if frame[1] != tag as u8 {
        return Err(DecodeError::BadControlTag);
    }
    Ok(&frame[2..])
}
