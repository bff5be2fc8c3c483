use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    BufferTooSmall,
    InvalidLength,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => f.write_str("buffer too small"),
            Self::InvalidLength => f.write_str("invalid length"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Input ended before the frame did (includes extension chains that
    /// overrun the buffer).
    TooShort,
    /// First byte does not carry a known BNEP packet type.
    UnknownType,
    /// Control frame does not carry the expected control tag.
    BadControlTag,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => f.write_str("frame truncated"),
            Self::UnknownType => f.write_str("unknown BNEP packet type"),
            Self::BadControlTag => f.write_str("unexpected control tag"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}
