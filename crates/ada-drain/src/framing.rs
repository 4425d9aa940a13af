//! Wire framing for the writer sink (§6 "Writer sink": "length-prefixed
//! event bytes — lane kind, event size, event bytes").
//!
//! The drain owns framing; a [`crate::writer::Writer`] only ever sees
//! already-framed byte buffers and is free to persist them however it
//! likes (append to a file, forward over a socket, discard).

/// Distinguishes which lane a framed event came from, so a single writer
/// stream can carry both event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LaneKind {
    Index = 0,
    Detail = 1,
}

impl LaneKind {
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Index),
            1 => Some(Self::Detail),
            _ => None,
        }
    }
}

/// `[lane_kind: u8][event_size: u32 LE][event bytes]`.
pub const FRAME_HEADER_LEN: usize = 1 + 4;

/// Appends one framed event to `out`. `event` is a `repr(C)` ABI struct
/// (`IndexEvent`/`DetailEvent`); its bytes are copied verbatim, which is
/// exactly what the drain side consumer is required to forward (§6).
pub fn encode_into<T: Copy>(out: &mut Vec<u8>, kind: LaneKind, event: &T) {
    let size = std::mem::size_of::<T>() as u32;
    out.reserve(FRAME_HEADER_LEN + size as usize);
    out.push(kind as u8);
    out.extend_from_slice(&size.to_le_bytes());
    // SAFETY: T is Copy and a plain repr(C) event struct; reading its
    // representation as bytes for framing does not read uninitialized
    // padding in a way that matters, since the frame is opaque to every
    // reader except one that reconstructs the same T.
    let bytes = unsafe { std::slice::from_raw_parts((event as *const T).cast::<u8>(), size as usize) };
    out.extend_from_slice(bytes);
}

/// Splits one frame off the front of `bytes`, returning `(kind, event_bytes, rest)`.
/// Used by tests and by writers that want to inspect what they are about to persist.
#[must_use]
pub fn decode_one(bytes: &[u8]) -> Option<(LaneKind, &[u8], &[u8])> {
    if bytes.len() < FRAME_HEADER_LEN {
        return None;
    }
    let kind = LaneKind::from_u8(bytes[0])?;
    let size = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    let body_start = FRAME_HEADER_LEN;
    let body_end = body_start.checked_add(size)?;
    if bytes.len() < body_end {
        return None;
    }
    Some((kind, &bytes[body_start..body_end], &bytes[body_end..]))
}
