//! Flip payload encoding
//!
//! Builds the hex payloads the node expects from the compressed images and
//! the author-chosen order. The first half of the images (in chosen order)
//! forms the public part shown to everyone during validation; the remaining
//! images plus the permutation itself form the private part revealed after
//! the long session.
//!
//! Framing is length-prefixed: each image is a u32 big-endian byte length
//! followed by the bytes; the permutation is a count byte followed by one
//! byte per index. Hex strings are lowercase with a `0x` prefix.

use crate::error::{FlipError, FlipResult};

/// Encoded flip ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlipPayload {
    /// Full payload (public + private), kept for nodes that still accept the
    /// single-part submit form
    pub hex: String,
    /// Public part
    pub public_hex: String,
    /// Private part
    pub private_hex: String,
}

impl FlipPayload {
    /// Combined size of the two transmitted parts, in hex characters.
    pub fn transmitted_len(&self) -> usize {
        self.public_hex.len() + self.private_hex.len()
    }
}

/// Encode compressed images and their order into submission payloads.
///
/// Order indices must address `compressed_pics`. The editor always hands us
/// a permutation of `0..pics.len()`, but a corrupted draft could carry an
/// out-of-range index, which is rejected rather than panicking.
pub fn flip_to_hex(compressed_pics: &[Vec<u8>], order: &[usize]) -> FlipResult<FlipPayload> {
    let mut ordered: Vec<&[u8]> = Vec::with_capacity(order.len());
    for &idx in order {
        let pic = compressed_pics
            .get(idx)
            .ok_or_else(|| FlipError::NotFound(format!("flip image index {idx} out of range")))?;
        ordered.push(pic.as_slice());
    }

    let split = ordered.len().div_ceil(2);
    let public_part = encode_images(&ordered[..split]);
    let mut private_part = encode_images(&ordered[split..]);
    private_part.extend_from_slice(&encode_order(order));

    let mut full = public_part.clone();
    full.extend_from_slice(&private_part);

    Ok(FlipPayload {
        hex: to_hex(&full),
        public_hex: to_hex(&public_part),
        private_hex: to_hex(&private_part),
    })
}

fn encode_images(pics: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for pic in pics {
        out.extend_from_slice(&(pic.len() as u32).to_be_bytes());
        out.extend_from_slice(pic);
    }
    out
}

fn encode_order(order: &[usize]) -> Vec<u8> {
    let mut out = Vec::with_capacity(order.len() + 1);
    out.push(order.len() as u8);
    for &idx in order {
        out.push(idx as u8);
    }
    out
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
