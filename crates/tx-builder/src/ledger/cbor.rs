//! Encode-only CBOR plumbing shared by the ledger primitives.
//!
//! Everything is written into an in-memory `Vec<u8>`, so encoder errors can only
//! originate from the types themselves, and none of them produce one.

use std::convert::Infallible;

use minicbor::data::Tag;

pub type Encoder = minicbor::Encoder<Vec<u8>>;
pub type EncodeError = minicbor::encode::Error<Infallible>;

/// Ledger types with a canonical CBOR rendition.
pub trait CborEncode {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError>;

    fn to_cbor(&self) -> Vec<u8> {
        encode_with(|e| self.encode_cbor(e))
    }

    fn cbor_len(&self) -> usize {
        self.to_cbor().len()
    }
}

/// Run `f` against a fresh encoder and return the bytes it produced.
pub fn encode_with<F>(f: F) -> Vec<u8>
where
    F: FnOnce(&mut Encoder) -> Result<(), EncodeError>,
{
    let mut encoder = Encoder::new(Vec::new());
    f(&mut encoder).expect("writing CBOR into a Vec cannot fail");
    encoder.into_writer()
}

/// Write a major-type-6 tag header.
pub fn write_tag(e: &mut Encoder, tag: u64) -> Result<(), EncodeError> {
    e.tag(Tag::new(tag))?;
    Ok(())
}

/// Splice already-encoded CBOR into the stream.
pub fn write_raw(e: &mut Encoder, bytes: &[u8]) {
    e.writer_mut().extend_from_slice(bytes);
}

/// Write `#6.24(bytes .cbor x)`, the embedded-CBOR wrapper used by inline datums
/// and script references.
pub fn write_embedded(e: &mut Encoder, inner: &[u8]) -> Result<(), EncodeError> {
    write_tag(e, 24)?;
    e.bytes(inner)?;
    Ok(())
}

/// Encode a count as a CBOR `u64` length.
pub fn len_u64(len: usize) -> u64 {
    // usize is at most 64 bits on every supported target.
    len as u64
}
