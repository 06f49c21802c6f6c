use minicbor::data::Int;
use serde::{Deserialize, Serialize};

use super::cbor::{CborEncode, EncodeError, Encoder, len_u64, write_embedded, write_tag};
use super::hash::{DatumHash, blake2b_256};

/// Byte strings longer than this are written as indefinite-length chunks.
const BYTES_CHUNK_SIZE: usize = 64;

/// Opaque on-chain data consumed by Plutus scripts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlutusData {
    Constr { tag: u64, fields: Vec<PlutusData> },
    Map(Vec<(PlutusData, PlutusData)>),
    List(Vec<PlutusData>),
    /// Values outside the 64-bit CBOR range are written as tag 2/3 bignums.
    Integer(i128),
    Bytes(#[serde(with = "hex")] Vec<u8>),
}

impl PlutusData {
    /// The `Unit`-shaped datum, `Constr 0 []`.
    #[must_use]
    pub const fn unit() -> Self {
        Self::Constr {
            tag: 0,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn hash(&self) -> DatumHash {
        blake2b_256(&self.to_cbor())
    }
}

fn encode_list(e: &mut Encoder, items: &[PlutusData]) -> Result<(), EncodeError> {
    if items.is_empty() {
        e.array(0)?;
        return Ok(());
    }
    e.begin_array()?;
    for item in items {
        item.encode_cbor(e)?;
    }
    e.end()?;
    Ok(())
}

fn encode_integer(e: &mut Encoder, value: i128) -> Result<(), EncodeError> {
    if let Ok(int) = Int::try_from(value) {
        e.int(int)?;
        return Ok(());
    }
    // Tag 3 carries `-1 - n` for negative n.
    let (tag, magnitude) = if value < 0 {
        (3, (-1 - value).unsigned_abs())
    } else {
        (2, value.unsigned_abs())
    };
    let bytes = magnitude.to_be_bytes();
    let first = bytes.iter().position(|byte| *byte != 0).unwrap_or(bytes.len() - 1);
    write_tag(e, tag)?;
    e.bytes(&bytes[first..])?;
    Ok(())
}

impl CborEncode for PlutusData {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            Self::Constr { tag, fields } => match *tag {
                0..=6 => {
                    write_tag(e, 121 + tag)?;
                    encode_list(e, fields)?;
                }
                7..=127 => {
                    write_tag(e, 1280 + tag - 7)?;
                    encode_list(e, fields)?;
                }
                _ => {
                    write_tag(e, 102)?;
                    e.array(2)?.u64(*tag)?;
                    encode_list(e, fields)?;
                }
            },
            Self::Map(entries) => {
                e.map(len_u64(entries.len()))?;
                for (key, value) in entries {
                    key.encode_cbor(e)?;
                    value.encode_cbor(e)?;
                }
            }
            Self::List(items) => encode_list(e, items)?,
            Self::Integer(value) => encode_integer(e, *value)?,
            Self::Bytes(bytes) if bytes.len() <= BYTES_CHUNK_SIZE => {
                e.bytes(bytes)?;
            }
            Self::Bytes(bytes) => {
                e.begin_bytes()?;
                for chunk in bytes.chunks(BYTES_CHUNK_SIZE) {
                    e.bytes(chunk)?;
                }
                e.end()?;
            }
        }
        Ok(())
    }
}

/// Datum attached to an output: by hash, or inline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datum {
    Hash(DatumHash),
    Inline(PlutusData),
}

impl CborEncode for Datum {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            Self::Hash(hash) => {
                e.array(2)?.u8(0)?.bytes(hash.as_ref())?;
            }
            Self::Inline(data) => {
                e.array(2)?.u8(1)?;
                write_embedded(e, &data.to_cbor())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_tags_follow_compact_ranges() {
        assert_eq!(PlutusData::unit().to_cbor(), vec![0xd8, 0x79, 0x80]);

        let seventh = PlutusData::Constr {
            tag: 7,
            fields: vec![PlutusData::Integer(1)],
        };
        assert_eq!(seventh.to_cbor(), vec![0xd9, 0x05, 0x00, 0x9f, 0x01, 0xff]);

        let general = PlutusData::Constr {
            tag: 200,
            fields: Vec::new(),
        };
        assert_eq!(
            general.to_cbor(),
            vec![0xd8, 0x66, 0x82, 0x18, 0xc8, 0x80]
        );
    }

    #[test]
    fn long_bytes_are_chunked() {
        let data = PlutusData::Bytes(vec![0xaa; 65]);
        let encoded = data.to_cbor();
        assert_eq!(encoded[0], 0x5f);
        assert_eq!(encoded[1..3], [0x58, 0x40]);
        assert_eq!(*encoded.last().expect("non-empty"), 0xff);
    }

    #[test]
    fn integers_beyond_64_bits_become_bignums() {
        assert_eq!(PlutusData::Integer(-1).to_cbor(), vec![0x20]);
        assert_eq!(
            PlutusData::Integer(i128::from(u64::MAX)).to_cbor(),
            vec![0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );

        let two_pow_64 = PlutusData::Integer(1i128 << 64).to_cbor();
        assert_eq!(two_pow_64, vec![0xc2, 0x49, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]);

        let below = PlutusData::Integer(-(1i128 << 64) - 1).to_cbor();
        assert_eq!(below, vec![0xc3, 0x49, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn inline_datum_is_embedded_cbor() {
        let datum = Datum::Inline(PlutusData::Integer(42));
        assert_eq!(datum.to_cbor(), vec![0x82, 0x01, 0xd8, 0x18, 0x42, 0x18, 0x2a]);
    }

    #[test]
    fn plutus_data_json_uses_hex_bytes() {
        let data: PlutusData =
            serde_json::from_str(r#"{"list": [{"bytes": "cafe"}, {"integer": -3}]}"#)
                .expect("valid json");
        assert_eq!(
            data,
            PlutusData::List(vec![
                PlutusData::Bytes(vec![0xca, 0xfe]),
                PlutusData::Integer(-3)
            ])
        );
    }
}
