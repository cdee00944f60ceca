use crate::encoding::{DecodeError, Decoder, EncodeError, Encoder};

pub const UTF16_NAME: &str = "UTF-16";
pub const UTF16BE_NAME: &str = "UTF-16BE";
pub const UTF16LE_NAME: &str = "UTF-16LE";

fn is_leading_surrogate(unit: u16) -> bool {
    (0xD800..0xDC00).contains(&unit)
}

fn is_trailing_surrogate(unit: u16) -> bool {
    (0xDC00..0xE000).contains(&unit)
}

/// Decode UTF-16 code units produced by `unit_of`, appending to `dst`.
fn decode_units(
    src: &[u8],
    dst: &mut String,
    finish: bool,
    unit_of: fn(&[u8]) -> u16,
) -> Result<(usize, usize), DecodeError> {
    if src.is_empty() {
        return Err(DecodeError::InputIsEmpty);
    }

    let mut read = 0;
    let mut write = 0;
    while read + 2 <= src.len() {
        let unit = unit_of(&src[read..read + 2]);
        if is_trailing_surrogate(unit) {
            return Err(DecodeError::UnpairedSurrogate { read, write });
        }
        if is_leading_surrogate(unit) {
            if read + 4 > src.len() {
                if finish {
                    return Err(DecodeError::UnpairedSurrogate { read, write });
                }
                // The trailing surrogate may arrive with the next chunk.
                break;
            }
            let low = unit_of(&src[read + 2..read + 4]);
            if !is_trailing_surrogate(low) {
                return Err(DecodeError::UnpairedSurrogate { read, write });
            }
            let code =
                0x10000 + (((unit as u32 - 0xD800) << 10) | (low as u32 - 0xDC00));
            let c = char::from_u32(code).ok_or(DecodeError::Malformed {
                read: read + 4,
                write,
                length: 4,
            })?;
            dst.push(c);
            read += 4;
            write += c.len_utf8();
        } else {
            // A non-surrogate unit is always a scalar value.
            let c = char::from_u32(unit as u32).unwrap();
            dst.push(c);
            read += 2;
            write += c.len_utf8();
        }
    }

    if finish && read < src.len() {
        return Err(DecodeError::Malformed {
            read: src.len(),
            write,
            length: src.len() - read,
        });
    }
    Ok((read, write))
}

fn encode_units(
    src: &str,
    dst: &mut Vec<u8>,
    finish: bool,
    put: fn(&mut Vec<u8>, u16),
) -> Result<(usize, usize), EncodeError> {
    if src.is_empty() {
        return if finish {
            Ok((0, 0))
        } else {
            Err(EncodeError::InputIsEmpty)
        };
    }
    let mut read = 0;
    let mut write = 0;
    let mut units = [0u16; 2];
    for c in src.chars() {
        for &unit in c.encode_utf16(&mut units).iter() {
            put(dst, unit);
            write += 2;
        }
        read += c.len_utf8();
    }
    Ok((read, write))
}

pub struct UTF16BEDecoder;
impl Decoder for UTF16BEDecoder {
    fn name(&self) -> &'static str {
        UTF16BE_NAME
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        decode_units(src, dst, finish, |b| u16::from_be_bytes([b[0], b[1]]))
    }
}

pub struct UTF16LEDecoder;
impl Decoder for UTF16LEDecoder {
    fn name(&self) -> &'static str {
        UTF16LE_NAME
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        decode_units(src, dst, finish, |b| u16::from_le_bytes([b[0], b[1]]))
    }
}

/// UTF-16 with byte-order detection.
///
/// The endianness is decided by a BOM at the head of the stream; without a
/// BOM, big-endian is assumed as the XML specification requires.
#[derive(Default)]
pub struct UTF16Decoder {
    header: usize,
    little_endian: bool,
}

impl Decoder for UTF16Decoder {
    fn name(&self) -> &'static str {
        UTF16_NAME
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        if src.is_empty() {
            return Err(DecodeError::InputIsEmpty);
        }

        let mut skip = 0;
        if self.header == 0 {
            if src.len() < 2 && !finish {
                return Ok((0, 0));
            }
            match src {
                [0xFF, 0xFE, ..] => {
                    self.little_endian = true;
                    skip = 2;
                }
                [0xFE, 0xFF, ..] => {
                    self.little_endian = false;
                    skip = 2;
                }
                _ => self.little_endian = false,
            }
            self.header = 2;
        }

        let (read, write) = if self.little_endian {
            UTF16LEDecoder.decode(&src[skip..], dst, finish)
        } else {
            UTF16BEDecoder.decode(&src[skip..], dst, finish)
        }
        .map_err(|err| match err {
            DecodeError::Malformed { read, write, length } => DecodeError::Malformed {
                read: read + skip,
                write,
                length,
            },
            DecodeError::UnpairedSurrogate { read, write } => DecodeError::UnpairedSurrogate {
                read: read + skip,
                write,
            },
            err => err,
        })?;
        Ok((read + skip, write))
    }
}

pub struct UTF16BEEncoder;
impl Encoder for UTF16BEEncoder {
    fn name(&self) -> &'static str {
        UTF16BE_NAME
    }

    fn encode(
        &mut self,
        src: &str,
        dst: &mut Vec<u8>,
        finish: bool,
    ) -> Result<(usize, usize), EncodeError> {
        encode_units(src, dst, finish, |dst, unit| {
            dst.extend_from_slice(&unit.to_be_bytes())
        })
    }
}

pub struct UTF16LEEncoder;
impl Encoder for UTF16LEEncoder {
    fn name(&self) -> &'static str {
        UTF16LE_NAME
    }

    fn encode(
        &mut self,
        src: &str,
        dst: &mut Vec<u8>,
        finish: bool,
    ) -> Result<(usize, usize), EncodeError> {
        encode_units(src, dst, finish, |dst, unit| {
            dst.extend_from_slice(&unit.to_le_bytes())
        })
    }
}

/// UTF-16 encoder writing a little-endian BOM first.
#[derive(Default)]
pub struct UTF16Encoder {
    init: bool,
}

impl Encoder for UTF16Encoder {
    fn name(&self) -> &'static str {
        UTF16_NAME
    }

    fn encode(
        &mut self,
        src: &str,
        dst: &mut Vec<u8>,
        finish: bool,
    ) -> Result<(usize, usize), EncodeError> {
        let mut write = 0;
        if !self.init {
            self.init = true;
            dst.extend_from_slice(&[0xFF, 0xFE]);
            write = 2;
        }
        let (read, w) = UTF16LEEncoder.encode(src, dst, finish)?;
        Ok((read, write + w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16be_roundtrip() {
        let mut bytes = vec![];
        UTF16BEEncoder.encode("a\u{3042}\u{10384}", &mut bytes, true).unwrap();
        let mut decoded = String::new();
        UTF16BEDecoder.decode(&bytes, &mut decoded, true).unwrap();
        assert_eq!(decoded, "a\u{3042}\u{10384}");
    }

    #[test]
    fn bom_selects_endianness() {
        let mut decoded = String::new();
        UTF16Decoder::default()
            .decode(&[0xFF, 0xFE, b'a', 0x00], &mut decoded, true)
            .unwrap();
        assert_eq!(decoded, "a");

        let mut decoded = String::new();
        UTF16Decoder::default()
            .decode(&[0xFE, 0xFF, 0x00, b'a'], &mut decoded, true)
            .unwrap();
        assert_eq!(decoded, "a");
    }

    #[test]
    fn lone_surrogate_is_an_error() {
        let mut decoded = String::new();
        let err = UTF16BEDecoder.decode(&[0xD8, 0x00, 0x00, b'a'], &mut decoded, true);
        assert!(matches!(err, Err(DecodeError::UnpairedSurrogate { .. })));
    }

    #[test]
    fn split_surrogate_pair_waits_for_more_input() {
        let mut decoded = String::new();
        let (read, _) = UTF16BEDecoder
            .decode(&[0x00, b'a', 0xD8, 0x00], &mut decoded, false)
            .unwrap();
        assert_eq!(read, 2);
        assert_eq!(decoded, "a");
    }
}
