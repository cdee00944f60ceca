use crate::encoding::{DecodeError, Decoder, EncodeError, Encoder};

pub const ISO_8859_1_NAME: &str = "ISO-8859-1";
pub const US_ASCII_NAME: &str = "US-ASCII";

/// ISO-8859-1 maps bytes 0x00..=0xFF directly to U+0000..=U+00FF.
pub struct Latin1Decoder;
impl Decoder for Latin1Decoder {
    fn name(&self) -> &'static str {
        ISO_8859_1_NAME
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        if src.is_empty() {
            return if finish {
                Ok((0, 0))
            } else {
                Err(DecodeError::InputIsEmpty)
            };
        }
        let mut write = 0;
        for &b in src {
            let c = b as char;
            dst.push(c);
            write += c.len_utf8();
        }
        Ok((src.len(), write))
    }
}

pub struct Latin1Encoder;
impl Encoder for Latin1Encoder {
    fn name(&self) -> &'static str {
        ISO_8859_1_NAME
    }

    fn encode(
        &mut self,
        src: &str,
        dst: &mut Vec<u8>,
        finish: bool,
    ) -> Result<(usize, usize), EncodeError> {
        if src.is_empty() {
            return if finish {
                Ok((0, 0))
            } else {
                Err(EncodeError::InputIsEmpty)
            };
        }
        let (mut read, mut write) = (0, 0);
        for c in src.chars() {
            let code = c as u32;
            read += c.len_utf8();
            if code >= 256 {
                return Err(EncodeError::Unmappable { read, write, c });
            }
            dst.push(code as u8);
            write += 1;
        }
        Ok((read, write))
    }
}

pub struct USASCIIDecoder;
impl Decoder for USASCIIDecoder {
    fn name(&self) -> &'static str {
        US_ASCII_NAME
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        if src.is_empty() {
            return if finish {
                Ok((0, 0))
            } else {
                Err(DecodeError::InputIsEmpty)
            };
        }
        let (mut read, mut write) = (0, 0);
        for &b in src {
            if b >= 128 {
                return Err(DecodeError::Malformed {
                    read: read + 1,
                    write,
                    length: 1,
                });
            }
            dst.push(b as char);
            read += 1;
            write += 1;
        }
        Ok((read, write))
    }
}

pub struct USASCIIEncoder;
impl Encoder for USASCIIEncoder {
    fn name(&self) -> &'static str {
        US_ASCII_NAME
    }

    fn encode(
        &mut self,
        src: &str,
        dst: &mut Vec<u8>,
        finish: bool,
    ) -> Result<(usize, usize), EncodeError> {
        if src.is_empty() {
            return if finish {
                Ok((0, 0))
            } else {
                Err(EncodeError::InputIsEmpty)
            };
        }
        let (mut read, mut write) = (0, 0);
        for c in src.chars() {
            read += c.len_utf8();
            if (c as u32) >= 128 {
                return Err(EncodeError::Unmappable { read, write, c });
            }
            dst.push(c as u8);
            write += 1;
        }
        Ok((read, write))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_decodes_high_bytes() {
        let mut dst = String::new();
        Latin1Decoder.decode(&[b'a', 0xE9, 0xFF], &mut dst, true).unwrap();
        assert_eq!(dst, "a\u{E9}\u{FF}");
    }

    #[test]
    fn ascii_rejects_high_bytes() {
        let mut dst = String::new();
        let err = USASCIIDecoder.decode(&[b'a', 0x80], &mut dst, true);
        assert!(matches!(err, Err(DecodeError::Malformed { .. })));
    }
}
