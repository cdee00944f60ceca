mod latin1;
mod utf16;

use std::{
    borrow::Cow,
    collections::BTreeMap,
    str::{from_utf8, from_utf8_unchecked},
    sync::{LazyLock, RwLock},
};

pub use crate::encoding::{
    latin1::{
        ISO_8859_1_NAME, Latin1Decoder, Latin1Encoder, US_ASCII_NAME, USASCIIDecoder,
        USASCIIEncoder,
    },
    utf16::{
        UTF16_NAME, UTF16BE_NAME, UTF16BEDecoder, UTF16BEEncoder, UTF16Decoder, UTF16Encoder,
        UTF16LE_NAME, UTF16LEDecoder, UTF16LEEncoder,
    },
};

pub trait Encoder {
    fn name(&self) -> &'static str;
    /// Encode a prefix of `src` into `dst`.
    ///
    /// If no error occurs, return `Ok((read_bytes, write_bytes))`.
    fn encode(
        &mut self,
        src: &str,
        dst: &mut Vec<u8>,
        finish: bool,
    ) -> Result<(usize, usize), EncodeError>;
}

pub trait Decoder {
    fn name(&self) -> &'static str;
    /// Decode a prefix of `src`, appending to `dst`.
    ///
    /// If no error occurs, return `Ok((read_bytes, write_bytes))`.
    /// A trailing incomplete sequence is left unread unless `finish` is set.
    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError>;
}

#[derive(Debug, Clone)]
pub enum EncodeError {
    /// Input buffer is empty.
    InputIsEmpty,
    /// A character `c` has no mapping in the target encoding.
    ///
    /// `read` includes the length of `c`; `write` does not, because the
    /// encoder cannot write unmapped characters.
    Unmappable { read: usize, write: usize, c: char },
    /// Other errors.
    Other { msg: Cow<'static, str> },
}

#[derive(Debug, Clone)]
pub enum DecodeError {
    /// Input buffer is empty.
    InputIsEmpty,
    /// Malformed byte sequence found.
    ///
    /// The input and output buffers have consumed `read` and `write` bytes
    /// respectively. The malformed sequence occupies
    /// `input[read - length..read]`.
    Malformed {
        read: usize,
        write: usize,
        length: usize,
    },
    /// A lone UTF-16 surrogate code unit without its counterpart.
    UnpairedSurrogate { read: usize, write: usize },
    /// Other errors.
    Other { msg: Cow<'static, str> },
}

pub const UTF8_NAME: &str = "UTF-8";

pub struct UTF8Encoder;
impl Encoder for UTF8Encoder {
    fn name(&self) -> &'static str {
        UTF8_NAME
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
        dst.extend_from_slice(src.as_bytes());
        Ok((src.len(), src.len()))
    }
}

pub struct UTF8Decoder;
impl Decoder for UTF8Decoder {
    fn name(&self) -> &'static str {
        UTF8_NAME
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
        match from_utf8(src) {
            Ok(s) => {
                dst.push_str(s);
                Ok((src.len(), src.len()))
            }
            Err(err) => {
                let up_to = err.valid_up_to();
                dst.push_str(unsafe {
                    // # Safety
                    // This operation is safe due to the `Utf8Error` constraint.
                    from_utf8_unchecked(&src[..up_to])
                });
                match err.error_len() {
                    Some(len) => Err(DecodeError::Malformed {
                        read: up_to + len,
                        write: up_to,
                        length: len,
                    }),
                    None => {
                        if finish {
                            Err(DecodeError::Malformed {
                                read: src.len(),
                                write: up_to,
                                length: src.len() - up_to,
                            })
                        } else {
                            Ok((up_to, up_to))
                        }
                    }
                }
            }
        }
    }
}

/// Manage aliases for encoding names.
///
/// Reference: [Character sets registered by IANA](https://www.iana.org/assignments/character-sets/character-sets.xhtml)
pub static ENCODING_ALIASES: LazyLock<RwLock<BTreeMap<&'static str, &'static str>>> =
    LazyLock::new(|| {
        RwLock::new(BTreeMap::from([
            ("UTF8", UTF8_NAME),
            ("UTF16", UTF16_NAME),
            ("UTF16BE", UTF16BE_NAME),
            ("UTF16LE", UTF16LE_NAME),
            ("LATIN1", ISO_8859_1_NAME),
            ("L1", ISO_8859_1_NAME),
            ("ISO8859-1", ISO_8859_1_NAME),
            ("ISO_8859-1", ISO_8859_1_NAME),
            ("IBM819", ISO_8859_1_NAME),
            ("CP819", ISO_8859_1_NAME),
            ("ASCII", US_ASCII_NAME),
            ("ANSI_X3.4-1968", US_ASCII_NAME),
            ("ISO646-US", US_ASCII_NAME),
        ]))
    });

pub type EncoderFactory = fn() -> Box<dyn Encoder>;
pub static ENCODER_TABLE: LazyLock<RwLock<BTreeMap<&'static str, EncoderFactory>>> =
    LazyLock::new(|| {
        let mut map = BTreeMap::<&'static str, EncoderFactory>::new();
        map.insert(UTF8_NAME, || Box::new(UTF8Encoder));
        map.insert(UTF16_NAME, || Box::new(UTF16Encoder::default()));
        map.insert(UTF16BE_NAME, || Box::new(UTF16BEEncoder));
        map.insert(UTF16LE_NAME, || Box::new(UTF16LEEncoder));
        map.insert(ISO_8859_1_NAME, || Box::new(Latin1Encoder));
        map.insert(US_ASCII_NAME, || Box::new(USASCIIEncoder));
        RwLock::new(map)
    });

pub type DecoderFactory = fn() -> Box<dyn Decoder>;
pub static DECODER_TABLE: LazyLock<RwLock<BTreeMap<&'static str, DecoderFactory>>> =
    LazyLock::new(|| {
        let mut map = BTreeMap::<&'static str, DecoderFactory>::new();
        map.insert(UTF8_NAME, || Box::new(UTF8Decoder));
        map.insert(UTF16_NAME, || Box::new(UTF16Decoder::default()));
        map.insert(UTF16BE_NAME, || Box::new(UTF16BEDecoder));
        map.insert(UTF16LE_NAME, || Box::new(UTF16LEDecoder));
        map.insert(ISO_8859_1_NAME, || Box::new(Latin1Decoder));
        map.insert(US_ASCII_NAME, || Box::new(USASCIIDecoder));
        RwLock::new(map)
    });

/// Canonicalize `encoding_name` for table lookup.
///
/// XML encoding names are matched case-insensitively.
fn canonical_name(encoding_name: &str) -> String {
    encoding_name.to_ascii_uppercase()
}

pub fn find_encoder(encoding_name: &str) -> Option<Box<dyn Encoder>> {
    let name = canonical_name(encoding_name);
    let table = ENCODER_TABLE.read().unwrap();
    if let Some(factory) = table.get(name.as_str()) {
        return Some(factory());
    }
    let &alias = ENCODING_ALIASES.read().unwrap().get(name.as_str())?;
    table.get(alias).map(|f| f())
}

pub fn find_decoder(encoding_name: &str) -> Option<Box<dyn Decoder>> {
    let name = canonical_name(encoding_name);
    let table = DECODER_TABLE.read().unwrap();
    if let Some(factory) = table.get(name.as_str()) {
        return Some(factory());
    }
    let &alias = ENCODING_ALIASES.read().unwrap().get(name.as_str())?;
    table.get(alias).map(|f| f())
}

pub fn register_encoder(
    encoding_name: &'static str,
    factory: EncoderFactory,
) -> Option<EncoderFactory> {
    ENCODER_TABLE
        .write()
        .unwrap()
        .insert(encoding_name, factory)
}

pub fn register_decoder(
    encoding_name: &'static str,
    factory: DecoderFactory,
) -> Option<DecoderFactory> {
    DECODER_TABLE
        .write()
        .unwrap()
        .insert(encoding_name, factory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_lookup_is_case_insensitive() {
        assert!(find_decoder("utf-8").is_some());
        assert!(find_decoder("Utf-16").is_some());
        assert!(find_decoder("latin1").is_some());
        assert!(find_decoder("ascii").is_some());
        assert!(find_decoder("EBCDIC-GARBAGE").is_none());
    }

    #[test]
    fn utf8_decoder_reports_malformed_input() {
        let mut decoder = UTF8Decoder;
        let mut dst = String::new();
        let err = decoder.decode(&[b'a', 0xFF, b'b'], &mut dst, true);
        assert!(matches!(err, Err(DecodeError::Malformed { write: 1, .. })));
        assert_eq!(dst, "a");
    }

    #[test]
    fn utf8_decoder_keeps_incomplete_tail() {
        let mut decoder = UTF8Decoder;
        let mut dst = String::new();
        // 0xE3 0x81 is a truncated 3-byte sequence
        let (read, write) = decoder.decode(&[b'a', 0xE3, 0x81], &mut dst, false).unwrap();
        assert_eq!((read, write), (1, 1));
        assert_eq!(dst, "a");
    }
}
