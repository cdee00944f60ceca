use std::{
    io::Read,
    path::{Path, PathBuf},
    sync::{Arc, atomic::AtomicUsize},
};

use crate::{
    encoding::{DecodeError, Decoder, UTF8Decoder, UTF16BEDecoder, UTF16LEDecoder, find_decoder},
    error::XMLError,
};

pub(crate) const INPUT_CHUNK: usize = 4096;
const GROW_THRESHOLD: usize = 64;

static SOURCE_ID: AtomicUsize = AtomicUsize::new(0);

/// A lazy sequence of Unicode scalar values decoded from a byte stream.
///
/// Sources are stacked by the reader: expanding an entity reference pushes a
/// new source whose text is the entity's replacement, and end of input on a
/// pushed source pops it. Line ends are normalized here, so consumers only
/// ever see `\n`.
pub struct InputSource<'a> {
    source: Box<dyn Read + 'a>,
    buffer: Vec<u8>,
    decoder: Box<dyn Decoder>,
    decoded: String,
    /// Start position of the undecoded range of `buffer`
    buffer_next: usize,
    /// End position of data read into `buffer`
    buffer_end: usize,
    /// Start position of unused data in `decoded`
    decoded_next: usize,
    /// Whether `source` has reached EOF
    eof: bool,
    /// If `true`, consumed data is discarded eagerly. Must stay `false`
    /// while the encoding may still be switched by an encoding declaration,
    /// because switching re-decodes the buffered bytes.
    compact: bool,
    /// The encoding was guessed and may be replaced by the declared one.
    provisional: bool,
    /// The encoding was fixed out of band (in-memory content or an
    /// explicitly specified encoding); any encoding declaration is ignored.
    fixed_encoding: bool,
    /// Number of byte-order-mark bytes skipped at the head of the stream.
    bom_len: usize,
    /// A unique identifier for the source.
    ///
    /// Constructs that must start and end within one entity snapshot this
    /// id and compare it at their closing delimiter.
    source_id: usize,
    /// Base directory for resolving external identifiers found in this
    /// source.
    base_dir: PathBuf,
    /// Name of the entity this source expands, if any. The reader walks the
    /// source stack over these names to detect entity recursion.
    entity_name: Option<Arc<str>>,
    /// Pop this source automatically when it is exhausted. Set for
    /// parameter-entity replacements.
    auto_discard: bool,

    system_id: Option<Arc<str>>,
    public_id: Option<Arc<str>>,
}

impl<'a> InputSource<'a> {
    /// Construct an [`InputSource`] from the XML document resource `reader`.
    ///
    /// If the resource encoding is known, it can be specified using
    /// `encoding`. Otherwise the encoding is inferred from the first bytes
    /// of the stream.
    pub fn from_reader(reader: impl Read + 'a, encoding: Option<&str>) -> Result<Self, XMLError> {
        let mut ret = Self::default();
        ret.buffer.resize(INPUT_CHUNK, 0);
        ret.source = Box::new(reader);

        if let Some(encoding) = encoding {
            ret.decoder = find_decoder(encoding).ok_or(XMLError::UnsupportedEncoding)?;
            ret.provisional = false;
            ret.fixed_encoding = true;
            ret.compact = true;
        } else {
            // Handling strange implementations that write only one byte per read
            for _ in 0..INPUT_CHUNK {
                let read = ret.source.read(&mut ret.buffer[ret.buffer_end..])?;
                ret.buffer_end += read;
                if read == 0 || ret.buffer_end == INPUT_CHUNK {
                    ret.eof = read == 0;
                    break;
                }
            }
            if ret.buffer_end >= 4 {
                ret.detect_encoding();
            } else {
                // The minimum length of a well-formed document is 4 bytes,
                // so there is nothing to detect from.
                ret.compact = true;
                ret.provisional = false;
            }
        }
        Ok(ret)
    }

    /// Construct an [`InputSource`] from in-memory text.
    ///
    /// The content is always treated as already decoded; any encoding
    /// declaration it contains is ignored.
    pub fn from_content(text: impl Into<String>) -> Self {
        Self {
            source: Box::new(std::io::empty()),
            buffer: vec![],
            decoder: Box::new(UTF8Decoder),
            decoded: text.into(),
            buffer_next: 0,
            buffer_end: 0,
            decoded_next: 0,
            eof: true,
            compact: true,
            provisional: false,
            fixed_encoding: true,
            bom_len: 0,
            source_id: SOURCE_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            base_dir: PathBuf::new(),
            entity_name: None,
            auto_discard: false,
            system_id: None,
            public_id: None,
        }
    }

    fn detect_encoding(&mut self) {
        match self.buffer[..4] {
            // Cases where a BOM was found:
            [0xFE, 0xFF, ..] => {
                self.buffer_next = 2;
                self.bom_len = 2;
                self.decoder = Box::new(UTF16BEDecoder);
                self.provisional = false;
            }
            [0xFF, 0xFE, ..] => {
                self.buffer_next = 2;
                self.bom_len = 2;
                self.decoder = Box::new(UTF16LEDecoder);
                self.provisional = false;
            }
            [0xEF, 0xBB, 0xBF, ..] => {
                self.buffer_next = 3;
                self.bom_len = 3;
                self.decoder = Box::new(UTF8Decoder);
                self.provisional = false;
            }
            // No BOM; guess from the '<?xml' signature:
            // UTF-16BE or another big-endian 16-bit encoding with ASCII at
            // the usual positions
            [0x00, 0x3C, 0x00, 0x3F] => {
                self.decoder = Box::new(UTF16BEDecoder);
                self.provisional = false;
            }
            // UTF-16LE, by the same reasoning
            [0x3C, 0x00, 0x3F, 0x00] => {
                self.decoder = Box::new(UTF16LEDecoder);
                self.provisional = false;
            }
            // Any encoding that keeps ASCII at its normal positions; the
            // encoding declaration itself can be read reliably, so keep the
            // raw bytes around until it has been.
            [0x3C, 0x3F, 0x78, 0x6D] => {
                self.decoder = Box::new(UTF8Decoder);
                self.provisional = true;
            }
            // Anything else is UTF-8 without an XML declaration.
            _ => {
                self.decoder = Box::new(UTF8Decoder);
                self.provisional = false;
                self.compact = true;
            }
        }
    }

    /// Read and decode more data if the lookahead window runs short.
    pub(crate) fn grow(&mut self) -> Result<(), XMLError> {
        if !self.eof {
            let rem = self.buffer_end - self.buffer_next;
            if rem < GROW_THRESHOLD {
                if self.compact {
                    self.buffer.copy_within(self.buffer_next..self.buffer_end, 0);
                    self.buffer_end = rem;
                    self.buffer_next = 0;
                    if self.buffer.len() > INPUT_CHUNK {
                        self.buffer.truncate(INPUT_CHUNK);
                        self.buffer.shrink_to_fit();
                    }
                } else {
                    self.buffer.resize(self.buffer.len() + INPUT_CHUNK, 0);
                }
                let mut read = 1;
                while self.buffer_end < self.buffer.len() && read != 0 {
                    read = self.source.read(&mut self.buffer[self.buffer_end..])?;
                    self.buffer_end += read;
                }
                self.eof = read == 0;
            }
        }

        if self.compact && self.decoded_next > INPUT_CHUNK {
            self.decoded.drain(..self.decoded_next);
            self.decoded_next = 0;
        }

        while self.buffer_next < self.buffer_end
            && self.decoded.len() - self.decoded_next < INPUT_CHUNK
        {
            let end = self.buffer_end.min(self.buffer_next + INPUT_CHUNK);
            match self
                .decoder
                .decode(&self.buffer[self.buffer_next..end], &mut self.decoded, self.eof)
            {
                Ok((read, _)) => {
                    if read == 0 {
                        break;
                    }
                    self.buffer_next += read;
                }
                Err(err) => {
                    let consumed = match &err {
                        DecodeError::Malformed { read, length, .. } => read - length,
                        DecodeError::UnpairedSurrogate { read, .. } => *read,
                        _ => 0,
                    };
                    if consumed > 0 {
                        // Keep the data decoded so far; the error surfaces
                        // again once the consumer reaches the bad bytes.
                        self.buffer_next += consumed;
                        break;
                    }
                    return Err(From::from(err));
                }
            }
        }
        Ok(())
    }

    pub fn content_bytes(&self) -> &[u8] {
        &self.decoded.as_bytes()[self.decoded_next..]
    }

    pub fn content_str(&self) -> &str {
        &self.decoded[self.decoded_next..]
    }

    fn peek_raw(&mut self) -> Result<Option<char>, XMLError> {
        if let Some(c) = self.decoded[self.decoded_next..].chars().next() {
            return Ok(Some(c));
        }
        self.grow()?;
        Ok(self.decoded[self.decoded_next..].chars().next())
    }

    /// The next code point with line ends normalized, without consuming it.
    pub(crate) fn peek_char(&mut self) -> Result<Option<char>, XMLError> {
        Ok(self.peek_raw()?.map(|c| if c == '\r' { '\n' } else { c }))
    }

    /// Consume and return the next code point.
    ///
    /// `CR` and `CR LF` are folded into a single `LF`.
    pub(crate) fn next_char(&mut self) -> Result<Option<char>, XMLError> {
        let Some(c) = self.peek_raw()? else {
            return Ok(None);
        };
        self.decoded_next += c.len_utf8();
        if c == '\r' {
            if self.peek_raw()? == Some('\n') {
                self.decoded_next += 1;
            }
            return Ok(Some('\n'));
        }
        Ok(Some(c))
    }

    /// Skip `len` bytes of already decoded content.
    ///
    /// The caller must know the skipped range contains no `CR`.
    pub(crate) fn advance(&mut self, mut len: usize) -> Result<(), XMLError> {
        while len > 0 {
            if self.decoded.len() == self.decoded_next {
                self.grow()?;
            }
            let l = len.min(self.decoded.len() - self.decoded_next);
            if l == 0 {
                return Err(XMLError::UnexpectedEof);
            }
            assert!(self.decoded.is_char_boundary(self.decoded_next + l));
            self.decoded_next += l;
            len -= l;
        }
        Ok(())
    }

    /// Returns `true` if both the decoded but unused text and the read but
    /// undecoded bytes are empty.
    ///
    /// This does not imply EOF on its own; call [`Self::grow`] first.
    pub fn is_empty(&self) -> bool {
        self.decoded.len() - self.decoded_next == 0 && self.buffer_end - self.buffer_next == 0
    }

    /// The encoding name of the decoder currently in use.
    pub fn encoding_name(&self) -> &'static str {
        self.decoder.name()
    }

    /// Whether the encoding was guessed and may still be replaced by an
    /// encoding declaration.
    pub(crate) fn is_provisional(&self) -> bool {
        self.provisional
    }

    /// Whether the stream started with a byte order mark.
    pub(crate) fn has_bom(&self) -> bool {
        self.bom_len > 0
    }

    /// Whether the encoding was fixed out of band, making any encoding
    /// declaration informative only.
    pub(crate) fn has_fixed_encoding(&self) -> bool {
        self.fixed_encoding
    }

    /// Switch to the encoding declared in the XML or text declaration and
    /// re-decode the buffered bytes.
    pub(crate) fn switch_encoding(&mut self, to: &str) -> Result<(), XMLError> {
        if !self.provisional {
            return Err(XMLError::InternalError);
        }
        let mut decoder = find_decoder(to).ok_or(XMLError::UnsupportedEncoding)?;

        // The consumed prefix is the ASCII XML declaration, which decodes
        // identically in every encoding this switch is legal for, so the
        // consumed char count carries over unchanged.
        let mut decoded = String::new();
        let mut next = self.bom_len;
        while next < self.buffer_end {
            match decoder.decode(&self.buffer[next..self.buffer_end], &mut decoded, self.eof) {
                Ok((read, _)) => {
                    if read == 0 {
                        break;
                    }
                    next += read;
                }
                Err(err) => {
                    let consumed = match &err {
                        DecodeError::Malformed { read, length, .. } => read - length,
                        DecodeError::UnpairedSurrogate { read, .. } => *read,
                        _ => 0,
                    };
                    if consumed == 0 {
                        return Err(From::from(err));
                    }
                    next += consumed;
                    break;
                }
            }
        }
        if decoded.len() < self.decoded_next {
            return Err(XMLError::InternalError);
        }

        self.decoder = decoder;
        self.decoded = decoded;
        self.buffer_next = next;
        self.provisional = false;
        self.set_compact_mode();
        Ok(())
    }

    /// Change buffer control to compact mode.
    ///
    /// If it was already in compact mode, nothing happens.
    pub(crate) fn set_compact_mode(&mut self) {
        self.compact = true;
        self.provisional = false;
    }

    pub fn source_id(&self) -> usize {
        self.source_id
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn set_base_dir(&mut self, base_dir: impl Into<PathBuf>) {
        self.base_dir = base_dir.into();
    }

    pub fn entity_name(&self) -> Option<&Arc<str>> {
        self.entity_name.as_ref()
    }

    pub(crate) fn set_entity_name(&mut self, name: Arc<str>) {
        self.entity_name = Some(name);
    }

    pub(crate) fn auto_discard(&self) -> bool {
        self.auto_discard
    }

    pub(crate) fn set_auto_discard(&mut self) {
        self.auto_discard = true;
    }

    /// System identifier of this source.
    pub fn system_id(&self) -> Option<Arc<str>> {
        self.system_id.clone()
    }

    /// Public identifier of this source.
    pub fn public_id(&self) -> Option<Arc<str>> {
        self.public_id.clone()
    }

    pub fn set_system_id(&mut self, system_id: impl Into<Arc<str>>) {
        self.system_id = Some(system_id.into());
    }

    pub fn set_public_id(&mut self, public_id: impl Into<Arc<str>>) {
        self.public_id = Some(public_id.into());
    }
}

impl Default for InputSource<'_> {
    fn default() -> Self {
        Self {
            source: Box::new(std::io::empty()),
            buffer: vec![],
            decoder: Box::new(UTF8Decoder),
            decoded: String::new(),
            buffer_next: 0,
            buffer_end: 0,
            decoded_next: 0,
            eof: false,
            compact: false,
            provisional: false,
            fixed_encoding: false,
            bom_len: 0,
            source_id: SOURCE_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            base_dir: PathBuf::new(),
            entity_name: None,
            auto_discard: false,
            system_id: None,
            public_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(source: &mut InputSource<'_>) -> String {
        let mut out = String::new();
        while let Some(c) = source.next_char().unwrap() {
            out.push(c);
        }
        out
    }

    #[test]
    fn newline_normalization() {
        let mut source = InputSource::from_content("a\r\nb\rc\nd");
        assert_eq!(collect(&mut source), "a\nb\nc\nd");
    }

    #[test]
    fn detects_utf16le_bom() {
        let bytes: &[u8] = &[0xFF, 0xFE, b'<', 0x00, b'a', 0x00, b'/', 0x00, b'>', 0x00];
        let mut source = InputSource::from_reader(bytes, None).unwrap();
        assert_eq!(source.encoding_name(), "UTF-16LE");
        assert_eq!(collect(&mut source), "<a/>");
    }

    #[test]
    fn detects_utf16be_without_bom() {
        let mut bytes = vec![];
        for b in "<?xml version=\"1.0\"?>".bytes() {
            bytes.extend_from_slice(&[0x00, b]);
        }
        let mut source = InputSource::from_reader(bytes.as_slice(), None).unwrap();
        assert_eq!(source.encoding_name(), "UTF-16BE");
        assert_eq!(collect(&mut source), "<?xml version=\"1.0\"?>");
    }

    #[test]
    fn switches_to_latin1_after_signature() {
        let mut bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"</a>");
        let mut source = InputSource::from_reader(bytes.as_slice(), None).unwrap();
        assert!(source.is_provisional());
        // consume the declaration, then switch
        let decl_len = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>".len();
        source.grow().unwrap();
        source.advance(decl_len).unwrap();
        source.switch_encoding("ISO-8859-1").unwrap();
        assert_eq!(collect(&mut source), "<a>\u{E9}</a>");
    }
}
