use memchr::{memchr, memchr3};

use crate::{
    error::XMLError,
    sax::{error::fatal_error, handler::SAXHandler, parser::XMLReader},
};

/// Tokens recognized in markup context (prolog, tags and the DTD).
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MarkupToken {
    Eof,
    /// `<?xml`
    XmlDecl,
    /// A whitespace run
    Space,
    /// `<!--  -->` with its text
    Comment(String),
    Name(String),
    NmToken(String),
    /// A quoted string with the quote character that delimited it
    Literal { value: String, quote: char },
    /// `<?target data?>`
    Pi { target: String, data: Option<String> },
    /// `<`
    STag,
    /// `</`
    ETag,
    /// `<!DOCTYPE`
    DocType,
    /// `<!ELEMENT`
    Element,
    /// `<!ATTLIST`
    AttList,
    /// `<!ENTITY`
    Entity,
    /// `<!NOTATION`
    Notation,
    /// `<![`
    IncludeIgnore,
    /// `%name;`
    PeReference(String),
    /// Any other single character
    Punct(char),
}

impl std::fmt::Display for MarkupToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eof => write!(f, "end of input"),
            Self::XmlDecl => write!(f, "'<?xml'"),
            Self::Space => write!(f, "whitespace"),
            Self::Comment(_) => write!(f, "comment"),
            Self::Name(name) => write!(f, "name '{name}'"),
            Self::NmToken(token) => write!(f, "name token '{token}'"),
            Self::Literal { value, .. } => write!(f, "quoted string \"{value}\""),
            Self::Pi { target, .. } => write!(f, "processing instruction '{target}'"),
            Self::STag => write!(f, "'<'"),
            Self::ETag => write!(f, "'</'"),
            Self::DocType => write!(f, "'<!DOCTYPE'"),
            Self::Element => write!(f, "'<!ELEMENT'"),
            Self::AttList => write!(f, "'<!ATTLIST'"),
            Self::Entity => write!(f, "'<!ENTITY'"),
            Self::Notation => write!(f, "'<!NOTATION'"),
            Self::IncludeIgnore => write!(f, "'<!['"),
            Self::PeReference(name) => write!(f, "parameter entity reference '%{name};'"),
            Self::Punct(c) => write!(f, "'{c}'"),
        }
    }
}

/// Tokens recognized in element content.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ContentToken {
    Eof,
    /// `<`
    STag,
    /// `</`
    ETag,
    /// `&name;`
    Reference(String),
    /// A CDATA section with its text
    CDSect(String),
    Comment(String),
    Pi { target: String, data: Option<String> },
    /// Character data with character references already decoded
    Content(String),
    /// A whitespace-only run of character data
    Space(String),
}

impl<H: SAXHandler> XMLReader<H> {
    /// The next token in markup context.
    ///
    /// Entity references are never expanded here; they are returned as
    /// tokens for the grammar to handle.
    pub(crate) fn next_markup_token(&mut self) -> Result<MarkupToken, XMLError> {
        if let Some(token) = self.peeked_markup.take() {
            return Ok(token);
        }

        let Some(c) = self.next_char()? else {
            return Ok(MarkupToken::Eof);
        };

        let version = self.version;
        if version.is_whitespace(c) {
            while self.next_char_if(|c| version.is_whitespace(c))?.is_some() {}
            return Ok(MarkupToken::Space);
        }

        match c {
            '<' => match self.peek_char()? {
                Some('?') => {
                    self.next_char()?;
                    self.scan_pi_or_xml_decl()
                }
                Some('!') => {
                    self.next_char()?;
                    match self.peek_char()? {
                        Some('-') => {
                            self.next_char()?;
                            if self.next_char()? != Some('-') {
                                fatal_error!(
                                    self,
                                    UnexpectedToken,
                                    "'<!-' is not a legal markup opener"
                                );
                                return Err(XMLError::UnexpectedToken);
                            }
                            Ok(MarkupToken::Comment(self.scan_comment()?))
                        }
                        Some('[') => {
                            self.next_char()?;
                            Ok(MarkupToken::IncludeIgnore)
                        }
                        _ => {
                            let keyword = self.scan_name()?;
                            match keyword.as_str() {
                                "DOCTYPE" => Ok(MarkupToken::DocType),
                                "ELEMENT" => Ok(MarkupToken::Element),
                                "ATTLIST" => Ok(MarkupToken::AttList),
                                "ENTITY" => Ok(MarkupToken::Entity),
                                "NOTATION" => Ok(MarkupToken::Notation),
                                _ => {
                                    fatal_error!(
                                        self,
                                        UnexpectedToken,
                                        "'<!{}' is not a legal markup declaration",
                                        keyword
                                    );
                                    Err(XMLError::UnexpectedToken)
                                }
                            }
                        }
                    }
                }
                Some('/') => {
                    self.next_char()?;
                    Ok(MarkupToken::ETag)
                }
                _ => Ok(MarkupToken::STag),
            },
            '%' => {
                if self
                    .peek_char()?
                    .is_some_and(|c| self.version.is_name_start_char(c))
                {
                    let name = self.scan_name()?;
                    if self.next_char()? != Some(';') {
                        fatal_error!(
                            self,
                            UndefinedParameterEntity,
                            "A parameter entity reference does not end with ';'."
                        );
                        return Err(XMLError::UndefinedParameterEntity);
                    }
                    Ok(MarkupToken::PeReference(name))
                } else {
                    Ok(MarkupToken::Punct('%'))
                }
            }
            '"' | '\'' => {
                let mut value = String::new();
                loop {
                    match self.next_char()? {
                        Some(end) if end == c => break,
                        Some(ch) => value.push(ch),
                        None => {
                            fatal_error!(
                                self,
                                UnexpectedEof,
                                "unexpected end of input, runaway string"
                            );
                            return Err(XMLError::UnexpectedEof);
                        }
                    }
                }
                Ok(MarkupToken::Literal { value, quote: c })
            }
            c if version.is_name_start_char(c) => {
                let mut name = String::new();
                name.push(c);
                while let Some(c) = self.next_char_if(|c| version.is_name_char(c))? {
                    name.push(c);
                }
                Ok(MarkupToken::Name(name))
            }
            c if version.is_name_char(c) => {
                let mut token = String::new();
                token.push(c);
                while let Some(c) = self.next_char_if(|c| version.is_name_char(c))? {
                    token.push(c);
                }
                Ok(MarkupToken::NmToken(token))
            }
            c => Ok(MarkupToken::Punct(c)),
        }
    }

    pub(crate) fn peek_markup_token(&mut self) -> Result<&MarkupToken, XMLError> {
        if self.peeked_markup.is_none() {
            let token = self.next_markup_token()?;
            self.peeked_markup = Some(token);
        }
        Ok(self.peeked_markup.as_ref().unwrap())
    }

    /// The next token in element content context.
    pub(crate) fn next_content_token(&mut self) -> Result<ContentToken, XMLError> {
        debug_assert!(self.peeked_markup.is_none());
        let Some(c) = self.peek_char()? else {
            return Ok(ContentToken::Eof);
        };

        if c == '<' {
            self.next_char()?;
            return match self.peek_char()? {
                Some('/') => {
                    self.next_char()?;
                    Ok(ContentToken::ETag)
                }
                Some('!') => {
                    self.next_char()?;
                    match self.next_char()? {
                        Some('-') => {
                            if self.next_char()? != Some('-') {
                                fatal_error!(
                                    self,
                                    UnexpectedToken,
                                    "'<!-' is not a legal markup opener"
                                );
                                return Err(XMLError::UnexpectedToken);
                            }
                            Ok(ContentToken::Comment(self.scan_comment()?))
                        }
                        Some('[') => {
                            for expected in "CDATA[".chars() {
                                if self.next_char()? != Some(expected) {
                                    fatal_error!(
                                        self,
                                        UnexpectedToken,
                                        "'<![' in content must open a CDATA section"
                                    );
                                    return Err(XMLError::UnexpectedToken);
                                }
                            }
                            Ok(ContentToken::CDSect(self.scan_cdsect()?))
                        }
                        _ => {
                            fatal_error!(self, UnexpectedToken, "invalid content");
                            Err(XMLError::UnexpectedToken)
                        }
                    }
                }
                Some('?') => {
                    self.next_char()?;
                    match self.scan_pi_or_xml_decl()? {
                        MarkupToken::Pi { target, data } => Ok(ContentToken::Pi { target, data }),
                        _ => {
                            fatal_error!(
                                self,
                                UnexpectedToken,
                                "an XML declaration may only appear at the start of the document"
                            );
                            Err(XMLError::UnexpectedToken)
                        }
                    }
                }
                _ => Ok(ContentToken::STag),
            };
        }

        self.scan_content_run()
    }

    /// Scan a run of character data, decoding character references in
    /// place. A general entity reference at the start of the run is
    /// returned as [`ContentToken::Reference`] instead.
    fn scan_content_run(&mut self) -> Result<ContentToken, XMLError> {
        let mut buffer = String::new();
        let mut non_whitespace = 0usize;

        loop {
            // Fast path: take a whole chunk up to the next markup, entity
            // reference, bracket or carriage return.
            if self.pushback.is_empty() {
                let bytes = self.source.content_bytes();
                if !bytes.is_empty() {
                    let boundary = memchr3(b'<', b'&', b'\r', bytes)
                        .unwrap_or(bytes.len())
                        .min(memchr(b']', bytes).unwrap_or(bytes.len()));
                    if boundary > 0 {
                        let chunk = &self.source.content_str()[..boundary];
                        let mut lines = 0;
                        let mut last_line_len = None;
                        for c in chunk.chars() {
                            if !self.version.is_char(c) {
                                fatal_error!(
                                    self,
                                    DisallowedChar,
                                    "character U+{:04X} is not allowed",
                                    c as u32
                                );
                                return Err(XMLError::DisallowedChar);
                            }
                            if c == '\n' {
                                lines += 1;
                                last_line_len = Some(0);
                            } else if let Some(len) = last_line_len.as_mut() {
                                *len += 1;
                            }
                            if !self.version.is_whitespace(c) {
                                non_whitespace += 1;
                            }
                        }
                        let columns = chunk.chars().count();
                        buffer.push_str(chunk);
                        self.source.advance(boundary)?;
                        if lines > 0 {
                            self.locator.update_line(|l| l + lines);
                            self.locator.set_column(last_line_len.unwrap() + 1);
                        } else {
                            self.locator.update_column(|c| c + columns);
                        }
                        continue;
                    }
                }
            }

            match self.peek_char()? {
                None | Some('<') => break,
                Some('&') => {
                    self.next_char()?;
                    if self.peek_char()? == Some('#') {
                        self.next_char()?;
                        let c = self.parse_char_ref()?;
                        buffer.push(c);
                        non_whitespace += 1;
                    } else if buffer.is_empty() {
                        if !self
                            .peek_char()?
                            .is_some_and(|c| self.version.is_name_start_char(c))
                        {
                            fatal_error!(
                                self,
                                UndefinedEntity,
                                "stray ampersand found in content"
                            );
                            return Err(XMLError::UndefinedEntity);
                        }
                        let name = self.scan_name()?;
                        if self.next_char()? != Some(';') {
                            fatal_error!(
                                self,
                                UndefinedEntity,
                                "invalid entity found in content, missing semicolon?"
                            );
                            return Err(XMLError::UndefinedEntity);
                        }
                        return Ok(ContentToken::Reference(name));
                    } else {
                        self.retract('&');
                        break;
                    }
                }
                Some(']') => {
                    let mut run = 0usize;
                    while self.next_char_if(|c| c == ']')?.is_some() {
                        run += 1;
                    }
                    if run >= 2 && self.peek_char()? == Some('>') {
                        fatal_error!(
                            self,
                            UnexpectedToken,
                            "the sequence ']]>' is illegal in content text"
                        );
                        return Err(XMLError::UnexpectedToken);
                    }
                    for _ in 0..run {
                        buffer.push(']');
                    }
                    non_whitespace += run;
                }
                Some(_) => {
                    let c = self.next_char()?.unwrap();
                    buffer.push(c);
                    if !self.version.is_whitespace(c) {
                        non_whitespace += 1;
                    }
                }
            }
        }

        if buffer.is_empty() {
            // Only reachable when the run opened directly on EOF.
            return Ok(ContentToken::Eof);
        }
        if non_whitespace == 0 {
            Ok(ContentToken::Space(buffer))
        } else {
            Ok(ContentToken::Content(buffer))
        }
    }

    /// Scan a name starting at the current position.
    pub(crate) fn scan_name(&mut self) -> Result<String, XMLError> {
        let version = self.version;
        let mut name = String::new();
        let Some(c) = self.next_char_if(|c| version.is_name_start_char(c))? else {
            fatal_error!(self, UnexpectedToken, "a name was expected here");
            return Err(XMLError::UnexpectedToken);
        };
        name.push(c);
        while let Some(c) = self.next_char_if(|c| version.is_name_char(c))? {
            name.push(c);
        }
        Ok(name)
    }

    /// After `<?` has been consumed, scan either the `<?xml` opener or a
    /// whole processing instruction.
    fn scan_pi_or_xml_decl(&mut self) -> Result<MarkupToken, XMLError> {
        let target = self.scan_name()?;
        if target == "xml" {
            return Ok(MarkupToken::XmlDecl);
        }
        if target.eq_ignore_ascii_case("xml") {
            fatal_error!(
                self,
                UnexpectedToken,
                "'<?{}' is neither an XML declaration nor a legal processing instruction target",
                target
            );
            return Err(XMLError::UnexpectedToken);
        }

        match self.next_char()? {
            Some('?') => {
                if self.next_char()? != Some('>') {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "a processing instruction does not end with '?>'"
                    );
                    return Err(XMLError::UnexpectedToken);
                }
                return Ok(MarkupToken::Pi { target, data: None });
            }
            Some(c) if self.version.is_whitespace(c) => {}
            _ => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "whitespace is required after a processing instruction target"
                );
                return Err(XMLError::UnexpectedToken);
            }
        }
        let version = self.version;
        while self.next_char_if(|c| version.is_whitespace(c))?.is_some() {}

        let mut data = String::new();
        loop {
            match self.next_char()? {
                Some('?') => {
                    if self.peek_char()? == Some('>') {
                        self.next_char()?;
                        break;
                    }
                    data.push('?');
                }
                Some(c) => data.push(c),
                None => {
                    fatal_error!(
                        self,
                        UnexpectedEof,
                        "unexpected end of input in a processing instruction"
                    );
                    return Err(XMLError::UnexpectedEof);
                }
            }
        }
        Ok(MarkupToken::Pi {
            target,
            data: Some(data),
        })
    }

    /// Scan comment text after `<!--`.
    fn scan_comment(&mut self) -> Result<String, XMLError> {
        let mut text = String::new();
        loop {
            match self.next_char()? {
                Some('-') => {
                    if self.peek_char()? == Some('-') {
                        self.next_char()?;
                        if self.next_char()? != Some('>') {
                            fatal_error!(
                                self,
                                UnexpectedToken,
                                "'--' is not allowed within a comment"
                            );
                            return Err(XMLError::UnexpectedToken);
                        }
                        return Ok(text);
                    }
                    text.push('-');
                }
                Some(c) => text.push(c),
                None => {
                    fatal_error!(self, UnexpectedEof, "unexpected end of input in a comment");
                    return Err(XMLError::UnexpectedEof);
                }
            }
        }
    }

    /// Scan CDATA text after `<![CDATA[`.
    fn scan_cdsect(&mut self) -> Result<String, XMLError> {
        let mut text = String::new();
        loop {
            match self.next_char()? {
                Some(']') => {
                    let mut run = 1usize;
                    while self.next_char_if(|c| c == ']')?.is_some() {
                        run += 1;
                    }
                    if run >= 2 && self.peek_char()? == Some('>') {
                        self.next_char()?;
                        for _ in 0..run - 2 {
                            text.push(']');
                        }
                        return Ok(text);
                    }
                    for _ in 0..run {
                        text.push(']');
                    }
                }
                Some(c) => text.push(c),
                None => {
                    fatal_error!(self, UnexpectedEof, "runaway cdata section");
                    return Err(XMLError::UnexpectedEof);
                }
            }
        }
    }

    /// ```text
    /// [66] CharRef ::= '&#' [0-9]+ ';' | '&#x' [0-9a-fA-F]+ ';' [WFC: Legal Character]
    /// ```
    ///
    /// Called with `&#` already consumed.
    pub(crate) fn parse_char_ref(&mut self) -> Result<char, XMLError> {
        let hex = self.next_char_if(|c| c == 'x')?.is_some();

        let mut code = 0u32;
        let mut digits = 0usize;
        let mut overflowed = false;
        while let Some(c) = self.next_char_if(|c| {
            if hex {
                c.is_ascii_hexdigit()
            } else {
                c.is_ascii_digit()
            }
        })? {
            let (new, f) = code.overflowing_mul(if hex { 16 } else { 10 });
            let (new, g) = new.overflowing_add(c.to_digit(if hex { 16 } else { 10 }).unwrap());
            code = new;
            digits += 1;
            overflowed |= f | g;
        }

        if digits == 0 {
            fatal_error!(
                self,
                UnexpectedToken,
                "'&#{};' is not a correct character reference",
                if hex { "x" } else { "" }
            );
            return Err(XMLError::UnexpectedToken);
        }
        if self.next_char()? != Some(';') {
            fatal_error!(
                self,
                UnexpectedToken,
                "the character reference does not end with ';'"
            );
            return Err(XMLError::UnexpectedToken);
        }
        if overflowed {
            fatal_error!(
                self,
                DisallowedChar,
                "the code point specified by the character reference is too large"
            );
            return Err(XMLError::DisallowedChar);
        }
        if let Some(c) = char::from_u32(code).filter(|&c| self.version.is_char(c)) {
            Ok(c)
        } else {
            fatal_error!(
                self,
                DisallowedChar,
                "the code point 0x{:X} is not an XML character",
                code
            );
            Err(XMLError::DisallowedChar)
        }
    }
}
