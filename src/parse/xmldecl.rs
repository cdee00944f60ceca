use crate::{
    ENCODING_NAME_LIMIT_LENGTH, XML_VERSION_NUM_LIMIT_LENGTH,
    encoding::find_decoder,
    error::XMLError,
    parse::scanner::MarkupToken,
    sax::{error::fatal_error, handler::SAXHandler, parser::XMLReader},
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [23] XMLDecl      ::= '<?xml' VersionInfo EncodingDecl? SDDecl? S? '?>'
    /// [24] VersionInfo  ::= S 'version' Eq ("'" VersionNum "'" | '"' VersionNum '"')
    /// [26] VersionNum   ::= '1.' [0-9]+
    /// [32] SDDecl       ::= S 'standalone' Eq (("'" ('yes' | 'no') "'") | ('"' ('yes' | 'no') '"'))
    /// ```
    pub(crate) fn parse_xml_decl(&mut self) -> Result<(), XMLError> {
        // skip '<?xml'
        self.advance_ascii(5)?;

        if !matches!(self.next_markup_token()?, MarkupToken::Space) {
            fatal_error!(
                self,
                UnexpectedToken,
                "whitespace is required after '<?xml'"
            );
            return Err(XMLError::UnexpectedToken);
        }
        match self.next_markup_token()? {
            MarkupToken::Name(name) if name == "version" => {}
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "expected a version attribute in the XML declaration, but found {}",
                    token
                );
                return Err(XMLError::UnexpectedToken);
            }
        }
        let version = self.parse_version_value()?;

        let mut s = self.skip_space_tokens()?;
        let mut encoding = None;
        if matches!(self.peek_markup_token()?, MarkupToken::Name(name) if name == "encoding") {
            if !s {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "whitespace is required before the encoding declaration"
                );
                return Err(XMLError::UnexpectedToken);
            }
            self.next_markup_token()?;
            let declared = self.parse_encoding_value()?;
            self.apply_encoding_decl(&declared)?;
            encoding = Some(declared);
            s = self.skip_space_tokens()?;
        }

        if matches!(self.peek_markup_token()?, MarkupToken::Name(name) if name == "standalone") {
            if !s {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "whitespace is required before the standalone declaration"
                );
                return Err(XMLError::UnexpectedToken);
            }
            self.next_markup_token()?;
            self.parse_eq()?;
            match self.next_markup_token()? {
                MarkupToken::Literal { value, .. } if value == "yes" => {
                    self.standalone = Some(true);
                }
                MarkupToken::Literal { value, .. } if value == "no" => {
                    self.standalone = Some(false);
                }
                token => {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "standalone must be 'yes' or 'no', but found {}",
                        token
                    );
                    return Err(XMLError::UnexpectedToken);
                }
            }
            self.skip_space_tokens()?;
        }

        self.expect_decl_end()?;

        if self.encoding.is_none() {
            self.encoding = Some(
                encoding
                    .clone()
                    .unwrap_or_else(|| self.source.encoding_name().to_owned()),
            );
        }
        if !self.fatal_error_occurred {
            self.handler
                .declaration(&version, encoding.as_deref(), self.standalone);
        }
        Ok(())
    }

    /// ```text
    /// [77] TextDecl ::= '<?xml' VersionInfo? EncodingDecl S? '?>'
    /// ```
    pub(crate) fn parse_text_decl(&mut self) -> Result<(), XMLError> {
        // skip '<?xml'
        self.advance_ascii(5)?;

        if !matches!(self.next_markup_token()?, MarkupToken::Space) {
            fatal_error!(
                self,
                UnexpectedToken,
                "whitespace is required after '<?xml'"
            );
            return Err(XMLError::UnexpectedToken);
        }

        let mut has_encoding = false;
        if matches!(self.peek_markup_token()?, MarkupToken::Name(name) if name == "version") {
            self.next_markup_token()?;
            self.parse_version_value()?;
            let s = self.skip_space_tokens()?;
            if matches!(self.peek_markup_token()?, MarkupToken::Name(_)) && !s {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "whitespace is required between declarations"
                );
                return Err(XMLError::UnexpectedToken);
            }
        }

        if matches!(self.peek_markup_token()?, MarkupToken::Name(name) if name == "encoding") {
            self.next_markup_token()?;
            let declared = self.parse_encoding_value()?;
            self.apply_encoding_decl(&declared)?;
            has_encoding = true;
            self.skip_space_tokens()?;
        }

        if !has_encoding {
            fatal_error!(
                self,
                UnexpectedToken,
                "an encoding declaration is required in a text declaration"
            );
            return Err(XMLError::UnexpectedToken);
        }

        self.expect_decl_end()?;
        self.source.set_compact_mode();
        Ok(())
    }

    /// `Eq ::= S? '=' S?`
    pub(crate) fn parse_eq(&mut self) -> Result<(), XMLError> {
        self.skip_space_tokens()?;
        match self.next_markup_token()? {
            MarkupToken::Punct('=') => {}
            token => {
                fatal_error!(self, UnexpectedToken, "expected '=', but found {}", token);
                return Err(XMLError::UnexpectedToken);
            }
        }
        self.skip_space_tokens()?;
        Ok(())
    }

    /// Consume an optional run of [`MarkupToken::Space`] tokens.
    pub(crate) fn skip_space_tokens(&mut self) -> Result<bool, XMLError> {
        let mut skipped = false;
        while matches!(self.peek_markup_token()?, MarkupToken::Space) {
            self.next_markup_token()?;
            skipped = true;
        }
        Ok(skipped)
    }

    fn expect_decl_end(&mut self) -> Result<(), XMLError> {
        if !matches!(self.next_markup_token()?, MarkupToken::Punct('?'))
            || !matches!(self.next_markup_token()?, MarkupToken::Punct('>'))
        {
            fatal_error!(self, UnexpectedToken, "the declaration does not end with '?>'");
            return Err(XMLError::UnexpectedToken);
        }
        Ok(())
    }

    fn parse_version_value(&mut self) -> Result<String, XMLError> {
        self.parse_eq()?;
        match self.next_markup_token()? {
            MarkupToken::Literal { value, .. } => {
                if value.len() > XML_VERSION_NUM_LIMIT_LENGTH {
                    fatal_error!(self, UnsupportedVersion, "the version number is too long");
                    return Err(XMLError::UnsupportedVersion);
                }
                let digits = value.strip_prefix("1.");
                if !digits.is_some_and(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
                {
                    fatal_error!(
                        self,
                        UnsupportedVersion,
                        "this library only supports XML version 1.x, but '{}' is specified",
                        value
                    );
                    return Err(XMLError::UnsupportedVersion);
                }
                self.version = value.parse().unwrap();
                Ok(value)
            }
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "a quoted version number was expected, but found {}",
                    token
                );
                Err(XMLError::UnexpectedToken)
            }
        }
    }

    /// ```text
    /// [80] EncodingDecl ::= S 'encoding' Eq ('"' EncName '"' | "'" EncName "'")
    /// [81] EncName      ::= [A-Za-z] ([A-Za-z0-9._] | '-')*
    /// ```
    fn parse_encoding_value(&mut self) -> Result<String, XMLError> {
        self.parse_eq()?;
        match self.next_markup_token()? {
            MarkupToken::Literal { value, .. } => {
                if value.len() > ENCODING_NAME_LIMIT_LENGTH {
                    fatal_error!(self, UnsupportedEncoding, "the encoding name is too long");
                    return Err(XMLError::UnsupportedEncoding);
                }
                let mut bytes = value.bytes();
                let valid = bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
                    && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
                if !valid {
                    fatal_error!(
                        self,
                        UnsupportedEncoding,
                        "'{}' is not a valid encoding name",
                        value
                    );
                    return Err(XMLError::UnsupportedEncoding);
                }
                Ok(value)
            }
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "a quoted encoding name was expected, but found {}",
                    token
                );
                Err(XMLError::UnexpectedToken)
            }
        }
    }

    /// Reconcile the declared encoding with the one detected from the byte
    /// stream, switching the decoder if the detection was provisional.
    fn apply_encoding_decl(&mut self, declared: &str) -> Result<(), XMLError> {
        if self.source.has_fixed_encoding() {
            // An encoding supplied out of band overrides the declaration.
            return Ok(());
        }

        let Some(decoder) = find_decoder(declared) else {
            fatal_error!(
                self,
                UnsupportedEncoding,
                "the encoding '{}' is not supported",
                declared
            );
            return Err(XMLError::UnsupportedEncoding);
        };
        let declared_name = decoder.name();
        let current = self.source.encoding_name();

        let current_utf16 = current.starts_with("UTF-16");
        let declared_utf16 = declared_name.starts_with("UTF-16");
        if current_utf16 {
            // The endianness detected from the BOM or the signature wins.
            if !declared_utf16 {
                fatal_error!(
                    self,
                    EncodingMismatch,
                    "the document is encoded in {}, but declares '{}'",
                    current,
                    declared
                );
                return Err(XMLError::EncodingMismatch);
            }
            self.source.set_compact_mode();
        } else if declared_utf16 {
            fatal_error!(
                self,
                EncodingMismatch,
                "the document begins with 8-bit characters, but declares '{}'",
                declared
            );
            return Err(XMLError::EncodingMismatch);
        } else if self.source.has_bom() && declared_name != current {
            fatal_error!(
                self,
                EncodingMismatch,
                "the byte order mark indicates {}, but the document declares '{}'",
                current,
                declared
            );
            return Err(XMLError::EncodingMismatch);
        } else if declared_name != current {
            if self.source.is_provisional() {
                self.source.switch_encoding(declared_name)?;
            } else {
                fatal_error!(
                    self,
                    EncodingMismatch,
                    "the document is encoded in {}, but declares '{}'",
                    current,
                    declared
                );
                return Err(XMLError::EncodingMismatch);
            }
        } else {
            self.source.set_compact_mode();
        }

        self.encoding = Some(declared.to_owned());
        Ok(())
    }
}
