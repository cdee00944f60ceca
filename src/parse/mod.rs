mod content;
mod dtd;
mod element;
mod literals;
pub(crate) mod scanner;
mod xmldecl;

use std::mem::take;

use log::debug;

use crate::{
    error::XMLError,
    parse::scanner::MarkupToken,
    sax::{
        EntityDecl,
        error::{fatal_error, validity_error},
        handler::SAXHandler,
        parser::{ParserOption, ParserState, XMLReader},
        source::InputSource,
    },
};

/// `true` if `bytes` opens an XML or text declaration (`<?xml` followed by
/// whitespace).
pub(crate) fn starts_with_xml_decl(bytes: &[u8]) -> bool {
    bytes.len() >= 6
        && bytes.starts_with(b"<?xml")
        && matches!(bytes[5], b' ' | b'\t' | b'\r' | b'\n')
}

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [1] document ::= prolog element Misc*
    /// ```
    pub(crate) fn parse_document(&mut self) -> Result<(), XMLError> {
        self.handler.set_document_locator(self.locator.clone());
        self.handler.start_document();
        self.state = ParserState::Parsing;
        self.parse_prolog()?;
        // At this point the encoding can no longer change, so buffered
        // bytes need not be retained.
        self.source.set_compact_mode();

        match self.next_markup_token()? {
            MarkupToken::STag => self.parse_element()?,
            MarkupToken::Eof => {
                fatal_error!(self, UnexpectedEof, "the document has no document element");
                return Err(XMLError::UnexpectedEof);
            }
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "expected the document element, but found {}",
                    token
                );
                return Err(XMLError::UnexpectedToken);
            }
        }

        self.parse_misc()?;
        self.grow()?;
        if !self.source.is_empty() || !matches!(self.peek_markup_token()?, MarkupToken::Eof) {
            fatal_error!(
                self,
                UnexpectedToken,
                "unnecessary document content remains after the document element"
            );
            return Err(XMLError::UnexpectedToken);
        }

        if !self.fatal_error_occurred
            && self.config.is_enable(ParserOption::Validation)
            && !self.unresolved_ids.is_empty()
        {
            // [VC: IDREF]
            let unresolved = take(&mut self.unresolved_ids);
            for idref in &unresolved {
                validity_error!(
                    self,
                    UnresolvedIdRef,
                    "IDREF '{}' has no referenced ID.",
                    idref
                );
            }
        }

        self.state = ParserState::Finished;
        self.handler.end_document();
        Ok(())
    }

    /// ```text
    /// [22] prolog ::= XMLDecl? Misc* (doctypedecl Misc*)?
    /// ```
    pub(crate) fn parse_prolog(&mut self) -> Result<(), XMLError> {
        self.state = ParserState::InXMLDeclaration;
        self.grow()?;
        if starts_with_xml_decl(self.source.content_bytes()) {
            self.parse_xml_decl()?;
        }
        self.state = ParserState::Parsing;
        self.parse_misc()?;
        if matches!(self.peek_markup_token()?, MarkupToken::DocType) {
            self.next_markup_token()?;
            self.parse_doctypedecl()?;
            self.state = ParserState::Parsing;
            self.parse_misc()?;
        }
        Ok(())
    }

    /// ```text
    /// [27] Misc ::= Comment | PI | S
    /// ```
    pub(crate) fn parse_misc(&mut self) -> Result<(), XMLError> {
        loop {
            match self.peek_markup_token()? {
                MarkupToken::Space => {
                    self.next_markup_token()?;
                }
                MarkupToken::Comment(_) => {
                    let MarkupToken::Comment(text) = self.next_markup_token()? else {
                        unreachable!()
                    };
                    if !self.fatal_error_occurred {
                        self.handler.comment(&text);
                    }
                }
                MarkupToken::Pi { .. } => {
                    let MarkupToken::Pi { target, data } = self.next_markup_token()? else {
                        unreachable!()
                    };
                    if !self.fatal_error_occurred {
                        self.handler.processing_instruction(&target, data.as_deref());
                    }
                }
                _ => break Ok(()),
            }
        }
    }

    /// The next markup token with parameter-entity references resolved.
    ///
    /// Within a markup declaration, parameter entities may only be
    /// referenced in the external subset (or inside another parameter
    /// entity replacement); in the internal subset this fails `PEContext`.
    pub(crate) fn next_decl_token(&mut self) -> Result<MarkupToken, XMLError> {
        loop {
            match self.next_markup_token()? {
                MarkupToken::PeReference(name) => {
                    if self.state == ParserState::InInternalSubset
                        && !self.in_external_markup()
                    {
                        fatal_error!(
                            self,
                            PEContext,
                            "a parameter entity reference may not occur within a markup declaration in the internal subset"
                        );
                        return Err(XMLError::PEContext);
                    }
                    self.push_parameter_entity(&name, true)?;
                }
                token => return Ok(token),
            }
        }
    }

    pub(crate) fn peek_decl_token(&mut self) -> Result<&MarkupToken, XMLError> {
        if self.peeked_markup.is_none() {
            let token = self.next_decl_token()?;
            self.peeked_markup = Some(token);
        }
        Ok(self.peeked_markup.as_ref().unwrap())
    }

    /// Skip whitespace in a markup declaration, returning the number of
    /// characters skipped. Parameter-entity references starting at a
    /// whitespace position are expanded (external subset only); their
    /// padding spaces count as whitespace.
    pub(crate) fn skip_decl_whitespaces(&mut self) -> Result<usize, XMLError> {
        let mut s = 0;
        if matches!(self.peeked_markup, Some(MarkupToken::Space)) {
            self.peeked_markup = None;
            s += 1;
        }
        loop {
            s += self.skip_whitespace_chars()?;
            if self.peek_char()? != Some('%') {
                break;
            }
            self.next_char()?;
            if !self
                .peek_char()?
                .is_some_and(|c| self.version.is_name_start_char(c))
            {
                self.retract('%');
                break;
            }
            let name = self.scan_name()?;
            if self.next_char()? != Some(';') {
                fatal_error!(
                    self,
                    UndefinedParameterEntity,
                    "a parameter entity reference does not end with ';'"
                );
                return Err(XMLError::UndefinedParameterEntity);
            }
            if self.state == ParserState::InInternalSubset && !self.in_external_markup() {
                fatal_error!(
                    self,
                    PEContext,
                    "a parameter entity reference may not occur within a markup declaration in the internal subset"
                );
                return Err(XMLError::PEContext);
            }
            self.push_parameter_entity(&name, true)?;
        }
        Ok(s)
    }

    pub(crate) fn expect_decl_punct(&mut self, expected: char) -> Result<(), XMLError> {
        match self.next_decl_token()? {
            MarkupToken::Punct(c) if c == expected => Ok(()),
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "expected '{}', but found {}",
                    expected,
                    token
                );
                Err(XMLError::UnexpectedToken)
            }
        }
    }

    /// Skip whitespace at the character level, returning the number of
    /// characters skipped.
    pub(crate) fn skip_whitespace_chars(&mut self) -> Result<usize, XMLError> {
        debug_assert!(self.peeked_markup.is_none());
        let version = self.version;
        let mut n = 0;
        while self.next_char_if(|c| version.is_whitespace(c))?.is_some() {
            n += 1;
        }
        Ok(n)
    }

    /// Snapshot/compare the data-source nesting id around a construct that
    /// must begin and end within the same entity.
    pub(crate) fn check_proper_nesting(
        &mut self,
        snapshot: usize,
        construct: &str,
    ) -> Result<(), XMLError> {
        if self.current_source_id() != snapshot {
            fatal_error!(
                self,
                ImproperNesting,
                "{} must start and end within the same entity",
                construct
            );
            return Err(XMLError::ImproperNesting);
        }
        Ok(())
    }

    /// Expand the parameter entity `name` by pushing its replacement text
    /// as a new auto-discarding source.
    ///
    /// Outside entity values the replacement is padded with one leading and
    /// one trailing space (`wrap`). Returns `true` if a source was pushed.
    ///
    /// ```text
    /// [69] PEReference ::= '%' Name ';'   [VC:  Entity Declared]
    ///                                     [WFC: No Recursion]
    ///                                     [WFC: In DTD]
    /// ```
    pub(crate) fn push_parameter_entity(
        &mut self,
        name: &str,
        wrap: bool,
    ) -> Result<bool, XMLError> {
        self.has_parameter_entity = true;
        let pe_name = format!("%{name}");

        if self.entity_recursion_check(&pe_name) {
            // [WFC: No Recursion]
            fatal_error!(
                self,
                EntityRecursion,
                "the parameter entity '{}' appears recursively",
                name
            );
            return Err(XMLError::EntityRecursion);
        }

        let Some(decl) = self.entities.get(&pe_name).cloned() else {
            // [VC: Entity Declared]
            validity_error!(
                self,
                UndefinedParameterEntity,
                "the parameter entity '%{};' is not declared",
                name
            );
            if !self.fatal_error_occurred {
                self.handler.skipped_entity(&pe_name);
            }
            return Ok(false);
        };

        match decl {
            EntityDecl::InternalParameterEntity {
                base_dir,
                replacement_text,
            } => {
                let text = if wrap {
                    format!(" {replacement_text} ")
                } else {
                    replacement_text.into()
                };
                let mut source = InputSource::from_content(text);
                source.set_base_dir(base_dir);
                source.set_auto_discard();
                source.set_system_id(format!("?internal-parameter-entity.{name}"));
                self.push_source(Box::new(source), Some(pe_name.into()))?;
                Ok(true)
            }
            EntityDecl::ExternalParameterEntity {
                base_dir,
                system_id,
                public_id,
            } => {
                if !self.config.is_enable(ParserOption::Validation)
                    && !self
                        .config
                        .is_enable(ParserOption::ExternalParameterEntities)
                {
                    if !self.fatal_error_occurred {
                        self.handler.skipped_entity(&pe_name);
                    }
                    return Ok(false);
                }
                debug!("resolving external parameter entity '%{name};' at {system_id}");
                match self.handler.resolve_entity(
                    &pe_name,
                    public_id.as_deref(),
                    &base_dir,
                    &system_id,
                ) {
                    Ok(source) => {
                        let mut text = self.read_external_entity_text(Box::new(source))?;
                        if wrap {
                            text.insert(0, ' ');
                            text.push(' ');
                        }
                        let mut source = InputSource::from_content(text);
                        let entity_dir = base_dir
                            .join(system_id.as_ref())
                            .parent()
                            .map(|p| p.to_path_buf())
                            .unwrap_or(base_dir);
                        source.set_base_dir(entity_dir);
                        source.set_auto_discard();
                        source.set_system_id(system_id);
                        if let Some(public_id) = public_id {
                            source.set_public_id(public_id);
                        }
                        self.push_source(Box::new(source), Some(pe_name.into()))?;
                        Ok(true)
                    }
                    Err(err) => {
                        validity_error!(
                            self,
                            UndefinedParameterEntity,
                            "the external parameter entity '%{};' cannot be resolved: {}",
                            name,
                            err
                        );
                        if !self.fatal_error_occurred {
                            self.handler.skipped_entity(&pe_name);
                        }
                        Ok(false)
                    }
                }
            }
            _ => {
                fatal_error!(
                    self,
                    UndefinedParameterEntity,
                    "'%{};' does not refer to a parameter entity",
                    name
                );
                Err(XMLError::UndefinedParameterEntity)
            }
        }
    }

    /// Read an external parsed entity to completion, handling its optional
    /// text declaration, and return the replacement text.
    ///
    /// ```text
    /// [77] TextDecl ::= '<?xml' VersionInfo? EncodingDecl S? '?>'
    /// ```
    pub(crate) fn read_external_entity_text(
        &mut self,
        source: Box<InputSource<'static>>,
    ) -> Result<String, XMLError> {
        let old_state = self.state;
        self.push_source(source, None)?;
        self.state = ParserState::InTextDeclaration;
        let result = (|| {
            self.grow()?;
            if starts_with_xml_decl(self.source.content_bytes()) {
                self.parse_text_decl()?;
            }
            let mut text = String::new();
            while let Some(c) = self.source.next_char()? {
                if !self.version.is_char(c) {
                    fatal_error!(
                        self,
                        DisallowedChar,
                        "character U+{:04X} is not allowed",
                        c as u32
                    );
                    return Err(XMLError::DisallowedChar);
                }
                text.push(c);
            }
            Ok(text)
        })();
        self.pop_source()?;
        self.state = old_state;
        result
    }

    /// ```text
    /// [75] ExternalID ::= 'SYSTEM' S SystemLiteral
    ///                     | 'PUBLIC' S PubidLiteral S SystemLiteral
    /// ```
    ///
    /// With `system_optional` (notation declarations), `PUBLIC` may be
    /// followed by the public identifier alone.
    pub(crate) fn parse_external_id(
        &mut self,
        system_id: &mut Option<String>,
        public_id: &mut Option<String>,
        system_optional: bool,
    ) -> Result<(), XMLError> {
        match self.next_decl_token()? {
            MarkupToken::Name(keyword) if keyword == "SYSTEM" => {
                if self.skip_decl_whitespaces()? == 0 {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "whitespace is required after 'SYSTEM' in ExternalID"
                    );
                    return Err(XMLError::UnexpectedToken);
                }
                *public_id = None;
                *system_id = Some(self.parse_system_literal()?);
            }
            MarkupToken::Name(keyword) if keyword == "PUBLIC" => {
                if self.skip_decl_whitespaces()? == 0 {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "whitespace is required after 'PUBLIC' in ExternalID"
                    );
                    return Err(XMLError::UnexpectedToken);
                }
                *public_id = Some(self.parse_pubid_literal()?);
                let s = self.skip_decl_whitespaces()?;
                if matches!(self.peek_decl_token()?, MarkupToken::Literal { .. }) {
                    if s == 0 {
                        fatal_error!(
                            self,
                            UnexpectedToken,
                            "whitespace is required after PubidLiteral in ExternalID"
                        );
                        return Err(XMLError::UnexpectedToken);
                    }
                    *system_id = Some(self.parse_system_literal()?);
                } else if !system_optional {
                    fatal_error!(
                        self,
                        BadSystemLiteral,
                        "a system literal is required after the public identifier"
                    );
                    return Err(XMLError::BadSystemLiteral);
                }
            }
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "ExternalID must start with 'SYSTEM' or 'PUBLIC', but found {}",
                    token
                );
                return Err(XMLError::UnexpectedToken);
            }
        }
        Ok(())
    }

    /// Common handling for a general entity reference whose declaration is
    /// missing.
    ///
    /// Well-formedness requires a declaration unless an unread external
    /// subset or parameter entity may have supplied one in a non-standalone
    /// document; validation always requires it.
    pub(crate) fn report_undefined_entity(&mut self, name: &str) -> Result<(), XMLError> {
        if self.standalone == Some(true)
            || (!self.has_internal_subset && !self.has_external_subset)
            || (!self.has_external_subset && !self.has_parameter_entity)
        {
            // [WFC: Entity Declared]
            fatal_error!(self, UndefinedEntity, "the entity '{}' is not declared", name);
            return Err(XMLError::UndefinedEntity);
        }
        // [VC: Entity Declared]
        validity_error!(
            self,
            UndefinedEntity,
            "the entity '{}' is not declared",
            name
        );
        if !self.fatal_error_occurred {
            self.handler.skipped_entity(name);
        }
        Ok(())
    }

    /// Register the general entity `name` as an in-scope ID, resolving
    /// pending IDREFs.
    pub(crate) fn record_id(&mut self, value: &str) {
        self.unresolved_ids.remove(value);
        self.specified_ids.insert(value.into());
    }

    pub(crate) fn record_idref(&mut self, value: &str) {
        if !self.specified_ids.contains(value) {
            self.unresolved_ids.insert(value.into());
        }
    }
}
