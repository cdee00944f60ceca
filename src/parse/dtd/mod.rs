mod attlist_decl;
mod element_decl;
mod entity_decl;
mod ext_subset;
mod notation_decl;

use log::debug;

use crate::{
    error::XMLError,
    parse::scanner::MarkupToken,
    sax::{
        EntityDecl,
        error::{fatal_error, validity_error},
        handler::SAXHandler,
        parser::{ParserOption, ParserState, XMLReader},
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [28] doctypedecl ::= '<!DOCTYPE' S Name (S ExternalID)? S?
    ///                      ('[' intSubset ']' S?)? '>'
    /// [28a] DeclSep    ::= PEReference | S
    /// [28b] intSubset  ::= (markupdecl | DeclSep)*
    /// ```
    ///
    /// The `<!DOCTYPE` token has already been consumed.
    pub(crate) fn parse_doctypedecl(&mut self) -> Result<(), XMLError> {
        let doctype_source = self.current_source_id();

        if !matches!(self.next_markup_token()?, MarkupToken::Space) {
            fatal_error!(self, UnexpectedToken, "whitespace is required after '<!DOCTYPE'");
            return Err(XMLError::UnexpectedToken);
        }
        let name = match self.next_markup_token()? {
            MarkupToken::Name(name) => name,
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "a document type name was expected, but found {}",
                    token
                );
                return Err(XMLError::UnexpectedToken);
            }
        };
        self.dtd_name = Some(name.clone().into_boxed_str());

        let mut system_id = None;
        let mut public_id = None;
        let s = self.skip_space_tokens()?;
        if matches!(self.peek_markup_token()?, MarkupToken::Name(keyword)
            if keyword == "SYSTEM" || keyword == "PUBLIC")
        {
            if !s {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "whitespace is required before the external identifier"
                );
                return Err(XMLError::UnexpectedToken);
            }
            self.parse_external_id(&mut system_id, &mut public_id, false)?;
            self.skip_space_tokens()?;
        }

        if !self.fatal_error_occurred {
            self.handler
                .start_dtd(&name, public_id.as_deref(), system_id.as_deref());
        }

        if matches!(self.peek_markup_token()?, MarkupToken::Punct('[')) {
            self.next_markup_token()?;
            self.has_internal_subset = true;
            self.state = ParserState::InInternalSubset;
            self.parse_internal_subset(doctype_source)?;
            self.state = ParserState::Parsing;
            self.skip_space_tokens()?;
        }

        match self.next_markup_token()? {
            MarkupToken::Punct('>') => {}
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "the DOCTYPE declaration does not end with '>', found {}",
                    token
                );
                return Err(XMLError::UnexpectedToken);
            }
        }

        if let Some(system_id) = system_id.as_deref() {
            if self.config.is_enable(ParserOption::Validation)
                || self
                    .config
                    .is_enable(ParserOption::ExternalParameterEntities)
            {
                self.load_external_subset(system_id, public_id.as_deref())?;
            }
        }

        self.check_deferred_notation_references()?;

        if !self.fatal_error_occurred {
            self.handler.end_dtd();
        }
        Ok(())
    }

    /// Parse the declarations between `[` and `]`.
    fn parse_internal_subset(&mut self, doctype_source: usize) -> Result<(), XMLError> {
        loop {
            match self.next_markup_token()? {
                MarkupToken::Space => {}
                MarkupToken::Element => self.parse_element_decl()?,
                MarkupToken::AttList => self.parse_attlist_decl()?,
                MarkupToken::Entity => self.parse_entity_decl()?,
                MarkupToken::Notation => self.parse_notation_decl()?,
                MarkupToken::Comment(text) => {
                    if !self.fatal_error_occurred {
                        self.handler.comment(&text);
                    }
                }
                MarkupToken::Pi { target, data } => {
                    if !self.fatal_error_occurred {
                        self.handler.processing_instruction(&target, data.as_deref());
                    }
                }
                MarkupToken::PeReference(name) => {
                    // DeclSep position: expansion is allowed even in the
                    // internal subset.
                    self.push_parameter_entity(&name, true)?;
                }
                MarkupToken::Punct(']') => {
                    self.check_proper_nesting(doctype_source, "the internal subset")?;
                    return Ok(());
                }
                MarkupToken::Eof => {
                    fatal_error!(
                        self,
                        UnexpectedEof,
                        "unexpected end of input in the internal subset"
                    );
                    return Err(XMLError::UnexpectedEof);
                }
                token => {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "{} is not allowed in the internal subset",
                        token
                    );
                    return Err(XMLError::UnexpectedToken);
                }
            }
        }
    }

    /// Resolve and parse the external DTD subset.
    fn load_external_subset(
        &mut self,
        system_id: &str,
        public_id: Option<&str>,
    ) -> Result<(), XMLError> {
        debug!("loading the external subset at {system_id}");
        let base_dir = self.base_dir.clone();
        match self
            .handler
            .get_external_subset("[dtd]", public_id, &base_dir, system_id)
        {
            Ok(mut source) => {
                self.has_external_subset = true;
                let entity_dir = base_dir
                    .join(system_id)
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or(base_dir);
                source.set_base_dir(entity_dir);
                if source.system_id().is_none() {
                    source.set_system_id(system_id);
                }
                self.push_source(Box::new(source), None)?;

                let old_state = self.state;
                self.state = ParserState::InTextDeclaration;
                self.grow()?;
                if crate::parse::starts_with_xml_decl(self.source.content_bytes()) {
                    self.parse_text_decl()?;
                }
                self.state = ParserState::InExternalSubset;
                self.source.set_compact_mode();
                let result = self.parse_ext_subset();
                self.state = old_state;
                result?;

                self.grow()?;
                if !self.source.is_empty() {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "unnecessary content remains in the external subset"
                    );
                    return Err(XMLError::UnexpectedToken);
                }
                self.pop_source()?;
                Ok(())
            }
            Err(err) => {
                log::warn!("the external subset at {system_id} cannot be resolved: {err}");
                validity_error!(
                    self,
                    UndefinedParameterEntity,
                    "the external subset at '{}' cannot be resolved: {}",
                    system_id,
                    err
                );
                if !self.fatal_error_occurred {
                    self.handler.skipped_entity("[dtd]");
                }
                Ok(())
            }
        }
    }

    /// Notations may be referenced before they are declared, so NDATA and
    /// NOTATION-attribute references are checked once the whole DTD has
    /// been read.
    ///
    /// [VC: Notation Declared] / [VC: Notation Attributes]
    fn check_deferred_notation_references(&mut self) -> Result<(), XMLError> {
        if !self.config.is_enable(ParserOption::Validation) {
            return Ok(());
        }

        let mut missing = vec![];
        for (name, decl) in self.entities.iter() {
            if let EntityDecl::ExternalGeneralUnparsedEntity { notation_name, .. } = decl {
                if !self.notations.contains_key(notation_name) {
                    missing.push((name.to_owned(), notation_name.to_string()));
                }
            }
        }
        for (entity, notation) in missing {
            validity_error!(
                self,
                NdataWithoutNotation,
                "the unparsed entity '{}' refers to the undeclared notation '{}'",
                entity,
                notation
            );
        }

        let mut undeclared = vec![];
        for (elem, attr, (atttype, _, _)) in self.attlistdecls.iter_all() {
            if let crate::sax::AttributeType::NOTATION(set) = atttype {
                for notation in set {
                    if !self.notations.contains_key(notation) {
                        undeclared.push((elem.to_owned(), attr.to_owned(), notation.to_string()));
                    }
                }
            }
        }
        for (elem, attr, notation) in undeclared {
            validity_error!(
                self,
                UndeclaredNotation,
                "the attribute '{}' of the element '{}' refers to the undeclared notation '{}'",
                attr,
                elem,
                notation
            );
        }
        Ok(())
    }

    /// Require whitespace inside a markup declaration.
    pub(crate) fn require_decl_whitespace(&mut self, context: &str) -> Result<(), XMLError> {
        if self.skip_decl_whitespaces()? == 0 {
            fatal_error!(self, UnexpectedToken, "whitespace is required {}", context);
            return Err(XMLError::UnexpectedToken);
        }
        Ok(())
    }

    /// Read a name token inside a markup declaration.
    pub(crate) fn expect_decl_name(&mut self, context: &str) -> Result<String, XMLError> {
        match self.next_decl_token()? {
            MarkupToken::Name(name) => Ok(name),
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "a name was expected {}, but found {}",
                    context,
                    token
                );
                Err(XMLError::UnexpectedToken)
            }
        }
    }

    /// Consume the closing `>` of a markup declaration.
    pub(crate) fn expect_decl_close(&mut self, decl: &str) -> Result<(), XMLError> {
        self.skip_decl_whitespaces()?;
        match self.next_decl_token()? {
            MarkupToken::Punct('>') => Ok(()),
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "{} does not end with '>', found {}",
                    decl,
                    token
                );
                Err(XMLError::UnexpectedToken)
            }
        }
    }

    /// The base directory active at the current declaration position, used
    /// to resolve external identifiers recorded in entity declarations.
    pub(crate) fn current_entity_base_dir(&self) -> std::path::PathBuf {
        let dir = self.source.base_dir();
        if dir.as_os_str().is_empty() {
            self.base_dir.clone()
        } else {
            dir.to_path_buf()
        }
    }
}
