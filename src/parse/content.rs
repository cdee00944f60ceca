use log::debug;

use crate::{
    error::XMLError,
    parse::{scanner::ContentToken, starts_with_xml_decl},
    sax::{
        EntityDecl,
        error::{fatal_error, validity_error},
        handler::SAXHandler,
        parser::{ParserOption, ParserState, XMLReader},
        source::InputSource,
    },
};

/// How a content run ended: at an end tag, or at the end of the current
/// input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContentEnd {
    ETag,
    Eof,
}

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [43] content ::= CharData? ((element | Reference | CDSect | PI | Comment) CharData?)*
    /// ```
    pub(crate) fn parse_content(&mut self) -> Result<ContentEnd, XMLError> {
        loop {
            match self.next_content_token()? {
                ContentToken::Eof => break Ok(ContentEnd::Eof),
                ContentToken::ETag => break Ok(ContentEnd::ETag),
                ContentToken::STag => self.parse_element()?,
                ContentToken::Content(text) => {
                    if let Some(Some((_, validator))) = self.validation_stack.last_mut() {
                        validator.push_pcdata();
                    }
                    if !self.fatal_error_occurred {
                        self.handler.characters(&text);
                    }
                }
                ContentToken::Space(text) => {
                    let mut ignorable = false;
                    if let Some(Some((_, validator))) = self.validation_stack.last_mut() {
                        validator.push_whitespaces();
                        ignorable = validator.is_element_content();
                    }
                    if !self.fatal_error_occurred {
                        if ignorable {
                            self.handler.ignorable_whitespace(&text);
                        } else {
                            self.handler.characters(&text);
                        }
                    }
                }
                ContentToken::CDSect(text) => {
                    if let Some(Some((_, validator))) = self.validation_stack.last_mut() {
                        validator.push_pcdata();
                    }
                    if !self.fatal_error_occurred {
                        self.handler.start_cdata();
                        self.handler.characters(&text);
                        self.handler.end_cdata();
                    }
                }
                ContentToken::Comment(text) => {
                    if let Some(Some((_, validator))) = self.validation_stack.last_mut() {
                        validator.push_misc();
                    }
                    if !self.fatal_error_occurred {
                        self.handler.comment(&text);
                    }
                }
                ContentToken::Pi { target, data } => {
                    if let Some(Some((_, validator))) = self.validation_stack.last_mut() {
                        validator.push_misc();
                    }
                    if !self.fatal_error_occurred {
                        self.handler.processing_instruction(&target, data.as_deref());
                    }
                }
                ContentToken::Reference(name) => {
                    self.parse_entity_ref_in_content(&name)?;
                }
            }
        }
    }

    /// Expand a general entity referenced in content by pushing its
    /// replacement as a new source and re-entering [`Self::parse_content`].
    ///
    /// ```text
    /// [68] EntityRef ::= '&' Name ';'     [WFC: Entity Declared]
    ///                                     [VC:  Entity Declared]
    ///                                     [WFC: Parsed Entity]
    ///                                     [WFC: No Recursion]
    /// ```
    pub(crate) fn parse_entity_ref_in_content(&mut self, name: &str) -> Result<(), XMLError> {
        let Some(decl) = self.entities.get(name).cloned() else {
            return self.report_undefined_entity(name);
        };

        if self.entity_recursion_check(name) {
            // [WFC: No Recursion]
            fatal_error!(
                self,
                EntityRecursion,
                "the entity '{}' appears recursively",
                name
            );
            return Err(XMLError::EntityRecursion);
        }

        match decl {
            EntityDecl::InternalGeneralEntity {
                base_dir,
                replacement_text,
                in_external_markup,
            } => {
                if in_external_markup && self.standalone == Some(true) {
                    // [WFC: Entity Declared]
                    fatal_error!(
                        self,
                        StandaloneViolation,
                        "standalone='yes', but the entity '{}' is declared in external markup",
                        name
                    );
                    return Err(XMLError::StandaloneViolation);
                }
                let mut source = InputSource::from_content(replacement_text.as_ref());
                source.set_base_dir(base_dir);
                source.set_system_id(format!("?internal-entity.{name}"));
                self.push_source(Box::new(source), Some(name.into()))?;

                if !self.fatal_error_occurred {
                    self.handler.start_entity(name);
                }

                let end = self.parse_content()?;
                self.grow()?;
                if end == ContentEnd::ETag || !self.source.is_empty() {
                    fatal_error!(
                        self,
                        ImproperNesting,
                        "the entity '{}' is nested incorrectly",
                        name
                    );
                    return Err(XMLError::ImproperNesting);
                }

                self.pop_source()?;
                if !self.fatal_error_occurred {
                    self.handler.end_entity();
                }
                Ok(())
            }
            EntityDecl::ExternalGeneralParsedEntity {
                base_dir,
                system_id,
                public_id,
                in_external_markup,
            } => {
                if in_external_markup && self.standalone == Some(true) {
                    // [WFC: Entity Declared]
                    fatal_error!(
                        self,
                        StandaloneViolation,
                        "standalone='yes', but the entity '{}' is declared in external markup",
                        name
                    );
                    return Err(XMLError::StandaloneViolation);
                }
                if !self.config.is_enable(ParserOption::ExternalGeneralEntities)
                    && !self.config.is_enable(ParserOption::Validation)
                {
                    if !self.fatal_error_occurred {
                        self.handler.skipped_entity(name);
                    }
                    return Ok(());
                }
                debug!("resolving external general entity '&{name};' at {system_id}");
                match self
                    .handler
                    .resolve_entity(name, public_id.as_deref(), &base_dir, &system_id)
                {
                    Ok(mut source) => {
                        let entity_dir = base_dir
                            .join(system_id.as_ref())
                            .parent()
                            .map(|p| p.to_path_buf())
                            .unwrap_or(base_dir);
                        source.set_base_dir(entity_dir);
                        if source.system_id().is_none() {
                            source.set_system_id(system_id);
                        }
                        self.push_source(Box::new(source), Some(name.into()))?;

                        if !self.fatal_error_occurred {
                            self.handler.start_entity(name);
                        }

                        self.parse_ext_parsed_ent()?;
                        self.grow()?;
                        if !self.source.is_empty() {
                            fatal_error!(
                                self,
                                ImproperNesting,
                                "the entity '{}' is nested incorrectly",
                                name
                            );
                            return Err(XMLError::ImproperNesting);
                        }

                        self.pop_source()?;
                        if !self.fatal_error_occurred {
                            self.handler.end_entity();
                        }
                        Ok(())
                    }
                    Err(err) => {
                        log::warn!("the external entity '&{name};' cannot be resolved: {err}");
                        validity_error!(
                            self,
                            UndefinedEntity,
                            "the external entity '{}' cannot be resolved: {}",
                            name,
                            err
                        );
                        if !self.fatal_error_occurred {
                            self.handler.skipped_entity(name);
                        }
                        Ok(())
                    }
                }
            }
            EntityDecl::ExternalGeneralUnparsedEntity { .. } => {
                // [WFC: Parsed Entity]
                fatal_error!(
                    self,
                    UndefinedEntity,
                    "the unparsed entity '{}' cannot be referenced in content",
                    name
                );
                Err(XMLError::UndefinedEntity)
            }
            EntityDecl::InternalParameterEntity { .. }
            | EntityDecl::ExternalParameterEntity { .. } => {
                fatal_error!(
                    self,
                    UndefinedEntity,
                    "'&{};' does not refer to a general entity",
                    name
                );
                Err(XMLError::UndefinedEntity)
            }
        }
    }

    /// Parse an external parsed entity after its source has been pushed.
    ///
    /// ```text
    /// [78] extParsedEnt ::= TextDecl? content
    /// ```
    pub(crate) fn parse_ext_parsed_ent(&mut self) -> Result<(), XMLError> {
        let old_state = self.state;
        self.state = ParserState::InTextDeclaration;
        self.grow()?;
        // The text declaration may override these for the entity only.
        let version = self.version;
        let encoding = self.encoding.clone();
        if starts_with_xml_decl(self.source.content_bytes()) {
            self.parse_text_decl()?;
        }

        self.state = ParserState::Parsing;
        self.source.set_compact_mode();
        let end = self.parse_content()?;
        if end == ContentEnd::ETag {
            fatal_error!(
                self,
                ImproperNesting,
                "an end tag crosses the entity boundary"
            );
            return Err(XMLError::ImproperNesting);
        }
        self.grow()?;
        if !self.source.is_empty() {
            fatal_error!(
                self,
                UnexpectedToken,
                "unnecessary external parsed content remains"
            );
            return Err(XMLError::UnexpectedToken);
        }
        self.encoding = encoding;
        self.version = version;
        self.state = old_state;

        Ok(())
    }
}
