use log::warn;

use crate::{
    error::XMLError,
    sax::{
        EntityDecl,
        error::{fatal_error, warning},
        handler::SAXHandler,
        parser::XMLReader,
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [70] EntityDecl ::= GEDecl | PEDecl
    /// [71] GEDecl     ::= '<!ENTITY' S Name S EntityDef S? '>'
    /// [72] PEDecl     ::= '<!ENTITY' S '%' S Name S PEDef S? '>'
    /// [73] EntityDef  ::= EntityValue | (ExternalID NDataDecl?)
    /// [74] PEDef      ::= EntityValue | ExternalID
    /// [76] NDataDecl  ::= S 'NDATA' S Name        [VC: Notation Declared]
    /// ```
    ///
    /// The `<!ENTITY` token has already been consumed.
    pub(crate) fn parse_entity_decl(&mut self) -> Result<(), XMLError> {
        self.require_decl_whitespace("after '<!ENTITY'")?;

        debug_assert!(self.peeked_markup.is_none());
        let parameter = if self.peek_char()? == Some('%') {
            self.next_char()?;
            self.require_decl_whitespace("after '%' in a parameter entity declaration")?;
            true
        } else {
            false
        };

        let name = self.scan_name()?;
        self.require_decl_whitespace("after the entity name")?;

        if parameter {
            self.parse_pe_def(&name)?;
        } else {
            self.parse_ge_def(&name)?;
        }

        self.expect_decl_close("an entity declaration")?;
        Ok(())
    }

    fn parse_ge_def(&mut self, name: &str) -> Result<(), XMLError> {
        let base_dir = self.current_entity_base_dir();
        let in_external_markup = self.in_external_markup();

        if matches!(self.peek_char()?, Some('"' | '\'')) {
            let mut value = String::new();
            self.parse_entity_value(&mut value)?;

            if !self.fatal_error_occurred {
                self.handler.internal_entity_decl(name, &value);
            }
            let decl = EntityDecl::InternalGeneralEntity {
                base_dir,
                replacement_text: value.into_boxed_str(),
                in_external_markup,
            };
            self.insert_entity_decl(name, decl)?;
            return Ok(());
        }

        let mut system_id = None;
        let mut public_id = None;
        self.parse_external_id(&mut system_id, &mut public_id, false)?;
        let system_id = system_id.unwrap_or_default();

        // NDATA?
        let s = self.skip_decl_whitespaces()?;
        if matches!(
            self.peek_decl_token()?,
            crate::parse::scanner::MarkupToken::Name(keyword) if keyword == "NDATA"
        ) {
            if s == 0 {
                fatal_error!(self, UnexpectedToken, "whitespace is required before 'NDATA'");
                return Err(XMLError::UnexpectedToken);
            }
            self.next_decl_token()?;
            self.require_decl_whitespace("after 'NDATA'")?;
            let notation_name = self.expect_decl_name("after 'NDATA'")?;

            if !self.fatal_error_occurred {
                self.handler.unparsed_entity_decl(
                    name,
                    public_id.as_deref(),
                    &system_id,
                    &notation_name,
                );
            }
            let decl = EntityDecl::ExternalGeneralUnparsedEntity {
                base_dir,
                system_id: system_id.into_boxed_str(),
                public_id: public_id.map(String::into_boxed_str),
                notation_name: notation_name.into_boxed_str(),
            };
            self.insert_entity_decl(name, decl)?;
            return Ok(());
        }

        if !self.fatal_error_occurred {
            self.handler
                .external_entity_decl(name, public_id.as_deref(), &system_id);
        }
        let decl = EntityDecl::ExternalGeneralParsedEntity {
            base_dir,
            system_id: system_id.into_boxed_str(),
            public_id: public_id.map(String::into_boxed_str),
            in_external_markup,
        };
        self.insert_entity_decl(name, decl)?;
        Ok(())
    }

    fn parse_pe_def(&mut self, name: &str) -> Result<(), XMLError> {
        let base_dir = self.current_entity_base_dir();
        let key = format!("%{name}");

        if matches!(self.peek_char()?, Some('"' | '\'')) {
            let mut value = String::new();
            self.parse_entity_value(&mut value)?;

            if !self.fatal_error_occurred {
                self.handler.internal_entity_decl(&key, &value);
            }
            let decl = EntityDecl::InternalParameterEntity {
                base_dir,
                replacement_text: value.into_boxed_str(),
            };
            self.insert_entity_decl(&key, decl)?;
            return Ok(());
        }

        let mut system_id = None;
        let mut public_id = None;
        self.parse_external_id(&mut system_id, &mut public_id, false)?;
        let system_id = system_id.unwrap_or_default();

        if !self.fatal_error_occurred {
            self.handler
                .external_entity_decl(&key, public_id.as_deref(), &system_id);
        }
        let decl = EntityDecl::ExternalParameterEntity {
            base_dir,
            system_id: system_id.into_boxed_str(),
            public_id: public_id.map(String::into_boxed_str),
        };
        self.insert_entity_decl(&key, decl)?;
        Ok(())
    }

    /// The first declaration of an entity is binding; later ones are
    /// reported as warnings and ignored.
    fn insert_entity_decl(&mut self, name: &str, decl: EntityDecl) -> Result<(), XMLError> {
        if self.entities.insert(name, decl).is_err() {
            warn!("duplicate declaration of entity '{name}'");
            warning!(
                self,
                DuplicateDeclaration,
                "the entity '{}' is declared more than once; the first declaration is used",
                name
            );
        }
        Ok(())
    }
}
