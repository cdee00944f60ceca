use crate::{
    error::XMLError,
    sax::{
        Notation,
        error::validity_error,
        handler::SAXHandler,
        parser::XMLReader,
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [82] NotationDecl ::= '<!NOTATION' S Name S (ExternalID | PublicID) S? '>'
    /// [83] PublicID     ::= 'PUBLIC' S PubidLiteral
    /// ```
    ///
    /// The `<!NOTATION` token has already been consumed.
    pub(crate) fn parse_notation_decl(&mut self) -> Result<(), XMLError> {
        self.require_decl_whitespace("after '<!NOTATION'")?;
        let name = self.expect_decl_name("in a notation declaration")?;
        self.require_decl_whitespace("after the notation name")?;

        let mut system_id = None;
        let mut public_id = None;
        self.parse_external_id(&mut system_id, &mut public_id, true)?;

        self.expect_decl_close("a notation declaration")?;

        if self.notations.contains_key(name.as_str()) {
            // [VC: Unique Notation Name]
            validity_error!(
                self,
                DuplicateDeclaration,
                "the notation '{}' is declared more than once",
                name
            );
            return Ok(());
        }

        if !self.fatal_error_occurred {
            self.handler
                .notation_decl(&name, public_id.as_deref(), system_id.as_deref());
        }
        self.notations.insert(
            name.clone().into_boxed_str(),
            Notation {
                name: name.into_boxed_str(),
                system_id: system_id.map(String::into_boxed_str),
                public_id: public_id.map(String::into_boxed_str),
            },
        );
        Ok(())
    }
}
