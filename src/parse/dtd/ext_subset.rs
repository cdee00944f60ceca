use crate::{
    error::XMLError,
    parse::scanner::MarkupToken,
    sax::{error::fatal_error, handler::SAXHandler, parser::XMLReader},
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [31] extSubsetDecl ::= (markupdecl | conditionalSect | DeclSep)*
    /// ```
    pub(crate) fn parse_ext_subset(&mut self) -> Result<(), XMLError> {
        self.parse_ext_subset_decls(false)
    }

    /// The shared declaration loop of the external subset. With
    /// `in_include`, the loop ends at the `]]>` closing an INCLUDE section
    /// instead of at end of input.
    fn parse_ext_subset_decls(&mut self, in_include: bool) -> Result<(), XMLError> {
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
                    self.push_parameter_entity(&name, true)?;
                }
                MarkupToken::IncludeIgnore => self.parse_conditional_sect()?,
                MarkupToken::Punct(']') if in_include => {
                    if !matches!(self.next_markup_token()?, MarkupToken::Punct(']'))
                        || !matches!(self.next_markup_token()?, MarkupToken::Punct('>'))
                    {
                        fatal_error!(
                            self,
                            UnexpectedToken,
                            "a conditional section does not end with ']]>'"
                        );
                        return Err(XMLError::UnexpectedToken);
                    }
                    return Ok(());
                }
                MarkupToken::Eof => {
                    if in_include {
                        fatal_error!(
                            self,
                            UnexpectedEof,
                            "unexpected end of input in a conditional section"
                        );
                        return Err(XMLError::UnexpectedEof);
                    }
                    return Ok(());
                }
                token => {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "{} is not allowed in the external subset",
                        token
                    );
                    return Err(XMLError::UnexpectedToken);
                }
            }
        }
    }

    /// ```text
    /// [61] conditionalSect    ::= includeSect | ignoreSect
    /// [62] includeSect        ::= '<![' S? 'INCLUDE' S? '[' extSubsetDecl ']]>'
    /// [63] ignoreSect         ::= '<![' S? 'IGNORE' S? '[' ignoreSectContents* ']]>'
    /// [64] ignoreSectContents ::= Ignore ('<![' ignoreSectContents ']]>' Ignore)*
    /// ```
    ///
    /// The whole section must begin and end within the same entity.
    pub(crate) fn parse_conditional_sect(&mut self) -> Result<(), XMLError> {
        let snapshot = self.current_source_id();
        self.skip_decl_whitespaces()?;
        let keyword = self.expect_decl_name("after '<!['")?;
        self.skip_decl_whitespaces()?;
        self.expect_decl_punct('[')?;

        match keyword.as_str() {
            "INCLUDE" => {
                self.parse_ext_subset_decls(true)?;
                self.check_proper_nesting(snapshot, "a conditional section")?;
            }
            "IGNORE" => {
                self.skip_ignore_sect_contents()?;
                self.check_proper_nesting(snapshot, "a conditional section")?;
            }
            _ => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "a conditional section must be INCLUDE or IGNORE, but '{}' is specified",
                    keyword
                );
                return Err(XMLError::UnexpectedToken);
            }
        }
        Ok(())
    }

    /// Skip the contents of an IGNORE section, honoring nested `<![ ]]>`
    /// pairs. The contents are not tokenized beyond that.
    fn skip_ignore_sect_contents(&mut self) -> Result<(), XMLError> {
        let mut depth = 1usize;
        loop {
            match self.next_char()? {
                Some('<') => {
                    if self.peek_char()? == Some('!') {
                        self.next_char()?;
                        if self.peek_char()? == Some('[') {
                            self.next_char()?;
                            depth += 1;
                        }
                    }
                }
                Some(']') => {
                    let mut run = 1usize;
                    while self.next_char_if(|c| c == ']')?.is_some() {
                        run += 1;
                    }
                    if run >= 2 && self.peek_char()? == Some('>') {
                        self.next_char()?;
                        depth -= 1;
                        if depth == 0 {
                            return Ok(());
                        }
                    }
                }
                Some(_) => {}
                None => {
                    fatal_error!(
                        self,
                        UnexpectedEof,
                        "unexpected end of input in an IGNORE section"
                    );
                    return Err(XMLError::UnexpectedEof);
                }
            }
        }
    }
}
