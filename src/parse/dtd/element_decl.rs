use std::{collections::HashSet, sync::Arc};

use crate::{
    error::XMLError,
    parse::scanner::MarkupToken,
    sax::{
        contentspec::{ContentSpec, ElementContent},
        error::{fatal_error, validity_error},
        handler::SAXHandler,
        parser::XMLReader,
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [45] elementdecl ::= '<!ELEMENT' S Name S contentspec S? '>'
    /// [46] contentspec ::= 'EMPTY' | 'ANY' | Mixed | children
    /// ```
    ///
    /// The `<!ELEMENT` token has already been consumed.
    pub(crate) fn parse_element_decl(&mut self) -> Result<(), XMLError> {
        self.require_decl_whitespace("after '<!ELEMENT'")?;
        let name = self.expect_decl_name("in an element declaration")?;
        self.require_decl_whitespace("after the element name")?;

        let contentspec = match self.next_decl_token()? {
            MarkupToken::Name(keyword) if keyword == "EMPTY" => ContentSpec::EMPTY,
            MarkupToken::Name(keyword) if keyword == "ANY" => ContentSpec::ANY,
            MarkupToken::Punct('(') => {
                let snapshot = self.current_source_id();
                self.skip_decl_whitespaces()?;
                if matches!(self.peek_decl_token()?, MarkupToken::Punct('#')) {
                    self.parse_mixed(snapshot)?
                } else {
                    self.parse_children(snapshot)?
                }
            }
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "a content specification was expected, but found {}",
                    token
                );
                return Err(XMLError::UnexpectedToken);
            }
        };

        self.expect_decl_close("an element declaration")?;

        if !self.fatal_error_occurred {
            self.handler.element_decl(&name, &contentspec);
        }
        let is_external = self.in_external_markup();
        if self.elementdecls.insert(&*name, contentspec, is_external).is_err() {
            // The first declaration is binding.
            validity_error!(
                self,
                DuplicateDeclaration,
                "the element type '{}' is declared more than once",
                name
            );
        }
        Ok(())
    }

    /// ```text
    /// [51] Mixed ::= '(' S? '#PCDATA' (S? '|' S? Name)* S? ')*'
    ///                | '(' S? '#PCDATA' S? ')'
    /// ```
    ///
    /// Called after `(` and the following whitespace, peeking at `#`.
    fn parse_mixed(&mut self, snapshot: usize) -> Result<ContentSpec, XMLError> {
        self.expect_decl_punct('#')?;
        let keyword = self.expect_decl_name("after '#'")?;
        if keyword != "PCDATA" {
            fatal_error!(
                self,
                UnexpectedToken,
                "'#{}' is not allowed in mixed content",
                keyword
            );
            return Err(XMLError::UnexpectedToken);
        }

        let mut names = HashSet::new();
        loop {
            self.skip_decl_whitespaces()?;
            match self.next_decl_token()? {
                MarkupToken::Punct('|') => {
                    self.skip_decl_whitespaces()?;
                    let name = self.expect_decl_name("in mixed content")?;
                    if !names.insert(name.clone().into_boxed_str()) {
                        // [VC: No Duplicate Types]
                        validity_error!(
                            self,
                            DuplicateDeclaration,
                            "the element type '{}' appears more than once in mixed content",
                            name
                        );
                    }
                }
                MarkupToken::Punct(')') => {
                    self.check_proper_nesting(snapshot, "a content model group")?;
                    if names.is_empty() {
                        // '(#PCDATA)' may close without the trailing '*'.
                        if matches!(self.peek_decl_token()?, MarkupToken::Punct('*')) {
                            self.next_decl_token()?;
                        }
                    } else if !matches!(self.next_decl_token()?, MarkupToken::Punct('*')) {
                        fatal_error!(
                            self,
                            UnexpectedToken,
                            "mixed content with element names must end with ')*'"
                        );
                        return Err(XMLError::UnexpectedToken);
                    }
                    return Ok(ContentSpec::Mixed(Arc::new(names)));
                }
                token => {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "'|' or ')' was expected in mixed content, but found {}",
                        token
                    );
                    return Err(XMLError::UnexpectedToken);
                }
            }
        }
    }

    /// ```text
    /// [47] children ::= (choice | seq) ('?' | '*' | '+')?
    /// [48] cp       ::= (Name | choice | seq) ('?' | '*' | '+')?
    /// [49] choice   ::= '(' S? cp ( S? '|' S? cp )+ S? ')'
    /// [50] seq      ::= '(' S? cp ( S? ',' S? cp )* S? ')'
    /// ```
    ///
    /// Called after the opening `(` and whitespace.
    fn parse_children(&mut self, snapshot: usize) -> Result<ContentSpec, XMLError> {
        let mut content = ElementContent::new();
        let root = self.parse_group_body(&mut content, snapshot)?;
        let root = self.parse_occurrence_suffix(&mut content, root)?;
        content.set_root(root);
        Ok(ContentSpec::Children(content))
    }

    /// Parse the body of a parenthesized group up to and including its `)`.
    fn parse_group_body(
        &mut self,
        content: &mut ElementContent,
        snapshot: usize,
    ) -> Result<usize, XMLError> {
        let mut node = self.parse_cp(content)?;
        let mut separator = None;
        loop {
            self.skip_decl_whitespaces()?;
            match self.next_decl_token()? {
                MarkupToken::Punct(')') => {
                    self.check_proper_nesting(snapshot, "a content model group")?;
                    return Ok(node);
                }
                MarkupToken::Punct(sep @ (',' | '|')) => {
                    if *separator.get_or_insert(sep) != sep {
                        fatal_error!(
                            self,
                            UnexpectedToken,
                            "',' and '|' cannot be mixed within one content model group"
                        );
                        return Err(XMLError::UnexpectedToken);
                    }
                    self.skip_decl_whitespaces()?;
                    let next = self.parse_cp(content)?;
                    node = if sep == ',' {
                        content.push_catenation(node, next)
                    } else {
                        content.push_alternation(node, next)
                    };
                }
                token => {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "',' , '|' or ')' was expected in a content model, but found {}",
                        token
                    );
                    return Err(XMLError::UnexpectedToken);
                }
            }
        }
    }

    fn parse_cp(&mut self, content: &mut ElementContent) -> Result<usize, XMLError> {
        let node = match self.next_decl_token()? {
            MarkupToken::Name(name) => content.push_name(name),
            MarkupToken::Punct('(') => {
                let snapshot = self.current_source_id();
                self.skip_decl_whitespaces()?;
                self.parse_group_body(content, snapshot)?
            }
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "a name or '(' was expected in a content model, but found {}",
                    token
                );
                return Err(XMLError::UnexpectedToken);
            }
        };
        self.parse_occurrence_suffix(content, node)
    }

    fn parse_occurrence_suffix(
        &mut self,
        content: &mut ElementContent,
        node: usize,
    ) -> Result<usize, XMLError> {
        Ok(match self.peek_decl_token()? {
            MarkupToken::Punct('?') => {
                self.next_decl_token()?;
                content.push_zero_or_one(node)
            }
            MarkupToken::Punct('*') => {
                self.next_decl_token()?;
                content.push_zero_or_more(node)
            }
            MarkupToken::Punct('+') => {
                self.next_decl_token()?;
                content.push_one_or_more(node)
            }
            _ => node,
        })
    }
}
