use std::collections::HashSet;

use log::warn;

use crate::{
    error::XMLError,
    parse::scanner::MarkupToken,
    sax::{
        AttributeType, DefaultDecl,
        error::{fatal_error, validity_error, warning},
        handler::SAXHandler,
        parser::XMLReader,
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [52] AttlistDecl ::= '<!ATTLIST' S Name AttDef* S? '>'
    /// [53] AttDef      ::= S Name S AttType S DefaultDecl
    /// ```
    ///
    /// The `<!ATTLIST` token has already been consumed.
    pub(crate) fn parse_attlist_decl(&mut self) -> Result<(), XMLError> {
        self.require_decl_whitespace("after '<!ATTLIST'")?;
        let elem_name = self.expect_decl_name("in an attribute-list declaration")?;

        loop {
            let s = self.skip_decl_whitespaces()?;
            match self.peek_decl_token()? {
                MarkupToken::Punct('>') => {
                    self.next_decl_token()?;
                    return Ok(());
                }
                MarkupToken::Name(_) => {
                    if s == 0 {
                        fatal_error!(
                            self,
                            UnexpectedToken,
                            "whitespace is required before an attribute definition"
                        );
                        return Err(XMLError::UnexpectedToken);
                    }
                    let att_name = self.expect_decl_name("in an attribute definition")?;
                    self.require_decl_whitespace("after the attribute name")?;
                    let att_type = self.parse_att_type()?;
                    self.require_decl_whitespace("before the default declaration")?;
                    let default_decl =
                        self.parse_default_decl(&elem_name, &att_name, &att_type)?;

                    if matches!(att_type, AttributeType::ID) {
                        // [VC: ID Attribute Default]
                        if !matches!(
                            default_decl,
                            DefaultDecl::IMPLIED | DefaultDecl::REQUIRED
                        ) {
                            validity_error!(
                                self,
                                IdAttributeDefault,
                                "the ID attribute '{}' must be #IMPLIED or #REQUIRED",
                                att_name
                            );
                        }
                        // [VC: One ID per Element Type]
                        if self.attlistdecls.has_id_attribute(&elem_name) {
                            validity_error!(
                                self,
                                MultipleIdAttributes,
                                "the element '{}' already has an ID attribute",
                                elem_name
                            );
                        }
                    }
                    if att_name == "xml:id" && !matches!(att_type, AttributeType::ID) {
                        validity_error!(
                            self,
                            AttributeValueMismatch,
                            "the attribute 'xml:id' must be declared with type ID"
                        );
                    }

                    let is_external = self.in_external_markup();
                    if self.attlistdecls.insert(
                        &*elem_name,
                        &*att_name,
                        att_type.clone(),
                        default_decl.clone(),
                        is_external,
                    ) {
                        if !self.fatal_error_occurred {
                            self.handler.attribute_decl(
                                &elem_name,
                                &att_name,
                                &att_type,
                                &default_decl,
                            );
                        }
                    } else {
                        // The first declaration is binding.
                        warn!("duplicate declaration of attribute '{att_name}' on '{elem_name}'");
                        warning!(
                            self,
                            DuplicateDeclaration,
                            "the attribute '{}' of the element '{}' is declared more than once",
                            att_name,
                            elem_name
                        );
                    }
                }
                token => {
                    let token = token.clone();
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "an attribute name or '>' was expected, but found {}",
                        token
                    );
                    return Err(XMLError::UnexpectedToken);
                }
            }
        }
    }

    /// ```text
    /// [54] AttType        ::= StringType | TokenizedType | EnumeratedType
    /// [55] StringType     ::= 'CDATA'
    /// [56] TokenizedType  ::= 'ID' | 'IDREF' | 'IDREFS' | 'ENTITY'
    ///                         | 'ENTITIES' | 'NMTOKEN' | 'NMTOKENS'
    /// [57] EnumeratedType ::= NotationType | Enumeration
    /// [58] NotationType   ::= 'NOTATION' S '(' S? Name (S? '|' S? Name)* S? ')'
    /// [59] Enumeration    ::= '(' S? Nmtoken (S? '|' S? Nmtoken)* S? ')'
    /// ```
    fn parse_att_type(&mut self) -> Result<AttributeType, XMLError> {
        match self.next_decl_token()? {
            MarkupToken::Name(keyword) => match keyword.as_str() {
                "CDATA" => Ok(AttributeType::CDATA),
                "ID" => Ok(AttributeType::ID),
                "IDREF" => Ok(AttributeType::IDREF),
                "IDREFS" => Ok(AttributeType::IDREFS),
                "ENTITY" => Ok(AttributeType::ENTITY),
                "ENTITIES" => Ok(AttributeType::ENTITIES),
                "NMTOKEN" => Ok(AttributeType::NMTOKEN),
                "NMTOKENS" => Ok(AttributeType::NMTOKENS),
                "NOTATION" => {
                    self.require_decl_whitespace("after 'NOTATION'")?;
                    self.expect_decl_punct('(')?;
                    let snapshot = self.current_source_id();
                    let set = self.parse_token_group_body(snapshot)?;
                    Ok(AttributeType::NOTATION(set))
                }
                _ => {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "'{}' is not an attribute type",
                        keyword
                    );
                    Err(XMLError::UnexpectedToken)
                }
            },
            MarkupToken::Punct('(') => {
                let snapshot = self.current_source_id();
                let set = self.parse_token_group_body(snapshot)?;
                Ok(AttributeType::Enumeration(set))
            }
            token => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "an attribute type was expected, but found {}",
                    token
                );
                Err(XMLError::UnexpectedToken)
            }
        }
    }

    /// Parse a parenthesized `|`-separated group of names (notations) or
    /// name tokens (enumerations), after the opening `(`.
    fn parse_token_group_body(
        &mut self,
        snapshot: usize,
    ) -> Result<HashSet<Box<str>>, XMLError> {
        let mut set = HashSet::new();
        loop {
            self.skip_decl_whitespaces()?;
            let token = match self.next_decl_token()? {
                MarkupToken::Name(token) | MarkupToken::NmToken(token) => token,
                token => {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "a name token was expected in an enumeration, but found {}",
                        token
                    );
                    return Err(XMLError::UnexpectedToken);
                }
            };
            if !set.insert(token.clone().into_boxed_str()) {
                // [VC: No Duplicate Tokens]
                validity_error!(
                    self,
                    DuplicateDeclaration,
                    "the token '{}' appears more than once in an enumeration",
                    token
                );
            }
            self.skip_decl_whitespaces()?;
            match self.next_decl_token()? {
                MarkupToken::Punct('|') => {}
                MarkupToken::Punct(')') => {
                    self.check_proper_nesting(snapshot, "an enumeration")?;
                    return Ok(set);
                }
                token => {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "'|' or ')' was expected in an enumeration, but found {}",
                        token
                    );
                    return Err(XMLError::UnexpectedToken);
                }
            }
        }
    }

    /// ```text
    /// [60] DefaultDecl ::= '#REQUIRED' | '#IMPLIED' | (('#FIXED' S)? AttValue)
    /// ```
    ///
    /// Default values are normalized according to the declared type and
    /// validated against it.
    fn parse_default_decl(
        &mut self,
        elem_name: &str,
        att_name: &str,
        att_type: &AttributeType,
    ) -> Result<DefaultDecl, XMLError> {
        debug_assert!(self.peeked_markup.is_none());
        if self.peek_char()? == Some('#') {
            self.next_char()?;
            let keyword = self.scan_name()?;
            match keyword.as_str() {
                "REQUIRED" => return Ok(DefaultDecl::REQUIRED),
                "IMPLIED" => return Ok(DefaultDecl::IMPLIED),
                "FIXED" => {
                    self.require_decl_whitespace("after '#FIXED'")?;
                    let value = self.parse_default_value(att_name, att_type)?;
                    return Ok(DefaultDecl::FIXED(value.into_boxed_str()));
                }
                _ => {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "'#{}' is not a default declaration",
                        keyword
                    );
                    return Err(XMLError::UnexpectedToken);
                }
            }
        }
        let value = self.parse_default_value(att_name, att_type)?;
        Ok(DefaultDecl::None(value.into_boxed_str()))
    }

    /// Parse and validate a default attribute value.
    ///
    /// [VC: Attribute Default Value Syntactically Correct]
    fn parse_default_value(
        &mut self,
        att_name: &str,
        att_type: &AttributeType,
    ) -> Result<String, XMLError> {
        let mut value = String::new();
        self.parse_att_value(&mut value)?;
        self.normalize_att_value(
            "",
            "",
            &mut value,
            Some(matches!(att_type, AttributeType::CDATA)),
        );

        let version = self.version;
        let ok = match att_type {
            AttributeType::CDATA => true,
            AttributeType::ID | AttributeType::IDREF | AttributeType::ENTITY => {
                self.validate_name_value(&value)
            }
            AttributeType::IDREFS | AttributeType::ENTITIES => {
                self.validate_name_list(&value, |n| self.validate_name_value(n))
            }
            AttributeType::NMTOKEN => version.validate_nmtoken(&value),
            AttributeType::NMTOKENS => {
                self.validate_name_list(&value, |n| version.validate_nmtoken(n))
            }
            AttributeType::NOTATION(set) | AttributeType::Enumeration(set) => {
                set.contains(value.as_str())
            }
        };
        if !ok {
            validity_error!(
                self,
                AttributeValueMismatch,
                "'{}' is not a syntactically correct default for the attribute '{}'",
                value,
                att_name
            );
        }
        Ok(value)
    }
}
