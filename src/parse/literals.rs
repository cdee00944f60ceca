use crate::{
    error::XMLError,
    parse::scanner::MarkupToken,
    sax::{
        EntityDecl,
        error::{fatal_error, validity_error, warning},
        handler::SAXHandler,
        parser::{ParserOption, ParserState, XMLReader},
        source::InputSource,
    },
};

/// Collapse space runs and strip leading/trailing spaces in place.
///
/// This is the declaration-dependent half of attribute-value normalization,
/// applied to non-CDATA attribute types. It is idempotent.
pub(crate) fn collapse_attribute_spaces(value: &mut String) {
    let mut out = String::with_capacity(value.len());
    for token in value.split(' ').filter(|t| !t.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    *value = out;
}

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [11] SystemLiteral ::= ('"' [^"]* '"') | ("'" [^']* "'")
    /// ```
    pub(crate) fn parse_system_literal(&mut self) -> Result<String, XMLError> {
        match self.next_decl_token()? {
            MarkupToken::Literal { value, .. } => {
                // A system identifier is a URI reference; a fragment on it
                // has no defined meaning.
                if value.contains('#') {
                    warning!(
                        self,
                        BadSystemLiteral,
                        "the system identifier '{}' carries a fragment",
                        value
                    );
                }
                Ok(value)
            }
            token => {
                fatal_error!(
                    self,
                    BadSystemLiteral,
                    "a quoted system literal was expected, but found {}",
                    token
                );
                Err(XMLError::BadSystemLiteral)
            }
        }
    }

    /// ```text
    /// [12] PubidLiteral ::= '"' PubidChar* '"' | "'" (PubidChar - "'")* "'"
    /// ```
    pub(crate) fn parse_pubid_literal(&mut self) -> Result<String, XMLError> {
        match self.next_decl_token()? {
            MarkupToken::Literal { value, .. } => {
                if let Some(c) = value.chars().find(|&c| !self.version.is_pubid_char(c)) {
                    fatal_error!(
                        self,
                        BadPubid,
                        "'{}' is not allowed in a public identifier",
                        c
                    );
                    return Err(XMLError::BadPubid);
                }
                Ok(value)
            }
            token => {
                fatal_error!(
                    self,
                    BadPubid,
                    "a quoted public identifier was expected, but found {}",
                    token
                );
                Err(XMLError::BadPubid)
            }
        }
    }

    /// ```text
    /// [10] AttValue ::= '"' ([^<&"] | Reference)* '"'
    ///                   | "'" ([^<&'] | Reference)* "'"
    /// ```
    ///
    /// The value is normalized as it is read: whitespace characters become
    /// spaces, character references are decoded and appended verbatim, and
    /// general entity references are expanded recursively through a pushed
    /// source named after the entity.
    pub(crate) fn parse_att_value(&mut self, value: &mut String) -> Result<(), XMLError> {
        debug_assert!(self.peeked_markup.is_none());
        let quote = match self.next_char()? {
            Some(c @ ('"' | '\'')) => c,
            _ => {
                fatal_error!(self, UnexpectedToken, "an attribute value must be quoted");
                return Err(XMLError::UnexpectedToken);
            }
        };

        let base_depth = self.source_stack_depth();
        loop {
            let in_entity = self.source_stack_depth() > base_depth;
            match self.peek_char()? {
                None => {
                    fatal_error!(self, UnexpectedEof, "unexpected end of input in an attribute value");
                    return Err(XMLError::UnexpectedEof);
                }
                Some(c) if c == quote && !in_entity => {
                    self.next_char()?;
                    break;
                }
                Some('<') => {
                    // [WFC: No < in Attribute Values]
                    fatal_error!(self, UnexpectedToken, "'<' is not allowed in an attribute value");
                    return Err(XMLError::UnexpectedToken);
                }
                Some('&') => {
                    self.next_char()?;
                    if self.peek_char()? == Some('#') {
                        self.next_char()?;
                        // Decoded characters are appended verbatim, without
                        // the whitespace replacement.
                        value.push(self.parse_char_ref()?);
                    } else {
                        let name = self.scan_name()?;
                        if self.next_char()? != Some(';') {
                            fatal_error!(
                                self,
                                UndefinedEntity,
                                "the entity reference does not end with ';'"
                            );
                            return Err(XMLError::UndefinedEntity);
                        }
                        self.push_entity_in_att_value(&name)?;
                    }
                }
                Some(c) if self.version.is_whitespace(c) => {
                    self.next_char()?;
                    value.push(' ');
                }
                Some(_) => {
                    value.push(self.next_char()?.unwrap());
                }
            }
        }
        Ok(())
    }

    /// Expand a general entity referenced inside an attribute value.
    fn push_entity_in_att_value(&mut self, name: &str) -> Result<(), XMLError> {
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
        let Some(decl) = self.entities.get(name).cloned() else {
            return self.report_undefined_entity(name);
        };
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
                source.set_auto_discard();
                source.set_system_id(format!("?internal-entity.{name}"));
                self.push_source(Box::new(source), Some(name.into()))?;
                Ok(())
            }
            EntityDecl::ExternalGeneralParsedEntity { .. }
            | EntityDecl::ExternalGeneralUnparsedEntity { .. } => {
                // [WFC: No External Entity References]
                fatal_error!(
                    self,
                    UndefinedEntity,
                    "the external entity '{}' may not be referenced in an attribute value",
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

    /// Returns `true` if normalized according to a declaration, and `false`
    /// if no declaration is found.
    ///
    /// If `is_cdata` is given, the declaration lookup is skipped and the
    /// value decides whether the attribute is of type CDATA.
    ///
    /// Normalization that does not depend on attribute-list declarations is
    /// performed while the value is parsed; this method applies only the
    /// declaration-dependent collapse step.
    pub(crate) fn normalize_att_value(
        &self,
        elem_name: &str,
        attr_name: &str,
        att_value: &mut String,
        is_cdata: Option<bool>,
    ) -> bool {
        let is_cdata = if let Some(is_cdata) = is_cdata {
            is_cdata
        } else if let Some((att_type, _, _)) = self.attlistdecls.get(elem_name, attr_name) {
            matches!(att_type, crate::sax::AttributeType::CDATA)
        } else {
            return false;
        };

        if !is_cdata {
            collapse_attribute_spaces(att_value);
        }
        true
    }

    /// ```text
    /// [9] EntityValue ::= '"' ([^%&"] | PEReference | Reference)* '"'
    ///                     | "'" ([^%&'] | PEReference | Reference)* "'"
    /// ```
    ///
    /// Parameter-entity references are expanded against the current table;
    /// character references are decoded; general entity references are
    /// recorded literally.
    pub(crate) fn parse_entity_value(&mut self, value: &mut String) -> Result<(), XMLError> {
        debug_assert!(self.peeked_markup.is_none());
        let quote = match self.next_char()? {
            Some(c @ ('"' | '\'')) => c,
            _ => {
                fatal_error!(self, UnexpectedToken, "an entity value must be quoted");
                return Err(XMLError::UnexpectedToken);
            }
        };

        let base_depth = self.source_stack_depth();
        loop {
            let in_entity = self.source_stack_depth() > base_depth;
            match self.peek_char()? {
                None => {
                    fatal_error!(self, UnexpectedEof, "unexpected end of input in an entity value");
                    return Err(XMLError::UnexpectedEof);
                }
                Some(c) if c == quote && !in_entity => {
                    self.next_char()?;
                    break;
                }
                Some('&') => {
                    self.next_char()?;
                    if self.peek_char()? == Some('#') {
                        self.next_char()?;
                        value.push(self.parse_char_ref()?);
                    } else {
                        // Bypassed: general entity references are expanded
                        // when the entity itself is referenced.
                        let name = self.scan_name()?;
                        if self.next_char()? != Some(';') {
                            fatal_error!(
                                self,
                                UndefinedEntity,
                                "the entity reference does not end with ';'"
                            );
                            return Err(XMLError::UndefinedEntity);
                        }
                        value.push('&');
                        value.push_str(&name);
                        value.push(';');
                    }
                }
                Some('%') => {
                    self.next_char()?;
                    if !self
                        .peek_char()?
                        .is_some_and(|c| self.version.is_name_start_char(c))
                    {
                        value.push('%');
                        continue;
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
                        // [WFC: PEs in Internal Subset]
                        fatal_error!(
                            self,
                            PEContext,
                            "a parameter entity reference may not occur within a markup declaration in the internal subset"
                        );
                        return Err(XMLError::PEContext);
                    }
                    // Inside an entity value the replacement is spliced
                    // without the surrounding spaces.
                    self.push_parameter_entity(&name, false)?;
                }
                Some(_) => {
                    value.push(self.next_char()?.unwrap());
                }
            }
        }
        Ok(())
    }

    /// Validate a Name-typed attribute value (ID, IDREF, ENTITY): an
    /// NCName when namespace processing is enabled, a Name otherwise.
    pub(crate) fn validate_name_value(&self, value: &str) -> bool {
        if self.config.is_enable(ParserOption::Namespaces) {
            self.version.validate_ncname(value)
        } else {
            self.version.validate_name(value)
        }
    }

    /// Validate a whitespace-separated list of values with `validate`.
    pub(crate) fn validate_name_list(
        &self,
        values: &str,
        validate: impl Fn(&str) -> bool,
    ) -> bool {
        let mut any = false;
        for token in values.split('\x20') {
            if token.is_empty() || !validate(token) {
                return false;
            }
            any = true;
        }
        any
    }

    /// Check an attribute value against its declared type where the check
    /// is purely lexical.
    pub(crate) fn check_lexical_att_type(
        &mut self,
        atttype_desc: &str,
        qname: &str,
        value: &str,
        ok: bool,
    ) -> Result<(), XMLError> {
        if !ok {
            validity_error!(
                self,
                AttributeValueMismatch,
                "'{}' is not a valid {} value for the attribute '{}'",
                value,
                atttype_desc,
                qname
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_is_idempotent() {
        let mut value = String::from("  a   b  c ");
        collapse_attribute_spaces(&mut value);
        assert_eq!(value, "a b c");
        let once = value.clone();
        collapse_attribute_spaces(&mut value);
        assert_eq!(value, once);
    }

    #[test]
    fn collapse_of_empty_value() {
        let mut value = String::new();
        collapse_attribute_spaces(&mut value);
        assert_eq!(value, "");
        let mut value = String::from("   ");
        collapse_attribute_spaces(&mut value);
        assert_eq!(value, "");
    }
}
