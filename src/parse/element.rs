use std::{mem::take, sync::Arc, sync::LazyLock};

use crate::{
    XML_NS_NAMESPACE, XML_XML_NAMESPACE,
    error::XMLError,
    parse::content::ContentEnd,
    sax::{
        AttributeType, DefaultDecl, EntityDecl,
        attributes::{Attribute, Attributes},
        error::{fatal_error, ns_error, validity_error},
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
    },
};

static ARC_XML_NS_NAMESPACE: LazyLock<Arc<str>> = LazyLock::new(|| XML_NS_NAMESPACE.into());

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [39] element ::= EmptyElemTag | STag content ETag       [WFC: Element Type Match]
    ///                                                         [VC:  Element Valid]
    /// [40] STag ::= '<' Name (S Attribute)* S? '>'            [WFC: Unique Att Spec]
    /// [42] ETag ::= '</' Name S? '>'
    /// [44] EmptyElemTag ::= '<' Name (S Attribute)* S? '/>'   [WFC: Unique Att Spec]
    /// ```
    ///
    /// Called with the opening `<` already consumed.
    pub(crate) fn parse_element(&mut self) -> Result<(), XMLError> {
        let old_ns_depth = self.namespaces.len();
        let entity_depth = self.source_stack_depth();
        let (name, prefix_length, empty) = self.parse_start_or_empty_tag()?;

        if !empty {
            match self.parse_content()? {
                ContentEnd::ETag => {
                    let end_tag_name = self.parse_end_tag()?;
                    self.check_element_type_match(&name, &end_tag_name)?;
                }
                ContentEnd::Eof => {
                    if entity_depth > 0 {
                        fatal_error!(
                            self,
                            ImproperNesting,
                            "the element '{}' is not closed within the entity it starts in",
                            name
                        );
                        return Err(XMLError::ImproperNesting);
                    }
                    fatal_error!(
                        self,
                        UnexpectedEof,
                        "unexpected end of input, the element '{}' is not closed",
                        name
                    );
                    return Err(XMLError::UnexpectedEof);
                }
            }
        }

        self.report_end_element(&name, prefix_length);
        self.resume_namespace_stack(old_ns_depth);
        self.finish_content_model_validation(&name)?;
        Ok(())
    }

    /// Returns the element name, the length of its prefix (0 if none) and
    /// whether the tag was an empty-element tag.
    fn parse_start_or_empty_tag(&mut self) -> Result<(String, usize, bool), XMLError> {
        let name = self.scan_name()?;
        let prefix_length = self.check_qname(&name)?;

        // The enclosing content model sees this element before its own
        // model is opened.
        if self.config.is_enable(ParserOption::Validation) {
            match self.validation_stack.last_mut() {
                Some(Some((_, validator))) => validator.push_name(&name),
                Some(None) => {
                    // The parent element is undeclared; nothing to check.
                }
                None => {
                    // [VC: Root Element Type]
                    if self.dtd_name.as_deref().is_some_and(|dtd| dtd != name) {
                        validity_error!(
                            self,
                            RootElementMismatch,
                            "the document type declaration name does not match the document element type '{}'",
                            name
                        );
                    }
                }
            }
        }

        let frame = if let Some((contentspec, is_external)) = self.elementdecls.get_mut(&name) {
            let is_external = *is_external;
            Some((
                name.clone().into_boxed_str(),
                contentspec.new_validator(is_external),
            ))
        } else {
            if self.config.is_enable(ParserOption::Validation) && self.dtd_name.is_some() {
                // [VC: Element Valid]
                validity_error!(
                    self,
                    UndeclaredElement,
                    "the element type '{}' is undeclared",
                    name
                );
            }
            None
        };
        self.validation_stack.push(frame);

        let mut atts = Attributes::new();
        let mut s = self.skip_whitespace_chars()?;
        loop {
            match self.peek_char()? {
                None => {
                    fatal_error!(self, UnexpectedEof, "unexpected end of input in a start tag");
                    return Err(XMLError::UnexpectedEof);
                }
                Some('>') | Some('/') => break,
                Some(c) if self.version.is_name_start_char(c) => {
                    if s == 0 {
                        fatal_error!(
                            self,
                            UnexpectedToken,
                            "whitespace is required before an attribute name"
                        );
                        return Err(XMLError::UnexpectedToken);
                    }
                    let att_name = self.scan_name()?;
                    let att_prefix_length = self.check_qname(&att_name)?;

                    self.skip_whitespace_chars()?;
                    if self.next_char()? != Some('=') {
                        fatal_error!(
                            self,
                            UnexpectedToken,
                            "'=' is required after the attribute name '{}'",
                            att_name
                        );
                        return Err(XMLError::UnexpectedToken);
                    }
                    self.skip_whitespace_chars()?;

                    let mut att_value = String::new();
                    self.parse_att_value(&mut att_value)?;
                    let (declared, modified) = {
                        let before_normalize = att_value.len();
                        let declared =
                            self.normalize_att_value(&name, &att_name, &mut att_value, None);
                        (declared, before_normalize != att_value.len())
                    };

                    self.add_attribute(
                        &mut atts,
                        &name,
                        &att_name,
                        &att_value,
                        att_prefix_length,
                        true,
                        declared,
                        modified,
                    )?;

                    s = self.skip_whitespace_chars()?;
                }
                Some(c) => {
                    fatal_error!(
                        self,
                        UnexpectedToken,
                        "'{}' is not allowed in a start tag",
                        c
                    );
                    return Err(XMLError::UnexpectedToken);
                }
            }
        }

        self.apply_attribute_defaults(&name, &mut atts)?;

        // Resolve attribute namespaces once every declaration on this tag
        // is known.
        if self.config.is_enable(ParserOption::Namespaces) {
            for i in 0..atts.len() {
                if atts[i].is_nsdecl() {
                    continue;
                }
                let mut undefined = None;
                atts.set_namespace(i, |prefix| {
                    if let Some(binding) = self.namespaces.get(prefix) {
                        Some(binding.namespace_name.clone())
                    } else {
                        undefined = Some(prefix.to_owned());
                        None
                    }
                });
                if let Some(prefix) = undefined {
                    ns_error!(
                        self,
                        UndefinedNamespace,
                        "the namespace name for the prefix '{}' has not been declared",
                        prefix
                    );
                }
            }
        }

        self.validate_attributes(&name, &atts)?;

        match self.peek_char()? {
            Some('>') | Some('/') => {}
            _ => {
                fatal_error!(
                    self,
                    UnexpectedToken,
                    "a start or empty tag does not end with '>' or '/>'"
                );
                return Err(XMLError::UnexpectedToken);
            }
        }

        if !self.fatal_error_occurred {
            for att in atts.iter().filter(|att| att.is_nsdecl()) {
                let local_len = att.local_name.as_deref().unwrap().len();
                if local_len == att.qname.len() {
                    self.handler.start_prefix_mapping(None, &att.value);
                } else {
                    self.handler.start_prefix_mapping(
                        Some(&att.qname[att.qname.len() - local_len..]),
                        &att.value,
                    );
                }
            }
        }
        // Namespace declarations are not forwarded as ordinary attributes.
        atts.retain_ordinary();

        if !self.fatal_error_occurred {
            let (uri, local_name) = self.resolve_element_namespace(&name, prefix_length);
            self.handler.start_element(
                uri.as_deref(),
                local_name.map(|range| &name[range]),
                &name,
                &atts,
            );
        }

        let empty = if self.next_char()? == Some('/') {
            if self.next_char()? != Some('>') {
                fatal_error!(self, UnexpectedToken, "an empty tag must end with '/>'");
                return Err(XMLError::UnexpectedToken);
            }
            true
        } else {
            // '>' was consumed just above
            false
        };
        Ok((name, prefix_length, empty))
    }

    /// Insert declared default attribute values that were not specified.
    fn apply_attribute_defaults(
        &mut self,
        elem_name: &str,
        atts: &mut Attributes,
    ) -> Result<(), XMLError> {
        let attlistdecls = take(&mut self.attlistdecls);
        let mut result = Ok(());
        if let Some(decls) = attlistdecls.attlist(elem_name) {
            for (attr, (_, default_decl, is_external_markup)) in decls {
                match default_decl {
                    DefaultDecl::REQUIRED => {
                        if !atts.contains_qname(attr) {
                            // [VC: Required Attribute]
                            let check: Result<(), XMLError> = (|| {
                                validity_error!(
                                    self,
                                    RequiredAttributeMissing,
                                    "#REQUIRED attribute '{}' of the element '{}' is not specified",
                                    attr,
                                    elem_name
                                );
                                Ok(())
                            })();
                            if let Err(err) = check {
                                result = Err(err);
                                break;
                            }
                        }
                    }
                    DefaultDecl::None(def) | DefaultDecl::FIXED(def) => {
                        if !atts.contains_qname(attr) {
                            if *is_external_markup && self.standalone == Some(true) {
                                // [VC: Standalone Document Declaration]
                                let check: Result<(), XMLError> = (|| {
                                    validity_error!(
                                        self,
                                        StandaloneViolation,
                                        "standalone='yes', but the attribute '{}' of the element '{}' takes its default from external markup",
                                        attr,
                                        elem_name
                                    );
                                    Ok(())
                                })();
                                if let Err(err) = check {
                                    result = Err(err);
                                    break;
                                }
                            }
                            let prefix_length = attr.find(':').unwrap_or(0);
                            if let Err(err) = self.add_attribute(
                                atts,
                                elem_name,
                                &attr.to_owned(),
                                def,
                                prefix_length,
                                false,
                                true,
                                false,
                            ) {
                                result = Err(err);
                                break;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        self.attlistdecls = attlistdecls;
        result
    }

    /// Check every attribute against its declaration.
    fn validate_attributes(&mut self, elem_name: &str, atts: &Attributes) -> Result<(), XMLError> {
        if !self.config.is_enable(ParserOption::Validation) {
            // ID bookkeeping still runs so that `xml:id` and ID-typed
            // attributes are flagged in the tree.
            for att in atts {
                if att.is_id() {
                    self.record_id(&att.value);
                }
            }
            return Ok(());
        }

        let attlistdecls = take(&mut self.attlistdecls);
        let result = self.validate_attributes_against(&attlistdecls, elem_name, atts);
        self.attlistdecls = attlistdecls;
        result
    }

    fn validate_attributes_against(
        &mut self,
        attlistdecls: &crate::sax::AttlistDeclMap,
        elem_name: &str,
        atts: &Attributes,
    ) -> Result<(), XMLError> {
        let version = self.version;
        for att in atts {
            if att.is_nsdecl() {
                continue;
            }
            let decl = attlistdecls.get(elem_name, &att.qname);
            if att.qname.as_ref() == "xml:id"
                && !matches!(decl, Some((AttributeType::ID, _, _)))
            {
                if !self.validate_name_value(&att.value) {
                    validity_error!(
                        self,
                        AttributeValueMismatch,
                        "an xml:id value must be a name, but '{}' is specified",
                        att.value
                    );
                }
                if !self.specified_ids.contains(att.value.as_ref()) {
                    self.record_id(&att.value);
                } else {
                    // [VC: ID]
                    validity_error!(
                        self,
                        DuplicateId,
                        "ID '{}' is specified multiple times in the document",
                        att.value
                    );
                }
            }
            let Some((atttype, default_decl, is_external_markup)) = decl else {
                if self.dtd_name.is_some() && att.qname.as_ref() != "xml:id" {
                    // [VC: Attribute Value Type]
                    validity_error!(
                        self,
                        UndeclaredAttribute,
                        "the attribute '{}' is not declared for the element '{}'",
                        att.qname,
                        elem_name
                    );
                }
                continue;
            };
            match atttype {
                AttributeType::CDATA => {
                    // no constraints
                }
                AttributeType::ID => {
                    if !self.validate_name_value(&att.value) {
                        // [VC: ID]
                        validity_error!(
                            self,
                            AttributeValueMismatch,
                            "an ID attribute value must be a name, but '{}' is specified",
                            att.value
                        );
                    } else if self.specified_ids.contains(att.value.as_ref()) {
                        // [VC: ID]
                        validity_error!(
                            self,
                            DuplicateId,
                            "ID '{}' is specified multiple times in the document",
                            att.value
                        );
                    } else {
                        self.record_id(&att.value);
                    }
                }
                AttributeType::IDREF => {
                    if !self.validate_name_value(&att.value) {
                        // [VC: IDREF]
                        validity_error!(
                            self,
                            AttributeValueMismatch,
                            "an IDREF attribute value must be a name, but '{}' is specified",
                            att.value
                        );
                    } else {
                        self.record_idref(&att.value);
                    }
                }
                AttributeType::IDREFS => {
                    if !self.validate_name_list(&att.value, |n| self.validate_name_value(n)) {
                        // [VC: IDREF]
                        validity_error!(
                            self,
                            AttributeValueMismatch,
                            "an IDREFS attribute value must be names, but '{}' is specified",
                            att.value
                        );
                    } else {
                        let idrefs = att
                            .value
                            .split('\x20')
                            .map(str::to_owned)
                            .collect::<Vec<_>>();
                        for idref in &idrefs {
                            self.record_idref(idref);
                        }
                    }
                }
                AttributeType::ENTITY => {
                    if !self.validate_name_value(&att.value) {
                        // [VC: Entity Name]
                        validity_error!(
                            self,
                            AttributeValueMismatch,
                            "an ENTITY attribute value must be a name, but '{}' is specified",
                            att.value
                        );
                    } else {
                        self.check_entity_attribute(&att.qname, &att.value)?;
                    }
                }
                AttributeType::ENTITIES => {
                    if !self.validate_name_list(&att.value, |n| self.validate_name_value(n)) {
                        // [VC: Entity Name]
                        validity_error!(
                            self,
                            AttributeValueMismatch,
                            "an ENTITIES attribute value must be names, but '{}' is specified",
                            att.value
                        );
                    } else {
                        let names = att
                            .value
                            .split('\x20')
                            .map(str::to_owned)
                            .collect::<Vec<_>>();
                        for name in &names {
                            self.check_entity_attribute(&att.qname, name)?;
                        }
                    }
                }
                AttributeType::NMTOKEN => {
                    let ok = version.validate_nmtoken(&att.value);
                    self.check_lexical_att_type("NMTOKEN", &att.qname, &att.value, ok)?;
                }
                AttributeType::NMTOKENS => {
                    let ok = self.validate_name_list(&att.value, |n| version.validate_nmtoken(n));
                    self.check_lexical_att_type("NMTOKENS", &att.qname, &att.value, ok)?;
                }
                AttributeType::NOTATION(set) => {
                    if !set.contains(att.value.as_ref()) {
                        // [VC: Notation Attributes]
                        validity_error!(
                            self,
                            AttributeValueMismatch,
                            "'{}' is not among the declared notations for the attribute '{}'",
                            att.value,
                            att.qname
                        );
                    }
                }
                AttributeType::Enumeration(set) => {
                    if !set.contains(att.value.as_ref()) {
                        // [VC: Enumeration]
                        validity_error!(
                            self,
                            AttributeValueMismatch,
                            "'{}' is not allowed as a value for the attribute '{}'",
                            att.value,
                            att.qname
                        );
                    }
                }
            }

            // Valid documents give no defaults to ID attributes, so they
            // are excluded from the #FIXED check.
            if !matches!(atttype, AttributeType::ID) {
                if let DefaultDecl::FIXED(def) = default_decl {
                    if att.value != *def {
                        // [VC: Fixed Attribute Default]
                        validity_error!(
                            self,
                            AttributeValueMismatch,
                            "the attribute '{}' of the element '{}' is fixed as '{}', but '{}' is specified",
                            att.qname,
                            elem_name,
                            def,
                            att.value
                        );
                    }
                }
            }

            if !matches!(atttype, AttributeType::CDATA)
                && *is_external_markup
                && self.standalone == Some(true)
                && att.has_declaration_dependent_normalization()
            {
                // [VC: Standalone Document Declaration]
                validity_error!(
                    self,
                    StandaloneViolation,
                    "standalone='yes', but an externally declared attribute list changes the normalization of '{}'",
                    att.qname
                );
            }
        }
        Ok(())
    }

    /// [VC: Entity Name] — an ENTITY/ENTITIES attribute value must name an
    /// unparsed entity.
    fn check_entity_attribute(&mut self, qname: &str, value: &str) -> Result<(), XMLError> {
        match self.entities.get(value) {
            Some(EntityDecl::ExternalGeneralUnparsedEntity { .. }) => Ok(()),
            Some(_) => {
                validity_error!(
                    self,
                    UndefinedEntity,
                    "the entity '{}' referenced by the attribute '{}' is not an unparsed entity",
                    value,
                    qname
                );
                Ok(())
            }
            None => {
                validity_error!(
                    self,
                    UndefinedEntity,
                    "the ENTITY attribute value '{}' does not refer to any entity",
                    value
                );
                Ok(())
            }
        }
    }

    /// Return the name of the parsed end tag. `</` is already consumed.
    pub(crate) fn parse_end_tag(&mut self) -> Result<String, XMLError> {
        let end_tag_name = self.scan_name()?;
        self.skip_whitespace_chars()?;
        if self.next_char()? != Some('>') {
            fatal_error!(self, UnexpectedToken, "the end tag does not end with '>'");
            return Err(XMLError::UnexpectedToken);
        }
        Ok(end_tag_name)
    }

    pub(crate) fn check_element_type_match(
        &mut self,
        start: &str,
        end: &str,
    ) -> Result<(), XMLError> {
        if start != end {
            // [WFC: Element Type Match]
            fatal_error!(
                self,
                UnexpectedElement,
                "the start tag '{}' and end tag '{}' names do not match",
                start,
                end
            );
            return Err(XMLError::UnexpectedElement);
        }
        Ok(())
    }

    fn resolve_element_namespace(
        &mut self,
        name: &str,
        prefix_length: usize,
    ) -> (Option<Arc<str>>, Option<std::ops::Range<usize>>) {
        if !self.config.is_enable(ParserOption::Namespaces) {
            return (None, None);
        }
        if prefix_length > 0 {
            if let Some(binding) = self.namespaces.get(&name[..prefix_length]) {
                let uri = binding.namespace_name.clone();
                (Some(uri), Some(prefix_length + 1..name.len()))
            } else {
                ns_error!(
                    self,
                    UndefinedNamespace,
                    "the prefix '{}' is not bound to any namespace",
                    &name[..prefix_length]
                );
                (None, Some(prefix_length + 1..name.len()))
            }
        } else if let Some(binding) = self.namespaces.get("") {
            let uri = binding.namespace_name.clone();
            (Some(uri), Some(0..name.len()))
        } else {
            (None, Some(0..name.len()))
        }
    }

    pub(crate) fn report_end_element(&mut self, name: &str, prefix_length: usize) {
        if self.fatal_error_occurred {
            return;
        }
        let (uri, local_name) = self.resolve_element_namespace(name, prefix_length);
        self.handler
            .end_element(uri.as_deref(), local_name.map(|range| &name[range]), name);
    }

    pub(crate) fn resume_namespace_stack(&mut self, old_depth: usize) {
        while self.namespaces.len() > old_depth {
            let Some((prefix, _)) = self.namespaces.pop() else {
                break;
            };
            if !self.fatal_error_occurred {
                if prefix.is_empty() {
                    self.handler.end_prefix_mapping(None);
                } else {
                    self.handler.end_prefix_mapping(Some(&prefix));
                }
            }
        }
    }

    pub(crate) fn finish_content_model_validation(&mut self, name: &str) -> Result<(), XMLError> {
        let Some(frame) = self.validation_stack.pop() else {
            return Ok(());
        };
        let Some((context_name, mut validator)) = frame else {
            return Ok(());
        };
        debug_assert_eq!(context_name.as_ref(), name);
        if self.fatal_error_occurred || !self.config.is_enable(ParserOption::Validation) {
            return Ok(());
        }
        if validator.is_external_element_content()
            && validator.whitespace()
            && self.standalone == Some(true)
        {
            // [VC: Standalone Document Declaration]
            validity_error!(
                self,
                StandaloneViolation,
                "standalone='yes', but the element '{}' with element content declared in external markup contains whitespace",
                name
            );
        }
        if !validator.finish() {
            validity_error!(
                self,
                UnexpectedElement,
                "the content of the element '{}' does not match its content model",
                name
            );
        }
        Ok(())
    }

    /// Validate a qualified name in a start tag and return its prefix
    /// length (0 when unprefixed).
    fn check_qname(&mut self, name: &str) -> Result<usize, XMLError> {
        if !self.config.is_enable(ParserOption::Namespaces) {
            return Ok(0);
        }
        if !self.version.validate_qname(name) {
            ns_error!(
                self,
                UndefinedNamespace,
                "'{}' is not a valid qualified name",
                name
            );
            return Ok(0);
        }
        Ok(name.find(':').unwrap_or(0))
    }

    /// Register one attribute, handling namespace declarations.
    #[allow(clippy::too_many_arguments)]
    fn add_attribute(
        &mut self,
        atts: &mut Attributes,
        elem_name: &str,
        att_name: &str,
        att_value: &str,
        prefix_length: usize,
        specified: bool,
        declared: bool,
        modified: bool,
    ) -> Result<(), XMLError> {
        let mut att = if self.config.is_enable(ParserOption::Namespaces) {
            let mut uri = None;
            if (prefix_length == 5 && &att_name[..prefix_length] == "xmlns") || att_name == "xmlns"
            {
                // This is a namespace declaration. Register the binding.
                let prefix = if att_name == "xmlns" {
                    if att_value == XML_NS_NAMESPACE || att_value == XML_XML_NAMESPACE {
                        ns_error!(
                            self,
                            ReservedNamespace,
                            "the namespace '{}' cannot be declared as the default namespace",
                            att_value
                        );
                    }
                    ""
                } else {
                    let local = &att_name[prefix_length + 1..];
                    if att_value.is_empty() {
                        ns_error!(
                            self,
                            ReservedNamespace,
                            "an empty namespace name is not allowed in Namespaces in XML 1.0"
                        );
                    } else if att_value == XML_NS_NAMESPACE {
                        ns_error!(
                            self,
                            ReservedNamespace,
                            "the namespace '{}' cannot be declared explicitly",
                            XML_NS_NAMESPACE
                        );
                    } else if local != "xml" && att_value == XML_XML_NAMESPACE {
                        ns_error!(
                            self,
                            ReservedNamespace,
                            "the namespace '{}' cannot bind prefixes other than 'xml'",
                            att_value
                        );
                    } else if local == "xml" && att_value != XML_XML_NAMESPACE {
                        ns_error!(
                            self,
                            ReservedNamespace,
                            "the prefix 'xml' cannot be bound to '{}'",
                            att_value
                        );
                    } else if local == "xmlns" {
                        ns_error!(
                            self,
                            ReservedNamespace,
                            "the prefix 'xmlns' cannot be bound explicitly"
                        );
                    }
                    local
                };
                self.namespaces.push(prefix, att_value);
                uri = Some(ARC_XML_NS_NAMESPACE.clone());
            }
            let mut att = Attribute {
                uri,
                local_name: Some(if prefix_length > 0 {
                    att_name[prefix_length + 1..].into()
                } else {
                    att_name.into()
                }),
                qname: att_name.into(),
                value: att_value.into(),
                flag: 0,
            };
            if att.uri.is_some() {
                att.set_nsdecl();
            }
            att
        } else {
            Attribute {
                uri: None,
                local_name: None,
                qname: att_name.into(),
                value: att_value.into(),
                flag: 0,
            }
        };
        if specified {
            att.set_specified();
        }
        if declared {
            att.set_declared();
        }
        if modified {
            att.set_declaration_dependent_normalization();
        }
        if att.qname.as_ref() == "xml:id"
            || matches!(
                self.attlistdecls.get(elem_name, att_name),
                Some((AttributeType::ID, _, _))
            )
        {
            att.set_id();
        }
        if att.qname.as_ref() == "xml:space"
            && !matches!(att.value.as_ref(), "default" | "preserve")
        {
            ns_error!(
                self,
                AttributeValueMismatch,
                "the value of 'xml:space' must be 'default' or 'preserve', but '{}' is specified",
                att.value
            );
        }

        if let Err(att) = atts.push(att) {
            // [WFC: Unique Att Spec] / [NSC: Attributes Unique]
            fatal_error!(
                self,
                DuplicateAttribute,
                "the attribute '{}' is specified more than once in the same tag",
                att.qname
            );
            return Err(XMLError::DuplicateAttribute);
        }
        Ok(())
    }
}
