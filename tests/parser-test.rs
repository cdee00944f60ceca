use std::io::Cursor;

use strictxml::{
    error::{XMLError, XMLErrorLevel},
    tree::{Document, NodeKind, ParseOptions},
};

fn parse(xml: &str) -> Result<Document, strictxml::sax::error::SAXParseError> {
    Document::parse_str(xml, ParseOptions::default())
}

fn parse_validating(xml: &str) -> Result<Document, strictxml::sax::error::SAXParseError> {
    Document::parse_str(xml, ParseOptions::default().validating(true))
}

#[test]
fn id_and_idref_attributes() {
    let doc = parse_validating(
        r#"<?xml version="1.0"?>
<!DOCTYPE r [
<!ELEMENT r (a, b)>
<!ELEMENT a EMPTY>
<!ELEMENT b EMPTY>
<!ATTLIST a id ID #REQUIRED>
<!ATTLIST b ref IDREF #REQUIRED>
]>
<r><a id="x"/><b ref="x"/></r>"#,
    )
    .unwrap();

    let root = doc.document_element().unwrap();
    assert_eq!(doc.children(root).count(), 2);

    let hits = doc.find("//a[@id='x']").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(doc.name(hits[0]), Some("a"));

    // The declared type flags the attribute as an ID in the tree.
    let a = doc.element(hits[0]).unwrap();
    assert!(a.attributes[0].id);
}

#[test]
fn predefined_entities_and_char_refs() {
    let doc = parse("<r>&amp;&#60;&lt;</r>").unwrap();
    let root = doc.document_element().unwrap();
    assert_eq!(doc.text_content(root), "&<<");

    // A single merged text node.
    assert_eq!(doc.children(root).count(), 1);
}

#[test]
fn internal_entity_expansion() {
    let doc = parse("<!DOCTYPE r [<!ENTITY e \"hello\">]><r>&e;</r>").unwrap();
    let root = doc.document_element().unwrap();
    assert_eq!(doc.text_content(root), "hello");
}

#[test]
fn nested_internal_entity_expansion() {
    let doc = parse(
        "<!DOCTYPE r [<!ENTITY inner \"world\"><!ENTITY outer \"hello &inner;\">]><r>&outer;</r>",
    )
    .unwrap();
    let root = doc.document_element().unwrap();
    assert_eq!(doc.text_content(root), "hello world");
}

#[test]
fn cdata_end_marker_is_illegal_in_content() {
    let err = parse("<r>]]></r>").unwrap_err();
    assert_eq!(err.level, XMLErrorLevel::NotWellFormed);
    assert!(
        err.message
            .contains("the sequence ']]>' is illegal in content text"),
        "unexpected message: {}",
        err.message
    );
}

#[test]
fn duplicate_attributes_are_fatal() {
    let err = parse("<r a=\"1\" a=\"2\"/>").unwrap_err();
    assert_eq!(err.level, XMLErrorLevel::NotWellFormed);
    assert!(matches!(err.error, XMLError::DuplicateAttribute));
}

#[test]
fn content_model_orders_children() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r (a, b)><!ELEMENT a EMPTY><!ELEMENT b EMPTY>]>";

    assert!(parse_validating(&format!("{dtd}<r><a/><b/></r>")).is_ok());

    let err = parse_validating(&format!("{dtd}<r><b/><a/></r>")).unwrap_err();
    assert_eq!(err.level, XMLErrorLevel::Invalid);
    assert!(matches!(err.error, XMLError::UnexpectedElement));

    // Without validation the same document parses; the violation is
    // reported through the error callback only.
    assert!(parse(&format!("{dtd}<r><b/><a/></r>")).is_ok());
}

#[test]
fn mixed_content_model() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r (#PCDATA|a)*><!ELEMENT a EMPTY>]>";
    assert!(parse_validating(&format!("{dtd}<r>text<a/>more</r>")).is_ok());

    let dtd = "<!DOCTYPE r [<!ELEMENT r (a)><!ELEMENT a EMPTY>]>";
    let err = parse_validating(&format!("{dtd}<r>text<a/></r>")).unwrap_err();
    assert_eq!(err.level, XMLErrorLevel::Invalid);
}

#[test]
fn undeclared_entity_is_fatal_without_a_dtd() {
    let err = parse("<r>&nope;</r>").unwrap_err();
    assert_eq!(err.level, XMLErrorLevel::NotWellFormed);
    assert!(matches!(err.error, XMLError::UndefinedEntity));
}

#[test]
fn cyclic_entities_fail_instead_of_overflowing() {
    let err = parse(
        "<!DOCTYPE r [<!ENTITY a \"&b;\"><!ENTITY b \"&a;\">]><r>&a;</r>",
    )
    .unwrap_err();
    assert!(matches!(err.error, XMLError::EntityRecursion));
}

#[test]
fn entity_must_nest_properly_in_content() {
    // The replacement closes an element opened outside of it.
    let err = parse("<!DOCTYPE r [<!ENTITY e \"</r><r>\">]><r>&e;</r>").unwrap_err();
    assert_eq!(err.level, XMLErrorLevel::NotWellFormed);
}

#[test]
fn attribute_value_normalization() {
    // Whitespace characters become spaces; character references are kept
    // verbatim.
    let doc = parse("<r a=\"x\ny&#10;z\"/>").unwrap();
    let root = doc.document_element().unwrap();
    assert_eq!(doc.get_attribute(root, "a"), Some("x y\nz"));

    // Non-CDATA types additionally collapse spaces.
    let doc = parse_validating(
        "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r a NMTOKENS #IMPLIED>]><r a=\"  x   y \"/>",
    )
    .unwrap();
    let root = doc.document_element().unwrap();
    assert_eq!(doc.get_attribute(root, "a"), Some("x y"));
}

#[test]
fn entities_in_attribute_values() {
    let doc = parse("<!DOCTYPE r [<!ENTITY e \"a b\">]><r x=\"1 &e; 2\"/>").unwrap();
    let root = doc.document_element().unwrap();
    assert_eq!(doc.get_attribute(root, "x"), Some("1 a b 2"));
}

#[test]
fn lt_is_illegal_in_attribute_values() {
    assert!(parse("<r a=\"<\"/>").is_err());
    // ...even when it arrives through an entity expansion
    let err = parse("<!DOCTYPE r [<!ENTITY e \"<\">]><r a=\"&e;\"/>").unwrap_err();
    assert_eq!(err.level, XMLErrorLevel::NotWellFormed);
}

#[test]
fn attribute_defaults_are_applied() {
    let doc = parse_validating(
        "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r a CDATA \"fallback\">]><r/>",
    )
    .unwrap();
    let root = doc.document_element().unwrap();
    assert_eq!(doc.get_attribute(root, "a"), Some("fallback"));

    let element = doc.element(root).unwrap();
    assert!(!element.attributes[0].specified);
}

#[test]
fn fixed_attributes_must_match() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r a CDATA #FIXED \"v\">]>";
    assert!(parse_validating(&format!("{dtd}<r a=\"v\"/>")).is_ok());
    let err = parse_validating(&format!("{dtd}<r a=\"other\"/>")).unwrap_err();
    assert!(matches!(err.error, XMLError::AttributeValueMismatch));
}

#[test]
fn required_attributes_must_be_specified() {
    let err = parse_validating(
        "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r a CDATA #REQUIRED>]><r/>",
    )
    .unwrap_err();
    assert!(matches!(err.error, XMLError::RequiredAttributeMissing));
}

#[test]
fn duplicate_ids_are_invalid() {
    let err = parse_validating(
        "<!DOCTYPE r [<!ELEMENT r (a)*><!ELEMENT a EMPTY><!ATTLIST a id ID #IMPLIED>]>\
         <r><a id=\"x\"/><a id=\"x\"/></r>",
    )
    .unwrap_err();
    assert!(matches!(err.error, XMLError::DuplicateId));
}

#[test]
fn unresolved_idrefs_are_invalid() {
    let err = parse_validating(
        "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r ref IDREF #IMPLIED>]><r ref=\"missing\"/>",
    )
    .unwrap_err();
    assert!(matches!(err.error, XMLError::UnresolvedIdRef));
}

#[test]
fn id_values_may_contain_colons_without_namespace_processing() {
    let xml = "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r id ID #IMPLIED>]><r id=\"a:b\"/>";

    // With namespace processing the value must be an NCName.
    let err = Document::parse_str(xml, ParseOptions::default().validating(true)).unwrap_err();
    assert!(matches!(err.error, XMLError::AttributeValueMismatch));

    // Without it, any XML Name is acceptable.
    let doc = Document::parse_str(
        xml,
        ParseOptions::default().validating(true).namespaces(false),
    );
    assert!(doc.is_ok(), "{:?}", doc.err());
}

#[test]
fn one_id_attribute_per_element_type() {
    let err = parse_validating(
        "<!DOCTYPE r [<!ELEMENT r EMPTY>\
         <!ATTLIST r a ID #IMPLIED>\
         <!ATTLIST r b ID #IMPLIED>]><r/>",
    )
    .unwrap_err();
    assert!(matches!(err.error, XMLError::MultipleIdAttributes));
}

#[test]
fn enumerated_attributes() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r a (yes|no) #IMPLIED>]>";
    assert!(parse_validating(&format!("{dtd}<r a=\"yes\"/>")).is_ok());
    let err = parse_validating(&format!("{dtd}<r a=\"maybe\"/>")).unwrap_err();
    assert!(matches!(err.error, XMLError::AttributeValueMismatch));
}

#[test]
fn comments_and_pis_survive() {
    let doc = parse("<?pi data?><!--note--><r/><!--tail-->").unwrap();
    let kinds = doc
        .children(doc.root())
        .map(|child| match doc.kind(child) {
            NodeKind::ProcessingInstruction { target, .. } => format!("pi:{target}"),
            NodeKind::Comment(text) => format!("comment:{text}"),
            NodeKind::Element(element) => format!("element:{}", element.qname),
            _ => "other".into(),
        })
        .collect::<Vec<_>>();
    assert_eq!(kinds, ["pi:pi", "comment:note", "element:r", "comment:tail"]);
}

#[test]
fn cdata_sections() {
    let doc = parse("<r><![CDATA[<not-markup/>&amp;]]></r>").unwrap();
    let root = doc.document_element().unwrap();
    assert_eq!(doc.text_content(root), "<not-markup/>&amp;");

    // preserved as a distinct node on request
    let doc = Document::parse_str(
        "<r><![CDATA[data]]></r>",
        ParseOptions::default().preserve_cdata(true),
    )
    .unwrap();
    let root = doc.document_element().unwrap();
    let child = doc.first_child(root).unwrap();
    assert!(matches!(doc.kind(child), NodeKind::CDATASection(data) if data == "data"));
}

#[test]
fn doctype_is_recorded() {
    let doc = parse(
        "<!DOCTYPE r PUBLIC \"-//EXAMPLE//DTD r//EN\" \"r.dtd\"><r/>",
    );
    // No loader is installed and validation is off, so the external subset
    // is simply not fetched.
    let doc = doc.unwrap();
    let doctype = doc.doctype().unwrap();
    assert_eq!(doctype.name, "r");
    assert_eq!(doctype.public_id.as_deref(), Some("-//EXAMPLE//DTD r//EN"));
    assert_eq!(doctype.system_id.as_deref(), Some("r.dtd"));
}

#[test]
fn namespaces_are_resolved() {
    let doc = parse(
        "<e:r xmlns:e=\"http://example.com/ns\" xmlns=\"http://example.com/default\">\
         <child e:a=\"v\"/></e:r>",
    )
    .unwrap();
    let root = doc.document_element().unwrap();
    let element = doc.element(root).unwrap();
    assert_eq!(element.qname, "e:r");
    assert_eq!(element.local_name(), "r");
    assert_eq!(element.namespace_name.as_deref(), Some("http://example.com/ns"));
    assert_eq!(element.namespaces.len(), 2);

    let child = doc.find_first("//child").unwrap().unwrap();
    let child = doc.element(child).unwrap();
    assert_eq!(
        child.namespace_name.as_deref(),
        Some("http://example.com/default")
    );
    assert_eq!(
        child.attributes[0].namespace_name.as_deref(),
        Some("http://example.com/ns")
    );
}

#[test]
fn standalone_documents_reject_external_defaults() {
    let err = Document::parse_str(
        "<?xml version=\"1.0\" standalone=\"yes\"?>\
         <!DOCTYPE r SYSTEM \"r.dtd\"><r/>",
        ParseOptions::default()
            .validating(true)
            .entity_loader(|_, _, _| {
                Some(Box::new(Cursor::new(
                    b"<!ELEMENT r EMPTY><!ATTLIST r a CDATA \"def\">".to_vec(),
                )))
            }),
    )
    .unwrap_err();
    assert!(matches!(err.error, XMLError::StandaloneViolation));
}

#[test]
fn external_subset_and_conditional_sections() {
    let doc = Document::parse_str(
        "<!DOCTYPE r SYSTEM \"r.dtd\"><r><a/></r>",
        ParseOptions::default()
            .validating(true)
            .entity_loader(|_, _, _| {
                Some(Box::new(Cursor::new(
                    b"<![INCLUDE[<!ELEMENT r (a)><!ELEMENT a EMPTY>]]>\
                      <![IGNORE[<!ELEMENT garbage >]]>"
                        .to_vec(),
                )))
            }),
    );
    assert!(doc.is_ok(), "{:?}", doc.err());
}

#[test]
fn conditional_sections_must_nest_within_one_entity() {
    let err = Document::parse_str(
        "<!DOCTYPE r SYSTEM \"r.dtd\"><r/>",
        ParseOptions::default()
            .validating(true)
            .entity_loader(|_, _, _| {
                Some(Box::new(Cursor::new(
                    b"<!ENTITY % start \"<![INCLUDE[\">\
                      %start; <!ELEMENT r EMPTY> ]]>"
                        .to_vec(),
                )))
            }),
    )
    .unwrap_err();
    assert!(matches!(err.error, XMLError::ImproperNesting));
}

#[test]
fn parameter_entities_in_the_internal_subset() {
    // At declaration-separator positions a parameter entity is fine even
    // in the internal subset.
    let doc = parse(
        "<!DOCTYPE r [<!ENTITY % decls \"<!ELEMENT r EMPTY>\">%decls;]><r/>",
    );
    assert!(doc.is_ok());

    // Within a markup declaration it is not.
    let err = parse(
        "<!DOCTYPE r [<!ENTITY % name \"r\"><!ELEMENT %name; EMPTY>]><r/>",
    )
    .unwrap_err();
    assert!(matches!(err.error, XMLError::PEContext));
}

#[test]
fn utf16_documents_are_decoded() {
    let xml = "<?xml version=\"1.0\"?><r a=\"v\">\u{3042}</r>";
    let mut bytes = vec![0xFF, 0xFE];
    for unit in xml.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let doc = Document::parse_reader(Cursor::new(bytes), ParseOptions::default()).unwrap();
    let root = doc.document_element().unwrap();
    assert_eq!(doc.text_content(root), "\u{3042}");
    assert_eq!(doc.get_attribute(root, "a"), Some("v"));
}

#[test]
fn latin1_encoding_declaration_switches_the_decoder() {
    let mut bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r>caf".to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(b"</r>");
    let doc = Document::parse_reader(Cursor::new(bytes), ParseOptions::default()).unwrap();
    let root = doc.document_element().unwrap();
    assert_eq!(doc.text_content(root), "caf\u{E9}");
}

#[test]
fn encoding_mismatch_is_fatal() {
    // UTF-16 content declaring an 8-bit encoding
    let xml = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r/>";
    let mut bytes = vec![0xFF, 0xFE];
    for unit in xml.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let err = Document::parse_reader(Cursor::new(bytes), ParseOptions::default()).unwrap_err();
    assert!(matches!(err.error, XMLError::EncodingMismatch));
}

#[test]
fn mismatched_tags_are_fatal() {
    let err = parse("<r><a></b></r>").unwrap_err();
    assert_eq!(err.level, XMLErrorLevel::NotWellFormed);
}

#[test]
fn garbage_after_the_document_element() {
    assert!(parse("<r/><r/>").is_err());
    assert!(parse("<r/>text").is_err());
    assert!(parse("<r/> <!--ok--> ").is_ok());
}

#[test]
fn error_positions_are_reported() {
    let err = parse("<r>\n  <a>\n</r>").unwrap_err();
    assert_eq!(err.level, XMLErrorLevel::NotWellFormed);
    assert_eq!(err.line, 3);
}

#[test]
fn root_element_type_must_match_the_doctype() {
    let err = parse_validating("<!DOCTYPE other [<!ELEMENT other EMPTY>]><r/>").unwrap_err();
    assert!(matches!(err.error, XMLError::RootElementMismatch));
}
