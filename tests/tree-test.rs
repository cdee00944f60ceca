use strictxml::tree::{Document, NodeKind, ParseOptions, WriterOptions};

fn parse(xml: &str) -> Document {
    Document::parse_str(xml, ParseOptions::default()).unwrap()
}

#[test]
fn every_node_knows_its_parent() {
    let doc = parse("<r><a><b/>text</a><c/></r>");

    fn check(doc: &Document, node: strictxml::tree::NodeId) {
        for child in doc.children(node) {
            assert_eq!(doc.parent(child), Some(node));
            check(doc, child);
        }
        // the sibling list is consistent in both directions
        let children = doc.children(node).collect::<Vec<_>>();
        for pair in children.windows(2) {
            assert_eq!(doc.next_sibling(pair[0]), Some(pair[1]));
            assert_eq!(doc.prev_sibling(pair[1]), Some(pair[0]));
        }
        if let Some(&first) = children.first() {
            assert_eq!(doc.first_child(node), Some(first));
            assert_eq!(doc.prev_sibling(first), None);
        }
        if let Some(&last) = children.last() {
            assert_eq!(doc.last_child(node), Some(last));
            assert_eq!(doc.next_sibling(last), None);
        }
    }
    check(&doc, doc.root());
}

#[test]
fn canonical_round_trip_is_byte_identical() {
    for input in [
        "<?xml version=\"1.0\"?><r><a id=\"x\"/><b ref=\"x\"/></r>",
        "<r>text &amp; more</r>",
        "<r a=\"1\" b=\"2\"><c>nested</c></r>",
        "<?xml version=\"1.0\"?><r><![CDATA[raw <stuff>]]></r>",
        "<!--head--><r/><!--tail-->",
        "<?target instruction?><r/>",
    ] {
        let doc = Document::parse_str(input, ParseOptions::default().preserve_cdata(true))
            .unwrap();
        assert_eq!(doc.write(&WriterOptions::default()), input, "input: {input}");
    }
}

#[test]
fn parse_write_parse_is_identity() {
    let input = "<?xml version=\"1.0\"?>\
        <r a=\"v\"><child>text</child><other/>tail</r>";
    let first = parse(input);
    let written = first.write(&WriterOptions::default());
    let second = parse(&written);
    assert_eq!(first, second);
}

#[test]
fn equality_is_structural() {
    assert_eq!(parse("<r><a/><b/></r>"), parse("<r><a/><b/></r>"));
    assert_ne!(parse("<r><a/><b/></r>"), parse("<r><b/><a/></r>"));
    // attribute order is not significant
    assert_eq!(parse("<r a=\"1\" b=\"2\"/>"), parse("<r b=\"2\" a=\"1\"/>"));
    // text comparison trims surrounding whitespace
    assert_eq!(parse("<r> x </r>"), parse("<r>x</r>"));
    assert_ne!(parse("<r>x</r>"), parse("<r>y</r>"));
}

#[test]
fn writer_options() {
    let doc = parse("<r><a/><!--note--><b>text</b></r>");

    let wrapped = doc.write(&WriterOptions {
        indent: 2,
        wrap: true,
        ..WriterOptions::default()
    });
    assert_eq!(
        wrapped,
        "<r>\n  <a/>\n  <!--note-->\n  <b>text</b>\n</r>\n"
    );

    let no_comment = doc.write(&WriterOptions {
        no_comment: true,
        ..WriterOptions::default()
    });
    assert_eq!(no_comment, "<r><a/><b>text</b></r>");

    let expanded = doc.write(&WriterOptions {
        collapse_empty_elements: false,
        ..WriterOptions::default()
    });
    assert_eq!(expanded, "<r><a></a><!--note--><b>text</b></r>");
}

#[test]
fn writer_trims_pcdata_on_request() {
    let doc = parse("<r>  a   lot   of space  </r>");
    let trimmed = doc.write(&WriterOptions {
        trim: true,
        ..WriterOptions::default()
    });
    assert_eq!(trimmed, "<r>a lot of space</r>");
}

#[test]
fn writer_escapes_attribute_whitespace_on_request() {
    let mut doc = Document::new();
    let root = doc.create_element("r");
    doc.append_child(doc.root(), root);
    doc.set_attribute(root, "a", "line\nbreak");

    let plain = doc.write(&WriterOptions::default());
    assert_eq!(plain, "<r a=\"line\nbreak\"/>");

    let escaped = doc.write(&WriterOptions {
        escape_whitespace: true,
        ..WriterOptions::default()
    });
    assert_eq!(escaped, "<r a=\"line&#10;break\"/>");
}

#[test]
fn doctype_round_trip_and_suppression() {
    let input = "<!DOCTYPE r SYSTEM \"r.dtd\"><r/>";
    let doc = parse(input);
    assert_eq!(doc.write(&WriterOptions::default()), input);

    let suppressed = doc.write(&WriterOptions {
        no_doctype: true,
        ..WriterOptions::default()
    });
    assert_eq!(suppressed, "<r/>");
}

#[test]
fn hand_built_documents_serialize() {
    let mut doc = Document::new();
    let root = doc.create_element("greeting");
    doc.append_child(doc.root(), root);
    doc.set_attribute(root, "lang", "en");
    let text = doc.create_text("hello & <world>");
    doc.append_child(root, text);
    let comment = doc.create_comment("done");
    doc.append_child(root, comment);

    assert_eq!(
        doc.to_string(),
        "<greeting lang=\"en\">hello &amp; &lt;world&gt;<!--done--></greeting>"
    );
}

#[test]
fn namespace_declarations_are_written_back() {
    let input = "<e:r xmlns:e=\"http://example.com/ns\"><e:c/></e:r>";
    let doc = parse(input);
    assert_eq!(doc.write(&WriterOptions::default()), input);
}

#[test]
fn write_to_encodes_utf16() {
    let doc = parse("<?xml version=\"1.0\"?><r>\u{3042}</r>");
    let mut bytes = vec![];
    doc.write_to(&mut bytes, &WriterOptions::default(), Some("UTF-16"))
        .unwrap();
    // BOM first, then little-endian code units
    assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
    let doc2 = Document::parse_reader(std::io::Cursor::new(bytes), ParseOptions::default())
        .unwrap();
    let root = doc2.document_element().unwrap();
    assert_eq!(doc2.text_content(root), "\u{3042}");
}

#[test]
fn detached_subtrees_disappear_from_output() {
    let mut doc = parse("<r><a/><b/></r>");
    let b = doc.find_first("//b").unwrap().unwrap();
    doc.detach(b);
    assert_eq!(doc.to_string(), "<r><a/></r>");

    // the detached node is still usable and can be re-attached elsewhere
    let a = doc.find_first("//a").unwrap().unwrap();
    doc.append_child(a, b);
    assert_eq!(doc.to_string(), "<r><a><b/></a></r>");
}

#[test]
fn text_merging_in_the_builder() {
    let doc = parse("<r>a&amp;b</r>");
    let root = doc.document_element().unwrap();
    let children = doc.children(root).collect::<Vec<_>>();
    assert_eq!(children.len(), 1);
    assert!(matches!(doc.kind(children[0]), NodeKind::Text(text) if text == "a&b"));
}
