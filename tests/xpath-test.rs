use strictxml::{
    tree::{Document, ParseOptions},
    xpath::{self, Context, XPathNode, XPathObject},
};

fn parse(xml: &str) -> Document {
    Document::parse_str(xml, ParseOptions::default()).unwrap()
}

fn names(doc: &Document, path: &str) -> Vec<String> {
    doc.find(path)
        .unwrap()
        .into_iter()
        .map(|id| doc.name(id).unwrap().to_owned())
        .collect()
}

fn number(doc: &Document, path: &str) -> f64 {
    xpath::compile(path)
        .unwrap()
        .evaluate(doc, XPathNode::Node(doc.root()), None)
        .unwrap()
        .as_number(doc)
}

fn string(doc: &Document, path: &str) -> String {
    xpath::compile(path)
        .unwrap()
        .evaluate(doc, XPathNode::Node(doc.root()), None)
        .unwrap()
        .as_string(doc)
        .into()
}

fn boolean(doc: &Document, path: &str) -> bool {
    xpath::compile(path)
        .unwrap()
        .evaluate(doc, XPathNode::Node(doc.root()), None)
        .unwrap()
        .as_boolean()
}

const LIBRARY: &str = "<library>\
    <book id=\"b1\" xml:lang=\"en\"><title>Dune</title><pages>412</pages></book>\
    <book id=\"b2\"><title>Solaris</title><pages>204</pages></book>\
    <magazine id=\"m1\"><title>AC</title><pages>60</pages></magazine>\
</library>";

#[test]
fn location_paths() {
    let doc = parse(LIBRARY);
    assert_eq!(names(&doc, "/library/book"), ["book", "book"]);
    assert_eq!(names(&doc, "//title").len(), 3);
    assert_eq!(names(&doc, "//book/.."), ["library"]);
    assert_eq!(names(&doc, "//book[1]/following-sibling::*"), ["book", "magazine"]);
    assert_eq!(names(&doc, "//magazine/preceding-sibling::*"), ["book", "book"]);
    assert_eq!(names(&doc, "//pages/ancestor::*"), ["library", "book", "book", "magazine"]);
    assert_eq!(names(&doc, "/library/*[last()]"), ["magazine"]);
    assert_eq!(names(&doc, "//book/following::magazine"), ["magazine"]);
    assert_eq!(names(&doc, "//magazine/preceding::title").len(), 2);
    assert_eq!(names(&doc, "self::node()/library"), ["library"]);
}

#[test]
fn predicates() {
    let doc = parse(LIBRARY);
    assert_eq!(names(&doc, "//book[@id='b2']"), ["book"]);
    assert_eq!(
        doc.find("//book[pages > 300]")
            .unwrap()
            .iter()
            .map(|&id| doc.get_attribute(id, "id").unwrap())
            .collect::<Vec<_>>(),
        ["b1"]
    );
    assert_eq!(names(&doc, "//book[2]"), ["book"]);
    assert_eq!(names(&doc, "//*[title='Solaris']"), ["book"]);
    assert_eq!(names(&doc, "//book[position()=2]"), ["book"]);
    assert!(names(&doc, "//book[3]").is_empty());
}

#[test]
fn attribute_nodes() {
    let doc = parse(LIBRARY);
    let atts = doc.find_nodes("//book/@id").unwrap();
    assert_eq!(atts.len(), 2);
    assert_eq!(doc.string_value(&atts[0]), "b1");
    assert_eq!(doc.string_value(&atts[1]), "b2");
}

#[test]
fn unions_deduplicate_in_document_order() {
    let doc = parse(LIBRARY);
    assert_eq!(
        names(&doc, "//magazine | //book | //book"),
        ["book", "book", "magazine"]
    );
}

#[test]
fn node_type_tests() {
    let doc = parse("<r>text<!--c--><?pi d?><a/>more</r>");
    assert_eq!(doc.find_nodes("//text()").unwrap().len(), 2);
    assert_eq!(doc.find_nodes("//comment()").unwrap().len(), 1);
    assert_eq!(doc.find_nodes("//processing-instruction()").unwrap().len(), 1);
    assert_eq!(doc.find_nodes("//processing-instruction('pi')").unwrap().len(), 1);
    assert_eq!(doc.find_nodes("//processing-instruction('other')").unwrap().len(), 0);
    // node() selects every child
    assert_eq!(doc.find_nodes("/r/node()").unwrap().len(), 5);
}

#[test]
fn core_functions() {
    let doc = parse(LIBRARY);
    assert_eq!(number(&doc, "count(//book)"), 2.0);
    assert_eq!(number(&doc, "sum(//pages)"), 676.0);
    assert_eq!(string(&doc, "name(//*[1])"), "library");
    assert_eq!(string(&doc, "local-name(//book[1])"), "book");
    assert_eq!(string(&doc, "string(//book[1]/title)"), "Dune");
    assert_eq!(string(&doc, "concat('a', 'b', 'c')"), "abc");
    assert!(boolean(&doc, "starts-with('hello', 'he')"));
    assert!(boolean(&doc, "contains('hello', 'ell')"));
    assert_eq!(string(&doc, "substring('12345', 2, 3)"), "234");
    assert_eq!(string(&doc, "substring-before('a-b', '-')"), "a");
    assert_eq!(string(&doc, "substring-after('a-b', '-')"), "b");
    assert_eq!(number(&doc, "string-length('hello')"), 5.0);
    assert_eq!(string(&doc, "normalize-space('  a   b ')"), "a b");
    assert_eq!(string(&doc, "translate('bar', 'abc', 'ABC')"), "BAr");
    assert!(boolean(&doc, "not(false())"));
    assert!(boolean(&doc, "true()"));
    assert!(!boolean(&doc, "false()"));
    assert_eq!(number(&doc, "floor(1.7)"), 1.0);
    assert_eq!(number(&doc, "ceiling(1.2)"), 2.0);
    assert_eq!(number(&doc, "round(1.5)"), 2.0);
    assert_eq!(number(&doc, "number('3.5') * 2"), 7.0);
    assert_eq!(number(&doc, "10 mod 3"), 1.0);
    assert_eq!(number(&doc, "7 div 2"), 3.5);
}

#[test]
fn id_function() {
    let doc = Document::parse_str(
        "<!DOCTYPE r [<!ELEMENT r (a)*><!ELEMENT a (#PCDATA)><!ATTLIST a id ID #IMPLIED>]>\
         <r><a id=\"one\">1</a><a id=\"two\">2</a></r>",
        ParseOptions::default().validating(true),
    )
    .unwrap();
    let hits = doc.find_nodes("id('two')").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(doc.string_value(&hits[0]), "2");
}

#[test]
fn lang_function() {
    let doc = parse(LIBRARY);
    assert!(boolean(&doc, "count(//book[lang('en')]) = 1"));
    assert!(boolean(&doc, "count(//title[lang('en')]) = 1"));
}

#[test]
fn variables_from_the_context() {
    let doc = parse(LIBRARY);
    let mut context = Context::new();
    context.set_double("limit", 300.0);
    context.set_string("wanted", "Solaris");

    let expression = xpath::compile("//book[pages > $limit]").unwrap();
    let hits = expression
        .evaluate_nodes(&doc, doc.root(), Some(&context))
        .unwrap();
    assert_eq!(hits.len(), 1);

    let expression = xpath::compile("//book[title = $wanted]/@id").unwrap();
    let hits = expression
        .evaluate_nodes(&doc, doc.root(), Some(&context))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(doc.string_value(&hits[0]), "b2");

    assert_eq!(context.get_double("limit"), Some(300.0));
    assert_eq!(context.get_string("wanted"), Some("Solaris"));

    // an unbound variable is an evaluation error
    let expression = xpath::compile("$missing").unwrap();
    assert!(expression.evaluate(&doc, doc.root(), Some(&context)).is_err());
}

#[test]
fn matches_checks_membership() {
    let doc = parse(LIBRARY);
    let expression = xpath::compile("//book[@id='b1']").unwrap();
    let b1 = doc.find_first("//book[@id='b1']").unwrap().unwrap();
    let b2 = doc.find_first("//book[@id='b2']").unwrap().unwrap();
    assert!(expression.matches(&doc, &XPathNode::Node(b1)).unwrap());
    assert!(!expression.matches(&doc, &XPathNode::Node(b2)).unwrap());
}

#[test]
fn relative_evaluation_from_a_node() {
    let doc = parse(LIBRARY);
    let b2 = doc.find_first("//book[@id='b2']").unwrap().unwrap();
    let expression = xpath::compile("title").unwrap();
    let hits = expression.evaluate_nodes(&doc, b2, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(doc.string_value(&hits[0]), "Solaris");
}

#[test]
fn namespace_aware_name_tests() {
    let doc = parse(
        "<r xmlns:a=\"http://example.com/a\" xmlns:b=\"http://example.com/b\">\
         <a:item/><b:item/><item/></r>",
    );
    // The test prefix resolves through the document's in-scope bindings.
    assert_eq!(names(&doc, "//a:item"), ["a:item"]);
    assert_eq!(names(&doc, "//b:item"), ["b:item"]);
    // An unprefixed name test matches only no-namespace elements.
    assert_eq!(names(&doc, "//item"), ["item"]);
    // prefix:* matches by local name
    assert_eq!(names(&doc, "//a:*"), ["a:item"]);
}

#[test]
fn namespace_axis() {
    let doc = parse("<r xmlns:a=\"http://example.com/a\"><c/></r>");
    // declared binding, inherited binding and the implicit xml binding
    let on_child = doc.find_nodes("//c/namespace::*").unwrap();
    assert_eq!(on_child.len(), 2);

    let uris = on_child
        .iter()
        .map(|node| doc.string_value(node))
        .collect::<Vec<_>>();
    assert!(uris.contains(&"http://example.com/a".to_owned()));
    assert!(uris.contains(&strictxml::XML_XML_NAMESPACE.to_owned()));
}

#[test]
fn booleans_and_comparisons() {
    let doc = parse(LIBRARY);
    assert!(boolean(&doc, "1 < 2 and 2 <= 2"));
    assert!(boolean(&doc, "3 > 2 or false()"));
    assert!(boolean(&doc, "//book/@id = 'b2'"));
    assert!(boolean(&doc, "not(//book/@id = 'b3')"));
    assert!(boolean(&doc, "//pages > 400"));
    assert!(boolean(&doc, "'a' != 'b'"));
    assert_eq!(number(&doc, "-(2 + 3)"), -5.0);
}

#[test]
fn evaluation_is_pure() {
    let doc = parse(LIBRARY);
    let expression = xpath::compile("count(//book)").unwrap();
    let before = doc.to_string();
    for _ in 0..3 {
        assert_eq!(
            match expression.evaluate(&doc, doc.root(), None).unwrap() {
                XPathObject::Number(n) => n,
                _ => unreachable!(),
            },
            2.0
        );
    }
    assert_eq!(doc.to_string(), before);
}
