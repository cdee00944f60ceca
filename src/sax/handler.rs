use std::{fs::File, path::Path, sync::Arc};

use crate::{
    error::XMLError,
    sax::{
        AttributeType, DefaultDecl, Locator,
        attributes::Attributes,
        contentspec::ContentSpec,
        error::SAXParseError,
        source::InputSource,
    },
};

/// The unified event interface of [`XMLReader`](crate::sax::parser::XMLReader).
///
/// Every method has a no-op default, so handlers implement only what they
/// need. `error` doubles as the report channel for validity violations when
/// validation is disabled.
pub trait SAXHandler {
    // content events
    fn declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        let _ = (version, encoding, standalone);
    }

    fn start_document(&mut self) {}
    fn end_document(&mut self) {}

    fn start_element(
        &mut self,
        uri: Option<&str>,
        local_name: Option<&str>,
        qname: &str,
        atts: &Attributes,
    ) {
        let _ = (uri, local_name, qname, atts);
    }
    fn end_element(&mut self, uri: Option<&str>, local_name: Option<&str>, qname: &str) {
        let _ = (uri, local_name, qname);
    }

    fn characters(&mut self, data: &str) {
        let _ = data;
    }

    fn ignorable_whitespace(&mut self, data: &str) {
        let _ = data;
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        let _ = (target, data);
    }

    fn comment(&mut self, data: &str) {
        let _ = data;
    }

    fn start_cdata(&mut self) {}
    fn end_cdata(&mut self) {}

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        let _ = (prefix, uri);
    }
    fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        let _ = prefix;
    }

    fn start_entity(&mut self, name: &str) {
        let _ = name;
    }
    fn end_entity(&mut self) {}

    fn skipped_entity(&mut self, name: &str) {
        let _ = name;
    }

    fn set_document_locator(&mut self, locator: Arc<Locator>) {
        let _ = locator;
    }

    // DTD events
    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        let _ = (name, public_id, system_id);
    }
    fn end_dtd(&mut self) {}

    fn element_decl(&mut self, name: &str, contentspec: &ContentSpec) {
        let _ = (name, contentspec);
    }

    fn attribute_decl(
        &mut self,
        element_name: &str,
        attribute_name: &str,
        attribute_type: &AttributeType,
        default_decl: &DefaultDecl,
    ) {
        let _ = (element_name, attribute_name, attribute_type, default_decl);
    }

    fn internal_entity_decl(&mut self, name: &str, value: &str) {
        let _ = (name, value);
    }

    fn external_entity_decl(&mut self, name: &str, public_id: Option<&str>, system_id: &str) {
        let _ = (name, public_id, system_id);
    }

    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation_name: &str,
    ) {
        let _ = (name, public_id, system_id, notation_name);
    }

    fn notation_decl(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        let _ = (name, public_id, system_id);
    }

    // entity resolution
    /// Resolve an external entity to an [`InputSource`].
    ///
    /// The default implementation opens `system_id` relative to `base_dir`
    /// on the local filesystem.
    fn resolve_entity(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        base_dir: &Path,
        system_id: &str,
    ) -> Result<InputSource<'static>, XMLError> {
        let _ = (name, public_id);
        let path = base_dir.join(system_id);
        let file = File::open(&path)?;
        let mut source = InputSource::from_reader(file, None)?;
        source.set_system_id(path.to_string_lossy().as_ref());
        Ok(source)
    }

    /// Resolve the external DTD subset. Defaults to [`Self::resolve_entity`].
    fn get_external_subset(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        base_dir: &Path,
        system_id: &str,
    ) -> Result<InputSource<'static>, XMLError> {
        self.resolve_entity(name, public_id, base_dir, system_id)
    }

    // error reports
    fn warning(&mut self, error: SAXParseError) {
        let _ = error;
    }

    fn error(&mut self, error: SAXParseError) {
        let _ = error;
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        let _ = error;
    }
}

/// A handler that accepts every event and reports errors to stderr.
pub struct DefaultSAXHandler;

impl SAXHandler for DefaultSAXHandler {
    fn warning(&mut self, error: SAXParseError) {
        eprintln!("{error}");
    }

    fn error(&mut self, error: SAXParseError) {
        eprintln!("{error}");
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        eprintln!("{error}");
    }
}

/// Records every event as one line per call, for inspection and tests.
#[derive(Default)]
pub struct DebugHandler {
    pub buffer: String,
    pub fatal_error: bool,
}

impl SAXHandler for DebugHandler {
    fn declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        use std::fmt::Write as _;
        writeln!(
            self.buffer,
            "declaration({version}, {}, {})",
            encoding.unwrap_or("None"),
            standalone.map_or("None", |s| if s { "yes" } else { "no" }),
        )
        .ok();
    }

    fn start_document(&mut self) {
        self.buffer.push_str("start_document()\n");
    }
    fn end_document(&mut self) {
        self.buffer.push_str("end_document()\n");
    }

    fn start_element(
        &mut self,
        uri: Option<&str>,
        local_name: Option<&str>,
        qname: &str,
        atts: &Attributes,
    ) {
        use std::fmt::Write as _;
        write!(
            self.buffer,
            "start_element({}, {}, {qname}",
            uri.unwrap_or("None"),
            local_name.unwrap_or("None"),
        )
        .ok();
        for att in atts {
            write!(self.buffer, ", {}='{}'", att.qname, att.value).ok();
        }
        self.buffer.push_str(")\n");
    }

    fn end_element(&mut self, uri: Option<&str>, local_name: Option<&str>, qname: &str) {
        use std::fmt::Write as _;
        writeln!(
            self.buffer,
            "end_element({}, {}, {qname})",
            uri.unwrap_or("None"),
            local_name.unwrap_or("None"),
        )
        .ok();
    }

    fn characters(&mut self, data: &str) {
        use std::fmt::Write as _;
        writeln!(self.buffer, "characters('{}')", data.escape_debug()).ok();
    }

    fn ignorable_whitespace(&mut self, data: &str) {
        use std::fmt::Write as _;
        writeln!(
            self.buffer,
            "ignorable_whitespace('{}')",
            data.escape_debug()
        )
        .ok();
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        use std::fmt::Write as _;
        writeln!(
            self.buffer,
            "processing_instruction({target}, {})",
            data.unwrap_or("None")
        )
        .ok();
    }

    fn comment(&mut self, data: &str) {
        use std::fmt::Write as _;
        writeln!(self.buffer, "comment('{}')", data.escape_debug()).ok();
    }

    fn start_cdata(&mut self) {
        self.buffer.push_str("start_cdata()\n");
    }
    fn end_cdata(&mut self) {
        self.buffer.push_str("end_cdata()\n");
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        use std::fmt::Write as _;
        writeln!(
            self.buffer,
            "start_prefix_mapping({}, {uri})",
            prefix.unwrap_or("None")
        )
        .ok();
    }
    fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        use std::fmt::Write as _;
        writeln!(
            self.buffer,
            "end_prefix_mapping({})",
            prefix.unwrap_or("None")
        )
        .ok();
    }

    fn start_entity(&mut self, name: &str) {
        use std::fmt::Write as _;
        writeln!(self.buffer, "start_entity({name})").ok();
    }
    fn end_entity(&mut self) {
        self.buffer.push_str("end_entity()\n");
    }

    fn skipped_entity(&mut self, name: &str) {
        use std::fmt::Write as _;
        writeln!(self.buffer, "skipped_entity({name})").ok();
    }

    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        use std::fmt::Write as _;
        writeln!(
            self.buffer,
            "start_dtd({name}, {}, {})",
            public_id.unwrap_or("None"),
            system_id.unwrap_or("None"),
        )
        .ok();
    }
    fn end_dtd(&mut self) {
        self.buffer.push_str("end_dtd()\n");
    }

    fn element_decl(&mut self, name: &str, contentspec: &ContentSpec) {
        use std::fmt::Write as _;
        writeln!(self.buffer, "element_decl({name}, {contentspec})").ok();
    }

    fn attribute_decl(
        &mut self,
        element_name: &str,
        attribute_name: &str,
        attribute_type: &AttributeType,
        default_decl: &DefaultDecl,
    ) {
        use std::fmt::Write as _;
        writeln!(
            self.buffer,
            "attribute_decl({element_name}, {attribute_name}, {attribute_type}, {default_decl})"
        )
        .ok();
    }

    fn internal_entity_decl(&mut self, name: &str, value: &str) {
        use std::fmt::Write as _;
        writeln!(self.buffer, "internal_entity_decl({name}, '{value}')").ok();
    }

    fn external_entity_decl(&mut self, name: &str, public_id: Option<&str>, system_id: &str) {
        use std::fmt::Write as _;
        writeln!(
            self.buffer,
            "external_entity_decl({name}, {}, {system_id})",
            public_id.unwrap_or("None")
        )
        .ok();
    }

    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation_name: &str,
    ) {
        use std::fmt::Write as _;
        writeln!(
            self.buffer,
            "unparsed_entity_decl({name}, {}, {system_id}, {notation_name})",
            public_id.unwrap_or("None")
        )
        .ok();
    }

    fn notation_decl(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        use std::fmt::Write as _;
        writeln!(
            self.buffer,
            "notation_decl({name}, {}, {})",
            public_id.unwrap_or("None"),
            system_id.unwrap_or("None"),
        )
        .ok();
    }

    fn warning(&mut self, error: SAXParseError) {
        use std::fmt::Write as _;
        writeln!(self.buffer, "warning({error})").ok();
    }

    fn error(&mut self, error: SAXParseError) {
        use std::fmt::Write as _;
        writeln!(self.buffer, "error({error})").ok();
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        use std::fmt::Write as _;
        self.fatal_error = true;
        writeln!(self.buffer, "fatal_error({error})").ok();
    }
}
