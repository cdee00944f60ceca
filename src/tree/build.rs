use std::{
    io::Read,
    path::{Path, PathBuf},
};

use crate::{
    error::XMLError,
    sax::{
        attributes::Attributes,
        error::SAXParseError,
        handler::SAXHandler,
        parser::{ParserConfig, ParserOption, XMLReaderBuilder},
        source::InputSource,
    },
    tree::{AttributeData, DocType, Document, NamespaceData, NodeId, NodeKind},
};

/// Resolver for external entities: `(base_dir, public_id, system_id)`.
/// Returning `None` means the entity is unresolved; validation then fails
/// if the entity was required.
pub type EntityLoader = Box<dyn FnMut(&Path, Option<&str>, &str) -> Option<Box<dyn Read>>>;

/// Options for the DOM-level parse entry points.
pub struct ParseOptions {
    /// Validate against the DTD. External entities and the external subset
    /// are loaded when set.
    pub validating: bool,
    /// Keep CDATA sections as distinct nodes instead of merging them into
    /// text.
    pub preserve_cdata: bool,
    /// Process namespace declarations and resolve qualified names.
    pub namespaces: bool,
    /// Base directory for resolving external identifiers.
    pub base_dir: Option<PathBuf>,
    /// Custom resolver for external entities.
    pub entity_loader: Option<EntityLoader>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            validating: false,
            preserve_cdata: false,
            namespaces: true,
            base_dir: None,
            entity_loader: None,
        }
    }
}

impl ParseOptions {
    pub fn validating(mut self, validating: bool) -> Self {
        self.validating = validating;
        self
    }

    pub fn preserve_cdata(mut self, preserve_cdata: bool) -> Self {
        self.preserve_cdata = preserve_cdata;
        self
    }

    pub fn namespaces(mut self, namespaces: bool) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn entity_loader(
        mut self,
        loader: impl FnMut(&Path, Option<&str>, &str) -> Option<Box<dyn Read>> + 'static,
    ) -> Self {
        self.entity_loader = Some(Box::new(loader));
        self
    }
}

/// A [`SAXHandler`] that builds a [`Document`] from the event stream.
pub struct TreeBuildHandler {
    pub document: Document,
    current: NodeId,
    preserve_cdata: bool,
    in_cdata: bool,
    pending_namespaces: Vec<NamespaceData>,
    entity_loader: Option<EntityLoader>,
    /// The first fatal error reported, if any.
    pub fatal_error: Option<SAXParseError>,
    /// The first non-fatal error reported, if any.
    pub first_error: Option<SAXParseError>,
}

impl TreeBuildHandler {
    pub fn new() -> Self {
        let document = Document::new();
        let current = document.root();
        Self {
            document,
            current,
            preserve_cdata: false,
            in_cdata: false,
            pending_namespaces: vec![],
            entity_loader: None,
            fatal_error: None,
            first_error: None,
        }
    }

    pub fn preserve_cdata(mut self, preserve_cdata: bool) -> Self {
        self.preserve_cdata = preserve_cdata;
        self
    }

    pub fn entity_loader(mut self, loader: Option<EntityLoader>) -> Self {
        self.entity_loader = loader;
        self
    }

    fn append_text(&mut self, data: &str, cdata: bool) {
        if let Some(last) = self.document.last_child(self.current) {
            match self.document.node_kind_mut(last) {
                NodeKind::CDATASection(text) if cdata && self.in_cdata => {
                    text.push_str(data);
                    return;
                }
                NodeKind::Text(text) if !cdata => {
                    text.push_str(data);
                    return;
                }
                _ => {}
            }
        }
        let node = if cdata {
            self.document.create_cdata_section(data)
        } else {
            self.document.create_text(data)
        };
        self.document.append_child(self.current, node);
    }
}

impl Default for TreeBuildHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SAXHandler for TreeBuildHandler {
    fn declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        self.document.set_version(Some(version));
        self.document.set_encoding(encoding);
        self.document.set_standalone(standalone);
    }

    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        self.document.set_doctype(Some(DocType {
            name: name.to_owned(),
            public_id: public_id.map(str::to_owned),
            system_id: system_id.map(str::to_owned),
        }));
    }

    fn start_element(
        &mut self,
        uri: Option<&str>,
        _local_name: Option<&str>,
        qname: &str,
        atts: &Attributes,
    ) {
        let element = self.document.create_element(qname);
        if let Some(data) = self.document.element_mut(element) {
            data.namespace_name = uri.map(str::to_owned);
            data.namespaces = std::mem::take(&mut self.pending_namespaces);
            for att in atts {
                data.attributes.push(AttributeData {
                    qname: att.qname.to_string(),
                    namespace_name: att.uri.as_deref().map(str::to_owned),
                    value: att.value.to_string(),
                    id: att.is_id(),
                    specified: att.is_specified(),
                });
            }
        }
        self.document.append_child(self.current, element);
        self.current = element;
    }

    fn end_element(&mut self, _uri: Option<&str>, _local_name: Option<&str>, _qname: &str) {
        if let Some(parent) = self.document.parent(self.current) {
            self.current = parent;
        }
    }

    fn characters(&mut self, data: &str) {
        let cdata = self.in_cdata && self.preserve_cdata;
        self.append_text(data, cdata);
    }

    fn ignorable_whitespace(&mut self, data: &str) {
        self.append_text(data, false);
    }

    fn start_cdata(&mut self) {
        self.in_cdata = true;
        if self.preserve_cdata {
            let node = self.document.create_cdata_section("");
            self.document.append_child(self.current, node);
        }
    }

    fn end_cdata(&mut self) {
        self.in_cdata = false;
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        let node = self
            .document
            .create_processing_instruction(target, data.map(str::to_owned));
        self.document.append_child(self.current, node);
    }

    fn comment(&mut self, data: &str) {
        let node = self.document.create_comment(data);
        self.document.append_child(self.current, node);
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        self.pending_namespaces.push(NamespaceData {
            prefix: prefix.map(str::to_owned),
            namespace_name: uri.to_owned(),
        });
    }

    fn resolve_entity(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        base_dir: &Path,
        system_id: &str,
    ) -> Result<InputSource<'static>, XMLError> {
        if let Some(loader) = self.entity_loader.as_mut() {
            let Some(stream) = loader(base_dir, public_id, system_id) else {
                return Err(XMLError::from(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("the entity '{name}' at '{system_id}' is unresolved"),
                )));
            };
            let mut source = InputSource::from_reader(stream, None)?;
            source.set_system_id(system_id);
            if let Some(public_id) = public_id {
                source.set_public_id(public_id);
            }
            return Ok(source);
        }
        let path = base_dir.join(system_id);
        let file = std::fs::File::open(&path)?;
        let mut source = InputSource::from_reader(file, None)?;
        source.set_system_id(path.to_string_lossy().as_ref());
        Ok(source)
    }

    fn warning(&mut self, _error: SAXParseError) {}

    fn error(&mut self, error: SAXParseError) {
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        if self.fatal_error.is_none() {
            self.fatal_error = Some(error);
        }
    }
}

fn reader_config(options: &ParseOptions) -> ParserConfig {
    let mut config = ParserConfig::default();
    config.set_option(ParserOption::Namespaces, options.namespaces);
    config.set_option(ParserOption::Validation, options.validating);
    config.set_option(ParserOption::ExternalGeneralEntities, options.validating);
    config.set_option(ParserOption::ExternalParameterEntities, options.validating);
    config
}

fn finish(
    handler: TreeBuildHandler,
    result: Result<(), XMLError>,
) -> Result<Document, SAXParseError> {
    if let Some(error) = handler.fatal_error {
        return Err(error);
    }
    if let Err(error) = result {
        return Err(handler.first_error.unwrap_or(SAXParseError {
            level: error.level(),
            error,
            line: 0,
            column: 0,
            system_id: None,
            message: std::borrow::Cow::Borrowed("parsing failed"),
        }));
    }
    Ok(handler.document)
}

impl Document {
    /// Parse the document in `xml`.
    pub fn parse_str(xml: &str, options: ParseOptions) -> Result<Self, SAXParseError> {
        let config = reader_config(&options);
        let handler = TreeBuildHandler::new()
            .preserve_cdata(options.preserve_cdata)
            .entity_loader(options.entity_loader);
        let mut builder = XMLReaderBuilder::new()
            .set_handler(handler)
            .set_parser_config(config);
        if let Some(base_dir) = options.base_dir {
            builder = builder.set_base_dir(base_dir);
        }
        let mut reader = builder.build();
        let result = reader.parse_str(xml);
        finish(reader.handler, result)
    }

    /// Parse the document read from `reader`.
    pub fn parse_reader(
        reader: impl Read + 'static,
        options: ParseOptions,
    ) -> Result<Self, SAXParseError> {
        let config = reader_config(&options);
        let handler = TreeBuildHandler::new()
            .preserve_cdata(options.preserve_cdata)
            .entity_loader(options.entity_loader);
        let mut builder = XMLReaderBuilder::new()
            .set_handler(handler)
            .set_parser_config(config);
        if let Some(base_dir) = options.base_dir {
            builder = builder.set_base_dir(base_dir);
        }
        let mut xml_reader = builder.build();
        let result = xml_reader.parse_reader(reader, None);
        finish(xml_reader.handler, result)
    }

    /// Parse the document stored at `path`. The containing directory
    /// becomes the base directory for resolving external identifiers.
    pub fn parse_file(
        path: impl AsRef<Path>,
        options: ParseOptions,
    ) -> Result<Self, SAXParseError> {
        let config = reader_config(&options);
        let handler = TreeBuildHandler::new()
            .preserve_cdata(options.preserve_cdata)
            .entity_loader(options.entity_loader);
        let mut builder = XMLReaderBuilder::new()
            .set_handler(handler)
            .set_parser_config(config);
        if let Some(base_dir) = options.base_dir {
            builder = builder.set_base_dir(base_dir);
        }
        let mut reader = builder.build();
        let result = reader.parse_file(path);
        finish(reader.handler, result)
    }
}
