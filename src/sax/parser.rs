use std::{
    collections::{HashMap, HashSet},
    io::Read,
    mem::replace,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    XMLVersion,
    error::{XMLError, XMLErrorLevel},
    parse::scanner::MarkupToken,
    sax::{
        AttlistDeclMap, ElementDeclMap, EntityMap, Locator, Namespaces, Notation,
        contentspec::ValidationContext,
        error::fatal_error,
        handler::{DefaultSAXHandler, SAXHandler},
        source::InputSource,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParserOption {
    ExternalGeneralEntities = 0,
    ExternalParameterEntities = 1,
    Namespaces = 2,
    Validation = 3,
}

impl std::ops::BitOr<Self> for ParserOption {
    type Output = ParserConfig;

    fn bitor(self, rhs: Self) -> Self::Output {
        ParserConfig {
            flags: (1 << self as i32) | (1 << rhs as i32),
        }
    }
}

impl std::ops::BitOr<ParserConfig> for ParserOption {
    type Output = ParserConfig;

    fn bitor(self, rhs: ParserConfig) -> Self::Output {
        ParserConfig {
            flags: rhs.flags | (1 << self as i32),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    flags: u64,
}

impl ParserConfig {
    pub fn is_enable(&self, option: ParserOption) -> bool {
        self.flags & (1 << option as i32) != 0
    }

    pub fn set_option(&mut self, option: ParserOption, flag: bool) {
        if flag {
            self.flags |= 1 << (option as i32);
        } else {
            self.flags &= !(1 << (option as i32));
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            flags: 1 << ParserOption::Namespaces as i32,
        }
    }
}

impl std::ops::BitOr<Self> for ParserConfig {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        ParserConfig {
            flags: self.flags | rhs.flags,
        }
    }
}

impl std::ops::BitOr<ParserOption> for ParserConfig {
    type Output = Self;

    fn bitor(self, rhs: ParserOption) -> Self::Output {
        ParserConfig {
            flags: self.flags | (1 << rhs as i32),
        }
    }
}

impl std::ops::BitOrAssign<ParserOption> for ParserConfig {
    fn bitor_assign(&mut self, rhs: ParserOption) {
        self.flags |= 1 << rhs as i32;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    BeforeStart,
    InXMLDeclaration,
    InTextDeclaration,
    InInternalSubset,
    InExternalSubset,
    InContent,
    Parsing,
    Finished,
}

pub struct XMLReader<H: SAXHandler = DefaultSAXHandler> {
    pub(crate) source: Box<InputSource<'static>>,
    pub handler: H,
    pub(crate) config: ParserConfig,
    pub(crate) locator: Arc<Locator>,
    pub(crate) base_dir: PathBuf,

    // Entity stack
    source_stack: Vec<Box<InputSource<'static>>>,
    // (system id, line, column) of the including source
    locator_stack: Vec<(Option<Arc<str>>, usize, usize)>,

    // Character lookahead
    pub(crate) pushback: Vec<char>,
    last_pos: (usize, usize),
    pub(crate) peeked_markup: Option<MarkupToken>,

    // Parser context
    pub(crate) state: ParserState,
    pub(crate) fatal_error_occurred: bool,
    pub(crate) version: XMLVersion,
    pub(crate) encoding: Option<String>,
    pub(crate) standalone: Option<bool>,
    pub(crate) dtd_name: Option<Box<str>>,
    pub(crate) has_internal_subset: bool,
    pub(crate) has_external_subset: bool,
    pub(crate) has_parameter_entity: bool,
    pub(crate) namespaces: Namespaces,
    pub(crate) entities: EntityMap,
    pub(crate) notations: HashMap<Box<str>, Notation>,
    pub(crate) elementdecls: ElementDeclMap,
    pub(crate) attlistdecls: AttlistDeclMap,
    // One frame per open element: the name and its content-model state, or
    // `None` for undeclared element types.
    pub(crate) validation_stack: Vec<Option<(Box<str>, ValidationContext)>>,
    pub(crate) specified_ids: HashSet<Box<str>>,
    pub(crate) unresolved_ids: HashSet<Box<str>>,
}

impl<H: SAXHandler> XMLReader<H> {
    pub fn with_handler(handler: H) -> Self {
        Self {
            source: Box::new(InputSource::default()),
            handler,
            config: ParserConfig::default(),
            locator: Arc::new(Locator::new(None, None, 1, 1)),
            base_dir: PathBuf::from("."),
            source_stack: vec![],
            locator_stack: vec![],
            pushback: vec![],
            last_pos: (1, 1),
            peeked_markup: None,
            state: ParserState::BeforeStart,
            fatal_error_occurred: false,
            version: XMLVersion::default(),
            encoding: None,
            standalone: None,
            dtd_name: None,
            has_internal_subset: false,
            has_external_subset: false,
            has_parameter_entity: false,
            namespaces: Namespaces::default(),
            entities: EntityMap::default(),
            notations: HashMap::new(),
            elementdecls: ElementDeclMap::default(),
            attlistdecls: AttlistDeclMap::default(),
            validation_stack: vec![],
            specified_ids: HashSet::new(),
            unresolved_ids: HashSet::new(),
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn set_base_dir(&mut self, base_dir: impl Into<PathBuf>) {
        self.base_dir = base_dir.into();
    }

    pub(crate) fn reset_context(&mut self) {
        self.source_stack.clear();
        self.locator_stack.clear();
        self.pushback.clear();
        self.peeked_markup = None;

        self.state = ParserState::BeforeStart;
        self.fatal_error_occurred = false;
        self.version = XMLVersion::default();
        self.encoding = None;
        self.standalone = None;
        self.dtd_name = None;
        self.has_internal_subset = false;
        self.has_external_subset = false;
        self.has_parameter_entity = false;
        self.namespaces = Namespaces::default();
        self.entities.clear();
        self.notations.clear();
        self.elementdecls.clear();
        self.attlistdecls.clear();
        self.validation_stack.clear();
        self.specified_ids.clear();
        self.unresolved_ids.clear();
    }

    /// Parse the document in `xml`.
    ///
    /// The text is treated as already decoded; an encoding declaration in
    /// it is ignored.
    pub fn parse_str(&mut self, xml: &str) -> Result<(), XMLError> {
        self.reset_context();
        self.encoding = Some(crate::encoding::UTF8_NAME.into());
        self.source = Box::new(InputSource::from_content(xml));
        self.source.set_base_dir(self.base_dir.clone());
        self.locator = Arc::new(Locator::new(None, None, 1, 1));
        let result = self.parse_document();
        if let Err(err) = &result {
            self.report_unrecoverable(err);
        }
        result
    }

    /// Parse the document read from `reader`.
    ///
    /// If the resource encoding is known, it can be specified using
    /// `encoding`; otherwise it is detected from the stream.
    pub fn parse_reader(
        &mut self,
        reader: impl Read + 'static,
        encoding: Option<&str>,
    ) -> Result<(), XMLError> {
        self.reset_context();
        self.encoding = encoding.map(|enc| enc.to_owned());
        self.source = Box::new(InputSource::from_reader(reader, encoding)?);
        self.source.set_base_dir(self.base_dir.clone());
        self.locator = Arc::new(Locator::new(None, None, 1, 1));
        let result = self.parse_document();
        if let Err(err) = &result {
            self.report_unrecoverable(err);
        }
        result
    }

    /// Parse the document stored at `path`.
    ///
    /// The directory containing the file becomes the base directory for
    /// resolving external identifiers.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<(), XMLError> {
        let path = path.as_ref();
        self.reset_context();
        self.encoding = None;
        if let Some(parent) = path.parent() {
            self.base_dir = parent.to_path_buf();
        }
        let file = std::fs::File::open(path)?;
        self.source = Box::new(InputSource::from_reader(file, None)?);
        self.source.set_base_dir(self.base_dir.clone());
        let system_id: Arc<str> = path.to_string_lossy().as_ref().into();
        self.source.set_system_id(system_id.clone());
        self.locator = Arc::new(Locator::new(Some(system_id), None, 1, 1));
        let result = self.parse_document();
        if let Err(err) = &result {
            self.report_unrecoverable(err);
        }
        result
    }

    /// Surface an error that escaped without a report of its own, e.g. an
    /// I/O failure, as a fatal error.
    fn report_unrecoverable(&mut self, err: &XMLError) {
        if self.fatal_error_occurred || err.level() != XMLErrorLevel::NotWellFormed {
            // Already reported at the failure site, or delivered through
            // the validity channel.
            return;
        }
        let err = err.clone();
        fatal_error!(self, InternalError, "Unrecoverable error: {}", err);
    }

    /// Read and decode more input.
    ///
    /// Until the XML declaration (especially the encoding declaration) has
    /// been read completely, the decoder may be a provisional guess, so
    /// decoding errors raised while reading the declaration are suppressed.
    pub(crate) fn grow(&mut self) -> Result<(), XMLError> {
        let ret = self.source.grow();
        if (self.state == ParserState::InXMLDeclaration && self.encoding.is_none())
            || self.state == ParserState::InTextDeclaration
        {
            Ok(())
        } else {
            ret
        }
    }

    /// Consume and return the next code point of the current source stack.
    ///
    /// Sources flagged `auto_discard` are popped transparently on EOF.
    /// Characters outside the XML `Char` production are fatal.
    pub(crate) fn next_char(&mut self) -> Result<Option<char>, XMLError> {
        if let Some(c) = self.pushback.pop() {
            self.last_pos = (self.locator.line(), self.locator.column());
            self.advance_locator(c);
            return Ok(Some(c));
        }
        loop {
            match self.source.next_char()? {
                Some(c) => {
                    if !self.version.is_char(c) {
                        fatal_error!(
                            self,
                            DisallowedChar,
                            "character U+{:04X} is not allowed",
                            c as u32
                        );
                        return Err(XMLError::DisallowedChar);
                    }
                    self.last_pos = (self.locator.line(), self.locator.column());
                    self.advance_locator(c);
                    return Ok(Some(c));
                }
                None => {
                    if self.source.auto_discard() && !self.source_stack.is_empty() {
                        self.pop_source()?;
                    } else {
                        return Ok(None);
                    }
                }
            }
        }
    }

    pub(crate) fn peek_char(&mut self) -> Result<Option<char>, XMLError> {
        if let Some(&c) = self.pushback.last() {
            return Ok(Some(c));
        }
        loop {
            match self.source.peek_char()? {
                Some(c) => return Ok(Some(c)),
                None => {
                    if self.source.auto_discard() && !self.source_stack.is_empty() {
                        self.pop_source()?;
                    } else {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Consume the next code point if `f` accepts it.
    pub(crate) fn next_char_if(
        &mut self,
        f: impl Fn(char) -> bool,
    ) -> Result<Option<char>, XMLError> {
        match self.peek_char()? {
            Some(c) if f(c) => self.next_char(),
            _ => Ok(None),
        }
    }

    /// Rewind exactly one code point.
    pub(crate) fn retract(&mut self, c: char) {
        let (line, column) = self.last_pos;
        self.locator.set_line(line);
        self.locator.set_column(column);
        self.pushback.push(c);
    }

    fn advance_locator(&self, c: char) {
        if c == '\n' {
            self.locator.update_line(|l| l + 1);
            self.locator.set_column(1);
        } else {
            self.locator.update_column(|col| col + 1);
        }
    }

    /// Record locator movement over `len` bytes of ASCII text consumed
    /// through [`InputSource::advance`].
    pub(crate) fn advance_ascii(&mut self, len: usize) -> Result<(), XMLError> {
        self.source.advance(len)?;
        self.locator.update_column(|col| col + len);
        Ok(())
    }

    pub(crate) fn current_source_id(&self) -> usize {
        self.source.source_id()
    }

    /// Push `source` as the innermost input.
    ///
    /// `entity_name` marks sources expanding an entity so recursion can be
    /// detected by walking the stack.
    pub(crate) fn push_source(
        &mut self,
        mut source: Box<InputSource<'static>>,
        entity_name: Option<Arc<str>>,
    ) -> Result<(), XMLError> {
        if source.base_dir().as_os_str().is_empty() {
            source.set_base_dir(self.source.base_dir());
        }
        if let Some(name) = entity_name {
            source.set_entity_name(name);
        }
        self.locator_stack.push((
            self.locator.system_id(),
            self.locator.line(),
            self.locator.column(),
        ));
        let system_id = source.system_id();
        self.source_stack.push(replace(&mut self.source, source));
        self.locator.set_system_id(system_id);
        self.locator.set_line(1);
        self.locator.set_column(1);
        Ok(())
    }

    pub(crate) fn pop_source(&mut self) -> Result<(), XMLError> {
        let Some(source) = self.source_stack.pop() else {
            return Err(XMLError::InternalError);
        };
        self.source = source;
        let (system_id, line, column) = self.locator_stack.pop().unwrap();
        self.locator.set_system_id(system_id);
        self.locator.set_line(line);
        self.locator.set_column(column);
        Ok(())
    }

    pub(crate) fn source_stack_depth(&self) -> usize {
        self.source_stack.len()
    }

    /// Returns `true` if `name` already appears as the entity name of a
    /// source on the stack, i.e. the expansion would recurse.
    pub(crate) fn entity_recursion_check(&self, name: &str) -> bool {
        self.source
            .entity_name()
            .is_some_and(|n| n.as_ref() == name)
            || self
                .source_stack
                .iter()
                .any(|source| source.entity_name().is_some_and(|n| n.as_ref() == name))
    }

    /// Whether declarations read at the current position count as external
    /// markup declarations (external subset or a parameter-entity
    /// replacement).
    pub(crate) fn in_external_markup(&self) -> bool {
        self.state == ParserState::InExternalSubset
            || self
                .source
                .entity_name()
                .is_some_and(|name| name.starts_with('%'))
            || self
                .source_stack
                .iter()
                .any(|source| source.entity_name().is_some_and(|name| name.starts_with('%')))
    }
}

impl Default for XMLReader<DefaultSAXHandler> {
    fn default() -> Self {
        Self::with_handler(DefaultSAXHandler)
    }
}

pub struct XMLReaderBuilder<H: SAXHandler = DefaultSAXHandler> {
    reader: XMLReader<H>,
}

impl XMLReaderBuilder<DefaultSAXHandler> {
    pub fn new() -> Self {
        Self {
            reader: XMLReader::default(),
        }
    }
}

impl<H: SAXHandler> XMLReaderBuilder<H> {
    pub fn set_handler<H2: SAXHandler>(self, handler: H2) -> XMLReaderBuilder<H2> {
        let mut reader = XMLReader::with_handler(handler);
        reader.config = self.reader.config;
        reader.base_dir = self.reader.base_dir;
        XMLReaderBuilder { reader }
    }

    pub fn set_parser_config(mut self, config: ParserConfig) -> Self {
        self.reader.config = config;
        self
    }

    pub fn enable_option(mut self, option: ParserOption) -> Self {
        self.reader.config.set_option(option, true);
        self
    }

    pub fn disable_option(mut self, option: ParserOption) -> Self {
        self.reader.config.set_option(option, false);
        self
    }

    pub fn set_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.reader.base_dir = base_dir.into();
        self
    }

    pub fn build(self) -> XMLReader<H> {
        self.reader
    }
}

impl Default for XMLReaderBuilder<DefaultSAXHandler> {
    fn default() -> Self {
        Self::new()
    }
}
