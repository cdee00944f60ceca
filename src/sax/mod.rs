pub mod attributes;
pub mod contentspec;
pub mod error;
pub mod handler;
pub mod parser;
pub mod source;

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{
        Arc, LazyLock, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

pub use attributes::{Attribute, Attributes};

use crate::{error::XMLError, sax::contentspec::ContentSpec};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttributeType {
    #[default]
    CDATA,
    ID,
    IDREF,
    IDREFS,
    ENTITY,
    ENTITIES,
    NMTOKEN,
    NMTOKENS,
    NOTATION(HashSet<Box<str>>),
    Enumeration(HashSet<Box<str>>),
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CDATA => write!(f, "CDATA"),
            Self::ID => write!(f, "ID"),
            Self::IDREF => write!(f, "IDREF"),
            Self::IDREFS => write!(f, "IDREFS"),
            Self::ENTITY => write!(f, "ENTITY"),
            Self::ENTITIES => write!(f, "ENTITIES"),
            Self::NMTOKEN => write!(f, "NMTOKEN"),
            Self::NMTOKENS => write!(f, "NMTOKENS"),
            Self::NOTATION(set) => {
                let mut names = set.iter().collect::<Vec<_>>();
                names.sort_unstable();
                write!(f, "NOTATION (")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    write!(f, "{name}")?;
                }
                write!(f, ")")
            }
            Self::Enumeration(set) => {
                let mut tokens = set.iter().collect::<Vec<_>>();
                tokens.sort_unstable();
                write!(f, "(")?;
                for (i, token) in tokens.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    write!(f, "{token}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DefaultDecl {
    REQUIRED,
    IMPLIED,
    FIXED(Box<str>),
    None(Box<str>),
}

impl std::fmt::Display for DefaultDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::REQUIRED => write!(f, "#REQUIRED"),
            Self::IMPLIED => write!(f, "#IMPLIED"),
            Self::FIXED(value) => write!(f, "#FIXED \"{value}\""),
            Self::None(value) => write!(f, "\"{value}\""),
        }
    }
}

#[allow(clippy::type_complexity)]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttlistDeclMap(
    // (attribute type, default value declaration, is external markup declaration)
    HashMap<Box<str>, HashMap<Box<str>, (AttributeType, DefaultDecl, bool)>>,
);

impl AttlistDeclMap {
    /// Returns `true` if newly inserted, and `false` if an attribute with
    /// the same name is already registered for the element.
    pub fn insert(
        &mut self,
        elem_name: impl Into<Box<str>>,
        attr_name: impl Into<Box<str>>,
        att_type: AttributeType,
        default_decl: DefaultDecl,
        is_external_markup: bool,
    ) -> bool {
        use std::collections::hash_map::Entry::*;
        let attr_name: Box<str> = attr_name.into();
        match self.0.entry(elem_name.into()) {
            Vacant(entry) => {
                entry.insert(HashMap::from([(
                    attr_name,
                    (att_type, default_decl, is_external_markup),
                )]));
            }
            Occupied(mut entry) => match entry.get_mut().entry(attr_name) {
                Vacant(entry) => {
                    entry.insert((att_type, default_decl, is_external_markup));
                }
                Occupied(_) => return false,
            },
        }
        true
    }

    pub fn get(
        &self,
        elem_name: &str,
        attr_name: &str,
    ) -> Option<&(AttributeType, DefaultDecl, bool)> {
        self.0.get(elem_name)?.get(attr_name)
    }

    pub fn contains(&self, elem_name: &str, attr_name: &str) -> bool {
        self.get(elem_name, attr_name).is_some()
    }

    /// Returns `true` if an ID-typed attribute is already declared for
    /// `elem_name`.
    pub fn has_id_attribute(&self, elem_name: &str) -> bool {
        self.0
            .get(elem_name)
            .is_some_and(|map| map.values().any(|(ty, _, _)| matches!(ty, AttributeType::ID)))
    }

    pub fn attlist(
        &self,
        elem_name: &str,
    ) -> Option<impl Iterator<Item = (&str, &(AttributeType, DefaultDecl, bool))>> {
        self.0
            .get(elem_name)
            .map(|map| map.iter().map(|(attr, value)| (attr.as_ref(), value)))
    }

    pub fn iter_all(
        &self,
    ) -> impl Iterator<Item = (&str, &str, &(AttributeType, DefaultDecl, bool))> {
        self.0.iter().flat_map(|(elem, map)| {
            map.iter()
                .map(move |(attr, value)| (elem.as_ref(), attr.as_ref(), value))
        })
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct ElementDeclMap(
    // (content specification, is external markup declaration)
    HashMap<Box<str>, (ContentSpec, bool)>,
);

impl ElementDeclMap {
    pub fn insert(
        &mut self,
        name: impl Into<Box<str>>,
        contentspec: ContentSpec,
        is_external_markup: bool,
    ) -> Result<(), XMLError> {
        use std::collections::hash_map::Entry::*;
        match self.0.entry(name.into()) {
            Occupied(_) => Err(XMLError::DuplicateDeclaration),
            Vacant(entry) => {
                entry.insert((contentspec, is_external_markup));
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&(ContentSpec, bool)> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (ContentSpec, bool)> {
        self.0.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityDecl {
    InternalGeneralEntity {
        base_dir: PathBuf,
        replacement_text: Box<str>,
        in_external_markup: bool,
    },
    InternalParameterEntity {
        base_dir: PathBuf,
        replacement_text: Box<str>,
    },
    ExternalGeneralParsedEntity {
        base_dir: PathBuf,
        system_id: Box<str>,
        public_id: Option<Box<str>>,
        in_external_markup: bool,
    },
    ExternalGeneralUnparsedEntity {
        base_dir: PathBuf,
        system_id: Box<str>,
        public_id: Option<Box<str>>,
        notation_name: Box<str>,
    },
    ExternalParameterEntity {
        base_dir: PathBuf,
        system_id: Box<str>,
        public_id: Option<Box<str>>,
    },
}

static PREDEFINED_ENTITY_LT: LazyLock<EntityDecl> =
    LazyLock::new(|| EntityDecl::InternalGeneralEntity {
        base_dir: PathBuf::new(),
        replacement_text: "&#60;".into(), // '<'
        in_external_markup: false,
    });
static PREDEFINED_ENTITY_GT: LazyLock<EntityDecl> =
    LazyLock::new(|| EntityDecl::InternalGeneralEntity {
        base_dir: PathBuf::new(),
        replacement_text: "&#62;".into(), // '>'
        in_external_markup: false,
    });
static PREDEFINED_ENTITY_AMP: LazyLock<EntityDecl> =
    LazyLock::new(|| EntityDecl::InternalGeneralEntity {
        base_dir: PathBuf::new(),
        replacement_text: "&#38;".into(), // '&'
        in_external_markup: false,
    });
static PREDEFINED_ENTITY_APOS: LazyLock<EntityDecl> =
    LazyLock::new(|| EntityDecl::InternalGeneralEntity {
        base_dir: PathBuf::new(),
        replacement_text: "&#39;".into(), // '''
        in_external_markup: false,
    });
static PREDEFINED_ENTITY_QUOT: LazyLock<EntityDecl> =
    LazyLock::new(|| EntityDecl::InternalGeneralEntity {
        base_dir: PathBuf::new(),
        replacement_text: "&#34;".into(), // '"'
        in_external_markup: false,
    });

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityMap(HashMap<Box<str>, EntityDecl>);

impl EntityMap {
    pub fn insert(&mut self, name: impl Into<Box<str>>, decl: EntityDecl) -> Result<(), XMLError> {
        use std::collections::hash_map::Entry::*;
        match self.0.entry(name.into()) {
            Occupied(_) => Err(XMLError::DuplicateDeclaration),
            Vacant(entry) => {
                entry.insert(decl);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&EntityDecl> {
        if let Some(decl) = self.0.get(name) {
            return Some(decl);
        }

        match name {
            "lt" => Some(&PREDEFINED_ENTITY_LT),
            "gt" => Some(&PREDEFINED_ENTITY_GT),
            "amp" => Some(&PREDEFINED_ENTITY_AMP),
            "apos" => Some(&PREDEFINED_ENTITY_APOS),
            "quot" => Some(&PREDEFINED_ENTITY_QUOT),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityDecl)> {
        self.0.iter().map(|(name, decl)| (name.as_ref(), decl))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Notation {
    pub name: Box<str>,
    pub system_id: Option<Box<str>>,
    pub public_id: Option<Box<str>>,
}

/// In-scope namespace bindings with shadowing.
///
/// Bindings declared closer to the document element appear earlier in the
/// list. The empty prefix represents the default namespace. The `xml`
/// prefix is implicitly bound.
pub struct Namespaces {
    // (prefix, namespace name, position of the shadowed binding or usize::MAX)
    bindings: Vec<(Box<str>, Arc<str>, usize)>,
    prefix_map: HashMap<Box<str>, usize>,
}

impl Default for Namespaces {
    fn default() -> Self {
        let mut namespaces = Self {
            bindings: vec![],
            prefix_map: HashMap::new(),
        };
        namespaces.push("xml", crate::XML_XML_NAMESPACE);
        namespaces
    }
}

pub struct NamespaceBinding<'a> {
    pub prefix: &'a str,
    pub namespace_name: &'a Arc<str>,
}

impl Namespaces {
    pub fn push(&mut self, prefix: &str, namespace_name: &str) {
        let pos = self.bindings.len();
        let prev = self.prefix_map.insert(prefix.into(), pos);
        self.bindings
            .push((prefix.into(), namespace_name.into(), prev.unwrap_or(usize::MAX)));
    }

    pub fn pop(&mut self) -> Option<(Box<str>, Arc<str>)> {
        let (prefix, namespace_name, prev) = self.bindings.pop()?;
        if prev == usize::MAX {
            self.prefix_map.remove(&prefix);
        } else {
            self.prefix_map.insert(prefix.clone(), prev);
        }
        Some((prefix, namespace_name))
    }

    pub fn get(&self, prefix: &str) -> Option<NamespaceBinding<'_>> {
        let &pos = self.prefix_map.get(prefix)?;
        let (prefix, namespace_name, _) = &self.bindings[pos];
        // An empty namespace name undeclares the prefix.
        if namespace_name.is_empty() {
            return None;
        }
        Some(NamespaceBinding {
            prefix,
            namespace_name,
        })
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

pub struct Locator {
    system_id: RwLock<Option<Arc<str>>>,
    public_id: RwLock<Option<Arc<str>>>,
    line: AtomicUsize,
    column: AtomicUsize,
}

impl Locator {
    pub(crate) fn new(
        system_id: Option<Arc<str>>,
        public_id: Option<Arc<str>>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            system_id: RwLock::new(system_id),
            public_id: RwLock::new(public_id),
            line: line.into(),
            column: column.into(),
        }
    }

    pub fn system_id(&self) -> Option<Arc<str>> {
        self.system_id.read().unwrap().clone()
    }

    pub fn public_id(&self) -> Option<Arc<str>> {
        self.public_id.read().unwrap().clone()
    }

    pub fn line(&self) -> usize {
        self.line.load(Ordering::Acquire)
    }

    pub fn column(&self) -> usize {
        self.column.load(Ordering::Acquire)
    }

    pub(crate) fn set_system_id(&self, system_id: Option<Arc<str>>) {
        *self.system_id.write().unwrap() = system_id;
    }

    pub(crate) fn set_public_id(&self, public_id: Option<Arc<str>>) {
        *self.public_id.write().unwrap() = public_id;
    }

    pub(crate) fn set_line(&self, line: usize) {
        self.line.store(line, Ordering::Release);
    }

    pub(crate) fn set_column(&self, column: usize) {
        self.column.store(column, Ordering::Release);
    }

    pub(crate) fn update_line(&self, f: impl Fn(usize) -> usize) {
        while self
            .line
            .fetch_update(Ordering::Release, Ordering::Acquire, |line| Some(f(line)))
            .is_err()
        {}
    }

    pub(crate) fn update_column(&self, f: impl Fn(usize) -> usize) {
        while self
            .column
            .fetch_update(Ordering::Release, Ordering::Acquire, |column| {
                Some(f(column))
            })
            .is_err()
        {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_shadowing() {
        let mut namespaces = Namespaces::default();
        namespaces.push("a", "http://example.com/1");
        namespaces.push("a", "http://example.com/2");
        assert_eq!(
            namespaces.get("a").unwrap().namespace_name.as_ref(),
            "http://example.com/2"
        );
        namespaces.pop();
        assert_eq!(
            namespaces.get("a").unwrap().namespace_name.as_ref(),
            "http://example.com/1"
        );
        namespaces.pop();
        assert!(namespaces.get("a").is_none());
    }

    #[test]
    fn predefined_entities_are_always_visible() {
        let entities = EntityMap::default();
        assert!(entities.contains("lt"));
        assert!(entities.contains("quot"));
        assert!(!entities.contains("nbsp"));
    }
}
