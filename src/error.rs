use std::sync::Arc;

use crate::{
    encoding::{DecodeError, EncodeError},
    xpath::{XPathCompileError, XPathError},
};

/// Severity classes of reported errors.
///
/// `NotWellFormed` errors are always fatal. `Invalid` errors are fatal only
/// when DTD validation is enabled; otherwise they are delivered to the error
/// handler and parsing continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XMLErrorLevel {
    NotWellFormed,
    Invalid,
    Warning,
}

impl std::fmt::Display for XMLErrorLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::NotWellFormed => write!(f, "not well-formed"),
            Self::Invalid => write!(f, "invalid"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum XMLError {
    // general errors
    InternalError,
    IOError(Arc<std::io::Error>),
    // character and encoding level errors
    IllEncoded,
    SurrogateSplit,
    DisallowedChar,
    UnsupportedEncoding,
    UnsupportedVersion,
    EncodingMismatch,
    // lexical and structural errors
    UnexpectedToken,
    UnexpectedEof,
    BadPubid,
    BadSystemLiteral,
    // entity errors
    UndefinedEntity,
    UndefinedParameterEntity,
    EntityRecursion,
    ImproperNesting,
    PEContext,
    // attribute and namespace errors
    DuplicateAttribute,
    UndefinedNamespace,
    ReservedNamespace,
    // validity errors
    DuplicateId,
    UnresolvedIdRef,
    UndeclaredAttribute,
    UndeclaredElement,
    UndeclaredNotation,
    UnexpectedElement,
    UnexpectedCharData,
    AttributeValueMismatch,
    RequiredAttributeMissing,
    NdataWithoutNotation,
    StandaloneViolation,
    DuplicateDeclaration,
    MultipleIdAttributes,
    IdAttributeDefault,
    RootElementMismatch,
    // encoding conversion errors
    EncodeError(EncodeError),
    DecodeError(DecodeError),
    // XPath errors
    XPathError(XPathError),
}

impl XMLError {
    /// The severity class this error code belongs to when reported by the
    /// parser without further qualification.
    pub fn level(&self) -> XMLErrorLevel {
        match self {
            Self::DuplicateId
            | Self::UnresolvedIdRef
            | Self::UndeclaredAttribute
            | Self::UndeclaredElement
            | Self::UndeclaredNotation
            | Self::UnexpectedElement
            | Self::UnexpectedCharData
            | Self::AttributeValueMismatch
            | Self::RequiredAttributeMissing
            | Self::NdataWithoutNotation
            | Self::StandaloneViolation
            | Self::DuplicateDeclaration
            | Self::MultipleIdAttributes
            | Self::IdAttributeDefault
            | Self::RootElementMismatch => XMLErrorLevel::Invalid,
            _ => XMLErrorLevel::NotWellFormed,
        }
    }
}

impl std::fmt::Display for XMLError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for XMLError {}

impl From<std::io::Error> for XMLError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(Arc::new(value))
    }
}

impl From<EncodeError> for XMLError {
    fn from(value: EncodeError) -> Self {
        Self::EncodeError(value)
    }
}

impl From<DecodeError> for XMLError {
    fn from(value: DecodeError) -> Self {
        match value {
            DecodeError::UnpairedSurrogate { .. } => Self::SurrogateSplit,
            DecodeError::Malformed { .. } => Self::IllEncoded,
            value => Self::DecodeError(value),
        }
    }
}

impl From<XPathError> for XMLError {
    fn from(value: XPathError) -> Self {
        Self::XPathError(value)
    }
}

impl From<XPathCompileError> for XMLError {
    fn from(value: XPathCompileError) -> Self {
        XPathError::from(value).into()
    }
}
