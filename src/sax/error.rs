use std::{borrow::Cow, sync::Arc};

use crate::error::{XMLError, XMLErrorLevel};

/// An error report with the position at which it was detected.
#[derive(Debug, Clone)]
pub struct SAXParseError {
    pub error: XMLError,
    pub level: XMLErrorLevel,
    pub line: usize,
    pub column: usize,
    pub system_id: Option<Arc<str>>,
    pub message: Cow<'static, str>,
}

impl std::fmt::Display for SAXParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[line:{},column:{}] {}: {}",
            self.system_id.as_deref().unwrap_or("<input>"),
            self.line,
            self.column,
            self.level,
            self.message,
        )
    }
}

impl std::error::Error for SAXParseError {}

macro_rules! generic_error {
    ($method:ident, $reader:expr, $code:expr, $level:expr, $message:literal, $( $args:expr ),+) => {
        $reader.handler.$method($crate::sax::error::SAXParseError {
            error: $code,
            level: $level,
            line: $reader.locator.line(),
            column: $reader.locator.column(),
            system_id: $reader.locator.system_id(),
            message: ::std::borrow::Cow::Owned(format!($message, $( $args ),+)),
        })
    };
    ($method:ident, $reader:expr, $code:expr, $level:expr, $message:literal) => {
        $reader.handler.$method($crate::sax::error::SAXParseError {
            error: $code,
            level: $level,
            line: $reader.locator.line(),
            column: $reader.locator.column(),
            system_id: $reader.locator.system_id(),
            message: ::std::borrow::Cow::Borrowed($message),
        })
    };
}

/// Report a well-formedness violation.
///
/// These are always fatal; the call site is expected to return the error
/// code right after.
macro_rules! fatal_error {
    ($reader:expr, $code:ident, $message:literal, $( $args:expr ),+) => {
        $crate::sax::error::generic_error!(
            fatal_error,
            $reader,
            $crate::error::XMLError::$code,
            $crate::error::XMLErrorLevel::NotWellFormed,
            $message,
            $( $args ),+
        );
        $reader.fatal_error_occurred = true;
    };
    ($reader:expr, $code:ident, $message:literal) => {
        $crate::sax::error::generic_error!(
            fatal_error,
            $reader,
            $crate::error::XMLError::$code,
            $crate::error::XMLErrorLevel::NotWellFormed,
            $message
        );
        $reader.fatal_error_occurred = true;
    };
}

/// Report a validity violation.
///
/// When validation is enabled the violation is fatal and aborts the calling
/// function; otherwise it is delivered through the error handler and
/// parsing continues.
macro_rules! validity_error {
    ($reader:expr, $code:ident, $message:literal, $( $args:expr ),+) => {
        $crate::sax::error::generic_error!(
            error,
            $reader,
            $crate::error::XMLError::$code,
            $crate::error::XMLErrorLevel::Invalid,
            $message,
            $( $args ),+
        );
        if $reader
            .config
            .is_enable($crate::sax::parser::ParserOption::Validation)
        {
            return Err($crate::error::XMLError::$code);
        }
    };
    ($reader:expr, $code:ident, $message:literal) => {
        $crate::sax::error::generic_error!(
            error,
            $reader,
            $crate::error::XMLError::$code,
            $crate::error::XMLErrorLevel::Invalid,
            $message
        );
        if $reader
            .config
            .is_enable($crate::sax::parser::ParserOption::Validation)
        {
            return Err($crate::error::XMLError::$code);
        }
    };
}

/// Report a namespace or other recoverable error without aborting.
macro_rules! ns_error {
    ($reader:expr, $code:ident, $message:literal, $( $args:expr ),+) => {
        $crate::sax::error::generic_error!(
            error,
            $reader,
            $crate::error::XMLError::$code,
            $crate::error::XMLErrorLevel::NotWellFormed,
            $message,
            $( $args ),+
        )
    };
    ($reader:expr, $code:ident, $message:literal) => {
        $crate::sax::error::generic_error!(
            error,
            $reader,
            $crate::error::XMLError::$code,
            $crate::error::XMLErrorLevel::NotWellFormed,
            $message
        )
    };
}

macro_rules! warning {
    ($reader:expr, $code:ident, $message:literal, $( $args:expr ),+) => {
        $crate::sax::error::generic_error!(
            warning,
            $reader,
            $crate::error::XMLError::$code,
            $crate::error::XMLErrorLevel::Warning,
            $message,
            $( $args ),+
        )
    };
    ($reader:expr, $code:ident, $message:literal) => {
        $crate::sax::error::generic_error!(
            warning,
            $reader,
            $crate::error::XMLError::$code,
            $crate::error::XMLErrorLevel::Warning,
            $message
        )
    };
}

pub(crate) use {fatal_error, generic_error, ns_error, validity_error, warning};
