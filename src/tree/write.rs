use std::fmt::Write as _;

use crate::{
    encoding::find_encoder,
    error::XMLError,
    save::{write_escaped_att_value, write_escaped_char_data, write_quoted},
    tree::{Document, NodeId, NodeKind},
};

/// Serialization options.
///
/// The defaults produce the most literal rendition of the tree: no added
/// indentation or wrapping, comments and the doctype preserved, childless
/// elements collapsed to `<tag/>`.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Number of spaces per nesting level when `wrap` is set.
    pub indent: usize,
    /// Put each child element on its own line.
    pub wrap: bool,
    /// Collapse whitespace in #PCDATA content.
    pub trim: bool,
    /// Suppress comments.
    pub no_comment: bool,
    /// Suppress the document type declaration.
    pub no_doctype: bool,
    /// Write childless elements as `<tag/>`.
    pub collapse_empty_elements: bool,
    /// Escape tab/newline/carriage return in attribute values.
    pub escape_whitespace: bool,
    /// Put the XML declaration and each prolog item on its own line.
    pub wrap_prolog: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            indent: 0,
            wrap: false,
            trim: false,
            no_comment: false,
            no_doctype: false,
            collapse_empty_elements: true,
            escape_whitespace: false,
            wrap_prolog: false,
        }
    }
}

impl WriterOptions {
    /// A human-friendly configuration: indented, wrapped, trimmed.
    pub fn pretty() -> Self {
        Self {
            indent: 2,
            wrap: true,
            trim: true,
            wrap_prolog: true,
            ..Self::default()
        }
    }
}

impl Document {
    /// Serialize the document to a string.
    pub fn write(&self, options: &WriterOptions) -> String {
        let mut out = String::new();
        self.write_prolog(options, &mut out);
        for child in self.children(self.root()) {
            self.write_node(child, options, 0, &mut out);
        }
        if (options.wrap_prolog || options.wrap) && !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    /// Serialize to `writer`, encoding with `encoding` (UTF-8 when `None`).
    ///
    /// The encoding written into the XML declaration follows the chosen
    /// output encoding.
    pub fn write_to(
        &self,
        writer: &mut impl std::io::Write,
        options: &WriterOptions,
        encoding: Option<&str>,
    ) -> Result<(), XMLError> {
        let mut encoder = match encoding {
            Some(name) => find_encoder(name).ok_or(XMLError::UnsupportedEncoding)?,
            None => find_encoder(crate::encoding::UTF8_NAME).unwrap(),
        };

        let text = if encoding.is_some() && encoding != self.encoding() {
            let mut copy = self.clone();
            copy.set_encoding(Some(encoder.name()));
            copy.write(options)
        } else {
            self.write(options)
        };

        let mut bytes = Vec::with_capacity(text.len());
        let mut read = 0;
        while read < text.len() {
            let (r, _) = encoder.encode(&text[read..], &mut bytes, true)?;
            if r == 0 {
                return Err(XMLError::InternalError);
            }
            read += r;
        }
        writer.write_all(&bytes)?;
        Ok(())
    }

    fn write_prolog(&self, options: &WriterOptions, out: &mut String) {
        if self.version().is_some() || self.encoding().is_some() || self.standalone().is_some() {
            write!(out, "<?xml version=\"{}\"", self.version().unwrap_or("1.0")).unwrap();
            if let Some(encoding) = self.encoding() {
                write!(out, " encoding=\"{encoding}\"").unwrap();
            }
            if let Some(standalone) = self.standalone() {
                write!(
                    out,
                    " standalone=\"{}\"",
                    if standalone { "yes" } else { "no" }
                )
                .unwrap();
            }
            out.push_str("?>");
            if options.wrap_prolog {
                out.push('\n');
            }
        }

        if options.no_doctype {
            return;
        }
        if let Some(doctype) = self.doctype() {
            write!(out, "<!DOCTYPE {}", doctype.name).unwrap();
            match (doctype.public_id.as_deref(), doctype.system_id.as_deref()) {
                (Some(public_id), Some(system_id)) => {
                    out.push_str(" PUBLIC ");
                    write_quoted(out, public_id).unwrap();
                    out.push(' ');
                    write_quoted(out, system_id).unwrap();
                }
                (Some(public_id), None) => {
                    out.push_str(" PUBLIC ");
                    write_quoted(out, public_id).unwrap();
                }
                (None, Some(system_id)) => {
                    out.push_str(" SYSTEM ");
                    write_quoted(out, system_id).unwrap();
                }
                (None, None) => {}
            }
            out.push('>');
            if options.wrap_prolog {
                out.push('\n');
            }
        }
    }

    fn write_node(&self, node: NodeId, options: &WriterOptions, depth: usize, out: &mut String) {
        match self.kind(node) {
            NodeKind::Document => {
                for child in self.children(node) {
                    self.write_node(child, options, depth, out);
                }
            }
            NodeKind::Element(element) => {
                if options.wrap && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                if options.wrap {
                    for _ in 0..depth * options.indent {
                        out.push(' ');
                    }
                }
                out.push('<');
                out.push_str(&element.qname);
                for decl in &element.namespaces {
                    match decl.prefix.as_deref() {
                        Some(prefix) => write!(out, " xmlns:{prefix}=").unwrap(),
                        None => out.push_str(" xmlns="),
                    }
                    write_escaped_att_value(out, &decl.namespace_name, false).unwrap();
                }
                for att in &element.attributes {
                    out.push(' ');
                    out.push_str(&att.qname);
                    out.push('=');
                    write_escaped_att_value(out, &att.value, options.escape_whitespace).unwrap();
                }

                if self.first_child(node).is_none() && options.collapse_empty_elements {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    let mut wrapped_children = false;
                    for child in self.children(node) {
                        if options.wrap && matches!(self.kind(child), NodeKind::Element(_)) {
                            wrapped_children = true;
                        }
                        self.write_node(child, options, depth + 1, out);
                    }
                    if options.wrap && wrapped_children {
                        if !out.ends_with('\n') {
                            out.push('\n');
                        }
                        for _ in 0..depth * options.indent {
                            out.push(' ');
                        }
                    }
                    out.push_str("</");
                    out.push_str(&element.qname);
                    out.push('>');
                }
            }
            NodeKind::Text(data) => {
                if options.trim {
                    let mut collapsed = String::with_capacity(data.len());
                    for (i, token) in data.split_whitespace().enumerate() {
                        if i > 0 {
                            collapsed.push(' ');
                        }
                        collapsed.push_str(token);
                    }
                    write_escaped_char_data(out, &collapsed).unwrap();
                } else {
                    write_escaped_char_data(out, data).unwrap();
                }
            }
            NodeKind::CDATASection(data) => {
                out.push_str("<![CDATA[");
                out.push_str(data);
                out.push_str("]]>");
            }
            NodeKind::Comment(data) => {
                if !options.no_comment {
                    if options.wrap && !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    if options.wrap {
                        for _ in 0..depth * options.indent {
                            out.push(' ');
                        }
                    }
                    out.push_str("<!--");
                    out.push_str(data);
                    out.push_str("-->");
                }
            }
            NodeKind::ProcessingInstruction { target, data } => {
                out.push_str("<?");
                out.push_str(target);
                if let Some(data) = data {
                    out.push(' ');
                    out.push_str(data);
                }
                out.push_str("?>");
            }
        }
    }
}
