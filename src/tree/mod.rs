pub mod build;
pub mod write;

pub use build::{EntityLoader, ParseOptions};
pub use write::WriterOptions;

use crate::{
    error::XMLError,
    xpath::{self, XPathNode, XPathObject},
};

/// Index of a node in its [`Document`] arena.
///
/// Node ids are only meaningful together with the document that created
/// them; they stay valid for the life of the document (detached nodes are
/// kept in the arena until the document is dropped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

/// The document type declaration as parsed, kept for serialization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocType {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

/// A namespace declaration owned by an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceData {
    /// `None` for the default namespace.
    pub prefix: Option<String>,
    pub namespace_name: String,
}

/// An attribute owned by an element. Attributes are not part of the child
/// list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeData {
    pub qname: String,
    pub namespace_name: Option<String>,
    pub value: String,
    /// Set when the declared type is `ID` or the name is `xml:id`.
    pub id: bool,
    /// Unset when the value was supplied by an attribute-list default.
    pub specified: bool,
}

impl AttributeData {
    pub fn local_name(&self) -> &str {
        self.qname
            .split_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.qname)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.qname.split_once(':').map(|(prefix, _)| prefix)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementData {
    pub qname: String,
    pub namespace_name: Option<String>,
    pub attributes: Vec<AttributeData>,
    pub namespaces: Vec<NamespaceData>,
}

impl ElementData {
    pub fn local_name(&self) -> &str {
        self.qname
            .split_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.qname)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.qname.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn get_attribute(&self, qname: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|att| att.qname == qname)
            .map(|att| att.value.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The document root: exactly one element child plus any number of
    /// comments and processing instructions.
    Document,
    Element(ElementData),
    Text(String),
    CDATASection(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    kind: NodeKind,
}

/// A parsed XML document: an arena of nodes linked by ids.
///
/// The tree is built by the parser through
/// [`TreeBuildHandler`](crate::tree::build::TreeBuildHandler) or by hand
/// through the `create_*` and `append_child` methods. Reading the tree
/// never requires mutation, so a shared document can be queried from
/// multiple threads.
#[derive(Clone, Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
    pub(crate) version: Option<String>,
    pub(crate) encoding: Option<String>,
    pub(crate) standalone: Option<bool>,
    pub(crate) doctype: Option<DocType>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                parent: None,
                prev_sibling: None,
                next_sibling: None,
                first_child: None,
                last_child: None,
                kind: NodeKind::Document,
            }],
            version: None,
            encoding: None,
            standalone: None,
            doctype: None,
        }
    }

    /// The root node. It is not an element; see [`Self::document_element`].
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single element child of the root.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .find(|&child| matches!(self.kind(child), NodeKind::Element(_)))
    }

    fn node(&self, node: NodeId) -> &NodeData {
        &self.nodes[node.0]
    }

    fn node_mut(&mut self, node: NodeId) -> &mut NodeData {
        &mut self.nodes[node.0]
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.node(node).kind
    }

    pub(crate) fn node_kind_mut(&mut self, node: NodeId) -> &mut NodeKind {
        &mut self.node_mut(node).kind
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).first_child
    }

    pub fn last_child(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).last_child
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).next_sibling
    }

    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).prev_sibling
    }

    pub fn children(&self, node: NodeId) -> Children<'_> {
        Children {
            document: self,
            next: self.first_child(node),
        }
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        match self.kind(node) {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match &mut self.node_mut(node).kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// The qualified name of an element node.
    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|element| element.qname.as_str())
    }

    pub fn get_attribute(&self, node: NodeId, qname: &str) -> Option<&str> {
        self.element(node)?.get_attribute(qname)
    }

    /// Set or replace an attribute.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        qname: impl Into<String>,
        value: impl Into<String>,
    ) {
        let Some(element) = self.element_mut(node) else {
            return;
        };
        let qname = qname.into();
        let value = value.into();
        if let Some(att) = element.attributes.iter_mut().find(|att| att.qname == qname) {
            att.value = value;
        } else {
            let id = qname == "xml:id";
            element.attributes.push(AttributeData {
                qname,
                namespace_name: None,
                value,
                id,
                specified: true,
            });
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, qname: &str) {
        if let Some(element) = self.element_mut(node) {
            element.attributes.retain(|att| att.qname != qname);
        }
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData {
            parent: None,
            prev_sibling: None,
            next_sibling: None,
            first_child: None,
            last_child: None,
            kind,
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn create_element(&mut self, qname: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::Element(ElementData {
            qname: qname.into(),
            ..Default::default()
        }))
    }

    pub fn create_text(&mut self, data: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::Text(data.into()))
    }

    pub fn create_cdata_section(&mut self, data: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::CDATASection(data.into()))
    }

    pub fn create_comment(&mut self, data: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::Comment(data.into()))
    }

    pub fn create_processing_instruction(
        &mut self,
        target: impl Into<String>,
        data: Option<String>,
    ) -> NodeId {
        self.push_node(NodeKind::ProcessingInstruction {
            target: target.into(),
            data,
        })
    }

    /// Append `child` as the last child of `parent`, detaching it from its
    /// previous position first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        let old_last = self.node(parent).last_child;
        {
            let child_node = self.node_mut(child);
            child_node.parent = Some(parent);
            child_node.prev_sibling = old_last;
        }
        if let Some(old_last) = old_last {
            self.node_mut(old_last).next_sibling = Some(child);
        } else {
            self.node_mut(parent).first_child = Some(child);
        }
        self.node_mut(parent).last_child = Some(child);
    }

    /// Unlink `node` from its parent and siblings.
    pub fn detach(&mut self, node: NodeId) {
        let NodeData {
            parent,
            prev_sibling,
            next_sibling,
            ..
        } = *self.node(node);
        {
            let node = self.node_mut(node);
            node.parent = None;
            node.prev_sibling = None;
            node.next_sibling = None;
        }
        if let Some(prev) = prev_sibling {
            self.node_mut(prev).next_sibling = next_sibling;
        } else if let Some(parent) = parent {
            self.node_mut(parent).first_child = next_sibling;
        }
        if let Some(next) = next_sibling {
            self.node_mut(next).prev_sibling = prev_sibling;
        } else if let Some(parent) = parent {
            self.node_mut(parent).last_child = prev_sibling;
        }
    }

    /// The concatenated text of all descendant text and CDATA nodes.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut buffer = String::new();
        self.append_text_content(node, &mut buffer);
        buffer
    }

    fn append_text_content(&self, node: NodeId, buffer: &mut String) {
        match self.kind(node) {
            NodeKind::Text(data) | NodeKind::CDATASection(data) => buffer.push_str(data),
            _ => {
                let mut child = self.first_child(node);
                while let Some(now) = child {
                    self.append_text_content(now, buffer);
                    child = self.next_sibling(now);
                }
            }
        }
    }

    /// Look up the in-scope namespace for `prefix` starting at `node`.
    pub fn lookup_namespace(&self, node: NodeId, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(crate::XML_XML_NAMESPACE);
        }
        let mut current = Some(node);
        while let Some(now) = current {
            if let Some(element) = self.element(now) {
                if let Some(decl) = element
                    .namespaces
                    .iter()
                    .find(|decl| decl.prefix.as_deref() == prefix)
                {
                    if decl.namespace_name.is_empty() {
                        return None;
                    }
                    return Some(&decl.namespace_name);
                }
            }
            current = self.parent(now);
        }
        None
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_version(&mut self, version: Option<&str>) {
        self.version = version.map(str::to_owned);
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn set_encoding(&mut self, encoding: Option<&str>) {
        self.encoding = encoding.map(str::to_owned);
    }

    pub fn standalone(&self) -> Option<bool> {
        self.standalone
    }

    pub fn set_standalone(&mut self, standalone: Option<bool>) {
        self.standalone = standalone;
    }

    pub fn doctype(&self) -> Option<&DocType> {
        self.doctype.as_ref()
    }

    pub fn set_doctype(&mut self, doctype: Option<DocType>) {
        self.doctype = doctype;
    }

    /// All elements matching the XPath expression `path`, in document
    /// order.
    pub fn find(&self, path: &str) -> Result<Vec<NodeId>, XMLError> {
        let nodes = self.find_nodes(path)?;
        Ok(nodes
            .into_iter()
            .filter_map(|node| match node {
                XPathNode::Node(id) if matches!(self.kind(id), NodeKind::Element(_)) => Some(id),
                _ => None,
            })
            .collect())
    }

    /// The first element matching the XPath expression `path`.
    pub fn find_first(&self, path: &str) -> Result<Option<NodeId>, XMLError> {
        Ok(self.find(path)?.into_iter().next())
    }

    /// All nodes matching the XPath expression `path`, in document order.
    pub fn find_nodes(&self, path: &str) -> Result<Vec<XPathNode>, XMLError> {
        let expression = xpath::compile(path).map_err(crate::xpath::XPathError::from)?;
        let object = expression.evaluate(self, XPathNode::Node(self.root()), None)?;
        match object {
            XPathObject::NodeSet(node_set) => Ok(node_set.into_nodes()),
            _ => Ok(vec![]),
        }
    }

    /// The XPath string value of `node`.
    pub fn string_value(&self, node: &XPathNode) -> String {
        match node {
            XPathNode::Node(id) => match self.kind(*id) {
                NodeKind::Document | NodeKind::Element(_) => self.text_content(*id),
                NodeKind::Text(data) | NodeKind::CDATASection(data) => data.clone(),
                NodeKind::Comment(data) => data.clone(),
                NodeKind::ProcessingInstruction { data, .. } => {
                    data.clone().unwrap_or_default()
                }
            },
            XPathNode::Attribute(element, index) => self
                .element(*element)
                .and_then(|element| element.attributes.get(*index))
                .map(|att| att.value.clone())
                .unwrap_or_default(),
            XPathNode::Namespace { uri, .. } => uri.to_string(),
        }
    }

    /// A sort key realizing document order over [`XPathNode`]s.
    ///
    /// Namespace nodes of an element sort before its attributes, which in
    /// turn sort before its children.
    pub(crate) fn order_key(&self, node: &XPathNode) -> (Vec<u32>, u8, usize) {
        let (id, tier, extra) = match node {
            XPathNode::Node(id) => (*id, 0, 0),
            XPathNode::Namespace { element, .. } => (*element, 1, 0),
            XPathNode::Attribute(element, index) => (*element, 2, *index),
        };
        let mut path = vec![];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            let mut index = 0u32;
            let mut prev = self.prev_sibling(current);
            while let Some(now) = prev {
                index += 1;
                prev = self.prev_sibling(now);
            }
            path.push(index);
            current = parent;
        }
        path.reverse();
        (path, tier, extra)
    }

    fn node_equals(&self, a: NodeId, other: &Document, b: NodeId) -> bool {
        match (self.kind(a), other.kind(b)) {
            (NodeKind::Document, NodeKind::Document) => {}
            (NodeKind::Element(left), NodeKind::Element(right)) => {
                if left.qname != right.qname
                    || left.namespace_name != right.namespace_name
                    || left.attributes.len() != right.attributes.len()
                    || left.namespaces.len() != right.namespaces.len()
                {
                    return false;
                }
                // Attribute and namespace order is not significant.
                for att in &left.attributes {
                    if right.get_attribute(&att.qname) != Some(att.value.as_str()) {
                        return false;
                    }
                }
                for decl in &left.namespaces {
                    if !right.namespaces.contains(decl) {
                        return false;
                    }
                }
            }
            // Whitespace at the edges of text nodes is not significant for
            // comparison purposes.
            (NodeKind::Text(left), NodeKind::Text(right)) => {
                if left.trim() != right.trim() {
                    return false;
                }
            }
            (NodeKind::CDATASection(left), NodeKind::CDATASection(right)) => {
                if left != right {
                    return false;
                }
            }
            (NodeKind::Comment(left), NodeKind::Comment(right)) => {
                if left != right {
                    return false;
                }
            }
            (
                NodeKind::ProcessingInstruction { target, data },
                NodeKind::ProcessingInstruction {
                    target: target2,
                    data: data2,
                },
            ) => {
                if target != target2 || data != data2 {
                    return false;
                }
            }
            _ => return false,
        }

        let mut left = self.first_child(a);
        let mut right = other.first_child(b);
        loop {
            match (left, right) {
                (None, None) => return true,
                (Some(l), Some(r)) => {
                    if !self.node_equals(l, other, r) {
                        return false;
                    }
                    left = self.next_sibling(l);
                    right = other.next_sibling(r);
                }
                _ => return false,
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.node_equals(self.root(), other, other.root())
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.write(&WriterOptions::default()))
    }
}

pub struct Children<'a> {
    document: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let now = self.next?;
        self.next = self.document.next_sibling(now);
        Some(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_links_stay_consistent() {
        let mut document = Document::new();
        let root_elem = document.create_element("r");
        document.append_child(document.root(), root_elem);
        let a = document.create_element("a");
        let b = document.create_element("b");
        let c = document.create_element("c");
        document.append_child(root_elem, a);
        document.append_child(root_elem, b);
        document.append_child(root_elem, c);

        assert_eq!(document.children(root_elem).collect::<Vec<_>>(), [a, b, c]);
        assert_eq!(document.prev_sibling(b), Some(a));
        assert_eq!(document.next_sibling(b), Some(c));
        assert_eq!(document.parent(b), Some(root_elem));

        document.detach(b);
        assert_eq!(document.children(root_elem).collect::<Vec<_>>(), [a, c]);
        assert_eq!(document.next_sibling(a), Some(c));
        assert_eq!(document.prev_sibling(c), Some(a));
        assert_eq!(document.parent(b), None);

        document.detach(a);
        document.detach(c);
        assert_eq!(document.first_child(root_elem), None);
        assert_eq!(document.last_child(root_elem), None);
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let mut document = Document::new();
        let root_elem = document.create_element("r");
        document.append_child(document.root(), root_elem);
        let inner = document.create_element("i");
        let t1 = document.create_text("hello ");
        let t2 = document.create_text("world");
        document.append_child(root_elem, t1);
        document.append_child(root_elem, inner);
        document.append_child(inner, t2);
        assert_eq!(document.text_content(root_elem), "hello world");
    }

    #[test]
    fn equality_trims_text_nodes() {
        let mut left = Document::new();
        let r = left.create_element("r");
        left.append_child(left.root(), r);
        let t = left.create_text("  data ");
        left.append_child(r, t);

        let mut right = Document::new();
        let r = right.create_element("r");
        right.append_child(right.root(), r);
        let t = right.create_text("data");
        right.append_child(r, t);

        assert_eq!(left, right);

        let mut different = Document::new();
        let r = different.create_element("r");
        different.append_child(different.root(), r);
        let t = different.create_text("other");
        different.append_child(r, t);
        assert_ne!(left, different);
    }
}
