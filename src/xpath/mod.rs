mod compile;
mod function;
mod ops;
mod step;

use std::{collections::HashMap, sync::Arc};

pub use compile::compile;

use crate::{
    XML_NS_NAMESPACE, XML_XML_NAMESPACE,
    tree::{Document, NodeId, NodeKind},
    xpath::{function::find_function, step::location_step},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XPathError {
    IncorrectOperandType,
    IncorrectNumberOfArgument,
    IncorrectArgumentType,
    WrongTypeConversion,
    UnresolvableFunctionName,
    UnresolvableVariableName,
    CompileError(XPathCompileError),
    InternalError,
}

impl From<XPathCompileError> for XPathError {
    fn from(value: XPathCompileError) -> Self {
        XPathError::CompileError(value)
    }
}

impl std::fmt::Display for XPathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for XPathError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XPathCompileError {
    ExpressionNotTerminated,
    InvalidAbsoluteLocationPath,
    InvalidNodeTest,
    InvalidPredicate,
    InvalidFunctionCall,
    InvalidFunctionName,
    InvalidPrimaryExpr,
    InvalidLiteral,
    InvalidNumber,
    InvalidVariableReference,
    InvalidNCName,
    InvalidQName,
}

impl std::fmt::Display for XPathCompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for XPathCompileError {}

/// A node as seen by the XPath data model.
///
/// Attributes and namespace declarations are not arena nodes of their own,
/// so they are addressed through their owner element here.
#[derive(Debug, Clone, PartialEq)]
pub enum XPathNode {
    Node(NodeId),
    /// `(owner element, attribute index)`
    Attribute(NodeId, usize),
    Namespace {
        element: NodeId,
        prefix: Option<Box<str>>,
        uri: Box<str>,
    },
}

impl From<NodeId> for XPathNode {
    fn from(value: NodeId) -> Self {
        XPathNode::Node(value)
    }
}

/// The result of evaluating an XPath expression.
#[derive(Debug, Clone)]
pub enum XPathObject {
    Number(f64),
    String(Box<str>),
    Boolean(bool),
    NodeSet(XPathNodeSet),
}

impl XPathObject {
    pub fn cast_to_number(self, document: &Document) -> Self {
        match self {
            XPathObject::Number(number) => XPathObject::Number(number),
            XPathObject::Boolean(boolean) => XPathObject::Number(boolean as u8 as f64),
            XPathObject::String(string) => {
                XPathObject::Number(string.trim().parse::<f64>().unwrap_or(f64::NAN))
            }
            node_set @ XPathObject::NodeSet(_) => {
                node_set.cast_to_string(document).cast_to_number(document)
            }
        }
    }

    pub fn cast_to_string(self, document: &Document) -> Self {
        match self {
            XPathObject::Number(number) => {
                if number.is_nan() {
                    XPathObject::String("NaN".into())
                } else if number == 0.0 {
                    XPathObject::String("0".into())
                } else if number == f64::INFINITY {
                    XPathObject::String("Infinity".into())
                } else if number == f64::NEG_INFINITY {
                    XPathObject::String("-Infinity".into())
                } else {
                    XPathObject::String(number.to_string().into())
                }
            }
            XPathObject::Boolean(boolean) => XPathObject::String(boolean.to_string().into()),
            XPathObject::String(string) => XPathObject::String(string),
            XPathObject::NodeSet(node_set) => XPathObject::String(
                node_set
                    .first()
                    .map(|node| document.string_value(node))
                    .unwrap_or_default()
                    .into(),
            ),
        }
    }

    pub fn cast_to_boolean(self) -> Self {
        match self {
            XPathObject::Number(number) => {
                XPathObject::Boolean(number != 0.0 && !number.is_nan())
            }
            XPathObject::Boolean(boolean) => XPathObject::Boolean(boolean),
            XPathObject::String(string) => XPathObject::Boolean(!string.is_empty()),
            XPathObject::NodeSet(node_set) => XPathObject::Boolean(!node_set.is_empty()),
        }
    }

    pub fn as_number(self, document: &Document) -> f64 {
        match self.cast_to_number(document) {
            XPathObject::Number(number) => number,
            _ => unreachable!(),
        }
    }

    pub fn as_string(self, document: &Document) -> Box<str> {
        match self.cast_to_string(document) {
            XPathObject::String(string) => string,
            _ => unreachable!(),
        }
    }

    pub fn as_boolean(self) -> bool {
        match self.cast_to_boolean() {
            XPathObject::Boolean(boolean) => boolean,
            _ => unreachable!(),
        }
    }

    pub fn as_nodeset(self) -> Result<XPathNodeSet, XPathError> {
        if let XPathObject::NodeSet(node_set) = self {
            Ok(node_set)
        } else {
            Err(XPathError::WrongTypeConversion)
        }
    }
}

macro_rules! impl_number_to_xpath_object {
    ( $( $t:ty ),* ) => {
        $(
            impl From<$t> for XPathObject {
                fn from(value: $t) -> Self {
                    XPathObject::Number(value as f64)
                }
            }
        )*
    };
}
impl_number_to_xpath_object!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64
);

macro_rules! impl_string_to_xpath_object {
    ( $( $t:ty ),* ) => {
        $(
            impl From<$t> for XPathObject {
                fn from(value: $t) -> Self {
                    let s: &str = value.as_ref();
                    XPathObject::String(s.into())
                }
            }
        )*
    };
}
impl_string_to_xpath_object!(&str, String, Box<str>, Arc<str>, std::borrow::Cow<'_, str>);

impl From<bool> for XPathObject {
    fn from(value: bool) -> Self {
        XPathObject::Boolean(value)
    }
}

impl From<XPathNodeSet> for XPathObject {
    fn from(value: XPathNodeSet) -> Self {
        XPathObject::NodeSet(value)
    }
}

/// An unordered collection of distinct nodes, converted to document order
/// on return.
#[derive(Debug, Clone, Default)]
pub struct XPathNodeSet {
    nodes: Vec<XPathNode>,
}

impl XPathNodeSet {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, XPathNode> {
        self.nodes.iter()
    }

    pub fn first(&self) -> Option<&XPathNode> {
        self.nodes.first()
    }

    pub fn contains(&self, node: &XPathNode) -> bool {
        self.nodes.contains(node)
    }

    pub fn into_nodes(self) -> Vec<XPathNode> {
        self.nodes
    }

    pub(crate) fn push(&mut self, node: XPathNode) {
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
    }

    pub(crate) fn sort(&mut self, document: &Document) {
        self.nodes.sort_by_key(|node| document.order_key(node));
    }

    pub(crate) fn reverse_sort(&mut self, document: &Document) {
        self.sort(document);
        self.nodes.reverse();
    }

    pub fn union(&self, other: &Self, document: &Document) -> Self {
        let mut ret = self.clone();
        for node in other.iter() {
            ret.push(node.clone());
        }
        ret.sort(document);
        ret
    }
}

impl<'a> IntoIterator for &'a XPathNodeSet {
    type Item = &'a XPathNode;
    type IntoIter = std::slice::Iter<'a, XPathNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Named variable bindings for evaluation.
///
/// The public setters cover numbers and strings; node-set values circulate
/// internally.
#[derive(Default)]
pub struct Context {
    variables: HashMap<String, XPathObject>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_double(&mut self, name: impl Into<String>, value: f64) {
        self.variables.insert(name.into(), XPathObject::Number(value));
    }

    pub fn get_double(&self, name: &str) -> Option<f64> {
        match self.variables.get(name) {
            Some(XPathObject::Number(number)) => Some(*number),
            _ => None,
        }
    }

    pub fn set_string(&mut self, name: impl Into<String>, value: impl Into<Box<str>>) {
        self.variables
            .insert(name.into(), XPathObject::String(value.into()));
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.variables.get(name) {
            Some(XPathObject::String(string)) => Some(string),
            _ => None,
        }
    }

    /// Bind any [`XPathObject`], including node-sets.
    pub fn set_object(&mut self, name: impl Into<String>, value: XPathObject) {
        self.variables.insert(name.into(), value);
    }

    fn get(&self, name: &str) -> Result<XPathObject, XPathError> {
        self.variables
            .get(name)
            .cloned()
            .ok_or(XPathError::UnresolvableVariableName)
    }
}

pub(crate) struct NamespaceSet {
    // (prefix, namespace name)
    prefix_map: HashMap<&'static str, &'static str>,
}

impl NamespaceSet {
    pub(crate) fn get_namespace_name(&self, prefix: Option<&str>) -> Option<&str> {
        self.prefix_map.get(prefix.unwrap_or("")).copied()
    }
}

impl Default for NamespaceSet {
    fn default() -> Self {
        Self {
            prefix_map: HashMap::from([
                ("xml", XML_XML_NAMESPACE),
                ("xmlns", XML_NS_NAMESPACE),
            ]),
        }
    }
}

/// Evaluation state: the context node, position and size, plus the operand
/// stack of the tree-walking evaluator.
pub(crate) struct EvalContext<'a> {
    pub(crate) document: &'a Document,
    pub(crate) node: Option<XPathNode>,
    pub(crate) position: usize,
    pub(crate) size: usize,
    pub(crate) variables: Option<&'a Context>,
    pub(crate) namespaces: NamespaceSet,
    pub(crate) stack: Vec<XPathObject>,
}

impl EvalContext<'_> {
    pub(crate) fn push_object(&mut self, object: XPathObject) {
        self.stack.push(object);
    }

    pub(crate) fn pop_object(&mut self) -> Result<XPathObject, XPathError> {
        self.stack.pop().ok_or(XPathError::InternalError)
    }
}

/// A compiled XPath 1.0 expression.
///
/// Evaluation never mutates the expression or the document, so a compiled
/// expression can be shared and evaluated concurrently.
pub struct XPathExpression {
    root: usize,
    tree: Vec<XPathSyntaxTree>,
}

impl XPathExpression {
    /// Evaluate with `node` as the initial context node.
    pub fn evaluate(
        &self,
        document: &Document,
        node: impl Into<XPathNode>,
        variables: Option<&Context>,
    ) -> Result<XPathObject, XPathError> {
        let mut context = EvalContext {
            document,
            node: Some(node.into()),
            position: 1,
            size: 1,
            variables,
            namespaces: NamespaceSet::default(),
            stack: vec![],
        };
        self.do_evaluate(&mut context, self.root)?;
        if context.stack.len() != 1 {
            return Err(XPathError::InternalError);
        }
        context.pop_object()
    }

    /// Evaluate and return the matching nodes in document order.
    pub fn evaluate_nodes(
        &self,
        document: &Document,
        node: impl Into<XPathNode>,
        variables: Option<&Context>,
    ) -> Result<Vec<XPathNode>, XPathError> {
        Ok(self
            .evaluate(document, node, variables)?
            .as_nodeset()?
            .into_nodes())
    }

    /// Returns `true` if `node` is among the nodes selected by this
    /// expression evaluated from the document root.
    pub fn matches(&self, document: &Document, node: &XPathNode) -> Result<bool, XPathError> {
        let result = self.evaluate(document, XPathNode::Node(document.root()), None)?;
        match result {
            XPathObject::NodeSet(node_set) => Ok(node_set.contains(node)),
            _ => Ok(false),
        }
    }

    fn do_evaluate(&self, context: &mut EvalContext<'_>, op: usize) -> Result<(), XPathError> {
        let document = context.document;
        match &self.tree[op] {
            XPathSyntaxTree::Union(left, right) => {
                self.do_evaluate(context, *left)?;
                self.do_evaluate(context, *right)?;
                let right = context.pop_object()?.as_nodeset()?;
                let left = context.pop_object()?.as_nodeset()?;
                context.push_object(left.union(&right, document).into());
            }
            XPathSyntaxTree::Slash(left, right) => {
                self.do_evaluate(context, *left)?;
                self.do_evaluate(context, *right)?;
            }
            XPathSyntaxTree::LocationPathRoot => {
                let mut node_set = XPathNodeSet::default();
                node_set.push(XPathNode::Node(document.root()));
                context.push_object(node_set.into());
            }
            XPathSyntaxTree::Step {
                first,
                axis,
                node_test,
                predicate,
            } => {
                let current_node_set = if !*first {
                    context
                        .pop_object()?
                        .as_nodeset()
                        .map_err(|_| XPathError::IncorrectOperandType)?
                } else {
                    let mut node_set = XPathNodeSet::default();
                    node_set.push(context.node.clone().ok_or(XPathError::InternalError)?);
                    node_set
                };

                let old_context_node = context.node.take();
                let old_context_position = context.position;
                let old_context_size = context.size;

                context.size = current_node_set.len();
                let mut new_node_set = XPathNodeSet::default();
                for (i, node) in current_node_set.iter().enumerate() {
                    context.position = i + 1;
                    context.node = Some(node.clone());
                    if *predicate < usize::MAX {
                        let mut node_set = XPathNodeSet::default();
                        location_step(context, *axis, node_test, &mut node_set);
                        if axis.is_reverse() {
                            node_set.reverse_sort(document);
                        } else {
                            node_set.sort(document);
                        }
                        context.push_object(node_set.into());
                        self.do_evaluate(context, *predicate)?;
                        let node_set = context.pop_object()?.as_nodeset()?;
                        for node in &node_set {
                            new_node_set.push(node.clone());
                        }
                    } else {
                        location_step(context, *axis, node_test, &mut new_node_set);
                    }
                }

                context.node = old_context_node;
                context.position = old_context_position;
                context.size = old_context_size;

                new_node_set.sort(document);
                context.push_object(new_node_set.into());
            }
            XPathSyntaxTree::Predicate { expression, next } => {
                let XPathObject::NodeSet(node_set) = context.pop_object()? else {
                    return Err(XPathError::IncorrectOperandType);
                };

                let old_context_node = context.node.take();
                let old_context_position = context.position;
                let old_context_size = context.size;
                context.size = node_set.len();
                let mut new = XPathNodeSet::default();
                for (i, node) in node_set.iter().enumerate() {
                    context.position = i + 1;
                    context.node = Some(node.clone());
                    self.do_evaluate(context, *expression)?;
                    let keep = match context.pop_object()? {
                        XPathObject::Number(number) => number == (i + 1) as f64,
                        object => object.as_boolean(),
                    };
                    if keep {
                        new.push(node.clone());
                    }
                }

                context.node = old_context_node;
                context.position = old_context_position;
                context.size = old_context_size;
                let is_empty = new.is_empty();
                context.push_object(new.into());

                if !is_empty && *next < usize::MAX {
                    self.do_evaluate(context, *next)?;
                }
            }
            XPathSyntaxTree::FilterExpr {
                expression,
                predicate,
            } => {
                self.do_evaluate(context, *expression)?;
                let XPathObject::NodeSet(mut node_set) = context.pop_object()? else {
                    return Err(XPathError::IncorrectOperandType);
                };
                // Predicates on filter expressions apply with respect to
                // the child axis, i.e. in document order.
                node_set.sort(document);

                let old_context_node = context.node.take();
                let old_context_position = context.position;
                let old_context_size = context.size;
                context.size = node_set.len();
                let mut new = XPathNodeSet::default();
                for (i, node) in node_set.iter().enumerate() {
                    context.position = i + 1;
                    context.node = Some(node.clone());
                    self.do_evaluate(context, *predicate)?;
                    let keep = match context.pop_object()? {
                        XPathObject::Number(number) => number == (i + 1) as f64,
                        object => object.as_boolean(),
                    };
                    if keep {
                        new.push(node.clone());
                    }
                }

                context.node = old_context_node;
                context.position = old_context_position;
                context.size = old_context_size;
                context.push_object(new.into());
            }
            XPathSyntaxTree::FunctionCall { name, arguments } => {
                let func = find_function(name)?;
                for &arg in arguments {
                    self.do_evaluate(context, arg)?;
                }
                let object = func(context, arguments.len())?;
                context.push_object(object);
            }
            XPathSyntaxTree::Equal(left, right) => {
                self.binop(context, *left, *right, ops::eq)?;
            }
            XPathSyntaxTree::NotEqual(left, right) => {
                self.binop(context, *left, *right, ops::ne)?;
            }
            XPathSyntaxTree::Less(left, right) => {
                self.binop(context, *left, *right, ops::lt)?;
            }
            XPathSyntaxTree::LessOrEqual(left, right) => {
                self.binop(context, *left, *right, ops::le)?;
            }
            XPathSyntaxTree::Greater(left, right) => {
                self.binop(context, *left, *right, ops::gt)?;
            }
            XPathSyntaxTree::GreaterOrEqual(left, right) => {
                self.binop(context, *left, *right, ops::ge)?;
            }
            XPathSyntaxTree::And(left, right) => {
                self.do_evaluate(context, *left)?;
                let mut ret = context.pop_object()?.as_boolean();
                if ret {
                    self.do_evaluate(context, *right)?;
                    ret &= context.pop_object()?.as_boolean();
                }
                context.push_object(ret.into());
            }
            XPathSyntaxTree::Or(left, right) => {
                self.do_evaluate(context, *left)?;
                let mut ret = context.pop_object()?.as_boolean();
                if !ret {
                    self.do_evaluate(context, *right)?;
                    ret |= context.pop_object()?.as_boolean();
                }
                context.push_object(ret.into());
            }
            XPathSyntaxTree::Addition(left, right) => {
                self.binop(context, *left, *right, ops::add)?;
            }
            XPathSyntaxTree::Subtraction(left, right) => {
                self.binop(context, *left, *right, ops::sub)?;
            }
            XPathSyntaxTree::Multiplication(left, right) => {
                self.binop(context, *left, *right, ops::mul)?;
            }
            XPathSyntaxTree::Division(left, right) => {
                self.binop(context, *left, *right, ops::div)?;
            }
            XPathSyntaxTree::Remainder(left, right) => {
                self.binop(context, *left, *right, ops::rem)?;
            }
            XPathSyntaxTree::Negation(expr) => {
                self.do_evaluate(context, *expr)?;
                let value = context.pop_object()?.as_number(document);
                context.push_object((-value).into());
            }
            XPathSyntaxTree::Literal(literal) => {
                context.push_object(literal.clone().into());
            }
            XPathSyntaxTree::Number(number) => {
                let number = number
                    .parse::<f64>()
                    .map_err(|_| XPathError::WrongTypeConversion)?;
                context.push_object(number.into());
            }
            XPathSyntaxTree::VariableReference(reference) => {
                let object = context
                    .variables
                    .ok_or(XPathError::UnresolvableVariableName)?
                    .get(reference)?;
                context.push_object(object);
            }
        }
        Ok(())
    }

    fn binop(
        &self,
        context: &mut EvalContext<'_>,
        left: usize,
        right: usize,
        op: fn(&Document, XPathObject, XPathObject) -> Result<XPathObject, XPathError>,
    ) -> Result<(), XPathError> {
        self.do_evaluate(context, left)?;
        self.do_evaluate(context, right)?;
        let right_value = context.pop_object()?;
        let left_value = context.pop_object()?;
        let result = op(context.document, left_value, right_value)?;
        context.push_object(result);
        Ok(())
    }
}

/// Compile and evaluate `xpath` with `document`'s root as the context node.
pub fn evaluate(xpath: &str, document: &Document) -> Result<XPathObject, XPathError> {
    compile(xpath)?.evaluate(document, XPathNode::Node(document.root()), None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    SelfNode,
}

impl Axis {
    /// Reverse axes enumerate away from the document start; their
    /// positions count backwards.
    fn is_reverse(&self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }
}

/// The principal node type of an axis: the node kind selected by `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrincipalNodeType {
    Element,
    Attribute,
    Namespace,
}

#[derive(Debug)]
pub(crate) enum NodeTest {
    Any,
    AnyLocalName(Box<str>),
    QName(Box<str>),
    Comment,
    Text,
    ProcessingInstruction(Option<Box<str>>),
    Node,
}

impl NodeTest {
    pub(crate) fn match_node(
        &self,
        document: &Document,
        node: &XPathNode,
        principal: PrincipalNodeType,
        namespaces: &NamespaceSet,
    ) -> bool {
        match node {
            XPathNode::Node(id) => match document.kind(*id) {
                NodeKind::Document => matches!(self, NodeTest::Node),
                NodeKind::Element(element) => match self {
                    NodeTest::Any => principal == PrincipalNodeType::Element,
                    NodeTest::Node => true,
                    NodeTest::AnyLocalName(prefix) => match_prefix_wildcard(
                        document,
                        *id,
                        prefix,
                        element.namespace_name.as_deref(),
                        namespaces,
                    ),
                    NodeTest::QName(qname) => {
                        self.match_expanded_name(
                            document,
                            *id,
                            qname,
                            element.namespace_name.as_deref(),
                            element.qname.as_str(),
                            element.local_name(),
                            namespaces,
                        )
                    }
                    _ => false,
                },
                NodeKind::ProcessingInstruction { target, .. } => match self {
                    NodeTest::Node => true,
                    NodeTest::ProcessingInstruction(literal) => literal
                        .as_deref()
                        .is_none_or(|literal| literal == target.as_str()),
                    NodeTest::QName(name) | NodeTest::AnyLocalName(name) => {
                        name.as_ref() == target.as_str()
                    }
                    _ => false,
                },
                NodeKind::Comment(_) => matches!(self, NodeTest::Comment | NodeTest::Node),
                NodeKind::Text(_) | NodeKind::CDATASection(_) => {
                    matches!(self, NodeTest::Text | NodeTest::Node)
                }
            },
            XPathNode::Attribute(element, index) => {
                let Some(att) = document
                    .element(*element)
                    .and_then(|data| data.attributes.get(*index))
                else {
                    return false;
                };
                match self {
                    NodeTest::Any => principal == PrincipalNodeType::Attribute,
                    NodeTest::Node => true,
                    NodeTest::AnyLocalName(prefix) => match_prefix_wildcard(
                        document,
                        *element,
                        prefix,
                        att.namespace_name.as_deref(),
                        namespaces,
                    ),
                    NodeTest::QName(qname) => self.match_expanded_name(
                        document,
                        *element,
                        qname,
                        att.namespace_name.as_deref(),
                        att.qname.as_str(),
                        att.local_name(),
                        namespaces,
                    ),
                    _ => false,
                }
            }
            XPathNode::Namespace { prefix, .. } => match self {
                NodeTest::Any => principal == PrincipalNodeType::Namespace,
                NodeTest::Node => true,
                NodeTest::QName(name) | NodeTest::AnyLocalName(name) => {
                    name.as_ref() == prefix.as_deref().unwrap_or_default()
                }
                _ => false,
            },
        }
    }

    /// Match a (possibly prefixed) QName test against a node with the
    /// expanded name `(namespace_name, local_name)`.
    #[allow(clippy::too_many_arguments)]
    fn match_expanded_name(
        &self,
        document: &Document,
        scope: NodeId,
        test: &str,
        namespace_name: Option<&str>,
        qname: &str,
        local_name: &str,
        namespaces: &NamespaceSet,
    ) -> bool {
        if let Some((test_prefix, test_local)) = test.split_once(':') {
            let bound = document
                .lookup_namespace(scope, Some(test_prefix))
                .or_else(|| namespaces.get_namespace_name(Some(test_prefix)));
            bound.is_some_and(|bound| {
                namespace_name == Some(bound) && test_local == local_name
            })
        } else {
            test == qname && namespace_name.is_none()
        }
    }
}

/// `prefix:*` — any local name within the namespace bound to `prefix`.
fn match_prefix_wildcard(
    document: &Document,
    scope: NodeId,
    prefix: &str,
    namespace_name: Option<&str>,
    namespaces: &NamespaceSet,
) -> bool {
    document
        .lookup_namespace(scope, Some(prefix))
        .or_else(|| namespaces.get_namespace_name(Some(prefix)))
        .is_some_and(|bound| namespace_name == Some(bound))
}

#[derive(Debug)]
pub(crate) enum XPathSyntaxTree {
    Union(usize, usize),
    Slash(usize, usize),
    LocationPathRoot,
    Step {
        first: bool,
        axis: Axis,
        node_test: NodeTest,
        predicate: usize,
    },
    Predicate {
        expression: usize,
        next: usize,
    },
    FilterExpr {
        expression: usize,
        predicate: usize,
    },
    FunctionCall {
        name: Box<str>,
        arguments: Vec<usize>,
    },
    Equal(usize, usize),
    NotEqual(usize, usize),
    Less(usize, usize),
    LessOrEqual(usize, usize),
    Greater(usize, usize),
    GreaterOrEqual(usize, usize),
    And(usize, usize),
    Or(usize, usize),
    Addition(usize, usize),
    Subtraction(usize, usize),
    Multiplication(usize, usize),
    Division(usize, usize),
    Remainder(usize, usize),
    Negation(usize),
    Literal(Box<str>),
    Number(Box<str>),
    VariableReference(Box<str>),
}
