use crate::{
    XML_XML_NAMESPACE,
    tree::{NodeId, NodeKind},
    xpath::{Axis, EvalContext, NodeTest, PrincipalNodeType, XPathNode, XPathNodeSet},
};

/// Evaluate one location step: collect every node reachable from the
/// context node along `axis` that passes `node_test`.
pub(super) fn location_step(
    context: &EvalContext<'_>,
    axis: Axis,
    node_test: &NodeTest,
    node_set: &mut XPathNodeSet,
) {
    let Some(context_node) = context.node.clone() else {
        return;
    };
    let document = context.document;
    let principal = match axis {
        Axis::Attribute => PrincipalNodeType::Attribute,
        Axis::Namespace => PrincipalNodeType::Namespace,
        _ => PrincipalNodeType::Element,
    };
    let matches = |node: &XPathNode, node_set: &mut XPathNodeSet| {
        if node_test.match_node(document, node, principal, &context.namespaces) {
            node_set.push(node.clone());
        }
    };

    match axis {
        Axis::Ancestor | Axis::AncestorOrSelf => {
            if axis == Axis::AncestorOrSelf {
                matches(&context_node, node_set);
            }
            let mut parent = parent_of(context, &context_node);
            while let Some(now) = parent {
                parent = parent_of(context, &now);
                matches(&now, node_set);
            }
        }
        Axis::Attribute => {
            if let XPathNode::Node(id) = context_node {
                if let Some(element) = document.element(id) {
                    for index in 0..element.attributes.len() {
                        matches(&XPathNode::Attribute(id, index), node_set);
                    }
                }
            }
        }
        Axis::Child => {
            if let XPathNode::Node(id) = context_node {
                for child in document.children(id) {
                    matches(&XPathNode::Node(child), node_set);
                }
            }
        }
        Axis::Descendant | Axis::DescendantOrSelf => {
            if axis == Axis::DescendantOrSelf {
                matches(&context_node, node_set);
            }
            if let XPathNode::Node(id) = context_node {
                descend(context, id, node_set, &matches);
            }
        }
        Axis::Following => {
            // For attributes and namespace nodes, the following axis
            // contains everything after their owner element's start.
            let start = match &context_node {
                XPathNode::Node(id) => Some(*id),
                XPathNode::Attribute(element, _) | XPathNode::Namespace { element, .. } => {
                    for child in document.children(*element) {
                        matches(&XPathNode::Node(child), node_set);
                        descend(context, child, node_set, &matches);
                    }
                    Some(*element)
                }
            };
            let mut current = start;
            while let Some(now) = current {
                if let Some(next) = document.next_sibling(now) {
                    matches(&XPathNode::Node(next), node_set);
                    descend(context, next, node_set, &matches);
                    current = Some(next);
                } else {
                    current = document.parent(now);
                }
            }
        }
        Axis::FollowingSibling => {
            if let XPathNode::Node(id) = context_node {
                let mut sibling = document.next_sibling(id);
                while let Some(now) = sibling {
                    sibling = document.next_sibling(now);
                    matches(&XPathNode::Node(now), node_set);
                }
            }
        }
        Axis::Namespace => {
            let XPathNode::Node(id) = context_node else {
                return;
            };
            if !matches!(document.kind(id), NodeKind::Element(_)) {
                return;
            }
            let mut seen = vec![];
            let mut current = Some(id);
            while let Some(now) = current {
                if let Some(element) = document.element(now) {
                    for decl in &element.namespaces {
                        if seen.contains(&decl.prefix) {
                            continue;
                        }
                        seen.push(decl.prefix.clone());
                        if decl.namespace_name.is_empty() {
                            // An empty namespace name undeclares the prefix.
                            continue;
                        }
                        matches(
                            &XPathNode::Namespace {
                                element: id,
                                prefix: decl.prefix.clone().map(String::into_boxed_str),
                                uri: decl.namespace_name.clone().into_boxed_str(),
                            },
                            node_set,
                        );
                    }
                }
                current = document.parent(now);
            }
            if !seen.contains(&Some("xml".to_owned())) {
                matches(
                    &XPathNode::Namespace {
                        element: id,
                        prefix: Some("xml".into()),
                        uri: XML_XML_NAMESPACE.into(),
                    },
                    node_set,
                );
            }
        }
        Axis::Parent => {
            if let Some(parent) = parent_of(context, &context_node) {
                matches(&parent, node_set);
            }
        }
        Axis::Preceding => {
            // Everything before the context node in document order,
            // excluding ancestors.
            let start = match &context_node {
                XPathNode::Node(id) => *id,
                XPathNode::Attribute(element, _) | XPathNode::Namespace { element, .. } => {
                    *element
                }
            };
            let mut current = Some(start);
            while let Some(now) = current {
                if let Some(prev) = document.prev_sibling(now) {
                    preceding_subtree(context, prev, node_set, &matches);
                    current = Some(prev);
                } else {
                    current = document.parent(now);
                }
            }
        }
        Axis::PrecedingSibling => {
            if let XPathNode::Node(id) = context_node {
                let mut sibling = document.prev_sibling(id);
                while let Some(now) = sibling {
                    sibling = document.prev_sibling(now);
                    matches(&XPathNode::Node(now), node_set);
                }
            }
        }
        Axis::SelfNode => {
            matches(&context_node, node_set);
        }
    }
}

/// The XPath parent of a node: for attributes and namespace nodes, the
/// owning element.
fn parent_of(context: &EvalContext<'_>, node: &XPathNode) -> Option<XPathNode> {
    match node {
        XPathNode::Node(id) => context.document.parent(*id).map(XPathNode::Node),
        XPathNode::Attribute(element, _) | XPathNode::Namespace { element, .. } => {
            Some(XPathNode::Node(*element))
        }
    }
}

fn descend(
    context: &EvalContext<'_>,
    node: NodeId,
    node_set: &mut XPathNodeSet,
    matches: &impl Fn(&XPathNode, &mut XPathNodeSet),
) {
    for child in context.document.children(node) {
        matches(&XPathNode::Node(child), node_set);
        descend(context, child, node_set, matches);
    }
}

/// Visit `node` and its subtree for the preceding axis (the node itself
/// comes last in reverse document order, but set insertion order does not
/// matter here).
fn preceding_subtree(
    context: &EvalContext<'_>,
    node: NodeId,
    node_set: &mut XPathNodeSet,
    matches: &impl Fn(&XPathNode, &mut XPathNodeSet),
) {
    matches(&XPathNode::Node(node), node_set);
    descend(context, node, node_set, matches);
}
