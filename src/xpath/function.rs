//! The XPath 1.0 core function library.

use std::iter::repeat;

use crate::{
    XMLVersion,
    tree::NodeKind,
    xpath::{EvalContext, XPathError, XPathNode, XPathNodeSet, XPathObject},
};

pub(super) type XPathFunction =
    fn(&mut EvalContext<'_>, usize) -> Result<XPathObject, XPathError>;

pub(super) fn find_function(name: &str) -> Result<XPathFunction, XPathError> {
    Ok(match name {
        // 4.1 Node Set Functions
        "last" => last,
        "position" => position,
        "count" => count,
        "id" => id,
        "local-name" => local_name,
        "namespace-uri" => namespace_uri,
        "name" => name_fn,
        // 4.2 String Functions
        "string" => string,
        "concat" => concat,
        "starts-with" => starts_with,
        "contains" => contains,
        "substring-before" => substring_before,
        "substring-after" => substring_after,
        "substring" => substring,
        "string-length" => string_length,
        "normalize-space" => normalize_space,
        "translate" => translate,
        // 4.3 Boolean Functions
        "boolean" => boolean,
        "not" => not,
        "true" => true_fn,
        "false" => false_fn,
        "lang" => lang,
        // 4.4 Number Functions
        "number" => number,
        "sum" => sum,
        "floor" => floor,
        "ceiling" => ceiling,
        "round" => round,
        _ => return Err(XPathError::UnresolvableFunctionName),
    })
}

fn require_args(num_args: usize, expected: usize) -> Result<(), XPathError> {
    if num_args != expected {
        return Err(XPathError::IncorrectNumberOfArgument);
    }
    Ok(())
}

fn last(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 0)?;
    Ok(context.size.into())
}

fn position(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 0)?;
    Ok(context.position.into())
}

fn count(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 1)?;
    let node_set = context
        .pop_object()?
        .as_nodeset()
        .map_err(|_| XPathError::IncorrectArgumentType)?;
    Ok(node_set.len().into())
}

/// Select the elements whose ID-flagged attribute matches one of the
/// whitespace-separated tokens of the argument.
fn id(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 1)?;
    let document = context.document;

    let mut tokens = vec![];
    match context.pop_object()? {
        XPathObject::NodeSet(node_set) => {
            for node in &node_set {
                for token in document.string_value(node).split_whitespace() {
                    tokens.push(token.to_owned());
                }
            }
        }
        object => {
            for token in object.as_string(document).split_whitespace() {
                tokens.push(token.to_owned());
            }
        }
    }

    let mut result = XPathNodeSet::default();
    let mut stack = vec![document.root()];
    while let Some(node) = stack.pop() {
        if let Some(element) = document.element(node) {
            if element
                .attributes
                .iter()
                .any(|att| att.id && tokens.iter().any(|token| *token == att.value))
            {
                result.push(XPathNode::Node(node));
            }
        }
        for child in document.children(node) {
            stack.push(child);
        }
    }
    result.sort(document);
    Ok(result.into())
}

fn context_or_first_node(
    context: &mut EvalContext<'_>,
    num_args: usize,
) -> Result<Option<XPathNode>, XPathError> {
    if num_args > 1 {
        return Err(XPathError::IncorrectNumberOfArgument);
    }
    if num_args == 1 {
        Ok(context.pop_object()?.as_nodeset()?.first().cloned())
    } else {
        Ok(context.node.clone())
    }
}

fn local_name(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    let Some(node) = context_or_first_node(context, num_args)? else {
        return Ok("".into());
    };
    let document = context.document;
    Ok(match &node {
        XPathNode::Node(id) => match document.kind(*id) {
            NodeKind::Element(element) => element.local_name().into(),
            NodeKind::ProcessingInstruction { target, .. } => target.as_str().into(),
            _ => "".into(),
        },
        XPathNode::Attribute(element, index) => document
            .element(*element)
            .and_then(|element| element.attributes.get(*index))
            .map(|att| att.local_name().into())
            .unwrap_or_else(|| "".into()),
        XPathNode::Namespace { prefix, .. } => prefix.as_deref().unwrap_or_default().into(),
    })
}

fn namespace_uri(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    let Some(node) = context_or_first_node(context, num_args)? else {
        return Ok("".into());
    };
    let document = context.document;
    Ok(match &node {
        XPathNode::Node(id) => match document.kind(*id) {
            NodeKind::Element(element) => {
                element.namespace_name.as_deref().unwrap_or_default().into()
            }
            _ => "".into(),
        },
        XPathNode::Attribute(element, index) => document
            .element(*element)
            .and_then(|element| element.attributes.get(*index))
            .map(|att| att.namespace_name.as_deref().unwrap_or_default().into())
            .unwrap_or_else(|| "".into()),
        XPathNode::Namespace { .. } => "".into(),
    })
}

fn name_fn(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    let Some(node) = context_or_first_node(context, num_args)? else {
        return Ok("".into());
    };
    let document = context.document;
    Ok(match &node {
        XPathNode::Node(id) => match document.kind(*id) {
            NodeKind::Element(element) => element.qname.as_str().into(),
            NodeKind::ProcessingInstruction { target, .. } => target.as_str().into(),
            _ => "".into(),
        },
        XPathNode::Attribute(element, index) => document
            .element(*element)
            .and_then(|element| element.attributes.get(*index))
            .map(|att| att.qname.as_str().into())
            .unwrap_or_else(|| "".into()),
        XPathNode::Namespace { prefix, .. } => prefix.as_deref().unwrap_or_default().into(),
    })
}

fn string(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    if num_args > 1 {
        return Err(XPathError::IncorrectNumberOfArgument);
    }
    if num_args == 1 {
        let object = context.pop_object()?;
        Ok(object.cast_to_string(context.document))
    } else {
        Ok(context
            .node
            .as_ref()
            .map(|node| context.document.string_value(node))
            .unwrap_or_default()
            .into())
    }
}

fn concat(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    if num_args < 2 {
        return Err(XPathError::IncorrectNumberOfArgument);
    }
    let mut parts = vec![];
    for _ in 0..num_args {
        let object = context.pop_object()?;
        parts.push(object.as_string(context.document));
    }
    Ok(parts.into_iter().rev().collect::<String>().into())
}

fn pop_string(context: &mut EvalContext<'_>) -> Result<Box<str>, XPathError> {
    let object = context.pop_object()?;
    Ok(object.as_string(context.document))
}

fn starts_with(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 2)?;
    let second = pop_string(context)?;
    let first = pop_string(context)?;
    Ok(first.starts_with(second.as_ref()).into())
}

fn contains(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 2)?;
    let second = pop_string(context)?;
    let first = pop_string(context)?;
    Ok(first.contains(second.as_ref()).into())
}

fn substring_before(
    context: &mut EvalContext<'_>,
    num_args: usize,
) -> Result<XPathObject, XPathError> {
    require_args(num_args, 2)?;
    let second = pop_string(context)?;
    let first = pop_string(context)?;
    Ok(first
        .split_once(second.as_ref())
        .map(|(before, _)| before)
        .unwrap_or("")
        .into())
}

fn substring_after(
    context: &mut EvalContext<'_>,
    num_args: usize,
) -> Result<XPathObject, XPathError> {
    require_args(num_args, 2)?;
    let second = pop_string(context)?;
    let first = pop_string(context)?;
    Ok(first
        .split_once(second.as_ref())
        .map(|(_, after)| after)
        .unwrap_or("")
        .into())
}

fn substring(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    if num_args != 2 && num_args != 3 {
        return Err(XPathError::IncorrectNumberOfArgument);
    }
    let document = context.document;
    let third = if num_args == 3 {
        context.pop_object()?.as_number(document)
    } else {
        f64::INFINITY
    };
    let second = context.pop_object()?.as_number(document);
    let first = pop_string(context)?;

    if second.is_nan() || third.is_nan() || third.is_sign_negative() {
        return Ok("".into());
    }
    if second.is_infinite() {
        return if second == f64::NEG_INFINITY && third == f64::INFINITY {
            Ok(first.into())
        } else {
            Ok("".into())
        };
    }

    let chars = first.chars().count() as f64;
    let start = second.round();
    if start > chars {
        return Ok("".into());
    }
    let end = (start + third.round()).max(1.0);
    let start = start.max(1.0);
    let length = (end - start).max(0.0) as usize;
    Ok(first
        .chars()
        .skip(start as usize - 1)
        .take(length)
        .collect::<Box<str>>()
        .into())
}

fn string_length(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    if num_args > 1 {
        return Err(XPathError::IncorrectNumberOfArgument);
    }
    let string = if num_args == 1 {
        pop_string(context)?
    } else {
        context
            .node
            .as_ref()
            .map(|node| context.document.string_value(node))
            .unwrap_or_default()
            .into_boxed_str()
    };
    Ok(string.chars().count().into())
}

fn normalize_space(
    context: &mut EvalContext<'_>,
    num_args: usize,
) -> Result<XPathObject, XPathError> {
    if num_args > 1 {
        return Err(XPathError::IncorrectNumberOfArgument);
    }
    let string = if num_args == 1 {
        pop_string(context)?
    } else {
        context
            .node
            .as_ref()
            .map(|node| context.document.string_value(node))
            .unwrap_or_default()
            .into_boxed_str()
    };
    Ok(string
        .split(|c| XMLVersion::default().is_whitespace(c))
        .filter(|token| !token.is_empty())
        .enumerate()
        .fold(String::new(), |acc, (i, token)| {
            if i > 0 { acc + " " + token } else { acc + token }
        })
        .into())
}

fn translate(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 3)?;
    let third = pop_string(context)?;
    let second = pop_string(context)?;
    let first = pop_string(context)?;

    let mut replacement = second
        .chars()
        .zip(third.chars().map(Some).chain(repeat(None)))
        .collect::<Vec<_>>();
    // Stable sorting retains only the first occurrence of duplicate source
    // characters.
    replacement.sort_by_key(|v| v.0);
    replacement.dedup_by_key(|v| v.0);

    Ok(first
        .chars()
        .filter_map(|c| {
            replacement
                .binary_search_by_key(&c, |v| v.0)
                .map(|pos| replacement[pos].1)
                .unwrap_or(Some(c))
        })
        .collect::<Box<str>>()
        .into())
}

fn boolean(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 1)?;
    Ok(context.pop_object()?.cast_to_boolean())
}

fn not(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 1)?;
    Ok((!context.pop_object()?.as_boolean()).into())
}

fn true_fn(_context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 0)?;
    Ok(true.into())
}

fn false_fn(_context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 0)?;
    Ok(false.into())
}

/// `lang(s)` — `true` if the `xml:lang` in scope on the context node
/// equals `s` or is a sublanguage of it, compared case-insensitively.
fn lang(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 1)?;
    let wanted = pop_string(context)?;
    let document = context.document;

    let mut current = match &context.node {
        Some(XPathNode::Node(id)) => Some(*id),
        Some(XPathNode::Attribute(element, _))
        | Some(XPathNode::Namespace { element, .. }) => Some(*element),
        None => None,
    };
    while let Some(now) = current {
        if let Some(element) = document.element(now) {
            if let Some(value) = element.get_attribute("xml:lang") {
                let matches = value.eq_ignore_ascii_case(&wanted)
                    || (value.len() > wanted.len()
                        && value.as_bytes()[wanted.len()] == b'-'
                        && value[..wanted.len()].eq_ignore_ascii_case(&wanted));
                return Ok(matches.into());
            }
        }
        current = document.parent(now);
    }
    Ok(false.into())
}

fn number(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    if num_args > 1 {
        return Err(XPathError::IncorrectNumberOfArgument);
    }
    if num_args == 1 {
        let object = context.pop_object()?;
        Ok(object.cast_to_number(context.document))
    } else {
        let value = string(context, 0)?;
        Ok(value.cast_to_number(context.document))
    }
}

fn sum(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 1)?;
    let document = context.document;
    let node_set = context
        .pop_object()?
        .as_nodeset()
        .map_err(|_| XPathError::IncorrectArgumentType)?;
    let mut total = 0.0;
    for node in &node_set {
        total += XPathObject::from(document.string_value(node)).as_number(document);
    }
    Ok(total.into())
}

fn floor(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 1)?;
    let value = context.pop_object()?.as_number(context.document);
    Ok(value.floor().into())
}

fn ceiling(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 1)?;
    let value = context.pop_object()?.as_number(context.document);
    Ok(value.ceil().into())
}

fn round(context: &mut EvalContext<'_>, num_args: usize) -> Result<XPathObject, XPathError> {
    require_args(num_args, 1)?;
    let value = context.pop_object()?.as_number(context.document);
    Ok(value.round().into())
}
