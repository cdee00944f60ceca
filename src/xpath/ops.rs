//! Operators over [`XPathObject`] values, with the type-coercion rules of
//! XPath 1.0 §3.4 and §3.5.

use crate::{
    tree::Document,
    xpath::{XPathError, XPathObject},
};

pub(super) fn add(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
) -> Result<XPathObject, XPathError> {
    Ok((left.as_number(document) + right.as_number(document)).into())
}

pub(super) fn sub(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
) -> Result<XPathObject, XPathError> {
    Ok((left.as_number(document) - right.as_number(document)).into())
}

pub(super) fn mul(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
) -> Result<XPathObject, XPathError> {
    Ok((left.as_number(document) * right.as_number(document)).into())
}

pub(super) fn div(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
) -> Result<XPathObject, XPathError> {
    Ok((left.as_number(document) / right.as_number(document)).into())
}

pub(super) fn rem(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
) -> Result<XPathObject, XPathError> {
    Ok((left.as_number(document) % right.as_number(document)).into())
}

/// Equality with node-set semantics: a node-set compares true if any of
/// its nodes' string values satisfies the comparison.
fn equality(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
    negate: bool,
) -> Result<XPathObject, XPathError> {
    use XPathObject::*;

    match (left, right) {
        (NodeSet(left), NodeSet(right)) => {
            for l in &left {
                let l = document.string_value(l);
                if right
                    .iter()
                    .any(|r| (l == document.string_value(r)) != negate)
                {
                    return Ok(true.into());
                }
            }
            Ok(false.into())
        }
        (NodeSet(set), Number(number)) | (Number(number), NodeSet(set)) => {
            for node in &set {
                let value = XPathObject::from(document.string_value(node)).as_number(document);
                if (value == number) != negate {
                    return Ok(true.into());
                }
            }
            Ok(false.into())
        }
        (NodeSet(set), String(string)) | (String(string), NodeSet(set)) => {
            for node in &set {
                if (document.string_value(node) == string.as_ref()) != negate {
                    return Ok(true.into());
                }
            }
            Ok(false.into())
        }
        (NodeSet(set), Boolean(boolean)) | (Boolean(boolean), NodeSet(set)) => {
            Ok(((!set.is_empty() == boolean) != negate).into())
        }
        (Number(left), Number(right)) => Ok(((left == right) != negate).into()),
        (Number(number), other @ String(_)) | (other @ String(_), Number(number)) => {
            Ok(((number == other.as_number(document)) != negate).into())
        }
        (Boolean(boolean), other) | (other, Boolean(boolean)) => {
            Ok(((boolean == other.as_boolean()) != negate).into())
        }
        (String(left), String(right)) => Ok(((left == right) != negate).into()),
    }
}

pub(super) fn eq(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
) -> Result<XPathObject, XPathError> {
    equality(document, left, right, false)
}

pub(super) fn ne(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
) -> Result<XPathObject, XPathError> {
    equality(document, left, right, true)
}

/// Relational comparison: node-sets compare through the numeric value of
/// their nodes; everything else converts to numbers.
fn compare(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
    comparator: fn(f64, f64) -> bool,
) -> Result<XPathObject, XPathError> {
    use XPathObject::*;

    match (left, right) {
        (NodeSet(left), NodeSet(right)) => {
            for l in &left {
                let l = XPathObject::from(document.string_value(l)).as_number(document);
                if right.iter().any(|r| {
                    let r = XPathObject::from(document.string_value(r)).as_number(document);
                    comparator(l, r)
                }) {
                    return Ok(true.into());
                }
            }
            Ok(false.into())
        }
        (NodeSet(set), other) => {
            let other = other.as_number(document);
            for node in &set {
                let value = XPathObject::from(document.string_value(node)).as_number(document);
                if comparator(value, other) {
                    return Ok(true.into());
                }
            }
            Ok(false.into())
        }
        (other, NodeSet(set)) => {
            let other = other.as_number(document);
            for node in &set {
                let value = XPathObject::from(document.string_value(node)).as_number(document);
                if comparator(other, value) {
                    return Ok(true.into());
                }
            }
            Ok(false.into())
        }
        (left, right) => {
            Ok(comparator(left.as_number(document), right.as_number(document)).into())
        }
    }
}

pub(super) fn lt(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
) -> Result<XPathObject, XPathError> {
    compare(document, left, right, |l, r| l < r)
}

pub(super) fn le(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
) -> Result<XPathObject, XPathError> {
    compare(document, left, right, |l, r| l <= r)
}

pub(super) fn gt(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
) -> Result<XPathObject, XPathError> {
    compare(document, left, right, |l, r| l > r)
}

pub(super) fn ge(
    document: &Document,
    left: XPathObject,
    right: XPathObject,
) -> Result<XPathObject, XPathError> {
    compare(document, left, right, |l, r| l >= r)
}
