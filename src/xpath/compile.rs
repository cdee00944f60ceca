//! The XPath 1.0 expression compiler.
//!
//! Productions are parsed by recursive descent directly over the input
//! string; the result is a flat syntax-tree vector addressed by indexes.

use crate::{
    XMLVersion,
    xpath::{Axis, NodeTest, XPathCompileError, XPathExpression, XPathSyntaxTree},
};

/// Compile `xpath` into an [`XPathExpression`].
pub fn compile(mut xpath: &str) -> Result<XPathExpression, XPathCompileError> {
    let mut compiler = Compiler { tree: vec![] };
    let root = compiler.parse_expr(&mut xpath)?;
    skip_whitespaces(&mut xpath);
    if !xpath.is_empty() {
        return Err(XPathCompileError::ExpressionNotTerminated);
    }
    Ok(XPathExpression {
        root,
        tree: compiler.tree,
    })
}

struct Compiler {
    tree: Vec<XPathSyntaxTree>,
}

impl Compiler {
    fn push(&mut self, node: XPathSyntaxTree) -> usize {
        self.tree.push(node);
        self.tree.len() - 1
    }

    /// ```text
    /// [1] LocationPath ::= RelativeLocationPath | AbsoluteLocationPath
    /// ```
    fn parse_location_path(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        skip_whitespaces(xpath);
        if xpath.starts_with('/') {
            self.parse_absolute_location_path(xpath)
        } else {
            self.parse_relative_location_path(xpath, true)
        }
    }

    /// ```text
    /// [2]  AbsoluteLocationPath            ::= '/' RelativeLocationPath?
    ///                                          | AbbreviatedAbsoluteLocationPath
    /// [10] AbbreviatedAbsoluteLocationPath ::= '//' RelativeLocationPath
    /// ```
    fn parse_absolute_location_path(
        &mut self,
        xpath: &mut &str,
    ) -> Result<usize, XPathCompileError> {
        skip_whitespaces(xpath);
        *xpath = xpath
            .strip_prefix('/')
            .ok_or(XPathCompileError::InvalidAbsoluteLocationPath)?;
        let root = self.push(XPathSyntaxTree::LocationPathRoot);

        if let Some(rem) = xpath.strip_prefix('/') {
            // '//' is shorthand for '/descendant-or-self::node()/'
            *xpath = rem;
            let step = self.push(XPathSyntaxTree::Step {
                first: false,
                axis: Axis::DescendantOrSelf,
                node_test: NodeTest::Node,
                predicate: usize::MAX,
            });
            let left = self.push(XPathSyntaxTree::Slash(root, step));
            let right = self.parse_relative_location_path(xpath, false)?;
            return Ok(self.push(XPathSyntaxTree::Slash(left, right)));
        }

        // A RelativeLocationPath may follow; it starts with an
        // AxisSpecifier, a NodeTest or an AbbreviatedStep.
        skip_whitespaces(xpath);
        if xpath.starts_with(|c: char| {
            matches!(c, '.' | '*' | '@')
                || (c != ':' && XMLVersion::default().is_name_start_char(c))
        }) {
            let right = self.parse_relative_location_path(xpath, false)?;
            return Ok(self.push(XPathSyntaxTree::Slash(root, right)));
        }

        Ok(root)
    }

    /// ```text
    /// [3]  RelativeLocationPath            ::= Step
    ///                                          | RelativeLocationPath '/' Step
    ///                                          | AbbreviatedRelativeLocationPath
    /// [11] AbbreviatedRelativeLocationPath ::= RelativeLocationPath '//' Step
    /// ```
    fn parse_relative_location_path(
        &mut self,
        xpath: &mut &str,
        is_first_step: bool,
    ) -> Result<usize, XPathCompileError> {
        let mut left = self.parse_step(xpath, is_first_step)?;
        skip_whitespaces(xpath);
        while let Some(rem) = xpath.strip_prefix('/') {
            if let Some(rem) = rem.strip_prefix('/') {
                *xpath = rem;
                let step = self.push(XPathSyntaxTree::Step {
                    first: false,
                    axis: Axis::DescendantOrSelf,
                    node_test: NodeTest::Node,
                    predicate: usize::MAX,
                });
                left = self.push(XPathSyntaxTree::Slash(left, step));
            } else {
                *xpath = rem;
            }
            let right = self.parse_step(xpath, false)?;
            left = self.push(XPathSyntaxTree::Slash(left, right));
            skip_whitespaces(xpath);
        }
        Ok(left)
    }

    /// ```text
    /// [4]  Step            ::= AxisSpecifier NodeTest Predicate* | AbbreviatedStep
    /// [12] AbbreviatedStep ::= '.' | '..'
    /// ```
    fn parse_step(
        &mut self,
        xpath: &mut &str,
        is_first_step: bool,
    ) -> Result<usize, XPathCompileError> {
        skip_whitespaces(xpath);
        if let Some(rem) = xpath.strip_prefix('.') {
            let axis = if let Some(rem) = rem.strip_prefix('.') {
                *xpath = rem;
                Axis::Parent
            } else {
                *xpath = rem;
                Axis::SelfNode
            };
            return Ok(self.push(XPathSyntaxTree::Step {
                first: is_first_step,
                axis,
                node_test: NodeTest::Node,
                predicate: usize::MAX,
            }));
        }

        let axis = parse_axis_specifier(xpath)?;
        let node_test = self.parse_node_test(xpath)?;

        let step = self.push(XPathSyntaxTree::Step {
            first: is_first_step,
            axis,
            node_test,
            predicate: usize::MAX,
        });

        // Predicates chain off the step, each pointing at the next.
        let mut prev = step;
        skip_whitespaces(xpath);
        while xpath.starts_with('[') {
            let expression = self.parse_predicate(xpath)?;
            let node = self.push(XPathSyntaxTree::Predicate {
                expression,
                next: usize::MAX,
            });
            match &mut self.tree[prev] {
                XPathSyntaxTree::Step { predicate, .. } => *predicate = node,
                XPathSyntaxTree::Predicate { next, .. } => *next = node,
                _ => {}
            }
            prev = node;
            skip_whitespaces(xpath);
        }
        Ok(step)
    }

    /// ```text
    /// [7]  NodeTest ::= NameTest
    ///                   | NodeType '(' ')'
    ///                   | 'processing-instruction' '(' Literal ')'
    /// [37] NameTest ::= '*' | NCName ':' '*' | QName
    /// ```
    fn parse_node_test(&mut self, xpath: &mut &str) -> Result<NodeTest, XPathCompileError> {
        skip_whitespaces(xpath);
        if let Some(rem) = xpath.strip_prefix('*') {
            *xpath = rem;
            return Ok(NodeTest::Any);
        }
        for (prefix, test) in [
            ("text(", NodeTest::Text),
            ("comment(", NodeTest::Comment),
            ("node(", NodeTest::Node),
        ] {
            if let Some(rem) = xpath.strip_prefix(prefix) {
                *xpath = rem;
                skip_whitespaces(xpath);
                *xpath = xpath
                    .strip_prefix(')')
                    .ok_or(XPathCompileError::InvalidNodeTest)?;
                return Ok(test);
            }
        }
        if let Some(rem) = xpath.strip_prefix("processing-instruction(") {
            *xpath = rem;
            skip_whitespaces(xpath);
            if let Some(rem) = xpath.strip_prefix(')') {
                *xpath = rem;
                return Ok(NodeTest::ProcessingInstruction(None));
            }
            let literal = self.parse_literal(xpath)?;
            skip_whitespaces(xpath);
            *xpath = xpath
                .strip_prefix(')')
                .ok_or(XPathCompileError::InvalidNodeTest)?;
            let XPathSyntaxTree::Literal(literal) = &self.tree[literal] else {
                return Err(XPathCompileError::InvalidNodeTest);
            };
            return Ok(NodeTest::ProcessingInstruction(Some(literal.clone())));
        }

        let (ncname, rem) = parse_ncname(xpath)?;
        if let Some(after_colon) = rem.strip_prefix(':') {
            if let Some(rem) = after_colon.strip_prefix('*') {
                // NCName:*
                *xpath = rem;
                Ok(NodeTest::AnyLocalName(ncname.into()))
            } else if let Ok((_, rem)) = parse_ncname(after_colon) {
                // prefixed QName
                let (qname, rem) = xpath.split_at(xpath.len() - rem.len());
                *xpath = rem;
                Ok(NodeTest::QName(qname.into()))
            } else {
                // unprefixed QName followed by a colon
                *xpath = rem;
                Ok(NodeTest::QName(ncname.into()))
            }
        } else {
            *xpath = rem;
            Ok(NodeTest::QName(ncname.into()))
        }
    }

    /// ```text
    /// [8] Predicate     ::= '[' PredicateExpr ']'
    /// [9] PredicateExpr ::= Expr
    /// ```
    fn parse_predicate(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        skip_whitespaces(xpath);
        *xpath = xpath
            .strip_prefix('[')
            .ok_or(XPathCompileError::InvalidPredicate)?;
        let ret = self.parse_expr(xpath)?;
        skip_whitespaces(xpath);
        *xpath = xpath
            .strip_prefix(']')
            .ok_or(XPathCompileError::InvalidPredicate)?;
        Ok(ret)
    }

    /// ```text
    /// [14] Expr ::= OrExpr
    /// ```
    fn parse_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        self.parse_or_expr(xpath)
    }

    /// ```text
    /// [15] PrimaryExpr ::= VariableReference | '(' Expr ')' | Literal
    ///                      | Number | FunctionCall
    /// ```
    fn parse_primary_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        skip_whitespaces(xpath);
        if xpath.starts_with('$') {
            self.parse_variable_reference(xpath)
        } else if let Some(rem) = xpath.strip_prefix('(') {
            *xpath = rem;
            let ret = self.parse_expr(xpath)?;
            skip_whitespaces(xpath);
            *xpath = xpath
                .strip_prefix(')')
                .ok_or(XPathCompileError::InvalidPrimaryExpr)?;
            Ok(ret)
        } else if xpath.starts_with(['\'', '"']) {
            self.parse_literal(xpath)
        } else if xpath.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
            self.parse_number(xpath)
        } else {
            self.parse_function_call(xpath)
        }
    }

    /// ```text
    /// [16] FunctionCall ::= FunctionName '(' ( Argument ( ',' Argument )* )? ')'
    /// [17] Argument     ::= Expr
    /// ```
    fn parse_function_call(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        skip_whitespaces(xpath);
        let (name, rem) = parse_function_name(xpath)?;
        let name: Box<str> = name.into();
        *xpath = rem;
        skip_whitespaces(xpath);
        *xpath = xpath
            .strip_prefix('(')
            .ok_or(XPathCompileError::InvalidFunctionCall)?;
        skip_whitespaces(xpath);
        if let Some(rem) = xpath.strip_prefix(')') {
            *xpath = rem;
            return Ok(self.push(XPathSyntaxTree::FunctionCall {
                name,
                arguments: vec![],
            }));
        }

        let mut arguments = vec![self.parse_expr(xpath)?];
        skip_whitespaces(xpath);
        while let Some(rem) = xpath.strip_prefix(',') {
            *xpath = rem;
            arguments.push(self.parse_expr(xpath)?);
            skip_whitespaces(xpath);
        }
        *xpath = xpath
            .strip_prefix(')')
            .ok_or(XPathCompileError::InvalidFunctionCall)?;
        Ok(self.push(XPathSyntaxTree::FunctionCall { name, arguments }))
    }

    /// ```text
    /// [18] UnionExpr ::= PathExpr | UnionExpr '|' PathExpr
    /// ```
    fn parse_union_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        let mut left = self.parse_path_expr(xpath)?;
        skip_whitespaces(xpath);
        while let Some(rem) = xpath.strip_prefix('|') {
            *xpath = rem;
            let right = self.parse_path_expr(xpath)?;
            left = self.push(XPathSyntaxTree::Union(left, right));
            skip_whitespaces(xpath);
        }
        Ok(left)
    }

    /// ```text
    /// [19] PathExpr ::= LocationPath
    ///                   | FilterExpr
    ///                   | FilterExpr '/' RelativeLocationPath
    ///                   | FilterExpr '//' RelativeLocationPath
    /// ```
    fn parse_path_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        skip_whitespaces(xpath);
        let filter_expr = if xpath
            .starts_with(|c: char| matches!(c, '$' | '(' | '"' | '\'') || c.is_ascii_digit())
        {
            // VariableReference, grouped Expr, Literal, Number
            true
        } else if xpath.starts_with(['/', '.', '@', '*']) {
            false
        } else {
            // A name followed by '(' that is not a node test is a
            // function call, so this is a FilterExpr.
            parse_function_name(xpath).is_ok_and(|(_, mut rem)| {
                skip_whitespaces(&mut rem);
                rem.starts_with('(')
            })
        };

        if !filter_expr {
            return self.parse_location_path(xpath);
        }

        let mut left = self.parse_filter_expr(xpath)?;
        skip_whitespaces(xpath);
        if let Some(rem) = xpath.strip_prefix('/') {
            if let Some(rem) = rem.strip_prefix('/') {
                *xpath = rem;
                let step = self.push(XPathSyntaxTree::Step {
                    first: false,
                    axis: Axis::DescendantOrSelf,
                    node_test: NodeTest::Node,
                    predicate: usize::MAX,
                });
                left = self.push(XPathSyntaxTree::Slash(left, step));
            } else {
                *xpath = rem;
            }
            let right = self.parse_relative_location_path(xpath, false)?;
            left = self.push(XPathSyntaxTree::Slash(left, right));
        }
        Ok(left)
    }

    /// ```text
    /// [20] FilterExpr ::= PrimaryExpr | FilterExpr Predicate
    /// ```
    fn parse_filter_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        let mut expression = self.parse_primary_expr(xpath)?;
        skip_whitespaces(xpath);
        while xpath.starts_with('[') {
            let predicate = self.parse_predicate(xpath)?;
            expression = self.push(XPathSyntaxTree::FilterExpr {
                expression,
                predicate,
            });
            skip_whitespaces(xpath);
        }
        Ok(expression)
    }

    /// ```text
    /// [21] OrExpr ::= AndExpr | OrExpr 'or' AndExpr
    /// ```
    fn parse_or_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        let mut left = self.parse_and_expr(xpath)?;
        skip_whitespaces(xpath);
        while let Some(rem) = xpath.strip_prefix("or") {
            *xpath = rem;
            let right = self.parse_and_expr(xpath)?;
            left = self.push(XPathSyntaxTree::Or(left, right));
            skip_whitespaces(xpath);
        }
        Ok(left)
    }

    /// ```text
    /// [22] AndExpr ::= EqualityExpr | AndExpr 'and' EqualityExpr
    /// ```
    fn parse_and_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        let mut left = self.parse_equality_expr(xpath)?;
        skip_whitespaces(xpath);
        while let Some(rem) = xpath.strip_prefix("and") {
            *xpath = rem;
            let right = self.parse_equality_expr(xpath)?;
            left = self.push(XPathSyntaxTree::And(left, right));
            skip_whitespaces(xpath);
        }
        Ok(left)
    }

    /// ```text
    /// [23] EqualityExpr ::= RelationalExpr
    ///                       | EqualityExpr '=' RelationalExpr
    ///                       | EqualityExpr '!=' RelationalExpr
    /// ```
    fn parse_equality_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        let mut left = self.parse_relational_expr(xpath)?;
        loop {
            skip_whitespaces(xpath);
            if let Some(rem) = xpath.strip_prefix("!=") {
                *xpath = rem;
                let right = self.parse_relational_expr(xpath)?;
                left = self.push(XPathSyntaxTree::NotEqual(left, right));
            } else if let Some(rem) = xpath.strip_prefix('=') {
                *xpath = rem;
                let right = self.parse_relational_expr(xpath)?;
                left = self.push(XPathSyntaxTree::Equal(left, right));
            } else {
                break Ok(left);
            }
        }
    }

    /// ```text
    /// [24] RelationalExpr ::= AdditiveExpr
    ///                         | RelationalExpr '<' AdditiveExpr
    ///                         | RelationalExpr '>' AdditiveExpr
    ///                         | RelationalExpr '<=' AdditiveExpr
    ///                         | RelationalExpr '>=' AdditiveExpr
    /// ```
    fn parse_relational_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        let mut left = self.parse_additive_expr(xpath)?;
        loop {
            skip_whitespaces(xpath);
            let node = if let Some(rem) = xpath.strip_prefix("<=") {
                *xpath = rem;
                let right = self.parse_additive_expr(xpath)?;
                XPathSyntaxTree::LessOrEqual(left, right)
            } else if let Some(rem) = xpath.strip_prefix(">=") {
                *xpath = rem;
                let right = self.parse_additive_expr(xpath)?;
                XPathSyntaxTree::GreaterOrEqual(left, right)
            } else if let Some(rem) = xpath.strip_prefix('<') {
                *xpath = rem;
                let right = self.parse_additive_expr(xpath)?;
                XPathSyntaxTree::Less(left, right)
            } else if let Some(rem) = xpath.strip_prefix('>') {
                *xpath = rem;
                let right = self.parse_additive_expr(xpath)?;
                XPathSyntaxTree::Greater(left, right)
            } else {
                break Ok(left);
            };
            left = self.push(node);
        }
    }

    /// ```text
    /// [25] AdditiveExpr ::= MultiplicativeExpr
    ///                       | AdditiveExpr '+' MultiplicativeExpr
    ///                       | AdditiveExpr '-' MultiplicativeExpr
    /// ```
    fn parse_additive_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        let mut left = self.parse_multiplicative_expr(xpath)?;
        loop {
            skip_whitespaces(xpath);
            let node = if let Some(rem) = xpath.strip_prefix('+') {
                *xpath = rem;
                let right = self.parse_multiplicative_expr(xpath)?;
                XPathSyntaxTree::Addition(left, right)
            } else if let Some(rem) = xpath.strip_prefix('-') {
                *xpath = rem;
                let right = self.parse_multiplicative_expr(xpath)?;
                XPathSyntaxTree::Subtraction(left, right)
            } else {
                break Ok(left);
            };
            left = self.push(node);
        }
    }

    /// ```text
    /// [26] MultiplicativeExpr ::= UnaryExpr
    ///                             | MultiplicativeExpr MultiplyOperator UnaryExpr
    ///                             | MultiplicativeExpr 'div' UnaryExpr
    ///                             | MultiplicativeExpr 'mod' UnaryExpr
    /// ```
    fn parse_multiplicative_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        let mut left = self.parse_unary_expr(xpath)?;
        loop {
            skip_whitespaces(xpath);
            let node = if let Some(rem) = xpath.strip_prefix('*') {
                *xpath = rem;
                let right = self.parse_unary_expr(xpath)?;
                XPathSyntaxTree::Multiplication(left, right)
            } else if let Some(rem) = xpath.strip_prefix("div") {
                *xpath = rem;
                let right = self.parse_unary_expr(xpath)?;
                XPathSyntaxTree::Division(left, right)
            } else if let Some(rem) = xpath.strip_prefix("mod") {
                *xpath = rem;
                let right = self.parse_unary_expr(xpath)?;
                XPathSyntaxTree::Remainder(left, right)
            } else {
                break Ok(left);
            };
            left = self.push(node);
        }
    }

    /// ```text
    /// [27] UnaryExpr ::= UnionExpr | '-' UnaryExpr
    /// ```
    fn parse_unary_expr(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        skip_whitespaces(xpath);
        if let Some(rem) = xpath.strip_prefix('-') {
            *xpath = rem;
            let child = self.parse_unary_expr(xpath)?;
            Ok(self.push(XPathSyntaxTree::Negation(child)))
        } else {
            self.parse_union_expr(xpath)
        }
    }

    /// ```text
    /// [29] Literal ::= '"' [^"]* '"' | "'" [^']* "'"
    /// ```
    fn parse_literal(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        skip_whitespaces(xpath);
        let quote = xpath
            .chars()
            .next()
            .filter(|c| matches!(c, '\'' | '"'))
            .ok_or(XPathCompileError::InvalidLiteral)?;
        let (literal, rem) = xpath[1..]
            .split_once(quote)
            .ok_or(XPathCompileError::InvalidLiteral)?;
        let literal: Box<str> = literal.into();
        *xpath = rem;
        Ok(self.push(XPathSyntaxTree::Literal(literal)))
    }

    /// ```text
    /// [30] Number ::= Digits ('.' Digits?)? | '.' Digits
    /// ```
    fn parse_number(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        skip_whitespaces(xpath);
        fn digits(s: &str) -> &str {
            s.trim_start_matches(|c: char| c.is_ascii_digit())
        }
        let rem = if let Some(rem) = xpath.strip_prefix('.') {
            let rem = digits(rem);
            if rem.len() + 1 == xpath.len() {
                return Err(XPathCompileError::InvalidNumber);
            }
            rem
        } else {
            let rem = digits(xpath);
            if rem.len() == xpath.len() {
                return Err(XPathCompileError::InvalidNumber);
            }
            if let Some(rem) = rem.strip_prefix('.') {
                digits(rem)
            } else {
                rem
            }
        };
        let number: Box<str> = xpath[..xpath.len() - rem.len()].into();
        *xpath = rem;
        Ok(self.push(XPathSyntaxTree::Number(number)))
    }

    /// ```text
    /// [36] VariableReference ::= '$' QName
    /// ```
    fn parse_variable_reference(&mut self, xpath: &mut &str) -> Result<usize, XPathCompileError> {
        skip_whitespaces(xpath);
        let rem = xpath
            .strip_prefix('$')
            .ok_or(XPathCompileError::InvalidVariableReference)?;
        let (qname, rem) = parse_qname(rem)?;
        let qname: Box<str> = qname.into();
        *xpath = rem;
        Ok(self.push(XPathSyntaxTree::VariableReference(qname)))
    }
}

/// ```text
/// [5]  AxisSpecifier            ::= AxisName '::' | AbbreviatedAxisSpecifier
/// [13] AbbreviatedAxisSpecifier ::= '@'?
/// ```
fn parse_axis_specifier(xpath: &mut &str) -> Result<Axis, XPathCompileError> {
    skip_whitespaces(xpath);
    if let Some(rem) = xpath.strip_prefix('@') {
        *xpath = rem;
        return Ok(Axis::Attribute);
    }

    const AXES: &[(&str, Axis)] = &[
        ("ancestor-or-self", Axis::AncestorOrSelf),
        ("ancestor", Axis::Ancestor),
        ("attribute", Axis::Attribute),
        ("child", Axis::Child),
        ("descendant-or-self", Axis::DescendantOrSelf),
        ("descendant", Axis::Descendant),
        ("following-sibling", Axis::FollowingSibling),
        ("following", Axis::Following),
        ("namespace", Axis::Namespace),
        ("parent", Axis::Parent),
        ("preceding-sibling", Axis::PrecedingSibling),
        ("preceding", Axis::Preceding),
        ("self", Axis::SelfNode),
    ];
    for (name, axis) in AXES {
        if let Some(rem) = xpath.strip_prefix(name) {
            // Only a following '::' makes this an axis name; otherwise the
            // name is part of a node test with the child axis implied.
            let mut rem2 = rem;
            skip_whitespaces(&mut rem2);
            if let Some(rem2) = rem2.strip_prefix("::") {
                *xpath = rem2;
                return Ok(*axis);
            }
        }
    }
    Ok(Axis::Child)
}

/// ```text
/// [35] FunctionName ::= QName - NodeType
/// [38] NodeType     ::= 'comment' | 'text' | 'processing-instruction' | 'node'
/// ```
fn parse_function_name(xpath: &str) -> Result<(&str, &str), XPathCompileError> {
    let (qname, rem) = parse_qname(xpath)?;
    if matches!(
        qname,
        "comment" | "text" | "processing-instruction" | "node"
    ) {
        return Err(XPathCompileError::InvalidFunctionName);
    }
    Ok((qname, rem))
}

/// Split off a leading NCName, returning `(ncname, remainder)`.
fn parse_ncname(xpath: &str) -> Result<(&str, &str), XPathCompileError> {
    let version = XMLVersion::default();
    if !xpath.starts_with(|c: char| c != ':' && version.is_name_start_char(c)) {
        return Err(XPathCompileError::InvalidNCName);
    }
    let pos = xpath
        .find(|c: char| c == ':' || !version.is_name_char(c))
        .unwrap_or(xpath.len());
    Ok(xpath.split_at(pos))
}

/// Split off a leading QName, returning `(qname, remainder)`.
fn parse_qname(xpath: &str) -> Result<(&str, &str), XPathCompileError> {
    let (ncname, rem) = parse_ncname(xpath).map_err(|_| XPathCompileError::InvalidQName)?;
    let Some(rem) = rem.strip_prefix(':') else {
        return Ok((ncname, rem));
    };
    if let Ok((_, rem)) = parse_ncname(rem) {
        Ok(xpath.split_at(xpath.len() - rem.len()))
    } else {
        // Treat the colon as following an unprefixed qualified name.
        Ok(xpath.split_at(ncname.len()))
    }
}

fn skip_whitespaces(xpath: &mut &str) {
    const XML_VERSION: XMLVersion = XMLVersion::XML10;
    *xpath = xpath.trim_start_matches(|c| XML_VERSION.is_whitespace(c));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_common_expressions() {
        for expression in [
            "/",
            "//a",
            "/a/b/c",
            "a//b",
            "..",
            ".",
            "@id",
            "child::a/descendant-or-self::node()",
            "//a[@id='x']",
            "a[1]/b[last()]",
            "count(//item) > 3 and not($flag)",
            "string-length(normalize-space(.)) mod 2 = 0",
            "a | b | c",
            "processing-instruction('xml-stylesheet')",
            "ns:*",
            "*",
            "-1 + 2 * 3",
            "'literal' != \"other\"",
        ] {
            assert!(compile(expression).is_ok(), "failed: {expression}");
        }
    }

    #[test]
    fn rejects_malformed_expressions() {
        for expression in ["", "//", "a[", "a]", "f(", "$", "1.2.3", "a='x"] {
            assert!(compile(expression).is_err(), "accepted: {expression}");
        }
    }
}
