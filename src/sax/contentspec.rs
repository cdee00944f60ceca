use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// # Reference
/// - [3.2 Element Type Declarations](https://www.w3.org/TR/xml/#elemdecls)
#[derive(Debug, Clone)]
pub enum ContentSpec {
    /// `'EMPTY'`
    EMPTY,
    /// `'ANY'`
    ANY,
    /// [Mixed Content](https://www.w3.org/TR/xml/#sec-mixed-content)
    Mixed(Arc<HashSet<Box<str>>>),
    /// [Element Content](https://www.w3.org/TR/xml/#sec-element-content)
    Children(ElementContent),
}

impl ContentSpec {
    pub(crate) fn new_validator(&mut self, is_external_markup: bool) -> ValidationContext {
        let (validator, external_element_content) = match self {
            ContentSpec::EMPTY => (ContentSpecValidator::Empty, false),
            ContentSpec::ANY => (ContentSpecValidator::Any, false),
            ContentSpec::Mixed(set) => (ContentSpecValidator::Mixed(set.clone()), false),
            ContentSpec::Children(model) => {
                let nfa = model.automaton();
                let states = nfa.initial_states();
                (
                    ContentSpecValidator::Children {
                        unrecoverable: false,
                        states,
                        nfa,
                    },
                    is_external_markup,
                )
            }
        };

        ValidationContext {
            invalid: false,
            whitespace: false,
            external_element_content,
            validator,
        }
    }
}

impl std::fmt::Display for ContentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EMPTY => write!(f, "EMPTY"),
            Self::ANY => write!(f, "ANY"),
            Self::Mixed(mixed) => {
                write!(f, "(#PCDATA")?;
                let mut mixed = mixed.iter().collect::<Vec<_>>();
                mixed.sort_unstable();
                for name in mixed.iter() {
                    write!(f, "|{name}")?;
                }
                if mixed.is_empty() {
                    write!(f, ")")
                } else {
                    write!(f, ")*")
                }
            }
            Self::Children(children) => write!(f, "{children}"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ContentNode {
    Name(Box<str>),
    Catenation(usize, usize),
    Alternation(usize, usize),
    ZeroOrOne(usize),
    ZeroOrMore(usize),
    OneOrMore(usize),
}

/// A compiled element-content model.
///
/// The syntax tree is built by the parser through the `push_*` methods and
/// compiled on first use into an NFA evaluated with ε-closure.
#[derive(Debug, Clone, Default)]
pub struct ElementContent {
    nodes: Vec<ContentNode>,
    root: usize,
    compiled: Option<Arc<Nfa>>,
}

impl ElementContent {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_name(&mut self, name: impl Into<Box<str>>) -> usize {
        self.nodes.push(ContentNode::Name(name.into()));
        self.nodes.len() - 1
    }

    pub(crate) fn push_catenation(&mut self, previous: usize, next: usize) -> usize {
        self.nodes.push(ContentNode::Catenation(previous, next));
        self.nodes.len() - 1
    }

    pub(crate) fn push_alternation(&mut self, left: usize, right: usize) -> usize {
        self.nodes.push(ContentNode::Alternation(left, right));
        self.nodes.len() - 1
    }

    pub(crate) fn push_zero_or_one(&mut self, child: usize) -> usize {
        self.nodes.push(ContentNode::ZeroOrOne(child));
        self.nodes.len() - 1
    }

    pub(crate) fn push_zero_or_more(&mut self, child: usize) -> usize {
        self.nodes.push(ContentNode::ZeroOrMore(child));
        self.nodes.len() - 1
    }

    pub(crate) fn push_one_or_more(&mut self, child: usize) -> usize {
        self.nodes.push(ContentNode::OneOrMore(child));
        self.nodes.len() - 1
    }

    pub(crate) fn set_root(&mut self, root: usize) {
        self.root = root;
    }

    fn automaton(&mut self) -> Arc<Nfa> {
        if let Some(nfa) = self.compiled.as_ref() {
            return nfa.clone();
        }
        let nfa = Arc::new(Nfa::assemble(self));
        self.compiled = Some(nfa.clone());
        nfa
    }

    fn display_to(&self, to: &mut impl std::fmt::Write, node: usize) -> std::fmt::Result {
        use ContentNode::*;

        match &self.nodes[node] {
            Name(name) => write!(to, "{name}"),
            Catenation(previous, next) => {
                if matches!(self.nodes[*previous], Alternation(_, _)) {
                    write!(to, "(")?;
                    self.display_to(to, *previous)?;
                    write!(to, ")")?;
                } else {
                    self.display_to(to, *previous)?;
                }

                write!(to, ",")?;

                if matches!(self.nodes[*next], Alternation(_, _)) {
                    write!(to, "(")?;
                    self.display_to(to, *next)?;
                    write!(to, ")")
                } else {
                    self.display_to(to, *next)
                }
            }
            Alternation(left, right) => {
                if matches!(self.nodes[*left], Catenation(_, _)) {
                    write!(to, "(")?;
                    self.display_to(to, *left)?;
                    write!(to, ")")?;
                } else {
                    self.display_to(to, *left)?;
                }

                write!(to, "|")?;

                if matches!(self.nodes[*right], Catenation(_, _)) {
                    write!(to, "(")?;
                    self.display_to(to, *right)?;
                    write!(to, ")")
                } else {
                    self.display_to(to, *right)
                }
            }
            ZeroOrOne(child) => self.display_suffixed(to, *child, "?"),
            ZeroOrMore(child) => self.display_suffixed(to, *child, "*"),
            OneOrMore(child) => self.display_suffixed(to, *child, "+"),
        }
    }

    fn display_suffixed(
        &self,
        to: &mut impl std::fmt::Write,
        child: usize,
        suffix: &str,
    ) -> std::fmt::Result {
        if matches!(self.nodes[child], ContentNode::Name(_)) {
            self.display_to(to, child)?;
            write!(to, "{suffix}")
        } else {
            write!(to, "(")?;
            self.display_to(to, child)?;
            write!(to, "){suffix}")
        }
    }
}

impl std::fmt::Display for ElementContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ContentNode::*;

        if self.nodes.is_empty() {
            return write!(f, "()");
        }
        let outer = !matches!(
            self.nodes[self.root],
            OneOrMore(_) | ZeroOrMore(_) | ZeroOrOne(_)
        );
        if outer {
            write!(f, "(")?;
        }
        self.display_to(f, self.root)?;
        if outer {
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Thompson-constructed NFA over element names.
///
/// Each state carries at most one symbol transition plus ε edges, so the
/// automaton size is linear in the content model.
#[derive(Debug)]
pub(crate) struct Nfa {
    name_ids: HashMap<Box<str>, usize>,
    epsilon: Vec<Vec<usize>>,
    symbol: Vec<Option<(usize, usize)>>,
    start: usize,
    accept: usize,
}

impl Nfa {
    fn assemble(content: &ElementContent) -> Self {
        let mut nfa = Nfa {
            name_ids: HashMap::new(),
            epsilon: vec![],
            symbol: vec![],
            start: 0,
            accept: 0,
        };
        let (start, accept) = nfa.fragment(content, content.root);
        nfa.start = start;
        nfa.accept = accept;
        nfa
    }

    fn new_state(&mut self) -> usize {
        self.epsilon.push(vec![]);
        self.symbol.push(None);
        self.epsilon.len() - 1
    }

    /// Build the fragment for `node` and return its (start, accept) pair.
    fn fragment(&mut self, content: &ElementContent, node: usize) -> (usize, usize) {
        use ContentNode::*;

        match &content.nodes[node] {
            Name(name) => {
                let next_id = self.name_ids.len();
                let id = *self.name_ids.entry(name.clone()).or_insert(next_id);
                let start = self.new_state();
                let accept = self.new_state();
                self.symbol[start] = Some((id, accept));
                (start, accept)
            }
            Catenation(previous, next) => {
                let (start, mid) = self.fragment(content, *previous);
                let (mid2, accept) = self.fragment(content, *next);
                self.epsilon[mid].push(mid2);
                (start, accept)
            }
            Alternation(left, right) => {
                let (ls, la) = self.fragment(content, *left);
                let (rs, ra) = self.fragment(content, *right);
                let start = self.new_state();
                let accept = self.new_state();
                self.epsilon[start].push(ls);
                self.epsilon[start].push(rs);
                self.epsilon[la].push(accept);
                self.epsilon[ra].push(accept);
                (start, accept)
            }
            ZeroOrOne(child) => {
                let (cs, ca) = self.fragment(content, *child);
                let start = self.new_state();
                let accept = self.new_state();
                self.epsilon[start].push(cs);
                self.epsilon[start].push(accept);
                self.epsilon[ca].push(accept);
                (start, accept)
            }
            ZeroOrMore(child) => {
                let (cs, ca) = self.fragment(content, *child);
                let start = self.new_state();
                let accept = self.new_state();
                self.epsilon[start].push(cs);
                self.epsilon[start].push(accept);
                self.epsilon[ca].push(cs);
                self.epsilon[ca].push(accept);
                (start, accept)
            }
            OneOrMore(child) => {
                let (cs, ca) = self.fragment(content, *child);
                let start = self.new_state();
                let accept = self.new_state();
                self.epsilon[start].push(cs);
                self.epsilon[ca].push(cs);
                self.epsilon[ca].push(accept);
                (start, accept)
            }
        }
    }

    /// Expand `states` (a sorted set) with its ε-closure.
    fn closure(&self, states: &mut Vec<usize>) {
        let mut stack = states.clone();
        while let Some(state) = stack.pop() {
            for &next in &self.epsilon[state] {
                if let Err(pos) = states.binary_search(&next) {
                    states.insert(pos, next);
                    stack.push(next);
                }
            }
        }
    }

    fn initial_states(&self) -> Vec<usize> {
        let mut states = vec![self.start];
        self.closure(&mut states);
        states
    }

    /// Advance on `name`; an empty result means no transition was possible.
    fn step(&self, states: &[usize], name: &str) -> Vec<usize> {
        let Some(&id) = self.name_ids.get(name) else {
            return vec![];
        };
        let mut next = vec![];
        for &state in states {
            if let Some((symbol, to)) = self.symbol[state] {
                if symbol == id {
                    if let Err(pos) = next.binary_search(&to) {
                        next.insert(pos, to);
                    }
                }
            }
        }
        self.closure(&mut next);
        next
    }

    fn accepts(&self, states: &[usize]) -> bool {
        states.binary_search(&self.accept).is_ok()
    }
}

pub enum ContentSpecValidationError {
    UnacceptableElement,
    UnacceptablePCDATA,
    NotReachedAcceptedState,
}

/// Streaming acceptance state for one element being validated.
#[derive(Debug)]
pub struct ValidationContext {
    invalid: bool,
    whitespace: bool,
    external_element_content: bool,
    validator: ContentSpecValidator,
}

impl ValidationContext {
    pub fn push_name(&mut self, name: &str) {
        self.invalid |= self.validator.accept(name).is_err();
    }

    pub fn push_pcdata(&mut self) {
        self.invalid |= self.validator.allow_char_data_checked().is_err();
    }

    pub fn push_whitespaces(&mut self) {
        self.whitespace = true;
        self.invalid |= self.validator.allow_whitespace_checked().is_err();
    }

    /// In element content validation, comments and processing instructions
    /// can be treated the same as whitespace.
    pub fn push_misc(&mut self) {
        self.invalid |= self.validator.allow_whitespace_checked().is_err();
    }

    /// Returns `true` iff every pushed item was acceptable and the model
    /// reached an accepting state.
    pub fn finish(&mut self) -> bool {
        self.invalid |= self.validator.done().is_err();
        !self.invalid
    }

    pub fn allow_char_data(&self) -> bool {
        self.validator.allow_char_data_checked().is_ok()
    }

    pub(crate) fn whitespace(&self) -> bool {
        self.whitespace
    }

    pub(crate) fn is_element_content(&self) -> bool {
        matches!(self.validator, ContentSpecValidator::Children { .. })
    }

    pub(crate) fn is_external_element_content(&self) -> bool {
        self.external_element_content
    }
}

#[derive(Debug)]
pub(crate) enum ContentSpecValidator {
    Empty,
    Any,
    Mixed(Arc<HashSet<Box<str>>>),
    Children {
        unrecoverable: bool,
        states: Vec<usize>,
        nfa: Arc<Nfa>,
    },
}

impl ContentSpecValidator {
    pub fn accept(&mut self, name: &str) -> Result<(), ContentSpecValidationError> {
        match self {
            ContentSpecValidator::Empty => Err(ContentSpecValidationError::UnacceptableElement),
            ContentSpecValidator::Any => Ok(()),
            ContentSpecValidator::Mixed(allowed) => {
                if allowed.contains(name) {
                    Ok(())
                } else {
                    Err(ContentSpecValidationError::UnacceptableElement)
                }
            }
            ContentSpecValidator::Children {
                unrecoverable,
                states,
                nfa,
            } => {
                if *unrecoverable {
                    // Since it is no longer possible to validate correctly,
                    // it returns OK without performing any action.
                    return Ok(());
                }

                let next = nfa.step(states, name);
                if next.is_empty() {
                    *unrecoverable = true;
                    Err(ContentSpecValidationError::UnacceptableElement)
                } else {
                    *states = next;
                    Ok(())
                }
            }
        }
    }

    fn allow_char_data_checked(&self) -> Result<(), ContentSpecValidationError> {
        match self {
            ContentSpecValidator::Any | ContentSpecValidator::Mixed(_) => Ok(()),
            ContentSpecValidator::Empty | ContentSpecValidator::Children { .. } => {
                Err(ContentSpecValidationError::UnacceptablePCDATA)
            }
        }
    }

    fn allow_whitespace_checked(&self) -> Result<(), ContentSpecValidationError> {
        match self {
            ContentSpecValidator::Empty => Err(ContentSpecValidationError::UnacceptablePCDATA),
            _ => Ok(()),
        }
    }

    pub fn done(&self) -> Result<(), ContentSpecValidationError> {
        match self {
            ContentSpecValidator::Children {
                unrecoverable,
                states,
                nfa,
            } => {
                if *unrecoverable || nfa.accepts(states) {
                    Ok(())
                } else {
                    Err(ContentSpecValidationError::NotReachedAcceptedState)
                }
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // (a, b)
    fn sequence_ab() -> ContentSpec {
        let mut content = ElementContent::new();
        let a = content.push_name("a");
        let b = content.push_name("b");
        let root = content.push_catenation(a, b);
        content.set_root(root);
        ContentSpec::Children(content)
    }

    #[test]
    fn sequence_requires_order() {
        let mut spec = sequence_ab();
        let mut validator = spec.new_validator(false);
        validator.push_name("a");
        validator.push_name("b");
        assert!(validator.finish());

        let mut validator = spec.new_validator(false);
        validator.push_name("b");
        validator.push_name("a");
        assert!(!validator.finish());

        let mut validator = spec.new_validator(false);
        validator.push_name("a");
        assert!(!validator.finish());
    }

    #[test]
    fn repetition_and_choice() {
        // (a | b)* , c+
        let mut content = ElementContent::new();
        let a = content.push_name("a");
        let b = content.push_name("b");
        let choice = content.push_alternation(a, b);
        let star = content.push_zero_or_more(choice);
        let c = content.push_name("c");
        let plus = content.push_one_or_more(c);
        let root = content.push_catenation(star, plus);
        content.set_root(root);
        let mut spec = ContentSpec::Children(content);

        let mut validator = spec.new_validator(false);
        for name in ["a", "b", "b", "c", "c"] {
            validator.push_name(name);
        }
        assert!(validator.finish());

        let mut validator = spec.new_validator(false);
        for name in ["a", "b"] {
            validator.push_name(name);
        }
        assert!(!validator.finish());

        let mut validator = spec.new_validator(false);
        validator.push_name("c");
        assert!(validator.finish());
    }

    #[test]
    fn element_content_rejects_pcdata() {
        let mut spec = sequence_ab();
        let mut validator = spec.new_validator(false);
        assert!(!validator.allow_char_data());
        validator.push_pcdata();
        validator.push_name("a");
        validator.push_name("b");
        assert!(!validator.finish());
    }

    #[test]
    fn mixed_content_accepts_declared_names_and_pcdata() {
        let mut spec = ContentSpec::Mixed(Arc::new(HashSet::from(["a".into()])));
        let mut validator = spec.new_validator(false);
        assert!(validator.allow_char_data());
        validator.push_pcdata();
        validator.push_name("a");
        validator.push_name("a");
        assert!(validator.finish());

        let mut validator = spec.new_validator(false);
        validator.push_name("b");
        assert!(!validator.finish());
    }

    #[test]
    fn empty_content_rejects_everything() {
        let mut spec = ContentSpec::EMPTY;
        let mut validator = spec.new_validator(false);
        assert!(validator.finish());

        let mut validator = spec.new_validator(false);
        validator.push_name("a");
        assert!(!validator.finish());
    }

    #[test]
    fn display_content_models() {
        let spec = sequence_ab();
        assert_eq!(spec.to_string(), "(a,b)");
        assert_eq!(ContentSpec::EMPTY.to_string(), "EMPTY");
        assert_eq!(
            ContentSpec::Mixed(Arc::new(HashSet::new())).to_string(),
            "(#PCDATA)"
        );
    }
}
