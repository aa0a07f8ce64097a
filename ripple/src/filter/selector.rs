use crate::collection::Document;
use crate::common::{set_path, FieldPath, Value, DOC_ID};
use crate::errors::{ErrorKind, RippleError, RippleResult};
use regex::{Regex, RegexBuilder};
use std::fmt::{Debug, Formatter};

/// A parsed query expression.
///
/// A selector is a list of clauses combined with an implicit AND. Each
/// clause either tests one field path or combines nested selectors with
/// `$and`, `$or` or `$nor`. An empty selector matches every document.
///
/// Selectors are parsed from a [Document] in the MongoDB query syntax, or
/// built with the fluent API in [field](crate::filter::field):
///
/// ```rust
/// use ripple::doc;
/// use ripple::filter::{field, Selector};
///
/// let parsed = Selector::parse(&doc! {
///     status: "open",
///     priority: { "$gte": 2 },
/// }).unwrap();
/// // parsed clauses follow the document's key order
/// let built = field("priority").gte(2).and(field("status").eq("open"));
/// assert_eq!(parsed, built);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selector {
    clauses: Vec<Clause>,
}

/// One top-level entry of a [Selector].
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Tests the values found at a field path.
    Field(FieldPath, Condition),
    /// Every nested selector matches.
    And(Vec<Selector>),
    /// At least one nested selector matches.
    Or(Vec<Selector>),
    /// No nested selector matches.
    Nor(Vec<Selector>),
    /// An operator the engine does not implement; never matches.
    Unknown(String),
}

/// The test applied to a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equality with a literal value.
    Literal(Value),
    /// Regular expression over string values.
    Regex(RegexPattern),
    /// Operator expression, every operator must hold.
    Operators(Vec<FieldOp>),
}

/// A field-level operator such as `$gt` or `$in`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    All(Vec<Value>),
    Size(usize),
    Exists(bool),
    ElemMatch(ElemMatch),
    Not(Box<Condition>),
    Regex(RegexPattern),
    Unknown(String),
}

/// Operand of `$elemMatch`: a sub-selector applied to document elements, or
/// operators applied to the elements themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum ElemMatch {
    Selector(Selector),
    Operators(Vec<FieldOp>),
}

/// A compiled regular expression together with its source pattern and
/// MongoDB-style option flags (`i`, `m`, `s`, `x`).
#[derive(Clone)]
pub struct RegexPattern {
    pattern: String,
    options: String,
    regex: Regex,
}

impl RegexPattern {
    pub fn new(pattern: &str, options: &str) -> RippleResult<RegexPattern> {
        let mut builder = RegexBuilder::new(pattern);
        for flag in options.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                other => {
                    log::error!("Unsupported regex option '{}'", other);
                    return Err(RippleError::new(
                        &format!("Unsupported regex option '{}'", other),
                        ErrorKind::SelectorError,
                    ));
                }
            };
        }

        let regex = builder.build().map_err(|e| {
            log::error!("Invalid regular expression {}: {}", pattern, e);
            RippleError::from(e)
        })?;

        Ok(RegexPattern {
            pattern: pattern.to_string(),
            options: options.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn options(&self) -> &str {
        &self.options
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for RegexPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.options == other.options
    }
}

impl Debug for RegexPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}", self.pattern, self.options)
    }
}

fn selector_error(message: &str) -> RippleError {
    log::error!("{}", message);
    RippleError::new(message, ErrorKind::SelectorError)
}

impl Selector {
    /// Creates a selector that matches every document.
    pub fn new() -> Self {
        Selector::default()
    }

    pub(crate) fn from_clauses(clauses: Vec<Clause>) -> Self {
        Selector { clauses }
    }

    /// Parses a selector document.
    ///
    /// Fails with `SelectorError` on malformed operands, e.g. `$in` with a
    /// non-array operand, an invalid regular expression or a logical
    /// operator that is not given an array of documents. Unknown operators
    /// are accepted and never match.
    pub fn parse(document: &Document) -> RippleResult<Selector> {
        let mut clauses = Vec::with_capacity(document.size());
        for (key, value) in document.iter() {
            clauses.push(Self::parse_clause(key, value)?);
        }
        Ok(Selector { clauses })
    }

    fn parse_clause(key: &str, value: &Value) -> RippleResult<Clause> {
        match key {
            "$and" => Ok(Clause::And(Self::parse_logical(key, value)?)),
            "$or" => Ok(Clause::Or(Self::parse_logical(key, value)?)),
            "$nor" => Ok(Clause::Nor(Self::parse_logical(key, value)?)),
            op if op.starts_with('$') => {
                log::warn!("Unsupported top-level selector operator {}, clause will not match", op);
                Ok(Clause::Unknown(op.to_string()))
            }
            field => {
                let path = FieldPath::parse(field);
                if path.is_malformed() {
                    return Err(selector_error(&format!("Invalid field path '{}' in selector", field)));
                }
                Ok(Clause::Field(path, Self::parse_condition(field, value)?))
            }
        }
    }

    fn parse_logical(op: &str, value: &Value) -> RippleResult<Vec<Selector>> {
        let items = match value {
            Value::Array(items) if !items.is_empty() => items,
            _ => {
                return Err(selector_error(&format!("{} expects a non-empty array of selectors", op)));
            }
        };

        items
            .iter()
            .map(|item| match item {
                Value::Document(doc) => Selector::parse(doc),
                other => Err(selector_error(&format!(
                    "{} expects selector documents, found {}",
                    op,
                    other.type_name()
                ))),
            })
            .collect()
    }

    fn is_operator_document(field: &str, doc: &Document) -> RippleResult<bool> {
        if doc.is_empty() {
            return Ok(false);
        }
        let operator_keys = doc.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys == 0 {
            Ok(false)
        } else if operator_keys == doc.size() {
            Ok(true)
        } else {
            Err(selector_error(&format!(
                "Selector for '{}' mixes operators and plain fields",
                field
            )))
        }
    }

    fn parse_condition(field: &str, value: &Value) -> RippleResult<Condition> {
        match value {
            Value::Document(doc) if Self::is_operator_document(field, doc)? => {
                Ok(Condition::Operators(Self::parse_operators(field, doc)?))
            }
            literal => Ok(Condition::Literal(literal.clone())),
        }
    }

    fn parse_operators(field: &str, doc: &Document) -> RippleResult<Vec<FieldOp>> {
        let mut ops = Vec::with_capacity(doc.size());

        match (doc.get("$regex"), doc.get("$options")) {
            (Some(Value::String(pattern)), options) => {
                let options = match options {
                    None => "",
                    Some(Value::String(o)) => o.as_str(),
                    Some(_) => return Err(selector_error("$options must be a string")),
                };
                ops.push(FieldOp::Regex(RegexPattern::new(pattern, options)?));
            }
            (Some(_), _) => return Err(selector_error("$regex must be a string")),
            (None, Some(_)) => return Err(selector_error("$options needs a $regex")),
            (None, None) => {}
        }

        for (op, operand) in doc.iter() {
            let parsed = match op.as_str() {
                "$regex" | "$options" => continue,
                "$eq" => FieldOp::Eq(operand.clone()),
                "$ne" => FieldOp::Ne(operand.clone()),
                "$gt" => FieldOp::Gt(operand.clone()),
                "$gte" => FieldOp::Gte(operand.clone()),
                "$lt" => FieldOp::Lt(operand.clone()),
                "$lte" => FieldOp::Lte(operand.clone()),
                "$in" => FieldOp::In(Self::array_operand(op, operand)?),
                "$nin" => FieldOp::Nin(Self::array_operand(op, operand)?),
                "$all" => FieldOp::All(Self::array_operand(op, operand)?),
                "$size" => match operand.as_i64() {
                    Some(n) if n >= 0 => FieldOp::Size(n as usize),
                    _ => return Err(selector_error("$size expects a non-negative integer")),
                },
                "$exists" => match operand {
                    Value::Bool(b) => FieldOp::Exists(*b),
                    Value::I64(_) | Value::F64(_) => {
                        FieldOp::Exists(operand.as_f64().map(|n| n != 0.0).unwrap_or(false))
                    }
                    _ => return Err(selector_error("$exists expects a boolean")),
                },
                "$elemMatch" => match operand {
                    Value::Document(sub) => FieldOp::ElemMatch(Self::parse_elem_match(field, sub)?),
                    _ => return Err(selector_error("$elemMatch expects a document")),
                },
                "$not" => match operand {
                    Value::Document(sub) if Self::is_operator_document(field, sub)? => {
                        FieldOp::Not(Box::new(Condition::Operators(Self::parse_operators(field, sub)?)))
                    }
                    _ => return Err(selector_error("$not expects an operator expression")),
                },
                unknown => {
                    log::warn!("Unsupported selector operator {} on '{}', clause will not match", unknown, field);
                    FieldOp::Unknown(unknown.to_string())
                }
            };
            ops.push(parsed);
        }
        Ok(ops)
    }

    fn parse_elem_match(field: &str, sub: &Document) -> RippleResult<ElemMatch> {
        let operators_only = !sub.is_empty()
            && sub
                .keys()
                .all(|k| k.starts_with('$') && !matches!(k.as_str(), "$and" | "$or" | "$nor"));
        if operators_only {
            Ok(ElemMatch::Operators(Self::parse_operators(field, sub)?))
        } else {
            Ok(ElemMatch::Selector(Selector::parse(sub)?))
        }
    }

    fn array_operand(op: &str, operand: &Value) -> RippleResult<Vec<Value>> {
        match operand {
            Value::Array(items) => Ok(items.clone()),
            other => Err(selector_error(&format!(
                "{} expects an array, found {}",
                op,
                other.type_name()
            ))),
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns the condition of the only top-level clause on `field`, if
    /// exactly one such clause exists.
    pub fn field_condition(&self, field: &str) -> Option<&Condition> {
        let mut found = None;
        for clause in &self.clauses {
            if let Clause::Field(path, condition) = clause {
                if path.as_str() == field {
                    if found.is_some() {
                        return None;
                    }
                    found = Some(condition);
                }
            }
        }
        found
    }

    /// Returns true if every top-level clause is a field clause on one of
    /// `fields`.
    pub fn is_covered_by(&self, fields: &[String]) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Field(path, _) => fields.iter().any(|f| f == path.as_str()),
            _ => false,
        })
    }

    /// Returns true if an operator anywhere in the selector is unsupported.
    pub fn has_unknown_operators(&self) -> bool {
        self.clauses.iter().any(|clause| match clause {
            Clause::Unknown(_) => true,
            Clause::And(subs) | Clause::Or(subs) | Clause::Nor(subs) => {
                subs.iter().any(|s| s.has_unknown_operators())
            }
            Clause::Field(_, condition) => condition.has_unknown_operators(),
        })
    }

    /// Returns a selector that requires both this selector and `other`.
    pub fn and(mut self, other: Selector) -> Selector {
        self.clauses.extend(other.clauses);
        self
    }

    /// Returns a selector that requires this selector or `other`.
    pub fn or(self, other: Selector) -> Selector {
        Selector {
            clauses: vec![Clause::Or(vec![self, other])],
        }
    }

    /// Builds the seed document of an upsert: every literal equality on a
    /// plain path, including those inside `$and`.
    pub(crate) fn literal_equalities(&self) -> RippleResult<Document> {
        let mut seed = Document::new();
        self.collect_equalities(&mut seed)?;
        Ok(seed)
    }

    fn collect_equalities(&self, seed: &mut Document) -> RippleResult<()> {
        for clause in &self.clauses {
            match clause {
                Clause::Field(path, condition) if !path.has_positional() => {
                    let value = match condition {
                        Condition::Literal(v) => Some(v),
                        Condition::Operators(ops) => ops.iter().find_map(|op| match op {
                            FieldOp::Eq(v) => Some(v),
                            _ => None,
                        }),
                        Condition::Regex(_) => None,
                    };
                    if let Some(value) = value {
                        set_path(seed, path, value.clone())?;
                    }
                }
                Clause::And(subs) => {
                    for sub in subs {
                        sub.collect_equalities(seed)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns the id if the selector is exactly `{ id: "<string>" }`.
    pub(crate) fn id_lookup(&self) -> Option<&str> {
        match self.clauses.as_slice() {
            [Clause::Field(path, Condition::Literal(Value::String(id)))] if path.as_str() == DOC_ID => {
                Some(id.as_str())
            }
            _ => None,
        }
    }
}

impl Condition {
    fn has_unknown_operators(&self) -> bool {
        match self {
            Condition::Literal(_) | Condition::Regex(_) => false,
            Condition::Operators(ops) => ops.iter().any(|op| op.has_unknown_operators()),
        }
    }
}

impl FieldOp {
    fn has_unknown_operators(&self) -> bool {
        match self {
            FieldOp::Unknown(_) => true,
            FieldOp::Not(condition) => condition.has_unknown_operators(),
            FieldOp::ElemMatch(ElemMatch::Selector(s)) => s.has_unknown_operators(),
            FieldOp::ElemMatch(ElemMatch::Operators(ops)) => {
                ops.iter().any(|op| op.has_unknown_operators())
            }
            _ => false,
        }
    }
}

impl TryFrom<Document> for Selector {
    type Error = RippleError;

    fn try_from(value: Document) -> Result<Self, Self::Error> {
        Selector::parse(&value)
    }
}

impl TryFrom<&Document> for Selector {
    type Error = RippleError;

    fn try_from(value: &Document) -> Result<Self, Self::Error> {
        Selector::parse(value)
    }
}
