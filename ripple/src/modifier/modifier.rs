use crate::collection::Document;
use crate::common::{FieldPath, Value};
use crate::errors::{ErrorKind, RippleError, RippleResult};
use crate::filter::Selector;

/// Field name used to wrap array elements when a `$pull` condition is
/// evaluated with the matcher.
pub(crate) const PULL_ELEMENT: &str = "element";

/// An update expression: an ordered list of field updates.
///
/// Parsed from a document in the MongoDB update syntax, or built fluently.
/// Updates apply in list order; a parsed modifier lists its operators in the
/// document's key order.
///
/// ```rust
/// use ripple::doc;
/// use ripple::modifier::{apply_modifier, Modifier};
///
/// let modifier = Modifier::new().set("status", "closed").inc("edits", 1);
/// let updated = apply_modifier(&doc! { id: "1", status: "open" }, &modifier, None).unwrap();
/// assert_eq!(updated, doc! { id: "1", status: "closed", edits: 1 });
///
/// let parsed = Modifier::parse(&doc! { "$push": { tags: "new" } }).unwrap();
/// assert_eq!(parsed.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Modifier {
    updates: Vec<FieldUpdate>,
}

/// One operator applied to one path.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub path: FieldPath,
    pub op: UpdateOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(Value),
    Unset,
    Inc(Value),
    Mul(Value),
    Min(Value),
    Max(Value),
    Rename(FieldPath),
    Push(PushSpec),
    PushAll(Vec<Value>),
    Pull(PullSpec),
    PullAll(Vec<Value>),
    AddToSet(Vec<Value>),
    /// `true` removes the first element, `false` the last.
    Pop(bool),
}

/// Operand of `$push`: values to insert plus the optional `$position` and
/// `$slice` modifiers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PushSpec {
    pub values: Vec<Value>,
    pub position: Option<i64>,
    pub slice: Option<i64>,
}

impl PushSpec {
    pub fn each(values: Vec<Value>) -> Self {
        PushSpec {
            values,
            position: None,
            slice: None,
        }
    }

    /// Inserts at `position`; a negative position counts from the end.
    pub fn at(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    /// Keeps the first `n` elements, or the last `-n` when negative.
    pub fn slice(mut self, n: i64) -> Self {
        self.slice = Some(n);
        self
    }
}

/// Operand of `$pull`.
#[derive(Debug, Clone, PartialEq)]
pub enum PullSpec {
    /// Removes elements equal to the value.
    Value(Value),
    /// Removes document elements matching the selector.
    Selector(Selector),
    /// Removes elements satisfying an operator condition, evaluated on the
    /// element wrapped as `{ element: <value> }`.
    Condition(Selector),
}

fn invalid(message: &str) -> RippleError {
    log::error!("{}", message);
    RippleError::new(message, ErrorKind::InvalidOperation)
}

impl Modifier {
    pub fn new() -> Self {
        Modifier::default()
    }

    pub fn updates(&self) -> &[FieldUpdate] {
        &self.updates
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Parses an update document such as `{ "$set": { "a.b": 1 }, "$inc": { n: 2 } }`.
    ///
    /// A [Document] keeps its keys sorted, so operators, and the paths within
    /// each operator, apply in key order rather than the order they were
    /// written: `$inc` runs before `$set` above. Build the modifier with the
    /// fluent methods when the order of operations matters.
    ///
    /// Fails with `InvalidOperation` for unknown operators, top-level keys
    /// that are not operators, operands that are not documents and malformed
    /// operator arguments.
    pub fn parse(document: &Document) -> RippleResult<Modifier> {
        let mut updates = Vec::new();
        for (op, fields) in document.iter() {
            if !op.starts_with('$') {
                return Err(invalid(&format!(
                    "Update document may only contain operators, found field '{}'",
                    op
                )));
            }
            let Value::Document(fields) = fields else {
                return Err(invalid(&format!(
                    "Operator {} expects a document of fields, found {}",
                    op,
                    fields.type_name()
                )));
            };

            for (field, operand) in fields.iter() {
                let path = FieldPath::parse(field);
                if path.is_malformed() {
                    return Err(invalid(&format!("Invalid field path '{}' in {}", field, op)));
                }
                let op = Self::parse_op(op, operand)?;
                updates.push(FieldUpdate { path, op });
            }
        }
        Ok(Modifier { updates })
    }

    fn parse_op(op: &str, operand: &Value) -> RippleResult<UpdateOp> {
        let parsed = match op {
            "$set" => UpdateOp::Set(operand.clone()),
            "$unset" => UpdateOp::Unset,
            "$inc" => UpdateOp::Inc(operand.clone()),
            "$mul" => UpdateOp::Mul(operand.clone()),
            "$min" => UpdateOp::Min(operand.clone()),
            "$max" => UpdateOp::Max(operand.clone()),
            "$rename" => match operand {
                Value::String(target) if !FieldPath::parse(target).is_malformed() => {
                    UpdateOp::Rename(FieldPath::parse(target))
                }
                _ => return Err(invalid("$rename expects a field path string")),
            },
            "$push" => UpdateOp::Push(Self::parse_push(operand)?),
            "$pushAll" => UpdateOp::PushAll(Self::array_operand(op, operand)?),
            "$pull" => UpdateOp::Pull(Self::parse_pull(operand)?),
            "$pullAll" => UpdateOp::PullAll(Self::array_operand(op, operand)?),
            "$addToSet" => match Self::each_operand(operand)? {
                Some(values) => UpdateOp::AddToSet(values),
                None => UpdateOp::AddToSet(vec![operand.clone()]),
            },
            "$pop" => match operand.as_f64() {
                Some(n) => UpdateOp::Pop(n < 0.0),
                None => {
                    log::error!("$pop expects 1 or -1, found {}", operand);
                    return Err(RippleError::new(
                        &format!("$pop expects 1 or -1, found {}", operand),
                        ErrorKind::TypeMismatch,
                    ));
                }
            },
            unknown => return Err(invalid(&format!("Unsupported update operator {}", unknown))),
        };
        Ok(parsed)
    }

    fn each_operand(operand: &Value) -> RippleResult<Option<Vec<Value>>> {
        match operand {
            Value::Document(doc) => match doc.get("$each") {
                Some(Value::Array(values)) => Ok(Some(values.clone())),
                Some(_) => Err(invalid("$each expects an array")),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn parse_push(operand: &Value) -> RippleResult<PushSpec> {
        let Some(values) = Self::each_operand(operand)? else {
            return Ok(PushSpec::each(vec![operand.clone()]));
        };

        let mut spec = PushSpec::each(values);
        if let Value::Document(doc) = operand {
            for (key, value) in doc.iter() {
                match key.as_str() {
                    "$each" => {}
                    "$position" => match value.as_i64() {
                        Some(p) => spec.position = Some(p),
                        None => return Err(invalid("$position expects an integer")),
                    },
                    "$slice" => match value.as_i64() {
                        Some(n) => spec.slice = Some(n),
                        None => return Err(invalid("$slice expects an integer")),
                    },
                    other => return Err(invalid(&format!("Unsupported $push modifier {}", other))),
                }
            }
        }
        Ok(spec)
    }

    fn parse_pull(operand: &Value) -> RippleResult<PullSpec> {
        let Value::Document(doc) = operand else {
            return Ok(PullSpec::Value(operand.clone()));
        };
        if doc.is_empty() {
            return Ok(PullSpec::Value(operand.clone()));
        }

        let has_operators = doc.keys().any(|k| k.starts_with('$'));
        let has_fields = doc.keys().any(|k| !k.starts_with('$'));
        let parsed = if has_operators && !has_fields {
            let mut wrapper = Document::new();
            wrapper.insert(PULL_ELEMENT, operand.clone());
            Selector::parse(&wrapper).map(PullSpec::Condition)
        } else {
            Selector::parse(doc).map(PullSpec::Selector)
        };
        parsed.map_err(|e| RippleError::new_with_cause("Invalid $pull condition", ErrorKind::InvalidOperation, e))
    }

    fn array_operand(op: &str, operand: &Value) -> RippleResult<Vec<Value>> {
        match operand {
            Value::Array(values) => Ok(values.clone()),
            other => {
                log::error!("{} expects an array, found {}", op, other.type_name());
                Err(RippleError::new(
                    &format!("{} expects an array, found {}", op, other.type_name()),
                    ErrorKind::TypeMismatch,
                ))
            }
        }
    }

    fn with(mut self, path: &str, op: UpdateOp) -> Self {
        self.updates.push(FieldUpdate {
            path: FieldPath::parse(path),
            op,
        });
        self
    }

    pub fn set<T: Into<Value>>(self, path: &str, value: T) -> Self {
        self.with(path, UpdateOp::Set(value.into()))
    }

    pub fn unset(self, path: &str) -> Self {
        self.with(path, UpdateOp::Unset)
    }

    pub fn inc<T: Into<Value>>(self, path: &str, delta: T) -> Self {
        self.with(path, UpdateOp::Inc(delta.into()))
    }

    pub fn mul<T: Into<Value>>(self, path: &str, factor: T) -> Self {
        self.with(path, UpdateOp::Mul(factor.into()))
    }

    pub fn min<T: Into<Value>>(self, path: &str, value: T) -> Self {
        self.with(path, UpdateOp::Min(value.into()))
    }

    pub fn max<T: Into<Value>>(self, path: &str, value: T) -> Self {
        self.with(path, UpdateOp::Max(value.into()))
    }

    pub fn rename(self, path: &str, to: &str) -> Self {
        self.with(path, UpdateOp::Rename(FieldPath::parse(to)))
    }

    pub fn push<T: Into<Value>>(self, path: &str, value: T) -> Self {
        self.with(path, UpdateOp::Push(PushSpec::each(vec![value.into()])))
    }

    pub fn push_with(self, path: &str, spec: PushSpec) -> Self {
        self.with(path, UpdateOp::Push(spec))
    }

    pub fn push_all<T: Into<Value>>(self, path: &str, values: Vec<T>) -> Self {
        self.with(path, UpdateOp::PushAll(values.into_iter().map(Into::into).collect()))
    }

    pub fn pull<T: Into<Value>>(self, path: &str, value: T) -> Self {
        self.with(path, UpdateOp::Pull(PullSpec::Value(value.into())))
    }

    /// Removes the document elements matching `selector`.
    pub fn pull_matching(self, path: &str, selector: Selector) -> Self {
        self.with(path, UpdateOp::Pull(PullSpec::Selector(selector)))
    }

    pub fn pull_all<T: Into<Value>>(self, path: &str, values: Vec<T>) -> Self {
        self.with(path, UpdateOp::PullAll(values.into_iter().map(Into::into).collect()))
    }

    pub fn add_to_set<T: Into<Value>>(self, path: &str, value: T) -> Self {
        self.with(path, UpdateOp::AddToSet(vec![value.into()]))
    }

    pub fn add_each_to_set<T: Into<Value>>(self, path: &str, values: Vec<T>) -> Self {
        self.with(path, UpdateOp::AddToSet(values.into_iter().map(Into::into).collect()))
    }

    pub fn pop_first(self, path: &str) -> Self {
        self.with(path, UpdateOp::Pop(true))
    }

    pub fn pop_last(self, path: &str) -> Self {
        self.with(path, UpdateOp::Pop(false))
    }
}

impl TryFrom<Document> for Modifier {
    type Error = RippleError;

    fn try_from(value: Document) -> Result<Self, Self::Error> {
        Modifier::parse(&value)
    }
}

impl TryFrom<&Document> for Modifier {
    type Error = RippleError;

    fn try_from(value: &Document) -> Result<Self, Self::Error> {
        Modifier::parse(value)
    }
}
