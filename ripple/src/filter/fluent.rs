use crate::common::{FieldPath, Value, DOC_ID};
use crate::errors::RippleResult;
use crate::filter::{Clause, Condition, ElemMatch, FieldOp, RegexPattern, Selector};

/// Starts a selector on `field_name`, a dot-path.
///
/// ```rust
/// use ripple::filter::{field, or};
///
/// let adults = field("age").gte(18);
/// let named = field("name").in_array(vec!["Ada", "Grace"]);
/// let selector = or(vec![adults, named]);
/// assert_eq!(selector.clauses().len(), 1);
/// ```
pub fn field(field_name: &str) -> FluentSelector {
    FluentSelector {
        path: FieldPath::parse(field_name),
    }
}

/// Builds a single-field [Selector].
pub struct FluentSelector {
    path: FieldPath,
}

impl FluentSelector {
    fn condition(self, condition: Condition) -> Selector {
        Selector::from_clauses(vec![Clause::Field(self.path, condition)])
    }

    fn operator(self, op: FieldOp) -> Selector {
        self.condition(Condition::Operators(vec![op]))
    }

    /// Literal equality, same as `{ field: value }`.
    #[inline]
    pub fn eq<T: Into<Value>>(self, value: T) -> Selector {
        self.condition(Condition::Literal(value.into()))
    }

    #[inline]
    pub fn ne<T: Into<Value>>(self, value: T) -> Selector {
        self.operator(FieldOp::Ne(value.into()))
    }

    #[inline]
    pub fn gt<T: Into<Value>>(self, value: T) -> Selector {
        self.operator(FieldOp::Gt(value.into()))
    }

    #[inline]
    pub fn gte<T: Into<Value>>(self, value: T) -> Selector {
        self.operator(FieldOp::Gte(value.into()))
    }

    #[inline]
    pub fn lt<T: Into<Value>>(self, value: T) -> Selector {
        self.operator(FieldOp::Lt(value.into()))
    }

    #[inline]
    pub fn lte<T: Into<Value>>(self, value: T) -> Selector {
        self.operator(FieldOp::Lte(value.into()))
    }

    /// Matches when the field is within `[low, high]`.
    pub fn between<T: Into<Value>>(self, low: T, high: T) -> Selector {
        self.condition(Condition::Operators(vec![
            FieldOp::Gte(low.into()),
            FieldOp::Lte(high.into()),
        ]))
    }

    pub fn in_array<T: Into<Value>>(self, values: Vec<T>) -> Selector {
        self.operator(FieldOp::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in_array<T: Into<Value>>(self, values: Vec<T>) -> Selector {
        self.operator(FieldOp::Nin(values.into_iter().map(Into::into).collect()))
    }

    /// `$all`: the field array holds every listed value.
    pub fn contains_all<T: Into<Value>>(self, values: Vec<T>) -> Selector {
        self.operator(FieldOp::All(values.into_iter().map(Into::into).collect()))
    }

    pub fn size(self, size: usize) -> Selector {
        self.operator(FieldOp::Size(size))
    }

    pub fn exists(self, exists: bool) -> Selector {
        self.operator(FieldOp::Exists(exists))
    }

    /// `$elemMatch` with a sub-selector tested against document elements.
    pub fn elem_match(self, selector: Selector) -> Selector {
        self.operator(FieldOp::ElemMatch(ElemMatch::Selector(selector)))
    }

    /// `$not`: negates the condition `selector` places on this same field.
    /// Returns `None` if `selector` has no single clause on this field.
    pub fn not(self, selector: Selector) -> Option<Selector> {
        let condition = selector.field_condition(self.path.as_str())?.clone();
        Some(self.operator(FieldOp::Not(Box::new(condition))))
    }

    pub fn regex(self, pattern: &str) -> RippleResult<Selector> {
        self.regex_with_options(pattern, "")
    }

    pub fn regex_with_options(self, pattern: &str, options: &str) -> RippleResult<Selector> {
        let pattern = RegexPattern::new(pattern, options)?;
        Ok(self.condition(Condition::Regex(pattern)))
    }
}

/// Matches every document.
pub fn all() -> Selector {
    Selector::new()
}

/// Matches the document with the given id.
pub fn by_id(id: &str) -> Selector {
    field(DOC_ID).eq(id)
}

/// `$and` over `selectors`.
pub fn and(selectors: Vec<Selector>) -> Selector {
    Selector::from_clauses(vec![Clause::And(selectors)])
}

/// `$or` over `selectors`.
pub fn or(selectors: Vec<Selector>) -> Selector {
    Selector::from_clauses(vec![Clause::Or(selectors)])
}

/// `$nor` over `selectors`.
pub fn nor(selectors: Vec<Selector>) -> Selector {
    Selector::from_clauses(vec![Clause::Nor(selectors)])
}
