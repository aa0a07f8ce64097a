use crate::collection::Document;
use crate::common::{resolve, Branch, FieldPath, Value};
use crate::filter::{Clause, Condition, ElemMatch, FieldOp, RegexPattern, Selector};
use std::cmp::Ordering;

/// Outcome of evaluating a selector: `None` when it does not match,
/// otherwise the array element index the match went through, if any.
type MatchOutcome = Option<Option<usize>>;

const MATCHED: MatchOutcome = Some(None);

/// Returns true if `document` satisfies `selector`.
///
/// ```rust
/// use ripple::doc;
/// use ripple::filter::{matches, Selector};
///
/// let selector = Selector::parse(&doc! { status: () }).unwrap();
/// assert!(matches(&doc! { id: "1" }, &selector));
/// assert!(matches(&doc! { id: "2", status: () }, &selector));
/// assert!(!matches(&doc! { id: "3", status: "open" }, &selector));
/// ```
pub fn matches(document: &Document, selector: &Selector) -> bool {
    match_selector(document, selector).is_some()
}

/// Returns the index of the first array element through which `document`
/// satisfied `selector`, which is what a `$` segment in a modifier refers to.
pub fn positional_index(document: &Document, selector: &Selector) -> Option<usize> {
    match_selector(document, selector).flatten()
}

fn match_selector(document: &Document, selector: &Selector) -> MatchOutcome {
    let mut position = None;
    for clause in selector.clauses() {
        let outcome = match_clause(document, clause)?;
        position = position.or(outcome);
    }
    Some(position)
}

fn match_clause(document: &Document, clause: &Clause) -> MatchOutcome {
    match clause {
        Clause::Field(path, condition) => match_field(document, path, condition),
        Clause::And(selectors) => {
            let mut position = None;
            for selector in selectors {
                position = position.or(match_selector(document, selector)?);
            }
            Some(position)
        }
        Clause::Or(selectors) => selectors.iter().find_map(|s| match_selector(document, s)),
        Clause::Nor(selectors) => {
            if selectors.iter().any(|s| match_selector(document, s).is_some()) {
                None
            } else {
                MATCHED
            }
        }
        Clause::Unknown(_) => None,
    }
}

fn match_field(document: &Document, path: &FieldPath, condition: &Condition) -> MatchOutcome {
    let branches = resolve(document, path);
    match_condition(&branches, condition)
}

fn match_condition(branches: &[Branch<'_>], condition: &Condition) -> MatchOutcome {
    match condition {
        Condition::Literal(literal) => any_branch(branches, |v| equals(v, literal)),
        Condition::Regex(pattern) => any_branch(branches, |v| regex_match(v, pattern)),
        Condition::Operators(ops) => {
            let mut position = None;
            for op in ops {
                position = position.or(match_op(branches, op)?);
            }
            Some(position)
        }
    }
}

/// Returns the first branch that satisfies `test`. `test` reports the matching
/// element index when it matched inside a leaf array.
fn any_branch<F>(branches: &[Branch<'_>], test: F) -> MatchOutcome
where
    F: Fn(Option<&Value>) -> MatchOutcome,
{
    branches.iter().find_map(|branch| {
        test(branch.value).map(|element| branch.array_index.or(element))
    })
}

fn negate(outcome: MatchOutcome) -> MatchOutcome {
    match outcome {
        Some(_) => None,
        None => MATCHED,
    }
}

fn match_op(branches: &[Branch<'_>], op: &FieldOp) -> MatchOutcome {
    match op {
        FieldOp::Eq(literal) => any_branch(branches, |v| equals(v, literal)),
        FieldOp::Ne(literal) => negate(any_branch(branches, |v| equals(v, literal))),
        FieldOp::Gt(bound) => any_branch(branches, |v| compare(v, bound, Ordering::is_gt)),
        FieldOp::Gte(bound) => any_branch(branches, |v| compare(v, bound, Ordering::is_ge)),
        FieldOp::Lt(bound) => any_branch(branches, |v| compare(v, bound, Ordering::is_lt)),
        FieldOp::Lte(bound) => any_branch(branches, |v| compare(v, bound, Ordering::is_le)),
        FieldOp::In(list) => any_branch(branches, |v| list.iter().find_map(|l| equals(v, l))),
        FieldOp::Nin(list) => negate(any_branch(branches, |v| list.iter().find_map(|l| equals(v, l)))),
        FieldOp::All(list) => any_branch(branches, |v| contains_all(v, list)),
        FieldOp::Size(size) => any_branch(branches, |v| match v {
            Some(Value::Array(items)) if items.len() == *size => MATCHED,
            _ => None,
        }),
        FieldOp::Exists(true) => any_branch(branches, |v| v.map(|_| None)),
        FieldOp::Exists(false) => negate(any_branch(branches, |v| v.map(|_| None))),
        FieldOp::ElemMatch(elem_match) => any_branch(branches, |v| match_elements(v, elem_match)),
        FieldOp::Not(condition) => negate(match_condition(branches, condition)),
        FieldOp::Regex(pattern) => any_branch(branches, |v| regex_match(v, pattern)),
        FieldOp::Unknown(_) => None,
    }
}

/// Literal equality with the null rule: a `null` literal also matches an
/// absent field. Arrays match as a whole or through any element.
fn equals(value: Option<&Value>, literal: &Value) -> MatchOutcome {
    match value {
        None => {
            if literal.is_null() {
                MATCHED
            } else {
                None
            }
        }
        Some(Value::Array(items)) => {
            if let Value::Array(expected) = literal {
                if items == expected {
                    return MATCHED;
                }
            }
            items.iter().position(|item| item == literal).map(Some)
        }
        Some(value) => {
            if value == literal {
                MATCHED
            } else {
                None
            }
        }
    }
}

fn compare(value: Option<&Value>, bound: &Value, accept: fn(Ordering) -> bool) -> MatchOutcome {
    let test = |candidate: &Value| candidate.is_comparable_with(bound) && accept(candidate.cmp(bound));
    match value {
        None => None,
        Some(whole @ Value::Array(items)) => {
            if test(whole) {
                return MATCHED;
            }
            items.iter().position(test).map(Some)
        }
        Some(value) => {
            if test(value) {
                MATCHED
            } else {
                None
            }
        }
    }
}

fn contains_all(value: Option<&Value>, list: &[Value]) -> MatchOutcome {
    if list.is_empty() {
        return None;
    }
    match value {
        Some(Value::Array(items)) => {
            if list.iter().all(|l| items.contains(l)) {
                MATCHED
            } else {
                None
            }
        }
        Some(value) => {
            if list.iter().all(|l| l == value) {
                MATCHED
            } else {
                None
            }
        }
        None => None,
    }
}

fn regex_match(value: Option<&Value>, pattern: &RegexPattern) -> MatchOutcome {
    match value {
        Some(Value::String(s)) if pattern.is_match(s) => MATCHED,
        Some(Value::Array(items)) => items
            .iter()
            .position(|item| matches!(item, Value::String(s) if pattern.is_match(s)))
            .map(Some),
        _ => None,
    }
}

fn match_elements(value: Option<&Value>, elem_match: &ElemMatch) -> MatchOutcome {
    let Some(Value::Array(items)) = value else {
        return None;
    };

    items
        .iter()
        .position(|item| match elem_match {
            ElemMatch::Selector(selector) => match item {
                Value::Document(doc) => matches(doc, selector),
                _ => false,
            },
            ElemMatch::Operators(ops) => {
                let branch = [Branch {
                    value: Some(item),
                    array_index: None,
                }];
                ops.iter().all(|op| match_op(&branch, op).is_some())
            }
        })
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::filter::{all, and, field, nor, or};

    fn parse(selector: Document) -> Selector {
        Selector::parse(&selector).unwrap()
    }

    fn sample() -> Document {
        doc! {
            id: "1",
            name: "Widget",
            qty: 15,
            price: 2.5,
            active: true,
            tags: ["red", "blue"],
            nothing: (),
            dims: { h: 10, w: 20 },
            items: [
                { sku: "a", qty: 1 },
                { sku: "b", qty: 7 },
            ],
            scores: [55, 82, 91],
        }
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(matches(&sample(), &all()));
        assert!(matches(&doc! {}, &all()));
    }

    #[test]
    fn implicit_and_across_keys() {
        assert!(matches(&sample(), &parse(doc! { name: "Widget", qty: 15 })));
        assert!(!matches(&sample(), &parse(doc! { name: "Widget", qty: 16 })));
    }

    #[test]
    fn numbers_compare_numerically() {
        assert!(matches(&sample(), &parse(doc! { qty: 15.0 })));
        assert!(matches(&sample(), &parse(doc! { price: { "$gt": 2 } })));
        assert!(!matches(&sample(), &parse(doc! { qty: "15" })));
    }

    #[test]
    fn null_matches_null_and_absent() {
        let selector = parse(doc! { status: () });
        assert!(matches(&doc! { id: "1", status: () }, &selector));
        assert!(matches(&doc! { id: "2" }, &selector));
        assert!(!matches(&doc! { id: "3", status: "open" }, &selector));
    }

    #[test]
    fn ne_is_negated_equality() {
        let selector = parse(doc! { status: { "$ne": () } });
        assert!(!matches(&doc! { id: "2" }, &selector));
        assert!(!matches(&doc! { status: () }, &selector));
        assert!(matches(&doc! { status: "x" }, &selector));

        let selector = parse(doc! { tags: { "$ne": "red" } });
        assert!(!matches(&sample(), &selector));
        assert!(matches(&doc! { tags: ["green"] }, &selector));
    }

    #[test]
    fn exists_distinguishes_null_from_absent() {
        let absent = parse(doc! { nothing: { "$exists": false } });
        assert!(!matches(&sample(), &absent));
        assert!(matches(&doc! { id: "x" }, &absent));

        let present = parse(doc! { nothing: { "$exists": true } });
        assert!(matches(&sample(), &present));
    }

    #[test]
    fn nested_paths_and_array_traversal() {
        assert!(matches(&sample(), &parse(doc! { "dims.h": 10 })));
        assert!(matches(&sample(), &parse(doc! { "items.sku": "b" })));
        assert!(matches(&sample(), &parse(doc! { "items.1.qty": 7 })));
        assert!(!matches(&sample(), &parse(doc! { "items.0.qty": 7 })));
        assert!(matches(&sample(), &parse(doc! { "items.$.qty": { "$gt": 5 } })));
    }

    #[test]
    fn leaf_arrays_match_elementwise_and_whole() {
        assert!(matches(&sample(), &parse(doc! { tags: "blue" })));
        assert!(matches(&sample(), &parse(doc! { tags: ["red", "blue"] })));
        assert!(!matches(&sample(), &parse(doc! { tags: ["blue", "red"] })));
    }

    #[test]
    fn comparisons_require_same_type_class() {
        assert!(!matches(&sample(), &parse(doc! { name: { "$gt": 1 } })));
        assert!(matches(&sample(), &parse(doc! { name: { "$gt": "A" } })));
        assert!(matches(&sample(), &parse(doc! { active: { "$gt": false } })));
        assert!(!matches(&sample(), &parse(doc! { missing: { "$lt": 100 } })));
        assert!(matches(&sample(), &parse(doc! { scores: { "$gte": 90 } })));
    }

    #[test]
    fn in_nin_all_size() {
        assert!(matches(&sample(), &parse(doc! { qty: { "$in": [1, 15] } })));
        assert!(!matches(&sample(), &parse(doc! { qty: { "$nin": [1, 15] } })));
        assert!(matches(&doc! { id: "x" }, &parse(doc! { qty: { "$in": [(), 3] } })));
        assert!(matches(&sample(), &parse(doc! { tags: { "$all": ["blue", "red"] } })));
        assert!(!matches(&sample(), &parse(doc! { tags: { "$all": ["blue", "green"] } })));
        assert!(matches(&sample(), &parse(doc! { tags: { "$size": 2 } })));
        assert!(!matches(&sample(), &parse(doc! { name: { "$size": 6 } })));
    }

    #[test]
    fn regex_only_tests_strings() {
        assert!(matches(&sample(), &parse(doc! { name: { "$regex": "^wid", "$options": "i" } })));
        assert!(!matches(&sample(), &parse(doc! { qty: { "$regex": "15" } })));
        assert!(matches(&sample(), &field("tags").regex("^bl").unwrap()));
    }

    #[test]
    fn elem_match_documents_and_scalars() {
        let selector = parse(doc! { items: { "$elemMatch": { sku: "b", qty: { "$gt": 5 } } } });
        assert!(matches(&sample(), &selector));
        let selector = parse(doc! { items: { "$elemMatch": { sku: "a", qty: { "$gt": 5 } } } });
        assert!(!matches(&sample(), &selector));
        let selector = parse(doc! { scores: { "$elemMatch": { "$gt": 80, "$lt": 85 } } });
        assert!(matches(&sample(), &selector));
    }

    #[test]
    fn not_negates_expression() {
        assert!(matches(&sample(), &parse(doc! { qty: { "$not": { "$gt": 20 } } })));
        assert!(!matches(&sample(), &parse(doc! { qty: { "$not": { "$gt": 10 } } })));
        assert!(matches(&doc! {}, &parse(doc! { qty: { "$not": { "$gt": 10 } } })));
    }

    #[test]
    fn logical_combinators_nest() {
        let selector = or(vec![
            field("qty").lt(5),
            and(vec![field("name").eq("Widget"), nor(vec![field("active").eq(false)])]),
        ]);
        assert!(matches(&sample(), &selector));
        assert!(!matches(&sample(), &nor(vec![field("qty").eq(15)])));
    }

    #[test]
    fn unknown_operators_fail_closed() {
        assert!(!matches(&sample(), &parse(doc! { qty: { "$near": 15 } })));
        assert!(!matches(&sample(), &parse(doc! { "$where": "true" })));
        assert!(matches(&sample(), &parse(doc! { "$nor": [{ qty: { "$near": 15 } }] })));
    }

    #[test]
    fn positional_index_reports_matching_element() {
        assert_eq!(positional_index(&sample(), &parse(doc! { "items.sku": "b" })), Some(1));
        assert_eq!(positional_index(&sample(), &parse(doc! { tags: "blue" })), Some(1));
        assert_eq!(positional_index(&sample(), &parse(doc! { scores: { "$gt": 60 } })), Some(1));
        assert_eq!(
            positional_index(&sample(), &parse(doc! { items: { "$elemMatch": { qty: 7 } } })),
            Some(1)
        );
        assert_eq!(positional_index(&sample(), &parse(doc! { name: "Widget" })), None);
        assert_eq!(positional_index(&sample(), &parse(doc! { name: "Gadget" })), None);
    }
}
