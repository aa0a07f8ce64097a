use crate::collection::Document;
use crate::common::{get_path, remove_path, set_path, FieldPath, Value, DOC_ID};
use crate::errors::{ErrorKind, RippleError, RippleResult};
use crate::filter::matches;
use crate::modifier::{Modifier, PullSpec, PushSpec, UpdateOp, PULL_ELEMENT};

/// Applies `modifier` to a copy of `document` and returns the result.
///
/// `positional` is the array index a `$` path segment stands for, usually
/// taken from [crate::filter::positional_index]. The input is never mutated;
/// on error nothing of the partial result escapes.
///
/// Changing the `id` of a document that has one fails with
/// `InvalidOperation`.
pub fn apply_modifier(
    document: &Document,
    modifier: &Modifier,
    positional: Option<usize>,
) -> RippleResult<Document> {
    let mut result = document.clone();
    for update in modifier.updates() {
        let path = update.path.with_positional(positional)?;
        apply_update(&mut result, &path, &update.op)?;
    }

    if let Some(id) = document.get(DOC_ID) {
        if result.get(DOC_ID) != Some(id) {
            log::error!("Modifier attempted to change the id of document {}", id);
            return Err(RippleError::new(
                "The id of a document cannot be changed",
                ErrorKind::InvalidOperation,
            ));
        }
    }
    Ok(result)
}

fn apply_update(document: &mut Document, path: &FieldPath, op: &UpdateOp) -> RippleResult<()> {
    match op {
        UpdateOp::Set(value) => set_path(document, path, value.clone()),
        UpdateOp::Unset => {
            remove_path(document, path);
            Ok(())
        }
        UpdateOp::Inc(delta) => {
            let current = get_path(document, path).cloned();
            let next = arithmetic(path, "$inc", current, delta, |a, b| a.checked_add(b), |a, b| a + b)?;
            set_path(document, path, next)
        }
        UpdateOp::Mul(factor) => {
            let current = get_path(document, path).cloned();
            let next = arithmetic(path, "$mul", current, factor, |a, b| a.checked_mul(b), |a, b| a * b)?;
            set_path(document, path, next)
        }
        UpdateOp::Min(value) => match get_path(document, path) {
            Some(current) if current <= value => Ok(()),
            _ => set_path(document, path, value.clone()),
        },
        UpdateOp::Max(value) => match get_path(document, path) {
            Some(current) if current >= value => Ok(()),
            _ => set_path(document, path, value.clone()),
        },
        UpdateOp::Rename(target) => {
            if target.as_str() == path.as_str() {
                return Ok(());
            }
            match remove_path(document, path) {
                Some(value) => set_path(document, target, value),
                None => Ok(()),
            }
        }
        UpdateOp::Push(spec) => {
            let items = push(array_at(document, path, "$push")?.unwrap_or_default(), spec);
            set_path(document, path, Value::Array(items))
        }
        UpdateOp::PushAll(values) => {
            let mut items = array_at(document, path, "$pushAll")?.unwrap_or_default();
            items.extend(values.iter().cloned());
            set_path(document, path, Value::Array(items))
        }
        UpdateOp::Pull(spec) => match array_at(document, path, "$pull")? {
            Some(mut items) => {
                items.retain(|item| !pull_matches(spec, item));
                set_path(document, path, Value::Array(items))
            }
            None => Ok(()),
        },
        UpdateOp::PullAll(values) => match array_at(document, path, "$pullAll")? {
            Some(mut items) => {
                items.retain(|item| !values.contains(item));
                set_path(document, path, Value::Array(items))
            }
            None => Ok(()),
        },
        UpdateOp::AddToSet(values) => {
            let mut items = array_at(document, path, "$addToSet")?.unwrap_or_default();
            for value in values {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
            set_path(document, path, Value::Array(items))
        }
        UpdateOp::Pop(first) => match array_at(document, path, "$pop")? {
            Some(mut items) => {
                if !items.is_empty() {
                    if *first {
                        items.remove(0);
                    } else {
                        items.pop();
                    }
                }
                set_path(document, path, Value::Array(items))
            }
            None => Ok(()),
        },
    }
}

fn type_mismatch(message: String) -> RippleError {
    log::error!("{}", message);
    RippleError::new(&message, ErrorKind::TypeMismatch)
}

/// Reads the array at `path`. `Ok(None)` when the field is absent or null.
fn array_at(document: &Document, path: &FieldPath, op: &str) -> RippleResult<Option<Vec<Value>>> {
    match get_path(document, path) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items.clone())),
        Some(other) => Err(type_mismatch(format!(
            "{} requires an array at '{}', found {}",
            op,
            path,
            other.type_name()
        ))),
    }
}

/// Combines a numeric field with a numeric operand. An absent field is
/// treated as zero. Integer arithmetic falls back to floating point on
/// overflow.
fn arithmetic(
    path: &FieldPath,
    op: &str,
    current: Option<Value>,
    operand: &Value,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> RippleResult<Value> {
    if !operand.is_number() {
        return Err(type_mismatch(format!(
            "{} requires a numeric operand for '{}', found {}",
            op,
            path,
            operand.type_name()
        )));
    }

    let current = match current {
        None | Some(Value::Null) => match operand {
            Value::F64(_) => Value::F64(0.0),
            _ => Value::I64(0),
        },
        Some(value) if value.is_number() => value,
        Some(other) => {
            return Err(type_mismatch(format!(
                "{} cannot modify non-numeric field '{}' of type {}",
                op,
                path,
                other.type_name()
            )))
        }
    };

    if let (Value::I64(a), Value::I64(b)) = (&current, operand) {
        if let Some(result) = int_op(*a, *b) {
            return Ok(Value::I64(result));
        }
    }

    match (current.as_f64(), operand.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::F64(float_op(a, b))),
        _ => Err(type_mismatch(format!("{} could not compute a number for '{}'", op, path))),
    }
}

fn push(mut items: Vec<Value>, spec: &PushSpec) -> Vec<Value> {
    let len = items.len() as i64;
    let at = match spec.position {
        None => len,
        Some(p) if p < 0 => (len + p).max(0),
        Some(p) => p.min(len),
    } as usize;
    items.splice(at..at, spec.values.iter().cloned());

    if let Some(n) = spec.slice {
        if n >= 0 {
            items.truncate(n as usize);
        } else {
            let keep = n.unsigned_abs() as usize;
            if items.len() > keep {
                items.drain(..items.len() - keep);
            }
        }
    }
    items
}

fn pull_matches(spec: &PullSpec, item: &Value) -> bool {
    match spec {
        PullSpec::Value(value) => item == value,
        PullSpec::Selector(selector) => match item {
            Value::Document(doc) => matches(doc, selector),
            _ => false,
        },
        PullSpec::Condition(selector) => {
            let mut wrapper = Document::new();
            wrapper.insert(PULL_ELEMENT, item.clone());
            matches(&wrapper, selector)
        }
    }
}
