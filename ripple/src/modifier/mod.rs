//! Update expressions.
//!
//! A [Modifier] describes how to transform a document: `$set`, `$unset`,
//! `$inc`, `$mul`, `$min`, `$max`, `$rename`, `$push`, `$pushAll`, `$pull`,
//! `$pullAll`, `$addToSet` and `$pop`. [apply_modifier] produces the updated
//! copy without touching the input.

mod apply;
mod modifier;

pub use apply::*;
pub use modifier::*;
