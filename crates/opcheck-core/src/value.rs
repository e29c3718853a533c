//! Concrete values passed to and returned from backends.

use std::collections::BTreeMap;

use crate::{Array, DType, Result, Shape};

/// Keyword arguments of an op call.
pub type Kwargs = BTreeMap<String, Value>;

/// A concrete argument or output of the reference backend.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Tensor(Array),
    Int(i64),
    Float(f64),
    Bool(bool),
    DType(DType),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Depth-first, order-preserving leaves of a (possibly nested) value.
    pub fn flatten(&self) -> Vec<&Value> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a Value>) {
        match self {
            Value::List(items) => items.iter().for_each(|v| v.flatten_into(out)),
            leaf => out.push(leaf),
        }
    }

    /// Coerce a numeric leaf to an array.
    ///
    /// Scalars become rank-0 arrays: ints are `I64`, floats `F32`, bools `Bool`.
    /// Returns `None` for dtype tags, strings and lists.
    pub fn to_array(&self) -> Option<Result<Array>> {
        match self {
            Value::Tensor(a) => Some(Ok(a.clone())),
            Value::Int(v) => Some(Array::from_i64(vec![*v], &Shape::scalar(), DType::I64)),
            Value::Float(v) => Some(Array::from_f64(vec![*v], &Shape::scalar(), DType::F32)),
            Value::Bool(v) => Some(Array::from_bool(vec![*v], &Shape::scalar())),
            Value::DType(_) | Value::Str(_) | Value::List(_) => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Array> {
        match self {
            Value::Tensor(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric scalar as f64 (ints, floats and bools).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(v) => Some(*v as u8 as f64),
            _ => None,
        }
    }

    /// Short human-readable kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Tensor(_) => "tensor",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::DType(_) => "dtype",
            Value::Str(_) => "str",
            Value::List(_) => "list",
        }
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Tensor(a)
    }
}

/// Nested container of backend outputs.
#[derive(Clone, Debug, PartialEq)]
pub enum Tree<T> {
    Leaf(T),
    Seq(Vec<Tree<T>>),
}

impl<T> Tree<T> {
    /// Depth-first, order-preserving leaves.
    pub fn flatten(self) -> Vec<T> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<T>) {
        match self {
            Tree::Leaf(v) => out.push(v),
            Tree::Seq(items) => items.into_iter().for_each(|t| t.flatten_into(out)),
        }
    }
}

impl<T> From<T> for Tree<T> {
    fn from(v: T) -> Self {
        Tree::Leaf(v)
    }
}
