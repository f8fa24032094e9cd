use super::{PickleErr, Value};

const RECONSTRUCT_MODULES: [&str; 2] = ["numpy.core.multiarray", "numpy._core.multiarray"];

/// Element type of a pickled numpy array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DType {
    /// `u`, `i`, `f`, `b`, ...
    pub kind: char,
    pub itemsize: usize,
    /// `<`, `>`, `|` or `=`.
    pub byte_order: char,
}

impl DType {
    pub const U8: DType = DType {
        kind: 'u',
        itemsize: 1,
        byte_order: '|',
    };

    /// Whether two dtypes hold the same values, ignoring byte order on
    /// single byte types.
    pub fn same_values(&self, other: &DType) -> bool {
        self.kind == other.kind
            && self.itemsize == other.itemsize
            && (self.itemsize == 1 || self.byte_order == other.byte_order)
    }
}

/// A numpy array rebuilt from its `_reconstruct` + `__setstate__` pickle form.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub fortran_order: bool,
    /// Raw element bytes in the array's memory order.
    pub data: Vec<u8>,
}

impl NdArray {
    /// Number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Errors
    /// Returns `PickleErr::NotAnArray` if `value` is not a pickled numpy
    /// array with a raw byte payload matching its shape and dtype.
    pub fn from_value(value: &Value) -> Result<Self, PickleErr> {
        let Value::Object {
            callable, state, ..
        } = value
        else {
            return Err(not_an_array(format!("got a {}", value.type_name())));
        };
        if !RECONSTRUCT_MODULES
            .iter()
            .any(|module| callable.is_global(module, "_reconstruct"))
        {
            return Err(not_an_array(format!("unexpected constructor {callable:?}")));
        }

        let state = state
            .as_deref()
            .and_then(Value::as_seq)
            .ok_or_else(|| not_an_array("missing array state"))?;

        // (version, shape, dtype, is_fortran, data); old pickles omit version.
        let state = match state.len() {
            5 => &state[1..],
            4 => state,
            n => return Err(not_an_array(format!("array state has {n} fields"))),
        };

        let shape = state[0]
            .as_seq()
            .ok_or_else(|| not_an_array("shape is not a tuple"))?
            .iter()
            .map(|dim| {
                dim.as_int()
                    .and_then(|d| usize::try_from(d).ok())
                    .ok_or_else(|| not_an_array("shape holds a non-integer"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let dtype = parse_dtype(&state[1])?;
        let fortran_order = state[2]
            .as_bool()
            .ok_or_else(|| not_an_array("is_fortran is not a bool"))?;
        let data = state[3]
            .as_bytes()
            .ok_or_else(|| not_an_array("payload is not a byte string"))?
            .into_owned();

        let expected = shape
            .iter()
            .try_fold(dtype.itemsize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| not_an_array("shape overflows"))?;
        if data.len() != expected {
            return Err(not_an_array(format!(
                "payload has {} bytes, shape {shape:?} needs {expected}",
                data.len()
            )));
        }

        Ok(Self {
            shape,
            dtype,
            fortran_order,
            data,
        })
    }
}

fn parse_dtype(value: &Value) -> Result<DType, PickleErr> {
    let Value::Object {
        callable,
        args,
        state,
    } = value
    else {
        return Err(not_an_array("dtype is not an object"));
    };
    if !callable.is_global("numpy", "dtype") {
        return Err(not_an_array(format!("unexpected dtype constructor {callable:?}")));
    }

    let descr = args
        .as_seq()
        .and_then(|args| args.first())
        .and_then(Value::as_text)
        .ok_or_else(|| not_an_array("dtype without a type code"))?;

    let mut chars = descr.chars();
    let kind = chars
        .next()
        .ok_or_else(|| not_an_array("empty dtype code"))?;
    let itemsize = chars
        .as_str()
        .parse::<usize>()
        .map_err(|_| not_an_array(format!("unsupported dtype code {descr:?}")))?;

    // dtype state: (version, byte_order, ...)
    let byte_order = state
        .as_deref()
        .and_then(Value::as_seq)
        .and_then(|s| s.get(1))
        .and_then(Value::as_text)
        .and_then(|s| s.chars().next())
        .unwrap_or('|');

    Ok(DType {
        kind,
        itemsize,
        byte_order,
    })
}

fn not_an_array(msg: impl Into<String>) -> PickleErr {
    PickleErr::NotAnArray(msg.into())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn global(module: &str, name: &str) -> Value {
        Value::Global {
            module: module.into(),
            name: name.into(),
        }
    }

    fn bytes(raw: &[u8]) -> Value {
        Value::Bytes(Rc::from(raw))
    }

    fn u8_dtype() -> Value {
        Value::Object {
            callable: Box::new(global("numpy", "dtype")),
            args: Box::new(Value::Tuple(vec![bytes(b"u1"), Value::Int(0), Value::Int(1)])),
            state: Some(Box::new(Value::Tuple(vec![
                Value::Int(3),
                bytes(b"|"),
                Value::None,
                Value::None,
                Value::None,
                Value::Int(-1),
                Value::Int(-1),
                Value::Int(0),
            ]))),
        }
    }

    fn array(shape: &[i64], payload: &[u8]) -> Value {
        Value::Object {
            callable: Box::new(global("numpy.core.multiarray", "_reconstruct")),
            args: Box::new(Value::Tuple(vec![
                global("numpy", "ndarray"),
                Value::Tuple(vec![Value::Int(0)]),
                bytes(b"b"),
            ])),
            state: Some(Box::new(Value::Tuple(vec![
                Value::Int(1),
                Value::Tuple(shape.iter().map(|&d| Value::Int(d)).collect()),
                u8_dtype(),
                Value::Bool(false),
                bytes(payload),
            ]))),
        }
    }

    #[test]
    fn rebuilds_u8_matrix() {
        let arr = NdArray::from_value(&array(&[2, 3], &[1, 2, 3, 4, 5, 6])).unwrap();
        assert_eq!(arr.shape, [2, 3]);
        assert_eq!(arr.dtype, DType::U8);
        assert!(!arr.fortran_order);
        assert_eq!(arr.len(), 6);
        assert_eq!(arr.data, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn payload_must_match_shape() {
        let err = NdArray::from_value(&array(&[2, 3], &[1, 2, 3])).unwrap_err();
        assert!(matches!(err, PickleErr::NotAnArray(_)));
    }

    #[test]
    fn plain_values_are_not_arrays() {
        assert!(NdArray::from_value(&Value::List(vec![])).is_err());
        assert!(NdArray::from_value(&Value::Object {
            callable: Box::new(global("collections", "OrderedDict")),
            args: Box::new(Value::Tuple(vec![])),
            state: None,
        })
        .is_err());
    }
}
