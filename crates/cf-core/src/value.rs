//! Signal value types.
//!
//! A signal carries either a scalar or a fixed-shape, row-major array of
//! `f64`. Blocks combine values elementwise; a scalar broadcasts against an
//! array of any shape, two arrays must agree on their shape.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Fixed-shape numeric array stored in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ArrayRepr", into = "ArrayRepr")]
pub struct Array {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Array {
    /// Create an array, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> CoreResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(CoreError::Shape {
                what: format!(
                    "shape {:?} holds {} element(s), got {}",
                    shape,
                    expected,
                    data.len()
                ),
            });
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional array.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Zero-dimensional array holding a single value.
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    /// Array of zeros with the given shape.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    /// Two-dimensional array from equally sized rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> CoreResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(CoreError::Shape {
                    what: format!("ragged rows: expected {} column(s), got {}", cols, row.len()),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            shape: vec![rows.len(), cols],
            data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Elements in row-major order.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }
}

/// Serialized form: a plain list for 1-D arrays, `{shape, data}` otherwise.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ArrayRepr {
    Flat(Vec<f64>),
    Shaped { shape: Vec<usize>, data: Vec<f64> },
}

impl TryFrom<ArrayRepr> for Array {
    type Error = CoreError;

    fn try_from(repr: ArrayRepr) -> CoreResult<Self> {
        match repr {
            ArrayRepr::Flat(data) => Ok(Array::from_vec(data)),
            ArrayRepr::Shaped { shape, data } => Array::new(shape, data),
        }
    }
}

impl From<Array> for ArrayRepr {
    fn from(array: Array) -> Self {
        if array.ndim() == 1 {
            ArrayRepr::Flat(array.data)
        } else {
            ArrayRepr::Shaped {
                shape: array.shape,
                data: array.data,
            }
        }
    }
}

/// Value carried by a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    /// Scalar floating-point signal.
    Scalar(f64),
    /// Fixed-shape array signal.
    Array(Array),
}

impl SignalValue {
    /// Create a scalar signal.
    pub fn scalar(value: f64) -> Self {
        Self::Scalar(value)
    }

    /// Create a one-dimensional array signal.
    pub fn vector(data: Vec<f64>) -> Self {
        Self::Array(Array::from_vec(data))
    }

    /// Get the scalar value as an option.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Array(_) => None,
        }
    }

    /// The array, unless this is a scalar.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Scalar(_) => None,
            Self::Array(a) => Some(a),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    /// Shape of the value; scalars have an empty shape.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Scalar(_) => &[],
            Self::Array(a) => a.shape(),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Array(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements in row-major order.
    pub fn as_slice(&self) -> &[f64] {
        match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::Array(a) => a.data(),
        }
    }

    /// A zero value with the same shape.
    pub fn zeros_like(&self) -> Self {
        match self {
            Self::Scalar(_) => Self::Scalar(0.0),
            Self::Array(a) => Self::Array(Array::zeros(a.shape().to_vec())),
        }
    }

    /// Convert into an array; scalars become zero-dimensional arrays.
    pub fn into_array(self) -> Array {
        match self {
            Self::Scalar(v) => Array::scalar(v),
            Self::Array(a) => a,
        }
    }

    /// Collapse zero-dimensional arrays back into scalars.
    pub fn from_array(array: Array) -> Self {
        if array.ndim() == 0 {
            Self::Scalar(array.data[0])
        } else {
            Self::Array(array)
        }
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        match self {
            Self::Scalar(v) => Self::Scalar(f(*v)),
            Self::Array(a) => Self::Array(a.map(f)),
        }
    }

    /// Combine two values elementwise, broadcasting scalars.
    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> CoreResult<Self> {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => Ok(Self::Scalar(f(*a, *b))),
            (Self::Scalar(a), Self::Array(b)) => Ok(Self::Array(b.map(|x| f(*a, x)))),
            (Self::Array(a), Self::Scalar(b)) => Ok(Self::Array(a.map(|x| f(x, *b)))),
            (Self::Array(a), Self::Array(b)) => {
                if a.shape() != b.shape() {
                    return Err(CoreError::Shape {
                        what: format!("cannot combine {:?} with {:?}", a.shape(), b.shape()),
                    });
                }
                let data = a
                    .data()
                    .iter()
                    .zip(b.data())
                    .map(|(&x, &y)| f(x, y))
                    .collect();
                Ok(Self::Array(Array {
                    shape: a.shape.clone(),
                    data,
                }))
            }
        }
    }

    /// Element-wise sum; a scalar broadcasts against an array.
    pub fn add(&self, other: &Self) -> CoreResult<Self> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Self) -> CoreResult<Self> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Self) -> CoreResult<Self> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Element-wise quotient; broadcasts like [`add`](Self::add).
    pub fn div(&self, other: &Self) -> CoreResult<Self> {
        self.zip_with(other, |a, b| a / b)
    }

    /// Multiply every element by `k`.
    pub fn scale(&self, k: f64) -> Self {
        self.map(|x| k * x)
    }

    /// Concatenate the elements of several values into one 1-D array.
    pub fn concat(values: &[SignalValue]) -> Self {
        let data = values.iter().flat_map(|v| v.as_slice().iter().copied()).collect();
        Self::vector(data)
    }

    /// Split the elements into individual scalars.
    pub fn split(&self) -> Vec<SignalValue> {
        self.as_slice().iter().map(|&x| Self::Scalar(x)).collect()
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for SignalValue {
    fn from(data: Vec<f64>) -> Self {
        Self::vector(data)
    }
}

impl From<Array> for SignalValue {
    fn from(array: Array) -> Self {
        Self::Array(array)
    }
}

impl Default for SignalValue {
    fn default() -> Self {
        Self::Scalar(0.0)
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Array(a) => {
                write!(f, "[")?;
                for (i, x) in a.data().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_shape_is_checked() {
        assert!(Array::new(vec![2, 2], vec![1.0, 2.0, 3.0]).is_err());
        let a = Array::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(a.ndim(), 2);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn scalar_broadcasts_against_array() {
        let g = SignalValue::scalar(3.0);
        let x = SignalValue::vector(vec![2.0, 4.0]);
        assert_eq!(g.mul(&x).unwrap(), SignalValue::vector(vec![6.0, 12.0]));
        assert_eq!(x.mul(&g).unwrap(), SignalValue::vector(vec![6.0, 12.0]));
    }

    #[test]
    fn division_broadcasts_both_ways() {
        let x = SignalValue::vector(vec![2.0, 8.0]);
        assert_eq!(
            x.div(&SignalValue::scalar(2.0)).unwrap(),
            SignalValue::vector(vec![1.0, 4.0])
        );
        assert_eq!(
            SignalValue::scalar(8.0).div(&x).unwrap(),
            SignalValue::vector(vec![4.0, 1.0])
        );
        assert!(x.div(&SignalValue::vector(vec![1.0])).is_err());
    }

    #[test]
    fn mismatched_arrays_are_rejected() {
        let a = SignalValue::vector(vec![1.0, 2.0]);
        let b = SignalValue::vector(vec![1.0, 2.0, 3.0]);
        assert!(matches!(a.add(&b), Err(CoreError::Shape { .. })));
    }

    #[test]
    fn concat_and_split() {
        let joined = SignalValue::concat(&[
            SignalValue::scalar(1.0),
            SignalValue::vector(vec![2.0, 3.0]),
        ]);
        assert_eq!(joined, SignalValue::vector(vec![1.0, 2.0, 3.0]));
        assert_eq!(
            joined.split(),
            vec![
                SignalValue::scalar(1.0),
                SignalValue::scalar(2.0),
                SignalValue::scalar(3.0)
            ]
        );
    }

    #[test]
    fn zero_dimensional_arrays_collapse_to_scalars() {
        let v = SignalValue::from_array(Array::scalar(2.5));
        assert_eq!(v, SignalValue::scalar(2.5));
        assert_eq!(SignalValue::scalar(2.5).into_array().shape(), &[] as &[usize]);
    }

    #[test]
    fn serde_accepts_numbers_lists_and_shaped_arrays() {
        let v: SignalValue = serde_json::from_str("2").unwrap();
        assert_eq!(v, SignalValue::scalar(2.0));

        let v: SignalValue = serde_json::from_str("[-1, 2]").unwrap();
        assert_eq!(v, SignalValue::vector(vec![-1.0, 2.0]));

        let v: SignalValue =
            serde_json::from_str(r#"{"shape": [2, 1], "data": [1, 2]}"#).unwrap();
        assert_eq!(v.shape(), &[2, 1]);

        assert!(serde_json::from_str::<SignalValue>(r#"{"shape": [3], "data": [1]}"#).is_err());
    }

    #[test]
    fn display_formats_elements() {
        assert_eq!(SignalValue::vector(vec![1.0, 2.5]).to_string(), "[1, 2.5]");
        assert_eq!(SignalValue::scalar(6.0).to_string(), "6");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn subtracting_a_value_from_itself_gives_zeros(data in prop::collection::vec(-1e6_f64..1e6_f64, 0..8)) {
            let v = SignalValue::vector(data);
            let diff = v.sub(&v).unwrap();
            prop_assert_eq!(diff, v.zeros_like());
        }

        #[test]
        fn scaling_matches_scalar_product(data in prop::collection::vec(-1e3_f64..1e3_f64, 1..8), k in -10.0_f64..10.0) {
            let v = SignalValue::vector(data);
            prop_assert_eq!(v.scale(k), SignalValue::scalar(k).mul(&v).unwrap());
        }
    }
}
