use ndarray::{ArrayD, IxDyn, ShapeError};

use crate::{ElementType, TensorOrMemref};

/// Conversion to and from ndarray
impl<T: ElementType> TensorOrMemref<T> {
    /// Copies the logical contents, vector lanes included, into an owned
    /// row-major array.
    pub fn to_ndarray(&self) -> Result<ArrayD<T>, ShapeError> {
        let shape = self.shape().to_vec();
        ArrayD::from_shape_vec(IxDyn(&shape), self.to_vec())
    }
}

impl<T: ElementType> From<ArrayD<T>> for TensorOrMemref<T> {
    fn from(array: ArrayD<T>) -> Self {
        let shape = array.shape().to_vec();
        let data = array.iter().copied().collect::<Vec<_>>();
        Self::from_data(data, shape)
    }
}
