//! Tensor API.
//!
//! Tensors are the inputs and outputs of neural networks. For the segmentation networks used in
//! this crate, they hold image data going in and per-class confidence maps coming out.

use std::fmt;

use anyhow::{ensure, Context};

/// A dense, row-major N-dimensional array of `f32`s.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Box<[f32]>,
}

impl Tensor {
    /// Creates an `N`-dimensional tensor of the given shape by calling `f` for each element.
    ///
    /// This will invoke `f` with successive indices to fill, starting with `[0, ..., 0, 0]`, then
    /// `[0, ..., 0, 1]` and so on.
    pub fn from_array_shape_fn<const N: usize, F: FnMut([usize; N]) -> f32>(
        shape: [usize; N],
        mut f: F,
    ) -> Self {
        let len = shape.iter().product::<usize>();
        let mut data = Vec::with_capacity(len);
        let mut index = [0; N];
        for _ in 0..len {
            data.push(f(index));

            // increment the index, last dimension first
            for dim in (0..N).rev() {
                index[dim] += 1;
                if index[dim] < shape[dim] {
                    break;
                }
                index[dim] = 0;
            }
        }

        Self {
            shape: shape.to_vec(),
            data: data.into_boxed_slice(),
        }
    }

    /// Creates a tensor of the given shape by pulling elements from an iterator.
    ///
    /// # Panics
    ///
    /// `iter` must yield exactly as many elements as specified by `shape` (by multiplying all of
    /// its entries), otherwise this method will panic.
    pub fn from_iter<I: IntoIterator<Item = f32>>(shape: &[usize], iter: I) -> Self {
        let data: Box<_> = iter.into_iter().collect();
        assert_eq!(data.len(), shape.iter().product::<usize>());
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Returns the size of each dimension of this tensor.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the elements of this tensor in row-major order.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` has the wrong number of dimensions or is out of bounds.
    pub fn get(&self, index: &[usize]) -> f32 {
        assert_eq!(index.len(), self.shape.len(), "wrong index dimensionality");
        let mut offset = 0;
        for (&i, &size) in index.iter().zip(&self.shape) {
            assert!(i < size, "index {:?} out of bounds for {:?}", index, self.shape);
            offset = offset * size + i;
        }
        self.data[offset]
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let data = tract
            .as_slice::<f32>()
            .context("network output is not an f32 tensor")?;
        ensure!(
            data.len() == tract.shape().iter().product::<usize>(),
            "network output tensor is not contiguous"
        );
        Ok(Self::from_iter(tract.shape(), data.iter().copied()))
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            &self.shape,
            self.as_slice(),
        )?)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor{:?}", self.shape)
    }
}
