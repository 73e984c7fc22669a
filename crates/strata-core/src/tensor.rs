use crate::{Buffer, BufferView, DType, ElementType, RVec, Shape, Strides, ViewError};

use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(feature = "rand")]
use rand_distr::{Distribution, StandardNormal};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("Tensor buffer has been deallocated")]
    Deallocated,
    #[error("Index {indices:?} is out of bounds for {view:?}")]
    OutOfBounds {
        indices: Vec<usize>,
        view: BufferView,
    },
    #[error(transparent)]
    View(#[from] ViewError),
}

/// Values backed by a shared [`Buffer`] and described by a [`BufferView`].
pub trait TensorLike {
    type Element: ElementType;

    fn buffer(&self) -> &Arc<Buffer>;

    fn view(&self) -> &BufferView;

    fn dt(&self) -> DType {
        <Self::Element as ElementType>::dt()
    }
}

/// A typed tensor or memref value.
///
/// `Clone` is shallow: the copy shares the buffer. Use
/// [`TensorOrMemref::deep_clone`] for an independent copy.
#[derive(Clone)]
pub struct TensorOrMemref<T: ElementType> {
    buffer: Arc<Buffer>,
    view: BufferView,
    _marker: PhantomData<T>,
}

impl<T: ElementType> TensorOrMemref<T> {
    /// # Panics
    ///
    /// If `buffer` was allocated for an element type of a different size.
    pub fn new(buffer: Arc<Buffer>, view: BufferView) -> Self {
        assert_eq!(
            buffer.element_size(),
            std::mem::size_of::<T>(),
            "buffer element size does not match {}",
            T::dt()
        );
        Self {
            buffer,
            view,
            _marker: PhantomData,
        }
    }

    /// Allocates a zeroed value of the given shape, laid out per the
    /// minor-to-major `layout` (row-major if empty).
    pub fn empty(shape: impl Into<Shape>, layout: &[usize]) -> Self {
        Self::empty_like(&BufferView::new(shape), layout)
    }

    /// Allocates a zeroed value with the shape and vector dims of `view`.
    ///
    /// The new view starts at offset 0 with strides derived from `layout`.
    pub fn empty_like(view: &BufferView, layout: &[usize]) -> Self {
        let mut new_view = view.clone();
        new_view.reset(Strides::for_layout(view.sizes(), layout));
        let buffer = Buffer::allocate::<T>(view.num_elements(true));
        Self::new(buffer, new_view)
    }

    /// Creates a row-major value from `data`.
    ///
    /// # Panics
    ///
    /// If `data` does not hold exactly one element per position of `shape`.
    pub fn from_data<U: AsRef<[T]>>(data: U, shape: impl Into<Shape>) -> Self {
        let data = data.as_ref();
        let out = Self::empty(shape, &[]);
        assert_eq!(
            data.len(),
            out.view.num_elements(true),
            "data length does not match shape {:?}",
            out.shape()
        );
        out.buffer
            .bytes_mut()
            .copy_from_slice(bytemuck::cast_slice(data));
        out
    }

    #[cfg(feature = "rand")]
    pub fn randn(shape: impl Into<Shape>) -> Self
    where
        T: num_traits::Float,
    {
        let shape = shape.into();
        let mut rng = rand::thread_rng();
        let data = (0..shape.numel())
            .map(|_| {
                let sample: f32 = StandardNormal.sample(&mut rng);
                <T as num_traits::NumCast>::from(sample).unwrap_or_else(T::nan)
            })
            .collect::<Vec<_>>();
        Self::from_data(data, shape)
    }

    /// Copies every element, vector lanes included, into a freshly allocated
    /// buffer laid out per `layout`.
    pub fn deep_clone(&self, layout: &[usize]) -> Self {
        let out = Self::empty_like(&self.view, layout);
        for (src, dst) in self
            .view
            .indices(true)
            .into_iter()
            .zip(out.view.indices(true))
        {
            out.set(&dst, self.at(&src));
        }
        log::debug!("Deep cloned {:?} into {:?}", self.view, out.view);
        out
    }

    /// Reads the element at `indices`.
    ///
    /// # Panics
    ///
    /// If `indices` are out of bounds or the buffer has been deallocated.
    pub fn at(&self, indices: &[usize]) -> T {
        self.check_bounds(indices);
        let bytes = self
            .buffer
            .at(self.view.physical_index(indices), std::mem::size_of::<T>());
        *bytemuck::from_bytes::<T>(&bytes[..])
    }

    /// Writes `value` at `indices`.
    ///
    /// # Panics
    ///
    /// If `indices` are out of bounds or the buffer has been deallocated.
    pub fn set(&self, indices: &[usize], value: T) {
        self.check_bounds(indices);
        let mut bytes = self
            .buffer
            .at_mut(self.view.physical_index(indices), std::mem::size_of::<T>());
        *bytemuck::from_bytes_mut::<T>(&mut bytes[..]) = value;
    }

    /// Replaces the element at `indices` with `f` applied to it.
    ///
    /// The buffer is not locked while `f` runs, so `f` may read through
    /// any value sharing this buffer.
    pub fn update(&self, indices: &[usize], f: impl FnOnce(T) -> T) {
        let value = f(self.at(indices));
        self.set(indices, value);
    }

    pub fn try_at(&self, indices: &[usize]) -> Result<T, TensorError> {
        if self.buffer.deallocated() {
            return Err(TensorError::Deallocated);
        }
        if !self.view.in_bounds(indices) {
            return Err(TensorError::OutOfBounds {
                indices: indices.to_vec(),
                view: self.view.clone(),
            });
        }
        Ok(self.at(indices))
    }

    fn check_bounds(&self, indices: &[usize]) {
        assert!(
            self.view.in_bounds(indices),
            "index {:?} out of bounds for {:?}",
            indices,
            self.view
        );
    }

    /// The vector stored at the tensor-level `indices`.
    ///
    /// The result shares this value's buffer and is a bare vector whose
    /// sizes and strides are this view's trailing vector dimensions.
    pub fn vector_at(&self, indices: &[usize]) -> Self {
        self.check_bounds(indices);
        Self {
            buffer: Arc::clone(&self.buffer),
            view: self.view.vector_at(indices),
            _marker: PhantomData,
        }
    }

    /// A value over the same buffer with a different view.
    pub fn with_view(&self, view: BufferView) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            view,
            _marker: PhantomData,
        }
    }

    /// Applies [`BufferView::subview`] to a copy of this value's view.
    pub fn subview(
        &self,
        offsets: &[usize],
        sizes: &[usize],
        strides: &[isize],
    ) -> Result<Self, TensorError> {
        let mut view = self.view.clone();
        view.subview(offsets, sizes, strides)?;
        Ok(self.with_view(view))
    }

    /// Elements in logical row-major order, vector lanes included.
    pub fn to_vec(&self) -> Vec<T> {
        self.view
            .indices(true)
            .into_iter()
            .map(|idx| self.at(&idx))
            .collect()
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn view(&self) -> &BufferView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut BufferView {
        &mut self.view
    }

    pub fn shape(&self) -> &Shape {
        self.view.sizes()
    }

    pub fn rank(&self) -> usize {
        self.view.rank()
    }

    pub fn dt(&self) -> DType {
        T::dt()
    }

    pub fn deallocate(&self) {
        self.buffer.deallocate();
    }

    pub fn deallocated(&self) -> bool {
        self.buffer.deallocated()
    }
}

impl<T: ElementType> TensorLike for TensorOrMemref<T> {
    type Element = T;

    fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    fn view(&self) -> &BufferView {
        &self.view
    }
}

impl<T: ElementType> std::fmt::Debug for TensorOrMemref<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage_fmt = self.buffer.dump::<T>(false);
        f.debug_struct("TensorOrMemref")
            .field("dt", &T::dt())
            .field("view", &self.view)
            .field("storage", &storage_fmt)
            .finish()
    }
}

/// Structural equality over logical elements. NaN compares equal to NaN.
/// Values over a deallocated buffer never compare equal.
impl<T: ElementType> PartialEq for TensorOrMemref<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.buffer.deallocated() || other.buffer.deallocated() {
            return false;
        }
        if self.view.sizes() != other.view.sizes()
            || self.view.num_vector_dims() != other.view.num_vector_dims()
        {
            return false;
        }
        self.view.indices(true).into_iter().all(|idx| {
            let (a, b) = (self.at(&idx), other.at(&idx));
            match (a.is_nan(), b.is_nan()) {
                (true, true) => true,
                (false, false) => a == b,
                _ => false,
            }
        })
    }
}

impl<T: ElementType + num_traits::ToPrimitive> TensorOrMemref<T> {
    /// Checks that every element is within `atol + rtol * |other|` of
    /// `other`. NaNs match NaNs and infinities match same-signed infinities.
    pub fn all_close(&self, other: &Self, atol: f64, rtol: f64) -> anyhow::Result<()> {
        if self.shape() != other.shape() {
            anyhow::bail!("Shape mismatch {:?} != {:?}", self.shape(), other.shape())
        }
        if self.deallocated() || other.deallocated() {
            anyhow::bail!(TensorError::Deallocated)
        }

        let mut stats = CloseStats::new(atol, rtol);
        for idx in self.view.indices(true) {
            let a = self.at(&idx).to_f64().unwrap_or(f64::NAN);
            let b = other.at(&idx).to_f64().unwrap_or(f64::NAN);
            stats.update(a, b, idx);
        }

        if stats.fail_count > 0 {
            anyhow::bail!(
                "{} samples not close - AVGE={} MAE={} at {:?}",
                stats.fail_count,
                stats.avg_error(),
                stats.max_abs_error,
                stats.max_abs_error_idxs,
            );
        }
        log::debug!(
            "All close - AVGE={} MAE={} at {:?}",
            stats.avg_error(),
            stats.max_abs_error,
            stats.max_abs_error_idxs
        );
        Ok(())
    }
}

struct CloseStats {
    total_error: f64,
    max_abs_error: f64,
    max_abs_error_idxs: Option<RVec<usize>>,
    element_count: usize,
    fail_count: usize,
    atol: f64,
    rtol: f64,
}

impl CloseStats {
    fn new(atol: f64, rtol: f64) -> Self {
        Self {
            total_error: 0.0,
            max_abs_error: 0.0,
            max_abs_error_idxs: None,
            element_count: 0,
            fail_count: 0,
            atol,
            rtol,
        }
    }

    fn update(&mut self, a: f64, b: f64, index: RVec<usize>) {
        let abs_diff = (a - b).abs();
        self.element_count += 1;

        if !self.is_close(a, b, abs_diff) {
            self.fail_count += 1;
        }
        if abs_diff.is_finite() {
            self.total_error += abs_diff;
            if abs_diff > self.max_abs_error {
                self.max_abs_error = abs_diff;
                self.max_abs_error_idxs = Some(index);
            }
        }
    }

    fn avg_error(&self) -> f64 {
        if self.element_count == 0 {
            return 0.0;
        }
        self.total_error / self.element_count as f64
    }

    fn is_close(&self, a: f64, b: f64, abs_diff: f64) -> bool {
        (a.is_nan() && b.is_nan())
            || (a.is_infinite() && b.is_infinite() && a.signum() == b.signum())
            || abs_diff <= self.atol + self.rtol * b.abs()
    }
}
