use crate::{Enforcer, InvariantError, LogicalIndexView, RVec, Shape, Strides};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error(
        "Subview arity mismatch: {offsets} offsets, {sizes} sizes, {strides} strides for a view with {dims} dims."
    )]
    ArityMismatch {
        offsets: usize,
        sizes: usize,
        strides: usize,
        dims: usize,
    },
    #[error(
        "Subview out of bounds at dim {dim}: offset {offset}, size {size}, stride {stride} within {bound}."
    )]
    OutOfBounds {
        dim: usize,
        offset: usize,
        size: usize,
        stride: isize,
        bound: usize,
    },
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}

/// A view into a physical buffer.
///
/// Maps logical indices to element offsets within a [`crate::Buffer`]:
/// `offset + Σ index[i] * strides[i]`. The trailing `num_vector_dims`
/// dimensions are vector lanes rather than tensor axes. A view with
/// `is_vector` set describes a bare vector and carries no tensor dimensions.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferView {
    offset: usize,
    sizes: Shape,
    strides: Strides,
    num_vector_dims: Option<usize>,
    is_vector: bool,
}

impl BufferView {
    /// A row-major view of `sizes` starting at element 0.
    pub fn new(sizes: impl Into<Shape>) -> Self {
        let sizes = sizes.into();
        let strides = Strides::row_major(&sizes);
        Self {
            offset: 0,
            sizes,
            strides,
            num_vector_dims: None,
            is_vector: false,
        }
    }

    /// A row-major view describing a bare vector.
    pub fn vector(sizes: impl Into<Shape>) -> Self {
        Self {
            is_vector: true,
            ..Self::new(sizes)
        }
    }

    pub fn try_new(
        offset: usize,
        sizes: Shape,
        strides: Strides,
        num_vector_dims: Option<usize>,
    ) -> Result<Self, ViewError> {
        Enforcer::check_view(&sizes, &strides, num_vector_dims)?;
        Ok(Self {
            offset,
            sizes,
            strides,
            num_vector_dims,
            is_vector: false,
        })
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// # Panics
    ///
    /// If `strides` does not have one entry per dimension.
    pub fn with_strides(mut self, strides: impl Into<Strides>) -> Self {
        let strides = strides.into();
        if let Err(e) = Enforcer::check_stride_arity(&self.sizes, &strides) {
            panic!("{}", e);
        }
        self.strides = strides;
        self
    }

    /// Marks the trailing `n` dimensions as vector lanes.
    ///
    /// # Panics
    ///
    /// If `n` exceeds the number of dimensions.
    pub fn with_vector_dims(mut self, n: usize) -> Self {
        if let Err(e) = Enforcer::check_vector_dims(&self.sizes, Some(n)) {
            panic!("{}", e);
        }
        self.num_vector_dims = Some(n);
        self.is_vector = false;
        self
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn sizes(&self) -> &Shape {
        &self.sizes
    }

    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    pub fn num_vector_dims(&self) -> Option<usize> {
        self.num_vector_dims
    }

    pub fn is_vector(&self) -> bool {
        self.is_vector
    }

    /// Number of tensor (non-vector) dimensions.
    pub fn rank(&self) -> usize {
        self.sizes.len() - self.num_vector_dims.unwrap_or(0)
    }

    /// Sizes of the tensor dimensions.
    pub fn tensor_shape(&self) -> Shape {
        self.sizes.slice(0..self.rank())
    }

    /// Sizes of the trailing vector dimensions.
    pub fn vector_shape(&self) -> Shape {
        self.sizes.slice(self.rank()..self.sizes.len())
    }

    pub fn num_elements(&self, include_vector_dims: bool) -> usize {
        let dims = if include_vector_dims {
            self.sizes.len()
        } else {
            self.rank()
        };
        self.sizes[..dims].iter().product()
    }

    /// Element offset of `indices` in the underlying buffer.
    ///
    /// `indices` may stop short of the vector dimensions, in which case the
    /// result addresses the first lane.
    pub fn physical_index(&self, indices: &[usize]) -> usize {
        debug_assert!(indices.len() <= self.sizes.len());
        let delta = indices
            .iter()
            .zip(self.strides.iter())
            .map(|(&index, &stride)| index as isize * stride)
            .sum::<isize>();
        offset_by(self.offset, delta)
    }

    pub fn in_bounds(&self, indices: &[usize]) -> bool {
        if indices.len() > self.sizes.len() {
            return false;
        }
        indices
            .iter()
            .zip(self.sizes.iter())
            .all(|(index, size)| index < size)
    }

    /// Removes `dim` from the view, fixing it at `dim_offset`.
    ///
    /// Use [`BufferView::slice_range`] with a size of 1 to keep the dimension.
    pub fn slice(&mut self, dim: usize, dim_offset: usize) {
        assert!(dim < self.sizes.len(), "dim {} out of range", dim);
        assert!(
            dim_offset < self.sizes[dim],
            "offset {} out of bounds for dim {} of size {}",
            dim_offset,
            dim,
            self.sizes[dim]
        );
        self.offset = offset_by(self.offset, dim_offset as isize * self.strides[dim]);
        if dim >= self.rank() {
            self.num_vector_dims = self.num_vector_dims.map(|n| n - 1);
        }
        self.sizes.remove(dim);
        self.strides.remove(dim);
    }

    /// Narrows `dim` to `dim_size` elements starting at `dim_offset`, stepping
    /// by `dim_stride`.
    pub fn slice_range(&mut self, dim: usize, dim_offset: usize, dim_size: usize, dim_stride: isize) {
        assert!(dim < self.sizes.len(), "dim {} out of range", dim);
        if let Err(e) = check_range(dim, dim_offset, dim_size, dim_stride, self.sizes[dim]) {
            panic!("{}", e);
        }
        self.offset = offset_by(self.offset, dim_offset as isize * self.strides[dim]);
        self.sizes[dim] = dim_size;
        self.strides[dim] *= dim_stride;
    }

    /// Applies an offset, size and stride to each leading dimension at once.
    ///
    /// Rejects any request that would reach outside the current view; the
    /// view is left untouched on failure.
    pub fn subview(
        &mut self,
        offsets: &[usize],
        sizes: &[usize],
        strides: &[isize],
    ) -> Result<(), ViewError> {
        let dims = offsets.len();
        if sizes.len() != dims || strides.len() != dims || dims > self.sizes.len() {
            return Err(ViewError::ArityMismatch {
                offsets: offsets.len(),
                sizes: sizes.len(),
                strides: strides.len(),
                dims: self.sizes.len(),
            });
        }
        for dim in 0..dims {
            if let Err(e) = check_range(dim, offsets[dim], sizes[dim], strides[dim], self.sizes[dim]) {
                log::debug!("Rejected subview of {:?}: {}", self, e);
                return Err(e);
            }
        }
        for dim in 0..dims {
            self.slice_range(dim, offsets[dim], sizes[dim], strides[dim]);
        }
        Ok(())
    }

    /// Returns the stride of the single dimension that `dims` collapse into,
    /// if they are contiguous in some order.
    ///
    /// Unit dimensions are ignored; if nothing else remains the result is 0.
    pub fn collapsed_stride(&self, dims: &[usize]) -> Option<isize> {
        let mut strides_and_dims = dims
            .iter()
            .filter(|&&dim| self.sizes[dim] != 1)
            .map(|&dim| (self.strides[dim], dim))
            .collect::<RVec<_>>();
        if strides_and_dims.is_empty() {
            return Some(0);
        }
        strides_and_dims.sort_unstable();

        let first = strides_and_dims[0].0;
        let mut next_stride = first;
        for &(stride, dim) in strides_and_dims.iter() {
            if stride != next_stride {
                return None;
            }
            next_stride *= self.sizes[dim] as isize;
        }
        Some(first)
    }

    /// True if the view is laid out row-major with no gaps.
    pub fn is_contiguous(&self) -> bool {
        let expected = Strides::row_major(&self.sizes);
        self.sizes
            .inner()
            .iter()
            .zip(self.strides.inner().iter().zip(expected.inner().iter()))
            .all(|(&size, (actual, expected))| size == 1 || actual == expected)
    }

    /// Every logical index of the view in row-major order.
    pub fn indices(&self, include_vector_dims: bool) -> LogicalIndexView<'_> {
        LogicalIndexView::new(self, include_vector_dims)
    }

    pub fn default_strides(sizes: &Shape) -> Strides {
        Strides::row_major(sizes)
    }

    pub fn strides_for_layout(sizes: &Shape, layout: &[usize]) -> Strides {
        Strides::for_layout(sizes, layout)
    }

    pub(crate) fn reset(&mut self, strides: Strides) {
        self.offset = 0;
        self.strides = strides;
    }

    pub(crate) fn vector_at(&self, indices: &[usize]) -> Self {
        let rank = self.rank();
        Self {
            offset: self.physical_index(indices),
            sizes: self.sizes.slice(rank..self.sizes.len()),
            strides: self.strides.slice(rank..self.strides.len()),
            num_vector_dims: None,
            is_vector: true,
        }
    }
}

fn offset_by(base: usize, delta: isize) -> usize {
    match base.checked_add_signed(delta) {
        Some(index) => index,
        None => panic!("physical index {} + {} is out of range", base, delta),
    }
}

fn check_range(
    dim: usize,
    offset: usize,
    size: usize,
    stride: isize,
    bound: usize,
) -> Result<(), ViewError> {
    let err = ViewError::OutOfBounds {
        dim,
        offset,
        size,
        stride,
        bound,
    };
    if size == 0 {
        return if offset <= bound { Ok(()) } else { Err(err) };
    }
    if offset >= bound {
        return Err(err);
    }
    let last = (size as isize - 1)
        .checked_mul(stride)
        .and_then(|span| span.checked_add(offset as isize));
    match last {
        Some(last) if last >= 0 && (last as usize) < bound => Ok(()),
        _ => Err(err),
    }
}

impl std::fmt::Debug for BufferView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}@{} s{:?}", self.sizes, self.offset, self.strides)?;
        if let Some(n) = self.num_vector_dims {
            write!(f, " v{}", n)?;
        }
        if self.is_vector {
            write!(f, " vector")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape;
    use proptest::prelude::*;
    use test_strategy::proptest;

    #[test]
    fn physical_index_row_major() {
        let view = BufferView::new(shape![2, 3]);
        assert_eq!(view.strides().to_vec(), vec![3, 1]);
        assert_eq!(view.physical_index(&[1, 2]), 5);
        assert_eq!(view.physical_index(&[0, 0]), 0);
    }

    #[test]
    fn slice_drops_dimension() {
        let mut view = BufferView::new(shape![2, 3]);
        view.slice(0, 1);
        assert_eq!(view.sizes(), &shape![3]);
        assert_eq!(view.strides().to_vec(), vec![1]);
        assert_eq!(view.offset(), 3);
    }

    #[test]
    fn slice_vector_dim_shrinks_vector_count() {
        let mut view = BufferView::new(shape![2, 4, 2]).with_vector_dims(2);
        view.slice(2, 1);
        assert_eq!(view.num_vector_dims(), Some(1));
        assert_eq!(view.rank(), 1);
        assert_eq!(view.offset(), 1);
    }

    #[test]
    fn slice_range_keeps_dimension() {
        let mut view = BufferView::new(shape![4, 6]);
        view.slice_range(1, 1, 3, 2);
        assert_eq!(view.sizes(), &shape![4, 3]);
        assert_eq!(view.strides().to_vec(), vec![6, 2]);
        assert_eq!(view.offset(), 1);
        assert_eq!(view.physical_index(&[2, 2]), 1 + 12 + 4);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn slice_range_rejects_overrun() {
        let mut view = BufferView::new(shape![4]);
        view.slice_range(0, 2, 2, 2);
    }

    #[test]
    fn rank_and_element_counts() {
        let view = BufferView::new(shape![2, 3, 4]).with_vector_dims(1);
        assert_eq!(view.rank(), 2);
        assert_eq!(view.num_elements(false), 6);
        assert_eq!(view.num_elements(true), 24);
        assert_eq!(view.tensor_shape(), shape![2, 3]);
        assert_eq!(view.vector_shape(), shape![4]);

        let scalar = BufferView::new(shape![]);
        assert_eq!(scalar.rank(), 0);
        assert_eq!(scalar.num_elements(true), 1);
    }

    #[test]
    fn in_bounds() {
        let view = BufferView::new(shape![2, 3]);
        assert!(view.in_bounds(&[1, 2]));
        assert!(view.in_bounds(&[1]));
        assert!(!view.in_bounds(&[2, 0]));
        assert!(!view.in_bounds(&[0, 3]));
        assert!(!view.in_bounds(&[0, 0, 0]));
    }

    #[test]
    fn subview_rejects_oversized_request() {
        let mut view = BufferView::new(shape![5]);
        let before = view.clone();
        let err = view.subview(&[0], &[6], &[1]).unwrap_err();
        assert!(matches!(err, ViewError::OutOfBounds { dim: 0, .. }));
        assert_eq!(view, before);
    }

    #[test]
    fn subview_rejects_strided_overrun() {
        let mut view = BufferView::new(shape![5]);
        assert!(view.subview(&[1], &[3], &[2]).is_err());
        assert!(view.subview(&[0], &[3], &[2]).is_ok());
        assert_eq!(view.strides().to_vec(), vec![2]);
    }

    #[test]
    fn subview_rejects_out_of_bounds_offset() {
        let mut view = BufferView::new(shape![4, 4]);
        assert!(view.subview(&[4, 0], &[1, 1], &[1, 1]).is_err());
        assert!(view.subview(&[5, 0], &[0, 1], &[1, 1]).is_err());
        assert_eq!(view, BufferView::new(shape![4, 4]));
    }

    #[test]
    fn empty_subviews_are_in_bounds() {
        let mut empty = BufferView::new(shape![0]);
        empty.subview(&[0], &[0], &[1]).unwrap();
        assert_eq!(empty.sizes(), &shape![0]);
        assert_eq!(empty.indices(true).len(), 0);

        let mut view = BufferView::new(shape![4, 3]);
        view.subview(&[4, 1], &[0, 2], &[1, 1]).unwrap();
        assert_eq!(view.sizes(), &shape![0, 2]);
        assert_eq!(view.num_elements(true), 0);
    }

    #[test]
    fn subview_rejects_arity_mismatch() {
        let mut view = BufferView::new(shape![4, 4]);
        let err = view.subview(&[0, 0], &[1], &[1, 1]).unwrap_err();
        assert!(matches!(err, ViewError::ArityMismatch { .. }));
    }

    #[test]
    fn subview_applies_every_dim() {
        let mut view = BufferView::new(shape![4, 6]);
        view.subview(&[1, 2], &[2, 2], &[2, 3]).unwrap();
        assert_eq!(view.sizes(), &shape![2, 2]);
        assert_eq!(view.strides().to_vec(), vec![12, 3]);
        assert_eq!(view.offset(), 6 + 2);
        assert_eq!(view.physical_index(&[1, 1]), 8 + 12 + 3);
    }

    #[test]
    fn subview_allows_reversed_strides() {
        let mut view = BufferView::new(shape![4]);
        view.subview(&[3], &[4], &[-1]).unwrap();
        let physical = view
            .indices(false)
            .into_iter()
            .map(|idx| view.physical_index(&idx))
            .collect::<Vec<_>>();
        assert_eq!(physical, vec![3, 2, 1, 0]);
    }

    #[test]
    fn collapsed_stride_contiguous() {
        let view = BufferView::new(shape![2, 3, 4]);
        assert_eq!(view.collapsed_stride(&[1, 2]), Some(1));
        assert_eq!(view.collapsed_stride(&[0, 1]), Some(4));
        assert_eq!(view.collapsed_stride(&[0, 1, 2]), Some(1));
    }

    #[test]
    fn collapsed_stride_rejects_gaps() {
        let mut view = BufferView::new(shape![2, 3, 4]);
        view.slice_range(2, 0, 3, 1);
        assert_eq!(view.collapsed_stride(&[1, 2]), None);
        assert_eq!(view.collapsed_stride(&[0, 1]), Some(4));
    }

    #[test]
    fn collapsed_stride_of_strided_run() {
        // [3x2] with strides [4x2] walks 0,2,4,...,10
        let mut view = BufferView::new(shape![2, 3, 4]);
        view.slice_range(2, 0, 2, 2);
        assert_eq!(view.collapsed_stride(&[1, 2]), Some(2));
        assert_eq!(view.collapsed_stride(&[0, 2]), None);
    }

    #[test]
    fn collapsed_stride_ignores_unit_dims() {
        let view = BufferView::new(shape![1, 1]);
        assert_eq!(view.collapsed_stride(&[0, 1]), Some(0));
        let view = BufferView::new(shape![3, 1, 4]);
        assert_eq!(view.collapsed_stride(&[0, 1, 2]), Some(1));
    }

    #[test]
    fn contiguity() {
        let mut view = BufferView::new(shape![2, 3]);
        assert!(view.is_contiguous());
        view.slice_range(1, 0, 2, 1);
        assert!(!view.is_contiguous());
        let column_major = BufferView::new(shape![2, 3]).with_strides([1isize, 2]);
        assert!(!column_major.is_contiguous());
        let unit_outer = BufferView::new(shape![1, 3]).with_strides([7isize, 1]);
        assert!(unit_outer.is_contiguous());
    }

    #[test]
    fn try_new_validates() {
        let err = BufferView::try_new(0, shape![2, 3], Strides::from([1isize]), None).unwrap_err();
        assert!(matches!(err, ViewError::Invariant(InvariantError::StrideArity { .. })));
        assert!(BufferView::try_new(0, shape![2], Strides::from([1isize]), Some(2)).is_err());
        assert!(BufferView::try_new(4, shape![2], Strides::from([3isize]), Some(1)).is_ok());
    }

    #[test]
    fn debug_format() {
        let view = BufferView::new(shape![2, 3]).with_vector_dims(1);
        assert_eq!(format!("{:?}", view), "[2x3]@0 s[3x1] v1");
    }

    #[proptest(cases = 64)]
    fn row_major_covers_every_offset(
        #[strategy(Shape::arbitrary_with(vec![1..=4, 1..=4, 1..=5]))] shape: Shape,
    ) {
        let view = BufferView::new(shape.clone());
        let physical = view
            .indices(true)
            .into_iter()
            .map(|idx| view.physical_index(&idx))
            .collect::<Vec<_>>();
        let expected = (0..shape.numel()).collect::<Vec<_>>();
        prop_assert_eq!(physical, expected);
    }

    #[proptest(cases = 64)]
    fn subview_never_escapes_parent(
        #[strategy(1usize..=8)] bound: usize,
        #[strategy(0usize..10)] offset: usize,
        #[strategy(0usize..10)] size: usize,
        #[strategy(-3isize..=3)] stride: isize,
    ) {
        let mut view = BufferView::new(shape![bound]);
        if view.subview(&[offset], &[size], &[stride]).is_ok() {
            for idx in view.indices(false) {
                prop_assert!(view.physical_index(&idx) < bound);
            }
        }
    }
}
