use std::iter::FusedIterator;

use crate::{rvec, BufferView, RVec};

/// The logical index space of a [`BufferView`].
///
/// Cheap to copy; every call to `into_iter` restarts from the first index.
#[derive(derive_new::new, Clone, Copy)]
pub struct LogicalIndexView<'a> {
    view: &'a BufferView,
    include_vector_dims: bool,
}

impl<'a> LogicalIndexView<'a> {
    /// Number of dimensions in each emitted index.
    pub fn dims(&self) -> usize {
        if self.include_vector_dims {
            self.view.sizes().len()
        } else {
            self.view.rank()
        }
    }

    pub fn len(&self) -> usize {
        self.view.num_elements(self.include_vector_dims)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> LogicalIndices<'a> {
        let remaining = self.len();
        let cursor = if remaining == 0 {
            Cursor::Exhausted
        } else {
            Cursor::At(rvec![0; self.dims()])
        };
        LogicalIndices {
            sizes: &self.view.sizes()[..self.dims()],
            cursor,
            remaining,
        }
    }
}

impl<'a> IntoIterator for LogicalIndexView<'a> {
    type Item = RVec<usize>;
    type IntoIter = LogicalIndices<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    At(RVec<usize>),
    Exhausted,
}

/// Row-major walk over a view's logical indices, last dimension fastest.
///
/// Advances like a mixed-radix counter whose digits are bounded by the
/// dimension sizes.
#[derive(Debug, Clone)]
pub struct LogicalIndices<'a> {
    sizes: &'a [usize],
    cursor: Cursor,
    remaining: usize,
}

impl LogicalIndices<'_> {
    pub fn is_exhausted(&self) -> bool {
        self.cursor == Cursor::Exhausted
    }

    fn advance(&mut self) {
        let Cursor::At(index) = &mut self.cursor else {
            return;
        };
        for (digit, &size) in index.iter_mut().zip(self.sizes.iter()).rev() {
            *digit += 1;
            if *digit < size {
                return;
            }
            *digit = 0;
        }
        self.cursor = Cursor::Exhausted;
    }
}

impl Iterator for LogicalIndices<'_> {
    type Item = RVec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = match &self.cursor {
            Cursor::At(index) => index.clone(),
            Cursor::Exhausted => return None,
        };
        self.advance();
        self.remaining -= 1;
        debug_assert_eq!(self.remaining == 0, self.is_exhausted());
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for LogicalIndices<'_> {}

impl FusedIterator for LogicalIndices<'_> {}

#[cfg(test)]
mod tests {
    use crate::{shape, BufferView, Shape};
    use proptest::prelude::*;
    use std::collections::HashSet;
    use test_strategy::proptest;

    #[test]
    fn row_major_order() {
        let view = BufferView::new(shape![2, 3]);
        let indices = view
            .indices(false)
            .into_iter()
            .map(|idx| idx.to_vec())
            .collect::<Vec<_>>();
        assert_eq!(
            indices,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 0],
                vec![1, 1],
                vec![1, 2],
            ]
        );
    }

    #[test]
    fn scalar_yields_single_empty_index() {
        let view = BufferView::new(shape![]);
        let indices = view.indices(true).into_iter().collect::<Vec<_>>();
        assert_eq!(indices.len(), 1);
        assert!(indices[0].is_empty());
    }

    #[test]
    fn zero_sized_view_is_empty() {
        let view = BufferView::new(shape![3, 0, 2]);
        let mut iter = view.indices(true).into_iter();
        assert!(iter.is_exhausted());
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn vector_dims_excluded_by_default() {
        let view = BufferView::new(shape![2, 3, 4]).with_vector_dims(1);
        assert_eq!(view.indices(false).into_iter().count(), 6);
        assert!(view.indices(false).into_iter().all(|idx| idx.len() == 2));
        assert_eq!(view.indices(true).into_iter().count(), 24);
    }

    #[test]
    fn restartable() {
        let view = BufferView::new(shape![2, 2]);
        let indices = view.indices(true);
        let first = indices.into_iter().collect::<Vec<_>>();
        let second = indices.into_iter().collect::<Vec<_>>();
        assert_eq!(first, second);
    }

    #[test]
    fn exhausts_and_stays_exhausted() {
        let view = BufferView::new(shape![2]);
        let mut iter = view.indices(true).into_iter();
        assert_eq!(iter.len(), 2);
        iter.next();
        iter.next();
        assert!(iter.is_exhausted());
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }

    #[proptest(cases = 64)]
    fn visits_every_index_once(
        #[strategy(Shape::arbitrary_with(vec![0..=3, 0..=4, 1..=3]))] shape: Shape,
        #[strategy(0usize..=1)] vector_dims: usize,
        include_vector_dims: bool,
    ) {
        let view = BufferView::new(shape).with_vector_dims(vector_dims);
        let mut iter = view.indices(include_vector_dims).into_iter();
        let mut seen = HashSet::new();
        for idx in iter.by_ref() {
            prop_assert!(view.in_bounds(&idx));
            prop_assert!(seen.insert(idx));
        }
        prop_assert_eq!(seen.len(), view.num_elements(include_vector_dims));
        prop_assert!(iter.is_exhausted());
    }
}
