use crate::{rvec, Enforcer, RVec, Shape};

/// Element strides, one per dimension. Strides may be zero (broadcast) or
/// negative (reversed views).
#[derive(Clone, PartialEq, Eq, Default, Hash)]
pub struct Strides(RVec<isize>);

impl Strides {
    pub fn new(strides: RVec<isize>) -> Self {
        Self(strides)
    }

    pub fn inner(&self) -> &RVec<isize> {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<isize> {
        self.0.to_vec()
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &isize> + ExactSizeIterator {
        self.0.iter()
    }

    pub fn remove(&mut self, index: usize) -> isize {
        self.0.remove(index)
    }

    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        Strides(self.0[range].into())
    }

    /// Row-major strides: the last dimension is contiguous.
    pub fn row_major(shape: &Shape) -> Self {
        Self::from(shape)
    }

    /// Strides for a minor-to-major `layout` permutation.
    ///
    /// `layout[0]` is the fastest varying dimension. An empty layout is
    /// row-major.
    ///
    /// # Panics
    ///
    /// If `layout` is not a permutation of `0..shape.rank()`.
    pub fn for_layout(shape: &Shape, layout: &[usize]) -> Self {
        if layout.is_empty() {
            return Self::row_major(shape);
        }
        if let Err(e) = Enforcer::check_layout(layout, shape.rank()) {
            panic!("{}", e);
        }
        let mut strides = rvec![0; shape.rank()];
        let mut stride = 1;
        for &dim in layout {
            strides[dim] = stride;
            stride *= shape[dim] as isize;
        }
        Self(strides)
    }
}

pub(crate) fn is_permutation(layout: &[usize], rank: usize) -> bool {
    if layout.len() != rank {
        return false;
    }
    let mut seen: RVec<bool> = rvec![false; rank];
    for &dim in layout {
        if dim >= rank || seen[dim] {
            return false;
        }
        seen[dim] = true;
    }
    true
}

impl std::fmt::Debug for Strides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut strides = format!("[{}", self.0.first().unwrap_or(&0));
        for dim in self.0.iter().skip(1) {
            strides.push_str(&format!("x{}", dim));
        }
        write!(f, "{}]", strides)
    }
}

impl std::ops::Index<usize> for Strides {
    type Output = isize;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl std::ops::IndexMut<usize> for Strides {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl From<&Shape> for Strides {
    fn from(shape: &Shape) -> Self {
        let mut strides = rvec![];
        let mut stride = 1;
        for size in shape.inner().iter().rev() {
            strides.push(stride);
            stride *= *size as isize;
        }
        strides.reverse();
        Self(strides)
    }
}

impl From<Vec<isize>> for Strides {
    fn from(strides: Vec<isize>) -> Self {
        Self(strides.into())
    }
}

impl From<&[isize]> for Strides {
    fn from(strides: &[isize]) -> Self {
        Self(strides.into())
    }
}

impl<const N: usize> From<[isize; N]> for Strides {
    fn from(strides: [isize; N]) -> Self {
        Self(strides.iter().copied().collect())
    }
}
