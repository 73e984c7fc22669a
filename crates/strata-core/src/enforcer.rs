use crate::{strides::is_permutation, Shape, Strides};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    #[error("Stride arity mismatch. {sizes} sizes != {strides} strides.")]
    StrideArity { sizes: usize, strides: usize },
    #[error("View has {vector_dims} vector dims but only {dims} dims in total.")]
    VectorDimsExceedRank { vector_dims: usize, dims: usize },
    #[error("Layout {layout:?} is not a permutation of rank {rank}.")]
    InvalidLayout { layout: Vec<usize>, rank: usize },
}

/// # Enforcer
///
/// Enforcer enforces the structural invariants of a view.
pub struct Enforcer;

impl Enforcer {
    pub fn check_stride_arity(sizes: &Shape, strides: &Strides) -> Result<(), InvariantError> {
        if sizes.len() != strides.len() {
            return Err(InvariantError::StrideArity {
                sizes: sizes.len(),
                strides: strides.len(),
            });
        }
        Ok(())
    }

    pub fn check_vector_dims(
        sizes: &Shape,
        num_vector_dims: Option<usize>,
    ) -> Result<(), InvariantError> {
        let vector_dims = num_vector_dims.unwrap_or(0);
        if vector_dims > sizes.len() {
            return Err(InvariantError::VectorDimsExceedRank {
                vector_dims,
                dims: sizes.len(),
            });
        }
        Ok(())
    }

    pub fn check_layout(layout: &[usize], rank: usize) -> Result<(), InvariantError> {
        if !layout.is_empty() && !is_permutation(layout, rank) {
            return Err(InvariantError::InvalidLayout {
                layout: layout.to_vec(),
                rank,
            });
        }
        Ok(())
    }

    pub fn check_view(
        sizes: &Shape,
        strides: &Strides,
        num_vector_dims: Option<usize>,
    ) -> Result<(), InvariantError> {
        Self::check_stride_arity(sizes, strides)?;
        Self::check_vector_dims(sizes, num_vector_dims)
    }
}
