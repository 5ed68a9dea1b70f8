//! Host reference for the dot-interaction layer.
//!
//! Per batch element with features `X` (`M×K`, row-major):
//!
//! ```text
//! forward:   out = [ X[0, :] | tril(X·Xᵀ) ]        K + M(M-1)/2 values
//! tril:      A[i,j] = A[j,i] = up[K + idx(i,j)]    M×M, zero diagonal
//! backward:  grad = A·X,  bottom = up[0..K]
//! ```
//!
//! `tril` walks the strictly-lower triangle row-major (`i` in `1..M`,
//! `j` in `0..i`). Dot products accumulate in `f32` (`f64` for f64
//! inputs) and every stored value is rounded to the element type, so the
//! per-batch routines double as the math of a host-executed device.

use crate::error::{DlrmError, Result};
use crate::types::DataType;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Reference outputs of the backward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BackwardReference {
    /// `M×K×B` input gradient.
    pub grad: Vec<f64>,
    /// `K×B` passthrough gradient.
    pub bottom_mlp_grad: Vec<f64>,
    /// `M×M×B` triangular reduction.
    pub acc: Vec<f64>,
}

/// Dot product in the accumulation precision of `data_type`.
fn dot<'a, I>(data_type: DataType, pairs: I) -> f64
where
    I: Iterator<Item = (&'a f64, &'a f64)>,
{
    if data_type == DataType::F64 {
        pairs.map(|(a, b)| a * b).sum()
    } else {
        pairs.map(|(a, b)| *a as f32 * *b as f32).sum::<f32>() as f64
    }
}

/// Index of `(i, j)`, `j < i`, in the packed strictly-lower triangle.
#[inline]
pub fn tril_index(i: usize, j: usize) -> usize {
    i * (i - 1) / 2 + j
}

// ============================================================================
// Per-batch routines
// ============================================================================

/// Forward pass for one batch element.
///
/// `input` is `M×K`, `output` holds `K + M(M-1)/2` values, `acc` is `M×M`.
pub fn forward_batch(
    data_type: DataType,
    input: &[f64],
    m: usize,
    k: usize,
    output: &mut [f64],
    acc: &mut [f64],
) {
    for i in 0..m {
        let row_i = &input[i * k..(i + 1) * k];
        for j in 0..m {
            let row_j = &input[j * k..(j + 1) * k];
            acc[i * m + j] = data_type.quantize(dot(data_type, row_i.iter().zip(row_j)));
        }
    }

    output[..k].copy_from_slice(&input[..k]);
    for i in 1..m {
        for j in 0..i {
            output[k + tril_index(i, j)] = acc[i * m + j];
        }
    }
}

/// Triangular reduction for one batch element: unpack the interaction part
/// of `upstream` into the symmetric `M×M` matrix `acc`.
pub fn tril_batch(upstream: &[f64], m: usize, k: usize, acc: &mut [f64]) {
    for i in 0..m {
        acc[i * m + i] = 0.0;
        for j in 0..i {
            let v = upstream[k + tril_index(i, j)];
            acc[i * m + j] = v;
            acc[j * m + i] = v;
        }
    }
}

/// Backward pass for one batch element, reading the reduced `acc`.
#[allow(clippy::too_many_arguments)]
pub fn backward_batch(
    data_type: DataType,
    input: &[f64],
    upstream: &[f64],
    acc: &[f64],
    m: usize,
    k: usize,
    grad: &mut [f64],
    bottom_mlp_grad: &mut [f64],
) {
    for i in 0..m {
        let acc_row = &acc[i * m..(i + 1) * m];
        for h in 0..k {
            let column = (0..m).map(|j| &input[j * k + h]);
            grad[i * k + h] = data_type.quantize(dot(data_type, acc_row.iter().zip(column)));
        }
    }
    bottom_mlp_grad[..k].copy_from_slice(&upstream[..k]);
}

// ============================================================================
// Batched reference
// ============================================================================

fn check_len(name: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(DlrmError::DimensionMismatch(format!(
            "{name}: expected {expected} elements, got {actual}"
        )));
    }
    Ok(())
}

/// Forward reference over `b` batch elements; returns `B·(K + M(M-1)/2)`
/// values.
pub fn dlrm_forward(
    data_type: DataType,
    input: &[f64],
    m: usize,
    k: usize,
    b: usize,
) -> Result<Vec<f64>> {
    check_len("input", input.len(), m * k * b)?;
    let out_stride = m * m.saturating_sub(1) / 2 + k;
    let mut output = vec![0.0; out_stride * b];
    if m == 0 || k == 0 || b == 0 {
        return Ok(output);
    }

    let run = |(x, out): (&[f64], &mut [f64])| {
        let mut acc = vec![0.0; m * m];
        forward_batch(data_type, x, m, k, out, &mut acc);
    };

    #[cfg(feature = "parallel")]
    input
        .par_chunks(m * k)
        .zip(output.par_chunks_mut(out_stride))
        .for_each(run);

    #[cfg(not(feature = "parallel"))]
    input
        .chunks(m * k)
        .zip(output.chunks_mut(out_stride))
        .for_each(run);

    Ok(output)
}

/// Triangular reduction over `b` batch elements; returns `M×M×B` values.
pub fn dlrm_tril_reduce(upstream: &[f64], m: usize, k: usize, b: usize) -> Result<Vec<f64>> {
    let up_stride = m * m.saturating_sub(1) / 2 + k;
    check_len("upstream_grad", upstream.len(), up_stride * b)?;
    let mut acc = vec![0.0; m * m * b];
    if m == 0 || b == 0 {
        return Ok(acc);
    }
    for (up, a) in upstream.chunks(up_stride).zip(acc.chunks_mut(m * m)) {
        tril_batch(up, m, k, a);
    }
    Ok(acc)
}

/// Backward reference over `b` batch elements.
pub fn dlrm_backward(
    data_type: DataType,
    input: &[f64],
    upstream: &[f64],
    m: usize,
    k: usize,
    b: usize,
) -> Result<BackwardReference> {
    check_len("input", input.len(), m * k * b)?;
    let acc = dlrm_tril_reduce(upstream, m, k, b)?;
    let up_stride = m * m.saturating_sub(1) / 2 + k;

    let mut grad = vec![0.0; m * k * b];
    let mut bottom_mlp_grad = vec![0.0; k * b];
    if m == 0 || k == 0 || b == 0 {
        return Ok(BackwardReference {
            grad,
            bottom_mlp_grad,
            acc,
        });
    }

    let run = |((((x, up), a), g), bottom): (
        (((&[f64], &[f64]), &[f64]), &mut [f64]),
        &mut [f64],
    )| {
        backward_batch(data_type, x, up, a, m, k, g, bottom);
    };

    #[cfg(feature = "parallel")]
    input
        .par_chunks(m * k)
        .zip(upstream.par_chunks(up_stride))
        .zip(acc.par_chunks(m * m))
        .zip(grad.par_chunks_mut(m * k))
        .zip(bottom_mlp_grad.par_chunks_mut(k))
        .for_each(run);

    #[cfg(not(feature = "parallel"))]
    input
        .chunks(m * k)
        .zip(upstream.chunks(up_stride))
        .zip(acc.chunks(m * m))
        .zip(grad.chunks_mut(m * k))
        .zip(bottom_mlp_grad.chunks_mut(k))
        .for_each(run);

    Ok(BackwardReference {
        grad,
        bottom_mlp_grad,
        acc,
    })
}
