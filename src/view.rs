//! Shape/stride algebra. A `View` maps logical indices onto a flat buffer;
//! every operation here is O(rank) and never touches element data.

use crate::errors::{PgError, PgResult};
use serde::{Deserialize, Serialize};

/// `(shape, strides, offset)` over a flat storage buffer.
///
/// Strides count elements, not bytes, and may be negative (reversed slices)
/// or zero (broadcast axes). A view is *contiguous* iff its strides are the
/// row-major packing of its shape and the offset is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    shape: Vec<usize>,
    strides: Vec<isize>,
    offset: usize,
}

/// Per-axis `(start, stop, step)` with Python slice semantics: `None`
/// bounds select the axis extremity for the step's direction, negative
/// indices count from the end, and negative steps walk backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSpec {
    pub start: Option<isize>,
    pub stop: Option<isize>,
    pub step: isize,
}

impl SliceSpec {
    pub fn new(start: Option<isize>, stop: Option<isize>, step: isize) -> Self {
        SliceSpec { start, stop, step }
    }

    /// The whole axis, untouched.
    pub fn all() -> Self {
        SliceSpec {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// Normalize against an axis of length `n`, returning
    /// `(first_index, result_len, step)`.
    fn resolve(&self, n: usize) -> PgResult<(usize, usize, isize)> {
        let step = self.step;
        if step == 0 {
            return Err(PgError::ShapeMismatch {
                op: "slice",
                lhs: vec![n],
                rhs: vec![0],
            });
        }
        let n = n as isize;
        let norm = |i: isize| if i < 0 { i + n } else { i };
        if step > 0 {
            let start = norm(self.start.unwrap_or(0)).clamp(0, n);
            let stop = norm(self.stop.unwrap_or(n)).clamp(0, n);
            let len = if stop > start {
                ((stop - start + step - 1) / step) as usize
            } else {
                0
            };
            Ok((start.max(0) as usize, len, step))
        } else {
            // A missing stop walks through index 0 inclusive, which the
            // clamp encodes as the virtual position -1.
            let start = norm(self.start.unwrap_or(n - 1)).clamp(-1, n - 1);
            let stop = self.stop.map(norm).unwrap_or(-1).clamp(-1, n - 1);
            let len = if start > stop {
                ((start - stop - step - 1) / -step) as usize
            } else {
                0
            };
            Ok((start.max(0) as usize, len, step))
        }
    }
}

impl From<std::ops::Range<isize>> for SliceSpec {
    fn from(r: std::ops::Range<isize>) -> Self {
        SliceSpec::new(Some(r.start), Some(r.end), 1)
    }
}

impl From<std::ops::RangeFrom<isize>> for SliceSpec {
    fn from(r: std::ops::RangeFrom<isize>) -> Self {
        SliceSpec::new(Some(r.start), None, 1)
    }
}

impl From<std::ops::RangeTo<isize>> for SliceSpec {
    fn from(r: std::ops::RangeTo<isize>) -> Self {
        SliceSpec::new(None, Some(r.end), 1)
    }
}

impl From<std::ops::RangeFull> for SliceSpec {
    fn from(_: std::ops::RangeFull) -> Self {
        SliceSpec::all()
    }
}

impl From<(isize, isize, isize)> for SliceSpec {
    fn from((start, stop, step): (isize, isize, isize)) -> Self {
        SliceSpec::new(Some(start), Some(stop), step)
    }
}

pub(crate) fn row_major_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![1isize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1] as isize;
    }
    strides
}

/// Normalize a possibly-negative axis into `[0, rank)`.
pub(crate) fn normalize_axis(axis: isize, rank: usize) -> PgResult<usize> {
    let r = rank as isize;
    let a = if axis < 0 { axis + r } else { axis };
    if a < 0 || a >= r {
        return Err(PgError::AxisOutOfRange { axis, rank });
    }
    Ok(a as usize)
}

/// Normalize a reduction axis list. An empty list selects every axis.
/// Duplicates (after normalization) are rejected.
pub(crate) fn normalize_axes(axes: &[isize], rank: usize) -> PgResult<Vec<usize>> {
    if axes.is_empty() {
        return Ok((0..rank).collect());
    }
    let mut out = Vec::with_capacity(axes.len());
    for &axis in axes {
        let a = normalize_axis(axis, rank)?;
        if out.contains(&a) {
            return Err(PgError::AxisOutOfRange { axis, rank });
        }
        out.push(a);
    }
    out.sort_unstable();
    Ok(out)
}

impl View {
    /// Row-major packed view over a fresh buffer.
    pub fn contiguous(shape: &[usize]) -> Self {
        View {
            strides: row_major_strides(shape),
            shape: shape.to_vec(),
            offset: 0,
        }
    }

    pub(crate) fn from_parts(shape: Vec<usize>, strides: Vec<isize>, offset: usize) -> Self {
        debug_assert_eq!(shape.len(), strides.len());
        View {
            shape,
            strides,
            offset,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of logical elements. The empty shape is a 0-D scalar with one
    /// element.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_contiguous(&self) -> bool {
        self.offset == 0 && self.strides == row_major_strides(&self.shape)
    }

    /// Buffer position of a logical multi-index.
    pub(crate) fn position_of(&self, index: &[usize]) -> usize {
        let mut pos = self.offset as isize;
        for (i, &ix) in index.iter().enumerate() {
            pos += ix as isize * self.strides[i];
        }
        pos as usize
    }

    /// Right-aligned broadcast of two shapes. Fails unless every aligned
    /// pair is equal or has a 1 on either side.
    pub fn broadcast_shapes(
        op: &'static str,
        lhs: &[usize],
        rhs: &[usize],
    ) -> PgResult<Vec<usize>> {
        let rank = lhs.len().max(rhs.len());
        let mut out = vec![0usize; rank];
        for i in 0..rank {
            let l = lhs
                .len()
                .checked_sub(rank - i)
                .map(|j| lhs[j])
                .unwrap_or(1);
            let r = rhs
                .len()
                .checked_sub(rank - i)
                .map(|j| rhs[j])
                .unwrap_or(1);
            out[i] = if l == r || r == 1 {
                l
            } else if l == 1 {
                r
            } else {
                return Err(PgError::ShapeMismatch {
                    op,
                    lhs: lhs.to_vec(),
                    rhs: rhs.to_vec(),
                });
            };
        }
        Ok(out)
    }

    /// Broadcast this view to a wider target shape: new leading axes and
    /// size-1 axes get stride 0, so no element is ever copied.
    pub fn broadcast_to(&self, target: &[usize]) -> PgResult<View> {
        if target.len() < self.rank() {
            return Err(PgError::ShapeMismatch {
                op: "broadcast",
                lhs: self.shape.clone(),
                rhs: target.to_vec(),
            });
        }
        let lead = target.len() - self.rank();
        let mut strides = vec![0isize; target.len()];
        for i in 0..self.rank() {
            let (own, want) = (self.shape[i], target[lead + i]);
            if own == want {
                strides[lead + i] = self.strides[i];
            } else if own == 1 {
                strides[lead + i] = 0;
            } else {
                return Err(PgError::ShapeMismatch {
                    op: "broadcast",
                    lhs: self.shape.clone(),
                    rhs: target.to_vec(),
                });
            }
        }
        Ok(View::from_parts(target.to_vec(), strides, self.offset))
    }

    /// Reorder axes. `axes` must be a permutation of `0..rank` (negative
    /// indices allowed).
    pub fn permute(&self, axes: &[isize]) -> PgResult<View> {
        let rank = self.rank();
        if axes.len() != rank {
            return Err(PgError::AxisOutOfRange {
                axis: axes.len() as isize,
                rank,
            });
        }
        let mut seen = vec![false; rank];
        let mut shape = Vec::with_capacity(rank);
        let mut strides = Vec::with_capacity(rank);
        for &axis in axes {
            let a = normalize_axis(axis, rank)?;
            if seen[a] {
                return Err(PgError::AxisOutOfRange { axis, rank });
            }
            seen[a] = true;
            shape.push(self.shape[a]);
            strides.push(self.strides[a]);
        }
        Ok(View::from_parts(shape, strides, self.offset))
    }

    /// Reverse the axis order over the closed interval `[min(i,j), max(i,j)]`.
    pub fn transpose(&self, i: isize, j: isize) -> PgResult<View> {
        let rank = self.rank();
        let a = normalize_axis(i, rank)?;
        let b = normalize_axis(j, rank)?;
        let (lo, hi) = (a.min(b), a.max(b));
        let mut axes: Vec<isize> = (0..rank as isize).collect();
        axes[lo..=hi].reverse();
        self.permute(&axes)
    }

    /// Insert a size-1 axis. `-1` appends after the last axis. The stride is
    /// chosen so a contiguous view stays contiguous.
    pub fn unsqueeze(&self, axis: isize) -> PgResult<View> {
        let rank = self.rank();
        let r = rank as isize;
        let a = if axis < 0 { axis + r + 1 } else { axis };
        if a < 0 || a > r {
            return Err(PgError::AxisOutOfRange { axis, rank });
        }
        let a = a as usize;
        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        let stride = if a == rank {
            1
        } else {
            strides[a] * shape[a] as isize
        };
        shape.insert(a, 1);
        strides.insert(a, stride);
        Ok(View::from_parts(shape, strides, self.offset))
    }

    /// Slice each leading axis by its spec; trailing axes keep their full
    /// range. Returns the sliced view plus the normalized per-axis
    /// `(first_index, step)` pairs (the scatter geometry autograd needs).
    pub fn slice(&self, specs: &[SliceSpec]) -> PgResult<(View, Vec<(usize, isize)>)> {
        let rank = self.rank();
        if specs.len() > rank {
            return Err(PgError::AxisOutOfRange {
                axis: specs.len() as isize,
                rank,
            });
        }
        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        let mut offset = self.offset as isize;
        let mut geometry = Vec::with_capacity(rank);
        for axis in 0..rank {
            let spec = specs.get(axis).copied().unwrap_or_else(SliceSpec::all);
            let (start, len, step) = spec.resolve(self.shape[axis])?;
            if len > 0 {
                offset += start as isize * strides[axis];
            }
            shape[axis] = len;
            strides[axis] *= step;
            geometry.push((start, step));
        }
        Ok((
            View::from_parts(shape, strides, offset as usize),
            geometry,
        ))
    }

    /// Collapse the closed axis range `[start, end]` into a single axis.
    pub fn flatten_shape(&self, start: isize, end: isize) -> PgResult<Vec<usize>> {
        let rank = self.rank();
        let s = normalize_axis(start, rank)?;
        let e = normalize_axis(end, rank)?;
        if s > e {
            return Err(PgError::AxisOutOfRange { axis: end, rank });
        }
        let mut shape = self.shape[..s].to_vec();
        shape.push(self.shape[s..=e].iter().product());
        shape.extend_from_slice(&self.shape[e + 1..]);
        Ok(shape)
    }
}
