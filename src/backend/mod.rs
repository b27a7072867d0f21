//! Kernel execution layer. `cpu` holds the kernels; this module holds the
//! strided iteration machinery they share.

pub mod cpu;

use crate::view::View;

/// Iterator over the buffer positions of a view's logical elements, in
/// row-major logical order. Handles zero and negative strides, so the same
/// walk serves packed, broadcast and reversed-slice operands.
pub(crate) struct StridedOffsets<'a> {
    view: &'a View,
    index: Vec<usize>,
    pos: isize,
    remaining: usize,
}

impl<'a> StridedOffsets<'a> {
    pub fn new(view: &'a View) -> Self {
        StridedOffsets {
            index: vec![0; view.rank()],
            pos: view.offset() as isize,
            remaining: view.len(),
            view,
        }
    }
}

impl Iterator for StridedOffsets<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let out = self.pos as usize;
        self.remaining -= 1;
        let shape = self.view.shape();
        let strides = self.view.strides();
        for axis in (0..shape.len()).rev() {
            self.index[axis] += 1;
            self.pos += strides[axis];
            if self.index[axis] < shape[axis] {
                break;
            }
            self.pos -= shape[axis] as isize * strides[axis];
            self.index[axis] = 0;
        }
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Visit every logical multi-index of `shape` in row-major order.
pub(crate) fn for_each_index(shape: &[usize], mut f: impl FnMut(&[usize])) {
    let len: usize = shape.iter().product();
    if len == 0 {
        return;
    }
    let mut index = vec![0usize; shape.len()];
    for _ in 0..len {
        f(&index);
        for axis in (0..shape.len()).rev() {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}
