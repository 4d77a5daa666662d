// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Host-side rendering of exported tensors.
//!
//! Produces NumPy-style nested brackets, right-aligned columns and a dtype
//! suffix:
//!
//! ```text
//! tensor([[1, 2, 3],
//!         [4, 5, 6]], dtype=INT32)
//! ```
//!
//! Tensors with more than [`SUMMARY_THRESHOLD`] elements show only the first and
//! last [`EDGE_ITEMS`] entries of each axis.

use std::fmt::{Debug, Write};

use half::{bf16, f16};

use crate::buffer::OwnedBuffer;
use crate::dtype::{HostElement, TypeDescriptor};
use crate::error::Result;

/// Element count above which output is summarized.
pub const SUMMARY_THRESHOLD: usize = 1000;

/// Entries kept at each end of a summarized axis.
pub const EDGE_ITEMS: usize = 3;

const PREFIX: &str = "tensor(";

/// Render `buffer` as text.
///
/// # Errors
///
/// Returns [`UnsupportedType`](crate::BridgeError::UnsupportedType) if the
/// buffer's type has no Rust element type. `BOOL` is rendered from raw bytes.
pub fn format_buffer(buffer: &OwnedBuffer) -> Result<String> {
    let cells = cells(buffer)?;
    let dims = buffer.shape().dims();
    let summarize = cells.len() > SUMMARY_THRESHOLD;

    let mut out = String::from(PREFIX);
    if dims.is_empty() {
        out.push_str(cells.first().map_or("", String::as_str));
    } else {
        let mut layout = Layout {
            cells: &cells,
            dims,
            width: 0,
            summarize,
        };
        layout.width = layout.visible_width(0, 0);
        layout.render(&mut out, 0, 0);
    }
    // Writing to a String cannot fail.
    let _ = write!(out, ", dtype={})", buffer.dtype());
    Ok(out)
}

struct Layout<'a> {
    cells: &'a [String],
    dims: &'a [usize],
    width: usize,
    summarize: bool,
}

impl Layout<'_> {
    /// Positions printed along an axis; `None` marks the elision.
    fn positions(&self, extent: usize) -> Vec<Option<usize>> {
        if self.summarize && extent > 2 * EDGE_ITEMS {
            (0..EDGE_ITEMS)
                .map(Some)
                .chain(std::iter::once(None))
                .chain((extent - EDGE_ITEMS..extent).map(Some))
                .collect()
        } else {
            (0..extent).map(Some).collect()
        }
    }

    /// Widest cell that will actually be printed.
    fn visible_width(&self, depth: usize, offset: usize) -> usize {
        let stride: usize = self.dims[depth + 1..].iter().product();
        let innermost = depth + 1 == self.dims.len();
        self.positions(self.dims[depth])
            .into_iter()
            .flatten()
            .map(|i| {
                if innermost {
                    self.cells.get(offset + i).map_or(0, String::len)
                } else {
                    self.visible_width(depth + 1, offset + i * stride)
                }
            })
            .max()
            .unwrap_or(0)
    }

    fn render(&self, out: &mut String, depth: usize, offset: usize) {
        let rank = self.dims.len();
        let extent = self.dims[depth];
        let stride: usize = self.dims[depth + 1..].iter().product();
        let innermost = depth + 1 == rank;

        let separator = if innermost {
            ", ".to_string()
        } else {
            format!(
                ",{}{}",
                "\n".repeat(rank - depth - 1),
                " ".repeat(PREFIX.len() + depth + 1)
            )
        };

        let positions = self.positions(extent);

        out.push('[');
        for (k, position) in positions.into_iter().enumerate() {
            if k > 0 {
                out.push_str(&separator);
            }
            match position {
                None => out.push_str("..."),
                Some(i) if innermost => {
                    let cell = self.cells.get(offset + i).map_or("", String::as_str);
                    let _ = write!(out, "{cell:>width$}", width = self.width);
                }
                Some(i) => self.render(out, depth + 1, offset + i * stride),
            }
        }
        out.push(']');
    }
}

fn debug_cells<T: HostElement + Debug>(buffer: &OwnedBuffer) -> Result<Vec<String>> {
    Ok(buffer
        .to_vec::<T>()?
        .iter()
        .map(|v| format!("{v:?}"))
        .collect())
}

fn cells(buffer: &OwnedBuffer) -> Result<Vec<String>> {
    match buffer.dtype() {
        TypeDescriptor::Bool => Ok(buffer
            .as_bytes()
            .iter()
            .map(|&b| if b == 0 { "False" } else { "True" }.to_string())
            .collect()),
        TypeDescriptor::Int8 => debug_cells::<i8>(buffer),
        TypeDescriptor::Int16 => debug_cells::<i16>(buffer),
        TypeDescriptor::Int32 => debug_cells::<i32>(buffer),
        TypeDescriptor::Int64 => debug_cells::<i64>(buffer),
        TypeDescriptor::UInt8 => debug_cells::<u8>(buffer),
        TypeDescriptor::UInt16 => debug_cells::<u16>(buffer),
        TypeDescriptor::UInt32 => debug_cells::<u32>(buffer),
        TypeDescriptor::UInt64 => debug_cells::<u64>(buffer),
        TypeDescriptor::Float16 => debug_cells::<f16>(buffer),
        TypeDescriptor::BFloat16 => debug_cells::<bf16>(buffer),
        TypeDescriptor::Float32 => debug_cells::<f32>(buffer),
        TypeDescriptor::Float64 => debug_cells::<f64>(buffer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeDescriptor;

    fn buffer<T: HostElement>(data: &[T], dims: &[usize]) -> OwnedBuffer {
        OwnedBuffer::new(
            bytemuck::cast_slice(data).to_vec(),
            ShapeDescriptor::from(dims),
            T::TYPE,
        )
        .unwrap()
    }

    #[test]
    fn test_matrix() {
        let text = format_buffer(&buffer(&[1i32, 2, 3, 4, 5, 6], &[2, 3])).unwrap();
        assert_eq!(text, "tensor([[1, 2, 3],\n        [4, 5, 6]], dtype=INT32)");
    }

    #[test]
    fn test_scalar_and_vector() {
        assert_eq!(
            format_buffer(&buffer(&[2.5f64], &[])).unwrap(),
            "tensor(2.5, dtype=FLOAT64)"
        );
        assert_eq!(
            format_buffer(&buffer(&[1u8, 20, 3], &[3])).unwrap(),
            "tensor([ 1, 20,  3], dtype=UINT8)"
        );
    }

    #[test]
    fn test_rank3_blank_lines() {
        let data: Vec<i64> = (0..8).collect();
        let text = format_buffer(&buffer(&data, &[2, 2, 2])).unwrap();
        assert_eq!(
            text,
            "tensor([[[0, 1],\n         [2, 3]],\n\n        [[4, 5],\n         [6, 7]]], dtype=INT64)"
        );
    }

    #[test]
    fn test_empty() {
        let text = format_buffer(&buffer::<f32>(&[], &[0])).unwrap();
        assert_eq!(text, "tensor([], dtype=FLOAT32)");
    }

    #[test]
    fn test_summarized() {
        let data: Vec<i32> = (0..2000).collect();
        let text = format_buffer(&buffer(&data, &[2000])).unwrap();
        assert!(text.starts_with("tensor([   0,    1,    2, ..., 1997, 1998, 1999]"));
    }

    #[test]
    fn test_hidden_cells_do_not_widen_columns() {
        let mut data = vec![0i32; 2000];
        data[1000] = 123_456_789;
        let text = format_buffer(&buffer(&data, &[2000])).unwrap();
        assert_eq!(text, "tensor([0, 0, 0, ..., 0, 0, 0], dtype=INT32)");

        let mut grid = vec![7i64; 40 * 40];
        grid[20 * 40 + 20] = -1_000_000;
        let text = format_buffer(&buffer(&grid, &[40, 40])).unwrap();
        assert!(!text.contains("-1000000"));
        assert!(text.starts_with("tensor([[7, 7, 7, ..., 7, 7, 7],"));
    }
}
