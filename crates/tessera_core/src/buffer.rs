//! Raw binary blobs and typed windows into them.
//!
//! The transport layer owns file and network I/O. It hands the core a
//! [`Blobs`] value holding one byte vector per document buffer, plus the
//! bytes of any external resources (images) keyed by their URI. Everything
//! here only slices those bytes.

use std::collections::HashMap;

use thiserror::Error;

use crate::document::Document;
use crate::layout::{read_component_f32, read_component_u32, ElementLayout};

/// Errors that can occur while reading buffer data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("Buffer {0} was not supplied")]
    MissingBuffer(usize),

    #[error("Buffer view {0} does not exist")]
    MissingBufferView(usize),

    #[error("Resource '{0}' was not supplied")]
    MissingResource(String),

    #[error("Range {start}..{end} is outside {what} of {len} bytes")]
    OutOfBounds {
        what: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Byte stride {stride} is smaller than element size {element_size}")]
    InvalidStride { stride: usize, element_size: usize },

    #[error("Component type {0:?} cannot be read as an index")]
    NotAnIndexType(crate::registry::ComponentType),

    #[error("Primitive has no {0} attribute")]
    MissingAttribute(&'static str),

    #[error("{0} vertices exceed the 32-bit index range")]
    TooManyVertices(usize),

    #[error("Accessor count {0} is too large to read")]
    CountOverflow(usize),
}

/// Result type for buffer reads.
pub type ReadResult<T> = Result<T, ReadError>;

/// Binary payloads supplied alongside a [`Document`].
#[derive(Clone, Debug, Default)]
pub struct Blobs {
    buffers: Vec<Vec<u8>>,
    resources: HashMap<String, Vec<u8>>,
}

impl Blobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the bytes of the next document buffer.
    pub fn with_buffer(mut self, bytes: Vec<u8>) -> Self {
        self.buffers.push(bytes);
        self
    }

    /// Append the bytes of the next document buffer and return its index.
    pub fn push_buffer(&mut self, bytes: Vec<u8>) -> usize {
        self.buffers.push(bytes);
        self.buffers.len() - 1
    }

    /// Register the bytes behind an external URI.
    pub fn insert_resource(&mut self, uri: impl Into<String>, bytes: Vec<u8>) {
        self.resources.insert(uri.into(), bytes);
    }

    pub fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index).map(Vec::as_slice)
    }

    pub fn resource(&self, uri: &str) -> Option<&[u8]> {
        self.resources.get(uri).map(Vec::as_slice)
    }

    /// The bytes covered by a buffer view.
    pub fn view_bytes(&self, document: &Document, view: usize) -> ReadResult<&[u8]> {
        let buffer_view = document
            .buffer_views
            .get(view)
            .ok_or(ReadError::MissingBufferView(view))?;
        let buffer = self
            .buffer(buffer_view.buffer)
            .ok_or(ReadError::MissingBuffer(buffer_view.buffer))?;

        let start = buffer_view.byte_offset;
        let end = start.saturating_add(buffer_view.byte_length);
        buffer.get(start..end).ok_or(ReadError::OutOfBounds {
            what: "buffer",
            start,
            end,
            len: buffer.len(),
        })
    }
}

/// An (offset, stride, count) window into one buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferWindow {
    pub buffer: usize,
    /// Offset of the first element from the start of the buffer
    pub offset: usize,
    pub stride: usize,
    pub count: usize,
    pub element_size: usize,
}

impl BufferWindow {
    /// Bytes from the first element's start to the last element's end.
    /// `None` when the size does not fit in `usize`.
    pub fn span(&self) -> Option<usize> {
        match self.count {
            0 => Some(0),
            count => self.stride.checked_mul(count - 1)?.checked_add(self.element_size),
        }
    }

    /// Buffer offset one past the last element.
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.span()?)
    }

    /// Iterate over the bytes of each element.
    pub fn elements<'a>(&self, blobs: &'a Blobs) -> ReadResult<impl Iterator<Item = &'a [u8]> + 'a> {
        let buffer = blobs
            .buffer(self.buffer)
            .ok_or(ReadError::MissingBuffer(self.buffer))?;

        let end = self.end().unwrap_or(usize::MAX);
        let bytes = buffer.get(self.offset..end).ok_or(ReadError::OutOfBounds {
            what: "buffer",
            start: self.offset,
            end,
            len: buffer.len(),
        })?;

        let (stride, size, count) = (self.stride, self.element_size, self.count);
        Ok((0..count).map(move |i| &bytes[i * stride..i * stride + size]))
    }
}

/// A validated accessor bound to one place of use.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccessorBinding {
    /// Index of the accessor in the document
    pub accessor: usize,
    pub layout: ElementLayout,
    pub count: usize,
    /// Whether components are mapped to the unit range on read
    pub normalize: bool,
    /// `None` when the accessor has no buffer view (all zeros)
    pub window: Option<BufferWindow>,
}

impl AccessorBinding {
    /// Total components across all elements, if a buffer of them can exist.
    fn component_total(&self, width: usize) -> ReadResult<usize> {
        self.count
            .checked_mul(self.layout.component_count())
            .filter(|&total| total.checked_mul(width).is_some_and(|bytes| bytes <= isize::MAX as usize))
            .ok_or(ReadError::CountOverflow(self.count))
    }

    /// Read all components as `f32`, flattened element by element.
    pub fn read_f32(&self, blobs: &Blobs) -> ReadResult<Vec<f32>> {
        let components = self.layout.component_count();
        let total = self.component_total(std::mem::size_of::<f32>())?;
        let Some(window) = self.window else {
            return Ok(vec![0.0; total]);
        };

        let ty = self.layout.component_type;
        let width = ty.byte_width();
        let mut values = Vec::with_capacity(total);
        for element in window.elements(blobs)? {
            for c in 0..components {
                values.push(read_component_f32(ty, &element[c * width..], self.normalize));
            }
        }
        Ok(values)
    }

    /// Read scalar unsigned values (indices, joint indices).
    pub fn read_u32(&self, blobs: &Blobs) -> ReadResult<Vec<u32>> {
        let ty = self.layout.component_type;
        let components = self.layout.component_count();
        let total = self.component_total(std::mem::size_of::<u32>())?;
        let Some(window) = self.window else {
            return Ok(vec![0; total]);
        };

        let width = ty.byte_width();
        let mut values = Vec::with_capacity(total);
        for element in window.elements(blobs)? {
            for c in 0..components {
                let value = read_component_u32(ty, &element[c * width..])
                    .ok_or(ReadError::NotAnIndexType(ty))?;
                values.push(value);
            }
        }
        Ok(values)
    }
}
