// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the hierarchy of error types for the resource layer.

use thiserror::Error;

/// An error raised by a pure format lookup table.
///
/// These indicate a programming mistake (asking for a conversion that does not
/// exist) rather than a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The pixel format has no equivalent in the requested table.
    #[error("unsupported pixel format {format} for {table}")]
    UnsupportedPixelFormat {
        /// Debug name of the pixel format.
        format: String,
        /// The table that was consulted.
        table: &'static str,
    },
    /// The GL format/type pair does not map to any pixel format.
    #[error("unsupported GL format 0x{format:04x} with type 0x{ty:04x}")]
    UnsupportedGlFormat {
        /// The GL pixel format enumerant.
        format: u32,
        /// The GL component type enumerant.
        ty: u32,
    },
    /// The PNG color type / bit depth combination does not map to any pixel format.
    #[error("unsupported PNG color type {color_type} with bit depth {bit_depth}")]
    UnsupportedPngColor {
        /// The PNG color type byte.
        color_type: u8,
        /// The PNG bit depth.
        bit_depth: u8,
    },
}

/// An error related to CPU-side pixel buffers.
#[derive(Debug, Error)]
pub enum PixmapError {
    /// The encoded image could not be decoded.
    #[error("failed to decode image: {0}")]
    Decode(String),
    /// The pixmap could not be encoded.
    #[error("failed to encode image: {0}")]
    Encode(String),
    /// Reading or writing the backing file failed.
    #[error("i/o error on '{path}': {source}")]
    Io {
        /// The file involved.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The operation does not support this pixel format.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Width or height was zero.
    #[error("invalid pixmap dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// A raw pixel buffer did not match `width * height * bytes_per_pixel`.
    #[error("pixel buffer has {actual} bytes, expected {expected}")]
    BufferSize {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },
    /// An indexed pixmap was given an empty or oversized palette.
    #[error("invalid palette of {0} entries (expected 1..=256)")]
    InvalidPalette(usize),
    /// A format table lookup failed.
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// An error related to the compilation, linking or use of a shader program.
#[derive(Debug, Clone, Error)]
pub enum ShaderError {
    /// A shader stage failed to compile.
    #[error("shader compile error ({stage}):\n{log}")]
    Compilation {
        /// The stage that failed ("vertex" or "fragment").
        stage: &'static str,
        /// The driver's info log.
        log: String,
    },
    /// The program failed to link.
    #[error("shader link error:\n{log}")]
    Link {
        /// The driver's info log.
        log: String,
    },
    /// A uniform was required but the program has no such active uniform.
    #[error("no uniform with name '{0}' in shader")]
    UnknownUniform(String),
    /// An attribute was required but the program has no such active attribute.
    #[error("no attribute with name '{0}' in shader")]
    UnknownAttribute(String),
    /// The program is not in a compiled state.
    #[error("shader program is not compiled:\n{log}")]
    NotCompiled {
        /// The last compile/link log.
        log: String,
    },
    /// A flattened matrix did not have 4, 9 or 16 elements.
    #[error("invalid matrix size: {0} elements (expected 4, 9 or 16)")]
    InvalidMatrixSize(usize),
}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The resource was used after `dispose`.
    #[error("{0} has been disposed")]
    Disposed(&'static str),
    /// `reload` was called on a resource without retained CPU-side data.
    #[error("tried to reload an unmanaged {0}")]
    NotManaged(&'static str),
    /// New texture data disagrees with the current data on whether it is managed.
    #[error("new texture data must have the same managed status as the old data")]
    ManagedMismatch,
    /// A range did not fit in the populated extent of a buffer.
    #[error("index out of range: offset {offset} + count {count} exceeds {len}")]
    IndexOutOfRange {
        /// Start of the range.
        offset: usize,
        /// Length of the range.
        count: usize,
        /// Populated length.
        len: usize,
    },
    /// A destination was too small for the requested copy.
    #[error("not enough room: need {needed}, have {available}")]
    InsufficientCapacity {
        /// Elements required.
        needed: usize,
        /// Elements available.
        available: usize,
    },
    /// A generic argument error.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A geometric query ran on a mesh without vertices.
    #[error("mesh has no vertices")]
    NoVertices,
    /// A vertex attribute with the required usage was not present.
    #[error("mesh has no {0} attribute")]
    MissingAttribute(&'static str),
    /// The device reported an error after an operation.
    #[error("GL error 0x{code:04x} after {operation}")]
    Gl {
        /// The operation that was checked.
        operation: &'static str,
        /// The value returned by `get_error`.
        code: u32,
    },
    /// The device returned a zero handle.
    #[error("failed to allocate a {0} handle")]
    HandleAllocation(&'static str),
    /// A pixmap operation failed.
    #[error(transparent)]
    Pixmap(#[from] PixmapError),
    /// A shader operation failed.
    #[error(transparent)]
    Shader(#[from] ShaderError),
    /// A format lookup failed.
    #[error(transparent)]
    Format(#[from] FormatError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_error_carries_log() {
        let err = ShaderError::Compilation {
            stage: "fragment",
            log: "0:3: syntax error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("fragment"), "got: {msg}");
        assert!(msg.contains("syntax error"), "got: {msg}");
    }

    #[test]
    fn test_resource_error_wraps_shader_error_transparently() {
        let err: ResourceError = ShaderError::UnknownUniform("u_time".into()).into();
        assert_eq!(err.to_string(), "no uniform with name 'u_time' in shader");
    }

    #[test]
    fn test_index_out_of_range_message() {
        let err = ResourceError::IndexOutOfRange {
            offset: 4,
            count: 3,
            len: 6,
        };
        let msg = err.to_string();
        assert!(msg.contains('4') && msg.contains('3') && msg.contains('6'), "got: {msg}");
    }

    #[test]
    fn test_gl_error_is_hex() {
        let err = ResourceError::Gl {
            operation: "tex_image_2d",
            code: 0x0501,
        };
        assert_eq!(err.to_string(), "GL error 0x0501 after tex_image_2d");
    }
}
