//! Length-prefixed frame parsing.
//!
//! A firmware image is a plain concatenation of frames, each sent to the
//! bootloader as one SPI write:
//!
//! ```text
//! +----------+----------+------------------------+
//! | Len (hi) | Len (lo) |   Payload (Len bytes)  |
//! +----------+----------+------------------------+
//! ```
//!
//! The on-wire size of a frame is `Len + 2` and must not exceed
//! [`MAX_FRAME_SIZE`].

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::error::{Error, Result};
use crate::protocol::{FRAME_HEADER_SIZE, MAX_FRAME_SIZE};

/// On-wire size of a frame whose header bytes are `hi`, `lo`.
///
/// Computed in `usize`, so a declared length of `0xFFFF` yields 65537
/// rather than wrapping.
#[must_use]
pub fn declared_frame_size(hi: u8, lo: u8) -> usize {
    usize::from(BigEndian::read_u16(&[hi, lo])) + FRAME_HEADER_SIZE
}

/// Bounded buffer that assembles one frame at a time.
///
/// The declared size is checked the moment the second header byte arrives,
/// before any payload byte is accepted, so the write position can never
/// run past the backing storage.
#[derive(Clone)]
pub struct FrameBuffer {
    buf: [u8; MAX_FRAME_SIZE],
    pos: usize,
    frame_size: Option<usize>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: [0u8; MAX_FRAME_SIZE],
            pos: 0,
            frame_size: None,
        }
    }

    /// Accept one byte of the image.
    ///
    /// Returns `Ok(true)` once the current frame is complete; the frame is
    /// then available from [`frame`](Self::frame) until the next push or
    /// [`clear`](Self::clear). Pushing onto a complete frame starts a new one.
    /// An oversized header empties the buffer before the error is returned.
    pub fn push(&mut self, byte: u8) -> Result<bool> {
        if self.is_complete() {
            self.clear();
        }

        let Some(slot) = self.buf.get_mut(self.pos) else {
            let size = self.pos + 1;
            self.clear();
            return Err(Error::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        };
        *slot = byte;
        self.pos += 1;

        if self.pos == FRAME_HEADER_SIZE {
            let size = declared_frame_size(self.buf[0], self.buf[1]);
            if size > MAX_FRAME_SIZE {
                // Rejected header is dropped; the next byte starts a new frame.
                self.clear();
                return Err(Error::FrameTooLarge {
                    size,
                    max: MAX_FRAME_SIZE,
                });
            }
            self.frame_size = Some(size);
        }

        Ok(self.is_complete())
    }

    /// Whether the buffered bytes form a whole frame.
    pub fn is_complete(&self) -> bool {
        self.frame_size == Some(self.pos)
    }

    /// Bytes buffered for the current frame.
    pub fn frame(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Number of bytes buffered.
    pub fn len(&self) -> usize {
        self.pos
    }

    /// Whether nothing has been buffered for the current frame.
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Discard the buffered frame.
    pub fn clear(&mut self) {
        self.pos = 0;
        self.frame_size = None;
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.pos)
            .field("frame_size", &self.frame_size)
            .finish()
    }
}

/// Location of one frame inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameInfo {
    /// Byte offset of the length header.
    pub offset: usize,
    /// On-wire size, header included.
    pub size: usize,
}

impl FrameInfo {
    /// Payload length declared in the header.
    pub fn payload_len(&self) -> usize {
        self.size - FRAME_HEADER_SIZE
    }
}

/// Frame layout of a firmware image, computed without touching hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageLayout {
    /// Total image size in bytes.
    pub file_size: usize,
    /// Complete frames in image order.
    pub frames: Vec<FrameInfo>,
    /// Bytes of a trailing frame that ends early.
    pub trailing: usize,
}

impl ImageLayout {
    /// Scan an image file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Scanning firmware image {}", path.display());

        let file = File::open(path).map_err(|e| Error::FileOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::scan(BufReader::new(file))
    }

    /// Scan an image from any byte source.
    pub fn scan<R: Read>(reader: R) -> Result<Self> {
        let mut buffer = FrameBuffer::new();
        let mut frames = Vec::new();
        let mut offset = 0;

        for byte in reader.bytes() {
            if let Err(e) = buffer.push(byte?) {
                debug!("Oversized frame header at offset {offset}");
                return Err(e);
            }
            if buffer.is_complete() {
                frames.push(FrameInfo {
                    offset,
                    size: buffer.len(),
                });
                offset += buffer.len();
                buffer.clear();
            }
        }

        let trailing = buffer.len();
        Ok(Self {
            file_size: offset + trailing,
            frames,
            trailing,
        })
    }

    /// Number of complete frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Bytes covered by complete frames.
    pub fn framed_bytes(&self) -> usize {
        self.frames.iter().map(|f| f.size).sum()
    }

    /// Largest on-wire frame, if any.
    pub fn largest_frame(&self) -> Option<usize> {
        self.frames.iter().map(|f| f.size).max()
    }

    /// Whether every byte of the image belongs to a complete frame.
    pub fn is_frame_aligned(&self) -> bool {
        self.trailing == 0
    }

    /// Fail the way an upload of this image would fail at end of file.
    pub fn validate(&self) -> Result<()> {
        if self.is_frame_aligned() {
            Ok(())
        } else {
            Err(Error::IncompleteTransfer {
                transmitted: self.framed_bytes(),
                file_size: self.file_size,
            })
        }
    }
}
