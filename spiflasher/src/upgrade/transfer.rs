//! Frame-by-frame upload of the application image.
//!
//! Each frame goes out as one write-only transfer. The bootloader then
//! reports two phases for it, `CHECKING_CRC` followed by `CRC_OK`; any other
//! status ends the upload. A misaligned frame stream cannot be
//! resynchronised, so nothing is retried.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::image::FrameBuffer;
use crate::protocol::StatusByte;
use crate::transport::{InputLine, SpiBus};
use crate::upgrade::status::StatusChannel;

/// Streams an image to the bootloader over a status channel.
pub struct FrameTransfer<'c, 'a, S, R> {
    channel: &'c mut StatusChannel<'a, S, R>,
    frames_sent: usize,
}

impl<'c, 'a, S: SpiBus, R: InputLine> FrameTransfer<'c, 'a, S, R> {
    /// Create a transfer over `channel`.
    pub fn new(channel: &'c mut StatusChannel<'a, S, R>) -> Self {
        Self {
            channel,
            frames_sent: 0,
        }
    }

    /// Frames the bootloader has accepted so far.
    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    /// Upload the image at `path`.
    ///
    /// Returns the number of bytes transmitted, which equals the file size
    /// on success. `progress` receives `(transmitted, file_size)` after each
    /// accepted frame.
    pub fn transfer_file<P, F>(&mut self, path: P, progress: F) -> Result<usize>
    where
        P: AsRef<Path>,
        F: FnMut(usize, usize),
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::FileOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file_size = usize::try_from(file.metadata()?.len()).map_err(|_| {
            Error::Config(format!("{} is too large to upload", path.display()))
        })?;

        debug!("Uploading {} ({file_size} bytes)", path.display());
        self.transfer(BufReader::new(file), file_size, progress)
    }

    /// Upload `file_size` bytes read from `reader`.
    pub fn transfer<Rd, F>(
        &mut self,
        reader: Rd,
        file_size: usize,
        mut progress: F,
    ) -> Result<usize>
    where
        Rd: Read,
        F: FnMut(usize, usize),
    {
        let mut buffer = FrameBuffer::new();
        let mut transmitted = 0;

        for byte in reader.bytes() {
            if !buffer.push(byte?)? {
                continue;
            }

            let frame_size = buffer.len();
            self.channel.write(buffer.frame())?;
            transmitted += frame_size;
            trace!("Frame {} sent ({frame_size} bytes)", self.frames_sent + 1);

            self.expect_status(StatusByte::CHECKING_CRC)?;
            self.expect_status(StatusByte::CRC_OK)?;
            self.frames_sent += 1;

            if transmitted < file_size {
                // The bootloader needs one more status read before it takes
                // the next frame.
                let _ = self.channel.read_status()?;
            }

            buffer.clear();
            progress(transmitted, file_size);
        }

        if !buffer.is_empty() {
            debug!(
                "{} bytes of an incomplete trailing frame were not sent",
                buffer.len()
            );
        }

        if transmitted != file_size {
            return Err(Error::IncompleteTransfer {
                transmitted,
                file_size,
            });
        }

        debug!("{} frames, {transmitted} bytes transmitted", self.frames_sent);
        Ok(transmitted)
    }

    fn expect_status(&mut self, expected: StatusByte) -> Result<()> {
        let got = self.channel.read_status()?;
        if got != expected {
            return Err(Error::UnexpectedStatus { expected, got });
        }
        Ok(())
    }
}
