//! Reading frames off a byte stream.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::errors::FrameError;
use crate::frame::{Frame, FrameHeader, HEADER_LEN};

/// Read the next frame from `reader`.
///
/// Reads exactly `HEADER_LEN` bytes, then exactly the content length the
/// header announces. Returns `Ok(None)` when the stream ends cleanly on a
/// frame boundary. A stream that ends inside a header yields
/// `FrameTooShort`; content longer than `max_content` is refused before
/// anything is allocated for it.
///
/// An `IntegrityMismatch` leaves the stream positioned on the next frame.
pub async fn read_frame<R>(reader: &mut R, max_content: usize) -> Result<Option<Frame>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::FrameTooShort { len: filled });
        }
        filled += n;
    }

    let header = FrameHeader::parse(&header)?;
    if header.content_len() > max_content {
        return Err(FrameError::ContentTooLarge {
            size: header.content_len(),
            max: max_content,
        });
    }

    let mut content = vec![0u8; header.content_len()];
    reader.read_exact(&mut content).await?;

    Frame::from_parts(header, content).map(Some)
}
