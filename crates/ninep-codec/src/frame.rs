// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Read and write size-prefixed 9P2000 frames on blocking byte streams.
// Author: Lukas Bower

use std::io::{self, ErrorKind, Read, Write};

use crate::types::CodecError;

/// Read one complete frame from `reader`.
///
/// Returns `Ok(None)` on a clean end of stream before any byte of a new
/// frame. A declared size below the seven-byte header or above `max` is an
/// `InvalidData` error carrying the underlying [`CodecError`].
pub fn read_frame<R: Read>(reader: &mut R, max: u32) -> io::Result<Option<Vec<u8>>> {
    let mut size = [0u8; 4];
    let mut filled = 0;
    while filled < size.len() {
        match reader.read(&mut size[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    let declared = u32::from_le_bytes(size);
    if declared < 7 {
        return Err(io::Error::new(ErrorKind::InvalidData, CodecError::Truncated));
    }
    if declared > max {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            CodecError::FrameTooLarge { declared, max },
        ));
    }
    let mut frame = vec![0u8; declared as usize];
    frame[..4].copy_from_slice(&size);
    reader.read_exact(&mut frame[4..])?;
    Ok(Some(frame))
}

/// Write one encoded frame to `writer` and flush it.
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> io::Result<()> {
    writer.write_all(frame)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn clean_eof_yields_none() {
        let mut input = Cursor::new(Vec::new());
        assert!(read_frame(&mut input, 8192).expect("read").is_none());
    }

    #[test]
    fn partial_header_is_unexpected_eof() {
        let mut input = Cursor::new(vec![9, 0]);
        let err = read_frame(&mut input, 8192).expect_err("short header");
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversize_frame_rejected() {
        let mut input = Cursor::new(9000u32.to_le_bytes().to_vec());
        let err = read_frame(&mut input, 8192).expect_err("oversize");
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn frames_are_split_on_declared_size() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&[120, 1, 0]);
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&[120, 2, 0]);
        let mut input = Cursor::new(bytes);
        let first = read_frame(&mut input, 64).expect("read").expect("frame");
        let second = read_frame(&mut input, 64).expect("read").expect("frame");
        assert_eq!(first[5], 1);
        assert_eq!(second[5], 2);
        assert!(read_frame(&mut input, 64).expect("read").is_none());
    }
}
