// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode 9P2000 stat entries and directory read payloads.
// Author: Lukas Bower

//! Stat entry encoding shared by `Rstat`, `Twstat` and directory reads.

use crate::codec::{put_qid, put_string, Cursor};
use crate::types::{CodecError, Stat};

/// Append the wire form of `stat` (with its two-byte size prefix) to `out`.
pub fn encode_stat(stat: &Stat, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let total = stat.encoded_len();
    let size: u16 = (total - 2)
        .try_into()
        .map_err(|_| CodecError::FieldTooLong(total))?;
    out.reserve(total);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&stat.ty.to_le_bytes());
    out.extend_from_slice(&stat.dev.to_le_bytes());
    put_qid(out, &stat.qid);
    out.extend_from_slice(&stat.mode.to_le_bytes());
    out.extend_from_slice(&stat.atime.to_le_bytes());
    out.extend_from_slice(&stat.mtime.to_le_bytes());
    out.extend_from_slice(&stat.length.to_le_bytes());
    put_string(out, &stat.name)?;
    put_string(out, &stat.uid)?;
    put_string(out, &stat.gid)?;
    put_string(out, &stat.muid)?;
    Ok(())
}

/// Decode one stat entry from the front of `bytes`.
///
/// Returns the entry and the number of bytes it occupied. The declared size
/// must match the fields exactly.
pub fn decode_stat(bytes: &[u8]) -> Result<(Stat, usize), CodecError> {
    let mut cursor = Cursor::new(bytes);
    let size = cursor.read_u16()? as usize;
    let body = cursor.take(size)?;
    let mut fields = Cursor::new(body);
    let ty = fields.read_u16()?;
    let dev = fields.read_u32()?;
    let qid = fields.read_qid()?;
    let mode = fields.read_u32()?;
    let atime = fields.read_u32()?;
    let mtime = fields.read_u32()?;
    let length = fields.read_u64()?;
    let name = fields.read_string()?;
    let uid = fields.read_string()?;
    let gid = fields.read_string()?;
    let muid = fields.read_string()?;
    if fields.position() != body.len() {
        return Err(CodecError::TrailingBytes(body.len() - fields.position()));
    }
    let stat = Stat {
        ty,
        dev,
        qid,
        mode,
        atime,
        mtime,
        length,
        name,
        uid,
        gid,
        muid,
    };
    Ok((stat, cursor.position()))
}

/// Iterator over the stat entries packed into a directory `Rread` payload.
#[derive(Debug, Clone)]
pub struct DirEntries<'a> {
    buf: &'a [u8],
}

impl<'a> DirEntries<'a> {
    /// Iterate the entries of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
}

impl Iterator for DirEntries<'_> {
    type Item = Result<Stat, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        match decode_stat(self.buf) {
            Ok((stat, used)) => {
                self.buf = &self.buf[used..];
                Some(Ok(stat))
            }
            Err(err) => {
                self.buf = &[];
                Some(Err(err))
            }
        }
    }
}
