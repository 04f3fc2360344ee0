// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode fixed-width 9P1 directory records.
// Author: Lukas Bower

use crate::codec::{put_name, Cursor};
use crate::types::{CodecError, Dir, Qid, DIRLEN};

/// Append the [`DIRLEN`]-byte record for `dir` to `out`.
pub fn encode_dir(dir: &Dir, out: &mut Vec<u8>) -> Result<(), CodecError> {
    out.reserve(DIRLEN);
    put_name(out, &dir.name)?;
    put_name(out, &dir.uid)?;
    put_name(out, &dir.gid)?;
    out.extend_from_slice(&dir.qid.path.to_le_bytes());
    out.extend_from_slice(&dir.qid.version.to_le_bytes());
    out.extend_from_slice(&dir.mode.to_le_bytes());
    out.extend_from_slice(&dir.atime.to_le_bytes());
    out.extend_from_slice(&dir.mtime.to_le_bytes());
    out.extend_from_slice(&dir.length.to_le_bytes());
    out.extend_from_slice(&dir.ty.to_le_bytes());
    out.extend_from_slice(&dir.dev.to_le_bytes());
    Ok(())
}

/// Decode the record at the front of `bytes`, which must hold at least
/// [`DIRLEN`] bytes.
pub fn decode_dir(bytes: &[u8]) -> Result<Dir, CodecError> {
    let record = bytes.get(..DIRLEN).ok_or(CodecError::Truncated)?;
    let mut cursor = Cursor::new(record);
    read_dir(&mut cursor)
}

pub(crate) fn read_dir(cursor: &mut Cursor<'_>) -> Result<Dir, CodecError> {
    let name = cursor.read_name()?;
    let uid = cursor.read_name()?;
    let gid = cursor.read_name()?;
    let path = cursor.read_u32()?;
    let version = cursor.read_u32()?;
    Ok(Dir {
        name,
        uid,
        gid,
        qid: Qid::new(path, version),
        mode: cursor.read_u32()?,
        atime: cursor.read_u32()?,
        mtime: cursor.read_u32()?,
        length: cursor.read_u64()?,
        ty: cursor.read_u16()?,
        dev: cursor.read_u16()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CHDIR, NAMELEN};

    #[test]
    fn record_layout_is_fixed() {
        let dir = Dir {
            name: "usr".to_owned(),
            uid: "sys".to_owned(),
            gid: "sys".to_owned(),
            qid: Qid::new(CHDIR | 5, 1),
            mode: CHDIR | 0o775,
            atime: 3,
            mtime: 4,
            length: 0,
            ty: 'M' as u16,
            dev: 2,
        };
        let mut out = Vec::new();
        encode_dir(&dir, &mut out).expect("encode dir");
        assert_eq!(out.len(), DIRLEN);
        assert_eq!(&out[..4], b"usr\0");
        assert_eq!(&out[3 * NAMELEN..3 * NAMELEN + 4], &(CHDIR | 5).to_le_bytes());
        assert_eq!(decode_dir(&out).expect("decode dir"), dir);
    }

    #[test]
    fn names_need_a_terminator() {
        let dir = Dir {
            name: "x".repeat(NAMELEN),
            ..Dir::default()
        };
        let mut out = Vec::new();
        assert_eq!(
            encode_dir(&dir, &mut out),
            Err(CodecError::NameTooLong(NAMELEN))
        );
    }

    #[test]
    fn short_record_is_truncated() {
        assert_eq!(decode_dir(&[0u8; DIRLEN - 1]), Err(CodecError::Truncated));
    }
}
