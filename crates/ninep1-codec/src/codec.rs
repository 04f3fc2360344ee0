// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode, decode and delimit 9P1 wire messages.
// Author: Lukas Bower

//! Encode/decode helpers for 9P1 wire messages.

use crate::dir::{encode_dir, read_dir};
use crate::types::*;

const HEADER: usize = 3;
const TWRITE_HEADER: usize = HEADER + 2 + 8 + 2 + 1;
const RREAD_HEADER: usize = HEADER + 2 + 2 + 1;

/// Stateless 9P1 encoder/decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct Codec;

impl Codec {
    /// Encode a request into its wire representation.
    pub fn encode_request(&self, request: &Request) -> Result<Vec<u8>, CodecError> {
        let mut out = header(request.body.message_type(), request.tag);
        match &request.body {
            RequestBody::Flush { oldtag } => out.extend_from_slice(&oldtag.to_le_bytes()),
            RequestBody::Attach {
                fid,
                uname,
                aname,
                ticket,
                auth,
            } => {
                out.extend_from_slice(&fid.to_le_bytes());
                put_name(&mut out, uname)?;
                put_name(&mut out, aname)?;
                out.extend_from_slice(ticket);
                out.extend_from_slice(auth);
            }
            RequestBody::Clone { fid, newfid } => {
                out.extend_from_slice(&fid.to_le_bytes());
                out.extend_from_slice(&newfid.to_le_bytes());
            }
            RequestBody::Walk { fid, name } => {
                out.extend_from_slice(&fid.to_le_bytes());
                put_name(&mut out, name)?;
            }
            RequestBody::Open { fid, mode } => {
                out.extend_from_slice(&fid.to_le_bytes());
                out.push(*mode);
            }
            RequestBody::Create {
                fid,
                name,
                perm,
                mode,
            } => {
                out.extend_from_slice(&fid.to_le_bytes());
                put_name(&mut out, name)?;
                out.extend_from_slice(&perm.to_le_bytes());
                out.push(*mode);
            }
            RequestBody::Read { fid, offset, count } => {
                out.extend_from_slice(&fid.to_le_bytes());
                out.extend_from_slice(&offset.to_le_bytes());
                out.extend_from_slice(&count.to_le_bytes());
            }
            RequestBody::Write { fid, offset, data } => {
                out.extend_from_slice(&fid.to_le_bytes());
                out.extend_from_slice(&offset.to_le_bytes());
                put_data(&mut out, data)?;
            }
            RequestBody::Clunk { fid } | RequestBody::Remove { fid } | RequestBody::Stat { fid } => {
                out.extend_from_slice(&fid.to_le_bytes());
            }
            RequestBody::Wstat { fid, stat } => {
                out.extend_from_slice(&fid.to_le_bytes());
                encode_dir(stat, &mut out)?;
            }
        }
        Ok(out)
    }

    /// Encode a response into its wire representation.
    pub fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError> {
        let mut out = header(response.body.message_type(), response.tag);
        match &response.body {
            ResponseBody::Error { ename } => put_error(&mut out, ename),
            ResponseBody::Flush => {}
            ResponseBody::Attach { fid, qid, rauth } => {
                out.extend_from_slice(&fid.to_le_bytes());
                put_qid(&mut out, qid);
                out.extend_from_slice(rauth);
            }
            ResponseBody::Walk { fid, qid }
            | ResponseBody::Open { fid, qid }
            | ResponseBody::Create { fid, qid } => {
                out.extend_from_slice(&fid.to_le_bytes());
                put_qid(&mut out, qid);
            }
            ResponseBody::Read { fid, data } => {
                out.extend_from_slice(&fid.to_le_bytes());
                put_data(&mut out, data)?;
            }
            ResponseBody::Write { fid, count } => {
                out.extend_from_slice(&fid.to_le_bytes());
                out.extend_from_slice(&count.to_le_bytes());
            }
            ResponseBody::Clone { fid }
            | ResponseBody::Clunk { fid }
            | ResponseBody::Remove { fid }
            | ResponseBody::Wstat { fid } => out.extend_from_slice(&fid.to_le_bytes()),
            ResponseBody::Stat { fid, stat } => {
                out.extend_from_slice(&fid.to_le_bytes());
                encode_dir(stat, &mut out)?;
            }
        }
        Ok(out)
    }

    /// Decode exactly one request from `bytes`.
    pub fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        let (ty, mut cursor) = open_message(bytes)?;
        let tag = cursor.read_u16()?;
        let body = match ty {
            MessageType::Tflush => RequestBody::Flush {
                oldtag: cursor.read_u16()?,
            },
            MessageType::Tattach => {
                let fid = cursor.read_u16()?;
                let uname = cursor.read_name()?;
                let aname = cursor.read_name()?;
                let mut ticket = [0u8; TICKETLEN];
                ticket.copy_from_slice(cursor.take(TICKETLEN)?);
                let mut auth = [0u8; AUTHENTLEN];
                auth.copy_from_slice(cursor.take(AUTHENTLEN)?);
                RequestBody::Attach {
                    fid,
                    uname,
                    aname,
                    ticket,
                    auth,
                }
            }
            MessageType::Tclone => RequestBody::Clone {
                fid: cursor.read_u16()?,
                newfid: cursor.read_u16()?,
            },
            MessageType::Twalk => RequestBody::Walk {
                fid: cursor.read_u16()?,
                name: cursor.read_name()?,
            },
            MessageType::Topen => RequestBody::Open {
                fid: cursor.read_u16()?,
                mode: cursor.read_u8()?,
            },
            MessageType::Tcreate => RequestBody::Create {
                fid: cursor.read_u16()?,
                name: cursor.read_name()?,
                perm: cursor.read_u32()?,
                mode: cursor.read_u8()?,
            },
            MessageType::Tread => RequestBody::Read {
                fid: cursor.read_u16()?,
                offset: cursor.read_u64()?,
                count: cursor.read_u16()?,
            },
            MessageType::Twrite => {
                let fid = cursor.read_u16()?;
                let offset = cursor.read_u64()?;
                let data = cursor.read_data()?;
                RequestBody::Write { fid, offset, data }
            }
            MessageType::Tclunk => RequestBody::Clunk {
                fid: cursor.read_u16()?,
            },
            MessageType::Tremove => RequestBody::Remove {
                fid: cursor.read_u16()?,
            },
            MessageType::Tstat => RequestBody::Stat {
                fid: cursor.read_u16()?,
            },
            MessageType::Twstat => {
                let fid = cursor.read_u16()?;
                let stat = read_dir(&mut cursor)?;
                RequestBody::Wstat { fid, stat }
            }
            other => return Err(CodecError::Unsupported(other as u8)),
        };
        Ok(Request { tag, body })
    }

    /// Decode exactly one response from `bytes`.
    pub fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError> {
        let (ty, mut cursor) = open_message(bytes)?;
        let tag = cursor.read_u16()?;
        let body = match ty {
            MessageType::Rerror => ResponseBody::Error {
                ename: cursor.read_fixed(ERRLEN)?,
            },
            MessageType::Rflush => ResponseBody::Flush,
            MessageType::Rattach => {
                let fid = cursor.read_u16()?;
                let qid = cursor.read_qid()?;
                let mut rauth = [0u8; AUTHENTLEN];
                rauth.copy_from_slice(cursor.take(AUTHENTLEN)?);
                ResponseBody::Attach { fid, qid, rauth }
            }
            MessageType::Rclone => ResponseBody::Clone {
                fid: cursor.read_u16()?,
            },
            MessageType::Rwalk => ResponseBody::Walk {
                fid: cursor.read_u16()?,
                qid: cursor.read_qid()?,
            },
            MessageType::Ropen => ResponseBody::Open {
                fid: cursor.read_u16()?,
                qid: cursor.read_qid()?,
            },
            MessageType::Rcreate => ResponseBody::Create {
                fid: cursor.read_u16()?,
                qid: cursor.read_qid()?,
            },
            MessageType::Rread => {
                let fid = cursor.read_u16()?;
                let data = cursor.read_data()?;
                ResponseBody::Read { fid, data }
            }
            MessageType::Rwrite => ResponseBody::Write {
                fid: cursor.read_u16()?,
                count: cursor.read_u16()?,
            },
            MessageType::Rclunk => ResponseBody::Clunk {
                fid: cursor.read_u16()?,
            },
            MessageType::Rremove => ResponseBody::Remove {
                fid: cursor.read_u16()?,
            },
            MessageType::Rstat => {
                let fid = cursor.read_u16()?;
                let stat = read_dir(&mut cursor)?;
                ResponseBody::Stat { fid, stat }
            }
            MessageType::Rwstat => ResponseBody::Wstat {
                fid: cursor.read_u16()?,
            },
            other => return Err(CodecError::Unsupported(other as u8)),
        };
        Ok(Response { tag, body })
    }
}

/// Encode a request using the default codec.
pub fn encode_request(req: &Request) -> Result<Vec<u8>, CodecError> {
    Codec.encode_request(req)
}

/// Encode a response using the default codec.
pub fn encode_response(res: &Response) -> Result<Vec<u8>, CodecError> {
    Codec.encode_response(res)
}

/// Decode a request using the default codec.
pub fn decode_request(bytes: &[u8]) -> Result<Request, CodecError> {
    Codec.decode_request(bytes)
}

/// Decode a response using the default codec.
pub fn decode_response(bytes: &[u8]) -> Result<Response, CodecError> {
    Codec.decode_response(bytes)
}

/// Length of the message at the front of `buf`.
///
/// Returns `Ok(None)` while `buf` is too short to tell, and an error when the
/// type byte is unknown or a declared data count exceeds [`MAXFDATA`].
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, CodecError> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let len = match MessageType::try_from(first)? {
        MessageType::Twrite => match counted(buf, TWRITE_HEADER - 3)? {
            Some(count) => TWRITE_HEADER + count,
            None => return Ok(None),
        },
        MessageType::Rread => match counted(buf, RREAD_HEADER - 3)? {
            Some(count) => RREAD_HEADER + count,
            None => return Ok(None),
        },
        ty => fixed_len(ty),
    };
    Ok((buf.len() >= len).then_some(len))
}

fn counted(buf: &[u8], at: usize) -> Result<Option<usize>, CodecError> {
    let Some(raw) = buf.get(at..at + 2) else {
        return Ok(None);
    };
    let count = u16::from_le_bytes([raw[0], raw[1]]) as usize;
    if count > MAXFDATA {
        return Err(CodecError::DataTooLarge(count));
    }
    Ok(Some(count))
}

fn fixed_len(ty: MessageType) -> usize {
    use MessageType::*;
    HEADER
        + match ty {
            Rerror => ERRLEN,
            Tflush => 2,
            Rflush => 0,
            Tattach => 2 + 2 * NAMELEN + TICKETLEN + AUTHENTLEN,
            Rattach => 2 + Qid::SIZE + AUTHENTLEN,
            Tclone => 4,
            Twalk => 2 + NAMELEN,
            Rwalk | Ropen | Rcreate => 2 + Qid::SIZE,
            Topen => 3,
            Tcreate => 2 + NAMELEN + 4 + 1,
            Tread => 2 + 8 + 2,
            Rwrite => 4,
            Tclunk | Rclunk | Tremove | Rremove | Tstat | Rwstat | Rclone => 2,
            Rstat | Twstat => 2 + DIRLEN,
            // Variable-length layouts are measured by `frame_len`.
            Twrite => TWRITE_HEADER - HEADER,
            Rread => RREAD_HEADER - HEADER,
        }
}

fn header(ty: MessageType, tag: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(fixed_len(ty));
    out.push(ty as u8);
    out.extend_from_slice(&tag.to_le_bytes());
    out
}

fn open_message(bytes: &[u8]) -> Result<(MessageType, Cursor<'_>), CodecError> {
    let expected = frame_len(bytes)?.ok_or(CodecError::Truncated)?;
    if expected != bytes.len() {
        return Err(CodecError::LengthMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    let ty = MessageType::try_from(bytes[0])?;
    Ok((ty, Cursor::new(&bytes[1..])))
}

fn put_qid(out: &mut Vec<u8>, qid: &Qid) {
    out.extend_from_slice(&qid.path.to_le_bytes());
    out.extend_from_slice(&qid.version.to_le_bytes());
}

/// Write `name` as a NUL-padded [`NAMELEN`] record.
pub(crate) fn put_name(out: &mut Vec<u8>, name: &str) -> Result<(), CodecError> {
    if name.len() >= NAMELEN {
        return Err(CodecError::NameTooLong(name.len()));
    }
    let start = out.len();
    out.extend_from_slice(name.as_bytes());
    out.resize(start + NAMELEN, 0);
    Ok(())
}

// Error text longer than the record is cut at a character boundary.
fn put_error(out: &mut Vec<u8>, ename: &str) {
    let mut end = ename.len().min(ERRLEN - 1);
    while !ename.is_char_boundary(end) {
        end -= 1;
    }
    let start = out.len();
    out.extend_from_slice(&ename.as_bytes()[..end]);
    out.resize(start + ERRLEN, 0);
}

fn put_data(out: &mut Vec<u8>, data: &[u8]) -> Result<(), CodecError> {
    if data.len() > MAXFDATA {
        return Err(CodecError::DataTooLarge(data.len()));
    }
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.push(0);
    out.extend_from_slice(data);
    Ok(())
}

pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, CodecError> {
        let raw = self.take(2)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, CodecError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, CodecError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub(crate) fn read_name(&mut self) -> Result<String, CodecError> {
        self.read_fixed(NAMELEN)
    }

    /// Read a NUL-padded text record; bytes that are not UTF-8 are replaced.
    pub(crate) fn read_fixed(&mut self, width: usize) -> Result<String, CodecError> {
        let raw = self.take(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    fn read_qid(&mut self) -> Result<Qid, CodecError> {
        let path = self.read_u32()?;
        let version = self.read_u32()?;
        Ok(Qid::new(path, version))
    }

    fn read_data(&mut self) -> Result<Vec<u8>, CodecError> {
        let count = self.read_u16()? as usize;
        self.take(1)?;
        Ok(self.take(count)?.to_vec())
    }
}
