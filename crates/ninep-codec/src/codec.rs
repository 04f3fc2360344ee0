// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode 9P2000 wire messages.
// Author: Lukas Bower

//! Encode/decode helpers for 9P2000 wire messages.

use std::str;

use crate::stat::{decode_stat, encode_stat};
use crate::types::*;

/// 9P2000 message opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageType {
    Tversion = 100,
    Rversion = 101,
    Tauth = 102,
    Rauth = 103,
    Tattach = 104,
    Rattach = 105,
    Rerror = 107,
    Tflush = 108,
    Rflush = 109,
    Twalk = 110,
    Rwalk = 111,
    Topen = 112,
    Ropen = 113,
    Tcreate = 114,
    Rcreate = 115,
    Tread = 116,
    Rread = 117,
    Twrite = 118,
    Rwrite = 119,
    Tclunk = 120,
    Rclunk = 121,
    Tremove = 122,
    Rremove = 123,
    Tstat = 124,
    Rstat = 125,
    Twstat = 126,
    Rwstat = 127,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MessageType::*;
        Ok(match value {
            100 => Tversion,
            101 => Rversion,
            102 => Tauth,
            103 => Rauth,
            104 => Tattach,
            105 => Rattach,
            107 => Rerror,
            108 => Tflush,
            109 => Rflush,
            110 => Twalk,
            111 => Rwalk,
            112 => Topen,
            113 => Ropen,
            114 => Tcreate,
            115 => Rcreate,
            116 => Tread,
            117 => Rread,
            118 => Twrite,
            119 => Rwrite,
            120 => Tclunk,
            121 => Rclunk,
            122 => Tremove,
            123 => Rremove,
            124 => Tstat,
            125 => Rstat,
            126 => Twstat,
            127 => Rwstat,
            other => return Err(CodecError::Unsupported(other)),
        })
    }
}

/// Stateless 9P2000 encoder/decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct Codec;

impl Codec {
    /// Encode a request into its wire representation.
    pub fn encode_request(&self, request: &Request) -> Result<Vec<u8>, CodecError> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&request.tag.to_le_bytes());
        let ty = match &request.body {
            RequestBody::Version { msize, version } => {
                payload.extend_from_slice(&msize.to_le_bytes());
                put_string(&mut payload, version)?;
                MessageType::Tversion
            }
            RequestBody::Auth { afid, uname, aname } => {
                payload.extend_from_slice(&afid.to_le_bytes());
                put_string(&mut payload, uname)?;
                put_string(&mut payload, aname)?;
                MessageType::Tauth
            }
            RequestBody::Flush { oldtag } => {
                payload.extend_from_slice(&oldtag.to_le_bytes());
                MessageType::Tflush
            }
            RequestBody::Attach {
                fid,
                afid,
                uname,
                aname,
            } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                payload.extend_from_slice(&afid.to_le_bytes());
                put_string(&mut payload, uname)?;
                put_string(&mut payload, aname)?;
                MessageType::Tattach
            }
            RequestBody::Walk {
                fid,
                newfid,
                wnames,
            } => {
                if wnames.len() > MAX_WELEM {
                    return Err(CodecError::TooManyElements(wnames.len()));
                }
                payload.extend_from_slice(&fid.to_le_bytes());
                payload.extend_from_slice(&newfid.to_le_bytes());
                payload.extend_from_slice(&(wnames.len() as u16).to_le_bytes());
                for name in wnames {
                    put_string(&mut payload, name)?;
                }
                MessageType::Twalk
            }
            RequestBody::Open { fid, mode } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                payload.push(*mode);
                MessageType::Topen
            }
            RequestBody::Create {
                fid,
                name,
                perm,
                mode,
            } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                put_string(&mut payload, name)?;
                payload.extend_from_slice(&perm.to_le_bytes());
                payload.push(*mode);
                MessageType::Tcreate
            }
            RequestBody::Read { fid, offset, count } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                payload.extend_from_slice(&offset.to_le_bytes());
                payload.extend_from_slice(&count.to_le_bytes());
                MessageType::Tread
            }
            RequestBody::Write { fid, offset, data } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                payload.extend_from_slice(&offset.to_le_bytes());
                put_data(&mut payload, data)?;
                MessageType::Twrite
            }
            RequestBody::Clunk { fid } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                MessageType::Tclunk
            }
            RequestBody::Remove { fid } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                MessageType::Tremove
            }
            RequestBody::Stat { fid } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                MessageType::Tstat
            }
            RequestBody::Wstat { fid, stat } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                put_stat_field(&mut payload, stat)?;
                MessageType::Twstat
            }
        };
        finish(ty, &payload)
    }

    /// Encode a response into its wire representation.
    pub fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&response.tag.to_le_bytes());
        let ty = match &response.body {
            ResponseBody::Version { msize, version } => {
                payload.extend_from_slice(&msize.to_le_bytes());
                put_string(&mut payload, version)?;
                MessageType::Rversion
            }
            ResponseBody::Auth { aqid } => {
                put_qid(&mut payload, aqid);
                MessageType::Rauth
            }
            ResponseBody::Error { ename } => {
                put_string(&mut payload, ename)?;
                MessageType::Rerror
            }
            ResponseBody::Flush => MessageType::Rflush,
            ResponseBody::Attach { qid } => {
                put_qid(&mut payload, qid);
                MessageType::Rattach
            }
            ResponseBody::Walk { qids } => {
                if qids.len() > MAX_WELEM {
                    return Err(CodecError::TooManyElements(qids.len()));
                }
                payload.extend_from_slice(&(qids.len() as u16).to_le_bytes());
                for qid in qids {
                    put_qid(&mut payload, qid);
                }
                MessageType::Rwalk
            }
            ResponseBody::Open { qid, iounit } => {
                put_qid(&mut payload, qid);
                payload.extend_from_slice(&iounit.to_le_bytes());
                MessageType::Ropen
            }
            ResponseBody::Create { qid, iounit } => {
                put_qid(&mut payload, qid);
                payload.extend_from_slice(&iounit.to_le_bytes());
                MessageType::Rcreate
            }
            ResponseBody::Read { data } => {
                put_data(&mut payload, data)?;
                MessageType::Rread
            }
            ResponseBody::Write { count } => {
                payload.extend_from_slice(&count.to_le_bytes());
                MessageType::Rwrite
            }
            ResponseBody::Clunk => MessageType::Rclunk,
            ResponseBody::Remove => MessageType::Rremove,
            ResponseBody::Stat { stat } => {
                put_stat_field(&mut payload, stat)?;
                MessageType::Rstat
            }
            ResponseBody::Wstat => MessageType::Rwstat,
        };
        finish(ty, &payload)
    }

    /// Decode a request from the wire representation.
    pub fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        let (ty, payload) = decode_message(bytes)?;
        let mut cursor = Cursor::new(payload);
        let tag = cursor.read_u16()?;
        let body = match ty {
            MessageType::Tversion => {
                let msize = cursor.read_u32()?;
                let version = cursor.read_string()?;
                RequestBody::Version { msize, version }
            }
            MessageType::Tauth => {
                let afid = cursor.read_u32()?;
                let uname = cursor.read_string()?;
                let aname = cursor.read_string()?;
                RequestBody::Auth { afid, uname, aname }
            }
            MessageType::Tflush => {
                let oldtag = cursor.read_u16()?;
                RequestBody::Flush { oldtag }
            }
            MessageType::Tattach => {
                let fid = cursor.read_u32()?;
                let afid = cursor.read_u32()?;
                let uname = cursor.read_string()?;
                let aname = cursor.read_string()?;
                RequestBody::Attach {
                    fid,
                    afid,
                    uname,
                    aname,
                }
            }
            MessageType::Twalk => {
                let fid = cursor.read_u32()?;
                let newfid = cursor.read_u32()?;
                let nwname = cursor.read_u16()? as usize;
                if nwname > MAX_WELEM {
                    return Err(CodecError::TooManyElements(nwname));
                }
                let mut wnames = Vec::with_capacity(nwname);
                for _ in 0..nwname {
                    wnames.push(cursor.read_string()?);
                }
                RequestBody::Walk {
                    fid,
                    newfid,
                    wnames,
                }
            }
            MessageType::Topen => {
                let fid = cursor.read_u32()?;
                let mode = cursor.read_u8()?;
                RequestBody::Open { fid, mode }
            }
            MessageType::Tcreate => {
                let fid = cursor.read_u32()?;
                let name = cursor.read_string()?;
                let perm = cursor.read_u32()?;
                let mode = cursor.read_u8()?;
                RequestBody::Create {
                    fid,
                    name,
                    perm,
                    mode,
                }
            }
            MessageType::Tread => {
                let fid = cursor.read_u32()?;
                let offset = cursor.read_u64()?;
                let count = cursor.read_u32()?;
                RequestBody::Read { fid, offset, count }
            }
            MessageType::Twrite => {
                let fid = cursor.read_u32()?;
                let offset = cursor.read_u64()?;
                let data = cursor.read_data()?;
                RequestBody::Write { fid, offset, data }
            }
            MessageType::Tclunk => RequestBody::Clunk {
                fid: cursor.read_u32()?,
            },
            MessageType::Tremove => RequestBody::Remove {
                fid: cursor.read_u32()?,
            },
            MessageType::Tstat => RequestBody::Stat {
                fid: cursor.read_u32()?,
            },
            MessageType::Twstat => {
                let fid = cursor.read_u32()?;
                let stat = read_stat_field(&mut cursor)?;
                RequestBody::Wstat { fid, stat }
            }
            other => return Err(CodecError::Unsupported(other as u8)),
        };
        cursor.finish()?;
        Ok(Request { tag, body })
    }

    /// Decode a response from the wire representation.
    pub fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError> {
        let (ty, payload) = decode_message(bytes)?;
        let mut cursor = Cursor::new(payload);
        let tag = cursor.read_u16()?;
        let body = match ty {
            MessageType::Rversion => {
                let msize = cursor.read_u32()?;
                let version = cursor.read_string()?;
                ResponseBody::Version { msize, version }
            }
            MessageType::Rauth => ResponseBody::Auth {
                aqid: cursor.read_qid()?,
            },
            MessageType::Rerror => ResponseBody::Error {
                ename: cursor.read_string()?,
            },
            MessageType::Rflush => ResponseBody::Flush,
            MessageType::Rattach => ResponseBody::Attach {
                qid: cursor.read_qid()?,
            },
            MessageType::Rwalk => {
                let count = cursor.read_u16()? as usize;
                if count > MAX_WELEM {
                    return Err(CodecError::TooManyElements(count));
                }
                let mut qids = Vec::with_capacity(count);
                for _ in 0..count {
                    qids.push(cursor.read_qid()?);
                }
                ResponseBody::Walk { qids }
            }
            MessageType::Ropen => {
                let qid = cursor.read_qid()?;
                let iounit = cursor.read_u32()?;
                ResponseBody::Open { qid, iounit }
            }
            MessageType::Rcreate => {
                let qid = cursor.read_qid()?;
                let iounit = cursor.read_u32()?;
                ResponseBody::Create { qid, iounit }
            }
            MessageType::Rread => ResponseBody::Read {
                data: cursor.read_data()?,
            },
            MessageType::Rwrite => ResponseBody::Write {
                count: cursor.read_u32()?,
            },
            MessageType::Rclunk => ResponseBody::Clunk,
            MessageType::Rremove => ResponseBody::Remove,
            MessageType::Rstat => ResponseBody::Stat {
                stat: read_stat_field(&mut cursor)?,
            },
            MessageType::Rwstat => ResponseBody::Wstat,
            other => return Err(CodecError::Unsupported(other as u8)),
        };
        cursor.finish()?;
        Ok(Response { tag, body })
    }
}

/// Encode a request into a 9P2000 frame using the default codec.
pub fn encode_request(req: &Request) -> Result<Vec<u8>, CodecError> {
    Codec.encode_request(req)
}

/// Encode a response into a 9P2000 frame using the default codec.
pub fn encode_response(res: &Response) -> Result<Vec<u8>, CodecError> {
    Codec.encode_response(res)
}

/// Decode a request from a 9P2000 frame using the default codec.
pub fn decode_request(bytes: &[u8]) -> Result<Request, CodecError> {
    Codec.decode_request(bytes)
}

/// Decode a response from a 9P2000 frame using the default codec.
pub fn decode_response(bytes: &[u8]) -> Result<Response, CodecError> {
    Codec.decode_response(bytes)
}

/// Extract the tag of a frame without decoding its body.
///
/// Used to answer frames whose type cannot be decoded as a request.
#[must_use]
pub fn frame_tag(bytes: &[u8]) -> Option<u16> {
    let raw = bytes.get(5..7)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn finish(ty: MessageType, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let size = payload.len() + 5;
    let declared: u32 = size
        .try_into()
        .map_err(|_| CodecError::FieldTooLong(size))?;
    let mut buffer = Vec::with_capacity(size);
    buffer.extend_from_slice(&declared.to_le_bytes());
    buffer.push(ty as u8);
    buffer.extend_from_slice(payload);
    Ok(buffer)
}

fn decode_message(bytes: &[u8]) -> Result<(MessageType, &[u8]), CodecError> {
    if bytes.len() < 7 {
        return Err(CodecError::Truncated);
    }
    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if declared as usize != bytes.len() {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    let ty = MessageType::try_from(bytes[4])?;
    Ok((ty, &bytes[5..]))
}

pub(crate) fn put_qid(buffer: &mut Vec<u8>, qid: &Qid) {
    buffer.push(qid.ty.bits());
    buffer.extend_from_slice(&qid.version.to_le_bytes());
    buffer.extend_from_slice(&qid.path.to_le_bytes());
}

pub(crate) fn put_string(buffer: &mut Vec<u8>, value: &str) -> Result<(), CodecError> {
    let len: u16 = value
        .len()
        .try_into()
        .map_err(|_| CodecError::FieldTooLong(value.len()))?;
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(value.as_bytes());
    Ok(())
}

fn put_data(buffer: &mut Vec<u8>, data: &[u8]) -> Result<(), CodecError> {
    let count: u32 = data
        .len()
        .try_into()
        .map_err(|_| CodecError::FieldTooLong(data.len()))?;
    buffer.extend_from_slice(&count.to_le_bytes());
    buffer.extend_from_slice(data);
    Ok(())
}

// Rstat and Twstat wrap the stat entry in a second two-byte length.
fn put_stat_field(buffer: &mut Vec<u8>, stat: &Stat) -> Result<(), CodecError> {
    let mut entry = Vec::with_capacity(stat.encoded_len());
    encode_stat(stat, &mut entry)?;
    let len: u16 = entry
        .len()
        .try_into()
        .map_err(|_| CodecError::FieldTooLong(entry.len()))?;
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(&entry);
    Ok(())
}

fn read_stat_field(cursor: &mut Cursor<'_>) -> Result<Stat, CodecError> {
    let len = cursor.read_u16()? as usize;
    let entry = cursor.take(len)?;
    let (stat, used) = decode_stat(entry)?;
    if used != entry.len() {
        return Err(CodecError::TrailingBytes(entry.len() - used));
    }
    Ok(stat)
}

pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
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

    pub(crate) fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u16()? as usize;
        let raw = self.take(len)?;
        let text = str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(text.to_owned())
    }

    pub(crate) fn read_qid(&mut self) -> Result<Qid, CodecError> {
        let ty = QidType::from_bits_retain(self.read_u8()?);
        let version = self.read_u32()?;
        let path = self.read_u64()?;
        Ok(Qid::new(ty, version, path))
    }

    fn read_data(&mut self) -> Result<Vec<u8>, CodecError> {
        let count = self.read_u32()? as usize;
        Ok(self.take(count)?.to_vec())
    }

    fn finish(&self) -> Result<(), CodecError> {
        let remaining = self.buf.len() - self.pos;
        if remaining != 0 {
            return Err(CodecError::TrailingBytes(remaining));
        }
        Ok(())
    }
}
