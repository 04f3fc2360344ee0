// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define legacy 9P1 wire types and constants.
// Author: Lukas Bower
#![allow(clippy::module_name_repetitions)]

//! 9P1 data model definitions.

/// Width of a NUL-padded name record.
pub const NAMELEN: usize = 28;
/// Width of a NUL-padded error record.
pub const ERRLEN: usize = 64;
/// Width of an encoded directory record.
pub const DIRLEN: usize = 116;
/// Width of the opaque ticket carried by `Tattach`.
pub const TICKETLEN: usize = 72;
/// Width of the opaque authenticator carried by `Tattach`/`Rattach`.
pub const AUTHENTLEN: usize = 13;
/// Largest data payload of a single `Tread`/`Twrite`.
pub const MAXFDATA: usize = 8192;

/// Directory bit of a legacy qid path and mode.
pub const CHDIR: u32 = 0x8000_0000;
/// Append-only bit of a legacy qid path and mode.
pub const CHAPPEND: u32 = 0x4000_0000;
/// Exclusive-use bit of a legacy qid path and mode.
pub const CHEXCL: u32 = 0x2000_0000;

/// Possible errors produced while encoding or decoding 9P1 messages.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input buffer was shorter than the message layout requires.
    #[error("truncated message")]
    Truncated,
    /// Encountered a type byte that is not a 9P1 message handled here.
    #[error("unsupported message type {0}")]
    Unsupported(u8),
    /// Buffer length disagrees with the length implied by the layout.
    #[error("length mismatch: expected {expected} actual {actual}")]
    LengthMismatch {
        /// Length implied by the message layout.
        expected: usize,
        /// Actual byte length supplied.
        actual: usize,
    },
    /// A name does not fit a [`NAMELEN`] record with its terminating NUL.
    #[error("name of {0} bytes exceeds record")]
    NameTooLong(usize),
    /// A data payload exceeds [`MAXFDATA`].
    #[error("data of {0} bytes exceeds maximum")]
    DataTooLarge(usize),
}

/// 9P1 message opcodes handled by the codec.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum MessageType {
    Rerror = 55,
    Tflush = 56,
    Rflush = 57,
    Tclone = 60,
    Rclone = 61,
    Twalk = 62,
    Rwalk = 63,
    Topen = 64,
    Ropen = 65,
    Tcreate = 66,
    Rcreate = 67,
    Tread = 68,
    Rread = 69,
    Twrite = 70,
    Rwrite = 71,
    Tclunk = 72,
    Rclunk = 73,
    Tremove = 74,
    Rremove = 75,
    Tstat = 76,
    Rstat = 77,
    Twstat = 78,
    Rwstat = 79,
    Tattach = 86,
    Rattach = 87,
}

impl MessageType {
    /// Reply type expected for a request type, or `None` for replies.
    #[must_use]
    pub fn reply(self) -> Option<Self> {
        use MessageType::*;
        Some(match self {
            Tflush => Rflush,
            Tclone => Rclone,
            Twalk => Rwalk,
            Topen => Ropen,
            Tcreate => Rcreate,
            Tread => Rread,
            Twrite => Rwrite,
            Tclunk => Rclunk,
            Tremove => Rremove,
            Tstat => Rstat,
            Twstat => Rwstat,
            Tattach => Rattach,
            _ => return None,
        })
    }
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MessageType::*;
        Ok(match value {
            55 => Rerror,
            56 => Tflush,
            57 => Rflush,
            60 => Tclone,
            61 => Rclone,
            62 => Twalk,
            63 => Rwalk,
            64 => Topen,
            65 => Ropen,
            66 => Tcreate,
            67 => Rcreate,
            68 => Tread,
            69 => Rread,
            70 => Twrite,
            71 => Rwrite,
            72 => Tclunk,
            73 => Rclunk,
            74 => Tremove,
            75 => Rremove,
            76 => Tstat,
            77 => Rstat,
            78 => Twstat,
            79 => Rwstat,
            86 => Tattach,
            87 => Rattach,
            other => return Err(CodecError::Unsupported(other)),
        })
    }
}

/// Legacy qid: a path whose top bits classify the file, and a version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Qid {
    /// Path, with [`CHDIR`] set for directories.
    pub path: u32,
    /// Version number.
    pub version: u32,
}

impl Qid {
    /// Encoded size of a qid on the wire.
    pub const SIZE: usize = 8;

    /// Construct a new qid.
    #[must_use]
    pub fn new(path: u32, version: u32) -> Self {
        Self { path, version }
    }
}

/// Legacy directory record, always [`DIRLEN`] bytes on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dir {
    /// Last path element.
    pub name: String,
    /// Owner.
    pub uid: String,
    /// Group.
    pub gid: String,
    /// Identity of the file.
    pub qid: Qid,
    /// Permissions, with [`CHDIR`] for directories.
    pub mode: u32,
    /// Last access time.
    pub atime: u32,
    /// Last modification time.
    pub mtime: u32,
    /// File length in bytes.
    pub length: u64,
    /// Server type.
    pub ty: u16,
    /// Server subtype.
    pub dev: u16,
}

/// Request envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request identifier, echoed back by the reply.
    pub tag: u16,
    /// The concrete request payload.
    pub body: RequestBody,
}

/// Response envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Tag of the request being answered.
    pub tag: u16,
    /// The concrete response payload.
    pub body: ResponseBody,
}

/// 9P1 request messages.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RequestBody {
    /// `Tflush` cancels the request carrying `oldtag`.
    Flush { oldtag: u16 },
    /// `Tattach` binds `fid` to the root of the tree named by `aname`.
    Attach {
        fid: u16,
        uname: String,
        aname: String,
        ticket: [u8; TICKETLEN],
        auth: [u8; AUTHENTLEN],
    },
    /// `Tclone` duplicates `fid` as `newfid`.
    Clone { fid: u16, newfid: u16 },
    /// `Twalk` moves `fid` one element down.
    Walk { fid: u16, name: String },
    /// `Topen` prepares `fid` for I/O.
    Open { fid: u16, mode: u8 },
    /// `Tcreate` creates `name` in the directory `fid`.
    Create {
        fid: u16,
        name: String,
        perm: u32,
        mode: u8,
    },
    /// `Tread` reads at most `count` bytes.
    Read { fid: u16, offset: u64, count: u16 },
    /// `Twrite` writes `data`.
    Write { fid: u16, offset: u64, data: Vec<u8> },
    /// `Tclunk` forgets `fid`.
    Clunk { fid: u16 },
    /// `Tremove` removes the file and forgets `fid`.
    Remove { fid: u16 },
    /// `Tstat` inquires about `fid`.
    Stat { fid: u16 },
    /// `Twstat` replaces the attributes of `fid`.
    Wstat { fid: u16, stat: Dir },
}

impl RequestBody {
    /// Opcode of this request.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Flush { .. } => MessageType::Tflush,
            Self::Attach { .. } => MessageType::Tattach,
            Self::Clone { .. } => MessageType::Tclone,
            Self::Walk { .. } => MessageType::Twalk,
            Self::Open { .. } => MessageType::Topen,
            Self::Create { .. } => MessageType::Tcreate,
            Self::Read { .. } => MessageType::Tread,
            Self::Write { .. } => MessageType::Twrite,
            Self::Clunk { .. } => MessageType::Tclunk,
            Self::Remove { .. } => MessageType::Tremove,
            Self::Stat { .. } => MessageType::Tstat,
            Self::Wstat { .. } => MessageType::Twstat,
        }
    }
}

/// 9P1 response messages.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ResponseBody {
    /// `Rerror` carrying the server's error text.
    Error { ename: String },
    Flush,
    Attach {
        fid: u16,
        qid: Qid,
        rauth: [u8; AUTHENTLEN],
    },
    Clone { fid: u16 },
    Walk { fid: u16, qid: Qid },
    Open { fid: u16, qid: Qid },
    Create { fid: u16, qid: Qid },
    Read { fid: u16, data: Vec<u8> },
    Write { fid: u16, count: u16 },
    Clunk { fid: u16 },
    Remove { fid: u16 },
    Stat { fid: u16, stat: Dir },
    Wstat { fid: u16 },
}

impl ResponseBody {
    /// Opcode of this response.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Error { .. } => MessageType::Rerror,
            Self::Flush => MessageType::Rflush,
            Self::Attach { .. } => MessageType::Rattach,
            Self::Clone { .. } => MessageType::Rclone,
            Self::Walk { .. } => MessageType::Rwalk,
            Self::Open { .. } => MessageType::Ropen,
            Self::Create { .. } => MessageType::Rcreate,
            Self::Read { .. } => MessageType::Rread,
            Self::Write { .. } => MessageType::Rwrite,
            Self::Clunk { .. } => MessageType::Rclunk,
            Self::Remove { .. } => MessageType::Rremove,
            Self::Stat { .. } => MessageType::Rstat,
            Self::Wstat { .. } => MessageType::Rwstat,
        }
    }

    /// Build an `Rerror` body.
    #[must_use]
    pub fn error(ename: impl Into<String>) -> Self {
        Self::Error {
            ename: ename.into(),
        }
    }
}
