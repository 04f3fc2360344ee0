// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define 9P2000 wire types and constants shared across components.
// Author: Lukas Bower
#![allow(clippy::module_name_repetitions)]

//! 9P2000 data model definitions.

use bitflags::bitflags;

/// Protocol version string spoken by the bridge.
pub const VERSION: &str = "9P2000";

/// Space reserved for the header of an `Rread`/`Twrite` frame.
pub const IOHDRSZ: u32 = 24;

/// Maximum number of path elements in a single `Twalk`.
pub const MAX_WELEM: usize = 16;

/// Tag used by `Tversion`, which is not associated with an outstanding request.
pub const NOTAG: u16 = 0xFFFF;

/// Fid value meaning "no fid" (used as the afid of unauthenticated attaches).
pub const NOFID: u32 = u32::MAX;

/// Fixed portion of an encoded stat entry, including its own size prefix.
pub const STATFIXLEN: usize = 49;

/// Directory bit of a stat mode.
pub const DMDIR: u32 = 0x8000_0000;
/// Append-only bit of a stat mode.
pub const DMAPPEND: u32 = 0x4000_0000;
/// Exclusive-use bit of a stat mode.
pub const DMEXCL: u32 = 0x2000_0000;

/// Possible errors produced while encoding or decoding 9P2000 messages.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input buffer was shorter than the structure being decoded.
    #[error("truncated frame")]
    Truncated,
    /// Encountered a message type that is not a 9P2000 request or response.
    #[error("unsupported message type {0}")]
    Unsupported(u8),
    /// Encountered malformed UTF-8 data.
    #[error("invalid utf8 in string field")]
    InvalidUtf8,
    /// Declared message size does not match the actual payload length.
    #[error("length mismatch: declared {declared} actual {actual}")]
    LengthMismatch {
        /// Message length declared in the frame header.
        declared: u32,
        /// Actual byte length observed in the payload.
        actual: usize,
    },
    /// Bytes were left over after the message body was decoded.
    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),
    /// A walk carried more than [`MAX_WELEM`] elements.
    #[error("too many walk elements: {0}")]
    TooManyElements(usize),
    /// A string or payload does not fit its length prefix.
    #[error("field of {0} bytes exceeds its length prefix")]
    FieldTooLong(usize),
    /// A frame exceeded the negotiated maximum size.
    #[error("frame of {declared} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Frame length declared by the peer.
        declared: u32,
        /// Maximum frame size accepted.
        max: u32,
    },
}

bitflags! {
    /// Qid type bits as defined by 9P2000.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QidType: u8 {
        /// Directory.
        const DIR = 0x80;
        /// Append-only file.
        const APPEND = 0x40;
        /// Exclusive-use file.
        const EXCL = 0x20;
        /// Mounted channel.
        const MOUNT = 0x10;
        /// Authentication file.
        const AUTH = 0x08;
        /// Non-backed-up file.
        const TMP = 0x04;
    }
}

impl QidType {
    /// Plain file (no type bits set).
    pub const FILE: Self = Self::empty();
}

/// 9P2000 qid: the server's unique identity for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Qid {
    /// Type bits.
    pub ty: QidType,
    /// Version number, bumped on each modification.
    pub version: u32,
    /// Unique path number.
    pub path: u64,
}

impl Qid {
    /// Encoded size of a qid on the wire.
    pub const SIZE: usize = 13;

    /// Construct a new qid.
    #[must_use]
    pub fn new(ty: QidType, version: u32, path: u64) -> Self {
        Self { ty, version, path }
    }

    /// Check whether the qid names a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.ty.contains(QidType::DIR)
    }
}

impl Default for Qid {
    fn default() -> Self {
        Self::new(QidType::FILE, 0, 0)
    }
}

/// Machine-independent directory entry, as carried by `Rstat`, `Twstat` and
/// directory reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Server type.
    pub ty: u16,
    /// Server subtype.
    pub dev: u32,
    /// Unique identity of the file.
    pub qid: Qid,
    /// Permissions and mode bits.
    pub mode: u32,
    /// Last access time.
    pub atime: u32,
    /// Last modification time.
    pub mtime: u32,
    /// File length in bytes.
    pub length: u64,
    /// Last path element.
    pub name: String,
    /// Owner.
    pub uid: String,
    /// Group.
    pub gid: String,
    /// Last modifier.
    pub muid: String,
}

impl Stat {
    /// A stat whose every field carries the `Twstat` "don't touch" value.
    #[must_use]
    pub fn dont_touch() -> Self {
        Self {
            ty: u16::MAX,
            dev: u32::MAX,
            qid: Qid::new(QidType::from_bits_retain(u8::MAX), u32::MAX, u64::MAX),
            mode: u32::MAX,
            atime: u32::MAX,
            mtime: u32::MAX,
            length: u64::MAX,
            name: String::new(),
            uid: String::new(),
            gid: String::new(),
            muid: String::new(),
        }
    }

    /// Return true if any field a `Twstat` can change is left untouched.
    #[must_use]
    pub fn has_untouched_fields(&self) -> bool {
        self.name.is_empty()
            || self.uid.is_empty()
            || self.gid.is_empty()
            || self.mode == u32::MAX
            || self.mtime == u32::MAX
            || self.length == u64::MAX
    }

    /// Encoded size of this entry, including its two-byte size prefix.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        STATFIXLEN + self.name.len() + self.uid.len() + self.gid.len() + self.muid.len()
    }
}

/// Request envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request identifier, echoed back by responses.
    pub tag: u16,
    /// The concrete request payload.
    pub body: RequestBody,
}

/// Response envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response identifier (mirrors the request tag).
    pub tag: u16,
    /// The concrete response payload.
    pub body: ResponseBody,
}

/// 9P2000 request messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// `Tversion` negotiates the message size and version string.
    Version {
        /// Requested maximum message size.
        msize: u32,
        /// Protocol version string supplied by the client.
        version: String,
    },
    /// `Tauth` requests an authentication fid.
    Auth {
        /// Fid to be used for the authentication protocol.
        afid: u32,
        /// User name.
        uname: String,
        /// Attach name.
        aname: String,
    },
    /// `Tflush` cancels an outstanding request.
    Flush {
        /// Tag of the request being cancelled.
        oldtag: u16,
    },
    /// `Tattach` binds a fid to the root of a file tree.
    Attach {
        /// Fid to bind.
        fid: u32,
        /// Authentication fid, or [`NOFID`].
        afid: u32,
        /// User name.
        uname: String,
        /// File tree selector.
        aname: String,
    },
    /// `Twalk` traverses path elements, producing a new fid.
    Walk {
        /// Source fid.
        fid: u32,
        /// Destination fid (may equal `fid`).
        newfid: u32,
        /// Path elements, at most [`MAX_WELEM`].
        wnames: Vec<String>,
    },
    /// `Topen` prepares a fid for I/O.
    Open {
        /// Fid to open.
        fid: u32,
        /// Open mode byte.
        mode: u8,
    },
    /// `Tcreate` creates a file in the directory named by `fid`.
    Create {
        /// Directory fid; refers to the new file on success.
        fid: u32,
        /// Name of the new file.
        name: String,
        /// Permissions (with [`DMDIR`] for directories).
        perm: u32,
        /// Open mode byte.
        mode: u8,
    },
    /// `Tread` reads from an open fid.
    Read {
        /// Fid to read from.
        fid: u32,
        /// Byte offset.
        offset: u64,
        /// Number of bytes requested.
        count: u32,
    },
    /// `Twrite` writes to an open fid.
    Write {
        /// Fid to write to.
        fid: u32,
        /// Byte offset.
        offset: u64,
        /// Payload bytes.
        data: Vec<u8>,
    },
    /// `Tclunk` forgets a fid.
    Clunk {
        /// Fid to release.
        fid: u32,
    },
    /// `Tremove` removes the file and clunks the fid.
    Remove {
        /// Fid naming the file to remove.
        fid: u32,
    },
    /// `Tstat` inquires about a file.
    Stat {
        /// Fid naming the file.
        fid: u32,
    },
    /// `Twstat` changes file attributes.
    Wstat {
        /// Fid naming the file.
        fid: u32,
        /// New attributes; untouched fields carry "don't touch" values.
        stat: Stat,
    },
}

/// 9P2000 response messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// `Rversion` carrying the negotiated size and version.
    Version {
        /// Negotiated maximum message size.
        msize: u32,
        /// Protocol version string.
        version: String,
    },
    /// `Rauth` carrying the authentication qid.
    Auth {
        /// Qid of the authentication file.
        aqid: Qid,
    },
    /// `Rerror` carrying an error string.
    Error {
        /// Error text.
        ename: String,
    },
    /// `Rflush` acknowledging a flush.
    Flush,
    /// `Rattach` carrying the root qid.
    Attach {
        /// Qid of the attached root.
        qid: Qid,
    },
    /// `Rwalk` carrying the qids of the elements walked.
    Walk {
        /// One qid per successfully walked element.
        qids: Vec<Qid>,
    },
    /// `Ropen` carrying the opened qid and I/O unit.
    Open {
        /// Qid of the opened file.
        qid: Qid,
        /// Maximum atomic I/O size, or zero.
        iounit: u32,
    },
    /// `Rcreate` carrying the created qid and I/O unit.
    Create {
        /// Qid of the new file.
        qid: Qid,
        /// Maximum atomic I/O size, or zero.
        iounit: u32,
    },
    /// `Rread` carrying the data read.
    Read {
        /// Bytes read.
        data: Vec<u8>,
    },
    /// `Rwrite` carrying the write count.
    Write {
        /// Number of bytes written.
        count: u32,
    },
    /// `Rclunk` acknowledging the clunk.
    Clunk,
    /// `Rremove` acknowledging the removal.
    Remove,
    /// `Rstat` carrying the file's attributes.
    Stat {
        /// Attributes of the file.
        stat: Stat,
    },
    /// `Rwstat` acknowledging the attribute change.
    Wstat,
}

impl ResponseBody {
    /// Build an `Rerror` body.
    #[must_use]
    pub fn error(ename: impl Into<String>) -> Self {
        Self::Error {
            ename: ename.into(),
        }
    }
}
