// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Translate each 9P2000 request into legacy 9P1 transactions.
// Author: Lukas Bower

//! One translator operation per 9P2000 request type.

use log::debug;
use ninep1_codec::{
    self as legacy, decode_dir, AUTHENTLEN, DIRLEN, MAXFDATA, NAMELEN, TICKETLEN,
};
use ninep_codec::{encode_stat, Qid, QidType, RequestBody, ResponseBody, Stat, VERSION};

use crate::bridge::{unexpected, Bridge, OpError};
use crate::convert::{clip_name, dir_from_stat, overlay, qid_from_legacy, stat_from_dir};
use crate::handles::Handle;
use crate::tags::Tag;

const ELEMENT_TOO_LONG: &str = "file name element too long";

type OpResult = Result<ResponseBody, OpError>;

impl Bridge {
    /// Run the operation for `body` on behalf of `tag`.
    pub(crate) fn dispatch(&self, tag: Tag, body: RequestBody) -> OpResult {
        match body {
            RequestBody::Version { msize, version } => self.version(msize, &version),
            RequestBody::Auth { .. } => Err(OpError::rejected("authentication not supported")),
            RequestBody::Flush { oldtag } => self.flush(tag, oldtag),
            RequestBody::Attach {
                fid, uname, aname, ..
            } => self.attach(tag, fid, &uname, &aname),
            RequestBody::Walk {
                fid,
                newfid,
                wnames,
            } => self.walk(tag, fid, newfid, &wnames),
            RequestBody::Open { fid, mode } => self.open(tag, fid, mode),
            RequestBody::Create {
                fid,
                name,
                perm,
                mode,
            } => self.create(tag, fid, name, perm, mode),
            RequestBody::Read { fid, offset, count } => self.read(tag, fid, offset, count),
            RequestBody::Write { fid, offset, data } => self.write(tag, fid, offset, data),
            RequestBody::Clunk { fid } => self.clunk(tag, fid),
            RequestBody::Remove { fid } => self.remove(tag, fid),
            RequestBody::Stat { fid } => self.stat(tag, fid),
            RequestBody::Wstat { fid, stat } => self.wstat(tag, fid, &stat),
        }
    }

    /// Claim `fid` and require it to be bound.
    fn bound(&self, fid: u32, op: &str) -> Result<Handle, OpError> {
        let handle = self
            .handles
            .acquire(fid)
            .ok_or_else(|| OpError::rejected("fid out of range"))?;
        if !self.handles.is_busy(handle) {
            self.handles.release_if_idle(handle);
            return Err(OpError::rejected(format!("{op}: bad fid")));
        }
        Ok(handle)
    }

    fn version(&self, msize: u32, version: &str) -> OpResult {
        if !version.starts_with(VERSION) {
            return Err(OpError::rejected("unknown 9P version"));
        }
        self.handles.reset();
        Ok(ResponseBody::Version {
            msize: msize.min(self.config.msize),
            version: VERSION.to_owned(),
        })
    }

    fn flush(&self, tag: Tag, oldtag: u16) -> OpResult {
        if oldtag == tag.id() {
            return Ok(ResponseBody::Flush);
        }
        let Some(target) = self.tags.find(oldtag) else {
            debug!("no such tag to flush: {oldtag}");
            return Ok(ResponseBody::Flush);
        };
        self.tags.mark_flushed(target);
        let outcome = self.transact_flush(tag, target);
        if self.tags.claim_wakeup(target) {
            debug!("waking receiver for tag {oldtag}");
            self.rendezvous.cancel(oldtag);
        }
        if !matches!(outcome, Err(OpError::Fatal(_))) {
            self.tags.wait_settled(target);
        }
        self.tags.release(target);
        match outcome {
            Ok(()) | Err(OpError::Rejected(_)) => Ok(ResponseBody::Flush),
            Err(err) => Err(err),
        }
    }

    fn attach(&self, tag: Tag, fid: u32, uname: &str, aname: &str) -> OpResult {
        let handle = self
            .handles
            .acquire(fid)
            .ok_or_else(|| OpError::rejected("fid out of range"))?;
        if self.handles.is_busy(handle) {
            return Err(OpError::rejected("attach: fid in use"));
        }
        let uname = if self.config.user == "none" {
            "none".to_owned()
        } else {
            clip_name(uname)
        };
        let reply = self.transact(
            tag,
            legacy::RequestBody::Attach {
                fid: handle.legacy(),
                uname,
                aname: clip_name(aname),
                ticket: [0; TICKETLEN],
                auth: [0; AUTHENTLEN],
            },
        );
        let qid = match reply {
            Ok(legacy::ResponseBody::Attach { qid, .. }) => qid,
            Ok(other) => return Err(unexpected(legacy::MessageType::Rattach, &other)),
            Err(err) => {
                self.handles.release_if_idle(handle);
                return Err(err);
            }
        };
        let mut qid = qid_from_legacy(qid);
        qid.ty = QidType::DIR;
        self.handles.bind(handle, qid);
        Ok(ResponseBody::Attach { qid })
    }

    fn walk(&self, tag: Tag, fid: u32, newfid: u32, wnames: &[String]) -> OpResult {
        let source = self.bound(fid, "walk")?;
        if wnames.iter().any(|name| name.len() >= NAMELEN) {
            return Err(OpError::rejected(ELEMENT_TOO_LONG));
        }

        let mut dest = source;
        let mut clone = None;
        if newfid != fid {
            let target = self
                .handles
                .acquire(newfid)
                .ok_or_else(|| OpError::rejected("fid out of range"))?;
            if self.handles.is_busy(target) {
                return Err(OpError::rejected("walk: newfid in use"));
            }
            let reply = self.transact(
                tag,
                legacy::RequestBody::Clone {
                    fid: source.legacy(),
                    newfid: target.legacy(),
                },
            );
            match reply {
                Ok(legacy::ResponseBody::Clone { .. }) => {}
                Ok(other) => return Err(unexpected(legacy::MessageType::Rclone, &other)),
                Err(err) => {
                    self.handles.clear(target);
                    return Err(err);
                }
            }
            self.handles.bind(target, self.handles.qid(source));
            dest = target;
            clone = Some(target);
        }

        let mut qids: Vec<Qid> = Vec::with_capacity(wnames.len());
        let mut failure = None;
        for name in wnames {
            let reply = self.transact(
                tag,
                legacy::RequestBody::Walk {
                    fid: dest.legacy(),
                    name: name.clone(),
                },
            );
            match reply {
                Ok(legacy::ResponseBody::Walk { qid, .. }) => qids.push(qid_from_legacy(qid)),
                Ok(other) => return Err(unexpected(legacy::MessageType::Rwalk, &other)),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if let (Some(target), Some(_)) = (clone, &failure) {
            let cleanup = self.transact_forced(
                tag,
                legacy::RequestBody::Clunk {
                    fid: target.legacy(),
                },
            );
            self.handles.clear(target);
            if let Err(OpError::Fatal(err)) = cleanup {
                return Err(OpError::Fatal(err));
            }
        }

        match failure {
            None => {
                if let Some(last) = qids.last() {
                    self.handles.set_qid(dest, *last);
                }
                Ok(ResponseBody::Walk { qids })
            }
            Some(OpError::Rejected(ename)) if qids.is_empty() => Err(OpError::Rejected(ename)),
            Some(OpError::Rejected(_)) => Ok(ResponseBody::Walk { qids }),
            Some(other) => Err(other),
        }
    }

    fn open(&self, tag: Tag, fid: u32, mode: u8) -> OpResult {
        let handle = self.bound(fid, "open")?;
        let reply = self.transact(
            tag,
            legacy::RequestBody::Open {
                fid: handle.legacy(),
                mode,
            },
        )?;
        let qid = match reply {
            legacy::ResponseBody::Open { qid, .. } => qid,
            other => return Err(unexpected(legacy::MessageType::Ropen, &other)),
        };
        let qid = qid_from_legacy(qid);
        self.handles.set_qid(handle, qid);
        self.handles.set_offsets(handle, (0, 0));
        Ok(ResponseBody::Open { qid, iounit: 0 })
    }

    fn create(&self, tag: Tag, fid: u32, name: String, perm: u32, mode: u8) -> OpResult {
        let handle = self.bound(fid, "create")?;
        if name.len() >= NAMELEN {
            return Err(OpError::rejected(ELEMENT_TOO_LONG));
        }
        let reply = self.transact(
            tag,
            legacy::RequestBody::Create {
                fid: handle.legacy(),
                name,
                perm,
                mode,
            },
        )?;
        let qid = match reply {
            legacy::ResponseBody::Create { qid, .. } => qid,
            other => return Err(unexpected(legacy::MessageType::Rcreate, &other)),
        };
        let qid = qid_from_legacy(qid);
        self.handles.set_qid(handle, qid);
        self.handles.set_offsets(handle, (0, 0));
        Ok(ResponseBody::Create { qid, iounit: 0 })
    }

    fn read(&self, tag: Tag, fid: u32, offset: u64, count: u32) -> OpResult {
        let handle = self.bound(fid, "read")?;
        let count = count.min(MAXFDATA as u32) as u16;
        if self.handles.qid(handle).is_dir() {
            return self.read_dir(tag, handle, offset, count);
        }
        let reply = self.transact(
            tag,
            legacy::RequestBody::Read {
                fid: handle.legacy(),
                offset,
                count,
            },
        )?;
        let data = match reply {
            legacy::ResponseBody::Read { data, .. } => data,
            other => return Err(unexpected(legacy::MessageType::Rread, &other)),
        };
        Ok(ResponseBody::Read { data })
    }

    /// Read legacy directory records and re-encode as many as fit in
    /// `count` bytes of 9P2000 stat entries.
    fn read_dir(&self, tag: Tag, handle: Handle, offset: u64, count: u16) -> OpResult {
        let (mut new_offset, mut old_offset) = self.handles.offsets(handle);
        if offset != new_offset {
            return Err(OpError::rejected("seek in directory disallowed"));
        }
        let records = (usize::from(count) / DIRLEN).clamp(1, MAXFDATA / DIRLEN);
        let reply = self.transact(
            tag,
            legacy::RequestBody::Read {
                fid: handle.legacy(),
                offset: old_offset,
                count: (records * DIRLEN) as u16,
            },
        )?;
        let data = match reply {
            legacy::ResponseBody::Read { data, .. } => data,
            other => return Err(unexpected(legacy::MessageType::Rread, &other)),
        };

        let mut out = Vec::with_capacity(usize::from(count));
        for record in data.chunks_exact(DIRLEN) {
            let dir = decode_dir(record)
                .map_err(|_| OpError::rejected("bad dir conversion in read"))?;
            let stat = stat_from_dir(&dir);
            let len = stat.encoded_len();
            if out.len() + len > usize::from(count) {
                break;
            }
            encode_stat(&stat, &mut out)
                .map_err(|_| OpError::rejected("bad dir conversion in read"))?;
            new_offset += len as u64;
            old_offset += DIRLEN as u64;
        }
        self.handles.set_offsets(handle, (new_offset, old_offset));
        Ok(ResponseBody::Read { data: out })
    }

    fn write(&self, tag: Tag, fid: u32, offset: u64, mut data: Vec<u8>) -> OpResult {
        let handle = self.bound(fid, "write")?;
        data.truncate(MAXFDATA);
        let reply = self.transact(
            tag,
            legacy::RequestBody::Write {
                fid: handle.legacy(),
                offset,
                data,
            },
        )?;
        let count = match reply {
            legacy::ResponseBody::Write { count, .. } => count,
            other => return Err(unexpected(legacy::MessageType::Rwrite, &other)),
        };
        Ok(ResponseBody::Write {
            count: u32::from(count),
        })
    }

    fn clunk(&self, tag: Tag, fid: u32) -> OpResult {
        let handle = self.bound(fid, "clunk")?;
        let reply = self.transact(
            tag,
            legacy::RequestBody::Clunk {
                fid: handle.legacy(),
            },
        );
        self.handles.clear(handle);
        match reply {
            Err(OpError::Rejected(ename)) => {
                debug!("ignoring clunk error: {ename}");
                Ok(ResponseBody::Clunk)
            }
            Err(err) => Err(err),
            Ok(_) => Ok(ResponseBody::Clunk),
        }
    }

    fn remove(&self, tag: Tag, fid: u32) -> OpResult {
        let handle = self.bound(fid, "remove")?;
        let reply = self.transact(
            tag,
            legacy::RequestBody::Remove {
                fid: handle.legacy(),
            },
        );
        self.handles.clear(handle);
        reply.map(|_| ResponseBody::Remove)
    }

    fn stat(&self, tag: Tag, fid: u32) -> OpResult {
        let handle = self.bound(fid, "stat")?;
        let dir = self.legacy_stat(tag, handle)?;
        Ok(ResponseBody::Stat {
            stat: stat_from_dir(&dir),
        })
    }

    fn wstat(&self, tag: Tag, fid: u32, stat: &Stat) -> OpResult {
        let handle = self.bound(fid, "wstat")?;
        let dir = if stat.has_untouched_fields() {
            let current = self.legacy_stat(tag, handle)?;
            overlay(current, stat).map_err(OpError::rejected)?
        } else {
            dir_from_stat(stat).map_err(OpError::rejected)?
        };
        let reply = self.transact(
            tag,
            legacy::RequestBody::Wstat {
                fid: handle.legacy(),
                stat: dir,
            },
        )?;
        match reply {
            legacy::ResponseBody::Wstat { .. } => Ok(ResponseBody::Wstat),
            other => Err(unexpected(legacy::MessageType::Rwstat, &other)),
        }
    }

    fn legacy_stat(&self, tag: Tag, handle: Handle) -> Result<legacy::Dir, OpError> {
        let reply = self.transact(
            tag,
            legacy::RequestBody::Stat {
                fid: handle.legacy(),
            },
        )?;
        match reply {
            legacy::ResponseBody::Stat { stat, .. } => Ok(stat),
            other => Err(unexpected(legacy::MessageType::Rstat, &other)),
        }
    }
}
