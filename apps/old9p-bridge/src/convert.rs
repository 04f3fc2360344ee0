// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Translate qids and directory entries between 9P1 and 9P2000.
// Author: Lukas Bower

//! Field translation between the two protocol generations.

use ninep1_codec::{self as legacy, CHAPPEND, CHDIR, CHEXCL, NAMELEN};
use ninep_codec::{Qid, QidType, Stat};

/// Error text for names that do not fit a legacy name record.
pub(crate) const NAME_TOO_LONG: &str = "name too long";

/// Map a legacy qid to 9P2000, deriving the type bits from the path.
pub(crate) fn qid_from_legacy(qid: legacy::Qid) -> Qid {
    let mut ty = QidType::FILE;
    if qid.path & CHDIR != 0 {
        ty |= QidType::DIR;
    }
    if qid.path & CHAPPEND != 0 {
        ty |= QidType::APPEND;
    }
    if qid.path & CHEXCL != 0 {
        ty |= QidType::EXCL;
    }
    Qid::new(ty, qid.version, u64::from(qid.path & !CHDIR))
}

/// Map a 9P2000 qid back to a legacy qid; only the directory bit survives
/// in the path.
pub(crate) fn qid_to_legacy(qid: &Qid) -> legacy::Qid {
    let mut path = qid.path as u32 & !CHDIR;
    if qid.is_dir() {
        path |= CHDIR;
    }
    legacy::Qid::new(path, qid.version)
}

/// Re-encode a legacy directory record as a 9P2000 stat entry.
pub(crate) fn stat_from_dir(dir: &legacy::Dir) -> Stat {
    Stat {
        ty: dir.ty,
        dev: u32::from(dir.dev),
        qid: qid_from_legacy(dir.qid),
        mode: dir.mode,
        atime: dir.atime,
        mtime: dir.mtime,
        length: dir.length,
        name: dir.name.clone(),
        uid: dir.uid.clone(),
        gid: dir.gid.clone(),
        muid: dir.uid.clone(),
    }
}

/// Build the legacy record for a fully specified 9P2000 stat.
pub(crate) fn dir_from_stat(stat: &Stat) -> Result<legacy::Dir, &'static str> {
    Ok(legacy::Dir {
        name: fit_name(&stat.name)?,
        uid: fit_name(&stat.uid)?,
        gid: fit_name(&stat.gid)?,
        qid: qid_to_legacy(&stat.qid),
        mode: stat.mode,
        atime: stat.atime,
        mtime: stat.mtime,
        length: stat.length,
        ty: stat.ty,
        dev: stat.dev as u16,
    })
}

/// Overlay the fields of `stat` that are not "don't touch" onto `current`.
pub(crate) fn overlay(current: legacy::Dir, stat: &Stat) -> Result<legacy::Dir, &'static str> {
    let mut dir = current;
    if !stat.name.is_empty() {
        dir.name = fit_name(&stat.name)?;
    }
    if !stat.uid.is_empty() {
        dir.uid = fit_name(&stat.uid)?;
    }
    if !stat.gid.is_empty() {
        dir.gid = fit_name(&stat.gid)?;
    }
    if stat.mode != u32::MAX {
        dir.mode = stat.mode;
    }
    if stat.mtime != u32::MAX {
        dir.mtime = stat.mtime;
    }
    if stat.length != u64::MAX {
        dir.length = stat.length;
    }
    Ok(dir)
}

fn fit_name(name: &str) -> Result<String, &'static str> {
    if name.len() >= NAMELEN {
        return Err(NAME_TOO_LONG);
    }
    Ok(name.to_owned())
}

/// Truncate `name` so it fits a legacy name record, at a character boundary.
pub(crate) fn clip_name(name: &str) -> String {
    let mut end = name.len().min(NAMELEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_owned()
}
