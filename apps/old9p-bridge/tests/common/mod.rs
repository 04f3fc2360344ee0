// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: In-process 9P1 file server and 9P2000 client used by gateway tests.
// Author: Lukas Bower
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ninep1_codec::{
    self as legacy, decode_request, encode_dir, encode_response, frame_len, Dir, CHDIR, DIRLEN,
};
use ninep_codec::{
    decode_response, encode_request, read_frame, write_frame, Request, RequestBody, Response,
    ResponseBody, NOFID,
};
use old9p_bridge::{BridgeConfig, BridgeError, Framing, Gateway, MAX_MSIZE};

pub const ROOT: u32 = 1;
const MTIME: u32 = 1_700_000_000;

/// Reads of this file are held until flushed, then dropped.
pub const SLOW: &str = "slow";
/// Reads of this file are held until flushed, then answered before the flush.
pub const LATE: &str = "late";
pub const LATE_DATA: &[u8] = b"late data";
/// A read of `SWAP_A` is held until a read of `SWAP_B` arrives; the server
/// then answers `SWAP_B` first.
pub const SWAP_A: &str = "swap-a";
pub const SWAP_B: &str = "swap-b";
pub const SWAP_A_DATA: &[u8] = b"first file";
pub const SWAP_B_DATA: &[u8] = b"second file";

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub parent: u32,
    pub dir: bool,
    pub mode: u32,
    pub uid: String,
    pub gid: String,
    pub mtime: u32,
    pub version: u32,
    pub data: Vec<u8>,
    pub children: Vec<u32>,
}

/// State of the fake legacy server, visible to tests.
#[derive(Debug, Default)]
pub struct Tree {
    pub nodes: HashMap<u32, Node>,
    pub fids: HashMap<u16, u32>,
    pub requests: Vec<legacy::RequestBody>,
    pub attach_names: Vec<String>,
    next_path: u32,
}

impl Tree {
    fn new() -> Self {
        let mut tree = Self {
            next_path: ROOT + 1,
            ..Self::default()
        };
        tree.nodes.insert(
            ROOT,
            Node {
                name: "/".to_owned(),
                parent: ROOT,
                dir: true,
                mode: CHDIR | 0o775,
                uid: "sys".to_owned(),
                gid: "sys".to_owned(),
                mtime: MTIME,
                version: 0,
                data: Vec::new(),
                children: Vec::new(),
            },
        );
        let a = tree.add(ROOT, "a", true, b"");
        let b = tree.add(a, "b", true, b"");
        tree.add(b, "c", false, b"deep file");
        tree.add(ROOT, "data", false, b"hello world");
        tree.add(ROOT, SLOW, false, b"never");
        tree.add(ROOT, LATE, false, b"");
        tree.add(ROOT, SWAP_A, false, SWAP_A_DATA);
        tree.add(ROOT, SWAP_B, false, SWAP_B_DATA);
        let many = tree.add(ROOT, "many", true, b"");
        for idx in 0..25 {
            tree.add(many, &format!("entry{idx:02}"), false, b"x");
        }
        tree
    }

    pub fn add(&mut self, parent: u32, name: &str, dir: bool, data: &[u8]) -> u32 {
        let path = self.next_path;
        self.next_path += 1;
        self.nodes.insert(
            path,
            Node {
                name: name.to_owned(),
                parent,
                dir,
                mode: if dir { CHDIR | 0o775 } else { 0o664 },
                uid: "glenda".to_owned(),
                gid: "glenda".to_owned(),
                mtime: MTIME,
                version: 0,
                data: data.to_vec(),
                children: Vec::new(),
            },
        );
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(path);
        }
        path
    }

    pub fn lookup(&self, path: &[&str]) -> Option<&Node> {
        let mut at = ROOT;
        for name in path {
            at = self.child(at, name)?;
        }
        self.nodes.get(&at)
    }

    fn child(&self, dir: u32, name: &str) -> Option<u32> {
        if name == ".." {
            return self.nodes.get(&dir).map(|node| node.parent);
        }
        self.nodes
            .get(&dir)?
            .children
            .iter()
            .copied()
            .find(|path| self.nodes.get(path).is_some_and(|node| node.name == name))
    }

    fn fid_name(&self, fid: u16) -> Option<&str> {
        let path = self.fids.get(&fid)?;
        self.nodes.get(path).map(|node| node.name.as_str())
    }

    fn qid(&self, path: u32) -> legacy::Qid {
        let node = &self.nodes[&path];
        let bits = if node.dir { path | CHDIR } else { path };
        legacy::Qid::new(bits, node.version)
    }

    fn dir(&self, path: u32) -> Dir {
        let node = &self.nodes[&path];
        Dir {
            name: node.name.clone(),
            uid: node.uid.clone(),
            gid: node.gid.clone(),
            qid: self.qid(path),
            mode: node.mode,
            atime: node.mtime,
            mtime: node.mtime,
            length: node.data.len() as u64,
            ty: u16::from(b'M'),
            dev: 0,
        }
    }
}

/// Fake 9P1 file server on one end of a socket pair.
pub struct LegacyServer {
    pub tree: Arc<Mutex<Tree>>,
    socket: UnixStream,
    thread: Option<JoinHandle<()>>,
}

impl LegacyServer {
    fn start(socket: UnixStream) -> Self {
        let tree = Arc::new(Mutex::new(Tree::new()));
        let state = Arc::clone(&tree);
        let reader = socket.try_clone().expect("clone legacy socket");
        let writer = socket.try_clone().expect("clone legacy socket");
        let thread = thread::spawn(move || serve_legacy(state, reader, writer));
        Self {
            tree,
            socket,
            thread: Some(thread),
        }
    }

    /// Close the legacy connection as a crashed server would.
    pub fn hang_up(&mut self) {
        let _ = self.socket.shutdown(Shutdown::Both);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn requests(&self) -> Vec<legacy::RequestBody> {
        self.tree.lock().expect("tree lock").requests.clone()
    }

    pub fn open_fids(&self) -> usize {
        self.tree.lock().expect("tree lock").fids.len()
    }
}

impl Drop for LegacyServer {
    fn drop(&mut self) {
        let _ = self.socket.shutdown(Shutdown::Both);
    }
}

fn serve_legacy(tree: Arc<Mutex<Tree>>, mut reader: UnixStream, mut writer: UnixStream) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut held: HashSet<u16> = HashSet::new();
    let mut late: HashMap<u16, u16> = HashMap::new();
    let mut parked: Option<legacy::Response> = None;
    loop {
        let len = match frame_len(&buffer) {
            Ok(Some(len)) => len,
            Ok(None) => match reader.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    continue;
                }
            },
            Err(_) => return,
        };
        let rest = buffer.split_off(len);
        let frame = std::mem::replace(&mut buffer, rest);
        let Ok(request) = decode_request(&frame) else {
            return;
        };
        let mut replies = Vec::new();
        {
            let mut tree = tree.lock().expect("tree lock");
            tree.requests.push(request.body.clone());
            match &request.body {
                legacy::RequestBody::Flush { oldtag } => {
                    held.remove(oldtag);
                    if parked.as_ref().is_some_and(|reply| reply.tag == *oldtag) {
                        parked = None;
                    }
                    if let Some(fid) = late.remove(oldtag) {
                        replies.push(legacy::Response {
                            tag: *oldtag,
                            body: legacy::ResponseBody::Read {
                                fid,
                                data: LATE_DATA.to_vec(),
                            },
                        });
                    }
                    replies.push(legacy::Response {
                        tag: request.tag,
                        body: legacy::ResponseBody::Flush,
                    });
                }
                legacy::RequestBody::Read { fid, .. }
                    if matches!(tree.fid_name(*fid), Some(SLOW | LATE)) =>
                {
                    if tree.fid_name(*fid) == Some(SLOW) {
                        held.insert(request.tag);
                    } else {
                        late.insert(request.tag, *fid);
                    }
                }
                legacy::RequestBody::Read { fid, .. } if tree.fid_name(*fid) == Some(SWAP_A) => {
                    parked = Some(legacy::Response {
                        tag: request.tag,
                        body: answer(&mut tree, &request.body),
                    });
                }
                legacy::RequestBody::Read { fid, .. } if tree.fid_name(*fid) == Some(SWAP_B) => {
                    replies.push(legacy::Response {
                        tag: request.tag,
                        body: answer(&mut tree, &request.body),
                    });
                    replies.extend(parked.take());
                }
                body => replies.push(legacy::Response {
                    tag: request.tag,
                    body: answer(&mut tree, body),
                }),
            }
        }
        for reply in replies {
            let bytes = encode_response(&reply).expect("encode legacy reply");
            if writer.write_all(&bytes).is_err() {
                return;
            }
        }
    }
}

fn answer(tree: &mut Tree, body: &legacy::RequestBody) -> legacy::ResponseBody {
    use legacy::RequestBody as T;
    use legacy::ResponseBody as R;

    match body {
        T::Attach {
            fid, uname, aname, ..
        } => {
            if tree.fids.contains_key(fid) {
                return R::error("fid already in use");
            }
            tree.attach_names.push(format!("{uname}:{aname}"));
            tree.fids.insert(*fid, ROOT);
            R::Attach {
                fid: *fid,
                qid: tree.qid(ROOT),
                rauth: [0; legacy::AUTHENTLEN],
            }
        }
        T::Clone { fid, newfid } => {
            let Some(path) = tree.fids.get(fid).copied() else {
                return R::error("unknown fid");
            };
            if tree.fids.contains_key(newfid) {
                return R::error("fid already in use");
            }
            tree.fids.insert(*newfid, path);
            R::Clone { fid: *fid }
        }
        T::Walk { fid, name } => {
            let Some(path) = tree.fids.get(fid).copied() else {
                return R::error("unknown fid");
            };
            match tree.child(path, name) {
                Some(next) => {
                    tree.fids.insert(*fid, next);
                    R::Walk {
                        fid: *fid,
                        qid: tree.qid(next),
                    }
                }
                None => R::error("file does not exist"),
            }
        }
        T::Open { fid, .. } => match tree.fids.get(fid).copied() {
            Some(path) => R::Open {
                fid: *fid,
                qid: tree.qid(path),
            },
            None => R::error("unknown fid"),
        },
        T::Create {
            fid, name, perm, ..
        } => {
            let Some(path) = tree.fids.get(fid).copied() else {
                return R::error("unknown fid");
            };
            if tree.child(path, name).is_some() {
                return R::error("file already exists");
            }
            let created = tree.add(path, name, perm & CHDIR != 0, b"");
            tree.fids.insert(*fid, created);
            R::Create {
                fid: *fid,
                qid: tree.qid(created),
            }
        }
        T::Read { fid, offset, count } => {
            let Some(path) = tree.fids.get(fid).copied() else {
                return R::error("unknown fid");
            };
            let node = &tree.nodes[&path];
            let data = if node.dir {
                let first = *offset as usize / DIRLEN;
                let mut out = Vec::new();
                for child in node.children.iter().skip(first).take(*count as usize / DIRLEN) {
                    encode_dir(&tree.dir(*child), &mut out).expect("encode dir");
                }
                out
            } else {
                let start = (*offset as usize).min(node.data.len());
                let end = (start + *count as usize).min(node.data.len());
                node.data[start..end].to_vec()
            };
            R::Read { fid: *fid, data }
        }
        T::Write { fid, offset, data } => {
            let Some(path) = tree.fids.get(fid).copied() else {
                return R::error("unknown fid");
            };
            let node = tree.nodes.get_mut(&path).expect("node");
            let start = *offset as usize;
            if node.data.len() < start + data.len() {
                node.data.resize(start + data.len(), 0);
            }
            node.data[start..start + data.len()].copy_from_slice(data);
            node.version += 1;
            R::Write {
                fid: *fid,
                count: data.len() as u16,
            }
        }
        T::Clunk { fid } => match tree.fids.remove(fid) {
            Some(_) => R::Clunk { fid: *fid },
            None => R::error("unknown fid"),
        },
        T::Remove { fid } => {
            let Some(path) = tree.fids.remove(fid) else {
                return R::error("unknown fid");
            };
            let Some(node) = tree.nodes.remove(&path) else {
                return R::error("file does not exist");
            };
            if let Some(parent) = tree.nodes.get_mut(&node.parent) {
                parent.children.retain(|child| *child != path);
            }
            R::Remove { fid: *fid }
        }
        T::Stat { fid } => match tree.fids.get(fid).copied() {
            Some(path) => R::Stat {
                fid: *fid,
                stat: tree.dir(path),
            },
            None => R::error("unknown fid"),
        },
        T::Wstat { fid, stat } => {
            let Some(path) = tree.fids.get(fid).copied() else {
                return R::error("unknown fid");
            };
            let node = tree.nodes.get_mut(&path).expect("node");
            node.name = stat.name.clone();
            node.uid = stat.uid.clone();
            node.gid = stat.gid.clone();
            node.mode = stat.mode;
            node.mtime = stat.mtime;
            node.data.resize(stat.length as usize, 0);
            R::Wstat { fid: *fid }
        }
        T::Flush { .. } => R::Flush,
    }
}

/// 9P2000 client end of the downstream connection.
pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub fn send(&mut self, tag: u16, body: RequestBody) {
        let bytes = encode_request(&Request { tag, body }).expect("encode request");
        self.send_raw(&bytes);
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        write_frame(&mut self.stream, bytes).expect("write request");
    }

    pub fn recv(&mut self) -> Response {
        let frame = read_frame(&mut self.stream, MAX_MSIZE)
            .expect("read response")
            .expect("gateway closed the connection");
        decode_response(&frame).expect("decode response")
    }

    pub fn rpc(&mut self, tag: u16, body: RequestBody) -> ResponseBody {
        self.send(tag, body);
        let response = self.recv();
        assert_eq!(response.tag, tag, "response tag");
        response.body
    }

    /// Negotiate the protocol and attach `fid` to the root.
    pub fn attach(&mut self, fid: u32) {
        let reply = self.rpc(
            1,
            RequestBody::Version {
                msize: MAX_MSIZE,
                version: "9P2000".to_owned(),
            },
        );
        assert!(matches!(reply, ResponseBody::Version { .. }), "{reply:?}");
        let reply = self.rpc(
            1,
            RequestBody::Attach {
                fid,
                afid: NOFID,
                uname: "glenda".to_owned(),
                aname: String::new(),
            },
        );
        assert!(matches!(reply, ResponseBody::Attach { .. }), "{reply:?}");
    }

    pub fn walk(&mut self, fid: u32, newfid: u32, names: &[&str]) -> ResponseBody {
        self.rpc(
            2,
            RequestBody::Walk {
                fid,
                newfid,
                wnames: names.iter().map(|name| (*name).to_owned()).collect(),
            },
        )
    }

    /// Close the client side of the connection.
    pub fn hang_up(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Gateway wired to a fake legacy server and a test client.
pub struct Harness {
    pub client: Client,
    pub legacy: LegacyServer,
    gateway: JoinHandle<Result<(), BridgeError>>,
}

impl Harness {
    pub fn start() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let (client_end, gateway_client) = UnixStream::pair().expect("client pair");
        let (legacy_end, gateway_legacy) = UnixStream::pair().expect("legacy pair");
        client_end
            .set_read_timeout(Some(Duration::from_secs(10)))
            .expect("client timeout");
        let legacy = LegacyServer::start(legacy_end);

        let client_in = gateway_client.try_clone().expect("clone client end");
        let legacy_in = gateway_legacy.try_clone().expect("clone legacy end");
        let gateway = thread::spawn(move || {
            Gateway::new(config).serve(client_in, gateway_client, legacy_in, gateway_legacy)
        });
        Self {
            client: Client { stream: client_end },
            legacy,
            gateway,
        }
    }

    /// Wait for the gateway to stop and return its outcome.
    pub fn finish(self) -> Result<(), BridgeError> {
        self.gateway.join().expect("gateway thread panicked")
    }
}

pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        user: "glenda".to_owned(),
        msize: MAX_MSIZE,
        legacy_framing: Framing::Stream,
        debug: false,
    }
}

/// Wait until the fake server's request log satisfies `seen`.
pub fn wait_for<F>(legacy: &LegacyServer, seen: F)
where
    F: Fn(&[legacy::RequestBody]) -> bool,
{
    for _ in 0..500 {
        if seen(&legacy.requests()) {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("legacy server saw {:?}", legacy.requests());
}
