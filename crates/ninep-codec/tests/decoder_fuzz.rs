// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Fuzz-style regression tests for the 9P2000 decoder.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::panic::{catch_unwind, AssertUnwindSafe};

use ninep_codec::{
    Codec, DirEntries, Qid, QidType, Request, RequestBody, Response, ResponseBody, Stat, NOFID,
};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

#[test]
fn fuzz_decode_mutated_frames() {
    let iterations = std::env::var("NINEP_FUZZ_ITERS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(512);
    let mut rng = StdRng::seed_from_u64(0x9200_0009_u64);
    let codec = Codec;

    for _ in 0..iterations {
        let mut frame = codec.encode_request(&random_request(&mut rng)).unwrap();
        mutate_frame(&mut rng, &mut frame);
        let result = catch_unwind(AssertUnwindSafe(|| codec.decode_request(&frame)));
        assert!(result.is_ok(), "request decoder panicked on mutated frame");
    }

    for _ in 0..iterations {
        let mut frame = codec.encode_response(&random_response(&mut rng)).unwrap();
        mutate_frame(&mut rng, &mut frame);
        let result = catch_unwind(AssertUnwindSafe(|| codec.decode_response(&frame)));
        assert!(result.is_ok(), "response decoder panicked on mutated frame");
    }
}

#[test]
fn fuzz_dir_entries_never_panic() {
    let mut rng = StdRng::seed_from_u64(0x5747_u64);
    for _ in 0..256 {
        let mut buf = vec![0u8; rng.random_range(0..200)];
        rng.fill_bytes(&mut buf);
        let result = catch_unwind(AssertUnwindSafe(|| DirEntries::new(&buf).count()));
        assert!(result.is_ok(), "dir iterator panicked on random bytes");
    }
}

#[test]
fn stat_messages_survive_the_wire() {
    let mut rng = StdRng::seed_from_u64(7);
    let stat = random_stat(&mut rng);
    let request = Request {
        tag: 3,
        body: RequestBody::Wstat {
            fid: 11,
            stat: stat.clone(),
        },
    };
    let frame = Codec.encode_request(&request).unwrap();
    assert_eq!(Codec.decode_request(&frame).unwrap(), request);
}

fn mutate_frame<R: Rng>(rng: &mut R, frame: &mut Vec<u8>) {
    if frame.len() < 5 {
        return;
    }
    match rng.random_range(0..3) {
        0 => {
            let declared: u32 = rng.random();
            frame[0..4].copy_from_slice(&declared.to_le_bytes());
        }
        1 => {
            if frame.len() > 6 {
                let new_len = rng.random_range(5..frame.len());
                frame.truncate(new_len);
                if rng.random_bool(0.5) {
                    frame[0..4].copy_from_slice(&(new_len as u32).to_le_bytes());
                }
            }
        }
        _ => {
            let tail_len = rng.random_range(1..16);
            let mut tail = vec![0u8; tail_len];
            rng.fill_bytes(&mut tail);
            frame.extend_from_slice(&tail);
            if rng.random_bool(0.5) {
                let declared = frame.len() as u32;
                frame[0..4].copy_from_slice(&declared.to_le_bytes());
            }
        }
    }

    if rng.random_bool(0.5) {
        frame[4] ^= rng.random_range(1..=0x1F);
    }
}

fn random_request<R: Rng>(rng: &mut R) -> Request {
    let tag = rng.random();
    match rng.random_range(0..7) {
        0 => Request {
            tag,
            body: RequestBody::Version {
                msize: rng.random_range(256..=8216),
                version: "9P2000".to_owned(),
            },
        },
        1 => Request {
            tag,
            body: RequestBody::Attach {
                fid: rng.random(),
                afid: NOFID,
                uname: random_atom(rng, 6),
                aname: random_atom(rng, 4),
            },
        },
        2 => Request {
            tag,
            body: RequestBody::Walk {
                fid: rng.random(),
                newfid: rng.random(),
                wnames: (0..rng.random_range(0..4))
                    .map(|_| random_atom(rng, 5))
                    .collect(),
            },
        },
        3 => Request {
            tag,
            body: RequestBody::Create {
                fid: rng.random(),
                name: random_atom(rng, 8),
                perm: rng.random(),
                mode: rng.random_range(0..4),
            },
        },
        4 => Request {
            tag,
            body: RequestBody::Read {
                fid: rng.random(),
                offset: rng.random(),
                count: rng.random_range(0..8192),
            },
        },
        5 => Request {
            tag,
            body: RequestBody::Wstat {
                fid: rng.random(),
                stat: random_stat(rng),
            },
        },
        _ => {
            let mut data = vec![0u8; rng.random_range(0..64)];
            rng.fill_bytes(&mut data);
            Request {
                tag,
                body: RequestBody::Write {
                    fid: rng.random(),
                    offset: rng.random(),
                    data,
                },
            }
        }
    }
}

fn random_response<R: Rng>(rng: &mut R) -> Response {
    let tag = rng.random();
    match rng.random_range(0..6) {
        0 => Response {
            tag,
            body: ResponseBody::Version {
                msize: rng.random_range(256..=8216),
                version: "9P2000".to_owned(),
            },
        },
        1 => Response {
            tag,
            body: ResponseBody::Walk {
                qids: (0..rng.random_range(0..4))
                    .map(|_| random_qid(rng))
                    .collect(),
            },
        },
        2 => Response {
            tag,
            body: ResponseBody::Open {
                qid: random_qid(rng),
                iounit: 0,
            },
        },
        3 => Response {
            tag,
            body: ResponseBody::Read {
                data: {
                    let mut buf = vec![0u8; rng.random_range(0..64)];
                    rng.fill_bytes(&mut buf);
                    buf
                },
            },
        },
        4 => Response {
            tag,
            body: ResponseBody::Stat {
                stat: random_stat(rng),
            },
        },
        _ => Response {
            tag,
            body: ResponseBody::error(random_atom(rng, 12)),
        },
    }
}

fn random_atom<R: Rng>(rng: &mut R, max_len: usize) -> String {
    let len = rng.random_range(1..=max_len.max(1));
    (0..len)
        .map(|_| {
            const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
            let idx = rng.random_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

fn random_qid<R: Rng>(rng: &mut R) -> Qid {
    let ty = if rng.random_bool(0.5) {
        QidType::DIR
    } else {
        QidType::FILE
    };
    Qid::new(ty, rng.random(), rng.random())
}

fn random_stat<R: Rng>(rng: &mut R) -> Stat {
    Stat {
        ty: rng.random(),
        dev: rng.random(),
        qid: random_qid(rng),
        mode: rng.random(),
        atime: rng.random(),
        mtime: rng.random(),
        length: rng.random(),
        name: random_atom(rng, 10),
        uid: random_atom(rng, 6),
        gid: random_atom(rng, 6),
        muid: random_atom(rng, 6),
    }
}
