// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Fuzz-style regression tests for 9P1 decoding and stream framing.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::panic::{catch_unwind, AssertUnwindSafe};

use ninep1_codec::{
    frame_len, Codec, Dir, Qid, Request, RequestBody, Response, ResponseBody, CHDIR, MAXFDATA,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn fuzz_decode_mutated_messages() {
    let iterations = std::env::var("NINEP1_FUZZ_ITERS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(512);
    let mut rng = StdRng::seed_from_u64(0x0009_0001_u64);
    let codec = Codec;

    for _ in 0..iterations {
        let mut frame = codec.encode_response(&random_response(&mut rng)).unwrap();
        mutate(&mut rng, &mut frame);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _ = frame_len(&frame);
            codec.decode_response(&frame)
        }));
        assert!(result.is_ok(), "response decoder panicked on mutated message");
    }

    for _ in 0..iterations {
        let mut frame = codec.encode_request(&random_request(&mut rng)).unwrap();
        mutate(&mut rng, &mut frame);
        let result = catch_unwind(AssertUnwindSafe(|| codec.decode_request(&frame)));
        assert!(result.is_ok(), "request decoder panicked on mutated message");
    }
}

#[test]
fn concatenated_stream_splits_on_layouts() {
    let mut rng = StdRng::seed_from_u64(0x5151);
    let responses: Vec<Response> = (0..64).map(|_| random_response(&mut rng)).collect();
    let mut stream = Vec::new();
    for response in &responses {
        stream.extend_from_slice(&Codec.encode_response(response).unwrap());
    }

    let mut decoded = Vec::new();
    let mut rest = stream.as_slice();
    while let Some(len) = frame_len(rest).unwrap() {
        decoded.push(Codec.decode_response(&rest[..len]).unwrap());
        rest = &rest[len..];
    }
    assert!(rest.is_empty());
    assert_eq!(decoded, responses);
}

fn mutate<R: Rng>(rng: &mut R, frame: &mut Vec<u8>) {
    match rng.random_range(0..3) {
        0 => {
            let new_len = rng.random_range(0..frame.len());
            frame.truncate(new_len);
        }
        1 => {
            let mut tail = vec![0u8; rng.random_range(1..16)];
            rng.fill_bytes(&mut tail);
            frame.extend_from_slice(&tail);
        }
        _ => {
            let idx = rng.random_range(0..frame.len());
            frame[idx] = rng.random();
        }
    }
}

fn random_name<R: Rng>(rng: &mut R) -> String {
    let len = rng.random_range(0..12);
    (0..len)
        .map(|_| char::from(b'a' + rng.random_range(0..26u8)))
        .collect()
}

fn random_qid<R: Rng>(rng: &mut R) -> Qid {
    let dir = if rng.random_bool(0.3) { CHDIR } else { 0 };
    Qid::new(dir | rng.random_range(0..0x1000), rng.random())
}

fn random_dir<R: Rng>(rng: &mut R) -> Dir {
    Dir {
        name: random_name(rng),
        uid: random_name(rng),
        gid: random_name(rng),
        qid: random_qid(rng),
        mode: rng.random(),
        atime: rng.random(),
        mtime: rng.random(),
        length: rng.random(),
        ty: rng.random(),
        dev: rng.random(),
    }
}

fn random_request<R: Rng>(rng: &mut R) -> Request {
    let tag = rng.random();
    let fid = rng.random();
    let body = match rng.random_range(0..5) {
        0 => RequestBody::Walk {
            fid,
            name: random_name(rng),
        },
        1 => RequestBody::Read {
            fid,
            offset: rng.random(),
            count: rng.random_range(0..=MAXFDATA as u16),
        },
        2 => {
            let mut data = vec![0u8; rng.random_range(0..64)];
            rng.fill_bytes(&mut data);
            RequestBody::Write {
                fid,
                offset: rng.random(),
                data,
            }
        }
        3 => RequestBody::Wstat {
            fid,
            stat: random_dir(rng),
        },
        _ => RequestBody::Clone {
            fid,
            newfid: rng.random(),
        },
    };
    Request { tag, body }
}

fn random_response<R: Rng>(rng: &mut R) -> Response {
    let tag = rng.random();
    let fid = rng.random();
    let body = match rng.random_range(0..6) {
        0 => ResponseBody::error(random_name(rng)),
        1 => ResponseBody::Walk {
            fid,
            qid: random_qid(rng),
        },
        2 => {
            let mut data = vec![0u8; rng.random_range(0..300)];
            rng.fill_bytes(&mut data);
            ResponseBody::Read { fid, data }
        }
        3 => ResponseBody::Stat {
            fid,
            stat: random_dir(rng),
        },
        4 => ResponseBody::Flush,
        _ => ResponseBody::Clunk { fid },
    };
    Response { tag, body }
}
