// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide legacy 9P1 wire types and codec primitives for the old9p bridge.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Legacy 9P1 ("old 9P") wire types and codec primitives.
//!
//! 9P1 messages carry no size prefix: every message is a type byte and a
//! tag followed by fixed-width fields, with variable data only in `Twrite`
//! and `Rread`. [`frame_len`] recovers message boundaries from a byte stream.

mod codec;
mod dir;
mod types;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, frame_len, Codec,
};
pub use dir::{decode_dir, encode_dir};
pub use types::*;
