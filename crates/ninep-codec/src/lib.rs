// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide 9P2000 wire types and codec primitives for the old9p bridge.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! 9P2000 wire types and codec primitives.
//!
//! The codec covers the full 9P2000 message set served by the bridge
//! (version through wstat), the stat structure used by `Rstat`, `Twstat` and
//! directory reads, and a blocking frame reader for byte-stream transports.

mod codec;
mod frame;
mod stat;
mod types;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, frame_tag, Codec,
};
pub use frame::{read_frame, write_frame};
pub use stat::{decode_stat, encode_stat, DirEntries};
pub use types::*;
