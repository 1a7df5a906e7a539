//! Decoding arbitrary bytes as manager messages must never panic, and
//! whatever decodes must re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use respol_proto::{ManagerEvent, Registration, Request, codec};

fuzz_target!(|data: &[u8]| {
    if let Ok(event) = codec::decode::<ManagerEvent>(data) {
        let _ = codec::encode(&event);
    }
    let _ = codec::decode::<Request>(data);
    let _ = codec::decode::<Registration>(data);
});
