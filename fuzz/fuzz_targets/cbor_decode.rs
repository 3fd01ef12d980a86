#![no_main]

use coapum_ingest::cbor::{decode_with_limits, encode, DecodeLimits};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let limits = DecodeLimits {
        max_depth: 16,
        max_bytes: 8192,
    };

    let Ok(value) = decode_with_limits(data, limits) else {
        return;
    };

    // Canonical re-encoding decodes to the same tree
    let encoded = encode(&value);
    let reparsed = decode_with_limits(&encoded, DecodeLimits {
        max_depth: 16,
        max_bytes: usize::MAX,
    })
    .expect("re-encoded value decodes");

    // NaN never compares equal, so compare the canonical bytes instead
    assert_eq!(encode(&reparsed), encoded);

    // ciborium accepts everything we produce
    let _: ciborium::value::Value =
        ciborium::de::from_reader(encoded.as_slice()).expect("ciborium reads canonical output");
});
