#![no_main]

use coapum_ingest::{
    test_utils::{create_post, create_test_request, loopback_config},
    IngestService, MemoryIngest, MessageCode,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let service = IngestService::new(&loopback_config("sensors"), MemoryIngest::new());
    let request = create_test_request(create_post("sensors", 1, data.to_vec()));

    let code = service.handle(&request);
    assert!(
        code == MessageCode::CHANGED || code == MessageCode::BAD_REQUEST,
        "unexpected code {}",
        code
    );
    assert_eq!(code == MessageCode::CHANGED, service.ingest().batches() == 1);
});
