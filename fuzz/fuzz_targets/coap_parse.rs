#![no_main]

use coapum_ingest::CoapMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = CoapMessage::decode(data) else {
        return;
    };

    // Whatever parses must re-encode and parse back to the same message
    let encoded = message.encode().expect("decoded message encodes");
    let reparsed = CoapMessage::decode(&encoded).expect("encoded message decodes");
    assert_eq!(reparsed, message);

    // coap-lite agrees on the header fields
    if let Ok(packet) = coap_lite::Packet::from_bytes(data) {
        assert_eq!(packet.header.message_id, message.message_id);
        assert_eq!(packet.get_token(), message.token.as_slice());
        assert_eq!(packet.payload, message.payload);
    }
});
