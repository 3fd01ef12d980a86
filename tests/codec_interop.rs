//! Cross-checks of the CoAP codec against coap-lite

use std::net::SocketAddr;

use coap_lite::{
    CoapOption as LiteOption, CoapRequest, ContentFormat, MessageClass,
    MessageType as LiteType, Packet, RequestType, ResponseType,
};
use coapum_ingest::{
    message::option,
    test_utils::{create_post, temp_sensor_payload},
    CoapMessage, MessageCode, MessageType, ResponseBuilder,
};

fn lite_post(path: &str, message_id: u16, token: &[u8], payload: Vec<u8>) -> Vec<u8> {
    let mut request: CoapRequest<SocketAddr> = CoapRequest::new();
    request.set_method(RequestType::Post);
    request.set_path(path);
    request.message.header.set_type(LiteType::Confirmable);
    request.message.header.message_id = message_id;
    request.message.set_token(token.to_vec());
    request
        .message
        .set_content_format(ContentFormat::ApplicationCBOR);
    request.message.payload = payload;
    request.message.to_bytes().unwrap()
}

#[test]
fn test_decodes_coap_lite_request() {
    let bytes = lite_post("api/v1/sensors", 0x5150, &[1, 2, 3, 4], temp_sensor_payload());
    let message = CoapMessage::decode(&bytes).unwrap();

    assert_eq!(message.message_type, MessageType::Confirmable);
    assert_eq!(message.code, MessageCode::POST);
    assert_eq!(message.message_id, 0x5150);
    assert_eq!(message.token, vec![1, 2, 3, 4]);
    assert_eq!(
        message.uri_path(),
        vec![&b"api"[..], &b"v1"[..], &b"sensors"[..]]
    );
    assert_eq!(message.content_format(), Some(Some(60)));
    assert_eq!(message.payload, temp_sensor_payload());

    // Re-encoding keeps the meaning even if option widths differ
    let reparsed = Packet::from_bytes(&message.encode().unwrap()).unwrap();
    assert_eq!(reparsed.header.message_id, 0x5150);
    assert_eq!(reparsed.payload, temp_sensor_payload());
}

#[test]
fn test_coap_lite_decodes_our_request() {
    let mut message = create_post("sensor-values/batch", 77, temp_sensor_payload());
    // Long value and a large delta exercise both extended forms
    message.add_option(option::URI_QUERY, vec![b'q'; 300]);
    message.add_option(2048, vec![0x01]);

    let packet = Packet::from_bytes(&message.encode().unwrap()).unwrap();
    assert_eq!(packet.header.get_type(), LiteType::Confirmable);
    assert_eq!(packet.header.code, MessageClass::Request(RequestType::Post));
    assert_eq!(packet.header.message_id, 77);
    assert_eq!(packet.get_token(), message.token.as_slice());
    assert_eq!(packet.get_content_format(), Some(ContentFormat::ApplicationCBOR));
    assert_eq!(
        packet
            .get_option(LiteOption::UriQuery)
            .and_then(|values| values.front())
            .map(Vec::len),
        Some(300)
    );
    assert_eq!(
        packet
            .get_option(LiteOption::Unknown(2048))
            .and_then(|values| values.front()),
        Some(&vec![0x01])
    );
    assert_eq!(packet.payload, temp_sensor_payload());

    let request = CoapRequest::from_packet(packet, "127.0.0.1:5683".parse::<SocketAddr>().unwrap());
    assert_eq!(request.get_path(), "sensor-values/batch");
}

#[test]
fn test_coap_lite_decodes_our_responses() {
    let request = CoapMessage::decode(&lite_post("sensors", 9, &[0xaa], vec![0xa0])).unwrap();
    let mut builder = ResponseBuilder::new();

    let ack = builder.build(&request, MessageCode::CHANGED);
    let packet = Packet::from_bytes(&ack.encode().unwrap()).unwrap();
    assert_eq!(packet.header.get_type(), LiteType::Acknowledgement);
    assert_eq!(packet.header.code, MessageClass::Response(ResponseType::Changed));
    assert_eq!(packet.header.message_id, 9);
    assert_eq!(packet.get_token(), &[0xaa]);
    assert!(packet.payload.is_empty());

    for (code, expected) in [
        (MessageCode::BAD_REQUEST, ResponseType::BadRequest),
        (MessageCode::NOT_FOUND, ResponseType::NotFound),
        (MessageCode::METHOD_NOT_ALLOWED, ResponseType::MethodNotAllowed),
        (
            MessageCode::UNSUPPORTED_CONTENT_FORMAT,
            ResponseType::UnsupportedContentFormat,
        ),
        (MessageCode::SERVICE_UNAVAILABLE, ResponseType::ServiceUnavailable),
    ] {
        let response = builder.build(&request, code);
        let packet = Packet::from_bytes(&response.encode().unwrap()).unwrap();
        assert_eq!(packet.header.code, MessageClass::Response(expected));
    }
}

#[test]
fn test_decodes_coap_lite_empty_and_reset() {
    let mut ping = Packet::new();
    ping.header.set_type(LiteType::Confirmable);
    ping.header.code = MessageClass::Empty;
    ping.header.message_id = 3;

    let message = CoapMessage::decode(&ping.to_bytes().unwrap()).unwrap();
    assert!(message.code.is_empty());
    assert_eq!(message.message_type, MessageType::Confirmable);

    let reset = ResponseBuilder::new().reset(&message);
    let packet = Packet::from_bytes(&reset.encode().unwrap()).unwrap();
    assert_eq!(packet.header.get_type(), LiteType::Reset);
    assert_eq!(packet.header.code, MessageClass::Empty);
    assert_eq!(packet.header.message_id, 3);
}
