//! Response construction
//!
//! A Confirmable request is answered with a piggybacked ACK echoing the
//! request's message ID. A Non-confirmable request gets a Non-confirmable
//! response with a fresh message ID. Either way the token is echoed and no
//! payload is attached.

use crate::message::{CoapMessage, MessageCode, MessageType};

#[derive(Debug)]
pub struct ResponseBuilder {
    next_message_id: u16,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuilder {
    /// Message IDs start at a random point
    pub fn new() -> Self {
        Self::starting_at(rand::random::<u16>())
    }

    pub fn starting_at(message_id: u16) -> Self {
        Self {
            next_message_id: message_id,
        }
    }

    pub fn build(&mut self, request: &CoapMessage, code: MessageCode) -> CoapMessage {
        let (message_type, message_id) = match request.message_type {
            MessageType::Confirmable => (MessageType::Acknowledgement, request.message_id),
            _ => (MessageType::NonConfirmable, self.next_message_id()),
        };

        let mut response = CoapMessage::new(message_type, code, message_id);
        response.token = request.token.clone();
        response
    }

    /// Reset for a Confirmable message that cannot be processed
    pub fn reset(&self, request: &CoapMessage) -> CoapMessage {
        CoapMessage::new(MessageType::Reset, MessageCode::EMPTY, request.message_id)
    }

    fn next_message_id(&mut self) -> u16 {
        let id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        id
    }
}
