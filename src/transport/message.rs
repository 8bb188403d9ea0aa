// Wire messages
//
// A message is two sequential framed parts: a fixed-size metadata frame and
// an opaque content frame, transmitted as one atomic unit. Metadata carries
// the correlation id, the dispatch class and the originator's client id.

use crate::buffer::BinaryBuffer;

/// Worker asks for the current value of a set of keys. Content: interleaved
/// (key: u64, placeholder: f32) pairs; the server ignores the placeholder.
pub const WORKER_PULL_REQUEST: i32 = 1;

/// Worker submits averaged gradients. Content: interleaved
/// (key: u64, grad: f32) pairs.
pub const WORKER_PUSH_REQUEST: i32 = 2;

/// A negative class is the response flag; correlation happens purely by
/// message id, so responses share one class.
pub const RESPONSE_CLASS: i32 = -1;

pub const META_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Meta {
    pub message_id: u32,
    pub message_class: i32,
    pub client_id: i32,
}

impl Meta {
    #[inline]
    pub fn is_response(&self) -> bool {
        self.message_class < 0
    }

    pub fn encode(&self) -> BinaryBuffer {
        let mut buf = BinaryBuffer::with_capacity(META_SIZE);
        buf.put_u32(self.message_id);
        buf.put_i32(self.message_class);
        buf.put_i32(self.client_id);
        buf
    }

    /// A metadata frame of any other size is a protocol violation.
    pub fn decode(bytes: &[u8]) -> Meta {
        assert_eq!(bytes.len(), META_SIZE, "malformed metadata frame");
        let mut buf = BinaryBuffer::from_vec(bytes.to_vec());
        Meta {
            message_id: buf.get_u32(),
            message_class: buf.get_i32(),
            client_id: buf.get_i32(),
        }
    }
}

/// A request or response in flight. Responses are requests whose response
/// flag is set and whose message id echoes the originating request's.
#[derive(Debug, Default)]
pub struct Request {
    pub meta: Meta,
    pub cont: BinaryBuffer,
}

impl Request {
    /// A fresh outbound request. The transport assigns the message id and
    /// client id at send time.
    pub fn new(message_class: i32) -> Request {
        Request {
            meta: Meta {
                message_id: 0,
                message_class,
                client_id: -1,
            },
            cont: BinaryBuffer::new(),
        }
    }

    pub fn from_parts(meta: Meta, cont: BinaryBuffer) -> Request {
        Request { meta, cont }
    }

    /// The empty response paired with an inbound request: message id and
    /// client id copied over, content left for the handler to fill.
    pub fn response_to(request: &Request) -> Request {
        Request {
            meta: Meta {
                message_id: request.meta.message_id,
                message_class: RESPONSE_CLASS,
                client_id: request.meta.client_id,
            },
            cont: BinaryBuffer::new(),
        }
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.meta.is_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_roundtrip() {
        let meta = Meta {
            message_id: 42,
            message_class: WORKER_PULL_REQUEST,
            client_id: 3,
        };
        let encoded = meta.encode();
        assert_eq!(encoded.len(), META_SIZE);
        assert_eq!(Meta::decode(encoded.as_slice()), meta);
    }

    #[test]
    fn test_response_inherits_correlation() {
        let mut request = Request::new(WORKER_PUSH_REQUEST);
        request.meta.message_id = 9;
        request.meta.client_id = 2;

        let response = Request::response_to(&request);
        assert!(response.is_response());
        assert_eq!(response.meta.message_id, 9);
        assert_eq!(response.meta.client_id, 2);
        assert!(response.cont.is_empty());
    }

    #[test]
    #[should_panic(expected = "malformed metadata frame")]
    fn test_short_meta_rejected() {
        Meta::decode(&[0u8; 7]);
    }
}
