// Binary framing buffer
//
// The unit of a message's content frame: a growable byte vector with an
// independent write end and read cursor. Primitives are written in the
// sender's native representation; the cluster is assumed homogeneous.

use bytes::{Buf, BufMut};

/// Growable binary frame. Appends go to the write end, consumes advance the
/// read cursor. Reading past the write end is a programmer error and panics.
#[derive(Debug, Default, Clone)]
pub struct BinaryBuffer {
    data: Vec<u8>,
    cursor: usize,
}

impl BinaryBuffer {
    pub fn new() -> BinaryBuffer {
        BinaryBuffer::default()
    }

    pub fn with_capacity(capacity: usize) -> BinaryBuffer {
        BinaryBuffer {
            data: Vec::with_capacity(capacity),
            cursor: 0,
        }
    }

    /// Wrap received frame bytes for reading.
    pub fn from_vec(data: Vec<u8>) -> BinaryBuffer {
        BinaryBuffer { data, cursor: 0 }
    }

    /// Number of bytes written into the buffer. Independent of the cursor.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes between the read cursor and the write end.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// True once the cursor has reached the write end. Pull/push response
    /// streams are self-delimiting: decoding ends exactly here.
    #[inline]
    pub fn read_finished(&self) -> bool {
        self.cursor == self.data.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.data.put_slice(bytes);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.data.put_u32_ne(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.data.put_i32_ne(v);
    }

    pub fn put_u64(&mut self, v: u64) {
        self.data.put_u64_ne(v);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.data.put_i64_ne(v);
    }

    pub fn put_f32(&mut self, v: f32) {
        self.data.put_f32_ne(v);
    }

    pub fn put_f64(&mut self, v: f64) {
        self.data.put_f64_ne(v);
    }

    pub fn get_u32(&mut self) -> u32 {
        self.consume(4).get_u32_ne()
    }

    pub fn get_i32(&mut self) -> i32 {
        self.consume(4).get_i32_ne()
    }

    pub fn get_u64(&mut self) -> u64 {
        self.consume(8).get_u64_ne()
    }

    pub fn get_i64(&mut self) -> i64 {
        self.consume(8).get_i64_ne()
    }

    pub fn get_f32(&mut self) -> f32 {
        self.consume(4).get_f32_ne()
    }

    pub fn get_f64(&mut self) -> f64 {
        self.consume(8).get_f64_ne()
    }

    fn consume(&mut self, n: usize) -> &[u8] {
        assert!(
            self.cursor + n <= self.data.len(),
            "binary buffer read past write end: cursor {} + {} > {}",
            self.cursor,
            n,
            self.data.len()
        );
        let slice = &self.data[self.cursor..self.cursor + n];
        self.cursor += n;
        slice
    }
}
