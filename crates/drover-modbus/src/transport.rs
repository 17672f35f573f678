// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tagged transport abstraction.
//!
//! A [`TagTransport`] accepts batches of tagged reads and writes, where each
//! tag names a [`TagAddress`] in the `category:address[count]` grammar, and
//! answers with per-tag response codes plus typed value accessors. The
//! connection manager is written entirely against this trait; the bundled
//! tokio-modbus implementation lives in [`tcp`](crate::tcp).
//!
//! Register words cross this boundary as *signed* 16-bit values, matching
//! the wire representation. The connection manager exposes them as `u16`.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use drover_core::address::TagAddress;
use drover_core::error::ClientResult;

// =============================================================================
// ResponseCode
// =============================================================================

/// Per-tag outcome of a read or write item.
///
/// Anything other than [`Ok`](ResponseCode::Ok) is surfaced by the connection
/// manager as a protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// The item succeeded.
    Ok,
    /// The addressed object does not exist on the device.
    InvalidAddress,
    /// The value was rejected by the device.
    InvalidData,
    /// The device does not support the requested function.
    Unsupported,
    /// The device is busy; the request may be retried.
    RemoteBusy,
    /// The device reported an internal failure.
    RemoteError,
    /// The target device behind a gateway did not respond.
    NotFound,
    /// The driver rejected the request before it reached the wire.
    InternalError,
}

impl ResponseCode {
    /// Returns `true` for a successful item.
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseCode::Ok)
    }

    /// Returns the code name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseCode::Ok => "OK",
            ResponseCode::InvalidAddress => "INVALID_ADDRESS",
            ResponseCode::InvalidData => "INVALID_DATA",
            ResponseCode::Unsupported => "UNSUPPORTED",
            ResponseCode::RemoteBusy => "REMOTE_BUSY",
            ResponseCode::RemoteError => "REMOTE_ERROR",
            ResponseCode::NotFound => "NOT_FOUND",
            ResponseCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// TagValues
// =============================================================================

/// Raw values carried for one tag.
///
/// Words are the signed 16-bit values seen on the wire; unsigned decoding is
/// the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValues {
    /// Coil / discrete-input bits.
    Bits(Vec<bool>),
    /// Register words.
    Words(Vec<i16>),
}

impl TagValues {
    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        match self {
            TagValues::Bits(v) => v.len(),
            TagValues::Words(v) => v.len(),
        }
    }

    /// Returns `true` when no elements are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Read Request / Response
// =============================================================================

/// A batch of tagged reads.
#[derive(Debug, Clone, Default)]
pub struct ReadRequest {
    items: Vec<(String, TagAddress)>,
}

impl ReadRequest {
    /// Starts building a read request.
    pub fn builder() -> ReadRequestBuilder {
        ReadRequestBuilder::default()
    }

    /// Returns the request items in insertion order.
    pub fn items(&self) -> &[(String, TagAddress)] {
        &self.items
    }
}

/// Builder for [`ReadRequest`].
#[derive(Debug, Default)]
pub struct ReadRequestBuilder {
    items: Vec<(String, TagAddress)>,
}

impl ReadRequestBuilder {
    /// Adds a tagged address to read.
    pub fn tag(mut self, name: impl Into<String>, address: TagAddress) -> Self {
        self.items.push((name.into(), address));
        self
    }

    /// Finishes the request.
    pub fn build(self) -> ReadRequest {
        ReadRequest { items: self.items }
    }
}

/// Result for one read tag.
#[derive(Debug, Clone)]
pub struct TagReadResult {
    /// Outcome of the item.
    pub code: ResponseCode,
    /// Values, present when the item succeeded.
    pub values: Option<TagValues>,
}

impl TagReadResult {
    /// A successful item carrying `values`.
    pub fn ok(values: TagValues) -> Self {
        Self {
            code: ResponseCode::Ok,
            values: Some(values),
        }
    }

    /// A failed item with no values.
    pub fn failed(code: ResponseCode) -> Self {
        Self { code, values: None }
    }
}

/// Response to a [`ReadRequest`].
#[derive(Debug, Clone, Default)]
pub struct ReadResponse {
    items: HashMap<String, TagReadResult>,
}

impl ReadResponse {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the result for one tag.
    pub fn insert(&mut self, name: impl Into<String>, result: TagReadResult) {
        self.items.insert(name.into(), result);
    }

    /// Returns the response code for a tag, if the tag was answered.
    pub fn response_code(&self, name: &str) -> Option<ResponseCode> {
        self.items.get(name).map(|r| r.code)
    }

    /// Returns the first bit for a tag.
    pub fn bit(&self, name: &str) -> Option<bool> {
        self.all_bits(name).and_then(|bits| bits.first().copied())
    }

    /// Returns all bits for a tag.
    pub fn all_bits(&self, name: &str) -> Option<&[bool]> {
        match self.items.get(name)?.values.as_ref()? {
            TagValues::Bits(bits) => Some(bits),
            TagValues::Words(_) => None,
        }
    }

    /// Returns the first wire word for a tag.
    pub fn word(&self, name: &str) -> Option<i16> {
        self.all_words(name).and_then(|words| words.first().copied())
    }

    /// Returns all wire words for a tag.
    pub fn all_words(&self, name: &str) -> Option<&[i16]> {
        match self.items.get(name)?.values.as_ref()? {
            TagValues::Words(words) => Some(words),
            TagValues::Bits(_) => None,
        }
    }
}

// =============================================================================
// Write Request / Response
// =============================================================================

/// A batch of tagged writes with the values attached per tag.
#[derive(Debug, Clone, Default)]
pub struct WriteRequest {
    items: Vec<(String, TagAddress, TagValues)>,
}

impl WriteRequest {
    /// Starts building a write request.
    pub fn builder() -> WriteRequestBuilder {
        WriteRequestBuilder::default()
    }

    /// Returns the request items in insertion order.
    pub fn items(&self) -> &[(String, TagAddress, TagValues)] {
        &self.items
    }
}

/// Builder for [`WriteRequest`].
#[derive(Debug, Default)]
pub struct WriteRequestBuilder {
    items: Vec<(String, TagAddress, TagValues)>,
}

impl WriteRequestBuilder {
    /// Adds a tagged address with the values to write.
    pub fn tag(mut self, name: impl Into<String>, address: TagAddress, values: TagValues) -> Self {
        self.items.push((name.into(), address, values));
        self
    }

    /// Finishes the request.
    pub fn build(self) -> WriteRequest {
        WriteRequest { items: self.items }
    }
}

/// Response to a [`WriteRequest`].
#[derive(Debug, Clone, Default)]
pub struct WriteResponse {
    codes: HashMap<String, ResponseCode>,
}

impl WriteResponse {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome for one tag.
    pub fn insert(&mut self, name: impl Into<String>, code: ResponseCode) {
        self.codes.insert(name.into(), code);
    }

    /// Returns the response code for a tag, if the tag was answered.
    pub fn response_code(&self, name: &str) -> Option<ResponseCode> {
        self.codes.get(name).copied()
    }
}

// =============================================================================
// TagTransport Trait
// =============================================================================

/// A connection to one Modbus endpoint, addressed through tag strings.
///
/// Implementations own their I/O state behind interior mutability so that a
/// shared handle can issue requests; the connection manager guarantees the
/// single-writer discipline on the request path.
#[async_trait]
pub trait TagTransport: Send + Sync {
    /// Establishes the connection.
    async fn connect(&self) -> ClientResult<()>;

    /// Returns `true` while the transport considers itself connected.
    fn is_connected(&self) -> bool;

    /// Closes the connection. Idempotent.
    async fn close(&self) -> ClientResult<()>;

    /// Executes a batch of tagged reads.
    async fn read(&self, request: &ReadRequest) -> ClientResult<ReadResponse>;

    /// Executes a batch of tagged writes.
    async fn write(&self, request: &WriteRequest) -> ClientResult<WriteResponse>;

    /// Returns a display name for logging.
    fn display_name(&self) -> String;
}

// =============================================================================
// TransportFactory Trait
// =============================================================================

/// Opens [`TagTransport`]s for connection strings.
///
/// The connection string format is the factory's concern and is passed
/// through verbatim; canonical forms are
/// `modbus:tcp://<host>:<port>?unit-identifier=<n>` and
/// `modbus:rtu-tcp://...`.
pub trait TransportFactory: Send + Sync {
    /// Opens a transport for the given connection string.
    ///
    /// The returned transport is not yet connected.
    fn open(&self, connection_string: &str) -> ClientResult<Box<dyn TagTransport>>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::types::MeasurementCategory;

    #[test]
    fn test_response_code() {
        assert!(ResponseCode::Ok.is_ok());
        assert!(!ResponseCode::InvalidAddress.is_ok());
        assert_eq!(ResponseCode::InvalidAddress.to_string(), "INVALID_ADDRESS");
    }

    #[test]
    fn test_read_request_builder_preserves_order() {
        let request = ReadRequest::builder()
            .tag("a", TagAddress::single(MeasurementCategory::Coil, 1))
            .tag("b", TagAddress::single(MeasurementCategory::Coil, 2))
            .build();

        let names: Vec<_> = request.items().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_read_response_typed_accessors() {
        let mut response = ReadResponse::new();
        response.insert("bits", TagReadResult::ok(TagValues::Bits(vec![true, false])));
        response.insert("words", TagReadResult::ok(TagValues::Words(vec![-1, 42])));
        response.insert("bad", TagReadResult::failed(ResponseCode::InvalidAddress));

        assert_eq!(response.response_code("bits"), Some(ResponseCode::Ok));
        assert_eq!(response.bit("bits"), Some(true));
        assert_eq!(response.all_bits("bits"), Some(&[true, false][..]));
        assert_eq!(response.all_words("bits"), None);

        assert_eq!(response.word("words"), Some(-1));
        assert_eq!(response.all_words("words"), Some(&[-1, 42][..]));

        assert_eq!(
            response.response_code("bad"),
            Some(ResponseCode::InvalidAddress)
        );
        assert_eq!(response.all_bits("bad"), None);
        assert_eq!(response.response_code("missing"), None);
    }

    #[test]
    fn test_write_response() {
        let mut response = WriteResponse::new();
        response.insert("w", ResponseCode::Ok);
        assert_eq!(response.response_code("w"), Some(ResponseCode::Ok));
        assert_eq!(response.response_code("other"), None);
    }

    #[test]
    fn test_tag_values_len() {
        assert_eq!(TagValues::Bits(vec![true]).len(), 1);
        assert_eq!(TagValues::Words(vec![1, 2, 3]).len(), 3);
        assert!(TagValues::Words(vec![]).is_empty());
    }
}
