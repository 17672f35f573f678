// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tagged transport over tokio-modbus.
//!
//! [`ModbusTransportFactory`] opens [`ModbusTcpTransport`]s from connection
//! strings of the form
//!
//! ```text
//! modbus:tcp://<host>:<port>?unit-identifier=<n>
//! modbus:rtu-tcp://<host>:<port>?unit-identifier=<n>
//! ```
//!
//! `tcp` speaks Modbus TCP framing; `rtu-tcp` attaches RTU framing to a TCP
//! stream, for serial gateways that forward raw RTU frames. The port defaults
//! to 502 and the unit identifier to 1. Unknown query parameters are ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::{Context as ModbusContext, Reader, Writer};
use tokio_modbus::prelude::*;
use tokio_modbus::{Error as TokioModbusError, ExceptionCode};

use drover_core::error::{ClientError, ClientResult, ConfigError};
use drover_core::types::MeasurementCategory;

use crate::transport::{
    ReadRequest, ReadResponse, ResponseCode, TagReadResult, TagTransport, TagValues,
    TransportFactory, WriteRequest, WriteResponse,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Connection String
// =============================================================================

/// Framing applied on top of the TCP stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Tcp,
    RtuTcp,
}

/// Parsed form of a `modbus:...` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectionSpec {
    framing: Framing,
    host: String,
    port: u16,
    unit_id: u8,
    raw: String,
}

impl ConnectionSpec {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::invalid_connection_string(raw, message);

        let rest = raw
            .strip_prefix("modbus:")
            .ok_or_else(|| invalid("expected 'modbus:' prefix"))?;
        let (scheme, rest) = rest
            .split_once("://")
            .ok_or_else(|| invalid("expected '<scheme>://<host>'"))?;
        let framing = match scheme {
            "tcp" => Framing::Tcp,
            "rtu-tcp" => Framing::RtuTcp,
            _ => return Err(invalid("scheme must be 'tcp' or 'rtu-tcp'")),
        };

        let (authority, query) = match rest.split_once('?') {
            Some((authority, query)) => (authority, Some(query)),
            None => (rest, None),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| invalid("port must be a 16-bit integer"))?;
                (host, port)
            }
            None => (authority, 502),
        };
        if host.is_empty() {
            return Err(invalid("host must not be empty"));
        }

        let mut unit_id = 1u8;
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| invalid("query parameters must be 'key=value'"))?;
                if key == "unit-identifier" {
                    unit_id = value
                        .parse::<u8>()
                        .map_err(|_| invalid("unit-identifier must be in 0..=255"))?;
                }
            }
        }

        Ok(Self {
            framing,
            host: host.to_string(),
            port,
            unit_id,
            raw: raw.to_string(),
        })
    }
}

// =============================================================================
// ModbusTcpTransport
// =============================================================================

/// A [`TagTransport`] backed by a tokio-modbus client context.
///
/// The context lives behind a mutex; the connection manager's single-writer
/// discipline means the lock is uncontended on the request path.
pub struct ModbusTcpTransport {
    spec: ConnectionSpec,
    inner: Mutex<Option<ModbusContext>>,
    connected: AtomicBool,
}

impl ModbusTcpTransport {
    fn new(spec: ConnectionSpec) -> Self {
        Self {
            spec,
            inner: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Maps a tokio-modbus error to a [`ClientError`], marking the transport
    /// broken for transport-level failures.
    fn map_error(&self, error: TokioModbusError, operation: &str) -> ClientError {
        match error {
            TokioModbusError::Transport(io_error) => {
                self.connected.store(false, Ordering::SeqCst);
                ClientError::transport_with(format!("{} failed: {}", operation, io_error), io_error)
            }
            TokioModbusError::Protocol(protocol_error) => {
                ClientError::protocol(format!("{} failed: {}", operation, protocol_error))
            }
        }
    }

    /// Maps a Modbus exception response to a per-tag response code.
    fn map_exception(exception: ExceptionCode) -> ResponseCode {
        match exception {
            ExceptionCode::IllegalFunction => ResponseCode::Unsupported,
            ExceptionCode::IllegalDataAddress => ResponseCode::InvalidAddress,
            ExceptionCode::IllegalDataValue => ResponseCode::InvalidData,
            ExceptionCode::ServerDeviceFailure => ResponseCode::RemoteError,
            ExceptionCode::Acknowledge => ResponseCode::RemoteBusy,
            ExceptionCode::ServerDeviceBusy => ResponseCode::RemoteBusy,
            ExceptionCode::MemoryParityError => ResponseCode::RemoteError,
            ExceptionCode::GatewayPathUnavailable => ResponseCode::RemoteError,
            ExceptionCode::GatewayTargetDevice => ResponseCode::NotFound,
            _ => ResponseCode::InternalError,
        }
    }
}

#[async_trait]
impl TagTransport for ModbusTcpTransport {
    async fn connect(&self) -> ClientResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let address = (self.spec.host.as_str(), self.spec.port);
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(address))
            .await
            .map_err(|_| {
                ClientError::transport(format!(
                    "Connect to {}:{} timed out",
                    self.spec.host, self.spec.port
                ))
            })?
            .map_err(|e| {
                ClientError::transport_with(
                    format!("Connect to {}:{} failed", self.spec.host, self.spec.port),
                    e,
                )
            })?;
        stream.set_nodelay(true).ok();

        let slave = Slave(self.spec.unit_id);
        let context = match self.spec.framing {
            Framing::Tcp => tcp::attach_slave(stream, slave),
            Framing::RtuTcp => rtu::attach_slave(stream, slave),
        };

        *self.inner.lock().await = Some(context);
        self.connected.store(true, Ordering::SeqCst);

        tracing::info!(
            host = %self.spec.host,
            port = self.spec.port,
            unit_id = self.spec.unit_id,
            "Connected to Modbus device"
        );

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> ClientResult<()> {
        if let Some(mut context) = self.inner.lock().await.take() {
            if let Err(error) = context.disconnect().await {
                tracing::debug!(error = %error, "Error disconnecting from Modbus device");
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, request: &ReadRequest) -> ClientResult<ReadResponse> {
        let mut inner = self.inner.lock().await;
        let context = inner
            .as_mut()
            .ok_or_else(|| ClientError::transport("Transport is not connected"))?;

        let mut response = ReadResponse::new();
        for (name, tag) in request.items() {
            let result = match tag.category() {
                MeasurementCategory::Coil => context
                    .read_coils(tag.address(), tag.count())
                    .await
                    .map_err(|e| self.map_error(e, "read_coils"))?
                    .map(TagValues::Bits),
                MeasurementCategory::DiscreteInput => context
                    .read_discrete_inputs(tag.address(), tag.count())
                    .await
                    .map_err(|e| self.map_error(e, "read_discrete_inputs"))?
                    .map(TagValues::Bits),
                MeasurementCategory::HoldingRegister => context
                    .read_holding_registers(tag.address(), tag.count())
                    .await
                    .map_err(|e| self.map_error(e, "read_holding_registers"))?
                    .map(|words| TagValues::Words(words.iter().map(|w| *w as i16).collect())),
                MeasurementCategory::InputRegister => context
                    .read_input_registers(tag.address(), tag.count())
                    .await
                    .map_err(|e| self.map_error(e, "read_input_registers"))?
                    .map(|words| TagValues::Words(words.iter().map(|w| *w as i16).collect())),
            };

            match result {
                Ok(values) => response.insert(name.clone(), TagReadResult::ok(values)),
                Err(exception) => response.insert(
                    name.clone(),
                    TagReadResult::failed(Self::map_exception(exception)),
                ),
            }
        }

        Ok(response)
    }

    async fn write(&self, request: &WriteRequest) -> ClientResult<WriteResponse> {
        let mut inner = self.inner.lock().await;
        let context = inner
            .as_mut()
            .ok_or_else(|| ClientError::transport("Transport is not connected"))?;

        let mut response = WriteResponse::new();
        for (name, tag, values) in request.items() {
            let result = match (tag.category(), values) {
                (MeasurementCategory::Coil, TagValues::Bits(bits)) => {
                    if bits.len() == 1 {
                        context
                            .write_single_coil(tag.address(), bits[0])
                            .await
                            .map_err(|e| self.map_error(e, "write_single_coil"))?
                    } else {
                        context
                            .write_multiple_coils(tag.address(), bits)
                            .await
                            .map_err(|e| self.map_error(e, "write_multiple_coils"))?
                    }
                }
                (MeasurementCategory::HoldingRegister, TagValues::Words(words)) => {
                    let unsigned: Vec<u16> = words.iter().map(|w| *w as u16).collect();
                    if unsigned.len() == 1 {
                        context
                            .write_single_register(tag.address(), unsigned[0])
                            .await
                            .map_err(|e| self.map_error(e, "write_single_register"))?
                    } else {
                        context
                            .write_multiple_registers(tag.address(), &unsigned)
                            .await
                            .map_err(|e| self.map_error(e, "write_multiple_registers"))?
                    }
                }
                // Read-only categories and mismatched value types never reach
                // the wire.
                _ => {
                    response.insert(name.clone(), ResponseCode::Unsupported);
                    continue;
                }
            };

            match result {
                Ok(()) => response.insert(name.clone(), ResponseCode::Ok),
                Err(exception) => {
                    response.insert(name.clone(), Self::map_exception(exception));
                }
            }
        }

        Ok(response)
    }

    fn display_name(&self) -> String {
        let framing = match self.spec.framing {
            Framing::Tcp => "Modbus TCP",
            Framing::RtuTcp => "Modbus RTU-over-TCP",
        };
        format!(
            "{} {}:{} (unit {})",
            framing, self.spec.host, self.spec.port, self.spec.unit_id
        )
    }
}

impl std::fmt::Debug for ModbusTcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusTcpTransport")
            .field("host", &self.spec.host)
            .field("port", &self.spec.port)
            .field("unit_id", &self.spec.unit_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

// =============================================================================
// ModbusTransportFactory
// =============================================================================

/// Opens [`ModbusTcpTransport`]s from `modbus:...` connection strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModbusTransportFactory;

impl ModbusTransportFactory {
    /// Creates a new factory.
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for ModbusTransportFactory {
    fn open(&self, connection_string: &str) -> ClientResult<Box<dyn TagTransport>> {
        let spec = ConnectionSpec::parse(connection_string)
            .map_err(|e| ClientError::transport_with("Unusable connection string", e))?;
        Ok(Box::new(ModbusTcpTransport::new(spec)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp() {
        let spec = ConnectionSpec::parse("modbus:tcp://192.168.1.100:502?unit-identifier=3")
            .unwrap();
        assert_eq!(spec.framing, Framing::Tcp);
        assert_eq!(spec.host, "192.168.1.100");
        assert_eq!(spec.port, 502);
        assert_eq!(spec.unit_id, 3);
    }

    #[test]
    fn test_parse_rtu_tcp() {
        let spec = ConnectionSpec::parse("modbus:rtu-tcp://gw.local:10001").unwrap();
        assert_eq!(spec.framing, Framing::RtuTcp);
        assert_eq!(spec.host, "gw.local");
        assert_eq!(spec.port, 10001);
        assert_eq!(spec.unit_id, 1);
    }

    #[test]
    fn test_parse_defaults() {
        let spec = ConnectionSpec::parse("modbus:tcp://plc").unwrap();
        assert_eq!(spec.port, 502);
        assert_eq!(spec.unit_id, 1);
    }

    #[test]
    fn test_parse_ignores_unknown_query_keys() {
        let spec =
            ConnectionSpec::parse("modbus:tcp://plc:502?request-timeout=5000&unit-identifier=9")
                .unwrap();
        assert_eq!(spec.unit_id, 9);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ConnectionSpec::parse("tcp://plc:502").is_err());
        assert!(ConnectionSpec::parse("modbus:serial://dev/ttyUSB0").is_err());
        assert!(ConnectionSpec::parse("modbus:tcp://:502").is_err());
        assert!(ConnectionSpec::parse("modbus:tcp://plc:99999").is_err());
        assert!(ConnectionSpec::parse("modbus:tcp://plc:502?unit-identifier=300").is_err());
        assert!(ConnectionSpec::parse("modbus:tcp://plc:502?unit-identifier").is_err());
    }

    #[test]
    fn test_factory_rejects_bad_connection_string() {
        let factory = ModbusTransportFactory::new();
        assert!(factory.open("modbus:udp://plc:502").is_err());
        assert!(factory.open("modbus:tcp://plc:502").is_ok());
    }

    #[test]
    fn test_display_name() {
        let spec = ConnectionSpec::parse("modbus:tcp://plc.local:502?unit-identifier=5").unwrap();
        let transport = ModbusTcpTransport::new(spec);
        assert_eq!(transport.display_name(), "Modbus TCP plc.local:502 (unit 5)");
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_exception_mapping() {
        assert_eq!(
            ModbusTcpTransport::map_exception(ExceptionCode::IllegalDataAddress),
            ResponseCode::InvalidAddress
        );
        assert_eq!(
            ModbusTcpTransport::map_exception(ExceptionCode::ServerDeviceBusy),
            ResponseCode::RemoteBusy
        );
        assert_eq!(
            ModbusTcpTransport::map_exception(ExceptionCode::IllegalFunction),
            ResponseCode::Unsupported
        );
    }
}
