//! Map transport errors onto the request failure taxonomy

use std::error::Error as StdError;
use std::time::Duration;

use arrow_flight::error::FlightError;
use libunieval_core::TransferError;
use tonic::{Code, Status};

/// Render an error with its source chain, e.g. `error sending request: tcp connect error: Connection refused`
pub fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Classify an HTTP client error. A connect attempt that timed out is a timeout.
pub fn http_error(err: reqwest::Error, timeout: Duration) -> TransferError {
    if err.is_timeout() {
        TransferError::Timeout(timeout)
    } else if err.is_connect() {
        TransferError::ConnectionRefused(error_chain(&err))
    } else if let Some(status) = err.status() {
        TransferError::remote(status.as_u16().to_string(), error_chain(&err))
    } else {
        TransferError::Protocol(error_chain(&err))
    }
}

/// Classify a gRPC status.
///
/// Only a failed dial is `ConnectionRefused`; an `Unavailable` status sent by
/// the server is a remote error like any other status code.
pub fn grpc_status(status: &Status, timeout: Duration) -> TransferError {
    let message = status.message().to_string();
    match status.code() {
        Code::Unavailable | Code::Unknown if is_connect_failure(status) => {
            TransferError::ConnectionRefused(error_chain(status))
        }
        Code::DeadlineExceeded => TransferError::Timeout(timeout),
        Code::DataLoss => TransferError::Protocol(message),
        Code::Internal if is_wire_failure(&message) => TransferError::Protocol(message),
        code => TransferError::remote(format!("{:?}", code), message),
    }
}

/// Classify a gRPC status received after payload started flowing.
///
/// The connection was established, so a transport reset here truncated the
/// stream rather than refusing it.
pub fn grpc_stream_status(status: &Status, timeout: Duration) -> TransferError {
    match status.code() {
        Code::Unavailable | Code::Unknown | Code::Cancelled => {
            TransferError::Protocol(format!("stream interrupted: {}", error_chain(status)))
        }
        _ => grpc_status(status, timeout),
    }
}

// Lazy channels surface dial failures as transport errors
fn is_connect_failure(status: &Status) -> bool {
    let chain = error_chain(status).to_ascii_lowercase();
    [
        "tcp connect error",
        "connection refused",
        "error trying to connect",
        "dns error",
        "failed to connect",
    ]
    .iter()
    .any(|needle| chain.contains(needle))
}

// tonic reports frame decoding and h2 failures as Internal
fn is_wire_failure(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["decode", "h2 protocol", "protocol error", "frame"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Classify an Arrow Flight client error
pub fn flight_error(err: FlightError, timeout: Duration) -> TransferError {
    match err {
        FlightError::Tonic(status) => grpc_status(&status, timeout),
        FlightError::NotYetImplemented(message) => TransferError::remote("NotYetImplemented", message),
        other => TransferError::Protocol(other.to_string()),
    }
}

/// [`flight_error`] for failures after the first record batch
pub fn flight_stream_error(err: FlightError, timeout: Duration) -> TransferError {
    match err {
        FlightError::Tonic(status) => grpc_stream_status(&status, timeout),
        other => flight_error(other, timeout),
    }
}
