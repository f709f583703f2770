/**
 * Bybit WebSocket Stream Error Definitions
 *
 * This module contains the error handling for the stream manager. Library
 * errors (`BybitStreamsError`) are raised to callers; socket failures
 * (`SocketFailure`) stay internal to the supervisor, which classifies them
 * into restart, stop or crash decisions.
 */

mod stream_error;
mod socket_error;

pub use stream_error::BybitStreamsError;
pub use socket_error::{RestartDecision, SocketFailure};
