/// Defines an abstract [`RestRequest`](http::rest::RestRequest) that can be executed by a fully
/// configurable [`RestClient`](http::rest::client::RestClient).
pub mod http;

/// WebSocket protocol utilities: connection, frame processing, disconnect detection.
pub mod websocket;
