use bytes::Bytes;
use http::request::Parts;
use http::HeaderMap;

/// One element of a caller's outbound request stream (§4.3).
pub enum RequestStreamElement {
    /// The request line and headers. `end_of_stream` is set by the caller
    /// when it already knows the request carries no body.
    Headers { parts: Parts, end_of_stream: bool },
    Data(Bytes),
    /// A trailing headers element. Always ends the stream; must not carry
    /// pseudo-headers or a status.
    Trailers(HeaderMap),
}
