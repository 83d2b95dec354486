use std::future::poll_fn;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use h2::client::SendRequest;
use h2::{Reason, SendStream};
use stream::{Subscriber, Subscription};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::element::RequestStreamElement;
use crate::error::HttpClientError;

const DEFAULT_USER_AGENT: &str = "rust-client-core/0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NeedsFirstHeader,
    NeedsDataOrTrailers,
    Done,
}

enum Event {
    Subscribed(Arc<dyn Subscription>),
    Item(RequestStreamElement),
    Error(stream::StreamError),
    Complete,
}

/// Forwards a caller's request-stream callbacks onto an unbounded channel;
/// the actual HTTP/2 wire writes happen on the async driver in
/// [`spawn_publisher`], since [`Subscriber`] callbacks are synchronous but
/// writing to an h2 stream under flow control is not.
pub struct HttpRequestSubscriber {
    tx: mpsc::UnboundedSender<Event>,
}

impl Subscriber<RequestStreamElement> for HttpRequestSubscriber {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        let _ = self.tx.send(Event::Subscribed(subscription));
    }

    fn on_next(&mut self, item: RequestStreamElement) {
        let _ = self.tx.send(Event::Item(item));
    }

    fn on_error(&mut self, error: stream::StreamError) {
        let _ = self.tx.send(Event::Error(error));
    }

    fn on_complete(&mut self) {
        let _ = self.tx.send(Event::Complete);
    }
}

/// Fills in `:authority`, `:scheme` (via the URI) and `User-Agent` when the
/// caller's request left them unset (§4.3 "On subscribe", step 1).
fn autofill_pseudo_headers(parts: &mut http::request::Parts, authority: &str, scheme: &str) {
    if parts.uri.authority().is_none() {
        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| http::uri::PathAndQuery::from_static("/"));
        if let Ok(uri) = http::Uri::builder()
            .scheme(scheme)
            .authority(authority)
            .path_and_query(path_and_query)
            .build()
        {
            parts.uri = uri;
        }
    }
    if !parts.headers.contains_key(http::header::USER_AGENT) {
        parts
            .headers
            .insert(http::header::USER_AGENT, http::HeaderValue::from_static(DEFAULT_USER_AGENT));
    }
}

/// Writes `data` to `stream` under h2 flow control, splitting it into
/// however many capacity grants the peer offers.
async fn write_data(stream: &mut SendStream<Bytes>, mut data: Bytes, end_of_stream: bool) -> Result<(), h2::Error> {
    loop {
        if data.is_empty() {
            if end_of_stream {
                stream.send_data(Bytes::new(), true)?;
            }
            return Ok(());
        }

        stream.reserve_capacity(data.len());
        match poll_fn(|cx| stream.poll_capacity(cx)).await {
            None => return Ok(()),
            Some(Err(e)) => return Err(e),
            Some(Ok(n)) => {
                let n = n.min(data.len());
                let chunk = data.split_to(n);
                let last = data.is_empty() && end_of_stream;
                stream.send_data(chunk, last)?;
            }
        }
    }
}

/// Spawns the async driver that consumes `rx` and writes to `send_request`,
/// implementing the §4.3 state machine and failure semantics. Returns the
/// [`HttpRequestSubscriber`] to pass to `stream.subscribe(...)` and a handle
/// resolving once the request finishes or fails.
pub fn spawn_publisher(
    send_request: SendRequest<Bytes>,
    authority: String,
    scheme: &'static str,
    write_timeout: Option<Duration>,
) -> (HttpRequestSubscriber, tokio::task::JoinHandle<Result<(), HttpClientError>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    tracing::trace!(%authority, scheme, "spawning http request publisher");
    let handle = tokio::spawn(run(send_request, rx, authority, scheme, write_timeout));
    (HttpRequestSubscriber { tx }, handle)
}

#[tracing::instrument(skip(send_request, rx, write_timeout), fields(%authority))]
async fn run(
    mut send_request: SendRequest<Bytes>,
    mut rx: mpsc::UnboundedReceiver<Event>,
    authority: String,
    scheme: &'static str,
    write_timeout: Option<Duration>,
) -> Result<(), HttpClientError> {
    let mut state = State::NeedsFirstHeader;
    let mut subscription: Option<Arc<dyn Subscription>> = None;
    let mut send_stream: Option<SendStream<Bytes>> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let sleep_until_deadline = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = sleep_until_deadline, if deadline.is_some() => {
                tracing::warn!(%authority, "write deadline elapsed, resetting stream");
                state = State::Done;
                if let Some(sub) = subscription.take() {
                    sub.cancel();
                }
                if let Some(mut s) = send_stream.take() {
                    s.send_reset(Reason::CANCEL);
                }
                return Err(HttpClientError::WriteTimeout);
            }
            event = rx.recv() => {
                let Some(event) = event else { return Ok(()) };
                match event {
                    Event::Subscribed(sub) => {
                        sub.request(1);
                        subscription = Some(sub);
                    }
                    Event::Complete => return Ok(()),
                    Event::Error(cause) => {
                        tracing::warn!(%authority, %cause, "request stream reported an error, resetting");
                        state = State::Done;
                        if let Some(mut s) = send_stream.take() {
                            s.send_reset(Reason::INTERNAL_ERROR);
                        }
                        return Err(HttpClientError::ClosedSession);
                    }
                    Event::Item(item) => {
                        if state == State::Done {
                            if let Some(sub) = &subscription {
                                sub.cancel();
                            }
                            continue;
                        }

                        if let Err(cause) = handle_item(
                            item,
                            &mut state,
                            &mut send_request,
                            &mut send_stream,
                            &authority,
                            scheme,
                            write_timeout,
                            &mut deadline,
                        )
                        .await
                        {
                            tracing::warn!(%authority, %cause, "failed to write request element, resetting stream");
                            if let Some(sub) = subscription.take() {
                                sub.cancel();
                            }
                            if let Some(mut s) = send_stream.take() {
                                s.send_reset(Reason::INTERNAL_ERROR);
                            }
                            return Err(cause);
                        }

                        if state != State::Done {
                            if let Some(sub) = &subscription {
                                sub.request(1);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_item(
    item: RequestStreamElement,
    state: &mut State,
    send_request: &mut SendRequest<Bytes>,
    send_stream: &mut Option<SendStream<Bytes>>,
    authority: &str,
    scheme: &'static str,
    write_timeout: Option<Duration>,
    deadline: &mut Option<Instant>,
) -> Result<(), HttpClientError> {
    match (*state, item) {
        (State::NeedsFirstHeader, RequestStreamElement::Headers { mut parts, end_of_stream }) => {
            autofill_pseudo_headers(&mut parts, authority, scheme);
            if let Some(timeout) = write_timeout {
                *deadline = Some(Instant::now() + timeout);
            }

            let request = http::Request::from_parts(parts, ());
            if send_request.ready().await.is_err() {
                return Err(HttpClientError::UnprocessedRequest(Box::new(HttpClientError::ClosedSession)));
            }
            let (_response, stream) = send_request.send_request(request, end_of_stream)?;

            *deadline = None;
            if end_of_stream {
                *state = State::Done;
            } else {
                *send_stream = Some(stream);
                *state = State::NeedsDataOrTrailers;
            }
            Ok(())
        }
        (State::NeedsDataOrTrailers, RequestStreamElement::Data(bytes)) => {
            let stream = send_stream.as_mut().expect("data element implies an open send_stream");
            write_data(stream, bytes, false).await?;
            *deadline = None;
            Ok(())
        }
        (State::NeedsDataOrTrailers, RequestStreamElement::Trailers(trailers)) => {
            let stream = send_stream.as_mut().expect("trailers element implies an open send_stream");
            stream.send_trailers(trailers)?;
            *state = State::Done;
            Ok(())
        }
        _ => Ok(()),
    }
}
