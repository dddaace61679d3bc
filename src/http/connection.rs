use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;

use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::server::AppState;

const READ_BUFFER_SIZE: usize = 4096;

pub struct Connection<S = TcpStream> {
    stream: S,
    buffer: BytesMut,
    state: ConnectionState,
    app: Arc<AppState>,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

enum Incoming {
    Request(Request),
    Malformed(ParseError),
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, app: Arc<AppState>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            state: ConnectionState::Reading,
            app,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            self.state = match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => match self.read_request().await? {
                    Incoming::Request(req) => ConnectionState::Processing(req),
                    Incoming::Malformed(e) => {
                        tracing::warn!(error = ?e, "Rejecting malformed request");
                        let response = self.rejection(&e);
                        ConnectionState::Writing(ResponseWriter::new(&response), false)
                    }
                    Incoming::Closed => ConnectionState::Closed,
                },

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let mut response = self.handle_request(&req).await;
                    if !keep_alive {
                        response.headers.set("Connection", "close");
                    }

                    let writer = if req.method == Method::HEAD {
                        ResponseWriter::head_only(&response)
                    } else {
                        ResponseWriter::new(&response)
                    };
                    ConnectionState::Writing(writer, keep_alive)
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        ConnectionState::Reading // go back for next request
                    } else {
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Closed => break,
            };
        }

        Ok(())
    }

    async fn read_request(&mut self) -> anyhow::Result<Incoming> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(Incoming::Request(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => return Ok(Incoming::Malformed(e)),
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;

            if n == 0 {
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        buffered = self.buffer.len(),
                        "Client closed connection mid-request"
                    );
                }
                return Ok(Incoming::Closed);
            }
        }
    }

    async fn handle_request(&self, req: &Request) -> Response {
        if !self.app.allowed_methods.contains(&req.method) {
            tracing::debug!(method = %req.method, target = %req.path, "Method not relayed");
            return Response::method_not_allowed(&self.app.allowed_methods);
        }

        self.app.forwarder.relay_or_error(req).await
    }

    fn rejection(&self, error: &ParseError) -> Response {
        let mut response = match error {
            ParseError::HeadersTooLarge => Response::error(
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
                "Request header block is too large.",
            ),
            ParseError::InvalidMethod => Response::method_not_allowed(&self.app.allowed_methods),
            _ => Response::bad_request("Malformed HTTP request."),
        };
        response.headers.set("Connection", "close");
        response
    }
}
