//! Helpers shared by unit tests.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::net::connection::Connection;
use crate::net::host::Host;
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

pub struct NoopTransport;

impl Transport for NoopTransport {
    fn ping<'a>(&'a self, _host: &'a Host) -> BoxFuture<'a, Result<(), TransportError>> {
        async { Ok(()) }.boxed()
    }

    fn request<'a>(
        &'a self,
        _host: &'a Host,
        _request: TransportRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>> {
        async {
            Ok(TransportResponse {
                status: 200,
                body: Vec::new(),
            })
        }
        .boxed()
    }
}

pub fn connections(ports: &[u16]) -> Vec<Arc<Connection>> {
    ports
        .iter()
        .map(|port| {
            let host: Host = format!("localhost:{}", port).parse().unwrap();
            Arc::new(Connection::new(host, Arc::new(NoopTransport)))
        })
        .collect()
}
