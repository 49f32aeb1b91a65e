//! Fake Arrow Flight server.
//!
//! Serves `tenant-a` and `tenant-b` through ListFlights. `GetFlightInfo` on
//! `[tenant, dataset, rows?]` returns one endpoint whose `DoGet` stream is a
//! schema message followed by three Int64 record batches of `rows` rows each
//! (default 100). Dataset `empty` returns no endpoints, `forbidden` fails
//! with `PermissionDenied` and `overloaded` with `Unavailable`. The stream of
//! dataset `truncated` breaks off with `Unavailable` after one batch.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use arrow_array::{Int64Array, RecordBatch};
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::flight_service_server::{FlightService, FlightServiceServer};
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightEndpoint, FlightInfo,
    HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaResult, Ticket,
};
use arrow_schema::{DataType, Field, Schema};
use futures::stream::{self, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

/// Handle to the running fake Flight server
pub struct FakeFlight {
    addr: SocketAddr,
}

impl FakeFlight {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            Server::builder()
                .add_service(FlightServiceServer::new(FakeFlightService))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });

        Ok(Self { addr })
    }

    /// Flight location (e.g. `grpc://127.0.0.1:PORT`)
    pub fn uri(&self) -> String {
        format!("grpc://{}", self.addr)
    }
}

/// Body bytes the server sends for one batch of `rows` Int64 values
pub fn batch(rows: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("value", DataType::Int64, false)]));
    let values = Int64Array::from_iter_values(0..rows as i64);
    RecordBatch::try_new(schema, vec![Arc::new(values)]).unwrap()
}

fn descriptor(path: &[&str]) -> FlightDescriptor {
    FlightDescriptor::new_path(path.iter().map(|p| p.to_string()).collect())
}

struct FakeFlightService;

#[tonic::async_trait]
impl FlightService for FakeFlightService {
    type HandshakeStream = BoxedStream<HandshakeResponse>;
    type ListFlightsStream = BoxedStream<FlightInfo>;
    type DoGetStream = BoxedStream<FlightData>;
    type DoPutStream = BoxedStream<PutResult>;
    type DoActionStream = BoxedStream<arrow_flight::Result>;
    type ListActionsStream = BoxedStream<ActionType>;
    type DoExchangeStream = BoxedStream<FlightData>;

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        Err(Status::unimplemented("handshake"))
    }

    async fn list_flights(
        &self,
        _request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        let infos = vec![
            FlightInfo::new().with_descriptor(descriptor(&["tenant-a", "sales"])),
            FlightInfo::new().with_descriptor(descriptor(&["tenant-a", "orders"])),
            FlightInfo::new().with_descriptor(descriptor(&["tenant-b", "sales"])),
        ];
        Ok(Response::new(stream::iter(infos.into_iter().map(Ok)).boxed()))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        let descriptor = request.into_inner();
        let dataset = descriptor.path.get(1).cloned().unwrap_or_default();

        let info = FlightInfo::new().with_descriptor(descriptor.clone());
        match dataset.as_str() {
            "empty" => Ok(Response::new(info)),
            "forbidden" => Err(Status::permission_denied("tenant may not read dataset")),
            "overloaded" => Err(Status::unavailable("backend overloaded, retry later")),
            _ => {
                let ticket = Ticket::new(descriptor.path.join("/"));
                let endpoint = FlightEndpoint::new().with_ticket(ticket);
                Ok(Response::new(info.with_endpoint(endpoint)))
            }
        }
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("poll_flight_info"))
    }

    async fn get_schema(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        Err(Status::unimplemented("get_schema"))
    }

    async fn do_get(&self, request: Request<Ticket>) -> Result<Response<Self::DoGetStream>, Status> {
        let ticket = request.into_inner();
        let path = String::from_utf8_lossy(&ticket.ticket).to_string();
        let rows = path
            .split('/')
            .nth(2)
            .and_then(|r| r.parse::<usize>().ok())
            .unwrap_or(100);
        let truncated = path.split('/').nth(1) == Some("truncated");

        let count = if truncated { 1 } else { 3 };
        let batches = (0..count).map(move |_| Ok::<_, FlightError>(batch(rows)));
        let encoded = FlightDataEncoderBuilder::new()
            .build(stream::iter(batches))
            .map(|frame| frame.map_err(|e| Status::internal(e.to_string())));

        if truncated {
            let reset = stream::once(async { Err(Status::unavailable("stream reset")) });
            return Ok(Response::new(encoded.chain(reset).boxed()));
        }
        Ok(Response::new(encoded.boxed()))
    }

    async fn do_put(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        Err(Status::unimplemented("do_put"))
    }

    async fn do_action(
        &self,
        _request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        Err(Status::unimplemented("do_action"))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        Err(Status::unimplemented("list_actions"))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        Err(Status::unimplemented("do_exchange"))
    }
}
