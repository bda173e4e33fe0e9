//! The [`RequestHandler`] every nameserver serves with.
//!
//! Negotiates EDNS, replies to anything but a standard query with an empty message, and hands
//! the question to the [`QueryEngine`].

use crate::dns::engine::QueryEngine;
use crate::error::Error;
use tracing::{error, warn};
use trust_dns_proto::op::Edns;
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::client::op::{Header, MessageType, OpCode, ResponseCode};
use trust_dns_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

/// Responses always advertise the classic UDP payload size.
const EDNS_MAX_PAYLOAD: u16 = 512;
const EDNS_VERSION: u8 = 0;

#[derive(Clone)]
pub struct Handler {
    engine: QueryEngine,
}

impl Handler {
    pub(super) fn new(engine: QueryEngine) -> Self {
        Handler { engine }
    }

    async fn dispatch_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        let mut header = Header::response_from_request(request.header());
        let mut builder = MessageResponseBuilder::from_message_request(request);

        if let Some(req_edns) = request.edns() {
            let mut resp_edns = Edns::new();
            resp_edns.set_max_payload(EDNS_MAX_PAYLOAD);
            resp_edns.set_version(EDNS_VERSION);

            if req_edns.version() > EDNS_VERSION {
                warn!(
                    version = req_edns.version(),
                    remote_addr = %request.src(),
                    "unsupported EDNS version"
                );
                header.set_response_code(ResponseCode::BADVERS);
                resp_edns.set_rcode_high(ResponseCode::BADVERS.high());
                builder.edns(resp_edns);
                return Ok(response_handle
                    .send_response(builder.build_no_records(header))
                    .await?);
            }
            builder.edns(resp_edns);
        }

        // Anything but a query gets an empty reply.
        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            return Ok(response_handle
                .send_response(builder.build_no_records(header))
                .await?);
        }

        let response = self
            .engine
            .resolve(std::slice::from_ref(request.query()), request.src())
            .await;
        header.set_authoritative(response.authoritative);
        header.set_response_code(response.response_code);
        let message = builder.build(
            header,
            response.answers.iter(),
            &[],
            response.authority.iter(),
            &[],
        );
        Ok(response_handle.send_response(message).await?)
    }
}

#[async_trait::async_trait]
impl RequestHandler for Handler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        match self.dispatch_request(request, response_handle).await {
            Ok(info) => info,
            Err(error) => {
                error!("error in RequestHandler: {:?}", error);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}
