//! HTTP API between a local certificate client and the nameservers.
//!
//! # API Endpoints
//!
//! ## `/healthcheck` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"ok":"healthy"}` when the service is operational.
//!
//! ## `/ask` (GET)
//!
//!   Expects a `domain` query parameter, e.g. `/ask?domain=www.example.com`, and answers
//!   whether an on-demand certificate may be issued for it.
//!
//!   Returns HTTP 200 (OK) with the certificate subject to request:
//!
//!   ```json
//!   { "subject": "*.example.com" }
//!   ```
//!
//!   or HTTP 403 (Forbidden) with `{"error": "..."}` naming why issuance was denied.
//!
//! ## `/present` (POST)
//!
//!   Expects a JSON request body of the form:
//!
//!   ```json
//!   { "domain": "www.example.com", "token": "XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX" }
//!   ```
//!
//!  The token is published as the TXT answer for `_acme-challenge.<domain>` on every running
//!  nameserver. A wildcard `domain` (`*.example.com`) is published at its parent. The client
//!  `POST`ing must have a source IP address within a network listed in the
//!  [`Config::api_acl`][crate::config::Config::api_acl].
//!
//!  The `token` value must be a valid [RFC-8555][RFC-8555] [DNS-01] challenge response.
//!
//!  For successful updates, returns HTTP 200 (OK) and a JSON response body echoing the
//!  published record:
//!
//!  ```json
//!  { "record": "_acme-challenge.www.example.com", "token": "XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX" }
//!  ```
//!
//! ## `/cleanup` (POST)
//!
//!   Expects `{ "domain": "www.example.com" }` and acknowledges with `{"ok":"cleaned"}`.
//!   Published tokens stay in place until they're overwritten. Same ACL as `/present`.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4

mod api_error;
mod model;
mod routes;
pub mod server;

pub use server::new;
