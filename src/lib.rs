//! Catchall
//!
//! An authoritative nameserver that answers for every name under a set of owned domains,
//! as a honeypot backstop: anything that looks a name up gets pointed at a single address,
//! and every lookup is reported.
//!
//! The same nameservers answer [RFC-8555][RFC-8555] [DNS-01] challenges, so a local
//! certificate client can obtain certificates on demand for any name it is asked for.
//! [`admission`] decides which names may get one.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
#![warn(clippy::pedantic)]

pub mod admission;
pub mod api;
pub mod bridge;
pub mod challenge_store;
pub mod config;
pub mod dns;
pub mod error;
pub mod notification;

pub use admission::{AdmissionPolicy, Decision};
pub use api::new as new_http;
pub use bridge::{ChallengeBridge, Dns01Provider};
pub use challenge_store::memory::InMemoryTokenStore;
pub use config::{Config, Shared};
pub use dns::{launch, Launched};
pub use notification::{LogNotifier, Notifications};
