//! Per-question answer synthesis.
//!
//! [`QueryEngine::answer`] decides the records, response code and authority for one question.
//! Static records from the [`RecordStore`] win; names under the owned domains without a static
//! answer get synthesized records instead. Challenge TXT records are always appended.

use crate::challenge_store::DynTokenStore;
use crate::config::Config;
use crate::dns::in_zone;
use crate::dns::records::{Lookup, RecordStore};
use crate::error::Error;
use crate::notification::DynNotifier;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::info;
use trust_dns_proto::rr::rdata::{MX, TXT};
use trust_dns_server::client::op::{LowerQuery, ResponseCode};
use trust_dns_server::client::rr::{LowerName, Name, RData, Record, RecordType};
use uuid::Uuid;

const ACME_CHALLENGE_LABEL: &[u8] = b"_acme-challenge";
const SYNTHESIZED_TTL: u32 = 1;
const MX_PREFERENCE: u16 = 10;

/// The outcome of answering a single question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub records: Vec<Record>,
    pub response_code: ResponseCode,
    pub authoritative: bool,
}

/// The combined outcome of answering every question of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub response_code: ResponseCode,
    pub authoritative: bool,
}

#[derive(Clone)]
pub struct QueryEngine {
    owned_domains: Arc<[LowerName]>,
    default_domain: LowerName,
    ip: IpAddr,
    records: Arc<RecordStore>,
    tokens: DynTokenStore,
    notifier: DynNotifier,
}

impl QueryEngine {
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if an owned domain or the default domain doesn't parse.
    pub fn new(
        config: &Config,
        records: Arc<RecordStore>,
        tokens: DynTokenStore,
        notifier: DynNotifier,
    ) -> Result<Self, Error> {
        Ok(QueryEngine {
            owned_domains: config.owned_domains()?.into(),
            default_domain: config.default_domain()?,
            ip: config.ip,
            records,
            tokens,
            notifier,
        })
    }

    /// Answer every question in order. The response code is the one of the last question, the
    /// response is authoritative if any question was, and an authoritative `NXDOMAIN` carries
    /// the zone SOA in the authority section.
    pub async fn resolve(&self, queries: &[LowerQuery], remote_addr: SocketAddr) -> Response {
        let mut response = Response {
            answers: Vec::new(),
            authority: Vec::new(),
            response_code: ResponseCode::NoError,
            authoritative: false,
        };
        for query in queries {
            let answer = self
                .answer(query.name(), query.query_type(), remote_addr)
                .await;
            response.authoritative |= answer.authoritative;
            response.response_code = answer.response_code;
            response.answers.extend(answer.records);
        }
        if response.authoritative && response.response_code == ResponseCode::NXDomain {
            response.authority.extend(self.records.soa().cloned());
        }
        response
    }

    pub async fn answer(
        &self,
        name: &LowerName,
        query_type: RecordType,
        remote_addr: SocketAddr,
    ) -> Answer {
        let authoritative = self.is_authoritative(name);
        let (mut records, mut response_code) = match self.records.lookup(name, query_type) {
            Lookup::Missing => (Vec::new(), ResponseCode::NXDomain),
            Lookup::Found(records) => (records, ResponseCode::NoError),
        };

        let static_hit = !records.is_empty();
        match query_type {
            RecordType::TXT if self.is_own_challenge(name) => {
                let token = self.challenge_token(name).await;
                records.push(Record::from_rdata(
                    name.into(),
                    SYNTHESIZED_TTL,
                    RData::TXT(TXT::new(vec![token])),
                ));
            }
            // Configured records shadow everything synthesized below.
            _ if static_hit => {}
            RecordType::MX if self.is_answerable(name) => {
                records.push(Record::from_rdata(
                    name.into(),
                    SYNTHESIZED_TTL,
                    RData::MX(MX::new(MX_PREFERENCE, (&self.default_domain).into())),
                ));
            }
            RecordType::A | RecordType::AAAA if self.is_answerable(name) => {
                records.extend(self.address_record(name.into(), query_type));
            }
            // No CNAME at the default domain apex, it would loop.
            RecordType::CNAME if self.is_answerable(name) && *name != self.default_domain => {
                records.extend(self.cname_records(name));
            }
            _ => {}
        }

        if !records.is_empty() {
            response_code = ResponseCode::NoError;
        }

        self.notifier.notify(
            "dns",
            &format!(
                "\nDNS question from: {remote_addr}\nType:   {query_type}\nRcode:  {response_code}\nDomain: {name}"
            ),
        );
        info!(
            qtype = %query_type,
            domain = %name,
            rcode = %response_code,
            remote_addr = %remote_addr,
            "answering question for domain"
        );

        Answer {
            records,
            response_code,
            authoritative,
        }
    }

    /// True if `name`, or any name it is nested under, is an owned domain.
    pub fn is_authoritative(&self, name: &LowerName) -> bool {
        let mut ancestor = name.clone();
        loop {
            if self.owned_domains.contains(&ancestor) {
                return true;
            }
            if ancestor.is_root() {
                return false;
            }
            ancestor = ancestor.base_name();
        }
    }

    /// True if `name` is in an owned domain. Only answerable names get synthesized records.
    pub fn is_answerable(&self, name: &LowerName) -> bool {
        self.in_owned_domains(name)
    }

    /// True for `_acme-challenge.<name>` where `<name>` is in an owned domain.
    pub fn is_own_challenge(&self, name: &LowerName) -> bool {
        let full: Name = name.into();
        match full.iter().next() {
            Some(label) if label.eq_ignore_ascii_case(ACME_CHALLENGE_LABEL) => {
                self.in_owned_domains(&name.base_name())
            }
            _ => false,
        }
    }

    fn in_owned_domains(&self, name: &LowerName) -> bool {
        self.owned_domains.iter().any(|zone| in_zone(name, zone))
    }

    async fn challenge_token(&self, name: &LowerName) -> String {
        let store = self.tokens.read().await;
        store.token(name).await.unwrap_or_default()
    }

    fn address_record(&self, name: Name, query_type: RecordType) -> Option<Record> {
        let rdata = match (query_type, self.ip) {
            (RecordType::A, IpAddr::V4(v4)) => RData::A(v4),
            (RecordType::AAAA, IpAddr::V6(v6)) => RData::AAAA(v6),
            _ => return None,
        };
        Some(Record::from_rdata(name, SYNTHESIZED_TTL, rdata))
    }

    fn cname_records(&self, name: &LowerName) -> Vec<Record> {
        let default_domain: Name = (&self.default_domain).into();
        let target = Name::from_ascii(Uuid::new_v4().to_string())
            .and_then(|label| label.append_domain(&default_domain));
        let target = match target {
            Ok(target) => target,
            Err(err) => {
                tracing::warn!(domain = %name, error = %err, "could not build CNAME target");
                return Vec::new();
            }
        };

        let address_type = match self.ip {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::AAAA,
        };
        let mut records = vec![Record::from_rdata(
            name.into(),
            SYNTHESIZED_TTL,
            RData::CNAME(target.clone()),
        )];
        records.extend(self.address_record(target, address_type));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ChallengeBridge;
    use crate::challenge_store;
    use crate::dns::lower_fqdn;
    use crate::dns::records::parse_record;
    use crate::notification::tests::Recorder;
    use crate::notification::NullNotifier;
    use std::collections::HashSet;
    use std::net::Ipv4Addr;

    const CONFIG: &str = r#"{
        "ip": "203.0.113.10",
        "default_domain": "catch.test",
        "domains": ["catch.test", "owned.com"],
        "ns_name": "ns1.catch.test",
        "ns_admin": "admin@catch.test",
        "records": [
            "static.owned.com. 300 A 192.0.2.55",
            "alias.owned.com. CNAME static.owned.com.",
            "alias.owned.com. TXT \"hello\"",
            "elsewhere.net. A 192.0.2.99"
        ],
        "api_bind_addr": "127.0.0.1:3000"
    }"#;

    fn remote() -> SocketAddr {
        "198.51.100.1:5353".parse().unwrap()
    }

    fn name(s: &str) -> LowerName {
        lower_fqdn(s).unwrap()
    }

    fn engine_with(notifier: DynNotifier) -> (QueryEngine, DynTokenStore) {
        let config = Config::try_from_str(CONFIG).unwrap();
        let records = Arc::new(RecordStore::from_config(&config).unwrap());
        let tokens = challenge_store::new_shared();
        let engine = QueryEngine::new(&config, records, tokens.clone(), notifier).unwrap();
        (engine, tokens)
    }

    fn engine() -> (QueryEngine, DynTokenStore) {
        engine_with(Arc::new(NullNotifier))
    }

    #[tokio::test]
    async fn a_for_any_name_under_owned_domain() {
        let (engine, _) = engine();
        for n in ["owned.com", "x.owned.com", "deeply.nested.never.seen.owned.com"] {
            let answer = engine.answer(&name(n), RecordType::A, remote()).await;
            assert_eq!(answer.response_code, ResponseCode::NoError);
            assert!(answer.authoritative);
            assert_eq!(answer.records.len(), 1);
            let record = &answer.records[0];
            assert_eq!(record.ttl(), 1);
            assert_eq!(
                record.data(),
                Some(&RData::A(Ipv4Addr::new(203, 0, 113, 10)))
            );
            assert_eq!(LowerName::from(record.name()), name(n));
        }
    }

    #[tokio::test]
    async fn foreign_names_are_nxdomain_and_not_authoritative() {
        let (engine, _) = engine();
        for qtype in [RecordType::A, RecordType::MX, RecordType::CNAME, RecordType::TXT] {
            let answer = engine.answer(&name("www.google.com"), qtype, remote()).await;
            assert_eq!(answer.response_code, ResponseCode::NXDomain);
            assert!(answer.records.is_empty());
            assert!(!answer.authoritative);
        }
        // Suffix match alone is not ownership.
        let answer = engine
            .answer(&name("notowned.com"), RecordType::A, remote())
            .await;
        assert_eq!(answer.response_code, ResponseCode::NXDomain);
        assert!(!answer.authoritative);
    }

    #[tokio::test]
    async fn challenge_txt_before_and_after_publish() {
        let (engine, tokens) = engine();
        let challenge = name("_acme-challenge.owned.com");

        let answer = engine.answer(&challenge, RecordType::TXT, remote()).await;
        assert_eq!(answer.response_code, ResponseCode::NoError);
        assert_eq!(answer.records.len(), 1);
        assert_eq!(
            answer.records[0].data(),
            Some(&RData::TXT(TXT::new(vec![String::new()])))
        );

        let bridge = ChallengeBridge::new(vec![tokens]);
        bridge.publish("owned.com", "tok123").await.unwrap();

        let answer = engine.answer(&challenge, RecordType::TXT, remote()).await;
        assert_eq!(answer.records.len(), 1);
        assert_eq!(
            answer.records[0].data(),
            Some(&RData::TXT(TXT::new(vec!["tok123".to_string()])))
        );
        assert_eq!(answer.records[0].ttl(), 1);
    }

    #[tokio::test]
    async fn challenge_for_wildcard_parent() {
        let (engine, tokens) = engine();
        let bridge = ChallengeBridge::new(vec![tokens]);
        bridge.publish("*.sub.owned.com", "wild").await.unwrap();

        let answer = engine
            .answer(&name("_ACME-Challenge.sub.owned.com"), RecordType::TXT, remote())
            .await;
        assert_eq!(
            answer.records[0].data(),
            Some(&RData::TXT(TXT::new(vec!["wild".to_string()])))
        );
    }

    #[tokio::test]
    async fn challenge_outside_owned_domains_ignored() {
        let (engine, _) = engine();
        let answer = engine
            .answer(&name("_acme-challenge.example.org"), RecordType::TXT, remote())
            .await;
        assert_eq!(answer.response_code, ResponseCode::NXDomain);
        assert!(answer.records.is_empty());
    }

    #[tokio::test]
    async fn mx_points_at_default_domain() {
        let (engine, _) = engine();
        let answer = engine
            .answer(&name("mail.owned.com"), RecordType::MX, remote())
            .await;
        assert_eq!(answer.records.len(), 1);
        assert_eq!(answer.records[0].ttl(), 1);
        assert_eq!(
            answer.records[0].data(),
            Some(&RData::MX(MX::new(10, name("catch.test").into())))
        );
    }

    #[tokio::test]
    async fn cname_synthesis_is_fresh() {
        let (engine, _) = engine();
        let mut targets = HashSet::new();
        for _ in 0..2 {
            let answer = engine
                .answer(&name("web.owned.com"), RecordType::CNAME, remote())
                .await;
            assert_eq!(answer.response_code, ResponseCode::NoError);
            assert_eq!(answer.records.len(), 2);

            let Some(RData::CNAME(target)) = answer.records[0].data() else {
                panic!("expected a CNAME, got {:?}", answer.records[0]);
            };
            assert!(name("catch.test").zone_of(&LowerName::from(target)));
            assert_eq!(target.num_labels(), 3);

            let address = &answer.records[1];
            assert_eq!(address.name(), target);
            assert_eq!(
                address.data(),
                Some(&RData::A(Ipv4Addr::new(203, 0, 113, 10)))
            );
            targets.insert(target.clone());
        }
        assert_eq!(targets.len(), 2);
    }

    #[tokio::test]
    async fn no_cname_for_default_domain() {
        let (engine, _) = engine();
        let answer = engine
            .answer(&name("catch.test"), RecordType::CNAME, remote())
            .await;
        assert!(answer.records.is_empty());
        assert!(answer.authoritative);
    }

    #[tokio::test]
    async fn static_record_takes_precedence() {
        let (engine, _) = engine();
        let answer = engine
            .answer(&name("static.owned.com"), RecordType::A, remote())
            .await;
        assert_eq!(
            answer.records,
            vec![parse_record("static.owned.com. 300 A 192.0.2.55", 0).unwrap()]
        );
        assert_eq!(answer.response_code, ResponseCode::NoError);
        assert!(answer.authoritative);
    }

    #[tokio::test]
    async fn static_only_name_outside_owned_domains() {
        let (engine, _) = engine();
        let answer = engine
            .answer(&name("elsewhere.net"), RecordType::A, remote())
            .await;
        assert_eq!(
            answer.records,
            vec![parse_record("elsewhere.net. A 192.0.2.99", 3600).unwrap()]
        );
        assert_eq!(answer.response_code, ResponseCode::NoError);
        assert!(!answer.authoritative);

        // Static records don't make a foreign name answerable.
        let answer = engine
            .answer(&name("elsewhere.net"), RecordType::MX, remote())
            .await;
        assert!(answer.records.is_empty());
        assert!(!answer.authoritative);

        let query = LowerQuery::query(trust_dns_server::client::op::Query::query(
            name("deeper.elsewhere.net").into(),
            RecordType::A,
        ));
        let response = engine.resolve(&[query], remote()).await;
        assert!(response.answers.is_empty());
        assert_eq!(response.response_code, ResponseCode::NXDomain);
        assert!(!response.authoritative);
        assert!(response.authority.is_empty());
    }

    #[tokio::test]
    async fn cname_fallback_for_static_alias() {
        let (engine, _) = engine();
        let answer = engine
            .answer(&name("alias.owned.com"), RecordType::A, remote())
            .await;
        assert_eq!(answer.records.len(), 1);
        assert_eq!(answer.records[0].record_type(), RecordType::CNAME);
        assert_eq!(answer.response_code, ResponseCode::NoError);
    }

    #[tokio::test]
    async fn nxdomain_response_carries_soa() {
        let (engine, _) = engine();
        let query = LowerQuery::query(trust_dns_server::client::op::Query::query(
            name("nothing.owned.com").into(),
            RecordType::AAAA,
        ));
        let response = engine.resolve(&[query], remote()).await;
        assert_eq!(response.response_code, ResponseCode::NXDomain);
        assert!(response.authoritative);
        assert_eq!(response.authority.len(), 1);
        assert_eq!(response.authority[0].record_type(), RecordType::SOA);

        let foreign = LowerQuery::query(trust_dns_server::client::op::Query::query(
            name("nothing.example.org").into(),
            RecordType::A,
        ));
        let response = engine.resolve(&[foreign], remote()).await;
        assert_eq!(response.response_code, ResponseCode::NXDomain);
        assert!(!response.authoritative);
        assert!(response.authority.is_empty());
    }

    #[tokio::test]
    async fn resolve_without_questions() {
        let (engine, _) = engine();
        let response = engine.resolve(&[], remote()).await;
        assert_eq!(response.response_code, ResponseCode::NoError);
        assert!(!response.authoritative);
        assert!(response.answers.is_empty());
    }

    #[tokio::test]
    async fn every_question_is_notified() {
        let recorder = Arc::new(Recorder::default());
        let (engine, _) = engine_with(recorder.clone());
        engine
            .answer(&name("probe.owned.com"), RecordType::A, remote())
            .await;

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (protocol, message) = &seen[0];
        assert_eq!(protocol, "dns");
        assert!(message.contains("198.51.100.1:5353"));
        assert!(message.contains("probe.owned.com."));
        assert!(message.contains("Type:   A"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_answers_and_publishes() {
        let (engine, tokens) = engine();
        let bridge = ChallengeBridge::new(vec![tokens]);

        let mut tasks = Vec::new();
        for i in 0..1000 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                let answer = engine
                    .answer(&name(&format!("host{i}.owned.com")), RecordType::A, remote())
                    .await;
                assert_eq!(answer.records.len(), 1);
            }));
            if i % 10 == 0 {
                let bridge = bridge.clone();
                tasks.push(tokio::spawn(async move {
                    bridge
                        .publish(&format!("sub{i}.owned.com"), &format!("token-{i}"))
                        .await
                        .unwrap();
                }));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        for i in (0..1000).step_by(10) {
            let answer = engine
                .answer(
                    &name(&format!("_acme-challenge.sub{i}.owned.com")),
                    RecordType::TXT,
                    remote(),
                )
                .await;
            assert_eq!(
                answer.records[0].data(),
                Some(&RData::TXT(TXT::new(vec![format!("token-{i}")])))
            );
        }
    }
}
