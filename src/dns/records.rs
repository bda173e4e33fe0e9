//! Static resource records, loaded once from the configuration.

use crate::config::Config;
use crate::dns::lower_fqdn;
use crate::error::Error;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use time::macros::format_description;
use time::OffsetDateTime;
use trust_dns_proto::rr::rdata::{MX, SOA, TXT};
use trust_dns_server::client::rr::{LowerName, Name, RData, Record, RecordType};

lazy_static! {
    static ref SERIAL_FORMATTER: &'static [time::format_description::FormatItem<'static>] =
        format_description!(version = 2, "[year][month][day][hour]");
}

/// The outcome of a [`RecordStore::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The store has no records at all for the name.
    Missing,
    /// The records of the requested type, or the name's CNAME records when it has none of that
    /// type. May be empty when the name exists with neither.
    Found(Vec<Record>),
}

/// Read-only mapping from owner name to the records configured for it.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: HashMap<LowerName, Vec<Record>>,
    soa: Option<Record>,
}

impl RecordStore {
    /// Build the store from [`Config::records`] and add the zone SOA for
    /// [`Config::default_domain`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for a record line that can't be parsed, or
    /// [`Error::InvalidName`] if the SOA names are invalid.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let mut store = RecordStore::default();
        for line in &config.records {
            store.insert(parse_record(line, config.record_ttl)?);
        }

        let soa = soa_record(config)?;
        store.insert(soa.clone());
        store.soa = Some(soa);
        Ok(store)
    }

    pub fn insert(&mut self, record: Record) {
        let owner = LowerName::from(record.name());
        self.records.entry(owner).or_default().push(record);
    }

    pub fn contains(&self, name: &LowerName) -> bool {
        self.records.contains_key(name)
    }

    pub fn soa(&self) -> Option<&Record> {
        self.soa.as_ref()
    }

    pub fn lookup(&self, name: &LowerName, record_type: RecordType) -> Lookup {
        let Some(records) = self.records.get(name) else {
            return Lookup::Missing;
        };
        let matching: Vec<Record> = records
            .iter()
            .filter(|r| r.record_type() == record_type)
            .cloned()
            .collect();
        if !matching.is_empty() {
            return Lookup::Found(matching);
        }
        Lookup::Found(
            records
                .iter()
                .filter(|r| r.record_type() == RecordType::CNAME)
                .cloned()
                .collect(),
        )
    }
}

fn soa_record(config: &Config) -> Result<Record, Error> {
    let serial: u32 = OffsetDateTime::now_utc()
        .format(&SERIAL_FORMATTER)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    let soa = SOA::new(
        config.ns_name()?,
        config.ns_admin()?,
        serial,
        28_800,  // 8 hours.
        7_200,   // 2 hours.
        604_800, // 1 week.
        86_400,  // 1 day.
    );
    Ok(Record::from_rdata(
        config.default_domain()?.into(),
        config.record_ttl,
        RData::SOA(soa),
    ))
}

/// Parse a single zone-file style record line: `<name> [<ttl>] [IN] <TYPE> <rdata...>`.
///
/// # Errors
///
/// Returns [`Error::InvalidRecord`] when the line is malformed or uses an unsupported type.
pub fn parse_record(line: &str, default_ttl: u32) -> Result<Record, Error> {
    let invalid = |reason: &str| Error::InvalidRecord {
        line: line.to_string(),
        reason: reason.to_string(),
    };

    let tokens = tokenize(line).map_err(|reason| invalid(reason))?;
    let mut tokens = tokens.into_iter().peekable();

    let owner = tokens.next().ok_or_else(|| invalid("empty record"))?;
    let owner: Name = lower_fqdn(&owner)?.into();

    let mut ttl = default_ttl;
    if let Some(parsed) = tokens.peek().and_then(|t| t.parse::<u32>().ok()) {
        ttl = parsed;
        tokens.next();
    }
    if tokens
        .peek()
        .map_or(false, |t| t.eq_ignore_ascii_case("IN"))
    {
        tokens.next();
    }

    let record_type = tokens.next().ok_or_else(|| invalid("missing type"))?;
    let rdata: Vec<String> = tokens.collect();
    let first = || {
        rdata
            .first()
            .map(String::as_str)
            .ok_or_else(|| invalid("missing rdata"))
    };

    let rdata = match record_type.to_ascii_uppercase().as_str() {
        "A" => RData::A(
            first()?
                .parse::<Ipv4Addr>()
                .map_err(|_| invalid("bad IPv4 address"))?,
        ),
        "AAAA" => RData::AAAA(
            first()?
                .parse::<Ipv6Addr>()
                .map_err(|_| invalid("bad IPv6 address"))?,
        ),
        "CNAME" => RData::CNAME(lower_fqdn(first()?)?.into()),
        "NS" => RData::NS(lower_fqdn(first()?)?.into()),
        "MX" => {
            let preference = first()?
                .parse::<u16>()
                .map_err(|_| invalid("bad MX preference"))?;
            let exchange = rdata
                .get(1)
                .ok_or_else(|| invalid("missing MX exchange"))?;
            RData::MX(MX::new(preference, lower_fqdn(exchange)?.into()))
        }
        "TXT" => {
            if rdata.is_empty() {
                return Err(invalid("missing rdata"));
            }
            RData::TXT(TXT::new(rdata))
        }
        _ => return Err(invalid("unsupported record type")),
    };

    Ok(Record::from_rdata(owner, ttl, rdata))
}

// Splits on whitespace, keeping "quoted strings" whole.
fn tokenize(line: &str) -> Result<Vec<String>, &'static str> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped) => text.push(escaped),
                        None => return Err("unterminated string"),
                    },
                    Some('"') => break,
                    Some(c) => text.push(c),
                    None => return Err("unterminated string"),
                }
            }
            tokens.push(text);
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' {
                    break;
                }
                text.push(c);
                chars.next();
            }
            tokens.push(text);
        }
    }
    Ok(tokens)
}
