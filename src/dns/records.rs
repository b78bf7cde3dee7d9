use crate::error::Error;
use lazy_static::lazy_static;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use time::macros::format_description;
use time::OffsetDateTime;
use trust_dns_proto::rr::rdata::{CAA, MX, SOA, TXT};
use trust_dns_proto::rr::{Name, RData, Record, RecordType};

/// TTL used when a record line does not carry one.
pub const DEFAULT_TTL: u32 = 60;

/// TTL of the default NS, A and MX records.
pub const STATIC_TTL: u32 = 600;

lazy_static! {
    static ref SERIAL_FORMATTER: &'static [time::format_description::FormatItem<'static>] =
        format_description!(version = 2, "[year][month][day]");
}

/// Build a record of type `rtype` from its presentation-format `value`.
///
/// Names inside the value (NS, CNAME, MX exchange, SOA names) that are not fully qualified are
/// taken relative to `origin`; `@` is `origin` itself. TXT values are split on `,` into
/// separate character strings.
///
/// # Errors
///
/// Returns [`Error::InvalidRecord`] if the value can't be parsed for the type and
/// [`Error::UnsupportedRecordType`] for types other than A, AAAA, MX, TXT, CNAME, NS, CAA
/// and SOA.
pub fn new_rr(
    name: Name,
    rtype: RecordType,
    ttl: u32,
    value: &str,
    origin: &Name,
) -> Result<Record, Error> {
    let invalid = || Error::InvalidRecord {
        rtype,
        value: value.to_string(),
    };
    let value = value.trim();

    let rdata = match rtype {
        RecordType::A => RData::A(Ipv4Addr::from_str(value).map_err(|_| invalid())?),
        RecordType::AAAA => RData::AAAA(Ipv6Addr::from_str(value).map_err(|_| invalid())?),
        RecordType::NS => RData::NS(relative_name(value, origin).map_err(|_| invalid())?),
        RecordType::CNAME => RData::CNAME(relative_name(value, origin).map_err(|_| invalid())?),
        RecordType::TXT => RData::TXT(TXT::new(
            unquote(value).split(',').map(str::to_string).collect(),
        )),
        RecordType::MX => {
            let (preference, exchange) = value
                .split_once(char::is_whitespace)
                .ok_or_else(invalid)?;
            let preference = preference.parse().map_err(|_| invalid())?;
            let exchange = relative_name(exchange.trim(), origin).map_err(|_| invalid())?;
            RData::MX(MX::new(preference, exchange))
        }
        RecordType::CAA => caa(value).ok_or_else(invalid)?,
        RecordType::SOA => soa(value, origin).ok_or_else(invalid)?,
        other => return Err(Error::UnsupportedRecordType(other.to_string())),
    };

    Ok(Record::from_rdata(name, ttl, rdata))
}

/// Build one record per value, all sharing `name`, `rtype` and `ttl`.
///
/// # Errors
///
/// Returns the first error [`new_rr`] reports.
pub fn new_rrs(
    name: &Name,
    rtype: RecordType,
    ttl: u32,
    values: &[String],
    origin: &Name,
) -> Result<Vec<Record>, Error> {
    values
        .iter()
        .map(|value| new_rr(name.clone(), rtype, ttl, value, origin))
        .collect()
}

/// Parse zone-file style record lines:
///
/// ```text
/// ; comment
/// @      60 IN NS  ns1
/// *      60 IN A   192.0.2.1
/// mx     IN 60 MX  10 mx
/// static    IN TXT "a,b"
/// ```
///
/// Each line is `name [ttl] [IN] type value...`; TTL and class may come in either order and
/// the TTL defaults to [`DEFAULT_TTL`]. Owner names are qualified like values in [`new_rr`].
///
/// # Errors
///
/// Returns [`Error::MalformedRecordLine`] for lines missing a type or value, otherwise the
/// error [`new_rr`] reports for the line's value.
pub fn parse_records(text: &str, origin: &Name) -> Result<Vec<Record>, Error> {
    let mut records = Vec::new();

    for line in text.lines() {
        let line = line.split_once(';').map_or(line, |(content, _)| content).trim();
        if line.is_empty() {
            continue;
        }

        let malformed = || Error::MalformedRecordLine(line.to_string());
        let mut tokens = line.split_whitespace().peekable();

        let owner = tokens.next().ok_or_else(malformed)?;
        let owner = relative_name(owner, origin).map_err(|_| malformed())?;

        let mut ttl = DEFAULT_TTL;
        while let Some(token) = tokens.peek() {
            if token.eq_ignore_ascii_case("IN") {
                tokens.next();
            } else if let Ok(parsed) = token.parse::<u32>() {
                ttl = parsed;
                tokens.next();
            } else {
                break;
            }
        }

        let rtype = tokens.next().ok_or_else(malformed)?;
        let rtype = RecordType::from_str(&rtype.to_ascii_uppercase())
            .map_err(|_| Error::UnsupportedRecordType(rtype.to_string()))?;

        let value = tokens.collect::<Vec<_>>().join(" ");
        if value.is_empty() {
            return Err(malformed());
        }

        records.push(new_rr(owner, rtype, ttl, &value, origin)?);
    }

    Ok(records)
}

/// The records every deployment serves: apex and wildcard NS, A/AAAA and MX plus a CAA
/// record for the apex. The SOA is answered separately by [`SoaFinder`][crate::dns::SoaFinder]
/// so its serial follows the current date.
///
/// With an IPv4 `ip` the AAAA records carry its IPv4-mapped IPv6 form.
///
/// # Errors
///
/// Returns [`Error::DNSError`] if `origin` can't be extended with the fixed labels.
pub fn default_records(origin: &Name, ip: IpAddr) -> Result<Vec<Record>, Error> {
    let apex = origin.clone();
    let wildcard = Name::from_ascii("*")?.append_domain(origin)?;
    let ns1 = Name::from_ascii("ns1")?.append_domain(origin)?;
    let ns2 = Name::from_ascii("ns2")?.append_domain(origin)?;
    let mx = Name::from_ascii("mx")?.append_domain(origin)?;

    let mut shared = vec![
        (STATIC_TTL, RData::NS(ns1)),
        (STATIC_TTL, RData::NS(ns2)),
        (STATIC_TTL, RData::MX(MX::new(10, mx))),
    ];
    match ip {
        IpAddr::V4(ipv4_addr) => {
            shared.push((STATIC_TTL, RData::A(ipv4_addr)));
            shared.push((DEFAULT_TTL, RData::AAAA(ipv4_addr.to_ipv6_mapped())));
        }
        IpAddr::V6(ipv6_addr) => shared.push((DEFAULT_TTL, RData::AAAA(ipv6_addr))),
    }

    let mut records = Vec::with_capacity(shared.len() * 2 + 1);
    for name in [apex.clone(), wildcard] {
        records.extend(
            shared
                .iter()
                .map(|(ttl, rdata)| Record::from_rdata(name.clone(), *ttl, rdata.clone())),
        );
    }
    records.push(Record::from_rdata(
        apex,
        DEFAULT_TTL,
        RData::CAA(CAA::new_issue(
            false,
            Some(Name::from_ascii("letsencrypt.org")?),
            vec![],
        )),
    ));

    Ok(records)
}

/// SOA record for `owner`, serial set to today's UTC date.
#[must_use]
pub fn soa_record(owner: Name, mname: Name, rname: Name) -> Record {
    Record::from_rdata(owner, DEFAULT_TTL, RData::SOA(soa_rdata(mname, rname)))
}

fn soa_rdata(mname: Name, rname: Name) -> SOA {
    // NB: unwraps are safe: known date format producing values that will always parse as u32.
    let serial: u32 = OffsetDateTime::now_utc()
        .format(&SERIAL_FORMATTER)
        .unwrap()
        .parse()
        .unwrap();
    // See RIPE 203[0] for recommended values.
    // [0]: https://www.ripe.net/publications/docs/ripe-203
    SOA::new(
        mname,
        rname,
        serial,
        86_400,    // 24 hrs.
        7_200,     // 2 hours.
        3_600_000, // 1000 hours.
        172_800,   // 2 days.
    )
}

fn relative_name(value: &str, origin: &Name) -> Result<Name, Error> {
    if value == "@" {
        return Ok(origin.clone());
    }
    let name = Name::from_ascii(value)?;
    if name.is_fqdn() {
        Ok(name)
    } else {
        Ok(name.append_domain(origin)?)
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

// `flags tag "value"`, only the issue and issuewild properties.
fn caa(value: &str) -> Option<RData> {
    let mut parts = value.splitn(3, char::is_whitespace);
    let flags: u8 = parts.next()?.parse().ok()?;
    let tag = parts.next()?;
    let issuer = unquote(parts.next()?.trim());

    let critical = flags & 0b1000_0000 != 0;
    let name = if issuer.is_empty() {
        None
    } else {
        Some(Name::from_ascii(issuer).ok()?)
    };

    match tag.to_ascii_lowercase().as_str() {
        "issue" => Some(RData::CAA(CAA::new_issue(critical, name, vec![]))),
        "issuewild" => Some(RData::CAA(CAA::new_issuewild(critical, name, vec![]))),
        _ => None,
    }
}

// `mname rname serial refresh retry expire minimum`
fn soa(value: &str, origin: &Name) -> Option<RData> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    let [mname, rname, serial, refresh, retry, expire, minimum] = fields[..] else {
        return None;
    };
    Some(RData::SOA(SOA::new(
        relative_name(mname, origin).ok()?,
        relative_name(rname, origin).ok()?,
        serial.parse().ok()?,
        refresh.parse().ok()?,
        retry.parse().ok()?,
        expire.parse().ok()?,
        minimum.parse().ok()?,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Name {
        Name::from_ascii("sonar.test.").unwrap()
    }

    fn name(s: &str) -> Name {
        Name::from_ascii(s).unwrap()
    }

    #[test]
    fn test_new_rr() {
        let o = origin();
        let cases = [
            (RecordType::A, "192.168.1.1", "IN A 192.168.1.1"),
            (RecordType::AAAA, "2001:db8::1", "IN AAAA 2001:db8::1"),
            (RecordType::MX, "10 mx", "IN MX 10 mx.sonar.test."),
            (RecordType::CNAME, "example.com.", "IN CNAME example.com."),
            (RecordType::NS, "ns1", "IN NS ns1.sonar.test."),
        ];
        for (rtype, value, expected) in cases {
            let rr = new_rr(name("x.sonar.test."), rtype, 60, value, &o).unwrap();
            assert_eq!(rr.record_type(), rtype);
            assert_eq!(rr.ttl(), 60);
            assert!(
                rr.to_string().contains(expected),
                "{rr} does not contain {expected}"
            );
        }
    }

    #[test]
    fn test_new_rr_txt_splits_on_comma() {
        let rr = new_rr(name("x.sonar.test."), RecordType::TXT, 60, "a,b", &origin()).unwrap();
        let rendered = rr.to_string();
        assert!(rendered.contains('a') && rendered.contains('b'));
        assert!(!rendered.contains("a,b"));
    }

    #[test]
    fn test_new_rr_errors() {
        let o = origin();
        assert!(matches!(
            new_rr(name("x.sonar.test."), RecordType::A, 60, "nope", &o),
            Err(Error::InvalidRecord {
                rtype: RecordType::A,
                ..
            })
        ));
        assert!(matches!(
            new_rr(name("x.sonar.test."), RecordType::MX, 60, "mx", &o),
            Err(Error::InvalidRecord { .. })
        ));
        assert!(matches!(
            new_rr(name("x.sonar.test."), RecordType::PTR, 60, "x.", &o),
            Err(Error::UnsupportedRecordType(_))
        ));
    }

    #[test]
    fn test_parse_records() {
        let text = r#"
            ; static records
            @ IN 60 NS ns1
            static 120 IN A 192.0.2.10
            txt IN TXT "hello"
            * 60 IN CAA 0 issue "letsencrypt.org"
            @ 60 IN SOA ns1 hostmaster 2023010101 86400 7200 3600000 172800
        "#;
        let records = parse_records(text, &origin()).unwrap();
        assert_eq!(records.len(), 5);

        assert_eq!(records[0].name(), &origin());
        assert_eq!(records[0].record_type(), RecordType::NS);

        assert_eq!(records[1].name(), &name("static.sonar.test."));
        assert_eq!(records[1].ttl(), 120);

        assert_eq!(records[2].ttl(), DEFAULT_TTL);
        assert_eq!(records[2].record_type(), RecordType::TXT);

        assert_eq!(records[3].name(), &name("*.sonar.test."));
        assert_eq!(records[3].record_type(), RecordType::CAA);

        assert_eq!(records[4].record_type(), RecordType::SOA);
        assert!(records[4].to_string().contains("hostmaster.sonar.test."));
    }

    #[test]
    fn test_parse_records_malformed() {
        assert!(matches!(
            parse_records("@ 60 IN", &origin()),
            Err(Error::MalformedRecordLine(_))
        ));
        assert!(matches!(
            parse_records("@ 60 IN A", &origin()),
            Err(Error::MalformedRecordLine(_))
        ));
    }

    #[test]
    fn test_default_records() {
        let o = origin();
        let records = default_records(&o, "192.0.2.1".parse().unwrap()).unwrap();

        let find = |n: &Name, t: RecordType| {
            records
                .iter()
                .filter(|r| r.name() == n && r.record_type() == t)
                .collect::<Vec<_>>()
        };
        let wildcard = name("*.sonar.test.");
        for n in [&o, &wildcard] {
            assert_eq!(find(n, RecordType::NS).len(), 2);
            assert_eq!(find(n, RecordType::A).len(), 1);
            assert_eq!(find(n, RecordType::AAAA).len(), 1);
            assert_eq!(find(n, RecordType::MX).len(), 1);
            assert!(find(n, RecordType::SOA).is_empty());

            assert!(find(n, RecordType::NS).iter().all(|r| r.ttl() == STATIC_TTL));
            assert_eq!(find(n, RecordType::A)[0].ttl(), STATIC_TTL);
            assert_eq!(find(n, RecordType::MX)[0].ttl(), STATIC_TTL);
            assert_eq!(find(n, RecordType::AAAA)[0].ttl(), DEFAULT_TTL);
        }
        assert_eq!(find(&o, RecordType::CAA).len(), 1);
        assert!(find(&wildcard, RecordType::CAA).is_empty());

        let aaaa = find(&o, RecordType::AAAA)[0];
        assert!(aaaa.to_string().contains("::ffff:192.0.2.1"));
    }

    #[test]
    fn test_default_records_ipv6() {
        let records = default_records(&origin(), "2001:db8::1".parse().unwrap()).unwrap();
        assert!(records.iter().all(|r| r.record_type() != RecordType::A));
        assert_eq!(
            records
                .iter()
                .filter(|r| r.record_type() == RecordType::AAAA)
                .count(),
            2
        );
    }

    #[test]
    fn test_soa_serial_is_todays_date() {
        let today = OffsetDateTime::now_utc().format(&SERIAL_FORMATTER).unwrap();
        let soa = soa_record(origin(), name("ns1.sonar.test."), name("hostmaster.sonar.test."));
        assert_eq!(soa.record_type(), RecordType::SOA);
        let rendered = soa.to_string();
        assert!(rendered.contains(&format!(" {today} ")), "{rendered}");
        assert!(rendered.contains("hostmaster.sonar.test."));
    }
}
