use trust_dns_proto::rr::{Name, Record};

/// Lowercase `name` and make sure it ends with the root label.
#[must_use]
pub fn fqdn(name: &str) -> String {
    let mut name = name.to_ascii_lowercase();
    if !name.ends_with('.') {
        name.push('.');
    }
    name
}

/// Whether `name` is `origin` itself or a name below it. Both must be lowercase FQDNs.
#[must_use]
pub fn in_zone(name: &str, origin: &str) -> bool {
    if name == origin {
        return true;
    }
    name.strip_suffix(origin)
        .map_or(false, |prefix| prefix.ends_with('.'))
}

/// Wildcard generalizations of `name` inside `origin`, most specific first.
///
/// For each label boundary the leftmost remaining label is replaced by `*`:
/// `a.b.tok.origin.` yields `*.b.tok.origin.`, `*.tok.origin.`, `*.origin.`.
/// The query name itself is not part of the result and nothing above `origin` is generated.
#[must_use]
pub fn make_wildcards(name: &str, origin: &str) -> Vec<String> {
    let Some(prefix) = name.strip_suffix(origin) else {
        return Vec::new();
    };

    let mut wildcards = Vec::new();
    let mut rest = prefix;
    while let Some((_, tail)) = rest.split_once('.') {
        let candidate = format!("*.{tail}{origin}");
        if candidate != name {
            wildcards.push(candidate);
        }
        rest = tail;
    }
    wildcards
}

/// Rename every wildcard-named record to the name that was queried.
///
/// Records are owned copies of whatever a finder holds, so the stored records keep their
/// wildcard names.
#[must_use]
pub fn fix_wildcards(mut records: Vec<Record>, qname: &Name) -> Vec<Record> {
    for record in &mut records {
        if record.name().to_ascii().starts_with('*') {
            record.set_name(qname.clone());
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use trust_dns_proto::rr::RData;

    #[test]
    fn test_fqdn() {
        assert_eq!(fqdn("Sonar.Test"), "sonar.test.");
        assert_eq!(fqdn("sonar.test."), "sonar.test.");
    }

    #[test]
    fn test_in_zone() {
        assert!(in_zone("sonar.test.", "sonar.test."));
        assert!(in_zone("a.b.sonar.test.", "sonar.test."));
        assert!(!in_zone("xsonar.test.", "sonar.test."));
        assert!(!in_zone("example.com.", "sonar.test."));
    }

    #[test]
    fn test_make_wildcards() {
        assert_eq!(
            make_wildcards("a.b.c1da9f3d.sonar.test.", "sonar.test."),
            vec![
                "*.b.c1da9f3d.sonar.test.",
                "*.c1da9f3d.sonar.test.",
                "*.sonar.test.",
            ]
        );
        assert_eq!(
            make_wildcards("c1da9f3d.sonar.test.", "sonar.test."),
            vec!["*.sonar.test."]
        );
        assert!(make_wildcards("sonar.test.", "sonar.test.").is_empty());
        assert_eq!(
            make_wildcards("*.b.sonar.test.", "sonar.test."),
            vec!["*.sonar.test."]
        );
    }

    #[test]
    fn test_fix_wildcards() {
        let wildcard = Name::from_ascii("*.c1da9f3d.sonar.test.").unwrap();
        let exact = Name::from_ascii("c1da9f3d.sonar.test.").unwrap();
        let qname = Name::from_ascii("a.b.c1da9f3d.sonar.test.").unwrap();

        let stored = vec![
            Record::from_rdata(wildcard.clone(), 60, RData::A(Ipv4Addr::new(1, 1, 1, 1))),
            Record::from_rdata(exact.clone(), 60, RData::A(Ipv4Addr::new(2, 2, 2, 2))),
        ];
        let fixed = fix_wildcards(stored.clone(), &qname);

        assert_eq!(fixed[0].name(), &qname);
        assert_eq!(fixed[1].name(), &exact);
        assert_eq!(stored[0].name(), &wildcard);
    }
}
