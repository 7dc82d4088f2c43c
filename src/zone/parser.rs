//! Positional decoding of one zone-file line into a [`ZoneRecord`].
//!
//! CZDS zone files are BIND master files with one record per line and no
//! continuation or `$ORIGIN` handling needed:
//!
//! ```text
//! example.com.    3600  IN  A     192.0.2.1
//! example.com.    IN    3600 NS   ns1.example.net.
//! ```
//!
//! TTL and class may appear in either order. The field after the owner
//! name decides: a number is the TTL (and the next field the class),
//! anything else is the class (and the next field the TTL).

use crate::types::ZoneRecord;

/// Decodes lines of one zone into records
#[derive(Clone, Debug)]
pub struct ZoneLineParser {
    zone_name: String,
}

impl ZoneLineParser {
    /// Create a parser that stamps every record with `zone_name`
    pub fn new(zone_name: impl Into<String>) -> Self {
        Self {
            zone_name: zone_name.into(),
        }
    }

    /// Zone this parser decodes lines for
    pub fn zone_name(&self) -> &str {
        &self.zone_name
    }

    /// Decode one line. See [`parse_line`].
    pub fn parse(&self, line: &str) -> ZoneRecord {
        parse_line(&self.zone_name, line)
    }
}

/// Decode one whitespace-delimited zone-file line.
///
/// Never fails: short lines leave trailing fields empty and a blank line
/// yields an all-empty record. Use [`ZoneRecord::is_complete`] to skip them.
///
/// ```
/// use czds_dl::zone::parse_line;
///
/// let record = parse_line("com", "example.com. 3600 IN A 192.0.2.1");
/// assert_eq!(record.dns_record, "example.com");
/// assert_eq!(record.ttl.as_deref(), Some("3600"));
/// assert_eq!(record.record_class.as_deref(), Some("IN"));
/// assert_eq!(record.record_type, "A");
/// assert_eq!(record.record_data, "192.0.2.1");
/// ```
pub fn parse_line(zone_name: &str, line: &str) -> ZoneRecord {
    let mut fields = line.split_whitespace();
    let mut record = ZoneRecord {
        zone_name: zone_name.to_string(),
        ..ZoneRecord::default()
    };

    let Some(owner) = fields.next() else {
        return record;
    };
    record.dns_record = owner.strip_suffix('.').unwrap_or(owner).to_string();

    match fields.next() {
        Some(second) if is_ttl(second) => {
            record.ttl = Some(second.to_string());
            record.record_class = fields.next().map(str::to_string);
        }
        Some(second) => {
            record.record_class = Some(second.to_string());
            record.ttl = fields.next().map(str::to_string);
        }
        None => return record,
    }

    record.record_type = fields.next().unwrap_or_default().to_string();
    record.record_data = fields.collect::<Vec<_>>().join(" ");
    record
}

/// An unsigned decimal integer
fn is_ttl(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit())
}
