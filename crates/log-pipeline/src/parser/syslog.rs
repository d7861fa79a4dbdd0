//! Syslog envelope parser.
//!
//! Strips the syslog wrapper from a line and hands back the free-text
//! payload. Two framings are accepted:
//!
//! ```text
//! RFC 5424: <PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG
//! RFC 3164: <PRI>Mmm dd hh:mm:ss [HOSTNAME] TAG: MSG
//! ```
//!
//! For RFC 5424 the payload is rebuilt as `"{APP-NAME}: {MSG}"` so that process
//! markers are found the same way in both framings.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};

use crate::error::LogPipelineError;

/// Highest valid PRI value: facility 23 * 8 + severity 7.
const MAX_SYSLOG_PRI: u8 = 191;

/// Default upper bound on a single line.
pub const DEFAULT_MAX_INPUT_SIZE: usize = 64 * 1024;

/// Parsed syslog wrapper around a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogEnvelope {
    pub facility: u8,
    pub severity: u8,
    /// `None` for the RFC 5424 NILVALUE
    pub timestamp: Option<DateTime<Utc>>,
    /// Absent when the sender omitted it
    pub hostname: Option<String>,
    /// Message text, starting at the process tag
    pub payload: String,
}

/// Syslog envelope parser.
#[derive(Debug, Clone)]
pub struct SyslogParser {
    max_input_size: usize,
}

impl Default for SyslogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SyslogParser {
    pub fn new() -> Self {
        Self {
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
        }
    }

    /// Sets the maximum accepted line size in bytes.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// Parses one line into its envelope.
    pub fn parse(&self, raw: &str) -> Result<SyslogEnvelope, LogPipelineError> {
        if raw.len() > self.max_input_size {
            return Err(parse_error(
                0,
                format!(
                    "input too large: {} bytes (max: {})",
                    raw.len(),
                    self.max_input_size
                ),
            ));
        }

        let input = raw.trim();
        if input.is_empty() {
            return Err(parse_error(0, "empty input"));
        }

        let Some(after_lt) = input.strip_prefix('<') else {
            return Err(parse_error(0, "missing PRI field (expected '<')"));
        };
        let pri_end = after_lt
            .find('>')
            .ok_or_else(|| parse_error(0, "unterminated PRI field"))?;

        let pri_str = &after_lt[..pri_end];
        let pri: u8 = pri_str
            .parse()
            .map_err(|_| parse_error(1, format!("invalid PRI value: '{pri_str}'")))?;
        if pri > MAX_SYSLOG_PRI {
            return Err(parse_error(
                1,
                format!("PRI value {pri} out of valid range (0-{MAX_SYSLOG_PRI})"),
            ));
        }

        let (facility, severity) = decode_pri(pri);
        let remainder = &after_lt[pri_end + 1..];
        let body_offset = pri_end + 2;

        let (timestamp, hostname, payload) = match remainder.strip_prefix("1 ") {
            Some(body) => parse_rfc5424_body(body, body_offset + 2)?,
            None => parse_rfc3164_body(remainder, body_offset)?,
        };

        Ok(SyslogEnvelope {
            facility,
            severity,
            timestamp,
            hostname,
            payload,
        })
    }
}

fn parse_error(offset: usize, reason: impl Into<String>) -> LogPipelineError {
    LogPipelineError::Parse {
        format: "syslog".to_owned(),
        offset,
        reason: reason.into(),
    }
}

/// PRI = facility * 8 + severity
fn decode_pri(pri: u8) -> (u8, u8) {
    (pri / 8, pri % 8)
}

type Body = (Option<DateTime<Utc>>, Option<String>, String);

fn parse_rfc5424_body(body: &str, offset: usize) -> Result<Body, LogPipelineError> {
    let parts: Vec<&str> = body.splitn(6, ' ').collect();
    if parts.len() < 6 {
        return Err(parse_error(
            offset,
            format!(
                "RFC 5424 requires at least 6 fields after version, got {}",
                parts.len()
            ),
        ));
    }

    let timestamp = match nilvalue(parts[0]) {
        Some(ts) => Some(parse_rfc3339(ts, offset)?),
        None => None,
    };
    let hostname = nilvalue(parts[1]).map(str::to_owned);
    let app_name = nilvalue(parts[2]);

    let message = strip_structured_data(parts[5]);
    if message.is_empty() {
        return Err(parse_error(offset, "missing message"));
    }

    let payload = match app_name {
        Some(app) => format!("{app}: {message}"),
        None => message.to_owned(),
    };
    Ok((timestamp, hostname, payload))
}

fn parse_rfc3164_body(body: &str, offset: usize) -> Result<Body, LogPipelineError> {
    let (month, rest) = next_token(body).ok_or_else(|| parse_error(offset, "missing timestamp"))?;
    let (day, rest) = next_token(rest).ok_or_else(|| parse_error(offset, "missing timestamp"))?;
    let (time, rest) = next_token(rest).ok_or_else(|| parse_error(offset, "missing timestamp"))?;
    let timestamp = parse_bsd_timestamp(month, day, time, offset)?;

    let (first, after_first) =
        next_token(rest).ok_or_else(|| parse_error(offset, "missing message"))?;

    // A token ending in ':' is already the process tag: the sender left out
    // the hostname (pfSense does this for locally written logs).
    if first.ends_with(':') {
        let payload = rest.trim_start().to_owned();
        return Ok((Some(timestamp), None, payload));
    }

    let payload = after_first.trim();
    if payload.is_empty() {
        return Err(parse_error(offset, "missing message"));
    }
    Ok((Some(timestamp), Some(first.to_owned()), payload.to_owned()))
}

/// Splits off the next space-delimited token, skipping repeated spaces so that
/// space-padded days (`Jan  5`) parse.
fn next_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start_matches(' ');
    if input.is_empty() {
        return None;
    }
    match input.find(' ') {
        Some(idx) => Some((&input[..idx], &input[idx + 1..])),
        None => Some((input, "")),
    }
}

fn nilvalue(value: &str) -> Option<&str> {
    if value == "-" || value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_rfc3339(timestamp: &str, offset: usize) -> Result<DateTime<Utc>, LogPipelineError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            parse_error(
                offset,
                format!("invalid RFC 3339 timestamp '{timestamp}': {e}"),
            )
        })
}

/// Year used to validate a BSD date before the real year is known; a leap
/// year so that `Feb 29` passes.
const BSD_VALIDATION_YEAR: i32 = 2000;

/// BSD timestamps carry no year. The current year is assumed; a `Feb 29` seen
/// in a common year is placed in the most recent leap year.
fn parse_bsd_timestamp(
    month: &str,
    day: &str,
    time: &str,
    offset: usize,
) -> Result<DateTime<Utc>, LogPipelineError> {
    let with_year = format!("{BSD_VALIDATION_YEAR} {month} {day} {time}");
    let naive = NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S").map_err(|e| {
        parse_error(
            offset,
            format!("invalid BSD timestamp '{month} {day} {time}': {e}"),
        )
    })?;

    let current = Utc::now().year();
    (0..8)
        .find_map(|back| naive.with_year(current - back))
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .ok_or_else(|| {
            parse_error(
                offset,
                format!("no year fits BSD timestamp '{month} {day} {time}'"),
            )
        })
}

/// Drops the STRUCTURED-DATA element(s) in front of an RFC 5424 message.
///
/// SD is `-` or one or more `[...]` blocks; quoted values may contain
/// escaped `]` and `"`.
fn strip_structured_data(sd_and_msg: &str) -> &str {
    if sd_and_msg == "-" {
        return "";
    }
    if let Some(msg) = sd_and_msg.strip_prefix("- ") {
        return msg.trim();
    }
    if !sd_and_msg.starts_with('[') {
        return sd_and_msg.trim();
    }

    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    for (idx, ch) in sd_and_msg.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            '[' if !in_quote => depth += 1,
            ']' if !in_quote => {
                depth = depth.saturating_sub(1);
                let rest = &sd_and_msg[idx + 1..];
                if depth == 0 && !rest.starts_with('[') {
                    return rest.trim();
                }
            }
            _ => {}
        }
    }

    // unterminated SD: no message
    ""
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> SyslogParser {
        SyslogParser::new()
    }

    #[test]
    fn rfc3164_without_hostname() {
        let env = parser()
            .parse("<134>May 22 00:32:39 filterlog: 5,,,1000000103,igb0,match,block,in,4")
            .unwrap();
        assert_eq!(env.facility, 16);
        assert_eq!(env.severity, 6);
        assert!(env.hostname.is_none());
        assert_eq!(
            env.payload,
            "filterlog: 5,,,1000000103,igb0,match,block,in,4"
        );
    }

    #[test]
    fn rfc3164_with_hostname_and_pid() {
        let env = parser()
            .parse("<134>Jan 15 12:00:00 fw.lan dhcpd[4242]: DHCPACK on 10.0.0.5")
            .unwrap();
        assert_eq!(env.hostname.as_deref(), Some("fw.lan"));
        assert_eq!(env.payload, "dhcpd[4242]: DHCPACK on 10.0.0.5");
        assert!(env.timestamp.is_some());
    }

    #[test]
    fn rfc3164_space_padded_day() {
        let env = parser()
            .parse("<134>Jan  5 01:02:03 filterlog: 1,2,3")
            .unwrap();
        assert_eq!(env.payload, "filterlog: 1,2,3");
    }

    #[test]
    fn rfc3164_bad_timestamp_is_error() {
        let err = parser()
            .parse("<134>Foo 99 25:61:00 filterlog: x")
            .unwrap_err();
        assert!(matches!(err, LogPipelineError::Parse { .. }));
    }

    #[test]
    fn rfc3164_leap_day_is_accepted_in_any_year() {
        let env = parser()
            .parse("<134>Feb 29 00:32:39 filterlog: 101,,,1000000103,igb0,match,pass,out,4")
            .unwrap();
        assert_eq!(
            env.payload,
            "filterlog: 101,,,1000000103,igb0,match,pass,out,4"
        );

        let ts = env.timestamp.unwrap();
        assert_eq!((ts.month(), ts.day()), (2, 29));
        assert!(ts.year() <= Utc::now().year());
        assert!(Utc::now().year() - ts.year() < 8);
    }

    #[test]
    fn rfc3164_impossible_day_is_error() {
        assert!(parser().parse("<134>Feb 30 00:32:39 filterlog: 1,2,3").is_err());
        assert!(parser().parse("<134>Apr 31 00:32:39 filterlog: 1,2,3").is_err());
    }

    #[test]
    fn rfc3164_missing_message_is_error() {
        assert!(parser().parse("<134>Jan 15 12:00:00").is_err());
        assert!(parser().parse("<134>Jan 15 12:00:00 hostonly").is_err());
    }

    #[test]
    fn rfc5424_payload_carries_app_name() {
        let env = parser()
            .parse("<134>1 2024-05-22T00:32:39+02:00 fw filterlog 1234 - - 5,,,1000000103,igb0")
            .unwrap();
        assert_eq!(env.hostname.as_deref(), Some("fw"));
        assert_eq!(env.payload, "filterlog: 5,,,1000000103,igb0");
        assert!(env.timestamp.is_some());
    }

    #[test]
    fn rfc5424_nil_values() {
        let env = parser().parse("<13>1 - - - - - - hello").unwrap();
        assert!(env.timestamp.is_none());
        assert!(env.hostname.is_none());
        assert_eq!(env.payload, "hello");
    }

    #[test]
    fn rfc5424_structured_data_is_skipped() {
        let env = parser()
            .parse(r#"<165>1 2024-01-15T12:00:00Z h dhcpd - - [meta a="x\]y"][b c="d"] DHCPACK on 10.0.0.5"#)
            .unwrap();
        assert_eq!(env.payload, "dhcpd: DHCPACK on 10.0.0.5");
    }

    #[test]
    fn rfc5424_too_few_fields() {
        assert!(parser().parse("<13>1 2024-01-15T12:00:00Z host").is_err());
    }

    #[test]
    fn rfc5424_invalid_timestamp() {
        assert!(parser().parse("<13>1 yesterday h app - - - msg").is_err());
    }

    #[test]
    fn rejects_bad_pri() {
        assert!(parser().parse("no pri here").is_err());
        assert!(parser().parse("<134 unterminated").is_err());
        assert!(parser().parse("<abc>Jan 15 12:00:00 x: y").is_err());
        assert!(parser().parse("<192>Jan 15 12:00:00 x: y").is_err());
    }

    #[test]
    fn rejects_empty_and_oversize() {
        assert!(parser().parse("").is_err());
        assert!(parser().parse("   ").is_err());

        let small = SyslogParser::new().with_max_input_size(16);
        let err = small
            .parse("<134>Jan 15 12:00:00 filterlog: 1,2,3")
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn next_token_skips_padding() {
        assert_eq!(next_token("  a b"), Some(("a", "b")));
        assert_eq!(next_token("a"), Some(("a", "")));
        assert_eq!(next_token("   "), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_arbitrary_text_does_not_panic(text in "\\PC{0,500}") {
                let _ = SyslogParser::new().parse(&text);
            }

            #[test]
            fn valid_priorities_decode(pri in 0u8..=191) {
                let raw = format!("<{pri}>May 22 00:32:39 pfsense filterlog: 1,2,3");
                let envelope = SyslogParser::new().parse(&raw).unwrap();
                prop_assert_eq!(envelope.facility, pri / 8);
                prop_assert_eq!(envelope.severity, pri % 8);
                prop_assert_eq!(envelope.payload, "filterlog: 1,2,3");
            }

            #[test]
            fn rfc5424_message_survives(msg in "[ -~]{1,200}") {
                let raw = format!("<134>1 2019-05-22T00:32:39Z host filterlog - - - {msg}");
                if let Ok(envelope) = SyslogParser::new().parse(&raw) {
                    prop_assert!(envelope.payload.starts_with("filterlog:"));
                }
            }
        }
    }
}
