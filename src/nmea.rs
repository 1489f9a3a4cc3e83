//! Decoder for the NMEA 0183 sentences a serial GPS receiver streams.
//!
//! Only the two sentences that carry a position are understood:
//!
//! - `GGA`, fix data, which also carries the horizontal dilution of precision
//!   that we turn into an accuracy estimate.
//! - `RMC`, recommended minimum data, which carries no accuracy at all.
//!
//! Any talker prefix is accepted (`GP`, `GN`, `GL`, ...). The trailing
//! `*hh` checksum is checked when the receiver sends one.

use crate::geo::{Coordinate, Meters};

use log::warn;

use nom::{
    bytes::complete::{take_till, take_while_m_n},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, map_res, opt},
    error::Error,
    number::complete::double,
    sequence::{pair, preceded, terminated, tuple},
    Finish, IResult,
};

use std::{fmt, str::FromStr};

/// User equivalent range error assumed when converting HDOP to metres.
const UERE_M: Meters = 5.0;

/// Sentences are at most 82 bytes, with some room for sloppy receivers.
pub const MAX_SENTENCE: usize = 128;

/// A position decoded from a single sentence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmeaFix {
    pub position: Coordinate,
    pub accuracy_m: Option<Meters>,
}

/// What a line from the receiver turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    /// A usable position.
    Fix(NmeaFix),
    /// A position sentence reporting that the receiver has no fix yet.
    NoFix,
    /// A well formed sentence we have no use for, tagged with its type.
    Unsupported(String),
}

#[derive(Debug, PartialEq)]
pub enum NmeaError {
    /// The line is not shaped like `$<body>*hh`.
    Syntax(Error<String>),
    /// The checksum in the line does not match its body.
    Checksum { expected: u8, computed: u8 },
    /// A field required for a fix is missing or malformed.
    Field(&'static str),
}

impl fmt::Display for NmeaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NmeaError::Syntax(e) => write!(f, "malformed sentence: {e}"),
            NmeaError::Checksum { expected, computed } => write!(
                f,
                "checksum mismatch: sentence says {expected:02X}, body hashes to {computed:02X}"
            ),
            NmeaError::Field(name) => write!(f, "bad or missing {name} field"),
        }
    }
}

impl std::error::Error for NmeaError {}

impl From<Error<&str>> for NmeaError {
    fn from(Error { input, code }: Error<&str>) -> Self {
        NmeaError::Syntax(Error {
            input: input.to_string(),
            code,
        })
    }
}

/// XOR of every byte between `$` and `*`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

fn parse_hex_byte(s: &str) -> IResult<&str, u8> {
    map_res(
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        |h: &str| u8::from_str_radix(h, 16),
    )(s)
}

/// Splits a line into its body and optional checksum.
fn parse_frame(s: &str) -> IResult<&str, (&str, Option<u8>)> {
    terminated(
        tuple((
            preceded(char('$'), take_till(|c| c == '*' || c == '\r' || c == '\n')),
            opt(preceded(char('*'), parse_hex_byte)),
        )),
        multispace0,
    )(s)
}

/// `ddmm.mmmm` (latitude, two degree digits) or `dddmm.mmmm` (longitude,
/// three degree digits) into decimal degrees.
fn parse_degrees_minutes(s: &str, degree_digits: usize) -> IResult<&str, f64> {
    map(
        pair(
            map_res(
                take_while_m_n(degree_digits, degree_digits, |c: char| c.is_ascii_digit()),
                |d: &str| d.parse::<f64>(),
            ),
            double,
        ),
        |(degrees, minutes)| degrees + minutes / 60.0,
    )(s)
}

fn coordinate_field(
    value: &str,
    hemisphere: &str,
    degree_digits: usize,
    positive: &str,
    negative: &str,
    name: &'static str,
) -> Result<f64, NmeaError> {
    if value.is_empty() {
        return Err(NmeaError::Field(name));
    }
    let (_, magnitude) =
        all_consuming(|s| parse_degrees_minutes(s, degree_digits))(value).finish()?;
    if hemisphere == positive {
        Ok(magnitude)
    } else if hemisphere == negative {
        Ok(-magnitude)
    } else {
        Err(NmeaError::Field(name))
    }
}

fn position_from(fields: &[&str], first: usize) -> Result<Coordinate, NmeaError> {
    let field = |i: usize| fields.get(first + i).copied().unwrap_or("");
    let lat = coordinate_field(field(0), field(1), 2, "N", "S", "latitude")?;
    let lng = coordinate_field(field(2), field(3), 3, "E", "W", "longitude")?;
    let position = Coordinate::new(lat, lng);
    if position.is_valid() {
        Ok(position)
    } else {
        Err(NmeaError::Field("position"))
    }
}

fn parse_gga(fields: &[&str]) -> Result<Sentence, NmeaError> {
    let quality = fields.get(6).copied().unwrap_or("");
    if quality.is_empty() || quality == "0" {
        return Ok(Sentence::NoFix);
    }
    let position = position_from(fields, 2)?;
    let accuracy_m = fields
        .get(8)
        .and_then(|hdop| hdop.parse::<f64>().ok())
        .map(|hdop| hdop * UERE_M);
    Ok(Sentence::Fix(NmeaFix {
        position,
        accuracy_m,
    }))
}

fn parse_rmc(fields: &[&str]) -> Result<Sentence, NmeaError> {
    match fields.get(2).copied() {
        Some("A") => Ok(Sentence::Fix(NmeaFix {
            position: position_from(fields, 3)?,
            accuracy_m: None,
        })),
        Some("V") => Ok(Sentence::NoFix),
        _ => Err(NmeaError::Field("status")),
    }
}

impl FromStr for Sentence {
    type Err = NmeaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, (body, expected)) = parse_frame(s.trim_start()).finish()?;

        if let Some(expected) = expected {
            let computed = checksum(body);
            if computed != expected {
                return Err(NmeaError::Checksum { expected, computed });
            }
        }

        let fields: Vec<&str> = body.split(',').collect();
        let kind = fields
            .first()
            .filter(|id| id.len() >= 5 && id.is_ascii())
            .map(|id| &id[id.len() - 3..])
            .ok_or(NmeaError::Field("sentence id"))?;

        match kind {
            "GGA" => parse_gga(&fields),
            "RMC" => parse_rmc(&fields),
            other => Ok(Sentence::Unsupported(other.to_owned())),
        }
    }
}

/// Cuts a byte stream into lines. A line that runs past [`MAX_SENTENCE`]
/// is dropped whole, so a port at the wrong baud rate cannot grow it forever.
#[derive(Debug, Default)]
pub struct LineFramer {
    line: Vec<u8>,
    overflowed: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            line: Vec::with_capacity(MAX_SENTENCE),
            overflowed: false,
        }
    }

    /// Feeds one byte, handing back the line it completes, if any.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        if byte != b'\n' {
            if self.line.len() < MAX_SENTENCE {
                self.line.push(byte);
            } else if !self.overflowed {
                self.overflowed = true;
                warn!("no line break in {MAX_SENTENCE} bytes, is the baud rate right?");
            }
            return None;
        }
        let line = std::mem::take(&mut self.line);
        if std::mem::take(&mut self.overflowed) {
            None
        } else {
            Some(line)
        }
    }

    /// Bytes of the unfinished line.
    pub fn pending(&self) -> usize {
        self.line.len()
    }
}

/// Tracks whether the receiver has a fix, to report only losing it.
#[derive(Debug)]
pub struct FixWatch {
    had_fix: bool,
}

impl FixWatch {
    /// Starts out as if a fix was held, so a cold start is reported once.
    pub fn new() -> Self {
        Self { had_fix: true }
    }

    /// True when `sentence` is the first without a fix after one with it.
    pub fn observe(&mut self, sentence: &Sentence) -> bool {
        match sentence {
            Sentence::Fix(_) => {
                self.had_fix = true;
                false
            }
            Sentence::NoFix => std::mem::replace(&mut self.had_fix, false),
            Sentence::Unsupported(_) => false,
        }
    }
}

impl Default for FixWatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_checksum(body: &str) -> String {
        format!("${}*{:02X}\r\n", body, checksum(body))
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    #[test]
    fn decodes_gga() {
        let s = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

        match s.parse::<Sentence>().unwrap() {
            Sentence::Fix(fix) => {
                assert_close(fix.position.lat, 48.1173);
                assert_close(fix.position.lng, 11.0 + 31.0 / 60.0);
                assert_close(fix.accuracy_m.unwrap(), 4.5);
            }
            other => panic!("expected a fix, got {other:?}"),
        }
    }

    #[test]
    fn decodes_rmc() {
        let s = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

        let sentence: Sentence = s.parse().unwrap();
        let Sentence::Fix(fix) = sentence else {
            panic!("expected a fix");
        };
        assert_close(fix.position.lat, 48.1173);
        assert_eq!(fix.accuracy_m, None);
    }

    #[test]
    fn southern_and_western_hemispheres_are_negative() {
        let line = with_checksum("GNGGA,101010.00,2737.85257,S,04840.78182,W,1,09,1.2,12.0,M,0.0,M,,");

        let Ok(Sentence::Fix(fix)) = line.parse::<Sentence>() else {
            panic!("expected a fix");
        };
        assert_close(fix.position.lat, -(27.0 + 37.85257 / 60.0));
        assert_close(fix.position.lng, -(48.0 + 40.78182 / 60.0));
        assert_close(fix.accuracy_m.unwrap(), 6.0);
    }

    #[test]
    fn zero_quality_is_no_fix() {
        let line = with_checksum("GPGGA,000000,,,,,0,00,99.9,,M,,M,,");
        assert_eq!(line.parse::<Sentence>(), Ok(Sentence::NoFix));

        let line = with_checksum("GPRMC,000000,V,,,,,,,010100,,,N");
        assert_eq!(line.parse::<Sentence>(), Ok(Sentence::NoFix));
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let s = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48";
        assert_eq!(
            s.parse::<Sentence>(),
            Err(NmeaError::Checksum {
                expected: 0x48,
                computed: 0x47
            })
        );
    }

    #[test]
    fn sentence_without_checksum_is_accepted() {
        let s = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        assert!(matches!(s.parse::<Sentence>(), Ok(Sentence::Fix(_))));
    }

    #[test]
    fn other_sentences_are_unsupported() {
        let line = with_checksum("GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00");
        assert_eq!(
            line.parse::<Sentence>(),
            Ok(Sentence::Unsupported("GSV".to_owned()))
        );
    }

    #[test]
    fn garbage_is_a_syntax_error() {
        assert!(matches!(
            "\u{0}\u{1}garbage".parse::<Sentence>(),
            Err(NmeaError::Syntax(_))
        ));
    }

    #[test]
    fn non_ascii_sentence_id_is_a_field_error() {
        assert_eq!(
            "$GPéAB,1,2".parse::<Sentence>(),
            Err(NmeaError::Field("sentence id"))
        );
        assert_eq!(
            with_checksum("GPGGé,1,2").parse::<Sentence>(),
            Err(NmeaError::Field("sentence id"))
        );
    }

    #[test]
    fn framer_splits_lines() {
        let mut framer = LineFramer::new();
        let lines: Vec<Vec<u8>> = b"$GPGSV,1\r\n$GPGGA,2\n$GP"
            .iter()
            .filter_map(|&b| framer.push(b))
            .collect();
        assert_eq!(lines, [b"$GPGSV,1\r".to_vec(), b"$GPGGA,2".to_vec()]);
        assert_eq!(framer.pending(), 3);
    }

    #[test]
    fn framer_drops_runaway_lines() {
        let mut framer = LineFramer::new();
        for _ in 0..10_000 {
            assert_eq!(framer.push(b'x'), None);
        }
        assert_eq!(framer.pending(), MAX_SENTENCE);
        assert_eq!(framer.push(b'\n'), None);

        let next: Vec<Vec<u8>> = b"$GPGGA\n".iter().filter_map(|&b| framer.push(b)).collect();
        assert_eq!(next, [b"$GPGGA".to_vec()]);
    }

    #[test]
    fn fix_watch_reports_only_losing_the_fix() {
        let fix = Sentence::Fix(NmeaFix {
            position: Coordinate::new(-27.6, -48.7),
            accuracy_m: None,
        });
        let mut watch = FixWatch::new();

        let seen: Vec<bool> = [
            Sentence::NoFix,
            Sentence::NoFix,
            Sentence::Unsupported("GSV".into()),
            Sentence::NoFix,
            fix.clone(),
            fix,
            Sentence::NoFix,
            Sentence::NoFix,
        ]
        .iter()
        .map(|s| watch.observe(s))
        .collect();
        assert_eq!(seen, [true, false, false, false, false, false, true, false]);
    }

    #[test]
    fn truncated_coordinates_are_field_errors() {
        let line = with_checksum("GPGGA,123519,48,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        assert!(matches!(
            line.parse::<Sentence>(),
            Err(NmeaError::Syntax(_)) | Err(NmeaError::Field(_))
        ));

        let line = with_checksum("GPGGA,123519,4807.038,Q,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        assert_eq!(line.parse::<Sentence>(), Err(NmeaError::Field("latitude")));
    }
}
