//! NMEA 0183 sentence encoding and decoding.
//!
//! One sentence is one ASCII line of the form `$TTKKK,field1,field2,...*CC`
//! where `TT` is the two-character talker ID, `KKK` the sentence kind, and
//! `CC` the XOR checksum of every character between `$` and `*` rendered as
//! two uppercase hex digits. Line terminators (`\r\n`) are added by the
//! transports, not by the codec.
//!
//! Decoding is strict: delimiter mismatches, non-hex checksum digits, and
//! checksum mismatches all produce a typed [`MalformedSentence`] error.
//! For every sentence `s` built from a known kind and valid fields,
//! `decode(&s.encode()) == Ok(s)`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedSentence {
    #[error("sentence does not start with '$'")]
    MissingStart,
    #[error("sentence has no '*' checksum delimiter")]
    MissingChecksumDelimiter,
    #[error("checksum field is not two hex digits: {0:?}")]
    BadChecksumDigits(String),
    #[error("checksum mismatch: computed {computed:02X}, sentence carries {carried:02X}")]
    ChecksumMismatch { computed: u8, carried: u8 },
    #[error("header {0:?} is shorter than talker + kind")]
    ShortHeader(String),
    #[error("unknown sentence kind {0:?}")]
    UnknownKind(String),
}

// ── Sentence kinds ────────────────────────────────────────────────────────────

/// The sentence kinds the simulator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentenceKind {
    /// Depth of water below transducer
    Dpt,
    /// GPS fix data
    Gga,
    /// Heading, true
    Hdt,
    /// Water temperature
    Mtw,
    /// Wind direction and speed, true, referenced to north
    Mwd,
    /// Wind speed and angle (relative or theoretical, per reference field)
    Mwv,
    /// Recommended minimum GNSS data (position, SOG, COG, date/time)
    Rmc,
    /// Rate of turn
    Rot,
    /// Water speed and heading
    Vhw,
    /// Course over ground and ground speed
    Vtg,
    /// Transducer measurements (pressure, air temperature)
    Xdr,
}

impl SentenceKind {
    pub fn code(&self) -> &'static str {
        match self {
            SentenceKind::Dpt => "DPT",
            SentenceKind::Gga => "GGA",
            SentenceKind::Hdt => "HDT",
            SentenceKind::Mtw => "MTW",
            SentenceKind::Mwd => "MWD",
            SentenceKind::Mwv => "MWV",
            SentenceKind::Rmc => "RMC",
            SentenceKind::Rot => "ROT",
            SentenceKind::Vhw => "VHW",
            SentenceKind::Vtg => "VTG",
            SentenceKind::Xdr => "XDR",
        }
    }

    pub fn from_code(code: &str) -> Option<SentenceKind> {
        match code {
            "DPT" => Some(SentenceKind::Dpt),
            "GGA" => Some(SentenceKind::Gga),
            "HDT" => Some(SentenceKind::Hdt),
            "MTW" => Some(SentenceKind::Mtw),
            "MWD" => Some(SentenceKind::Mwd),
            "MWV" => Some(SentenceKind::Mwv),
            "RMC" => Some(SentenceKind::Rmc),
            "ROT" => Some(SentenceKind::Rot),
            "VHW" => Some(SentenceKind::Vhw),
            "VTG" => Some(SentenceKind::Vtg),
            "XDR" => Some(SentenceKind::Xdr),
            _ => None,
        }
    }
}

// ── Sentence ──────────────────────────────────────────────────────────────────

/// A parsed or to-be-encoded NMEA sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    /// Two-character talker ID, e.g. "II" (integrated instruments), "GP" (GNSS).
    pub talker: String,
    pub kind: SentenceKind,
    /// Comma-separated data fields, empty fields preserved.
    pub fields: Vec<String>,
}

impl Sentence {
    pub fn new(talker: &str, kind: SentenceKind, fields: Vec<String>) -> Self {
        Self {
            talker: talker.to_string(),
            kind,
            fields,
        }
    }

    /// Render the checksum-terminated wire line (without trailing `\r\n`).
    pub fn encode(&self) -> String {
        let mut body = format!("{}{}", self.talker, self.kind.code());
        for field in &self.fields {
            body.push(',');
            body.push_str(field);
        }
        format!("${}*{:02X}", body, checksum(&body))
    }
}

/// XOR checksum over a sentence body (the characters between `$` and `*`).
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Parse and validate one wire line. Trailing `\r\n` is tolerated.
pub fn decode(line: &str) -> Result<Sentence, MalformedSentence> {
    let line = line.trim_end_matches(['\r', '\n']);

    let rest = line
        .strip_prefix('$')
        .ok_or(MalformedSentence::MissingStart)?;
    let star = rest
        .rfind('*')
        .ok_or(MalformedSentence::MissingChecksumDelimiter)?;
    let body = &rest[..star];
    let check = &rest[star + 1..];

    if check.len() != 2 || !check.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(MalformedSentence::BadChecksumDigits(check.to_string()));
    }
    // Safe: both bytes verified as hex digits above
    let carried = u8::from_str_radix(check, 16)
        .map_err(|_| MalformedSentence::BadChecksumDigits(check.to_string()))?;

    let computed = checksum(body);
    if computed != carried {
        return Err(MalformedSentence::ChecksumMismatch { computed, carried });
    }

    let mut parts = body.split(',');
    let header = parts.next().unwrap_or("");
    if header.len() < 3 {
        return Err(MalformedSentence::ShortHeader(header.to_string()));
    }
    let talker = header[..2].to_string();
    let kind = SentenceKind::from_code(&header[2..])
        .ok_or_else(|| MalformedSentence::UnknownKind(header[2..].to_string()))?;
    let fields = parts.map(|f| f.to_string()).collect();

    Ok(Sentence {
        talker,
        kind,
        fields,
    })
}

// ── Field formatting helpers ──────────────────────────────────────────────────

/// Split an absolute coordinate into whole degrees and minutes, rounding the
/// minutes to four decimals first so a value like 47.9999999° carries into
/// 48°00.0000' instead of the invalid 47°60.0000'.
fn deg_min(abs: f64) -> (f64, f64) {
    let total_min = (abs * 60.0 * 10_000.0).round() / 10_000.0;
    let deg = (total_min / 60.0).trunc();
    (deg, total_min - deg * 60.0)
}

/// Format a signed latitude as the NMEA (`ddmm.mmmm`, hemisphere) field pair.
pub fn format_lat(lat: f64) -> (String, char) {
    let hemi = if lat < 0.0 { 'S' } else { 'N' };
    let (deg, min) = deg_min(lat.abs());
    (format!("{:02.0}{:07.4}", deg, min), hemi)
}

/// Format a signed longitude as the NMEA (`dddmm.mmmm`, hemisphere) field pair.
pub fn format_lon(lon: f64) -> (String, char) {
    let hemi = if lon < 0.0 { 'W' } else { 'E' };
    let (deg, min) = deg_min(lon.abs());
    (format!("{:03.0}{:07.4}", deg, min), hemi)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
