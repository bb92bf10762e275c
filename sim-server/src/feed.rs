//! feed.rs — renders vessel state snapshots into NMEA sentence fields.
//!
//! One [`FeedKind`] per scheduled emission. Two feed kinds (relative and true
//! MWV) share the MWV wire code and differ only in the reference field, so
//! they get independent emission frequencies while staying one codec kind.

use chrono::{DateTime, Datelike, Timelike, Utc};
use nmea_codec::{format_lat, format_lon, Sentence, SentenceKind};
use vessel_sim::state::normalize_deg;
use vessel_sim::VesselState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Hdt,
    Rot,
    Vhw,
    MwvRelative,
    MwvTrue,
    Mwd,
    Rmc,
    Gga,
    Vtg,
    Dpt,
    Mtw,
    Xdr,
}

impl FeedKind {
    pub const ALL: [FeedKind; 12] = [
        FeedKind::Hdt,
        FeedKind::Rot,
        FeedKind::Vhw,
        FeedKind::MwvRelative,
        FeedKind::MwvTrue,
        FeedKind::Mwd,
        FeedKind::Rmc,
        FeedKind::Gga,
        FeedKind::Vtg,
        FeedKind::Dpt,
        FeedKind::Mtw,
        FeedKind::Xdr,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FeedKind::Hdt => "HDT",
            FeedKind::Rot => "ROT",
            FeedKind::Vhw => "VHW",
            FeedKind::MwvRelative => "MWV(R)",
            FeedKind::MwvTrue => "MWV(T)",
            FeedKind::Mwd => "MWD",
            FeedKind::Rmc => "RMC",
            FeedKind::Gga => "GGA",
            FeedKind::Vtg => "VTG",
            FeedKind::Dpt => "DPT",
            FeedKind::Mtw => "MTW",
            FeedKind::Xdr => "XDR",
        }
    }
}

fn utc_time_field(now: &DateTime<Utc>) -> String {
    let centis = now.timestamp_subsec_millis() / 10;
    format!(
        "{:02}{:02}{:02}.{:02}",
        now.hour(),
        now.minute(),
        now.second(),
        centis
    )
}

fn utc_date_field(now: &DateTime<Utc>) -> String {
    format!("{:02}{:02}{:02}", now.day(), now.month(), now.year() % 100)
}

/// Render one sentence kind from a state snapshot.
pub fn render(kind: FeedKind, snap: &VesselState, talker: &str, now: &DateTime<Utc>) -> Sentence {
    let f = |fields: Vec<String>, wire: SentenceKind| Sentence::new(talker, wire, fields);
    let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();

    match kind {
        FeedKind::Hdt => f(
            s(&[&format!("{:.1}", snap.motion.heading_deg), "T"]),
            SentenceKind::Hdt,
        ),
        // NMEA ROT is degrees per *minute*, positive to starboard
        FeedKind::Rot => f(
            s(&[&format!("{:.1}", snap.motion.rot_deg_s * 60.0), "A"]),
            SentenceKind::Rot,
        ),
        FeedKind::Vhw => f(
            s(&[
                &format!("{:.1}", snap.motion.heading_deg),
                "T",
                "",
                "M",
                &format!("{:.1}", snap.motion.stw_kn),
                "N",
                &format!("{:.1}", snap.motion.stw_kn * 1.852),
                "K",
            ]),
            SentenceKind::Vhw,
        ),
        FeedKind::MwvRelative => f(
            s(&[
                &format!("{:.1}", snap.wind.apparent_angle_deg),
                "R",
                &format!("{:.1}", snap.wind.apparent_speed_kn),
                "N",
                "A",
            ]),
            SentenceKind::Mwv,
        ),
        FeedKind::MwvTrue => {
            let angle = normalize_deg(snap.wind.true_dir_deg - snap.motion.heading_deg);
            f(
                s(&[
                    &format!("{:.1}", angle),
                    "T",
                    &format!("{:.1}", snap.wind.true_speed_kn),
                    "N",
                    "A",
                ]),
                SentenceKind::Mwv,
            )
        }
        FeedKind::Mwd => f(
            s(&[
                &format!("{:.1}", snap.wind.true_dir_deg),
                "T",
                "",
                "M",
                &format!("{:.1}", snap.wind.true_speed_kn),
                "N",
                &format!("{:.1}", snap.wind.true_speed_kn * 0.514444),
                "M",
            ]),
            SentenceKind::Mwd,
        ),
        FeedKind::Rmc => {
            let (lat, ns) = format_lat(snap.position.lat);
            let (lon, ew) = format_lon(snap.position.lon);
            f(
                vec![
                    utc_time_field(now),
                    "A".to_string(),
                    lat,
                    ns.to_string(),
                    lon,
                    ew.to_string(),
                    format!("{:.1}", snap.position.sog_kn),
                    format!("{:.1}", snap.position.cog_deg),
                    utc_date_field(now),
                    String::new(),
                    String::new(),
                    "A".to_string(),
                ],
                SentenceKind::Rmc,
            )
        }
        FeedKind::Gga => {
            let (lat, ns) = format_lat(snap.position.lat);
            let (lon, ew) = format_lon(snap.position.lon);
            f(
                vec![
                    utc_time_field(now),
                    lat,
                    ns.to_string(),
                    lon,
                    ew.to_string(),
                    "1".to_string(),
                    "10".to_string(),
                    "0.9".to_string(),
                    "0.0".to_string(),
                    "M".to_string(),
                    "0.0".to_string(),
                    "M".to_string(),
                    String::new(),
                    String::new(),
                ],
                SentenceKind::Gga,
            )
        }
        FeedKind::Vtg => f(
            s(&[
                &format!("{:.1}", snap.position.cog_deg),
                "T",
                "",
                "M",
                &format!("{:.1}", snap.position.sog_kn),
                "N",
                &format!("{:.1}", snap.position.sog_kn * 1.852),
                "K",
                "A",
            ]),
            SentenceKind::Vtg,
        ),
        FeedKind::Dpt => f(
            s(&[&format!("{:.1}", snap.environment.depth_m), "0.0", ""]),
            SentenceKind::Dpt,
        ),
        FeedKind::Mtw => f(
            s(&[&format!("{:.1}", snap.environment.water_temp_c), "C"]),
            SentenceKind::Mtw,
        ),
        FeedKind::Xdr => f(
            s(&[
                "P",
                &format!("{:.5}", snap.environment.pressure_hpa / 1000.0),
                "B",
                "Barometer",
                "C",
                &format!("{:.1}", snap.environment.air_temp_c),
                "C",
                "TempAir",
            ]),
            SentenceKind::Xdr,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> VesselState {
        let mut s = VesselState::default();
        s.position.lat = 48.1173;
        s.position.lon = -122.7604;
        s.position.sog_kn = 6.4;
        s.position.cog_deg = 271.2;
        s.motion.heading_deg = 270.0;
        s.motion.stw_kn = 6.2;
        s.motion.rot_deg_s = -0.5;
        s.wind.true_dir_deg = 225.0;
        s.wind.true_speed_kn = 14.0;
        s.wind.apparent_angle_deg = 318.6;
        s.wind.apparent_speed_kn = 17.9;
        s
    }

    fn utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 35, 19).unwrap()
    }

    #[test]
    fn test_every_kind_roundtrips_through_codec() {
        let snap = snapshot();
        let now = utc();
        for kind in FeedKind::ALL {
            let sentence = render(kind, &snap, "II", &now);
            let line = sentence.encode();
            let decoded = nmea_codec::decode(&line)
                .unwrap_or_else(|e| panic!("{} failed to decode: {e} ({line})", kind.label()));
            assert_eq!(decoded, sentence);
        }
    }

    #[test]
    fn test_rmc_fields() {
        let sentence = render(FeedKind::Rmc, &snapshot(), "GP", &utc());
        assert_eq!(sentence.kind, SentenceKind::Rmc);
        assert_eq!(sentence.fields[0], "123519.00");
        assert_eq!(sentence.fields[1], "A");
        assert_eq!(sentence.fields[2], "4807.0380");
        assert_eq!(sentence.fields[3], "N");
        assert_eq!(sentence.fields[5], "W");
        assert_eq!(sentence.fields[6], "6.4");
        assert_eq!(sentence.fields[8], "090324");
    }

    #[test]
    fn test_rot_is_degrees_per_minute() {
        let sentence = render(FeedKind::Rot, &snapshot(), "II", &utc());
        assert_eq!(sentence.fields[0], "-30.0");
    }

    #[test]
    fn test_mwv_variants_differ_in_reference() {
        let snap = snapshot();
        let rel = render(FeedKind::MwvRelative, &snap, "II", &utc());
        let tru = render(FeedKind::MwvTrue, &snap, "II", &utc());
        assert_eq!(rel.fields[1], "R");
        assert_eq!(tru.fields[1], "T");
        // True wind 225 from a heading of 270 is 315 off the bow
        assert_eq!(tru.fields[0], "315.0");
    }

    #[test]
    fn test_xdr_pressure_in_bar() {
        let mut snap = snapshot();
        snap.environment.pressure_hpa = 1013.2;
        let sentence = render(FeedKind::Xdr, &snap, "II", &utc());
        assert_eq!(sentence.fields[1], "1.01320");
    }
}
