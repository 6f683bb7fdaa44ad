//! ---
//! fds_section: "02-messaging-ipc-data-model"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Publish/update bridge between device memory and the simulator."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use crate::{BridgeError, Result};

/// One published point: `name:value` on the wire, where the value parses
/// as a boolean first and a float second.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointData {
    /// Simulator-side device name.
    pub name: String,
    /// Status when the point is binary.
    pub status: bool,
    /// Value when the point is analog.
    pub value: f64,
}

impl PointData {
    /// Parse one `name:value` pair.
    ///
    /// The boolean grammar accepts the `1`/`0` and `t`/`f` short forms in
    /// addition to the `true`/`false` literals, so providers publishing
    /// binary points numerically still classify as binary.
    pub fn parse(point: &str) -> Result<Self> {
        let Some((name, raw)) = point.split_once(':') else {
            return Err(BridgeError::InvalidPoint(point.to_owned()));
        };
        if raw.contains(':') {
            return Err(BridgeError::InvalidPoint(point.to_owned()));
        }

        if let Some(status) = parse_bool(raw) {
            return Ok(Self {
                name: name.to_owned(),
                status,
                ..Self::default()
            });
        }

        if let Ok(value) = raw.parse::<f64>() {
            return Ok(Self {
                name: name.to_owned(),
                value,
                ..Self::default()
            });
        }

        Err(BridgeError::InvalidPoint(point.to_owned()))
    }

    /// Wire form of a binary update.
    pub fn format_binary(point: &str, status: bool) -> String {
        format!("{point}:{status}")
    }

    /// Wire form of an analog update.
    pub fn format_analog(point: &str, value: f64) -> String {
        format!("{point}:{value}")
    }
}

// The literal set strconv-style providers emit for booleans.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_parse_before_floats() {
        let point = PointData::parse("bus-1.breaker:true").unwrap();
        assert_eq!(point.name, "bus-1.breaker");
        assert!(point.status);
        assert_eq!(point.value, 0.0);
    }

    #[test]
    fn short_form_booleans_stay_binary() {
        // "1" must classify as a binary status, not fall through to the
        // float parse as an analog 1.0.
        let point = PointData::parse("bus-1.breaker:1").unwrap();
        assert!(point.status);
        assert_eq!(point.value, 0.0);

        let point = PointData::parse("bus-1.breaker:0").unwrap();
        assert!(!point.status);
        assert_eq!(point.value, 0.0);

        for raw in ["t", "T", "true", "TRUE", "True"] {
            let point = PointData::parse(&format!("d:{raw}")).unwrap();
            assert!(point.status, "{raw} should read as true");
            assert_eq!(point.value, 0.0);
        }
        for raw in ["f", "F", "false", "FALSE", "False"] {
            let point = PointData::parse(&format!("d:{raw}")).unwrap();
            assert!(!point.status, "{raw} should read as false");
            assert_eq!(point.value, 0.0);
        }

        // Only the bare "1" is a boolean; "1.0" is still an analog value,
        // and casings outside the literal set parse as nothing at all.
        let point = PointData::parse("d:1.0").unwrap();
        assert!(!point.status);
        assert_eq!(point.value, 1.0);
        assert!(PointData::parse("d:tRuE").is_err());
    }

    #[test]
    fn floats_parse_as_analog_values() {
        let point = PointData::parse("bus-1.voltage:2.45").unwrap();
        assert_eq!(point.name, "bus-1.voltage");
        assert!(!point.status);
        assert_eq!(point.value, 2.45);
    }

    #[test]
    fn malformed_points_are_rejected() {
        assert!(PointData::parse("no-separator").is_err());
        assert!(PointData::parse("a:b:c").is_err());
        assert!(PointData::parse("bus-1.voltage:volts").is_err());
    }

    #[test]
    fn wire_formats_round_trip() {
        let binary = PointData::format_binary("d", true);
        assert_eq!(binary, "d:true");
        assert!(PointData::parse(&binary).unwrap().status);

        let analog = PointData::format_analog("d", 1.5);
        assert_eq!(analog, "d:1.5");
        assert_eq!(PointData::parse(&analog).unwrap().value, 1.5);
    }
}
