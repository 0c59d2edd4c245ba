//! JSON-object payloads
//!
//! Numeric fields are coerced: numbers and numeric strings are accepted,
//! anything else becomes 0 and adds a [`DecodeWarning`]. One bad field never
//! blocks the reading.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use super::error::DecodeError;
use super::{
    Decoded, DecodeWarning, DecodedEvent, PayloadFormat, ProbeSighting, RfTransmission,
    RoomReading,
};

type Object = Map<String, Value>;

pub(super) fn parse_object(text: &str) -> Result<Object, DecodeError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(DecodeError::NotAnObject),
        Err(e) => Err(DecodeError::MalformedJson(e.to_string())),
    }
}

fn lookup<'a>(object: &'a Object, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| object.get(*name))
        .filter(|value| !value.is_null())
}

fn number(object: &Object, names: &[&str], warnings: &mut Vec<DecodeWarning>) -> f64 {
    let parsed = match lookup(object, names) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
        None => {
            warnings.push(DecodeWarning::missing(names[0]));
            return 0.0;
        }
    };

    match parsed.filter(|v| v.is_finite()) {
        Some(value) => value,
        None => {
            warnings.push(DecodeWarning::not_numeric(names[0]));
            0.0
        }
    }
}

fn integer(object: &Object, names: &[&str], warnings: &mut Vec<DecodeWarning>) -> i64 {
    let parsed = match lookup(object, names) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        Some(_) => None,
        None => {
            warnings.push(DecodeWarning::missing(names[0]));
            return 0;
        }
    };

    parsed.unwrap_or_else(|| {
        warnings.push(DecodeWarning::not_numeric(names[0]));
        0
    })
}

fn text(object: &Object, names: &[&str]) -> Option<String> {
    match lookup(object, names)? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn required_text(object: &Object, names: &[&str], warnings: &mut Vec<DecodeWarning>) -> String {
    text(object, names).unwrap_or_else(|| {
        warnings.push(DecodeWarning::missing(names[0]));
        String::new()
    })
}

pub(super) fn room_reading(payload: &str) -> Result<Decoded, DecodeError> {
    let object = parse_object(payload)?;
    let mut warnings = Vec::new();

    let reading = RoomReading {
        temperature: number(&object, &["temperature"], &mut warnings),
        humidity: number(&object, &["humidity"], &mut warnings),
        pressure: number(&object, &["pressure"], &mut warnings),
        brightness: if lookup(&object, &["brightness"]).is_some() {
            number(&object, &["brightness"], &mut warnings)
        } else {
            0.0
        },
        format: PayloadFormat::Json,
    };

    Ok(Decoded::with_warnings(
        DecodedEvent::RoomReading(reading),
        warnings,
    ))
}

fn non_negative(value: i64, field: &str, warnings: &mut Vec<DecodeWarning>) -> i64 {
    if value < 0 {
        warnings.push(DecodeWarning::new(field, "negative value replaced by 0"));
        0
    } else {
        value
    }
}

/// Largest code width a `u64` decimal can carry
const MAX_CODE_BITS: u32 = u64::BITS;

fn bounded_u32(value: i64, field: &str, max: u32, warnings: &mut Vec<DecodeWarning>) -> u32 {
    let value = non_negative(value, field, warnings);
    match u32::try_from(value) {
        Ok(value) if value <= max => value,
        _ => {
            warnings.push(DecodeWarning::new(
                field,
                format!("{} exceeds {} and was replaced by 0", value, max),
            ));
            0
        }
    }
}

pub(super) fn rf_transmission(payload: &str) -> Result<Decoded, DecodeError> {
    let object = parse_object(payload)?;
    let mut warnings = Vec::new();

    let decimal = integer(&object, &["decimal", "code"], &mut warnings);
    let decimal = non_negative(decimal, "decimal", &mut warnings) as u64;
    let bits = integer(&object, &["bits", "bitlength", "length"], &mut warnings);
    let bits = bounded_u32(bits, "bits", MAX_CODE_BITS, &mut warnings);
    let pulse_length = integer(&object, &["pulselength", "pulse_length"], &mut warnings);
    let pulse_length = bounded_u32(pulse_length, "pulselength", u32::MAX, &mut warnings);
    let protocol = integer(&object, &["protocol"], &mut warnings);
    let protocol = bounded_u32(protocol, "protocol", u32::MAX, &mut warnings);

    let binary = text(&object, &["binary"])
        .unwrap_or_else(|| format!("{:0width$b}", decimal, width = bits as usize));

    Ok(Decoded::with_warnings(
        DecodedEvent::RfTransmission(RfTransmission {
            decimal,
            bits,
            binary,
            pulse_length,
            protocol,
        }),
        warnings,
    ))
}

pub(super) fn probe_sighting(payload: &str) -> Result<Decoded, DecodeError> {
    let object = parse_object(payload)?;
    let mut warnings = Vec::new();

    let time = match text(&object, &["time"]) {
        Some(raw) => match raw.trim().parse::<NaiveDateTime>() {
            Ok(time) => Some(time),
            Err(_) => {
                warnings.push(DecodeWarning::new("time", format!("unparsable timestamp '{}'", raw)));
                None
            }
        },
        None => {
            warnings.push(DecodeWarning::missing("time"));
            None
        }
    };

    let ssid = required_text(&object, &["ssid"], &mut warnings);
    let ssid_uppercase = text(&object, &["uppercaseSSID", "ssid_upper"])
        .unwrap_or_else(|| ssid.to_uppercase());

    let sighting = ProbeSighting {
        time,
        mac: required_text(&object, &["macaddress", "mac"], &mut warnings),
        vendor: required_text(&object, &["make", "vendor"], &mut warnings),
        ssid,
        ssid_uppercase,
        rssi: integer(&object, &["rssi"], &mut warnings),
    };

    Ok(Decoded::with_warnings(
        DecodedEvent::ProbeSighting(sighting),
        warnings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_reading_accepts_numeric_strings() {
        let decoded =
            room_reading(r#"{"temperature":"21.5","humidity":"40","pressure":"1012"}"#).unwrap();
        assert!(decoded.warnings.is_empty());
        match decoded.event {
            DecodedEvent::RoomReading(r) => {
                assert_eq!(r.temperature, 21.5);
                assert_eq!(r.humidity, 40.0);
                assert_eq!(r.pressure, 1012.0);
                assert_eq!(r.brightness, 0.0);
                assert_eq!(r.format, PayloadFormat::Json);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn room_reading_coerces_bad_fields_to_zero() {
        let decoded =
            room_reading(r#"{"temperature":"warm","humidity":41.2,"brightness":[1]}"#).unwrap();
        let fields: Vec<&str> = decoded.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["temperature", "pressure", "brightness"]);
        match decoded.event {
            DecodedEvent::RoomReading(r) => {
                assert_eq!(r.temperature, 0.0);
                assert_eq!(r.humidity, 41.2);
                assert_eq!(r.pressure, 0.0);
                assert_eq!(r.brightness, 0.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert_eq!(room_reading("[1,2]").unwrap_err(), DecodeError::NotAnObject);
        assert!(matches!(
            room_reading("{\"temperature\":"),
            Err(DecodeError::MalformedJson(_))
        ));
    }

    #[test]
    fn rf_transmission_derives_binary_when_absent() {
        let decoded = rf_transmission(
            r#"{"decimal":1134929,"bitlength":"24","pulselength":350,"protocol":1}"#,
        )
        .unwrap();
        match decoded.event {
            DecodedEvent::RfTransmission(rf) => {
                assert_eq!(rf.decimal, 1134929);
                assert_eq!(rf.bits, 24);
                assert_eq!(rf.binary, "000100010101000101010001");
                assert_eq!(rf.pulse_length, 350);
                assert_eq!(rf.protocol, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(decoded.warnings.is_empty());
    }

    #[test]
    fn rf_transmission_rejects_oversized_bit_counts() {
        let decoded = rf_transmission(r#"{"decimal":5,"bits":70000}"#).unwrap();
        match &decoded.event {
            DecodedEvent::RfTransmission(rf) => {
                assert_eq!(rf.bits, 0);
                assert_eq!(rf.binary, "101");
            }
            other => panic!("unexpected event {:?}", other),
        }
        let fields: Vec<&str> = decoded.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["bits", "pulselength", "protocol"]);
    }

    #[test]
    fn rf_transmission_never_truncates_values_above_u32() {
        let decoded = rf_transmission(
            r#"{"decimal":5,"bits":4294967299,"pulselength":4294967299,"protocol":1}"#,
        )
        .unwrap();
        match &decoded.event {
            DecodedEvent::RfTransmission(rf) => {
                assert_eq!(rf.bits, 0);
                assert_eq!(rf.pulse_length, 0);
                assert_eq!(rf.protocol, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        let fields: Vec<&str> = decoded.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["bits", "pulselength"]);
    }

    #[test]
    fn probe_sighting_keeps_fields_and_tolerates_bad_time() {
        let decoded = probe_sighting(
            r#"{"time":"yesterday","macaddress":"AA:BB","make":"Acme","ssid":"net","rssi":"-61"}"#,
        )
        .unwrap();
        match decoded.event {
            DecodedEvent::ProbeSighting(p) => {
                assert_eq!(p.time, None);
                assert_eq!(p.ssid_uppercase, "NET");
                assert_eq!(p.rssi, -61);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(decoded.warnings.len(), 1);
        assert_eq!(decoded.warnings[0].field, "time");
    }
}
