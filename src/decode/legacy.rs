//! Legacy `key=value,key=value` room payloads

use std::collections::HashMap;

use super::error::DecodeError;
use super::{Decoded, DecodeWarning, DecodedEvent, PayloadFormat, RoomReading};

const REQUIRED: [&str; 3] = ["temperature", "humidity", "pressure"];

fn split_fields(payload: &str, warnings: &mut Vec<DecodeWarning>) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for segment in payload.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((key, value)) => {
                fields.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => warnings.push(DecodeWarning::new(
                segment,
                "segment without '=' ignored",
            )),
        }
    }
    fields
}

fn numeric(
    fields: &HashMap<String, String>,
    field: &str,
    warnings: &mut Vec<DecodeWarning>,
) -> Result<f64, DecodeError> {
    let raw = fields
        .get(field)
        .ok_or_else(|| DecodeError::MissingField(field.to_string()))?;

    // the sensor reports failed samples as "nan"; such a reading is unusable
    if raw.to_ascii_lowercase().contains("nan") {
        return Err(DecodeError::NotANumber(field.to_string()));
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => {
            warnings.push(DecodeWarning::not_numeric(field));
            Ok(0.0)
        }
    }
}

pub(super) fn room_reading(payload: &str) -> Result<Decoded, DecodeError> {
    let mut warnings = Vec::new();
    let fields = split_fields(payload, &mut warnings);

    let mut values = [0.0; REQUIRED.len()];
    for (slot, field) in values.iter_mut().zip(REQUIRED) {
        *slot = numeric(&fields, field, &mut warnings)?;
    }
    let brightness = if fields.contains_key("brightness") {
        numeric(&fields, "brightness", &mut warnings)?
    } else {
        0.0
    };

    let [temperature, humidity, pressure] = values;
    Ok(Decoded::with_warnings(
        DecodedEvent::RoomReading(RoomReading {
            temperature,
            humidity,
            pressure,
            brightness,
            format: PayloadFormat::KeyValue,
        }),
        warnings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(decoded: Decoded) -> RoomReading {
        match decoded.event {
            DecodedEvent::RoomReading(r) => r,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn parses_sensor_line() {
        let decoded = room_reading("temperature=25.3,humidity=38.1,pressure=1009.7").unwrap();
        assert!(decoded.warnings.is_empty());
        let r = reading(decoded);
        assert_eq!(r.temperature, 25.3);
        assert_eq!(r.humidity, 38.1);
        assert_eq!(r.pressure, 1009.7);
        assert_eq!(r.brightness, 0.0);
        assert_eq!(r.format, PayloadFormat::KeyValue);
    }

    #[test]
    fn nan_in_numeric_slot_invalidates_reading() {
        assert_eq!(
            room_reading("temperature=nan,humidity=38,pressure=1009").unwrap_err(),
            DecodeError::NotANumber("temperature".to_string())
        );
        assert_eq!(
            room_reading("temperature=21,humidity=NaN,pressure=1009").unwrap_err(),
            DecodeError::NotANumber("humidity".to_string())
        );
    }

    #[test]
    fn missing_field_is_an_error() {
        assert_eq!(
            room_reading("temperature=21,humidity=40").unwrap_err(),
            DecodeError::MissingField("pressure".to_string())
        );
    }

    #[test]
    fn junk_values_and_segments_become_warnings() {
        let decoded =
            room_reading("temperature=21, humidity = x ,pressure=1000,garbage,brightness=3")
                .unwrap();
        let fields: Vec<&str> = decoded.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["garbage", "humidity"]);
        let r = reading(decoded);
        assert_eq!(r.humidity, 0.0);
        assert_eq!(r.brightness, 3.0);
    }
}
