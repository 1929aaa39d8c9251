use crate::error::{Error, Result};
use crate::models::{DateSource, ExtractedMetadata};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use exif::{Exif, Field, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::SystemTime;

/// Shared by EXIF dates and the mtime fallback so both compare equal.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const DATE_TAGS: [(Tag, &str); 3] = [
    (Tag::DateTimeOriginal, "DateTimeOriginal"),
    (Tag::DateTimeDigitized, "DateTimeDigitized"),
    (Tag::DateTime, "DateTime"),
];

// Only an unopenable or empty file is an error; EXIF problems become notes.
pub fn read_metadata(path: &Path) -> Result<ExtractedMetadata> {
    let file = File::open(path)?;
    let fs_meta = file.metadata()?;
    if fs_meta.len() == 0 {
        return Err(Error::EmptyFile(path.to_path_buf()));
    }

    let mut notes = Vec::new();
    let exif = match Reader::new().read_from_container(&mut BufReader::new(&file)) {
        Ok(exif) => Some(exif),
        Err(err) => {
            notes.push(format!("no EXIF data ({err})"));
            None
        }
    };

    let exif_date = exif.as_ref().and_then(|e| read_exif_date(e, &mut notes));
    let (created_at, date_source) = match exif_date {
        Some((created_at, tag)) => (created_at, DateSource::Exif(tag)),
        None => (format_system_time(fs_meta.modified()?), DateSource::FileModified),
    };
    let location = exif.as_ref().and_then(|e| read_gps_location(e, &mut notes));

    Ok(ExtractedMetadata {
        created_at,
        location,
        date_source,
        notes,
    })
}

pub fn format_system_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .naive_local()
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

pub fn format_location(lat: f64, lon: f64) -> String {
    format!("{lat:.6}, {lon:.6}")
}

fn read_exif_date(exif: &Exif, notes: &mut Vec<String>) -> Option<(String, &'static str)> {
    for (tag, name) in DATE_TAGS {
        let Some(field) = exif.get_field(tag, In::PRIMARY) else {
            continue;
        };
        match parse_datetime(field) {
            Some(dt) => return Some((dt.format(TIMESTAMP_FORMAT).to_string(), name)),
            None => notes.push(format!("{name} present but unreadable")),
        }
    }
    notes.push("no EXIF date".to_string());
    None
}

fn parse_datetime(field: &Field) -> Option<NaiveDateTime> {
    let Value::Ascii(ref values) = field.value else {
        return None;
    };
    let dt = exif::DateTime::from_ascii(values.first()?).ok()?;
    let date = NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?;
    let time = NaiveTime::from_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into())?;
    Some(date.and_time(time))
}

fn read_gps_location(exif: &Exif, notes: &mut Vec<String>) -> Option<String> {
    let lat = exif.get_field(Tag::GPSLatitude, In::PRIMARY);
    let lat_ref = exif.get_field(Tag::GPSLatitudeRef, In::PRIMARY);
    let lon = exif.get_field(Tag::GPSLongitude, In::PRIMARY);
    let lon_ref = exif.get_field(Tag::GPSLongitudeRef, In::PRIMARY);

    let (Some(lat), Some(lat_ref), Some(lon), Some(lon_ref)) = (lat, lat_ref, lon, lon_ref) else {
        if lat.or(lat_ref).or(lon).or(lon_ref).is_some() {
            notes.push("GPS block present but missing coordinates".to_string());
        } else {
            notes.push("no GPS data".to_string());
        }
        return None;
    };

    let lat = signed_degrees(lat, lat_ref, 'N', 'S').filter(|v| v.abs() <= 90.0);
    let lon = signed_degrees(lon, lon_ref, 'E', 'W').filter(|v| v.abs() <= 180.0);
    match (lat, lon) {
        (Some(lat), Some(lon)) => Some(format_location(lat, lon)),
        _ => {
            notes.push("GPS coordinates present but malformed".to_string());
            None
        }
    }
}

fn signed_degrees(coord: &Field, reference: &Field, positive: char, negative: char) -> Option<f64> {
    let degrees = dms_to_degrees(&coord.value)?;
    match hemisphere(&reference.value)? {
        c if c == positive => Some(degrees),
        c if c == negative => Some(-degrees),
        _ => None,
    }
}

fn dms_to_degrees(value: &Value) -> Option<f64> {
    let Value::Rational(parts) = value else {
        return None;
    };
    if parts.len() < 3 {
        return None;
    }
    let mut total = 0.0;
    for (part, scale) in parts.iter().zip([1.0, 60.0, 3600.0]) {
        if part.denom == 0 {
            return None;
        }
        total += part.to_f64() / scale;
    }
    total.is_finite().then_some(total)
}

fn hemisphere(value: &Value) -> Option<char> {
    let Value::Ascii(values) = value else {
        return None;
    };
    values
        .first()?
        .iter()
        .map(|b| *b as char)
        .find(|c| !c.is_ascii_whitespace())
        .map(|c| c.to_ascii_uppercase())
}
