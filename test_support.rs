//! Fixture writers for tests: tiny JPEG files carrying a hand-built EXIF block,
//! plus helpers for plain PNGs and file timestamps.

use crate::events::EventSink;
use crate::models::{Phase, PipelineEvent, RunSummary};
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

const TYPE_ASCII: u16 = 2;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

const TAG_DATE_TIME: u16 = 0x0132;
const TAG_EXIF_POINTER: u16 = 0x8769;
const TAG_GPS_POINTER: u16 = 0x8825;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TAG_DATE_TIME_DIGITIZED: u16 = 0x9004;

#[derive(Debug, Clone)]
enum IfdValue {
    Ascii(String),
    Long(u32),
    Rationals(Vec<(u32, u32)>),
}

impl IfdValue {
    fn kind(&self) -> u16 {
        match self {
            IfdValue::Ascii(_) => TYPE_ASCII,
            IfdValue::Long(_) => TYPE_LONG,
            IfdValue::Rationals(_) => TYPE_RATIONAL,
        }
    }

    fn count(&self) -> u32 {
        match self {
            IfdValue::Ascii(s) => s.len() as u32 + 1,
            IfdValue::Long(_) => 1,
            IfdValue::Rationals(v) => v.len() as u32,
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            IfdValue::Ascii(s) => {
                let mut out = s.as_bytes().to_vec();
                out.push(0);
                out
            }
            IfdValue::Long(v) => v.to_le_bytes().to_vec(),
            IfdValue::Rationals(parts) => parts
                .iter()
                .flat_map(|(num, denom)| {
                    let mut pair = num.to_le_bytes().to_vec();
                    pair.extend(denom.to_le_bytes());
                    pair
                })
                .collect(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            IfdValue::Ascii(s) => s.is_empty(),
            IfdValue::Long(_) => false,
            IfdValue::Rationals(v) => v.is_empty(),
        }
    }

    fn spilled_len(&self) -> usize {
        let len = self.bytes().len();
        if len > 4 {
            len + len % 2
        } else {
            0
        }
    }
}

type Ifd = Vec<(u16, IfdValue)>;

fn table_len(entries: &Ifd) -> usize {
    2 + entries.len() * 12 + 4
}

fn ifd_len(entries: &Ifd) -> usize {
    table_len(entries) + entries.iter().map(|(_, v)| v.spilled_len()).sum::<usize>()
}

/// Appends one IFD. `out` starts at the TIFF header, so its length is the
/// offset of the IFD being written.
fn write_ifd(out: &mut Vec<u8>, entries: &Ifd) {
    let data_start = out.len() + table_len(entries);
    let mut data = Vec::new();
    out.extend((entries.len() as u16).to_le_bytes());
    for (tag, value) in entries {
        out.extend(tag.to_le_bytes());
        out.extend(value.kind().to_le_bytes());
        out.extend(value.count().to_le_bytes());
        let mut bytes = value.bytes();
        if bytes.len() <= 4 {
            bytes.resize(4, 0);
            out.extend(bytes);
        } else {
            out.extend(((data_start + data.len()) as u32).to_le_bytes());
            if bytes.len() % 2 == 1 {
                bytes.push(0);
            }
            data.extend(bytes);
        }
    }
    out.extend(0u32.to_le_bytes());
    out.extend(data);
}

/// An empty ref or coordinate leaves that GPS tag out of the block.
#[derive(Debug, Clone)]
pub struct GpsFixture {
    pub lat_ref: String,
    pub lat: Vec<(u32, u32)>,
    pub lon_ref: String,
    pub lon: Vec<(u32, u32)>,
}

impl GpsFixture {
    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            lat_ref: if lat < 0.0 { "S" } else { "N" }.to_string(),
            lat: to_dms(lat.abs()),
            lon_ref: if lon < 0.0 { "W" } else { "E" }.to_string(),
            lon: to_dms(lon.abs()),
        }
    }
}

fn to_dms(value: f64) -> Vec<(u32, u32)> {
    let degrees = value.trunc();
    let minutes_full = (value - degrees) * 60.0;
    let minutes = minutes_full.trunc();
    let seconds = (minutes_full - minutes) * 60.0;
    vec![
        (degrees as u32, 1),
        (minutes as u32, 1),
        ((seconds * 10_000.0).round() as u32, 10_000),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct ExifFixture {
    pub date_time: Option<String>,
    pub date_time_original: Option<String>,
    pub date_time_digitized: Option<String>,
    pub gps: Option<GpsFixture>,
}

impl ExifFixture {
    pub fn tiff_bytes(&self) -> Vec<u8> {
        let mut ifd0: Ifd = Vec::new();
        if let Some(dt) = &self.date_time {
            ifd0.push((TAG_DATE_TIME, IfdValue::Ascii(dt.clone())));
        }

        let mut exif_ifd: Ifd = Vec::new();
        if let Some(dt) = &self.date_time_original {
            exif_ifd.push((TAG_DATE_TIME_ORIGINAL, IfdValue::Ascii(dt.clone())));
        }
        if let Some(dt) = &self.date_time_digitized {
            exif_ifd.push((TAG_DATE_TIME_DIGITIZED, IfdValue::Ascii(dt.clone())));
        }

        let gps_ifd: Ifd = self
            .gps
            .as_ref()
            .map(|gps| {
                [
                    (0x0001, IfdValue::Ascii(gps.lat_ref.clone())),
                    (0x0002, IfdValue::Rationals(gps.lat.clone())),
                    (0x0003, IfdValue::Ascii(gps.lon_ref.clone())),
                    (0x0004, IfdValue::Rationals(gps.lon.clone())),
                ]
                .into_iter()
                .filter(|(_, value)| !value.is_empty())
                .collect()
            })
            .unwrap_or_default();

        if !exif_ifd.is_empty() {
            ifd0.push((TAG_EXIF_POINTER, IfdValue::Long(0)));
        }
        if !gps_ifd.is_empty() {
            ifd0.push((TAG_GPS_POINTER, IfdValue::Long(0)));
        }

        let exif_offset = 8 + ifd_len(&ifd0);
        let gps_offset = exif_offset + if exif_ifd.is_empty() { 0 } else { ifd_len(&exif_ifd) };
        for (tag, value) in ifd0.iter_mut() {
            match *tag {
                TAG_EXIF_POINTER => *value = IfdValue::Long(exif_offset as u32),
                TAG_GPS_POINTER => *value = IfdValue::Long(gps_offset as u32),
                _ => {}
            }
        }

        let mut out = b"II*\0".to_vec();
        out.extend(8u32.to_le_bytes());
        write_ifd(&mut out, &ifd0);
        if !exif_ifd.is_empty() {
            write_ifd(&mut out, &exif_ifd);
        }
        if !gps_ifd.is_empty() {
            write_ifd(&mut out, &gps_ifd);
        }
        out
    }

    /// SOI, an APP1 `Exif` segment, EOI. Enough for EXIF readers; not decodable
    /// as pixels.
    pub fn jpeg_bytes(&self) -> Vec<u8> {
        let tiff = self.tiff_bytes();
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
        out.extend(((2 + 6 + tiff.len()) as u16).to_be_bytes());
        out.extend(b"Exif\0\0");
        out.extend(tiff);
        out.extend([0xFF, 0xD9]);
        out
    }

    pub fn write_jpeg(&self, path: &Path) {
        std::fs::write(path, self.jpeg_bytes()).unwrap();
    }
}

pub fn write_png(path: &Path) {
    image::RgbImage::from_pixel(4, 4, image::Rgb([200, 120, 40]))
        .save(path)
        .unwrap();
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

/// Keeps every event a run emits, in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Phase { phase } => Some(phase),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Log { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl EventSink for RecordingSink {
    fn on_progress(&self, phase: Phase, current: usize, total: usize) {
        self.push(PipelineEvent::Progress {
            phase,
            current,
            total,
        });
    }

    fn on_phase(&self, phase: Phase) {
        self.push(PipelineEvent::Phase { phase });
    }

    fn on_log(&self, message: &str) {
        self.push(PipelineEvent::Log {
            message: message.to_string(),
        });
    }

    fn on_finished(&self, summary: &RunSummary) {
        self.push(PipelineEvent::Finished {
            summary: summary.clone(),
        });
    }
}
