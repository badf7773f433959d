/// Multi-page TIFF snapshot stacks and the mapping between trace time and frames.
///
/// Stacks are decoded page by page, optionally subsampled so that at most
/// `max_frames` pages are kept. Each page's `ImageDescription` tag, when
/// present, is parsed into key/value metadata (JSON objects or `key=value` /
/// `key: value` lines) from which a timestamp and an acquisition frame number
/// are picked up.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;

use super::error::LoadError;
use super::timefmt;

/// VasoTracker acquisition interval: 140 ms per frame.
pub const DEFAULT_FRAME_INTERVAL_S: f64 = 0.14;
/// Default cap on decoded frames per stack.
pub const DEFAULT_MAX_FRAMES: usize = 300;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMetadata {
    /// Raw description text as stored in the file
    pub raw: Option<String>,
    /// Parsed fields in file order
    pub fields: Vec<(String, String)>,
    /// Seconds since start of acquisition
    pub time: Option<f64>,
    /// Acquisition frame number
    pub frame_number: Option<u32>,
}

/// One decoded page, normalized to 8 bits per channel.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Page index in the source file
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    /// 1 (gray), 3 (RGB) or 4 (RGBA)
    pub channels: u8,
    pub pixels: Vec<u8>,
    pub metadata: FrameMetadata,
}

impl Frame {
    /// Pixels expanded to RGBA for display.
    pub fn rgba_pixels(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        match self.channels {
            1 => {
                for &g in &self.pixels {
                    out.extend_from_slice(&[g, g, g, 255]);
                }
            }
            3 => {
                for px in self.pixels.chunks_exact(3) {
                    out.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
            }
            _ => out.extend_from_slice(&self.pixels),
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct FrameStack {
    pub source_path: Option<PathBuf>,
    /// Pages in the file before subsampling
    pub total_pages: usize,
    /// Every `step`-th page was kept
    pub step: usize,
    pub frames: Vec<Frame>,
}

impl FrameStack {
    pub fn read_file(path: &Path, max_frames: usize) -> Result<Self, LoadError> {
        let bytes = std::fs::read(path)?;
        let mut stack = Self::from_bytes(&bytes, max_frames)?;
        stack.source_path = Some(path.to_path_buf());
        log::info!(
            "Loaded TIFF stack {} ({} of {} pages, step {})",
            path.display(),
            stack.frames.len(),
            stack.total_pages,
            stack.step
        );
        Ok(stack)
    }

    pub fn from_bytes(bytes: &[u8], max_frames: usize) -> Result<Self, LoadError> {
        let total_pages = count_pages(bytes)?;
        let step = subsample_step(total_pages, max_frames);

        let mut decoder = Decoder::new(Cursor::new(bytes))?;
        let mut frames = Vec::with_capacity(total_pages / step + 1);
        for page in 0..total_pages {
            if page > 0 {
                decoder.next_image()?;
            }
            if page % step == 0 {
                frames.push(decode_page(&mut decoder, page)?);
            }
        }

        Ok(Self {
            source_path: None,
            total_pages,
            step,
            frames,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Frame> {
        self.frames.get(position)
    }

    /// Trace time shown by the frame at `position`: its metadata timestamp,
    /// else page index × interval.
    pub fn frame_time(&self, position: usize, interval_s: f64) -> Option<f64> {
        let frame = self.frames.get(position)?;
        Some(
            frame
                .metadata
                .time
                .unwrap_or(frame.page_index as f64 * interval_s),
        )
    }

    /// Position of the kept frame closest in time to `time`.
    pub fn position_near(&self, time: f64, interval_s: f64) -> Option<usize> {
        (0..self.frames.len())
            .filter_map(|i| self.frame_time(i, interval_s).map(|t| (i, (t - time).abs())))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }
}

/// Maps event times to acquisition frame numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameClock {
    /// Fixed acquisition interval: frame = round(time / seconds)
    Interval { seconds: f64 },
    /// Timestamps read from the image stack metadata
    Stack { marks: Vec<FrameMark> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMark {
    pub time: f64,
    pub frame: u32,
}

impl FrameClock {
    /// Use stack metadata when every kept frame carries a timestamp,
    /// otherwise fall back to the fixed interval.
    pub fn for_stack(stack: &FrameStack, interval_s: f64) -> Self {
        let marks: Option<Vec<FrameMark>> = stack
            .frames
            .iter()
            .map(|f| {
                f.metadata.time.map(|time| FrameMark {
                    time,
                    frame: f.metadata.frame_number.unwrap_or(f.page_index as u32),
                })
            })
            .collect();
        match marks {
            Some(marks) if !marks.is_empty() => FrameClock::Stack { marks },
            _ => FrameClock::Interval {
                seconds: interval_s,
            },
        }
    }

    pub fn frame_at(&self, time: f64) -> Option<u32> {
        if !time.is_finite() {
            return None;
        }
        match self {
            FrameClock::Interval { seconds } => {
                if *seconds <= 0.0 || time < 0.0 {
                    return None;
                }
                Some((time / seconds).round() as u32)
            }
            FrameClock::Stack { marks } => marks
                .iter()
                .min_by(|a, b| (a.time - time).abs().total_cmp(&(b.time - time).abs()))
                .map(|m| m.frame),
        }
    }
}

/// Keep every `step`-th page so that roughly `max_frames` remain.
/// `max_frames == 0` keeps everything.
pub fn subsample_step(total: usize, max_frames: usize) -> usize {
    if max_frames == 0 {
        return 1;
    }
    ((total as f64 / max_frames as f64).round() as usize).max(1)
}

fn count_pages(bytes: &[u8]) -> Result<usize, LoadError> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    let mut total = 1;
    while decoder.more_images() {
        decoder.next_image()?;
        total += 1;
    }
    Ok(total)
}

fn decode_page<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    page_index: usize,
) -> Result<Frame, LoadError> {
    let (width, height) = decoder.dimensions()?;
    let channels: u8 = match decoder.colortype()? {
        ColorType::Gray(8 | 16) => 1,
        ColorType::RGB(8 | 16) => 3,
        ColorType::RGBA(8) => 4,
        other => {
            return Err(LoadError::UnsupportedFrame(format!(
                "page {page_index}: {other:?}"
            )))
        }
    };
    let description = decoder.get_tag_ascii_string(Tag::ImageDescription).ok();

    let pixels = match decoder.read_image()? {
        DecodingResult::U8(buf) => buf,
        DecodingResult::U16(buf) => scale_to_u8(&buf),
        _ => {
            return Err(LoadError::UnsupportedFrame(format!(
                "page {page_index}: sample format"
            )))
        }
    };

    let expected = width as usize * height as usize * channels as usize;
    if pixels.len() != expected {
        return Err(LoadError::UnsupportedFrame(format!(
            "page {page_index}: expected {expected} samples, got {}",
            pixels.len()
        )));
    }

    Ok(Frame {
        page_index,
        width,
        height,
        channels,
        pixels,
        metadata: description
            .map(|raw| parse_description(&raw))
            .unwrap_or_default(),
    })
}

/// Linear stretch of 16-bit samples so the brightest becomes 255.
fn scale_to_u8(buf: &[u16]) -> Vec<u8> {
    let max = buf.iter().copied().max().unwrap_or(0).max(1) as u32;
    buf.iter().map(|&v| (v as u32 * 255 / max) as u8).collect()
}

/// Parse an ImageDescription block into metadata.
pub fn parse_description(raw: &str) -> FrameMetadata {
    let mut fields = Vec::new();
    match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(serde_json::Value::Object(map)) => {
            for (key, value) in map {
                flatten_json(&key, &value, &mut fields);
            }
        }
        _ => {
            for line in raw.lines() {
                let line = line.trim();
                let split = match (line.find('='), line.find(':')) {
                    (Some(eq), _) => Some(eq),
                    (None, Some(colon)) => Some(colon),
                    (None, None) => None,
                };
                if let Some(pos) = split {
                    let key = line[..pos].trim();
                    if !key.is_empty() {
                        fields.push((key.to_string(), line[pos + 1..].trim().to_string()));
                    }
                }
            }
        }
    }

    let time = fields
        .iter()
        .filter(|(k, _)| k.to_lowercase().contains("time"))
        .find_map(|(_, v)| timefmt::parse_seconds(v));
    let frame_number = fields
        .iter()
        .filter(|(k, _)| k.to_lowercase().contains("frame"))
        .find_map(|(_, v)| v.trim().parse::<u32>().ok());

    FrameMetadata {
        raw: Some(raw.to_string()),
        fields,
        time,
        frame_number,
    }
}

fn flatten_json(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                flatten_json(&format!("{prefix}.{k}"), v, out);
            }
        }
        serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        serde_json::Value::Null => {}
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<'a>(meta: &'a FrameMetadata, key: &str) -> Option<&'a str> {
        meta.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
    use tiff::encoder::{colortype, TiffEncoder};

    fn write_stack(pages: usize, description: impl Fn(usize) -> Option<String>) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf).unwrap();
            for page in 0..pages {
                let data: Vec<u8> = (0..16).map(|i| (i * 10 + page) as u8).collect();
                let mut image = encoder.new_image::<colortype::Gray8>(4, 4).unwrap();
                if let Some(desc) = description(page) {
                    image
                        .encoder()
                        .write_tag(Tag::ImageDescription, desc.as_str())
                        .unwrap();
                }
                image.write_data(&data).unwrap();
            }
        }
        buf.into_inner()
    }

    #[test]
    fn subsample_step_matches_rounding() {
        assert_eq!(subsample_step(100, 300), 1);
        assert_eq!(subsample_step(900, 300), 3);
        assert_eq!(subsample_step(1000, 300), 3);
        assert_eq!(subsample_step(1100, 300), 4);
        assert_eq!(subsample_step(50, 0), 1);
    }

    #[test]
    fn decodes_all_pages_in_order() {
        let bytes = write_stack(3, |_| None);
        let stack = FrameStack::from_bytes(&bytes, 300).unwrap();
        assert_eq!(stack.total_pages, 3);
        assert_eq!(stack.len(), 3);
        let second = stack.get(1).unwrap();
        assert_eq!(second.page_index, 1);
        assert_eq!((second.width, second.height, second.channels), (4, 4, 1));
        assert_eq!(second.pixels[0], 1);
        assert_eq!(second.rgba_pixels().len(), 64);
        assert!(second.metadata.raw.is_none());
    }

    #[test]
    fn subsamples_long_stacks() {
        let bytes = write_stack(10, |_| None);
        let stack = FrameStack::from_bytes(&bytes, 5).unwrap();
        assert_eq!(stack.step, 2);
        let pages: Vec<usize> = stack.frames.iter().map(|f| f.page_index).collect();
        assert_eq!(pages, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn reads_description_metadata() {
        let bytes = write_stack(2, |page| {
            Some(format!(
                "{{\"Time (s)\": {}, \"FrameNumber\": {}, \"Objective\": \"10x\"}}",
                page as f64 * 0.5,
                page + 100
            ))
        });
        let stack = FrameStack::from_bytes(&bytes, 0).unwrap();
        let meta = &stack.get(1).unwrap().metadata;
        assert_eq!(meta.time, Some(0.5));
        assert_eq!(meta.frame_number, Some(101));
        assert_eq!(field(meta, "objective"), Some("10x"));

        let clock = FrameClock::for_stack(&stack, DEFAULT_FRAME_INTERVAL_S);
        assert_eq!(clock.frame_at(0.4), Some(101));
        assert_eq!(stack.frame_time(1, DEFAULT_FRAME_INTERVAL_S), Some(0.5));
    }

    #[test]
    fn parses_key_value_descriptions() {
        let meta = parse_description("Acquired: 00:01:30\nframe = 12\nGain=2\nnotes");
        assert_eq!(field(&meta, "gain"), Some("2"));
        assert_eq!(meta.frame_number, Some(12));
        assert_eq!(meta.time, None);

        let meta = parse_description("Time: 00:01:30\nFrame: 7");
        assert_eq!(meta.time, Some(90.0));
        assert_eq!(meta.frame_number, Some(7));

        let nested = parse_description(r#"{"acq": {"time": 3.5, "frame": 25}}"#);
        assert_eq!(field(&nested, "acq.time"), Some("3.5"));
        assert_eq!(nested.time, Some(3.5));
        assert_eq!(nested.frame_number, Some(25));
    }

    #[test]
    fn interval_clock_rounds() {
        let clock = FrameClock::Interval { seconds: 0.14 };
        assert_eq!(clock.frame_at(0.0), Some(0));
        assert_eq!(clock.frame_at(1.4), Some(10));
        assert_eq!(clock.frame_at(1.5), Some(11));
        assert_eq!(clock.frame_at(-1.0), None);
    }

    #[test]
    fn stack_without_timestamps_uses_interval() {
        let bytes = write_stack(2, |_| None);
        let stack = FrameStack::from_bytes(&bytes, 300).unwrap();
        assert_eq!(
            FrameClock::for_stack(&stack, 0.2),
            FrameClock::Interval { seconds: 0.2 }
        );
        assert_eq!(stack.frame_time(1, 0.2), Some(0.2));
        assert_eq!(stack.position_near(0.19, 0.2), Some(1));
    }
}
