//! yEnc stream decoder
//!
//! Turns the body lines of one fetched article into bytes on disk. A body
//! goes through these states:
//!
//! ```text
//! seeking =ybegin -> [=ypart] -> payload -> =yend
//! ```
//!
//! The payload is written straight into the output file at `begin - 1` while
//! a CRC-32 is accumulated. A checksum mismatch against the trailer is logged
//! but does not undo the write; the verification pass is the integrity gate.
//!
//! Decoding is blocking file I/O and is run on the blocking thread pool by the
//! fetch pool.

mod output;
mod params;

pub use output::sanitize_filename;

use crate::error::DecodeError;
use crate::types::{DecodeResult, SegmentKey};
use output::SegmentWriter;
use params::{YBEGIN, YBegin, YEND, YPART, YPart, parse_ybegin, parse_yend, parse_ypart};
use std::path::Path;

/// Decode one segment's body lines into `target_dir`
///
/// `segment` is only used to give log lines their context.
pub fn decode_segment(
    lines: &[Vec<u8>],
    target_dir: &Path,
    segment: SegmentKey,
) -> Result<DecodeResult, DecodeError> {
    let mut lines = lines.iter().map(|l| trim_eol(l));

    let header = seek_header(&mut lines, segment)?;
    let name = sanitize_filename(&header.name);
    if name != header.name {
        tracing::debug!(
            file_id = segment.file_id.get(),
            part = segment.part,
            posted = %header.name,
            sanitized = %name,
            "Sanitized posted filename"
        );
    }

    let range = match header.part {
        Some(_) => Some(expect_part(&mut lines)?),
        None => None,
    };

    let offset = range.map(|r| r.begin - 1).unwrap_or(0);
    // Bytes past the end of a =ypart range belong to another segment
    let limit = range.map(|r| r.end - r.begin + 1).unwrap_or(u64::MAX);
    let mut writer = SegmentWriter::open(target_dir, &name, offset)?;
    let mut crc = crc32fast::Hasher::new();
    let mut buf = Vec::with_capacity(header.line.unwrap_or(128) as usize + 2);
    let mut decoded: u64 = 0;

    let mut trailer = None;
    for line in lines.by_ref() {
        if line.starts_with(YEND.as_bytes()) {
            let text = String::from_utf8_lossy(line);
            match parse_yend(&text) {
                Ok(end) => {
                    trailer = Some(end);
                    break;
                }
                Err(reason) => {
                    tracing::warn!(
                        file_id = segment.file_id.get(),
                        part = segment.part,
                        reason = %reason,
                        "Malformed =yend trailer, still looking for a valid one"
                    );
                    continue;
                }
            }
        }

        if line.starts_with(YBEGIN.as_bytes()) || line.starts_with(YPART.as_bytes()) {
            tracing::warn!(
                file_id = segment.file_id.get(),
                part = segment.part,
                line = %String::from_utf8_lossy(line),
                "Ignoring unexpected yEnc marker inside payload"
            );
            continue;
        }

        buf.clear();
        decode_line(line, &mut buf);
        crc.update(&buf);
        decoded += buf.len() as u64;

        let room = limit.saturating_sub(writer.written());
        let take = buf.len().min(usize::try_from(room).unwrap_or(usize::MAX));
        writer.write(&buf[..take])?;
    }

    let Some(trailer) = trailer else {
        tracing::warn!(
            file_id = segment.file_id.get(),
            part = segment.part,
            path = %writer.path().display(),
            decoded,
            "Input ended before =yend trailer"
        );
        writer.finish()?;
        return Err(DecodeError::MissingTrailer { decoded });
    };

    writer.finish()?;
    let computed = crc.finalize();

    if trailer.size != decoded {
        tracing::warn!(
            file_id = segment.file_id.get(),
            part = segment.part,
            declared = trailer.size,
            decoded,
            "Decoded size differs from =yend size"
        );
    }
    if let (Some(declared), Some(trailer_part)) = (header.part, trailer.part)
        && declared != trailer_part
    {
        tracing::warn!(
            file_id = segment.file_id.get(),
            part = segment.part,
            header_part = declared,
            trailer_part,
            "Part index differs between =ybegin and =yend"
        );
    }

    let declared_crc = match range {
        Some(_) => trailer.pcrc32,
        None => trailer.pcrc32.or(trailer.crc32),
    };
    if let Some(declared) = declared_crc
        && declared != computed
    {
        tracing::warn!(
            file_id = segment.file_id.get(),
            part = segment.part,
            name = %name,
            expected = format_args!("{:08x}", declared),
            computed = format_args!("{:08x}", computed),
            "CRC-32 mismatch, keeping written bytes for verification"
        );
    }

    let (begin, end) = match range {
        Some(r) => {
            if r.end - r.begin + 1 != decoded {
                tracing::warn!(
                    file_id = segment.file_id.get(),
                    part = segment.part,
                    begin = r.begin,
                    end = r.end,
                    decoded,
                    "Decoded byte count does not match the =ypart range"
                );
                return Err(DecodeError::RangeMismatch {
                    begin: r.begin,
                    end: r.end,
                    decoded,
                });
            }
            (r.begin, r.end)
        }
        None => {
            if decoded == 0 {
                return Err(DecodeError::EmptyPayload);
            }
            (1, decoded)
        }
    };

    Ok(DecodeResult {
        name,
        begin,
        end,
        pcrc32: declared_crc.unwrap_or(computed),
        crc32: if range.is_none() { trailer.crc32 } else { None },
        size: if range.is_none() { Some(header.size) } else { None },
    })
}

/// Skip to the first well-formed `=ybegin` line
fn seek_header<'a>(
    lines: &mut impl Iterator<Item = &'a [u8]>,
    segment: SegmentKey,
) -> Result<YBegin, DecodeError> {
    for line in lines {
        if !line.starts_with(YBEGIN.as_bytes()) {
            continue;
        }
        let text = String::from_utf8_lossy(line);
        match parse_ybegin(&text) {
            Ok(header) => return Ok(header),
            Err(reason) => {
                tracing::warn!(
                    file_id = segment.file_id.get(),
                    part = segment.part,
                    reason = %reason,
                    "Skipping malformed =ybegin line"
                );
            }
        }
    }
    Err(DecodeError::MissingHeader)
}

/// The next non-empty line after a multi-part header must be `=ypart`
fn expect_part<'a>(lines: &mut impl Iterator<Item = &'a [u8]>) -> Result<YPart, DecodeError> {
    let line = lines
        .find(|l| !l.is_empty())
        .ok_or(DecodeError::MissingPart)?;

    if !line.starts_with(YPART.as_bytes()) {
        return Err(DecodeError::MissingPart);
    }

    parse_ypart(&String::from_utf8_lossy(line)).map_err(DecodeError::InvalidPart)
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    &line[..end]
}

/// Decode one payload line, appending to `out`
///
/// Every byte is shifted down by 42; a `=` escapes the next byte, which is
/// shifted down by a further 64. Stray CR/LF bytes are not data.
fn decode_line(line: &[u8], out: &mut Vec<u8>) {
    let mut escaped = false;
    for &byte in line {
        if escaped {
            out.push(byte.wrapping_sub(64).wrapping_sub(42));
            escaped = false;
            continue;
        }
        match byte {
            b'=' => escaped = true,
            b'\r' | b'\n' => {}
            _ => out.push(byte.wrapping_sub(42)),
        }
    }
}
