//! Standard MIDI file output: a format-1, single-track file holding the
//! transcribed notes as NoteOn / NoteOff events.

use std::io::{Seek, SeekFrom, Write};

use crate::core::base::{Error, Res};

/// Ticks per quarter note written into the header.
pub const DIVISION: i32 = 48;
/// Fixed tempo assumed for tick conversion.
pub const BPM: i32 = 120;
/// Velocity given to every note (roughly mezzo-forte).
const VELOCITY: u8 = 80;

/// Most bytes a variable-length quantity can need for a `u32`.
const MAX_BYTES_VLQ: usize = 5;

fn write_big_endian_u32<W: Write>(f: &mut W, num: u32) -> Res<()> {
    f.write_all(&num.to_be_bytes())?;
    Ok(())
}

fn write_big_endian_u16<W: Write>(f: &mut W, num: u16) -> Res<()> {
    f.write_all(&num.to_be_bytes())?;
    Ok(())
}

/// Encodes `num` as a MIDI variable-length quantity (7 bits per byte, MSB
/// set on every byte but the last).  Returns the number of bytes used.
pub fn uint_to_vlq(mut num: u32, out_buffer: &mut [u8; MAX_BYTES_VLQ]) -> usize {
    let mut buf = [0u8; MAX_BYTES_VLQ];

    // base-128 digits, least significant first
    let mut byte_count = 0;
    loop {
        buf[byte_count] = (num % 128) as u8;
        num /= 128;
        byte_count += 1;
        if num == 0 {
            break;
        }
    }

    for i in 0..byte_count {
        out_buffer[i] = buf[byte_count - 1 - i];
        if i != byte_count - 1 {
            out_buffer[i] |= 1 << 7;
        }
    }
    byte_count
}

/// One `<MTrk event>`: a delta-time VLQ followed by a short message.
struct MTrkEvent {
    data: [u8; MAX_BYTES_VLQ + 3],
    size: usize,
}

impl MTrkEvent {
    fn note_on(delta_time: u32, pitch: u8, velocity: u8) -> Self {
        Self::with_message(delta_time, [0x90, pitch, velocity])
    }

    fn note_off(delta_time: u32, pitch: u8, velocity: u8) -> Self {
        Self::with_message(delta_time, [0x80, pitch, velocity])
    }

    fn end_of_track(delta_time: u32) -> Self {
        Self::with_message(delta_time, [0xFF, 0x2F, 0x00])
    }

    fn with_message(delta_time: u32, message: [u8; 3]) -> Self {
        let mut data = [0u8; MAX_BYTES_VLQ + 3];
        let mut vlq = [0u8; MAX_BYTES_VLQ];
        let vlq_size = uint_to_vlq(delta_time, &mut vlq);
        data[..vlq_size].copy_from_slice(&vlq[..vlq_size]);
        data[vlq_size..vlq_size + 3].copy_from_slice(&message);
        Self {
            data,
            size: vlq_size + 3,
        }
    }

    fn bytes(&self) -> &[u8] {
        &self.data[..self.size]
    }
}

/// Converts a monotone sample-time cursor into tick delta-times.
struct DeltaCursor {
    last_time_stamp: i64,
    ticks_per_sample: f64,
}

impl DeltaCursor {
    fn new(samplerate: i32, bpm: i32, division: i32) -> Res<Self> {
        if samplerate == 0 || bpm == 0 || division == 0 {
            return Err(Error::BadMidiTiming);
        }
        Ok(Self {
            last_time_stamp: 0,
            ticks_per_sample: (bpm as f64 * division as f64) / (samplerate as f64 * 60.0),
        })
    }

    fn delta_ticks(&mut self, time_stamp: i64) -> u32 {
        debug_assert!(self.last_time_stamp <= time_stamp);
        let delta_samples = time_stamp - self.last_time_stamp;
        self.last_time_stamp = time_stamp;
        (delta_samples as f64 * self.ticks_per_sample).round() as u32
    }
}

/// Writes the header chunk: `MThd`, length 6, format 1, one track.
fn add_header<W: Write>(f: &mut W, format: u16, num_tracks: u16, division: u16) -> Res<()> {
    f.write_all(b"MThd")?;
    write_big_endian_u32(f, 6)?;
    write_big_endian_u16(f, format)?;
    write_big_endian_u16(f, num_tracks)?;
    write_big_endian_u16(f, division)?;
    Ok(())
}

/// Writes the track events, returning the number of bytes emitted.
fn write_notes_to_track_chunk<W: Write>(
    f: &mut W,
    note_pitches: &[i32],
    note_ranges: &[i64],
    bpm: i32,
    division: i32,
    sample_rate: i32,
) -> Res<usize> {
    let mut cursor = DeltaCursor::new(sample_rate, bpm, division)?;
    let mut total_length = 0;

    for (i, &pitch) in note_pitches.iter().enumerate() {
        for j in 0..2 {
            let delta_time = cursor.delta_ticks(note_ranges[2 * i + j]);
            let event = if j == 0 {
                MTrkEvent::note_on(delta_time, pitch as u8, VELOCITY)
            } else {
                MTrkEvent::note_off(delta_time, pitch as u8, VELOCITY)
            };
            f.write_all(event.bytes())?;
            total_length += event.size;
        }
    }

    let end = MTrkEvent::end_of_track(2);
    f.write_all(end.bytes())?;
    Ok(total_length + end.size)
}

/// Writes a complete track chunk.
///
/// The 32-bit length field precedes the track body; a placeholder is
/// emitted first and patched by seeking back once the body length is
/// known.
fn write_midi_track<W: Write + Seek>(
    f: &mut W,
    note_pitches: &[i32],
    note_ranges: &[i64],
    bpm: i32,
    division: i32,
    sample_rate: i32,
) -> Res<()> {
    f.write_all(b"MTrk")?;

    let length_loc = f.stream_position()?;
    write_big_endian_u32(f, 0)?;

    let length =
        write_notes_to_track_chunk(f, note_pitches, note_ranges, bpm, division, sample_rate)?;

    let chunk_end_loc = f.stream_position()?;
    f.seek(SeekFrom::Start(length_loc))?;
    write_big_endian_u32(f, length as u32)?;
    f.seek(SeekFrom::Start(chunk_end_loc))?;
    Ok(())
}

/// Writes the transcribed notes as a standard format-1 MIDI file.
pub fn write_notes_as_midi<W: Write + Seek>(
    note_pitches: &[i32],
    note_ranges: &[i64],
    sample_rate: i32,
    f: &mut W,
    verbose: bool,
) -> Res<()> {
    add_header(f, 1, 1, DIVISION as u16)?;
    if verbose {
        println!("header added");
    }

    write_midi_track(f, note_pitches, note_ranges, BPM, DIVISION, sample_rate)?;
    if verbose {
        println!("track added");
    }
    Ok(())
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    /// Decodes a VLQ, returning the value and the encoded size.
    fn parse_vlq(bytes: &[u8]) -> (u32, usize) {
        let mut value = 0u32;
        for (i, &b) in bytes.iter().enumerate() {
            value = (value << 7) | (b & 0x7F) as u32;
            if b & 0x80 == 0 {
                return (value, i + 1);
            }
        }
        panic!("unterminated VLQ");
    }

    #[test]
    fn test_vlq_round_trip() {
        let mut buf = [0u8; 5];
        for num in [
            0u32,
            1,
            127,
            128,
            0x3FFF,
            0x4000,
            0x1F_FFFF,
            0x20_0000,
            0x0FFF_FFFF,
            u32::MAX,
        ] {
            let size = uint_to_vlq(num, &mut buf);
            let (decoded, used) = parse_vlq(&buf);
            assert_eq!(decoded, num);
            assert_eq!(used, size);
        }
    }

    #[test]
    fn test_vlq_known_encodings() {
        let mut buf = [0u8; 5];
        assert_eq!(uint_to_vlq(0, &mut buf), 1);
        assert_eq!(buf[0], 0x00);
        assert_eq!(uint_to_vlq(0x80, &mut buf), 2);
        assert_eq!(&buf[..2], &[0x81, 0x00]);
        assert_eq!(uint_to_vlq(0x0FFF_FFFF, &mut buf), 4);
        assert_eq!(&buf[..4], &[0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_big_endian_round_trip() {
        let mut buf = Vec::new();
        write_big_endian_u32(&mut buf, 0x0102_0304).unwrap();
        write_big_endian_u16(&mut buf, 0x0506).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(u32::from_be_bytes(buf[..4].try_into().unwrap()), 0x0102_0304);
        assert_eq!(u16::from_be_bytes(buf[4..].try_into().unwrap()), 0x0506);
    }

    #[test]
    fn test_delta_cursor_requires_nonzero_timing() {
        assert_eq!(
            DeltaCursor::new(0, 120, 48).err(),
            Some(Error::BadMidiTiming)
        );
        assert_eq!(
            DeltaCursor::new(44100, 0, 48).err(),
            Some(Error::BadMidiTiming)
        );
        assert_eq!(
            DeltaCursor::new(44100, 120, 0).err(),
            Some(Error::BadMidiTiming)
        );
    }

    #[test]
    fn test_two_middle_c_notes() {
        // two half-second middle C notes at 44100 Hz; at 120 BPM and 48
        // ticks/quarter a half second is 48 ticks
        let pitches = [60, 60];
        let ranges = [0i64, 22_050, 22_050, 44_100];
        let mut out = Cursor::new(Vec::new());
        write_notes_as_midi(&pitches, &ranges, 44_100, &mut out, false).unwrap();
        let bytes = out.into_inner();

        // header
        assert_eq!(&bytes[..4], b"MThd");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 6]);
        assert_eq!(&bytes[8..10], &[0, 1]); // format 1
        assert_eq!(&bytes[10..12], &[0, 1]); // one track
        assert_eq!(&bytes[12..14], &[0, 48]); // division

        // track chunk
        assert_eq!(&bytes[14..18], b"MTrk");
        let track_len = u32::from_be_bytes(bytes[18..22].try_into().unwrap()) as usize;
        let body = &bytes[22..];
        assert_eq!(track_len, body.len());

        #[rustfmt::skip]
        let expected_body = [
            0x00, 0x90, 60, 80, // delta 0, NoteOn
            0x30, 0x80, 60, 80, // delta 48, NoteOff
            0x00, 0x90, 60, 80, // delta 0, NoteOn
            0x30, 0x80, 60, 80, // delta 48, NoteOff
            0x02, 0xFF, 0x2F, 0x00, // delta 2, End of Track
        ];
        assert_eq!(body, &expected_body);
    }

    #[test]
    fn test_track_length_is_patched() {
        let mut out = Cursor::new(Vec::new());
        write_notes_as_midi(&[57], &[0, 44_100], 44_100, &mut out, false).unwrap();
        let bytes = out.into_inner();
        let track_len = u32::from_be_bytes(bytes[18..22].try_into().unwrap()) as usize;
        assert_eq!(bytes.len(), 22 + track_len);
    }
}
