// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The binary song format.
//!
//! Everything is little-endian:
//!
//! ```text
//! "TRTN"  u16 version  u16 tempo  u32 repeat position  u32 end position
//! u8 event type count  u16 track count
//! per track:  sample name (null terminated, "DUMMY" for none)  u8 oneshot
//!             u32 loop start  u32 loop end  u32 notes  u32 velocities  u32 pans
//! per track:  notes {u32 position, u8 pitch, u16 length}
//!             velocities {u32 position, f32 value}
//!             pans {u32 position, f32 value}
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use super::data::{EditorNote, SongData, TrackData, TRACK_COUNT};
use super::error::SongFileError;

/// Magic tag every song file starts with.
pub const MAGIC: &[u8; 4] = b"TRTN";

/// Format version written by this crate.
pub const VERSION: u16 = 0;

/// Velocity and pan.
const EVENT_TYPE_COUNT: u8 = 2;

/// Sample name written for tracks without a sample.
const NO_SAMPLE: &str = "DUMMY";

/// Per-track header as it appears in the file.
struct TrackHeader {
    sample_path: Option<PathBuf>,
    one_shot: bool,
    note_count: u32,
    velocity_count: u32,
    pan_count: u32,
}

/// Writes a song. Exactly [`TRACK_COUNT`] tracks are written: missing tracks are
/// written empty, extra tracks are left out. Positions are written in ascending order.
pub fn encode<W: Write>(song: &SongData, writer: &mut W) -> Result<(), SongFileError> {
    let empty = TrackData::default();
    let tracks: Vec<&TrackData> = (0..TRACK_COUNT)
        .map(|i| song.tracks.get(i).unwrap_or(&empty))
        .collect();

    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&song.bpm.to_le_bytes())?;
    // Repeat position, unused.
    writer.write_all(&0u32.to_le_bytes())?;
    writer.write_all(&song.end_position.to_le_bytes())?;
    writer.write_all(&[EVENT_TYPE_COUNT])?;
    writer.write_all(&(TRACK_COUNT as u16).to_le_bytes())?;

    for track in &tracks {
        let name = track
            .sample_path
            .as_ref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| NO_SAMPLE.to_string());
        writer.write_all(name.as_bytes())?;
        writer.write_all(&[0])?;
        writer.write_all(&[track.one_shot as u8])?;
        // Loop start and end, unused.
        writer.write_all(&0u32.to_le_bytes())?;
        writer.write_all(&0u32.to_le_bytes())?;
        writer.write_all(&(track.note_count() as u32).to_le_bytes())?;
        writer.write_all(&(track.velocity_events.len() as u32).to_le_bytes())?;
        writer.write_all(&(track.pan_events.len() as u32).to_le_bytes())?;
    }

    for track in &tracks {
        for (position, column) in &track.notes {
            let mut column = column.clone();
            column.sort();
            for note in column {
                writer.write_all(&position.to_le_bytes())?;
                writer.write_all(&[note.pitch])?;
                writer.write_all(&note.length.to_le_bytes())?;
            }
        }
        for events in [&track.velocity_events, &track.pan_events] {
            for (position, value) in events {
                writer.write_all(&position.to_le_bytes())?;
                writer.write_all(&value.to_le_bytes())?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

/// Reads a song. Tracks past [`TRACK_COUNT`] are parsed and thrown away; a file with
/// fewer tracks leaves the rest empty.
pub fn decode<R: Read>(reader: &mut R) -> Result<SongData, SongFileError> {
    let mut magic = [0u8; 4];
    read_exact(reader, &mut magic)?;
    if &magic != MAGIC {
        return Err(SongFileError::BadMagic(magic));
    }

    let version = read_u16(reader)?;
    if version != VERSION {
        debug!(version, "Song file has an unknown version, reading it anyway");
    }
    let bpm = read_u16(reader)?;
    let _repeat_position = read_u32(reader)?;
    let end_position = read_u32(reader)?;
    let _event_types = read_u8(reader)?;
    let track_count = read_u16(reader)? as usize;

    let mut headers = Vec::with_capacity(track_count.min(TRACK_COUNT));
    for _ in 0..track_count {
        let name = read_cstring(reader)?;
        let one_shot = read_u8(reader)? != 0;
        let _loop_start = read_u32(reader)?;
        let _loop_end = read_u32(reader)?;
        headers.push(TrackHeader {
            sample_path: (!name.is_empty() && name != NO_SAMPLE).then(|| PathBuf::from(name)),
            one_shot,
            note_count: read_u32(reader)?,
            velocity_count: read_u32(reader)?,
            pan_count: read_u32(reader)?,
        });
    }

    let mut tracks = Vec::with_capacity(TRACK_COUNT);
    for header in headers {
        let mut track = TrackData {
            sample_path: header.sample_path,
            one_shot: header.one_shot,
            ..TrackData::default()
        };

        for _ in 0..header.note_count {
            let position = read_u32(reader)?;
            let pitch = read_u8(reader)?;
            let length = read_u16(reader)?;
            track.add_note(position, EditorNote { pitch, length });
        }
        for _ in 0..header.velocity_count {
            let position = read_u32(reader)?;
            track.velocity_events.insert(position, read_f32(reader)?);
        }
        for _ in 0..header.pan_count {
            let position = read_u32(reader)?;
            track.pan_events.insert(position, read_f32(reader)?);
        }

        if tracks.len() < TRACK_COUNT {
            tracks.push(track);
        }
    }
    tracks.resize_with(TRACK_COUNT, TrackData::default);

    Ok(SongData {
        bpm,
        end_position,
        tracks,
        ..SongData::default()
    })
}

/// Reads a song from disk and records where it came from.
pub fn read_file(path: &Path) -> Result<SongData, SongFileError> {
    let start = Instant::now();
    let mut reader = BufReader::new(File::open(path)?);
    let mut song = decode(&mut reader)?;
    song.save_path = Some(path.to_path_buf());
    info!(
        path = ?path,
        notes = song.note_count(),
        elapsed = ?start.elapsed(),
        "Read song file"
    );
    Ok(song)
}

/// Writes a song to disk.
pub fn write_file(song: &SongData, path: &Path) -> Result<(), SongFileError> {
    let start = Instant::now();
    let mut writer = BufWriter::new(File::create(path)?);
    encode(song, &mut writer)?;
    info!(path = ?path, elapsed = ?start.elapsed(), "Wrote song file");
    Ok(())
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), SongFileError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => SongFileError::UnexpectedEof,
        _ => SongFileError::Io(e),
    })
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8, SongFileError> {
    let mut buf = [0u8; 1];
    read_exact(reader, &mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16, SongFileError> {
    let mut buf = [0u8; 2];
    read_exact(reader, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, SongFileError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32<R: Read>(reader: &mut R) -> Result<f32, SongFileError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_cstring<R: Read>(reader: &mut R) -> Result<String, SongFileError> {
    let mut bytes = Vec::new();
    loop {
        match read_u8(reader)? {
            0 => break,
            b => bytes.push(b),
        }
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn sample_song() -> SongData {
        let mut song = SongData {
            bpm: 120,
            end_position: 256,
            ..SongData::default()
        };

        let kick = &mut song.tracks[0];
        kick.sample_path = Some(PathBuf::from("kick.wav"));
        kick.one_shot = true;
        kick.add_note(0, EditorNote { pitch: 36, length: 1 });
        kick.add_note(16, EditorNote { pitch: 36, length: 1 });
        kick.velocity_events.insert(16, 0.5);

        let pad = &mut song.tracks[3];
        pad.add_note(0, EditorNote { pitch: 48, length: 16 });
        pad.add_note(0, EditorNote { pitch: 43, length: 16 });
        pad.pan_events.insert(8, 0.25);
        pad.pan_events.insert(0, 0.75);

        song
    }

    fn encoded(song: &SongData) -> Vec<u8> {
        let mut buf = Vec::new();
        encode(song, &mut buf).expect("encode");
        buf
    }

    #[test]
    fn test_round_trip() {
        let song = sample_song();
        let decoded = decode(&mut Cursor::new(encoded(&song))).expect("decode");
        assert_eq!(decoded.bpm, 120);
        assert_eq!(decoded.end_position, 256);
        assert_eq!(decoded.tracks.len(), TRACK_COUNT);
        assert_eq!(decoded.tracks[0].sample_path, Some(PathBuf::from("kick.wav")));
        assert!(decoded.tracks[0].one_shot);
        assert_eq!(decoded.tracks[0].velocity_events[&16], 0.5);
        assert_eq!(decoded.tracks[1].sample_path, None);
        assert_eq!(decoded.tracks[3].pan_events.len(), 2);

        // Columns come back sorted by pitch, so compare against the sorted input.
        let mut expected = song.tracks[3].notes.clone();
        expected.values_mut().for_each(|column| column.sort());
        assert_eq!(decoded.tracks[3].notes, expected);
        assert_eq!(decoded.note_count(), song.note_count());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let song = sample_song();
        let first = encoded(&song);
        let decoded = decode(&mut Cursor::new(first.clone())).expect("decode");
        assert_eq!(encoded(&decoded), first);
    }

    #[test]
    fn test_header_layout() {
        let buf = encoded(&SongData::default());
        assert_eq!(&buf[0..4], b"TRTN");
        assert_eq!(u16::from_le_bytes([buf[4], buf[5]]), VERSION);
        assert_eq!(u16::from_le_bytes([buf[6], buf[7]]), 140);
        assert_eq!(&buf[8..12], &[0, 0, 0, 0]);
        assert_eq!(buf[16], EVENT_TYPE_COUNT);
        assert_eq!(u16::from_le_bytes([buf[17], buf[18]]), TRACK_COUNT as u16);
        assert_eq!(&buf[19..25], b"DUMMY\0");
        // Each empty track header is "DUMMY\0" plus 21 bytes of flags and counts.
        assert_eq!(buf.len(), 19 + TRACK_COUNT * (6 + 1 + 4 * 5));
    }

    #[test]
    fn test_sample_path_keeps_only_file_name() {
        let mut song = SongData::default();
        song.tracks[0].sample_path = Some(PathBuf::from("/samples/drums/snare.wav"));
        let decoded = decode(&mut Cursor::new(encoded(&song))).expect("decode");
        assert_eq!(decoded.tracks[0].sample_path, Some(PathBuf::from("snare.wav")));
    }

    #[test]
    fn test_bad_magic() {
        let mut buf = encoded(&sample_song());
        buf[0..4].copy_from_slice(b"RIFF");
        match decode(&mut Cursor::new(buf)) {
            Err(SongFileError::BadMagic(magic)) => assert_eq!(&magic, b"RIFF"),
            other => panic!("expected bad magic, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated() {
        let buf = encoded(&sample_song());
        for len in [0, 3, 10, buf.len() - 1] {
            assert!(matches!(
                decode(&mut Cursor::new(&buf[..len])),
                Err(SongFileError::UnexpectedEof)
            ));
        }
    }

    fn raw_song(track_count: u16, tracks: &[(&str, &[(u32, u8, u16)])]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&90u16.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.push(2);
        buf.extend_from_slice(&track_count.to_le_bytes());
        for (name, notes) in tracks {
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
            buf.push(0);
            buf.extend_from_slice(&[0; 8]);
            buf.extend_from_slice(&(notes.len() as u32).to_le_bytes());
            buf.extend_from_slice(&[0; 8]);
        }
        for (_, notes) in tracks {
            for (position, pitch, length) in notes.iter() {
                buf.extend_from_slice(&position.to_le_bytes());
                buf.push(*pitch);
                buf.extend_from_slice(&length.to_le_bytes());
            }
        }
        buf
    }

    #[test]
    fn test_fewer_tracks_are_padded() {
        let buf = raw_song(2, &[("a.wav", &[(4, 40, 2)]), ("DUMMY", &[])]);
        let song = decode(&mut Cursor::new(buf)).expect("decode");
        assert_eq!(song.bpm, 90);
        assert_eq!(song.tracks.len(), TRACK_COUNT);
        assert_eq!(song.tracks[0].note_count(), 1);
        assert!(song.tracks[15].is_empty());
    }

    #[test]
    fn test_extra_tracks_are_discarded() {
        let notes: &[(u32, u8, u16)] = &[(0, 1, 1)];
        let tracks: Vec<(&str, &[(u32, u8, u16)])> = (0..18).map(|_| ("x.wav", notes)).collect();
        let song = decode(&mut Cursor::new(raw_song(18, &tracks))).expect("decode");
        assert_eq!(song.tracks.len(), TRACK_COUNT);
        assert_eq!(song.note_count(), TRACK_COUNT);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("song.tri");
        write_file(&sample_song(), &path).expect("write");
        let song = read_file(&path).expect("read");
        assert_eq!(song.save_path, Some(path));
        assert_eq!(song.note_count(), sample_song().note_count());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            read_file(&dir.path().join("missing.tri")),
            Err(SongFileError::Io(_))
        ));
    }
}
