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

//! Song data as the editor sees it, and the binary `.tri` format it is saved in.

mod codec;
mod data;
mod error;

pub use codec::{decode, encode, read_file, write_file, MAGIC, VERSION};
pub use data::{EditorNote, SongData, TrackData, DEFAULT_BPM, TRACK_COUNT};
pub use error::SongFileError;
