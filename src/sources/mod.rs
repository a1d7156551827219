//! Playlist and EPG inputs

pub mod epg;
pub mod loader;
pub mod m3u;

pub use epg::{EpgIndex, EpgLoader};
pub use loader::{LoadedPlaylist, PlaylistLoader};
pub use m3u::{M3uParser, ParsedPlaylist, parse_playlist};
