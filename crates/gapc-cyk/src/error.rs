use std::path::PathBuf;

use smol_str::SmolStr;
use thiserror::Error;

/// Internal invariant violations detected while generating the table-filling
/// procedure. They point at a defect in an earlier analysis stage and end the
/// compilation run.
#[derive(Error, Debug)]
pub enum CykError {
    #[error("internal error: {sequences} input sequences declared for an axiom with {tracks} tracks")]
    TrackMismatch { sequences: usize, tracks: usize },
    #[error("internal error: {indices} running index pairs declared for an axiom with {tracks} tracks")]
    IndexMismatch { indices: usize, tracks: usize },
    #[error("tiled parallel evaluation is not supported for multi-track grammars ({0} tracks)")]
    MultiTrackParallel(usize),
    #[error("tiled parallel evaluation is not supported for outside generation")]
    OutsideParallel,
    #[error("non-terminal \"{0}\" has a single-index table, which the tiled schedule cannot place")]
    ReducedTableInTiledSchedule(SmolStr),
    #[error("outside non-terminal \"{0}\" must have a full or constant table on every track")]
    ReducedTableInOutsideTraversal(SmolStr),
    #[error(transparent)]
    InvalidModel(#[from] ModelError),
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read \"{path}\"")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML grammar model")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON grammar model")]
    Json(#[from] serde_json::Error),
    #[error("unsupported grammar model format \"{0}\", expected .toml or .json")]
    UnsupportedFormat(PathBuf),
    #[error("axiom \"{0}\" must have at least one track")]
    NoTracks(SmolStr),
    #[error("tile size must be positive")]
    InvalidTileSize,
    #[error("non-terminal \"{0}\" is declared more than once")]
    DuplicateNonTerminal(SmolStr),
    #[error("evaluation order names unknown non-terminal \"{0}\"")]
    UnknownNonTerminal(SmolStr),
    #[error("evaluation order lists \"{0}\" more than once")]
    DuplicateOrder(SmolStr),
    #[error("tabulated non-terminal \"{0}\" is missing from the evaluation order")]
    Unordered(SmolStr),
    #[error("non-terminal \"{name}\" must span at least one track")]
    EmptyTrackSpan { name: SmolStr },
    #[error(
        "non-terminal \"{name}\" spans {tracks} tracks from track {first_track} but the axiom has {axiom_tracks}"
    )]
    TrackOutOfRange {
        name: SmolStr,
        first_track: usize,
        tracks: usize,
        axiom_tracks: usize,
    },
    #[error("non-terminal \"{0}\" is marked outside but outside generation is disabled")]
    OutsideDisabled(SmolStr),
    #[error("non-terminal \"{name}\" spans {tracks} tracks but declares {tables} table descriptors")]
    TableCountMismatch {
        name: SmolStr,
        tracks: usize,
        tables: usize,
    },
}
