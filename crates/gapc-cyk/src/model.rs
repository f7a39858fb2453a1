//! The analyzed grammar facts the table-filling generator consumes.
//!
//! Semantic analysis (yield sizes, table dimension reduction, topological
//! sorting) happens upstream; a [`GrammarModel`] only records its results.
use std::{fmt, path::Path, str::FromStr};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};

use crate::{builtin::Builtins, error::ModelError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axiom {
    pub name: SmolStr,
    pub tracks: usize,
}

/// Left and right running index of one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningIndices {
    pub left: SmolStr,
    pub right: SmolStr,
}

impl RunningIndices {
    pub fn conventional(track: usize) -> Self {
        Self {
            left: format_smolstr!("t_{}_i", track),
            right: format_smolstr!("t_{}_j", track),
        }
    }
}

/// Which running indices of one track a table materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDims {
    pub left: bool,
    pub right: bool,
}

impl TableDims {
    pub const QUADRATIC: Self = Self {
        left: true,
        right: true,
    };
    pub const LEFT_ONLY: Self = Self {
        left: true,
        right: false,
    };
    pub const RIGHT_ONLY: Self = Self {
        left: false,
        right: true,
    };
    pub const CONSTANT: Self = Self {
        left: false,
        right: false,
    };

    pub fn count(self) -> usize {
        usize::from(self.left) + usize::from(self.right)
    }
}

impl Default for TableDims {
    fn default() -> Self {
        Self::QUADRATIC
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// One materialized table index of a non-terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIndex {
    pub track: usize,
    pub side: Side,
    pub name: SmolStr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonTerminal {
    pub name: SmolStr,
    #[serde(default = "default_true")]
    pub tabulated: bool,
    #[serde(default)]
    pub first_track: usize,
    #[serde(default = "default_tracks")]
    pub tracks: usize,
    /// One descriptor per spanned track; empty means full tables everywhere.
    #[serde(default)]
    pub tables: Vec<TableDims>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routine: Option<SmolStr>,
    /// Whether the non-terminal belongs to the outside grammar.
    #[serde(default)]
    pub outside: bool,
}

fn default_true() -> bool {
    true
}

fn default_tracks() -> usize {
    1
}

impl NonTerminal {
    pub fn new(name: impl Into<SmolStr>, tables: Vec<TableDims>) -> Self {
        Self {
            name: name.into(),
            tabulated: true,
            first_track: 0,
            tracks: tables.len(),
            tables,
            routine: None,
            outside: false,
        }
    }

    pub fn on_track(mut self, first_track: usize) -> Self {
        self.first_track = first_track;
        self
    }

    pub fn untabulated(mut self) -> Self {
        self.tabulated = false;
        self
    }

    pub fn outside(mut self) -> Self {
        self.outside = true;
        self
    }

    pub fn routine_name(&self, builtins: &Builtins) -> SmolStr {
        self.routine
            .clone()
            .unwrap_or_else(|| builtins.routine(&self.name))
    }

    /// Number of materialized table indices over all spanned tracks.
    pub fn dimension(&self) -> usize {
        self.tables.iter().map(|dims| dims.count()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parallel {
    /// Emit the tiled branch whenever the grammar allows it.
    #[default]
    Auto,
    On,
    Off,
}

impl FromStr for Parallel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Parallel::Auto),
            "on" => Ok(Parallel::On),
            "off" => Ok(Parallel::Off),
            other => Err(format!("unknown parallel mode \"{}\"", other)),
        }
    }
}

impl fmt::Display for Parallel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parallel::Auto => write!(f, "auto"),
            Parallel::On => write!(f, "on"),
            Parallel::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CykOptions {
    /// Whether the program evaluates tables bottom-up at all.
    pub cyk: bool,
    pub checkpoint: bool,
    pub outside: bool,
    pub parallel: Parallel,
    pub tile_size: u32,
}

impl Default for CykOptions {
    fn default() -> Self {
        Self {
            cyk: true,
            checkpoint: false,
            outside: false,
            parallel: Parallel::Auto,
            tile_size: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarModel {
    pub axiom: Axiom,
    /// Input sequence variable per track.
    #[serde(default)]
    pub sequences: Vec<SmolStr>,
    #[serde(default)]
    pub indices: Vec<RunningIndices>,
    #[serde(default)]
    pub nonterminals: Vec<NonTerminal>,
    /// Topological evaluation order; defaults to declaration order.
    #[serde(default)]
    pub order: Vec<SmolStr>,
    #[serde(default)]
    pub options: CykOptions,
}

impl GrammarModel {
    /// A model with conventional sequence and index names and no non-terminals.
    pub fn new(axiom: impl Into<SmolStr>, tracks: usize) -> Self {
        Self {
            axiom: Axiom {
                name: axiom.into(),
                tracks,
            },
            sequences: Vec::new(),
            indices: Vec::new(),
            nonterminals: Vec::new(),
            order: Vec::new(),
            options: CykOptions::default(),
        }
        .with_defaults()
    }

    pub fn with_nonterminal(mut self, nt: NonTerminal) -> Self {
        self.order.push(nt.name.clone());
        self.nonterminals.push(nt);
        self
    }

    pub fn with_order<S: Into<SmolStr>>(mut self, order: impl IntoIterator<Item = S>) -> Self {
        self.order = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_options(mut self, options: CykOptions) -> Self {
        self.options = options;
        self
    }

    /// Loads a model from a `.toml` or `.json` file.
    ///
    /// The model is not validated, so options can still be overridden before
    /// calling [`GrammarModel::validate`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let model: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => return Err(ModelError::UnsupportedFormat(path.to_path_buf())),
        };
        Ok(model.with_defaults())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ModelError> {
        let model: Self = toml::from_str(content)?;
        let model = model.with_defaults();
        model.validate()?;
        Ok(model)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(content)?;
        let model = model.with_defaults();
        model.validate()?;
        Ok(model)
    }

    /// Fills in everything a model file may leave out.
    pub fn with_defaults(mut self) -> Self {
        if self.sequences.is_empty() {
            self.sequences = (0..self.axiom.tracks)
                .map(|track| format_smolstr!("t_{}_seq", track))
                .collect();
        }
        if self.indices.is_empty() {
            self.indices = (0..self.axiom.tracks)
                .map(RunningIndices::conventional)
                .collect();
        }
        for nt in self.nonterminals.iter_mut() {
            if nt.tables.is_empty() {
                nt.tables = vec![TableDims::QUADRATIC; nt.tracks];
            }
        }
        if self.order.is_empty() {
            self.order = self
                .nonterminals
                .iter()
                .filter(|nt| nt.tabulated)
                .map(|nt| nt.name.clone())
                .collect();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.axiom.tracks == 0 {
            return Err(ModelError::NoTracks(self.axiom.name.clone()));
        }
        if self.options.tile_size == 0 {
            return Err(ModelError::InvalidTileSize);
        }

        let mut declared = FxHashSet::default();
        for nt in &self.nonterminals {
            if !declared.insert(&nt.name) {
                return Err(ModelError::DuplicateNonTerminal(nt.name.clone()));
            }
            if nt.tracks == 0 {
                return Err(ModelError::EmptyTrackSpan {
                    name: nt.name.clone(),
                });
            }
            if nt.first_track + nt.tracks > self.axiom.tracks {
                return Err(ModelError::TrackOutOfRange {
                    name: nt.name.clone(),
                    first_track: nt.first_track,
                    tracks: nt.tracks,
                    axiom_tracks: self.axiom.tracks,
                });
            }
            if nt.tables.len() != nt.tracks {
                return Err(ModelError::TableCountMismatch {
                    name: nt.name.clone(),
                    tracks: nt.tracks,
                    tables: nt.tables.len(),
                });
            }
            if nt.outside && !self.options.outside {
                return Err(ModelError::OutsideDisabled(nt.name.clone()));
            }
        }

        let mut ordered = FxHashSet::default();
        for name in &self.order {
            if !declared.contains(name) {
                return Err(ModelError::UnknownNonTerminal(name.clone()));
            }
            if !ordered.insert(name) {
                return Err(ModelError::DuplicateOrder(name.clone()));
            }
        }

        match self
            .nonterminals
            .iter()
            .find(|nt| nt.tabulated && !ordered.contains(&nt.name))
        {
            Some(nt) => Err(ModelError::Unordered(nt.name.clone())),
            None => Ok(()),
        }
    }

    pub fn nonterminal(&self, name: &str) -> Option<&NonTerminal> {
        self.nonterminals.iter().find(|nt| nt.name == name)
    }

    /// Tabulated non-terminals in evaluation order.
    pub fn tabulated(&self) -> impl Iterator<Item = &NonTerminal> {
        self.order
            .iter()
            .filter_map(|name| self.nonterminal(name))
            .filter(|nt| nt.tabulated)
    }

    /// Materialized table indices of `nt`, track by track, left before right.
    pub fn table_indices(&self, nt: &NonTerminal) -> Vec<TableIndex> {
        nt.tables
            .iter()
            .enumerate()
            .filter_map(|(offset, dims)| {
                let track = nt.first_track + offset;
                self.indices.get(track).map(|indices| (track, dims, indices))
            })
            .flat_map(|(track, dims, indices)| {
                let left = dims.left.then(|| TableIndex {
                    track,
                    side: Side::Left,
                    name: indices.left.clone(),
                });
                let right = dims.right.then(|| TableIndex {
                    track,
                    side: Side::Right,
                    name: indices.right.clone(),
                });
                left.into_iter().chain(right)
            })
            .collect()
    }
}
