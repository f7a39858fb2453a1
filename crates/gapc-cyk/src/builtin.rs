use smol_str::{SmolStr, format_smolstr};

/// Runtime names the emitted procedure refers to.
///
/// Built once per compilation run and shared by reference with every stage
/// that emits or evaluates code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Builtins {
    pub procedure: SmolStr,
    /// Length query on an input sequence (`seq.size()`).
    pub size: SmolStr,
    pub mutex: SmolStr,
    pub lock_shared: SmolStr,
    pub unlock_shared: SmolStr,
    pub assert: SmolStr,
    pub load_checkpoint: SmolStr,
    /// Saved flag set once the inside sweep of an outside run has finished.
    pub outside_phase: SmolStr,
    pub outer_loop_1_idx: SmolStr,
    pub outer_loop_2_idx: SmolStr,
    pub inner_loop_2_idx: SmolStr,
    pub tile_size: SmolStr,
    pub max_tiles: SmolStr,
    pub max_tiles_n: SmolStr,
    /// Preprocessor symbol overriding the tile size at compile time.
    pub tile_size_macro: SmolStr,
    /// Preprocessor symbol defined when compiling with OpenMP.
    pub openmp_macro: SmolStr,
    pub lock_guard: String,
    /// Tile scheduling variables: diagonal offset, tile column, tile row.
    pub tile_z: SmolStr,
    pub tile_y: SmolStr,
    pub tile_x: SmolStr,
    pub routine_prefix: SmolStr,
}

impl Default for Builtins {
    fn default() -> Self {
        Self {
            procedure: "cyk".into(),
            size: "size".into(),
            mutex: "mutex".into(),
            lock_shared: "lock_shared".into(),
            unlock_shared: "unlock_shared".into(),
            assert: "assert".into(),
            load_checkpoint: "load_checkpoint".into(),
            outside_phase: "outside_phase".into(),
            outer_loop_1_idx: "outer_loop_1_idx".into(),
            outer_loop_2_idx: "outer_loop_2_idx".into(),
            inner_loop_2_idx: "inner_loop_2_idx".into(),
            tile_size: "tile_size".into(),
            max_tiles: "max_tiles".into(),
            max_tiles_n: "max_tiles_n".into(),
            tile_size_macro: "TILE_SIZE".into(),
            openmp_macro: "_OPENMP".into(),
            lock_guard: "std::lock_guard<fair_mutex> lock(mutex);".to_string(),
            tile_z: "z".into(),
            tile_y: "y".into(),
            tile_x: "x".into(),
            routine_prefix: "nt_tabulate_".into(),
        }
    }
}

impl Builtins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the "already loaded" marker paired with a resumable index.
    pub fn loaded(&self, index: &str) -> SmolStr {
        format_smolstr!("{}_loaded", index)
    }

    /// Marker of the outside sweep, kept apart from the inside sweep's so a
    /// restore only resumes the phase that was running.
    pub fn outside_loaded(&self, index: &str) -> SmolStr {
        format_smolstr!("{}_outside_loaded", index)
    }

    /// Name of the saved start value of a resumable tiled progress index.
    pub fn start(&self, index: &str) -> SmolStr {
        format_smolstr!("{}_start", index)
    }

    pub fn routine(&self, nonterminal: &str) -> SmolStr {
        format_smolstr!("{}{}", self.routine_prefix, nonterminal)
    }

    /// The three tiled progress indices, in declaration order.
    pub fn tiled_progress_indices(&self) -> [&SmolStr; 3] {
        [
            &self.outer_loop_1_idx,
            &self.outer_loop_2_idx,
            &self.inner_loop_2_idx,
        ]
    }
}
