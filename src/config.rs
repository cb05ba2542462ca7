//! Typed configuration assembled once in `main` from parsed CLI flags and
//! threaded explicitly into the driver (per the design notes: global mutable
//! state becomes a session object threaded through, not an ambient global).

use std::path::PathBuf;

/// The property currently being checked. Only `NoDataRace` has a fully
/// specified core; `Assert` is recognized (closed CLI flag set) but checked
/// with a thin pass-through onto `ErrorKind::Assertion` states — a real
/// assertion-reachability back-end is an external collaborator out of scope
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    NoDataRace,
    Assert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    pub fn bits(self) -> u32 {
        match self {
            PointerWidth::Bits32 => 32,
            PointerWidth::Bits64 => 64,
        }
    }
}

/// Assembled once from `cli::Cli` and owned by the top-level run; every
/// downstream component (driver, report) takes this by reference rather than
/// reaching for ambient globals.
#[derive(Debug, Clone)]
pub struct ExploreConfig {
    pub input: PathBuf,
    pub out_dir: PathBuf,
    pub check: Property,
    pub pointer_bitwidth: PointerWidth,
    /// Stop exploring entirely the moment any tier-1 error state is reached,
    /// not just when the checked property is violated.
    pub exit_on_error: bool,
    /// Reserved for a future parallel-DFS backend (§5: "An implementation
    /// may parallelize across independent sibling subtrees"). The reference
    /// driver always explores sequentially; this flag is accepted and
    /// recorded but does not change behavior, matching the closed CLI flag
    /// set's `-threads-dpor` without inventing a thread pool nothing else
    /// here needs.
    pub threads_dpor: bool,
    /// Resolves the source's "halt on first race vs. continue enumerating"
    /// open question (§9). Default `false` = halt-on-first.
    pub strict: bool,
}
