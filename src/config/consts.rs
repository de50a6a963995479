/// Default fuel budget for one engine command (5 billion instructions).
/// A cold compile with font loading burns through a lot; warm runs use far less.
pub const DEFAULT_FUEL_LEVEL: u64 = 5_000_000_000;
/// Minimum allowed fuel level (100 million instructions)
pub const MIN_FUEL_LEVEL: u64 = 100_000_000;
/// Maximum allowed fuel level (50 billion instructions) - runaway-compile limit
pub const MAX_FUEL_LEVEL: u64 = 50_000_000_000;

/// Default pause between queue drains after a real compile, in milliseconds.
pub const DEFAULT_COOLDOWN_MS: u64 = 200;

/// Default time `sync` waits for a never-configured overlay, in milliseconds.
pub const DEFAULT_OVERLAY_TIMEOUT_MS: u64 = 4_000;

/// Default host cache directory.
pub const DEFAULT_CACHE_DIR: &str = ".texkiln-cache";

/// Default remote distribution the engine resolves packages and fonts from.
pub const DEFAULT_ENDPOINT: &str = "https://mirror.ctan.org/systems/texlive/tlnet";
