//! Shared primitive types used across the scoring core.

/// Position of an event in a match's ledger. Starts at 1, gap-free.
pub type Sequence = u64;

/// Stable identifier of a match fixture.
pub type MatchId = String;

/// Stable identifier of a player (owned by the external player directory).
pub type PlayerId = String;

/// Stable identifier of a real team.
pub type TeamId = String;

/// Fantasy league identifier, as configured in `fantasy/leagues.json`.
pub type LeagueId = String;

/// Innings number within a match, 1-based.
pub type InningsNo = u8;
