use std::fmt;

/// One of the two local play sessions. `First` always aliases the host's
/// own single-player character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlayerIndex {
    #[default]
    First,
    Second,
}

impl PlayerIndex {
    pub const ALL: [PlayerIndex; 2] = [PlayerIndex::First, PlayerIndex::Second];

    pub const fn index(self) -> usize {
        match self {
            PlayerIndex::First => 0,
            PlayerIndex::Second => 1,
        }
    }

    pub const fn other(self) -> PlayerIndex {
        match self {
            PlayerIndex::First => PlayerIndex::Second,
            PlayerIndex::Second => PlayerIndex::First,
        }
    }
}

impl fmt::Display for PlayerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.index())
    }
}
