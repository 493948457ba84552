//! Trader states and operator commands.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraderStatus {
    /// Not on the market.
    Cold,
    /// Orders working, none filled.
    Hot,
    /// An entry filled, the position is open.
    Active,
}

impl std::fmt::Display for TraderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cold => write!(f, "COLD"),
            Self::Hot => write!(f, "HOT"),
            Self::Active => write!(f, "ACTIVE"),
        }
    }
}

/// Side of the straddle a leg belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hot,
    Cold,
    Quit,
}

impl Command {
    /// Single letter, case-insensitive.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_uppercase().as_str() {
            "H" => Some(Self::Hot),
            "C" => Some(Self::Cold),
            "Q" => Some(Self::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_ignore_case_and_whitespace() {
        assert_eq!(Command::parse(" h\n"), Some(Command::Hot));
        assert_eq!(Command::parse("C"), Some(Command::Cold));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("hot"), None);
        assert_eq!(Command::parse(""), None);
    }
}
