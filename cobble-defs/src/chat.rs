//! Chat color codes, player ranks, and click modes.

pub mod color {
    pub const BLACK: &str = "&0";
    pub const DARK_BLUE: &str = "&1";
    pub const DARK_GREEN: &str = "&2";
    pub const DARK_TEAL: &str = "&3";
    pub const DARK_RED: &str = "&4";
    pub const PURPLE: &str = "&5";
    pub const GOLD: &str = "&6";
    pub const GRAY: &str = "&7";
    pub const DARK_GRAY: &str = "&8";
    pub const BLUE: &str = "&9";
    pub const GREEN: &str = "&a";
    pub const TEAL: &str = "&b";
    pub const RED: &str = "&c";
    pub const PINK: &str = "&d";
    pub const YELLOW: &str = "&e";
    pub const WHITE: &str = "&f";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerRank {
    #[default]
    Guest,
    Administrator,
}

impl PlayerRank {
    /// Guest-level actions are open to everyone; anything above requires the
    /// exact rank.
    pub fn has_permission(self, required: PlayerRank) -> bool {
        required == PlayerRank::Guest || self == required
    }

    pub fn chat_color(self) -> &'static str {
        match self {
            PlayerRank::Guest => color::DARK_GRAY,
            PlayerRank::Administrator => color::YELLOW,
        }
    }
}

/// Mouse mode byte of a client block edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMode {
    Destroy,
    Place,
}

impl ClickMode {
    pub fn from_wire(mode: u8) -> Self {
        match mode {
            0 => ClickMode::Destroy,
            _ => ClickMode::Place,
        }
    }
}
