use serde::Deserialize;

/// Traffic direction of a logical channel or HARQ entity.
/// `None` marks an idle (unconfigured) bearer.
#[derive(Debug, Clone, PartialEq, Copy, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Direction {
    #[default]
    None,
    /// Uplink
    Ul,
    /// Downlink
    Dl,
    Both
}

impl Direction {
    #[inline]
    pub fn includes_ul(&self) -> bool {
        matches!(self, Direction::Ul | Direction::Both)
    }

    #[inline]
    pub fn includes_dl(&self) -> bool {
        matches!(self, Direction::Dl | Direction::Both)
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        *self == Direction::None
    }
}
