//! Discord presentation: embeds and the player control buttons.

pub mod buttons;
pub mod embeds;
