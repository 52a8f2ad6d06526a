//! Keyboard shortcuts used to drive chat composers.
//!
//! The combos are what the provider web apps bind, expressed in the
//! `Modifier+Modifier+Key` form that `ChatSurface::press_key` dispatches.

use crate::config::Platform;

/// Logical commands the providers expose as shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardCommand {
    Enter,
    CopyLastArticle,
    CopyLastCode,
    FocusChatInput,
}

/// Map a logical command to the physical key combo for a platform.
///
/// macOS binds the copy shortcuts to Meta; every other platform uses
/// Control. Kept as a full match so additional layouts slot in without
/// restructuring.
pub fn shortcut(platform: Platform, command: KeyboardCommand) -> &'static str {
    match (platform, command) {
        (_, KeyboardCommand::Enter) => "Enter",
        (_, KeyboardCommand::FocusChatInput) => "Shift+Escape",
        (Platform::MacOs, KeyboardCommand::CopyLastArticle) => "Meta+Shift+C",
        (Platform::MacOs, KeyboardCommand::CopyLastCode) => "Meta+Shift+;",
        (_, KeyboardCommand::CopyLastArticle) => "Control+Shift+C",
        (_, KeyboardCommand::CopyLastCode) => "Control+Shift+;",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macos_uses_meta() {
        assert_eq!(
            shortcut(Platform::MacOs, KeyboardCommand::CopyLastArticle),
            "Meta+Shift+C"
        );
        assert_eq!(
            shortcut(Platform::MacOs, KeyboardCommand::CopyLastCode),
            "Meta+Shift+;"
        );
    }

    #[test]
    fn other_platforms_use_control() {
        for platform in [Platform::Windows, Platform::Linux, Platform::Other] {
            assert_eq!(
                shortcut(platform, KeyboardCommand::CopyLastArticle),
                "Control+Shift+C"
            );
        }
    }

    #[test]
    fn focus_shortcut_is_platform_independent() {
        assert_eq!(
            shortcut(Platform::Windows, KeyboardCommand::FocusChatInput),
            shortcut(Platform::MacOs, KeyboardCommand::FocusChatInput),
        );
    }
}
