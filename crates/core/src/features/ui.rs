//! Immediate-mode UI collaborator

use crate::hotkey::HotkeyField;

/// Which mouse button activated a button this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Click {
    None,
    Primary,
    Secondary,
}

/// Widgets the feature menu is drawn with
///
/// Implemented by the overlay backend; every call is made on the render
/// thread during one frame.
pub trait Ui {
    /// Open a tab; returns false if the tab is not visible this frame
    fn begin_tab(&mut self, label: &str) -> bool;

    /// Close a tab opened by a successful [`begin_tab`](Ui::begin_tab)
    fn end_tab(&mut self);

    /// Returns true if the user changed `value`
    fn checkbox(&mut self, label: &str, value: &mut bool) -> bool;

    fn text(&mut self, text: &str);

    fn button(&mut self, label: &str) -> Click;

    fn separator(&mut self);

    /// Capture button for a hotkey
    ///
    /// Primary click starts a capture (unless another field is capturing),
    /// secondary click clears the binding. Returns true if the binding or
    /// capture state changed.
    fn hotkey_button(&mut self, hotkey: &HotkeyField) -> bool {
        match self.button(hotkey.capture_button_label()) {
            Click::Primary if !hotkey.other_is_capturing() && !hotkey.is_capturing() => {
                hotkey.begin_capture();
                true
            }
            Click::Secondary => hotkey.clear(),
            _ => false,
        }
    }
}
