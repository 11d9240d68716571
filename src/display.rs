//! Display collaborator hook.
//!
//! The core does not render anything itself. It forwards clear-screen and
//! sprite-draw requests to whatever implements this trait, so a variety of
//! front-ends (terminal, window, test harness) can be plugged in without the
//! interpreter knowing how they work.

use std::io;

/// Interface the interpreter uses to talk to a display.
pub trait Display {
    /// Clear the screen.
    fn clear(&mut self) -> io::Result<()>;

    /// Draw a sprite at pixel coordinates (x, y).
    ///
    /// Sprites are 8 pixels wide; each byte in `sprite` is one row. Returns
    /// true if drawing erased any previously set pixel (the collision flag
    /// the interpreter writes back into VF).
    fn draw(&mut self, x: u8, y: u8, sprite: &[u8]) -> io::Result<bool>;
}

/// Display that ignores everything. Useful for headless runs and for
/// testing non-display routines.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn clear(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn draw(&mut self, _x: u8, _y: u8, _sprite: &[u8]) -> io::Result<bool> {
        Ok(false)
    }
}
