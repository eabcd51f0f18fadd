//! Terminal styling for CLI output
//!
//! Semantic colors: green/yellow/red for status, cyan for headers and
//! technical terms, dim for secondary information.

use crossterm::style::Stylize;

/// Semantic styling on top of crossterm's `Stylize`
///
/// ```
/// use posterwall::style::KioskStyle;
///
/// println!("{}", "POSTERS:".header());
/// println!("{}", "video".technical());
/// ```
pub trait KioskStyle: Stylize {
    /// Section headers (cyan bold)
    fn header(self) -> <<Self as Stylize>::Styled as Stylize>::Styled
    where
        Self: Sized,
        <Self as Stylize>::Styled: Stylize,
    {
        self.cyan().bold()
    }

    /// Positive outcomes (green)
    fn success(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.green()
    }

    /// Failures and missing things (red)
    fn error(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.red()
    }

    /// Partial or skipped states (yellow)
    fn warning(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.yellow()
    }

    /// Kinds, counts, paths (cyan)
    fn technical(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.cyan()
    }
}

impl<T: Stylize> KioskStyle for T {}
