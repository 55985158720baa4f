//! The binary module grid.

use std::fmt;

/// A rectangular grid of modules, `true` = solid.
///
/// Rows run bottom-up: `(x, y) = (0, 0)` is the bottom-left module, so
/// grid coordinates map directly onto the stamp's XY plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGrid {
    rows: usize,
    cols: usize,
    cells: Vec<bool>,
}

impl ModuleGrid {
    /// An all-inactive grid.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![false; rows * cols],
        }
    }

    /// Build from raster rows listed top to bottom, the way barcodes are
    /// usually printed. Short rows are padded with inactive modules.
    pub fn from_raster<R: AsRef<[bool]>>(raster: &[R]) -> Self {
        let rows = raster.len();
        let cols = raster.iter().map(|r| r.as_ref().len()).max().unwrap_or(0);
        let mut grid = Self::new(rows, cols);
        for (i, row) in raster.iter().enumerate() {
            let y = rows - 1 - i;
            for (x, &on) in row.as_ref().iter().enumerate() {
                grid.set(x, y, on);
            }
        }
        grid
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Modules along the longer side.
    pub fn module_count(&self) -> usize {
        self.rows.max(self.cols)
    }

    /// True if `rows == cols`.
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Module at column `x`, row `y` (bottom-up). Out of range reads as
    /// inactive.
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.cols && y < self.rows && self.cells[y * self.cols + x]
    }

    /// Same as [`get`](Self::get) but accepts negative coordinates.
    pub fn get_signed(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && self.get(x as usize, y as usize)
    }

    /// Set a module. Out-of-range writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        if x < self.cols && y < self.rows {
            self.cells[y * self.cols + x] = on;
        }
    }

    /// Number of active modules.
    pub fn active_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Total number of modules.
    pub fn total(&self) -> usize {
        self.cells.len()
    }

    /// Active module coordinates, row by row from the bottom.
    pub fn active(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &on)| on)
            .map(move |(i, _)| (i % self.cols, i / self.cols))
    }

    /// Surround the grid with `border` inactive modules on every side.
    pub fn with_quiet_zone(&self, border: usize) -> Self {
        if border == 0 {
            return self.clone();
        }
        let mut out = Self::new(self.rows + 2 * border, self.cols + 2 * border);
        for (x, y) in self.active() {
            out.set(x + border, y + border, true);
        }
        out
    }

    /// Copy with only the modules for which `keep` returns true.
    pub fn filtered(&self, mut keep: impl FnMut(usize, usize) -> bool) -> Self {
        let mut out = Self::new(self.rows, self.cols);
        for (x, y) in self.active() {
            if keep(x, y) {
                out.set(x, y, true);
            }
        }
        out
    }
}

/// Renders top row first, `##` for active and two spaces for inactive.
impl fmt::Display for ModuleGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in (0..self.rows).rev() {
            for x in 0..self.cols {
                f.write_str(if self.get(x, y) { "##" } else { "  " })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
