//! The beam store: a controller-grid of saved beams for instant recall.

use serde::{Deserialize, Serialize};

use crate::beam::Beam;
use crate::error::Error;

// -------------------------------------------------------------------------------------------------

/// Grid rows of the default store (one per clip-grid row on an APC40-class surface).
pub const DEFAULT_STORE_ROWS: usize = 5;

/// Grid columns of the default store.
pub const DEFAULT_STORE_COLUMNS: usize = 8;

// -------------------------------------------------------------------------------------------------

/// A rows × columns grid of saved beams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamStore {
    rows: usize,
    columns: usize,
    slots: Vec<Option<Beam>>,
}

impl Default for BeamStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_ROWS, DEFAULT_STORE_COLUMNS)
    }
}

impl BeamStore {
    pub fn new(rows: usize, columns: usize) -> Self {
        let (rows, columns) = (rows.max(1), columns.max(1));
        Self {
            rows,
            columns,
            slots: vec![None; rows * columns],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    fn index(&self, row: usize, column: usize) -> Result<usize, Error> {
        if row >= self.rows || column >= self.columns {
            return Err(Error::StoreSlotNotFound { row, column });
        }
        Ok(row * self.columns + column)
    }

    /// Save a copy of a beam into a slot, replacing whatever was there.
    pub fn save(&mut self, row: usize, column: usize, beam: Beam) -> Result<(), Error> {
        let index = self.index(row, column)?;
        self.slots[index] = Some(beam);
        Ok(())
    }

    /// Recall a copy of a slot's beam; an empty slot recalls nothing.
    pub fn recall(&self, row: usize, column: usize) -> Result<Option<Beam>, Error> {
        let index = self.index(row, column)?;
        Ok(self.slots[index].clone())
    }

    pub fn clear(&mut self, row: usize, column: usize) -> Result<(), Error> {
        let index = self.index(row, column)?;
        self.slots[index] = None;
        Ok(())
    }

    pub fn occupied(&self, row: usize, column: usize) -> bool {
        self.index(row, column)
            .map(|index| self.slots[index].is_some())
            .unwrap_or(false)
    }
}

// -------------------------------------------------------------------------------------------------
