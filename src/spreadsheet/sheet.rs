use crate::budget::BudgetError;
use crate::budget::MemoryBudget;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::EMPTY;
use either::Either;

/// How a row's cells are walked.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CellIteration {
    /// Every column from 1 to the highest column, empty positions included.
    #[default]
    Dense,
    /// Only cells holding a stored value; column indices may have gaps.
    Sparse,
}

/// A named grid of cells, filled by a reader and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct Worksheet {
    name: String,
    /// Stored cells ordered by (row, column) once finished
    cells: Vec<Cell>,
    /// Populated rows:
    /// 1. row index
    /// 2. cells lower index
    /// 3. cells upper index
    spans: Vec<(u32, usize, usize)>,
    highest_row: u32,
    highest_column: u32,
    /// Whether cells arrived in (row, column) order
    ordered: bool,
}

impl Worksheet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ordered: true,
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn highest_row(&self) -> u32 {
        self.highest_row
    }

    pub fn highest_column(&self) -> u32 {
        self.highest_column
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Stored cells in (row, column) order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Adds a cell, charging its size to the budget and growing the bounds.
    pub fn push(&mut self, cell: Cell, budget: &mut MemoryBudget) -> Result<(), BudgetError> {
        budget.charge(cell.memory_size())?;
        if let Some(last) = self.cells.last() {
            if (last.row, last.column) >= (cell.row, cell.column) {
                self.ordered = false;
            }
        }
        self.highest_row = self.highest_row.max(cell.row);
        self.highest_column = self.highest_column.max(cell.column);
        self.cells.push(cell);
        Ok(())
    }

    /// Sorts the cells if needed, keeps the last write per position, and
    /// indexes the populated rows.
    pub fn finish(&mut self) {
        if !self.ordered {
            self.cells.sort_by_key(|cell| (cell.row, cell.column));
            let mut deduplicated: Vec<Cell> = Vec::with_capacity(self.cells.len());
            for cell in self.cells.drain(..) {
                match deduplicated.last_mut() {
                    Some(last) if (last.row, last.column) == (cell.row, cell.column) => *last = cell,
                    _ => deduplicated.push(cell),
                }
            }
            self.cells = deduplicated;
            self.ordered = true;
        }
        self.spans.clear();
        let mut lower = 0usize;
        for index in 1..=self.cells.len() {
            if index == self.cells.len() || self.cells[index].row != self.cells[lower].row {
                self.spans.push((self.cells[lower].row, lower, index));
                lower = index;
            }
        }
    }

    /// Returns the stored cell at a position.
    pub fn get(&self, row: u32, column: u32) -> Option<&Cell> {
        let span = self.spans.binary_search_by_key(&row, |(index, _, _)| *index).ok()?;
        let (_, lower, upper) = self.spans[span];
        let cells = &self.cells[lower..upper];
        cells
            .binary_search_by_key(&column, |cell| cell.column)
            .ok()
            .map(|index| &cells[index])
    }

    /// The value at a position, `Empty` when nothing is stored there.
    pub fn value(&self, row: u32, column: u32) -> &CellValue {
        self.get(row, column).map_or(&EMPTY, |cell| &cell.value)
    }

    /// Rows 1 through `highest_row` without gaps. Each call starts over.
    pub fn rows(&self, iteration: CellIteration) -> Rows<'_> {
        Rows {
            sheet: self,
            iteration,
            next_row: 1,
            span: 0,
        }
    }
}

/// Lazy iterator over the rows of a [`Worksheet`].
#[derive(Clone)]
pub struct Rows<'a> {
    sheet: &'a Worksheet,
    iteration: CellIteration,
    next_row: u32,
    span: usize,
}

impl<'a> Iterator for Rows<'a> {
    type Item = Row<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_row > self.sheet.highest_row {
            return None;
        }
        let index = self.next_row;
        self.next_row += 1;
        let stored = match self.sheet.spans.get(self.span) {
            Some(&(row, lower, upper)) if row == index => {
                self.span += 1;
                &self.sheet.cells[lower..upper]
            }
            _ => &[],
        };
        let width = match self.iteration {
            CellIteration::Dense => Some(self.sheet.highest_column),
            CellIteration::Sparse => None,
        };
        Some(Row { index, stored, width })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.sheet.highest_row + 1).saturating_sub(self.next_row) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Rows<'_> {}

/// One row; `index` is the worksheet-native 1-based row number.
#[derive(Clone, Debug)]
pub struct Row<'a> {
    pub index: u32,
    stored: &'a [Cell],
    width: Option<u32>,
}

/// A position in a row, with the stored cell if there is one.
#[derive(Copy, Clone, Debug)]
pub struct CellRef<'a> {
    pub column: u32,
    pub cell: Option<&'a Cell>,
}

impl<'a> CellRef<'a> {
    pub fn value(&self) -> &'a CellValue {
        self.cell.map_or(&EMPTY, |cell| &cell.value)
    }
}

impl<'a> Row<'a> {
    pub fn cells(&self) -> impl Iterator<Item = CellRef<'a>> + 'a {
        match self.width {
            Some(width) => Either::Left(DenseCells {
                stored: self.stored,
                column: 1,
                width,
            }),
            None => Either::Right(
                self.stored
                    .iter()
                    .filter(|cell| !cell.value.is_empty())
                    .map(|cell| CellRef {
                        column: cell.column,
                        cell: Some(cell),
                    }),
            ),
        }
    }
}

struct DenseCells<'a> {
    stored: &'a [Cell],
    column: u32,
    width: u32,
}

impl<'a> Iterator for DenseCells<'a> {
    type Item = CellRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.column > self.width {
            return None;
        }
        let column = self.column;
        self.column += 1;
        let cell = match self.stored.split_first() {
            Some((cell, rest)) if cell.column == column => {
                self.stored = rest;
                Some(cell)
            }
            _ => None,
        };
        Some(CellRef { column, cell })
    }
}
