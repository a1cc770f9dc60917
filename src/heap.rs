use log::debug;

use crate::error::{LispError, Result};
use crate::value::{CellId, Value};

/// A single cell: two values.
#[derive(Clone, Copy, Debug)]
pub struct Cell {
    pub car: Value,
    pub cdr: Value,
}

/// Snapshot of heap occupancy, as reported by `(heap)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapStats {
    pub segments: usize,
    /// Segments linked after the initial one.
    pub growths: usize,
    pub total: usize,
    pub free: usize,
}

/// The cell heap. Cells live in fixed-size segments that are linked on
/// demand and never returned; a CellId is a global index across segments.
///
/// Free cells are threaded through their `car` into a single free list,
/// so allocation and release are both O(1).
pub struct Heap {
    segments: Vec<Box<[Cell]>>,
    segment_cells: usize,
    max_segments: Option<usize>,
    avail: Option<CellId>,
    free: usize,
    growths: usize,
}

impl Heap {
    /// Create a heap and link its first segment.
    pub fn new(segment_cells: usize, max_segments: Option<usize>) -> Result<Self> {
        let mut heap = Heap {
            segments: Vec::new(),
            segment_cells: segment_cells.max(1),
            max_segments,
            avail: None,
            free: 0,
            growths: 0,
        };
        heap.link_segment()?;
        Ok(heap)
    }

    /// Allocate a cell holding `(car . cdr)`.
    pub fn cons(&mut self, car: Value, cdr: Value) -> Result<Value> {
        let id = match self.avail {
            Some(id) => id,
            None => {
                self.link_segment()?;
                self.growths += 1;
                debug!(
                    "heap grown to {} segments ({} cells)",
                    self.segments.len(),
                    self.total()
                );
                match self.avail {
                    Some(id) => id,
                    None => return Err(self.exhausted()),
                }
            }
        };
        let (seg, off) = self.locate(id);
        let cell = &mut self.segments[seg][off];
        self.avail = cell.car.as_cell();
        cell.car = car;
        cell.cdr = cdr;
        self.free -= 1;
        Ok(Value::cell(id))
    }

    /// Return a cell to the free list. The caller guarantees nothing
    /// references it any more; its contents are poisoned.
    pub fn release(&mut self, id: CellId) {
        let next = self.avail.map_or(Value::NIL, Value::cell);
        let cell = self.cell_mut(id);
        cell.car = next;
        cell.cdr = Value::NIL;
        self.avail = Some(id);
        self.free += 1;
    }

    /// Build a proper list from a slice of values.
    pub fn list(&mut self, values: &[Value]) -> Result<Value> {
        let mut result = Value::NIL;
        for &val in values.iter().rev() {
            result = self.cons(val, result)?;
        }
        Ok(result)
    }

    #[inline]
    pub fn car(&self, id: CellId) -> Value {
        self.cell(id).car
    }

    #[inline]
    pub fn cdr(&self, id: CellId) -> Value {
        self.cell(id).cdr
    }

    #[inline]
    pub fn set_car(&mut self, id: CellId, val: Value) {
        self.cell_mut(id).car = val;
    }

    #[inline]
    pub fn set_cdr(&mut self, id: CellId, val: Value) {
        self.cell_mut(id).cdr = val;
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            segments: self.segments.len(),
            growths: self.growths,
            total: self.total(),
            free: self.free,
        }
    }

    pub fn segment_cells(&self) -> usize {
        self.segment_cells
    }

    fn total(&self) -> usize {
        self.segments.len() * self.segment_cells
    }

    #[inline]
    fn locate(&self, id: CellId) -> (usize, usize) {
        let idx = id.0 as usize;
        (idx / self.segment_cells, idx % self.segment_cells)
    }

    #[inline]
    fn cell(&self, id: CellId) -> &Cell {
        let (seg, off) = self.locate(id);
        &self.segments[seg][off]
    }

    #[inline]
    fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        let (seg, off) = self.locate(id);
        &mut self.segments[seg][off]
    }

    fn exhausted(&self) -> LispError {
        LispError::HeapExhausted {
            segments: self.segments.len(),
        }
    }

    /// Link one more segment and thread all of its cells onto the free list.
    fn link_segment(&mut self) -> Result<()> {
        if let Some(max) = self.max_segments {
            if self.segments.len() >= max {
                return Err(self.exhausted());
            }
        }
        let n = self.segment_cells;
        let base = self.total();
        if base + n > u32::MAX as usize {
            return Err(self.exhausted());
        }
        let mut cells = Vec::new();
        if cells.try_reserve_exact(n).is_err() {
            return Err(self.exhausted());
        }
        let tail = self.avail.map_or(Value::NIL, Value::cell);
        for i in 0..n {
            let next = if i + 1 < n {
                Value::cell(CellId((base + i + 1) as u32))
            } else {
                tail
            };
            cells.push(Cell {
                car: next,
                cdr: Value::NIL,
            });
        }
        self.segments.push(cells.into_boxed_slice());
        self.avail = Some(CellId(base as u32));
        self.free += n;
        Ok(())
    }
}
