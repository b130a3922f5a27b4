#![no_std]

mod range_inclusive;

pub trait RangeBase<Idx> {
    fn is_empty(&self) -> bool;
}

pub trait ContiguousRange<Idx>: RangeBase<Idx> + Sized {
    /// Builds the range covering `length` items starting at `start`
    ///
    /// Returns [None] for zero length ranges or ranges that would run past the
    /// end of the index type
    fn from_start_and_length(start: Idx, length: Idx) -> Option<Self>;
    fn is_adjacent(&self, other: &Self) -> bool;
    fn len(&self) -> usize;
}

pub trait RangeIntersection<Idx, Rhs: RangeBase<Idx> = Self>: RangeBase<Idx> {
    type Output: RangeBase<Idx>;

    fn intersects(&self, rhs: &Rhs) -> bool;
    fn intersection(&self, rhs: &Rhs) -> Self::Output;

    fn disjoint(&self, rhs: &Rhs) -> bool {
        !self.intersects(rhs)
    }
}

pub trait RangeContainment<Idx, Rhs: RangeBase<Idx> = Self>: RangeBase<Idx> {
    /// Every index of `rhs` is also inside `self`
    fn contains_range(&self, rhs: &Rhs) -> bool;
}
