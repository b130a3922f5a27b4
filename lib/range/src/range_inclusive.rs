use core::ops::RangeInclusive;

use num::{CheckedAdd, Integer, ToPrimitive};

use crate::{ContiguousRange, RangeBase, RangeContainment, RangeIntersection};

impl<Idx: Integer + Clone> RangeBase<Idx> for RangeInclusive<Idx> {
    fn is_empty(&self) -> bool {
        RangeInclusive::is_empty(self)
    }
}

impl<Idx: Integer + Clone + CheckedAdd + ToPrimitive> ContiguousRange<Idx>
    for RangeInclusive<Idx>
{
    #[inline]
    fn from_start_and_length(start: Idx, length: Idx) -> Option<Self> {
        if length.is_zero() {
            return None;
        }

        let end = start.checked_add(&(length - Idx::one()))?;

        Some(start..=end)
    }

    #[inline]
    fn is_adjacent(&self, other: &Self) -> bool {
        if RangeBase::is_empty(self) || RangeBase::is_empty(other) {
            return false;
        }

        let one = Idx::one();

        self.end().checked_add(&one).as_ref() == Some(other.start())
            || other.end().checked_add(&one).as_ref() == Some(self.start())
    }

    #[inline]
    fn len(&self) -> usize {
        if RangeBase::is_empty(self) {
            return 0;
        }

        let start = self.start().to_usize().unwrap_or(usize::MAX);
        let end = self.end().to_usize().unwrap_or(usize::MAX);

        end - start + 1
    }
}

impl<Idx: Integer + Clone> RangeIntersection<Idx, Self> for RangeInclusive<Idx> {
    type Output = RangeInclusive<Idx>;

    #[inline]
    fn intersection(&self, rhs: &Self) -> Self::Output {
        let start = core::cmp::max(self.start(), rhs.start()).clone();
        let end = core::cmp::min(self.end(), rhs.end()).clone();

        start..=end
    }

    #[inline]
    fn intersects(&self, rhs: &Self) -> bool {
        !RangeBase::is_empty(&self.intersection(rhs))
    }
}

impl<Idx: Integer + Clone> RangeContainment<Idx, Self> for RangeInclusive<Idx> {
    #[inline]
    fn contains_range(&self, rhs: &Self) -> bool {
        !RangeBase::is_empty(self)
            && !RangeBase::is_empty(rhs)
            && self.start() <= rhs.start()
            && rhs.end() <= self.end()
    }
}
