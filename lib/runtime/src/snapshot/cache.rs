use std::{
    ops::RangeInclusive,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use memscope_config::{InspectorConfig, Staleness};
use memscope_range::{ContiguousRange, RangeIntersection};

use super::Snapshot;
use crate::{
    InspectorError,
    memory::{Address, AddressSpace, RegionId, RegionTable},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub staleness: Staleness,
    /// Ticks a snapshot may lag under [Staleness::Frame]
    pub max_age: u64,
    /// Extra capture attempts when a tick boundary is crossed mid capture
    pub retries: u8,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            staleness: Staleness::Frame,
            max_age: 0,
            retries: 3,
        }
    }
}

impl From<&InspectorConfig> for CachePolicy {
    fn from(config: &InspectorConfig) -> Self {
        Self {
            staleness: config.staleness,
            max_age: config.max_snapshot_age,
            retries: config.refresh_retries,
        }
    }
}

/// Serves byte ranges to the viewport out of the most recently captured snapshot
///
/// The latest snapshot is published through an [ArcSwapOption] so readers never wait on a
/// refresh, and a published snapshot is only ever replaced, never modified
#[derive(Debug)]
pub struct SnapshotCache {
    address_space: Arc<AddressSpace>,
    policy: CachePolicy,
    current: ArcSwapOption<Snapshot>,
    /// Serializes publishing against invalidation
    publish: Mutex<()>,
    /// Bumped whenever in flight refreshes must not publish
    epoch: AtomicU64,
    /// Bumped whenever the published snapshot was dropped because of a write
    invalidations: AtomicU64,
    in_flight: AtomicUsize,
}

impl SnapshotCache {
    pub fn new(address_space: Arc<AddressSpace>, policy: CachePolicy) -> Self {
        Self {
            address_space,
            policy,
            current: ArcSwapOption::empty(),
            publish: Mutex::default(),
            epoch: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn regions(&self) -> &RegionTable {
        self.address_space.regions()
    }

    pub fn current_tick(&self) -> u64 {
        self.address_space.current_tick()
    }

    /// Fetch a byte range, reusing the cached snapshot when the policy allows it
    pub fn get_range(&self, address: Address, length: u32) -> Result<Snapshot, InspectorError> {
        let (region, range) = self.locate(address, length)?;

        if let Some(cached) = self.current.load_full() {
            if cached.covers(&range) {
                if !cached.is_stale() && self.is_fresh(&cached) {
                    tracing::trace!("Snapshot cache hit for {:#010x?}", range);
                    return Ok(cached.slice(&range));
                }

                if self.policy.staleness == Staleness::Frame
                    && self.in_flight.load(Ordering::Acquire) > 0
                {
                    tracing::debug!(
                        "Serving snapshot from tick {} while another refresh is running",
                        cached.capture_tick()
                    );
                    return Ok(cached.slice(&range).into_stale());
                }
            }
        }

        self.refresh_range(region, range)
    }

    /// Capture a byte range unconditionally
    pub fn refresh(&self, address: Address, length: u32) -> Result<Snapshot, InspectorError> {
        let (region, range) = self.locate(address, length)?;

        self.refresh_range(region, range)
    }

    /// Whether a snapshot may still be served under the current policy
    pub fn is_fresh(&self, snapshot: &Snapshot) -> bool {
        match self.policy.staleness {
            Staleness::Frame => {
                self.address_space
                    .current_tick()
                    .saturating_sub(snapshot.capture_tick())
                    <= self.policy.max_age
            }
            Staleness::Exact => snapshot.generation() == self.address_space.generation(),
        }
    }

    /// Most recently published snapshot, stale or not
    pub fn latest(&self) -> Option<Snapshot> {
        self.current.load_full().map(|snapshot| Snapshot::clone(&snapshot))
    }

    /// Drop the published snapshot if it overlaps a written range
    pub fn invalidate(&self, range: RangeInclusive<Address>) {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);

        // A refresh that started before the write may have read the old bytes
        self.epoch.fetch_add(1, Ordering::AcqRel);

        let overlaps = self
            .current
            .load_full()
            .is_some_and(|snapshot| snapshot.range().intersects(&range));

        if overlaps {
            tracing::debug!("Invalidated snapshot overlapping {:#010x?}", range);
            self.current.store(None);
            self.invalidations.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Count of invalidations so far, viewers compare it to notice they need to refetch
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Acquire)
    }

    /// Prevent every refresh running right now from publishing its result
    pub fn cancel_refresh(&self) {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);

        if self.in_flight.load(Ordering::Acquire) > 0 {
            tracing::debug!("Cancelling in flight refreshes");
        }

        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Forget everything, used when the session closes
    pub fn release(&self) {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);

        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.current.store(None);
    }

    fn locate(
        &self,
        address: Address,
        length: u32,
    ) -> Result<(RegionId, RangeInclusive<Address>), InspectorError> {
        let segments = self.regions().resolve(address, length as usize)?;

        match segments.as_slice() {
            [(region, range)] => Ok((*region, range.clone())),
            // Snapshots belong to a single region
            _ => Err(InspectorError::OutOfRange {
                address,
                length: u64::from(length),
            }),
        }
    }

    fn refresh_range(
        &self,
        region: RegionId,
        range: RangeInclusive<Address>,
    ) -> Result<Snapshot, InspectorError> {
        let ticket = RefreshTicket::new(self);

        match self.capture(region, &range) {
            Ok(snapshot) => self.publish(&ticket, snapshot),
            Err(error) => {
                tracing::warn!("Refresh of {:#010x?} failed: {}", range, error);
                self.mark_stale();

                Err(error)
            }
        }
    }

    fn capture(
        &self,
        region: RegionId,
        range: &RangeInclusive<Address>,
    ) -> Result<Snapshot, InspectorError> {
        let base = self.regions().get(region)?.base();
        let length = ContiguousRange::len(range);
        let mut captured = self.address_space.current_tick();

        for _ in 0..=self.policy.retries {
            let tick = self.address_space.current_tick();
            let generation = self.address_space.generation();

            let mut buffer = vec![0; length];
            self.address_space.read_into(*range.start(), &mut buffer)?;

            if self.address_space.current_tick() == tick {
                tracing::debug!("Captured {:#010x?} at tick {}", range, tick);

                return Ok(Snapshot {
                    region,
                    address: *range.start(),
                    start_offset: range.start() - base,
                    bytes: Bytes::from(buffer),
                    capture_tick: tick,
                    generation,
                    stale: false,
                });
            }

            tracing::debug!("Tick advanced while capturing {:#010x?}, retrying", range);
            captured = tick;
        }

        Err(InspectorError::StaleSnapshot {
            captured,
            current: self.address_space.current_tick(),
        })
    }

    fn publish(
        &self,
        ticket: &RefreshTicket<'_>,
        snapshot: Snapshot,
    ) -> Result<Snapshot, InspectorError> {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);

        if self.epoch.load(Ordering::Acquire) != ticket.epoch {
            tracing::debug!("Discarding cancelled refresh of {:#010x?}", snapshot.range());
            return Err(InspectorError::RefreshCancelled);
        }

        self.current.store(Some(Arc::new(snapshot.clone())));

        Ok(snapshot)
    }

    fn mark_stale(&self) {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = self.current.load_full() {
            self.current
                .store(Some(Arc::new(Snapshot::clone(&current).into_stale())));
        }
    }
}

/// Marks a refresh as running for as long as it lives
struct RefreshTicket<'a> {
    cache: &'a SnapshotCache,
    epoch: u64,
}

impl<'a> RefreshTicket<'a> {
    fn new(cache: &'a SnapshotCache) -> Self {
        // Taken under the publish lock so it cannot straddle a cancellation
        let _guard = cache.publish.lock().unwrap_or_else(PoisonError::into_inner);
        cache.in_flight.fetch_add(1, Ordering::AcqRel);

        Self {
            cache,
            epoch: cache.epoch.load(Ordering::Acquire),
        }
    }
}

impl Drop for RefreshTicket<'_> {
    fn drop(&mut self) {
        self.cache.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use memscope_config::RegionConfig;

    use super::*;

    fn cache(staleness: Staleness) -> SnapshotCache {
        let address_space = AddressSpace::new([
            RegionConfig::new("Main RAM", 0x0200_0000, 0x40_0000, true),
            RegionConfig::new("Shared WRAM", 0x0300_0000, 0x8000, true),
        ])
        .unwrap();

        SnapshotCache::new(
            Arc::new(address_space),
            CachePolicy {
                staleness,
                ..Default::default()
            },
        )
    }

    #[test]
    fn repeated_fetch_is_identical() {
        let cache = cache(Staleness::Frame);

        let first = cache.get_range(0x0200_0000, 0x100).unwrap();
        let second = cache.get_range(0x0200_0000, 0x100).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn hit_serves_sub_range() {
        let cache = cache(Staleness::Frame);

        cache.address_space.write(0x0200_0020, &[0xaa]).unwrap();
        cache.get_range(0x0200_0000, 0x100).unwrap();
        // Written behind the cache's back within the same tick
        cache.address_space.write(0x0200_0021, &[0xbb]).unwrap();

        let snapshot = cache.get_range(0x0200_0020, 2).unwrap();

        assert_eq!(snapshot.bytes(), [0xaa, 0x00]);
        assert_eq!(snapshot.start_offset(), 0x20);
    }

    #[test]
    fn frame_policy_refreshes_on_new_tick() {
        let cache = cache(Staleness::Frame);

        cache.get_range(0x0200_0000, 0x10).unwrap();
        cache.address_space.write(0x0200_0000, &[0x42]).unwrap();
        cache.address_space.advance_tick();

        let snapshot = cache.get_range(0x0200_0000, 0x10).unwrap();

        assert_eq!(snapshot.bytes()[0], 0x42);
        assert_eq!(snapshot.capture_tick(), 1);
    }

    #[test]
    fn frame_policy_tolerates_configured_age() {
        let address_space = Arc::new(
            AddressSpace::new([RegionConfig::new("RAM", 0, 0x100, true)]).unwrap(),
        );
        let cache = SnapshotCache::new(
            address_space.clone(),
            CachePolicy {
                max_age: 2,
                ..Default::default()
            },
        );

        cache.get_range(0, 0x10).unwrap();
        address_space.write(0, &[1]).unwrap();
        address_space.advance_tick();
        address_space.advance_tick();
        assert_eq!(cache.get_range(0, 1).unwrap().bytes(), [0]);

        address_space.advance_tick();
        assert_eq!(cache.get_range(0, 1).unwrap().bytes(), [1]);
    }

    #[test]
    fn exact_policy_refreshes_on_any_write() {
        let cache = cache(Staleness::Exact);

        cache.get_range(0x0300_0000, 0x10).unwrap();
        cache.address_space.write(0x0200_0000, &[0x01]).unwrap();
        cache.address_space.write(0x0300_0004, &[0x42]).unwrap();

        assert_eq!(cache.get_range(0x0300_0004, 1).unwrap().bytes(), [0x42]);
    }

    #[test]
    fn previous_snapshot_served_while_refreshing() {
        let cache = cache(Staleness::Frame);

        cache.get_range(0x0200_0000, 0x10).unwrap();
        cache.address_space.write(0x0200_0000, &[0x42]).unwrap();
        cache.address_space.advance_tick();

        let _ticket = RefreshTicket::new(&cache);
        let snapshot = cache.get_range(0x0200_0000, 0x10).unwrap();

        assert!(snapshot.is_stale());
        assert_eq!(snapshot.bytes()[0], 0x00);
        assert_eq!(snapshot.capture_tick(), 0);
    }

    #[test]
    fn exact_policy_waits_for_refresh() {
        let cache = cache(Staleness::Exact);

        cache.get_range(0x0200_0000, 0x10).unwrap();
        cache.address_space.write(0x0200_0000, &[0x42]).unwrap();

        let _ticket = RefreshTicket::new(&cache);
        let snapshot = cache.get_range(0x0200_0000, 0x10).unwrap();

        assert!(!snapshot.is_stale());
        assert_eq!(snapshot.bytes()[0], 0x42);
    }

    #[test]
    fn cancelled_refresh_is_not_published() {
        let cache = cache(Staleness::Frame);
        let (region, range) = cache.locate(0x0200_0000, 0x10).unwrap();

        let ticket = RefreshTicket::new(&cache);
        let snapshot = cache.capture(region, &range).unwrap();
        cache.cancel_refresh();

        assert_eq!(
            cache.publish(&ticket, snapshot),
            Err(InspectorError::RefreshCancelled)
        );
        assert_eq!(cache.latest(), None);
    }

    #[test]
    fn invalidation_drops_overlapping_snapshot() {
        let cache = cache(Staleness::Frame);

        cache.get_range(0x0200_0000, 0x100).unwrap();
        cache.invalidate(0x0300_0000..=0x0300_0000);
        assert!(cache.latest().is_some());
        assert_eq!(cache.invalidations(), 0);

        cache.invalidate(0x0200_00ff..=0x0200_00ff);
        assert!(cache.latest().is_none());
        assert_eq!(cache.invalidations(), 1);
    }

    #[test]
    fn failed_refresh_keeps_previous_snapshot_as_stale() {
        let mut io = RegionConfig::new("I/O", 0x0400_0000, 0x100, true);
        io.readable = false;

        let address_space = AddressSpace::new([
            RegionConfig::new("Main RAM", 0x0200_0000, 0x40_0000, true),
            io,
        ])
        .unwrap();
        let cache = SnapshotCache::new(Arc::new(address_space), CachePolicy::default());

        cache.get_range(0x0200_0000, 0x10).unwrap();

        assert_eq!(
            cache.get_range(0x0400_0000, 0x10),
            Err(InspectorError::Denied {
                address: 0x0400_0000,
                region: "I/O".into()
            })
        );

        let latest = cache.latest().unwrap();
        assert!(latest.is_stale());
        assert_eq!(latest.address(), 0x0200_0000);
    }

    #[test]
    fn ranges_spanning_regions_are_rejected() {
        let address_space = AddressSpace::new([
            RegionConfig::new("Low", 0x0000, 0x100, true),
            RegionConfig::new("High", 0x0100, 0x100, true),
        ])
        .unwrap();
        let cache = SnapshotCache::new(Arc::new(address_space), CachePolicy::default());

        assert_eq!(
            cache.get_range(0xf0, 0x20),
            Err(InspectorError::OutOfRange {
                address: 0xf0,
                length: 0x20
            })
        );
    }

    #[test]
    fn release_forgets_everything() {
        let cache = cache(Staleness::Frame);

        cache.get_range(0x0200_0000, 0x10).unwrap();
        cache.release();

        assert_eq!(cache.latest(), None);
    }
}
