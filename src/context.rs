//! Communicator lifecycle: unique ids, the registry of shared regions, and
//! the create/destroy halves of the bootstrap protocol.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bootstrap::resolve_physical_rank;
use crate::comm::Communicator;
use crate::config::CollConfig;
use crate::error::{CollError, Result};
use crate::memory::ScratchPool;
use crate::shared::SharedRegion;
use crate::types::{CommId, Rank};
use crate::wait::WaitPolicy;

/// Process-wide state backing every communicator created from it.
///
/// There is no hidden global: the runtime creates one context at startup
/// (the equivalent of an `init` call), hands clones of it to every task,
/// and calls [`finalize`](Self::finalize) once all communicators are gone.
#[derive(Clone)]
pub struct CollContext {
    inner: Arc<ContextInner>,
}

pub(crate) struct ContextInner {
    config: CollConfig,
    policy: WaitPolicy,
    next_id: AtomicU64,
    regions: Mutex<HashMap<CommId, Arc<SharedRegion>>>,
    scratch: Arc<ScratchPool>,
}

impl CollContext {
    pub fn new(config: CollConfig) -> Self {
        let policy = WaitPolicy::from_config(&config);
        let scratch = ScratchPool::from_config(&config);
        Self {
            inner: Arc::new(ContextInner {
                config,
                policy,
                next_id: AtomicU64::new(0),
                regions: Mutex::new(HashMap::new()),
                scratch,
            }),
        }
    }

    /// Context configured from `SHMCOLL_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(CollConfig::from_env())
    }

    pub fn config(&self) -> &CollConfig {
        &self.inner.config
    }

    /// Step 1: allocate a communicator id. Called by exactly one participant;
    /// the runtime distributes the result to the others.
    pub fn generate_unique_id(&self) -> CommId {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Step 2: this participant's physical process rank.
    pub fn resolve_physical_mapping(&self) -> usize {
        resolve_physical_rank()
    }

    /// Step 3: build this rank's communicator handle.
    ///
    /// `mapping`, when present, must hold one physical rank per logical
    /// rank, and its entry for `global_rank` must equal the physical rank
    /// resolved here. Blocks until all `group_size` ranks have called
    /// `create_communicator` with the same id.
    pub fn create_communicator(
        &self,
        unique_id: CommId,
        global_rank: Rank,
        group_size: usize,
        mapping: Option<&[usize]>,
    ) -> Result<Communicator> {
        let physical_rank = self.resolve_physical_mapping();
        self.create_communicator_on(unique_id, global_rank, group_size, mapping, physical_rank)
    }

    /// [`create_communicator`](Self::create_communicator) with an explicitly
    /// supplied physical rank instead of one resolved from the environment.
    pub fn create_communicator_on(
        &self,
        unique_id: CommId,
        global_rank: Rank,
        group_size: usize,
        mapping: Option<&[usize]>,
        physical_rank: usize,
    ) -> Result<Communicator> {
        if group_size == 0 {
            return Err(CollError::InvalidGroupSize(group_size));
        }
        if global_rank >= group_size {
            return Err(CollError::InvalidRank {
                rank: global_rank,
                world_size: group_size,
            });
        }
        if let Some(mapping) = mapping {
            if mapping.len() != group_size {
                return Err(CollError::MappingLength {
                    expected: group_size,
                    actual: mapping.len(),
                });
            }
            if mapping[global_rank] != physical_rank {
                return Err(CollError::RankMappingMismatch {
                    rank: global_rank,
                    expected: mapping[global_rank],
                    actual: physical_rank,
                });
            }
        }

        let region = self.inner.attach(unique_id, global_rank, group_size)?;

        // Every rank must hold the region before any of them publishes.
        match region
            .barrier()
            .wait_or_abort(&self.inner.policy, || region.is_poisoned())
        {
            Ok(true) => {}
            Ok(false) => {
                self.inner.release(&region, global_rank)?;
                return Err(CollError::CommunicatorPoisoned { unique_id });
            }
            Err(timed_out) => {
                tracing::warn!(unique_id, global_rank, "communicator rendezvous timed out");
                region.poison();
                self.inner.release(&region, global_rank)?;
                return Err(timed_out.into_error("create", "rendezvous"));
            }
        }

        tracing::info!(
            unique_id,
            global_rank,
            group_size,
            physical_rank,
            "communicator created"
        );

        Ok(Communicator::new(
            global_rank,
            physical_rank,
            mapping.map(<[usize]>::to_vec),
            region,
            Arc::clone(&self.inner),
        ))
    }

    /// Step 4: tear down `comm` on the rank the runtime scheduled as
    /// `scheduled_rank`. See [`Communicator::destroy`].
    pub fn destroy_communicator(&self, comm: &mut Communicator, scheduled_rank: Rank) -> Result<()> {
        comm.destroy(scheduled_rank)
    }

    /// Number of communicators that still have at least one attached rank.
    pub fn live_communicators(&self) -> Result<usize> {
        Ok(self.inner.regions()?.len())
    }

    /// Shut the context down. Fails if any communicator is still live.
    pub fn finalize(self) -> Result<()> {
        let count = self.live_communicators()?;
        if count != 0 {
            return Err(CollError::LiveCommunicators { count });
        }
        Ok(())
    }
}

impl Default for CollContext {
    fn default() -> Self {
        Self::new(CollConfig::default())
    }
}

impl ContextInner {
    pub(crate) fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    pub(crate) fn scratch(&self) -> &Arc<ScratchPool> {
        &self.scratch
    }

    fn regions(&self) -> Result<MutexGuard<'_, HashMap<CommId, Arc<SharedRegion>>>> {
        self.regions
            .lock()
            .map_err(|_| CollError::LockPoisoned("communicator registry"))
    }

    /// Find or create the region for `unique_id` and claim `rank`'s seat.
    fn attach(&self, unique_id: CommId, rank: Rank, size: usize) -> Result<Arc<SharedRegion>> {
        let mut regions = self.regions()?;
        let live = regions.len();
        let region = match regions.entry(unique_id) {
            Entry::Occupied(e) => {
                let region = e.get();
                if region.size() != size {
                    return Err(CollError::GroupSizeConflict {
                        unique_id,
                        existing: region.size(),
                        requested: size,
                    });
                }
                Arc::clone(region)
            }
            Entry::Vacant(e) => {
                if live >= self.config.max_communicators {
                    return Err(CollError::TooManyCommunicators {
                        limit: self.config.max_communicators,
                    });
                }
                Arc::clone(e.insert(Arc::new(SharedRegion::new(unique_id, size))))
            }
        };
        region.attach(rank)?;
        Ok(region)
    }

    /// Give up `rank`'s seat; the last rank out unregisters the region.
    pub(crate) fn release(&self, region: &Arc<SharedRegion>, rank: Rank) -> Result<()> {
        let mut regions = self.regions()?;
        let unique_id = region.unique_id();
        match regions.get(&unique_id) {
            Some(registered) if Arc::ptr_eq(registered, region) => {}
            _ => return Err(CollError::UnknownCommunicator { unique_id }),
        }
        if region.detach(rank) {
            regions.remove(&unique_id);
            tracing::debug!(unique_id, "communicator region released");
        } else {
            tracing::debug!(unique_id, rank, remaining = region.live_ranks(), "rank detached");
        }
        Ok(())
    }
}
