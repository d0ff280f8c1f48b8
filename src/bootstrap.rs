//! Driving the four-step communicator bootstrap.
//!
//! In production the host runtime schedules the steps as tasks and moves
//! their results around as futures. [`bootstrap_local`] plays that role for
//! a single process: one blocking tokio task per rank, the same way tests
//! and small deployments stand up a local cluster.

use std::env;
use std::sync::Arc;

use crate::comm::Communicator;
use crate::context::CollContext;
use crate::error::{CollError, Result};

/// Launcher variables that carry this process's rank, most specific first.
const PHYSICAL_RANK_VARS: [&str; 4] = [
    "OMPI_COMM_WORLD_RANK",
    "PMIX_RANK",
    "PMI_RANK",
    "SLURM_PROCID",
];

/// This process's rank within its multi-process launch, or 0 when the
/// program runs as a single process.
pub fn resolve_physical_rank() -> usize {
    resolve_physical_rank_with(|key| env::var(key).ok())
}

fn resolve_physical_rank_with(lookup: impl Fn(&str) -> Option<String>) -> usize {
    PHYSICAL_RANK_VARS
        .iter()
        .find_map(|key| lookup(key).and_then(|v| v.trim().parse().ok()))
        .unwrap_or(0)
}

/// Run generate-id → resolve-mapping → create for `world_size` ranks and
/// return the communicators in rank order.
///
/// Each rank's create runs on its own blocking task because creation is a
/// rendezvous: no rank's create returns until every rank has arrived.
pub async fn bootstrap_local(ctx: &CollContext, world_size: usize) -> Result<Vec<Communicator>> {
    if world_size == 0 {
        return Err(CollError::InvalidGroupSize(world_size));
    }

    let unique_id = ctx.generate_unique_id();

    let mapping_tasks = (0..world_size).map(|_| {
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || ctx.resolve_physical_mapping())
    });
    let mapping: Arc<Vec<usize>> = Arc::new(
        futures::future::try_join_all(mapping_tasks)
            .await
            .map_err(|e| CollError::runtime_with_source("mapping task panicked", e))?,
    );

    let create_tasks = (0..world_size).map(|rank| {
        let ctx = ctx.clone();
        let mapping = Arc::clone(&mapping);
        tokio::task::spawn_blocking(move || {
            ctx.create_communicator(unique_id, rank, world_size, Some(mapping.as_slice()))
        })
    });
    let created = futures::future::try_join_all(create_tasks)
        .await
        .map_err(|e| CollError::runtime_with_source("create task panicked", e))?;

    tracing::debug!(unique_id, world_size, "local bootstrap complete");
    created.into_iter().collect()
}

/// Destroy every communicator from [`bootstrap_local`], each on the task
/// for its own rank.
pub async fn destroy_local(comms: Vec<Communicator>) -> Result<()> {
    let tasks = comms.into_iter().enumerate().map(|(rank, mut comm)| {
        tokio::task::spawn_blocking(move || comm.destroy(rank))
    });
    let results = futures::future::try_join_all(tasks)
        .await
        .map_err(|e| CollError::runtime_with_source("destroy task panicked", e))?;
    results.into_iter().collect()
}
