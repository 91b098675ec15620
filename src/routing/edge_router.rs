use std::time::{Duration, Instant};

use hashbrown::HashMap;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, instrument, warn};

use crate::error::ConfigError;
use crate::network::{Corridor, CorridorKey, Network};
use crate::region::RegionModel;

use super::order::resolve_order;
use super::route_single::{route_single_connection, RouteOutcome};
use super::types::{Diagnostic, LaneAssignment, LayoutResult, RoutingConfig, RoutingStage};

/// Lays out every connection of a network: corridors are ordered first,
/// then connections are routed independently on a bounded worker pool.
pub struct LayoutEngine<'a> {
    network: &'a Network,
    regions: &'a RegionModel,
    config: RoutingConfig,
    pool: Option<ThreadPool>,
}

enum ConnectionOutcome {
    Routed(RouteOutcome),
    Skipped,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(network: &'a Network, regions: &'a RegionModel, config: RoutingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = match config.max_threads {
            Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => Some(pool),
                Err(error) => {
                    warn!("falling back to the global thread pool: {error}");
                    None
                }
            },
            None => None,
        };
        Ok(LayoutEngine {
            network,
            regions,
            config,
            pool,
        })
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    fn install<R: Send>(&self, work: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        }
    }

    /// Resolve the lane order of every corridor. Corridors are independent
    /// and resolved in parallel; the result is in corridor key order.
    #[instrument(skip_all)]
    pub fn assign_lanes(&self) -> Vec<(LaneAssignment, Option<Diagnostic>)> {
        let corridors = self.network.corridors();
        debug!(corridors = corridors.len(), "resolving corridor orders");
        self.install(|| {
            corridors
                .par_iter()
                .map(|corridor| self.resolve_corridor(corridor))
                .collect()
        })
    }

    fn resolve_corridor(&self, corridor: &Corridor) -> (LaneAssignment, Option<Diagnostic>) {
        match resolve_order(corridor, self.network, self.regions, &self.config) {
            Ok(resolved) => resolved,
            Err(error) => {
                warn!(corridor = %corridor.key, "keeping id order: {error}");
                let assignment = LaneAssignment {
                    corridor: corridor.key.clone(),
                    order: corridor.members.iter().map(|member| member.connection.clone()).collect(),
                    tangles: 0,
                    lower_bound: 0,
                    exhaustive: false,
                    converged: false,
                };
                (assignment, None)
            }
        }
    }

    /// Run one full layout pass.
    #[instrument(skip_all, fields(connections = self.network.connection_count()))]
    pub fn layout(&self) -> LayoutResult {
        let started = Instant::now();
        let deadline = self
            .config
            .time_budget_ms
            .map(|budget| started + Duration::from_millis(budget));

        let mut result = LayoutResult::default();
        let mut assignments: HashMap<CorridorKey, LaneAssignment> = HashMap::new();
        for (assignment, diagnostic) in self.assign_lanes() {
            result.diagnostics.extend(diagnostic);
            assignments.insert(assignment.corridor.clone(), assignment.clone());
            result.assignments.push(assignment);
        }

        let connections: Vec<_> = self.network.connections().collect();
        let outcomes: Vec<ConnectionOutcome> = self.install(|| {
            connections
                .par_iter()
                .map(|connection| {
                    // Connections not yet started when the budget runs out are
                    // skipped; those in flight finish.
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        return ConnectionOutcome::Skipped;
                    }
                    ConnectionOutcome::Routed(route_single_connection(
                        connection,
                        self.network,
                        self.regions,
                        &assignments,
                        &self.config,
                    ))
                })
                .collect()
        });

        for (connection, outcome) in connections.iter().zip(outcomes) {
            let id = connection.id.clone();
            match outcome {
                ConnectionOutcome::Skipped => {
                    result.stages.insert(id.clone(), RoutingStage::Unrouted);
                    result.diagnostics.push(Diagnostic::Skipped { connection: id.clone() });
                    result.skipped.push(id);
                }
                ConnectionOutcome::Routed(outcome) => {
                    result.diagnostics.extend(outcome.diagnostics);
                    match outcome.result {
                        Ok(path) => {
                            result.stages.insert(id.clone(), RoutingStage::Finalized);
                            result.paths.insert(id, path);
                        }
                        Err(error) => {
                            result.stages.insert(id.clone(), RoutingStage::Failed);
                            result.failed_at.insert(id.clone(), outcome.reached);
                            result.failures.insert(id, error);
                        }
                    }
                }
            }
        }
        if !result.skipped.is_empty() {
            warn!(skipped = result.skipped.len(), "time budget exhausted");
        }

        info!(
            corridors = result.assignments.len(),
            routed = result.paths.len(),
            failed = result.failures.len(),
            skipped = result.skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "layout finished"
        );
        result
    }
}
