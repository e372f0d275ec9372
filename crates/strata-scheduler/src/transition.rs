//! Parallel block transition
//!
//! Two phases:
//!
//! 1. Speculation. Every transaction runs on its own journaled view of the
//!    base state, in parallel, reporting its state accesses to the conflict
//!    detector. A transaction found in conflict is cancelled through its
//!    instruction hook.
//! 2. Serialization. The conflicting transactions are replayed in block
//!    order on the base state plus the effects of the others. The replay is
//!    checked against the parallel set; any parallel transaction it
//!    interferes with joins the sequential set and the replay starts over.
//!
//! The outcome equals executing the block strictly in order.

use crate::actor::DetectorHandle;
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::key::{Author, Operation};
use crate::logging_state::LoggingState;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strata_evm::{
    BlockContext, ChainConfig, ConsensusError, Evm, ExecutionOptions, ExecutionResult, FatalError,
    JumpdestCache, PoolConfig, Ruleset, Transaction, VmError,
};
use strata_primitives::{Address, H256};
use strata_state::{InMemoryState, JournaledState, Log, StateChanges, StateDb};
use tracing::{debug, info, trace};

/// Outcome of one transaction within a block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Block position
    pub index: usize,
    /// Executed without error
    pub success: bool,
    /// Gas charged after refunds
    pub gas_used: u64,
    /// Gas charged by this and all earlier transactions
    pub cumulative_gas_used: u64,
    /// Emitted logs
    pub logs: Vec<Log>,
    /// Created contract
    pub contract_address: Option<Address>,
    /// Returned or revert data
    pub return_data: Vec<u8>,
    /// Code-level error
    pub error: Option<VmError>,
    /// Rejection reason
    pub consensus_error: Option<ConsensusError>,
}

impl Receipt {
    fn new(index: usize, result: ExecutionResult, cumulative_gas_used: u64) -> Self {
        Self {
            index,
            success: result.is_success(),
            gas_used: result.gas_used,
            cumulative_gas_used,
            logs: result.logs,
            contract_address: result.contract_address,
            return_data: result.return_data,
            error: result.error,
            consensus_error: result.consensus_error,
        }
    }
}

/// Which transactions kept their speculative result
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    /// Committed from speculation, ascending
    pub parallel: Vec<usize>,
    /// Replayed in order, ascending
    pub sequential: Vec<usize>,
}

/// Result of a block transition
#[derive(Clone, Debug)]
pub struct TransitionResult {
    /// Post state
    pub state: InMemoryState,
    /// Digest of the post state
    pub state_root: H256,
    /// One receipt per transaction, in block order
    pub receipts: Vec<Receipt>,
    /// Realized partition
    pub partition: Partition,
    /// Sequential replays performed
    pub replays: usize,
}

/// Speculative run that was not cancelled
struct Speculated {
    result: ExecutionResult,
    changes: StateChanges,
    operations: Vec<Operation>,
}

/// Block executor running transactions optimistically in parallel
pub struct ParallelExecutor {
    chain: ChainConfig,
    config: SchedulerConfig,
    pools: PoolConfig,
    options: ExecutionOptions,
    jumpdests: Arc<JumpdestCache>,
    pool: rayon::ThreadPool,
}

impl ParallelExecutor {
    /// Create an executor with its own thread pool
    pub fn new(chain: ChainConfig, config: SchedulerConfig) -> SchedulerResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .stack_size(config.stack_size)
            .thread_name(|i| format!("strata-exec-{i}"))
            .build()?;
        debug!(threads = pool.current_num_threads(), "execution pool ready");

        Ok(Self {
            chain,
            config,
            pools: PoolConfig::default(),
            options: ExecutionOptions::default(),
            jumpdests: Arc::new(JumpdestCache::new()),
            pool,
        })
    }

    /// Set the per-engine stack and memory pools
    pub fn with_pools(mut self, pools: PoolConfig) -> Self {
        self.pools = pools;
        self
    }

    /// Set the execution options
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Scheduler configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Jumpdest analyses shared by every execution
    pub fn jumpdest_cache(&self) -> &Arc<JumpdestCache> {
        &self.jumpdests
    }

    /// Execute `txs` on top of `base` with speculative parallelism
    pub fn execute_block(
        &self,
        base: &InMemoryState,
        block: &BlockContext,
        txs: &[Transaction],
    ) -> SchedulerResult<TransitionResult> {
        self.pool.install(|| self.transition(base, block, txs))
    }

    /// Execute `txs` on top of `base` one after another
    pub fn execute_sequential(
        &self,
        base: &InMemoryState,
        block: &BlockContext,
        txs: &[Transaction],
    ) -> SchedulerResult<TransitionResult> {
        self.pool.install(|| {
            let ruleset = self.chain.rules(block.number);
            let mut journal = JournaledState::new(base);
            let results = self.run_in_order(&mut journal, block, ruleset, txs, 0..txs.len(), |journal| {
                journal.finalise(ruleset.eip158);
            })?;
            let mut state = base.clone();
            state.apply(&journal.into_changes());

            let results = results.into_values().map(Some).collect();
            let partition = Partition {
                parallel: Vec::new(),
                sequential: (0..txs.len()).collect(),
            };
            finish(state, block, results, partition, 0)
        })
    }

    fn evm<'a>(&self, state: &'a mut dyn StateDb, block: &'a BlockContext, ruleset: Ruleset) -> Evm<'a> {
        Evm::new(state, block, ruleset)
            .with_pools(&self.pools)
            .with_jumpdest_cache(Arc::clone(&self.jumpdests))
            .with_options(self.options)
    }

    fn transition(
        &self,
        base: &InMemoryState,
        block: &BlockContext,
        txs: &[Transaction],
    ) -> SchedulerResult<TransitionResult> {
        let ruleset = self.chain.rules(block.number);
        let detector = DetectorHandle::spawn(txs.len())?;

        let speculated: Vec<Option<Speculated>> = txs
            .par_iter()
            .enumerate()
            .map(|(index, tx)| self.speculate(base, block, ruleset, index, tx, &detector))
            .collect::<SchedulerResult<_>>()?;

        let mut sequential: BTreeSet<usize> = detector
            .reset()?
            .iter()
            .filter_map(Author::tx_index)
            .collect();
        sequential.extend(
            speculated
                .iter()
                .enumerate()
                .filter(|(_, run)| run.is_none())
                .map(|(index, _)| index),
        );
        info!(
            block = block.number,
            txs = txs.len(),
            conflicting = sequential.len(),
            "speculative phase done"
        );

        let (state, mut replayed, replays) =
            self.serialize(base, block, ruleset, txs, &speculated, &mut sequential, &detector)?;

        let mut partition = Partition::default();
        let mut results = Vec::with_capacity(txs.len());
        for (index, run) in speculated.into_iter().enumerate() {
            if sequential.contains(&index) {
                partition.sequential.push(index);
                results.push(replayed.remove(&index));
            } else {
                partition.parallel.push(index);
                results.push(run.map(|run| run.result));
            }
        }
        finish(state, block, results, partition, replays)
    }

    fn speculate(
        &self,
        base: &InMemoryState,
        block: &BlockContext,
        ruleset: Ruleset,
        index: usize,
        tx: &Transaction,
        detector: &DetectorHandle,
    ) -> SchedulerResult<Option<Speculated>> {
        let hook = detector.hook(index);
        let mut state = LoggingState::new(JournaledState::new(base), detector.recorder(Author::tx(index)));
        let outcome = self.evm(&mut state, block, ruleset).with_hook(&hook).main(tx);

        let result = match outcome {
            Ok(result) => result,
            Err(FatalError::Aborted) => {
                trace!(index, "speculation cancelled");
                return Ok(None);
            }
            Err(source) => return Err(SchedulerError::Fatal { index, source }),
        };
        state.inner_mut().finalise(ruleset.eip158);
        let (journal, recorder) = state.into_parts();
        Ok(Some(Speculated {
            result,
            changes: journal.into_changes(),
            operations: recorder.finish()?,
        }))
    }

    /// Replay `sequential` until it no longer interferes with the rest.
    ///
    /// Returns the post state, the replayed results and the replay count.
    #[allow(clippy::too_many_arguments)]
    fn serialize(
        &self,
        base: &InMemoryState,
        block: &BlockContext,
        ruleset: Ruleset,
        txs: &[Transaction],
        speculated: &[Option<Speculated>],
        sequential: &mut BTreeSet<usize>,
        detector: &DetectorHandle,
    ) -> SchedulerResult<(InMemoryState, BTreeMap<usize, ExecutionResult>, usize)> {
        let limit = self.config.replay_limit(txs.len());
        let mut attempts = 0;
        loop {
            let mut state = base.clone();
            for run in parallel_runs(speculated, sequential) {
                state.apply(&run.changes);
            }
            if sequential.is_empty() {
                return Ok((state, BTreeMap::new(), attempts));
            }
            if attempts >= limit {
                return Err(SchedulerError::ReplayDidNotConverge { attempts });
            }
            attempts += 1;

            let (changes, replayed) = {
                let mut journal =
                    LoggingState::new(JournaledState::new(&state), detector.recorder(Author::SequentialGroup));
                let replayed = self.run_in_order(
                    &mut journal,
                    block,
                    ruleset,
                    txs,
                    sequential.iter().copied(),
                    |journal| {
                        journal.inner_mut().finalise(ruleset.eip158);
                    },
                )?;
                let (journal, recorder) = journal.into_parts();
                recorder.finish()?;
                (journal.into_changes(), replayed)
            };
            for run in parallel_runs(speculated, sequential) {
                for op in &run.operations {
                    detector.record(op.clone())?;
                }
            }

            let conflicted = detector.reset()?;
            if conflicted.is_empty() {
                state.apply(&changes);
                return Ok((state, replayed, attempts));
            }
            let moved: Vec<usize> = conflicted
                .iter()
                .filter_map(Author::tx_index)
                .filter(|index| !sequential.contains(index))
                .collect();
            if moved.is_empty() {
                return Err(SchedulerError::ReplayDidNotConverge { attempts });
            }
            info!(attempt = attempts, moved = moved.len(), "replay interfered with parallel set");
            sequential.extend(moved);
        }
    }

    fn run_in_order<S: StateDb>(
        &self,
        state: &mut S,
        block: &BlockContext,
        ruleset: Ruleset,
        txs: &[Transaction],
        order: impl IntoIterator<Item = usize>,
        mut finalise: impl FnMut(&mut S),
    ) -> SchedulerResult<BTreeMap<usize, ExecutionResult>> {
        let mut results = BTreeMap::new();
        for index in order {
            let tx = txs.get(index).ok_or(SchedulerError::MissingResult(index))?;
            let result = self
                .evm(state, block, ruleset)
                .main(tx)
                .map_err(|source| SchedulerError::Fatal { index, source })?;
            finalise(state);
            results.insert(index, result);
        }
        Ok(results)
    }
}

fn parallel_runs<'s>(
    speculated: &'s [Option<Speculated>],
    sequential: &'s BTreeSet<usize>,
) -> impl Iterator<Item = &'s Speculated> + 's {
    speculated
        .iter()
        .enumerate()
        .filter(move |(index, _)| !sequential.contains(index))
        .filter_map(|(_, run)| run.as_ref())
}

fn finish(
    state: InMemoryState,
    block: &BlockContext,
    results: Vec<Option<ExecutionResult>>,
    partition: Partition,
    replays: usize,
) -> SchedulerResult<TransitionResult> {
    let mut receipts = Vec::with_capacity(results.len());
    let mut cumulative = 0u64;
    // 区块 gas 上限按实际消耗、在分区确定后依块内顺序检查，
    // 而不是在每笔交易执行前从 gas 池中预扣 tx.gas
    for (index, result) in results.into_iter().enumerate() {
        let result = result.ok_or(SchedulerError::MissingResult(index))?;
        cumulative = cumulative.saturating_add(result.gas_used);
        if cumulative > block.gas_limit {
            return Err(SchedulerError::BlockGasLimitExceeded {
                index,
                cumulative,
                limit: block.gas_limit,
            });
        }
        receipts.push(Receipt::new(index, result, cumulative));
    }

    let state_root = state.state_root();
    info!(
        block = block.number,
        parallel = partition.parallel.len(),
        sequential = partition.sequential.len(),
        replays,
        root = %state_root,
        "block transition complete"
    );
    Ok(TransitionResult {
        state,
        state_root,
        receipts,
        partition,
        replays,
    })
}
