//! Call and create orchestration, and top-level transaction execution

use crate::config::{ExecutionOptions, PoolConfig, CALL_CREATE_DEPTH, MAX_CODE_SIZE};
use crate::context::{BlockContext, Transaction, TxContext};
use crate::contract::Contract;
use crate::error::{ConsensusError, ExecutionResult, FatalError, VmError, VmResult};
use crate::gas::{cost, intrinsic_gas};
use crate::interpreter::{run_code, InstructionHook, NoopHook, Outcome};
use crate::jumpdest::JumpdestCache;
use crate::memory::MemoryPool;
use crate::precompiles::run_precompile;
use crate::ruleset::{Ruleset, Tables};
use crate::stack::StackPool;
use std::sync::Arc;
use strata_crypto::{create2_address, create_address, keccak256, KECCAK_EMPTY};
use strata_primitives::{Address, H256, U256};
use strata_state::{Snapshot, StateDb};
use tracing::{debug, trace, warn};

/// Gas allowance of a transaction executed with the gas fee disabled
const FREE_GAS_ALLOWANCE: u64 = u64::MAX / 100_000;

/// Result of a message call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOutcome {
    /// Returned or revert data
    pub output: Vec<u8>,
    /// Gas handed back to the caller
    pub gas_left: u64,
    /// Code-level error, `None` on success
    pub error: Option<VmError>,
}

impl CallOutcome {
    fn failed(error: VmError, gas_left: u64) -> Self {
        Self {
            output: Vec::new(),
            gas_left,
            error: Some(error),
        }
    }
}

/// Result of a contract creation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateOutcome {
    /// Revert data; empty otherwise
    pub output: Vec<u8>,
    /// Address of the new contract
    pub address: Address,
    /// Gas handed back to the creator
    pub gas_left: u64,
    /// Code-level error, `None` on success
    pub error: Option<VmError>,
}

impl CreateOutcome {
    fn failed(error: VmError, gas_left: u64) -> Self {
        Self {
            output: Vec::new(),
            address: Address::ZERO,
            gas_left,
            error: Some(error),
        }
    }
}

/// Execution engine bound to one state view and one block.
///
/// An `Evm` runs any number of transactions sequentially; the state view
/// decides what they see of each other. Nested calls share the return data
/// buffer and the stack and memory pools.
pub struct Evm<'a> {
    pub(crate) state: &'a mut dyn StateDb,
    pub(crate) block: &'a BlockContext,
    pub(crate) tx: TxContext,
    pub(crate) tables: Tables,
    pub(crate) depth: usize,
    pub(crate) read_only: bool,
    pub(crate) return_data: Vec<u8>,
    /// Gas forwarded by the pending CALL, computed by its gas function
    pub(crate) call_gas_temp: u64,
    pub(crate) stacks: StackPool,
    pub(crate) memories: MemoryPool,
    pub(crate) jumpdests: Arc<JumpdestCache>,
    pub(crate) hook: &'a dyn InstructionHook,
    options: ExecutionOptions,
}

impl<'a> Evm<'a> {
    /// Create an engine with default pools and a private jumpdest cache
    pub fn new(state: &'a mut dyn StateDb, block: &'a BlockContext, ruleset: Ruleset) -> Self {
        let pools = PoolConfig::default();
        Self {
            state,
            block,
            tx: TxContext::default(),
            tables: Tables::select(ruleset),
            depth: 0,
            read_only: false,
            return_data: Vec::new(),
            call_gas_temp: 0,
            stacks: StackPool::new(pools.stack_pool_size),
            memories: MemoryPool::new(pools.memory_pool_depth, pools.memory_preallocate),
            jumpdests: Arc::new(JumpdestCache::new()),
            hook: &NoopHook,
            options: ExecutionOptions::default(),
        }
    }

    /// Resize the stack and memory pools
    pub fn with_pools(mut self, config: &PoolConfig) -> Self {
        let config = config.normalized();
        self.stacks = StackPool::new(config.stack_pool_size);
        self.memories = MemoryPool::new(config.memory_pool_depth, config.memory_preallocate);
        self
    }

    /// Share a jumpdest cache with other engines
    pub fn with_jumpdest_cache(mut self, cache: Arc<JumpdestCache>) -> Self {
        self.jumpdests = cache;
        self
    }

    /// Install a per-instruction hook
    pub fn with_hook(mut self, hook: &'a dyn InstructionHook) -> Self {
        self.hook = hook;
        self
    }

    /// Set the execution options
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Switch the active ruleset; false if it was already active
    pub fn set_ruleset(&mut self, ruleset: Ruleset) -> bool {
        self.tables.switch(ruleset)
    }

    /// Active ruleset
    pub fn ruleset(&self) -> Ruleset {
        self.tables.ruleset
    }

    /// Set ORIGIN and GASPRICE for calls made outside [`Evm::main`]
    pub fn set_tx_context(&mut self, tx: TxContext) {
        self.tx = tx;
    }

    /// Current call depth, zero outside any frame
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// State view the engine executes against
    pub fn state(&mut self) -> &mut dyn StateDb {
        &mut *self.state
    }

    fn can_transfer(&mut self, from: &Address, value: U256) -> bool {
        value.is_zero() || self.state.get_balance(from) >= value
    }

    fn transfer(&mut self, from: &Address, to: &Address, value: U256) {
        self.state.sub_balance(from, value);
        self.state.add_balance(to, value);
    }

    fn load_code(&mut self, contract: Contract, code_address: Address) -> Contract {
        let code = self.state.get_code(&code_address);
        let hash = self.state.get_code_hash(&code_address);
        contract.with_code(code_address, code, hash)
    }

    /// Run a contract, dispatching to the precompile registered at its code
    /// address if any
    fn run(&mut self, contract: &mut Contract, read_only: bool) -> VmResult<Outcome> {
        let precompiles = self.tables.precompiles;
        if let Some(precompile) = precompiles.get(&contract.code_address) {
            let input = std::mem::take(&mut contract.input);
            return match run_precompile(precompile, &input, contract) {
                Ok(output) => Ok(Outcome::Halted(output)),
                Err(err) if err.is_fatal() => Err(err),
                Err(err) => Ok(Outcome::Faulted(err)),
            };
        }
        run_code(self, contract, read_only)
    }

    /// Run a message call frame and settle it against `snapshot`
    fn run_call(&mut self, snapshot: Snapshot, mut contract: Contract, read_only: bool) -> VmResult<CallOutcome> {
        let outcome = match self.run(&mut contract, read_only) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.state.revert_to_snapshot(snapshot);
                return Err(err);
            }
        };
        Ok(match outcome {
            Outcome::Halted(output) => CallOutcome {
                output,
                gas_left: contract.gas,
                error: None,
            },
            Outcome::Reverted(output) => {
                self.state.revert_to_snapshot(snapshot);
                CallOutcome {
                    output,
                    gas_left: contract.gas,
                    error: Some(VmError::ExecutionReverted),
                }
            }
            Outcome::Faulted(err) => {
                trace!(address = %contract.address, error = %err, "call failed");
                self.state.revert_to_snapshot(snapshot);
                CallOutcome::failed(err, 0)
            }
        })
    }

    /// Execute the code at `address` with `input`, transferring `value`
    /// from `caller`.
    ///
    /// Calling an absent account without value is a no-op from EIP-158 on.
    pub fn call(
        &mut self,
        caller: Address,
        address: Address,
        input: Vec<u8>,
        gas: u64,
        value: U256,
    ) -> VmResult<CallOutcome> {
        if self.depth > CALL_CREATE_DEPTH {
            return Ok(CallOutcome::failed(VmError::Depth, gas));
        }
        if !self.can_transfer(&caller, value) {
            return Ok(CallOutcome::failed(VmError::InsufficientBalance, gas));
        }
        let is_precompile = self.tables.precompiles.contains(&address);
        if !is_precompile && self.tables.ruleset.eip158 && value.is_zero() && !self.state.exist(&address) {
            return Ok(CallOutcome {
                output: Vec::new(),
                gas_left: gas,
                error: None,
            });
        }

        let snapshot = self.state.snapshot();
        self.transfer(&caller, &address, value);
        let contract = Contract::new(caller, address, value, gas).with_input(input);
        let contract = self.load_code(contract, address);
        self.run_call(snapshot, contract, false)
    }

    /// Execute the code at `address` in the context of `caller`
    pub fn call_code(
        &mut self,
        caller: Address,
        address: Address,
        input: Vec<u8>,
        gas: u64,
        value: U256,
    ) -> VmResult<CallOutcome> {
        if self.depth > CALL_CREATE_DEPTH {
            return Ok(CallOutcome::failed(VmError::Depth, gas));
        }
        if !self.can_transfer(&caller, value) {
            return Ok(CallOutcome::failed(VmError::InsufficientBalance, gas));
        }

        let snapshot = self.state.snapshot();
        let contract = Contract::new(caller, caller, value, gas).with_input(input);
        let contract = self.load_code(contract, address);
        self.run_call(snapshot, contract, false)
    }

    /// Execute the code at `address` as if it were the code of `parent`,
    /// keeping its caller and value
    pub fn delegate_call(
        &mut self,
        parent: &Contract,
        address: Address,
        input: Vec<u8>,
        gas: u64,
    ) -> VmResult<CallOutcome> {
        if self.depth > CALL_CREATE_DEPTH {
            return Ok(CallOutcome::failed(VmError::Depth, gas));
        }

        let snapshot = self.state.snapshot();
        let contract = Contract::new(parent.caller, parent.address, parent.value, gas).with_input(input);
        let contract = self.load_code(contract, address);
        self.run_call(snapshot, contract, false)
    }

    /// Execute the code at `address` with state modification disallowed in
    /// it and every frame below it
    pub fn static_call(
        &mut self,
        caller: Address,
        address: Address,
        input: Vec<u8>,
        gas: u64,
    ) -> VmResult<CallOutcome> {
        if self.depth > CALL_CREATE_DEPTH {
            return Ok(CallOutcome::failed(VmError::Depth, gas));
        }

        let snapshot = self.state.snapshot();
        // 零值转账，仅为 touch 目标账户
        self.state.add_balance(&address, U256::zero());
        let contract = Contract::new(caller, address, U256::zero(), gas).with_input(input);
        let contract = self.load_code(contract, address);
        self.run_call(snapshot, contract, true)
    }

    /// Deploy `init_code` at the address derived from the caller's nonce
    pub fn create(
        &mut self,
        caller: Address,
        init_code: Vec<u8>,
        gas: u64,
        value: U256,
    ) -> VmResult<CreateOutcome> {
        let nonce = self.state.get_nonce(&caller);
        let address = create_address(&caller, nonce);
        self.create_at(caller, init_code, gas, value, address)
    }

    /// Deploy `init_code` at the address derived from `salt` and the code
    /// hash (EIP-1014)
    pub fn create2(
        &mut self,
        caller: Address,
        init_code: Vec<u8>,
        gas: u64,
        endowment: U256,
        salt: H256,
    ) -> VmResult<CreateOutcome> {
        let address = create2_address(&caller, &salt, &keccak256(&init_code));
        self.create_at(caller, init_code, gas, endowment, address)
    }

    fn create_at(
        &mut self,
        caller: Address,
        init_code: Vec<u8>,
        gas: u64,
        value: U256,
        address: Address,
    ) -> VmResult<CreateOutcome> {
        if self.depth > CALL_CREATE_DEPTH {
            return Ok(CreateOutcome::failed(VmError::Depth, gas));
        }
        if !self.can_transfer(&caller, value) {
            return Ok(CreateOutcome::failed(VmError::InsufficientBalance, gas));
        }
        self.state.increment_nonce(&caller);

        let existing_hash = self.state.get_code_hash(&address);
        if self.state.get_nonce(&address) != 0 || (!existing_hash.is_zero() && existing_hash != KECCAK_EMPTY) {
            trace!(%address, "contract address collision");
            return Ok(CreateOutcome::failed(VmError::ContractAddressCollision, 0));
        }

        let rules = self.tables.ruleset;
        let snapshot = self.state.snapshot();
        self.state.create_account(&address);
        if rules.eip158 {
            self.state.increment_nonce(&address);
        }
        self.transfer(&caller, &address, value);

        let code_hash = keccak256(&init_code);
        let mut contract =
            Contract::new(caller, address, value, gas).with_code(address, Arc::from(init_code), code_hash);

        let outcome = match self.run(&mut contract, false) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.state.revert_to_snapshot(snapshot);
                return Err(err);
            }
        };
        let (mut output, mut error) = match outcome {
            Outcome::Halted(output) => (output, None),
            Outcome::Reverted(output) => (output, Some(VmError::ExecutionReverted)),
            Outcome::Faulted(err) => (Vec::new(), Some(err)),
        };

        let max_code_size_exceeded = rules.eip158 && output.len() > MAX_CODE_SIZE;
        if error.is_none() && !max_code_size_exceeded {
            let deposit = output.len() as u64 * cost::CREATE_DATA;
            if contract.use_gas(deposit) {
                self.state.set_code(&address, std::mem::take(&mut output));
            } else {
                error = Some(VmError::CodeStoreOutOfGas);
            }
        }

        // Frontier 下代码存储 gas 不足时保留已创建的空账户
        let keep_state = match &error {
            None => true,
            Some(VmError::CodeStoreOutOfGas) => !rules.homestead,
            Some(_) => false,
        };
        if max_code_size_exceeded || !keep_state {
            self.state.revert_to_snapshot(snapshot);
            if error != Some(VmError::ExecutionReverted) {
                contract.gas = 0;
            }
        }
        if max_code_size_exceeded && error.is_none() {
            error = Some(VmError::MaxCodeSizeExceeded);
        }
        if let Some(err) = &error {
            trace!(%address, error = %err, "create failed");
        }

        // 只有 revert 时才把数据交回调用方
        if error != Some(VmError::ExecutionReverted) {
            output.clear();
        }
        Ok(CreateOutcome {
            output,
            address,
            gas_left: contract.gas,
            error,
        })
    }

    /// Execute a transaction.
    ///
    /// Validation failures are reported through
    /// [`ExecutionResult::consensus_error`] and leave the state untouched.
    /// The returned logs are those emitted by this transaction. The caller
    /// finalises the state afterwards.
    pub fn main(&mut self, tx: &Transaction) -> Result<ExecutionResult, FatalError> {
        let result = self.execute_transaction(tx);
        if let Some(err) = self.state.db_error() {
            warn!(from = %tx.from, error = %err, "state backend failure");
            return Err(FatalError::State(err.clone()));
        }
        let result = result?;
        debug!(
            from = %tx.from,
            to = ?tx.to,
            gas_used = result.gas_used,
            error = ?result.error,
            rejected = ?result.consensus_error,
            "transaction executed"
        );
        Ok(result)
    }

    fn execute_transaction(&mut self, tx: &Transaction) -> Result<ExecutionResult, FatalError> {
        let rules = self.tables.ruleset;

        if !self.options.disable_nonce_check {
            let nonce = self.state.get_nonce(&tx.from);
            if nonce < tx.nonce {
                return Ok(ExecutionResult::rejected(ConsensusError::NonceTooHigh));
            }
            if nonce > tx.nonce {
                return Ok(ExecutionResult::rejected(ConsensusError::NonceTooLow));
            }
        }

        let free = self.options.disable_gas_fee;
        let (gas_limit, gas_price) = if free {
            (FREE_GAS_ALLOWANCE, U256::zero())
        } else {
            (tx.gas, tx.gas_price)
        };

        let balance = self.state.get_balance(&tx.from);
        let fee = match U256::from(gas_limit).checked_mul(gas_price) {
            Some(fee) if fee <= balance => fee,
            _ => return Ok(ExecutionResult::rejected(ConsensusError::InsufficientBalanceForGas)),
        };

        let mut gas = gas_limit;
        if !free {
            let intrinsic = match intrinsic_gas(&tx.input, tx.is_create(), rules.homestead) {
                Ok(intrinsic) => intrinsic,
                Err(err) => return Ok(ExecutionResult::rejected(err)),
            };
            if gas < intrinsic {
                return Ok(ExecutionResult::rejected(ConsensusError::IntrinsicGasTooLow));
            }
            gas -= intrinsic;
        }

        if balance - fee < tx.value {
            return Ok(ExecutionResult::rejected(ConsensusError::InsufficientBalanceForTransfer));
        }

        self.tx = TxContext {
            origin: tx.from,
            gas_price,
        };
        let log_start = self.state.logs().len();
        self.state.sub_balance(&tx.from, fee);

        let (return_data, contract_address, gas_left, error) = match tx.to {
            None => {
                let outcome = self
                    .create(tx.from, tx.input.clone(), gas, tx.value)
                    .map_err(fatal)?;
                (outcome.output, Some(outcome.address), outcome.gas_left, outcome.error)
            }
            Some(to) => {
                self.state.increment_nonce(&tx.from);
                let outcome = self
                    .call(tx.from, to, tx.input.clone(), gas, tx.value)
                    .map_err(fatal)?;
                (outcome.output, None, outcome.gas_left, outcome.error)
            }
        };

        let used = gas_limit - gas_left;
        let refund = (used / 2).min(self.state.get_refund());
        let gas_left = gas_left + refund;
        let gas_used = used - refund;

        if !free {
            self.state
                .add_balance(&tx.from, U256::from(gas_left).saturating_mul(gas_price));
            self.state
                .add_balance(&self.block.coinbase, U256::from(gas_used).saturating_mul(gas_price));
        }

        Ok(ExecutionResult {
            return_data,
            contract_address,
            logs: self.state.logs()[log_start..].to_vec(),
            gas_used,
            error,
            consensus_error: None,
        })
    }
}

fn fatal(err: VmError) -> FatalError {
    match err {
        VmError::Internal(internal) => FatalError::Internal(internal),
        _ => FatalError::Aborted,
    }
}
