//! # Application
//!
//! Wires the modules to the store-backed host keepers and drives the block
//! lifecycle:
//!
//! ```text
//! init_chain ─► begin_block ─► deliver_tx* ─► end_block ─► commit ─► begin_block ...
//!               epochs          routed to       oracle       CommitStore
//!               perp snapshots  one module      tally
//! ```
//!
//! Block writes accumulate in memory on top of the committed store. Every
//! phase and every transaction runs in its own context over those writes;
//! only a successful run merges back. A panicking handler is caught here,
//! logged, and its transaction rolled back.
//!
//! Queries read committed state only and never observe a block in progress.

use crate::config::AppConfig;
use crate::epochs::{self, EpochInfo};
use crate::error::{AppError, Result};
use crate::genesis::{group_balances, GenesisState};
use crate::msgs::Msg;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tessera_core::host::{
    BankKeeper, ModuleAccounts, StoreBank, StoreDistribution, StoreStaking, StoreSudo,
};
use tessera_core::{AccAddress, AssetPair, Dec};
use tessera_perp::Position;
use tessera_store::{
    AbciEvent, BlockHeader, CacheStore, CommitStore, Context, GasMeter, Item, WriteSet,
};
use tracing::{debug, error, info};

/// Block time of the last committed block, in milliseconds
const LAST_BLOCK_TIME: Item<i64> = Item::new(b"app/last_block_time");

/// Outcome of one transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxResult {
    /// 0 on success, else the error's code
    pub code: u32,
    pub log: String,
    pub events: Vec<AbciEvent>,
    pub gas_used: u64,
}

impl TxResult {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Outcome of [`App::execute_block`]
#[derive(Clone, Debug)]
pub struct BlockResult {
    pub height: u64,
    pub txs: Vec<TxResult>,
    /// Begin-block, transaction and end-block events in order
    pub events: Vec<AbciEvent>,
}

struct BlockState {
    header: BlockHeader,
    writes: WriteSet,
    events: Vec<AbciEvent>,
}

/// Result of running one phase in its own context
struct Execution<T> {
    result: Result<T>,
    events: Vec<AbciEvent>,
    gas_used: u64,
}

pub struct App {
    config: AppConfig,
    store: Arc<CommitStore>,
    block: Mutex<Option<BlockState>>,
    bank: Arc<StoreBank>,
    staking: Arc<StoreStaking>,
    sudo: Arc<StoreSudo>,
    oracle: tessera_oracle::Keeper,
    perp: tessera_perp::Keeper,
    dnr: tessera_dnr::Keeper,
    epochs: epochs::Keeper,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self::with_store(config, Arc::new(CommitStore::new()))
    }

    pub fn with_store(config: AppConfig, store: Arc<CommitStore>) -> Self {
        let bank = Arc::new(StoreBank::new());
        let accounts = Arc::new(ModuleAccounts);
        let staking = Arc::new(StoreStaking::default());
        let distribution = Arc::new(StoreDistribution::new());
        let sudo = Arc::new(StoreSudo::new());

        let oracle = tessera_oracle::Keeper::new(
            staking.clone(),
            bank.clone(),
            distribution,
            sudo.clone(),
        );
        let dnr = tessera_dnr::Keeper::new(
            bank.clone(),
            accounts.clone(),
            sudo.clone(),
            config.dnr.epoch_identifier.clone(),
        );
        let perp = tessera_perp::Keeper::new(
            bank.clone(),
            accounts,
            Arc::new(oracle.clone()),
            Arc::new(dnr.clone()),
            sudo.clone(),
            config.perp.funding_periods_per_day,
        );
        let epochs = epochs::Keeper::new()
            .with_hooks("perp", Arc::new(perp.clone()))
            .with_hooks("dnr", Arc::new(dnr.clone()));

        Self {
            config,
            store,
            block: Mutex::new(None),
            bank,
            staking,
            sudo,
            oracle,
            perp,
            dnr,
            epochs,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn oracle(&self) -> &tessera_oracle::Keeper {
        &self.oracle
    }

    pub fn perp(&self) -> &tessera_perp::Keeper {
        &self.perp
    }

    pub fn dnr(&self) -> &tessera_dnr::Keeper {
        &self.dnr
    }

    pub fn epochs(&self) -> &epochs::Keeper {
        &self.epochs
    }

    pub fn staking(&self) -> &StoreStaking {
        &self.staking
    }

    pub fn bank(&self) -> &StoreBank {
        &self.bank
    }

    /// Height of the last committed block
    pub fn height(&self) -> u64 {
        self.store.last_height()
    }

    // === Lifecycle ===

    pub fn init_chain(&self, genesis: &GenesisState) -> Result<()> {
        if self.block.lock().is_some() || self.committed_time()?.is_some() {
            return Err(AppError::AlreadyInitialized(self.height()));
        }
        genesis.validate()?;

        let header = BlockHeader::new(self.config.chain.chain_id.clone(), 0, genesis.genesis_time);
        let mut state = BlockState {
            header,
            writes: WriteSet::new(),
            events: Vec::new(),
        };
        let exec = self.execute(&mut state, GasMeter::infinite(), |ctx| {
            self.sudo.set_sudoers(ctx, &genesis.sudoers)?;
            for validator in &genesis.validators {
                self.staking.set_validator(ctx, validator)?;
            }
            for balance in &genesis.balances {
                self.bank.mint(ctx, &balance.address, &balance.coins)?;
            }
            self.oracle.init_genesis(ctx, &genesis.oracle)?;
            let mut perp = genesis.perp.clone();
            if perp.collateral.is_empty() {
                perp.collateral = self.config.perp.default_collateral.clone();
            }
            self.perp.init_genesis(ctx, &perp)?;
            self.dnr.init_genesis(ctx, &genesis.dnr)?;
            for info in genesis.epochs_or_configured(&self.config) {
                self.epochs.add_epoch(ctx, &info)?;
            }
            LAST_BLOCK_TIME.save(ctx, &genesis.genesis_time.timestamp_millis())?;
            Ok(())
        });
        exec.result?;
        self.store.commit(state.writes, 0);
        info!(
            chain_id = %self.config.chain.chain_id,
            validators = genesis.validators.len(),
            accounts = genesis.balances.len(),
            "initialized chain"
        );
        Ok(())
    }

    /// Open the next block and run begin-block logic
    pub fn begin_block(&self, time: DateTime<Utc>) -> Result<Vec<AbciEvent>> {
        let mut guard = self.block.lock();
        if let Some(state) = guard.as_ref() {
            return Err(AppError::BlockInProgress(state.header.height));
        }
        let previous_ms = self.committed_time()?.unwrap_or(i64::MIN);
        let time_ms = time.timestamp_millis();
        if time_ms < previous_ms {
            return Err(AppError::NonMonotonicTime {
                time_ms,
                previous_ms,
            });
        }

        let height = self.height() + 1;
        let mut state = BlockState {
            header: BlockHeader::new(self.config.chain.chain_id.clone(), height, time),
            writes: WriteSet::new(),
            events: Vec::new(),
        };
        let exec = self.execute(&mut state, GasMeter::infinite(), |ctx| {
            LAST_BLOCK_TIME.save(ctx, &time_ms)?;
            self.epochs.begin_blocker(ctx)?;
            self.perp.begin_block(ctx)?;
            Ok(())
        });
        if let Err(err) = exec.result {
            error!(height, error = %err, "begin block failed");
            return Err(err);
        }
        debug!(height, events = exec.events.len(), "began block");
        *guard = Some(state);
        Ok(exec.events)
    }

    /// Run one transaction; a failure is reported in the result, not returned
    pub fn deliver_tx(&self, msg: &Msg) -> Result<TxResult> {
        let mut guard = self.block.lock();
        let state = guard.as_mut().ok_or(AppError::NoBlockInProgress)?;
        let gas = match self.config.chain.tx_gas_limit {
            0 => GasMeter::infinite(),
            limit => GasMeter::new(limit),
        };
        let exec = self.execute(state, gas, |ctx| self.route(ctx, msg));
        let height = state.header.height;
        let result = match exec.result {
            Ok(()) => {
                debug!(
                    height,
                    module = msg.module(),
                    signer = %msg.signer(),
                    gas = exec.gas_used,
                    "tx succeeded"
                );
                TxResult {
                    code: 0,
                    log: String::new(),
                    events: exec.events,
                    gas_used: exec.gas_used,
                }
            }
            Err(err) => {
                debug!(
                    height,
                    module = msg.module(),
                    signer = %msg.signer(),
                    code = err.code(),
                    error = %err,
                    "tx failed"
                );
                TxResult {
                    code: err.code(),
                    log: err.to_string(),
                    events: Vec::new(),
                    gas_used: exec.gas_used,
                }
            }
        };
        Ok(result)
    }

    /// Run end-block logic of the open block
    pub fn end_block(&self) -> Result<Vec<AbciEvent>> {
        let mut guard = self.block.lock();
        let state = guard.as_mut().ok_or(AppError::NoBlockInProgress)?;
        let height = state.header.height;
        let exec = self.execute(state, GasMeter::infinite(), |ctx| {
            self.oracle.end_blocker(ctx)?;
            Ok(())
        });
        if let Err(err) = exec.result {
            error!(height, error = %err, "end block failed");
            return Err(err);
        }
        Ok(exec.events)
    }

    /// Persist the open block; returns its height
    pub fn commit(&self) -> Result<u64> {
        let state = self.block.lock().take().ok_or(AppError::NoBlockInProgress)?;
        let height = state.header.height;
        self.store.commit(state.writes, height);
        debug!(height, events = state.events.len(), "committed block");
        Ok(height)
    }

    /// Begin, deliver every message, end and commit
    pub fn execute_block(&self, time: DateTime<Utc>, msgs: &[Msg]) -> Result<BlockResult> {
        self.begin_block(time)?;
        let mut txs = Vec::with_capacity(msgs.len());
        for msg in msgs {
            txs.push(self.deliver_tx(msg)?);
        }
        self.end_block()?;
        let events = self
            .block
            .lock()
            .as_ref()
            .map(|state| state.events.clone())
            .unwrap_or_default();
        let height = self.commit()?;
        Ok(BlockResult {
            height,
            txs,
            events,
        })
    }

    fn route(&self, ctx: &mut Context<'_>, msg: &Msg) -> Result<()> {
        match msg {
            Msg::Oracle(m) => self.oracle.handle_msg(ctx, m)?,
            Msg::Perp(m) => self.perp.handle_msg(ctx, m)?,
            Msg::Dnr(m) => {
                self.dnr.handle_msg(ctx, m)?;
            }
        }
        Ok(())
    }

    /// Run `f` over the block's writes; merge only on success
    fn execute<T, F>(&self, state: &mut BlockState, gas: GasMeter, f: F) -> Execution<T>
    where
        F: FnOnce(&mut Context<'_>) -> Result<T>,
    {
        let header = state.header.clone();
        let cache = CacheStore::with_writes(&*self.store, std::mem::take(&mut state.writes));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = Context::new(&cache, header, gas);
            let result = f(&mut ctx);
            (result, ctx.into_parts())
        }));
        let mut writes = cache.into_writes();
        let exec = match outcome {
            Ok((Ok(value), (tx_writes, events, gas_used))) => {
                writes.merge(tx_writes);
                state.events.extend(events.iter().cloned());
                Execution {
                    result: Ok(value),
                    events,
                    gas_used,
                }
            }
            Ok((Err(err), (_, _, gas_used))) => Execution {
                result: Err(err),
                events: Vec::new(),
                gas_used,
            },
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(height = state.header.height, %reason, "aborted on panic, rolled back");
                Execution {
                    result: Err(AppError::Aborted(reason)),
                    events: Vec::new(),
                    gas_used: 0,
                }
            }
        };
        state.writes = writes;
        exec
    }

    // === Queries ===

    /// Run a read-only closure over committed state
    pub fn query<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Context<'_>) -> Result<T>,
    {
        let time = self
            .committed_time()?
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_default();
        let header = BlockHeader::new(self.config.chain.chain_id.clone(), self.height(), time);
        let mut ctx = Context::new(&*self.store, header, GasMeter::infinite());
        f(&mut ctx)
    }

    pub fn balance(&self, addr: &AccAddress, denom: &str) -> Result<u128> {
        self.query(|ctx| Ok(self.bank.get_balance(ctx, addr, denom)?))
    }

    pub fn exchange_rate(&self, pair: &AssetPair) -> Result<Dec> {
        self.query(|ctx| Ok(self.oracle.get_exchange_rate(ctx, pair)?))
    }

    pub fn position(&self, pair: &AssetPair, trader: &AccAddress) -> Result<Position> {
        self.query(|ctx| {
            let version = self.perp.market_version(ctx, pair)?;
            Ok(self.perp.position(ctx, pair, version, trader)?)
        })
    }

    pub fn epoch_info(&self, identifier: &str) -> Result<EpochInfo> {
        self.query(|ctx| self.epochs.epoch_info(ctx, identifier))
    }

    pub fn export_genesis(&self) -> Result<GenesisState> {
        let genesis_time = self
            .committed_time()?
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_default();
        self.query(|ctx| {
            Ok(GenesisState {
                genesis_time,
                sudoers: self.sudo.sudoers(ctx)?,
                validators: self.staking.validators(ctx)?,
                balances: group_balances(self.bank.all_balances(ctx)?)?,
                epochs: self.epochs.epoch_infos(ctx)?,
                oracle: self.oracle.export_genesis(ctx)?,
                perp: self.perp.export_genesis(ctx)?,
                dnr: self.dnr.export_genesis(ctx)?,
            })
        })
    }

    fn committed_time(&self) -> Result<Option<i64>> {
        let header = BlockHeader::new(
            self.config.chain.chain_id.clone(),
            self.height(),
            DateTime::<Utc>::default(),
        );
        let mut ctx = Context::new(&*self.store, header, GasMeter::infinite());
        Ok(LAST_BLOCK_TIME.may_load(&mut ctx)?)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
