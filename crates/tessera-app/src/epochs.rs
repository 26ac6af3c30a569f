//! # Epoch timers
//!
//! Each timer has an identifier (`"30min"`, `"week"`, ...) and a duration.
//! At begin-block every timer whose current epoch has run out ends it and
//! starts the next one:
//!
//! ```text
//! EpochEnd(n) ──► after_epoch_end(id, n) ──► EpochStart(n + 1) ──► before_epoch_start(id, n + 1)
//! ```
//!
//! The first epoch starts at the first block at or after the timer's start
//! time and does not end anything. Epoch start times advance by exactly one
//! duration, so a chain that halts catches up one epoch per block.
//!
//! Hooks run in a nested branch each; a failing hook is logged and its
//! writes dropped without affecting the timer or the other hooks.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_core::host::EpochHooks;
use tessera_core::{event, CoreError, TypedEvent};
use tessera_store::{AbciEvent, Context, Map, Order};
use tracing::{info, warn};

pub const EPOCH_INFOS: Map<String, EpochInfo> = Map::new(b"epochs/info/");

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochInfo {
    pub identifier: String,
    /// Earliest block time for the first epoch
    pub start_time_ms: i64,
    pub duration_ms: i64,
    /// Zero until counting starts
    pub current_epoch: u64,
    pub current_epoch_start_time_ms: i64,
    pub current_epoch_start_height: u64,
    pub epoch_counting_started: bool,
}

impl EpochInfo {
    pub fn new(identifier: impl Into<String>, start_time_ms: i64, duration_ms: i64) -> Self {
        Self {
            identifier: identifier.into(),
            start_time_ms,
            duration_ms,
            current_epoch: 0,
            current_epoch_start_time_ms: start_time_ms,
            current_epoch_start_height: 0,
            epoch_counting_started: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.identifier.is_empty() {
            return Err(AppError::InvalidGenesis("epoch identifier is empty".into()));
        }
        if self.duration_ms <= 0 {
            return Err(AppError::InvalidGenesis(format!(
                "epoch {} has non-positive duration {}",
                self.identifier, self.duration_ms
            )));
        }
        Ok(())
    }

    fn current_epoch_end_ms(&self) -> i64 {
        self.current_epoch_start_time_ms.saturating_add(self.duration_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochStart {
    pub identifier: String,
    pub epoch_number: u64,
    pub start_time_ms: i64,
}

impl TypedEvent for EpochStart {
    const TYPE: &'static str = "epochs.epoch_start";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochEnd {
    pub identifier: String,
    pub epoch_number: u64,
}

impl TypedEvent for EpochEnd {
    const TYPE: &'static str = "epochs.epoch_end";
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EpochEvent {
    EpochStart(EpochStart),
    EpochEnd(EpochEnd),
}

impl EpochEvent {
    pub fn decode(event: &AbciEvent) -> Option<Self> {
        match event.ty.as_str() {
            EpochStart::TYPE => EpochStart::from_abci(event).ok().map(Self::EpochStart),
            EpochEnd::TYPE => EpochEnd::from_abci(event).ok().map(Self::EpochEnd),
            _ => None,
        }
    }

    pub fn decode_all(events: &[AbciEvent]) -> Vec<Self> {
        events.iter().filter_map(Self::decode).collect()
    }
}

/// Epoch timers and the modules they notify
#[derive(Clone, Default)]
pub struct Keeper {
    hooks: Vec<(&'static str, Arc<dyn EpochHooks>)>,
}

impl Keeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks run in registration order
    pub fn with_hooks(mut self, module: &'static str, hooks: Arc<dyn EpochHooks>) -> Self {
        self.hooks.push((module, hooks));
        self
    }

    pub fn add_epoch(&self, ctx: &mut Context<'_>, info: &EpochInfo) -> Result<()> {
        info.validate()?;
        if EPOCH_INFOS.has(ctx, &info.identifier)? {
            return Err(AppError::InvalidGenesis(format!(
                "duplicate epoch identifier {}",
                info.identifier
            )));
        }
        EPOCH_INFOS.save(ctx, &info.identifier, info)?;
        Ok(())
    }

    pub fn epoch_info(&self, ctx: &mut Context<'_>, identifier: &str) -> Result<EpochInfo> {
        EPOCH_INFOS
            .may_load(ctx, &identifier.to_string())?
            .ok_or_else(|| AppError::UnknownEpoch(identifier.to_string()))
    }

    pub fn epoch_infos(&self, ctx: &mut Context<'_>) -> Result<Vec<EpochInfo>> {
        Ok(EPOCH_INFOS
            .range(
                ctx,
                std::ops::Bound::Unbounded,
                std::ops::Bound::Unbounded,
                Order::Ascending,
            )?
            .into_iter()
            .map(|(_, info)| info)
            .collect())
    }

    pub fn begin_blocker(&self, ctx: &mut Context<'_>) -> Result<()> {
        let now = ctx.block_time_ms();
        for mut info in self.epoch_infos(ctx)? {
            let should_init = !info.epoch_counting_started && now >= info.start_time_ms;
            let should_advance =
                info.epoch_counting_started && now >= info.current_epoch_end_ms();
            if !should_init && !should_advance {
                continue;
            }

            info.current_epoch_start_height = ctx.block_height();
            if should_init {
                info.epoch_counting_started = true;
                info.current_epoch = 1;
                info.current_epoch_start_time_ms = info.start_time_ms;
            } else {
                event::emit(
                    ctx,
                    &EpochEnd {
                        identifier: info.identifier.clone(),
                        epoch_number: info.current_epoch,
                    },
                )?;
                let ended = info.current_epoch;
                self.run_hooks(ctx, &info.identifier, ended, |hooks, ctx, id, n| {
                    hooks.after_epoch_end(ctx, id, n)
                });
                info.current_epoch += 1;
                info.current_epoch_start_time_ms = info.current_epoch_end_ms();
            }
            EPOCH_INFOS.save(ctx, &info.identifier, &info)?;

            event::emit(
                ctx,
                &EpochStart {
                    identifier: info.identifier.clone(),
                    epoch_number: info.current_epoch,
                    start_time_ms: info.current_epoch_start_time_ms,
                },
            )?;
            info!(
                identifier = %info.identifier,
                epoch = info.current_epoch,
                height = info.current_epoch_start_height,
                "epoch started"
            );
            let started = info.current_epoch;
            self.run_hooks(ctx, &info.identifier, started, |hooks, ctx, id, n| {
                hooks.before_epoch_start(ctx, id, n)
            });
        }
        Ok(())
    }

    fn run_hooks<F>(&self, ctx: &mut Context<'_>, identifier: &str, number: u64, call: F)
    where
        F: Fn(&dyn EpochHooks, &mut Context<'_>, &str, u64) -> std::result::Result<(), CoreError>,
    {
        for (module, hooks) in &self.hooks {
            let result = ctx.cache_context(|branch| call(hooks.as_ref(), branch, identifier, number));
            if let Err(err) = result {
                warn!(module, identifier, epoch = number, error = %err, "epoch hook failed");
            }
        }
    }
}
