//! Message handlers
//!
//! Each handler validates, mutates state through the [`Keeper`] and emits its
//! event. Handlers run inside the transaction's cache branch; an `Err` leaves
//! no trace.

use crate::error::{OracleError, Result};
use crate::events::{AggregatePrevoteEvent, AggregateVoteEvent, FeederDelegationEvent};
use crate::keeper::Keeper;
use crate::msgs::{
    MsgAggregateExchangeRatePrevote, MsgAggregateExchangeRateVote, MsgCreatePairReward,
    MsgDelegateFeedConsent, MsgEditOracleParams, MsgEditWhitelist, OracleMsg,
};
use crate::state::{PREVOTES, VOTES};
use crate::types::{parse_rates, AggregatePrevote, AggregateVote, AggregateVoteHash};
use tessera_core::host::accounts;
use tessera_core::{event, ValAddress};
use tessera_store::Context;
use tracing::{debug, info};

impl Keeper {
    /// Route an oracle message to its handler
    pub fn handle_msg(&self, ctx: &mut Context<'_>, msg: &OracleMsg) -> Result<()> {
        match msg {
            OracleMsg::AggregateExchangeRatePrevote(m) => self.aggregate_exchange_rate_prevote(ctx, m),
            OracleMsg::AggregateExchangeRateVote(m) => self.aggregate_exchange_rate_vote(ctx, m),
            OracleMsg::DelegateFeedConsent(m) => self.delegate_feed_consent(ctx, m),
            OracleMsg::EditParams(m) => self.edit_params(ctx, m),
            OracleMsg::EditWhitelist(m) => self.sudo_edit_whitelist(ctx, m),
            OracleMsg::CreatePairReward(m) => self.create_pair_reward(ctx, m).map(|_| ()),
        }
    }

    pub fn aggregate_exchange_rate_prevote(
        &self,
        ctx: &mut Context<'_>,
        msg: &MsgAggregateExchangeRatePrevote,
    ) -> Result<()> {
        let hash = msg.validate_basic()?;
        self.validate_feeder(ctx, &msg.feeder, &msg.validator)?;

        let prevote = AggregatePrevote {
            hash,
            voter: msg.validator,
            submit_block: ctx.block_height(),
        };
        PREVOTES.save(ctx, &msg.validator, &prevote)?;
        debug!(validator = %msg.validator, %hash, height = prevote.submit_block, "stored prevote");
        event::emit(
            ctx,
            &AggregatePrevoteEvent {
                validator: msg.validator,
                feeder: msg.feeder,
                hash: hash.to_string(),
            },
        )?;
        Ok(())
    }

    pub fn aggregate_exchange_rate_vote(
        &self,
        ctx: &mut Context<'_>,
        msg: &MsgAggregateExchangeRateVote,
    ) -> Result<()> {
        msg.validate_basic()?;
        self.validate_feeder(ctx, &msg.feeder, &msg.validator)?;
        let params = self.params(ctx)?;

        let prevote = PREVOTES
            .may_load(ctx, &msg.validator)?
            .ok_or(OracleError::NoAggregatePrevote(msg.validator))?;

        let prevote_period = params.period_of(prevote.submit_block);
        let vote_period = params.period_of(ctx.block_height());
        if vote_period != prevote_period + 1 {
            return Err(OracleError::RevealPeriodMismatch {
                prevote_period,
                vote_period,
            });
        }

        let tuples = parse_rates(&msg.rates)?;
        for tuple in &tuples {
            if !self.is_whitelisted(ctx, &tuple.pair)? {
                return Err(OracleError::UnknownPair(tuple.pair.clone()));
            }
        }

        let revealed = AggregateVoteHash::new(&msg.salt, &msg.rates, &msg.validator);
        if revealed != prevote.hash {
            return Err(OracleError::VerificationFailed {
                committed: prevote.hash.to_string(),
                revealed: revealed.to_string(),
            });
        }

        PREVOTES.remove(ctx, &msg.validator)?;
        VOTES.save(
            ctx,
            &msg.validator,
            &AggregateVote {
                voter: msg.validator,
                rates: tuples,
            },
        )?;
        debug!(validator = %msg.validator, rates = %msg.rates, "stored vote");
        event::emit(
            ctx,
            &AggregateVoteEvent {
                validator: msg.validator,
                feeder: msg.feeder,
                rates: msg.rates.clone(),
            },
        )?;
        Ok(())
    }

    pub fn delegate_feed_consent(
        &self,
        ctx: &mut Context<'_>,
        msg: &MsgDelegateFeedConsent,
    ) -> Result<()> {
        let validator = ValAddress::from(msg.operator);
        // errors for unknown validators
        self.staking.is_bonded(ctx, &validator)?;
        self.set_feeder_delegation(ctx, &validator, &msg.delegate)?;
        info!(%validator, delegate = %msg.delegate, "delegated feed consent");
        event::emit(
            ctx,
            &FeederDelegationEvent {
                validator,
                feeder: msg.delegate,
            },
        )?;
        Ok(())
    }

    pub fn edit_params(&self, ctx: &mut Context<'_>, msg: &MsgEditOracleParams) -> Result<()> {
        self.sudo.check_permissions(ctx, &msg.sender)?;
        let next = msg.update.apply(&self.params(ctx)?);
        self.set_params(ctx, &next)?;
        info!(sender = %msg.sender, "edited oracle params");
        Ok(())
    }

    pub fn sudo_edit_whitelist(&self, ctx: &mut Context<'_>, msg: &MsgEditWhitelist) -> Result<()> {
        self.sudo.check_permissions(ctx, &msg.sender)?;
        self.edit_whitelist(ctx, &msg.add, &msg.remove)
    }

    pub fn create_pair_reward(&self, ctx: &mut Context<'_>, msg: &MsgCreatePairReward) -> Result<u64> {
        self.sudo.check_permissions(ctx, &msg.sender)?;
        self.allocate_pair_reward(ctx, accounts::TREASURY, &msg.pair, msg.vote_periods, &msg.coins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::tests::{bond, ctx_at, keeper};
    use crate::params::{Params, ParamsUpdate};
    use crate::types::{format_rates, ExchangeRateTuple};
    use tessera_core::host::StoreSudo;
    use tessera_core::{AccAddress, AssetPair, CoreError, Dec};
    use tessera_store::CommitStore;

    fn pair(s: &str) -> AssetPair {
        s.parse().unwrap()
    }

    fn setup(ctx: &mut Context<'_>) -> (Keeper, ValAddress) {
        let k = keeper();
        k.set_params(
            ctx,
            &Params {
                vote_period: 10,
                whitelist: vec![pair("ubtc:uusd"), pair("ueth:uusd")],
                ..Params::default()
            },
        )
        .unwrap();
        let val = bond(ctx, "val", 10);
        (k, val)
    }

    fn prevote_msg(val: ValAddress, salt: &str, rates: &str) -> MsgAggregateExchangeRatePrevote {
        MsgAggregateExchangeRatePrevote {
            hash: AggregateVoteHash::new(salt, rates, &val).to_string(),
            feeder: AccAddress::from(val),
            validator: val,
        }
    }

    fn vote_msg(val: ValAddress, salt: &str, rates: &str) -> MsgAggregateExchangeRateVote {
        MsgAggregateExchangeRateVote {
            salt: salt.into(),
            rates: rates.into(),
            feeder: AccAddress::from(val),
            validator: val,
        }
    }

    #[test]
    fn test_prevote_then_vote_next_period() {
        let store = CommitStore::new();
        let rates = format_rates(&[
            ExchangeRateTuple::new(pair("ubtc:uusd"), Dec::from(42_000i64)),
            ExchangeRateTuple::new(pair("ueth:uusd"), Dec::from(-1i64)),
        ]);

        let mut ctx = ctx_at(&store, 5, 0);
        let (k, val) = setup(&mut ctx);
        k.aggregate_exchange_rate_prevote(&mut ctx, &prevote_msg(val, "s1", &rates))
            .unwrap();

        let (writes, _, _) = ctx.into_parts();
        store.commit(writes, 5);

        // same period
        let mut ctx = ctx_at(&store, 9, 0);
        assert!(matches!(
            k.aggregate_exchange_rate_vote(&mut ctx, &vote_msg(val, "s1", &rates)),
            Err(OracleError::RevealPeriodMismatch {
                prevote_period: 0,
                vote_period: 0
            })
        ));

        let mut ctx = ctx_at(&store, 11, 0);
        assert!(matches!(
            k.aggregate_exchange_rate_vote(&mut ctx, &vote_msg(val, "s2", &rates)),
            Err(OracleError::VerificationFailed { .. })
        ));
        k.aggregate_exchange_rate_vote(&mut ctx, &vote_msg(val, "s1", &rates))
            .unwrap();
        assert!(k.prevote(&mut ctx, &val).unwrap().is_none());
        let vote = k.vote(&mut ctx, &val).unwrap().unwrap();
        assert_eq!(vote.rates.len(), 2);
        assert_eq!(ctx.events().len(), 1);
    }

    #[test]
    fn test_vote_two_periods_late_rejected() {
        let store = CommitStore::new();
        let rates = "ubtc:uusd,1";
        let mut ctx = ctx_at(&store, 1, 0);
        let (k, val) = setup(&mut ctx);
        k.aggregate_exchange_rate_prevote(&mut ctx, &prevote_msg(val, "a", rates))
            .unwrap();
        let (writes, _, _) = ctx.into_parts();
        store.commit(writes, 1);

        let mut ctx = ctx_at(&store, 21, 0);
        assert!(matches!(
            k.aggregate_exchange_rate_vote(&mut ctx, &vote_msg(val, "a", rates)),
            Err(OracleError::RevealPeriodMismatch {
                prevote_period: 0,
                vote_period: 2
            })
        ));
    }

    #[test]
    fn test_vote_requirements() {
        let store = CommitStore::new();
        let mut ctx = ctx_at(&store, 1, 0);
        let (k, val) = setup(&mut ctx);

        assert!(matches!(
            k.aggregate_exchange_rate_vote(&mut ctx, &vote_msg(val, "a", "ubtc:uusd,1")),
            Err(OracleError::NoAggregatePrevote(_))
        ));

        let rates = "uatom:uusd,1";
        k.aggregate_exchange_rate_prevote(&mut ctx, &prevote_msg(val, "a", rates))
            .unwrap();
        let (writes, _, _) = ctx.into_parts();
        store.commit(writes, 1);
        let mut ctx = ctx_at(&store, 11, 0);
        assert!(matches!(
            k.aggregate_exchange_rate_vote(&mut ctx, &vote_msg(val, "a", rates)),
            Err(OracleError::UnknownPair(_))
        ));
    }

    #[test]
    fn test_prevote_overwrites_and_checks_feeder() {
        let store = CommitStore::new();
        let mut ctx = ctx_at(&store, 1, 0);
        let (k, val) = setup(&mut ctx);
        k.aggregate_exchange_rate_prevote(&mut ctx, &prevote_msg(val, "a", "ubtc:uusd,1"))
            .unwrap();
        let second = prevote_msg(val, "b", "ubtc:uusd,2");
        k.aggregate_exchange_rate_prevote(&mut ctx, &second).unwrap();
        assert_eq!(
            k.prevote(&mut ctx, &val).unwrap().unwrap().hash.to_string(),
            second.hash
        );

        let feeder = AccAddress::from_seed("feeder");
        let by_feeder = MsgAggregateExchangeRatePrevote {
            feeder,
            ..second.clone()
        };
        assert!(matches!(
            k.aggregate_exchange_rate_prevote(&mut ctx, &by_feeder),
            Err(OracleError::NoVotingPermission { .. })
        ));
        k.delegate_feed_consent(
            &mut ctx,
            &MsgDelegateFeedConsent {
                operator: AccAddress::from(val),
                delegate: feeder,
            },
        )
        .unwrap();
        k.aggregate_exchange_rate_prevote(&mut ctx, &by_feeder).unwrap();
    }

    #[test]
    fn test_sudo_edit_params() {
        let store = CommitStore::new();
        let mut ctx = ctx_at(&store, 1, 0);
        let (k, _) = setup(&mut ctx);
        let admin = AccAddress::from_seed("admin");
        let msg = MsgEditOracleParams {
            sender: admin,
            update: ParamsUpdate {
                min_voters: Some(1),
                ..ParamsUpdate::default()
            },
        };
        assert!(matches!(
            k.edit_params(&mut ctx, &msg),
            Err(OracleError::Core(CoreError::Unauthorized(_)))
        ));
        StoreSudo::new().set_sudoers(&mut ctx, &[admin]).unwrap();
        k.edit_params(&mut ctx, &msg).unwrap();
        assert_eq!(k.params(&mut ctx).unwrap().min_voters, 1);
    }
}
