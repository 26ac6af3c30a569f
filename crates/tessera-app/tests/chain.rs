//! End-to-end block execution across the oracle, perp and DnR modules
//!
//! Each scenario starts a fresh chain from genesis and drives it through
//! `execute_block`, checking only committed state.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tessera_app::config::EpochConfig;
use tessera_app::{App, AppConfig, GenesisBalance, GenesisState, Msg};
use tessera_core::host::{accounts, Validator};
use tessera_core::{AccAddress, AssetPair, Coins, Dec, ValAddress};

const DENOM: &str = "unusd";

fn genesis_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Block time of block `height` with five-second blocks
fn block_time(height: i64) -> DateTime<Utc> {
    genesis_time() + Duration::seconds(5 * height)
}

fn pair(s: &str) -> AssetPair {
    s.parse().unwrap()
}

fn funded(addr: AccAddress, amount: u128) -> GenesisBalance {
    GenesisBalance {
        address: addr,
        coins: Coins::single(amount, DENOM),
    }
}

/// Run empty blocks from `from` through `to` inclusive
fn run_empty(app: &App, from: i64, to: i64) {
    for height in from..=to {
        let result = app.execute_block(block_time(height), &[]).unwrap();
        assert_eq!(result.height, height as u64);
    }
}

mod oracle_round {
    use super::*;
    use tessera_oracle::types::{format_rates, AggregateVoteHash, ExchangeRateTuple};
    use tessera_oracle::{
        MsgAggregateExchangeRatePrevote, MsgAggregateExchangeRateVote, OracleEvent, OracleMsg,
        Params,
    };

    const SALT: &str = "1a2b";

    fn validators() -> Vec<ValAddress> {
        ["v1", "v2", "v3", "v4"]
            .into_iter()
            .map(ValAddress::from_seed)
            .collect()
    }

    fn rates() -> String {
        format_rates(&[ExchangeRateTuple::new(
            pair("ubtc:uusd"),
            Dec::from(42_000i64),
        )])
    }

    fn prevote(val: ValAddress) -> Msg {
        Msg::Oracle(OracleMsg::AggregateExchangeRatePrevote(
            MsgAggregateExchangeRatePrevote {
                hash: AggregateVoteHash::new(SALT, &rates(), &val).to_string(),
                feeder: AccAddress::from(val),
                validator: val,
            },
        ))
    }

    fn vote(val: ValAddress) -> Msg {
        Msg::Oracle(OracleMsg::AggregateExchangeRateVote(
            MsgAggregateExchangeRateVote {
                salt: SALT.into(),
                rates: rates(),
                feeder: AccAddress::from(val),
                validator: val,
            },
        ))
    }

    fn oracle_app() -> App {
        let app = App::new(AppConfig::default());
        let mut genesis = GenesisState::new(genesis_time());
        genesis.validators = validators()
            .into_iter()
            .map(|v| Validator::bonded(v, 10_000_000))
            .collect();
        genesis.oracle.params = Params {
            vote_period: 5,
            slash_window: 10,
            min_voters: 3,
            whitelist: vec![pair("ubtc:uusd")],
            ..Params::default()
        };
        app.init_chain(&genesis).unwrap();
        app
    }

    #[test]
    fn test_commit_reveal_publishes_rate_and_slashes_absentee() {
        let app = oracle_app();
        let vals = validators();
        let voters = &vals[..3];
        let absentee = vals[3];

        // period 0: commit
        let prevotes: Vec<Msg> = voters.iter().copied().map(prevote).collect();
        let result = app.execute_block(block_time(1), &prevotes).unwrap();
        assert!(result.txs.iter().all(|tx| tx.is_ok()));
        run_empty(&app, 2, 5);
        assert!(app.exchange_rate(&pair("ubtc:uusd")).is_err());

        // period 1: reveal
        let votes: Vec<Msg> = voters.iter().copied().map(vote).collect();
        let result = app.execute_block(block_time(6), &votes).unwrap();
        for tx in &result.txs {
            assert!(tx.is_ok(), "{}", tx.log);
        }
        run_empty(&app, 7, 9);

        // period and slash window close together
        let result = app.execute_block(block_time(10), &[]).unwrap();
        assert_eq!(
            app.exchange_rate(&pair("ubtc:uusd")).unwrap(),
            Dec::from(42_000i64)
        );

        let events = OracleEvent::decode_all(&result.events);
        let slashed: Vec<ValAddress> = events
            .iter()
            .filter_map(|e| match e {
                OracleEvent::ValidatorSlashed(s) => Some(s.validator),
                _ => None,
            })
            .collect();
        assert_eq!(slashed, vec![absentee]);

        let absent = app
            .query(|ctx| Ok(app.staking().validator(ctx, &absentee)?))
            .unwrap();
        assert!(absent.jailed);
        assert!(absent.tokens < 10_000_000);
        let voter = app
            .query(|ctx| Ok(app.staking().validator(ctx, &voters[0])?))
            .unwrap();
        assert!(!voter.jailed);
        assert_eq!(voter.tokens, 10_000_000);
    }

    #[test]
    fn test_reveal_in_commit_period_fails() {
        let app = oracle_app();
        let val = validators()[0];
        app.execute_block(block_time(1), &[prevote(val)]).unwrap();

        let result = app.execute_block(block_time(2), &[vote(val)]).unwrap();
        assert!(!result.txs[0].is_ok());
        assert!(result.txs[0].log.contains("period"));
        assert!(result.txs[0].events.is_empty());
    }
}

mod perp_trading {
    use super::*;
    use tessera_oracle::types::DatedPrice;
    use tessera_perp::{
        Direction, Market, MsgClosePosition, MsgCreateMarket, MsgMarketOrder, PerpError, PerpEvent,
        PerpMsg,
    };

    fn market_pair() -> AssetPair {
        pair("ubtc:unusd")
    }

    fn admin() -> AccAddress {
        AccAddress::from_seed("admin")
    }

    fn create_market(sender: AccAddress) -> Msg {
        Msg::Perp(PerpMsg::CreateMarket(MsgCreateMarket {
            sender,
            pair: market_pair(),
            sqrt_depth: Dec::from(1_000_000_000_000i64),
            price_multiplier: Dec::one(),
            market: Some(Market {
                exchange_fee_ratio: Dec::with_prec(5, 4),
                ecosystem_fund_fee_ratio: Dec::with_prec(5, 4),
                ..Market::new(market_pair())
            }),
        }))
    }

    fn leveraged_order(sender: AccAddress, quote: u128, leverage: i64) -> Msg {
        Msg::Perp(PerpMsg::MarketOrder(MsgMarketOrder {
            sender,
            pair: market_pair(),
            side: Direction::Long,
            quote_asset_amount: quote,
            leverage: Dec::from(leverage),
            base_asset_amount_limit: Dec::zero(),
        }))
    }

    /// Long at 10x
    pub(crate) fn order(sender: AccAddress, quote: u128) -> Msg {
        leveraged_order(sender, quote, 10)
    }

    /// Chain with a priced pair, a sudoer and funded traders
    pub(crate) fn perp_app(config: AppConfig, traders: &[(AccAddress, u128)]) -> App {
        let app = App::new(config);
        let mut genesis = GenesisState::new(genesis_time());
        genesis.sudoers = vec![admin()];
        genesis.validators = vec![Validator::bonded(ValAddress::from_seed("val"), 10_000_000)];
        genesis.balances = traders.iter().map(|(a, n)| funded(*a, *n)).collect();
        genesis.oracle.exchange_rates = vec![(
            market_pair(),
            DatedPrice {
                rate: Dec::one(),
                created_block: 0,
            },
        )];
        app.init_chain(&genesis).unwrap();

        let result = app
            .execute_block(block_time(1), &[create_market(admin())])
            .unwrap();
        assert!(result.txs[0].is_ok(), "{}", result.txs[0].log);
        app
    }

    #[test]
    fn test_create_market_requires_sudo() {
        let app = perp_app(AppConfig::default(), &[]);
        let mallory = AccAddress::from_seed("mallory");
        let result = app
            .execute_block(block_time(2), &[create_market(mallory)])
            .unwrap();
        assert!(!result.txs[0].is_ok());
        let version = app
            .query(|ctx| Ok(app.perp().market_version(ctx, &market_pair())?))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_open_and_close_long() {
        let alice = AccAddress::from_seed("alice");
        let app = perp_app(AppConfig::default(), &[(alice, 1_020)]);

        let result = app.execute_block(block_time(2), &[order(alice, 1_000)]).unwrap();
        assert!(result.txs[0].is_ok(), "{}", result.txs[0].log);
        let changed = PerpEvent::decode_all(&result.txs[0].events)
            .into_iter()
            .any(|e| matches!(e, PerpEvent::PositionChanged(_)));
        assert!(changed);

        let position = app.position(&market_pair(), &alice).unwrap();
        assert_eq!(position.margin, Dec::from(1_000i64));
        assert_eq!(position.open_notional, Dec::from(10_000i64));
        assert!(position.size.is_positive());
        // margin plus 0.1% of the notional in fees
        assert_eq!(app.balance(&alice, DENOM).unwrap(), 10);
        assert_eq!(
            app.balance(&AccAddress::module(accounts::PERP_VAULT), DENOM)
                .unwrap(),
            1_000
        );

        let close = Msg::Perp(PerpMsg::ClosePosition(MsgClosePosition {
            sender: alice,
            pair: market_pair(),
        }));
        let result = app.execute_block(block_time(3), &[close]).unwrap();
        assert!(result.txs[0].is_ok(), "{}", result.txs[0].log);

        let err = app.position(&market_pair(), &alice).unwrap_err();
        assert!(matches!(
            err,
            tessera_app::AppError::Perp(PerpError::PositionNotFound { .. })
        ));
        // the round trip costs both legs' fees and nothing else
        let balance = app.balance(&alice, DENOM).unwrap();
        assert!((1_000..=1_002).contains(&balance), "balance {balance}");
    }

    #[test]
    fn test_over_leveraged_order_rolls_back() {
        let alice = AccAddress::from_seed("alice");
        let app = perp_app(AppConfig::default(), &[(alice, 10_000)]);
        let result = app
            .execute_block(block_time(2), &[leveraged_order(alice, 100, 20)])
            .unwrap();
        assert!(!result.txs[0].is_ok());
        assert_eq!(app.balance(&alice, DENOM).unwrap(), 10_000);
        assert!(app.position(&market_pair(), &alice).is_err());
    }
}

mod dnr_rollover {
    use super::perp_trading::{order, perp_app};
    use super::*;
    use tessera_dnr::{DnrEvent, DnrMsg, MsgAllocateEpochRebates, MsgWithdrawEpochRebates};

    /// One-minute DnR epochs so the rollover happens within a few blocks
    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.epochs = vec![EpochConfig::new("week", 60)];
        config.dnr.epoch_identifier = "week".into();
        config
    }

    fn withdraw(sender: AccAddress, epoch: u64) -> Msg {
        Msg::Dnr(DnrMsg::WithdrawEpochRebates(MsgWithdrawEpochRebates {
            sender,
            epoch,
        }))
    }

    fn withdrawn(events: &[tessera_store::AbciEvent]) -> Vec<Coins> {
        DnrEvent::decode_all(events)
            .into_iter()
            .filter_map(|e| match e {
                DnrEvent::RebatesWithdrawn(w) => Some(w.coins),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rebates_follow_last_epoch_volume() {
        let alice = AccAddress::from_seed("alice");
        let bob = AccAddress::from_seed("bob");
        let carol = AccAddress::from_seed("carol");
        let app = perp_app(config(), &[(alice, 1_000), (bob, 1_000), (carol, 1_000)]);
        assert_eq!(app.epoch_info("week").unwrap().current_epoch, 1);

        // 6000 and 4000 of notional in DnR epoch 0, plus a 100 allocation
        let allocate = Msg::Dnr(DnrMsg::AllocateEpochRebates(MsgAllocateEpochRebates {
            sender: carol,
            coins: Coins::single(100, DENOM),
        }));
        let result = app
            .execute_block(block_time(2), &[order(alice, 600), order(bob, 400), allocate])
            .unwrap();
        for tx in &result.txs {
            assert!(tx.is_ok(), "{}", tx.log);
        }

        // nothing to claim while the epoch is running
        let result = app.execute_block(block_time(3), &[withdraw(alice, 0)]).unwrap();
        assert!(!result.txs[0].is_ok());

        // the week timer rolls over one minute after genesis
        run_empty(&app, 4, 12);
        assert_eq!(app.epoch_info("week").unwrap().current_epoch, 2);
        let escrow = AccAddress::module(accounts::DNR_ESCROW);
        assert_eq!(app.balance(&escrow, DENOM).unwrap(), 100);

        let alice_before = app.balance(&alice, DENOM).unwrap();
        let bob_before = app.balance(&bob, DENOM).unwrap();
        let result = app
            .execute_block(
                block_time(13),
                &[withdraw(alice, 0), withdraw(alice, 0), withdraw(bob, 0)],
            )
            .unwrap();
        for tx in &result.txs {
            assert!(tx.is_ok(), "{}", tx.log);
        }
        assert_eq!(app.balance(&alice, DENOM).unwrap() - alice_before, 60);
        assert_eq!(app.balance(&bob, DENOM).unwrap() - bob_before, 40);
        assert_eq!(app.balance(&escrow, DENOM).unwrap(), 0);

        assert_eq!(withdrawn(&result.txs[0].events), vec![Coins::single(60, DENOM)]);
        // the second claim pays nothing
        assert!(withdrawn(&result.txs[1].events).iter().all(Coins::is_empty));
    }
}
