//! Message handlers; market administration is sudo-gated

use crate::error::Result;
use crate::keeper::Keeper;
use crate::msgs::PerpMsg;
use tessera_store::Context;

impl Keeper {
    pub fn handle_msg(&self, ctx: &mut Context<'_>, msg: &PerpMsg) -> Result<()> {
        if msg.is_admin() {
            self.sudo.check_permissions(ctx, &msg.signer())?;
        }
        match msg {
            PerpMsg::MarketOrder(m) => self
                .market_order(
                    ctx,
                    &m.pair,
                    &m.sender,
                    m.side,
                    m.quote_asset_amount,
                    &m.leverage,
                    &m.base_asset_amount_limit,
                )
                .map(|_| ()),
            PerpMsg::AddMargin(m) => self.add_margin(ctx, &m.pair, &m.sender, &m.margin).map(|_| ()),
            PerpMsg::RemoveMargin(m) => self
                .remove_margin(ctx, &m.pair, &m.sender, &m.margin)
                .map(|_| ()),
            PerpMsg::ClosePosition(m) => self.close_position(ctx, &m.pair, &m.sender).map(|_| ()),
            PerpMsg::MultiLiquidate(m) => self
                .multi_liquidate(ctx, &m.sender, &m.liquidations)
                .map(|_| ()),
            PerpMsg::SettlePosition(m) => self
                .settle_position(ctx, &m.pair, m.version, &m.sender)
                .map(|_| ()),
            PerpMsg::CreateMarket(m) => self
                .create_market(
                    ctx,
                    m.pair.clone(),
                    m.sqrt_depth.clone(),
                    m.price_multiplier.clone(),
                    m.market.clone(),
                )
                .map(|_| ()),
            PerpMsg::CloseMarket(m) => self.close_market(ctx, &m.pair).map(|_| ()),
            PerpMsg::ShiftPegMultiplier(m) => self
                .shift_peg_multiplier(ctx, &m.pair, &m.new_peg_multiplier)
                .map(|_| ()),
            PerpMsg::ShiftSwapInvariant(m) => self
                .shift_swap_invariant(ctx, &m.pair, &m.new_swap_invariant)
                .map(|_| ()),
            PerpMsg::ChangeCollateralDenom(m) => self.change_collateral_denom(ctx, &m.new_denom),
            PerpMsg::WhitelistLiquidator(m) => self.whitelist_liquidator(ctx, &m.liquidator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PerpError;
    use crate::keeper::tests::{ctx_at, d, keeper, pair, setup_market};
    use crate::msgs::{MsgCloseMarket, MsgWhitelistLiquidator};
    use tessera_core::host::StoreSudo;
    use tessera_core::{AccAddress, CoreError};
    use tessera_store::CommitStore;

    #[test]
    fn test_admin_messages_require_sudo() {
        let store = CommitStore::new();
        let mut ctx = ctx_at(&store, 1, 1_000);
        let k = keeper();
        setup_market(&mut ctx, &k, "1000", "1");
        let admin = AccAddress::from_seed("admin");
        let close = PerpMsg::CloseMarket(MsgCloseMarket {
            sender: admin,
            pair: pair(),
        });

        let err = k.handle_msg(&mut ctx, &close).unwrap_err();
        assert!(matches!(err, PerpError::Core(CoreError::Unauthorized(_))));
        assert!(k.market(&mut ctx, &pair()).unwrap().enabled);

        StoreSudo::new().set_sudoers(&mut ctx, &[admin]).unwrap();
        k.handle_msg(&mut ctx, &close).unwrap();
        let market = k.market(&mut ctx, &pair()).unwrap();
        assert!(!market.enabled);
        assert_eq!(k.amm(&mut ctx, &pair()).unwrap().settlement_price, d("1"));

        let liquidator = AccAddress::from_seed("liq");
        k.handle_msg(
            &mut ctx,
            &PerpMsg::WhitelistLiquidator(MsgWhitelistLiquidator { sender: admin, liquidator }),
        )
        .unwrap();
        assert_eq!(k.whitelisted_liquidators(&mut ctx).unwrap(), vec![liquidator]);
    }
}
