//! Message handlers; discount administration is sudo-gated

use crate::error::Result;
use crate::keeper::Keeper;
use crate::msgs::DnrMsg;
use tessera_core::Coins;
use tessera_store::Context;

impl Keeper {
    /// Route a DnR message; returns the coins paid out, if any
    pub fn handle_msg(&self, ctx: &mut Context<'_>, msg: &DnrMsg) -> Result<Coins> {
        match msg {
            DnrMsg::AllocateEpochRebates(m) => {
                self.allocate_epoch_rebates(ctx, &m.sender, &m.coins)?;
                Ok(Coins::empty())
            }
            DnrMsg::WithdrawEpochRebates(m) => self.withdraw_epoch_rebates(ctx, &m.sender, m.epoch),
            DnrMsg::SetGlobalDiscount(m) => {
                self.sudo.check_permissions(ctx, &m.sender)?;
                self.set_global_discount(ctx, &m.volume_threshold, &m.fee_ratio)?;
                Ok(Coins::empty())
            }
            DnrMsg::RemoveGlobalDiscount(m) => {
                self.sudo.check_permissions(ctx, &m.sender)?;
                self.remove_global_discount(ctx, &m.volume_threshold)?;
                Ok(Coins::empty())
            }
            DnrMsg::SetTraderDiscount(m) => {
                self.sudo.check_permissions(ctx, &m.sender)?;
                self.set_trader_discount(ctx, &m.trader, &m.volume_threshold, &m.fee_ratio)?;
                Ok(Coins::empty())
            }
            DnrMsg::RemoveTraderDiscount(m) => {
                self.sudo.check_permissions(ctx, &m.sender)?;
                self.remove_trader_discount(ctx, &m.trader, &m.volume_threshold)?;
                Ok(Coins::empty())
            }
        }
    }
}
