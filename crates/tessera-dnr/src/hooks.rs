//! Epoch hook driving DnR rollover

use crate::keeper::Keeper;
use tessera_core::host::EpochHooks;
use tessera_core::CoreError;
use tessera_store::Context;

impl EpochHooks for Keeper {
    /// `number` is the epoch that just began
    fn after_epoch_end(
        &self,
        ctx: &mut Context<'_>,
        identifier: &str,
        number: u64,
    ) -> Result<(), CoreError> {
        if identifier != self.epoch_identifier() {
            return Ok(());
        }
        Ok(self.start_new_epoch(ctx, number)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::tests::{ctx, keeper, EPOCH_ID};
    use tessera_store::CommitStore;

    #[test]
    fn test_only_configured_identifier_rolls_over() {
        let store = CommitStore::new();
        let mut ctx = ctx(&store);
        let k = keeper();
        k.after_epoch_end(&mut ctx, "day", 3).unwrap();
        assert_eq!(k.current_epoch(&mut ctx).unwrap(), 0);
        k.after_epoch_end(&mut ctx, EPOCH_ID, 3).unwrap();
        assert_eq!(k.current_epoch(&mut ctx).unwrap(), 3);
    }
}
