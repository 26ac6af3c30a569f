use super::SudoKeeper;
use crate::address::AccAddress;
use crate::error::{CoreError, Result};
use tessera_store::{Context, Item};

const SUDOERS: Item<Vec<AccAddress>> = Item::new(b"sudo/sudoers");

/// Sudo membership kept in the key-value context
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreSudo;

impl StoreSudo {
    pub fn new() -> Self {
        Self
    }

    pub fn set_sudoers(&self, ctx: &mut Context<'_>, sudoers: &[AccAddress]) -> Result<()> {
        let mut list = sudoers.to_vec();
        list.sort();
        list.dedup();
        SUDOERS.save(ctx, &list)?;
        Ok(())
    }

    pub fn sudoers(&self, ctx: &mut Context<'_>) -> Result<Vec<AccAddress>> {
        Ok(SUDOERS.may_load(ctx)?.unwrap_or_default())
    }
}

impl SudoKeeper for StoreSudo {
    fn check_permissions(&self, ctx: &mut Context<'_>, sender: &AccAddress) -> Result<()> {
        if self.sudoers(ctx)?.contains(sender) {
            Ok(())
        } else {
            Err(CoreError::Unauthorized(format!("{sender} is not a sudoer")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tessera_store::{BlockHeader, CommitStore, GasMeter};

    #[test]
    fn test_check_permissions() {
        let store = CommitStore::new();
        let mut ctx = Context::new(&store, BlockHeader::new("t", 1, Utc::now()), GasMeter::infinite());
        let sudo = StoreSudo::new();
        let admin = AccAddress::from_seed("admin");
        assert!(sudo.check_permissions(&mut ctx, &admin).is_err());
        sudo.set_sudoers(&mut ctx, &[admin]).unwrap();
        assert!(sudo.check_permissions(&mut ctx, &admin).is_ok());
    }
}
