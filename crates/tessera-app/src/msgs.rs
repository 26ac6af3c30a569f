//! Transaction messages routed to the module that handles them

use serde::{Deserialize, Serialize};
use tessera_core::AccAddress;
use tessera_dnr::DnrMsg;
use tessera_oracle::OracleMsg;
use tessera_perp::PerpMsg;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "module", content = "msg", rename_all = "snake_case")]
pub enum Msg {
    Oracle(OracleMsg),
    Perp(PerpMsg),
    Dnr(DnrMsg),
}

impl Msg {
    pub fn module(&self) -> &'static str {
        match self {
            Self::Oracle(_) => "oracle",
            Self::Perp(_) => "perp",
            Self::Dnr(_) => "dnr",
        }
    }

    pub fn signer(&self) -> AccAddress {
        match self {
            Self::Oracle(m) => m.signer(),
            Self::Perp(m) => m.signer(),
            Self::Dnr(m) => m.signer(),
        }
    }
}

impl From<OracleMsg> for Msg {
    fn from(msg: OracleMsg) -> Self {
        Self::Oracle(msg)
    }
}

impl From<PerpMsg> for Msg {
    fn from(msg: PerpMsg) -> Self {
        Self::Perp(msg)
    }
}

impl From<DnrMsg> for Msg {
    fn from(msg: DnrMsg) -> Self {
        Self::Dnr(msg)
    }
}
